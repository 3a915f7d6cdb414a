//! Text-insight collaborator contract.
//!
//! Narrative analysis (sprint trajectory summaries, ticket suggestions
//! for underutilized engineers) comes from an external AI service. Every
//! call site degrades gracefully: a failure here never fails a check
//! module or blocks snapshot persistence.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ForemanError, Result};
use crate::types::{SprintSnapshot, TeamMember};

/// A ticket the insight service proposes for an underutilized engineer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketSuggestion {
    pub title: String,
    pub description: String,
    pub team_member_id: Uuid,
    /// How well the suggestion matches the engineer's skills, in `[0, 1]`.
    /// Becomes the confidence of the resulting `pm_suggestion` action.
    pub skill_match: f64,
}

#[async_trait]
pub trait InsightService: Send + Sync {
    /// Short natural-language summary of the sprint's trajectory.
    async fn sprint_summary(&self, snapshot: &SprintSnapshot) -> Result<String>;

    /// Ticket suggestions targeted at the given underutilized engineers.
    async fn ticket_suggestions(&self, members: &[TeamMember]) -> Result<Vec<TicketSuggestion>>;
}

// ---------------------------------------------------------------------------
// FixedInsight (test double)
// ---------------------------------------------------------------------------

/// Insight service for tests: returns canned values, or fails every call
/// when primed with an error.
#[derive(Default)]
pub struct FixedInsight {
    summary: Mutex<Option<String>>,
    suggestions: Mutex<Vec<TicketSuggestion>>,
    fail_with: Mutex<Option<String>>,
}

impl FixedInsight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_summary(summary: impl Into<String>) -> Self {
        let insight = Self::default();
        *insight.summary.lock().unwrap_or_else(|e| e.into_inner()) = Some(summary.into());
        insight
    }

    pub fn fail_with(&self, message: impl Into<String>) {
        *self.fail_with.lock().unwrap_or_else(|e| e.into_inner()) = Some(message.into());
    }

    pub fn set_suggestions(&self, suggestions: Vec<TicketSuggestion>) {
        *self.suggestions.lock().unwrap_or_else(|e| e.into_inner()) = suggestions;
    }

    fn check_failure(&self) -> Result<()> {
        match self
            .fail_with
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            Some(message) => Err(ForemanError::Insight(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl InsightService for FixedInsight {
    async fn sprint_summary(&self, snapshot: &SprintSnapshot) -> Result<String> {
        self.check_failure()?;
        Ok(self
            .summary
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .unwrap_or_else(|| {
                format!(
                    "{} of {} tickets complete, health {}",
                    snapshot.completed_tickets, snapshot.total_tickets, snapshot.health_score
                )
            }))
    }

    async fn ticket_suggestions(&self, _members: &[TeamMember]) -> Result<Vec<TicketSuggestion>> {
        self.check_failure()?;
        Ok(self
            .suggestions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }
}
