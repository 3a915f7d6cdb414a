//! Workload check: per-engineer load health plus AI ticket suggestions
//! for engineers with nothing on their plate.
//!
//! Before analysing anything the module asks the tracker for the current
//! active tickets and upserts them, so the numbers reflect the freshest
//! data available. That pre-sync is strictly best-effort: a tracker
//! failure is logged and analysis proceeds on whatever storage already
//! holds.

use async_trait::async_trait;

use foreman_core::types::{
    ActionKind, AlertSeverity, ModuleName, PmAlertPayload, PmSuggestionPayload, ProposedAction,
    StatusCategory, TeamMember, Ticket,
};
use foreman_core::Result;

use super::{CheckContext, CheckModule};

const CRITICAL_IN_PROGRESS: usize = 5;
const WARNING_IN_PROGRESS: usize = 3;

#[derive(Debug, Default)]
pub struct WorkloadCheck;

impl WorkloadCheck {
    pub fn new() -> Self {
        Self
    }
}

/// Load-health verdict for one engineer, or `None` when nothing is worth
/// flagging.
fn assess(member_tickets: &[&Ticket]) -> Option<(AlertSeverity, String)> {
    let in_progress = member_tickets
        .iter()
        .filter(|t| t.status.category == StatusCategory::InProgress)
        .count();
    if in_progress >= CRITICAL_IN_PROGRESS {
        return Some((
            AlertSeverity::Critical,
            format!("{in_progress} tickets in progress at once"),
        ));
    }
    if in_progress >= WARNING_IN_PROGRESS {
        return Some((
            AlertSeverity::Warning,
            format!("{in_progress} tickets in progress"),
        ));
    }
    if member_tickets.is_empty() {
        return Some((AlertSeverity::Info, "no active tickets assigned".to_string()));
    }
    None
}

#[async_trait]
impl CheckModule for WorkloadCheck {
    fn name(&self) -> ModuleName {
        ModuleName::Workload
    }

    async fn run(&self, ctx: &CheckContext) -> Result<Vec<ProposedAction>> {
        if let Some(tracker) = &ctx.tracker {
            match tracker.fetch_active_tickets().await {
                Ok(tickets) => ctx.store.upsert_tickets(&tickets)?,
                Err(e) => {
                    tracing::warn!(error = %e, "ticket pre-sync failed, using stored data");
                }
            }
        }

        let members = ctx.store.team_members()?;
        let active = ctx.store.active_tickets()?;

        let mut proposals = Vec::new();
        let mut underutilized: Vec<TeamMember> = Vec::new();
        for member in &members {
            let member_tickets: Vec<&Ticket> = active
                .iter()
                .filter(|t| t.assignee_id == Some(member.id))
                .collect();
            let Some((severity, detail)) = assess(&member_tickets) else {
                continue;
            };
            if severity == AlertSeverity::Info {
                underutilized.push(member.clone());
            }
            proposals.push(ProposedAction {
                kind: ActionKind::PmAlert(PmAlertPayload {
                    team_member_id: member.id,
                    severity,
                }),
                check_module: ModuleName::Workload,
                title: format!("Workload alert for {}", member.name),
                description: detail,
                confidence: severity.confidence(),
            });
        }

        // Suggestions are advisory and degrade to nothing on failure.
        if !underutilized.is_empty() {
            if let Some(insight) = &ctx.insight {
                match insight.ticket_suggestions(&underutilized).await {
                    Ok(suggestions) => {
                        for suggestion in suggestions {
                            proposals.push(ProposedAction {
                                kind: ActionKind::PmSuggestion(PmSuggestionPayload {
                                    team_member_id: suggestion.team_member_id,
                                    skill_match: suggestion.skill_match,
                                }),
                                check_module: ModuleName::Workload,
                                title: suggestion.title,
                                description: suggestion.description,
                                confidence: suggestion.skill_match,
                            });
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "ticket suggestions unavailable");
                    }
                }
            }
        }

        Ok(proposals)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
