//! Issue-tracker collaborator contract.
//!
//! The tracker executes remote mutations with its own retry policy and
//! timeouts; the engine only sees typed results. An engine constructed
//! without a tracker runs in advisory-only mode: the executor
//! short-circuits every remote-effecting action to success.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ForemanError, Result};
use crate::types::{StatusCategory, Ticket};

/// A workflow transition available on a tracker issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub id: String,
    pub name: String,
    pub to_status: String,
    pub to_category: StatusCategory,
}

#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Pull the current set of active tickets for the workload pre-sync.
    async fn fetch_active_tickets(&self) -> Result<Vec<Ticket>>;

    async fn assign_issue(&self, key: &str, account_id: &str) -> Result<()>;

    async fn list_transitions(&self, key: &str) -> Result<Vec<Transition>>;

    async fn apply_transition(&self, key: &str, transition_id: &str) -> Result<()>;

    async fn add_comment(&self, key: &str, body: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// RecordingTracker (test double)
// ---------------------------------------------------------------------------

/// What a [`RecordingTracker`] observed, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerCall {
    FetchActiveTickets,
    Assign { key: String, account_id: String },
    ListTransitions { key: String },
    ApplyTransition { key: String, transition_id: String },
    Comment { key: String, body: String },
}

/// In-memory tracker for tests: records every call and can be primed
/// with transitions, tickets, or a failure.
#[derive(Default)]
pub struct RecordingTracker {
    calls: Mutex<Vec<TrackerCall>>,
    transitions: Mutex<Vec<Transition>>,
    active_tickets: Mutex<Vec<Ticket>>,
    fail_with: Mutex<Option<String>>,
}

impl RecordingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent call fails with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.fail_with.lock().unwrap_or_else(|e| e.into_inner()) = Some(message.into());
    }

    pub fn set_transitions(&self, transitions: Vec<Transition>) {
        *self.transitions.lock().unwrap_or_else(|e| e.into_inner()) = transitions;
    }

    pub fn set_active_tickets(&self, tickets: Vec<Ticket>) {
        *self.active_tickets.lock().unwrap_or_else(|e| e.into_inner()) = tickets;
    }

    pub fn calls(&self) -> Vec<TrackerCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, call: TrackerCall) -> Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
        match self
            .fail_with
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            Some(message) => Err(ForemanError::Tracker(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl IssueTracker for RecordingTracker {
    async fn fetch_active_tickets(&self) -> Result<Vec<Ticket>> {
        self.record(TrackerCall::FetchActiveTickets)?;
        Ok(self
            .active_tickets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    async fn assign_issue(&self, key: &str, account_id: &str) -> Result<()> {
        self.record(TrackerCall::Assign {
            key: key.to_string(),
            account_id: account_id.to_string(),
        })
    }

    async fn list_transitions(&self, key: &str) -> Result<Vec<Transition>> {
        self.record(TrackerCall::ListTransitions {
            key: key.to_string(),
        })?;
        Ok(self
            .transitions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    async fn apply_transition(&self, key: &str, transition_id: &str) -> Result<()> {
        self.record(TrackerCall::ApplyTransition {
            key: key.to_string(),
            transition_id: transition_id.to_string(),
        })
    }

    async fn add_comment(&self, key: &str, body: &str) -> Result<()> {
        self.record(TrackerCall::Comment {
            key: key.to_string(),
            body: body.to_string(),
        })
    }
}
