//! Check-module framework.
//!
//! A check module is a unit of detection logic: given a shared context it
//! inspects current state and returns zero or more proposed actions. The
//! engine treats modules as independent (one module failing never aborts
//! the cycle) and runs them strictly in sequence so later modules can
//! observe earlier writes.

pub mod sprint;
pub mod stale;
pub mod workload;

pub use sprint::SprintHealthCheck;
pub use stale::StaleTicketCheck;
pub use workload::WorkloadCheck;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use foreman_core::insight::InsightService;
use foreman_core::tracker::IssueTracker;
use foreman_core::types::{ModuleName, ProposedAction};
use foreman_core::{Result, Store};

/// Shared context for one cycle. All collaborators are resolved at
/// construction; absent ones are explicit `None`, never a lookup that
/// might fail mid-run.
#[derive(Clone)]
pub struct CheckContext {
    pub run_id: Uuid,
    /// Single observation instant for the whole cycle, so every heuristic
    /// window is measured against the same clock reading.
    pub now: DateTime<Utc>,
    pub store: Arc<dyn Store>,
    pub tracker: Option<Arc<dyn IssueTracker>>,
    pub insight: Option<Arc<dyn InsightService>>,
}

impl CheckContext {
    pub fn new(
        run_id: Uuid,
        store: Arc<dyn Store>,
        tracker: Option<Arc<dyn IssueTracker>>,
        insight: Option<Arc<dyn InsightService>>,
    ) -> Self {
        Self {
            run_id,
            now: Utc::now(),
            store,
            tracker,
            insight,
        }
    }
}

#[async_trait]
pub trait CheckModule: Send + Sync {
    fn name(&self) -> ModuleName;

    fn enabled(&self) -> bool {
        true
    }

    /// Inspect current state and propose corrective actions. Side-effecting
    /// reads the module performs itself (e.g. a pre-sync) must be caught
    /// internally; an `Err` from `run` is recorded on the cycle's run
    /// record and the remaining modules still execute.
    async fn run(&self, ctx: &CheckContext) -> Result<Vec<ProposedAction>>;

    /// Whether this module allows `proposed` to skip human approval. The
    /// engine additionally requires the configured confidence threshold.
    fn auto_approve(&self, proposed: &ProposedAction) -> bool {
        let _ = proposed;
        false
    }
}
