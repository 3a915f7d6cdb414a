//! Storage contract for the automation engine.
//!
//! The engine calls storage synchronously; latency budgets are the
//! implementation's concern. Two implementations ship: [`RedbStore`]
//! for durable single-file persistence and [`MemStore`] for tests and
//! advisory-only deployments.
//!
//! The read-model write methods (`upsert_*`) are the contract the
//! external polling services use to feed data in; the engine itself only
//! reads that side, except for the workload check's best-effort ticket
//! pre-sync.

pub mod memory;
pub mod redb;

pub use memory::MemStore;
pub use redb::RedbStore;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::AutomationConfig;
use crate::error::Result;
use crate::types::{
    ActionStatus, ActionType, AutomationAction, AutomationRun, Build, Commit, DetectionType,
    PullRequest, Sprint, SprintSnapshot, StaleDetection, SyncFailure, TeamMember, Ticket,
};

/// Filter for [`Store::list_actions`]. Empty filter matches everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionFilter {
    pub status: Option<ActionStatus>,
    pub action_type: Option<ActionType>,
}

impl ActionFilter {
    pub fn status(status: ActionStatus) -> Self {
        Self {
            status: Some(status),
            action_type: None,
        }
    }

    pub fn matches(&self, action: &AutomationAction) -> bool {
        self.status.map_or(true, |s| action.status == s)
            && self
                .action_type
                .map_or(true, |t| action.kind.action_type() == t)
    }
}

pub trait Store: Send + Sync {
    // --- config -----------------------------------------------------------

    /// The single config row; defaults if never written.
    fn automation_config(&self) -> Result<AutomationConfig>;
    fn set_automation_config(&self, config: &AutomationConfig) -> Result<()>;

    // --- runs -------------------------------------------------------------

    fn insert_run(&self, run: &AutomationRun) -> Result<()>;
    /// Overwrite the run record (used to finalize `finished_at`, counts,
    /// and errors). Errors if the run was never inserted.
    fn update_run(&self, run: &AutomationRun) -> Result<()>;
    /// Newest first.
    fn list_runs(&self, limit: usize) -> Result<Vec<AutomationRun>>;

    // --- actions ----------------------------------------------------------

    fn insert_action(&self, action: &AutomationAction) -> Result<()>;
    fn action(&self, id: Uuid) -> Result<Option<AutomationAction>>;
    fn update_action(&self, action: &AutomationAction) -> Result<()>;
    /// Newest first.
    fn list_actions(&self, filter: &ActionFilter) -> Result<Vec<AutomationAction>>;

    // --- detections -------------------------------------------------------

    fn find_open_detection(
        &self,
        external_key: &str,
        detection_type: DetectionType,
    ) -> Result<Option<StaleDetection>>;
    fn insert_detection(&self, detection: &StaleDetection) -> Result<()>;
    /// Mark a detection resolved. Called by the polling services once the
    /// underlying condition clears, which re-arms the heuristic.
    fn resolve_detection(&self, id: Uuid) -> Result<()>;

    // --- snapshots --------------------------------------------------------

    fn insert_snapshot(&self, snapshot: &SprintSnapshot) -> Result<()>;
    fn snapshots_for_sprint(&self, sprint_id: Uuid) -> Result<Vec<SprintSnapshot>>;

    // --- sync failures ----------------------------------------------------

    fn insert_sync_failure(&self, failure: &SyncFailure) -> Result<()>;
    fn list_sync_failures(&self) -> Result<Vec<SyncFailure>>;

    // --- read model -------------------------------------------------------

    fn active_sprint(&self) -> Result<Option<Sprint>>;
    fn upsert_sprint(&self, sprint: &Sprint) -> Result<()>;

    fn ticket(&self, key: &str) -> Result<Option<Ticket>>;
    /// All tickets whose status is not terminal.
    fn active_tickets(&self) -> Result<Vec<Ticket>>;
    fn sprint_tickets(&self, sprint_id: Uuid) -> Result<Vec<Ticket>>;
    /// Non-terminal tickets with no assignee and no sprint.
    fn unassigned_backlog(&self) -> Result<Vec<Ticket>>;
    fn upsert_tickets(&self, tickets: &[Ticket]) -> Result<()>;

    fn merged_pull_requests(&self) -> Result<Vec<PullRequest>>;
    fn open_pull_requests(&self) -> Result<Vec<PullRequest>>;
    fn upsert_pull_requests(&self, prs: &[PullRequest]) -> Result<()>;

    fn commits_since(&self, since: DateTime<Utc>) -> Result<Vec<Commit>>;
    fn upsert_commits(&self, commits: &[Commit]) -> Result<()>;

    fn failed_builds_since(&self, since: DateTime<Utc>) -> Result<Vec<Build>>;
    fn upsert_builds(&self, builds: &[Build]) -> Result<()>;

    fn team_members(&self) -> Result<Vec<TeamMember>>;
    fn team_member(&self, id: Uuid) -> Result<Option<TeamMember>>;
    fn upsert_team_members(&self, members: &[TeamMember]) -> Result<()>;
}
