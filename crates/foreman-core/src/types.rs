//! Data model for the automation engine.
//!
//! Two families of types live here. The *read model* (`Ticket`,
//! `PullRequest`, `Commit`, `Build`, `Sprint`, `TeamMember`) mirrors what
//! the external polling services write into storage. The *engine model*
//! (`ProposedAction`, `AutomationAction`, `AutomationRun`,
//! `StaleDetection`, `SprintSnapshot`, `SyncFailure`) is what the engine
//! itself produces and owns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// StatusCategory
// ---------------------------------------------------------------------------

/// Coarse status bucket a tracker status maps into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    Todo,
    InProgress,
    Done,
}

impl StatusCategory {
    /// `Done` is the only terminal category.
    pub fn is_terminal(self) -> bool {
        matches!(self, StatusCategory::Done)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StatusCategory::Todo => "todo",
            StatusCategory::InProgress => "in_progress",
            StatusCategory::Done => "done",
        }
    }
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Read model
// ---------------------------------------------------------------------------

/// A tracker status as it appears on a ticket: the raw name plus the
/// category it maps into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketStatus {
    pub name: String,
    pub category: StatusCategory,
}

impl TicketStatus {
    pub fn new(name: impl Into<String>, category: StatusCategory) -> Self {
        Self {
            name: name.into(),
            category,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    /// External tracker key, e.g. `FOAM-12`.
    pub key: String,
    pub summary: String,
    pub status: TicketStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sprint_id: Option<Uuid>,
    /// When the ticket last changed status.
    pub last_transition_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrState {
    Open,
    Merged,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: String,
    pub title: String,
    pub branch: String,
    pub state: PrState,
    /// Number of reviewers that approved the current revision.
    pub approving_reviews: u32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub message: String,
    pub authored_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Passed,
    Failed,
    Running,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    pub id: String,
    pub branch: String,
    pub status: BuildStatus,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sprint {
    pub id: Uuid,
    pub name: String,
    pub active: bool,
    pub start_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: Uuid,
    pub name: String,
    /// Account id on the external tracker; `None` means the member cannot
    /// be the target of remote assignments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracker_account_id: Option<String>,
}

// ---------------------------------------------------------------------------
// DetectionType / Severity
// ---------------------------------------------------------------------------

/// Which stale-ticket heuristic produced a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionType {
    PrMergedTicketOpen,
    CommitsNoProgress,
    StaleInStatus,
    PrUnreviewed,
    PipelineFailing,
}

impl DetectionType {
    pub fn as_str(self) -> &'static str {
        match self {
            DetectionType::PrMergedTicketOpen => "pr_merged_ticket_open",
            DetectionType::CommitsNoProgress => "commits_no_progress",
            DetectionType::StaleInStatus => "stale_in_status",
            DetectionType::PrUnreviewed => "pr_unreviewed",
            DetectionType::PipelineFailing => "pipeline_failing",
        }
    }
}

impl fmt::Display for DetectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

// ---------------------------------------------------------------------------
// ActionType / ActionKind
// ---------------------------------------------------------------------------

/// Payload-free discriminant for [`ActionKind`], used in filters and
/// summaries where the payload does not matter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    AssignTicket,
    StaleTicket,
    SprintGapWarning,
    PmAlert,
    PmSuggestion,
    AccountabilityFlag,
    SlackInsight,
}

impl ActionType {
    pub fn all() -> &'static [ActionType] {
        &[
            ActionType::AssignTicket,
            ActionType::StaleTicket,
            ActionType::SprintGapWarning,
            ActionType::PmAlert,
            ActionType::PmSuggestion,
            ActionType::AccountabilityFlag,
            ActionType::SlackInsight,
        ]
    }

    /// Advisory types are surfaced for humans only and never touch the
    /// external tracker.
    pub fn is_advisory(self) -> bool {
        matches!(
            self,
            ActionType::PmAlert
                | ActionType::PmSuggestion
                | ActionType::AccountabilityFlag
                | ActionType::SlackInsight
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::AssignTicket => "assign_ticket",
            ActionType::StaleTicket => "stale_ticket",
            ActionType::SprintGapWarning => "sprint_gap_warning",
            ActionType::PmAlert => "pm_alert",
            ActionType::PmSuggestion => "pm_suggestion",
            ActionType::AccountabilityFlag => "accountability_flag",
            ActionType::SlackInsight => "slack_insight",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionType {
    type Err = crate::error::ForemanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assign_ticket" => Ok(ActionType::AssignTicket),
            "stale_ticket" => Ok(ActionType::StaleTicket),
            "sprint_gap_warning" => Ok(ActionType::SprintGapWarning),
            "pm_alert" => Ok(ActionType::PmAlert),
            "pm_suggestion" => Ok(ActionType::PmSuggestion),
            "accountability_flag" => Ok(ActionType::AccountabilityFlag),
            "slack_insight" => Ok(ActionType::SlackInsight),
            _ => Err(crate::error::ForemanError::Store(format!(
                "unknown action type: {s}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignTicketPayload {
    pub issue_key: String,
    pub team_member_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaleTicketPayload {
    pub issue_key: String,
    pub reason: DetectionType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SprintGapPayload {
    pub team_member_id: Uuid,
    /// Ticket the executor should hand to the engineer, when one was
    /// identified. `None` makes execution a no-op.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_key: Option<String>,
    /// Tickets left on the engineer's plate when the gap was detected.
    pub remaining: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Critical,
    Warning,
    Info,
}

impl AlertSeverity {
    /// Confidence assigned to a `pm_alert` of this severity.
    pub fn confidence(self) -> f64 {
        match self {
            AlertSeverity::Critical => 0.9,
            AlertSeverity::Warning => 0.7,
            AlertSeverity::Info => 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmAlertPayload {
    pub team_member_id: Uuid,
    pub severity: AlertSeverity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmSuggestionPayload {
    pub team_member_id: Uuid,
    pub skill_match: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountabilityPayload {
    pub team_member_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlackInsightPayload {
    pub channel: String,
    pub summary: String,
}

/// Tagged union over action type. Each variant carries its own typed
/// payload, so dispatch in the executor is a `match` instead of runtime
/// key-presence checks on a metadata map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    AssignTicket(AssignTicketPayload),
    StaleTicket(StaleTicketPayload),
    SprintGapWarning(SprintGapPayload),
    PmAlert(PmAlertPayload),
    PmSuggestion(PmSuggestionPayload),
    AccountabilityFlag(AccountabilityPayload),
    SlackInsight(SlackInsightPayload),
}

impl ActionKind {
    pub fn action_type(&self) -> ActionType {
        match self {
            ActionKind::AssignTicket(_) => ActionType::AssignTicket,
            ActionKind::StaleTicket(_) => ActionType::StaleTicket,
            ActionKind::SprintGapWarning(_) => ActionType::SprintGapWarning,
            ActionKind::PmAlert(_) => ActionType::PmAlert,
            ActionKind::PmSuggestion(_) => ActionType::PmSuggestion,
            ActionKind::AccountabilityFlag(_) => ActionType::AccountabilityFlag,
            ActionKind::SlackInsight(_) => ActionType::SlackInsight,
        }
    }
}

// ---------------------------------------------------------------------------
// ModuleName
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleName {
    StaleTicket,
    SprintHealth,
    Workload,
}

impl ModuleName {
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleName::StaleTicket => "stale_ticket",
            ModuleName::SprintHealth => "sprint_health",
            ModuleName::Workload => "workload",
        }
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ProposedAction / ActionStatus / AutomationAction
// ---------------------------------------------------------------------------

/// A candidate correction computed by a check module. Ephemeral: it has
/// no identity until the engine persists it as an [`AutomationAction`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedAction {
    pub kind: ActionKind,
    pub check_module: ModuleName,
    pub title: String,
    pub description: String,
    /// In `[0, 1]`. Drives auto-approval against the configured threshold.
    pub confidence: f64,
}

/// Lifecycle state of a persisted action.
///
/// Transitions: `Pending → {Approved, Rejected}`, `Approved → {Executed, Failed}`.
/// `Rejected`, `Executed`, and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
    Failed,
}

impl ActionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ActionStatus::Rejected | ActionStatus::Executed | ActionStatus::Failed
        )
    }

    pub fn can_transition_to(self, next: ActionStatus) -> bool {
        matches!(
            (self, next),
            (ActionStatus::Pending, ActionStatus::Approved)
                | (ActionStatus::Pending, ActionStatus::Rejected)
                | (ActionStatus::Approved, ActionStatus::Executed)
                | (ActionStatus::Approved, ActionStatus::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Approved => "approved",
            ActionStatus::Rejected => "rejected",
            ActionStatus::Executed => "executed",
            ActionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted [`ProposedAction`] with identity and lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationAction {
    pub id: Uuid,
    #[serde(flatten)]
    pub kind: ActionKind,
    pub check_module: ModuleName,
    pub title: String,
    pub description: String,
    pub confidence: f64,
    pub status: ActionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AutomationAction {
    /// Persist a proposal: assign an id, start `Pending`.
    pub fn from_proposed(proposed: ProposedAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: proposed.kind,
            check_module: proposed.check_module,
            title: proposed.title,
            description: proposed.description,
            confidence: proposed.confidence,
            status: ActionStatus::Pending,
            created_at: Utc::now(),
            executed_at: None,
            error: None,
        }
    }
}

// ---------------------------------------------------------------------------
// AutomationRun
// ---------------------------------------------------------------------------

/// One engine cycle. Append-only history; a run always exists even if
/// every module failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub actions_proposed: u32,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl AutomationRun {
    pub fn started() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            actions_proposed: 0,
            errors: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// StaleDetection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    Open,
    Resolved,
}

/// Dedup record for a stale condition. Invariant: at most one `Open`
/// detection exists per `(external_key, detection_type)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaleDetection {
    pub id: Uuid,
    pub external_key: String,
    pub detection_type: DetectionType,
    pub severity: Severity,
    pub evidence: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_member_id: Option<Uuid>,
    pub status: DetectionStatus,
    pub created_at: DateTime<Utc>,
}

impl StaleDetection {
    pub fn open(
        external_key: impl Into<String>,
        detection_type: DetectionType,
        severity: Severity,
        evidence: serde_json::Value,
        team_member_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_key: external_key.into(),
            detection_type,
            severity,
            evidence,
            team_member_id,
            status: DetectionStatus::Open,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// SprintSnapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineerLoad {
    pub team_member_id: Uuid,
    pub assigned: u32,
    pub completed: u32,
    pub in_progress: u32,
}

impl EngineerLoad {
    /// Tickets assigned but not yet completed.
    pub fn remaining(&self) -> u32 {
        self.assigned.saturating_sub(self.completed)
    }

    /// Underloaded means nearly out of work: fewer than two tickets left,
    /// or nothing actually in progress.
    pub fn is_underloaded(&self) -> bool {
        self.remaining() < 2 || self.in_progress == 0
    }
}

/// Immutable point-in-time rollup of sprint progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprintSnapshot {
    pub id: Uuid,
    pub sprint_id: Uuid,
    pub snapshot_date: DateTime<Utc>,
    pub total_tickets: u32,
    pub completed_tickets: u32,
    pub in_progress_tickets: u32,
    pub todo_tickets: u32,
    pub per_engineer: Vec<EngineerLoad>,
    /// Derived 0-100 completion-trajectory metric.
    pub health_score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_analysis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_remaining: Option<i64>,
}

// ---------------------------------------------------------------------------
// SyncFailure
// ---------------------------------------------------------------------------

/// Record of a failed remote side effect, consumed by a retry pass
/// outside this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncFailure {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: String,
    pub error_message: String,
    pub created_at: DateTime<Utc>,
}

impl SyncFailure {
    pub fn for_action(action_id: Uuid, error_message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_type: "automation_action".to_string(),
            entity_id: action_id.to_string(),
            error_message: error_message.into(),
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_status_transitions() {
        assert!(ActionStatus::Pending.can_transition_to(ActionStatus::Approved));
        assert!(ActionStatus::Pending.can_transition_to(ActionStatus::Rejected));
        assert!(ActionStatus::Approved.can_transition_to(ActionStatus::Executed));
        assert!(ActionStatus::Approved.can_transition_to(ActionStatus::Failed));

        assert!(!ActionStatus::Pending.can_transition_to(ActionStatus::Executed));
        assert!(!ActionStatus::Approved.can_transition_to(ActionStatus::Rejected));
        assert!(!ActionStatus::Rejected.can_transition_to(ActionStatus::Approved));
        assert!(!ActionStatus::Executed.can_transition_to(ActionStatus::Failed));
    }

    #[test]
    fn terminal_states() {
        assert!(!ActionStatus::Pending.is_terminal());
        assert!(!ActionStatus::Approved.is_terminal());
        assert!(ActionStatus::Rejected.is_terminal());
        assert!(ActionStatus::Executed.is_terminal());
        assert!(ActionStatus::Failed.is_terminal());
    }

    #[test]
    fn action_kind_wire_format() {
        let kind = ActionKind::StaleTicket(StaleTicketPayload {
            issue_key: "FOAM-12".to_string(),
            reason: DetectionType::PrMergedTicketOpen,
        });
        let v = serde_json::to_value(&kind).unwrap();
        assert_eq!(v["type"], "stale_ticket");
        assert_eq!(v["issue_key"], "FOAM-12");
        assert_eq!(v["reason"], "pr_merged_ticket_open");
    }

    #[test]
    fn action_type_roundtrip() {
        use std::str::FromStr;
        for ty in ActionType::all() {
            assert_eq!(ActionType::from_str(ty.as_str()).unwrap(), *ty);
        }
    }

    #[test]
    fn advisory_types() {
        assert!(ActionType::PmAlert.is_advisory());
        assert!(ActionType::SlackInsight.is_advisory());
        assert!(!ActionType::AssignTicket.is_advisory());
        assert!(!ActionType::StaleTicket.is_advisory());
        assert!(!ActionType::SprintGapWarning.is_advisory());
    }

    #[test]
    fn from_proposed_starts_pending() {
        let action = AutomationAction::from_proposed(ProposedAction {
            kind: ActionKind::PmAlert(PmAlertPayload {
                team_member_id: Uuid::new_v4(),
                severity: AlertSeverity::Warning,
            }),
            check_module: ModuleName::Workload,
            title: "t".into(),
            description: "d".into(),
            confidence: 0.7,
        });
        assert_eq!(action.status, ActionStatus::Pending);
        assert!(action.executed_at.is_none());
        assert!(action.error.is_none());
    }

    #[test]
    fn engineer_load_underload() {
        let load = |assigned, completed, in_progress| EngineerLoad {
            team_member_id: Uuid::new_v4(),
            assigned,
            completed,
            in_progress,
        };
        // 1 remaining, 0 in progress
        assert!(load(1, 0, 0).is_underloaded());
        // everything done
        assert!(load(4, 4, 0).is_underloaded());
        // plenty remaining but idle
        assert!(load(5, 1, 0).is_underloaded());
        // healthy
        assert!(!load(5, 1, 2).is_underloaded());
    }

    #[test]
    fn sync_failure_for_action_links_entity() {
        let id = Uuid::new_v4();
        let failure = SyncFailure::for_action(id, "timeout");
        assert_eq!(failure.entity_type, "automation_action");
        assert_eq!(failure.entity_id, id.to_string());
    }
}
