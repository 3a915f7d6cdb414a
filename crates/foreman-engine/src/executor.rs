//! Action executor: applies approved actions against the issue tracker.
//!
//! Advisory action types are no-ops that report success. When no tracker
//! is configured every execution short-circuits to success, which lets
//! the rest of the pipeline run in environments without live tracker
//! credentials. A remote failure never propagates: it is persisted as a
//! `SyncFailure` keyed to the action and surfaced as `success: false`.

use std::sync::Arc;

use foreman_core::keys;
use foreman_core::tracker::{IssueTracker, Transition};
use foreman_core::types::{
    ActionKind, AutomationAction, DetectionType, StaleTicketPayload, StatusCategory, SyncFailure,
};
use foreman_core::{Result, Store};
use uuid::Uuid;

/// Outcome of one execution attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

pub struct Executor {
    store: Arc<dyn Store>,
    tracker: Option<Arc<dyn IssueTracker>>,
}

impl Executor {
    pub fn new(store: Arc<dyn Store>, tracker: Option<Arc<dyn IssueTracker>>) -> Self {
        Self { store, tracker }
    }

    pub async fn execute(&self, action: &AutomationAction) -> ExecutionResult {
        // Advisory-only mode: nothing to do remotely, report success.
        let Some(tracker) = self.tracker.clone() else {
            return ExecutionResult::ok();
        };

        let result = match &action.kind {
            // Advisory types exist purely for human review.
            ActionKind::PmAlert(_)
            | ActionKind::PmSuggestion(_)
            | ActionKind::AccountabilityFlag(_)
            | ActionKind::SlackInsight(_) => Ok(()),
            ActionKind::AssignTicket(p) => {
                self.assign(&tracker, &p.issue_key, p.team_member_id).await
            }
            ActionKind::SprintGapWarning(p) => match &p.issue_key {
                Some(key) => self.assign(&tracker, key, p.team_member_id).await,
                None => Ok(()),
            },
            ActionKind::StaleTicket(p) => self.resolve_stale(&tracker, p).await,
        };

        match result {
            Ok(()) => ExecutionResult::ok(),
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(action_id = %action.id, error = %message, "action execution failed");
                let failure = SyncFailure::for_action(action.id, &message);
                if let Err(persist_err) = self.store.insert_sync_failure(&failure) {
                    tracing::warn!(error = %persist_err, "could not record sync failure");
                }
                ExecutionResult::failed(message)
            }
        }
    }

    /// Assign `key` to the member's tracker account. Missing member or
    /// account resolves to a successful no-op.
    async fn assign(
        &self,
        tracker: &Arc<dyn IssueTracker>,
        key: &str,
        team_member_id: Uuid,
    ) -> Result<()> {
        let Some(member) = self.store.team_member(team_member_id)? else {
            return Ok(());
        };
        let Some(account_id) = &member.tracker_account_id else {
            return Ok(());
        };
        tracker.assign_issue(key, account_id).await
    }

    async fn resolve_stale(
        &self,
        tracker: &Arc<dyn IssueTracker>,
        payload: &StaleTicketPayload,
    ) -> Result<()> {
        let key = &payload.issue_key;
        // Synthetic dedup keys (e.g. "pr:9" for a PR with no ticket
        // reference) have no tracker issue behind them.
        if keys::first_key(key).as_deref() != Some(key.as_str()) {
            return Ok(());
        }
        let transitions = tracker.list_transitions(key).await?;
        if payload.reason == DetectionType::PrMergedTicketOpen {
            if let Some(done) = find_done_transition(&transitions) {
                tracker.apply_transition(key, &done.id).await?;
            }
            tracker
                .add_comment(
                    key,
                    "Automated: linked pull request was merged; moving this ticket to done.",
                )
                .await
        } else {
            if let Some(in_progress) = find_in_progress_transition(&transitions) {
                tracker.apply_transition(key, &in_progress.id).await?;
            }
            // Commenting is unconditional even when no transition matched.
            tracker
                .add_comment(
                    key,
                    &format!(
                        "Automated: flagged as stale ({}). Please update the ticket status.",
                        payload.reason
                    ),
                )
                .await
        }
    }
}

fn find_done_transition(transitions: &[Transition]) -> Option<&Transition> {
    transitions.iter().find(|t| {
        let name = t.name.to_lowercase();
        t.to_category == StatusCategory::Done || name.contains("done") || name.contains("closed")
    })
}

fn find_in_progress_transition(transitions: &[Transition]) -> Option<&Transition> {
    transitions.iter().find(|t| {
        t.to_category == StatusCategory::InProgress
            || t.name.to_lowercase().contains("in progress")
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use foreman_core::store::MemStore;
    use foreman_core::tracker::{RecordingTracker, TrackerCall};
    use foreman_core::types::{
        AlertSeverity, AssignTicketPayload, ModuleName, PmAlertPayload, ProposedAction, TeamMember,
    };

    fn persisted(kind: ActionKind, confidence: f64) -> AutomationAction {
        AutomationAction::from_proposed(ProposedAction {
            kind,
            check_module: ModuleName::StaleTicket,
            title: "t".into(),
            description: "d".into(),
            confidence,
        })
    }

    fn assign_kind(key: &str, member: Uuid) -> ActionKind {
        ActionKind::AssignTicket(AssignTicketPayload {
            issue_key: key.to_string(),
            team_member_id: member,
        })
    }

    #[tokio::test]
    async fn no_tracker_short_circuits_to_success() {
        let store = Arc::new(MemStore::new());
        let executor = Executor::new(store.clone(), None);
        let action = persisted(assign_kind("FOAM-1", Uuid::new_v4()), 0.55);

        let result = executor.execute(&action).await;
        assert_eq!(result, ExecutionResult::ok());
        assert!(store.list_sync_failures().unwrap().is_empty());
    }

    #[tokio::test]
    async fn advisory_actions_never_touch_the_tracker() {
        let store = Arc::new(MemStore::new());
        let tracker = Arc::new(RecordingTracker::new());
        let executor = Executor::new(store, Some(tracker.clone()));
        let action = persisted(
            ActionKind::PmAlert(PmAlertPayload {
                team_member_id: Uuid::new_v4(),
                severity: AlertSeverity::Critical,
            }),
            0.9,
        );

        let result = executor.execute(&action).await;
        assert!(result.success);
        assert!(tracker.calls().is_empty());
    }

    #[tokio::test]
    async fn assign_resolves_member_account() {
        let store = Arc::new(MemStore::new());
        let member = TeamMember {
            id: Uuid::new_v4(),
            name: "ada".into(),
            tracker_account_id: Some("acct-ada".into()),
        };
        store.upsert_team_members(&[member.clone()]).unwrap();
        let tracker = Arc::new(RecordingTracker::new());
        let executor = Executor::new(store, Some(tracker.clone()));

        let result = executor
            .execute(&persisted(assign_kind("FOAM-2", member.id), 0.55))
            .await;
        assert!(result.success);
        assert_eq!(
            tracker.calls(),
            vec![TrackerCall::Assign {
                key: "FOAM-2".into(),
                account_id: "acct-ada".into(),
            }]
        );
    }

    #[tokio::test]
    async fn assign_without_account_is_a_noop() {
        let store = Arc::new(MemStore::new());
        let member = TeamMember {
            id: Uuid::new_v4(),
            name: "noacct".into(),
            tracker_account_id: None,
        };
        store.upsert_team_members(&[member.clone()]).unwrap();
        let tracker = Arc::new(RecordingTracker::new());
        let executor = Executor::new(store, Some(tracker.clone()));

        let result = executor
            .execute(&persisted(assign_kind("FOAM-3", member.id), 0.55))
            .await;
        assert!(result.success);
        assert!(tracker.calls().is_empty());
    }

    #[tokio::test]
    async fn remote_failure_records_sync_failure() {
        let store = Arc::new(MemStore::new());
        let member = TeamMember {
            id: Uuid::new_v4(),
            name: "ada".into(),
            tracker_account_id: Some("acct".into()),
        };
        store.upsert_team_members(&[member.clone()]).unwrap();
        let tracker = Arc::new(RecordingTracker::new());
        tracker.fail_with("connection reset");
        let executor = Executor::new(store.clone(), Some(tracker));

        let action = persisted(assign_kind("FOAM-4", member.id), 0.55);
        let result = executor.execute(&action).await;
        assert!(!result.success);
        assert!(result.error.is_some());

        let failures = store.list_sync_failures().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].entity_type, "automation_action");
        assert_eq!(failures[0].entity_id, action.id.to_string());
    }

    #[tokio::test]
    async fn merged_pr_reason_applies_done_transition_then_comments() {
        let store = Arc::new(MemStore::new());
        let tracker = Arc::new(RecordingTracker::new());
        tracker.set_transitions(vec![
            Transition {
                id: "11".into(),
                name: "Start work".into(),
                to_status: "In Progress".into(),
                to_category: StatusCategory::InProgress,
            },
            Transition {
                id: "31".into(),
                name: "Close".into(),
                to_status: "Done".into(),
                to_category: StatusCategory::Done,
            },
        ]);
        let executor = Executor::new(store, Some(tracker.clone()));

        let action = persisted(
            ActionKind::StaleTicket(StaleTicketPayload {
                issue_key: "FOAM-5".into(),
                reason: DetectionType::PrMergedTicketOpen,
            }),
            0.85,
        );
        assert!(executor.execute(&action).await.success);

        let calls = tracker.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(calls[0], TrackerCall::ListTransitions { .. }));
        assert_eq!(
            calls[1],
            TrackerCall::ApplyTransition {
                key: "FOAM-5".into(),
                transition_id: "31".into(),
            }
        );
        assert!(matches!(calls[2], TrackerCall::Comment { .. }));
    }

    #[tokio::test]
    async fn stale_reason_comments_even_without_matching_transition() {
        let store = Arc::new(MemStore::new());
        let tracker = Arc::new(RecordingTracker::new());
        // no transitions available at all
        let executor = Executor::new(store, Some(tracker.clone()));

        let action = persisted(
            ActionKind::StaleTicket(StaleTicketPayload {
                issue_key: "FOAM-6".into(),
                reason: DetectionType::StaleInStatus,
            }),
            0.65,
        );
        assert!(executor.execute(&action).await.success);

        let calls = tracker.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], TrackerCall::ListTransitions { .. }));
        match &calls[1] {
            TrackerCall::Comment { key, body } => {
                assert_eq!(key, "FOAM-6");
                assert!(body.contains("stale_in_status"));
            }
            other => panic!("expected comment, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn synthetic_key_resolves_without_tracker_calls() {
        let store = Arc::new(MemStore::new());
        let tracker = Arc::new(RecordingTracker::new());
        let executor = Executor::new(store.clone(), Some(tracker.clone()));

        let action = persisted(
            ActionKind::StaleTicket(StaleTicketPayload {
                issue_key: "pr:9".into(),
                reason: DetectionType::PrUnreviewed,
            }),
            0.60,
        );
        let result = executor.execute(&action).await;
        assert!(result.success);
        assert!(tracker.calls().is_empty());
        assert!(store.list_sync_failures().unwrap().is_empty());
    }

    #[tokio::test]
    async fn done_transition_matched_by_name_when_category_is_off() {
        let transitions = vec![Transition {
            id: "9".into(),
            name: "Mark Closed".into(),
            to_status: "Resolved".into(),
            to_category: StatusCategory::InProgress,
        }];
        assert_eq!(find_done_transition(&transitions).map(|t| t.id.as_str()), Some("9"));
    }
}
