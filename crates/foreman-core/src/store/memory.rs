//! In-memory [`Store`] implementation.
//!
//! Used by the test suites and by advisory-only deployments that run the
//! engine without durable persistence. A single mutex over plain
//! collections; every method is a short critical section.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::AutomationConfig;
use crate::error::{ForemanError, Result};
use crate::types::{
    AutomationAction, AutomationRun, Build, BuildStatus, Commit, DetectionStatus, DetectionType,
    PrState, PullRequest, Sprint, SprintSnapshot, StaleDetection, SyncFailure, TeamMember, Ticket,
};

use super::{ActionFilter, Store};

#[derive(Default)]
struct Inner {
    config: Option<AutomationConfig>,
    runs: Vec<AutomationRun>,
    actions: Vec<AutomationAction>,
    detections: Vec<StaleDetection>,
    snapshots: Vec<SprintSnapshot>,
    failures: Vec<SyncFailure>,
    sprints: Vec<Sprint>,
    tickets: HashMap<String, Ticket>,
    pull_requests: HashMap<String, PullRequest>,
    commits: HashMap<String, Commit>,
    builds: HashMap<String, Build>,
    members: Vec<TeamMember>,
}

#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| ForemanError::Store("memory store lock poisoned".to_string()))
    }
}

impl Store for MemStore {
    fn automation_config(&self) -> Result<AutomationConfig> {
        Ok(self.lock()?.config.clone().unwrap_or_default())
    }

    fn set_automation_config(&self, config: &AutomationConfig) -> Result<()> {
        self.lock()?.config = Some(config.clone());
        Ok(())
    }

    fn insert_run(&self, run: &AutomationRun) -> Result<()> {
        self.lock()?.runs.push(run.clone());
        Ok(())
    }

    fn update_run(&self, run: &AutomationRun) -> Result<()> {
        let mut inner = self.lock()?;
        let existing = inner
            .runs
            .iter_mut()
            .find(|r| r.id == run.id)
            .ok_or(ForemanError::RunNotFound(run.id))?;
        *existing = run.clone();
        Ok(())
    }

    fn list_runs(&self, limit: usize) -> Result<Vec<AutomationRun>> {
        let inner = self.lock()?;
        let mut runs = inner.runs.clone();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);
        Ok(runs)
    }

    fn insert_action(&self, action: &AutomationAction) -> Result<()> {
        self.lock()?.actions.push(action.clone());
        Ok(())
    }

    fn action(&self, id: Uuid) -> Result<Option<AutomationAction>> {
        Ok(self.lock()?.actions.iter().find(|a| a.id == id).cloned())
    }

    fn update_action(&self, action: &AutomationAction) -> Result<()> {
        let mut inner = self.lock()?;
        let existing = inner
            .actions
            .iter_mut()
            .find(|a| a.id == action.id)
            .ok_or(ForemanError::ActionNotFound(action.id))?;
        *existing = action.clone();
        Ok(())
    }

    fn list_actions(&self, filter: &ActionFilter) -> Result<Vec<AutomationAction>> {
        let inner = self.lock()?;
        let mut actions: Vec<_> = inner
            .actions
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        actions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(actions)
    }

    fn find_open_detection(
        &self,
        external_key: &str,
        detection_type: DetectionType,
    ) -> Result<Option<StaleDetection>> {
        Ok(self
            .lock()?
            .detections
            .iter()
            .find(|d| {
                d.status == DetectionStatus::Open
                    && d.external_key == external_key
                    && d.detection_type == detection_type
            })
            .cloned())
    }

    fn insert_detection(&self, detection: &StaleDetection) -> Result<()> {
        self.lock()?.detections.push(detection.clone());
        Ok(())
    }

    fn resolve_detection(&self, id: Uuid) -> Result<()> {
        let mut inner = self.lock()?;
        if let Some(detection) = inner.detections.iter_mut().find(|d| d.id == id) {
            detection.status = DetectionStatus::Resolved;
        }
        Ok(())
    }

    fn insert_snapshot(&self, snapshot: &SprintSnapshot) -> Result<()> {
        self.lock()?.snapshots.push(snapshot.clone());
        Ok(())
    }

    fn snapshots_for_sprint(&self, sprint_id: Uuid) -> Result<Vec<SprintSnapshot>> {
        Ok(self
            .lock()?
            .snapshots
            .iter()
            .filter(|s| s.sprint_id == sprint_id)
            .cloned()
            .collect())
    }

    fn insert_sync_failure(&self, failure: &SyncFailure) -> Result<()> {
        self.lock()?.failures.push(failure.clone());
        Ok(())
    }

    fn list_sync_failures(&self) -> Result<Vec<SyncFailure>> {
        Ok(self.lock()?.failures.clone())
    }

    fn active_sprint(&self) -> Result<Option<Sprint>> {
        Ok(self.lock()?.sprints.iter().find(|s| s.active).cloned())
    }

    fn upsert_sprint(&self, sprint: &Sprint) -> Result<()> {
        let mut inner = self.lock()?;
        match inner.sprints.iter_mut().find(|s| s.id == sprint.id) {
            Some(existing) => *existing = sprint.clone(),
            None => inner.sprints.push(sprint.clone()),
        }
        Ok(())
    }

    fn ticket(&self, key: &str) -> Result<Option<Ticket>> {
        Ok(self.lock()?.tickets.get(key).cloned())
    }

    fn active_tickets(&self) -> Result<Vec<Ticket>> {
        Ok(self
            .lock()?
            .tickets
            .values()
            .filter(|t| !t.status.category.is_terminal())
            .cloned()
            .collect())
    }

    fn sprint_tickets(&self, sprint_id: Uuid) -> Result<Vec<Ticket>> {
        Ok(self
            .lock()?
            .tickets
            .values()
            .filter(|t| t.sprint_id == Some(sprint_id))
            .cloned()
            .collect())
    }

    fn unassigned_backlog(&self) -> Result<Vec<Ticket>> {
        let mut backlog: Vec<_> = self
            .lock()?
            .tickets
            .values()
            .filter(|t| {
                !t.status.category.is_terminal()
                    && t.assignee_id.is_none()
                    && t.sprint_id.is_none()
            })
            .cloned()
            .collect();
        // HashMap iteration order is arbitrary; keep pairing deterministic
        backlog.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(backlog)
    }

    fn upsert_tickets(&self, tickets: &[Ticket]) -> Result<()> {
        let mut inner = self.lock()?;
        for ticket in tickets {
            inner.tickets.insert(ticket.key.clone(), ticket.clone());
        }
        Ok(())
    }

    fn merged_pull_requests(&self) -> Result<Vec<PullRequest>> {
        Ok(self
            .lock()?
            .pull_requests
            .values()
            .filter(|pr| pr.state == PrState::Merged)
            .cloned()
            .collect())
    }

    fn open_pull_requests(&self) -> Result<Vec<PullRequest>> {
        Ok(self
            .lock()?
            .pull_requests
            .values()
            .filter(|pr| pr.state == PrState::Open)
            .cloned()
            .collect())
    }

    fn upsert_pull_requests(&self, prs: &[PullRequest]) -> Result<()> {
        let mut inner = self.lock()?;
        for pr in prs {
            inner.pull_requests.insert(pr.id.clone(), pr.clone());
        }
        Ok(())
    }

    fn commits_since(&self, since: DateTime<Utc>) -> Result<Vec<Commit>> {
        Ok(self
            .lock()?
            .commits
            .values()
            .filter(|c| c.authored_at >= since)
            .cloned()
            .collect())
    }

    fn upsert_commits(&self, commits: &[Commit]) -> Result<()> {
        let mut inner = self.lock()?;
        for commit in commits {
            inner.commits.insert(commit.sha.clone(), commit.clone());
        }
        Ok(())
    }

    fn failed_builds_since(&self, since: DateTime<Utc>) -> Result<Vec<Build>> {
        Ok(self
            .lock()?
            .builds
            .values()
            .filter(|b| b.status == BuildStatus::Failed && b.finished_at >= since)
            .cloned()
            .collect())
    }

    fn upsert_builds(&self, builds: &[Build]) -> Result<()> {
        let mut inner = self.lock()?;
        for build in builds {
            inner.builds.insert(build.id.clone(), build.clone());
        }
        Ok(())
    }

    fn team_members(&self) -> Result<Vec<TeamMember>> {
        Ok(self.lock()?.members.clone())
    }

    fn team_member(&self, id: Uuid) -> Result<Option<TeamMember>> {
        Ok(self.lock()?.members.iter().find(|m| m.id == id).cloned())
    }

    fn upsert_team_members(&self, members: &[TeamMember]) -> Result<()> {
        let mut inner = self.lock()?;
        for member in members {
            match inner.members.iter_mut().find(|m| m.id == member.id) {
                Some(existing) => *existing = member.clone(),
                None => inner.members.push(member.clone()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionKind, ActionStatus, PmAlertPayload, Severity, TicketStatus};
    use crate::types::{AlertSeverity, ModuleName, ProposedAction, StatusCategory};

    fn pm_alert_action() -> AutomationAction {
        AutomationAction::from_proposed(ProposedAction {
            kind: ActionKind::PmAlert(PmAlertPayload {
                team_member_id: Uuid::new_v4(),
                severity: AlertSeverity::Info,
            }),
            check_module: ModuleName::Workload,
            title: "idle engineer".into(),
            description: "no active work".into(),
            confidence: 0.5,
        })
    }

    #[test]
    fn config_defaults_until_written() {
        let store = MemStore::new();
        assert_eq!(store.automation_config().unwrap(), AutomationConfig::default());

        let cfg = AutomationConfig {
            enabled: true,
            ..Default::default()
        };
        store.set_automation_config(&cfg).unwrap();
        assert_eq!(store.automation_config().unwrap(), cfg);
    }

    #[test]
    fn action_filter_by_status() {
        let store = MemStore::new();
        let mut first = pm_alert_action();
        let second = pm_alert_action();
        store.insert_action(&first).unwrap();
        store.insert_action(&second).unwrap();

        first.status = ActionStatus::Approved;
        store.update_action(&first).unwrap();

        let pending = store
            .list_actions(&ActionFilter::status(ActionStatus::Pending))
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second.id);
    }

    #[test]
    fn update_unknown_action_errors() {
        let store = MemStore::new();
        let action = pm_alert_action();
        assert!(matches!(
            store.update_action(&action),
            Err(ForemanError::ActionNotFound(_))
        ));
    }

    #[test]
    fn open_detection_lookup_and_resolution() {
        let store = MemStore::new();
        let detection = StaleDetection::open(
            "FOAM-7",
            DetectionType::StaleInStatus,
            Severity::Medium,
            serde_json::json!({"days": 6}),
            None,
        );
        store.insert_detection(&detection).unwrap();

        assert!(store
            .find_open_detection("FOAM-7", DetectionType::StaleInStatus)
            .unwrap()
            .is_some());
        // different type on same key is not a match
        assert!(store
            .find_open_detection("FOAM-7", DetectionType::PrUnreviewed)
            .unwrap()
            .is_none());

        store.resolve_detection(detection.id).unwrap();
        assert!(store
            .find_open_detection("FOAM-7", DetectionType::StaleInStatus)
            .unwrap()
            .is_none());
    }

    #[test]
    fn backlog_excludes_assigned_and_sprint_tickets() {
        let store = MemStore::new();
        let now = Utc::now();
        let ticket = |key: &str, assignee, sprint| Ticket {
            key: key.to_string(),
            summary: key.to_string(),
            status: TicketStatus::new("To Do", StatusCategory::Todo),
            assignee_id: assignee,
            sprint_id: sprint,
            last_transition_at: now,
            created_at: now,
        };
        store
            .upsert_tickets(&[
                ticket("B-1", None, None),
                ticket("B-2", Some(Uuid::new_v4()), None),
                ticket("B-3", None, Some(Uuid::new_v4())),
            ])
            .unwrap();

        let backlog = store.unassigned_backlog().unwrap();
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].key, "B-1");
    }

    #[test]
    fn list_runs_newest_first_with_limit() {
        let store = MemStore::new();
        let mut old = AutomationRun::started();
        old.started_at = Utc::now() - chrono::Duration::hours(2);
        let recent = AutomationRun::started();
        store.insert_run(&old).unwrap();
        store.insert_run(&recent).unwrap();

        let runs = store.list_runs(1).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, recent.id);
    }
}
