//! Durable [`Store`] implementation on redb.
//!
//! # Table design
//!
//! Engine-owned tables (`runs`, `actions`, `detections`, `snapshots`,
//! `sync_failures`) are append-mostly and time-ordered, so they use a
//! 24-byte composite key:
//! ```text
//! [ timestamp_ms: u64 big-endian (8 bytes) | uuid: 16 bytes ]
//! ```
//! Big-endian timestamps in the high bytes make byte order equal
//! timestamp order, so "newest first" is a reverse scan with no sort.
//! The timestamp component is the record's creation time, which never
//! changes, so updates reinsert under the same key.
//!
//! Read-model tables (`tickets`, `pull_requests`, `commits`, `builds`,
//! `sprints`, `members`) are natural-key lookups and use plain string
//! keys. All values are JSON-encoded.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::config::AutomationConfig;
use crate::error::{ForemanError, Result};
use crate::types::{
    AutomationAction, AutomationRun, Build, BuildStatus, Commit, DetectionStatus, DetectionType,
    PrState, PullRequest, Sprint, SprintSnapshot, StaleDetection, SyncFailure, TeamMember, Ticket,
};

use super::{ActionFilter, Store};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const CONFIG: TableDefinition<&str, &[u8]> = TableDefinition::new("config");
const RUNS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("runs");
const ACTIONS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("actions");
const DETECTIONS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("detections");
const SNAPSHOTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("snapshots");
const SYNC_FAILURES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("sync_failures");
const TICKETS: TableDefinition<&str, &[u8]> = TableDefinition::new("tickets");
const PULL_REQUESTS: TableDefinition<&str, &[u8]> = TableDefinition::new("pull_requests");
const COMMITS: TableDefinition<&str, &[u8]> = TableDefinition::new("commits");
const BUILDS: TableDefinition<&str, &[u8]> = TableDefinition::new("builds");
const SPRINTS: TableDefinition<&str, &[u8]> = TableDefinition::new("sprints");
const MEMBERS: TableDefinition<&str, &[u8]> = TableDefinition::new("members");

const CONFIG_KEY: &str = "automation";

fn store_err(e: impl std::fmt::Display) -> ForemanError {
    ForemanError::Store(e.to_string())
}

/// Key: creation timestamp (ms, big-endian) ++ uuid bytes.
fn time_key(ts: DateTime<Utc>, id: Uuid) -> [u8; 24] {
    let mut key = [0u8; 24];
    let ms = ts.timestamp_millis().max(0) as u64;
    key[..8].copy_from_slice(&ms.to_be_bytes());
    key[8..].copy_from_slice(id.as_bytes());
    key
}

// ---------------------------------------------------------------------------
// RedbStore
// ---------------------------------------------------------------------------

pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create the database at `path`, ensuring all tables exist.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).map_err(store_err)?;
        let wt = db.begin_write().map_err(store_err)?;
        wt.open_table(CONFIG).map_err(store_err)?;
        wt.open_table(RUNS).map_err(store_err)?;
        wt.open_table(ACTIONS).map_err(store_err)?;
        wt.open_table(DETECTIONS).map_err(store_err)?;
        wt.open_table(SNAPSHOTS).map_err(store_err)?;
        wt.open_table(SYNC_FAILURES).map_err(store_err)?;
        wt.open_table(TICKETS).map_err(store_err)?;
        wt.open_table(PULL_REQUESTS).map_err(store_err)?;
        wt.open_table(COMMITS).map_err(store_err)?;
        wt.open_table(BUILDS).map_err(store_err)?;
        wt.open_table(SPRINTS).map_err(store_err)?;
        wt.open_table(MEMBERS).map_err(store_err)?;
        wt.commit().map_err(store_err)?;
        Ok(Self { db })
    }

    // --- generic helpers over the two key shapes ---------------------------

    fn put_keyed<T: Serialize>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
        value: &T,
    ) -> Result<()> {
        self.put_keyed_batch(table, std::iter::once((key.to_string(), value)))
    }

    fn put_keyed_batch<'a, T: Serialize + 'a>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        entries: impl IntoIterator<Item = (String, &'a T)>,
    ) -> Result<()> {
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut t = wt.open_table(table).map_err(store_err)?;
            for (key, value) in entries {
                let bytes = serde_json::to_vec(value)?;
                t.insert(key.as_str(), bytes.as_slice()).map_err(store_err)?;
            }
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }

    fn get_keyed<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> Result<Option<T>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let t = rt.open_table(table).map_err(store_err)?;
        match t.get(key).map_err(store_err)? {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    fn scan_keyed<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
    ) -> Result<Vec<T>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let t = rt.open_table(table).map_err(store_err)?;
        let mut out = Vec::new();
        for entry in t.iter().map_err(store_err)? {
            let (_, v) = entry.map_err(store_err)?;
            out.push(serde_json::from_slice(v.value())?);
        }
        Ok(out)
    }

    fn put_timed<T: Serialize>(
        &self,
        table: TableDefinition<&[u8], &[u8]>,
        ts: DateTime<Utc>,
        id: Uuid,
        value: &T,
    ) -> Result<()> {
        let key = time_key(ts, id);
        let bytes = serde_json::to_vec(value)?;
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut t = wt.open_table(table).map_err(store_err)?;
            t.insert(key.as_slice(), bytes.as_slice()).map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }

    /// All records in timestamp order, oldest first.
    fn scan_timed<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&[u8], &[u8]>,
    ) -> Result<Vec<T>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let t = rt.open_table(table).map_err(store_err)?;
        let mut out = Vec::new();
        for entry in t.iter().map_err(store_err)? {
            let (_, v) = entry.map_err(store_err)?;
            out.push(serde_json::from_slice(v.value())?);
        }
        Ok(out)
    }
}

impl Store for RedbStore {
    fn automation_config(&self) -> Result<AutomationConfig> {
        Ok(self
            .get_keyed(CONFIG, CONFIG_KEY)?
            .unwrap_or_default())
    }

    fn set_automation_config(&self, config: &AutomationConfig) -> Result<()> {
        self.put_keyed(CONFIG, CONFIG_KEY, config)
    }

    fn insert_run(&self, run: &AutomationRun) -> Result<()> {
        self.put_timed(RUNS, run.started_at, run.id, run)
    }

    fn update_run(&self, run: &AutomationRun) -> Result<()> {
        let all: Vec<AutomationRun> = self.scan_timed(RUNS)?;
        if !all.iter().any(|r| r.id == run.id) {
            return Err(ForemanError::RunNotFound(run.id));
        }
        // started_at is fixed at creation, so this lands on the same key
        self.put_timed(RUNS, run.started_at, run.id, run)
    }

    fn list_runs(&self, limit: usize) -> Result<Vec<AutomationRun>> {
        let mut runs: Vec<AutomationRun> = self.scan_timed(RUNS)?;
        runs.reverse();
        runs.truncate(limit);
        Ok(runs)
    }

    fn insert_action(&self, action: &AutomationAction) -> Result<()> {
        self.put_timed(ACTIONS, action.created_at, action.id, action)
    }

    fn action(&self, id: Uuid) -> Result<Option<AutomationAction>> {
        let all: Vec<AutomationAction> = self.scan_timed(ACTIONS)?;
        Ok(all.into_iter().find(|a| a.id == id))
    }

    fn update_action(&self, action: &AutomationAction) -> Result<()> {
        if self.action(action.id)?.is_none() {
            return Err(ForemanError::ActionNotFound(action.id));
        }
        self.put_timed(ACTIONS, action.created_at, action.id, action)
    }

    fn list_actions(&self, filter: &ActionFilter) -> Result<Vec<AutomationAction>> {
        let mut actions: Vec<AutomationAction> = self.scan_timed(ACTIONS)?;
        actions.reverse();
        actions.retain(|a| filter.matches(a));
        Ok(actions)
    }

    fn find_open_detection(
        &self,
        external_key: &str,
        detection_type: DetectionType,
    ) -> Result<Option<StaleDetection>> {
        let all: Vec<StaleDetection> = self.scan_timed(DETECTIONS)?;
        Ok(all.into_iter().find(|d| {
            d.status == DetectionStatus::Open
                && d.external_key == external_key
                && d.detection_type == detection_type
        }))
    }

    fn insert_detection(&self, detection: &StaleDetection) -> Result<()> {
        self.put_timed(DETECTIONS, detection.created_at, detection.id, detection)
    }

    fn resolve_detection(&self, id: Uuid) -> Result<()> {
        let all: Vec<StaleDetection> = self.scan_timed(DETECTIONS)?;
        if let Some(mut detection) = all.into_iter().find(|d| d.id == id) {
            detection.status = DetectionStatus::Resolved;
            self.put_timed(DETECTIONS, detection.created_at, detection.id, &detection)?;
        }
        Ok(())
    }

    fn insert_snapshot(&self, snapshot: &SprintSnapshot) -> Result<()> {
        self.put_timed(SNAPSHOTS, snapshot.snapshot_date, snapshot.id, snapshot)
    }

    fn snapshots_for_sprint(&self, sprint_id: Uuid) -> Result<Vec<SprintSnapshot>> {
        let all: Vec<SprintSnapshot> = self.scan_timed(SNAPSHOTS)?;
        Ok(all.into_iter().filter(|s| s.sprint_id == sprint_id).collect())
    }

    fn insert_sync_failure(&self, failure: &SyncFailure) -> Result<()> {
        self.put_timed(SYNC_FAILURES, failure.created_at, failure.id, failure)
    }

    fn list_sync_failures(&self) -> Result<Vec<SyncFailure>> {
        self.scan_timed(SYNC_FAILURES)
    }

    fn active_sprint(&self) -> Result<Option<Sprint>> {
        let all: Vec<Sprint> = self.scan_keyed(SPRINTS)?;
        Ok(all.into_iter().find(|s| s.active))
    }

    fn upsert_sprint(&self, sprint: &Sprint) -> Result<()> {
        self.put_keyed(SPRINTS, &sprint.id.to_string(), sprint)
    }

    fn ticket(&self, key: &str) -> Result<Option<Ticket>> {
        self.get_keyed(TICKETS, key)
    }

    fn active_tickets(&self) -> Result<Vec<Ticket>> {
        let all: Vec<Ticket> = self.scan_keyed(TICKETS)?;
        Ok(all
            .into_iter()
            .filter(|t| !t.status.category.is_terminal())
            .collect())
    }

    fn sprint_tickets(&self, sprint_id: Uuid) -> Result<Vec<Ticket>> {
        let all: Vec<Ticket> = self.scan_keyed(TICKETS)?;
        Ok(all
            .into_iter()
            .filter(|t| t.sprint_id == Some(sprint_id))
            .collect())
    }

    fn unassigned_backlog(&self) -> Result<Vec<Ticket>> {
        // keyed scan is already in key order, so pairing is deterministic
        let all: Vec<Ticket> = self.scan_keyed(TICKETS)?;
        Ok(all
            .into_iter()
            .filter(|t| {
                !t.status.category.is_terminal()
                    && t.assignee_id.is_none()
                    && t.sprint_id.is_none()
            })
            .collect())
    }

    fn upsert_tickets(&self, tickets: &[Ticket]) -> Result<()> {
        self.put_keyed_batch(TICKETS, tickets.iter().map(|t| (t.key.clone(), t)))
    }

    fn merged_pull_requests(&self) -> Result<Vec<PullRequest>> {
        let all: Vec<PullRequest> = self.scan_keyed(PULL_REQUESTS)?;
        Ok(all.into_iter().filter(|pr| pr.state == PrState::Merged).collect())
    }

    fn open_pull_requests(&self) -> Result<Vec<PullRequest>> {
        let all: Vec<PullRequest> = self.scan_keyed(PULL_REQUESTS)?;
        Ok(all.into_iter().filter(|pr| pr.state == PrState::Open).collect())
    }

    fn upsert_pull_requests(&self, prs: &[PullRequest]) -> Result<()> {
        self.put_keyed_batch(PULL_REQUESTS, prs.iter().map(|pr| (pr.id.clone(), pr)))
    }

    fn commits_since(&self, since: DateTime<Utc>) -> Result<Vec<Commit>> {
        let all: Vec<Commit> = self.scan_keyed(COMMITS)?;
        Ok(all.into_iter().filter(|c| c.authored_at >= since).collect())
    }

    fn upsert_commits(&self, commits: &[Commit]) -> Result<()> {
        self.put_keyed_batch(COMMITS, commits.iter().map(|c| (c.sha.clone(), c)))
    }

    fn failed_builds_since(&self, since: DateTime<Utc>) -> Result<Vec<Build>> {
        let all: Vec<Build> = self.scan_keyed(BUILDS)?;
        Ok(all
            .into_iter()
            .filter(|b| b.status == BuildStatus::Failed && b.finished_at >= since)
            .collect())
    }

    fn upsert_builds(&self, builds: &[Build]) -> Result<()> {
        self.put_keyed_batch(BUILDS, builds.iter().map(|b| (b.id.clone(), b)))
    }

    fn team_members(&self) -> Result<Vec<TeamMember>> {
        self.scan_keyed(MEMBERS)
    }

    fn team_member(&self, id: Uuid) -> Result<Option<TeamMember>> {
        self.get_keyed(MEMBERS, &id.to_string())
    }

    fn upsert_team_members(&self, members: &[TeamMember]) -> Result<()> {
        self.put_keyed_batch(MEMBERS, members.iter().map(|m| (m.id.to_string(), m)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
