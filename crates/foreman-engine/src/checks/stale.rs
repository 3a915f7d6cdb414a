//! Stale-ticket check: five independent heuristics linking source-control
//! and pipeline activity back to tracker tickets.
//!
//! Each heuristic is idempotent: before proposing anything it looks for
//! an open detection with the same `(external_key, detection_type)` pair
//! and skips creation when one exists. Detections stay open until the
//! polling services observe the condition clearing, so an unchanged input
//! state never produces the same proposal twice.

use async_trait::async_trait;
use chrono::Duration;
use serde_json::json;

use foreman_core::keys;
use foreman_core::types::{
    ActionKind, DetectionType, ModuleName, ProposedAction, Severity, StaleDetection,
    StaleTicketPayload, StatusCategory,
};
use foreman_core::Result;
use uuid::Uuid;

use super::{CheckContext, CheckModule};

const STALE_STATUS_DAYS: i64 = 5;
const COMMIT_WINDOW_DAYS: i64 = 3;
const REVIEW_WAIT_HOURS: i64 = 48;
const BUILD_WINDOW_DAYS: i64 = 3;

#[derive(Debug, Default)]
pub struct StaleTicketCheck;

impl StaleTicketCheck {
    pub fn new() -> Self {
        Self
    }

    /// Record an open detection unless one already exists for the pair.
    /// Returns whether a new detection (and therefore a proposal) is due.
    fn detect(
        ctx: &CheckContext,
        external_key: &str,
        detection_type: DetectionType,
        severity: Severity,
        evidence: serde_json::Value,
        team_member_id: Option<Uuid>,
    ) -> Result<bool> {
        if ctx
            .store
            .find_open_detection(external_key, detection_type)?
            .is_some()
        {
            return Ok(false);
        }
        let mut detection = StaleDetection::open(
            external_key,
            detection_type,
            severity,
            evidence,
            team_member_id,
        );
        detection.created_at = ctx.now;
        ctx.store.insert_detection(&detection)?;
        Ok(true)
    }

    fn stale_proposal(
        issue_key: &str,
        reason: DetectionType,
        title: String,
        description: String,
        confidence: f64,
    ) -> ProposedAction {
        ProposedAction {
            kind: ActionKind::StaleTicket(StaleTicketPayload {
                issue_key: issue_key.to_string(),
                reason,
            }),
            check_module: ModuleName::StaleTicket,
            title,
            description,
            confidence,
        }
    }

    /// Heuristic 1: a merged PR references a ticket that never reached a
    /// terminal status.
    fn merged_pr_ticket_open(
        ctx: &CheckContext,
        proposals: &mut Vec<ProposedAction>,
    ) -> Result<()> {
        for pr in ctx.store.merged_pull_requests()? {
            for key in referenced_keys(&pr.title, &pr.branch) {
                let Some(ticket) = ctx.store.ticket(&key)? else {
                    continue;
                };
                if ticket.status.category.is_terminal() {
                    continue;
                }
                let evidence = json!({
                    "pr_id": pr.id,
                    "merged_at": pr.merged_at,
                    "ticket_status": ticket.status.name,
                });
                if Self::detect(
                    ctx,
                    &key,
                    DetectionType::PrMergedTicketOpen,
                    Severity::High,
                    evidence,
                    ticket.assignee_id,
                )? {
                    proposals.push(Self::stale_proposal(
                        &key,
                        DetectionType::PrMergedTicketOpen,
                        format!("{key}: PR merged, ticket still open"),
                        format!(
                            "Pull request {} is merged but {key} is still '{}'.",
                            pr.id, ticket.status.name
                        ),
                        0.85,
                    ));
                }
            }
        }
        Ok(())
    }

    /// Heuristic 2: recent commits reference a ticket that never left its
    /// initial status.
    fn commits_without_progress(
        ctx: &CheckContext,
        proposals: &mut Vec<ProposedAction>,
    ) -> Result<()> {
        let since = ctx.now - Duration::days(COMMIT_WINDOW_DAYS);
        for commit in ctx.store.commits_since(since)? {
            for key in keys::extract_keys(&commit.message) {
                let Some(ticket) = ctx.store.ticket(&key)? else {
                    continue;
                };
                if ticket.status.category != StatusCategory::Todo {
                    continue;
                }
                let evidence = json!({
                    "commit": commit.sha,
                    "authored_at": commit.authored_at,
                    "ticket_status": ticket.status.name,
                });
                if Self::detect(
                    ctx,
                    &key,
                    DetectionType::CommitsNoProgress,
                    Severity::Medium,
                    evidence,
                    ticket.assignee_id,
                )? {
                    proposals.push(Self::stale_proposal(
                        &key,
                        DetectionType::CommitsNoProgress,
                        format!("{key}: commits landing, status unchanged"),
                        format!(
                            "Commit {} references {key} but the ticket is still '{}'.",
                            commit.sha, ticket.status.name
                        ),
                        0.70,
                    ));
                }
            }
        }
        Ok(())
    }

    /// Heuristic 3: a ticket sat in a non-terminal status for over five
    /// days with no commit activity in that window.
    fn stale_in_status(ctx: &CheckContext, proposals: &mut Vec<ProposedAction>) -> Result<()> {
        let cutoff = ctx.now - Duration::days(STALE_STATUS_DAYS);
        let window_commits = ctx.store.commits_since(cutoff)?;
        for ticket in ctx.store.active_tickets()? {
            if ticket.last_transition_at > cutoff {
                continue;
            }
            let has_activity = window_commits
                .iter()
                .any(|c| keys::extract_keys(&c.message).contains(&ticket.key));
            if has_activity {
                continue;
            }
            let evidence = json!({
                "last_transition_at": ticket.last_transition_at,
                "status": ticket.status.name,
            });
            if Self::detect(
                ctx,
                &ticket.key,
                DetectionType::StaleInStatus,
                Severity::Medium,
                evidence,
                ticket.assignee_id,
            )? {
                proposals.push(Self::stale_proposal(
                    &ticket.key,
                    DetectionType::StaleInStatus,
                    format!("{}: no movement for {STALE_STATUS_DAYS}+ days", ticket.key),
                    format!(
                        "{} has been '{}' since {} with no commit activity.",
                        ticket.key, ticket.status.name, ticket.last_transition_at
                    ),
                    0.65,
                ));
            }
        }
        Ok(())
    }

    /// Heuristic 4: an open PR waited 48h without a single approval.
    fn unreviewed_prs(ctx: &CheckContext, proposals: &mut Vec<ProposedAction>) -> Result<()> {
        let cutoff = ctx.now - Duration::hours(REVIEW_WAIT_HOURS);
        for pr in ctx.store.open_pull_requests()? {
            if pr.created_at > cutoff || pr.approving_reviews > 0 {
                continue;
            }
            // Fall back to a synthetic key so PRs without a ticket
            // reference still dedup across cycles.
            let key = keys::first_key(&pr.title)
                .or_else(|| keys::first_key(&pr.branch))
                .unwrap_or_else(|| format!("pr:{}", pr.id));
            let evidence = json!({
                "pr_id": pr.id,
                "created_at": pr.created_at,
            });
            if Self::detect(
                ctx,
                &key,
                DetectionType::PrUnreviewed,
                Severity::Low,
                evidence,
                None,
            )? {
                proposals.push(Self::stale_proposal(
                    &key,
                    DetectionType::PrUnreviewed,
                    format!("PR {} has no review after {REVIEW_WAIT_HOURS}h", pr.id),
                    format!(
                        "Pull request '{}' has been open since {} with zero approvals.",
                        pr.title, pr.created_at
                    ),
                    0.60,
                ));
            }
        }
        Ok(())
    }

    /// Heuristic 5: a recent failed build on a branch that embeds a
    /// ticket key.
    fn failing_pipelines(ctx: &CheckContext, proposals: &mut Vec<ProposedAction>) -> Result<()> {
        let since = ctx.now - Duration::days(BUILD_WINDOW_DAYS);
        for build in ctx.store.failed_builds_since(since)? {
            let Some(key) = keys::first_key(&build.branch) else {
                continue;
            };
            let assignee = ctx.store.ticket(&key)?.and_then(|t| t.assignee_id);
            let evidence = json!({
                "build_id": build.id,
                "branch": build.branch,
                "finished_at": build.finished_at,
            });
            if Self::detect(
                ctx,
                &key,
                DetectionType::PipelineFailing,
                Severity::High,
                evidence,
                assignee,
            )? {
                proposals.push(Self::stale_proposal(
                    &key,
                    DetectionType::PipelineFailing,
                    format!("{key}: pipeline failing on its branch"),
                    format!(
                        "Build {} failed on branch '{}' referencing {key}.",
                        build.id, build.branch
                    ),
                    0.75,
                ));
            }
        }
        Ok(())
    }
}

/// Keys referenced by a PR, from its title first, then its branch.
fn referenced_keys(title: &str, branch: &str) -> Vec<String> {
    let mut keys = keys::extract_keys(title);
    for key in keys::extract_keys(branch) {
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

#[async_trait]
impl CheckModule for StaleTicketCheck {
    fn name(&self) -> ModuleName {
        ModuleName::StaleTicket
    }

    async fn run(&self, ctx: &CheckContext) -> Result<Vec<ProposedAction>> {
        let mut proposals = Vec::new();
        Self::merged_pr_ticket_open(ctx, &mut proposals)?;
        Self::commits_without_progress(ctx, &mut proposals)?;
        Self::stale_in_status(ctx, &mut proposals)?;
        Self::unreviewed_prs(ctx, &mut proposals)?;
        Self::failing_pipelines(ctx, &mut proposals)?;
        Ok(proposals)
    }

    /// Only the merged-PR heuristic is trusted enough to skip a human.
    fn auto_approve(&self, proposed: &ProposedAction) -> bool {
        matches!(
            &proposed.kind,
            ActionKind::StaleTicket(p) if p.reason == DetectionType::PrMergedTicketOpen
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
