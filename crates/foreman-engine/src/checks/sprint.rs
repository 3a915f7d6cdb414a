//! Sprint-health check: snapshot the active sprint, score it, and flag
//! engineers who are about to run out of work.

use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

use foreman_core::types::{
    ActionKind, AssignTicketPayload, EngineerLoad, ModuleName, ProposedAction, SprintGapPayload,
    SprintSnapshot, StatusCategory, Ticket,
};
use foreman_core::Result;

use super::{CheckContext, CheckModule};

/// Most backlog pairings proposed per cycle.
const MAX_BACKLOG_PAIRINGS: usize = 3;

#[derive(Debug, Default)]
pub struct SprintHealthCheck;

impl SprintHealthCheck {
    pub fn new() -> Self {
        Self
    }
}

/// Health score in [0, 100]: completion weighted 60, in-progress weighted
/// 40, +5 when anything is actually moving, -15 when more than half the
/// engineers are underloaded.
fn health_score(
    total: u32,
    completed: u32,
    in_progress: u32,
    engineers: usize,
    underloaded: usize,
) -> u8 {
    if total == 0 {
        return 0;
    }
    let completion_rate = f64::from(completed) / f64::from(total);
    let progress_rate = f64::from(in_progress) / f64::from(total);
    let mut score = (completion_rate * 60.0 + progress_rate * 40.0).round() as i32;
    if in_progress > 0 {
        score += 5;
    }
    if engineers > 0 && underloaded * 2 > engineers {
        score -= 15;
    }
    score.clamp(0, 100) as u8
}

fn engineer_loads(tickets: &[Ticket]) -> Vec<EngineerLoad> {
    let mut by_engineer: HashMap<Uuid, EngineerLoad> = HashMap::new();
    for ticket in tickets {
        let Some(assignee) = ticket.assignee_id else {
            continue;
        };
        let load = by_engineer.entry(assignee).or_insert(EngineerLoad {
            team_member_id: assignee,
            assigned: 0,
            completed: 0,
            in_progress: 0,
        });
        load.assigned += 1;
        match ticket.status.category {
            StatusCategory::Done => load.completed += 1,
            StatusCategory::InProgress => load.in_progress += 1,
            StatusCategory::Todo => {}
        }
    }
    let mut loads: Vec<_> = by_engineer.into_values().collect();
    // HashMap order is arbitrary; keep snapshots and pairings stable
    loads.sort_by_key(|l| l.team_member_id);
    loads
}

#[async_trait]
impl CheckModule for SprintHealthCheck {
    fn name(&self) -> ModuleName {
        ModuleName::SprintHealth
    }

    async fn run(&self, ctx: &CheckContext) -> Result<Vec<ProposedAction>> {
        // No active sprint is a normal state, not an error.
        let Some(sprint) = ctx.store.active_sprint()? else {
            return Ok(Vec::new());
        };
        let tickets = ctx.store.sprint_tickets(sprint.id)?;

        let total = tickets.len() as u32;
        let completed = tickets
            .iter()
            .filter(|t| t.status.category == StatusCategory::Done)
            .count() as u32;
        let in_progress = tickets
            .iter()
            .filter(|t| t.status.category == StatusCategory::InProgress)
            .count() as u32;
        let todo = total - completed - in_progress;

        let loads = engineer_loads(&tickets);
        let underloaded: Vec<&EngineerLoad> =
            loads.iter().filter(|l| l.is_underloaded()).collect();

        let mut snapshot = SprintSnapshot {
            id: Uuid::new_v4(),
            sprint_id: sprint.id,
            snapshot_date: ctx.now,
            total_tickets: total,
            completed_tickets: completed,
            in_progress_tickets: in_progress,
            todo_tickets: todo,
            per_engineer: loads.clone(),
            health_score: health_score(total, completed, in_progress, loads.len(), underloaded.len()),
            ai_analysis: None,
            days_remaining: sprint.end_date.map(|end| (end - ctx.now).num_days()),
        };

        // Trajectory summary is best-effort: a missing or failing insight
        // service leaves ai_analysis empty and never fails the module.
        if let Some(insight) = &ctx.insight {
            match insight.sprint_summary(&snapshot).await {
                Ok(summary) => snapshot.ai_analysis = Some(summary),
                Err(e) => {
                    tracing::warn!(sprint = %sprint.name, error = %e, "sprint summary unavailable");
                }
            }
        }
        ctx.store.insert_snapshot(&snapshot)?;

        let mut proposals = Vec::new();
        for load in &underloaded {
            let remaining = load.remaining();
            let confidence = if remaining == 0 { 0.85 } else { 0.65 };
            proposals.push(ProposedAction {
                kind: ActionKind::SprintGapWarning(SprintGapPayload {
                    team_member_id: load.team_member_id,
                    issue_key: None,
                    remaining,
                }),
                check_module: ModuleName::SprintHealth,
                title: format!("Engineer running out of sprint work ({remaining} left)"),
                description: format!(
                    "Sprint '{}': {} assigned, {} completed, {} in progress.",
                    sprint.name, load.assigned, load.completed, load.in_progress
                ),
                confidence,
            });
        }

        // Pair underloaded engineers with unassigned backlog items, one
        // item per engineer, consuming the backlog without replacement.
        if !underloaded.is_empty() {
            let backlog = ctx.store.unassigned_backlog()?;
            for (load, item) in underloaded
                .iter()
                .zip(backlog.iter())
                .take(MAX_BACKLOG_PAIRINGS)
            {
                proposals.push(ProposedAction {
                    kind: ActionKind::AssignTicket(AssignTicketPayload {
                        issue_key: item.key.clone(),
                        team_member_id: load.team_member_id,
                    }),
                    check_module: ModuleName::SprintHealth,
                    title: format!("Assign {} to fill a sprint gap", item.key),
                    description: format!("Backlog item '{}' ({}).", item.summary, item.key),
                    confidence: 0.55,
                });
            }
        }

        tracing::debug!(
            sprint = %sprint.name,
            health = snapshot.health_score,
            gaps = underloaded.len(),
            "sprint health computed"
        );

        Ok(proposals)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use foreman_core::insight::FixedInsight;
    use foreman_core::store::MemStore;
    use foreman_core::types::{Sprint, TicketStatus};
    use foreman_core::Store;
    use std::sync::Arc;

    fn sprint() -> Sprint {
        Sprint {
            id: Uuid::new_v4(),
            name: "Sprint 9".to_string(),
            active: true,
            start_date: Utc::now() - Duration::days(7),
            end_date: Some(Utc::now() + Duration::days(7)),
        }
    }

    fn sprint_ticket(
        key: &str,
        sprint_id: Uuid,
        assignee: Uuid,
        category: StatusCategory,
    ) -> Ticket {
        let now = Utc::now();
        Ticket {
            key: key.to_string(),
            summary: key.to_string(),
            status: TicketStatus::new("status", category),
            assignee_id: Some(assignee),
            sprint_id: Some(sprint_id),
            last_transition_at: now,
            created_at: now,
        }
    }

    /// 10 tickets: busy engineer holds 9 (6 done, 2 in progress, 1 todo),
    /// idle engineer holds 1 todo.
    fn seed_scenario(store: &MemStore) -> (Sprint, Uuid, Uuid) {
        let s = sprint();
        store.upsert_sprint(&s).unwrap();
        let busy = Uuid::new_v4();
        let idle = Uuid::new_v4();
        let mut tickets = Vec::new();
        for i in 0..6 {
            tickets.push(sprint_ticket(&format!("S-{i}"), s.id, busy, StatusCategory::Done));
        }
        for i in 6..8 {
            tickets.push(sprint_ticket(
                &format!("S-{i}"),
                s.id,
                busy,
                StatusCategory::InProgress,
            ));
        }
        tickets.push(sprint_ticket("S-8", s.id, busy, StatusCategory::Todo));
        tickets.push(sprint_ticket("S-9", s.id, idle, StatusCategory::Todo));
        store.upsert_tickets(&tickets).unwrap();
        (s, busy, idle)
    }

    #[tokio::test]
    async fn no_active_sprint_returns_no_actions() {
        let store = Arc::new(MemStore::new());
        let ctx = CheckContext::new(Uuid::new_v4(), store, None, None);
        let proposals = SprintHealthCheck::new().run(&ctx).await.unwrap();
        assert!(proposals.is_empty());
    }

    #[tokio::test]
    async fn underloaded_engineer_gets_gap_warning() {
        let store = Arc::new(MemStore::new());
        let (s, _busy, idle) = seed_scenario(&store);

        let ctx = CheckContext::new(Uuid::new_v4(), store.clone(), None, None);
        let proposals = SprintHealthCheck::new().run(&ctx).await.unwrap();

        let gaps: Vec<_> = proposals
            .iter()
            .filter_map(|p| match &p.kind {
                ActionKind::SprintGapWarning(g) => Some((g, p.confidence)),
                _ => None,
            })
            .collect();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].0.team_member_id, idle);
        assert_eq!(gaps[0].0.remaining, 1);
        // remaining = 1, not 0, so confidence is the lower tier
        assert_eq!(gaps[0].1, 0.65);

        let snapshots = store.snapshots_for_sprint(s.id).unwrap();
        assert_eq!(snapshots.len(), 1);
        // 6/10 done, 2/10 in progress: 36 + 8 + 5 = 49
        assert_eq!(snapshots[0].health_score, 49);
        assert_eq!(snapshots[0].todo_tickets, 2);
    }

    #[tokio::test]
    async fn backlog_pairing_has_no_duplicates() {
        let store = Arc::new(MemStore::new());
        let s = sprint();
        store.upsert_sprint(&s).unwrap();
        // four idle engineers, each with one completed ticket
        let engineers: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let mut tickets = Vec::new();
        for (i, e) in engineers.iter().enumerate() {
            tickets.push(sprint_ticket(&format!("S-{i}"), s.id, *e, StatusCategory::Done));
        }
        store.upsert_tickets(&tickets).unwrap();
        // five unassigned backlog items
        let now = Utc::now();
        let backlog: Vec<Ticket> = (0..5)
            .map(|i| Ticket {
                key: format!("B-{i}"),
                summary: format!("backlog {i}"),
                status: TicketStatus::new("To Do", StatusCategory::Todo),
                assignee_id: None,
                sprint_id: None,
                last_transition_at: now,
                created_at: now,
            })
            .collect();
        store.upsert_tickets(&backlog).unwrap();

        let ctx = CheckContext::new(Uuid::new_v4(), store, None, None);
        let proposals = SprintHealthCheck::new().run(&ctx).await.unwrap();

        let pairings: Vec<&AssignTicketPayload> = proposals
            .iter()
            .filter_map(|p| match &p.kind {
                ActionKind::AssignTicket(a) => Some(a),
                _ => None,
            })
            .collect();
        assert_eq!(pairings.len(), MAX_BACKLOG_PAIRINGS);
        let mut members: Vec<_> = pairings.iter().map(|p| p.team_member_id).collect();
        let mut keys: Vec<_> = pairings.iter().map(|p| p.issue_key.clone()).collect();
        members.dedup();
        keys.dedup();
        assert_eq!(members.len(), MAX_BACKLOG_PAIRINGS);
        assert_eq!(keys.len(), MAX_BACKLOG_PAIRINGS);
        for p in &pairings {
            assert_eq!(proposals.iter().filter(|x| matches!(&x.kind, ActionKind::AssignTicket(a) if a.issue_key == p.issue_key)).count(), 1);
        }
    }

    #[tokio::test]
    async fn zero_remaining_yields_high_confidence_gap() {
        let store = Arc::new(MemStore::new());
        let s = sprint();
        store.upsert_sprint(&s).unwrap();
        let done = Uuid::new_v4();
        store
            .upsert_tickets(&[
                sprint_ticket("S-0", s.id, done, StatusCategory::Done),
                sprint_ticket("S-1", s.id, done, StatusCategory::Done),
            ])
            .unwrap();

        let ctx = CheckContext::new(Uuid::new_v4(), store, None, None);
        let proposals = SprintHealthCheck::new().run(&ctx).await.unwrap();
        let gap = proposals
            .iter()
            .find(|p| matches!(p.kind, ActionKind::SprintGapWarning(_)))
            .unwrap();
        assert_eq!(gap.confidence, 0.85);
    }

    #[tokio::test]
    async fn insight_failure_still_persists_snapshot() {
        let store = Arc::new(MemStore::new());
        let (s, _, _) = seed_scenario(&store);
        let insight = Arc::new(FixedInsight::new());
        insight.fail_with("model overloaded");

        let ctx = CheckContext::new(Uuid::new_v4(), store.clone(), None, Some(insight));
        SprintHealthCheck::new().run(&ctx).await.unwrap();

        let snapshots = store.snapshots_for_sprint(s.id).unwrap();
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots[0].ai_analysis.is_none());
    }

    #[tokio::test]
    async fn insight_summary_lands_on_snapshot() {
        let store = Arc::new(MemStore::new());
        let (s, _, _) = seed_scenario(&store);
        let insight = Arc::new(FixedInsight::with_summary("on track"));

        let ctx = CheckContext::new(Uuid::new_v4(), store.clone(), None, Some(insight));
        SprintHealthCheck::new().run(&ctx).await.unwrap();

        let snapshots = store.snapshots_for_sprint(s.id).unwrap();
        assert_eq!(snapshots[0].ai_analysis.as_deref(), Some("on track"));
    }

    #[test]
    fn health_score_stays_in_bounds() {
        // empty sprint
        assert_eq!(health_score(0, 0, 0, 0, 0), 0);
        // all done, nothing moving: 60 + 0, no bonus
        assert_eq!(health_score(10, 10, 0, 2, 0), 60);
        // everything in progress: 0 + 40 + 5
        assert_eq!(health_score(10, 0, 10, 2, 0), 45);
        // underload penalty cannot push below zero
        assert_eq!(health_score(10, 0, 0, 3, 3), 0);
        // bonus cannot push above 100
        for completed in 0..=10 {
            for in_progress in 0..=(10 - completed) {
                let score = health_score(10, completed, in_progress, 4, 1);
                assert!(score <= 100);
            }
        }
    }
}
