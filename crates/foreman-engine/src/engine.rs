//! The engine: owns the run loop, the interval timer, and the event bus.
//!
//! One cycle runs every enabled check module in sequence, persists the
//! proposals, auto-executes the ones the owning module vouches for, then
//! sweeps previously approved actions through the executor. Only one
//! cycle may be active at a time; a cycle requested while one is running
//! is rejected outright, never queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use foreman_core::insight::InsightService;
use foreman_core::tracker::IssueTracker;
use foreman_core::types::{ActionStatus, AutomationAction, AutomationRun};
use foreman_core::{ActionFilter, AutomationConfig, ForemanError, Result, Store};

use crate::bus::{EngineEvent, EventBus, EventKind};
use crate::checks::{CheckContext, CheckModule, SprintHealthCheck, StaleTicketCheck, WorkloadCheck};
use crate::executor::Executor;

/// Clears the single-flight flag on every exit path.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Engine {
    store: Arc<dyn Store>,
    tracker: Option<Arc<dyn IssueTracker>>,
    insight: Option<Arc<dyn InsightService>>,
    modules: Vec<Arc<dyn CheckModule>>,
    executor: Executor,
    bus: EventBus,
    running: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Engine with the three stock check modules.
    pub fn new(
        store: Arc<dyn Store>,
        tracker: Option<Arc<dyn IssueTracker>>,
        insight: Option<Arc<dyn InsightService>>,
    ) -> Self {
        let modules: Vec<Arc<dyn CheckModule>> = vec![
            Arc::new(StaleTicketCheck::new()),
            Arc::new(SprintHealthCheck::new()),
            Arc::new(WorkloadCheck::new()),
        ];
        Self::with_modules(store, tracker, insight, modules)
    }

    pub fn with_modules(
        store: Arc<dyn Store>,
        tracker: Option<Arc<dyn IssueTracker>>,
        insight: Option<Arc<dyn InsightService>>,
        modules: Vec<Arc<dyn CheckModule>>,
    ) -> Self {
        let executor = Executor::new(store.clone(), tracker.clone());
        Self {
            store,
            tracker,
            insight,
            modules,
            executor,
            bus: EventBus::new(),
            running: AtomicBool::new(false),
            timer: Mutex::new(None),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Subscribe to engine events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.bus.subscribe()
    }

    // --- config -----------------------------------------------------------

    pub fn config(&self) -> Result<AutomationConfig> {
        self.store.automation_config()
    }

    /// Update config; restarts the interval timer when the enabled flag
    /// or the interval changed.
    pub fn set_config(
        self: &Arc<Self>,
        enabled: bool,
        interval_hours: u32,
    ) -> Result<AutomationConfig> {
        let mut config = self.store.automation_config()?;
        let schedule_changed =
            config.enabled != enabled || config.interval_hours != interval_hours;
        config.enabled = enabled;
        config.interval_hours = interval_hours;
        self.store.set_automation_config(&config)?;
        self.bus.publish(
            EventKind::ConfigUpdated,
            json!({"enabled": enabled, "interval_hours": interval_hours}),
        );
        if schedule_changed {
            self.stop();
            if enabled {
                self.start()?;
            }
        }
        Ok(config)
    }

    // --- scheduler --------------------------------------------------------

    /// Spawn the interval timer. The first cycle fires one interval after
    /// start, not immediately. No-op when automation is disabled.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let config = self.store.automation_config()?;
        if !config.enabled {
            return Ok(());
        }
        let interval = std::time::Duration::from_secs(u64::from(config.interval_hours) * 3600);
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match engine.run_cycle().await {
                    Ok(run) => {
                        tracing::info!(
                            run_id = %run.id,
                            actions = run.actions_proposed,
                            "scheduled automation cycle complete"
                        );
                    }
                    Err(ForemanError::CycleInProgress) => {
                        tracing::debug!("cycle still running, skipping tick");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "scheduled automation cycle failed");
                    }
                }
            }
        });
        let mut timer = self.timer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = timer.replace(handle) {
            old.abort();
        }
        Ok(())
    }

    pub fn stop(&self) {
        let mut timer = self.timer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = timer.take() {
            handle.abort();
        }
    }

    // --- run cycle --------------------------------------------------------

    /// Run one cycle now. Returns `CycleInProgress` without queueing when
    /// another cycle is already active.
    pub async fn run_cycle(&self) -> Result<AutomationRun> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ForemanError::CycleInProgress);
        }
        let _guard = RunningGuard(&self.running);
        self.cycle_inner().await
    }

    async fn cycle_inner(&self) -> Result<AutomationRun> {
        let config = self.store.automation_config()?;
        let mut run = AutomationRun::started();
        self.store.insert_run(&run)?;
        self.bus
            .publish(EventKind::RunStarted, json!({"run_id": run.id}));

        let ctx = CheckContext::new(
            run.id,
            self.store.clone(),
            self.tracker.clone(),
            self.insight.clone(),
        );

        for module in &self.modules {
            if !module.enabled() {
                continue;
            }
            match module.run(&ctx).await {
                Ok(proposals) => {
                    for proposal in proposals {
                        let auto = module.auto_approve(&proposal)
                            && proposal.confidence >= config.auto_execute_threshold;
                        let mut action = AutomationAction::from_proposed(proposal);
                        self.store.insert_action(&action)?;
                        run.actions_proposed += 1;
                        self.bus.publish(
                            EventKind::ActionProposed,
                            json!({
                                "action_id": action.id,
                                "type": action.kind.action_type(),
                                "module": action.check_module,
                                "confidence": action.confidence,
                            }),
                        );
                        if auto {
                            action.status = ActionStatus::Approved;
                            self.store.update_action(&action)?;
                            self.execute_action(&mut action).await?;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(module = %module.name(), error = %e, "check module failed");
                    run.errors.push(format!("{}: {e}", module.name()));
                }
            }
        }

        // Sweep actions approved by a human since the last cycle.
        let approved = self
            .store
            .list_actions(&ActionFilter::status(ActionStatus::Approved))?;
        for mut action in approved {
            self.execute_action(&mut action).await?;
        }

        run.finished_at = Some(Utc::now());
        self.store.update_run(&run)?;
        self.bus.publish(
            EventKind::RunCompleted,
            json!({
                "run_id": run.id,
                "actions_proposed": run.actions_proposed,
                "errors": run.errors,
            }),
        );
        Ok(run)
    }

    async fn execute_action(&self, action: &mut AutomationAction) -> Result<()> {
        let outcome = self.executor.execute(action).await;
        if outcome.success {
            action.status = ActionStatus::Executed;
            action.executed_at = Some(Utc::now());
            action.error = None;
            self.bus
                .publish(EventKind::ActionExecuted, json!({"action_id": action.id}));
        } else {
            action.status = ActionStatus::Failed;
            action.error = outcome.error;
            self.bus.publish(
                EventKind::ActionFailed,
                json!({"action_id": action.id, "error": action.error}),
            );
        }
        self.store.update_action(action)
    }

    // --- queries & approvals ----------------------------------------------

    pub fn list_runs(&self, limit: usize) -> Result<Vec<AutomationRun>> {
        self.store.list_runs(limit)
    }

    pub fn list_actions(&self, filter: &ActionFilter) -> Result<Vec<AutomationAction>> {
        self.store.list_actions(filter)
    }

    pub fn action(&self, id: Uuid) -> Result<Option<AutomationAction>> {
        self.store.action(id)
    }

    /// Approve a pending action. Terminal (and already-approved) actions
    /// are returned unchanged rather than erroring.
    pub fn approve_action(&self, id: Uuid) -> Result<AutomationAction> {
        let mut action = self
            .store
            .action(id)?
            .ok_or(ForemanError::ActionNotFound(id))?;
        if action.status == ActionStatus::Pending {
            action.status = ActionStatus::Approved;
            self.store.update_action(&action)?;
            self.bus
                .publish(EventKind::ActionApproved, json!({"action_id": id}));
        }
        Ok(action)
    }

    /// Reject a pending action. Terminal actions are returned unchanged;
    /// rejecting an approved action is an invalid transition.
    pub fn reject_action(&self, id: Uuid) -> Result<AutomationAction> {
        let mut action = self
            .store
            .action(id)?
            .ok_or(ForemanError::ActionNotFound(id))?;
        match action.status {
            ActionStatus::Pending => {
                action.status = ActionStatus::Rejected;
                self.store.update_action(&action)?;
                self.bus
                    .publish(EventKind::ActionRejected, json!({"action_id": id}));
                Ok(action)
            }
            ActionStatus::Approved => Err(ForemanError::InvalidTransition {
                from: ActionStatus::Approved.to_string(),
                to: ActionStatus::Rejected.to_string(),
            }),
            _ => Ok(action),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}
