//! Delay computation and the pending-timer table.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use shared::{
    domain::{ActionInstance, ControlId, DelayMode, GridSize},
    error::EngineError,
};
use tokio::{sync::Mutex, task::JoinHandle, time::Instant};
use tracing::{debug, warn};

use crate::{
    internal::InternalCatalog,
    registry::{ConnectorRegistry, ControlRegistry, RunContext},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TimerId(u64);

struct PendingTimer {
    control_id: ControlId,
    fire_at: Instant,
    handle: JoinHandle<()>,
}

/// Owns every delayed action in flight. Timers exist only between the
/// moment `run_actions` schedules them and the moment they fire or are
/// cancelled; nothing is persisted across restarts.
pub struct ActionScheduler {
    connectors: Arc<dyn ConnectorRegistry>,
    controls: Arc<dyn ControlRegistry>,
    internal: Arc<dyn InternalCatalog>,
    grid: GridSize,
    pending: Mutex<HashMap<TimerId, PendingTimer>>,
    next_timer_id: AtomicU64,
}

/// Per-action effective delays for one run, in the original order of the
/// already-filtered list.
fn effective_delays(actions: &[ActionInstance], mode: DelayMode) -> Vec<(ActionInstance, f64)> {
    let enabled = actions.iter().filter(|a| a.enabled);
    match mode {
        DelayMode::Absolute => enabled.map(|a| (a.clone(), a.delay_ms())).collect(),
        DelayMode::Relative => {
            let mut total = 0.0;
            enabled
                .map(|a| {
                    total += a.delay_ms();
                    (a.clone(), total)
                })
                .collect()
        }
    }
}

impl ActionScheduler {
    pub fn new(
        connectors: Arc<dyn ConnectorRegistry>,
        controls: Arc<dyn ControlRegistry>,
        internal: Arc<dyn InternalCatalog>,
        grid: GridSize,
    ) -> Arc<Self> {
        Arc::new(Self {
            connectors,
            controls,
            internal,
            grid,
            pending: Mutex::new(HashMap::new()),
            next_timer_id: AtomicU64::new(1),
        })
    }

    /// Run one resolved action sequence for `control_id`. Actions whose
    /// effective delay is zero are handed to their connectors in original
    /// order before this returns; the rest become pending timers. Scheduling
    /// any timer flips the control's running indicator to true before
    /// returning.
    pub async fn run_actions(
        self: &Arc<Self>,
        actions: &[ActionInstance],
        control_id: &ControlId,
        delay_mode: DelayMode,
        ctx: &RunContext,
    ) {
        let planned = effective_delays(actions, delay_mode);
        if planned.is_empty() {
            return;
        }

        let mut immediate = Vec::new();
        let mut delayed = Vec::new();
        for (action, delay_ms) in planned {
            if delay_ms <= 0.0 {
                immediate.push(action);
            } else {
                delayed.push((action, delay_ms));
            }
        }

        if !delayed.is_empty() {
            let mut pending = self.pending.lock().await;
            // The flag update shares the table's critical section, so a
            // concurrent fire or abort can never interleave between them.
            self.set_running(control_id, true, true).await;
            for (action, delay_ms) in delayed {
                let timer_id = TimerId(self.next_timer_id.fetch_add(1, Ordering::Relaxed));
                let duration = Duration::from_millis(delay_ms.round() as u64);
                let scheduler = Arc::clone(self);
                let owner = control_id.clone();
                let task_ctx = ctx.clone();
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(duration).await;
                    scheduler.fire_timer(timer_id, action, owner, task_ctx).await;
                });
                // Inserted under the same lock the fire path takes, so the
                // timer can never observe the table without its own entry.
                pending.insert(
                    timer_id,
                    PendingTimer {
                        control_id: control_id.clone(),
                        fire_at: Instant::now() + duration,
                        handle,
                    },
                );
            }
        }

        for action in &immediate {
            self.dispatch(action, control_id, ctx);
        }
    }

    async fn fire_timer(
        self: Arc<Self>,
        timer_id: TimerId,
        action: ActionInstance,
        control_id: ControlId,
        ctx: RunContext,
    ) {
        {
            let mut pending = self.pending.lock().await;
            if pending.remove(&timer_id).is_none() {
                // Cancelled between wakeup and here.
                return;
            }
        }

        self.dispatch(&action, &control_id, &ctx);

        // Re-check after dispatch: a run started meanwhile may own new timers.
        let pending = self.pending.lock().await;
        let remaining = pending.values().any(|t| t.control_id == control_id);
        if !remaining {
            self.set_running(&control_id, false, true).await;
        }
    }

    /// Cancel every pending timer process-wide. Each affected control's
    /// running indicator is cleared exactly once.
    pub async fn abort_all_delayed(&self) {
        let mut pending = self.pending.lock().await;
        let cancelled: Vec<PendingTimer> = pending.drain().map(|(_, timer)| timer).collect();
        if cancelled.is_empty() {
            return;
        }

        let mut affected: HashSet<ControlId> = HashSet::new();
        for timer in &cancelled {
            timer.handle.abort();
            affected.insert(timer.control_id.clone());
        }
        for control_id in affected {
            self.set_running(&control_id, false, true).await;
        }
    }

    /// Cancel only the timers owned by `control_id`. Unless `skip_release`
    /// is set, the control also resolves any in-progress press as released.
    /// Silent no-op when the control owns no timers.
    pub async fn abort_control_delayed(&self, control_id: &ControlId, skip_release: bool) {
        let mut pending = self.pending.lock().await;
        let ids: Vec<TimerId> = pending
            .iter()
            .filter(|(_, t)| t.control_id == *control_id)
            .map(|(id, _)| *id)
            .collect();
        if ids.is_empty() {
            return;
        }

        for id in ids {
            if let Some(timer) = pending.remove(&id) {
                timer.handle.abort();
                debug!(
                    "abort: cancelled timer control={control_id} due_in={:?}",
                    timer.fire_at.saturating_duration_since(Instant::now())
                );
            }
        }
        self.set_running(control_id, false, skip_release).await;
    }

    /// Cancel delayed work for every bank address of `page` except the
    /// excluded ids.
    pub async fn abort_page_delayed(&self, page: u32, exclude: &[ControlId]) {
        for bank in self.grid.bank_numbers() {
            let control_id = ControlId::bank(page, bank);
            if exclude.contains(&control_id) {
                continue;
            }
            self.abort_control_delayed(&control_id, false).await;
        }
    }

    /// Hand one action to its connector. Internal actions run synchronously
    /// against the catalog; connector calls are spawned and never awaited to
    /// completion, so a stalled connector cannot block the caller or sibling
    /// actions. Every failure is absorbed here: unknown connectors and
    /// connector errors are logged and dropped, never surfaced to the caller.
    pub fn dispatch(&self, action: &ActionInstance, control_id: &ControlId, ctx: &RunContext) {
        if action.is_internal() {
            match self.internal.execute_action(action, ctx) {
                Some(true) => {}
                Some(false) => {
                    warn!("dispatch: internal action failed kind={} control={control_id}", action.kind);
                }
                None => {
                    warn!("dispatch: unknown internal action kind={} control={control_id}", action.kind);
                }
            }
            return;
        }

        let Some(handle) = self.connectors.get_connector(&action.connector_id) else {
            let err = EngineError::UnknownConnector(action.connector_id.clone());
            warn!("dispatch: {err} kind={} control={control_id}", action.kind);
            return;
        };

        let action = action.clone();
        let control_id = control_id.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(source) = handle.action_run(&action, &control_id, &ctx).await {
                let err = EngineError::ConnectorExecution {
                    connector_id: action.connector_id.clone(),
                    message: format!("{source:#}"),
                };
                warn!("dispatch: {err} kind={} control={control_id}", action.kind);
            }
        });
    }

    pub async fn pending_timer_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn pending_timers_for(&self, control_id: &ControlId) -> usize {
        let pending = self.pending.lock().await;
        pending
            .values()
            .filter(|t| t.control_id == *control_id)
            .count()
    }

    async fn set_running(&self, control_id: &ControlId, running: bool, skip_release: bool) {
        let Some(control) = self.controls.get_control(control_id) else {
            // Control deleted while timers were in flight.
            debug!("scheduler: running-flag update for absent control control={control_id}");
            return;
        };
        control.set_actions_running(running, skip_release).await;
    }
}

#[cfg(test)]
#[path = "tests/scheduler_tests.rs"]
mod tests;
