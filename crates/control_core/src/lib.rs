use std::sync::Arc;

use shared::{
    domain::{ActionInstance, ControlId, DelayMode, FeedbackBatchItem, GridSize, RotateDirection},
    error::EngineError,
};

pub mod controls;
pub mod dispatch;
pub mod feedback;
pub mod internal;
pub mod registry;
pub mod scheduler;
pub mod trigger_bus;

pub use controls::{
    ButtonControl, Control, FeedbackHost, PageNavControl, PageNavTarget, Pressable, Rotatable,
    RunPlan, StyleSettable, Steppable, TriggerControl,
};
pub use dispatch::DispatchCoordinator;
pub use feedback::FeedbackAggregator;
pub use internal::{EmptyInternalCatalog, InternalCatalog};
pub use registry::{
    ConnectorHandle, ConnectorRegistry, ControlRegistry, MemoryConnectorRegistry,
    MemoryControlRegistry, RunContext,
};
pub use scheduler::ActionScheduler;
pub use trigger_bus::{BroadcastTriggerBus, TriggerEvent, TriggerEventBus};

/// The assembled engine: scheduler, coordinator, and feedback router over
/// one set of collaborators.
pub struct SurfaceEngine {
    scheduler: Arc<ActionScheduler>,
    coordinator: DispatchCoordinator,
    feedback: FeedbackAggregator,
}

impl SurfaceEngine {
    pub fn new(
        controls: Arc<dyn ControlRegistry>,
        connectors: Arc<dyn ConnectorRegistry>,
        internal: Arc<dyn InternalCatalog>,
        trigger_bus: Arc<dyn TriggerEventBus>,
        grid: GridSize,
    ) -> Self {
        let scheduler = ActionScheduler::new(
            connectors,
            Arc::clone(&controls),
            internal,
            grid,
        );
        let coordinator =
            DispatchCoordinator::new(Arc::clone(&controls), Arc::clone(&scheduler), trigger_bus);
        let feedback = FeedbackAggregator::new(controls);
        Self {
            scheduler,
            coordinator,
            feedback,
        }
    }

    pub async fn run_multiple_actions(
        &self,
        actions: &[ActionInstance],
        control_id: &ControlId,
        delay_mode: DelayMode,
        ctx: &RunContext,
    ) {
        self.scheduler
            .run_actions(actions, control_id, delay_mode, ctx)
            .await;
    }

    pub async fn abort_all_delayed(&self) {
        self.scheduler.abort_all_delayed().await;
    }

    pub async fn abort_control_delayed(&self, control_id: &ControlId, skip_release: bool) {
        self.scheduler
            .abort_control_delayed(control_id, skip_release)
            .await;
    }

    pub async fn abort_page_delayed(&self, page: u32, exclude: &[ControlId]) {
        self.scheduler.abort_page_delayed(page, exclude).await;
    }

    pub async fn press_control(
        &self,
        control_id: &ControlId,
        pressed: bool,
        device_id: Option<&str>,
    ) -> bool {
        self.coordinator
            .press_control(control_id, pressed, device_id)
            .await
    }

    pub async fn rotate_control(
        &self,
        control_id: &ControlId,
        direction: RotateDirection,
        device_id: Option<&str>,
    ) -> bool {
        self.coordinator
            .rotate_control(control_id, direction, device_id)
            .await
    }

    pub async fn step_make_current(
        &self,
        control_id: &ControlId,
        index: usize,
    ) -> Result<bool, EngineError> {
        self.coordinator.step_make_current(control_id, index).await
    }

    pub async fn step_advance_delta(&self, control_id: &ControlId, delta: i64) -> Option<usize> {
        self.coordinator.step_advance_delta(control_id, delta).await
    }

    pub async fn update_feedback_values(&self, connector_id: &str, batch: Vec<FeedbackBatchItem>) {
        self.feedback.update_feedback_values(connector_id, batch).await;
    }

    pub fn scheduler(&self) -> &Arc<ActionScheduler> {
        &self.scheduler
    }
}

#[cfg(test)]
#[path = "tests/engine_tests.rs"]
mod tests;
