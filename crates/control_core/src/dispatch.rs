use std::sync::Arc;

use chrono::Utc;
use shared::{
    domain::{ControlId, RotateDirection},
    error::EngineError,
};
use tracing::debug;

use crate::{
    registry::{ControlRegistry, RunContext},
    scheduler::ActionScheduler,
    trigger_bus::{TriggerEvent, TriggerEventBus},
};

/// Turns surface events into scheduler invocations against the correct
/// control and its current step.
pub struct DispatchCoordinator {
    controls: Arc<dyn ControlRegistry>,
    scheduler: Arc<ActionScheduler>,
    trigger_bus: Arc<dyn TriggerEventBus>,
}

impl DispatchCoordinator {
    pub fn new(
        controls: Arc<dyn ControlRegistry>,
        scheduler: Arc<ActionScheduler>,
        trigger_bus: Arc<dyn TriggerEventBus>,
    ) -> Self {
        Self {
            controls,
            scheduler,
            trigger_bus,
        }
    }

    /// Handle a press (`pressed = true`) or release edge. The raw trigger
    /// event always fires, even when no live control accepts the press.
    /// Returns whether a pressable control was found.
    pub async fn press_control(
        &self,
        control_id: &ControlId,
        pressed: bool,
        device_id: Option<&str>,
    ) -> bool {
        self.trigger_bus.emit(TriggerEvent::ControlPress {
            control_id: control_id.clone(),
            pressed,
            device_id: device_id.map(str::to_owned),
            at: Utc::now(),
        });

        let Some(control) = self.controls.get_control(control_id) else {
            debug!("press: unknown control control={control_id}");
            return false;
        };
        let Some(pressable) = control.as_pressable() else {
            return false;
        };

        pressable.set_pushed(pressed).await;
        if let Some(plan) = pressable.plan_press(pressed).await {
            let ctx = RunContext::from_device(device_id, control_id.page());
            self.scheduler
                .run_actions(&plan.actions, control_id, plan.delay_mode, &ctx)
                .await;
        }
        true
    }

    /// Handle an encoder rotation. Returns whether a rotatable control was
    /// found; the raw trigger event always fires first.
    pub async fn rotate_control(
        &self,
        control_id: &ControlId,
        direction: RotateDirection,
        device_id: Option<&str>,
    ) -> bool {
        self.trigger_bus.emit(TriggerEvent::ControlRotate {
            control_id: control_id.clone(),
            direction,
            device_id: device_id.map(str::to_owned),
            at: Utc::now(),
        });

        let Some(control) = self.controls.get_control(control_id) else {
            debug!("rotate: unknown control control={control_id}");
            return false;
        };
        let Some(rotatable) = control.as_rotatable() else {
            return false;
        };

        if let Some(plan) = rotatable.plan_rotate(direction).await {
            let ctx = RunContext::from_device(device_id, control_id.page());
            self.scheduler
                .run_actions(&plan.actions, control_id, plan.delay_mode, &ctx)
                .await;
        }
        true
    }

    /// Set the current step directly. Never runs or cancels actions; it
    /// only changes what the next press resolves to. Returns false when the
    /// control is absent or not steppable.
    pub async fn step_make_current(
        &self,
        control_id: &ControlId,
        index: usize,
    ) -> Result<bool, EngineError> {
        let Some(control) = self.controls.get_control(control_id) else {
            return Ok(false);
        };
        let Some(steppable) = control.as_steppable() else {
            return Ok(false);
        };
        steppable.step_make_current(index).await?;
        Ok(true)
    }

    /// Move the current step by `delta`, wrapping in both directions.
    /// Returns the new index, or `None` when the control is absent or not
    /// steppable.
    pub async fn step_advance_delta(&self, control_id: &ControlId, delta: i64) -> Option<usize> {
        let control = self.controls.get_control(control_id)?;
        let steppable = control.as_steppable()?;
        Some(steppable.step_advance_delta(delta).await)
    }
}

#[cfg(test)]
#[path = "tests/dispatch_tests.rs"]
mod tests;
