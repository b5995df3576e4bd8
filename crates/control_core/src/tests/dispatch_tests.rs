use super::*;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use shared::domain::{ActionInstance, ActionSet, ActionSetName, DelayMode, GridSize, Step};
use tokio::{sync::Mutex, time::sleep};

use crate::{
    controls::{ButtonControl, Control},
    internal::EmptyInternalCatalog,
    registry::{ConnectorHandle, MemoryConnectorRegistry, MemoryControlRegistry},
    trigger_bus::BroadcastTriggerBus,
};

fn action(id: &str, delay: Option<f64>) -> ActionInstance {
    ActionInstance {
        id: id.into(),
        connector_id: "conn".into(),
        kind: "test_action".into(),
        options: json!({}),
        delay,
        enabled: true,
    }
}

fn set(name: ActionSetName, actions: Vec<ActionInstance>) -> ActionSet {
    ActionSet::new(name, actions)
}

/// Lets the spawned connector handoffs of a finished call land before the
/// test inspects the recordings.
async fn settle() {
    sleep(Duration::from_millis(20)).await;
}

struct RecordingConnector {
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl RecordingConnector {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }

    async fn recorded_ids(&self) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[async_trait]
impl ConnectorHandle for RecordingConnector {
    async fn action_run(
        &self,
        action: &ActionInstance,
        _control_id: &ControlId,
        ctx: &RunContext,
    ) -> anyhow::Result<()> {
        self.calls
            .lock()
            .await
            .push((action.id.clone(), ctx.device_id.clone()));
        Ok(())
    }
}

struct Fixture {
    coordinator: DispatchCoordinator,
    controls: Arc<MemoryControlRegistry>,
    connector: Arc<RecordingConnector>,
    trigger_bus: Arc<BroadcastTriggerBus>,
}

fn fixture() -> Fixture {
    let controls = Arc::new(MemoryControlRegistry::new());
    let connectors = Arc::new(MemoryConnectorRegistry::new());
    let connector = RecordingConnector::new();
    connectors.insert("conn", connector.clone() as Arc<dyn ConnectorHandle>);
    let scheduler = ActionScheduler::new(
        connectors,
        Arc::clone(&controls) as Arc<dyn ControlRegistry>,
        Arc::new(EmptyInternalCatalog),
        GridSize::default(),
    );
    let trigger_bus = Arc::new(BroadcastTriggerBus::default());
    let coordinator = DispatchCoordinator::new(
        Arc::clone(&controls) as Arc<dyn ControlRegistry>,
        scheduler,
        Arc::clone(&trigger_bus) as Arc<dyn TriggerEventBus>,
    );
    Fixture {
        coordinator,
        controls,
        connector,
        trigger_bus,
    }
}

fn two_edge_button() -> Arc<Control> {
    Arc::new(Control::Button(ButtonControl::new(
        DelayMode::Absolute,
        vec![Step::new(vec![
            set(ActionSetName::Down, vec![action("on-press", None)]),
            set(ActionSetName::Up, vec![action("on-release", None)]),
        ])],
    )))
}

#[tokio::test]
async fn press_on_unknown_control_returns_false_but_still_notifies_triggers() {
    let fx = fixture();
    let mut events = fx.trigger_bus.subscribe();
    let ghost = ControlId::bank(9, 9);

    let accepted = fx.coordinator.press_control(&ghost, true, Some("dev-1")).await;
    assert!(!accepted);
    assert!(fx.connector.recorded_ids().await.is_empty());

    match events.try_recv() {
        Ok(TriggerEvent::ControlPress {
            control_id,
            pressed,
            device_id,
            ..
        }) => {
            assert_eq!(control_id, ghost);
            assert!(pressed);
            assert_eq!(device_id.as_deref(), Some("dev-1"));
        }
        other => panic!("expected a press event, got {other:?}"),
    }
}

#[tokio::test]
async fn press_and_release_run_the_matching_edge_sets() {
    let fx = fixture();
    let control_id = ControlId::bank(1, 1);
    fx.controls.insert(control_id.clone(), two_edge_button());

    assert!(fx.coordinator.press_control(&control_id, true, None).await);
    settle().await;
    assert_eq!(fx.connector.recorded_ids().await, vec!["on-press"]);

    assert!(fx.coordinator.press_control(&control_id, false, None).await);
    settle().await;
    assert_eq!(fx.connector.recorded_ids().await, vec!["on-press", "on-release"]);
}

#[tokio::test]
async fn held_sets_run_on_press_and_suppress_their_release_edge() {
    let fx = fixture();
    let control_id = ControlId::bank(1, 1);
    let mut held = set(ActionSetName::Up, vec![action("held", None)]);
    held.run_while_held = true;
    fx.controls.insert(
        control_id.clone(),
        Arc::new(Control::Button(ButtonControl::new(
            DelayMode::Absolute,
            vec![Step::new(vec![
                set(ActionSetName::Down, vec![action("on-press", None)]),
                held,
            ])],
        ))),
    );

    fx.coordinator.press_control(&control_id, true, None).await;
    settle().await;
    let mut recorded = fx.connector.recorded_ids().await;
    recorded.sort();
    assert_eq!(recorded, vec!["held", "on-press"]);

    fx.coordinator.press_control(&control_id, false, None).await;
    settle().await;
    assert_eq!(fx.connector.recorded_ids().await.len(), 2, "held set must not re-run on release");
}

#[tokio::test]
async fn press_forwards_the_source_device_in_the_run_context() {
    let fx = fixture();
    let control_id = ControlId::bank(3, 4);
    fx.controls.insert(control_id.clone(), two_edge_button());

    fx.coordinator
        .press_control(&control_id, true, Some("streamdeck-0"))
        .await;
    settle().await;

    let calls = fx.connector.calls.lock().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1.as_deref(), Some("streamdeck-0"));
}

#[tokio::test]
async fn rotate_runs_the_directional_set_of_the_current_step() {
    let fx = fixture();
    let control_id = ControlId::bank(1, 1);
    fx.controls.insert(
        control_id.clone(),
        Arc::new(Control::Button(ButtonControl::new(
            DelayMode::Absolute,
            vec![Step::new(vec![
                set(ActionSetName::RotateLeft, vec![action("spin-left", None)]),
                set(ActionSetName::RotateRight, vec![action("spin-right", None)]),
            ])],
        ))),
    );

    assert!(
        fx.coordinator
            .rotate_control(&control_id, RotateDirection::Right, None)
            .await
    );
    settle().await;
    assert_eq!(fx.connector.recorded_ids().await, vec!["spin-right"]);

    fx.coordinator
        .rotate_control(&control_id, RotateDirection::Left, None)
        .await;
    settle().await;
    assert_eq!(fx.connector.recorded_ids().await, vec!["spin-right", "spin-left"]);
}

#[tokio::test]
async fn rotate_on_non_rotatable_control_returns_false_after_notifying() {
    let fx = fixture();
    let control_id = ControlId::trigger("cue");
    fx.controls.insert(
        control_id.clone(),
        Arc::new(Control::Trigger(crate::controls::TriggerControl::new(
            DelayMode::Absolute,
            vec![action("cue-action", None)],
        ))),
    );
    let mut events = fx.trigger_bus.subscribe();

    let accepted = fx
        .coordinator
        .rotate_control(&control_id, RotateDirection::Left, None)
        .await;
    assert!(!accepted);
    assert!(matches!(events.try_recv(), Ok(TriggerEvent::ControlRotate { .. })));
}

#[tokio::test]
async fn step_changes_select_which_set_the_next_press_resolves() {
    let fx = fixture();
    let control_id = ControlId::bank(1, 1);
    fx.controls.insert(
        control_id.clone(),
        Arc::new(Control::Button(ButtonControl::new(
            DelayMode::Absolute,
            vec![
                Step::new(vec![set(ActionSetName::Down, vec![action("step0", None)])]),
                Step::new(vec![set(ActionSetName::Down, vec![action("step1", None)])]),
                Step::new(vec![set(ActionSetName::Down, vec![action("step2", None)])]),
            ],
        ))),
    );

    fx.coordinator.press_control(&control_id, true, None).await;
    settle().await;
    assert_eq!(fx.connector.recorded_ids().await, vec!["step0"]);

    assert_eq!(fx.coordinator.step_advance_delta(&control_id, 1).await, Some(1));
    fx.coordinator.press_control(&control_id, true, None).await;
    settle().await;
    assert_eq!(fx.connector.recorded_ids().await, vec!["step0", "step1"]);

    // Negative delta wraps backwards.
    assert_eq!(fx.coordinator.step_advance_delta(&control_id, -2).await, Some(2));
    fx.coordinator.press_control(&control_id, true, None).await;
    settle().await;
    assert_eq!(
        fx.connector.recorded_ids().await,
        vec!["step0", "step1", "step2"]
    );

    assert_eq!(fx.coordinator.step_make_current(&control_id, 0).await, Ok(true));
    fx.coordinator.press_control(&control_id, true, None).await;
    settle().await;
    assert_eq!(
        fx.connector.recorded_ids().await,
        vec!["step0", "step1", "step2", "step0"]
    );
}

#[tokio::test]
async fn step_make_current_rejects_out_of_range_indices() {
    let fx = fixture();
    let control_id = ControlId::bank(1, 1);
    fx.controls.insert(control_id.clone(), two_edge_button());

    let result = fx.coordinator.step_make_current(&control_id, 5).await;
    assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
}

#[tokio::test]
async fn step_ops_on_unknown_or_unsteppable_controls_report_absence() {
    let fx = fixture();
    let ghost = ControlId::bank(9, 9);
    assert_eq!(fx.coordinator.step_make_current(&ghost, 0).await, Ok(false));
    assert_eq!(fx.coordinator.step_advance_delta(&ghost, 1).await, None);

    let trigger = ControlId::trigger("cue");
    fx.controls.insert(
        trigger.clone(),
        Arc::new(Control::Trigger(crate::controls::TriggerControl::new(
            DelayMode::Absolute,
            Vec::new(),
        ))),
    );
    assert_eq!(fx.coordinator.step_advance_delta(&trigger, 1).await, None);
}

#[tokio::test]
async fn second_press_does_not_cancel_the_firsts_delayed_actions() {
    let fx = fixture();
    let control_id = ControlId::bank(1, 1);
    fx.controls.insert(
        control_id.clone(),
        Arc::new(Control::Button(ButtonControl::new(
            DelayMode::Absolute,
            vec![Step::new(vec![set(
                ActionSetName::Down,
                vec![action("slow", Some(80.0))],
            )])],
        ))),
    );

    fx.coordinator.press_control(&control_id, true, None).await;
    fx.coordinator.press_control(&control_id, true, None).await;

    sleep(Duration::from_millis(160)).await;
    assert_eq!(fx.connector.recorded_ids().await, vec!["slow", "slow"]);
}
