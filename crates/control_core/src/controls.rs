use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use shared::{
    domain::{
        ActionInstance, ActionSetName, DelayMode, FeedbackInstance, FeedbackValue,
        RotateDirection, Step, INTERNAL_CONNECTOR_ID,
    },
    error::EngineError,
};
use tokio::sync::Mutex;

/// The resolved action sequence for one surface gesture, ready to hand to
/// the scheduler.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub actions: Vec<ActionInstance>,
    pub delay_mode: DelayMode,
}

#[async_trait]
pub trait Pressable: Send + Sync {
    /// Resolve the action sequence for a press (`pressed = true`) or a
    /// release edge. `None` when the edge maps to no actions.
    async fn plan_press(&self, pressed: bool) -> Option<RunPlan>;

    async fn set_pushed(&self, pushed: bool);
}

#[async_trait]
pub trait Rotatable: Send + Sync {
    async fn plan_rotate(&self, direction: RotateDirection) -> Option<RunPlan>;
}

#[async_trait]
pub trait Steppable: Send + Sync {
    async fn active_step_index(&self) -> usize;
    async fn step_count(&self) -> usize;
    /// Index must already be validated by the caller; out-of-range is a
    /// contract violation and is returned as `InvalidArgument`.
    async fn step_make_current(&self, index: usize) -> Result<(), EngineError>;
    /// Move by `delta` steps, wrapping in both directions. Returns the new
    /// current index.
    async fn step_advance_delta(&self, delta: i64) -> usize;
}

#[async_trait]
pub trait StyleSettable: Send + Sync {
    /// Merge a partial style object into the control's style fields.
    async fn style_set_fields(&self, partial: Value);
}

#[async_trait]
pub trait FeedbackHost: Send + Sync {
    /// Store new values for this control's feedbacks, keyed by feedback id.
    /// Unchanged values are ignored. Returns whether anything changed, in
    /// which case the control's cached rendering has been invalidated.
    async fn apply_feedback_values(
        &self,
        connector_id: &str,
        values: HashMap<String, FeedbackValue>,
    ) -> bool;
}

// ---------------------------------------------------------------------------
// ButtonControl
// ---------------------------------------------------------------------------

struct ButtonState {
    steps: Vec<Step>,
    current_step: usize,
    pushed: bool,
    running: bool,
    feedbacks: Vec<FeedbackInstance>,
    style: Map<String, Value>,
    render_dirty: bool,
}

/// A plain programmable button slot: steppable, rotatable, feedback-hosting.
pub struct ButtonControl {
    delay_mode: DelayMode,
    state: Mutex<ButtonState>,
}

impl ButtonControl {
    /// A steppable control always has at least one step.
    pub fn new(delay_mode: DelayMode, steps: Vec<Step>) -> Self {
        let steps = if steps.is_empty() {
            vec![Step::default()]
        } else {
            steps
        };
        Self {
            delay_mode,
            state: Mutex::new(ButtonState {
                steps,
                current_step: 0,
                pushed: false,
                running: false,
                feedbacks: Vec::new(),
                style: Map::new(),
                render_dirty: false,
            }),
        }
    }

    pub fn with_feedbacks(self, feedbacks: Vec<FeedbackInstance>) -> Self {
        if let Ok(mut state) = self.state.try_lock() {
            state.feedbacks = feedbacks;
        }
        self
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running
    }

    pub async fn is_pushed(&self) -> bool {
        self.state.lock().await.pushed
    }

    pub async fn feedback_value(&self, feedback_id: &str) -> Option<FeedbackValue> {
        let state = self.state.lock().await;
        state
            .feedbacks
            .iter()
            .find(|f| f.id == feedback_id)
            .and_then(|f| f.value.clone())
    }

    pub async fn style_fields(&self) -> Value {
        Value::Object(self.state.lock().await.style.clone())
    }

    /// Read and clear the render invalidation flag.
    pub async fn take_render_dirty(&self) -> bool {
        let mut state = self.state.lock().await;
        std::mem::take(&mut state.render_dirty)
    }

    async fn set_actions_running(&self, running: bool, skip_release: bool) {
        let mut state = self.state.lock().await;
        let mut changed = false;
        if state.running != running {
            state.running = running;
            changed = true;
        }
        if !running && !skip_release && state.pushed {
            state.pushed = false;
            changed = true;
        }
        if changed {
            state.render_dirty = true;
        }
    }

    fn plan_for(state: &ButtonState, wanted: impl Fn(&shared::domain::ActionSet) -> bool) -> Option<Vec<ActionInstance>> {
        let step = state.steps.get(state.current_step)?;
        let actions: Vec<ActionInstance> = step
            .sets
            .iter()
            .filter(|set| wanted(set))
            .flat_map(|set| set.actions.iter().cloned())
            .collect();
        if actions.is_empty() {
            None
        } else {
            Some(actions)
        }
    }
}

#[async_trait]
impl Pressable for ButtonControl {
    async fn plan_press(&self, pressed: bool) -> Option<RunPlan> {
        let state = self.state.lock().await;
        let actions = Self::plan_for(&state, |set| {
            if pressed {
                set.name == ActionSetName::Down || set.run_while_held
            } else {
                set.name == ActionSetName::Up && !set.run_while_held
            }
        })?;
        Some(RunPlan {
            actions,
            delay_mode: self.delay_mode,
        })
    }

    async fn set_pushed(&self, pushed: bool) {
        let mut state = self.state.lock().await;
        if state.pushed != pushed {
            state.pushed = pushed;
            state.render_dirty = true;
        }
    }
}

#[async_trait]
impl Rotatable for ButtonControl {
    async fn plan_rotate(&self, direction: RotateDirection) -> Option<RunPlan> {
        let wanted = match direction {
            RotateDirection::Left => ActionSetName::RotateLeft,
            RotateDirection::Right => ActionSetName::RotateRight,
        };
        let state = self.state.lock().await;
        let actions = Self::plan_for(&state, |set| set.name == wanted)?;
        Some(RunPlan {
            actions,
            delay_mode: self.delay_mode,
        })
    }
}

#[async_trait]
impl Steppable for ButtonControl {
    async fn active_step_index(&self) -> usize {
        self.state.lock().await.current_step
    }

    async fn step_count(&self) -> usize {
        self.state.lock().await.steps.len()
    }

    async fn step_make_current(&self, index: usize) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        if index >= state.steps.len() {
            return Err(EngineError::InvalidArgument(format!(
                "step index {index} out of range 0..{}",
                state.steps.len()
            )));
        }
        state.current_step = index;
        Ok(())
    }

    async fn step_advance_delta(&self, delta: i64) -> usize {
        let mut state = self.state.lock().await;
        let count = state.steps.len() as i64;
        let next = (state.current_step as i64 + delta).rem_euclid(count) as usize;
        state.current_step = next;
        next
    }
}

#[async_trait]
impl StyleSettable for ButtonControl {
    async fn style_set_fields(&self, partial: Value) {
        let Value::Object(fields) = partial else {
            return;
        };
        let mut state = self.state.lock().await;
        for (key, value) in fields {
            state.style.insert(key, value);
        }
        state.render_dirty = true;
    }
}

#[async_trait]
impl FeedbackHost for ButtonControl {
    async fn apply_feedback_values(
        &self,
        connector_id: &str,
        values: HashMap<String, FeedbackValue>,
    ) -> bool {
        let mut state = self.state.lock().await;
        let mut changed = false;
        for (feedback_id, value) in values {
            let Some(instance) = state
                .feedbacks
                .iter_mut()
                .find(|f| f.id == feedback_id && f.connector_id == connector_id)
            else {
                continue;
            };
            if instance.value.as_ref() != Some(&value) {
                instance.value = Some(value);
                changed = true;
            }
        }
        if changed {
            state.render_dirty = true;
        }
        changed
    }
}

// ---------------------------------------------------------------------------
// PageNavControl
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageNavTarget {
    Up,
    Down,
    Set(u32),
}

struct NavState {
    pushed: bool,
    running: bool,
}

/// A fixed-function navigation button whose press plans one internal action.
pub struct PageNavControl {
    target: PageNavTarget,
    state: Mutex<NavState>,
}

impl PageNavControl {
    pub fn new(target: PageNavTarget) -> Self {
        Self {
            target,
            state: Mutex::new(NavState {
                pushed: false,
                running: false,
            }),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running
    }

    async fn set_actions_running(&self, running: bool, skip_release: bool) {
        let mut state = self.state.lock().await;
        state.running = running;
        if !running && !skip_release {
            state.pushed = false;
        }
    }
}

#[async_trait]
impl Pressable for PageNavControl {
    async fn plan_press(&self, pressed: bool) -> Option<RunPlan> {
        if !pressed {
            return None;
        }
        let (kind, options) = match self.target {
            PageNavTarget::Up => ("surface_page_up", json!({})),
            PageNavTarget::Down => ("surface_page_down", json!({})),
            PageNavTarget::Set(page) => ("surface_set_page", json!({ "page": page })),
        };
        Some(RunPlan {
            actions: vec![ActionInstance {
                id: "page-nav".into(),
                connector_id: INTERNAL_CONNECTOR_ID.into(),
                kind: kind.into(),
                options,
                delay: None,
                enabled: true,
            }],
            delay_mode: DelayMode::Absolute,
        })
    }

    async fn set_pushed(&self, pushed: bool) {
        self.state.lock().await.pushed = pushed;
    }
}

// ---------------------------------------------------------------------------
// TriggerControl
// ---------------------------------------------------------------------------

struct TriggerState {
    actions: Vec<ActionInstance>,
    running: bool,
    feedbacks: Vec<FeedbackInstance>,
}

/// A rule-based trigger. Its condition feedbacks are hosted here; a manual
/// press executes its action sequence directly.
pub struct TriggerControl {
    delay_mode: DelayMode,
    state: Mutex<TriggerState>,
}

impl TriggerControl {
    pub fn new(delay_mode: DelayMode, actions: Vec<ActionInstance>) -> Self {
        Self {
            delay_mode,
            state: Mutex::new(TriggerState {
                actions,
                running: false,
                feedbacks: Vec::new(),
            }),
        }
    }

    pub fn with_feedbacks(self, feedbacks: Vec<FeedbackInstance>) -> Self {
        if let Ok(mut state) = self.state.try_lock() {
            state.feedbacks = feedbacks;
        }
        self
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running
    }

    pub async fn feedback_value(&self, feedback_id: &str) -> Option<FeedbackValue> {
        let state = self.state.lock().await;
        state
            .feedbacks
            .iter()
            .find(|f| f.id == feedback_id)
            .and_then(|f| f.value.clone())
    }

    async fn set_actions_running(&self, running: bool, _skip_release: bool) {
        self.state.lock().await.running = running;
    }
}

#[async_trait]
impl Pressable for TriggerControl {
    async fn plan_press(&self, pressed: bool) -> Option<RunPlan> {
        if !pressed {
            return None;
        }
        let state = self.state.lock().await;
        if state.actions.is_empty() {
            return None;
        }
        Some(RunPlan {
            actions: state.actions.clone(),
            delay_mode: self.delay_mode,
        })
    }

    async fn set_pushed(&self, _pushed: bool) {}
}

#[async_trait]
impl FeedbackHost for TriggerControl {
    async fn apply_feedback_values(
        &self,
        connector_id: &str,
        values: HashMap<String, FeedbackValue>,
    ) -> bool {
        let mut state = self.state.lock().await;
        let mut changed = false;
        for (feedback_id, value) in values {
            let Some(instance) = state
                .feedbacks
                .iter_mut()
                .find(|f| f.id == feedback_id && f.connector_id == connector_id)
            else {
                continue;
            };
            if instance.value.as_ref() != Some(&value) {
                instance.value = Some(value);
                changed = true;
            }
        }
        changed
    }
}

// ---------------------------------------------------------------------------
// Control — the closed variant set
// ---------------------------------------------------------------------------

/// An addressable automatable unit. Capabilities are queried by pattern
/// matching over the closed variant set, never by downcasting.
pub enum Control {
    Button(ButtonControl),
    PageNav(PageNavControl),
    Trigger(TriggerControl),
}

impl Control {
    pub fn as_pressable(&self) -> Option<&dyn Pressable> {
        match self {
            Self::Button(c) => Some(c),
            Self::PageNav(c) => Some(c),
            Self::Trigger(c) => Some(c),
        }
    }

    pub fn as_rotatable(&self) -> Option<&dyn Rotatable> {
        match self {
            Self::Button(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_steppable(&self) -> Option<&dyn Steppable> {
        match self {
            Self::Button(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_style_settable(&self) -> Option<&dyn StyleSettable> {
        match self {
            Self::Button(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_feedback_host(&self) -> Option<&dyn FeedbackHost> {
        match self {
            Self::Button(c) => Some(c),
            Self::Trigger(c) => Some(c),
            Self::PageNav(_) => None,
        }
    }

    /// Running indicator for delayed work owned by this control. When
    /// `running` turns false with `skip_release` unset, an in-progress press
    /// is resolved as released.
    pub async fn set_actions_running(&self, running: bool, skip_release: bool) {
        match self {
            Self::Button(c) => c.set_actions_running(running, skip_release).await,
            Self::PageNav(c) => c.set_actions_running(running, skip_release).await,
            Self::Trigger(c) => c.set_actions_running(running, skip_release).await,
        }
    }

    pub async fn is_running(&self) -> bool {
        match self {
            Self::Button(c) => c.is_running().await,
            Self::PageNav(c) => c.is_running().await,
            Self::Trigger(c) => c.is_running().await,
        }
    }
}

#[cfg(test)]
#[path = "tests/controls_tests.rs"]
mod tests;
