use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved pseudo-connector id for actions handled by the internal catalog.
pub const INTERNAL_CONNECTOR_ID: &str = "internal";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlId {
    Bank { page: u32, bank: u32 },
    Trigger { id: String },
}

impl ControlId {
    pub fn bank(page: u32, bank: u32) -> Self {
        Self::Bank { page, bank }
    }

    pub fn trigger(id: impl Into<String>) -> Self {
        Self::Trigger { id: id.into() }
    }

    /// The page this id belongs to, when it addresses a bank slot.
    pub fn page(&self) -> Option<u32> {
        match self {
            Self::Bank { page, .. } => Some(*page),
            Self::Trigger { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayMode {
    /// Each action's delay is independent of its siblings.
    #[default]
    Absolute,
    /// Each action's delay accumulates onto the delays before it.
    Relative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotateDirection {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInstance {
    /// Unique within the owning control's configuration.
    pub id: String,
    pub connector_id: String,
    pub kind: String,
    #[serde(default)]
    pub options: Value,
    /// Milliseconds. Absent or non-finite values are treated as 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<f64>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ActionInstance {
    pub fn is_internal(&self) -> bool {
        self.connector_id == INTERNAL_CONNECTOR_ID
    }

    /// The configured delay coerced to a usable value: absent, NaN,
    /// infinite, or negative delays all count as 0.
    pub fn delay_ms(&self) -> f64 {
        match self.delay {
            Some(d) if d.is_finite() && d > 0.0 => d,
            _ => 0.0,
        }
    }
}

/// Edge tag deciding which surface gesture an action set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSetName {
    Down,
    Up,
    RotateLeft,
    RotateRight,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSet {
    pub name: ActionSetName,
    /// A held set starts on press; its paired release edge is suppressed.
    #[serde(default)]
    pub run_while_held: bool,
    pub actions: Vec<ActionInstance>,
}

impl ActionSet {
    pub fn new(name: ActionSetName, actions: Vec<ActionInstance>) -> Self {
        Self {
            name,
            run_while_held: false,
            actions,
        }
    }
}

/// One of the alternative action programs a stepped control cycles through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub sets: Vec<ActionSet>,
}

impl Step {
    pub fn new(sets: Vec<ActionSet>) -> Self {
        Self { sets }
    }
}

/// A connector-computed value a control's rendering depends on. The engine
/// routes these opaquely; it never evaluates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FeedbackValue {
    Bool(bool),
    Style(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackInstance {
    pub id: String,
    pub connector_id: String,
    pub kind: String,
    #[serde(default)]
    pub options: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<FeedbackValue>,
}

/// One entry of a connector's feedback evaluation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackBatchItem {
    pub control_id: ControlId,
    pub feedback_id: String,
    pub value: FeedbackValue,
}

/// Dimensions of the addressable bank grid on one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSize {
    pub columns: u8,
    pub rows: u8,
}

impl Default for GridSize {
    fn default() -> Self {
        Self {
            columns: 8,
            rows: 4,
        }
    }
}

impl GridSize {
    pub fn banks_per_page(&self) -> u32 {
        u32::from(self.columns) * u32::from(self.rows)
    }

    /// Bank numbers of one page, 1-based.
    pub fn bank_numbers(&self) -> impl Iterator<Item = u32> {
        1..=self.banks_per_page()
    }
}
