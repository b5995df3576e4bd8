//! Routing of connector-reported feedback values to their owning controls.

use std::{collections::HashMap, sync::Arc};

use shared::{
    domain::{ControlId, FeedbackBatchItem, FeedbackValue},
    error::EngineError,
};
use tracing::debug;

use crate::registry::ControlRegistry;

/// Pure router for feedback batches: groups by owning control, forwards
/// per-control value maps, and never evaluates or renders anything itself.
pub struct FeedbackAggregator {
    controls: Arc<dyn ControlRegistry>,
}

impl FeedbackAggregator {
    pub fn new(controls: Arc<dyn ControlRegistry>) -> Self {
        Self { controls }
    }

    /// Forward one connector's evaluation pass. Within the batch, the last
    /// value wins per feedback id of the same control; controls unknown to
    /// the registry are skipped.
    pub async fn update_feedback_values(&self, connector_id: &str, batch: Vec<FeedbackBatchItem>) {
        if batch.is_empty() {
            return;
        }

        // Group in first-seen control order.
        let mut grouped: Vec<(ControlId, HashMap<String, FeedbackValue>)> = Vec::new();
        for item in batch {
            match grouped.iter_mut().find(|(id, _)| *id == item.control_id) {
                Some((_, values)) => {
                    values.insert(item.feedback_id, item.value);
                }
                None => {
                    let mut values = HashMap::new();
                    values.insert(item.feedback_id, item.value);
                    grouped.push((item.control_id, values));
                }
            }
        }

        for (control_id, values) in grouped {
            let Some(control) = self.controls.get_control(&control_id) else {
                let err = EngineError::UnknownControl(control_id.clone());
                debug!("feedback: dropping values, {err}");
                continue;
            };
            let Some(host) = control.as_feedback_host() else {
                debug!("feedback: control hosts no feedbacks control={control_id}");
                continue;
            };
            host.apply_feedback_values(connector_id, values).await;
        }
    }
}

#[cfg(test)]
#[path = "tests/feedback_tests.rs"]
mod tests;
