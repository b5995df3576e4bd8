use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::domain::{ActionInstance, ControlId};

use crate::controls::Control;

/// Ambient information about the surface event that started a run, passed
/// through to connectors untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl RunContext {
    pub fn from_device(device_id: Option<&str>, page: Option<u32>) -> Self {
        Self {
            device_id: device_id.map(str::to_owned),
            page,
        }
    }
}

/// A live connector able to execute actions. The scheduler hands actions off
/// without awaiting completion, so `action_run` may take as long as the
/// action needs.
#[async_trait]
pub trait ConnectorHandle: Send + Sync {
    async fn action_run(
        &self,
        action: &ActionInstance,
        control_id: &ControlId,
        ctx: &RunContext,
    ) -> Result<()>;
}

pub trait ConnectorRegistry: Send + Sync {
    fn get_connector(&self, connector_id: &str) -> Option<Arc<dyn ConnectorHandle>>;
}

pub trait ControlRegistry: Send + Sync {
    fn get_control(&self, id: &ControlId) -> Option<Arc<Control>>;
}

#[derive(Default)]
pub struct MemoryConnectorRegistry {
    connectors: RwLock<HashMap<String, Arc<dyn ConnectorHandle>>>,
}

impl MemoryConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, connector_id: impl Into<String>, handle: Arc<dyn ConnectorHandle>) {
        if let Ok(mut connectors) = self.connectors.write() {
            connectors.insert(connector_id.into(), handle);
        }
    }

    pub fn remove(&self, connector_id: &str) {
        if let Ok(mut connectors) = self.connectors.write() {
            connectors.remove(connector_id);
        }
    }
}

impl ConnectorRegistry for MemoryConnectorRegistry {
    fn get_connector(&self, connector_id: &str) -> Option<Arc<dyn ConnectorHandle>> {
        self.connectors
            .read()
            .ok()
            .and_then(|connectors| connectors.get(connector_id).cloned())
    }
}

#[derive(Default)]
pub struct MemoryControlRegistry {
    controls: RwLock<HashMap<ControlId, Arc<Control>>>,
}

impl MemoryControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: ControlId, control: Arc<Control>) {
        if let Ok(mut controls) = self.controls.write() {
            controls.insert(id, control);
        }
    }

    pub fn remove(&self, id: &ControlId) {
        if let Ok(mut controls) = self.controls.write() {
            controls.remove(id);
        }
    }
}

impl ControlRegistry for MemoryControlRegistry {
    fn get_control(&self, id: &ControlId) -> Option<Arc<Control>> {
        self.controls
            .read()
            .ok()
            .and_then(|controls| controls.get(id).cloned())
    }
}
