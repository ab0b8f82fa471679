use std::time::Duration;

use kube::api::GroupVersionKind;
use serde::Deserialize;
use thiserror::Error;
use typed_builder::TypedBuilder;

use crate::Result;

const DEFAULT_STATUS_REQUEUE_SECONDS: u64 = 30;

fn default_enable_reference_grants() -> bool {
    true
}

fn default_status_requeue_seconds() -> u64 {
    DEFAULT_STATUS_REQUEUE_SECONDS
}

/// A kind of object reporting whether a backend service is programmed.
#[derive(Clone, Debug, TypedBuilder, Deserialize, PartialEq, Eq)]
pub struct BackendKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl From<&BackendKind> for GroupVersionKind {
    fn from(backend_kind: &BackendKind) -> Self {
        GroupVersionKind::gvk(&backend_kind.group, &backend_kind.version, &backend_kind.kind)
    }
}

#[derive(Debug, TypedBuilder, Deserialize)]
pub struct Configuration {
    pub controller_name: String,
    pub gateway_controller_name: String,
    pub field_manager: String,
    #[builder(default = true)]
    #[serde(default = "default_enable_reference_grants")]
    pub enable_reference_grants: bool,
    #[builder(default = DEFAULT_STATUS_REQUEUE_SECONDS)]
    #[serde(default = "default_status_requeue_seconds")]
    pub status_requeue_seconds: u64,
    #[builder(default)]
    #[serde(default)]
    pub backend_kinds: Vec<BackendKind>,
    #[builder(default)]
    pub enable_open_telemetry: Option<bool>,
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigurationError {
    #[error("controller name must be not empty")]
    ControllerName,
    #[error("gateway controller name must be not empty")]
    GatewayControllerName,
    #[error("field manager must be not empty")]
    FieldManager,
    #[error("status requeue interval must be positive")]
    StatusRequeue,
    #[error("backend kind {0} is incomplete")]
    BackendKind(String),
}

impl Configuration {
    pub fn validate(&self) -> Result<()> {
        if self.controller_name.is_empty() {
            return Err(ConfigurationError::ControllerName.into());
        }
        if self.gateway_controller_name.is_empty() {
            return Err(ConfigurationError::GatewayControllerName.into());
        }
        if self.field_manager.is_empty() {
            return Err(ConfigurationError::FieldManager.into());
        }
        if self.status_requeue_seconds == 0 {
            return Err(ConfigurationError::StatusRequeue.into());
        }
        if let Some(backend_kind) = self.backend_kinds.iter().find(|b| b.version.is_empty() || b.kind.is_empty()) {
            return Err(ConfigurationError::BackendKind(format!("{}/{}/{}", backend_kind.group, backend_kind.version, backend_kind.kind)).into());
        }
        Ok(())
    }

    pub fn status_requeue(&self) -> Duration {
        Duration::from_secs(self.status_requeue_seconds)
    }
}
