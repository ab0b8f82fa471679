use std::time::Duration;

pub mod backend_status;
pub mod hybrid_gateway;
pub mod route_status;
pub mod status;
mod utils;

pub use utils::{check_reference_grant, FromResourceKey, HostnameMatchFilter, LabelSelectorMatcher, ListenerMatch, RouteListenerMatcher, ToResourceKey};

use crate::{services::ClientError, state::StorageError};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ControllerError {
    InvalidPayload(String),
    Conflict { gvk: String, key: String, message: String },
    Client { gvk: String, key: String, error: ClientError },
    InvalidSelector(String),
    Storage(StorageError),
    Translation(String),
    TypeMismatch(String),
    GarbageCollection { gvk: String, namespace: String, error: Box<ControllerError> },
}

impl std::fmt::Display for ControllerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<StorageError> for ControllerError {
    fn from(error: StorageError) -> Self {
        ControllerError::Storage(error)
    }
}

impl ControllerError {
    /// Wraps a client error with the object it was about. Conflicts become [`ControllerError::Conflict`].
    pub fn client(gvk: impl Into<String>, key: impl Into<String>, error: ClientError) -> Self {
        match error {
            ClientError::Conflict(message) => ControllerError::Conflict { gvk: gvk.into(), key: key.into(), message },
            error => ControllerError::Client { gvk: gvk.into(), key: key.into(), error },
        }
    }

    pub fn is_conflict(&self) -> bool {
        match self {
            ControllerError::Conflict { .. } => true,
            ControllerError::GarbageCollection { error, .. } => error.is_conflict(),
            _ => false,
        }
    }
}

pub(crate) const RECONCILE_LONG_WAIT: Duration = Duration::from_secs(3600);
pub(crate) const RECONCILE_ERROR_WAIT: Duration = Duration::from_secs(100);
pub(crate) const RECONCILE_SHORT_WAIT: Duration = Duration::from_secs(1);
