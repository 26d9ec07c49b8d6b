//! Error taxonomy shared by both sides of the bridge.
//!
//! Every error carries a stable code plus the implicated key or registration
//! id where applicable, so it can be wrapped for the wire and reconstructed
//! on the far side without native exception serialization.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{EntityKey, RegistrationId};

/// Errors that can occur during bridge operations.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// The entity key is not registered on the privileged side.
    #[error("entity not found: {key}")]
    EntityNotFound { key: EntityKey },

    /// Peer writes are disallowed for this entity or coordinator.
    #[error("writes to {key} are forbidden")]
    WriteForbidden { key: EntityKey },

    /// A changed value failed the serialization guard before broadcast.
    #[error("serialization failed for {key}: {reason}")]
    SerializationFailed { key: EntityKey, reason: String },

    /// A caller-supplied validator rejected an outbound write.
    #[error("validation rejected write to {key}: {reason}")]
    ValidationFailed { key: EntityKey, reason: String },

    /// No method table is registered under this id.
    #[error("no method table registered under {registration}")]
    ServiceNotFound { registration: RegistrationId },

    /// The method table exists but has no such method.
    #[error("method {method} not found in {registration}")]
    MethodNotFound {
        registration: RegistrationId,
        method: String,
    },

    /// The transport refused or dropped a message.
    #[error("transport failed: {0}")]
    TransportFailed(String),

    /// An operation that must happen at most once happened again.
    #[error("already initialized: {0}")]
    AlreadyInitialized(String),
}

impl BridgeError {
    /// The stable code carried across the transport for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            BridgeError::EntityNotFound { .. } => ErrorCode::EntityNotFound,
            BridgeError::WriteForbidden { .. } => ErrorCode::WriteForbidden,
            BridgeError::SerializationFailed { .. } => ErrorCode::SerializationFailed,
            BridgeError::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            BridgeError::ServiceNotFound { .. } => ErrorCode::ServiceNotFound,
            BridgeError::MethodNotFound { .. } => ErrorCode::MethodNotFound,
            BridgeError::TransportFailed(_) => ErrorCode::TransportFailed,
            BridgeError::AlreadyInitialized(_) => ErrorCode::AlreadyInitialized,
        }
    }
}

/// Stable, serializable error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    EntityNotFound,
    WriteForbidden,
    SerializationFailed,
    ValidationFailed,
    ServiceNotFound,
    MethodNotFound,
    TransportFailed,
    AlreadyInitialized,
}

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Sink for errors that surface on background tasks, where no caller is
/// waiting on a result.
pub type ErrorSink = std::sync::Arc<dyn Fn(BridgeError) + Send + Sync>;
