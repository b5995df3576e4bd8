use thiserror::Error;

use crate::domain::ControlId;

/// Failure taxonomy of the dispatch engine. Everything except
/// `InvalidArgument` is absorbed and logged at the dispatch boundary;
/// `InvalidArgument` indicates collaborator misuse and propagates to the
/// caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("unknown control: {0}")]
    UnknownControl(ControlId),

    #[error("unknown connector: {0}")]
    UnknownConnector(String),

    #[error("connector execution failed for '{connector_id}': {message}")]
    ConnectorExecution {
        connector_id: String,
        message: String,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
