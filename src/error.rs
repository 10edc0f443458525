use thiserror::Error;

use crate::kind::ObjectKind;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Continuation required to read '{field}' on {kind}")]
    ContinuationRequired { kind: ObjectKind, field: String },

    #[error("setWithWorker is not supported on {0} objects")]
    WorkerUnsupported(ObjectKind),

    #[error("Object is not registered under its identity: {0}")]
    NotRegistered(String),

    #[error("Identity already registered: {0}")]
    DuplicateIdentity(String),

    #[error("Unknown object kind: {0}")]
    UnknownKind(String),

    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    #[error("Bad argument to {capability}: {reason}")]
    BadArgument { capability: String, reason: String },

    #[error("{capability} returned an unexpected value, expected {expected}")]
    UnexpectedReturn {
        capability: String,
        expected: &'static str,
    },

    #[error("Capability not bound in this sandbox: {0}")]
    Unbound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl SandboxError {
    pub(crate) fn bad_argument(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        SandboxError::BadArgument {
            capability: capability.into(),
            reason: reason.into(),
        }
    }
}

pub type SandboxResult<T> = Result<T, SandboxError>;
