use thiserror::Error;

/// Errors raised while writing or reading a persisted process.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("serialization error: invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("serialization error: unsupported format version {0}")]
    UnsupportedVersion(u64),

    /// A tagged value whose prefix is not recognised.
    #[error("serialization error: unsupported tagged value '{0}'")]
    UnsupportedTag(String),

    /// A tag was recognised but its payload does not parse.
    #[error("serialization error: malformed value '{value}': {reason}")]
    MalformedValue { value: String, reason: String },

    /// A host object that can neither be referenced by id nor written as a
    /// blob.
    #[error("serialization error: unsupported object of type '{type_name}'")]
    UnsupportedObject { type_name: String },

    #[error("serialization error: unknown opcode {opcode} at instruction {index}")]
    UnknownInstruction { index: usize, opcode: u64 },

    #[error("serialization error: unknown operator '{symbol}' at instruction {index}")]
    UnknownOperator { index: usize, symbol: String },

    #[error("serialization error: malformed instruction {index}: {reason}")]
    MalformedInstruction { index: usize, reason: String },

    #[error("serialization error: malformed process: {reason}")]
    MalformedProcess { reason: String },

    /// No blob decoder is registered for the type.
    #[error("serialization error: unknown blob type '{0}'")]
    UnknownBlobType(String),

    #[error("serialization error: cannot decode '{type_name}' blob: {message}")]
    Blob { type_name: String, message: String },

    /// Eager deserialization only: no resolver supports the id.
    #[error("serialization error: reference not found: {0}")]
    ReferenceNotFound(String),

    #[error("serialization error: binary program: {0}")]
    Binary(String),
}

impl SerializationError {
    pub(crate) fn malformed_value(value: &str, reason: impl Into<String>) -> Self {
        SerializationError::MalformedValue {
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_process(reason: impl Into<String>) -> Self {
        SerializationError::MalformedProcess {
            reason: reason.into(),
        }
    }
}
