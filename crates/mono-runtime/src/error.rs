use mono_types::error::KindError;
use mono_utils::NativePtr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BridgeError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{kind} '{name}' not found in {scope}")]
    NotFound {
        kind: &'static str,
        name: String,
        scope: String,
    },

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Managed exception {class_name} ({address}): {message}")]
    ForeignException {
        address: NativePtr,
        class_name: String,
        message: String,
    },

    #[error("Memory access failed: {0}")]
    Memory(String),

    #[error("Thread attachment failed: {0}")]
    Thread(String),
}

impl BridgeError {
    pub fn validation(message: impl Into<String>) -> Self {
        BridgeError::Validation(message.into())
    }

    pub fn not_found(kind: &'static str, name: impl Into<String>, scope: impl Into<String>) -> Self {
        BridgeError::NotFound {
            kind,
            name: name.into(),
            scope: scope.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BridgeError::NotFound { .. })
    }
}

impl From<KindError> for BridgeError {
    fn from(e: KindError) -> Self {
        BridgeError::Validation(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Turns the required-lookup form of an accessor into its `try_` form.
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for Result<T> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
