use thiserror::Error;

/// Result type for file transfer operations
pub type FileResult<T> = Result<T, FileError>;

/// Errors that can occur during file transfer operations
#[derive(Error, Debug)]
pub enum FileError {
    #[error("Invalid file id format: {id:?}")]
    InvalidIdFormat { id: String },

    #[error("File length is undefined for id {id}")]
    UndefinedLength { id: String },

    #[error("File length {length} exceeds the in-memory limit of {max} bytes")]
    LengthExceeded { length: u64, max: u64 },

    #[error("File not found: {id}")]
    NotFound { id: String },

    #[error("Store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Metadata deserialization failed: {message}")]
    Deserialization { message: String },

    #[error("Metadata serialization failed: {message}")]
    Serialization { message: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl FileError {
    /// Create an invalid id error
    pub fn invalid_id<S: Into<String>>(id: S) -> Self {
        Self::InvalidIdFormat { id: id.into() }
    }

    /// Create an undefined length error
    pub fn undefined_length<S: Into<String>>(id: S) -> Self {
        Self::UndefinedLength { id: id.into() }
    }

    /// Create a length exceeded error
    pub fn length_exceeded(length: u64, max: u64) -> Self {
        Self::LengthExceeded { length, max }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(id: S) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Wrap any store-side failure, keeping every message of its source chain
    pub fn store_unavailable(error: &(dyn std::error::Error + 'static)) -> Self {
        Self::StoreUnavailable {
            message: error_chain(error).join("\n"),
        }
    }

    /// Create a deserialization error
    pub fn deserialization<E: std::fmt::Display>(error: E) -> Self {
        Self::Deserialization {
            message: error.to_string(),
        }
    }

    /// Create a serialization error
    pub fn serialization<E: std::fmt::Display>(error: E) -> Self {
        Self::Serialization {
            message: error.to_string(),
        }
    }
}

/// Errors reported by store implementations.
///
/// The manager never hands these to callers directly: `Cancelled` becomes the
/// cancelled outcome and everything else is folded into a [`FileError`].
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("file not found: {id}")]
    NotFound { id: String },

    #[error("store unavailable")]
    Unavailable {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("stream error")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Create an unavailable error from any error type
    pub fn unavailable<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Unavailable {
            source: error.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(id: S) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<StoreError> for FileError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id } => FileError::NotFound { id },
            StoreError::Io { source } => FileError::Io { source },
            other => FileError::store_unavailable(&other),
        }
    }
}

/// Collect the non-empty messages of an error and all of its sources
pub fn error_chain(error: &(dyn std::error::Error + 'static)) -> Vec<String> {
    let mut messages = Vec::new();
    let mut current = Some(error);
    while let Some(err) = current {
        let message = err.to_string();
        if !message.is_empty() {
            messages.push(message);
        }
        current = err.source();
    }
    messages
}
