//! Error types for rendercache operations.

use std::fmt;

/// The primary error type for all rendercache operations.
#[derive(Debug)]
pub enum Error {
    /// Cache store read or write failed
    Store(StoreError),
    /// Batch association load failed
    Preload(PreloadError),
    /// Render callback failed or returned misaligned output
    Render(RenderError),
    /// Invalid configuration or association spec
    Config(ConfigError),
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
    /// Number of keys involved in the failed operation
    pub key_count: usize,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// `read_multi` failed
    Read,
    /// `write` failed
    Write,
    /// Store backend is unavailable
    Unavailable,
}

#[derive(Debug)]
pub struct PreloadError {
    pub kind: PreloadErrorKind,
    /// The association that was being loaded
    pub association: String,
    /// Association path of the loader that issued the request
    pub path: Vec<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreloadErrorKind {
    /// The record type has no association with this name
    UnknownAssociation,
    /// The underlying fetch failed
    Fetch,
}

#[derive(Debug)]
pub struct RenderError {
    pub kind: RenderErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderErrorKind {
    /// The callback returned a different number of outputs than it was given items
    Misaligned { expected: usize, actual: usize },
    /// The callback itself failed
    Callback,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Shorthand for an unknown-association preload error.
    pub fn unknown_association(association: impl Into<String>, table: &str) -> Self {
        let association = association.into();
        Error::Preload(PreloadError {
            kind: PreloadErrorKind::UnknownAssociation,
            message: format!("association '{association}' is not defined on '{table}'"),
            association,
            path: Vec::new(),
            source: None,
        })
    }

    /// Shorthand for a configuration error without a source.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            message: message.into(),
            source: None,
        })
    }

    /// Is this a cache store failure?
    pub fn is_store_error(&self) -> bool {
        matches!(self, Error::Store(_))
    }

    /// Is this a batch load failure for an association the record type does not define?
    pub fn is_unknown_association(&self) -> bool {
        matches!(
            self,
            Error::Preload(PreloadError {
                kind: PreloadErrorKind::UnknownAssociation,
                ..
            })
        )
    }

    /// Get the association name for preload errors.
    pub fn association(&self) -> Option<&str> {
        match self {
            Error::Preload(p) => Some(p.association.as_str()),
            _ => None,
        }
    }

    /// Attach the issuing loader's path to a preload error.
    ///
    /// Other variants are returned unchanged.
    pub fn with_path(mut self, path: &[String]) -> Self {
        if let Error::Preload(p) = &mut self {
            if p.path.is_empty() {
                p.path = path.to_vec();
            }
        }
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Store(e) => write!(f, "Cache store error: {}", e),
            Error::Preload(e) => write!(f, "Preload error: {}", e),
            Error::Render(e) => write!(f, "Render error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Preload(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Render(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.kind {
            StoreErrorKind::Read => "read",
            StoreErrorKind::Write => "write",
            StoreErrorKind::Unavailable => "access",
        };
        write!(f, "{} of {} key(s) failed: {}", op, self.key_count, self.message)
    }
}

impl fmt::Display for PreloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} (at path '{}')", self.message, self.path.join("."))
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RenderErrorKind::Misaligned { expected, actual } => write!(
                f,
                "{} (expected {} outputs, got {})",
                self.message, expected, actual
            ),
            RenderErrorKind::Callback => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::Store(err)
    }
}

impl From<PreloadError> for Error {
    fn from(err: PreloadError) -> Self {
        Error::Preload(err)
    }
}

impl From<RenderError> for Error {
    fn from(err: RenderError) -> Self {
        Error::Render(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for rendercache operations.
pub type Result<T> = std::result::Result<T, Error>;
