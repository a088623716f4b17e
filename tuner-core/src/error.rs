//! # Error Module
//!
//! Errors that can escape the engine. Per-frame numeric problems (silence,
//! NaN samples, out-of-range lags) never show up here: the level meter and
//! the pitch detector resolve them locally into sentinel readings.

/// Result alias that carries [`TunerError`].
pub type Result<T> = std::result::Result<T, TunerError>;

/// Errors surfaced to the caller of the tuning engine.
#[derive(Debug, thiserror::Error)]
pub enum TunerError {
    /// A configuration value was rejected at construction time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The configuration file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ConfigFormat(#[from] serde_json::Error),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// The capture collaborator could not be opened or failed while running.
    #[error("capture device error: {0}")]
    Device(String),
    /// A note name such as `"C#3"` could not be parsed.
    #[error("unknown note name: {0:?}")]
    UnknownNote(String),
}

impl TunerError {
    /// Creates a configuration error from a message.
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
