//! Error taxonomy for tile and fragment extraction
//!
//! Every failure inside the engine is one of these variants. Errors are
//! attached to the tile or locus they affect; nothing escapes the engine
//! boundary as a panic.

use thiserror::Error;

/// Errors that can occur while locating, reading or rendering a dataset
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TileError {
    #[error("{message}")]
    NotFound { message: String },

    #[error("{message}")]
    Malformed { message: String },

    #[error("{message}")]
    OutOfBounds { message: String },

    #[error("{message}")]
    TooLarge { message: String },

    #[error("Corrupt dataset: {message}")]
    Corrupt { message: String },

    #[error("Read deadline of {seconds}s elapsed")]
    Timeout { seconds: u64 },

    #[error("Unsupported: {message}")]
    Unsupported { message: String },
}

impl TileError {
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound { message: message.into() }
    }

    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::Malformed { message: message.into() }
    }

    pub fn out_of_bounds<S: Into<String>>(message: S) -> Self {
        Self::OutOfBounds { message: message.into() }
    }

    pub fn too_large<S: Into<String>>(message: S) -> Self {
        Self::TooLarge { message: message.into() }
    }

    pub fn corrupt<S: Into<String>>(message: S) -> Self {
        Self::Corrupt { message: message.into() }
    }

    pub fn timeout(seconds: u64) -> Self {
        Self::Timeout { seconds }
    }

    pub fn unsupported<S: Into<String>>(message: S) -> Self {
        Self::Unsupported { message: message.into() }
    }

    /// Stable machine-readable name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NotFound",
            Self::Malformed { .. } => "Malformed",
            Self::OutOfBounds { .. } => "OutOfBounds",
            Self::TooLarge { .. } => "TooLarge",
            Self::Corrupt { .. } => "Corrupt",
            Self::Timeout { .. } => "Timeout",
            Self::Unsupported { .. } => "Unsupported",
        }
    }
}

impl From<std::io::Error> for TileError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(err.to_string()),
            _ => Self::corrupt(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for TileError {
    fn from(err: rusqlite::Error) -> Self {
        Self::corrupt(format!("SQLite error: {}", err))
    }
}

impl From<serde_json::Error> for TileError {
    fn from(err: serde_json::Error) -> Self {
        Self::malformed(format!("JSON error: {}", err))
    }
}

#[cfg(feature = "hdf5")]
impl From<hdf5::Error> for TileError {
    fn from(err: hdf5::Error) -> Self {
        Self::corrupt(format!("HDF5 error: {}", err))
    }
}

/// Result type for engine operations
pub type TileResult<T> = Result<T, TileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = TileError::not_found("Unknown tileset");
        assert!(matches!(err, TileError::NotFound { .. }));
        assert_eq!(err.to_string(), "Unknown tileset");
        assert_eq!(err.kind(), "NotFound");
    }

    #[test]
    fn test_timeout_display() {
        assert_eq!(TileError::timeout(30).to_string(), "Read deadline of 30s elapsed");
    }

    #[test]
    fn test_io_error_conversion() {
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        assert_eq!(TileError::from(missing).kind(), "NotFound");

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(TileError::from(denied).kind(), "Corrupt");
    }
}
