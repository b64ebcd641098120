//! Error handling for the gtile CLI

use gtile_core::TileError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for gtile CLI operations
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Input/Output error: {message}")]
    Io { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid input in {file}: {message}")]
    Input { file: String, message: String },

    #[error("Dataset error: {0}")]
    Dataset(#[from] TileError),
}

impl CliError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn file_not_found(path: PathBuf) -> Self {
        Self::FileNotFound { path }
    }

    pub fn input<F: Into<String>, S: Into<String>>(file: F, message: S) -> Self {
        Self::Input {
            file: file.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io { message: err.to_string() }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::Io { message: format!("JSON output error: {}", err) }
    }
}

impl From<toml::de::Error> for CliError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(format!("TOML parsing error: {}", err))
    }
}

impl From<toml::ser::Error> for CliError {
    fn from(err: toml::ser::Error) -> Self {
        Self::config(format!("TOML serialization error: {}", err))
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Append hints for the errors users can fix themselves
pub fn format_error_with_suggestions(error: &CliError) -> String {
    let mut message = error.to_string();

    match error {
        CliError::FileNotFound { path } => {
            message.push_str(&format!(
                "\n\nSuggestions:\n\
                 • Check that the file path is correct: {}\n\
                 • Relative dataset paths resolve against the working directory",
                path.display()
            ));
        }

        CliError::Config { .. } => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Check your gtile.toml configuration file\n\
                 • Use 'gtile config --example' to generate a sample configuration",
            );
        }

        CliError::Dataset(TileError::Unsupported { message: detail }) if detail.contains("feature") => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Rebuild with the named cargo feature, e.g. `cargo install gtile-cli --features hdf5`",
            );
        }

        CliError::Dataset(TileError::TooLarge { .. }) => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Lower --dims, or raise engine.max_fragment_dims in gtile.toml",
            );
        }

        _ => {}
    }

    message
}
