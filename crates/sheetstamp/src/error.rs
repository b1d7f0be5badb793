//! Error types for sheetstamp

use std::path::PathBuf;

use sheetstamp_xlsx::XlsxError;
use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to the presentation layer
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration file does not exist
    #[error("Configuration file not found at {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// Configuration file exists but could not be read
    #[error("Failed to read configuration {}: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration is not valid JSON or has the wrong shape
    #[error("Invalid configuration {}: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration could not be written back
    #[error("Failed to save configuration {}: {source}", .path.display())]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No template with this category/name in the configuration
    #[error("Template not found: {category} / {template}")]
    TemplateNotFound { category: String, template: String },

    /// The template's spreadsheet is missing on disk
    #[error("Template file not found: {}", .0.display())]
    TemplateFileNotFound(PathBuf),

    /// Missing or malformed user input (quantity, serial number)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A generated document could not be written
    #[error("Failed to write {}: {source}", .path.display())]
    FileWrite {
        path: PathBuf,
        #[source]
        source: XlsxError,
    },

    /// A batch stopped partway; `completed` files remain on disk
    #[error("Generation stopped after {} file(s): {source}", .completed.len())]
    BatchAborted {
        completed: Vec<PathBuf>,
        #[source]
        source: Box<Error>,
    },

    /// Template workbook could not be read
    #[error("Spreadsheet error: {0}")]
    Xlsx(#[from] XlsxError),
}

impl Error {
    /// Create an invalid-input error with a message
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Error::InvalidInput(msg.into())
    }
}
