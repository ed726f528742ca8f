//! Error types for compound file parsing.
//!
//! Every failure the parser reports falls in one of a few classes: the file is
//! structurally broken (`Format`), the caller misused the open/close lifecycle
//! (`NotOpen` / `AlreadyOpen`), a lookup missed (`ItemNotFound`), or an input
//! value was rejected (`UnsupportedCodepage` / `Argument`).
use thiserror::Error;

/// Main error type for compound file operations.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error reported by the underlying byte source
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Structural violation of the compound file format
    #[error("Invalid format: {0}")]
    Format(String),

    /// Operation requires an open file
    #[error("File is not open")]
    NotOpen,

    /// `open` called on a file that is already open
    #[error("File is already open")]
    AlreadyOpen,

    /// No item exists at the requested path
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// Codepage name outside the supported set
    #[error("Unsupported codepage: {0}")]
    UnsupportedCodepage(String),

    /// Invalid value passed to an operation
    #[error("Invalid argument: {0}")]
    Argument(String),
}

impl Error {
    /// Shorthand for building a [`Error::Format`].
    pub(crate) fn format(message: impl Into<String>) -> Self {
        Error::Format(message.into())
    }

    /// Whether this error signals a corrupt or non-compound file.
    pub fn is_format(&self) -> bool {
        matches!(self, Error::Format(_))
    }

    /// Whether this error signals misuse of the open/close lifecycle.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Error::NotOpen | Error::AlreadyOpen)
    }
}

/// Result type for compound file operations.
pub type Result<T> = std::result::Result<T, Error>;
