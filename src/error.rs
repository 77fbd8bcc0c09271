//! Error types for wordstream operations.

use thiserror::Error;

/// Terminal failures that abort parsing of a single file.
///
/// Problems confined to one structural unit never surface here; adapters
/// record them as warnings on the [`ParsedBook`](crate::ParsedBook) and keep
/// going.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Malformed container: {0}")]
    MalformedContainer(String),

    #[error("This book is protected by DRM and cannot be opened")]
    DrmProtected,

    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),

    #[error("No readable words found in document")]
    EmptyDocument,

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid EPUB: {0}")]
    InvalidEpub(String),
}

/// Machine-distinguishable category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ErrorKind {
    /// Structurally invalid container (record table, archive, package).
    MalformedContainer,
    /// Encrypted content. There is no workaround.
    DrmProtected,
    /// The file uses a codec that is not implemented.
    UnsupportedCompression,
    /// Structurally fine, but nothing to read.
    EmptyDocument,
    /// No adapter accepts the file.
    UnsupportedFormat,
    /// Reading the input failed.
    Io,
}

impl Error {
    /// Classify this error for callers that branch on failure type.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) => ErrorKind::Io,
            Error::Zip(_) | Error::Xml(_) | Error::InvalidEpub(_) | Error::MalformedContainer(_) => {
                ErrorKind::MalformedContainer
            }
            Error::DrmProtected => ErrorKind::DrmProtected,
            Error::UnsupportedCompression(_) => ErrorKind::UnsupportedCompression,
            Error::EmptyDocument => ErrorKind::EmptyDocument,
            Error::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
        }
    }

    /// Whether retrying with the same bytes could ever succeed.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Error::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
