//! Error types for the signing engine.
//!
//! Every fatal condition of a signing operation maps to exactly one variant.
//! Nothing here is recoverable inside the engine: a returned error means no
//! output bytes were produced.

use std::path::PathBuf;

/// Result type alias for signing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while opening, signing or writing a PDF.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input is not a well-formed PDF, or cannot be modified (e.g. encrypted)
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// The target signature field is already signed, or the document is already certified
    #[error("Document already signed: {0}")]
    AlreadySigned(String),

    /// The finished signature container does not fit the reserved placeholder
    #[error("Signature container ({required} bytes) exceeds reserved space ({available} bytes)")]
    ContainerOverflow {
        /// Size of the DER-encoded container
        required: usize,
        /// Size reserved in /Contents (in bytes, not hex digits)
        available: usize,
    },

    /// Requested page does not exist
    #[error("Page {page} out of range (document has {count} pages)")]
    PageOutOfRange {
        /// 1-based page number that was requested
        page: usize,
        /// Number of pages in the document
        count: usize,
    },

    /// Credential store passphrase rejected
    #[error("Invalid credential store passphrase")]
    InvalidPassphrase,

    /// Credential store does not exist
    #[error("Credential store not found: {}", .0.display())]
    StoreNotFound(PathBuf),

    /// Credential store holds no usable private-key entry
    #[error("Credential store contains no matching private-key entry")]
    NoKeyEntry,

    /// Key does not match the certificate, or the signature scheme does not fit the key
    #[error("Key usage error: {0}")]
    KeyUsage(String),

    /// Malformed certificate, key, or ASN.1 structure
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Revocation evidence is required by policy but could not be gathered
    #[error("Revocation evidence unavailable: {0}")]
    RevocationUnavailable(String),

    /// Transport failure while talking to an OCSP responder or CRL endpoint
    #[error("Network error: {0}")]
    Network(String),

    /// Parse error at a specific byte offset
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where the error occurred
        offset: usize,
        /// Reason for the failure
        reason: String,
    },

    /// Invalid cross-reference table
    #[error("Invalid cross-reference table")]
    InvalidXref,

    /// Referenced object not found in the cross-reference table
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for failures caused by credentials or their configuration.
    pub fn is_credential_error(&self) -> bool {
        matches!(self, Error::InvalidPassphrase | Error::StoreNotFound(_) | Error::NoKeyEntry)
    }

    /// Recast low-level parse failures as [`Error::MalformedDocument`].
    ///
    /// Every other variant passes through unchanged.
    pub fn into_malformed(self) -> Error {
        match self {
            Error::ParseError { .. } | Error::InvalidXref | Error::ObjectNotFound(..) | Error::Decode(_) => {
                Error::MalformedDocument(self.to_string())
            },
            other => other,
        }
    }
}

impl From<der::Error> for Error {
    fn from(err: der::Error) -> Self {
        Error::Encoding(err.to_string())
    }
}
