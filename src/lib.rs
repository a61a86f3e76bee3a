// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]

//! # PDF Seal
//!
//! Certifying PDF signer: applies a single visible signature that certifies
//! the document with DocMDP "no changes allowed", embedding the signer's
//! certificate chain and OCSP/CRL revocation evidence in a detached CMS
//! container.
//!
//! ## Features
//!
//! - **Incremental update**: the original bytes are never rewritten; classic
//!   xref tables and xref streams are both supported
//! - **CMS container**: `adbe.pkcs7.detached` with signed attributes and
//!   Adobe `revocationInfoArchival`
//! - **Credentials**: password-protected PKCS#12 stores
//! - **Revocation**: OCSP first, CRL as fallback, with a configurable policy
//!   for missing evidence
//! - **Service boundary**: content-type check and error masking for callers
//!
//! ## Quick Start
//!
//! ```ignore
//! use pdf_seal::config::{KeystoreConfig, SealConfig};
//! use pdf_seal::service::{SigningService, Upload};
//! use pdf_seal::signatures::{Pkcs12KeyProvider, RevocationCollector};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SealConfig::from_json_file("seal.json")?;
//! let keys = Arc::new(Pkcs12KeyProvider::new(config.keystore.clone()));
//! let collector = RevocationCollector::from_config(&config.revocation)?;
//! let service = SigningService::new(config, keys, collector);
//!
//! let signed = service.sign_upload(Upload {
//!     filename: "contract.pdf".into(),
//!     content_type: "application/pdf".into(),
//!     bytes: std::fs::read("contract.pdf")?,
//! })?;
//! std::fs::write("contract-signed.pdf", signed.bytes)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## License
//!
//! Licensed under either of:
//!
//! * Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
//! * MIT license ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)
//!
//! at your option.

#![warn(missing_docs)]

// Error handling
pub mod error;

// Core PDF parsing
pub mod document;
pub mod lexer;
pub mod object;
pub mod objstm;
pub mod parser;
pub mod xref;

// Stream decoders
pub mod decoders;

// Incremental writing
pub mod writer;

// Certification signatures
pub mod signatures;

// Configuration
pub mod config;

// Inbound boundary
pub mod service;

// Re-exports
pub use config::SealConfig;
pub use document::PdfDocument;
pub use error::{Error, Result};
pub use service::{SigningService, Upload};
pub use signatures::{PdfSigner, SignOptions, SignaturePlacement, SignedDocument, SigningIdentity};

// Version info
/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.starts_with("0."));
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "pdf_seal");
    }
}
