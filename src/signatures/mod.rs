//! Certification signatures for PDF documents.
//!
//! ```text
//! KeyProvider ──► SigningIdentity ─┐
//!                                  ├──► PdfSigner::sign ──► SignedDocument
//! RevocationCollector ──► evidence ┘         │
//!                        SignatureContainerBuilder (CMS, detached)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use pdf_seal::config::KeystoreConfig;
//! use pdf_seal::signatures::{KeyProvider, Pkcs12KeyProvider, PdfSigner, SignOptions, SignaturePlacement};
//!
//! let identity = Pkcs12KeyProvider::new(KeystoreConfig::new("signer.p12", "123456")).load()?;
//! let signed = PdfSigner::new(SignOptions::default())
//!     .sign(&std::fs::read("in.pdf")?, &identity, &SignaturePlacement::default())?;
//! std::fs::write("out.pdf", signed.bytes)?;
//! ```
//!
//! ## PDF Specification Reference
//!
//! - ISO 32000-1:2008 Section 12.8 - Digital Signatures
//! - ISO 32000-1:2008 Section 12.8.2.2 - DocMDP
//! - RFC 5652 - Cryptographic Message Syntax
//! - RFC 6960 - OCSP

mod appearance;
mod byterange;
mod container;
mod identity;
mod keystore;
pub mod ocsp;
mod revocation;
mod signer;
mod types;

pub use appearance::{SignatureAppearance, TIMESTAMP_FORMAT};
pub use byterange::{ByteRangeCalculator, BYTE_RANGE_PLACEHOLDER};
pub use container::{SignatureContainerBuilder, BASE_CONTAINER_SIZE};
pub use identity::{order_chain, Certificate, PrivateKeyHandle, SigningIdentity};
pub use keystore::{parse_pkcs12, KeyProvider, Pkcs12KeyProvider, StaticKeyProvider};
#[cfg(feature = "online")]
pub use revocation::{OnlineCrlClient, OnlineOcspClient};
pub use revocation::{
    CertificateEvidence, Collected, CrlClient, OcspClient, PartialEvidenceWarning, RevocationCollector,
};
pub use signer::PdfSigner;
pub use types::{
    CertificationLevel, DigestAlgorithm, RevocationPolicy, SignOptions, SignaturePlacement, SignatureScheme,
    SignedDocument,
};
