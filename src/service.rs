//! Inbound boundary: accepts an uploaded PDF and returns it certified.
//!
//! Callers only ever see [`ServiceError`]. Engine and credential errors are
//! logged here and collapsed into [`ServiceError::SigningFailed`], so no file
//! paths or key details leak out of the service.

use crate::config::SealConfig;
use crate::signatures::{KeyProvider, PartialEvidenceWarning, PdfSigner, RevocationCollector, SignOptions};
use std::sync::Arc;

/// The only media type accepted and produced.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// A file received by the service.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Client-side file name, echoed back
    pub filename: String,
    /// Declared media type
    pub content_type: String,
    /// File content
    pub bytes: Vec<u8>,
}

/// A certified file ready to be returned.
#[derive(Debug, Clone)]
pub struct SignedUpload {
    /// Same name as the upload
    pub filename: String,
    /// Always [`PDF_CONTENT_TYPE`]
    pub content_type: &'static str,
    /// Signed PDF
    pub bytes: Vec<u8>,
    /// Certificates that went without revocation evidence
    pub warnings: Vec<PartialEvidenceWarning>,
}

/// Errors reported to callers of the service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Nothing was uploaded
    #[error("Empty upload")]
    EmptyUpload,

    /// The upload is not declared as a PDF
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Signing failed; details are in the service log only
    #[error("Signing failed")]
    SigningFailed,
}

/// Signing service wiring configuration, credentials and revocation sources.
pub struct SigningService {
    config: SealConfig,
    keys: Arc<dyn KeyProvider>,
    signer: PdfSigner,
}

impl std::fmt::Debug for SigningService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningService")
            .field("config", &self.config)
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}

impl SigningService {
    /// Service signing with credentials from `keys` and evidence from `collector`.
    pub fn new(config: SealConfig, keys: Arc<dyn KeyProvider>, collector: RevocationCollector) -> Self {
        let signer = PdfSigner::new(config.sign_options()).with_revocation(collector);
        Self { config, keys, signer }
    }

    /// Liveness probe.
    pub fn ping(&self) -> &'static str {
        "pong"
    }

    /// Options the engine runs with.
    pub fn sign_options(&self) -> &SignOptions {
        self.signer.options()
    }

    /// Certify an uploaded PDF.
    ///
    /// The credential store is read again for every call, so a rotated
    /// store is picked up without a restart.
    pub fn sign_upload(&self, upload: Upload) -> Result<SignedUpload, ServiceError> {
        if upload.content_type != PDF_CONTENT_TYPE {
            log::warn!(
                "Rejected '{}': content type '{}' is not {}",
                upload.filename,
                upload.content_type,
                PDF_CONTENT_TYPE
            );
            return Err(ServiceError::UnsupportedMediaType(upload.content_type));
        }
        if upload.bytes.is_empty() {
            log::warn!("Rejected '{}': empty upload", upload.filename);
            return Err(ServiceError::EmptyUpload);
        }

        let identity = self.keys.load().map_err(|e| {
            if e.is_credential_error() {
                log::error!("Credential store unusable: {}", e);
            } else {
                log::error!("Failed to load signing identity: {}", e);
            }
            ServiceError::SigningFailed
        })?;
        let identity = identity.with_scheme(self.config.scheme);

        let signed = self
            .signer
            .sign(&upload.bytes, &identity, &self.config.placement)
            .map_err(|e| {
                log::error!("Failed to sign '{}': {}", upload.filename, e);
                ServiceError::SigningFailed
            })?;

        Ok(SignedUpload {
            filename: upload.filename,
            content_type: PDF_CONTENT_TYPE,
            bytes: signed.bytes,
            warnings: signed.warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeystoreConfig;
    use crate::error::{Error, Result};
    use crate::signatures::SigningIdentity;

    struct NoStore;

    impl KeyProvider for NoStore {
        fn load(&self) -> Result<SigningIdentity> {
            Err(Error::StoreNotFound("/secret/path/signer.p12".into()))
        }
    }

    fn service() -> SigningService {
        let config = SealConfig::new(KeystoreConfig::new("unused.p12", "x"));
        SigningService::new(config, Arc::new(NoStore), RevocationCollector::disabled())
    }

    fn upload(content_type: &str) -> Upload {
        Upload {
            filename: "in.pdf".to_string(),
            content_type: content_type.to_string(),
            bytes: b"%PDF-1.4\n".to_vec(),
        }
    }

    #[test]
    fn test_ping() {
        assert_eq!(service().ping(), "pong");
    }

    #[test]
    fn test_rejects_other_media_types() {
        for content_type in ["text/plain", "application/pdf; charset=binary", "APPLICATION/PDF", ""] {
            let err = service().sign_upload(upload(content_type)).unwrap_err();
            assert!(matches!(err, ServiceError::UnsupportedMediaType(_)), "{}", content_type);
        }
    }

    #[test]
    fn test_empty_upload() {
        let mut empty = upload(PDF_CONTENT_TYPE);
        empty.bytes.clear();
        assert!(matches!(service().sign_upload(empty), Err(ServiceError::EmptyUpload)));
    }

    #[test]
    fn test_credential_failure_is_masked() {
        let err = service().sign_upload(upload(PDF_CONTENT_TYPE)).unwrap_err();
        assert!(matches!(err, ServiceError::SigningFailed));
        assert!(!err.to_string().contains("/secret/path"));
    }
}
