//! The inbound boundary: configuration from disk, media type gate, error masking.

use pdf_seal::config::{KeystoreConfig, SealConfig};
use pdf_seal::service::{ServiceError, SigningService, Upload, PDF_CONTENT_TYPE};
use pdf_seal::signatures::{Pkcs12KeyProvider, RevocationCollector, RevocationPolicy};
use pdf_seal::PdfDocument;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

const ONE_PAGE: &[u8] = include_bytes!("fixtures/one_page.pdf");

fn store_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/signer.p12")
}

fn service_for(config: SealConfig) -> SigningService {
    let _ = env_logger::builder().is_test(true).try_init();
    let keys = Arc::new(Pkcs12KeyProvider::new(config.keystore.clone()));
    SigningService::new(config, keys, RevocationCollector::disabled())
}

fn upload(content_type: &str, bytes: &[u8]) -> Upload {
    Upload {
        filename: "contract.pdf".to_string(),
        content_type: content_type.to_string(),
        bytes: bytes.to_vec(),
    }
}

#[test]
fn test_sign_upload_with_config_file() {
    let json = serde_json::json!({
        "keystore": { "path": store_path(), "passphrase": "123456" },
        "revocation": { "policy": "best-effort", "ocsp": false, "crl": false },
        "placement": { "page": 1, "label": "Certified by\nAccounts" },
        "reason": "Archived"
    });
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(json.to_string().as_bytes()).unwrap();

    let config = SealConfig::from_json_file(file.path()).unwrap();
    assert_eq!(config.placement.label, "Certified by\nAccounts");
    let service = service_for(config);
    assert_eq!(service.ping(), "pong");

    let signed = service.sign_upload(upload(PDF_CONTENT_TYPE, ONE_PAGE)).unwrap();
    assert_eq!(signed.filename, "contract.pdf");
    assert_eq!(signed.content_type, "application/pdf");
    // Collector is disabled, so the leaf goes without evidence.
    assert_eq!(signed.warnings.len(), 1);

    let mut doc = PdfDocument::open(signed.bytes).unwrap();
    assert!(doc.has_certification().unwrap());
    let sig = doc.signature_dictionary("signature").unwrap().unwrap();
    assert_eq!(sig["Reason"].as_string(), Some(&b"Archived"[..]));
}

#[test]
fn test_wrong_media_type_never_reaches_the_engine() {
    // An unusable store proves the engine is not invoked.
    let config = SealConfig::new(KeystoreConfig::new("/nonexistent/store.p12", "x"));
    let service = service_for(config);

    let err = service.sign_upload(upload("application/octet-stream", ONE_PAGE)).unwrap_err();
    match err {
        ServiceError::UnsupportedMediaType(mime) => assert_eq!(mime, "application/octet-stream"),
        other => panic!("expected UnsupportedMediaType, got {:?}", other),
    }
}

#[test]
fn test_failures_are_masked() {
    let cases = [
        // credential store missing
        (SealConfig::new(KeystoreConfig::new("/nonexistent/store.p12", "123456")), ONE_PAGE.to_vec()),
        // wrong passphrase
        (SealConfig::new(KeystoreConfig::new(store_path(), "nope")), ONE_PAGE.to_vec()),
        // not a PDF
        (SealConfig::new(KeystoreConfig::new(store_path(), "123456")), b"%PDF-garbage".to_vec()),
        // evidence required but unavailable
        (
            SealConfig::new(KeystoreConfig::new(store_path(), "123456"))
                .with_revocation_policy(RevocationPolicy::Require),
            ONE_PAGE.to_vec(),
        ),
    ];

    for (config, bytes) in cases {
        let err = service_for(config).sign_upload(upload(PDF_CONTENT_TYPE, &bytes)).unwrap_err();
        assert!(matches!(err, ServiceError::SigningFailed));
        let message = err.to_string();
        assert!(!message.contains("nonexistent"));
        assert!(!message.contains("123456"));
    }
}

#[test]
fn test_already_signed_upload_fails() {
    let service = service_for(SealConfig::new(KeystoreConfig::new(store_path(), "123456")));
    let first = service.sign_upload(upload(PDF_CONTENT_TYPE, ONE_PAGE)).unwrap();
    let err = service.sign_upload(upload(PDF_CONTENT_TYPE, &first.bytes)).unwrap_err();
    assert!(matches!(err, ServiceError::SigningFailed));
}
