//! Configuration for the signing service.
//!
//! Loaded from JSON; every field has a default except the credential store,
//! which must be supplied by the deployment.
//!
//! ```json
//! {
//!   "keystore": { "path": "/etc/pdf-seal/signer.p12", "passphrase": "...", "alias": "signer" },
//!   "scheme": "rsa-sha512",
//!   "revocation": { "policy": "best-effort", "timeout_secs": 10 },
//!   "placement": { "page": 1, "left": 25, "bottom": 25 }
//! }
//! ```

use crate::error::{Error, Result};
use crate::signatures::{RevocationPolicy, SignOptions, SignaturePlacement, SignatureScheme};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Location and secret of the PKCS#12 credential store.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct KeystoreConfig {
    /// Path of the `.p12` / `.pfx` file
    pub path: PathBuf,
    /// Store passphrase
    pub passphrase: String,
    /// `friendlyName` of the key entry to use
    #[serde(default)]
    pub alias: Option<String>,
}

impl std::fmt::Debug for KeystoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeystoreConfig")
            .field("path", &self.path)
            .field("passphrase", &"[REDACTED]")
            .field("alias", &self.alias)
            .finish()
    }
}

impl KeystoreConfig {
    /// Store at `path` protected by `passphrase`.
    pub fn new(path: impl Into<PathBuf>, passphrase: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            passphrase: passphrase.into(),
            alias: None,
        }
    }

    /// Select the key entry by `friendlyName`.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// Revocation evidence settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevocationConfig {
    /// What to do when evidence is missing
    pub policy: RevocationPolicy,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Query OCSP responders
    pub ocsp: bool,
    /// Download CRLs
    pub crl: bool,
}

impl Default for RevocationConfig {
    fn default() -> Self {
        Self {
            policy: RevocationPolicy::BestEffort,
            timeout_secs: 10,
            ocsp: true,
            crl: true,
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SealConfig {
    /// Credential store
    pub keystore: KeystoreConfig,
    /// Signature scheme, validated against the key at signing time
    #[serde(default)]
    pub scheme: SignatureScheme,
    /// Revocation evidence settings
    #[serde(default)]
    pub revocation: RevocationConfig,
    /// Visible signature placement
    #[serde(default)]
    pub placement: SignaturePlacement,
    /// Signature field name
    #[serde(default = "default_field_name")]
    pub field_name: String,
    /// Reserved container size in bytes; estimated when absent
    #[serde(default)]
    pub estimated_size: Option<usize>,
    /// Reason recorded in the signature dictionary
    #[serde(default)]
    pub reason: Option<String>,
    /// Location recorded in the signature dictionary
    #[serde(default)]
    pub location: Option<String>,
    /// Contact information recorded in the signature dictionary
    #[serde(default)]
    pub contact_info: Option<String>,
}

fn default_field_name() -> String {
    "signature".to_string()
}

impl SealConfig {
    /// Configuration with defaults around `keystore`.
    pub fn new(keystore: KeystoreConfig) -> Self {
        Self {
            keystore,
            scheme: SignatureScheme::default(),
            revocation: RevocationConfig::default(),
            placement: SignaturePlacement::default(),
            field_name: default_field_name(),
            estimated_size: None,
            reason: None,
            location: None,
            contact_info: None,
        }
    }

    /// Parse a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        log::debug!("Loading configuration from {}", path.display());
        Self::from_json_str(&json)
    }

    /// Reject values that could never produce a signature.
    pub fn validate(&self) -> Result<()> {
        if self.field_name.is_empty() {
            return Err(Error::Config("field_name must not be empty".to_string()));
        }
        if self.placement.page == 0 {
            return Err(Error::Config("placement.page is 1-based".to_string()));
        }
        let placement = &self.placement;
        let geometry = [
            ("left", placement.left),
            ("bottom", placement.bottom),
            ("width", placement.width),
            ("height", placement.height),
            ("font_size", placement.font_size),
        ];
        if let Some((name, value)) = geometry.iter().find(|(_, v)| !v.is_finite()) {
            return Err(Error::Config(format!("placement.{} must be finite, got {}", name, value)));
        }
        if placement.width <= 0.0 || placement.height <= 0.0 || placement.font_size <= 0.0 {
            return Err(Error::Config("placement width, height and font_size must be positive".to_string()));
        }
        if self.estimated_size == Some(0) {
            return Err(Error::Config("estimated_size must be positive".to_string()));
        }
        Ok(())
    }

    /// Set the signature scheme.
    pub fn with_scheme(mut self, scheme: SignatureScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Set the revocation settings.
    pub fn with_revocation(mut self, revocation: RevocationConfig) -> Self {
        self.revocation = revocation;
        self
    }

    /// Set the revocation policy only.
    pub fn with_revocation_policy(mut self, policy: RevocationPolicy) -> Self {
        self.revocation.policy = policy;
        self
    }

    /// Set the visible signature placement.
    pub fn with_placement(mut self, placement: SignaturePlacement) -> Self {
        self.placement = placement;
        self
    }

    /// Set the signature field name.
    pub fn with_field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = name.into();
        self
    }

    /// Reserve a fixed container size.
    pub fn with_estimated_size(mut self, bytes: usize) -> Self {
        self.estimated_size = Some(bytes);
        self
    }

    /// Engine options derived from this configuration.
    pub fn sign_options(&self) -> SignOptions {
        let mut options = SignOptions::default()
            .with_field_name(self.field_name.clone())
            .with_revocation_policy(self.revocation.policy);
        options.estimated_size = self.estimated_size;
        options.reason = self.reason.clone();
        options.location = self.location.clone();
        options.contact_info = self.contact_info.clone();
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_json_uses_defaults() {
        let config = SealConfig::from_json_str(r#"{"keystore": {"path": "keys/signer.p12", "passphrase": "123456"}}"#)
            .unwrap();
        assert_eq!(config.keystore.path, PathBuf::from("keys/signer.p12"));
        assert_eq!(config.keystore.alias, None);
        assert_eq!(config.scheme, SignatureScheme::RsaSha512);
        assert_eq!(config.revocation, RevocationConfig::default());
        assert_eq!(config.placement, SignaturePlacement::default());
        assert_eq!(config.field_name, "signature");
    }

    #[test]
    fn test_full_json() {
        let json = r#"{
            "keystore": {"path": "a.p12", "passphrase": "x", "alias": "signer"},
            "scheme": "rsa-sha256",
            "revocation": {"policy": "require", "timeout_secs": 3, "crl": false},
            "placement": {"page": 2, "label": "Certified"},
            "field_name": "approval",
            "estimated_size": 20000,
            "reason": "Archiving",
            "contact_info": "seal@example.test"
        }"#;
        let config = SealConfig::from_json_str(json).unwrap();
        assert_eq!(config.keystore.alias.as_deref(), Some("signer"));
        assert_eq!(config.scheme, SignatureScheme::RsaSha256);
        assert_eq!(config.revocation.policy, RevocationPolicy::Require);
        assert_eq!(config.revocation.timeout_secs, 3);
        assert!(config.revocation.ocsp);
        assert!(!config.revocation.crl);
        assert_eq!(config.placement.page, 2);
        assert_eq!(config.placement.width, 160.0);

        let options = config.sign_options();
        assert_eq!(options.field_name, "approval");
        assert_eq!(options.estimated_size, Some(20000));
        assert_eq!(options.reason.as_deref(), Some("Archiving"));
        assert_eq!(options.location, None);
        assert_eq!(options.contact_info.as_deref(), Some("seal@example.test"));
        assert_eq!(options.revocation_policy, RevocationPolicy::Require);
    }

    #[test]
    fn test_missing_keystore_is_config_error() {
        let err = SealConfig::from_json_str("{}").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validation() {
        let base = SealConfig::new(KeystoreConfig::new("a.p12", "x"));
        assert!(base.validate().is_ok());
        assert!(base.clone().with_field_name("").validate().is_err());
        assert!(base.clone().with_field_name("form.signature").validate().is_ok());
        let placement = SignaturePlacement {
            page: 0,
            ..SignaturePlacement::default()
        };
        assert!(base.clone().with_placement(placement).validate().is_err());

        let non_finite = [
            SignaturePlacement {
                left: f64::NAN,
                ..SignaturePlacement::default()
            },
            SignaturePlacement {
                height: f64::INFINITY,
                ..SignaturePlacement::default()
            },
            SignaturePlacement {
                font_size: f64::NAN,
                ..SignaturePlacement::default()
            },
            SignaturePlacement {
                font_size: 0.0,
                ..SignaturePlacement::default()
            },
        ];
        for placement in non_finite {
            assert!(matches!(
                base.clone().with_placement(placement).validate(),
                Err(Error::Config(_))
            ));
        }
    }

    #[test]
    fn test_debug_redacts_passphrase() {
        let config = KeystoreConfig::new("a.p12", "hunter2");
        let debug = format!("{:?}", SealConfig::new(config));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("REDACTED"));
    }
}
