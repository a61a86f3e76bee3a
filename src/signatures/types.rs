//! Signature types shared by the engine, the container builder and the
//! configuration layer.

use crate::signatures::revocation::PartialEvidenceWarning;
use der::asn1::ObjectIdentifier;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};

/// Digest algorithm used for the document digest and the signed attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    /// SHA-256
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl DigestAlgorithm {
    /// OID of this digest algorithm.
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            DigestAlgorithm::Sha256 => ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1"),
            DigestAlgorithm::Sha384 => ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.2"),
            DigestAlgorithm::Sha512 => ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3"),
        }
    }

    /// Get the name of this algorithm.
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha384 => "SHA-384",
            DigestAlgorithm::Sha512 => "SHA-512",
        }
    }

    /// Digest the concatenation of `parts`.
    pub fn digest_parts(&self, parts: &[&[u8]]) -> Vec<u8> {
        fn run<D: Digest>(parts: &[&[u8]]) -> Vec<u8> {
            let mut hasher = D::new();
            for part in parts {
                hasher.update(part);
            }
            hasher.finalize().to_vec()
        }

        match self {
            DigestAlgorithm::Sha256 => run::<Sha256>(parts),
            DigestAlgorithm::Sha384 => run::<Sha384>(parts),
            DigestAlgorithm::Sha512 => run::<Sha512>(parts),
        }
    }
}

/// Supported signature schemes. Each pairs a key type with a digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureScheme {
    /// RSASSA-PKCS1-v1_5 with SHA-256
    RsaSha256,
    /// RSASSA-PKCS1-v1_5 with SHA-384
    RsaSha384,
    /// RSASSA-PKCS1-v1_5 with SHA-512
    #[default]
    RsaSha512,
}

impl SignatureScheme {
    /// Digest algorithm used by this scheme.
    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        match self {
            SignatureScheme::RsaSha256 => DigestAlgorithm::Sha256,
            SignatureScheme::RsaSha384 => DigestAlgorithm::Sha384,
            SignatureScheme::RsaSha512 => DigestAlgorithm::Sha512,
        }
    }

    /// OID of the key algorithm the scheme requires (rsaEncryption).
    pub fn key_algorithm(&self) -> ObjectIdentifier {
        ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1")
    }

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            SignatureScheme::RsaSha256 => "RSA with SHA-256",
            SignatureScheme::RsaSha384 => "RSA with SHA-384",
            SignatureScheme::RsaSha512 => "RSA with SHA-512",
        }
    }
}

/// DocMDP certification level of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificationLevel {
    /// No certification signature
    NoRestrictions,
    /// Certified; form filling (and possibly annotations) allowed
    FormFillingAllowed,
    /// Certified; any change invalidates the signature
    CertifiedNoChangesAllowed,
}

impl CertificationLevel {
    /// DocMDP `/P` value, or `None` for an uncertified document.
    pub fn permission(&self) -> Option<i64> {
        match self {
            CertificationLevel::NoRestrictions => None,
            CertificationLevel::FormFillingAllowed => Some(2),
            CertificationLevel::CertifiedNoChangesAllowed => Some(1),
        }
    }

    /// Map a DocMDP `/P` value. Values 2 and 3 both permit form filling.
    pub fn from_permission(p: i64) -> Self {
        match p {
            1 => CertificationLevel::CertifiedNoChangesAllowed,
            _ => CertificationLevel::FormFillingAllowed,
        }
    }
}

/// Where the visible signature goes and what it says.
///
/// Purely cosmetic: placement never affects the cryptographic result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignaturePlacement {
    /// 1-based page number
    pub page: usize,
    /// Lower-left x in default user space
    pub left: f64,
    /// Lower-left y in default user space
    pub bottom: f64,
    /// Width of the signature box
    pub width: f64,
    /// Height of the signature box
    pub height: f64,
    /// Label lines (separated by `\n`); the signing time is appended
    pub label: String,
    /// Font size for the label
    pub font_size: f64,
}

impl Default for SignaturePlacement {
    fn default() -> Self {
        Self {
            page: 1,
            left: 25.0,
            bottom: 25.0,
            width: 160.0,
            height: 80.0,
            label: "Digitally signed by\nSigning service".to_string(),
            font_size: 10.0,
        }
    }
}

impl SignaturePlacement {
    /// Rectangle as `[llx lly urx ury]`.
    pub fn rect(&self) -> [f64; 4] {
        [self.left, self.bottom, self.left + self.width, self.bottom + self.height]
    }
}

/// What to do when revocation evidence is incomplete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RevocationPolicy {
    /// Do not contact any responder; sign without evidence
    Skip,
    /// Sign with whatever evidence was collected and report the gaps
    #[default]
    BestEffort,
    /// Refuse to sign unless every certificate has evidence
    Require,
}

/// Options for signing a PDF.
#[derive(Debug, Clone)]
pub struct SignOptions {
    /// Name of the signature field to create or fill
    pub field_name: String,
    /// Revocation evidence policy
    pub revocation_policy: RevocationPolicy,
    /// Override for the reserved container size in bytes
    pub estimated_size: Option<usize>,
    /// Reason for signing
    pub reason: Option<String>,
    /// Location where the document was signed
    pub location: Option<String>,
    /// Contact information
    pub contact_info: Option<String>,
}

impl Default for SignOptions {
    fn default() -> Self {
        Self {
            field_name: "signature".to_string(),
            revocation_policy: RevocationPolicy::BestEffort,
            estimated_size: None,
            reason: None,
            location: None,
            contact_info: None,
        }
    }
}

impl SignOptions {
    /// Set the signature field name.
    pub fn with_field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = name.into();
        self
    }

    /// Set the revocation policy.
    pub fn with_revocation_policy(mut self, policy: RevocationPolicy) -> Self {
        self.revocation_policy = policy;
        self
    }

    /// Reserve exactly `bytes` for the signature container.
    pub fn with_estimated_size(mut self, bytes: usize) -> Self {
        self.estimated_size = Some(bytes);
        self
    }

    /// Set the reason for signing.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Set the signing location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set signer contact information.
    pub fn with_contact_info(mut self, contact: impl Into<String>) -> Self {
        self.contact_info = Some(contact.into());
        self
    }
}

/// Result of a successful signing operation.
#[derive(Debug, Clone)]
pub struct SignedDocument {
    /// The complete signed PDF
    pub bytes: Vec<u8>,
    /// Certificates for which no revocation evidence could be collected
    pub warnings: Vec<PartialEvidenceWarning>,
    /// The `/ByteRange` written into the signature dictionary
    pub byte_range: [usize; 4],
    /// Digest of the two signed ranges
    pub digest: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_parts_matches_single_pass() {
        let split = DigestAlgorithm::Sha512.digest_parts(&[b"hello ", b"world"]);
        let whole = DigestAlgorithm::Sha512.digest_parts(&[b"hello world"]);
        assert_eq!(split, whole);
        assert_eq!(split.len(), 64);
        assert_eq!(DigestAlgorithm::Sha256.digest_parts(&[]).len(), 32);
    }

    #[test]
    fn test_scheme_defaults() {
        assert_eq!(SignatureScheme::default(), SignatureScheme::RsaSha512);
        assert_eq!(SignatureScheme::RsaSha384.digest_algorithm(), DigestAlgorithm::Sha384);
        assert_eq!(
            DigestAlgorithm::Sha512.oid().to_string(),
            "2.16.840.1.101.3.4.2.3"
        );
    }

    #[test]
    fn test_scheme_serde_names() {
        let scheme: SignatureScheme = serde_json::from_str("\"rsa-sha256\"").unwrap();
        assert_eq!(scheme, SignatureScheme::RsaSha256);
        let policy: RevocationPolicy = serde_json::from_str("\"require\"").unwrap();
        assert_eq!(policy, RevocationPolicy::Require);
    }

    #[test]
    fn test_certification_levels() {
        assert_eq!(CertificationLevel::CertifiedNoChangesAllowed.permission(), Some(1));
        assert_eq!(CertificationLevel::NoRestrictions.permission(), None);
        assert_eq!(CertificationLevel::from_permission(1), CertificationLevel::CertifiedNoChangesAllowed);
        assert_eq!(CertificationLevel::from_permission(3), CertificationLevel::FormFillingAllowed);
    }

    #[test]
    fn test_placement_defaults_and_rect() {
        let placement = SignaturePlacement::default();
        assert_eq!(placement.page, 1);
        assert_eq!(placement.rect(), [25.0, 25.0, 185.0, 105.0]);

        let partial: SignaturePlacement = serde_json::from_str(r#"{"page": 3}"#).unwrap();
        assert_eq!(partial.page, 3);
        assert_eq!(partial.width, 160.0);
    }
}
