//! Signing identity: private key plus leaf-first certificate chain.

use crate::error::{Error, Result};
use crate::signatures::types::SignatureScheme;
use chrono::{DateTime, TimeZone, Utc};
use pkcs8::der::Decode as _;
use rsa::pkcs8::DecodePrivateKey;
use x509_parser::extensions::{DistributionPointName, GeneralName, ParsedExtension};
use x509_parser::prelude::X509Certificate;

/// id-ad-ocsp access method in the AIA extension.
const OID_AD_OCSP: &str = "1.3.6.1.5.5.7.48.1";

/// rsaEncryption key algorithm.
const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";

/// An X.509 certificate kept as DER with the fields the engine needs.
#[derive(Clone)]
pub struct Certificate {
    der: Vec<u8>,
    subject: String,
    issuer: String,
    raw_subject: Vec<u8>,
    raw_issuer: Vec<u8>,
    serial: Vec<u8>,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    spki: Vec<u8>,
    public_key_bits: Vec<u8>,
    ocsp_urls: Vec<String>,
    crl_urls: Vec<String>,
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .field("issuer", &self.issuer)
            .field("serial", &hex_upper(&self.serial))
            .finish_non_exhaustive()
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Certificate {
    /// Parse a DER certificate.
    pub fn from_der(der: impl Into<Vec<u8>>) -> Result<Self> {
        let der = der.into();
        let (rest, cert) = x509_parser::parse_x509_certificate(&der)
            .map_err(|e| Error::Encoding(format!("invalid certificate: {}", e)))?;
        if !rest.is_empty() {
            log::debug!("Ignoring {} trailing bytes after certificate", rest.len());
        }

        let (ocsp_urls, crl_urls) = revocation_urls(&cert);
        let parsed = Self {
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            raw_subject: cert.subject().as_raw().to_vec(),
            raw_issuer: cert.issuer().as_raw().to_vec(),
            serial: cert.raw_serial().to_vec(),
            not_before: timestamp(cert.validity().not_before.timestamp()),
            not_after: timestamp(cert.validity().not_after.timestamp()),
            spki: cert.public_key().raw.to_vec(),
            public_key_bits: cert.public_key().subject_public_key.data.to_vec(),
            ocsp_urls,
            crl_urls,
            der: Vec::new(),
        };
        Ok(Self { der, ..parsed })
    }

    /// DER encoding.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Subject distinguished name, RFC 4514 style.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Issuer distinguished name, RFC 4514 style.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// DER of the subject Name.
    pub fn raw_subject(&self) -> &[u8] {
        &self.raw_subject
    }

    /// DER of the issuer Name.
    pub fn raw_issuer(&self) -> &[u8] {
        &self.raw_issuer
    }

    /// Serial number content bytes (two's complement, big-endian).
    pub fn serial(&self) -> &[u8] {
        &self.serial
    }

    /// Start of the validity window.
    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    /// End of the validity window.
    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// True if `at` lies inside the validity window.
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.not_before <= at && at <= self.not_after
    }

    /// DER of the SubjectPublicKeyInfo.
    pub fn public_key_der(&self) -> &[u8] {
        &self.spki
    }

    /// Contents of the subjectPublicKey BIT STRING.
    pub fn public_key_bits(&self) -> &[u8] {
        &self.public_key_bits
    }

    /// OCSP responder URLs from the Authority Information Access extension.
    pub fn ocsp_urls(&self) -> &[String] {
        &self.ocsp_urls
    }

    /// HTTP(S) URLs from the CRL Distribution Points extension.
    pub fn crl_urls(&self) -> &[String] {
        &self.crl_urls
    }

    /// Subject and issuer are the same name (roots and other self-issued certs).
    pub fn is_self_issued(&self) -> bool {
        self.raw_subject == self.raw_issuer
    }

    /// True if `other` names this certificate's subject as its issuer.
    pub fn issued(&self, other: &Certificate) -> bool {
        other.raw_issuer == self.raw_subject
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn revocation_urls(cert: &X509Certificate<'_>) -> (Vec<String>, Vec<String>) {
    let mut ocsp = Vec::new();
    let mut crl = Vec::new();

    for ext in cert.extensions() {
        match ext.parsed_extension() {
            ParsedExtension::AuthorityInfoAccess(aia) => {
                for desc in &aia.accessdescs {
                    if desc.access_method.to_id_string() != OID_AD_OCSP {
                        continue;
                    }
                    if let GeneralName::URI(uri) = &desc.access_location {
                        ocsp.push(uri.to_string());
                    }
                }
            },
            ParsedExtension::CRLDistributionPoints(points) => {
                for point in points.points.iter() {
                    if let Some(DistributionPointName::FullName(names)) = &point.distribution_point {
                        for name in names {
                            if let GeneralName::URI(uri) = name {
                                if uri.starts_with("http://") || uri.starts_with("https://") {
                                    crl.push(uri.to_string());
                                }
                            }
                        }
                    }
                }
            },
            _ => {},
        }
    }

    (ocsp, crl)
}

/// Handle to the signing key.
pub enum PrivateKeyHandle {
    /// RSA private key
    Rsa(rsa::RsaPrivateKey),
    /// A key type the engine cannot sign with
    Unsupported {
        /// Key algorithm OID in dotted form
        algorithm: String,
    },
}

impl std::fmt::Debug for PrivateKeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrivateKeyHandle::Rsa(_) => f.write_str("PrivateKeyHandle::Rsa([REDACTED])"),
            PrivateKeyHandle::Unsupported { algorithm } => {
                write!(f, "PrivateKeyHandle::Unsupported({})", algorithm)
            },
        }
    }
}

impl PrivateKeyHandle {
    /// Load an unencrypted PKCS#8 private key.
    ///
    /// Keys of other algorithms load as [`PrivateKeyHandle::Unsupported`] so
    /// that the mismatch is reported when a scheme is checked against them.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let info = pkcs8::PrivateKeyInfo::from_der(der)
            .map_err(|e| Error::Encoding(format!("invalid PKCS#8 key: {}", e)))?;
        let algorithm = info.algorithm.oid.to_string();

        if algorithm != OID_RSA_ENCRYPTION {
            return Ok(PrivateKeyHandle::Unsupported { algorithm });
        }

        let key = rsa::RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|e| Error::Encoding(format!("invalid RSA key: {}", e)))?;
        Ok(PrivateKeyHandle::Rsa(key))
    }

    /// Key algorithm OID in dotted form.
    pub fn algorithm(&self) -> String {
        match self {
            PrivateKeyHandle::Rsa(_) => OID_RSA_ENCRYPTION.to_string(),
            PrivateKeyHandle::Unsupported { algorithm } => algorithm.clone(),
        }
    }
}

/// Everything needed to produce one signature.
#[derive(Debug)]
pub struct SigningIdentity {
    /// Private key
    pub key: PrivateKeyHandle,
    /// Certificate chain, leaf first
    pub chain: Vec<Certificate>,
    /// Signature scheme to sign with
    pub scheme: SignatureScheme,
}

impl SigningIdentity {
    /// Bundle a key and its chain with the default scheme.
    pub fn new(key: PrivateKeyHandle, chain: Vec<Certificate>) -> Self {
        Self {
            key,
            chain,
            scheme: SignatureScheme::default(),
        }
    }

    /// Use a different signature scheme.
    pub fn with_scheme(mut self, scheme: SignatureScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// The signing certificate.
    pub fn leaf(&self) -> Option<&Certificate> {
        self.chain.first()
    }
}

/// Order certificates leaf-first by following issuer links from `leaf`.
///
/// Certificates not reachable from the leaf are appended in their original
/// order so nothing the store supplied is dropped.
pub fn order_chain(leaf: Certificate, others: Vec<Certificate>) -> Vec<Certificate> {
    let mut chain = vec![leaf];
    let mut pool: Vec<Certificate> = others.into_iter().filter(|c| c != &chain[0]).collect();

    loop {
        let Some(current) = chain.last() else { break };
        if current.is_self_issued() {
            break;
        }
        match pool.iter().position(|candidate| candidate.issued(current)) {
            Some(index) => {
                let issuer = pool.remove(index);
                chain.push(issuer);
            },
            None => break,
        }
    }

    chain.extend(pool);
    chain
}

pub(crate) fn hex_upper(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}
