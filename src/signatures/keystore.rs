//! Credential stores that supply a [`SigningIdentity`].
//!
//! The engine never caches identities: a provider is asked to load one for
//! every signing operation.

use crate::config::KeystoreConfig;
use crate::error::{Error, Result};
use crate::signatures::identity::{order_chain, Certificate, PrivateKeyHandle, SigningIdentity};
use crate::signatures::types::SignatureScheme;
use std::sync::Arc;

/// Source of signing credentials.
pub trait KeyProvider: Send + Sync {
    /// Load the private key and its leaf-first certificate chain.
    fn load(&self) -> Result<SigningIdentity>;
}

/// Reads a password-protected PKCS#12 (`.p12` / `.pfx`) file.
///
/// With an alias configured, the key bag whose `friendlyName` equals the
/// alias is used. Without one, the first key bag in store order is used.
pub struct Pkcs12KeyProvider {
    config: KeystoreConfig,
    scheme: SignatureScheme,
}

impl std::fmt::Debug for Pkcs12KeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pkcs12KeyProvider")
            .field("path", &self.config.path)
            .field("alias", &self.config.alias)
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

impl Pkcs12KeyProvider {
    /// Create a provider for the configured store.
    pub fn new(config: KeystoreConfig) -> Self {
        Self {
            config,
            scheme: SignatureScheme::default(),
        }
    }

    /// Scheme attached to loaded identities.
    pub fn with_scheme(mut self, scheme: SignatureScheme) -> Self {
        self.scheme = scheme;
        self
    }
}

impl KeyProvider for Pkcs12KeyProvider {
    fn load(&self) -> Result<SigningIdentity> {
        let data = match std::fs::read(&self.config.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::StoreNotFound(self.config.path.clone()));
            },
            Err(e) => return Err(Error::Io(e)),
        };

        let identity = parse_pkcs12(&data, &self.config.passphrase, self.config.alias.as_deref())?;
        log::debug!(
            "Loaded signing identity from {} ({} certificates)",
            self.config.path.display(),
            identity.chain.len()
        );
        Ok(identity.with_scheme(self.scheme))
    }
}

/// Provider that hands out an identity loaded elsewhere.
#[derive(Clone)]
pub struct StaticKeyProvider {
    key_der: Arc<Vec<u8>>,
    chain: Vec<Certificate>,
    scheme: SignatureScheme,
}

impl std::fmt::Debug for StaticKeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticKeyProvider")
            .field("chain", &self.chain)
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

impl StaticKeyProvider {
    /// Wrap a PKCS#8 key and a leaf-first chain.
    pub fn new(pkcs8_der: Vec<u8>, chain: Vec<Certificate>) -> Self {
        Self {
            key_der: Arc::new(pkcs8_der),
            chain,
            scheme: SignatureScheme::default(),
        }
    }

    /// Scheme attached to loaded identities.
    pub fn with_scheme(mut self, scheme: SignatureScheme) -> Self {
        self.scheme = scheme;
        self
    }
}

impl KeyProvider for StaticKeyProvider {
    fn load(&self) -> Result<SigningIdentity> {
        let key = PrivateKeyHandle::from_pkcs8_der(&self.key_der)?;
        Ok(SigningIdentity::new(key, self.chain.clone()).with_scheme(self.scheme))
    }
}

struct KeyEntry {
    friendly_name: Option<String>,
    local_key_id: Option<Vec<u8>>,
    pkcs8: Vec<u8>,
}

struct CertEntry {
    local_key_id: Option<Vec<u8>>,
    cert: Certificate,
}

/// Parse PKCS#12 data into a signing identity.
pub fn parse_pkcs12(data: &[u8], passphrase: &str, alias: Option<&str>) -> Result<SigningIdentity> {
    let pfx = p12::PFX::parse(data)
        .map_err(|e| Error::Encoding(format!("data does not appear to be PKCS#12: {:?}", e)))?;

    if !pfx.verify_mac(passphrase) {
        return Err(Error::InvalidPassphrase);
    }

    let auth_safe = match pfx.auth_safe {
        p12::ContentInfo::Data(data) => data,
        _ => return Err(Error::Encoding("unexpected PKCS#12 content info".to_string())),
    };

    let content_infos =
        yasna::parse_der(&auth_safe, |reader| reader.collect_sequence_of(p12::ContentInfo::parse))
            .map_err(|e| Error::Encoding(format!("failed parsing PKCS#12 contents: {:?}", e)))?;

    let bmp_password = bmp_string(passphrase);
    let mut keys = Vec::new();
    let mut certs = Vec::new();

    for content in content_infos {
        let bags_data = match content {
            p12::ContentInfo::Data(inner) => inner,
            p12::ContentInfo::EncryptedData(encrypted) => encrypted
                .data(&bmp_password)
                .ok_or_else(|| Error::Encoding("failed decrypting PKCS#12 certificate bags".to_string()))?,
            p12::ContentInfo::OtherContext(_) => {
                log::debug!("Skipping unsupported PKCS#12 content");
                continue;
            },
        };

        let bags = yasna::parse_ber(&bags_data, |reader| reader.collect_sequence_of(p12::SafeBag::parse))
            .map_err(|e| Error::Encoding(format!("failed parsing PKCS#12 bags: {:?}", e)))?;

        for bag in bags {
            let mut friendly_name = None;
            let mut local_key_id = None;
            for attribute in &bag.attributes {
                match attribute {
                    p12::PKCS12Attribute::FriendlyName(name) => friendly_name = Some(name.clone()),
                    p12::PKCS12Attribute::LocalKeyId(id) => local_key_id = Some(id.clone()),
                    _ => {},
                }
            }

            match bag.bag {
                p12::SafeBagKind::CertBag(p12::CertBag::X509(der)) => {
                    certs.push(CertEntry {
                        local_key_id,
                        cert: Certificate::from_der(der)?,
                    });
                },
                p12::SafeBagKind::Pkcs8ShroudedKeyBag(key_bag) => {
                    let pkcs8 = key_bag
                        .decrypt(&bmp_password)
                        .ok_or_else(|| Error::Encoding("failed decrypting PKCS#12 key bag".to_string()))?;
                    keys.push(KeyEntry {
                        friendly_name,
                        local_key_id,
                        pkcs8,
                    });
                },
                _ => log::debug!("Skipping unsupported PKCS#12 bag"),
            }
        }
    }

    let entry = select_key(keys, alias)?;
    let key = PrivateKeyHandle::from_pkcs8_der(&entry.pkcs8)?;

    let leaf_index = certs
        .iter()
        .position(|c| c.local_key_id.is_some() && c.local_key_id == entry.local_key_id)
        .or_else(|| certs.iter().position(|c| key_matches(&key, &c.cert)))
        .ok_or_else(|| Error::KeyUsage("no certificate in the store matches the private key".to_string()))?;

    let mut certs: Vec<Certificate> = certs.into_iter().map(|c| c.cert).collect();
    let leaf = certs.remove(leaf_index);
    let chain = order_chain(leaf, certs);

    Ok(SigningIdentity::new(key, chain))
}

fn select_key(keys: Vec<KeyEntry>, alias: Option<&str>) -> Result<KeyEntry> {
    match alias {
        Some(alias) => keys
            .into_iter()
            .find(|k| k.friendly_name.as_deref() == Some(alias))
            .ok_or(Error::NoKeyEntry),
        None => {
            if keys.len() > 1 {
                log::warn!("Credential store holds {} keys; using the first", keys.len());
            }
            keys.into_iter().next().ok_or(Error::NoKeyEntry)
        },
    }
}

fn key_matches(key: &PrivateKeyHandle, cert: &Certificate) -> bool {
    use rsa::pkcs8::DecodePublicKey;
    match key {
        PrivateKeyHandle::Rsa(private) => rsa::RsaPublicKey::from_public_key_der(cert.public_key_der())
            .map(|public| public == rsa::RsaPublicKey::from(private))
            .unwrap_or(false),
        PrivateKeyHandle::Unsupported { .. } => false,
    }
}

/// PKCS#12 passwords are BMPStrings: UTF-16BE with a two-byte terminator.
fn bmp_string(s: &str) -> Vec<u8> {
    let mut bytes: Vec<u8> = s.encode_utf16().flat_map(|c| c.to_be_bytes()).collect();
    bytes.extend_from_slice(&[0x00, 0x00]);
    bytes
}
