//! Detached CMS `SignedData` container for a PDF signature.
//!
//! ```text
//! ContentInfo
//!   SignedData (version 1)
//!     digestAlgorithms      { scheme digest }
//!     encapContentInfo      id-data, no eContent (detached)
//!     certificates          full chain, leaf first
//!     signerInfos           one SignerInfo, issuerAndSerialNumber
//!       signedAttrs         contentType, messageDigest, signingTime,
//!                           adbe-revocationInfoArchival (when evidence exists)
//!       signature           RSASSA-PKCS1-v1_5 over DER(signedAttrs)
//! ```

use crate::error::{Error, Result};
use crate::signatures::identity::{PrivateKeyHandle, SigningIdentity};
use crate::signatures::revocation::Collected;
use crate::signatures::types::SignatureScheme;
use chrono::{DateTime, Datelike, Utc};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo, SignerInfos,
};
use der::asn1::{Any, GeneralizedTime, ObjectIdentifier, OctetString, SetOfVec, UtcTime};
use der::{Decode, Encode, Sequence};
use rsa::pkcs8::DecodePublicKey;
use signature::{SignatureEncoding, Signer};
use spki::AlgorithmIdentifierOwned;
use x509_cert::attr::Attribute;
use x509_cert::time::Time;

const OID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
const OID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
const OID_CONTENT_TYPE: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");
const OID_MESSAGE_DIGEST: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");
const OID_SIGNING_TIME: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.5");
const OID_ADBE_REVOCATION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113583.1.1.8");

/// Base reservation for the container on top of certificates and evidence.
pub const BASE_CONTAINER_SIZE: usize = 8192;

/// Adobe `RevocationInfoArchival`.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct RevocationInfoArchival {
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    crl: Option<Vec<Any>>,
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    ocsp: Option<Vec<Any>>,
}

/// Builds the DER container that goes into `/Contents`.
#[derive(Debug, Clone, Copy)]
pub struct SignatureContainerBuilder {
    signing_time: DateTime<Utc>,
}

impl SignatureContainerBuilder {
    /// Builder that stamps `signing_time` into the signed attributes.
    pub fn new(signing_time: DateTime<Utc>) -> Self {
        Self { signing_time }
    }

    /// Upper bound for the container size of `identity` with `evidence`.
    pub fn estimate_size(identity: &SigningIdentity, evidence: &Collected) -> usize {
        let certs: usize = identity.chain.iter().map(|c| c.der().len()).sum();
        BASE_CONTAINER_SIZE + certs + 2 * evidence.total_len()
    }

    /// Reject identities the container cannot be built for.
    ///
    /// The key must be of the type the scheme requires and must belong to
    /// the leaf certificate.
    pub fn check_identity(identity: &SigningIdentity) -> Result<()> {
        let leaf = identity
            .leaf()
            .ok_or_else(|| Error::Encoding("certificate chain is empty".to_string()))?;

        let expected = identity.scheme.key_algorithm().to_string();
        let private = match &identity.key {
            PrivateKeyHandle::Rsa(key) if identity.key.algorithm() == expected => key,
            other => {
                return Err(Error::KeyUsage(format!(
                    "{} requires key algorithm {}, got {}",
                    identity.scheme.name(),
                    expected,
                    other.algorithm()
                )))
            },
        };

        let public = rsa::RsaPublicKey::from_public_key_der(leaf.public_key_der()).map_err(|_| {
            Error::KeyUsage(format!("certificate {} does not carry an RSA key", leaf.subject()))
        })?;
        if rsa::RsaPublicKey::from(private) != public {
            return Err(Error::KeyUsage(format!(
                "private key does not match certificate {}",
                leaf.subject()
            )));
        }

        Ok(())
    }

    /// Build the container for a document `digest`.
    pub fn build(&self, digest: &[u8], identity: &SigningIdentity, evidence: &Collected) -> Result<Vec<u8>> {
        Self::check_identity(identity)?;
        let digest_algorithm = identity.scheme.digest_algorithm();
        let expected_len = digest_algorithm.digest_parts(&[]).len();
        if digest.len() != expected_len {
            return Err(Error::Encoding(format!(
                "{} digest must be {} bytes, got {}",
                digest_algorithm.name(),
                expected_len,
                digest.len()
            )));
        }

        let certificates = identity
            .chain
            .iter()
            .map(|c| x509_cert::Certificate::from_der(c.der()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let leaf = &certificates[0].tbs_certificate;

        let digest_alg = AlgorithmIdentifierOwned {
            oid: digest_algorithm.oid(),
            parameters: None,
        };

        let signed_attrs = SetOfVec::try_from(self.signed_attributes(digest, evidence)?)?;
        let signature = sign(&identity.key, identity.scheme, &signed_attrs.to_der()?)?;

        let signer_info = SignerInfo {
            version: CmsVersion::V1,
            sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
                issuer: leaf.issuer.clone(),
                serial_number: leaf.serial_number.clone(),
            }),
            digest_alg: digest_alg.clone(),
            signed_attrs: Some(signed_attrs),
            signature_algorithm: AlgorithmIdentifierOwned {
                oid: signature_oid(identity.scheme),
                parameters: Some(Any::null()),
            },
            signature: OctetString::new(signature)?,
            unsigned_attrs: None,
        };

        let certificate_set = certificates
            .into_iter()
            .map(CertificateChoices::Certificate)
            .collect::<Vec<_>>();

        let signed_data = SignedData {
            version: CmsVersion::V1,
            digest_algorithms: SetOfVec::try_from(vec![digest_alg])?,
            encap_content_info: EncapsulatedContentInfo {
                econtent_type: OID_DATA,
                econtent: None,
            },
            certificates: Some(CertificateSet(SetOfVec::try_from(certificate_set)?)),
            crls: None,
            signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info])?),
        };

        let content_info = ContentInfo {
            content_type: OID_SIGNED_DATA,
            content: Any::encode_from(&signed_data)?,
        };

        let der = content_info.to_der()?;
        log::debug!("Built {} byte signature container ({})", der.len(), identity.scheme.name());
        Ok(der)
    }

    fn signed_attributes(&self, digest: &[u8], evidence: &Collected) -> Result<Vec<Attribute>> {
        let mut attributes = vec![
            attribute(OID_CONTENT_TYPE, Any::encode_from(&OID_DATA)?)?,
            attribute(OID_MESSAGE_DIGEST, Any::encode_from(&OctetString::new(digest)?)?)?,
            attribute(OID_SIGNING_TIME, Any::encode_from(&signing_time(self.signing_time)?)?)?,
        ];

        if !evidence.is_empty() {
            let archival = RevocationInfoArchival {
                crl: any_list(&evidence.crls())?,
                ocsp: any_list(&evidence.ocsp_responses())?,
            };
            attributes.push(attribute(OID_ADBE_REVOCATION, Any::encode_from(&archival)?)?);
        }

        Ok(attributes)
    }
}

/// `UTCTime` through 2049, `GeneralizedTime` from 2050 (RFC 5652, 11.3).
fn signing_time(time: DateTime<Utc>) -> Result<Time> {
    let since_epoch = u64::try_from(time.timestamp())
        .map(std::time::Duration::from_secs)
        .map_err(|_| Error::Encoding(format!("signing time {} is before 1970", time)))?;
    if time.year() < 2050 {
        Ok(Time::UtcTime(UtcTime::from_unix_duration(since_epoch)?))
    } else {
        Ok(Time::GeneralTime(GeneralizedTime::from_unix_duration(since_epoch)?))
    }
}

fn attribute(oid: ObjectIdentifier, value: Any) -> Result<Attribute> {
    Ok(Attribute {
        oid,
        values: SetOfVec::try_from(vec![value])?,
    })
}

fn any_list(items: &[&[u8]]) -> Result<Option<Vec<Any>>> {
    if items.is_empty() {
        return Ok(None);
    }
    let parsed = items
        .iter()
        .map(|item| Any::from_der(item))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Some(parsed))
}

fn signature_oid(scheme: SignatureScheme) -> ObjectIdentifier {
    match scheme {
        SignatureScheme::RsaSha256 => ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11"),
        SignatureScheme::RsaSha384 => ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12"),
        SignatureScheme::RsaSha512 => ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13"),
    }
}

fn sign(key: &PrivateKeyHandle, scheme: SignatureScheme, message: &[u8]) -> Result<Vec<u8>> {
    use rsa::pkcs1v15::SigningKey;
    use sha2::{Sha256, Sha384, Sha512};

    let PrivateKeyHandle::Rsa(key) = key else {
        return Err(Error::KeyUsage(format!("cannot sign with {}", key.algorithm())));
    };

    let signed = match scheme {
        SignatureScheme::RsaSha256 => SigningKey::<Sha256>::new(key.clone()).try_sign(message),
        SignatureScheme::RsaSha384 => SigningKey::<Sha384>::new(key.clone()).try_sign(message),
        SignatureScheme::RsaSha512 => SigningKey::<Sha512>::new(key.clone()).try_sign(message),
    };

    signed
        .map(|s| s.to_vec())
        .map_err(|e| Error::KeyUsage(format!("signing failed: {}", e)))
}
