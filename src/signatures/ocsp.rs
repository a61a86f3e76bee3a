//! OCSP request encoding and response screening (RFC 6960).
//!
//! Requests carry a single CertID hashed with SHA-1 and no nonce, which is
//! what public responders cache and answer. Responses are embedded verbatim
//! in the signature, so only their outer envelope is checked here.

use crate::error::{Error, Result};
use crate::signatures::identity::Certificate;
use der::asn1::{Any, ObjectIdentifier, OctetString};
use der::{Decode, Encode, Enumerated, Sequence, Tag};
use sha1::{Digest, Sha1};
use spki::AlgorithmIdentifierOwned;

const OID_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");
const OID_OCSP_BASIC: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.48.1.1");

/// HTTP media type of an encoded request.
pub const OCSP_REQUEST_CONTENT_TYPE: &str = "application/ocsp-request";

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct CertId {
    hash_algorithm: AlgorithmIdentifierOwned,
    issuer_name_hash: OctetString,
    issuer_key_hash: OctetString,
    serial_number: Any,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct Request {
    req_cert: CertId,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct TbsRequest {
    request_list: Vec<Request>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct OcspRequest {
    tbs_request: TbsRequest,
}

/// `OCSPResponseStatus`.
#[derive(Clone, Copy, Debug, Enumerated, Eq, PartialEq)]
#[repr(u32)]
pub enum OcspResponseStatus {
    /// Response has valid confirmations
    Successful = 0,
    /// Illegal confirmation request
    MalformedRequest = 1,
    /// Internal error in issuer
    InternalError = 2,
    /// Try again later
    TryLater = 3,
    /// Must sign the request
    SigRequired = 5,
    /// Request unauthorized
    Unauthorized = 6,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct ResponseBytes {
    response_type: ObjectIdentifier,
    response: OctetString,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct OcspResponse {
    response_status: OcspResponseStatus,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    response_bytes: Option<ResponseBytes>,
}

/// DER-encode an OCSP request for `cert`, issued by `issuer`.
pub fn build_request(cert: &Certificate, issuer: &Certificate) -> Result<Vec<u8>> {
    let cert_id = CertId {
        hash_algorithm: AlgorithmIdentifierOwned {
            oid: OID_SHA1,
            parameters: Some(Any::null()),
        },
        issuer_name_hash: OctetString::new(Sha1::digest(issuer.raw_subject()).to_vec())?,
        issuer_key_hash: OctetString::new(Sha1::digest(issuer.public_key_bits()).to_vec())?,
        serial_number: Any::new(Tag::Integer, cert.serial().to_vec())?,
    };

    let request = OcspRequest {
        tbs_request: TbsRequest {
            request_list: vec![Request { req_cert: cert_id }],
        },
    };

    Ok(request.to_der()?)
}

/// Check that `der` is a successful OCSP response carrying a basic response.
pub fn check_response(der: &[u8]) -> Result<()> {
    let response = OcspResponse::from_der(der)
        .map_err(|e| Error::Encoding(format!("malformed OCSP response: {}", e)))?;

    if response.response_status != OcspResponseStatus::Successful {
        return Err(Error::Network(format!(
            "OCSP responder answered {:?}",
            response.response_status
        )));
    }

    match response.response_bytes {
        Some(bytes) if bytes.response_type == OID_OCSP_BASIC => Ok(()),
        Some(bytes) => Err(Error::Encoding(format!(
            "unsupported OCSP response type {}",
            bytes.response_type
        ))),
        None => Err(Error::Encoding("OCSP response has no body".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEAF: &[u8] = include_bytes!("../../tests/fixtures/leaf.der");
    const CA: &[u8] = include_bytes!("../../tests/fixtures/ca.der");
    const REQUEST: &[u8] = include_bytes!("../../tests/fixtures/ocsp_request.der");
    const RESPONSE: &[u8] = include_bytes!("../../tests/fixtures/ocsp_response.der");

    #[test]
    fn test_request_matches_reference_encoding() {
        let leaf = Certificate::from_der(LEAF).unwrap();
        let ca = Certificate::from_der(CA).unwrap();
        assert_eq!(build_request(&leaf, &ca).unwrap(), REQUEST);
    }

    #[test]
    fn test_successful_response() {
        assert!(check_response(RESPONSE).is_ok());
    }

    #[test]
    fn test_unauthorized_response() {
        let err = check_response(&[0x30, 0x03, 0x0A, 0x01, 0x06]).unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert!(err.to_string().contains("Unauthorized"));
    }

    #[test]
    fn test_successful_without_body() {
        assert!(matches!(check_response(&[0x30, 0x03, 0x0A, 0x01, 0x00]), Err(Error::Encoding(_))));
    }

    #[test]
    fn test_garbage_response() {
        assert!(matches!(check_response(b"<html>"), Err(Error::Encoding(_))));
    }
}
