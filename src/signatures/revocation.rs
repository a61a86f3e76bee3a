//! Revocation evidence gathering.
//!
//! For every certificate in the chain that has an issuer, the collector asks
//! the OCSP responder first and falls back to the CRL distribution points.
//! A certificate for which neither source answers gets an empty slot and a
//! [`PartialEvidenceWarning`]; whether that blocks signing is the engine's
//! decision ([`RevocationPolicy`](crate::signatures::RevocationPolicy)).
//!
//! Evidence is fetched fresh for every call. Nothing is cached or retried.

use crate::config::RevocationConfig;
use crate::error::{Error, Result};
use crate::signatures::identity::Certificate;
use crate::signatures::ocsp;
use serde::Serialize;
use std::sync::Arc;

/// Fetches a DER OCSP response for `cert`.
pub trait OcspClient: Send + Sync {
    /// Query the responder named in `cert` about `cert`, issued by `issuer`.
    fn fetch(&self, cert: &Certificate, issuer: &Certificate) -> Result<Vec<u8>>;
}

/// Fetches DER CRLs covering `cert`.
pub trait CrlClient: Send + Sync {
    /// Download the CRLs named in `cert`'s distribution points.
    fn fetch(&self, cert: &Certificate) -> Result<Vec<Vec<u8>>>;
}

/// Revocation evidence for one certificate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CertificateEvidence {
    /// Subject of the certificate this evidence covers
    pub subject: String,
    /// DER OCSP response
    pub ocsp: Option<Vec<u8>>,
    /// DER CRLs
    pub crls: Vec<Vec<u8>>,
}

impl CertificateEvidence {
    /// True if neither an OCSP response nor a CRL was obtained.
    pub fn is_empty(&self) -> bool {
        self.ocsp.is_none() && self.crls.is_empty()
    }
}

/// A certificate for which no revocation evidence could be obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialEvidenceWarning {
    /// Subject of the certificate
    pub subject: String,
    /// What went wrong with each source
    pub reason: String,
}

impl std::fmt::Display for PartialEvidenceWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "no revocation evidence for {}: {}", self.subject, self.reason)
    }
}

/// Output of [`RevocationCollector::collect`].
#[derive(Debug, Clone, Default)]
pub struct Collected {
    /// One entry per certificate that has an issuer, in chain order
    pub evidence: Vec<CertificateEvidence>,
    /// Certificates whose slot stayed empty
    pub warnings: Vec<PartialEvidenceWarning>,
}

impl Collected {
    /// All OCSP responses in chain order.
    pub fn ocsp_responses(&self) -> Vec<&[u8]> {
        self.evidence.iter().filter_map(|e| e.ocsp.as_deref()).collect()
    }

    /// All CRLs in chain order.
    pub fn crls(&self) -> Vec<&[u8]> {
        self.evidence
            .iter()
            .flat_map(|e| e.crls.iter().map(Vec::as_slice))
            .collect()
    }

    /// Combined size of every response and CRL.
    pub fn total_len(&self) -> usize {
        self.ocsp_responses().iter().map(|r| r.len()).sum::<usize>()
            + self.crls().iter().map(|c| c.len()).sum::<usize>()
    }

    /// True if nothing at all was collected.
    pub fn is_empty(&self) -> bool {
        self.evidence.iter().all(CertificateEvidence::is_empty)
    }
}

/// Gathers OCSP responses and CRLs for a certificate chain.
#[derive(Clone, Default)]
pub struct RevocationCollector {
    ocsp: Option<Arc<dyn OcspClient>>,
    crl: Option<Arc<dyn CrlClient>>,
}

impl std::fmt::Debug for RevocationCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevocationCollector")
            .field("ocsp", &self.ocsp.is_some())
            .field("crl", &self.crl.is_some())
            .finish()
    }
}

impl RevocationCollector {
    /// Collector with no sources. Every certificate ends up with a warning.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Use `client` for OCSP queries.
    pub fn with_ocsp(mut self, client: Arc<dyn OcspClient>) -> Self {
        self.ocsp = Some(client);
        self
    }

    /// Use `client` for CRL downloads.
    pub fn with_crl(mut self, client: Arc<dyn CrlClient>) -> Self {
        self.crl = Some(client);
        self
    }

    /// Network-backed collector honoring the source switches in `config`.
    #[cfg(feature = "online")]
    pub fn from_config(config: &RevocationConfig) -> Result<Self> {
        let timeout = std::time::Duration::from_secs(config.timeout_secs);
        let mut collector = Self::disabled();
        if config.ocsp {
            collector = collector.with_ocsp(Arc::new(OnlineOcspClient::new(timeout)?));
        }
        if config.crl {
            collector = collector.with_crl(Arc::new(OnlineCrlClient::new(timeout)?));
        }
        Ok(collector)
    }

    /// Without the `online` feature there is no transport; sources stay off.
    #[cfg(not(feature = "online"))]
    pub fn from_config(config: &RevocationConfig) -> Result<Self> {
        if config.ocsp || config.crl {
            log::warn!("Built without the `online` feature; revocation sources are disabled");
        }
        Ok(Self::disabled())
    }

    /// Collect evidence for every certificate in `chain` (leaf first).
    ///
    /// Self-issued certificates are skipped: nothing can vouch for them.
    pub fn collect(&self, chain: &[Certificate]) -> Collected {
        let mut collected = Collected::default();

        for (index, cert) in chain.iter().enumerate() {
            if cert.is_self_issued() {
                log::debug!("Skipping revocation check for self-issued {}", cert.subject());
                continue;
            }

            let issuer = chain.get(index + 1);
            let mut evidence = CertificateEvidence {
                subject: cert.subject().to_string(),
                ..Default::default()
            };
            let mut reasons = Vec::new();

            match self.fetch_ocsp(cert, issuer) {
                Ok(response) => evidence.ocsp = Some(response),
                Err(reason) => reasons.push(format!("OCSP: {}", reason)),
            }

            if evidence.ocsp.is_none() {
                match self.fetch_crls(cert) {
                    Ok(crls) => evidence.crls = crls,
                    Err(reason) => reasons.push(format!("CRL: {}", reason)),
                }
            }

            if evidence.is_empty() {
                let warning = PartialEvidenceWarning {
                    subject: evidence.subject.clone(),
                    reason: reasons.join("; "),
                };
                log::warn!("{}", warning);
                collected.warnings.push(warning);
            } else {
                log::debug!(
                    "Collected revocation evidence for {} (ocsp: {}, crls: {})",
                    evidence.subject,
                    evidence.ocsp.is_some(),
                    evidence.crls.len()
                );
            }
            collected.evidence.push(evidence);
        }

        collected
    }

    fn fetch_ocsp(&self, cert: &Certificate, issuer: Option<&Certificate>) -> Result<Vec<u8>> {
        let client = self
            .ocsp
            .as_ref()
            .ok_or_else(|| Error::RevocationUnavailable("OCSP disabled".to_string()))?;
        let issuer = issuer
            .ok_or_else(|| Error::RevocationUnavailable("issuer certificate not in chain".to_string()))?;
        if cert.ocsp_urls().is_empty() {
            return Err(Error::RevocationUnavailable("no OCSP responder".to_string()));
        }

        let response = client.fetch(cert, issuer)?;
        ocsp::check_response(&response)?;
        Ok(response)
    }

    fn fetch_crls(&self, cert: &Certificate) -> Result<Vec<Vec<u8>>> {
        let client = self
            .crl
            .as_ref()
            .ok_or_else(|| Error::RevocationUnavailable("CRL disabled".to_string()))?;
        if cert.crl_urls().is_empty() {
            return Err(Error::RevocationUnavailable("no CRL distribution point".to_string()));
        }

        let crls = client.fetch(cert)?;
        if crls.is_empty() {
            return Err(Error::RevocationUnavailable("no CRL could be downloaded".to_string()));
        }
        Ok(crls)
    }
}

/// OCSP over HTTP POST.
#[cfg(feature = "online")]
#[derive(Debug, Clone)]
pub struct OnlineOcspClient {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "online")]
impl OnlineOcspClient {
    /// Client whose requests give up after `timeout`.
    pub fn new(timeout: std::time::Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
        })
    }
}

#[cfg(feature = "online")]
impl OcspClient for OnlineOcspClient {
    fn fetch(&self, cert: &Certificate, issuer: &Certificate) -> Result<Vec<u8>> {
        let request = ocsp::build_request(cert, issuer)?;
        let mut last_error = Error::RevocationUnavailable("no OCSP responder".to_string());

        for url in cert.ocsp_urls() {
            log::debug!("Querying OCSP responder {}", url);
            let response = self
                .client
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, ocsp::OCSP_REQUEST_CONTENT_TYPE)
                .body(request.clone())
                .send()
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.bytes());
            match response {
                Ok(body) => return Ok(body.to_vec()),
                Err(e) => last_error = Error::Network(format!("{}: {}", url, e)),
            }
        }

        Err(last_error)
    }
}

/// CRL download over HTTP GET.
#[cfg(feature = "online")]
#[derive(Debug, Clone)]
pub struct OnlineCrlClient {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "online")]
impl OnlineCrlClient {
    /// Client whose requests give up after `timeout`.
    pub fn new(timeout: std::time::Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
        })
    }
}

#[cfg(feature = "online")]
impl CrlClient for OnlineCrlClient {
    fn fetch(&self, cert: &Certificate) -> Result<Vec<Vec<u8>>> {
        let mut crls = Vec::new();

        for url in cert.crl_urls() {
            log::debug!("Downloading CRL {}", url);
            let response = self
                .client
                .get(url)
                .send()
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.bytes());
            match response {
                Ok(body) => crls.push(body.to_vec()),
                Err(e) => log::warn!("CRL download from {} failed: {}", url, e),
            }
        }

        Ok(crls)
    }
}

#[cfg(feature = "online")]
fn http_client(timeout: std::time::Duration) -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Network(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const LEAF: &[u8] = include_bytes!("../../tests/fixtures/leaf.der");
    const CA: &[u8] = include_bytes!("../../tests/fixtures/ca.der");
    const RESPONSE: &[u8] = include_bytes!("../../tests/fixtures/ocsp_response.der");
    const CRL: &[u8] = include_bytes!("../../tests/fixtures/root.crl");

    fn chain() -> Vec<Certificate> {
        vec![Certificate::from_der(LEAF).unwrap(), Certificate::from_der(CA).unwrap()]
    }

    struct FixedOcsp(Result<Vec<u8>>, AtomicUsize);

    impl OcspClient for FixedOcsp {
        fn fetch(&self, _cert: &Certificate, _issuer: &Certificate) -> Result<Vec<u8>> {
            self.1.fetch_add(1, Ordering::SeqCst);
            match &self.0 {
                Ok(bytes) => Ok(bytes.clone()),
                Err(e) => Err(Error::Network(e.to_string())),
            }
        }
    }

    struct FixedCrl(Vec<Vec<u8>>);

    impl CrlClient for FixedCrl {
        fn fetch(&self, _cert: &Certificate) -> Result<Vec<Vec<u8>>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_ocsp_success_skips_crl() {
        let ocsp = Arc::new(FixedOcsp(Ok(RESPONSE.to_vec()), AtomicUsize::new(0)));
        let collected = RevocationCollector::disabled()
            .with_ocsp(ocsp.clone())
            .with_crl(Arc::new(FixedCrl(vec![CRL.to_vec()])))
            .collect(&chain());

        assert!(collected.warnings.is_empty());
        assert_eq!(collected.evidence.len(), 1);
        assert_eq!(collected.evidence[0].ocsp.as_deref(), Some(RESPONSE));
        assert!(collected.evidence[0].crls.is_empty());
        assert_eq!(ocsp.1.load(Ordering::SeqCst), 1);
        assert_eq!(collected.total_len(), RESPONSE.len());
    }

    #[test]
    fn test_crl_fallback() {
        let collected = RevocationCollector::disabled()
            .with_ocsp(Arc::new(FixedOcsp(
                Err(Error::Network("timed out".into())),
                AtomicUsize::new(0),
            )))
            .with_crl(Arc::new(FixedCrl(vec![CRL.to_vec()])))
            .collect(&chain());

        assert!(collected.warnings.is_empty());
        assert_eq!(collected.crls(), vec![CRL]);
        assert!(collected.evidence[0].ocsp.is_none());
    }

    #[test]
    fn test_rejected_ocsp_response_falls_back() {
        let collected = RevocationCollector::disabled()
            .with_ocsp(Arc::new(FixedOcsp(
                Ok(vec![0x30, 0x03, 0x0A, 0x01, 0x06]),
                AtomicUsize::new(0),
            )))
            .with_crl(Arc::new(FixedCrl(vec![CRL.to_vec()])))
            .collect(&chain());

        assert!(collected.ocsp_responses().is_empty());
        assert_eq!(collected.crls().len(), 1);
    }

    #[test]
    fn test_no_sources_warns() {
        let collected = RevocationCollector::disabled().collect(&chain());
        assert_eq!(collected.warnings.len(), 1);
        assert!(collected.warnings[0].subject.contains("Seal Test Signer"));
        assert!(collected.warnings[0].reason.contains("OCSP disabled"));
        assert!(collected.warnings[0].reason.contains("CRL disabled"));
        assert!(collected.is_empty());
    }

    #[test]
    fn test_empty_crl_list_warns() {
        let collected = RevocationCollector::disabled()
            .with_crl(Arc::new(FixedCrl(Vec::new())))
            .collect(&chain());
        assert_eq!(collected.warnings.len(), 1);
        assert!(collected.warnings[0].to_string().contains("no CRL could be downloaded"));
    }

    #[test]
    fn test_leaf_without_issuer_in_chain() {
        let leaf_only = vec![Certificate::from_der(LEAF).unwrap()];
        let ocsp = Arc::new(FixedOcsp(Ok(RESPONSE.to_vec()), AtomicUsize::new(0)));
        let collected = RevocationCollector::disabled().with_ocsp(ocsp.clone()).collect(&leaf_only);
        assert_eq!(ocsp.1.load(Ordering::SeqCst), 0);
        assert!(collected.warnings[0].reason.contains("issuer"));
    }

    #[test]
    fn test_root_only_chain_needs_nothing() {
        let root = vec![Certificate::from_der(CA).unwrap()];
        let collected = RevocationCollector::disabled().collect(&root);
        assert!(collected.evidence.is_empty());
        assert!(collected.warnings.is_empty());
    }
}
