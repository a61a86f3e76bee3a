//! PDF certification signing.
//!
//! [`PdfSigner::sign`] turns an unsigned PDF into a certified one in a
//! single incremental update:
//!
//! 1. locate or create the signature field and its widget on the target page
//! 2. append the signature dictionary with fixed-width `/ByteRange` and
//!    `/Contents` placeholders, the widget appearance, and the updated
//!    page, AcroForm and catalog (`/Perms /DocMDP`)
//! 3. patch the real `/ByteRange`, digest the two signed ranges, build the
//!    CMS container and hex-encode it into `/Contents`
//!
//! The original bytes are never modified.

use crate::document::{FormField, PdfDocument};
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::signatures::appearance::SignatureAppearance;
use crate::signatures::byterange::{ByteRangeCalculator, BYTE_RANGE_PLACEHOLDER};
use crate::signatures::container::SignatureContainerBuilder;
use crate::signatures::identity::SigningIdentity;
use crate::signatures::revocation::{Collected, RevocationCollector};
use crate::signatures::types::{
    CertificationLevel, RevocationPolicy, SignOptions, SignaturePlacement, SignedDocument,
};
use crate::writer::{wrap_indirect, IncrementalUpdate, ObjectSerializer};
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Annotation flags of the widget: Print | Locked.
const WIDGET_FLAGS: i64 = 4 | 128;
/// AcroForm `/SigFlags`: SignaturesExist | AppendOnly.
const SIG_FLAGS: i64 = 1 | 2;

/// Signs PDFs with a DocMDP "no changes allowed" certification signature.
#[derive(Debug, Clone)]
pub struct PdfSigner {
    options: SignOptions,
    revocation: RevocationCollector,
    signing_time: Option<DateTime<Utc>>,
}

impl PdfSigner {
    /// Signer with `options` and no revocation sources.
    pub fn new(options: SignOptions) -> Self {
        Self {
            options,
            revocation: RevocationCollector::disabled(),
            signing_time: None,
        }
    }

    /// Use `collector` to gather OCSP responses and CRLs.
    pub fn with_revocation(mut self, collector: RevocationCollector) -> Self {
        self.revocation = collector;
        self
    }

    /// Pin the signing time instead of using the clock.
    pub fn with_signing_time(mut self, time: DateTime<Utc>) -> Self {
        self.signing_time = Some(time);
        self
    }

    /// Options in effect.
    pub fn options(&self) -> &SignOptions {
        &self.options
    }

    /// Certify `pdf` with `identity`, placing the visible widget per `placement`.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedDocument`] for unparsable or encrypted input, or a
    ///   field with the requested name that is not a signature field
    /// - [`Error::AlreadySigned`] when the document is already certified or
    ///   any signature field already carries a signature
    /// - [`Error::PageOutOfRange`] for a page the document does not have
    /// - [`Error::KeyUsage`] when the key does not fit the certificate or scheme
    /// - [`Error::RevocationUnavailable`] under [`RevocationPolicy::Require`]
    /// - [`Error::ContainerOverflow`] when the container outgrows its reservation
    pub fn sign(
        &self,
        pdf: &[u8],
        identity: &SigningIdentity,
        placement: &SignaturePlacement,
    ) -> Result<SignedDocument> {
        SignatureContainerBuilder::check_identity(identity)?;
        let leaf = identity
            .leaf()
            .ok_or_else(|| Error::Encoding("certificate chain is empty".to_string()))?;

        let mut doc = PdfDocument::open(Bytes::copy_from_slice(pdf))?;
        let field_name = &self.options.field_name;
        let (existing, page_ref) = self
            .inspect(&mut doc, placement.page)
            .map_err(Error::into_malformed)?;

        let evidence = self.collect_evidence(identity)?;
        let signing_time = self.signing_time.unwrap_or_else(Utc::now);
        let reserved = self
            .options
            .estimated_size
            .unwrap_or_else(|| SignatureContainerBuilder::estimate_size(identity, &evidence));
        let calculator = ByteRangeCalculator::new(reserved);

        let original = doc.bytes().clone();
        let xref = doc.xref().clone();
        let mut update = IncrementalUpdate::new(&original, &xref);

        let sig_ref = update.allocate();
        let ap_ref = update.add(&SignatureAppearance::new(placement, signing_time).to_object());
        let widget = WidgetSpec {
            page: page_ref,
            rect: placement.rect(),
            appearance: ap_ref,
        };
        let (field_ref, created) = place_field(&mut doc, &mut update, existing, field_name, sig_ref, &widget)
            .map_err(Error::into_malformed)?;
        update_catalog(&mut doc, &mut update, created.then_some(field_ref), sig_ref).map_err(Error::into_malformed)?;

        let sig_dict = self.signature_dictionary(identity_name(leaf.subject()), signing_time);
        let contents_placeholder = calculator.contents_placeholder();
        let body = ObjectSerializer::new().serialize_with_raw_entries(
            &sig_dict,
            &[
                ("ByteRange", BYTE_RANGE_PLACEHOLDER.as_bytes()),
                ("Contents", contents_placeholder.as_bytes()),
            ],
        );
        let sig_len = wrap_indirect(sig_ref.id, sig_ref.gen, &body).len();
        update.put_raw(sig_ref, body);

        let written = update.write()?;
        let sig_offset = written
            .offset_of(sig_ref)
            .ok_or_else(|| Error::MalformedDocument("signature dictionary was not written".to_string()))?;
        let mut bytes = written.bytes;

        let window = sig_offset..sig_offset + sig_len;
        let byte_range_offset = ByteRangeCalculator::find_value_offset(&bytes, window.clone(), b"/ByteRange")
            .ok_or_else(|| Error::MalformedDocument("/ByteRange placeholder not found".to_string()))?;
        let contents_offset = ByteRangeCalculator::find_value_offset(&bytes, window, b"/Contents")
            .ok_or_else(|| Error::MalformedDocument("/Contents placeholder not found".to_string()))?;

        let byte_range = calculator.calculate_byte_range(bytes.len(), contents_offset)?;
        ByteRangeCalculator::patch_byte_range(&mut bytes, byte_range_offset, &byte_range)?;

        let digest = {
            let (head, tail) = ByteRangeCalculator::signed_ranges(&bytes, &byte_range)?;
            identity.scheme.digest_algorithm().digest_parts(&[head, tail])
        };
        let container = SignatureContainerBuilder::new(signing_time).build(&digest, identity, &evidence)?;
        calculator.insert_signature(&mut bytes, contents_offset, &container)?;

        log::info!(
            "Certified document as '{}': {} -> {} bytes, container {}/{} bytes, {} evidence gaps",
            field_name,
            pdf.len(),
            bytes.len(),
            container.len(),
            reserved,
            evidence.warnings.len()
        );

        Ok(SignedDocument {
            bytes,
            warnings: evidence.warnings,
            byte_range,
            digest,
        })
    }

    /// Refuse documents that already carry a signature and locate the
    /// reusable field (if any) and the target page.
    fn inspect(&self, doc: &mut PdfDocument, page: usize) -> Result<(Option<FormField>, ObjectRef)> {
        if doc.has_certification()? {
            return Err(Error::AlreadySigned("document already carries a certification signature".to_string()));
        }
        // A certification signature must be the first one in the document.
        if let Some(signed) = doc.signed_fields()?.first() {
            return Err(Error::AlreadySigned(format!("field '{}' is already signed", signed.name)));
        }

        let field_name = &self.options.field_name;
        let existing = doc.find_field(field_name)?;
        if let Some(field) = &existing {
            if field.is_signed() {
                return Err(Error::AlreadySigned(format!("field '{}' is already signed", field_name)));
            }
            if field.field_type() != Some("Sig") {
                return Err(Error::MalformedDocument(format!(
                    "field '{}' is not a signature field",
                    field_name
                )));
            }
        }
        let page_ref = doc.page_ref(page)?;
        Ok((existing, page_ref))
    }

    /// Apply the revocation policy to whatever the collector returns.
    fn collect_evidence(&self, identity: &SigningIdentity) -> Result<Collected> {
        if self.options.revocation_policy == RevocationPolicy::Skip {
            log::debug!("Revocation collection skipped by policy");
            return Ok(Collected::default());
        }

        let collected = self.revocation.collect(&identity.chain);
        if collected.warnings.is_empty() {
            return Ok(collected);
        }

        let summary = collected
            .warnings
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        match self.options.revocation_policy {
            RevocationPolicy::Require => Err(Error::RevocationUnavailable(summary)),
            _ => {
                log::info!("Signing with incomplete revocation evidence: {}", summary);
                Ok(collected)
            },
        }
    }

    /// Everything in the signature dictionary except the two placeholders.
    fn signature_dictionary(&self, signer_name: String, signing_time: DateTime<Utc>) -> Dictionary {
        let level = CertificationLevel::CertifiedNoChangesAllowed;
        let params = ObjectSerializer::dict(vec![
            ("Type", ObjectSerializer::name("TransformParams")),
            ("P", ObjectSerializer::integer(level.permission().unwrap_or(1))),
            ("V", ObjectSerializer::name("1.2")),
        ]);
        let reference = ObjectSerializer::dict(vec![
            ("Type", ObjectSerializer::name("SigRef")),
            ("TransformMethod", ObjectSerializer::name("DocMDP")),
            ("TransformParams", params),
        ]);

        let mut dict = Dictionary::new();
        dict.insert("Type".to_string(), ObjectSerializer::name("Sig"));
        dict.insert("Filter".to_string(), ObjectSerializer::name("Adobe.PPKLite"));
        dict.insert("SubFilter".to_string(), ObjectSerializer::name("adbe.pkcs7.detached"));
        dict.insert("M".to_string(), ObjectSerializer::string(&pdf_date(signing_time)));
        dict.insert("Name".to_string(), Object::String(signer_name.into_bytes()));
        dict.insert("Reference".to_string(), ObjectSerializer::array(vec![reference]));

        let optional = [
            ("Reason", &self.options.reason),
            ("Location", &self.options.location),
            ("ContactInfo", &self.options.contact_info),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                dict.insert(key.to_string(), Object::String(value.clone().into_bytes()));
            }
        }
        dict
    }
}

/// Where the widget goes and what it shows.
struct WidgetSpec {
    page: ObjectRef,
    rect: [f64; 4],
    appearance: ObjectRef,
}

impl WidgetSpec {
    fn apply(&self, widget: &mut Dictionary) {
        widget.insert("Type".to_string(), ObjectSerializer::name("Annot"));
        widget.insert("Subtype".to_string(), ObjectSerializer::name("Widget"));
        widget.insert("Rect".to_string(), ObjectSerializer::rect(self.rect));
        widget.insert("P".to_string(), ObjectSerializer::reference(self.page));
        widget.insert("F".to_string(), ObjectSerializer::integer(WIDGET_FLAGS));
        widget.insert(
            "AP".to_string(),
            ObjectSerializer::dict(vec![("N", ObjectSerializer::reference(self.appearance))]),
        );
    }
}

/// Fill the existing field or create a new one. Returns the field and
/// whether it was created.
fn place_field(
    doc: &mut PdfDocument,
    update: &mut IncrementalUpdate<'_>,
    existing: Option<FormField>,
    field_name: &str,
    sig_ref: ObjectRef,
    widget: &WidgetSpec,
) -> Result<(ObjectRef, bool)> {
    let Some(field) = existing else {
        // Only terminal top-level fields can be created.
        if field_name.contains('.') {
            return Err(Error::Config(format!(
                "field '{}' does not exist and qualified names cannot be created",
                field_name
            )));
        }
        let field_ref = update.allocate();
        let mut dict = Dictionary::new();
        dict.insert("FT".to_string(), ObjectSerializer::name("Sig"));
        dict.insert("T".to_string(), ObjectSerializer::string(field_name));
        dict.insert("V".to_string(), ObjectSerializer::reference(sig_ref));
        widget.apply(&mut dict);
        update.put(field_ref, &Object::Dictionary(dict));
        add_annotation(doc, update, widget.page, field_ref)?;
        log::debug!("Created signature field '{}' as {}", field_name, field_ref);
        return Ok((field_ref, true));
    };

    // Work on the stored dictionary, not the copy with inherited /FT.
    let mut dict = doc.resolve_dict(&Object::Reference(field.obj_ref))?;
    dict.insert("V".to_string(), ObjectSerializer::reference(sig_ref));

    let first_kid = match dict.get("Kids") {
        Some(kids) => doc
            .resolve(kids)?
            .as_array()
            .and_then(|kids| kids.first())
            .and_then(Object::as_reference),
        None => None,
    };

    let (widget_ref, previous_page) = match first_kid {
        Some(kid_ref) => {
            let mut kid = doc.resolve_dict(&Object::Reference(kid_ref))?;
            let previous_page = kid.get("P").and_then(Object::as_reference);
            widget.apply(&mut kid);
            update.put(kid_ref, &Object::Dictionary(kid));
            update.put(field.obj_ref, &Object::Dictionary(dict));
            (kid_ref, previous_page)
        },
        None => {
            let previous_page = dict.get("P").and_then(Object::as_reference);
            widget.apply(&mut dict);
            update.put(field.obj_ref, &Object::Dictionary(dict));
            (field.obj_ref, previous_page)
        },
    };

    if let Some(old_page) = previous_page.filter(|p| *p != widget.page) {
        remove_annotation(doc, update, old_page, widget_ref)?;
    }
    add_annotation(doc, update, widget.page, widget_ref)?;
    log::debug!("Filling existing signature field '{}' ({})", field.name, field.obj_ref);
    Ok((field.obj_ref, false))
}

fn add_annotation(
    doc: &mut PdfDocument,
    update: &mut IncrementalUpdate<'_>,
    page_ref: ObjectRef,
    annot: ObjectRef,
) -> Result<()> {
    edit_annotations(doc, update, page_ref, |annots| {
        if annots.iter().any(|a| a.as_reference() == Some(annot)) {
            return false;
        }
        annots.push(Object::Reference(annot));
        true
    })
}

fn remove_annotation(
    doc: &mut PdfDocument,
    update: &mut IncrementalUpdate<'_>,
    page_ref: ObjectRef,
    annot: ObjectRef,
) -> Result<()> {
    edit_annotations(doc, update, page_ref, |annots| {
        let before = annots.len();
        annots.retain(|a| a.as_reference() != Some(annot));
        annots.len() != before
    })
}

/// Apply `edit` to a page's `/Annots`, writing back whichever object holds
/// the array when `edit` reports a change.
fn edit_annotations<F>(
    doc: &mut PdfDocument,
    update: &mut IncrementalUpdate<'_>,
    page_ref: ObjectRef,
    edit: F,
) -> Result<()>
where
    F: FnOnce(&mut Vec<Object>) -> bool,
{
    let mut page = doc.resolve_dict(&Object::Reference(page_ref))?;
    match page.get("Annots").cloned() {
        Some(Object::Reference(annots_ref)) => {
            let mut annots = doc.get_object(annots_ref)?.as_array().cloned().unwrap_or_default();
            if edit(&mut annots) {
                update.put(annots_ref, &Object::Array(annots));
            }
        },
        other => {
            let mut annots = other.and_then(|o| o.as_array().cloned()).unwrap_or_default();
            if edit(&mut annots) {
                page.insert("Annots".to_string(), Object::Array(annots));
                update.put(page_ref, &Object::Dictionary(page));
            }
        },
    }
    Ok(())
}

/// Register the field in the AcroForm and certify through `/Perms /DocMDP`.
fn update_catalog(
    doc: &mut PdfDocument,
    update: &mut IncrementalUpdate<'_>,
    new_field: Option<ObjectRef>,
    sig_ref: ObjectRef,
) -> Result<()> {
    let catalog_ref = doc.catalog_ref()?;
    let mut catalog = doc.catalog()?;

    let (acroform_ref, mut acroform) = match catalog.get("AcroForm").cloned() {
        Some(Object::Reference(r)) => (r, doc.resolve_dict(&Object::Reference(r))?),
        Some(direct) => (update.allocate(), doc.resolve_dict(&direct)?),
        None => (update.allocate(), Dictionary::new()),
    };

    if let Some(field_ref) = new_field {
        match acroform.get("Fields").cloned() {
            Some(Object::Reference(fields_ref)) => {
                let mut fields = doc.get_object(fields_ref)?.as_array().cloned().unwrap_or_default();
                fields.push(Object::Reference(field_ref));
                update.put(fields_ref, &Object::Array(fields));
            },
            other => {
                let mut fields = other.and_then(|o| o.as_array().cloned()).unwrap_or_default();
                fields.push(Object::Reference(field_ref));
                acroform.insert("Fields".to_string(), Object::Array(fields));
            },
        }
    }
    acroform.insert("SigFlags".to_string(), ObjectSerializer::integer(SIG_FLAGS));
    update.put(acroform_ref, &Object::Dictionary(acroform));
    catalog.insert("AcroForm".to_string(), ObjectSerializer::reference(acroform_ref));

    match catalog.get("Perms").cloned() {
        Some(Object::Reference(perms_ref)) => {
            let mut perms = doc.resolve_dict(&Object::Reference(perms_ref))?;
            perms.insert("DocMDP".to_string(), ObjectSerializer::reference(sig_ref));
            update.put(perms_ref, &Object::Dictionary(perms));
        },
        other => {
            let mut perms = other.and_then(|o| o.as_dict().cloned()).unwrap_or_default();
            perms.insert("DocMDP".to_string(), ObjectSerializer::reference(sig_ref));
            catalog.insert("Perms".to_string(), Object::Dictionary(perms));
        },
    }
    update.put(catalog_ref, &Object::Dictionary(catalog));
    Ok(())
}

/// `D:YYYYMMDDHHmmSS+00'00'`
fn pdf_date(time: DateTime<Utc>) -> String {
    time.format("D:%Y%m%d%H%M%S+00'00'").to_string()
}

/// Common name of a subject, or the whole subject when it has none.
fn identity_name(subject: &str) -> String {
    subject
        .split(',')
        .map(str::trim)
        .find_map(|rdn| rdn.strip_prefix("CN="))
        .unwrap_or(subject)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::identity::{Certificate, PrivateKeyHandle};
    use crate::signatures::revocation::OcspClient;
    use crate::signatures::types::RevocationPolicy;
    use chrono::TimeZone;
    use std::sync::Arc;

    const ONE_PAGE: &[u8] = include_bytes!("../../tests/fixtures/one_page.pdf");
    const LEAF: &[u8] = include_bytes!("../../tests/fixtures/leaf.der");
    const CA: &[u8] = include_bytes!("../../tests/fixtures/ca.der");
    const LEAF_KEY: &[u8] = include_bytes!("../../tests/fixtures/leaf.pk8");

    fn identity() -> SigningIdentity {
        SigningIdentity::new(
            PrivateKeyHandle::from_pkcs8_der(LEAF_KEY).unwrap(),
            vec![Certificate::from_der(LEAF).unwrap(), Certificate::from_der(CA).unwrap()],
        )
    }

    fn time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 7, 9, 5, 2).unwrap()
    }

    struct FailingOcsp;

    impl OcspClient for FailingOcsp {
        fn fetch(&self, _cert: &Certificate, _issuer: &Certificate) -> Result<Vec<u8>> {
            Err(Error::Network("connection refused".to_string()))
        }
    }

    #[test]
    fn test_pdf_date() {
        assert_eq!(pdf_date(time()), "D:20260307090502+00'00'");
    }

    #[test]
    fn test_identity_name() {
        assert_eq!(identity_name("CN=Test Signer, O=Example, C=DE"), "Test Signer");
        assert_eq!(identity_name("O=Example, CN=Nested"), "Nested");
        assert_eq!(identity_name("O=Example"), "O=Example");
    }

    #[test]
    fn test_signature_dictionary_entries() {
        let signer = PdfSigner::new(SignOptions::default().with_reason("Approval"));
        let dict = signer.signature_dictionary("Test Signer".to_string(), time());
        assert_eq!(dict["Filter"].as_name(), Some("Adobe.PPKLite"));
        assert_eq!(dict["SubFilter"].as_name(), Some("adbe.pkcs7.detached"));
        assert_eq!(dict["Reason"].as_string(), Some(&b"Approval"[..]));
        assert!(!dict.contains_key("Location"));

        let reference = dict["Reference"].as_array().unwrap()[0].as_dict().unwrap();
        assert_eq!(reference["TransformMethod"].as_name(), Some("DocMDP"));
        let params = reference["TransformParams"].as_dict().unwrap();
        assert_eq!(params["P"].as_integer(), Some(1));
        assert_eq!(params["V"].as_name(), Some("1.2"));
    }

    #[test]
    fn test_sign_produces_valid_byte_range() {
        let signer = PdfSigner::new(SignOptions::default().with_revocation_policy(RevocationPolicy::Skip))
            .with_signing_time(time());
        let signed = signer.sign(ONE_PAGE, &identity(), &SignaturePlacement::default()).unwrap();

        assert!(signed.bytes.starts_with(ONE_PAGE));
        let [start, len1, off2, len2] = signed.byte_range;
        assert_eq!(start, 0);
        assert_eq!(off2 + len2, signed.bytes.len());
        assert_eq!(signed.bytes[len1], b'<');
        assert_eq!(signed.bytes[off2 - 1], b'>');
        assert!(signed.warnings.is_empty());

        let (head, tail) = ByteRangeCalculator::signed_ranges(&signed.bytes, &signed.byte_range).unwrap();
        let recomputed = identity().scheme.digest_algorithm().digest_parts(&[head, tail]);
        assert_eq!(recomputed, signed.digest);
    }

    #[test]
    fn test_best_effort_reports_warnings() {
        let collector = RevocationCollector::disabled().with_ocsp(Arc::new(FailingOcsp));
        let signer = PdfSigner::new(SignOptions::default())
            .with_revocation(collector)
            .with_signing_time(time());
        let signed = signer.sign(ONE_PAGE, &identity(), &SignaturePlacement::default()).unwrap();
        assert_eq!(signed.warnings.len(), 1);
        assert!(signed.warnings[0].reason.contains("connection refused"));
    }

    #[test]
    fn test_require_policy_refuses_without_evidence() {
        let collector = RevocationCollector::disabled().with_ocsp(Arc::new(FailingOcsp));
        let signer = PdfSigner::new(SignOptions::default().with_revocation_policy(RevocationPolicy::Require))
            .with_revocation(collector);
        let err = signer.sign(ONE_PAGE, &identity(), &SignaturePlacement::default()).unwrap_err();
        assert!(matches!(err, Error::RevocationUnavailable(_)));
    }

    #[test]
    fn test_page_out_of_range() {
        let signer = PdfSigner::new(SignOptions::default().with_revocation_policy(RevocationPolicy::Skip));
        let placement = SignaturePlacement {
            page: 2,
            ..SignaturePlacement::default()
        };
        let err = signer.sign(ONE_PAGE, &identity(), &placement).unwrap_err();
        assert!(matches!(err, Error::PageOutOfRange { page: 2, count: 1 }));
    }
}
