//! Reading fixture documents: cross-reference formats, page tree, AcroForm.

use pdf_seal::object::ObjectRef;
use pdf_seal::signatures::CertificationLevel;
use pdf_seal::xref::{load_xref, XRefEntry, XRefKind};
use pdf_seal::{Error, PdfDocument};

const ONE_PAGE: &[u8] = include_bytes!("fixtures/one_page.pdf");
const THREE_PAGES: &[u8] = include_bytes!("fixtures/three_pages.pdf");
const UNSIGNED_FIELD: &[u8] = include_bytes!("fixtures/unsigned_field.pdf");
const XREF_STREAM: &[u8] = include_bytes!("fixtures/xref_stream.pdf");
const ENCRYPTED: &[u8] = include_bytes!("fixtures/encrypted.pdf");
const APPROVAL_SIGNED: &[u8] = include_bytes!("fixtures/approval_signed.pdf");
const BAD_PREDICTOR: &[u8] = include_bytes!("fixtures/bad_predictor.pdf");

#[test]
fn test_open_classic_table() {
    let mut doc = PdfDocument::open(ONE_PAGE).unwrap();
    assert_eq!(doc.version(), (1, 7));
    assert_eq!(doc.xref().kind(), XRefKind::Table);
    assert_eq!(doc.page_count().unwrap(), 1);
    assert_eq!(doc.catalog_ref().unwrap(), ObjectRef::new(1, 0));
    assert!(doc.acroform().unwrap().is_none());
    assert_eq!(doc.certification_level().unwrap(), CertificationLevel::NoRestrictions);
    assert!(!doc.has_certification().unwrap());
}

#[test]
fn test_nested_page_tree_order() {
    let mut doc = PdfDocument::open(THREE_PAGES).unwrap();
    let pages = doc.page_refs().unwrap();
    assert_eq!(pages, vec![ObjectRef::new(3, 0), ObjectRef::new(6, 0), ObjectRef::new(8, 0)]);
    assert_eq!(doc.page_ref(3).unwrap(), ObjectRef::new(8, 0));
    assert!(matches!(doc.page_ref(0), Err(Error::PageOutOfRange { page: 0, count: 3 })));
}

#[test]
fn test_xref_stream_with_object_stream() {
    let xref = load_xref(XREF_STREAM).unwrap();
    assert_eq!(xref.kind(), XRefKind::Stream);
    assert!(matches!(xref.get(1), Some(XRefEntry::Compressed { .. })));

    let mut doc = PdfDocument::open(XREF_STREAM).unwrap();
    let catalog = doc.catalog().unwrap();
    assert_eq!(catalog["Type"].as_name(), Some("Catalog"));
    assert_eq!(doc.page_count().unwrap(), 1);
}

#[test]
fn test_find_unsigned_field() {
    let mut doc = PdfDocument::open(UNSIGNED_FIELD).unwrap();
    let field = doc.find_field("signature").unwrap().unwrap();
    assert_eq!(field.obj_ref, ObjectRef::new(5, 0));
    assert_eq!(field.name, "signature");
    assert_eq!(field.field_type(), Some("Sig"));
    assert!(!field.is_signed());
    assert!(doc.signature_dictionary("signature").unwrap().is_none());
    assert!(doc.find_field("other").unwrap().is_none());
    assert_eq!(doc.acroform_ref().unwrap(), Some(ObjectRef::new(6, 0)));
}

#[test]
fn test_rejects_encrypted_and_garbage() {
    assert!(matches!(PdfDocument::open(ENCRYPTED), Err(Error::MalformedDocument(_))));
    assert!(matches!(
        PdfDocument::open(&b"%PDF-1.4\nno xref here"[..]),
        Err(Error::MalformedDocument(_))
    ));
    assert!(matches!(PdfDocument::open(&b"GIF89a"[..]), Err(Error::MalformedDocument(_))));

    // Truncating the trailer breaks the cross-reference lookup.
    let truncated = &ONE_PAGE[..ONE_PAGE.len() - 40];
    assert!(matches!(PdfDocument::open(truncated.to_vec()), Err(Error::MalformedDocument(_))));
}

#[test]
fn test_signed_fields_under_any_name() {
    let mut doc = PdfDocument::open(APPROVAL_SIGNED).unwrap();
    let signed = doc.signed_fields().unwrap();
    assert_eq!(signed.len(), 1);
    assert_eq!(signed[0].name, "approval");
    assert_eq!(signed[0].obj_ref, ObjectRef::new(5, 0));

    let mut doc = PdfDocument::open(UNSIGNED_FIELD).unwrap();
    assert!(doc.signed_fields().unwrap().is_empty());
}

#[test]
fn test_out_of_range_predictor_is_malformed() {
    match PdfDocument::open(BAD_PREDICTOR) {
        Err(Error::MalformedDocument(msg)) => assert!(msg.contains("Columns"), "{}", msg),
        other => panic!("expected MalformedDocument, got {:?}", other.map(|_| ())),
    }
}
