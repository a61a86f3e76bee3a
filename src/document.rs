//! In-memory PDF document.
//!
//! [`PdfDocument`] owns the whole file as [`Bytes`] and resolves objects on
//! demand through the merged cross-reference table. It never modifies the
//! original bytes; changes are written as an incremental update by
//! [`crate::writer::IncrementalUpdate`].

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::objstm::parse_object_stream;
use crate::parser::parse_indirect_object_at;
use crate::signatures::CertificationLevel;
use crate::xref::{load_xref, CrossRefTable, XRefEntry};
use bytes::Bytes;
use std::collections::{HashMap, HashSet};

/// Maximum depth for reference chains, page trees and field trees.
const MAX_DEPTH: usize = 64;

/// A form field located in the AcroForm field tree.
#[derive(Debug, Clone)]
pub struct FormField {
    /// Indirect reference of the field dictionary
    pub obj_ref: ObjectRef,
    /// Fully qualified field name (parent names joined with `.`)
    pub name: String,
    /// The field dictionary itself
    pub dict: Dictionary,
}

impl FormField {
    /// Field type (`/FT`), which may be inherited from a parent field.
    pub fn field_type(&self) -> Option<&str> {
        self.dict.get("FT").and_then(|o| o.as_name())
    }

    /// True when the field carries a value (`/V`), i.e. it has been signed.
    pub fn is_signed(&self) -> bool {
        self.dict.get("V").is_some_and(|v| !v.is_null())
    }
}

/// A parsed PDF held entirely in memory.
pub struct PdfDocument {
    data: Bytes,
    version: (u8, u8),
    xref: CrossRefTable,
    object_cache: HashMap<ObjectRef, Object>,
    objstm_cache: HashMap<u32, HashMap<u32, Object>>,
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("version", &self.version)
            .field("len", &self.data.len())
            .field("xref_entries", &self.xref.len())
            .finish_non_exhaustive()
    }
}

impl PdfDocument {
    /// Parse the header and cross-reference data of a PDF.
    ///
    /// # Errors
    ///
    /// Every structural problem is reported as [`Error::MalformedDocument`],
    /// including encrypted documents, which this engine cannot modify.
    pub fn open(data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        let version = parse_header(&data)?;
        let xref = load_xref(&data).map_err(as_malformed)?;

        if xref.trailer().contains_key("Encrypt") {
            return Err(Error::MalformedDocument("document is encrypted".to_string()));
        }

        let mut doc = Self {
            data,
            version,
            xref,
            object_cache: HashMap::new(),
            objstm_cache: HashMap::new(),
        };

        // Fail early on documents without a usable catalog.
        doc.catalog().map_err(as_malformed)?;
        log::debug!("Opened PDF {}.{} ({} bytes)", version.0, version.1, doc.data.len());
        Ok(doc)
    }

    /// The original file bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    /// Header version as (major, minor).
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// Merged cross-reference data.
    pub fn xref(&self) -> &CrossRefTable {
        &self.xref
    }

    /// Trailer of the newest revision.
    pub fn trailer(&self) -> &Dictionary {
        self.xref.trailer()
    }

    /// Load an indirect object.
    pub fn get_object(&mut self, obj_ref: ObjectRef) -> Result<Object> {
        if let Some(obj) = self.object_cache.get(&obj_ref) {
            return Ok(obj.clone());
        }

        let entry = *self
            .xref
            .get(obj_ref.id)
            .ok_or(Error::ObjectNotFound(obj_ref.id, obj_ref.gen))?;

        let object = match entry {
            XRefEntry::Free { .. } => return Err(Error::ObjectNotFound(obj_ref.id, obj_ref.gen)),
            XRefEntry::Uncompressed { offset, .. } => {
                let (found, object) = parse_indirect_object_at(&self.data, offset)?;
                if found.id != obj_ref.id {
                    log::warn!("xref points {} at object {}", obj_ref, found);
                    return Err(Error::ObjectNotFound(obj_ref.id, obj_ref.gen));
                }
                object
            },
            XRefEntry::Compressed { stream, .. } => self.load_compressed(stream, obj_ref)?,
        };

        self.object_cache.insert(obj_ref, object.clone());
        Ok(object)
    }

    fn load_compressed(&mut self, stream: u32, obj_ref: ObjectRef) -> Result<Object> {
        if !self.objstm_cache.contains_key(&stream) {
            let stream_obj = self.get_object(ObjectRef::new(stream, 0))?;
            let objects = parse_object_stream(&stream_obj)?;
            log::debug!("Unpacked object stream {} ({} objects)", stream, objects.len());
            self.objstm_cache.insert(stream, objects);
        }

        self.objstm_cache
            .get(&stream)
            .and_then(|objects| objects.get(&obj_ref.id))
            .cloned()
            .ok_or(Error::ObjectNotFound(obj_ref.id, obj_ref.gen))
    }

    /// Follow references until a direct object is reached.
    pub fn resolve(&mut self, obj: &Object) -> Result<Object> {
        let mut current = obj.clone();
        for _ in 0..MAX_DEPTH {
            match current {
                Object::Reference(r) => current = self.get_object(r)?,
                direct => return Ok(direct),
            }
        }
        Err(Error::MalformedDocument("reference chain too deep".to_string()))
    }

    /// Resolve `obj` and require a dictionary.
    pub fn resolve_dict(&mut self, obj: &Object) -> Result<Dictionary> {
        match self.resolve(obj)? {
            Object::Dictionary(dict) => Ok(dict),
            other => Err(Error::MalformedDocument(format!(
                "expected Dictionary, found {}",
                other.type_name()
            ))),
        }
    }

    /// Reference to the document catalog (trailer `/Root`).
    pub fn catalog_ref(&self) -> Result<ObjectRef> {
        self.trailer()
            .get("Root")
            .and_then(|o| o.as_reference())
            .ok_or_else(|| Error::MalformedDocument("trailer has no /Root reference".to_string()))
    }

    /// The document catalog.
    pub fn catalog(&mut self) -> Result<Dictionary> {
        let root = self.catalog_ref()?;
        self.resolve_dict(&Object::Reference(root))
    }

    /// References of every page, in document order.
    pub fn page_refs(&mut self) -> Result<Vec<ObjectRef>> {
        let pages = self
            .catalog()?
            .get("Pages")
            .and_then(|o| o.as_reference())
            .ok_or_else(|| Error::MalformedDocument("catalog has no /Pages reference".to_string()))?;

        let mut out = Vec::new();
        let mut visited = HashSet::new();
        self.collect_pages(pages, 0, &mut visited, &mut out)?;
        Ok(out)
    }

    fn collect_pages(
        &mut self,
        node_ref: ObjectRef,
        depth: usize,
        visited: &mut HashSet<ObjectRef>,
        out: &mut Vec<ObjectRef>,
    ) -> Result<()> {
        if depth > MAX_DEPTH || !visited.insert(node_ref) {
            return Err(Error::MalformedDocument(format!("page tree cycle at {}", node_ref)));
        }

        let node = self.resolve_dict(&Object::Reference(node_ref))?;
        let is_leaf = match node.get("Type").and_then(|o| o.as_name()) {
            Some("Page") => true,
            Some("Pages") => false,
            // Untyped nodes are classified by the presence of /Kids.
            _ => !node.contains_key("Kids"),
        };

        if is_leaf {
            out.push(node_ref);
            return Ok(());
        }

        let kids = match node.get("Kids") {
            Some(kids) => self.resolve(kids)?,
            None => Object::Array(Vec::new()),
        };
        for kid in kids.as_array().map(|a| a.as_slice()).unwrap_or_default() {
            match kid.as_reference() {
                Some(kid_ref) => self.collect_pages(kid_ref, depth + 1, visited, out)?,
                None => log::warn!("Ignoring direct page tree kid under {}", node_ref),
            }
        }
        Ok(())
    }

    /// Number of pages reachable through the page tree.
    pub fn page_count(&mut self) -> Result<usize> {
        Ok(self.page_refs()?.len())
    }

    /// Reference of a 1-based page number.
    pub fn page_ref(&mut self, page: usize) -> Result<ObjectRef> {
        let pages = self.page_refs()?;
        let count = pages.len();
        page.checked_sub(1)
            .and_then(|index| pages.get(index).copied())
            .ok_or(Error::PageOutOfRange { page, count })
    }

    /// Reference of the AcroForm dictionary, if it is an indirect object.
    pub fn acroform_ref(&mut self) -> Result<Option<ObjectRef>> {
        Ok(self.catalog()?.get("AcroForm").and_then(|o| o.as_reference()))
    }

    /// The AcroForm dictionary, resolved.
    pub fn acroform(&mut self) -> Result<Option<Dictionary>> {
        match self.catalog()?.get("AcroForm") {
            Some(obj) => Ok(Some(self.resolve_dict(obj)?)),
            None => Ok(None),
        }
    }

    /// Every terminal form field, in field tree order.
    pub fn fields(&mut self) -> Result<Vec<FormField>> {
        let Some(acroform) = self.acroform()? else {
            return Ok(Vec::new());
        };
        let fields = match acroform.get("Fields") {
            Some(obj) => self.resolve(obj)?,
            None => return Ok(Vec::new()),
        };

        let mut out = Vec::new();
        let mut visited = HashSet::new();
        let roots: Vec<Object> = fields.as_array().cloned().unwrap_or_default();
        for field in roots {
            self.collect_fields(&field, "", None, 0, &mut visited, &mut out)?;
        }
        Ok(out)
    }

    /// Find a terminal form field by its fully qualified name.
    pub fn find_field(&mut self, name: &str) -> Result<Option<FormField>> {
        Ok(self.fields()?.into_iter().find(|f| f.name == name))
    }

    /// Signature fields that already carry a value, under any name.
    pub fn signed_fields(&mut self) -> Result<Vec<FormField>> {
        Ok(self
            .fields()?
            .into_iter()
            .filter(|f| f.field_type() == Some("Sig") && f.is_signed())
            .collect())
    }

    fn collect_fields(
        &mut self,
        field: &Object,
        parent_name: &str,
        inherited_ft: Option<&Object>,
        depth: usize,
        visited: &mut HashSet<ObjectRef>,
        out: &mut Vec<FormField>,
    ) -> Result<()> {
        let Some(obj_ref) = field.as_reference() else {
            log::debug!("Skipping direct field object");
            return Ok(());
        };
        if depth > MAX_DEPTH || !visited.insert(obj_ref) {
            return Ok(());
        }

        let mut dict = self.resolve_dict(field)?;
        let partial = dict.get("T").and_then(|o| o.as_string()).map(|t| String::from_utf8_lossy(t).into_owned());
        let name = match (&partial, parent_name.is_empty()) {
            (Some(p), true) => p.clone(),
            (Some(p), false) => format!("{}.{}", parent_name, p),
            (None, _) => parent_name.to_string(),
        };

        if let (None, Some(ft)) = (dict.get("FT"), inherited_ft) {
            dict.insert("FT".to_string(), ft.clone());
        }

        let kids = match dict.get("Kids") {
            Some(kids) => self.resolve(kids)?.as_array().cloned().unwrap_or_default(),
            None => Vec::new(),
        };
        // Kids without /T are widgets of this field, not child fields.
        let mut has_child_fields = false;
        for kid in &kids {
            if self.resolve_dict(kid)?.contains_key("T") {
                has_child_fields = true;
                break;
            }
        }

        if !has_child_fields {
            if partial.is_some() {
                out.push(FormField { obj_ref, name, dict });
            }
            return Ok(());
        }

        let ft = dict.get("FT").cloned();
        for kid in &kids {
            self.collect_fields(kid, &name, ft.as_ref(), depth + 1, visited, out)?;
        }
        Ok(())
    }

    /// The signature dictionary (`/V`) of a signed field.
    pub fn signature_dictionary(&mut self, name: &str) -> Result<Option<Dictionary>> {
        let Some(field) = self.find_field(name)? else {
            return Ok(None);
        };
        match field.dict.get("V") {
            Some(v) if !v.is_null() => Ok(Some(self.resolve_dict(v)?)),
            _ => Ok(None),
        }
    }

    /// Certification level declared through `/Perms /DocMDP`.
    pub fn certification_level(&mut self) -> Result<CertificationLevel> {
        let catalog = self.catalog()?;
        let Some(perms) = catalog.get("Perms") else {
            return Ok(CertificationLevel::NoRestrictions);
        };
        let perms = self.resolve_dict(perms)?;
        let Some(docmdp) = perms.get("DocMDP") else {
            return Ok(CertificationLevel::NoRestrictions);
        };
        let sig = self.resolve_dict(docmdp)?;

        let references = match sig.get("Reference") {
            Some(obj) => self.resolve(obj)?.as_array().cloned().unwrap_or_default(),
            None => Vec::new(),
        };
        for reference in &references {
            let sigref = self.resolve_dict(reference)?;
            if sigref.get("TransformMethod").and_then(|o| o.as_name()) != Some("DocMDP") {
                continue;
            }
            let p = match sigref.get("TransformParams") {
                Some(params) => self.resolve_dict(params)?.get("P").and_then(|o| o.as_integer()),
                None => None,
            };
            // A missing /P means level 2.
            return Ok(CertificationLevel::from_permission(p.unwrap_or(2)));
        }

        // /DocMDP present without a usable reference still certifies the document.
        Ok(CertificationLevel::FormFillingAllowed)
    }

    /// True when the catalog already carries a certification signature.
    pub fn has_certification(&mut self) -> Result<bool> {
        let catalog = self.catalog()?;
        match catalog.get("Perms") {
            Some(perms) => Ok(self.resolve_dict(perms)?.contains_key("DocMDP")),
            None => Ok(false),
        }
    }
}

fn as_malformed(err: Error) -> Error {
    match err {
        Error::MalformedDocument(_) => err,
        other => Error::MalformedDocument(other.to_string()),
    }
}

/// Parse `%PDF-M.m`, tolerating leading junk in the first kilobyte.
fn parse_header(data: &[u8]) -> Result<(u8, u8)> {
    let window = &data[..data.len().min(1024)];
    let pos = window
        .windows(5)
        .position(|w| w == b"%PDF-")
        .ok_or_else(|| Error::MalformedDocument("missing %PDF- header".to_string()))?;

    match data.get(pos + 5..pos + 8) {
        Some([major, b'.', minor]) if major.is_ascii_digit() && minor.is_ascii_digit() => {
            Ok((major - b'0', minor - b'0'))
        },
        _ => Err(Error::MalformedDocument("invalid PDF version in header".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a classic PDF from object bodies, numbering them from 1.
    fn build_pdf(objects: &[&str], trailer_extra: &str) -> Vec<u8> {
        let mut out = b"%PDF-1.7\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }
        let xref_at = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
        for off in offsets {
            out.extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R {} >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                trailer_extra,
                xref_at
            )
            .as_bytes(),
        );
        out
    }

    fn minimal() -> Vec<u8> {
        build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>",
            ],
            "",
        )
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(parse_header(b"%PDF-1.7\n").unwrap(), (1, 7));
        assert_eq!(parse_header(b"junk%PDF-2.0\n").unwrap(), (2, 0));
        assert!(parse_header(b"GIF89a").is_err());
        assert!(parse_header(b"%PDF-x.y").is_err());
    }

    #[test]
    fn test_open_minimal() {
        let mut doc = PdfDocument::open(minimal()).unwrap();
        assert_eq!(doc.version(), (1, 7));
        assert_eq!(doc.page_count().unwrap(), 1);
        assert_eq!(doc.page_ref(1).unwrap(), ObjectRef::new(3, 0));
        assert_eq!(doc.certification_level().unwrap(), CertificationLevel::NoRestrictions);
        assert!(doc.find_field("signature").unwrap().is_none());
    }

    #[test]
    fn test_page_out_of_range() {
        let mut doc = PdfDocument::open(minimal()).unwrap();
        match doc.page_ref(2) {
            Err(Error::PageOutOfRange { page: 2, count: 1 }) => {},
            other => panic!("expected PageOutOfRange, got {:?}", other),
        }
        assert!(matches!(doc.page_ref(0), Err(Error::PageOutOfRange { .. })));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(PdfDocument::open(b"not a pdf".to_vec()), Err(Error::MalformedDocument(_))));
        assert!(matches!(
            PdfDocument::open(b"%PDF-1.4\nno xref here\n".to_vec()),
            Err(Error::MalformedDocument(_))
        ));
    }

    #[test]
    fn test_encrypted_is_malformed() {
        let pdf = build_pdf(
            &["<< /Type /Catalog /Pages 2 0 R >>", "<< /Type /Pages /Kids [] /Count 0 >>", "<< /Filter /Standard >>"],
            "/Encrypt 3 0 R",
        );
        match PdfDocument::open(pdf) {
            Err(Error::MalformedDocument(msg)) => assert!(msg.contains("encrypted")),
            other => panic!("expected MalformedDocument, got {:?}", other),
        }
    }

    #[test]
    fn test_signed_fields_ignore_unsigned_and_non_signature_fields() {
        let pdf = build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R /AcroForm << /Fields [3 0 R 4 0 R 5 0 R] >> >>",
                "<< /Type /Pages /Kids [] /Count 0 >>",
                "<< /T (name) /FT /Tx /V (Jane) >>",
                "<< /T (signature) /FT /Sig >>",
                "<< /T (witness) /FT /Sig /V null >>",
            ],
            "",
        );
        let mut doc = PdfDocument::open(pdf).unwrap();
        assert_eq!(doc.fields().unwrap().len(), 3);
        assert!(doc.signed_fields().unwrap().is_empty());
    }

    #[test]
    fn test_deep_nesting_is_malformed() {
        let catalog = format!("<< /Type /Catalog /Pages 2 0 R /X {} >>", "[".repeat(200_000));
        let pdf = build_pdf(&[&catalog, "<< /Type /Pages /Kids [] /Count 0 >>"], "");
        assert!(matches!(PdfDocument::open(pdf), Err(Error::MalformedDocument(_))));
    }

    #[test]
    fn test_page_tree_cycle_detected() {
        let pdf = build_pdf(
            &["<< /Type /Catalog /Pages 2 0 R >>", "<< /Type /Pages /Kids [2 0 R] /Count 1 >>"],
            "",
        );
        let mut doc = PdfDocument::open(pdf).unwrap();
        assert!(matches!(doc.page_count(), Err(Error::MalformedDocument(_))));
    }

    #[test]
    fn test_nested_field_names_and_certification() {
        let pdf = build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R /AcroForm << /Fields [4 0 R] >> /Perms << /DocMDP 6 0 R >> >>",
                "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
                "<< /Type /Page /Parent 2 0 R >>",
                "<< /T (form) /FT /Sig /Kids [5 0 R] >>",
                "<< /T (approval) /Parent 4 0 R /V 6 0 R >>",
                "<< /Type /Sig /Reference [<< /Type /SigRef /TransformMethod /DocMDP /TransformParams << /P 1 >> >>] >>",
            ],
            "",
        );
        let mut doc = PdfDocument::open(pdf).unwrap();

        let field = doc.find_field("form.approval").unwrap().expect("field exists");
        assert_eq!(field.obj_ref, ObjectRef::new(5, 0));
        assert_eq!(field.field_type(), Some("Sig"));
        assert!(field.is_signed());
        assert!(doc.find_field("approval").unwrap().is_none());

        let signed: Vec<String> = doc.signed_fields().unwrap().into_iter().map(|f| f.name).collect();
        assert_eq!(signed, ["form.approval"]);

        let sig = doc.signature_dictionary("form.approval").unwrap().expect("signed");
        assert_eq!(sig.get("Type").and_then(|o| o.as_name()), Some("Sig"));
        assert!(doc.has_certification().unwrap());
        assert_eq!(
            doc.certification_level().unwrap(),
            CertificationLevel::CertifiedNoChangesAllowed
        );
    }
}
