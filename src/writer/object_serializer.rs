//! PDF object serialization.
//!
//! Serializes PDF objects to their byte representation according to
//! PDF specification ISO 32000-1:2008. Dictionary keys are written in
//! sorted order so the same object always produces the same bytes.

use crate::object::{Dictionary, Object, ObjectRef};
use std::io::Write;

/// Serializer for PDF objects.
#[derive(Debug, Clone, Default)]
pub struct ObjectSerializer {
    /// Whether to use compact formatting (minimal whitespace)
    compact: bool,
}

impl ObjectSerializer {
    /// Create a new object serializer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a compact serializer (minimal whitespace).
    pub fn compact() -> Self {
        Self { compact: true }
    }

    /// Serialize an object to bytes.
    pub fn serialize(&self, obj: &Object) -> Vec<u8> {
        let mut buf = Vec::new();
        // Writes into a Vec never fail.
        let _ = self.write_object(&mut buf, obj);
        buf
    }

    /// Serialize an object to a string (for debugging).
    pub fn serialize_to_string(&self, obj: &Object) -> String {
        String::from_utf8_lossy(&self.serialize(obj)).to_string()
    }

    /// Serialize a dictionary followed by pre-encoded entries.
    ///
    /// `raw` values are copied verbatim after the regular keys, in the
    /// order given. Used for values that are patched in place later and so
    /// must keep an exact textual form.
    pub fn serialize_with_raw_entries(&self, dict: &Dictionary, raw: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        let _ = self.write_dictionary_entries(&mut buf, dict, raw);
        buf
    }

    /// Serialize an indirect object definition.
    ///
    /// Format: `{id} {gen} obj\n{object}\nendobj\n`
    pub fn serialize_indirect(&self, id: u32, gen: u16, obj: &Object) -> Vec<u8> {
        wrap_indirect(id, gen, &self.serialize(obj))
    }

    fn write_object<W: Write>(&self, w: &mut W, obj: &Object) -> std::io::Result<()> {
        match obj {
            Object::Null => write!(w, "null"),
            Object::Boolean(b) => write!(w, "{}", if *b { "true" } else { "false" }),
            Object::Integer(i) => write!(w, "{}", i),
            Object::Real(r) => self.write_real(w, *r),
            Object::String(s) => self.write_string(w, s),
            Object::Name(n) => self.write_name(w, n),
            Object::Array(arr) => self.write_array(w, arr),
            Object::Dictionary(dict) => self.write_dictionary_entries(w, dict, &[]),
            Object::Stream { dict, data } => self.write_stream(w, dict, data),
            Object::Reference(r) => write!(w, "{} {} R", r.id, r.gen),
        }
    }

    /// Real numbers get at most five decimals, trailing zeros trimmed.
    fn write_real<W: Write>(&self, w: &mut W, value: f64) -> std::io::Result<()> {
        if value.fract() == 0.0 {
            write!(w, "{}", value as i64)
        } else {
            let formatted = format!("{:.5}", value);
            let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
            write!(w, "{}", trimmed)
        }
    }

    /// Literal `(...)` for printable ASCII, hex `<...>` otherwise.
    fn write_string<W: Write>(&self, w: &mut W, data: &[u8]) -> std::io::Result<()> {
        let is_printable = data
            .iter()
            .all(|&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..=0x7E).contains(&b));

        if is_printable {
            write!(w, "(")?;
            for &byte in data {
                match byte {
                    b'(' => write!(w, "\\(")?,
                    b')' => write!(w, "\\)")?,
                    b'\\' => write!(w, "\\\\")?,
                    b'\n' => write!(w, "\\n")?,
                    b'\r' => write!(w, "\\r")?,
                    b'\t' => write!(w, "\\t")?,
                    _ => w.write_all(&[byte])?,
                }
            }
            write!(w, ")")
        } else {
            write!(w, "<")?;
            for byte in data {
                write!(w, "{:02X}", byte)?;
            }
            write!(w, ">")
        }
    }

    /// Names escape delimiters, whitespace and non-ASCII as `#xx`.
    fn write_name<W: Write>(&self, w: &mut W, name: &str) -> std::io::Result<()> {
        write!(w, "/")?;
        for byte in name.bytes() {
            match byte {
                b'!'
                | b'"'
                | b'$'..=b'&'
                | b'\''
                | b'*'..=b'.'
                | b'0'..=b'9'
                | b';'
                | b'='
                | b'?'
                | b'@'
                | b'A'..=b'Z'
                | b'^'..=b'z'
                | b'|'
                | b'~' => w.write_all(&[byte])?,
                _ => write!(w, "#{:02X}", byte)?,
            }
        }
        Ok(())
    }

    fn write_array<W: Write>(&self, w: &mut W, arr: &[Object]) -> std::io::Result<()> {
        write!(w, "[")?;
        for (i, obj) in arr.iter().enumerate() {
            if i > 0 {
                write!(w, " ")?;
            }
            self.write_object(w, obj)?;
        }
        write!(w, "]")
    }

    fn write_dictionary_entries<W: Write>(
        &self,
        w: &mut W,
        dict: &Dictionary,
        raw: &[(&str, &[u8])],
    ) -> std::io::Result<()> {
        write!(w, "<<")?;

        let mut keys: Vec<_> = dict.keys().collect();
        keys.sort();

        for key in keys {
            self.write_separator(w)?;
            self.write_name(w, key)?;
            write!(w, " ")?;
            self.write_object(w, &dict[key])?;
        }
        for (key, value) in raw {
            self.write_separator(w)?;
            self.write_name(w, key)?;
            write!(w, " ")?;
            w.write_all(value)?;
        }

        if !self.compact && !(dict.is_empty() && raw.is_empty()) {
            writeln!(w)?;
        }
        write!(w, ">>")
    }

    fn write_separator<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        if self.compact {
            write!(w, " ")
        } else {
            write!(w, "\n  ")
        }
    }

    /// `/Length` always reflects the data actually written.
    fn write_stream<W: Write>(&self, w: &mut W, dict: &Dictionary, data: &[u8]) -> std::io::Result<()> {
        let mut dict_with_length = dict.clone();
        dict_with_length.insert("Length".to_string(), Object::Integer(data.len() as i64));

        self.write_dictionary_entries(w, &dict_with_length, &[])?;
        write!(w, "\nstream\n")?;
        w.write_all(data)?;
        write!(w, "\nendstream")
    }
}

/// Wrap an already serialized body as `{id} {gen} obj ... endobj`.
pub fn wrap_indirect(id: u32, gen: u16, body: &[u8]) -> Vec<u8> {
    let header = format!("{} {} obj\n", id, gen);
    let mut buf = Vec::with_capacity(header.len() + body.len() + 8);
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(body);
    buf.extend_from_slice(b"\nendobj\n");
    buf
}

/// Helper functions for building PDF objects.
impl ObjectSerializer {
    /// Create a Name object.
    pub fn name(s: &str) -> Object {
        Object::Name(s.to_string())
    }

    /// Create a String object from a Rust string.
    pub fn string(s: &str) -> Object {
        Object::String(s.as_bytes().to_vec())
    }

    /// Create an Integer object.
    pub fn integer(i: i64) -> Object {
        Object::Integer(i)
    }

    /// Create a Real object.
    pub fn real(r: f64) -> Object {
        Object::Real(r)
    }

    /// Create an Array object.
    pub fn array(items: Vec<Object>) -> Object {
        Object::Array(items)
    }

    /// Create a Dictionary object.
    pub fn dict(entries: Vec<(&str, Object)>) -> Object {
        Object::Dictionary(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    /// Create a Reference object.
    pub fn reference(obj_ref: ObjectRef) -> Object {
        Object::Reference(obj_ref)
    }

    /// Rectangle array from `[llx, lly, urx, ury]`.
    pub fn rect(rect: [f64; 4]) -> Object {
        Object::Array(rect.iter().map(|v| Object::Real(*v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_object;

    #[test]
    fn test_serialize_scalars() {
        let s = ObjectSerializer::new();
        assert_eq!(s.serialize_to_string(&Object::Null), "null");
        assert_eq!(s.serialize_to_string(&Object::Boolean(true)), "true");
        assert_eq!(s.serialize_to_string(&Object::Integer(-123)), "-123");
        assert_eq!(s.serialize_to_string(&Object::Real(3.14258)), "3.14258");
        assert_eq!(s.serialize_to_string(&Object::Real(1.0)), "1");
        assert_eq!(s.serialize_to_string(&Object::Real(0.5)), "0.5");
    }

    #[test]
    fn test_serialize_strings() {
        let s = ObjectSerializer::new();
        assert_eq!(
            s.serialize_to_string(&Object::String(b"Test (parens)".to_vec())),
            "(Test \\(parens\\))"
        );
        assert_eq!(s.serialize_to_string(&Object::String(vec![0x00, 0xFF, 0x80])), "<00FF80>");
    }

    #[test]
    fn test_serialize_name_with_special_chars() {
        let s = ObjectSerializer::new();
        assert_eq!(s.serialize_to_string(&ObjectSerializer::name("Adobe.PPKLite")), "/Adobe.PPKLite");
        assert_eq!(
            s.serialize_to_string(&ObjectSerializer::name("Name With Space")),
            "/Name#20With#20Space"
        );
        assert_eq!(s.serialize_to_string(&ObjectSerializer::name("a/b")), "/a#2Fb");
    }

    #[test]
    fn test_dictionary_keys_sorted() {
        let s = ObjectSerializer::compact();
        let dict = ObjectSerializer::dict(vec![
            ("Type", ObjectSerializer::name("Sig")),
            ("Filter", ObjectSerializer::name("Adobe.PPKLite")),
            ("M", ObjectSerializer::string("D:20260101000000Z")),
        ]);
        assert_eq!(
            s.serialize_to_string(&dict),
            "<< /Filter /Adobe.PPKLite /M (D:20260101000000Z) /Type /Sig>>"
        );
    }

    #[test]
    fn test_raw_entries_follow_sorted_keys() {
        let s = ObjectSerializer::compact();
        let mut dict = Dictionary::new();
        dict.insert("Type".to_string(), ObjectSerializer::name("Sig"));
        let bytes = s.serialize_with_raw_entries(&dict, &[("Contents", b"<0000>"), ("ByteRange", b"[0 0 0 0]")]);
        assert_eq!(bytes, b"<< /Type /Sig /Contents <0000> /ByteRange [0 0 0 0]>>");
    }

    #[test]
    fn test_indirect_and_reparse() {
        let s = ObjectSerializer::new();
        let bytes = s.serialize_indirect(7, 0, &ObjectSerializer::rect([0.0, 0.0, 612.0, 792.0]));
        assert_eq!(bytes, b"7 0 obj\n[0 0 612 792]\nendobj\n");

        let dict = ObjectSerializer::dict(vec![
            ("Kids", ObjectSerializer::array(vec![ObjectSerializer::reference(ObjectRef::new(3, 0))])),
            ("T", ObjectSerializer::string("signature")),
        ]);
        let (_, parsed) = parse_object(&s.serialize(&dict)).unwrap();
        assert_eq!(parsed, dict);
    }

    #[test]
    fn test_stream_length_is_recomputed() {
        let s = ObjectSerializer::compact();
        let mut dict = Dictionary::new();
        dict.insert("Length".to_string(), Object::Integer(999));
        let stream = Object::Stream {
            dict,
            data: bytes::Bytes::from_static(b"stream data"),
        };

        let result = s.serialize_to_string(&stream);
        assert!(result.contains("/Length 11"));
        assert!(result.ends_with("\nstream\nstream data\nendstream"));
    }
}
