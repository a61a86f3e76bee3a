//! Object stream (`/Type /ObjStm`) unpacking.
//!
//! The decoded stream starts with `/N` pairs of integers (object number,
//! offset relative to `/First`), followed by the objects themselves.

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::Object;
use crate::parser::parse_object;
use std::collections::HashMap;

/// Parse every object packed in an object stream.
///
/// Objects that fail to parse are logged and skipped; looking one of them up
/// later reports it as missing.
pub fn parse_object_stream(stream_obj: &Object) -> Result<HashMap<u32, Object>> {
    let dict = match stream_obj {
        Object::Stream { dict, .. } => dict,
        other => {
            return Err(Error::MalformedDocument(format!(
                "object stream is a {}, not a Stream",
                other.type_name()
            )))
        },
    };

    if let Some(kind) = dict.get("Type").and_then(|o| o.as_name()) {
        if kind != "ObjStm" {
            return Err(Error::MalformedDocument(format!("expected /Type /ObjStm, got /{}", kind)));
        }
    }

    let count = dict
        .get("N")
        .and_then(|o| o.as_integer())
        .filter(|n| (0..=1_000_000).contains(n))
        .ok_or_else(|| Error::MalformedDocument("object stream has no valid /N".to_string()))?
        as usize;
    let first = dict
        .get("First")
        .and_then(|o| o.as_integer())
        .filter(|n| *n >= 0)
        .ok_or_else(|| Error::MalformedDocument("object stream has no valid /First".to_string()))?
        as usize;

    let decoded = stream_obj.decode_stream_data()?;
    if decoded.len() < first {
        return Err(Error::MalformedDocument(format!(
            "object stream holds {} bytes but /First is {}",
            decoded.len(),
            first
        )));
    }

    let pairs = read_pairs(&decoded[..first], count)?;
    let body = &decoded[first..];
    let mut objects = HashMap::with_capacity(pairs.len());

    for (id, offset) in pairs {
        let Some(slice) = body.get(offset..) else {
            log::warn!("Object {} offset {} is past the end of its object stream", id, offset);
            continue;
        };
        match parse_object(slice) {
            Ok((_, object)) => {
                objects.insert(id, object);
            },
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                log::warn!("Failed to parse object {} in object stream: {:?}", id, e.code)
            },
            Err(nom::Err::Incomplete(_)) => log::warn!("Object {} in object stream is truncated", id),
        }
    }

    Ok(objects)
}

fn read_pairs(header: &[u8], count: usize) -> Result<Vec<(u32, usize)>> {
    let mut pairs = Vec::with_capacity(count);
    let mut rest = header;

    for i in 0..count {
        let mut next = || -> Result<i64> {
            match token(rest) {
                Ok((after, Token::Integer(n))) if n >= 0 => {
                    rest = after;
                    Ok(n)
                },
                _ => Err(Error::ParseError {
                    offset: header.len() - rest.len(),
                    reason: format!("bad object stream header pair {}", i),
                }),
            }
        };
        let id = next()? as u32;
        let offset = next()? as usize;
        pairs.push((id, offset));
    }

    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Dictionary;
    use bytes::Bytes;

    fn objstm(n: i64, first: i64, data: &'static [u8]) -> Object {
        let mut dict = Dictionary::new();
        dict.insert("Type".to_string(), Object::Name("ObjStm".to_string()));
        dict.insert("N".to_string(), Object::Integer(n));
        dict.insert("First".to_string(), Object::Integer(first));
        Object::Stream {
            dict,
            data: Bytes::from_static(data),
        }
    }

    #[test]
    fn test_two_objects() {
        let stream = objstm(2, 9, b"1 0 2 34 << /Type /Catalog /Pages 2 0 R >> << /Type /Pages >>");
        let objects = parse_object_stream(&stream).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[&1].as_dict().unwrap()["Type"].as_name(), Some("Catalog"));
        assert_eq!(objects[&2].as_dict().unwrap()["Type"].as_name(), Some("Pages"));
    }

    #[test]
    fn test_offset_past_end_is_skipped() {
        let stream = objstm(1, 6, b"7 500 null");
        assert!(parse_object_stream(&stream).unwrap().is_empty());
    }

    #[test]
    fn test_short_header_fails() {
        let stream = objstm(2, 4, b"1 0 null");
        assert!(parse_object_stream(&stream).is_err());
    }

    #[test]
    fn test_not_a_stream() {
        assert!(parse_object_stream(&Object::Null).is_err());
    }
}
