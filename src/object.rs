//! PDF object types.

use crate::error::{Error, Result};
use std::collections::HashMap;

/// Dictionary of PDF objects keyed by name (without the leading `/`).
pub type Dictionary = HashMap<String, Object>;

/// PDF object representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Real (floating-point) value
    Real(f64),
    /// String (byte array)
    String(Vec<u8>),
    /// Name (starting with /)
    Name(String),
    /// Array of objects
    Array(Vec<Object>),
    /// Dictionary (key-value pairs)
    Dictionary(Dictionary),
    /// Stream (dictionary + data)
    Stream {
        /// Stream dictionary
        dict: Dictionary,
        /// Raw (still encoded) stream data
        data: bytes::Bytes,
    },
    /// Indirect object reference
    Reference(ObjectRef),
}

/// Reference to an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Object number
    pub id: u32,
    /// Generation number
    pub gen: u16,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.id, self.gen)
    }
}

impl Object {
    /// Get the type name of this object (without data).
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::String(_) => "String",
            Object::Name(_) => "Name",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream { .. } => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    /// Try to cast to integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value of an Integer or Real.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to dictionary. Works for both Dictionary and Stream objects.
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Mutable access to a dictionary (or a stream's dictionary).
    pub fn as_dict_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Try to cast to array.
    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Try to cast to reference.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to cast to string (bytes).
    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    /// Check if object is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// Decode stream data using the filters named in the stream dictionary.
    ///
    /// Only the filters that appear in cross-reference and object streams are
    /// supported; content streams are never decoded by the signer.
    pub fn decode_stream_data(&self) -> Result<Vec<u8>> {
        match self {
            Object::Stream { dict, data } => {
                let filters = dict
                    .get("Filter")
                    .map(extract_filter_names)
                    .unwrap_or_default();

                if filters.is_empty() {
                    return Ok(data.to_vec());
                }

                let decode_params = extract_decode_params(dict.get("DecodeParms"))?;
                crate::decoders::decode_stream_with_params(data, &filters, decode_params.as_ref())
            },
            _ => Err(Error::MalformedDocument(format!(
                "expected Stream, found {}",
                self.type_name()
            ))),
        }
    }
}

/// Extract filter names from a Filter object (a single Name or an Array of Names).
fn extract_filter_names(filter_obj: &Object) -> Vec<String> {
    match filter_obj {
        Object::Name(name) => vec![name.clone()],
        Object::Array(arr) => arr
            .iter()
            .filter_map(|obj| obj.as_name().map(|s| s.to_string()))
            .collect(),
        _ => vec![],
    }
}

/// Extract predictor parameters from a DecodeParms object.
///
/// Out-of-range sizes are rejected here so row arithmetic never overflows.
///
/// PDF Spec: ISO 32000-1:2008, Section 7.4.4.4 - LZW and Flate predictor functions
pub(crate) fn extract_decode_params(
    params_obj: Option<&Object>,
) -> Result<Option<crate::decoders::DecodeParams>> {
    let dict = match params_obj {
        Some(Object::Dictionary(d)) => d,
        Some(Object::Array(arr)) => match arr.iter().find_map(|obj| obj.as_dict()) {
            Some(d) => d,
            None => return Ok(None),
        },
        _ => return Ok(None),
    };

    let int = |key: &str, default: i64| dict.get(key).and_then(|o| o.as_integer()).unwrap_or(default);
    let bounded = |key: &str, default: i64, max: i64| -> Result<usize> {
        let value = int(key, default);
        if (1..=max).contains(&value) {
            Ok(value as usize)
        } else {
            Err(Error::Decode(format!("/{} {} out of range 1..={}", key, value, max)))
        }
    };

    let bits_per_component = bounded("BitsPerComponent", 8, 16)?;
    if !matches!(bits_per_component, 1 | 2 | 4 | 8 | 16) {
        return Err(Error::Decode(format!("/BitsPerComponent {} is not supported", bits_per_component)));
    }

    Ok(Some(crate::decoders::DecodeParams {
        predictor: int("Predictor", 1),
        columns: bounded("Columns", 1, MAX_PREDICTOR_COLUMNS)?,
        colors: bounded("Colors", 1, 32)?,
        bits_per_component,
    }))
}

/// Widest predictor row accepted, in samples.
const MAX_PREDICTOR_COLUMNS: i64 = 1 << 24;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(Object::Null.type_name(), "Null");
        assert_eq!(Object::Integer(1).type_name(), "Integer");
        assert_eq!(Object::Reference(ObjectRef::new(1, 0)).type_name(), "Reference");
    }

    #[test]
    fn test_as_number_accepts_integer_and_real() {
        assert_eq!(Object::Integer(25).as_number(), Some(25.0));
        assert_eq!(Object::Real(2.5).as_number(), Some(2.5));
        assert_eq!(Object::Name("X".into()).as_number(), None);
    }

    #[test]
    fn test_stream_dict_access() {
        let mut dict = Dictionary::new();
        dict.insert("Type".to_string(), Object::Name("XRef".to_string()));
        let mut stream = Object::Stream {
            dict,
            data: bytes::Bytes::from_static(b"abc"),
        };
        assert_eq!(stream.as_dict().and_then(|d| d.get("Type")).and_then(|o| o.as_name()), Some("XRef"));
        stream
            .as_dict_mut()
            .expect("stream has a dictionary")
            .insert("Size".to_string(), Object::Integer(3));
        assert_eq!(stream.as_dict().and_then(|d| d.get("Size")).and_then(|o| o.as_integer()), Some(3));
    }

    #[test]
    fn test_decode_params_reject_out_of_range() {
        let parms = |entries: &[(&str, i64)]| {
            let dict: Dictionary = entries
                .iter()
                .map(|(k, v)| (k.to_string(), Object::Integer(*v)))
                .collect();
            Object::Dictionary(dict)
        };

        let params = extract_decode_params(Some(&parms(&[("Predictor", 12), ("Columns", 5)])))
            .unwrap()
            .unwrap();
        assert_eq!((params.predictor, params.columns, params.colors), (12, 5, 1));
        assert!(extract_decode_params(None).unwrap().is_none());

        for bad in [
            parms(&[("Predictor", 12), ("Columns", -1)]),
            parms(&[("Predictor", 12), ("Columns", 0)]),
            parms(&[("Colors", -3)]),
            parms(&[("BitsPerComponent", 7)]),
            parms(&[("Columns", i64::MAX)]),
        ] {
            assert!(matches!(extract_decode_params(Some(&bad)), Err(Error::Decode(_))));
        }
    }

    #[test]
    fn test_decode_unfiltered_stream() {
        let stream = Object::Stream {
            dict: Dictionary::new(),
            data: bytes::Bytes::from_static(b"raw bytes"),
        };
        assert_eq!(stream.decode_stream_data().unwrap(), b"raw bytes");
    }

    #[test]
    fn test_decode_non_stream_fails() {
        assert!(Object::Integer(3).decode_stream_data().is_err());
    }

    #[test]
    fn test_object_ref_display() {
        assert_eq!(format!("{}", ObjectRef::new(12, 0)), "12 0 R");
    }
}
