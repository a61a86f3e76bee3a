//! Stream decoders for the filters used by cross-reference and object streams.
//!
//! The signer only decodes structural streams (xref streams, object streams);
//! page content is copied through untouched, so FlateDecode with optional PNG
//! predictors is the whole pipeline.

use crate::error::{Error, Result};

mod flate;
mod predictor;

pub use flate::FlateDecoder;
pub use predictor::{decode_predictor, DecodeParams};

/// Trait for PDF stream decoders.
pub trait StreamDecoder {
    /// Decode the input data.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Get the name of this decoder (e.g., "FlateDecode").
    fn name(&self) -> &str;
}

/// Decode stream data using a filter pipeline, then undo any predictor.
pub fn decode_stream_with_params(
    data: &[u8],
    filters: &[String],
    params: Option<&DecodeParams>,
) -> Result<Vec<u8>> {
    let mut current = data.to_vec();

    for filter_name in filters {
        let decoder: Box<dyn StreamDecoder> = match filter_name.as_str() {
            "FlateDecode" | "Fl" => Box::new(FlateDecoder),
            other => return Err(Error::Decode(format!("unsupported filter: {}", other))),
        };

        log::debug!("Applying {} to {} bytes", decoder.name(), current.len());
        current = decoder.decode(&current)?;
    }

    if let Some(params) = params {
        if params.predictor != 1 {
            current = decode_predictor(&current, params)?;
        }
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_decode_stream_no_filters() {
        let result = decode_stream_with_params(b"Hello, World!", &[], None).unwrap();
        assert_eq!(result, b"Hello, World!");
    }

    #[test]
    fn test_decode_stream_unsupported_filter() {
        let filters = vec!["DCTDecode".to_string()];
        match decode_stream_with_params(b"test", &filters, None) {
            Err(Error::Decode(msg)) => assert!(msg.contains("DCTDecode")),
            other => panic!("Expected Decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_flate_with_up_predictor() {
        // Two rows of three bytes, encoded with PNG Up (tag 2).
        let encoded = [2u8, 1, 2, 3, 2, 1, 1, 1];
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&encoded).unwrap();
        let compressed = enc.finish().unwrap();

        let params = DecodeParams {
            predictor: 12,
            columns: 3,
            ..Default::default()
        };
        let result =
            decode_stream_with_params(&compressed, &["FlateDecode".to_string()], Some(&params))
                .unwrap();
        assert_eq!(result, vec![1, 2, 3, 2, 3, 4]);
    }
}
