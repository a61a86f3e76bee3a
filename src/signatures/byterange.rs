//! ByteRange calculation for PDF signatures.
//!
//! PDF digital signatures use a ByteRange array to specify which portions
//! of the document are covered by the signature. The signature itself is
//! stored in a placeholder that is excluded from the signed bytes.
//!
//! ## ByteRange Format
//!
//! The ByteRange is an array of four integers:
//! `[offset1, length1, offset2, length2]`
//!
//! Where:
//! - `offset1` = 0 (start of file)
//! - `length1` = byte offset where the `/Contents` hex string begins
//! - `offset2` = byte offset just after the closing `>`
//! - `length2` = remaining bytes to end of file
//!
//! Both the ByteRange array and the `/Contents` string are written as
//! fixed-width placeholders first and patched in place afterwards, so no
//! byte outside the placeholders moves between layout and signing.

use crate::error::{Error, Result};
use std::ops::Range;

/// ByteRange written before offsets are known. Each field holds up to ten digits.
pub const BYTE_RANGE_PLACEHOLDER: &str = "[0 ********** ********** **********]";

/// Calculator for PDF signature byte ranges.
#[derive(Debug, Clone, Copy)]
pub struct ByteRangeCalculator {
    /// Bytes reserved for the DER container
    reserved: usize,
}

impl ByteRangeCalculator {
    /// Reserve room for a container of `reserved_bytes` DER bytes.
    ///
    /// The `/Contents` placeholder is `reserved_bytes * 2 + 2` characters:
    /// two hex digits per byte plus the angle brackets.
    pub fn new(reserved_bytes: usize) -> Self {
        Self {
            reserved: reserved_bytes,
        }
    }

    /// Bytes available for the container.
    pub fn reserved_bytes(&self) -> usize {
        self.reserved
    }

    /// Length of the `/Contents` hex string including brackets.
    pub fn placeholder_size(&self) -> usize {
        self.reserved * 2 + 2
    }

    /// `<000...0>` of [`placeholder_size`](Self::placeholder_size) characters.
    pub fn contents_placeholder(&self) -> String {
        format!("<{}>", "0".repeat(self.reserved * 2))
    }

    /// Calculate the ByteRange given the position of the `/Contents` value.
    pub fn calculate_byte_range(&self, file_size: usize, contents_offset: usize) -> Result<[usize; 4]> {
        let after = contents_offset + self.placeholder_size();
        if after > file_size {
            return Err(Error::MalformedDocument(format!(
                "signature placeholder ends at {} past file size {}",
                after, file_size
            )));
        }
        Ok([0, contents_offset, after, file_size - after])
    }

    /// Format a ByteRange right-padded with spaces to `width` characters.
    pub fn format_byte_range(byte_range: &[usize; 4], width: usize) -> Result<String> {
        let formatted = format!(
            "[{} {} {} {}]",
            byte_range[0], byte_range[1], byte_range[2], byte_range[3]
        );
        if formatted.len() > width {
            return Err(Error::MalformedDocument(format!(
                "ByteRange {} does not fit {} reserved characters",
                formatted, width
            )));
        }
        Ok(format!("{:<width$}", formatted, width = width))
    }

    /// Write the final ByteRange over the placeholder at `offset`.
    pub fn patch_byte_range(pdf_data: &mut [u8], offset: usize, byte_range: &[usize; 4]) -> Result<()> {
        let width = BYTE_RANGE_PLACEHOLDER.len();
        let slot = pdf_data
            .get_mut(offset..offset + width)
            .filter(|slot| *slot == BYTE_RANGE_PLACEHOLDER.as_bytes())
            .ok_or_else(|| Error::MalformedDocument("ByteRange placeholder not found".to_string()))?;
        slot.copy_from_slice(Self::format_byte_range(byte_range, width)?.as_bytes());
        Ok(())
    }

    /// The two signed ranges of `pdf_data`.
    pub fn signed_ranges<'a>(pdf_data: &'a [u8], byte_range: &[usize; 4]) -> Result<(&'a [u8], &'a [u8])> {
        Self::validate_byte_range(byte_range, pdf_data.len())?;
        let [o1, l1, o2, l2] = *byte_range;
        Ok((&pdf_data[o1..o1 + l1], &pdf_data[o2..o2 + l2]))
    }

    /// Check that a ByteRange covers the whole file except one gap.
    pub fn validate_byte_range(byte_range: &[usize; 4], file_size: usize) -> Result<()> {
        let [offset1, length1, offset2, length2] = *byte_range;

        if offset1 != 0 {
            return Err(Error::MalformedDocument(format!("ByteRange must start at 0, got {}", offset1)));
        }
        if offset2 + length2 != file_size {
            return Err(Error::MalformedDocument(format!(
                "ByteRange must end at file size {}, got {}",
                file_size,
                offset2 + length2
            )));
        }
        if length1 > offset2 {
            return Err(Error::MalformedDocument(format!(
                "ByteRange first range ({}) overlaps with second range start ({})",
                length1, offset2
            )));
        }

        Ok(())
    }

    /// Offset of the value following the last `key` (e.g. `/Contents`) in `within`.
    ///
    /// Whitespace between the key and its value is skipped. The placeholders
    /// are the last entries of the signature dictionary, so searching from
    /// the end skips any earlier string that happens to contain the key.
    pub fn find_value_offset(pdf_data: &[u8], within: Range<usize>, key: &[u8]) -> Option<usize> {
        let end = within.end.min(pdf_data.len());
        let window = pdf_data.get(within.start..end)?;
        let pos = window.windows(key.len()).rposition(|w| w == key)?;
        let after = within.start + pos + key.len();
        pdf_data[after..end]
            .iter()
            .position(|b| !matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
            .map(|skip| after + skip)
    }

    /// Hex-encode `container` into the placeholder at `contents_offset`.
    ///
    /// Unused space is padded with `0` digits. A container larger than the
    /// reservation is rejected, never truncated.
    pub fn insert_signature(&self, pdf_data: &mut [u8], contents_offset: usize, container: &[u8]) -> Result<()> {
        if container.len() > self.reserved {
            return Err(Error::ContainerOverflow {
                required: container.len(),
                available: self.reserved,
            });
        }

        let size = self.placeholder_size();
        let slot = pdf_data
            .get_mut(contents_offset..contents_offset + size)
            .filter(|slot| slot.first() == Some(&b'<') && slot.last() == Some(&b'>'))
            .ok_or_else(|| Error::MalformedDocument("/Contents placeholder not found".to_string()))?;

        let mut value = String::with_capacity(size);
        value.push('<');
        for byte in container {
            value.push_str(&format!("{:02X}", byte));
        }
        value.extend(std::iter::repeat('0').take(size - 1 - value.len()));
        value.push('>');

        slot.copy_from_slice(value.as_bytes());
        Ok(())
    }
}

impl Default for ByteRangeCalculator {
    fn default() -> Self {
        Self::new(8192)
    }
}
