//! Cross-reference parsing.
//!
//! Reads classic `xref` tables and PDF 1.5 cross-reference streams, follows
//! `/Prev` and `/XRefStm` back through every earlier revision, and merges the
//! result so the newest entry for each object number wins.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};
use crate::parser::{parse_indirect_object_at, parse_object};
use std::collections::{BTreeMap, HashSet};

/// Guard against circular or absurdly long `/Prev` chains.
const MAX_SECTIONS: usize = 256;

/// Trailer keys that carry over from older revisions when the newest omits them.
const INHERITED_TRAILER_KEYS: [&str; 4] = ["Root", "Info", "ID", "Encrypt"];

/// One cross-reference entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Free object
    Free {
        /// Generation to use if the number is reused
        gen: u16,
    },
    /// Object stored directly in the file body
    Uncompressed {
        /// Byte offset of `N G obj`
        offset: usize,
        /// Generation number
        gen: u16,
    },
    /// Object stored inside an object stream
    Compressed {
        /// Object number of the containing `/ObjStm`
        stream: u32,
        /// Index within the object stream
        index: u32,
    },
}

/// How a cross-reference section was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefKind {
    /// Classic `xref` keyword table followed by `trailer`
    Table,
    /// `/Type /XRef` stream
    Stream,
}

/// Merged view of every cross-reference section in a file.
#[derive(Debug, Clone)]
pub struct CrossRefTable {
    entries: BTreeMap<u32, XRefEntry>,
    trailer: Dictionary,
    kind: XRefKind,
    startxref: usize,
}

impl CrossRefTable {
    fn new(kind: XRefKind, startxref: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            trailer: Dictionary::new(),
            kind,
            startxref,
        }
    }

    /// Entry for an object number, if any section mentions it.
    pub fn get(&self, id: u32) -> Option<&XRefEntry> {
        self.entries.get(&id)
    }

    /// Trailer of the newest section (stream dictionary for xref streams).
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// Format of the newest section.
    pub fn kind(&self) -> XRefKind {
        self.kind
    }

    /// Byte offset of the newest section, i.e. the value after `startxref`.
    pub fn startxref(&self) -> usize {
        self.startxref
    }

    /// Number of entries known across all revisions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries were read.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Object numbers of all objects in use.
    pub fn in_use(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries
            .iter()
            .filter(|(_, e)| !matches!(e, XRefEntry::Free { .. }))
            .map(|(id, _)| *id)
    }

    /// The next unused object number: the larger of `/Size` and the highest
    /// known object number plus one.
    pub fn size(&self) -> u32 {
        let declared = self
            .trailer
            .get("Size")
            .and_then(|o| o.as_integer())
            .unwrap_or(0)
            .clamp(0, u32::MAX as i64) as u32;
        let highest = self.entries.keys().next_back().map(|id| id + 1).unwrap_or(1);
        declared.max(highest)
    }

    /// Fold an older section into this one. Existing entries win.
    fn merge_older(&mut self, older: CrossRefTable) {
        for (id, entry) in older.entries {
            self.entries.entry(id).or_insert(entry);
        }
        for key in INHERITED_TRAILER_KEYS {
            if !self.trailer.contains_key(key) {
                if let Some(value) = older.trailer.get(key) {
                    self.trailer.insert(key.to_string(), value.clone());
                }
            }
        }
    }
}

/// Locate the offset written after the last `startxref` keyword.
pub fn find_xref_offset(data: &[u8]) -> Result<usize> {
    let tail_start = data.len().saturating_sub(2048);
    let tail = &data[tail_start..];
    let keyword = b"startxref";
    let pos = tail
        .windows(keyword.len())
        .rposition(|w| w == keyword)
        .ok_or(Error::InvalidXref)?;

    let digits: String = tail[pos + keyword.len()..]
        .iter()
        .skip_while(|c| c.is_ascii_whitespace())
        .take_while(|c| c.is_ascii_digit())
        .map(|&c| c as char)
        .collect();

    let offset: usize = digits.parse().map_err(|_| Error::InvalidXref)?;
    if offset >= data.len() {
        return Err(Error::InvalidXref);
    }
    Ok(offset)
}

/// Load and merge every cross-reference section reachable from `startxref`.
pub fn load_xref(data: &[u8]) -> Result<CrossRefTable> {
    let start = find_xref_offset(data)?;
    let mut visited = HashSet::new();
    let mut table = read_revision(data, start, &mut visited)?;

    let mut prev = prev_offset(&table.trailer);
    while let Some(offset) = prev {
        if visited.contains(&offset) || visited.len() >= MAX_SECTIONS {
            log::warn!("Stopping at repeated or excessive /Prev chain (offset {})", offset);
            break;
        }
        let older = read_revision(data, offset, &mut visited)?;
        prev = prev_offset(&older.trailer);
        table.merge_older(older);
    }

    log::debug!(
        "Loaded {} xref entries ({:?}, startxref {})",
        table.len(),
        table.kind,
        table.startxref
    );
    Ok(table)
}

/// One revision: a section plus the xref stream a hybrid file points to.
fn read_revision(data: &[u8], offset: usize, visited: &mut HashSet<usize>) -> Result<CrossRefTable> {
    visited.insert(offset);
    let mut section = parse_xref_section(data, offset)?;

    if let Some(stm_offset) = section
        .trailer
        .get("XRefStm")
        .and_then(|o| o.as_integer())
        .and_then(|n| usize::try_from(n).ok())
    {
        if visited.insert(stm_offset) {
            let hybrid = parse_xref_section(data, stm_offset)?;
            for (id, entry) in hybrid.entries {
                section.entries.entry(id).or_insert(entry);
            }
        }
    }

    Ok(section)
}

fn prev_offset(trailer: &Dictionary) -> Option<usize> {
    trailer
        .get("Prev")
        .and_then(|o| o.as_integer())
        .and_then(|n| usize::try_from(n).ok())
}

/// Parse the single section (table or stream) at `offset`.
pub fn parse_xref_section(data: &[u8], offset: usize) -> Result<CrossRefTable> {
    let rest = data.get(offset..).ok_or(Error::InvalidXref)?;
    let skipped = rest.iter().take_while(|c| c.is_ascii_whitespace()).count();

    if rest[skipped..].starts_with(b"xref") {
        parse_table(data, offset, offset + skipped + 4)
    } else {
        parse_stream(data, offset)
    }
}

fn parse_table(data: &[u8], offset: usize, body_start: usize) -> Result<CrossRefTable> {
    let body = &data[body_start..];
    let trailer_pos = body
        .windows(b"trailer".len())
        .position(|w| w == b"trailer")
        .ok_or(Error::InvalidXref)?;

    let mut table = CrossRefTable::new(XRefKind::Table, offset);
    let text = String::from_utf8_lossy(&body[..trailer_pos]);
    let mut next_id: u32 = 0;
    let mut remaining: u32 = 0;

    for line in text.split(['\r', '\n']) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            [] => {},
            [start, count] => {
                next_id = start.parse().map_err(|_| Error::InvalidXref)?;
                remaining = count.parse().map_err(|_| Error::InvalidXref)?;
            },
            [off, gen, flag, ..] if remaining > 0 => {
                let gen: u16 = gen.parse().map_err(|_| Error::InvalidXref)?;
                let entry = if flag.starts_with('n') {
                    XRefEntry::Uncompressed {
                        offset: off.parse().map_err(|_| Error::InvalidXref)?,
                        gen,
                    }
                } else {
                    XRefEntry::Free { gen }
                };
                table.entries.insert(next_id, entry);
                next_id += 1;
                remaining -= 1;
            },
            other => {
                log::warn!("Ignoring unexpected xref line {:?}", other);
            },
        }
    }

    let (_, trailer) = parse_object(&body[trailer_pos + b"trailer".len()..])
        .map_err(|_| Error::InvalidXref)?;
    table.trailer = match trailer {
        Object::Dictionary(dict) => dict,
        _ => return Err(Error::InvalidXref),
    };

    Ok(table)
}

fn parse_stream(data: &[u8], offset: usize) -> Result<CrossRefTable> {
    let (_, object) = parse_indirect_object_at(data, offset)?;
    let dict = match &object {
        Object::Stream { dict, .. } if dict.get("Type").and_then(|o| o.as_name()) == Some("XRef") => dict,
        _ => {
            return Err(Error::MalformedDocument(format!(
                "no xref table or stream at offset {}",
                offset
            )))
        },
    };

    let widths: Vec<usize> = dict
        .get("W")
        .and_then(|o| o.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|o| o.as_integer())
                .map(|n| n.max(0) as usize)
                .collect()
        })
        .unwrap_or_default();
    if widths.len() != 3 || widths.iter().any(|&w| w > 8) {
        return Err(Error::MalformedDocument("invalid /W in xref stream".to_string()));
    }
    let entry_size: usize = widths.iter().sum();
    if entry_size == 0 {
        return Err(Error::MalformedDocument("zero-width xref stream entries".to_string()));
    }

    let size = dict.get("Size").and_then(|o| o.as_integer()).unwrap_or(0).max(0) as u32;
    let ranges: Vec<(u32, u32)> = match dict.get("Index").and_then(|o| o.as_array()) {
        Some(index) => index
            .chunks_exact(2)
            .filter_map(|pair| Some((pair[0].as_integer()? as u32, pair[1].as_integer()? as u32)))
            .collect(),
        None => vec![(0, size)],
    };

    let decoded = object.decode_stream_data()?;
    let mut rows = decoded.chunks_exact(entry_size);
    let mut table = CrossRefTable::new(XRefKind::Stream, offset);

    for (start, count) in ranges {
        for id in start..start.saturating_add(count) {
            let row = rows
                .next()
                .ok_or_else(|| Error::MalformedDocument("truncated xref stream".to_string()))?;
            let (kind, rest) = row.split_at(widths[0]);
            let (field2, field3) = rest.split_at(widths[1]);
            let kind = if widths[0] == 0 { 1 } else { read_int(kind) };

            let entry = match kind {
                0 => XRefEntry::Free {
                    gen: read_int(field3) as u16,
                },
                1 => XRefEntry::Uncompressed {
                    offset: read_int(field2) as usize,
                    gen: read_int(field3) as u16,
                },
                2 => XRefEntry::Compressed {
                    stream: read_int(field2) as u32,
                    index: read_int(field3) as u32,
                },
                other => {
                    log::debug!("Skipping xref stream entry {} of unknown type {}", id, other);
                    continue;
                },
            };
            table.entries.insert(id, entry);
        }
    }

    table.trailer = dict.clone();
    Ok(table)
}

/// Big-endian unsigned integer of up to eight bytes.
fn read_int(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}
