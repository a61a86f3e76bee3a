//! Incremental updates.
//!
//! New and replaced objects are appended after the original bytes, followed
//! by a cross-reference section that covers only those objects and points
//! back at the previous section with `/Prev`. The original bytes are never
//! touched, so earlier revisions (and anything signed over them) stay intact.
//!
//! The new section uses the same format as the newest existing one: a
//! classic table after a table, an uncompressed xref stream after a stream.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::writer::object_serializer::{wrap_indirect, ObjectSerializer};
use crate::xref::{CrossRefTable, XRefKind};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Write;

/// Objects pending for one incremental update.
#[derive(Debug)]
pub struct IncrementalUpdate<'a> {
    original: &'a [u8],
    xref: &'a CrossRefTable,
    objects: BTreeMap<u32, (u16, Vec<u8>)>,
    next_id: u32,
    serializer: ObjectSerializer,
}

/// Result of [`IncrementalUpdate::write`].
#[derive(Debug, Clone)]
pub struct WrittenUpdate {
    /// Original bytes followed by the update
    pub bytes: Vec<u8>,
    /// Byte offset of every object written by the update
    pub offsets: BTreeMap<u32, usize>,
}

impl WrittenUpdate {
    /// Offset of `N G obj` for an object written by the update.
    pub fn offset_of(&self, obj_ref: ObjectRef) -> Option<usize> {
        self.offsets.get(&obj_ref.id).copied()
    }
}

impl<'a> IncrementalUpdate<'a> {
    /// Start an update on top of `original`, whose cross-reference data is `xref`.
    pub fn new(original: &'a [u8], xref: &'a CrossRefTable) -> Self {
        Self {
            original,
            xref,
            objects: BTreeMap::new(),
            next_id: xref.size().max(1),
            serializer: ObjectSerializer::new(),
        }
    }

    /// Reserve a fresh object number.
    pub fn allocate(&mut self) -> ObjectRef {
        let obj_ref = ObjectRef::new(self.next_id, 0);
        self.next_id += 1;
        obj_ref
    }

    /// Append a new object.
    pub fn add(&mut self, obj: &Object) -> ObjectRef {
        let obj_ref = self.allocate();
        self.put(obj_ref, obj);
        obj_ref
    }

    /// Write `obj` under `obj_ref`, replacing any earlier version.
    pub fn put(&mut self, obj_ref: ObjectRef, obj: &Object) {
        let body = self.serializer.serialize(obj);
        self.put_raw(obj_ref, body);
    }

    /// Write pre-serialized object bytes under `obj_ref`.
    pub fn put_raw(&mut self, obj_ref: ObjectRef, body: Vec<u8>) {
        self.next_id = self.next_id.max(obj_ref.id + 1);
        self.objects.insert(obj_ref.id, (obj_ref.gen, body));
    }

    /// Number of objects in the update.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True if nothing was added.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Serialize the update after the original bytes.
    pub fn write(mut self) -> Result<WrittenUpdate> {
        let trailer = self.trailer_base()?;
        let mut out = Vec::with_capacity(self.original.len() + self.objects.values().map(|(_, b)| b.len() + 32).sum::<usize>() + 1024);
        out.extend_from_slice(self.original);
        if !matches!(out.last(), Some(b'\n') | Some(b'\r')) {
            out.push(b'\n');
        }

        let mut offsets = BTreeMap::new();
        let mut entries = Vec::with_capacity(self.objects.len() + 1);
        for (id, (gen, body)) in &self.objects {
            offsets.insert(*id, out.len());
            entries.push((*id, out.len(), *gen));
            out.extend_from_slice(&wrap_indirect(*id, *gen, body));
        }

        match self.xref.kind() {
            XRefKind::Table => self.write_table(&mut out, &entries, trailer)?,
            XRefKind::Stream => {
                let xref_id = self.allocate().id;
                offsets.insert(xref_id, out.len());
                entries.push((xref_id, out.len(), 0));
                self.write_stream(&mut out, &entries, trailer)?;
            },
        }

        log::debug!(
            "Incremental update: {} objects, {} bytes appended",
            entries.len(),
            out.len() - self.original.len()
        );
        Ok(WrittenUpdate { bytes: out, offsets })
    }

    /// `/Root`, `/Info`, `/ID` and `/Prev` for the new section.
    fn trailer_base(&self) -> Result<Dictionary> {
        let previous = self.xref.trailer();
        let mut trailer = Dictionary::new();

        let root = previous
            .get("Root")
            .ok_or_else(|| Error::MalformedDocument("trailer has no /Root".to_string()))?;
        trailer.insert("Root".to_string(), root.clone());
        if let Some(info) = previous.get("Info") {
            trailer.insert("Info".to_string(), info.clone());
        }

        let id = match previous.get("ID") {
            Some(id @ Object::Array(parts)) if parts.len() == 2 => id.clone(),
            _ => {
                let seed = Sha256::digest(self.original)[..16].to_vec();
                Object::Array(vec![Object::String(seed.clone()), Object::String(seed)])
            },
        };
        trailer.insert("ID".to_string(), id);
        trailer.insert("Prev".to_string(), Object::Integer(self.xref.startxref() as i64));

        Ok(trailer)
    }

    fn write_table(&self, out: &mut Vec<u8>, entries: &[(u32, usize, u16)], mut trailer: Dictionary) -> Result<()> {
        let xref_offset = out.len();
        writeln!(out, "xref")?;
        for run in subsections(entries) {
            writeln!(out, "{} {}", run[0].0, run.len())?;
            for (_, offset, gen) in run {
                write!(out, "{:010} {:05} n \n", offset, gen)?;
            }
        }

        trailer.insert("Size".to_string(), Object::Integer(self.next_id as i64));
        writeln!(out, "trailer")?;
        out.extend_from_slice(&self.serializer.serialize(&Object::Dictionary(trailer)));
        write!(out, "\nstartxref\n{}\n%%EOF\n", xref_offset)?;
        Ok(())
    }

    fn write_stream(&self, out: &mut Vec<u8>, entries: &[(u32, usize, u16)], mut dict: Dictionary) -> Result<()> {
        let xref_offset = out.len();
        let xref_id = entries.last().map(|e| e.0).unwrap_or(self.next_id);
        let width = offset_width(entries.iter().map(|e| e.1).max().unwrap_or(0));

        let mut data = Vec::with_capacity(entries.len() * (3 + width));
        let mut index = Vec::new();
        for run in subsections(entries) {
            index.push(Object::Integer(run[0].0 as i64));
            index.push(Object::Integer(run.len() as i64));
            for (_, offset, gen) in run {
                data.push(1);
                data.extend_from_slice(&(*offset as u64).to_be_bytes()[8 - width..]);
                data.extend_from_slice(&gen.to_be_bytes());
            }
        }

        dict.insert("Type".to_string(), Object::Name("XRef".to_string()));
        dict.insert("Size".to_string(), Object::Integer(self.next_id as i64));
        dict.insert("Index".to_string(), Object::Array(index));
        dict.insert(
            "W".to_string(),
            Object::Array(vec![Object::Integer(1), Object::Integer(width as i64), Object::Integer(2)]),
        );

        let stream = Object::Stream {
            dict,
            data: bytes::Bytes::from(data),
        };
        out.extend_from_slice(&self.serializer.serialize_indirect(xref_id, 0, &stream));
        write!(out, "startxref\n{}\n%%EOF\n", xref_offset)?;
        Ok(())
    }
}

/// Split sorted entries into runs of consecutive object numbers.
fn subsections(entries: &[(u32, usize, u16)]) -> Vec<&[(u32, usize, u16)]> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..=entries.len() {
        if i == entries.len() || entries[i].0 != entries[i - 1].0 + 1 {
            runs.push(&entries[start..i]);
            start = i;
        }
    }
    runs
}

/// Bytes needed to store `max_offset`, at least 4.
fn offset_width(max_offset: usize) -> usize {
    let bits = usize::BITS - max_offset.leading_zeros();
    (bits as usize).div_ceil(8).max(4)
}
