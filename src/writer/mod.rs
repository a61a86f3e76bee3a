//! PDF writing: object serialization and incremental updates.
//!
//! ```text
//! Object ──► [ObjectSerializer] ──► bytes
//!                     │
//! original bytes ──► [IncrementalUpdate] ──► original + new objects + xref section
//! ```

mod incremental;
mod object_serializer;

pub use incremental::{IncrementalUpdate, WrittenUpdate};
pub use object_serializer::{wrap_indirect, ObjectSerializer};
