//! # Archetype Storage
//!
//! Records are grouped by schema: the exact set of field types they carry.
//!
//! ## Design Philosophy
//!
//! - One packed, gap-free storage per schema; iteration never branches on
//!   whether a record has a field
//! - Handles are plain recycled integers, resolved through one indirection
//!   table shared by every storage of a registry
//! - Schemas are declared once, up front; resolution is a hash lookup
//! - Queries bind typed slices once per storage, not once per record

mod entity;
mod field;
mod query;
mod registry;
mod schema;
mod sparse;
mod storage;
mod view;

pub use entity::{Entity, EntityAllocator};
pub use field::{Bundle, Field, FieldId, FieldInfo, FieldMask, FieldSet, FieldType, MAX_FIELDS};
pub use query::{ColumnBinder, FieldAccess, Query, ReadOnlyQuery};
pub use registry::{Registry, RegistryBuilder};
pub use schema::{Schema, SchemaCatalog, SchemaId};
pub use sparse::{SharedSparse, SparseArray};
pub use storage::{Row, RowColumn, RowWriter, Rows, Storage};
pub use view::{View, ViewMut};
