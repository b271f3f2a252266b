//! # Memory Management
//!
//! Growable column buffers backing every field of every schema.
//!
//! ## Design Philosophy
//!
//! Buffers never grow on their own. The storage that owns them picks the
//! policy and calls `reserve`, `grow_by` or `shrink_to` explicitly, so
//! reallocation only happens where the caller can see it.

mod column;

pub use column::{ColumnBuffer, MAX_FIELD_ALIGN};
