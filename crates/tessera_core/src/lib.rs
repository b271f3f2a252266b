//! # Tessera Core
//!
//! Archetype storage engine: records grouped by schema into columnar
//! sparse sets, addressed by recycled integer handles.
//!
//! ## Architecture Rules
//!
//! 1. **Exact schemas** - A record lives in the one storage matching its fields
//! 2. **Packed columns** - Every field is a dense array parallel to the handles
//! 3. **O(1) point access** - One shared indirection table per registry,
//!    validated against each storage's dense array
//!
//! ## Example
//!
//! ```rust,ignore
//! use tessera_core::Registry;
//!
//! let mut registry = Registry::builder()
//!     .schema::<(Position,)>()
//!     .schema::<(Position, Velocity)>()
//!     .build()?;
//!
//! let e = registry.create((Position::default(), Velocity::default()))?;
//! assert_eq!(registry.size::<(Position,)>(), 1);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod ecs;
pub mod error;
pub mod memory;

pub use config::{AllocatorConfig, SparseConfig, SparseLayout, StorageConfig, StoreConfig};
pub use ecs::{
    Bundle, Entity, EntityAllocator, Field, FieldSet, Query, ReadOnlyQuery, Registry,
    RegistryBuilder, SchemaId, SharedSparse, SparseArray, Storage, View, ViewMut,
};
pub use error::{StoreError, StoreResult};
pub use memory::ColumnBuffer;
