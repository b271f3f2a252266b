//! Error types for the storage engine.

use thiserror::Error;

use crate::ecs::{Entity, SchemaId, MAX_FIELDS};
use crate::memory::MAX_FIELD_ALIGN;

/// Errors that can occur in the storage engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The entity is not stored in any candidate storage.
    #[error("entity {0} not found")]
    EntityNotFound(Entity),

    /// No schema holds exactly the requested field set.
    #[error("no schema matches field set {fields}")]
    NoMatchingSchema {
        /// Names of the requested fields.
        fields: String,
    },

    /// No schema holds every field of the requested set.
    #[error("no schema contains every field of {fields}")]
    NoMatchingView {
        /// Names of the requested fields.
        fields: String,
    },

    /// The field type was never declared in any schema.
    #[error("field type `{0}` is not registered")]
    UnknownField(&'static str),

    /// A field type appears twice in one declaration or query.
    #[error("field type `{0}` appears more than once")]
    DuplicateField(&'static str),

    /// Two schemas declare the same field set.
    #[error("schema {fields} is declared twice")]
    DuplicateSchema {
        /// Names of the duplicated fields.
        fields: String,
    },

    /// A registry must declare at least one schema.
    #[error("registry declares no schemas")]
    NoSchemas,

    /// The field is not a column of the addressed storage.
    #[error("field `{field}` is not part of schema {schema}")]
    FieldNotInSchema {
        /// Field type name.
        field: &'static str,
        /// Storage that was addressed.
        schema: SchemaId,
    },

    /// The query asks for a field the view was not built over.
    #[error("field `{0}` is not part of this view")]
    FieldNotInView(&'static str),

    /// Mutable access was requested through a shared borrow.
    #[error("field `{0}` is only borrowed for reading")]
    ReadOnlyField(&'static str),

    /// The typed accessor does not match the column layout.
    #[error("field `{field}` is {actual} bytes but the column holds {expected}-byte items")]
    FieldSizeMismatch {
        /// Field type name.
        field: &'static str,
        /// Item size recorded for the column.
        expected: usize,
        /// Size of the requested type.
        actual: usize,
    },

    /// Reinterpreting column bytes failed.
    #[error("column cast failed: {0:?}")]
    ColumnCast(bytemuck::PodCastError),

    /// Zero-sized types cannot be stored as columns.
    #[error("field `{0}` is zero-sized")]
    ZeroSizedField(&'static str),

    /// Column buffers cannot satisfy the field's alignment.
    #[error(
        "field `{field}` requires {align}-byte alignment, columns provide {max}",
        max = MAX_FIELD_ALIGN
    )]
    UnsupportedAlignment {
        /// Field type name.
        field: &'static str,
        /// Alignment the field requires.
        align: usize,
    },

    /// The field catalog is full.
    #[error("cannot register more than {max} field types", max = MAX_FIELDS)]
    TooManyFields,

    /// Configuration could not be loaded or is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<bytemuck::PodCastError> for StoreError {
    fn from(err: bytemuck::PodCastError) -> Self {
        Self::ColumnCast(err)
    }
}

/// Result type for storage engine operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Formats field type names as `{A, B}` for error messages.
pub(crate) fn describe_fields<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::from("{");
    for (i, name) in names.into_iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(name);
    }
    out.push('}');
    out
}
