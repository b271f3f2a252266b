//! # Schema Catalog
//!
//! Runtime replacement for static schema dispatch. Every declared schema
//! gets a [`SchemaId`] equal to its storage index, and its sorted field
//! set is keyed by [`FieldMask`] so resolution is a single hash lookup.

use std::any::TypeId;
use std::collections::HashMap;

use crate::ecs::field::{FieldId, FieldInfo, FieldMask, FieldSet, FieldType, MAX_FIELDS};
use crate::ecs::query::{FieldAccess, Query};
use crate::error::{describe_fields, StoreError, StoreResult};
use crate::memory::MAX_FIELD_ALIGN;

/// Identifier of a declared schema, equal to its storage index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaId(u32);

impl SchemaId {
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Storage index of this schema.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for SchemaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An immutable, exact set of fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    id: SchemaId,
    fields: Box<[FieldInfo]>,
    mask: FieldMask,
}

impl Schema {
    /// Identifier of this schema.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> SchemaId {
        self.id
    }

    /// Fields in ascending [`FieldId`] order.
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    /// Canonical signature.
    #[inline]
    #[must_use]
    pub const fn mask(&self) -> &FieldMask {
        &self.mask
    }

    /// Number of fields.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether this is the empty schema.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Accumulates a field mask from a type list, stopping at the first error.
struct MaskBuilder<'c> {
    catalog: &'c SchemaCatalog,
    mask: FieldMask,
    error: Option<StoreError>,
}

impl<'c> MaskBuilder<'c> {
    fn new(catalog: &'c SchemaCatalog) -> Self {
        Self {
            catalog,
            mask: FieldMask::EMPTY,
            error: None,
        }
    }

    fn add(&mut self, ty: FieldType) {
        if self.error.is_some() {
            return;
        }
        match self.catalog.field_id(ty.type_id) {
            Some(id) if self.mask.insert(id) => {}
            Some(_) => self.error = Some(StoreError::DuplicateField(ty.name)),
            None => self.error = Some(StoreError::UnknownField(ty.name)),
        }
    }

    fn finish(self) -> StoreResult<FieldMask> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.mask),
        }
    }
}

/// Registry of field types and schemas.
///
/// Schemas are declared up front and never removed. The catalog answers
/// two questions: which schema holds exactly a field set (creation), and
/// which schemas hold at least a field set (views).
#[derive(Clone, Debug, Default)]
pub struct SchemaCatalog {
    fields: Vec<FieldInfo>,
    by_type: HashMap<TypeId, FieldId>,
    schemas: Vec<Schema>,
    by_mask: HashMap<FieldMask, SchemaId>,
}

impl SchemaCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a field type, returning its id. Idempotent.
    ///
    /// # Errors
    ///
    /// Rejects zero-sized types, types aligned beyond the column block
    /// alignment, and registrations past [`MAX_FIELDS`].
    pub fn register_field(&mut self, ty: FieldType) -> StoreResult<FieldId> {
        if let Some(&id) = self.by_type.get(&ty.type_id) {
            return Ok(id);
        }
        if ty.size == 0 {
            return Err(StoreError::ZeroSizedField(ty.name));
        }
        if ty.align > MAX_FIELD_ALIGN {
            return Err(StoreError::UnsupportedAlignment {
                field: ty.name,
                align: ty.align,
            });
        }
        if self.fields.len() == MAX_FIELDS {
            return Err(StoreError::TooManyFields);
        }
        let id = FieldId::new(self.fields.len());
        self.fields.push(FieldInfo { id, ty });
        self.by_type.insert(ty.type_id, id);
        Ok(id)
    }

    /// Declares the schema holding exactly the fields of `S`.
    ///
    /// # Errors
    ///
    /// Fails if `S` lists a type twice, if a field type is rejected by
    /// [`register_field`](Self::register_field), or if an identical
    /// schema was already declared.
    pub fn register<S: FieldSet>(&mut self) -> StoreResult<SchemaId> {
        let mut mask = FieldMask::EMPTY;
        let mut error = None;
        S::visit(&mut |ty: FieldType| {
            if error.is_some() {
                return;
            }
            match self.register_field(ty) {
                Ok(id) if mask.insert(id) => {}
                Ok(_) => error = Some(StoreError::DuplicateField(ty.name)),
                Err(err) => error = Some(err),
            }
        });
        if let Some(err) = error {
            return Err(err);
        }
        if self.by_mask.contains_key(&mask) {
            return Err(StoreError::DuplicateSchema {
                fields: describe_fields(S::names()),
            });
        }

        let id = SchemaId::new(self.schemas.len());
        let fields = mask.iter().map(|f| self.fields[f.index()]).collect();
        self.schemas.push(Schema { id, fields, mask });
        self.by_mask.insert(mask, id);
        Ok(id)
    }

    /// Id of a registered field type.
    #[inline]
    #[must_use]
    pub fn field_id(&self, type_id: TypeId) -> Option<FieldId> {
        self.by_type.get(&type_id).copied()
    }

    /// All registered fields, indexed by [`FieldId`].
    #[must_use]
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    /// All declared schemas, indexed by [`SchemaId`].
    #[must_use]
    pub fn schemas(&self) -> &[Schema] {
        &self.schemas
    }

    /// Looks up a schema.
    #[must_use]
    pub fn schema(&self, id: SchemaId) -> Option<&Schema> {
        self.schemas.get(id.index())
    }

    /// Number of declared schemas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Whether no schema is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Signature of a field set.
    ///
    /// # Errors
    ///
    /// Fails on unregistered or repeated field types.
    pub fn mask_of<S: FieldSet>(&self) -> StoreResult<FieldMask> {
        let mut builder = MaskBuilder::new(self);
        S::visit(&mut |ty: FieldType| builder.add(ty));
        builder.finish()
    }

    /// Signature of the fields a query touches.
    ///
    /// # Errors
    ///
    /// Fails on unregistered or repeated field types.
    pub fn mask_of_query<Q: Query>(&self) -> StoreResult<FieldMask> {
        let mut builder = MaskBuilder::new(self);
        Q::visit(&mut |access: FieldAccess| builder.add(access.ty));
        builder.finish()
    }

    /// The schema holding exactly `mask`.
    #[inline]
    #[must_use]
    pub fn resolve(&self, mask: &FieldMask) -> Option<SchemaId> {
        self.by_mask.get(mask).copied()
    }

    /// Schemas holding at least `mask`, in declaration order except that
    /// the exact match, if any, comes first.
    #[must_use]
    pub fn supersets(&self, mask: &FieldMask) -> Vec<SchemaId> {
        let mut candidates: Vec<SchemaId> = self
            .schemas
            .iter()
            .filter(|s| s.mask.contains_all(mask))
            .map(|s| s.id)
            .collect();
        if let Some(exact) = candidates
            .iter()
            .position(|id| self.schemas[id.index()].mask == *mask)
        {
            candidates[..=exact].rotate_right(1);
        }
        candidates
    }

    /// Field names of a mask as `{A, B}`.
    #[must_use]
    pub fn describe(&self, mask: &FieldMask) -> String {
        describe_fields(mask.iter().map(|id| self.fields[id.index()].name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_resolve() {
        let mut catalog = SchemaCatalog::new();
        let empty = catalog.register::<()>().unwrap();
        let int = catalog.register::<(i32,)>().unwrap();
        let pair = catalog.register::<(f32, i32)>().unwrap();

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.fields().len(), 2);
        assert_eq!(catalog.resolve(&catalog.mask_of::<()>().unwrap()), Some(empty));
        assert_eq!(catalog.resolve(&catalog.mask_of::<(i32,)>().unwrap()), Some(int));
        // Declaration order does not matter.
        assert_eq!(catalog.resolve(&catalog.mask_of::<(i32, f32)>().unwrap()), Some(pair));
    }

    #[test]
    fn test_schema_fields_sorted_by_id() {
        let mut catalog = SchemaCatalog::new();
        catalog.register::<(u8,)>().unwrap();
        let id = catalog.register::<(u16, u8)>().unwrap();
        let names: Vec<_> = catalog
            .schema(id)
            .unwrap()
            .fields()
            .iter()
            .map(FieldInfo::name)
            .collect();
        assert_eq!(names, vec!["u8", "u16"]);
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut catalog = SchemaCatalog::new();
        catalog.register::<(i32, f32)>().unwrap();
        assert!(matches!(
            catalog.register::<(f32, i32)>(),
            Err(StoreError::DuplicateSchema { .. })
        ));
        assert_eq!(
            catalog.register::<(u8, u8)>(),
            Err(StoreError::DuplicateField("u8"))
        );
    }

    #[test]
    fn test_unsupported_fields() {
        let mut catalog = SchemaCatalog::new();
        assert_eq!(
            catalog.register::<((),)>(),
            Err(StoreError::ZeroSizedField("()"))
        );
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_unknown_field_mask() {
        let mut catalog = SchemaCatalog::new();
        catalog.register::<(i32,)>().unwrap();
        assert_eq!(
            catalog.mask_of::<(f64,)>(),
            Err(StoreError::UnknownField("f64"))
        );
    }

    #[test]
    fn test_supersets_exact_first() {
        let mut catalog = SchemaCatalog::new();
        let abc = catalog.register::<(u8, u16, u32)>().unwrap();
        let a = catalog.register::<(u8,)>().unwrap();
        let ab = catalog.register::<(u8, u16)>().unwrap();
        let c = catalog.register::<(u32,)>().unwrap();

        let mask = catalog.mask_of::<(u8,)>().unwrap();
        assert_eq!(catalog.supersets(&mask), vec![a, abc, ab]);

        let mask = catalog.mask_of::<(u16, u8)>().unwrap();
        assert_eq!(catalog.supersets(&mask), vec![ab, abc]);

        let mask = catalog.mask_of::<()>().unwrap();
        assert_eq!(catalog.supersets(&mask), vec![abc, a, ab, c]);

        assert_eq!(catalog.describe(&catalog.mask_of::<(u32, u8)>().unwrap()), "{u8, u32}");
    }
}
