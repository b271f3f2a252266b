//! # Field System
//!
//! Fields are pure data columns attached to records. Any `Pod` type can be
//! a field; the catalog assigns each distinct type a dense [`FieldId`] the
//! first time a schema mentions it.
//!
//! Field sets are written as tuples: `()`, `(A,)`, `(A, B)` and so on up
//! to eight elements. A tuple of values is a [`Bundle`] and can be
//! inserted as one record.

use std::any::{type_name, TypeId};

use bytemuck::Pod;

use crate::ecs::storage::RowWriter;
use crate::error::StoreResult;

/// Maximum number of distinct field types one catalog can hold.
pub const MAX_FIELDS: usize = 256;

const MASK_WORDS: usize = MAX_FIELDS / 64;

/// Marker trait for field types.
///
/// Fields must be:
/// - `Pod`: plain old data, stored and moved as raw bytes
/// - `Send + Sync`: shared read-only iteration is allowed across threads
///
/// Every such type implements `Field` automatically.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Copy, Pod, Zeroable)]
/// #[repr(C)]
/// struct Position {
///     x: f32,
///     y: f32,
///     z: f32,
/// }
/// ```
pub trait Field: Pod + Send + Sync + 'static {}

impl<T: Pod + Send + Sync + 'static> Field for T {}

/// Dense identifier of a registered field type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(u16);

impl FieldId {
    /// Creates a field id from its catalog index.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if `index` is not below [`MAX_FIELDS`].
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(index: usize) -> Self {
        debug_assert!(index < MAX_FIELDS);
        Self(index as u16)
    }

    /// Catalog index of this field.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Layout and identity of a field type, before registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldType {
    /// Rust type identity.
    pub type_id: TypeId,
    /// Type name, for diagnostics.
    pub name: &'static str,
    /// Size in bytes.
    pub size: usize,
    /// Alignment in bytes.
    pub align: usize,
}

impl FieldType {
    /// Describes `T`.
    #[inline]
    #[must_use]
    pub fn of<T: Field>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: type_name::<T>(),
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
        }
    }
}

/// A registered field: its id plus its layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldInfo {
    /// Catalog id.
    pub id: FieldId,
    /// Layout and identity.
    pub ty: FieldType,
}

impl FieldInfo {
    /// Type name, for diagnostics.
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.ty.name
    }

    /// Size in bytes of one value.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.ty.size
    }
}

/// Fixed-width bitset over [`FieldId`]s.
///
/// A schema's mask is its canonical signature: two field sets are equal
/// exactly when their masks are, and schema `S` can serve a request `R`
/// when `S.contains_all(R)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FieldMask([u64; MASK_WORDS]);

impl FieldMask {
    /// The empty set.
    pub const EMPTY: Self = Self([0; MASK_WORDS]);

    /// Adds `id`. Returns `false` if it was already present.
    #[inline]
    pub fn insert(&mut self, id: FieldId) -> bool {
        let (word, bit) = (id.index() / 64, id.index() % 64);
        let fresh = self.0[word] & (1u64 << bit) == 0;
        self.0[word] |= 1u64 << bit;
        fresh
    }

    /// Whether `id` is in the set.
    #[inline]
    #[must_use]
    pub const fn contains(&self, id: FieldId) -> bool {
        let (word, bit) = (id.index() / 64, id.index() % 64);
        self.0[word] & (1u64 << bit) != 0
    }

    /// Whether every field of `other` is in this set.
    #[inline]
    #[must_use]
    pub fn contains_all(&self, other: &Self) -> bool {
        self.0.iter().zip(&other.0).all(|(a, b)| a & b == *b)
    }

    /// Number of fields in the set.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Whether the set is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&w| w == 0)
    }

    /// Fields in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.0.iter().enumerate().flat_map(|(word, &bits)| {
            (0..64)
                .filter(move |&bit| bits & (1u64 << bit) != 0)
                .map(move |bit| FieldId::new(word * 64 + bit))
        })
    }
}

/// A static list of field types.
///
/// Implemented for tuples of [`Field`] types. Order is irrelevant to
/// schema matching.
pub trait FieldSet: 'static {
    /// Number of types in the list, duplicates included.
    const COUNT: usize;

    /// Calls `visit` once per type, in declaration order.
    fn visit<V: FnMut(FieldType)>(visit: &mut V);

    /// Type names, for diagnostics.
    #[must_use]
    fn names() -> Vec<&'static str> {
        let mut names = Vec::with_capacity(Self::COUNT);
        Self::visit(&mut |ty: FieldType| names.push(ty.name));
        names
    }
}

/// A tuple of field values inserted as one record.
pub trait Bundle: FieldSet + Sized {
    /// Writes each value into its column of the row being inserted.
    ///
    /// # Errors
    ///
    /// Returns an error if a value's type is not a column of the row's schema.
    fn write(self, row: &mut RowWriter<'_>) -> StoreResult<()>;
}

macro_rules! impl_field_set {
    ($($name:ident),*) => {
        impl<$($name: Field),*> FieldSet for ($($name,)*) {
            const COUNT: usize = <[&str]>::len(&[$(stringify!($name)),*]);

            #[allow(unused_variables)]
            fn visit<V: FnMut(FieldType)>(visit: &mut V) {
                $( visit(FieldType::of::<$name>()); )*
            }
        }

        impl<$($name: Field),*> Bundle for ($($name,)*) {
            #[allow(non_snake_case, unused_variables)]
            fn write(self, row: &mut RowWriter<'_>) -> StoreResult<()> {
                let ($($name,)*) = self;
                $( row.put($name)?; )*
                Ok(())
            }
        }
    };
}

impl_field_set!();
impl_field_set!(A);
impl_field_set!(A, B);
impl_field_set!(A, B, C);
impl_field_set!(A, B, C, D);
impl_field_set!(A, B, C, D, E);
impl_field_set!(A, B, C, D, E, F);
impl_field_set!(A, B, C, D, E, F, G);
impl_field_set!(A, B, C, D, E, F, G, H);
