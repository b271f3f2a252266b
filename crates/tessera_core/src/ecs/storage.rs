//! # Columnar Storage
//!
//! One storage per schema: a sparse set whose dense side is an entity
//! array plus one untyped column per field, all kept parallel and packed.
//!
//! ## Layout
//!
//! ```text
//! sparse:   e -> slot          (shared table, stale for foreign entities)
//! dense:    [e0, e1, e2, ...]  (slots 0..len, no gaps)
//! column 0: [a0, a1, a2, ...]
//! column 1: [b0, b1, b2, ...]
//! ```

use std::any::{type_name, TypeId};

use tracing::trace;

use crate::config::SparseLayout;
use crate::ecs::field::{Bundle, Field, FieldInfo, FieldMask, FieldSet, FieldType};
use crate::ecs::query::{run_query, ColumnBinder, Query, ReadOnlyQuery};
use crate::ecs::schema::{Schema, SchemaCatalog, SchemaId};
use crate::ecs::sparse::SharedSparse;
use crate::ecs::Entity;
use crate::error::{StoreError, StoreResult};
use crate::memory::ColumnBuffer;

/// Writes the values of a bundle into the row being inserted.
pub struct RowWriter<'s> {
    schema: SchemaId,
    fields: &'s [FieldInfo],
    columns: &'s mut [ColumnBuffer],
    slot: usize,
}

impl RowWriter<'_> {
    /// Stores `value` in its column.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FieldNotInSchema`] if the row's schema has no
    /// column for `T`.
    #[inline]
    pub fn put<T: Field>(&mut self, value: T) -> StoreResult<()> {
        let index = column_index::<T>(self.fields, self.schema)?;
        self.columns[index].write(self.slot, value)
    }
}

#[inline]
fn column_index<T: Field>(fields: &[FieldInfo], schema: SchemaId) -> StoreResult<usize> {
    let type_id = TypeId::of::<T>();
    fields
        .iter()
        .position(|f| f.ty.type_id == type_id)
        .ok_or(StoreError::FieldNotInSchema {
            field: type_name::<T>(),
            schema,
        })
}

/// Dense, packed records of one schema.
///
/// # Contract
///
/// Handles must be unique within a storage: inserting a handle that is
/// already present leaves two rows for it, and only one of them is ever
/// reachable again. Point operations on absent handles are detected through
/// the dense array and reported as [`StoreError::EntityNotFound`].
///
/// # Example
///
/// ```rust,ignore
/// let mut storage = Storage::of::<(Position, Velocity)>(SparseLayout::Flat)?;
/// storage.insert(entity, (Position::default(), Velocity::default()))?;
/// storage.get_mut::<Position>(entity)?.x += 1.0;
/// ```
pub struct Storage {
    schema: SchemaId,
    fields: Box<[FieldInfo]>,
    mask: FieldMask,
    dense: Vec<Entity>,
    columns: Box<[ColumnBuffer]>,
    capacity: usize,
    sparse: SharedSparse,
}

impl Storage {
    /// Creates an empty storage for `schema` with its own indirection table.
    #[must_use]
    pub fn new(schema: &Schema, layout: SparseLayout) -> Self {
        Self::with_table(schema, &SharedSparse::new(layout))
    }

    /// Creates an empty storage bound to an existing indirection table.
    #[must_use]
    pub fn with_table(schema: &Schema, sparse: &SharedSparse) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|f| ColumnBuffer::new(f.size()))
            .collect();
        Self {
            schema: schema.id(),
            fields: schema.fields().into(),
            mask: *schema.mask(),
            dense: Vec::new(),
            columns,
            capacity: 0,
            sparse: sparse.clone(),
        }
    }

    /// Creates a standalone storage for the fields of `S`.
    ///
    /// # Errors
    ///
    /// Fails if `S` is not a valid schema (see [`SchemaCatalog::register`]).
    pub fn of<S: FieldSet>(layout: SparseLayout) -> StoreResult<Self> {
        let mut catalog = SchemaCatalog::new();
        let id = catalog.register::<S>()?;
        let schema = catalog.schema(id).ok_or(StoreError::NoSchemas)?;
        Ok(Self::new(schema, layout))
    }

    /// Schema this storage holds.
    #[inline]
    #[must_use]
    pub const fn schema(&self) -> SchemaId {
        self.schema
    }

    /// Columns of this storage, in column order.
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    /// Signature of this storage's schema.
    #[inline]
    #[must_use]
    pub const fn mask(&self) -> &FieldMask {
        &self.mask
    }

    /// Number of records.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    /// Whether the storage holds no records.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// Records the storage can hold before growing.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stored handles in slot order.
    #[inline]
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.dense
    }

    /// The indirection table this storage writes to.
    #[inline]
    #[must_use]
    pub const fn sparse(&self) -> &SharedSparse {
        &self.sparse
    }

    /// Rebinds onto a shared indirection table.
    ///
    /// Only an empty storage can switch tables; returns `false` and leaves
    /// the binding untouched otherwise.
    pub fn share(&mut self, table: &SharedSparse) -> bool {
        if !self.dense.is_empty() {
            return false;
        }
        self.sparse = table.clone();
        true
    }

    /// Grows every parallel array to hold at least `capacity` records.
    pub fn reserve(&mut self, capacity: usize) {
        if capacity <= self.capacity {
            return;
        }
        self.dense.reserve_exact(capacity - self.dense.len());
        for column in self.columns.iter_mut() {
            column.reserve(capacity);
        }
        self.capacity = capacity;
    }

    #[cold]
    fn grow(&mut self) {
        let new_capacity = self.capacity * 3 / 2 + 8;
        trace!(
            schema = %self.schema,
            from = self.capacity,
            to = new_capacity,
            "storage grown"
        );
        self.reserve(new_capacity);
    }

    /// Appends a row for `entity`, returning its slot.
    #[allow(clippy::cast_possible_truncation)]
    fn push_row(&mut self, entity: Entity, zeroed: bool) -> usize {
        let slot = self.dense.len();
        if slot == self.capacity {
            self.grow();
        }
        self.dense.push(entity);
        if zeroed {
            for column in self.columns.iter_mut() {
                column.zero(slot);
            }
        }
        self.sparse.write().set(entity, slot as u32);
        slot
    }

    fn write_row<B: Bundle>(&mut self, slot: usize, bundle: B) -> StoreResult<()> {
        let mut row = RowWriter {
            schema: self.schema,
            fields: &self.fields,
            columns: &mut self.columns,
            slot,
        };
        let written = bundle.write(&mut row);
        if written.is_err() {
            self.dense.pop();
        }
        written
    }

    fn check_bundle<S: FieldSet>(&self) -> StoreResult<()> {
        let mut seen = FieldMask::EMPTY;
        let mut error = None;
        S::visit(&mut |ty: FieldType| {
            if error.is_some() {
                return;
            }
            match self.fields.iter().find(|f| f.ty.type_id == ty.type_id) {
                Some(info) if seen.insert(info.id) => {}
                Some(_) => error = Some(StoreError::DuplicateField(ty.name)),
                None => {
                    error = Some(StoreError::FieldNotInSchema {
                        field: ty.name,
                        schema: self.schema,
                    });
                }
            }
        });
        error.map_or(Ok(()), Err)
    }

    /// Appends a record. Fields the bundle leaves out are zeroed.
    ///
    /// # Errors
    ///
    /// Fails without touching the storage if the bundle names a field
    /// outside the schema or names one twice.
    pub fn insert<B: Bundle>(&mut self, entity: Entity, bundle: B) -> StoreResult<()> {
        debug_assert!(!self.contains(entity), "entity {entity} inserted twice");
        self.check_bundle::<B>()?;
        let slot = self.push_row(entity, B::COUNT < self.columns.len());
        self.write_row(slot, bundle)
    }

    /// Appends a record whose bundle is already known to match the schema
    /// exactly.
    pub(crate) fn insert_exact<B: Bundle>(&mut self, entity: Entity, bundle: B) -> StoreResult<()> {
        debug_assert!(!self.contains(entity), "entity {entity} inserted twice");
        let slot = self.push_row(entity, false);
        self.write_row(slot, bundle)
    }

    /// Dense slot of `entity`, if this storage holds it.
    #[inline]
    #[must_use]
    pub fn slot_of(&self, entity: Entity) -> Option<usize> {
        let slot = self.sparse.read().get(entity)? as usize;
        (self.dense.get(slot) == Some(&entity)).then_some(slot)
    }

    /// Whether this storage holds `entity`.
    ///
    /// Checked against the dense array, so entries written into a shared
    /// table by other storages never count. Takes a shared lock on the
    /// indirection table for the lookup.
    #[inline]
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.slot_of(entity).is_some()
    }

    /// Removes `slot` by moving the last record into it.
    #[allow(clippy::cast_possible_truncation)]
    fn erase_slot(&mut self, slot: usize) {
        let last = self.dense.len() - 1;
        self.dense.swap_remove(slot);
        for column in self.columns.iter_mut() {
            column.copy_within(last, slot);
        }
        if slot != last {
            self.sparse.write().set(self.dense[slot], slot as u32);
        }
    }

    /// Removes the record of `entity` by swapping the last record into its slot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EntityNotFound`] if the storage does not hold `entity`.
    pub fn erase(&mut self, entity: Entity) -> StoreResult<()> {
        let slot = self
            .slot_of(entity)
            .ok_or(StoreError::EntityNotFound(entity))?;
        self.erase_slot(slot);
        Ok(())
    }

    /// Moves the record of `entity` into `target`, carrying over the fields
    /// both schemas share. Target fields the source lacks are zeroed.
    pub(crate) fn move_to(&mut self, entity: Entity, target: &mut Self) -> StoreResult<()> {
        let from = self
            .slot_of(entity)
            .ok_or(StoreError::EntityNotFound(entity))?;
        let to = target.push_row(entity, true);
        for (column, info) in target.columns.iter_mut().zip(target.fields.iter()) {
            if let Some(source) = self.fields.iter().position(|f| f.id == info.id) {
                column.copy_from(to, &self.columns[source], from);
            }
        }
        // The row is gone by slot: with a shared table the entity's entry
        // already points into `target`.
        self.erase_slot(from);
        Ok(())
    }

    /// Drops every record. Capacity is kept.
    pub fn clear(&mut self) {
        self.dense.clear();
    }

    /// Releases capacity beyond the current number of records.
    pub fn shrink_to_fit(&mut self) {
        let len = self.dense.len();
        if len == self.capacity {
            return;
        }
        self.dense.shrink_to_fit();
        for column in self.columns.iter_mut() {
            column.shrink_to(len);
        }
        self.capacity = len;
    }

    /// Column of `T` over all records, in slot order.
    ///
    /// # Errors
    ///
    /// Fails if `T` is not a field of this schema.
    pub fn column<T: Field>(&self) -> StoreResult<&[T]> {
        let index = column_index::<T>(&self.fields, self.schema)?;
        self.columns[index].as_slice(self.dense.len())
    }

    /// Mutable column of `T` over all records, in slot order.
    ///
    /// # Errors
    ///
    /// Fails if `T` is not a field of this schema.
    pub fn column_mut<T: Field>(&mut self) -> StoreResult<&mut [T]> {
        let index = column_index::<T>(&self.fields, self.schema)?;
        self.columns[index].as_mut_slice(self.dense.len())
    }

    /// Field `T` of `entity`.
    ///
    /// # Errors
    ///
    /// Fails if `T` is not a field of this schema or `entity` is absent.
    pub fn get<T: Field>(&self, entity: Entity) -> StoreResult<&T> {
        let column = self.column::<T>()?;
        let slot = self
            .slot_of(entity)
            .ok_or(StoreError::EntityNotFound(entity))?;
        Ok(&column[slot])
    }

    /// Mutable field `T` of `entity`.
    ///
    /// # Errors
    ///
    /// Fails if `T` is not a field of this schema or `entity` is absent.
    pub fn get_mut<T: Field>(&mut self, entity: Entity) -> StoreResult<&mut T> {
        let slot = self
            .slot_of(entity)
            .ok_or(StoreError::EntityNotFound(entity))?;
        Ok(&mut self.column_mut::<T>()?[slot])
    }

    /// Overwrites field `T` of `entity`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`get_mut`](Self::get_mut).
    pub fn set<T: Field>(&mut self, entity: Entity, value: T) -> StoreResult<()> {
        *self.get_mut::<T>(entity)? = value;
        Ok(())
    }

    /// Cursor over records from the last inserted to the first.
    #[must_use]
    pub fn rows(&self) -> Rows<'_> {
        Rows {
            storage: self,
            remaining: 0..self.dense.len(),
        }
    }

    /// Runs `f` over every record with the fields `Q` asks for.
    ///
    /// Records are visited from the last slot to the first.
    ///
    /// # Errors
    ///
    /// Fails before visiting anything if `Q` names a field outside the
    /// schema or names one twice.
    pub fn for_each<'s, Q, F>(&'s mut self, mut f: F) -> StoreResult<()>
    where
        Q: Query,
        F: FnMut(Entity, Q::Item<'s>),
    {
        self.query_mut::<Q, F>(&mut f)
    }

    pub(crate) fn query_mut<'s, Q, F>(&'s mut self, f: &mut F) -> StoreResult<()>
    where
        Q: Query,
        F: FnMut(Entity, Q::Item<'s>),
    {
        let len = self.dense.len();
        let mut binder = ColumnBinder::unique(self.schema, &self.fields, &mut self.columns, len);
        run_query::<Q, F>(&self.dense, &mut binder, f)
    }

    pub(crate) fn query<'s, Q, F>(&'s self, f: &mut F) -> StoreResult<()>
    where
        Q: ReadOnlyQuery,
        F: FnMut(Entity, Q::Item<'s>),
    {
        let len = self.dense.len();
        let mut binder = ColumnBinder::shared(self.schema, &self.fields, &self.columns, len);
        run_query::<Q, F>(&self.dense, &mut binder, f)
    }

    /// Bytes held by the dense array and columns.
    #[must_use]
    pub fn allocated_bytes(&self) -> usize {
        self.dense.capacity() * std::mem::size_of::<Entity>()
            + self
                .columns
                .iter()
                .map(ColumnBuffer::allocated_bytes)
                .sum::<usize>()
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("schema", &self.schema)
            .field("len", &self.dense.len())
            .field("capacity", &self.capacity)
            .field("columns", &self.columns.len())
            .finish_non_exhaustive()
    }
}

/// One record seen through a [`Rows`] cursor.
#[derive(Clone, Copy)]
pub struct Row<'s> {
    storage: &'s Storage,
    slot: usize,
}

impl<'s> Row<'s> {
    /// Dense slot of this record.
    #[inline]
    #[must_use]
    pub const fn slot(&self) -> usize {
        self.slot
    }

    /// Handle of this record.
    #[inline]
    #[must_use]
    pub fn entity(&self) -> Entity {
        self.storage.dense[self.slot]
    }

    /// Field `T` of this record, by direct slot index.
    ///
    /// Resolves the column on every call. Loops should bind it once with
    /// [`Rows::column`] instead.
    ///
    /// # Errors
    ///
    /// Fails if `T` is not a field of the storage's schema.
    #[inline]
    pub fn get<T: Field>(&self) -> StoreResult<&'s T> {
        Ok(&self.storage.column::<T>()?[self.slot])
    }
}

/// A column resolved once for reads through [`Row`]s of its storage.
///
/// # Example
///
/// ```rust,ignore
/// let rows = storage.rows();
/// let health = rows.column::<Health>()?;
/// let total: u32 = rows.map(|row| health.get(row).map_or(0, |h| h.0)).sum();
/// ```
pub struct RowColumn<'s, T> {
    storage: &'s Storage,
    values: &'s [T],
}

impl<'s, T: Field> RowColumn<'s, T> {
    /// Field `T` of `row`, or `None` if `row` belongs to another storage.
    #[inline]
    #[must_use]
    pub fn get(&self, row: Row<'s>) -> Option<&'s T> {
        if std::ptr::eq(self.storage, row.storage) {
            self.values.get(row.slot)
        } else {
            None
        }
    }

    /// The whole column, in slot order.
    #[inline]
    #[must_use]
    pub const fn values(&self) -> &'s [T] {
        self.values
    }
}

impl<T> Clone for RowColumn<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for RowColumn<'_, T> {}

/// Bidirectional cursor over a storage, last slot first.
pub struct Rows<'s> {
    storage: &'s Storage,
    remaining: std::ops::Range<usize>,
}

impl<'s> Rows<'s> {
    /// Resolves column `T` once for the rows of this cursor.
    ///
    /// # Errors
    ///
    /// Fails if `T` is not a field of the storage's schema.
    pub fn column<T: Field>(&self) -> StoreResult<RowColumn<'s, T>> {
        Ok(RowColumn {
            storage: self.storage,
            values: self.storage.column::<T>()?,
        })
    }
}

impl<'s> Iterator for Rows<'s> {
    type Item = Row<'s>;

    #[inline]
    fn next(&mut self) -> Option<Row<'s>> {
        let slot = self.remaining.next_back()?;
        Some(Row {
            storage: self.storage,
            slot,
        })
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.remaining.size_hint()
    }
}

impl DoubleEndedIterator for Rows<'_> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        let slot = self.remaining.next()?;
        Some(Row {
            storage: self.storage,
            slot,
        })
    }
}

impl ExactSizeIterator for Rows<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage<S: FieldSet>() -> Storage {
        Storage::of::<S>(SparseLayout::Flat).unwrap()
    }

    fn e(raw: u32) -> Entity {
        Entity::from_raw(raw)
    }

    #[test]
    fn test_insert_contains_get() {
        let mut s = storage::<(i32, f32)>();
        assert!(s.is_empty());
        s.insert(e(3), (7i32, 0.5f32)).unwrap();
        s.insert(e(9), (0.25f32, -1i32)).unwrap();

        assert_eq!(s.len(), 2);
        assert!(s.contains(e(3)));
        assert!(s.contains(e(9)));
        assert!(!s.contains(e(4)));
        assert_eq!(*s.get::<i32>(e(3)).unwrap(), 7);
        assert_eq!(*s.get::<f32>(e(9)).unwrap(), 0.25);
        assert_eq!(s.entities(), &[e(3), e(9)]);
    }

    #[test]
    fn test_growth_policy() {
        let mut s = storage::<(u64,)>();
        assert_eq!(s.capacity(), 0);
        s.insert(e(0), (1u64,)).unwrap();
        assert_eq!(s.capacity(), 8);
        for i in 1..=8 {
            s.insert(e(i), (u64::from(i),)).unwrap();
        }
        // 8 * 3 / 2 + 8
        assert_eq!(s.capacity(), 20);
    }

    #[test]
    fn test_partial_bundle_zeroes_rest() {
        let mut s = storage::<(u32, u16)>();
        s.insert(e(0), (5u32, 6u16)).unwrap();
        s.erase(e(0)).unwrap();
        s.insert(e(1), (9u32,)).unwrap();
        assert_eq!(*s.get::<u16>(e(1)).unwrap(), 0);
        assert_eq!(*s.get::<u32>(e(1)).unwrap(), 9);
    }

    #[test]
    fn test_insert_rejects_foreign_fields() {
        let mut s = storage::<(u32,)>();
        assert!(matches!(
            s.insert(e(0), (1.0f64,)),
            Err(StoreError::FieldNotInSchema { field: "f64", .. })
        ));
        assert_eq!(
            s.insert(e(0), (1u32, 2u32)),
            Err(StoreError::DuplicateField("u32"))
        );
        assert!(s.is_empty());
    }

    #[test]
    fn test_swap_erase_preserves_others() {
        let mut s = storage::<(u32,)>();
        for i in 0..5 {
            s.insert(e(i), (i * 100,)).unwrap();
        }
        s.erase(e(1)).unwrap();

        assert_eq!(s.entities(), &[e(0), e(4), e(2), e(3)]);
        for i in [0, 2, 3, 4] {
            assert_eq!(*s.get::<u32>(e(i)).unwrap(), i * 100);
            assert_eq!(s.entities()[s.slot_of(e(i)).unwrap()], e(i));
        }
        assert!(!s.contains(e(1)));
        assert_eq!(s.erase(e(1)), Err(StoreError::EntityNotFound(e(1))));
    }

    #[test]
    fn test_erase_last_truncates() {
        let mut s = storage::<(u32,)>();
        for i in 0..3 {
            s.insert(e(i), (i,)).unwrap();
        }
        s.erase(e(2)).unwrap();
        assert_eq!(s.entities(), &[e(0), e(1)]);
        assert_eq!(s.column::<u32>().unwrap(), &[0, 1]);
    }

    #[test]
    fn test_shrink_to_fit_idempotent() {
        let mut s = storage::<(u32,)>();
        for i in 0..30 {
            s.insert(e(i), (i,)).unwrap();
        }
        for i in 0..20 {
            s.erase(e(i)).unwrap();
        }
        s.shrink_to_fit();
        assert_eq!(s.capacity(), 10);
        s.shrink_to_fit();
        assert_eq!(s.capacity(), 10);
        for i in 20..30 {
            assert_eq!(*s.get::<u32>(e(i)).unwrap(), i);
        }
    }

    #[test]
    fn test_share_only_when_empty() {
        let mut s = storage::<(u32,)>();
        let table = SharedSparse::new(SparseLayout::Flat);
        assert!(s.share(&table));
        assert_eq!(table.sharers(), 2);

        s.insert(e(0), (1u32,)).unwrap();
        let other = SharedSparse::new(SparseLayout::Flat);
        assert!(!s.share(&other));
        assert!(s.sparse().same_table(&table));
    }

    #[test]
    fn test_rows_reverse_order() {
        let mut s = storage::<(u32,)>();
        for i in 0..4 {
            s.insert(e(i), (i + 10,)).unwrap();
        }
        let seen: Vec<_> = s.rows().map(|row| row.entity()).collect();
        assert_eq!(seen, vec![e(3), e(2), e(1), e(0)]);

        let forward: Vec<_> = s.rows().rev().map(|row| *row.get::<u32>().unwrap()).collect();
        assert_eq!(forward, vec![10, 11, 12, 13]);
        assert_eq!(s.rows().len(), 4);
    }

    #[test]
    fn test_row_column_binds_once() {
        let mut s = storage::<(u32, f32)>();
        for i in 0..5 {
            s.insert(e(i), (i * 2, 0.5f32)).unwrap();
        }
        let rows = s.rows();
        let values = rows.column::<u32>().unwrap();
        assert_eq!(values.values(), &[0, 2, 4, 6, 8]);
        let seen: Vec<u32> = rows.filter_map(|row| values.get(row).copied()).collect();
        assert_eq!(seen, vec![8, 6, 4, 2, 0]);

        assert!(matches!(
            s.rows().column::<u64>(),
            Err(StoreError::FieldNotInSchema { .. })
        ));

        // Rows of another storage never index into this column.
        let mut other = storage::<(u32,)>();
        other.insert(e(9), (1u32,)).unwrap();
        let foreign = other.rows().next().unwrap();
        assert_eq!(values.get(foreign), None);
    }

    #[test]
    fn test_for_each_mutates_requested_fields() {
        let mut s = storage::<(u16, f32)>();
        for i in 0..4u16 {
            s.insert(e(u32::from(i)), (i, 1.0f32)).unwrap();
        }
        s.for_each::<(&u16, &mut f32), _>(|_, (n, x): (&u16, &mut f32)| {
            *x += f32::from(*n);
        })
        .unwrap();
        assert_eq!(s.column::<f32>().unwrap(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_move_to_transfers_common_fields() {
        let mut catalog = SchemaCatalog::new();
        let a = catalog.register::<(u32, u8)>().unwrap();
        let b = catalog.register::<(u32, u16)>().unwrap();
        let table = SharedSparse::new(SparseLayout::Flat);
        let mut from = Storage::with_table(catalog.schema(a).unwrap(), &table);
        let mut to = Storage::with_table(catalog.schema(b).unwrap(), &table);

        from.insert(e(0), (1u32, 2u8)).unwrap();
        from.insert(e(1), (3u32, 4u8)).unwrap();
        from.move_to(e(0), &mut to).unwrap();

        assert!(!from.contains(e(0)));
        assert!(from.contains(e(1)));
        assert_eq!(*from.get::<u8>(e(1)).unwrap(), 4);
        assert_eq!(*to.get::<u32>(e(0)).unwrap(), 1);
        assert_eq!(*to.get::<u16>(e(0)).unwrap(), 0);
    }
}
