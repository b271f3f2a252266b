//! # Views
//!
//! A view is the list of schemas holding at least a requested field set,
//! plus the operations that route through that list. The list is built
//! once per field set and cached by the registry.
//!
//! Point operations scan candidates in list order and stop at the first
//! storage holding the entity. The exact-match schema, when declared,
//! sits first, so callers naming the full field set hit it immediately.

use std::any::{type_name, TypeId};
use std::sync::Arc;

use tracing::trace;

use crate::ecs::entity::EntityAllocator;
use crate::ecs::field::{Field, FieldMask, FieldSet};
use crate::ecs::query::{FieldAccess, Query, ReadOnlyQuery};
use crate::ecs::schema::{SchemaCatalog, SchemaId};
use crate::ecs::storage::Storage;
use crate::ecs::Entity;
use crate::error::{describe_fields, StoreError, StoreResult};

/// First candidate storage holding `entity`.
pub(crate) fn locate(
    storages: &[Storage],
    candidates: &[SchemaId],
    entity: Entity,
) -> Option<SchemaId> {
    candidates
        .iter()
        .copied()
        .find(|id| storages[id.index()].contains(entity))
}

/// Records across all candidate storages.
pub(crate) fn count(storages: &[Storage], candidates: &[SchemaId]) -> usize {
    candidates.iter().map(|id| storages[id.index()].len()).sum()
}

/// Runs a mutable query over every candidate storage.
pub(crate) fn for_each_mut<'r, Q, F>(
    storages: &'r mut [Storage],
    candidates: &[SchemaId],
    f: &mut F,
) -> StoreResult<()>
where
    Q: Query,
    F: FnMut(Entity, Q::Item<'r>),
{
    for storage in storages {
        if candidates.contains(&storage.schema()) {
            storage.query_mut::<Q, F>(f)?;
        }
    }
    Ok(())
}

/// Checks that every field `Q` touches belongs to `mask`.
pub(crate) fn check_query<Q: Query>(catalog: &SchemaCatalog, mask: &FieldMask) -> StoreResult<()> {
    let mut error = None;
    Q::visit(&mut |access: FieldAccess| {
        let inside = catalog
            .field_id(access.ty.type_id)
            .is_some_and(|id| mask.contains(id));
        if error.is_none() && !inside {
            error = Some(StoreError::FieldNotInView(access.ty.name));
        }
    });
    error.map_or(Ok(()), Err)
}

fn check_field<T: Field>(catalog: &SchemaCatalog, mask: &FieldMask) -> StoreResult<()> {
    match catalog.field_id(TypeId::of::<T>()) {
        Some(id) if mask.contains(id) => Ok(()),
        _ => Err(StoreError::FieldNotInView(type_name::<T>())),
    }
}

/// Moves `entity` from its storage among `candidates` into the storage of
/// exactly `S`.
pub(crate) fn swap_schema<S: FieldSet>(
    catalog: &SchemaCatalog,
    storages: &mut [Storage],
    candidates: &[SchemaId],
    entity: Entity,
) -> StoreResult<()> {
    let no_match = || StoreError::NoMatchingSchema {
        fields: describe_fields(S::names()),
    };
    let mask = catalog.mask_of::<S>().map_err(|_| no_match())?;
    let target = catalog.resolve(&mask).ok_or_else(no_match)?;
    let source = locate(storages, candidates, entity).ok_or(StoreError::EntityNotFound(entity))?;
    if source == target {
        return Ok(());
    }
    let (from, to) = pair_mut(storages, source.index(), target.index());
    from.move_to(entity, to)?;
    trace!(%entity, from = %source, to = %target, "entity changed schema");
    Ok(())
}

fn pair_mut(storages: &mut [Storage], a: usize, b: usize) -> (&mut Storage, &mut Storage) {
    debug_assert_ne!(a, b);
    if a < b {
        let (left, right) = storages.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = storages.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

/// Read-only view over the schemas holding a field set.
///
/// # Example
///
/// ```rust,ignore
/// let view = registry.view::<(Position,)>()?;
/// let mut sum = 0.0;
/// view.for_each::<&Position, _>(|_, p: &Position| sum += p.x)?;
/// ```
#[derive(Clone)]
pub struct View<'r> {
    catalog: &'r SchemaCatalog,
    storages: &'r [Storage],
    mask: FieldMask,
    candidates: Arc<[SchemaId]>,
}

impl<'r> View<'r> {
    pub(crate) fn new(
        catalog: &'r SchemaCatalog,
        storages: &'r [Storage],
        mask: FieldMask,
        candidates: Arc<[SchemaId]>,
    ) -> Self {
        Self {
            catalog,
            storages,
            mask,
            candidates,
        }
    }

    /// Field set this view was built over.
    #[must_use]
    pub const fn mask(&self) -> &FieldMask {
        &self.mask
    }

    /// Candidate schemas, exact match first.
    #[must_use]
    pub fn schemas(&self) -> &[SchemaId] {
        &self.candidates
    }

    /// Candidate storages in list order.
    pub fn storages(&self) -> impl Iterator<Item = &'r Storage> + '_ {
        let storages = self.storages;
        self.candidates.iter().map(move |id| &storages[id.index()])
    }

    /// Storage holding `entity`, if any candidate does.
    #[must_use]
    pub fn locate(&self, entity: Entity) -> Option<SchemaId> {
        locate(self.storages, &self.candidates, entity)
    }

    /// Whether any candidate storage holds `entity`.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.locate(entity).is_some()
    }

    /// Records across all candidate storages.
    #[must_use]
    pub fn len(&self) -> usize {
        count(self.storages, &self.candidates)
    }

    /// Whether every candidate storage is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.storages().all(Storage::is_empty)
    }

    /// Field `T` of `entity`.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError::FieldNotInView`] if `T` is outside the view,
    /// or [`StoreError::EntityNotFound`] if no candidate holds `entity`.
    pub fn get<T: Field>(&self, entity: Entity) -> StoreResult<&'r T> {
        check_field::<T>(self.catalog, &self.mask)?;
        let id = self
            .locate(entity)
            .ok_or(StoreError::EntityNotFound(entity))?;
        self.storages[id.index()].get::<T>(entity)
    }

    /// Runs `f` over every record of every candidate storage.
    ///
    /// # Errors
    ///
    /// Fails before visiting anything if `Q` touches a field outside the view.
    pub fn for_each<Q, F>(&self, mut f: F) -> StoreResult<()>
    where
        Q: ReadOnlyQuery,
        F: FnMut(Entity, Q::Item<'r>),
    {
        check_query::<Q>(self.catalog, &self.mask)?;
        let storages = self.storages;
        for id in self.candidates.iter() {
            storages[id.index()].query::<Q, F>(&mut f)?;
        }
        Ok(())
    }
}

/// Exclusive view over the schemas holding a field set.
///
/// Adds writes, destruction, and schema swaps to what [`View`] offers.
pub struct ViewMut<'r> {
    catalog: &'r SchemaCatalog,
    storages: &'r mut [Storage],
    allocator: &'r mut EntityAllocator,
    mask: FieldMask,
    candidates: Arc<[SchemaId]>,
}

impl<'r> ViewMut<'r> {
    pub(crate) fn new(
        catalog: &'r SchemaCatalog,
        storages: &'r mut [Storage],
        allocator: &'r mut EntityAllocator,
        mask: FieldMask,
        candidates: Arc<[SchemaId]>,
    ) -> Self {
        Self {
            catalog,
            storages,
            allocator,
            mask,
            candidates,
        }
    }

    /// Field set this view was built over.
    #[must_use]
    pub const fn mask(&self) -> &FieldMask {
        &self.mask
    }

    /// Candidate schemas, exact match first.
    #[must_use]
    pub fn schemas(&self) -> &[SchemaId] {
        &self.candidates
    }

    /// Storage holding `entity`, if any candidate does.
    #[must_use]
    pub fn locate(&self, entity: Entity) -> Option<SchemaId> {
        locate(self.storages, &self.candidates, entity)
    }

    /// Whether any candidate storage holds `entity`.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.locate(entity).is_some()
    }

    /// Records across all candidate storages.
    #[must_use]
    pub fn len(&self) -> usize {
        count(self.storages, &self.candidates)
    }

    /// Whether every candidate storage is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Field `T` of `entity`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`View::get`].
    pub fn get<T: Field>(&self, entity: Entity) -> StoreResult<&T> {
        check_field::<T>(self.catalog, &self.mask)?;
        let id = self
            .locate(entity)
            .ok_or(StoreError::EntityNotFound(entity))?;
        self.storages[id.index()].get::<T>(entity)
    }

    /// Mutable field `T` of `entity`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`View::get`].
    pub fn get_mut<T: Field>(&mut self, entity: Entity) -> StoreResult<&mut T> {
        check_field::<T>(self.catalog, &self.mask)?;
        let id = self
            .locate(entity)
            .ok_or(StoreError::EntityNotFound(entity))?;
        self.storages[id.index()].get_mut::<T>(entity)
    }

    /// Overwrites field `T` of `entity`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`View::get`].
    pub fn set<T: Field>(&mut self, entity: Entity, value: T) -> StoreResult<()> {
        *self.get_mut::<T>(entity)? = value;
        Ok(())
    }

    /// Runs `f` over every record of every candidate storage.
    ///
    /// # Errors
    ///
    /// Fails before visiting anything if `Q` touches a field outside the view.
    pub fn for_each<'v, Q, F>(&'v mut self, mut f: F) -> StoreResult<()>
    where
        Q: Query,
        F: FnMut(Entity, Q::Item<'v>),
    {
        check_query::<Q>(self.catalog, &self.mask)?;
        for_each_mut::<Q, F>(self.storages, &self.candidates, &mut f)
    }

    /// Erases `entity` from its storage and recycles the handle.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EntityNotFound`] if no candidate holds `entity`.
    pub fn destroy(&mut self, entity: Entity) -> StoreResult<()> {
        let id = self
            .locate(entity)
            .ok_or(StoreError::EntityNotFound(entity))?;
        self.storages[id.index()].erase(entity)?;
        self.allocator.release(entity);
        Ok(())
    }

    /// Moves `entity` into the storage of exactly `S`, keeping the values of
    /// the fields both schemas share and zeroing the others.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError::NoMatchingSchema`] if no schema is exactly
    /// `S`, or [`StoreError::EntityNotFound`] if no candidate holds `entity`.
    pub fn swap_schema<S: FieldSet>(&mut self, entity: Entity) -> StoreResult<()> {
        swap_schema::<S>(self.catalog, self.storages, &self.candidates, entity)
    }
}
