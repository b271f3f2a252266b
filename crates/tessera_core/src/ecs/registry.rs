//! # Storage Registry
//!
//! Owns one [`Storage`] per declared schema, the handle allocator, and the
//! indirection table every storage shares. Operations resolve a field set
//! to the storages that can serve it and delegate.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::config::StoreConfig;
use crate::ecs::entity::EntityAllocator;
use crate::ecs::field::{Bundle, Field, FieldMask, FieldSet};
use crate::ecs::query::Query;
use crate::ecs::schema::{SchemaCatalog, SchemaId};
use crate::ecs::sparse::SharedSparse;
use crate::ecs::storage::Storage;
use crate::ecs::view::{self, View, ViewMut};
use crate::ecs::Entity;
use crate::error::{describe_fields, StoreError, StoreResult};

/// Declares the schemas of a [`Registry`].
///
/// Declaration errors are held until [`build`](Self::build), so calls
/// chain without intermediate `?`.
///
/// # Example
///
/// ```rust,ignore
/// let registry = Registry::builder()
///     .schema::<()>()
///     .schema::<(Position,)>()
///     .schema::<(Position, Velocity)>()
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    config: StoreConfig,
    catalog: SchemaCatalog,
    error: Option<StoreError>,
}

impl RegistryBuilder {
    /// Starts a registry with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Declares the schema holding exactly the fields of `S`.
    #[must_use]
    pub fn schema<S: FieldSet>(mut self) -> Self {
        if self.error.is_none() {
            if let Err(err) = self.catalog.register::<S>() {
                self.error = Some(err);
            }
        }
        self
    }

    /// Freezes the schema list and allocates one storage per schema.
    ///
    /// # Errors
    ///
    /// Returns the first declaration error, [`StoreError::InvalidConfig`]
    /// if the configuration is inconsistent, or [`StoreError::NoSchemas`]
    /// if nothing was declared.
    pub fn build(self) -> StoreResult<Registry> {
        if let Some(err) = self.error {
            return Err(err);
        }
        self.config.validate()?;
        if self.catalog.is_empty() {
            return Err(StoreError::NoSchemas);
        }

        let sparse = SharedSparse::new(self.config.sparse.layout);
        let storages: Box<[Storage]> = self
            .catalog
            .schemas()
            .iter()
            .map(|schema| {
                let mut storage = Storage::with_table(schema, &sparse);
                storage.reserve(self.config.storage.initial_capacity);
                storage
            })
            .collect();

        debug!(
            schemas = storages.len(),
            fields = self.catalog.fields().len(),
            layout = ?self.config.sparse.layout,
            "registry built"
        );

        Ok(Registry {
            allocator: EntityAllocator::with_config(&self.config.allocator),
            catalog: self.catalog,
            storages,
            sparse,
            bundles: RwLock::new(HashMap::new()),
            views: RwLock::new(HashMap::new()),
            config: self.config,
        })
    }
}

/// Entity storage split by schema.
///
/// Every record lives in exactly one storage: the one whose schema matched
/// its fields when it was created, or the one it was last swapped into.
/// Point operations that only name some fields scan every storage holding
/// those fields, so naming more fields narrows the scan.
///
/// # Example
///
/// ```rust,ignore
/// let mut registry = Registry::builder()
///     .schema::<(Position, Velocity)>()
///     .build()?;
///
/// let e = registry.create((Position::default(), Velocity { x: 1.0, ..Default::default() }))?;
/// registry.for_each::<(&mut Position, &Velocity), _>(|_, (p, v): (&mut Position, &Velocity)| {
///     p.x += v.x;
/// })?;
/// registry.destroy(e)?;
/// ```
pub struct Registry {
    catalog: SchemaCatalog,
    storages: Box<[Storage]>,
    sparse: SharedSparse,
    allocator: EntityAllocator,
    /// Bundle type -> exact schema.
    bundles: RwLock<HashMap<TypeId, SchemaId>>,
    /// Field mask -> superset schemas, exact match first.
    views: RwLock<HashMap<FieldMask, Arc<[SchemaId]>>>,
    config: StoreConfig,
}

impl Registry {
    /// Starts declaring a registry.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    // =========================================================================
    // Schema resolution
    // =========================================================================

    fn bundle_schema<B: Bundle>(&self) -> StoreResult<SchemaId> {
        let key = TypeId::of::<B>();
        if let Some(&id) = self.bundles.read().get(&key) {
            return Ok(id);
        }
        let no_match = || StoreError::NoMatchingSchema {
            fields: describe_fields(B::names()),
        };
        let mask = self.catalog.mask_of::<B>().map_err(|err| match err {
            StoreError::UnknownField(_) => no_match(),
            other => other,
        })?;
        let id = self.catalog.resolve(&mask).ok_or_else(no_match)?;
        self.bundles.write().insert(key, id);
        Ok(id)
    }

    fn candidates(&self, mask: &FieldMask) -> Arc<[SchemaId]> {
        if let Some(list) = self.views.read().get(mask) {
            return Arc::clone(list);
        }
        let list: Arc<[SchemaId]> = self.catalog.supersets(mask).into();
        trace!(
            fields = %self.catalog.describe(mask),
            schemas = list.len(),
            "view cached"
        );
        self.views.write().insert(*mask, Arc::clone(&list));
        list
    }

    /// Candidates for `S`, failing when no schema holds all of it.
    fn view_of<S: FieldSet>(&self) -> StoreResult<(FieldMask, Arc<[SchemaId]>)> {
        let no_view = || StoreError::NoMatchingView {
            fields: describe_fields(S::names()),
        };
        let mask = self.catalog.mask_of::<S>().map_err(|err| match err {
            StoreError::UnknownField(_) => no_view(),
            other => other,
        })?;
        let candidates = self.candidates(&mask);
        if candidates.is_empty() {
            return Err(no_view());
        }
        Ok((mask, candidates))
    }

    /// Candidates for `S`, or `None` when nothing can hold it.
    fn try_view_of<S: FieldSet>(&self) -> Option<Arc<[SchemaId]>> {
        self.view_of::<S>().ok().map(|(_, candidates)| candidates)
    }

    fn exact<S: FieldSet>(&self) -> StoreResult<SchemaId> {
        let no_match = || StoreError::NoMatchingSchema {
            fields: describe_fields(S::names()),
        };
        let mask = self.catalog.mask_of::<S>().map_err(|_| no_match())?;
        self.catalog.resolve(&mask).ok_or_else(no_match)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Creates a record from `bundle` in the schema matching exactly its
    /// field types, returning the new handle.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoMatchingSchema`] if no declared schema holds
    /// exactly the bundle's fields. No handle is consumed on failure.
    pub fn create<B: Bundle>(&mut self, bundle: B) -> StoreResult<Entity> {
        let id = self.bundle_schema::<B>()?;
        let entity = self.allocator.generate();
        if let Err(err) = self.storages[id.index()].insert_exact(entity, bundle) {
            self.allocator.release(entity);
            return Err(err);
        }
        Ok(entity)
    }

    /// Destroys `entity`, scanning every storage.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EntityNotFound`] if no storage holds `entity`.
    pub fn destroy(&mut self, entity: Entity) -> StoreResult<()> {
        self.destroy_with::<()>(entity)
    }

    /// Destroys `entity`, scanning only storages that hold the fields of `K`.
    ///
    /// Naming the record's full field set makes this a single lookup.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EntityNotFound`] if no such storage holds
    /// `entity`. The registry is left unchanged.
    pub fn destroy_with<K: FieldSet>(&mut self, entity: Entity) -> StoreResult<()> {
        let candidates = self
            .try_view_of::<K>()
            .ok_or(StoreError::EntityNotFound(entity))?;
        let id = view::locate(&self.storages, &candidates, entity)
            .ok_or(StoreError::EntityNotFound(entity))?;
        self.storages[id.index()].erase(entity)?;
        self.allocator.release(entity);
        Ok(())
    }

    /// Drops every record and resets handle numbering.
    ///
    /// Costs one clear per schema regardless of how many records exist.
    pub fn destroy_all(&mut self) {
        let destroyed = self.len();
        for storage in self.storages.iter_mut() {
            storage.clear();
        }
        self.allocator.release_all();
        debug!(destroyed, "registry cleared");
    }

    /// Releases spare capacity in every storage and compacts the handle
    /// allocator. Meant to be called occasionally, not every frame.
    pub fn optimize(&mut self) {
        let before = self.memory_usage();
        for storage in self.storages.iter_mut() {
            storage.shrink_to_fit();
        }
        self.allocator.rebalance();
        self.allocator.shrink_to_fit();
        let after = self.memory_usage();
        debug!(
            before,
            after,
            reclaimed = before.saturating_sub(after),
            "registry optimized"
        );
    }

    /// Moves `entity` into the storage of exactly `S`. Fields both schemas
    /// share keep their values; the rest of the new record is zeroed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoMatchingSchema`] if no schema is exactly `S`,
    /// or [`StoreError::EntityNotFound`] if no storage holds `entity`.
    pub fn swap_schema<S: FieldSet>(&mut self, entity: Entity) -> StoreResult<()> {
        let all = self.candidates(&FieldMask::EMPTY);
        view::swap_schema::<S>(&self.catalog, &mut self.storages, &all, entity)
    }

    // =========================================================================
    // Access
    // =========================================================================

    /// Runs `f` over every record whose schema holds the fields `Q` touches.
    ///
    /// A query naming a field no schema declares visits nothing.
    ///
    /// # Errors
    ///
    /// Fails before visiting anything if `Q` names a field twice.
    pub fn for_each<'r, Q, F>(&'r mut self, mut f: F) -> StoreResult<()>
    where
        Q: Query,
        F: FnMut(Entity, Q::Item<'r>),
    {
        let mask = match self.catalog.mask_of_query::<Q>() {
            Ok(mask) => mask,
            Err(StoreError::UnknownField(_)) => return Ok(()),
            Err(err) => return Err(err),
        };
        let candidates = self.candidates(&mask);
        view::for_each_mut::<Q, F>(&mut self.storages, &candidates, &mut f)
    }

    /// Field `T` of `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoMatchingView`] if no schema declares `T`, or
    /// [`StoreError::EntityNotFound`] if no storage with `T` holds `entity`.
    pub fn unpack<T: Field>(&self, entity: Entity) -> StoreResult<&T> {
        let (_, candidates) = self.view_of::<(T,)>()?;
        let id = view::locate(&self.storages, &candidates, entity)
            .ok_or(StoreError::EntityNotFound(entity))?;
        self.storages[id.index()].get::<T>(entity)
    }

    /// Mutable field `T` of `entity`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`unpack`](Self::unpack).
    pub fn unpack_mut<T: Field>(&mut self, entity: Entity) -> StoreResult<&mut T> {
        let (_, candidates) = self.view_of::<(T,)>()?;
        let id = view::locate(&self.storages, &candidates, entity)
            .ok_or(StoreError::EntityNotFound(entity))?;
        self.storages[id.index()].get_mut::<T>(entity)
    }

    /// Overwrites field `T` of `entity`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`unpack`](Self::unpack).
    pub fn set<T: Field>(&mut self, entity: Entity, value: T) -> StoreResult<()> {
        *self.unpack_mut::<T>(entity)? = value;
        Ok(())
    }

    /// Whether `entity` lives in a storage holding every field of `S`.
    #[must_use]
    pub fn has<S: FieldSet>(&self, entity: Entity) -> bool {
        self.try_view_of::<S>()
            .is_some_and(|candidates| view::locate(&self.storages, &candidates, entity).is_some())
    }

    /// Whether `entity` lives in any storage.
    #[must_use]
    pub fn has_entity(&self, entity: Entity) -> bool {
        self.storages.iter().any(|storage| storage.contains(entity))
    }

    /// Records whose schema holds every field of `S`.
    #[must_use]
    pub fn size<S: FieldSet>(&self) -> usize {
        self.try_view_of::<S>()
            .map_or(0, |candidates| view::count(&self.storages, &candidates))
    }

    /// Whether no record's schema holds every field of `S`.
    #[must_use]
    pub fn empty<S: FieldSet>(&self) -> bool {
        self.size::<S>() == 0
    }

    /// Total records across all storages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.storages.iter().map(Storage::len).sum()
    }

    /// Whether the registry holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.storages.iter().all(Storage::is_empty)
    }

    /// Read-only view over the storages holding every field of `S`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoMatchingView`] if no schema holds all of `S`.
    pub fn view<S: FieldSet>(&self) -> StoreResult<View<'_>> {
        let (mask, candidates) = self.view_of::<S>()?;
        Ok(View::new(&self.catalog, &self.storages, mask, candidates))
    }

    /// Exclusive view over the storages holding every field of `S`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`view`](Self::view).
    pub fn view_mut<S: FieldSet>(&mut self) -> StoreResult<ViewMut<'_>> {
        let (mask, candidates) = self.view_of::<S>()?;
        Ok(ViewMut::new(
            &self.catalog,
            &mut self.storages,
            &mut self.allocator,
            mask,
            candidates,
        ))
    }

    /// The storage of exactly `S`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoMatchingSchema`] if no schema is exactly `S`.
    pub fn storage<S: FieldSet>(&self) -> StoreResult<&Storage> {
        let id = self.exact::<S>()?;
        Ok(&self.storages[id.index()])
    }

    /// Mutable storage of exactly `S`.
    ///
    /// Records inserted directly must use handles from this registry's
    /// allocator, or handles may collide.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoMatchingSchema`] if no schema is exactly `S`.
    pub fn storage_mut<S: FieldSet>(&mut self) -> StoreResult<&mut Storage> {
        let id = self.exact::<S>()?;
        Ok(&mut self.storages[id.index()])
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Number of declared schemas.
    #[must_use]
    pub fn storage_count(&self) -> usize {
        self.storages.len()
    }

    /// All storages, indexed by [`SchemaId`].
    #[must_use]
    pub fn storages(&self) -> &[Storage] {
        &self.storages
    }

    /// Field and schema catalog.
    #[must_use]
    pub const fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Handle allocator.
    #[must_use]
    pub const fn allocator(&self) -> &EntityAllocator {
        &self.allocator
    }

    /// Indirection table shared by every storage.
    #[must_use]
    pub const fn sparse(&self) -> &SharedSparse {
        &self.sparse
    }

    /// Configuration the registry was built with.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Bytes held by columns, dense arrays, the indirection table, and the
    /// allocator's free buffers.
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.storages
            .iter()
            .map(Storage::allocated_bytes)
            .sum::<usize>()
            + self.sparse.allocated_bytes()
            + self.allocator.allocated_bytes()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("schemas", &self.storages.len())
            .field("records", &self.len())
            .field("sharers", &self.sparse.sharers())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::builder()
            .schema::<()>()
            .schema::<(i32,)>()
            .schema::<(f32,)>()
            .schema::<(i32, f32)>()
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_errors() {
        assert_eq!(
            Registry::builder().build().unwrap_err(),
            StoreError::NoSchemas
        );
        assert!(matches!(
            Registry::builder()
                .schema::<(u8, u16)>()
                .schema::<(u16, u8)>()
                .build(),
            Err(StoreError::DuplicateSchema { .. })
        ));
    }

    #[test]
    fn test_storages_share_one_table() {
        let r = registry();
        assert_eq!(r.storage_count(), 4);
        // Four storages plus the registry's own handle.
        assert_eq!(r.sparse().sharers(), 5);
        assert!(r.storages().iter().all(|s| s.sparse().same_table(r.sparse())));
    }

    #[test]
    fn test_create_routes_by_exact_schema() {
        let mut r = registry();
        let a = r.create((1i32,)).unwrap();
        let b = r.create((2.0f32, 3i32)).unwrap();
        let c = r.create(()).unwrap();

        assert_eq!(r.storage::<(i32,)>().unwrap().entities(), &[a]);
        assert_eq!(r.storage::<(i32, f32)>().unwrap().entities(), &[b]);
        assert_eq!(r.storage::<()>().unwrap().entities(), &[c]);
        assert_eq!(r.len(), 3);
    }

    #[test]
    fn test_create_unmatched_consumes_no_handle() {
        let mut r = registry();
        assert!(matches!(
            r.create((1u64,)),
            Err(StoreError::NoMatchingSchema { .. })
        ));
        assert!(matches!(
            r.create((1i32, 2.0f32, 3u8)),
            Err(StoreError::NoMatchingSchema { .. })
        ));
        assert_eq!(r.allocator().issued(), 0);
        assert!(r.is_empty());
    }

    #[test]
    fn test_size_counts_supersets() {
        let mut r = registry();
        r.create((1i32,)).unwrap();
        r.create((2i32, 1.0f32)).unwrap();
        r.create((1.0f32,)).unwrap();

        assert_eq!(r.size::<(i32,)>(), 2);
        assert_eq!(r.size::<(f32,)>(), 2);
        assert_eq!(r.size::<(f32, i32)>(), 1);
        assert_eq!(r.size::<()>(), 3);
        assert_eq!(r.size::<(u64,)>(), 0);
        assert!(r.empty::<(u64,)>());
        assert!(!r.empty::<(i32,)>());
    }

    #[test]
    fn test_unpack_and_set() {
        let mut r = registry();
        let e = r.create((4i32, 0.5f32)).unwrap();
        assert_eq!(*r.unpack::<i32>(e).unwrap(), 4);
        r.set::<f32>(e, 1.5).unwrap();
        *r.unpack_mut::<i32>(e).unwrap() += 1;
        assert_eq!(*r.unpack::<f32>(e).unwrap(), 1.5);
        assert_eq!(*r.unpack::<i32>(e).unwrap(), 5);

        let bare = r.create(()).unwrap();
        assert_eq!(r.unpack::<i32>(bare), Err(StoreError::EntityNotFound(bare)));
        assert!(matches!(
            r.unpack::<u64>(e),
            Err(StoreError::NoMatchingView { .. })
        ));
    }

    #[test]
    fn test_destroy_with_hint() {
        let mut r = registry();
        let e = r.create((7i32,)).unwrap();
        assert_eq!(
            r.destroy_with::<(f32,)>(e),
            Err(StoreError::EntityNotFound(e))
        );
        assert_eq!(r.len(), 1);
        r.destroy_with::<(i32,)>(e).unwrap();
        assert!(!r.has_entity(e));
        assert_eq!(r.destroy(e), Err(StoreError::EntityNotFound(e)));
        // The handle was recycled exactly once.
        assert_eq!(r.allocator().reusable(), 1);
    }

    #[test]
    fn test_view_caches_candidates() {
        let r = registry();
        let first = r.view::<(i32,)>().unwrap();
        let second = r.view::<(i32,)>().unwrap();
        assert_eq!(first.schemas(), second.schemas());
        assert_eq!(r.views.read().len(), 1);
        assert!(matches!(
            r.view::<(u64,)>(),
            Err(StoreError::NoMatchingView { .. })
        ));
    }

    #[test]
    fn test_for_each_unknown_field_visits_nothing() {
        let mut r = registry();
        r.create((1i32,)).unwrap();
        let mut calls = 0;
        r.for_each::<&u64, _>(|_, _: &u64| calls += 1).unwrap();
        assert_eq!(calls, 0);
        assert_eq!(
            r.for_each::<(&i32, &mut i32), _>(|_, _: (&i32, &mut i32)| {}),
            Err(StoreError::DuplicateField("i32"))
        );
    }

    #[test]
    fn test_swap_schema_keeps_handle() {
        let mut r = registry();
        let e = r.create((9i32,)).unwrap();
        r.swap_schema::<(i32, f32)>(e).unwrap();
        assert_eq!(r.size::<(i32, f32)>(), 1);
        assert_eq!(*r.unpack::<i32>(e).unwrap(), 9);
        assert_eq!(*r.unpack::<f32>(e).unwrap(), 0.0);

        // Swapping into the current schema is a no-op.
        r.swap_schema::<(f32, i32)>(e).unwrap();
        assert_eq!(r.len(), 1);

        assert!(matches!(
            r.swap_schema::<(u8,)>(e),
            Err(StoreError::NoMatchingSchema { .. })
        ));
    }

    #[test]
    fn test_destroy_all_resets_handles() {
        let mut r = registry();
        for i in 0..10 {
            r.create((i,)).unwrap();
        }
        r.destroy_all();
        assert!(r.is_empty());
        assert_eq!(r.create(()).unwrap(), Entity::from_raw(0));
    }
}
