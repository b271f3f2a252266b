//! # Indirection Tables
//!
//! Maps entity handles to dense slots. A table only answers for the
//! entities its storages currently hold; every other entry is stale data
//! that the storage filters out by checking its dense array.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::SparseLayout;
use crate::ecs::Entity;

/// Slack added to the flat table when a handle lands far past the end.
const FLAT_SLACK: usize = 1024 / std::mem::size_of::<u32>();

#[derive(Clone, Debug)]
enum Repr {
    Flat(Vec<u32>),
    Paged {
        pages: Vec<Option<Box<[u32]>>>,
        shift: u32,
        mask: usize,
    },
}

/// Handle → dense slot map.
///
/// # Layouts
///
/// - **Flat**: one array. An out-of-range handle grows it to twice the
///   old size, or to the handle plus a small slack when that is larger.
/// - **Paged**: fixed-size pages allocated on first touch. One extra
///   indirection per lookup, bounded memory for scattered handles.
#[derive(Clone, Debug)]
pub struct SparseArray {
    repr: Repr,
}

impl SparseArray {
    /// Creates an empty table with the given layout.
    #[must_use]
    pub fn new(layout: SparseLayout) -> Self {
        let repr = match layout {
            SparseLayout::Flat => Repr::Flat(Vec::new()),
            SparseLayout::Paged { page_size } => {
                let page_size = page_size.max(1).next_power_of_two();
                Repr::Paged {
                    pages: Vec::new(),
                    shift: page_size.trailing_zeros(),
                    mask: page_size - 1,
                }
            }
        };
        Self { repr }
    }

    /// Layout this table was built with.
    #[must_use]
    pub fn layout(&self) -> SparseLayout {
        match &self.repr {
            Repr::Flat(_) => SparseLayout::Flat,
            Repr::Paged { mask, .. } => SparseLayout::Paged { page_size: mask + 1 },
        }
    }

    /// Makes `entity` addressable.
    pub fn assure(&mut self, entity: Entity) {
        let index = entity.index();
        match &mut self.repr {
            Repr::Flat(slots) => {
                let capacity = slots.len();
                if index < capacity {
                    return;
                }
                let doubled = capacity * 2;
                let new_capacity = if index >= doubled {
                    index + FLAT_SLACK
                } else {
                    doubled
                };
                slots.resize(new_capacity, 0);
            }
            Repr::Paged { pages, shift, mask } => {
                let page = index >> *shift;
                if page >= pages.len() {
                    pages.resize_with(page + 1, || None);
                }
                let size = *mask + 1;
                pages[page].get_or_insert_with(|| vec![0; size].into_boxed_slice());
            }
        }
    }

    /// Slot recorded for `entity`, if its entry is addressable.
    ///
    /// A returned slot is only meaningful to the storage that wrote it.
    #[inline]
    #[must_use]
    pub fn get(&self, entity: Entity) -> Option<u32> {
        let index = entity.index();
        match &self.repr {
            Repr::Flat(slots) => slots.get(index).copied(),
            Repr::Paged { pages, shift, mask } => pages
                .get(index >> *shift)?
                .as_ref()
                .map(|page| page[index & *mask]),
        }
    }

    /// Records `slot` for `entity`, growing the table if needed.
    #[inline]
    pub fn set(&mut self, entity: Entity, slot: u32) {
        self.assure(entity);
        let index = entity.index();
        match &mut self.repr {
            Repr::Flat(slots) => slots[index] = slot,
            Repr::Paged { pages, shift, mask } => {
                if let Some(page) = pages[index >> *shift].as_mut() {
                    page[index & *mask] = slot;
                }
            }
        }
    }

    /// Number of addressable handles.
    #[must_use]
    pub fn capacity(&self) -> usize {
        match &self.repr {
            Repr::Flat(slots) => slots.len(),
            Repr::Paged { pages, mask, .. } => pages.len() * (mask + 1),
        }
    }

    /// Bytes held by the table.
    #[must_use]
    pub fn allocated_bytes(&self) -> usize {
        let slot = std::mem::size_of::<u32>();
        match &self.repr {
            Repr::Flat(slots) => slots.capacity() * slot,
            Repr::Paged { pages, mask, .. } => {
                let live = pages.iter().filter(|p| p.is_some()).count();
                live * (mask + 1) * slot
                    + pages.capacity() * std::mem::size_of::<Option<Box<[u32]>>>()
            }
        }
    }
}

/// A reference-counted indirection table.
///
/// Cloning shares the table; each clone counts as one sharer and the table
/// is freed when the last sharer drops. Storages only write the entries of
/// entities they hold, so sharers never overwrite each other's rows.
#[derive(Clone, Debug)]
pub struct SharedSparse(Arc<RwLock<SparseArray>>);

impl SharedSparse {
    /// Creates a table with a single sharer.
    #[must_use]
    pub fn new(layout: SparseLayout) -> Self {
        Self(Arc::new(RwLock::new(SparseArray::new(layout))))
    }

    /// Number of storages (and other handles) sharing this table.
    #[must_use]
    pub fn sharers(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Whether both handles name the same table.
    #[must_use]
    pub fn same_table(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Layout of the shared table.
    #[must_use]
    pub fn layout(&self) -> SparseLayout {
        self.0.read().layout()
    }

    /// Number of addressable handles.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.0.read().capacity()
    }

    /// Bytes held by the shared table.
    #[must_use]
    pub fn allocated_bytes(&self) -> usize {
        self.0.read().allocated_bytes()
    }

    /// Locks the table for lookups.
    ///
    /// Guards never leave the crate: a guard held across a storage update
    /// would block it, and raw writes could break the slot mapping.
    #[inline]
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, SparseArray> {
        self.0.read()
    }

    /// Locks the table for updates.
    #[inline]
    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, SparseArray> {
        self.0.write()
    }
}
