//! # Entity Management
//!
//! Entities are plain integer handles, recycled through a two-tier
//! free list:
//! - A fixed-capacity buffer of recently released handles, served first
//! - An overflow buffer that grows geometrically when the first is full
//!
//! Handles carry no generation counter. A handle kept after `destroy`
//! can alias whatever record reuses it.

use bytemuck::{Pod, Zeroable};
use tracing::trace;

use crate::config::AllocatorConfig;

/// Opaque handle naming one record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
#[repr(transparent)]
pub struct Entity(u32);

impl Entity {
    /// Wraps a raw handle value.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw handle value.
    #[inline]
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        self.0
    }

    /// Returns the handle as an index into sparse tables.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u32> for Entity {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Issues and recycles entity handles.
///
/// `generate` prefers the recent buffer, then the overflow buffer, and only
/// then mints a new handle. Recently released handles are the ones most
/// likely to still be warm in the sparse tables that index them.
///
/// # Contract
///
/// Nothing is validated. Releasing a handle twice puts it in circulation
/// twice, and minting past `u32::MAX` wraps. Both are caller bugs and are
/// only caught by debug assertions where that is cheap.
///
/// # Example
///
/// ```rust,ignore
/// let mut allocator = EntityAllocator::new();
/// let a = allocator.generate();
/// allocator.release(a);
/// assert_eq!(allocator.generate(), a);
/// ```
#[derive(Clone, Debug)]
pub struct EntityAllocator {
    /// Next never-issued handle value.
    next: u32,
    /// Fixed-capacity stack of recently released handles.
    recent: Box<[Entity]>,
    /// Live entries in `recent`.
    recent_len: usize,
    /// Released handles that did not fit in `recent`.
    overflow: Vec<Entity>,
    /// Logical capacity of `overflow`, grown by 5/3 when full.
    overflow_capacity: usize,
    /// `overflow` never shrinks below this.
    min_overflow_capacity: usize,
}

impl EntityAllocator {
    /// Creates an allocator with the default buffer sizes.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&AllocatorConfig::default())
    }

    /// Creates an allocator sized by `config`.
    #[must_use]
    pub fn with_config(config: &AllocatorConfig) -> Self {
        let recent_capacity = config.recent_capacity.max(1);
        let min_overflow_capacity = config.min_overflow_capacity.max(1);
        Self {
            next: 0,
            recent: vec![Entity::default(); recent_capacity].into_boxed_slice(),
            recent_len: 0,
            overflow: Vec::with_capacity(min_overflow_capacity),
            overflow_capacity: min_overflow_capacity,
            min_overflow_capacity,
        }
    }

    /// Returns a handle, recycled if possible.
    #[inline]
    pub fn generate(&mut self) -> Entity {
        if self.recent_len > 0 {
            self.recent_len -= 1;
            return self.recent[self.recent_len];
        }
        if let Some(entity) = self.overflow.pop() {
            return entity;
        }
        debug_assert!(self.next != u32::MAX, "entity handle space exhausted");
        let entity = Entity(self.next);
        self.next = self.next.wrapping_add(1);
        entity
    }

    /// Returns a handle to circulation.
    #[inline]
    pub fn release(&mut self, entity: Entity) {
        debug_assert!(entity.0 < self.next, "released a handle that was never issued");
        if self.recent_len < self.recent.len() {
            self.recent[self.recent_len] = entity;
            self.recent_len += 1;
            return;
        }
        if self.overflow.len() == self.overflow_capacity {
            self.grow_overflow();
        }
        self.overflow.push(entity);
    }

    #[cold]
    fn grow_overflow(&mut self) {
        let new_capacity = (self.overflow_capacity * 5 / 3).max(self.overflow_capacity + 1);
        self.overflow
            .reserve_exact(new_capacity - self.overflow.len());
        trace!(
            from = self.overflow_capacity,
            to = new_capacity,
            "entity overflow buffer grown"
        );
        self.overflow_capacity = new_capacity;
    }

    /// Forgets every issued handle. The next `generate` returns handle 0.
    pub fn release_all(&mut self) {
        self.next = 0;
        self.recent_len = 0;
        self.overflow.clear();
    }

    /// Moves overflow entries into free room in the recent buffer.
    ///
    /// The most recently released overflow entries move first, so the
    /// LIFO order across both buffers is kept.
    pub fn rebalance(&mut self) {
        let room = self.recent.len() - self.recent_len;
        let amount = room.min(self.overflow.len());
        if amount == 0 {
            return;
        }
        let start = self.overflow.len() - amount;
        self.recent[self.recent_len..self.recent_len + amount]
            .copy_from_slice(&self.overflow[start..]);
        self.recent_len += amount;
        self.overflow.truncate(start);
    }

    /// Shrinks the overflow buffer to its live content, keeping the floor.
    pub fn shrink_to_fit(&mut self) {
        let target = self.overflow.len().max(self.min_overflow_capacity);
        if target < self.overflow_capacity {
            self.overflow.shrink_to(target);
            self.overflow_capacity = target;
        }
    }

    /// Handle the next `generate` would return.
    #[inline]
    #[must_use]
    pub fn peek(&self) -> Entity {
        if self.recent_len > 0 {
            self.recent[self.recent_len - 1]
        } else if let Some(&entity) = self.overflow.last() {
            entity
        } else {
            Entity(self.next)
        }
    }

    /// Recycled handles waiting in the recent buffer.
    #[inline]
    #[must_use]
    pub const fn recent_reusable(&self) -> usize {
        self.recent_len
    }

    /// Recycled handles waiting in the overflow buffer.
    #[inline]
    #[must_use]
    pub fn overflow_reusable(&self) -> usize {
        self.overflow.len()
    }

    /// Total recycled handles waiting.
    #[inline]
    #[must_use]
    pub fn reusable(&self) -> usize {
        self.recent_len + self.overflow.len()
    }

    /// Fixed capacity of the recent buffer.
    #[inline]
    #[must_use]
    pub fn recent_capacity(&self) -> usize {
        self.recent.len()
    }

    /// Current logical capacity of the overflow buffer.
    #[inline]
    #[must_use]
    pub const fn overflow_capacity(&self) -> usize {
        self.overflow_capacity
    }

    /// Number of handles ever minted since the last `release_all`.
    #[inline]
    #[must_use]
    pub const fn issued(&self) -> u32 {
        self.next
    }

    /// Bytes held by both free buffers.
    #[must_use]
    pub fn allocated_bytes(&self) -> usize {
        (self.recent.len() + self.overflow.capacity()) * std::mem::size_of::<Entity>()
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}
