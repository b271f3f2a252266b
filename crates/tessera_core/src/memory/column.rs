//! # Column Buffers
//!
//! Untyped, growable storage for one field of one schema.
//!
//! A column is a run of fixed-size items backed by 16-byte aligned blocks.
//! Typed access is a bytemuck cast over the live prefix, so any `Pod`
//! field whose alignment fits the block alignment can be viewed in place.

use bytemuck::{Pod, Zeroable};

use crate::error::{StoreError, StoreResult};

/// Size in bytes of one backing block.
const BLOCK_SIZE: usize = 16;

/// Largest field alignment a column can honour.
pub const MAX_FIELD_ALIGN: usize = 16;

/// Backing unit of every column. Its alignment is what makes typed casts legal.
#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C, align(16))]
struct Block([u8; BLOCK_SIZE]);

/// A growable buffer of fixed-size items addressed by slot index.
///
/// The buffer tracks its capacity in items, not bytes. All growth is
/// explicit: callers decide the policy and hand the buffer a target
/// through [`reserve`](Self::reserve), [`grow_by`](Self::grow_by) or
/// [`shrink_to`](Self::shrink_to). Newly reserved items are zeroed.
///
/// # Example
///
/// ```rust,ignore
/// let mut column = ColumnBuffer::new(std::mem::size_of::<f32>());
/// column.reserve(8);
/// column.write(0, 1.5f32)?;
/// assert_eq!(column.as_slice::<f32>(1)?, &[1.5]);
/// ```
#[derive(Clone)]
pub struct ColumnBuffer {
    blocks: Vec<Block>,
    item_size: usize,
    capacity: usize,
}

impl ColumnBuffer {
    /// Creates an empty column for items of `item_size` bytes.
    #[must_use]
    pub const fn new(item_size: usize) -> Self {
        Self {
            blocks: Vec::new(),
            item_size,
            capacity: 0,
        }
    }

    /// Creates a column with room for `capacity` items.
    #[must_use]
    pub fn with_capacity(item_size: usize, capacity: usize) -> Self {
        let mut column = Self::new(item_size);
        column.reserve(capacity);
        column
    }

    /// Size of one item in bytes.
    #[inline]
    #[must_use]
    pub const fn item_size(&self) -> usize {
        self.item_size
    }

    /// Number of items the column can hold without growing.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently held by the backing allocation.
    #[must_use]
    pub fn allocated_bytes(&self) -> usize {
        self.blocks.capacity() * BLOCK_SIZE
    }

    #[inline]
    fn blocks_for(&self, capacity: usize) -> usize {
        (capacity * self.item_size).div_ceil(BLOCK_SIZE)
    }

    /// Ensures room for at least `capacity` items, allocating exactly.
    pub fn reserve(&mut self, capacity: usize) {
        if capacity <= self.capacity {
            return;
        }
        let needed = self.blocks_for(capacity);
        if needed > self.blocks.len() {
            self.blocks.reserve_exact(needed - self.blocks.len());
            self.blocks.resize(needed, Block::zeroed());
        }
        self.capacity = capacity;
    }

    /// Grows the capacity by `additional` items.
    pub fn grow_by(&mut self, additional: usize) {
        self.reserve(self.capacity + additional);
    }

    /// Reduces the capacity to `capacity` items, releasing memory.
    ///
    /// Items at or past `capacity` are discarded. Does nothing when the
    /// column is already at or below the target.
    pub fn shrink_to(&mut self, capacity: usize) {
        if capacity >= self.capacity {
            return;
        }
        let needed = self.blocks_for(capacity);
        self.blocks.truncate(needed);
        self.blocks.shrink_to_fit();
        self.capacity = capacity;
    }

    /// Raw bytes of the first `len` items.
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds the capacity.
    #[inline]
    #[must_use]
    pub fn bytes(&self, len: usize) -> &[u8] {
        &bytemuck::cast_slice::<Block, u8>(&self.blocks)[..len * self.item_size]
    }

    /// Mutable raw bytes of the first `len` items.
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds the capacity.
    #[inline]
    pub fn bytes_mut(&mut self, len: usize) -> &mut [u8] {
        let end = len * self.item_size;
        &mut bytemuck::cast_slice_mut::<Block, u8>(&mut self.blocks)[..end]
    }

    #[inline]
    fn check_item<T: Pod>(&self) -> StoreResult<()> {
        let actual = std::mem::size_of::<T>();
        if actual == self.item_size {
            Ok(())
        } else {
            Err(StoreError::FieldSizeMismatch {
                field: std::any::type_name::<T>(),
                expected: self.item_size,
                actual,
            })
        }
    }

    /// Views the first `len` items as `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if `T` does not have the column's item size or
    /// cannot be cast from the backing bytes.
    #[inline]
    pub fn as_slice<T: Pod>(&self, len: usize) -> StoreResult<&[T]> {
        self.check_item::<T>()?;
        Ok(bytemuck::try_cast_slice(self.bytes(len))?)
    }

    /// Mutably views the first `len` items as `T`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`as_slice`](Self::as_slice).
    #[inline]
    pub fn as_mut_slice<T: Pod>(&mut self, len: usize) -> StoreResult<&mut [T]> {
        self.check_item::<T>()?;
        Ok(bytemuck::try_cast_slice_mut(self.bytes_mut(len))?)
    }

    /// Writes `value` into slot `index`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`as_slice`](Self::as_slice).
    #[inline]
    pub fn write<T: Pod>(&mut self, index: usize, value: T) -> StoreResult<()> {
        self.as_mut_slice::<T>(index + 1)?[index] = value;
        Ok(())
    }

    /// Zeroes the item in slot `index`.
    #[inline]
    pub fn zero(&mut self, index: usize) {
        let size = self.item_size;
        self.bytes_mut(index + 1)[index * size..].fill(0);
    }

    /// Copies the item in slot `src` over the item in slot `dst`.
    #[inline]
    pub fn copy_within(&mut self, src: usize, dst: usize) {
        if src == dst {
            return;
        }
        let size = self.item_size;
        let end = src.max(dst) + 1;
        self.bytes_mut(end)
            .copy_within(src * size..(src + 1) * size, dst * size);
    }

    /// Copies slot `src` of another column of the same item size into slot `dst`.
    #[inline]
    pub fn copy_from(&mut self, dst: usize, other: &Self, src: usize) {
        debug_assert_eq!(self.item_size, other.item_size);
        let size = self.item_size;
        let from = &other.bytes(src + 1)[src * size..];
        self.bytes_mut(dst + 1)[dst * size..].copy_from_slice(from);
    }
}

impl std::fmt::Debug for ColumnBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnBuffer")
            .field("item_size", &self.item_size)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_and_shrink() {
        let mut column = ColumnBuffer::new(4);
        assert_eq!(column.capacity(), 0);

        column.reserve(10);
        assert_eq!(column.capacity(), 10);
        assert!(column.allocated_bytes() >= 40);

        column.grow_by(5);
        assert_eq!(column.capacity(), 15);

        column.shrink_to(3);
        assert_eq!(column.capacity(), 3);

        // Shrinking never grows.
        column.shrink_to(8);
        assert_eq!(column.capacity(), 3);
    }

    #[test]
    fn test_typed_roundtrip() {
        let mut column = ColumnBuffer::with_capacity(4, 4);
        for i in 0..4u32 {
            column.write(i as usize, i * 10).unwrap();
        }
        assert_eq!(column.as_slice::<u32>(4).unwrap(), &[0, 10, 20, 30]);
        assert_eq!(column.as_slice::<f32>(0).unwrap().len(), 0);
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let column = ColumnBuffer::with_capacity(4, 1);
        let err = column.as_slice::<u64>(1).unwrap_err();
        assert!(matches!(
            err,
            StoreError::FieldSizeMismatch { expected: 4, actual: 8, .. }
        ));
    }

    #[test]
    fn test_copy_within_and_zero() {
        let mut column = ColumnBuffer::with_capacity(8, 3);
        column.write(0, 1u64).unwrap();
        column.write(1, 2u64).unwrap();
        column.write(2, 3u64).unwrap();

        column.copy_within(2, 0);
        column.zero(1);
        assert_eq!(column.as_slice::<u64>(3).unwrap(), &[3, 0, 3]);
    }

    #[test]
    fn test_copy_from_other_column() {
        let mut a = ColumnBuffer::with_capacity(2, 2);
        let mut b = ColumnBuffer::with_capacity(2, 2);
        a.write(1, 0xBEEFu16).unwrap();
        b.copy_from(0, &a, 1);
        assert_eq!(b.as_slice::<u16>(1).unwrap(), &[0xBEEF]);
    }

    #[test]
    fn test_aligned_items() {
        #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
        #[repr(C, align(16))]
        struct Wide([f32; 4]);

        let mut column = ColumnBuffer::with_capacity(16, 2);
        column.write(1, Wide([1.0, 2.0, 3.0, 4.0])).unwrap();
        assert_eq!(column.as_slice::<Wide>(2).unwrap()[1], Wide([1.0, 2.0, 3.0, 4.0]));
        assert_eq!(column.as_slice::<Wide>(2).unwrap()[0].0, [0.0; 4]);
    }
}
