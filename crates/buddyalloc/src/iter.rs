//! Forward cursor over the blocks of an arena.
//!
//! [`Blocks`] borrows the locked region, so it cannot outlive the lock guard
//! and no split or merge can run while a cursor is alive. Cursors taken under
//! one lock acquisition are meaningless under the next; re-derive them.

use std::iter::FusedIterator;
use std::ptr::NonNull;

use crate::layout::{BLOCK_METADATA_SIZE, buddy_offset, size_of_exponent};
use crate::region::Region;

/// Point-in-time view of a single block.
///
/// Two views are equal iff they refer to the same address.
#[derive(Debug, Clone, Copy)]
pub struct BlockView {
    offset: usize,
    address: NonNull<u8>,
    size_exponent: u8,
    occupied: bool,
}

impl BlockView {
    /// Offset of the block from the start of the block area.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Address of the block (its metadata, not its payload).
    #[must_use]
    pub fn address(&self) -> NonNull<u8> {
        self.address
    }

    #[must_use]
    pub fn size_exponent(&self) -> u8 {
        self.size_exponent
    }

    /// Block size in bytes, metadata included.
    #[must_use]
    pub fn size(&self) -> usize {
        size_of_exponent(self.size_exponent)
    }

    #[must_use]
    pub fn is_occupied(&self) -> bool {
        self.occupied
    }

    #[must_use]
    pub fn is_free(&self) -> bool {
        !self.occupied
    }

    /// Usable bytes behind the payload pointer.
    #[must_use]
    pub fn payload_capacity(&self) -> usize {
        self.size() - BLOCK_METADATA_SIZE
    }

    /// Offset of this block's buddy.
    #[must_use]
    pub fn buddy_offset(&self) -> usize {
        buddy_offset(self.offset, self.size_exponent)
    }
}

impl PartialEq for BlockView {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for BlockView {}

/// Lazy iterator over blocks from the first block to the end sentinel.
#[derive(Clone)]
pub struct Blocks<'a> {
    region: &'a Region,
    cursor: usize,
    end: usize,
}

impl<'a> Blocks<'a> {
    pub(crate) fn new(region: &'a Region) -> Self {
        Self {
            region,
            cursor: 0,
            end: region.capacity(),
        }
    }

    /// View of the block at `offset`, if a block starts there.
    ///
    /// Only offsets reached by walking from the start are block starts; this
    /// walks the prefix to check.
    #[must_use]
    pub fn find(&self, offset: usize) -> Option<BlockView> {
        Blocks::new(self.region)
            .take_while(|view| view.offset <= offset)
            .find(|view| view.offset == offset)
    }
}

impl Iterator for Blocks<'_> {
    type Item = BlockView;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.end {
            return None;
        }
        let meta = self.region.block_meta(self.cursor);
        let view = BlockView {
            offset: self.cursor,
            address: self.region.block_address(self.cursor),
            size_exponent: meta.size_exponent,
            occupied: meta.occupied,
        };
        self.cursor += view.size();
        Some(view)
    }
}

impl FusedIterator for Blocks<'_> {}

impl std::fmt::Debug for Blocks<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blocks")
            .field("cursor", &self.cursor)
            .field("end", &self.end)
            .finish()
    }
}
