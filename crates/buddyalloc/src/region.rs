//! Checked byte view over an arena buffer.
//!
//! All reads and writes of header and block metadata go through [`Region`],
//! one byte at a time at offsets taken from [`crate::layout`]. Payload bytes
//! are never touched except by [`Region::payload_bytes`] for diagnostics.

#![allow(unsafe_code)]

use std::ptr::NonNull;

use crate::error::ArenaError;
use crate::fit::FitMode;
use crate::iter::Blocks;
use crate::layout::{
    BLOCK_METADATA_SIZE, Field, HEADER_SIZE, OCCUPIED_FLAG, block, header, size_of_exponent,
};

/// Decoded per-block metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockMeta {
    pub(crate) occupied: bool,
    pub(crate) size_exponent: u8,
}

impl BlockMeta {
    pub(crate) const fn free(size_exponent: u8) -> Self {
        Self {
            occupied: false,
            size_exponent,
        }
    }

    pub(crate) const fn occupied(size_exponent: u8) -> Self {
        Self {
            occupied: true,
            size_exponent,
        }
    }
}

/// Exclusive view over one arena buffer.
pub(crate) struct Region {
    base: NonNull<u8>,
    len: usize,
}

// SAFETY: `Region` is the sole owner of its buffer; moving it to another
// thread moves that ownership. Shared access is mediated by the arena mutex.
unsafe impl Send for Region {}

impl Region {
    /// Wrap a raw buffer.
    ///
    /// # Safety
    ///
    /// `base` must be valid for reads and writes of `len` bytes for as long
    /// as the returned `Region` exists, and nothing else may access the
    /// header or block metadata bytes during that time.
    pub(crate) unsafe fn from_raw(base: NonNull<u8>, len: usize) -> Self {
        Self { base, len }
    }

    pub(crate) fn base(&self) -> NonNull<u8> {
        self.base
    }

    fn read_u8(&self, offset: usize) -> u8 {
        assert!(offset < self.len, "region read at {offset} out of bounds");
        // SAFETY: bounds checked above; `from_raw` guarantees validity.
        unsafe { self.base.as_ptr().add(offset).read() }
    }

    fn write_u8(&mut self, offset: usize, value: u8) {
        assert!(offset < self.len, "region write at {offset} out of bounds");
        // SAFETY: bounds checked above; `from_raw` guarantees validity.
        unsafe { self.base.as_ptr().add(offset).write(value) }
    }

    fn block_field_offset(&self, block_offset: usize, field: Field) -> usize {
        HEADER_SIZE + block_offset + field.offset
    }

    /// Write a fresh header and a single free root block spanning the area.
    pub(crate) fn initialize(&mut self, size_exponent: u8, fit_mode: FitMode) {
        debug_assert_eq!(self.len, HEADER_SIZE + size_of_exponent(size_exponent));
        for offset in header::RESERVED.offset..header::RESERVED.end() {
            self.write_u8(offset, 0);
        }
        self.write_u8(header::SIZE_EXPONENT.offset, size_exponent);
        self.set_fit_mode(fit_mode);
        self.set_block_meta(0, BlockMeta::free(size_exponent));
    }

    pub(crate) fn size_exponent(&self) -> u8 {
        self.read_u8(header::SIZE_EXPONENT.offset)
    }

    /// Bytes in the block area (`2^k`).
    pub(crate) fn capacity(&self) -> usize {
        size_of_exponent(self.size_exponent())
    }

    /// Decode the stored fit mode.
    pub(crate) fn fit_mode(&self) -> Result<FitMode, ArenaError> {
        let tag = self.read_u8(header::FIT_MODE.offset);
        FitMode::try_from(tag).map_err(ArenaError::InvalidFitMode)
    }

    pub(crate) fn set_fit_mode(&mut self, mode: FitMode) {
        self.write_u8(header::FIT_MODE.offset, mode.as_u8());
    }

    pub(crate) fn block_meta(&self, block_offset: usize) -> BlockMeta {
        let state = self.read_u8(self.block_field_offset(block_offset, block::STATE));
        let size_exponent =
            self.read_u8(self.block_field_offset(block_offset, block::SIZE_EXPONENT));
        BlockMeta {
            occupied: state & OCCUPIED_FLAG != 0,
            size_exponent,
        }
    }

    pub(crate) fn set_block_meta(&mut self, block_offset: usize, meta: BlockMeta) {
        let state = if meta.occupied { OCCUPIED_FLAG } else { 0 };
        let state_at = self.block_field_offset(block_offset, block::STATE);
        let exponent_at = self.block_field_offset(block_offset, block::SIZE_EXPONENT);
        self.write_u8(state_at, state);
        self.write_u8(exponent_at, meta.size_exponent);
    }

    /// Address of the block starting at `block_offset`.
    pub(crate) fn block_address(&self, block_offset: usize) -> NonNull<u8> {
        let offset = HEADER_SIZE + block_offset;
        assert!(offset <= self.len, "block offset {block_offset} out of bounds");
        // SAFETY: in bounds of (or one past) the owned buffer.
        unsafe { self.base.add(offset) }
    }

    /// Pointer handed to callers for the block at `block_offset`.
    pub(crate) fn payload_address(&self, block_offset: usize) -> NonNull<u8> {
        let offset = HEADER_SIZE + block_offset + BLOCK_METADATA_SIZE;
        assert!(offset <= self.len, "block offset {block_offset} out of bounds");
        // SAFETY: in bounds of (or one past) the owned buffer.
        unsafe { self.base.add(offset) }
    }

    /// Recover the block offset from a pointer produced by [`Self::payload_address`].
    pub(crate) fn block_offset_of(&self, payload: NonNull<u8>) -> usize {
        let base = self.base.as_ptr().addr();
        let addr = payload.as_ptr().addr();
        debug_assert!(
            addr >= base + HEADER_SIZE + BLOCK_METADATA_SIZE && addr <= base + self.len,
            "pointer {payload:p} does not belong to this arena"
        );
        addr.wrapping_sub(base + HEADER_SIZE + BLOCK_METADATA_SIZE)
    }

    /// Payload bytes of the block at `block_offset`.
    ///
    /// Callers must hold the only outstanding handle to that payload.
    pub(crate) fn payload_bytes(&self, block_offset: usize) -> &[u8] {
        let meta = self.block_meta(block_offset);
        let start = HEADER_SIZE + block_offset + BLOCK_METADATA_SIZE;
        let len = size_of_exponent(meta.size_exponent).saturating_sub(BLOCK_METADATA_SIZE);
        assert!(start + len <= self.len, "payload out of bounds");
        // SAFETY: range checked above; the caller owns the payload.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr().add(start), len) }
    }

    /// Forward cursor over every block, in address order.
    pub(crate) fn blocks(&self) -> Blocks<'_> {
        Blocks::new(self)
    }
}
