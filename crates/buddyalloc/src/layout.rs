//! Byte layout of an arena buffer.
//!
//! An arena buffer is a fixed header followed by the block area:
//!
//! ```text
//!   base                base + HEADER_SIZE                    base + HEADER_SIZE + 2^k
//!   │                   │                                     │
//!   ▼                   ▼                                     ▼
//!   ┌───────────────────┬───────────────┬─────────┬───────────┐
//!   │ header (16 bytes) │ block         │ block   │ ...       │
//!   └───────────────────┴───────────────┴─────────┴───────────┘
//!                       │ meta (8) │ payload ...  │
//! ```
//!
//! Every offset the arena touches is derived from the [`Field`] tables below,
//! never recomputed at call sites. Offsets inside a block are relative to the
//! block's own start; block offsets are relative to the start of the block
//! area (`base + HEADER_SIZE`).

/// A named header or metadata field with a fixed byte width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Field name, used in diagnostics.
    pub name: &'static str,
    /// Byte offset from the start of the enclosing record.
    pub offset: usize,
    /// Width in bytes.
    pub width: usize,
}

impl Field {
    const fn first(name: &'static str, width: usize) -> Self {
        Self {
            name,
            offset: 0,
            width,
        }
    }

    const fn after(prev: Self, name: &'static str, width: usize) -> Self {
        Self {
            name,
            offset: prev.end(),
            width,
        }
    }

    /// Offset one past the last byte of this field.
    #[must_use]
    pub const fn end(self) -> usize {
        self.offset + self.width
    }
}

/// Arena header fields.
pub mod header {
    use super::Field;

    /// Size exponent `k` of the block area (`2^k` bytes).
    pub const SIZE_EXPONENT: Field = Field::first("size_exponent", 1);
    /// Encoded [`FitMode`](crate::FitMode) tag.
    pub const FIT_MODE: Field = Field::after(SIZE_EXPONENT, "fit_mode", 1);
    /// Padding that keeps the block area aligned to [`ARENA_ALIGN`](super::ARENA_ALIGN).
    pub const RESERVED: Field = Field::after(FIT_MODE, "reserved", 14);

    /// All header fields in storage order.
    pub const FIELDS: [Field; 3] = [SIZE_EXPONENT, FIT_MODE, RESERVED];
}

/// Per-block metadata fields.
pub mod block {
    use super::Field;

    /// State flags; bit 0 is [`OCCUPIED_FLAG`](super::OCCUPIED_FLAG).
    pub const STATE: Field = Field::first("state", 1);
    /// Block size exponent (`2^e` bytes including metadata).
    pub const SIZE_EXPONENT: Field = Field::after(STATE, "size_exponent", 1);
    /// Padding that keeps payloads word aligned.
    pub const RESERVED: Field = Field::after(SIZE_EXPONENT, "reserved", 6);

    /// All block metadata fields in storage order.
    pub const FIELDS: [Field; 3] = [STATE, SIZE_EXPONENT, RESERVED];
}

/// Size of the arena header in bytes.
pub const HEADER_SIZE: usize = header::RESERVED.end();

/// Metadata bytes at the start of every block, added to every request.
pub const BLOCK_METADATA_SIZE: usize = block::RESERVED.end();

/// Alignment requested for the whole arena buffer.
pub const ARENA_ALIGN: usize = 16;

/// Smallest payload the smallest legal arena must be able to hold.
pub const MIN_PAYLOAD: usize = 8;

/// Smallest accepted size exponent: one [`MIN_PAYLOAD`] plus its metadata.
pub const MIN_SIZE_EXPONENT: u8 = (MIN_PAYLOAD + BLOCK_METADATA_SIZE).trailing_zeros() as u8;

/// Largest accepted size exponent; keeps `2^k + HEADER_SIZE` a valid layout size.
pub const MAX_SIZE_EXPONENT: u8 = (usize::BITS - 2) as u8;

/// Bit in [`block::STATE`] marking an occupied block.
pub const OCCUPIED_FLAG: u8 = 0b0000_0001;

const _: () = assert!(HEADER_SIZE == 16);
const _: () = assert!(HEADER_SIZE % ARENA_ALIGN == 0);
const _: () = assert!(BLOCK_METADATA_SIZE == 8);
const _: () = assert!((MIN_PAYLOAD + BLOCK_METADATA_SIZE).is_power_of_two());
const _: () = assert!(header::SIZE_EXPONENT.width == 1 && header::FIT_MODE.width == 1);
const _: () = assert!(block::STATE.width == 1 && block::SIZE_EXPONENT.width == 1);

/// Byte size of a block (or arena) with the given exponent.
#[must_use]
pub const fn size_of_exponent(exponent: u8) -> usize {
    1_usize << exponent
}

/// Offset of the buddy of the block at `offset` with the given exponent.
///
/// Offsets are relative to the block area, so the buddy differs from the
/// block in exactly bit `exponent`.
#[must_use]
pub const fn buddy_offset(offset: usize, exponent: u8) -> usize {
    offset ^ size_of_exponent(exponent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_contiguous(fields: &[Field], total: usize) {
        let mut cursor = 0;
        for field in fields {
            assert_eq!(field.offset, cursor, "field {} has a gap", field.name);
            cursor = field.end();
        }
        assert_eq!(cursor, total);
    }

    #[test]
    fn header_fields_are_contiguous() {
        assert_contiguous(&header::FIELDS, HEADER_SIZE);
    }

    #[test]
    fn block_fields_are_contiguous() {
        assert_contiguous(&block::FIELDS, BLOCK_METADATA_SIZE);
    }

    #[test]
    fn min_exponent_holds_min_payload() {
        assert_eq!(MIN_SIZE_EXPONENT, 4);
        assert!(size_of_exponent(MIN_SIZE_EXPONENT) >= MIN_PAYLOAD + BLOCK_METADATA_SIZE);
    }

    #[test]
    fn max_exponent_fits_layout() {
        let size = size_of_exponent(MAX_SIZE_EXPONENT) + HEADER_SIZE;
        assert!(std::alloc::Layout::from_size_align(size, ARENA_ALIGN).is_ok());
    }

    #[test]
    fn buddy_offsets_flip_one_bit() {
        assert_eq!(buddy_offset(0, 4), 16);
        assert_eq!(buddy_offset(16, 4), 0);
        assert_eq!(buddy_offset(64, 5), 96);
        assert_eq!(buddy_offset(96, 5), 64);
        assert_eq!(buddy_offset(128, 7), 0);
    }
}
