//! Split-on-demand allocation and buddy-coalescing release.
//!
//! Both engines operate on a region the caller has already locked.

use std::ptr::NonNull;

use crate::error::ArenaError;
use crate::layout::{BLOCK_METADATA_SIZE, buddy_offset, size_of_exponent};
use crate::logging::LogSink;
use crate::region::{BlockMeta, Region};

/// Reserve a block for `size` payload bytes and return its payload pointer.
pub(crate) fn allocate(
    region: &mut Region,
    size: usize,
    log: &LogSink,
) -> Result<NonNull<u8>, ArenaError> {
    let required = size
        .checked_add(BLOCK_METADATA_SIZE)
        .ok_or(ArenaError::OutOfMemory { requested: size })?;
    let mode = region.fit_mode()?;
    log.debug(format_args!("searching {mode} for {required} bytes"));

    let candidate = mode
        .select(region.blocks(), required)
        .ok_or(ArenaError::OutOfMemory { requested: size })?;

    let offset = candidate.offset();
    let mut exponent = candidate.size_exponent();
    // Halve while the lower half still holds the request.
    while size_of_exponent(exponent) / 2 >= required {
        exponent -= 1;
        let upper = buddy_offset(offset, exponent);
        region.set_block_meta(offset, BlockMeta::free(exponent));
        region.set_block_meta(upper, BlockMeta::free(exponent));
        log.debug(format_args!(
            "split block at {offset} into 2 x {} bytes (buddy at {upper})",
            size_of_exponent(exponent)
        ));
    }

    region.set_block_meta(offset, BlockMeta::occupied(exponent));
    log.debug(format_args!(
        "reserved block at {offset} of {} bytes",
        size_of_exponent(exponent)
    ));
    Ok(region.payload_address(offset))
}

/// Free the block at `offset` and coalesce it with free buddies.
///
/// Returns the offset and exponent of the block that absorbed it.
pub(crate) fn release(region: &mut Region, offset: usize, log: &LogSink) -> (usize, u8) {
    let top = region.size_exponent();
    let mut offset = offset;
    let mut exponent = region.block_meta(offset).size_exponent;
    region.set_block_meta(offset, BlockMeta::free(exponent));

    while exponent < top {
        let buddy = buddy_offset(offset, exponent);
        let buddy_meta = region.block_meta(buddy);
        if buddy_meta.occupied || buddy_meta.size_exponent != exponent {
            break;
        }
        offset = offset.min(buddy);
        exponent += 1;
        region.set_block_meta(offset, BlockMeta::free(exponent));
        log.debug(format_args!(
            "merged buddies into block at {offset} of {} bytes",
            size_of_exponent(exponent)
        ));
    }

    (offset, exponent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::FitMode;
    use crate::layout::HEADER_SIZE;
    use crate::report::BlockReport;

    struct Fixture {
        _storage: Vec<u8>,
        region: Region,
    }

    fn fixture(size_exponent: u8, mode: FitMode) -> Fixture {
        let mut storage = vec![0_u8; HEADER_SIZE + size_of_exponent(size_exponent)];
        let base = NonNull::new(storage.as_mut_ptr()).unwrap();
        // SAFETY: the heap buffer of `storage` lives as long as the fixture.
        let mut region = unsafe { Region::from_raw(base, storage.len()) };
        region.initialize(size_exponent, mode);
        Fixture {
            _storage: storage,
            region,
        }
    }

    fn shape(region: &Region) -> Vec<(usize, bool)> {
        BlockReport::capture(region.blocks())
            .iter()
            .map(|block| (block.size, block.occupied))
            .collect()
    }

    #[test]
    fn splits_down_to_smallest_sufficient_block() {
        let mut fx = fixture(7, FitMode::FirstFit);
        let log = LogSink::default();
        let ptr = allocate(&mut fx.region, 8, &log).unwrap();

        assert_eq!(fx.region.block_offset_of(ptr), 0);
        assert_eq!(
            shape(&fx.region),
            vec![(16, true), (16, false), (32, false), (64, false)]
        );
    }

    #[test]
    fn exact_fit_is_not_split() {
        let mut fx = fixture(6, FitMode::FirstFit);
        let log = LogSink::default();
        allocate(&mut fx.region, 64 - BLOCK_METADATA_SIZE, &log).unwrap();
        assert_eq!(shape(&fx.region), vec![(64, true)]);
    }

    #[test]
    fn zero_byte_request_takes_minimal_block() {
        let mut fx = fixture(6, FitMode::FirstFit);
        let log = LogSink::default();
        allocate(&mut fx.region, 0, &log).unwrap();
        assert_eq!(shape(&fx.region), vec![(8, true), (8, false), (16, false), (32, false)]);
    }

    #[test]
    fn oversized_requests_fail() {
        let mut fx = fixture(5, FitMode::BestFit);
        let log = LogSink::default();
        assert_eq!(
            allocate(&mut fx.region, 32 - BLOCK_METADATA_SIZE + 1, &log),
            Err(ArenaError::OutOfMemory { requested: 25 })
        );
        assert_eq!(
            allocate(&mut fx.region, usize::MAX, &log),
            Err(ArenaError::OutOfMemory {
                requested: usize::MAX
            })
        );
        assert_eq!(shape(&fx.region), vec![(32, false)]);
    }

    #[test]
    fn release_coalesces_to_root() {
        let mut fx = fixture(7, FitMode::FirstFit);
        let log = LogSink::default();
        let a = allocate(&mut fx.region, 8, &log).unwrap();
        let b = allocate(&mut fx.region, 8, &log).unwrap();
        let offset_a = fx.region.block_offset_of(a);
        let offset_b = fx.region.block_offset_of(b);

        assert_eq!(release(&mut fx.region, offset_a, &log), (0, 4));
        assert_eq!(release(&mut fx.region, offset_b, &log), (0, 7));
        assert_eq!(shape(&fx.region), vec![(128, false)]);
    }

    #[test]
    fn release_stops_at_split_buddy() {
        let mut fx = fixture(7, FitMode::FirstFit);
        let log = LogSink::default();
        let small = allocate(&mut fx.region, 8, &log).unwrap();
        let large = allocate(&mut fx.region, 56, &log).unwrap();
        let large_offset = fx.region.block_offset_of(large);
        assert_eq!(large_offset, 64);

        // The buddy of the 64-byte block is still split, so nothing merges.
        assert_eq!(release(&mut fx.region, large_offset, &log), (64, 6));
        let small_offset = fx.region.block_offset_of(small);
        assert_eq!(release(&mut fx.region, small_offset, &log), (0, 7));
    }
}
