#![no_main]
use buddyalloc::{Arena, FitMode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // First byte picks the arena; the rest is 3-byte ops.
    let Some((&config, ops)) = data.split_first() else {
        return;
    };
    let size_exponent = 6 + config % 8;
    let mode = FitMode::ALL[usize::from(config >> 3) % 3];
    let Ok(arena) = Arena::new(size_exponent, None, None, mode) else {
        return;
    };
    let capacity = arena.capacity();
    let mut allocations = Vec::new();

    for chunk in ops.chunks_exact(3) {
        let arg = usize::from(u16::from_le_bytes([chunk[1], chunk[2]]));
        match chunk[0] % 4 {
            0 | 1 => {
                let size = arg % (capacity + 16);
                if let Ok(ptr) = arena.allocate(size) {
                    // SAFETY: `size` bytes were reserved at `ptr`.
                    unsafe { std::ptr::write_bytes(ptr.as_ptr(), chunk[0], size) };
                    allocations.push((ptr, size, chunk[0]));
                }
            }
            2 => {
                if !allocations.is_empty() {
                    let (ptr, size, tag) = allocations.swap_remove(arg % allocations.len());
                    // SAFETY: the block is live and holds `size` bytes of `tag`.
                    let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), size) };
                    assert!(bytes.iter().all(|&b| b == tag), "payload overwritten");
                    // SAFETY: removed from the live set, so released once.
                    unsafe { arena.deallocate(ptr) };
                }
            }
            _ => arena.set_fit_mode(FitMode::ALL[arg % 3]),
        }

        let report = arena.block_report();
        let mut cursor = 0;
        for block in report.iter() {
            assert_eq!(block.offset, cursor, "blocks overlap or leave a gap");
            assert_eq!(block.offset % block.size, 0, "block not aligned to its size");
            cursor += block.size;
        }
        assert_eq!(cursor, capacity, "block sizes do not sum to capacity");
        assert_eq!(
            report.iter().filter(|b| b.occupied).count(),
            allocations.len()
        );
    }

    for (ptr, _, _) in allocations {
        // SAFETY: every remaining pointer is live.
        unsafe { arena.deallocate(ptr) };
    }
    assert_eq!(arena.block_report().len(), 1, "arena did not coalesce");
});
