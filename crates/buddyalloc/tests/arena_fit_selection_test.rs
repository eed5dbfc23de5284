use buddyalloc::{Arena, FitMode};
use std::ptr::NonNull;

struct Mixed {
    arena: Arena,
    a: NonNull<u8>,
    c: NonNull<u8>,
    d: NonNull<u8>,
    kept: Vec<NonNull<u8>>,
}

/// Leave free blocks of 32 bytes at 0, 64 at 64 and 16 at 128 in a
/// 256-byte arena; everything else is occupied.
fn mixed_layout() -> Mixed {
    let arena = Arena::new(8, None, None, FitMode::FirstFit).unwrap();
    let a = arena.allocate(24).unwrap();
    let b = arena.allocate(24).unwrap();
    let c = arena.allocate(56).unwrap();
    let d = arena.allocate(8).unwrap();
    let e = arena.allocate(8).unwrap();
    let f = arena.allocate(24).unwrap();
    let g = arena.allocate(56).unwrap();
    assert!(arena.allocate(0).is_err(), "arena should be full");

    // SAFETY: a, c and d came from this arena and are freed once.
    unsafe {
        arena.deallocate(a);
        arena.deallocate(c);
        arena.deallocate(d);
    }
    assert_eq!(
        arena.block_report().to_string(),
        "<free> <32> | <occupied> <32> | <free> <64> | <free> <16> | \
         <occupied> <16> | <occupied> <32> | <occupied> <64> | "
    );

    Mixed {
        arena,
        a,
        c,
        d,
        kept: vec![b, e, f, g],
    }
}

impl Drop for Mixed {
    fn drop(&mut self) {
        for ptr in self.kept.drain(..) {
            // SAFETY: the kept pointers are still live in this arena.
            unsafe { self.arena.deallocate(ptr) };
        }
    }
}

#[test]
fn first_fit_takes_lowest_address() {
    let fx = mixed_layout();
    fx.arena.set_fit_mode(FitMode::FirstFit);
    let ptr = fx.arena.allocate(8).unwrap();
    assert_eq!(ptr, fx.a);
    // SAFETY: `ptr` came from this arena.
    unsafe { fx.arena.deallocate(ptr) };
}

#[test]
fn best_fit_takes_smallest_sufficient_block() {
    let fx = mixed_layout();
    fx.arena.set_fit_mode(FitMode::BestFit);
    let ptr = fx.arena.allocate(8).unwrap();
    assert_eq!(ptr, fx.d);
    // SAFETY: `ptr` came from this arena.
    unsafe { fx.arena.deallocate(ptr) };
}

#[test]
fn worst_fit_takes_largest_block() {
    let fx = mixed_layout();
    fx.arena.set_fit_mode(FitMode::WorstFit);
    let ptr = fx.arena.allocate(8).unwrap();
    assert_eq!(ptr, fx.c);
    // SAFETY: `ptr` came from this arena.
    unsafe { fx.arena.deallocate(ptr) };
}

#[test]
fn strategies_agree_when_only_one_block_fits() {
    for mode in FitMode::ALL {
        let fx = mixed_layout();
        fx.arena.set_fit_mode(mode);
        // Needs 64 bytes with metadata; only the block at 64 qualifies.
        let ptr = fx.arena.allocate(56).unwrap();
        assert_eq!(ptr, fx.c, "mode={mode}");
        assert!(fx.arena.allocate(56).unwrap_err().is_out_of_memory());
        // SAFETY: `ptr` came from this arena.
        unsafe { fx.arena.deallocate(ptr) };
    }
}

#[test]
fn equal_sizes_resolve_to_lowest_address() {
    for mode in FitMode::ALL {
        let arena = Arena::new(7, None, None, mode).unwrap();
        let mut blocks: Vec<_> = (0..4).map(|_| arena.allocate(24).unwrap()).collect();
        blocks.sort_by_key(|ptr| ptr.as_ptr().addr());
        // SAFETY: all four are live. Freeing the blocks at 32 and 96 leaves
        // two equal free blocks whose buddies are occupied.
        unsafe {
            arena.deallocate(blocks[3]);
            arena.deallocate(blocks[1]);
        }
        let ptr = arena.allocate(24).unwrap();
        assert_eq!(ptr, blocks[1], "mode={mode}");

        // SAFETY: remaining pointers are live.
        unsafe {
            arena.deallocate(ptr);
            arena.deallocate(blocks[0]);
            arena.deallocate(blocks[2]);
        }
        assert_eq!(arena.block_report().len(), 1);
    }
}
