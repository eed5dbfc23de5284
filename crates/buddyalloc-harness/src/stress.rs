//! Multi-threaded randomized alloc/free against one shared arena.
//!
//! Every worker fills its payloads with a tag byte and checks the tag before
//! releasing, so any overlap between live blocks shows up as corruption.

use std::ptr::NonNull;
use std::sync::Arc;
use std::time::Instant;

use buddyalloc::{Arena, ArenaError, FitMode, Logger};
use serde::{Deserialize, Serialize};

use crate::error::ScenarioError;

/// Deterministic xorshift64* generator.
#[derive(Clone, Copy, Debug)]
pub(crate) struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    pub(crate) fn new(seed: u64) -> Self {
        // Zero is a fixed point of xorshift.
        Self {
            state: if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed },
        }
    }

    pub(crate) fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    pub(crate) fn gen_range(&mut self, low: usize, high_inclusive: usize) -> usize {
        let span = (high_inclusive - low) as u64 + 1;
        low + (self.next_u64() % span) as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StressConfig {
    pub size_exponent: u8,
    pub fit_mode: FitMode,
    pub seed: u64,
    /// Operations per thread.
    pub steps: usize,
    pub threads: usize,
    /// Largest payload requested.
    pub max_request: usize,
    /// Live allocations a worker holds before it must free.
    pub max_live: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            size_exponent: 16,
            fit_mode: FitMode::FirstFit,
            seed: 0xDEAD_BEEF,
            steps: 10_000,
            threads: 4,
            max_request: 512,
            max_live: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StressReport {
    pub config: StressConfig,
    pub allocations: u64,
    /// Requests refused with out-of-memory.
    pub refused: u64,
    pub deallocations: u64,
    pub peak_occupied_bytes: usize,
    pub final_block_count: usize,
    /// Whether the arena returned to one free block.
    pub coalesced: bool,
    pub elapsed_ms: u64,
}

#[derive(Debug, Default)]
struct WorkerStats {
    allocations: u64,
    refused: u64,
    deallocations: u64,
    peak_occupied_bytes: usize,
}

struct Slot {
    ptr: NonNull<u8>,
    size: usize,
    tag: u8,
}

/// Run `config.threads` workers against one arena and summarize.
pub fn run_stress(
    config: &StressConfig,
    logger: Option<Arc<dyn Logger>>,
) -> Result<StressReport, ScenarioError> {
    let arena = Arena::new(config.size_exponent, None, logger, config.fit_mode).map_err(
        |source: ArenaError| ScenarioError::Arena {
            case: "stress".to_string(),
            source,
        },
    )?;

    let started = Instant::now();
    let outcomes: Vec<Result<WorkerStats, ScenarioError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..config.threads)
            .map(|thread| {
                let arena = &arena;
                scope.spawn(move || worker(arena, thread, config))
            })
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(thread, handle)| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(ScenarioError::WorkerPanicked { thread }))
            })
            .collect()
    });
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let mut total = WorkerStats::default();
    for outcome in outcomes {
        let stats = outcome?;
        total.allocations += stats.allocations;
        total.refused += stats.refused;
        total.deallocations += stats.deallocations;
        total.peak_occupied_bytes = total.peak_occupied_bytes.max(stats.peak_occupied_bytes);
    }

    let report = arena.block_report();
    Ok(StressReport {
        config: config.clone(),
        allocations: total.allocations,
        refused: total.refused,
        deallocations: total.deallocations,
        peak_occupied_bytes: total.peak_occupied_bytes,
        final_block_count: report.len(),
        coalesced: report.len() == 1 && report.occupied_bytes() == 0,
        elapsed_ms,
    })
}

#[allow(unsafe_code)]
fn worker(arena: &Arena, thread: usize, config: &StressConfig) -> Result<WorkerStats, ScenarioError> {
    let mut rng = XorShift64::new(
        config.seed ^ (thread as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15),
    );
    let mut live: Vec<Slot> = Vec::with_capacity(config.max_live);
    let mut stats = WorkerStats::default();

    for step in 0..config.steps {
        let must_free = live.len() >= config.max_live.max(1);
        if !live.is_empty() && (must_free || rng.next_u64() & 1 == 0) {
            let slot = live.swap_remove(rng.gen_range(0, live.len() - 1));
            stats.deallocations += 1;
            if let Err(err) = retire(arena, slot, thread, step) {
                release_all(arena, &mut live);
                return Err(err);
            }
        } else {
            let size = rng.gen_range(0, config.max_request);
            match arena.allocate(size) {
                Ok(ptr) => {
                    let tag = (thread as u8).wrapping_mul(31).wrapping_add(step as u8) | 1;
                    // SAFETY: `size` bytes were just reserved at `ptr`.
                    unsafe { std::ptr::write_bytes(ptr.as_ptr(), tag, size) };
                    live.push(Slot { ptr, size, tag });
                    stats.allocations += 1;
                }
                Err(err) if err.is_out_of_memory() => stats.refused += 1,
                Err(source) => {
                    release_all(arena, &mut live);
                    return Err(ScenarioError::Arena {
                        case: format!("stress thread {thread}"),
                        source,
                    });
                }
            }
        }

        if step % 64 == 0 {
            let occupied = arena.block_report().occupied_bytes();
            stats.peak_occupied_bytes = stats.peak_occupied_bytes.max(occupied);
        }
    }

    while let Some(slot) = live.pop() {
        stats.deallocations += 1;
        if let Err(err) = retire(arena, slot, thread, config.steps) {
            release_all(arena, &mut live);
            return Err(err);
        }
    }
    Ok(stats)
}

/// Check a slot's tag bytes, then return it to the arena either way.
#[allow(unsafe_code)]
fn retire(arena: &Arena, slot: Slot, thread: usize, step: usize) -> Result<(), ScenarioError> {
    // SAFETY: `slot.size` bytes at `slot.ptr` are reserved for this worker
    // and were filled with `slot.tag`.
    let bytes = unsafe { std::slice::from_raw_parts(slot.ptr.as_ptr(), slot.size) };
    let intact = bytes.iter().all(|&b| b == slot.tag);
    // SAFETY: the slot came from `arena.allocate` and the caller gave up its
    // only copy, so it is released once.
    unsafe { arena.deallocate(slot.ptr) };
    if intact {
        Ok(())
    } else {
        Err(ScenarioError::Corruption {
            thread,
            step,
            size: slot.size,
        })
    }
}

/// Return every slot still in `live` to the arena.
#[allow(unsafe_code)]
fn release_all(arena: &Arena, live: &mut Vec<Slot>) {
    for slot in live.drain(..) {
        // SAFETY: slots in `live` are outstanding allocations of `arena`.
        unsafe { arena.deallocate(slot.ptr) };
    }
}
