//! buddyalloc: a fixed-capacity buddy-system arena allocator.
//!
//! An [`Arena`] owns one buffer of `2^k` bytes (plus a small header) and
//! carves it into power-of-two blocks. Allocation picks a free block with a
//! [`FitMode`] strategy and splits it in halves until the next half would be
//! too small; deallocation marks the block free and merges it with its buddy
//! (the block at `offset XOR size`) for as long as the buddy is free and the
//! same size.
//!
//! ```
//! use buddyalloc::{Arena, FitMode};
//!
//! let arena = Arena::new(10, None, None, FitMode::BestFit).unwrap();
//! let ptr = arena.allocate(100).unwrap();
//! assert_eq!(arena.block_report().to_string(),
//!     "<occupied> <128> | <free> <128> | <free> <256> | <free> <512> | ");
//!
//! // SAFETY: `ptr` came from this arena.
//! unsafe { arena.deallocate(ptr) };
//! assert_eq!(arena.block_report().len(), 1);
//! ```
//!
//! All operations serialize on one mutex per arena. Layout constants are
//! documented in [`layout`].

mod arena;
pub mod config;
mod engine;
mod error;
mod fit;
mod iter;
pub mod layout;
mod logging;
mod region;
mod report;
mod upstream;

pub use arena::{Arena, ArenaBuilder};
pub use config::ArenaConfig;
pub use error::ArenaError;
pub use fit::{FitMode, ParseFitModeError};
pub use iter::{BlockView, Blocks};
pub use layout::{BLOCK_METADATA_SIZE, HEADER_SIZE, MAX_SIZE_EXPONENT, MIN_SIZE_EXPONENT};
pub use logging::{LogRecord, Logger, RecordingLogger, Severity};
pub use report::{BlockInfo, BlockReport};
pub use upstream::{SystemHeap, TrackingUpstream, UpstreamAllocator};
