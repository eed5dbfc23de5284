//! Arena error taxonomy.

use thiserror::Error;

/// Failures surfaced by [`Arena`](crate::Arena) operations.
///
/// Deallocating a foreign pointer is not represented here: it violates the
/// safety contract of [`Arena::deallocate`](crate::Arena::deallocate).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArenaError {
    /// The size exponent is outside the supported range; nothing was allocated.
    #[error("size exponent {size_exponent} outside supported range {min}..={max}")]
    Configuration { size_exponent: u8, min: u8, max: u8 },
    /// The backing buffer could not be obtained, or no free block is large enough.
    #[error("out of memory: cannot satisfy a request for {requested} bytes")]
    OutOfMemory { requested: usize },
    /// The header holds a fit mode tag that does not decode.
    #[error("invalid fit mode tag {0}")]
    InvalidFitMode(u8),
}

impl ArenaError {
    #[must_use]
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }
}
