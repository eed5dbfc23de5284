//! Fit strategies for choosing a free block.
//!
//! No free list is kept: every strategy walks [`Blocks`] from the first block,
//! so the cost is linear in the number of blocks partitioning the arena.

use std::fmt;
use std::str::FromStr;

use crate::iter::{BlockView, Blocks};

/// Strategy used to pick a free block for a request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum FitMode {
    /// First sufficient free block in address order.
    #[default]
    FirstFit = 0,
    /// Smallest sufficient free block; earliest on ties.
    BestFit = 1,
    /// Largest sufficient free block; earliest on ties.
    WorstFit = 2,
}

impl FitMode {
    /// Every mode, in tag order.
    pub const ALL: [Self; 3] = [Self::FirstFit, Self::BestFit, Self::WorstFit];

    /// Tag stored in the arena header.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FirstFit => "first_fit",
            Self::BestFit => "best_fit",
            Self::WorstFit => "worst_fit",
        }
    }

    /// Parse from string (case-insensitive), falling back to the default.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    /// Pick a free block of at least `required` bytes, or `None`.
    ///
    /// "Nothing large enough" is the only failure, whatever the strategy.
    #[must_use]
    pub fn select(self, blocks: Blocks<'_>, required: usize) -> Option<BlockView> {
        let mut candidates = blocks.filter(|view| view.is_free() && view.size() >= required);
        match self {
            Self::FirstFit => candidates.next(),
            Self::BestFit => candidates.fold(None, |chosen: Option<BlockView>, view| {
                if chosen.is_none_or(|c| view.size() < c.size()) {
                    Some(view)
                } else {
                    chosen
                }
            }),
            Self::WorstFit => candidates.fold(None, |chosen: Option<BlockView>, view| {
                if chosen.is_none_or(|c| view.size() > c.size()) {
                    Some(view)
                } else {
                    chosen
                }
            }),
        }
    }
}

impl TryFrom<u8> for FitMode {
    type Error = u8;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(Self::FirstFit),
            1 => Ok(Self::BestFit),
            2 => Ok(Self::WorstFit),
            other => Err(other),
        }
    }
}

impl fmt::Display for FitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a fit mode name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown fit mode '{0}' (expected first_fit, best_fit or worst_fit)")]
pub struct ParseFitModeError(pub String);

impl FromStr for FitMode {
    type Err = ParseFitModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "first" | "first_fit" | "firstfit" => Ok(Self::FirstFit),
            "best" | "best_fit" | "bestfit" | "the_best_fit" => Ok(Self::BestFit),
            "worst" | "worst_fit" | "worstfit" | "the_worst_fit" => Ok(Self::WorstFit),
            _ => Err(ParseFitModeError(s.to_string())),
        }
    }
}
