//! Point-in-time block reports.

use std::fmt;
use std::ops::Deref;

use crate::iter::Blocks;

/// Size and state of one block at the time of the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockInfo {
    /// Offset from the start of the block area.
    pub offset: usize,
    /// Block size in bytes, metadata included.
    pub size: usize,
    pub occupied: bool,
}

/// Every block of an arena, in address order.
///
/// A report is a snapshot; it may be stale as soon as the arena lock is
/// released.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct BlockReport {
    blocks: Vec<BlockInfo>,
}

impl BlockReport {
    pub(crate) fn capture(blocks: Blocks<'_>) -> Self {
        Self {
            blocks: blocks
                .map(|view| BlockInfo {
                    offset: view.offset(),
                    size: view.size(),
                    occupied: view.is_occupied(),
                })
                .collect(),
        }
    }

    /// Sum of all block sizes; equals the arena capacity.
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.blocks.iter().map(|block| block.size).sum()
    }

    #[must_use]
    pub fn free_bytes(&self) -> usize {
        self.blocks
            .iter()
            .filter(|block| !block.occupied)
            .map(|block| block.size)
            .sum()
    }

    #[must_use]
    pub fn occupied_bytes(&self) -> usize {
        self.total_size() - self.free_bytes()
    }

    /// Size of the largest free block, if any block is free.
    #[must_use]
    pub fn largest_free(&self) -> Option<usize> {
        self.blocks
            .iter()
            .filter(|block| !block.occupied)
            .map(|block| block.size)
            .max()
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<BlockInfo> {
        self.blocks
    }
}

impl Deref for BlockReport {
    type Target = [BlockInfo];

    fn deref(&self) -> &Self::Target {
        &self.blocks
    }
}

impl IntoIterator for BlockReport {
    type Item = BlockInfo;
    type IntoIter = std::vec::IntoIter<BlockInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.into_iter()
    }
}

impl<'a> IntoIterator for &'a BlockReport {
    type Item = &'a BlockInfo;
    type IntoIter = std::slice::Iter<'a, BlockInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}

impl From<Vec<BlockInfo>> for BlockReport {
    fn from(blocks: Vec<BlockInfo>) -> Self {
        Self { blocks }
    }
}

/// Renders as `<free> <64> | <occupied> <32> | `.
impl fmt::Display for BlockReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in &self.blocks {
            let state = if block.occupied { "occupied" } else { "free" };
            write!(f, "<{state}> <{}> | ", block.size)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BlockReport {
        BlockReport::from(vec![
            BlockInfo {
                offset: 0,
                size: 16,
                occupied: true,
            },
            BlockInfo {
                offset: 16,
                size: 16,
                occupied: false,
            },
            BlockInfo {
                offset: 32,
                size: 32,
                occupied: false,
            },
        ])
    }

    #[test]
    fn totals() {
        let report = sample();
        assert_eq!(report.total_size(), 64);
        assert_eq!(report.free_bytes(), 48);
        assert_eq!(report.occupied_bytes(), 16);
        assert_eq!(report.largest_free(), Some(32));
        assert_eq!(report.len(), 3);
    }

    #[test]
    fn display_matches_state_string() {
        assert_eq!(
            sample().to_string(),
            "<occupied> <16> | <free> <16> | <free> <32> | "
        );
        assert_eq!(BlockReport::default().to_string(), "");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serializes_as_plain_list() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json[2]["size"], 32);
        assert_eq!(json[0]["occupied"], true);
    }
}
