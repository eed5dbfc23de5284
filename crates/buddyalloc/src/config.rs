//! Arena configuration.
//!
//! Defaults can be overridden through the environment:
//! - `BUDDYALLOC_SIZE_EXPONENT`: block area size exponent `k` (capacity `2^k`).
//!   Values outside the supported range are ignored.
//! - `BUDDYALLOC_FIT_MODE`: `first_fit` (default), `best_fit` or `worst_fit`.
//!   Unknown names fall back to `first_fit`.

use std::sync::Arc;

use crate::arena::{Arena, ArenaBuilder};
use crate::error::ArenaError;
use crate::fit::FitMode;
use crate::layout::{MAX_SIZE_EXPONENT, MIN_SIZE_EXPONENT};
use crate::logging::Logger;
use crate::upstream::UpstreamAllocator;

/// Environment variable holding the size exponent.
pub const SIZE_EXPONENT_ENV: &str = "BUDDYALLOC_SIZE_EXPONENT";

/// Environment variable holding the fit mode name.
pub const FIT_MODE_ENV: &str = "BUDDYALLOC_FIT_MODE";

/// Size exponent used when none is configured (64 KiB).
pub const DEFAULT_SIZE_EXPONENT: u8 = 16;

/// Construction parameters that do not involve collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArenaConfig {
    pub size_exponent: u8,
    pub fit_mode: FitMode,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            size_exponent: DEFAULT_SIZE_EXPONENT,
            fit_mode: FitMode::default(),
        }
    }
}

impl ArenaConfig {
    /// Read overrides from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through `lookup`, which maps a variable name to its value.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            size_exponent: lookup(SIZE_EXPONENT_ENV)
                .as_deref()
                .and_then(parse_size_exponent)
                .unwrap_or(defaults.size_exponent),
            fit_mode: lookup(FIT_MODE_ENV)
                .as_deref()
                .map_or(defaults.fit_mode, FitMode::from_str_loose),
        }
    }

    /// A builder preloaded with this configuration.
    #[must_use]
    pub fn builder(self) -> ArenaBuilder {
        Arena::builder(self.size_exponent).with_fit_mode(self.fit_mode)
    }

    pub fn build(
        self,
        upstream: Option<Arc<dyn UpstreamAllocator>>,
        logger: Option<Arc<dyn Logger>>,
    ) -> Result<Arena, ArenaError> {
        Arena::new(self.size_exponent, upstream, logger, self.fit_mode)
    }
}

fn parse_size_exponent(raw: &str) -> Option<u8> {
    raw.trim()
        .parse::<u8>()
        .ok()
        .filter(|k| (MIN_SIZE_EXPONENT..=MAX_SIZE_EXPONENT).contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_overrides() {
        assert_eq!(ArenaConfig::from_lookup(|_| None), ArenaConfig::default());
        assert_eq!(ArenaConfig::default().size_exponent, 16);
        assert_eq!(ArenaConfig::default().fit_mode, FitMode::FirstFit);
    }

    #[test]
    fn reads_overrides() {
        let config = ArenaConfig::from_lookup(lookup_from(&[
            (SIZE_EXPONENT_ENV, " 12 "),
            (FIT_MODE_ENV, "worst"),
        ]));
        assert_eq!(config.size_exponent, 12);
        assert_eq!(config.fit_mode, FitMode::WorstFit);
    }

    #[test]
    fn out_of_range_exponent_falls_back() {
        for raw in ["2", "255", "-1", "big"] {
            let config = ArenaConfig::from_lookup(lookup_from(&[(SIZE_EXPONENT_ENV, raw)]));
            assert_eq!(config.size_exponent, DEFAULT_SIZE_EXPONENT, "{raw}");
        }
    }

    #[test]
    fn unknown_fit_mode_falls_back() {
        let config = ArenaConfig::from_lookup(lookup_from(&[(FIT_MODE_ENV, "random")]));
        assert_eq!(config.fit_mode, FitMode::FirstFit);
    }

    #[test]
    fn builds_configured_arena() {
        let config = ArenaConfig {
            size_exponent: 9,
            fit_mode: FitMode::BestFit,
        };
        let arena = config.build(None, None).unwrap();
        assert_eq!(arena.capacity(), 512);
        assert_eq!(arena.fit_mode(), Ok(FitMode::BestFit));

        let via_builder = config.builder().build().unwrap();
        assert_eq!(via_builder.fit_mode(), Ok(FitMode::BestFit));
    }
}
