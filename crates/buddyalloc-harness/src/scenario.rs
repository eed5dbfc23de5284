//! Scenario fixture loading.
//!
//! A scenario case builds an arena, runs a list of steps against it, and
//! states the block layouts those steps must produce.

use std::path::Path;

use buddyalloc::FitMode;
use serde::{Deserialize, Serialize};

use crate::error::ScenarioError;

/// One operation or expectation within a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Allocate `size` bytes and remember the pointer as `handle`.
    Allocate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        handle: Option<String>,
        size: usize,
        /// The request must be refused with out-of-memory.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        expect_out_of_memory: bool,
    },
    /// Release the pointer stored under `handle`.
    Deallocate { handle: String },
    SetFitMode { mode: FitMode },
    /// Compare the block-state string, ignoring trailing whitespace.
    ExpectBlocks { blocks: String },
    /// Check the block offset behind `handle`.
    ExpectOffset { handle: String, offset: usize },
}

/// A single scenario case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioCase {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub size_exponent: u8,
    #[serde(default)]
    pub fit_mode: FitMode,
    pub steps: Vec<Step>,
    /// Block-state string after every step ran and before live handles are
    /// released.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_blocks: Option<String>,
}

/// A collection of scenario cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSet {
    /// Schema version.
    pub version: String,
    pub family: String,
    pub cases: Vec<ScenarioCase>,
}

impl ScenarioSet {
    /// Load a scenario set from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, ScenarioError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a scenario set from a file path.
    pub fn from_file(path: &Path) -> Result<Self, ScenarioError> {
        let content =
            std::fs::read_to_string(path).map_err(|err| ScenarioError::io(path, err))?;
        Self::from_json(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_steps_with_defaults() {
        let set = ScenarioSet::from_json(
            r#"{
                "version": "v1",
                "family": "smoke",
                "cases": [{
                    "name": "one",
                    "size_exponent": 6,
                    "steps": [
                        {"op": "allocate", "handle": "a", "size": 8},
                        {"op": "allocate", "size": 100, "expect_out_of_memory": true},
                        {"op": "set_fit_mode", "mode": "worst_fit"},
                        {"op": "expect_offset", "handle": "a", "offset": 0},
                        {"op": "deallocate", "handle": "a"},
                        {"op": "expect_blocks", "blocks": "<free> <64> |"}
                    ]
                }]
            }"#,
        )
        .unwrap();

        let case = &set.cases[0];
        assert_eq!(case.fit_mode, FitMode::FirstFit);
        assert!(case.description.is_empty());
        assert_eq!(case.expected_blocks, None);
        assert_eq!(
            case.steps[0],
            Step::Allocate {
                handle: Some("a".into()),
                size: 8,
                expect_out_of_memory: false
            }
        );
        assert_eq!(
            case.steps[1],
            Step::Allocate {
                handle: None,
                size: 100,
                expect_out_of_memory: true
            }
        );
        assert_eq!(
            case.steps[2],
            Step::SetFitMode {
                mode: FitMode::WorstFit
            }
        );
    }

    #[test]
    fn json_roundtrip_keeps_steps() {
        let set = ScenarioSet {
            version: "v1".into(),
            family: "roundtrip".into(),
            cases: vec![ScenarioCase {
                name: "c".into(),
                description: "d".into(),
                size_exponent: 8,
                fit_mode: FitMode::BestFit,
                steps: vec![
                    Step::Allocate {
                        handle: Some("x".into()),
                        size: 24,
                        expect_out_of_memory: false,
                    },
                    Step::Deallocate { handle: "x".into() },
                ],
                expected_blocks: Some("<free> <256> | ".into()),
            }],
        };
        let json = set.to_json().unwrap();
        assert!(!json.contains("expect_out_of_memory"));
        let back = ScenarioSet::from_json(&json).unwrap();
        assert_eq!(back.cases[0].steps, set.cases[0].steps);
        assert_eq!(back.cases[0].fit_mode, FitMode::BestFit);
    }

    #[test]
    fn unknown_op_is_rejected() {
        let err = ScenarioSet::from_json(
            r#"{"version":"v1","family":"f","cases":[{"name":"n","size_exponent":6,"steps":[{"op":"resize","size":3}]}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ScenarioError::Json(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ScenarioSet::from_file(Path::new("/nonexistent/scenarios.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/scenarios.json"));
    }
}
