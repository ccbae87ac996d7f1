/* Work limits for every search the engine runs. None of the underlying problems is guaranteed
 * to finish quickly (or at all), so each one is capped and reports when the cap was hit. */

use color_eyre::eyre::{Report, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Bounds for the grammar ambiguity and derivation searches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrammarLimits {
    /// Maximum number of rule applications in one derivation
    pub max_depth: usize,
    /// Maximum number of distinct terminal strings to collect as candidates
    pub max_candidates: usize,
    /// Longest candidate string, counted in terminal symbols
    pub max_string_length: usize,
    /// Total number of sentential forms either phase may expand
    pub max_expansions: usize,
}

impl Default for GrammarLimits {
    fn default() -> Self {
        GrammarLimits {
            max_depth: 10,
            max_candidates: 100,
            max_string_length: 10,
            max_expansions: 200_000,
        }
    }
}

/// Every caller tunable bound in one place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Most DFA states subset construction may create
    pub max_dfa_states: usize,
    /// Most configurations the pushdown search may expand
    pub pda_move_budget: usize,
    /// Most steps a Turing machine may take
    pub tm_step_budget: usize,
    pub grammar: GrammarLimits,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_dfa_states: 4096,
            pda_move_budget: 10_000,
            tm_step_budget: 1000,
            grammar: GrammarLimits::default(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    FileOpenError(String),
    ParseError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileOpenError(err_line) => write!(f, "{}", err_line),
            ConfigError::ParseError(err_line) => write!(f, "{}", err_line),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Read and deserialize a JSON file. `what` names the file in error messages.
pub fn read_json_file<T: DeserializeOwned>(file_path: &Path, what: &str) -> Result<T> {
    let file = match File::open(file_path) {
        Ok(file) => file,
        Err(error) => {
            let err_line = format!(
                "Error: Failed to open the {} {}: {}",
                what,
                file_path.display(),
                error
            );
            return Err(Report::new(ConfigError::FileOpenError(err_line)));
        }
    };

    let buf_reader = BufReader::new(file);
    match serde_json::from_reader(buf_reader) {
        Ok(value) => Ok(value),
        Err(error) => {
            let err_line = format!(
                "Error: Malformed {} {}: {}",
                what,
                file_path.display(),
                error
            );
            Err(Report::new(ConfigError::ParseError(err_line)))
        }
    }
}

impl Limits {
    /// Read limits from a JSON file. Fields left out keep their default value.
    pub fn load(file_path: &Path) -> Result<Limits> {
        read_json_file(file_path, "config file")
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_partial_limits_keep_defaults() {
        let limits: Limits =
            serde_json::from_str(r#"{"tm_step_budget": 50, "grammar": {"max_depth": 4}}"#)
                .unwrap();
        assert_eq!(limits.tm_step_budget, 50);
        assert_eq!(limits.pda_move_budget, Limits::default().pda_move_budget);
        assert_eq!(limits.grammar.max_depth, 4);
        assert_eq!(limits.grammar.max_candidates, 100);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Limits::load(Path::new("does/not/exist.json"));
        assert!(result.is_err());
        let err = result.unwrap_err();
        match err.downcast_ref::<ConfigError>() {
            Some(ConfigError::FileOpenError(_)) => {}
            other => panic!("Expected FileOpenError, got {:?}", other),
        }
        assert!(err.to_string().contains("config file"));
    }
}
