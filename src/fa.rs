use bitvec::prelude::BitVec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::ModelError;

/// Spellings accepted for the empty string wherever a symbol or a production is expected
pub const EPSILON_MARKERS: [&str; 4] = ["ε", "eps", "epsilon", ""];

/// The label an epsilon symbol is written with
pub const EPSILON: &str = "ε";

/// An input symbol on an automaton edge: either a character or epsilon.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Symbol {
    Epsilon,
    Char(char),
}

impl Symbol {
    pub fn is_epsilon(&self) -> bool {
        matches!(self, Symbol::Epsilon)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Epsilon => write!(f, "{}", EPSILON),
            Symbol::Char(ch) => write!(f, "{}", ch),
        }
    }
}

impl TryFrom<String> for Symbol {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Symbol::try_from(value.as_str())
    }
}

impl TryFrom<&str> for Symbol {
    type Error = ModelError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // Exact comparison: a lone space is a character, not padding around a marker
        if EPSILON_MARKERS.contains(&value) {
            return Ok(Symbol::Epsilon);
        }
        let mut chars = value.chars();
        match (chars.next(), chars.next()) {
            (Some(ch), None) => Ok(Symbol::Char(ch)),
            _ => Err(ModelError::InvalidSymbol(value.to_string())),
        }
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.to_string()
    }
}

/// Returns true if the text spells the empty string, ignoring surrounding whitespace. Used
/// for productions and stack pushes, where whitespace is never a symbol.
pub fn is_epsilon_marker(text: &str) -> bool {
    let text = text.trim();
    EPSILON_MARKERS.contains(&text)
}

/// Split a string into symbols taken from the vocabulary by greedy longest match, so that
/// "AZ0" becomes ["A", "Z0"] and "id+id" becomes ["id", "+", "id"]. Whitespace between
/// symbols is skipped. On failure the unsplittable remainder is returned.
pub fn split_symbols<'a, I>(text: &str, vocabulary: I) -> Result<Vec<String>, String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut words: Vec<&String> = vocabulary.into_iter().filter(|w| !w.is_empty()).collect();
    words.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b))); // Longest first

    let mut result = Vec::new();
    let mut rest = text.trim_start();

    while !rest.is_empty() {
        let matched = words.iter().find(|word| rest.starts_with(word.as_str()));
        match matched {
            Some(word) => {
                result.push(word.to_string());
                rest = rest[word.len()..].trim_start();
            }
            None => return Err(rest.to_string()),
        }
    }
    Ok(result)
}

/// A sequence of (possibly multi-character) symbols, written either as one string to be
/// split against a vocabulary or as an explicit list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SymbolString {
    Text(String),
    Symbols(Vec<String>),
}

impl Default for SymbolString {
    fn default() -> Self {
        SymbolString::Text(String::new())
    }
}

impl SymbolString {
    /// Resolve into vocabulary symbols. Epsilon markers stand for the empty sequence. On
    /// failure the part that could not be matched is returned.
    pub fn resolve(&self, vocabulary: &[String]) -> Result<Vec<String>, String> {
        match self {
            SymbolString::Text(text) if is_epsilon_marker(text) => Ok(Vec::new()),
            SymbolString::Text(text) => split_symbols(text, vocabulary),
            SymbolString::Symbols(symbols) => symbols
                .iter()
                .filter(|symbol| !is_epsilon_marker(symbol))
                .map(|symbol| {
                    if vocabulary.contains(symbol) {
                        Ok(symbol.clone())
                    } else {
                        Err(symbol.clone())
                    }
                })
                .collect(),
        }
    }
}

impl fmt::Display for SymbolString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolString::Text(text) => write!(f, "{}", text),
            SymbolString::Symbols(symbols) => write!(f, "{}", symbols.concat()),
        }
    }
}

/// Read-only view shared by every finite automaton, used by the table and DOT exporters.
pub trait FA {
    fn get_num_states(&self) -> usize;
    fn get_start_state(&self) -> usize;
    fn get_alphabet(&self) -> &BTreeSet<char>;
    fn get_acceptor_states(&self) -> &BitVec<u8>;
    fn get_state_label(&self, state_id: usize) -> &str;
    /// All outgoing edges of a state, sorted by symbol then destination
    fn get_state_transitions(&self, state_id: usize) -> Vec<(Symbol, usize)>;

    fn is_accepting(&self, state_id: usize) -> bool {
        self.get_acceptor_states()
            .get(state_id)
            .map(|bit| *bit)
            .unwrap_or(false)
    }
}
