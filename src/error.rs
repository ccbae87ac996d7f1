/* Validation errors raised while building automata, machines and grammars from their
 * declarative description. Every one of them fails fast: nothing is retried and no
 * partially built model is returned. */

use std::fmt;

/// List of possible errors in a machine or grammar description
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// The description has no start state, or names one that is not declared
    MissingStartState(String),
    /// A transition, accept set or halting state refers to an undeclared state
    UndefinedState(String),
    /// A transition uses a symbol that is not in the declared alphabet
    UndefinedSymbol(String),
    /// A state label is declared more than once
    DuplicateState(String),
    /// A DFA maps some (state, symbol) to more than one destination
    NondeterministicTransition(String, String),
    /// A DFA has an epsilon transition out of the given state
    EpsilonInDFA(String),
    /// A symbol string which is neither a single character nor an epsilon marker
    InvalidSymbol(String),
    /// A Turing machine head move other than L or R
    InvalidMove(String),
    /// A deterministic machine has two transitions for the same (state, symbol)
    ConflictingTransition(String, String),
    /// The grammar has no start symbol, or its start symbol is not a non-terminal
    MissingStartSymbol(String),
    /// A rule is written for a symbol that is not a declared non-terminal
    UndefinedNonTerminal(String),
    /// A production (or stack push) contains text that is not a declared symbol
    UnknownProductionSymbol(String, String),
    /// A terminal that cannot be used as a single pushdown input character
    UnsupportedTerminal(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::MissingStartState(state) => {
                if state.is_empty() {
                    write!(f, "Error: No start state provided!")
                } else {
                    write!(f, "Error: Start state {} is not a declared state!", state)
                }
            }
            ModelError::UndefinedState(state) => {
                write!(f, "Error: Reference to undefined state {}!", state)
            }
            ModelError::UndefinedSymbol(symbol) => {
                write!(f, "Error: Symbol {} is not part of the alphabet!", symbol)
            }
            ModelError::DuplicateState(state) => {
                write!(f, "Error: State {} is declared more than once!", state)
            }
            ModelError::NondeterministicTransition(state, symbol) => write!(
                f,
                "Error: DFA state {} has more than one destination on {}!",
                state, symbol
            ),
            ModelError::EpsilonInDFA(state) => {
                write!(f, "Error: Found an epsilon transition out of DFA state {}!", state)
            }
            ModelError::InvalidSymbol(symbol) => {
                write!(f, "Error: Invalid symbol {:?} provided!", symbol)
            }
            ModelError::InvalidMove(head_move) => {
                write!(f, "Error: Invalid head move {:?}, expected L or R!", head_move)
            }
            ModelError::ConflictingTransition(state, symbol) => write!(
                f,
                "Error: More than one transition for state {} reading {}!",
                state, symbol
            ),
            ModelError::MissingStartSymbol(symbol) => {
                if symbol.is_empty() {
                    write!(f, "Error: No start symbol provided!")
                } else {
                    write!(f, "Error: Start symbol {} is not a non-terminal!", symbol)
                }
            }
            ModelError::UndefinedNonTerminal(symbol) => {
                write!(f, "Error: Rule for undeclared non-terminal {}!", symbol)
            }
            ModelError::UnknownProductionSymbol(production, rest) => write!(
                f,
                "Error: Cannot split {:?} into grammar symbols, stuck at {:?}!",
                production, rest
            ),
            ModelError::UnsupportedTerminal(terminal) => write!(
                f,
                "Error: Terminal {} is not a single input character!",
                terminal
            ),
        }
    }
}

impl std::error::Error for ModelError {}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            ModelError::MissingStartState(String::new()).to_string(),
            "Error: No start state provided!"
        );
        assert_eq!(
            ModelError::MissingStartState("q9".to_string()).to_string(),
            "Error: Start state q9 is not a declared state!"
        );
        assert_eq!(
            ModelError::NondeterministicTransition("q0".to_string(), "a".to_string()).to_string(),
            "Error: DFA state q0 has more than one destination on a!"
        );
    }
}
