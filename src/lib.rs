//! # automata-engine
//!
//! The computational core behind an automata theory assistant.
//!
//! This library provides functionality to:
//! - Compute epsilon closures and convert NFAs to DFAs using Subset Construction
//! - Minimize DFAs by partition refinement
//! - Decide pushdown automaton acceptance by a bounded breadth-first configuration search
//! - Step deterministic Turing machines under a step budget
//! - Search context-free grammars for ambiguity witnesses and leftmost derivations
//! - Produce transition tables and DOT graphs of finite automata
//!
//! Every search is bounded by the limits in [`config::Limits`] and reports running out of
//! budget as its own outcome.

pub mod config;
pub mod dfa;
pub mod engine;
pub mod error;
pub mod fa;
pub mod grammar;
pub mod nfa;
pub mod pda;
pub mod table;
pub mod tm;
pub mod visualizer;

// Re-export commonly used functions for convenience
pub use config::Limits;
pub use dfa::{construct_dfa, construct_minimal_dfa, DFA};
pub use engine::{solve, Solution, Task};
pub use error::ModelError;
pub use grammar::{find_ambiguous_witness, Grammar};
pub use nfa::NFA;
pub use pda::PushdownAutomaton;
pub use table::transition_table;
pub use tm::TuringMachine;
pub use visualizer::to_dot;
