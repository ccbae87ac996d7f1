use bitvec::prelude::*;
use log::trace;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use crate::error::ModelError;
use crate::fa::{Symbol, FA};

/// Destination(s) of a transition as written in a description. A DFA usually names a single
/// state while an NFA lists a set, so both spellings are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Targets {
    One(String),
    Many(Vec<String>),
}

impl Targets {
    pub fn labels(&self) -> Vec<&String> {
        match self {
            Targets::One(label) => vec![label],
            Targets::Many(labels) => labels.iter().collect(),
        }
    }
}

/// Declarative description of a finite automaton, the shape callers hand to the engine and
/// the shape derived automata are handed back in.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AutomatonDefinition {
    pub states: Vec<String>,
    #[serde(default)]
    pub alphabet: Vec<char>,
    #[serde(default)]
    pub transitions: BTreeMap<String, BTreeMap<Symbol, Targets>>,
    #[serde(default, alias = "start")]
    pub start_state: Option<String>,
    #[serde(default, alias = "accept")]
    pub accept_states: Vec<String>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NFAState {
    label: String,
    transitions: BTreeMap<Symbol, BTreeSet<usize>>,
}

/// A finite automaton over the relation (state, symbol-or-epsilon) -> set of states.
/// Every DFA is also an NFA; see `DFA` for the verified single-valued form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NFA {
    states: Vec<NFAState>,
    start_state: usize,
    accept_states: BitVec<u8>,
    alphabet: BTreeSet<char>,
}

impl NFAState {
    fn new(label: String) -> Self {
        NFAState {
            label,
            transitions: BTreeMap::new(),
        }
    }

    fn add_transition(&mut self, symbol: Symbol, to: usize) {
        self.transitions.entry(symbol).or_default().insert(to);
    }

    pub fn get_transitions(&self) -> &BTreeMap<Symbol, BTreeSet<usize>> {
        &self.transitions
    }

    pub fn get_label(&self) -> &str {
        &self.label
    }
}

impl FA for NFA {
    fn get_num_states(&self) -> usize {
        self.states.len()
    }

    fn get_start_state(&self) -> usize {
        self.start_state
    }

    fn get_alphabet(&self) -> &BTreeSet<char> {
        &self.alphabet
    }

    fn get_acceptor_states(&self) -> &BitVec<u8> {
        &self.accept_states
    }

    fn get_state_label(&self, state_id: usize) -> &str {
        &self.states[state_id].label
    }

    fn get_state_transitions(&self, state_id: usize) -> Vec<(Symbol, usize)> {
        let mut transition_list = Vec::new();
        for (symbol, targets) in &self.states[state_id].transitions {
            for target in targets {
                transition_list.push((*symbol, *target));
            }
        }
        transition_list
    }
}

impl NFA {
    pub(crate) fn new() -> Self {
        NFA {
            states: Vec::new(),
            start_state: 0,
            accept_states: BitVec::new(),
            alphabet: BTreeSet::new(),
        }
    }

    pub(crate) fn add_state(&mut self, label: String) -> usize {
        let state_id = self.states.len();
        self.states.push(NFAState::new(label));
        self.accept_states.push(false);
        state_id
    }

    pub(crate) fn add_transition(&mut self, from: usize, symbol: Symbol, to: usize) {
        self.states[from].add_transition(symbol, to);
    }

    pub(crate) fn set_accept_state(&mut self, state_id: usize) {
        self.accept_states.set(state_id, true);
    }

    pub(crate) fn set_start_state(&mut self, state_id: usize) {
        self.start_state = state_id;
    }

    pub(crate) fn set_alphabet(&mut self, alphabet: BTreeSet<char>) {
        self.alphabet = alphabet;
    }

    /// Build an automaton from its description, checking every reference it makes.
    pub fn from_definition(definition: &AutomatonDefinition) -> Result<NFA, ModelError> {
        let mut result = NFA::new();
        let mut state_ids: HashMap<&str, usize> = HashMap::new();

        for label in &definition.states {
            if state_ids.contains_key(label.as_str()) {
                return Err(ModelError::DuplicateState(label.to_string()));
            }
            let state_id = result.add_state(label.to_string());
            state_ids.insert(label.as_str(), state_id);
        }

        result.set_alphabet(definition.alphabet.iter().copied().collect());

        let start = match &definition.start_state {
            Some(start) if !start.is_empty() => start,
            _ => return Err(ModelError::MissingStartState(String::new())),
        };
        match state_ids.get(start.as_str()) {
            Some(&start_id) => result.set_start_state(start_id),
            None => return Err(ModelError::MissingStartState(start.to_string())),
        }

        for accept in &definition.accept_states {
            match state_ids.get(accept.as_str()) {
                Some(&accept_id) => result.set_accept_state(accept_id),
                None => return Err(ModelError::UndefinedState(accept.to_string())),
            }
        }

        for (from, row) in &definition.transitions {
            let from_id = match state_ids.get(from.as_str()) {
                Some(&from_id) => from_id,
                None => return Err(ModelError::UndefinedState(from.to_string())),
            };

            for (symbol, targets) in row {
                if let Symbol::Char(ch) = symbol {
                    if !result.alphabet.contains(ch) {
                        return Err(ModelError::UndefinedSymbol(ch.to_string()));
                    }
                }
                for target in targets.labels() {
                    match state_ids.get(target.as_str()) {
                        Some(&to_id) => result.add_transition(from_id, *symbol, to_id),
                        None => return Err(ModelError::UndefinedState(target.to_string())),
                    }
                }
            }
        }

        Ok(result)
    }

    /// Describe the automaton in the same shape it can be built from. Singleton destination
    /// sets are written as a plain state when `collapse_singletons` is set.
    pub fn to_definition(&self, collapse_singletons: bool) -> AutomatonDefinition {
        let mut transitions = BTreeMap::new();

        for state in &self.states {
            let mut row = BTreeMap::new();
            for (symbol, targets) in &state.transitions {
                let labels: Vec<String> = targets
                    .iter()
                    .map(|target| self.states[*target].label.to_string())
                    .collect();
                let targets = if collapse_singletons && labels.len() == 1 {
                    Targets::One(labels[0].to_string())
                } else {
                    Targets::Many(labels)
                };
                row.insert(*symbol, targets);
            }
            if !row.is_empty() {
                transitions.insert(state.label.to_string(), row);
            }
        }

        AutomatonDefinition {
            states: self.states.iter().map(|s| s.label.to_string()).collect(),
            alphabet: self.alphabet.iter().copied().collect(),
            transitions,
            start_state: Some(self.states[self.start_state].label.to_string()),
            accept_states: self
                .accept_states
                .iter_ones()
                .map(|id| self.states[id].label.to_string())
                .collect(),
        }
    }

    pub fn get_state(&self, id: usize) -> Option<&NFAState> {
        self.states.get(id)
    }

    /// Look up a state id by its label
    pub fn find_state(&self, label: &str) -> Option<usize> {
        self.states.iter().position(|state| state.label == label)
    }

    pub fn has_epsilon_transitions(&self) -> bool {
        self.states
            .iter()
            .any(|state| state.transitions.contains_key(&Symbol::Epsilon))
    }

    /// A set of states with nothing in it, sized for this automaton
    pub(crate) fn empty_set(&self) -> BitVec<u8> {
        BitVec::repeat(false, self.states.len())
    }

    /// All states reachable from the given set through zero or more epsilon transitions.
    /// Each state enters the queue at most once, which bounds the search.
    pub fn closure_of_set(&self, nfa_states: &BitVec<u8>) -> BitVec<u8> {
        let mut closure = nfa_states.clone();
        let mut queue: VecDeque<usize> = nfa_states.iter_ones().collect();

        while let Some(state) = queue.pop_front() {
            if let Some(targets) = self.states[state].transitions.get(&Symbol::Epsilon) {
                for &target in targets {
                    if !closure[target] {
                        closure.set(target, true);
                        queue.push_back(target);
                    }
                }
            }
        }
        closure
    }

    /// Epsilon closure of a single state; always contains the state itself.
    pub fn epsilon_closure(&self, state_id: usize) -> BitVec<u8> {
        let mut start = self.empty_set();
        start.set(state_id, true);
        let closure = self.closure_of_set(&start);
        trace!(
            "Epsilon closure of {}: {}",
            self.states[state_id].label,
            self.format_subset_name(&closure)
        );
        closure
    }

    /// Epsilon closure looked up by state label, returned as labels in declaration order
    pub fn epsilon_closure_of(&self, label: &str) -> Result<Vec<String>, ModelError> {
        let state_id = self
            .find_state(label)
            .ok_or_else(|| ModelError::UndefinedState(label.to_string()))?;
        let closure = self.epsilon_closure(state_id);
        Ok(closure
            .iter_ones()
            .map(|id| self.states[id].label.to_string())
            .collect())
    }

    /// The set of states reachable from members of `nfa_states` on character `c`, without
    /// taking any epsilon transitions.
    pub fn move_set(&self, nfa_states: &BitVec<u8>, c: char) -> BitVec<u8> {
        let mut result = self.empty_set();
        for node in nfa_states.iter_ones() {
            if let Some(targets) = self.states[node].transitions.get(&Symbol::Char(c)) {
                for &target in targets {
                    result.set(target, true);
                }
            }
        }
        result
    }

    /// Canonical name for a set of states: member labels in declaration order, e.g. {q0,q1}.
    /// Equal sets always produce equal names.
    pub fn format_subset_name(&self, nfa_states: &BitVec<u8>) -> String {
        let members: Vec<&str> = nfa_states
            .iter_ones()
            .map(|id| self.states[id].label.as_str())
            .collect();
        format!("{{{}}}", members.join(","))
    }

    pub fn contains_accepting(&self, nfa_states: &BitVec<u8>) -> bool {
        nfa_states.iter_ones().any(|id| self.accept_states[id])
    }

    /// Simulate the automaton on the input by tracking every simultaneously possible state.
    pub fn accepts(&self, input: &str) -> bool {
        let mut current = self.epsilon_closure(self.start_state);

        for ch in input.chars() {
            let moved = self.move_set(&current, ch);
            if moved.not_any() {
                return false;
            }
            current = self.closure_of_set(&moved);
        }

        self.contains_accepting(&current)
    }
}


#[cfg(test)]
mod nfa_tests {
    use super::nfa_test_helpers::*;
    use super::*;

    #[test]
    fn test_nfa_from_definition() {
        let nfa = contains_ab_nfa();
        assert_eq!(nfa.get_num_states(), 3);
        assert_eq!(nfa.get_start_state(), 0);
        assert_eq!(nfa.get_acceptor_states().iter_ones().collect::<Vec<_>>(), vec![2]);
        assert_eq!(
            nfa.get_state_transitions(0),
            vec![
                (Symbol::Char('a'), 0),
                (Symbol::Char('a'), 1),
                (Symbol::Char('b'), 0)
            ]
        );
        assert!(!nfa.has_epsilon_transitions());
    }

    #[test]
    fn test_missing_start_state() {
        let mut definition = contains_ab_nfa().to_definition(false);
        definition.start_state = None;
        assert_eq!(
            NFA::from_definition(&definition),
            Err(ModelError::MissingStartState(String::new()))
        );

        definition.start_state = Some("q7".to_string());
        assert_eq!(
            NFA::from_definition(&definition),
            Err(ModelError::MissingStartState("q7".to_string()))
        );
    }

    #[test]
    fn test_undefined_references() {
        let definition = definition_from_json(
            r#"{"states": ["q0"], "alphabet": ["a"],
                "transitions": {"q0": {"a": "q1"}}, "start_state": "q0"}"#,
        );
        assert_eq!(
            NFA::from_definition(&definition),
            Err(ModelError::UndefinedState("q1".to_string()))
        );

        let definition = definition_from_json(
            r#"{"states": ["q0"], "alphabet": ["a"],
                "transitions": {"q0": {"b": "q0"}}, "start_state": "q0"}"#,
        );
        assert_eq!(
            NFA::from_definition(&definition),
            Err(ModelError::UndefinedSymbol("b".to_string()))
        );

        let definition = definition_from_json(
            r#"{"states": ["q0", "q0"], "alphabet": [], "start_state": "q0"}"#,
        );
        assert_eq!(
            NFA::from_definition(&definition),
            Err(ModelError::DuplicateState("q0".to_string()))
        );

        let definition = definition_from_json(
            r#"{"states": ["q0"], "alphabet": [], "start_state": "q0", "accept_states": ["qf"]}"#,
        );
        assert_eq!(
            NFA::from_definition(&definition),
            Err(ModelError::UndefinedState("qf".to_string()))
        );
    }

    #[test]
    fn test_epsilon_closure_contains_state() {
        let nfa = epsilon_nfa();
        for state_id in 0..nfa.get_num_states() {
            let closure = nfa.epsilon_closure(state_id);
            assert!(closure[state_id]);
            // Re-applying the closure adds nothing
            assert_eq!(nfa.closure_of_set(&closure), closure);
        }
        assert_eq!(
            nfa.epsilon_closure_of("r").unwrap(),
            vec!["s".to_string(), "p".to_string(), "r".to_string()]
        );
        assert!(nfa.epsilon_closure_of("nope").is_err());
    }

    #[test]
    fn test_epsilon_cycle_terminates() {
        let definition = definition_from_json(
            r#"{"states": ["a", "b", "c"], "alphabet": [],
                "transitions": {"a": {"ε": ["b"]}, "b": {"ε": ["c"]}, "c": {"ε": ["a"]}},
                "start_state": "a"}"#,
        );
        let nfa = NFA::from_definition(&definition).unwrap();
        assert_eq!(nfa.epsilon_closure(1).count_ones(), 3);
    }

    #[test]
    fn test_move_and_subset_name() {
        let nfa = contains_ab_nfa();
        let start = nfa.epsilon_closure(0);
        let moved = nfa.move_set(&start, 'a');
        assert_eq!(nfa.format_subset_name(&moved), "{q0,q1}");
        assert_eq!(nfa.format_subset_name(&nfa.empty_set()), "{}");
    }

    #[test]
    fn test_nfa_accepts() {
        let nfa = contains_ab_nfa();
        assert!(nfa.accepts("ab"));
        assert!(nfa.accepts("bbabaa"));
        assert!(!nfa.accepts("ba"));
        assert!(!nfa.accepts(""));
        assert!(!nfa.accepts("abc"));

        let nfa = epsilon_nfa();
        assert!(nfa.accepts("abb"));
        assert!(nfa.accepts("babb"));
        assert!(nfa.accepts("abbabb"));
        assert!(!nfa.accepts("abba"));
    }

    #[test]
    fn test_space_edges_are_not_epsilon() {
        let definition = definition_from_json(
            r#"{"states": ["q0", "q1"], "alphabet": [" "],
                "transitions": {"q0": {" ": "q1"}},
                "start_state": "q0", "accept_states": ["q1"]}"#,
        );
        let nfa = NFA::from_definition(&definition).unwrap();
        assert!(!nfa.has_epsilon_transitions());
        assert!(nfa.accepts(" "));
        assert!(!nfa.accepts(""));

        let rebuilt = NFA::from_definition(&definition_from_json(
            &serde_json::to_string(&nfa.to_definition(true)).unwrap(),
        ))
        .unwrap();
        assert_eq!(rebuilt, nfa);
    }

    #[test]
    fn test_definition_round_trip() {
        let nfa = epsilon_nfa();
        let rebuilt = NFA::from_definition(&nfa.to_definition(false)).unwrap();
        assert_eq!(rebuilt, nfa);
    }
}
