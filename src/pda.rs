/* Pushdown automata and their acceptance search.
 * Nondeterminism is handled by a breadth-first walk of the configuration graph. Every
 * configuration is visited once, which is what stops epsilon cycles from looping forever,
 * and the number of configurations expanded is capped by a move budget. */

use bitvec::prelude::*;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::error::ModelError;
use crate::fa::{Symbol, SymbolString, EPSILON};
use crate::grammar::Grammar;
use crate::table::Table;

/// Stack symbol used when a description does not name one
pub const DEFAULT_STACK_SYMBOL: &str = "Z0";

fn default_stack_symbol() -> String {
    DEFAULT_STACK_SYMBOL.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptanceType {
    #[default]
    FinalState,
    EmptyStack,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdaTransitionDefinition {
    pub from: String,
    pub input: Symbol,
    pub stack_top: String,
    pub to: String,
    /// Written bottom to top: the first symbol ends up deepest, the last one on top
    #[serde(default, alias = "push")]
    pub stack_push: SymbolString,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdaDefinition {
    pub states: Vec<String>,
    #[serde(default)]
    pub input_alphabet: Vec<char>,
    #[serde(default)]
    pub stack_alphabet: Vec<String>,
    #[serde(default, alias = "start")]
    pub start_state: Option<String>,
    #[serde(default = "default_stack_symbol")]
    pub start_stack_symbol: String,
    #[serde(default, alias = "accept")]
    pub accept_states: Vec<String>,
    #[serde(default)]
    pub transitions: Vec<PdaTransitionDefinition>,
    #[serde(default)]
    pub acceptance_type: AcceptanceType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PdaTransition {
    from: usize,
    input: Symbol,
    stack_top: usize,
    to: usize,
    push: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushdownAutomaton {
    states: Vec<String>,
    input_alphabet: BTreeSet<char>,
    stack_alphabet: Vec<String>,
    start_state: usize,
    start_stack_symbol: usize,
    accept_states: BitVec<u8>,
    transitions: Vec<PdaTransition>,
    acceptance_type: AcceptanceType,
}

/// Snapshot of a running pushdown automaton. The last stack element is the top.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Configuration {
    pub state: String,
    pub input_position: usize,
    pub stack: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PdaVerdict {
    Accepted,
    Rejected,
    /// The move budget ran out before the search was decided
    BudgetExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdaRun {
    pub input: String,
    pub verdict: PdaVerdict,
    pub configurations_explored: usize,
    /// For an accepted input, every configuration from the initial to the accepting one
    pub trace: Vec<Configuration>,
    /// The transitions taken between consecutive configurations of the trace
    pub moves: Vec<PdaTransitionDefinition>,
}

impl PdaRun {
    pub fn is_accepted(&self) -> bool {
        self.verdict == PdaVerdict::Accepted
    }
}

/// Search node: one configuration plus how it was reached
struct SearchNode {
    state: usize,
    position: usize,
    stack: Vec<usize>,
    parent: Option<(usize, usize)>,
}

impl PushdownAutomaton {
    pub fn from_definition(definition: &PdaDefinition) -> Result<PushdownAutomaton, ModelError> {
        let mut state_ids: HashMap<&str, usize> = HashMap::new();
        for (state_id, label) in definition.states.iter().enumerate() {
            if state_ids.insert(label.as_str(), state_id).is_some() {
                return Err(ModelError::DuplicateState(label.clone()));
            }
        }
        let lookup_state = |label: &str| -> Result<usize, ModelError> {
            state_ids
                .get(label)
                .copied()
                .ok_or_else(|| ModelError::UndefinedState(label.to_string()))
        };

        let start_state = match &definition.start_state {
            None => return Err(ModelError::MissingStartState(String::new())),
            Some(label) => state_ids
                .get(label.as_str())
                .copied()
                .ok_or_else(|| ModelError::MissingStartState(label.clone()))?,
        };

        let stack_alphabet: Vec<String> = definition.stack_alphabet.clone();
        let lookup_stack_symbol = |symbol: &str| -> Result<usize, ModelError> {
            stack_alphabet
                .iter()
                .position(|s| s == symbol)
                .ok_or_else(|| ModelError::UndefinedSymbol(symbol.to_string()))
        };
        let start_stack_symbol = lookup_stack_symbol(&definition.start_stack_symbol)?;

        let mut accept_states = bitvec![u8, Lsb0; 0; definition.states.len()];
        for label in &definition.accept_states {
            accept_states.set(lookup_state(label)?, true);
        }

        let input_alphabet: BTreeSet<char> = definition.input_alphabet.iter().copied().collect();

        let mut transitions = Vec::with_capacity(definition.transitions.len());
        for transition in &definition.transitions {
            if let Symbol::Char(ch) = transition.input {
                if !input_alphabet.contains(&ch) {
                    return Err(ModelError::UndefinedSymbol(ch.to_string()));
                }
            }

            let push_symbols = transition
                .stack_push
                .resolve(&stack_alphabet)
                .map_err(|rest| {
                    ModelError::UnknownProductionSymbol(transition.stack_push.to_string(), rest)
                })?;
            let push = push_symbols
                .iter()
                .map(|symbol| lookup_stack_symbol(symbol))
                .collect::<Result<Vec<usize>, ModelError>>()?;

            transitions.push(PdaTransition {
                from: lookup_state(&transition.from)?,
                input: transition.input,
                stack_top: lookup_stack_symbol(&transition.stack_top)?,
                to: lookup_state(&transition.to)?,
                push,
            });
        }

        Ok(PushdownAutomaton {
            states: definition.states.clone(),
            input_alphabet,
            stack_alphabet,
            start_state,
            start_stack_symbol,
            accept_states,
            transitions,
            acceptance_type: definition.acceptance_type,
        })
    }

    pub fn to_definition(&self) -> PdaDefinition {
        PdaDefinition {
            states: self.states.clone(),
            input_alphabet: self.input_alphabet.iter().copied().collect(),
            stack_alphabet: self.stack_alphabet.clone(),
            start_state: Some(self.states[self.start_state].clone()),
            start_stack_symbol: self.stack_alphabet[self.start_stack_symbol].clone(),
            accept_states: self
                .accept_states
                .iter_ones()
                .map(|id| self.states[id].clone())
                .collect(),
            transitions: self
                .transitions
                .iter()
                .map(|t| self.transition_definition(t))
                .collect(),
            acceptance_type: self.acceptance_type,
        }
    }

    fn transition_definition(&self, transition: &PdaTransition) -> PdaTransitionDefinition {
        PdaTransitionDefinition {
            from: self.states[transition.from].clone(),
            input: transition.input,
            stack_top: self.stack_alphabet[transition.stack_top].clone(),
            to: self.states[transition.to].clone(),
            stack_push: SymbolString::Symbols(
                transition
                    .push
                    .iter()
                    .map(|id| self.stack_alphabet[*id].clone())
                    .collect(),
            ),
        }
    }

    pub fn get_num_states(&self) -> usize {
        self.states.len()
    }

    pub fn get_acceptance_type(&self) -> AcceptanceType {
        self.acceptance_type
    }

    pub fn get_num_transitions(&self) -> usize {
        self.transitions.len()
    }

    /// One row per transition, in declaration order
    pub fn move_table(&self) -> Table {
        let mut table = Table::new(&["From State", "Input", "Stack Top", "To State", "Stack Push"]);
        for transition in &self.transitions {
            let push = if transition.push.is_empty() {
                EPSILON.to_string()
            } else {
                transition
                    .push
                    .iter()
                    .map(|id| self.stack_alphabet[*id].as_str())
                    .collect()
            };
            table.push_row(vec![
                self.states[transition.from].clone(),
                transition.input.to_string(),
                self.stack_alphabet[transition.stack_top].clone(),
                self.states[transition.to].clone(),
                push,
            ]);
        }
        table
    }

    fn configuration(&self, node: &SearchNode) -> Configuration {
        Configuration {
            state: self.states[node.state].clone(),
            input_position: node.position,
            stack: node
                .stack
                .iter()
                .map(|id| self.stack_alphabet[*id].clone())
                .collect(),
        }
    }

    fn is_accepting(&self, node: &SearchNode, input_len: usize) -> bool {
        if node.position != input_len {
            return false;
        }
        match self.acceptance_type {
            AcceptanceType::FinalState => self.accept_states[node.state],
            AcceptanceType::EmptyStack => {
                node.stack.is_empty() || node.stack == [self.start_stack_symbol]
            }
        }
    }

    fn applies(&self, transition: &PdaTransition, node: &SearchNode, input: &[char]) -> bool {
        if transition.from != node.state || node.stack.last() != Some(&transition.stack_top) {
            return false;
        }
        match transition.input {
            Symbol::Epsilon => true,
            Symbol::Char(ch) => input.get(node.position) == Some(&ch),
        }
    }

    /// Walk back from an accepting node along parent links
    fn reconstruct(&self, nodes: &[SearchNode], accepting: usize) -> (Vec<Configuration>, Vec<PdaTransitionDefinition>) {
        let mut trace = vec![self.configuration(&nodes[accepting])];
        let mut moves = Vec::new();

        let mut current = accepting;
        while let Some((parent, transition_id)) = nodes[current].parent {
            moves.push(self.transition_definition(&self.transitions[transition_id]));
            trace.push(self.configuration(&nodes[parent]));
            current = parent;
        }

        trace.reverse();
        moves.reverse();
        (trace, moves)
    }

    /// Breadth-first acceptance search expanding at most `move_budget` configurations
    pub fn accepts(&self, input: &str, move_budget: usize) -> PdaRun {
        let chars: Vec<char> = input.chars().collect();

        let mut nodes: Vec<SearchNode> = vec![SearchNode {
            state: self.start_state,
            position: 0,
            stack: vec![self.start_stack_symbol],
            parent: None,
        }];
        let mut visited: HashSet<(usize, usize, Vec<usize>)> = HashSet::new();
        visited.insert((self.start_state, 0, vec![self.start_stack_symbol]));

        let mut queue: VecDeque<usize> = VecDeque::from([0]);
        let mut explored = 0;

        let verdict = loop {
            let Some(node_id) = queue.pop_front() else {
                break PdaVerdict::Rejected;
            };
            if explored >= move_budget {
                break PdaVerdict::BudgetExhausted;
            }
            explored += 1;

            if self.is_accepting(&nodes[node_id], chars.len()) {
                let (trace, moves) = self.reconstruct(&nodes, node_id);
                debug!(
                    "PDA accepted {:?} after {} configurations, path of {} moves",
                    input,
                    explored,
                    moves.len()
                );
                return PdaRun {
                    input: input.to_string(),
                    verdict: PdaVerdict::Accepted,
                    configurations_explored: explored,
                    trace,
                    moves,
                };
            }

            for (transition_id, transition) in self.transitions.iter().enumerate() {
                let node = &nodes[node_id];
                if !self.applies(transition, node, &chars) {
                    continue;
                }

                let mut stack = node.stack.clone();
                stack.pop();
                stack.extend_from_slice(&transition.push);
                let position = match transition.input {
                    Symbol::Epsilon => node.position,
                    Symbol::Char(_) => node.position + 1,
                };

                if !visited.insert((transition.to, position, stack.clone())) {
                    continue;
                }
                trace!(
                    "{} --{}--> {} at {} with stack depth {}",
                    self.states[node.state],
                    transition.input,
                    self.states[transition.to],
                    position,
                    stack.len()
                );
                nodes.push(SearchNode {
                    state: transition.to,
                    position,
                    stack,
                    parent: Some((node_id, transition_id)),
                });
                queue.push_back(nodes.len() - 1);
            }
        };

        debug!(
            "PDA search on {:?} ended {:?} after {} configurations",
            input, verdict, explored
        );
        PdaRun {
            input: input.to_string(),
            verdict,
            configurations_explored: explored,
            trace: Vec::new(),
            moves: Vec::new(),
        }
    }

    /* Standard top-down construction: the stack holds the part of the sentential form still
     * to be matched, leftmost symbol on top. Productions are pushed reversed for that reason.
     * The final state q2 is only entered by popping the bottom marker, so final-state
     * acceptance there coincides with acceptance by empty stack. */
    pub fn from_grammar(grammar: &Grammar) -> Result<PushdownAutomaton, ModelError> {
        let mut input_alphabet = Vec::new();
        for terminal in grammar.get_terminals() {
            let mut chars = terminal.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) => input_alphabet.push(ch),
                _ => return Err(ModelError::UnsupportedTerminal(terminal.clone())),
            }
        }

        let in_use = |symbol: &str| {
            grammar.get_non_terminals().iter().any(|s| s == symbol)
                || grammar.get_terminals().iter().any(|s| s == symbol)
        };
        let mut bottom = DEFAULT_STACK_SYMBOL.to_string();
        while in_use(&bottom) {
            bottom.push('\'');
        }

        let mut stack_alphabet = vec![bottom.clone()];
        stack_alphabet.extend(grammar.get_non_terminals().iter().cloned());
        stack_alphabet.extend(grammar.get_terminals().iter().cloned());

        let move_to = |from: &str, input: Symbol, stack_top: &str, to: &str, push: Vec<String>| {
            PdaTransitionDefinition {
                from: from.to_string(),
                input,
                stack_top: stack_top.to_string(),
                to: to.to_string(),
                stack_push: SymbolString::Symbols(push),
            }
        };

        let mut transitions = vec![move_to(
            "q0",
            Symbol::Epsilon,
            bottom.as_str(),
            "q1",
            vec![bottom.clone(), grammar.get_start_symbol().to_string()],
        )];
        for (head, body) in grammar.get_rules() {
            let push = body.iter().rev().map(|s| s.to_string()).collect();
            transitions.push(move_to("q1", Symbol::Epsilon, head, "q1", push));
        }
        for (terminal, ch) in grammar.get_terminals().iter().zip(&input_alphabet) {
            transitions.push(move_to("q1", Symbol::Char(*ch), terminal.as_str(), "q1", Vec::new()));
        }
        transitions.push(move_to("q1", Symbol::Epsilon, bottom.as_str(), "q2", Vec::new()));

        let definition = PdaDefinition {
            states: vec!["q0".to_string(), "q1".to_string(), "q2".to_string()],
            input_alphabet,
            stack_alphabet,
            start_state: Some("q0".to_string()),
            start_stack_symbol: bottom,
            accept_states: vec!["q2".to_string()],
            transitions,
            acceptance_type: AcceptanceType::FinalState,
        };
        debug!(
            "Built a PDA with {} transitions from the grammar",
            definition.transitions.len()
        );
        PushdownAutomaton::from_definition(&definition)
    }
}
