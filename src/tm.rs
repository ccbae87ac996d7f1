/* Deterministic single tape Turing machines.
 * The tape starts as the input followed by one blank and grows to the right as the head
 * walks off its end. Moving left from cell 0 keeps the head on cell 0. */

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::error::ModelError;
use crate::table::Table;

pub const DEFAULT_BLANK_SYMBOL: char = 'B';

fn default_blank_symbol() -> char {
    DEFAULT_BLANK_SYMBOL
}

/// Head movement after a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Direction {
    Left,
    Right,
}

impl TryFrom<String> for Direction {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim() {
            "L" | "l" | "Left" | "left" => Ok(Direction::Left),
            "R" | "r" | "Right" | "right" => Ok(Direction::Right),
            _ => Err(ModelError::InvalidMove(value)),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Left => write!(f, "L"),
            Direction::Right => write!(f, "R"),
        }
    }
}

impl From<Direction> for String {
    fn from(direction: Direction) -> Self {
        direction.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TmTransitionDefinition {
    pub from: String,
    pub read: char,
    pub to: String,
    pub write: char,
    #[serde(rename = "move", alias = "direction")]
    pub head_move: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TmDefinition {
    pub states: Vec<String>,
    #[serde(default)]
    pub tape_alphabet: Vec<char>,
    #[serde(default = "default_blank_symbol", alias = "blank")]
    pub blank_symbol: char,
    #[serde(default, alias = "start")]
    pub start_state: Option<String>,
    pub accept_state: String,
    pub reject_state: String,
    #[serde(default)]
    pub transitions: Vec<TmTransitionDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TmTransition {
    from: usize,
    read: char,
    to: usize,
    write: char,
    head_move: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuringMachine {
    states: Vec<String>,
    tape_alphabet: BTreeSet<char>,
    blank_symbol: char,
    start_state: usize,
    accept_state: usize,
    reject_state: usize,
    transitions: Vec<TmTransition>,
    /// (state, symbol read) -> index into transitions
    lookup: HashMap<(usize, char), usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TmConfiguration {
    pub step: usize,
    pub state: String,
    pub tape: String,
    pub head_position: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TmStatus {
    Accepted,
    /// Halted in the reject state. `implicit` is set when it got there because no
    /// transition applied.
    Rejected { implicit: bool },
    DidNotHalt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TmRun {
    pub input: String,
    pub status: TmStatus,
    pub steps: usize,
    pub final_state: String,
    /// The starting configuration followed by the configuration after every step
    pub trace: Vec<TmConfiguration>,
}

impl TmRun {
    pub fn is_accepted(&self) -> bool {
        self.status == TmStatus::Accepted
    }
}

impl TuringMachine {
    pub fn from_definition(definition: &TmDefinition) -> Result<TuringMachine, ModelError> {
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
        let accept_state = lookup_state(&definition.accept_state)?;
        let reject_state = lookup_state(&definition.reject_state)?;

        let mut tape_alphabet: BTreeSet<char> = definition.tape_alphabet.iter().copied().collect();
        tape_alphabet.insert(definition.blank_symbol);
        let check_symbol = |symbol: char| -> Result<char, ModelError> {
            if tape_alphabet.contains(&symbol) {
                Ok(symbol)
            } else {
                Err(ModelError::UndefinedSymbol(symbol.to_string()))
            }
        };

        let mut transitions = Vec::with_capacity(definition.transitions.len());
        let mut lookup = HashMap::new();
        for transition in &definition.transitions {
            let from = lookup_state(&transition.from)?;
            let read = check_symbol(transition.read)?;

            if lookup.insert((from, read), transitions.len()).is_some() {
                return Err(ModelError::ConflictingTransition(
                    transition.from.clone(),
                    read.to_string(),
                ));
            }
            transitions.push(TmTransition {
                from,
                read,
                to: lookup_state(&transition.to)?,
                write: check_symbol(transition.write)?,
                head_move: transition.head_move,
            });
        }

        Ok(TuringMachine {
            states: definition.states.clone(),
            tape_alphabet,
            blank_symbol: definition.blank_symbol,
            start_state,
            accept_state,
            reject_state,
            transitions,
            lookup,
        })
    }

    pub fn get_blank_symbol(&self) -> char {
        self.blank_symbol
    }

    pub fn get_tape_alphabet(&self) -> &BTreeSet<char> {
        &self.tape_alphabet
    }

    /// One row per transition, in declaration order
    pub fn move_table(&self) -> Table {
        let mut table = Table::new(&[
            "Current State",
            "Read Symbol",
            "Next State",
            "Write Symbol",
            "Move",
        ]);
        for transition in &self.transitions {
            table.push_row(vec![
                self.states[transition.from].clone(),
                transition.read.to_string(),
                self.states[transition.to].clone(),
                transition.write.to_string(),
                transition.head_move.to_string(),
            ]);
        }
        table
    }

    fn snapshot(&self, step: usize, state: usize, tape: &[char], head: usize) -> TmConfiguration {
        TmConfiguration {
            step,
            state: self.states[state].clone(),
            tape: tape.iter().collect(),
            head_position: head,
        }
    }

    /// Step the machine on the input until it halts or `step_budget` steps have been taken
    pub fn run(&self, input: &str, step_budget: usize) -> TmRun {
        let mut tape: Vec<char> = input.chars().collect();
        tape.push(self.blank_symbol);

        let mut state = self.start_state;
        let mut head = 0;
        let mut steps = 0;
        let mut trace = vec![self.snapshot(0, state, &tape, head)];

        let status = loop {
            if state == self.accept_state {
                break TmStatus::Accepted;
            }
            if state == self.reject_state {
                break TmStatus::Rejected { implicit: false };
            }
            if steps >= step_budget {
                break TmStatus::DidNotHalt;
            }

            let symbol = tape[head];
            let Some(&transition_id) = self.lookup.get(&(state, symbol)) else {
                trace!(
                    "No transition for ({}, {}), rejecting",
                    self.states[state],
                    symbol
                );
                state = self.reject_state;
                trace.push(self.snapshot(steps, state, &tape, head));
                break TmStatus::Rejected { implicit: true };
            };

            let transition = &self.transitions[transition_id];
            tape[head] = transition.write;
            state = transition.to;
            match transition.head_move {
                Direction::Right => {
                    head += 1;
                    if head == tape.len() {
                        tape.push(self.blank_symbol);
                    }
                }
                Direction::Left => head = head.saturating_sub(1),
            }
            steps += 1;

            trace!(
                "Step {}: {} -> {}, head at {}",
                steps,
                symbol,
                self.states[state],
                head
            );
            trace.push(self.snapshot(steps, state, &tape, head));
        };

        debug!(
            "TM run on {:?} ended {:?} after {} steps",
            input, status, steps
        );
        TmRun {
            input: input.to_string(),
            status,
            steps,
            final_state: self.states[state].clone(),
            trace,
        }
    }
}


#[cfg(test)]
mod tm_tests {
    use super::tm_test_helpers::*;
    use super::*;

    #[test]
    fn test_direction_serde() {
        let left: Direction = serde_json::from_str(r#""L""#).unwrap();
        assert_eq!(left, Direction::Left);
        assert_eq!(serde_json::to_string(&Direction::Right).unwrap(), r#""R""#);
        assert!(serde_json::from_str::<Direction>(r#""S""#).is_err());
        assert_eq!(
            Direction::try_from("up".to_string()),
            Err(ModelError::InvalidMove("up".to_string()))
        );
    }

    #[test]
    fn test_conflicting_transitions() {
        let definition: TmDefinition = serde_json::from_str(
            r#"{
                "states": ["q0", "qa", "qr"],
                "tape_alphabet": ["a"],
                "start_state": "q0",
                "accept_state": "qa",
                "reject_state": "qr",
                "transitions": [
                    {"from": "q0", "read": "a", "to": "qa", "write": "a", "move": "R"},
                    {"from": "q0", "read": "a", "to": "qr", "write": "a", "move": "L"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(
            TuringMachine::from_definition(&definition),
            Err(ModelError::ConflictingTransition(
                "q0".to_string(),
                "a".to_string()
            ))
        );
    }

    #[test]
    fn test_undefined_symbol() {
        let definition: TmDefinition = serde_json::from_str(
            r#"{
                "states": ["q0", "qa", "qr"],
                "tape_alphabet": ["a"],
                "start_state": "q0",
                "accept_state": "qa",
                "reject_state": "qr",
                "transitions": [
                    {"from": "q0", "read": "a", "to": "qa", "write": "x", "move": "R"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(
            TuringMachine::from_definition(&definition),
            Err(ModelError::UndefinedSymbol("x".to_string()))
        );
    }

    #[test]
    fn test_anbncn() {
        let _ = env_logger::builder().is_test(true).try_init();
        let tm = anbncn_tm();

        for accepted in ["abc", "aabbcc", "aaabbbccc"] {
            let run = tm.run(accepted, 1000);
            assert_eq!(run.status, TmStatus::Accepted, "{}", accepted);
            assert_eq!(run.final_state, "qaccept");
        }

        let run = tm.run("aabbc", 1000);
        assert_eq!(run.status, TmStatus::Rejected { implicit: true });
        assert_eq!(run.final_state, "qreject");

        for rejected in ["", "aabcc", "abbc", "cba"] {
            assert!(!tm.run(rejected, 1000).is_accepted(), "{}", rejected);
        }
    }

    #[test]
    fn test_trace_shape() {
        let tm = anbncn_tm();
        let run = tm.run("abc", 1000);

        assert_eq!(run.trace.len(), run.steps + 1);
        assert_eq!(run.trace[0].tape, "abcB");
        assert_eq!(run.trace[0].state, "q0");
        assert_eq!(run.trace[1].tape, "XbcB");
        assert_eq!(run.trace[1].head_position, 1);

        let last = run.trace.last().unwrap();
        assert_eq!(last.state, "qaccept");
        assert_eq!(last.tape, "XYZBB");
        for (i, configuration) in run.trace.iter().enumerate() {
            assert_eq!(configuration.step, i);
        }
    }

    #[test]
    fn test_runs_are_deterministic() {
        let tm = anbncn_tm();
        for input in ["aabbcc", "aabbc", "abcabc"] {
            assert_eq!(tm.run(input, 1000), tm.run(input, 1000));
        }
    }

    #[test]
    fn test_did_not_halt() {
        let tm = tm_from_json(
            r#"{
                "states": ["q0", "qa", "qr"],
                "tape_alphabet": ["a"],
                "start_state": "q0",
                "accept_state": "qa",
                "reject_state": "qr",
                "transitions": [
                    {"from": "q0", "read": "a", "to": "q0", "write": "a", "move": "R"},
                    {"from": "q0", "read": "B", "to": "q0", "write": "a", "move": "R"}
                ]
            }"#,
        );
        let run = tm.run("a", 25);
        assert_eq!(run.status, TmStatus::DidNotHalt);
        assert_eq!(run.steps, 25);
        assert_eq!(run.final_state, "q0");
    }

    #[test]
    fn test_left_overrun_clamps_head() {
        let tm = tm_from_json(
            r#"{
                "states": ["q0", "q1", "qa", "qr"],
                "tape_alphabet": ["a", "b"],
                "start_state": "q0",
                "accept_state": "qa",
                "reject_state": "qr",
                "transitions": [
                    {"from": "q0", "read": "a", "to": "q1", "write": "b", "move": "L"},
                    {"from": "q1", "read": "b", "to": "qa", "write": "b", "move": "R"}
                ]
            }"#,
        );
        let run = tm.run("a", 10);
        assert!(run.is_accepted());
        assert_eq!(run.trace[1].head_position, 0);
        assert_eq!(run.trace[1].tape, "bB");
    }

    #[test]
    fn test_move_table() {
        let table = anbncn_tm().move_table();
        assert_eq!(
            table.header,
            vec![
                "Current State",
                "Read Symbol",
                "Next State",
                "Write Symbol",
                "Move"
            ]
        );
        assert_eq!(table.rows.len(), 17);
        assert_eq!(table.rows[0], vec!["q0", "a", "q1", "X", "R"]);
        assert_eq!(table.rows[7], vec!["q2", "c", "q3", "Z", "L"]);
    }
}
