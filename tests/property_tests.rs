//! Property tests over randomly generated small machines. Language equality is checked by
//! enumerating every input up to a fixed length.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use automata_engine::dfa::{construct_dfa, construct_minimal_dfa, DFA};
use automata_engine::fa::{Symbol, SymbolString, FA};
use automata_engine::nfa::{AutomatonDefinition, Targets, NFA};
use automata_engine::pda::{
    AcceptanceType, PdaDefinition, PdaTransitionDefinition, PdaVerdict, PushdownAutomaton,
};
use automata_engine::tm::{Direction, TmDefinition, TmStatus, TmTransitionDefinition, TuringMachine};
use proptest::prelude::*;

const ALPHABET: [char; 2] = ['a', 'b'];

fn label(state: usize) -> String {
    format!("s{}", state)
}

fn all_strings(max_len: usize) -> Vec<String> {
    let mut strings = vec![String::new()];
    let mut frontier = vec![String::new()];
    for _ in 0..max_len {
        let next: Vec<String> = frontier
            .iter()
            .flat_map(|prefix| {
                ALPHABET.iter().map(move |ch| {
                    let mut string = prefix.clone();
                    string.push(*ch);
                    string
                })
            })
            .collect();
        strings.extend(next.iter().cloned());
        frontier = next;
    }
    strings
}

fn accept_labels(accepting: &[bool]) -> Vec<String> {
    accepting
        .iter()
        .enumerate()
        .filter(|(_, on)| **on)
        .map(|(state, _)| label(state))
        .collect()
}

/// `edges[state * 3 + k]` marks the destinations of state on a, b and epsilon
fn nfa_definition(n: usize, edges: &[Vec<bool>], accepting: &[bool]) -> AutomatonDefinition {
    let symbols = [Symbol::Char('a'), Symbol::Char('b'), Symbol::Epsilon];
    let mut transitions = BTreeMap::new();

    for state in 0..n {
        let mut row = BTreeMap::new();
        for (k, symbol) in symbols.iter().enumerate() {
            let targets: Vec<String> = edges[state * 3 + k]
                .iter()
                .enumerate()
                .filter(|(_, on)| **on)
                .map(|(target, _)| label(target))
                .collect();
            if !targets.is_empty() {
                row.insert(*symbol, Targets::Many(targets));
            }
        }
        if !row.is_empty() {
            transitions.insert(label(state), row);
        }
    }

    AutomatonDefinition {
        states: (0..n).map(label).collect(),
        alphabet: ALPHABET.to_vec(),
        transitions,
        start_state: Some(label(0)),
        accept_states: accept_labels(accepting),
    }
}

/// `targets[state * 2 + k]` is the destination of state on the k-th letter, if any
fn dfa_definition(n: usize, targets: &[Option<usize>], accepting: &[bool]) -> AutomatonDefinition {
    let mut transitions = BTreeMap::new();

    for state in 0..n {
        let mut row = BTreeMap::new();
        for (k, ch) in ALPHABET.iter().enumerate() {
            if let Some(target) = targets[state * 2 + k] {
                row.insert(Symbol::Char(*ch), Targets::One(label(target)));
            }
        }
        transitions.insert(label(state), row);
    }

    AutomatonDefinition {
        states: (0..n).map(label).collect(),
        alphabet: ALPHABET.to_vec(),
        transitions,
        start_state: Some(label(0)),
        accept_states: accept_labels(accepting),
    }
}

fn reachable_states(definition: &AutomatonDefinition) -> Vec<String> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut queue: VecDeque<String> = definition.start_state.iter().cloned().collect();
    seen.extend(queue.iter().cloned());

    while let Some(state) = queue.pop_front() {
        let Some(row) = definition.transitions.get(&state) else {
            continue;
        };
        for targets in row.values() {
            for target in targets.labels() {
                if seen.insert(target.clone()) {
                    queue.push_back(target.clone());
                }
            }
        }
    }
    definition
        .states
        .iter()
        .filter(|state| seen.contains(*state))
        .cloned()
        .collect()
}

/// Which inputs up to `max_len` are accepted when starting from the given state
fn residual_language(definition: &AutomatonDefinition, state: &str, max_len: usize) -> Vec<bool> {
    let mut from_state = definition.clone();
    from_state.start_state = Some(state.to_string());
    let dfa = DFA::from_definition(&from_state).unwrap();
    all_strings(max_len)
        .iter()
        .map(|input| dfa.accepts(input))
        .collect()
}

/// Residual languages of the given states that accept at least one string
fn live_languages(
    definition: &AutomatonDefinition,
    states: &[String],
    max_len: usize,
) -> Vec<Vec<bool>> {
    states
        .iter()
        .map(|state| residual_language(definition, state, max_len))
        .filter(|language| language.contains(&true))
        .collect()
}

fn arb_nfa() -> impl Strategy<Value = AutomatonDefinition> {
    (1usize..=5).prop_flat_map(|n| {
        (
            prop::collection::vec(prop::collection::vec(any::<bool>(), n), n * 3),
            prop::collection::vec(any::<bool>(), n),
        )
            .prop_map(move |(edges, accepting)| nfa_definition(n, &edges, &accepting))
    })
}

fn arb_dfa() -> impl Strategy<Value = AutomatonDefinition> {
    (1usize..=6).prop_flat_map(|n| {
        (
            prop::collection::vec(prop::option::of(0..n), n * 2),
            prop::collection::vec(any::<bool>(), n),
        )
            .prop_map(move |(targets, accepting)| dfa_definition(n, &targets, &accepting))
    })
}

fn arb_pda() -> impl Strategy<Value = PdaDefinition> {
    let transition = (
        0usize..2,
        0usize..3,
        0usize..2,
        0usize..2,
        prop::collection::vec(0usize..2, 0..3),
    );
    prop::collection::vec(transition, 0..7).prop_map(|moves| {
        let states = ["q0", "q1"];
        let stack = ["Z0", "A"];
        let inputs = [Symbol::Char('a'), Symbol::Char('b'), Symbol::Epsilon];

        PdaDefinition {
            states: states.iter().map(|s| s.to_string()).collect(),
            input_alphabet: ALPHABET.to_vec(),
            stack_alphabet: stack.iter().map(|s| s.to_string()).collect(),
            start_state: Some("q0".to_string()),
            start_stack_symbol: "Z0".to_string(),
            accept_states: vec!["q1".to_string()],
            transitions: moves
                .iter()
                .map(|(from, input, top, to, push)| PdaTransitionDefinition {
                    from: states[*from].to_string(),
                    input: inputs[*input],
                    stack_top: stack[*top].to_string(),
                    to: states[*to].to_string(),
                    stack_push: SymbolString::Symbols(
                        push.iter().map(|s| stack[*s].to_string()).collect(),
                    ),
                })
                .collect(),
            acceptance_type: AcceptanceType::FinalState,
        }
    })
}

/// Two working states, each with an optional move per tape symbol
fn arb_tm() -> impl Strategy<Value = TmDefinition> {
    let action = prop::option::of((0usize..4, 0usize..3, any::<bool>()));
    prop::collection::vec(action, 6).prop_map(|actions| {
        let states = ["q0", "q1", "qa", "qr"];
        let symbols = ['a', 'b', 'B'];

        let transitions = actions
            .iter()
            .enumerate()
            .filter_map(|(slot, action)| {
                let (to, write, right) = (*action)?;
                Some(TmTransitionDefinition {
                    from: states[slot / 3].to_string(),
                    read: symbols[slot % 3],
                    to: states[to].to_string(),
                    write: symbols[write],
                    head_move: if right {
                        Direction::Right
                    } else {
                        Direction::Left
                    },
                })
            })
            .collect();

        TmDefinition {
            states: states.iter().map(|s| s.to_string()).collect(),
            tape_alphabet: symbols.to_vec(),
            blank_symbol: 'B',
            start_state: Some("q0".to_string()),
            accept_state: "qa".to_string(),
            reject_state: "qr".to_string(),
            transitions,
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn subset_construction_preserves_language(definition in arb_nfa()) {
        let nfa = NFA::from_definition(&definition).unwrap();
        let outcome = construct_dfa(&nfa, 4096);
        let dfa = outcome.dfa().unwrap();

        prop_assert!(dfa.get_num_states() < 1 << definition.states.len());
        for input in all_strings(6) {
            prop_assert_eq!(dfa.accepts(&input), nfa.accepts(&input), "{:?}", input);
        }
    }

    #[test]
    fn subset_construction_is_reproducible(definition in arb_nfa()) {
        let nfa = NFA::from_definition(&definition).unwrap();
        let first = construct_dfa(&nfa, 4096);
        let second = construct_dfa(&nfa, 4096);
        prop_assert_eq!(first.dfa(), second.dfa());
        prop_assert_eq!(first.steps(), second.steps());
    }

    #[test]
    fn epsilon_closure_is_a_fixed_point(definition in arb_nfa()) {
        let nfa = NFA::from_definition(&definition).unwrap();
        for state in 0..nfa.get_num_states() {
            let closure = nfa.epsilon_closure(state);
            prop_assert!(closure[state]);
            prop_assert_eq!(nfa.closure_of_set(&closure), closure);
        }
    }

    #[test]
    fn minimization_preserves_language(definition in arb_dfa()) {
        let dfa = DFA::from_definition(&definition).unwrap();
        let minimal = construct_minimal_dfa(&dfa).dfa;

        prop_assert!(minimal.get_num_states() <= dfa.get_num_states());
        for input in all_strings(7) {
            prop_assert_eq!(minimal.accepts(&input), dfa.accepts(&input), "{:?}", input);
        }
    }

    #[test]
    fn minimization_is_idempotent(definition in arb_dfa()) {
        let dfa = DFA::from_definition(&definition).unwrap();
        let once = construct_minimal_dfa(&dfa).dfa;
        let twice = construct_minimal_dfa(&once).dfa;

        prop_assert_eq!(twice.get_num_states(), once.get_num_states());
        prop_assert_eq!(twice, once);
    }

    #[test]
    fn minimization_merges_every_live_equivalence(definition in arb_dfa()) {
        // Six states are told apart by strings of length at most five
        let max_len = definition.states.len();
        let dfa = DFA::from_definition(&definition).unwrap();
        let minimal = construct_minimal_dfa(&dfa).dfa.to_definition();

        let expected: BTreeSet<Vec<bool>> =
            live_languages(&definition, &reachable_states(&definition), max_len)
                .into_iter()
                .collect();
        let live = live_languages(&minimal, &minimal.states, max_len);
        let distinct: BTreeSet<Vec<bool>> = live.iter().cloned().collect();

        prop_assert_eq!(distinct.len(), live.len());
        prop_assert_eq!(distinct, expected);
    }

    #[test]
    fn minimal_dfa_of_subset_construction(definition in arb_nfa()) {
        let nfa = NFA::from_definition(&definition).unwrap();
        let outcome = construct_dfa(&nfa, 4096);
        let dfa = outcome.dfa().unwrap();
        let minimal = construct_minimal_dfa(dfa).dfa;

        for input in all_strings(6) {
            prop_assert_eq!(minimal.accepts(&input), nfa.accepts(&input), "{:?}", input);
        }
    }

    #[test]
    fn accepted_pda_runs_replay(definition in arb_pda(), input in "[ab]{0,4}") {
        let pda = PushdownAutomaton::from_definition(&definition).unwrap();
        let run = pda.accepts(&input, 2000);
        let chars: Vec<char> = input.chars().collect();

        if run.verdict == PdaVerdict::Accepted {
            prop_assert_eq!(run.trace.len(), run.moves.len() + 1);
            prop_assert_eq!(run.trace[0].state.as_str(), "q0");
            prop_assert_eq!(run.trace[0].input_position, 0);
            prop_assert_eq!(&run.trace[0].stack, &vec!["Z0".to_string()]);

            for (i, taken) in run.moves.iter().enumerate() {
                let before = &run.trace[i];
                let after = &run.trace[i + 1];
                prop_assert_eq!(&taken.from, &before.state);
                prop_assert_eq!(&taken.to, &after.state);
                prop_assert_eq!(before.stack.last(), Some(&taken.stack_top));

                let mut expected = before.stack.clone();
                expected.pop();
                if let SymbolString::Symbols(push) = &taken.stack_push {
                    expected.extend(push.iter().cloned());
                }
                prop_assert_eq!(&after.stack, &expected);

                match taken.input {
                    Symbol::Epsilon => {
                        prop_assert_eq!(after.input_position, before.input_position);
                    }
                    Symbol::Char(ch) => {
                        prop_assert_eq!(chars.get(before.input_position), Some(&ch));
                        prop_assert_eq!(after.input_position, before.input_position + 1);
                    }
                }
            }

            let last = run.trace.last().unwrap();
            prop_assert_eq!(last.state.as_str(), "q1");
            prop_assert_eq!(last.input_position, chars.len());
        } else {
            prop_assert!(run.trace.is_empty());
        }
    }

    #[test]
    fn turing_machine_runs_are_deterministic(definition in arb_tm(), input in "[ab]{0,6}") {
        let tm = TuringMachine::from_definition(&definition).unwrap();
        let first = tm.run(&input, 200);
        let second = tm.run(&input, 200);
        prop_assert_eq!(&first, &second);

        if first.status == TmStatus::DidNotHalt {
            prop_assert_eq!(first.steps, 200);
        }
        for configuration in &first.trace {
            prop_assert!(configuration.head_position < configuration.tape.chars().count());
        }
    }
}
