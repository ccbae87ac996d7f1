/* Perform subset construction to convert an NFA into a DFA
 * Apply partition refinement to generate the minimal DFA */

use bitvec::prelude::*;
use log::{debug, trace, warn};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::hash::{DefaultHasher, Hash, Hasher};

use crate::error::ModelError;
use crate::fa::{Symbol, FA};
use crate::nfa::{AutomatonDefinition, NFA};

/// A struct which is a bitvec and its hash stored together to ease fetching the hash of the bitvec
/// quickly instead of calculating it each time.

#[derive(Clone)]
struct HashedBitVec {
    bv: BitVec<u8>,
    hash: u64,
}

impl HashedBitVec {
    fn new(bv: BitVec<u8>) -> Self {
        let mut hasher = DefaultHasher::new();
        bv.hash(&mut hasher);
        let hash = hasher.finish();
        Self { bv, hash }
    }
}

impl Hash for HashedBitVec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl PartialEq for HashedBitVec {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.bv == other.bv
    }
}

impl Eq for HashedBitVec {}

/// A finite automaton whose transition relation has been verified to be single valued and free
/// of epsilon moves. Missing transitions are allowed and reject the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DFA {
    automaton: NFA,
}

/// Result of running a DFA on one input string
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Membership {
    pub input: String,
    pub accepted: bool,
    pub final_state: String,
    pub trace: Vec<String>,
    pub reason: Option<String>,
}

/// One edge recorded by subset construction: subset --symbol--> subset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubsetStep {
    pub from: String,
    pub symbol: char,
    pub to: String,
}

/// Outcome of subset construction. Running out of the state budget is not an error, the
/// partial work is still reported.
#[derive(Debug, Clone)]
pub enum SubsetOutcome {
    Complete {
        dfa: DFA,
        steps: Vec<SubsetStep>,
    },
    BudgetExhausted {
        discovered: usize,
        steps: Vec<SubsetStep>,
    },
}

impl SubsetOutcome {
    pub fn dfa(&self) -> Option<&DFA> {
        match self {
            SubsetOutcome::Complete { dfa, .. } => Some(dfa),
            SubsetOutcome::BudgetExhausted { .. } => None,
        }
    }

    pub fn steps(&self) -> &[SubsetStep] {
        match self {
            SubsetOutcome::Complete { steps, .. } => steps,
            SubsetOutcome::BudgetExhausted { steps, .. } => steps,
        }
    }
}

/// The minimal DFA together with the final partition it was read off from
#[derive(Debug, Clone)]
pub struct Minimization {
    pub dfa: DFA,
    /// Blocks of equivalent original states, listed in the order of the new states
    pub blocks: Vec<Vec<String>>,
    /// States dropped because the start state cannot reach them
    pub unreachable: Vec<String>,
    /// Number of refinement rounds, the last of which changed nothing
    pub rounds: usize,
}

/// A partition of DFA states into disjoint blocks. Block order is deterministic so that the
/// same input DFA always yields the same minimal DFA.
struct LookupTable {
    state_to_set_map: HashMap<usize, usize>,
    sets: Vec<Vec<usize>>,
}

impl LookupTable {
    fn from_sets(sets: Vec<Vec<usize>>) -> Self {
        let mut state_to_set_map = HashMap::new();
        for (set_id, set) in sets.iter().enumerate() {
            for state in set {
                state_to_set_map.insert(*state, set_id);
            }
        }
        LookupTable {
            state_to_set_map,
            sets,
        }
    }

    fn get_set_of_state(&self, state: &usize) -> Option<&usize> {
        self.state_to_set_map.get(state)
    }

    fn get_num_sets(&self) -> usize {
        self.sets.len()
    }

    fn get_sets(&self) -> &[Vec<usize>] {
        &self.sets
    }
}

impl FA for DFA {
    fn get_num_states(&self) -> usize {
        self.automaton.get_num_states()
    }

    fn get_start_state(&self) -> usize {
        self.automaton.get_start_state()
    }

    fn get_alphabet(&self) -> &BTreeSet<char> {
        self.automaton.get_alphabet()
    }

    fn get_acceptor_states(&self) -> &BitVec<u8> {
        self.automaton.get_acceptor_states()
    }

    fn get_state_label(&self, state_id: usize) -> &str {
        self.automaton.get_state_label(state_id)
    }

    fn get_state_transitions(&self, state_id: usize) -> Vec<(Symbol, usize)> {
        self.automaton.get_state_transitions(state_id)
    }
}

impl DFA {
    /// Accept an automaton as a DFA once no state has an epsilon move or two destinations on
    /// the same symbol.
    pub fn from_nfa(nfa: NFA) -> Result<DFA, ModelError> {
        for state_id in 0..nfa.get_num_states() {
            let state = match nfa.get_state(state_id) {
                Some(state) => state,
                None => continue,
            };

            for (symbol, targets) in state.get_transitions() {
                match symbol {
                    Symbol::Epsilon if !targets.is_empty() => {
                        return Err(ModelError::EpsilonInDFA(state.get_label().to_string()));
                    }
                    Symbol::Char(c) if targets.len() > 1 => {
                        return Err(ModelError::NondeterministicTransition(
                            state.get_label().to_string(),
                            c.to_string(),
                        ));
                    }
                    _ => {}
                }
            }
        }
        Ok(DFA { automaton: nfa })
    }

    pub fn from_definition(definition: &AutomatonDefinition) -> Result<DFA, ModelError> {
        DFA::from_nfa(NFA::from_definition(definition)?)
    }

    pub fn to_definition(&self) -> AutomatonDefinition {
        self.automaton.to_definition(true)
    }

    /// View the DFA through the general automaton interface
    pub fn as_nfa(&self) -> &NFA {
        &self.automaton
    }

    /// The single destination of state_id on c, if there is one
    pub fn get_transition(&self, state_id: usize, c: char) -> Option<usize> {
        self.automaton
            .get_state(state_id)?
            .get_transitions()
            .get(&Symbol::Char(c))?
            .iter()
            .next()
            .copied()
    }

    /// Run the DFA on the input and record every state visited along the way
    pub fn run(&self, input: &str) -> Membership {
        let mut current = self.get_start_state();
        let mut trace = vec![self.get_state_label(current).to_string()];

        for ch in input.chars() {
            match self.get_transition(current, ch) {
                Some(next) => {
                    current = next;
                    trace.push(self.get_state_label(current).to_string());
                }
                None => {
                    let reason = format!(
                        "No transition for symbol {:?} from state {}",
                        ch,
                        self.get_state_label(current)
                    );
                    return Membership {
                        input: input.to_string(),
                        accepted: false,
                        final_state: self.get_state_label(current).to_string(),
                        trace,
                        reason: Some(reason),
                    };
                }
            }
        }

        Membership {
            input: input.to_string(),
            accepted: self.is_accepting(current),
            final_state: self.get_state_label(current).to_string(),
            trace,
            reason: None,
        }
    }

    pub fn accepts(&self, input: &str) -> bool {
        self.run(input).accepted
    }

    /// States reachable from the start state, in breadth first order over the sorted alphabet
    fn reachable_states(&self) -> Vec<usize> {
        let mut visited: BitVec<u8, Lsb0> = BitVec::repeat(false, self.get_num_states());
        let mut order = Vec::new();
        let mut queue = VecDeque::new();

        visited.set(self.get_start_state(), true);
        queue.push_back(self.get_start_state());

        while let Some(state_id) = queue.pop_front() {
            order.push(state_id);
            for &c in self.get_alphabet() {
                if let Some(target) = self.get_transition(state_id, c) {
                    if !visited[target] {
                        visited.set(target, true);
                        queue.push_back(target);
                    }
                }
            }
        }
        order
    }
}

/// For each letter of the alphabet, the block that the state's destination lies in. None
/// stands for a missing transition.
fn get_signature(dfa: &DFA, state: usize, lookup_table: &LookupTable) -> Vec<Option<usize>> {
    dfa.get_alphabet()
        .iter()
        .map(|&c| {
            dfa.get_transition(state, c)
                .and_then(|dest| lookup_table.get_set_of_state(&dest).copied())
        })
        .collect()
}

/// Split a block into groups of states sharing a signature. Groups keep the order in which
/// their first member appears in the block.
fn split_set(dfa: &DFA, set: &[usize], lookup_table: &LookupTable) -> Vec<Vec<usize>> {
    let mut groups: Vec<(Vec<Option<usize>>, Vec<usize>)> = Vec::new();

    for &state in set {
        let signature = get_signature(dfa, state, lookup_table);
        match groups.iter_mut().find(|(sig, _)| *sig == signature) {
            Some((_, members)) => members.push(state),
            None => groups.push((signature, vec![state])),
        }
    }

    groups.into_iter().map(|(_, members)| members).collect()
}

/// Refine {accepting, non-accepting} until no block splits. Every round that changes the
/// partition adds at least one block, so rounds are capped by the number of states.
fn get_lookup_table(dfa: &DFA, reachable: &[usize]) -> (LookupTable, usize) {
    let (accepting, rejecting): (Vec<usize>, Vec<usize>) =
        reachable.iter().copied().partition(|&s| dfa.is_accepting(s));

    let start_accepting = reachable.first().map(|&s| dfa.is_accepting(s)).unwrap_or(false);
    let initial = if start_accepting {
        vec![accepting, rejecting]
    } else {
        vec![rejecting, accepting]
    };
    let initial: Vec<Vec<usize>> = initial.into_iter().filter(|set| !set.is_empty()).collect();

    let mut lookup_table = LookupTable::from_sets(initial);
    let max_rounds = reachable.len() + 1;
    let mut rounds = 0;

    loop {
        if rounds >= max_rounds {
            warn!("Partition refinement stopped after {} rounds", rounds);
            break;
        }
        rounds += 1;

        let mut new_sets = Vec::new();
        for set in lookup_table.get_sets() {
            if set.len() == 1 {
                // Cannot split a set with only 1 element
                new_sets.push(set.clone());
                continue;
            }
            new_sets.extend(split_set(dfa, set, &lookup_table));
        }

        let changed = new_sets.len() != lookup_table.get_num_sets();
        lookup_table = LookupTable::from_sets(new_sets);
        trace!(
            "Round {}: {} blocks {:?}",
            rounds,
            lookup_table.get_num_sets(),
            lookup_table.get_sets()
        );

        if !changed {
            break;
        }
    }

    (lookup_table, rounds)
}

/// Reduce a DFA to the minimum number of states accepting the same language. Unreachable
/// states are dropped first, then states are merged by partition refinement and renumbered
/// breadth first from the start state.
///
/// A missing transition and a transition into an explicit dead state are kept apart, so
/// dead states survive and the result can be larger than the smallest partial DFA. Every
/// state that can still reach acceptance is merged with all its equivalents.
pub fn construct_minimal_dfa(dfa: &DFA) -> Minimization {
    let reachable = dfa.reachable_states();

    let mut is_reachable: BitVec<u8, Lsb0> = BitVec::repeat(false, dfa.get_num_states());
    for &state in &reachable {
        is_reachable.set(state, true);
    }
    let unreachable: Vec<String> = is_reachable
        .iter_zeros()
        .map(|state| dfa.get_state_label(state).to_string())
        .collect();

    let (lookup_table, rounds) = get_lookup_table(dfa, &reachable);
    let sets = lookup_table.get_sets();

    let start_set = lookup_table
        .get_set_of_state(&dfa.get_start_state())
        .copied()
        .unwrap_or(0);

    // Number the blocks breadth first from the start block. The first member of every block
    // is its earliest reachable state and serves as the representative.
    let mut order: Vec<usize> = vec![start_set];
    let mut set_to_state: HashMap<usize, usize> = HashMap::new();
    set_to_state.insert(start_set, 0);

    let mut next = 0;
    while next < order.len() {
        let representative = sets[order[next]][0];
        next += 1;

        for &c in dfa.get_alphabet() {
            let destination_set = dfa
                .get_transition(representative, c)
                .and_then(|dest| lookup_table.get_set_of_state(&dest).copied());
            if let Some(destination_set) = destination_set {
                if !set_to_state.contains_key(&destination_set) {
                    set_to_state.insert(destination_set, order.len());
                    order.push(destination_set);
                }
            }
        }
    }

    let mut result = NFA::new();
    result.set_alphabet(dfa.get_alphabet().clone());

    let mut blocks = Vec::new();
    for &set_id in &order {
        let members = &sets[set_id];
        let state_id = result.add_state(dfa.get_state_label(members[0]).to_string());
        if dfa.is_accepting(members[0]) {
            result.set_accept_state(state_id);
        }
        blocks.push(
            members
                .iter()
                .map(|&m| dfa.get_state_label(m).to_string())
                .collect(),
        );
    }
    result.set_start_state(0);

    for (state_id, &set_id) in order.iter().enumerate() {
        let representative = sets[set_id][0];
        for &c in dfa.get_alphabet() {
            let target = dfa
                .get_transition(representative, c)
                .and_then(|dest| lookup_table.get_set_of_state(&dest))
                .and_then(|dest_set| set_to_state.get(dest_set));
            if let Some(&target) = target {
                result.add_transition(state_id, Symbol::Char(c), target);
            }
        }
    }

    debug!(
        "Minimized DFA from {} to {} states in {} rounds",
        dfa.get_num_states(),
        result.get_num_states(),
        rounds
    );

    Minimization {
        dfa: DFA { automaton: result },
        blocks,
        unreachable,
        rounds,
    }
}

///  Apply the subset construction algorithm on an NFA to build a DFA. Only subsets reachable
///  from the epsilon closure of the start state are built, and the empty subset never is.
///  Construction stops once `max_states` DFA states exist and another one is needed.
pub fn construct_dfa(nfa: &NFA, max_states: usize) -> SubsetOutcome {
    let mut result = NFA::new(); // Create new DFA
    result.set_alphabet(nfa.get_alphabet().clone()); // DFA has same alphabet as NFA

    let mut q_list: HashMap<HashedBitVec, usize> = HashMap::new(); // Mapping from nfa state set to DFA state
    let mut work_list: VecDeque<(HashedBitVec, usize)> = VecDeque::new();
    let mut steps = Vec::new();

    let q0 = HashedBitVec::new(nfa.epsilon_closure(nfa.get_start_state()));
    let d0 = result.add_state(nfa.format_subset_name(&q0.bv));
    result.set_start_state(d0);
    if nfa.contains_accepting(&q0.bv) {
        result.set_accept_state(d0);
    }
    q_list.insert(q0.clone(), d0);
    work_list.push_back((q0, d0));

    while let Some((q, dq)) = work_list.pop_front() {
        for &c in nfa.get_alphabet() {
            let end_states = nfa.move_set(&q.bv, c);
            if end_states.not_any() {
                continue;
            }

            let t = HashedBitVec::new(nfa.closure_of_set(&end_states));

            let dt = if let Some(&existing) = q_list.get(&t) {
                existing
            } else {
                if result.get_num_states() >= max_states {
                    debug!(
                        "Subset construction ran out of budget at {} states",
                        result.get_num_states()
                    );
                    return SubsetOutcome::BudgetExhausted {
                        discovered: result.get_num_states(),
                        steps,
                    };
                }

                let dt = result.add_state(nfa.format_subset_name(&t.bv));
                if nfa.contains_accepting(&t.bv) {
                    result.set_accept_state(dt);
                }
                trace!("Discovered DFA state {}", result.get_state_label(dt));

                q_list.insert(t.clone(), dt);
                work_list.push_back((t, dt));
                dt
            };

            // add a transition from dq to dt
            result.add_transition(dq, Symbol::Char(c), dt);
            steps.push(SubsetStep {
                from: result.get_state_label(dq).to_string(),
                symbol: c,
                to: result.get_state_label(dt).to_string(),
            });
        }
    }

    debug!(
        "Subset construction built {} DFA states from {} NFA states",
        result.get_num_states(),
        nfa.get_num_states()
    );

    SubsetOutcome::Complete {
        dfa: DFA { automaton: result },
        steps,
    }
}
