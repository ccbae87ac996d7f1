/* Task dispatch. A task names the algorithm and carries the already parsed model it runs on;
 * the solution carries the derived value, its table and the trace backing it up.
 * Nothing is shared between calls. */

use color_eyre::eyre::{Report, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::Limits;
use crate::dfa::{construct_dfa, construct_minimal_dfa, Membership, SubsetOutcome, SubsetStep, DFA};
use crate::error::ModelError;
use crate::fa::FA;
use crate::grammar::{
    find_ambiguous_witness, AmbiguityReport, DerivationOutcome, Grammar, GrammarDefinition,
};
use crate::nfa::{AutomatonDefinition, NFA};
use crate::pda::{PdaDefinition, PdaRun, PushdownAutomaton};
use crate::table::{transition_table, Table};
use crate::tm::{TmDefinition, TmRun, TuringMachine};
use crate::visualizer::to_dot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum Task {
    NfaToDfa {
        automaton: AutomatonDefinition,
    },
    DfaMinimization {
        automaton: AutomatonDefinition,
    },
    DfaMembership {
        automaton: AutomatonDefinition,
        #[serde(alias = "test_string")]
        input: String,
    },
    NfaMembership {
        automaton: AutomatonDefinition,
        #[serde(alias = "test_string")]
        input: String,
    },
    EpsilonClosure {
        automaton: AutomatonDefinition,
        /// States to close over; every state when left empty
        #[serde(default)]
        states: Vec<String>,
    },
    PdaMembership {
        automaton: PdaDefinition,
        #[serde(alias = "test_string")]
        input: String,
    },
    PdaMoveTable {
        automaton: PdaDefinition,
    },
    CfgToPda {
        grammar: GrammarDefinition,
    },
    TmTrace {
        #[serde(alias = "automaton")]
        machine: TmDefinition,
        #[serde(alias = "input_string")]
        input: String,
    },
    CfgAmbiguity {
        grammar: GrammarDefinition,
    },
    CfgDerivation {
        grammar: GrammarDefinition,
        #[serde(alias = "target_string")]
        target: String,
    },
}

impl Task {
    pub fn get_name(&self) -> &'static str {
        match self {
            Task::NfaToDfa { .. } => "nfa_to_dfa",
            Task::DfaMinimization { .. } => "dfa_minimization",
            Task::DfaMembership { .. } => "dfa_membership",
            Task::NfaMembership { .. } => "nfa_membership",
            Task::EpsilonClosure { .. } => "epsilon_closure",
            Task::PdaMembership { .. } => "pda_membership",
            Task::PdaMoveTable { .. } => "pda_move_table",
            Task::CfgToPda { .. } => "cfg_to_pda",
            Task::TmTrace { .. } => "tm_trace",
            Task::CfgAmbiguity { .. } => "cfg_ambiguity",
            Task::CfgDerivation { .. } => "cfg_derivation",
        }
    }
}

/// A task as read from a file, optionally labelled by the caller
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaskRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub task: Task,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClosureEntry {
    pub state: String,
    pub closure: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum Solution {
    NfaToDfa {
        complete: bool,
        discovered: usize,
        dfa: Option<AutomatonDefinition>,
        table: Option<Table>,
        steps: Vec<SubsetStep>,
    },
    DfaMinimization {
        original_states: usize,
        dfa: AutomatonDefinition,
        table: Table,
        blocks: Vec<Vec<String>>,
        unreachable: Vec<String>,
        rounds: usize,
    },
    DfaMembership {
        run: Membership,
    },
    NfaMembership {
        input: String,
        accepted: bool,
    },
    EpsilonClosure {
        closures: Vec<ClosureEntry>,
    },
    PdaMembership {
        run: PdaRun,
        move_table: Table,
    },
    PdaMoveTable {
        move_table: Table,
    },
    CfgToPda {
        pda: PdaDefinition,
        move_table: Table,
    },
    TmTrace {
        run: TmRun,
        move_table: Table,
    },
    CfgAmbiguity {
        report: AmbiguityReport,
    },
    CfgDerivation {
        derivation: DerivationOutcome,
    },
}

impl Solution {
    /// The derived finite automaton, if the task produced one
    pub fn get_automaton(&self) -> Option<&AutomatonDefinition> {
        match self {
            Solution::NfaToDfa { dfa, .. } => dfa.as_ref(),
            Solution::DfaMinimization { dfa, .. } => Some(dfa),
            _ => None,
        }
    }

    /// DOT rendering of the derived automaton. Ok(None) if the task derives none.
    pub fn to_dot(&self) -> Result<Option<String>> {
        let Some(definition) = self.get_automaton() else {
            return Ok(None);
        };
        let dfa = model(DFA::from_definition(definition))?;
        Ok(Some(to_dot(&dfa)))
    }
}

fn model<T>(result: std::result::Result<T, ModelError>) -> Result<T> {
    result.map_err(Report::new)
}

pub fn solve(task: &Task, limits: &Limits) -> Result<Solution> {
    debug!("Solving {}", task.get_name());

    let solution = match task {
        Task::NfaToDfa { automaton } => {
            let nfa = model(NFA::from_definition(automaton))?;
            match construct_dfa(&nfa, limits.max_dfa_states) {
                SubsetOutcome::Complete { dfa, steps } => Solution::NfaToDfa {
                    complete: true,
                    discovered: dfa.get_num_states(),
                    table: Some(transition_table(&dfa)),
                    dfa: Some(dfa.to_definition()),
                    steps,
                },
                SubsetOutcome::BudgetExhausted { discovered, steps } => Solution::NfaToDfa {
                    complete: false,
                    discovered,
                    dfa: None,
                    table: None,
                    steps,
                },
            }
        }
        Task::DfaMinimization { automaton } => {
            let dfa = model(DFA::from_definition(automaton))?;
            let minimization = construct_minimal_dfa(&dfa);
            Solution::DfaMinimization {
                original_states: dfa.get_num_states(),
                dfa: minimization.dfa.to_definition(),
                table: transition_table(&minimization.dfa),
                blocks: minimization.blocks,
                unreachable: minimization.unreachable,
                rounds: minimization.rounds,
            }
        }
        Task::DfaMembership { automaton, input } => {
            let dfa = model(DFA::from_definition(automaton))?;
            Solution::DfaMembership {
                run: dfa.run(input),
            }
        }
        Task::NfaMembership { automaton, input } => {
            let nfa = model(NFA::from_definition(automaton))?;
            Solution::NfaMembership {
                input: input.clone(),
                accepted: nfa.accepts(input),
            }
        }
        Task::EpsilonClosure { automaton, states } => {
            let nfa = model(NFA::from_definition(automaton))?;
            let labels: Vec<String> = if states.is_empty() {
                (0..nfa.get_num_states())
                    .map(|id| nfa.get_state_label(id).to_string())
                    .collect()
            } else {
                states.clone()
            };

            let mut closures = Vec::with_capacity(labels.len());
            for label in labels {
                let closure = model(nfa.epsilon_closure_of(&label))?;
                closures.push(ClosureEntry {
                    state: label,
                    closure,
                });
            }
            Solution::EpsilonClosure { closures }
        }
        Task::PdaMembership { automaton, input } => {
            let pda = model(PushdownAutomaton::from_definition(automaton))?;
            Solution::PdaMembership {
                run: pda.accepts(input, limits.pda_move_budget),
                move_table: pda.move_table(),
            }
        }
        Task::PdaMoveTable { automaton } => {
            let pda = model(PushdownAutomaton::from_definition(automaton))?;
            Solution::PdaMoveTable {
                move_table: pda.move_table(),
            }
        }
        Task::CfgToPda { grammar } => {
            let grammar = model(Grammar::from_definition(grammar))?;
            let pda = model(PushdownAutomaton::from_grammar(&grammar))?;
            Solution::CfgToPda {
                pda: pda.to_definition(),
                move_table: pda.move_table(),
            }
        }
        Task::TmTrace { machine, input } => {
            let tm = model(TuringMachine::from_definition(machine))?;
            Solution::TmTrace {
                run: tm.run(input, limits.tm_step_budget),
                move_table: tm.move_table(),
            }
        }
        Task::CfgAmbiguity { grammar } => {
            let grammar = model(Grammar::from_definition(grammar))?;
            Solution::CfgAmbiguity {
                report: find_ambiguous_witness(&grammar, &limits.grammar),
            }
        }
        Task::CfgDerivation { grammar, target } => {
            let grammar = model(Grammar::from_definition(grammar))?;
            Solution::CfgDerivation {
                derivation: grammar.leftmost_derivation(target, &limits.grammar),
            }
        }
    };

    Ok(solution)
}
