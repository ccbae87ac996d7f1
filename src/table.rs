/* Tabular views of automata for the surrounding display layer. Nothing here renders text,
 * the rows are handed over as plain strings. */

use serde::Serialize;

use crate::fa::{Symbol, FA};

/// Marker written in the accept column of accepting states
pub const ACCEPT_MARK: &str = "✓";
/// Prefix put in front of the start state's label
pub const START_MARK: &str = "→";
/// Cell content for a missing transition
pub const NO_TRANSITION: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(header: &[&str]) -> Self {
        Table {
            header: header.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    /// Find the row whose first cell is the given label (the start marker is ignored)
    pub fn row_for(&self, label: &str) -> Option<&Vec<String>> {
        self.rows.iter().find(|row| {
            row.first()
                .map(|cell| cell.trim_start_matches(START_MARK).trim() == label)
                .unwrap_or(false)
        })
    }
}

/// State by symbol grid of a finite automaton. An epsilon column is added only when some
/// state has an epsilon edge; NFA cells list destination sets as {a,b}.
pub fn transition_table<T: FA>(fa: &T) -> Table {
    let mut symbols: Vec<Symbol> = fa.get_alphabet().iter().map(|&c| Symbol::Char(c)).collect();

    let has_epsilon = (0..fa.get_num_states()).any(|state_id| {
        fa.get_state_transitions(state_id)
            .iter()
            .any(|(symbol, _)| symbol.is_epsilon())
    });
    if has_epsilon {
        symbols.push(Symbol::Epsilon);
    }

    let is_deterministic = !has_epsilon
        && (0..fa.get_num_states()).all(|state_id| {
            let transitions = fa.get_state_transitions(state_id);
            transitions.windows(2).all(|pair| pair[0].0 != pair[1].0)
        });

    let mut header = vec!["State".to_string()];
    header.extend(symbols.iter().map(|s| s.to_string()));
    header.push("Accept".to_string());

    let mut table = Table {
        header,
        rows: Vec::new(),
    };

    for state_id in 0..fa.get_num_states() {
        let label = fa.get_state_label(state_id);
        let mut row = if state_id == fa.get_start_state() {
            vec![format!("{} {}", START_MARK, label)]
        } else {
            vec![label.to_string()]
        };

        let transitions = fa.get_state_transitions(state_id);
        for symbol in &symbols {
            let targets: Vec<&str> = transitions
                .iter()
                .filter(|(s, _)| s == symbol)
                .map(|(_, target)| fa.get_state_label(*target))
                .collect();

            let cell = if targets.is_empty() {
                NO_TRANSITION.to_string()
            } else if is_deterministic {
                targets[0].to_string()
            } else {
                format!("{{{}}}", targets.join(","))
            };
            row.push(cell);
        }

        row.push(if fa.is_accepting(state_id) {
            ACCEPT_MARK.to_string()
        } else {
            String::new()
        });
        table.push_row(row);
    }

    table
}
