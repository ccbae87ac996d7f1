/* Context-free grammars and bounded derivation search.
 * Ambiguity is decided in two phases: a breadth-first walk over leftmost sentential forms
 * collects short terminal strings, then every candidate is checked by enumerating its
 * leftmost derivations depth first. Two leftmost derivations for one string mean two parse
 * trees. */

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::config::GrammarLimits;
use crate::error::ModelError;
use crate::fa::{is_epsilon_marker, split_symbols, SymbolString, EPSILON};

/// Declarative form of a grammar as it arrives from the caller
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GrammarDefinition {
    #[serde(default, alias = "start")]
    pub start_symbol: Option<String>,
    #[serde(default)]
    pub non_terminals: Vec<String>,
    #[serde(default)]
    pub terminals: Vec<String>,
    /// Productions of every non-terminal, in the order they are tried
    #[serde(default)]
    pub rules: BTreeMap<String, Vec<SymbolString>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum GrammarSymbol {
    Terminal(usize),
    NonTerminal(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grammar {
    start_symbol: usize,
    non_terminals: Vec<String>,
    terminals: Vec<String>,
    /// Indexed by non-terminal id
    productions: Vec<Vec<Vec<GrammarSymbol>>>,
    /// Fewest terminals each non-terminal can derive, None if it derives no terminal string
    min_yield: Vec<Option<usize>>,
}

/// One rule application of a derivation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivationStep {
    pub non_terminal: String,
    pub production: String,
    /// The sentential form after applying the rule
    pub result: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivationOutcome {
    pub target: String,
    /// A leftmost derivation of the target, if one was found
    pub steps: Option<Vec<DerivationStep>>,
    /// True if some branch was cut by a limit before the search finished
    pub exhausted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityVerdict {
    Ambiguous,
    Unambiguous,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateCheck {
    pub string: String,
    pub derivation_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmbiguityReport {
    pub verdict: AmbiguityVerdict,
    pub witness: Option<String>,
    pub derivation_count: usize,
    /// The first two leftmost derivations of the witness
    pub derivations: Vec<Vec<DerivationStep>>,
    /// Every candidate string checked, in the order it was checked
    pub candidates: Vec<CandidateCheck>,
    /// True if neither phase cut anything short
    pub exhaustive: bool,
}

impl Grammar {
    pub fn from_definition(definition: &GrammarDefinition) -> Result<Grammar, ModelError> {
        let start = match &definition.start_symbol {
            Some(start) if !start.trim().is_empty() => start.trim(),
            _ => return Err(ModelError::MissingStartSymbol(String::new())),
        };

        let mut non_terminals: Vec<String> = Vec::new();
        for symbol in &definition.non_terminals {
            if !non_terminals.contains(symbol) {
                non_terminals.push(symbol.clone());
            }
        }
        let terminals: Vec<String> = definition
            .terminals
            .iter()
            .filter(|t| !non_terminals.contains(t) && !is_epsilon_marker(t))
            .fold(Vec::new(), |mut acc, t| {
                if !acc.contains(t) {
                    acc.push(t.clone());
                }
                acc
            });

        let start_symbol = match non_terminals.iter().position(|nt| nt == start) {
            Some(id) => id,
            None => return Err(ModelError::MissingStartSymbol(start.to_string())),
        };

        let vocabulary: Vec<String> = non_terminals.iter().chain(terminals.iter()).cloned().collect();

        let mut productions = vec![Vec::new(); non_terminals.len()];
        for (head, bodies) in &definition.rules {
            let head_id = match non_terminals.iter().position(|nt| nt == head) {
                Some(id) => id,
                None => return Err(ModelError::UndefinedNonTerminal(head.clone())),
            };

            for body in bodies {
                let symbols = body
                    .resolve(&vocabulary)
                    .map_err(|rest| ModelError::UnknownProductionSymbol(body.to_string(), rest))?;

                let production = symbols
                    .iter()
                    .map(|symbol| match non_terminals.iter().position(|nt| nt == symbol) {
                        Some(id) => GrammarSymbol::NonTerminal(id),
                        None => GrammarSymbol::Terminal(
                            terminals.iter().position(|t| t == symbol).unwrap_or_default(),
                        ),
                    })
                    .collect();
                productions[head_id].push(production);
            }
        }

        let mut grammar = Grammar {
            start_symbol,
            non_terminals,
            terminals,
            productions,
            min_yield: Vec::new(),
        };
        grammar.min_yield = grammar.compute_min_yield();
        Ok(grammar)
    }

    pub fn get_start_symbol(&self) -> &str {
        &self.non_terminals[self.start_symbol]
    }

    pub fn get_non_terminals(&self) -> &[String] {
        &self.non_terminals
    }

    pub fn get_terminals(&self) -> &[String] {
        &self.terminals
    }

    /// Every rule as (head, production symbols), heads in declaration order
    pub fn get_rules(&self) -> Vec<(&str, Vec<&str>)> {
        let mut rules = Vec::new();
        for (head, bodies) in self.productions.iter().enumerate() {
            for body in bodies {
                let symbols = body.iter().map(|s| self.symbol_label(*s)).collect();
                rules.push((self.non_terminals[head].as_str(), symbols));
            }
        }
        rules
    }

    fn symbol_label(&self, symbol: GrammarSymbol) -> &str {
        match symbol {
            GrammarSymbol::Terminal(id) => &self.terminals[id],
            GrammarSymbol::NonTerminal(id) => &self.non_terminals[id],
        }
    }

    fn render(&self, form: &[GrammarSymbol]) -> String {
        if form.is_empty() {
            return EPSILON.to_string();
        }
        form.iter().map(|s| self.symbol_label(*s)).collect()
    }

    fn render_terminals(&self, string: &[usize]) -> String {
        if string.is_empty() {
            return EPSILON.to_string();
        }
        string.iter().map(|t| self.terminals[*t].as_str()).collect()
    }

    /// Split a target string into terminal ids. None if it uses anything but terminals.
    fn tokenize(&self, text: &str) -> Option<Vec<usize>> {
        if is_epsilon_marker(text) {
            return Some(Vec::new());
        }
        let tokens = split_symbols(text, &self.terminals).ok()?;
        tokens
            .iter()
            .map(|token| self.terminals.iter().position(|t| t == token))
            .collect()
    }

    /* Least fixpoint: a non-terminal's yield is the cheapest of its productions, where a
     * terminal costs one. Values only ever decrease, so the loop terminates. */
    fn compute_min_yield(&self) -> Vec<Option<usize>> {
        let mut min_yield: Vec<Option<usize>> = vec![None; self.non_terminals.len()];
        let mut changed = true;

        while changed {
            changed = false;
            for (head, bodies) in self.productions.iter().enumerate() {
                for body in bodies {
                    let Some(cost) = Self::form_yield(&min_yield, body) else {
                        continue;
                    };
                    if min_yield[head].map_or(true, |current| cost < current) {
                        min_yield[head] = Some(cost);
                        changed = true;
                    }
                }
            }
        }
        min_yield
    }

    fn form_yield(min_yield: &[Option<usize>], form: &[GrammarSymbol]) -> Option<usize> {
        form.iter().try_fold(0usize, |total, symbol| match symbol {
            GrammarSymbol::Terminal(_) => Some(total + 1),
            GrammarSymbol::NonTerminal(id) => min_yield[*id].map(|cost| total + cost),
        })
    }

    fn replay(&self, path: &[(usize, usize)]) -> Vec<DerivationStep> {
        let mut form = vec![GrammarSymbol::NonTerminal(self.start_symbol)];
        let mut steps = Vec::with_capacity(path.len());

        for &(head, body_id) in path {
            let body = &self.productions[head][body_id];
            if let Some(position) = leftmost_non_terminal(&form) {
                form = rewrite(&form, position, body);
            }
            steps.push(DerivationStep {
                non_terminal: self.non_terminals[head].clone(),
                production: self.render(body),
                result: self.render(&form),
            });
        }
        steps
    }

    /// Find one leftmost derivation of the target within the limits
    pub fn leftmost_derivation(&self, target: &str, limits: &GrammarLimits) -> DerivationOutcome {
        let Some(tokens) = self.tokenize(target) else {
            debug!("{:?} is not a string over the terminals", target);
            return DerivationOutcome {
                target: target.to_string(),
                steps: None,
                exhausted: false,
            };
        };

        let mut search = DerivationSearch::new(self, &tokens, limits, 1, limits.max_expansions);
        search.run();

        DerivationOutcome {
            target: target.to_string(),
            steps: search.found.first().map(|path| self.replay(path)),
            exhausted: search.truncated,
        }
    }

    /* Phase one. Breadth-first over leftmost sentential forms, so the shortest derivations
     * come out first. Returns the candidates and whether anything was cut short. */
    fn collect_candidates(&self, limits: &GrammarLimits, budget: &mut usize) -> (Vec<Vec<usize>>, bool) {
        let mut candidates: Vec<Vec<usize>> = Vec::new();
        let mut seen_candidates: HashSet<Vec<usize>> = HashSet::new();
        let mut truncated = false;

        let start = vec![GrammarSymbol::NonTerminal(self.start_symbol)];
        if self.min_yield[self.start_symbol].is_none() {
            debug!("Start symbol derives no terminal string");
            return (candidates, false);
        }

        let mut seen_forms: HashSet<Vec<GrammarSymbol>> = HashSet::new();
        let mut queue: VecDeque<(Vec<GrammarSymbol>, usize)> = VecDeque::new();
        seen_forms.insert(start.clone());
        queue.push_back((start, 0));

        'search: while let Some((form, depth)) = queue.pop_front() {
            let Some(position) = leftmost_non_terminal(&form) else {
                let string: Vec<usize> = form
                    .iter()
                    .filter_map(|s| match s {
                        GrammarSymbol::Terminal(id) => Some(*id),
                        GrammarSymbol::NonTerminal(_) => None,
                    })
                    .collect();
                if seen_candidates.insert(string.clone()) {
                    trace!("Candidate {}", self.render_terminals(&string));
                    candidates.push(string);
                    if candidates.len() >= limits.max_candidates {
                        truncated |= !queue.is_empty();
                        break;
                    }
                }
                continue;
            };

            if depth >= limits.max_depth {
                truncated = true;
                continue;
            }

            let GrammarSymbol::NonTerminal(head) = form[position] else {
                continue;
            };
            for body in &self.productions[head] {
                if *budget == 0 {
                    truncated = true;
                    break 'search;
                }
                *budget -= 1;

                let next = rewrite(&form, position, body);

                match Self::form_yield(&self.min_yield, &next) {
                    None => continue,
                    Some(cost) if cost > limits.max_string_length => {
                        truncated = true;
                        continue;
                    }
                    Some(_) => {}
                }
                if seen_forms.insert(next.clone()) {
                    queue.push_back((next, depth + 1));
                }
            }
        }

        debug!(
            "Collected {} candidate strings (truncated: {})",
            candidates.len(),
            truncated
        );
        (candidates, truncated)
    }
}

fn leftmost_non_terminal(form: &[GrammarSymbol]) -> Option<usize> {
    form.iter()
        .position(|s| matches!(s, GrammarSymbol::NonTerminal(_)))
}

/// Replace the symbol at position with a production body
fn rewrite(form: &[GrammarSymbol], position: usize, body: &[GrammarSymbol]) -> Vec<GrammarSymbol> {
    let mut next = Vec::with_capacity(form.len() + body.len());
    next.extend_from_slice(&form[..position]);
    next.extend_from_slice(body);
    next.extend_from_slice(&form[position + 1..]);
    next
}

/* Phase two. Depth first enumeration of the leftmost derivations of one target. A branch
 * dies soundly when its terminal prefix disagrees with the target or when it cannot
 * possibly derive few enough terminals. Cuts by depth, form length or budget are recorded
 * as truncation. */
struct DerivationSearch<'g> {
    grammar: &'g Grammar,
    target: &'g [usize],
    max_depth: usize,
    max_form_length: usize,
    stop_after: usize,
    budget: usize,
    count: usize,
    /// Paths of (non-terminal, production index), at most two kept
    found: Vec<Vec<(usize, usize)>>,
    truncated: bool,
}

impl<'g> DerivationSearch<'g> {
    fn new(
        grammar: &'g Grammar,
        target: &'g [usize],
        limits: &GrammarLimits,
        stop_after: usize,
        budget: usize,
    ) -> Self {
        DerivationSearch {
            grammar,
            target,
            max_depth: limits.max_depth,
            max_form_length: 2 * target.len().max(1),
            stop_after,
            budget,
            count: 0,
            found: Vec::new(),
            truncated: false,
        }
    }

    /// Walk the derivation tree with an explicit stack of frames. `path` always holds the
    /// rule applications leading to the frame on top, one fewer than there are frames.
    fn run(&mut self) {
        let grammar = self.grammar;
        let start = vec![GrammarSymbol::NonTerminal(grammar.start_symbol)];
        let mut path: Vec<(usize, usize)> = Vec::new();
        let mut frames: Vec<SearchFrame> = Vec::new();

        if let Some(frame) = self.enter(start, &path) {
            frames.push(frame);
        }

        while let Some(frame) = frames.last_mut() {
            if self.count >= self.stop_after {
                return;
            }

            let bodies = &grammar.productions[frame.head];
            if frame.next_body >= bodies.len() {
                frames.pop();
                path.pop();
                continue;
            }
            if self.budget == 0 {
                self.truncated = true;
                return;
            }
            self.budget -= 1;

            let body_id = frame.next_body;
            frame.next_body += 1;
            let next = rewrite(&frame.form, frame.position, &bodies[body_id]);
            path.push((frame.head, body_id));

            match self.enter(next, &path) {
                Some(child) => frames.push(child),
                None => {
                    path.pop();
                }
            }
        }
    }

    /// Check a freshly derived form. Complete forms are counted, dead or cut branches give
    /// None, and anything else becomes a frame to expand.
    fn enter(&mut self, form: Vec<GrammarSymbol>, path: &[(usize, usize)]) -> Option<SearchFrame> {
        let leftmost = leftmost_non_terminal(&form);
        let prefix_len = leftmost.unwrap_or(form.len());

        for (i, symbol) in form[..prefix_len].iter().enumerate() {
            match symbol {
                GrammarSymbol::Terminal(id) if self.target.get(i) == Some(id) => {}
                _ => return None,
            }
        }

        let Some(position) = leftmost else {
            if prefix_len == self.target.len() {
                self.count += 1;
                if self.found.len() < 2 {
                    self.found.push(path.to_vec());
                }
            }
            return None;
        };

        match Grammar::form_yield(&self.grammar.min_yield, &form) {
            Some(cost) if cost <= self.target.len() => {}
            _ => return None,
        }

        if form.len() > self.max_form_length || path.len() >= self.max_depth {
            self.truncated = true;
            return None;
        }

        let GrammarSymbol::NonTerminal(head) = form[position] else {
            return None;
        };
        Some(SearchFrame {
            form,
            position,
            head,
            next_body: 0,
        })
    }
}

/// A sentential form being expanded, and which of its productions to try next
struct SearchFrame {
    form: Vec<GrammarSymbol>,
    position: usize,
    head: usize,
    next_body: usize,
}

/// Look for a string with two or more leftmost derivations within the given limits.
/// Unambiguous is only reported when the whole language was enumerated and nothing was cut.
pub fn find_ambiguous_witness(grammar: &Grammar, limits: &GrammarLimits) -> AmbiguityReport {
    let mut budget = limits.max_expansions;
    let (candidates, mut truncated) = grammar.collect_candidates(limits, &mut budget);

    let mut checked = Vec::new();

    for candidate in &candidates {
        let mut search = DerivationSearch::new(grammar, candidate, limits, usize::MAX, budget);
        search.run();
        budget = search.budget;
        truncated |= search.truncated;

        let string = grammar.render_terminals(candidate);
        trace!("{} has {} leftmost derivations", string, search.count);
        checked.push(CandidateCheck {
            string: string.clone(),
            derivation_count: search.count,
        });

        if search.count >= 2 {
            debug!("Ambiguous: {} has {} leftmost derivations", string, search.count);
            return AmbiguityReport {
                verdict: AmbiguityVerdict::Ambiguous,
                witness: Some(string),
                derivation_count: search.count,
                derivations: search.found.iter().map(|path| grammar.replay(path)).collect(),
                candidates: checked,
                exhaustive: !truncated,
            };
        }
    }

    let verdict = if truncated {
        AmbiguityVerdict::Unknown
    } else {
        AmbiguityVerdict::Unambiguous
    };
    debug!(
        "No ambiguous string among {} candidates, verdict {:?}",
        checked.len(),
        verdict
    );

    AmbiguityReport {
        verdict,
        witness: None,
        derivation_count: 0,
        derivations: Vec::new(),
        candidates: checked,
        exhaustive: !truncated,
    }
}

#[cfg(test)]
pub(crate) mod grammar_test_helpers {
    use super::*;

    pub fn grammar_from_json(json: &str) -> Grammar {
        let definition: GrammarDefinition = serde_json::from_str(json).unwrap();
        Grammar::from_definition(&definition).unwrap()
    }

    pub fn expression_grammar() -> Grammar {
        grammar_from_json(
            r#"{
                "start_symbol": "E",
                "non_terminals": ["E"],
                "terminals": ["id", "+", "*"],
                "rules": {"E": ["E+E", "E*E", "id"]}
            }"#,
        )
    }

    /// S -> S | a: every derivation of "a" can loop on S first
    pub fn unit_cycle_grammar() -> Grammar {
        grammar_from_json(
            r#"{
                "start_symbol": "S",
                "non_terminals": ["S"],
                "terminals": ["a"],
                "rules": {"S": ["S", "a"]}
            }"#,
        )
    }

    pub fn anbn_grammar() -> Grammar {
        grammar_from_json(
            r#"{
                "start_symbol": "S",
                "non_terminals": ["S"],
                "terminals": ["a", "b"],
                "rules": {"S": ["aSb", "ε"]}
            }"#,
        )
    }
}
