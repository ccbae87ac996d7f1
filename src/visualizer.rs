use std::collections::HashMap;

use petgraph::dot::Dot;
use petgraph::stable_graph::EdgeReference;
use petgraph::{graph::EdgeIndex, graph::NodeIndex, prelude::StableGraph};

use crate::fa::FA;

/// Build a graph with one node per state and one edge per (source, target) pair; parallel
/// transitions are merged into a single edge labelled "a, b".
fn generate_stable_graph<T: FA>(fa: &T) -> StableGraph<String, String> {
    let mut stable_graph: StableGraph<String, String> = StableGraph::new();

    let num_states = fa.get_num_states();

    let mut edge_map: HashMap<(NodeIndex, NodeIndex), EdgeIndex> = HashMap::new();

    for state_idx in 0..num_states {
        stable_graph.add_node(fa.get_state_label(state_idx).to_string());
    }

    for state_idx in 0..num_states {
        let transition_list = fa.get_state_transitions(state_idx);

        for (symbol, edge_target) in transition_list {
            let key = (NodeIndex::new(state_idx), NodeIndex::new(edge_target));

            match edge_map.get(&key) {
                Some(edge_idx) => {
                    if let Some(label) = stable_graph.edge_weight_mut(*edge_idx) {
                        label.push_str(&format!(", {}", symbol));
                    }
                }
                None => {
                    let edge_idx = stable_graph.add_edge(key.0, key.1, symbol.to_string());
                    edge_map.insert(key, edge_idx);
                }
            }
        }
    }

    stable_graph
}

/// Render the automaton in Graphviz DOT. Accepting states are double circles and the start
/// state is drawn bold.
pub fn to_dot<T: FA>(fa: &T) -> String {
    let graph = generate_stable_graph(fa);
    let start_node = NodeIndex::new(fa.get_start_state());

    let edge_attr = |_: &StableGraph<String, String>, _: EdgeReference<String>| String::new();
    let node_attr = |_: &StableGraph<String, String>, (node, _): (NodeIndex, &String)| {
        let shape = if fa.is_accepting(node.index()) {
            "shape = doublecircle"
        } else {
            "shape = circle"
        };
        if node == start_node {
            format!("{}, style = bold", shape)
        } else {
            shape.to_string()
        }
    };

    let dot = Dot::with_attr_getters(&graph, &[], &edge_attr, &node_attr);
    format!("{}", dot)
}
