// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 sqlstage contributors

//! Script ordering inside a step
//!
//! Kahn's algorithm over the step's own scripts. Among scripts that are
//! ready at the same time the one declared first wins, so the same input
//! always yields the same order.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use super::PlannedScript;

/// Result of sorting one step
#[derive(Debug)]
pub struct SortOutcome {
    pub scripts: Vec<PlannedScript>,
    /// False when a cycle left some scripts in declaration order
    pub complete: bool,
}

/// Builds the dependency graph of a step and orders it
pub struct ScriptSorter {
    graph: DiGraph<usize, ()>,
    key_to_index: HashMap<String, NodeIndex>,
}

impl ScriptSorter {
    /// Order scripts so each follows the scripts it depends on
    ///
    /// Dependencies on scripts outside the list are ignored.
    pub fn sort(mut scripts: Vec<PlannedScript>) -> SortOutcome {
        scripts.sort_by_key(|s| s.entry.sequence());

        let sorter = Self::build(&scripts);
        let (order, complete) = sorter.order();

        let mut slots: Vec<Option<PlannedScript>> = scripts.into_iter().map(Some).collect();
        let scripts = order
            .into_iter()
            .filter_map(|position| slots[position].take())
            .collect();

        SortOutcome { scripts, complete }
    }

    fn build(scripts: &[PlannedScript]) -> Self {
        let mut sorter = Self {
            graph: DiGraph::new(),
            key_to_index: HashMap::new(),
        };

        for (position, script) in scripts.iter().enumerate() {
            let node = sorter.graph.add_node(position);
            sorter.key_to_index.insert(script.entry.key(), node);
        }

        // Edges run dependency -> dependent
        for script in scripts {
            let dependent = sorter.key_to_index[&script.entry.key()];
            for dep in &script.dependencies {
                if let Some(&dependency) = sorter.key_to_index.get(dep) {
                    if dependency != dependent && !sorter.graph.contains_edge(dependency, dependent) {
                        sorter.graph.add_edge(dependency, dependent, ());
                    }
                }
            }
        }

        sorter
    }

    /// Positions in execution order, and whether every node was placed
    fn order(&self) -> (Vec<usize>, bool) {
        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|n| (n, self.graph.neighbors_directed(n, Direction::Incoming).count()))
            .collect();

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| Reverse(self.graph[*node]))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        let mut placed = vec![false; self.graph.node_count()];

        while let Some(Reverse(position)) = ready.pop() {
            order.push(position);
            placed[position] = true;

            let node = NodeIndex::new(position);
            for dependent in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if let Some(degree) = in_degree.get_mut(&dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse(self.graph[dependent]));
                    }
                }
            }
        }

        let complete = order.len() == self.graph.node_count();
        if !complete {
            order.extend((0..placed.len()).filter(|p| !placed[*p]));
        }

        (order, complete)
    }
}
