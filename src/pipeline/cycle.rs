// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 sqlstage contributors

//! Cycle detection over dependency graphs
//!
//! Depth-first traversal with three node states. Reaching a node that is
//! still in progress closes a cycle; every member of that cycle is
//! reported. A node can sit on a cycle the traversal only closes through
//! finished nodes, so each traversal ends with a strongly connected
//! component pass that reports a cycle through every such node. Visited
//! state survives across roots, so traversing from many roots reports each
//! node's cycles at most once.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;

use super::Fault;

/// A graph whose nodes can enumerate the nodes they depend on
pub trait DependencyGraph {
    type Node: Copy + Eq + Hash;

    /// Nodes that `node` depends on
    fn dependencies(&self, node: Self::Node) -> Vec<Self::Node>;
}

/// Adjacency list indexed by node
impl DependencyGraph for Vec<Vec<usize>> {
    type Node = usize;

    fn dependencies(&self, node: usize) -> Vec<usize> {
        self.get(node).cloned().unwrap_or_default()
    }
}

impl<N: Copy + Eq + Hash> DependencyGraph for HashMap<N, Vec<N>> {
    type Node = N;

    fn dependencies(&self, node: N) -> Vec<N> {
        self.get(&node).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    InProgress,
    Done,
}

struct Frame<N> {
    node: N,
    dependencies: Vec<N>,
    cursor: usize,
}

/// Restartable cycle detector
#[derive(Debug)]
pub struct CycleDetector<N> {
    state: HashMap<N, VisitState>,
    cycles: Vec<Vec<N>>,
}

impl<N: Copy + Eq + Hash> CycleDetector<N> {
    /// Create a detector with every node unvisited
    pub fn new() -> Self {
        Self {
            state: HashMap::new(),
            cycles: Vec::new(),
        }
    }

    /// Traverse everything reachable from `root`
    ///
    /// Nodes finished by an earlier call are not traversed again.
    pub fn visit<G>(&mut self, graph: &G, root: N)
    where
        G: DependencyGraph<Node = N> + ?Sized,
    {
        if self.state.contains_key(&root) {
            return;
        }

        let first_cycle = self.cycles.len();
        let mut finished: Vec<(N, Vec<N>)> = Vec::new();

        self.state.insert(root, VisitState::InProgress);
        let mut stack = vec![Frame {
            node: root,
            dependencies: graph.dependencies(root),
            cursor: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            let Some(&next) = frame.dependencies.get(frame.cursor) else {
                if let Some(done) = stack.pop() {
                    self.state.insert(done.node, VisitState::Done);
                    finished.push((done.node, done.dependencies));
                }
                continue;
            };
            frame.cursor += 1;

            match self.state.get(&next).copied() {
                None => {
                    self.state.insert(next, VisitState::InProgress);
                    stack.push(Frame {
                        node: next,
                        dependencies: graph.dependencies(next),
                        cursor: 0,
                    });
                }
                Some(VisitState::InProgress) => {
                    if let Some(start) = stack.iter().position(|f| f.node == next) {
                        self.cycles
                            .push(stack[start..].iter().map(|f| f.node).collect());
                    }
                }
                Some(VisitState::Done) => {}
            }
        }

        self.cover_components(finished, first_cycle);
    }

    /// Report a cycle through every cyclic node the traversal left uncovered
    ///
    /// `finished` holds the nodes of one traversal in finishing order. Nodes
    /// finished by earlier traversals cannot reach back into this one, so
    /// every cycle lies within it.
    fn cover_components(&mut self, finished: Vec<(N, Vec<N>)>, first_cycle: usize) {
        let mut graph: DiGraph<N, ()> = DiGraph::with_capacity(finished.len(), 0);
        let index: HashMap<N, NodeIndex> = finished
            .iter()
            .map(|(node, _)| (*node, graph.add_node(*node)))
            .collect();
        for (node, dependencies) in &finished {
            for dependency in dependencies {
                if let Some(&to) = index.get(dependency) {
                    graph.update_edge(index[node], to, ());
                }
            }
        }

        let mut covered: HashSet<N> = self.cycles[first_cycle..].iter().flatten().copied().collect();

        for mut component in tarjan_scc(&graph) {
            let cyclic = component.len() > 1 || graph.contains_edge(component[0], component[0]);
            if !cyclic {
                continue;
            }

            component.sort();
            let members: HashSet<NodeIndex> = component.iter().copied().collect();
            for &start in &component {
                if covered.contains(&graph[start]) {
                    continue;
                }
                if let Some(path) = cycle_through(&graph, &members, start) {
                    let cycle: Vec<N> = path.into_iter().map(|i| graph[i]).collect();
                    covered.extend(cycle.iter().copied());
                    self.cycles.push(cycle);
                }
            }
        }
    }

    /// Traverse from every root in turn
    pub fn visit_all<G>(&mut self, graph: &G, roots: impl IntoIterator<Item = N>)
    where
        G: DependencyGraph<Node = N> + ?Sized,
    {
        for root in roots {
            self.visit(graph, root);
        }
    }

    /// Cycles found so far, each in dependency order
    pub fn cycles(&self) -> &[Vec<N>] {
        &self.cycles
    }

    pub fn into_cycles(self) -> Vec<Vec<N>> {
        self.cycles
    }
}

impl<N: Copy + Eq + Hash> Default for CycleDetector<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Shortest cycle from `start` back to itself inside one component
///
/// The path is in dependency order and starts at `start`.
fn cycle_through<N>(graph: &DiGraph<N, ()>, members: &HashSet<NodeIndex>, start: NodeIndex) -> Option<Vec<NodeIndex>> {
    let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    let mut queue = VecDeque::from([start]);

    while let Some(current) = queue.pop_front() {
        for next in graph.neighbors(current) {
            if next == start {
                let mut path = vec![current];
                let mut node = current;
                while let Some(&previous) = parent.get(&node) {
                    path.push(previous);
                    node = previous;
                }
                path.reverse();
                return Some(path);
            }
            if members.contains(&next) && !parent.contains_key(&next) {
                parent.insert(next, current);
                queue.push_back(next);
            }
        }
    }

    None
}

/// Find every cycle reachable from `roots`
pub fn find_cycles<G>(graph: &G, roots: impl IntoIterator<Item = G::Node>) -> Vec<Vec<G::Node>>
where
    G: DependencyGraph + ?Sized,
{
    let mut detector = CycleDetector::new();
    detector.visit_all(graph, roots);
    detector.into_cycles()
}

/// Turn cycles into one [`Fault::Cycle`] per member node
///
/// Member names are rotated to start at the smallest name so the same cycle
/// found from different roots yields equal faults.
pub fn cycle_faults<N, F>(cycles: &[Vec<N>], name: F) -> HashMap<N, Vec<Fault>>
where
    N: Copy + Eq + Hash,
    F: Fn(N) -> String,
{
    let mut faults: HashMap<N, Vec<Fault>> = HashMap::new();

    for cycle in cycles {
        let mut members: Vec<String> = cycle.iter().map(|n| name(*n)).collect();
        if let Some(min) = members
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.cmp(b.1))
            .map(|(i, _)| i)
        {
            members.rotate_left(min);
        }

        let fault = Fault::Cycle { members };
        for node in cycle {
            let list = faults.entry(*node).or_default();
            if !list.contains(&fault) {
                list.push(fault.clone());
            }
        }
    }

    faults
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acyclic_graph_has_no_cycles() {
        // 0 <- 1 <- 2, 0 <- 2
        let graph: Vec<Vec<usize>> = vec![vec![], vec![0], vec![1, 0]];
        assert!(find_cycles(&graph, 0..3).is_empty());
    }

    #[test]
    fn test_two_node_cycle_reports_both_members() {
        let graph: Vec<Vec<usize>> = vec![vec![1], vec![0]];
        let cycles = find_cycles(&graph, 0..2);
        assert_eq!(cycles, vec![vec![0, 1]]);

        let faults = cycle_faults(&cycles, |n| format!("s{}", n));
        assert_eq!(faults.len(), 2);
        assert_eq!(
            faults[&1],
            vec![Fault::Cycle {
                members: vec!["s0".into(), "s1".into()]
            }]
        );
    }

    #[test]
    fn test_cycle_behind_acyclic_prefix() {
        // 0 -> 1 -> 2 -> 3 -> 1
        let graph: Vec<Vec<usize>> = vec![vec![1], vec![2], vec![3], vec![1]];
        let cycles = find_cycles(&graph, [0]);
        assert_eq!(cycles, vec![vec![1, 2, 3]]);

        let faults = cycle_faults(&cycles, |n| n.to_string());
        assert!(!faults.contains_key(&0));
        assert!(faults.contains_key(&1) && faults.contains_key(&2) && faults.contains_key(&3));
    }

    #[test]
    fn test_node_rejoining_through_finished_node_is_reported() {
        // 0 -> 1 -> 2 -> 0, and 1 -> 3 -> 2 closes a second cycle through 3
        let graph: Vec<Vec<usize>> = vec![vec![1], vec![2, 3], vec![0], vec![2]];
        let cycles = find_cycles(&graph, 0..4);
        assert_eq!(cycles, vec![vec![0, 1, 2], vec![3, 2, 0, 1]]);

        let faults = cycle_faults(&cycles, |n| n.to_string());
        for node in 0..4 {
            assert!(faults.contains_key(&node), "node {} is on a cycle", node);
        }
        assert_eq!(
            faults[&3],
            vec![Fault::Cycle {
                members: vec!["0".into(), "1".into(), "3".into(), "2".into()]
            }]
        );
    }

    #[test]
    fn test_branch_leaving_cycle_stays_clean() {
        // 0 -> 1 -> 0, and 1 -> 2 which depends on nothing
        let graph: Vec<Vec<usize>> = vec![vec![1], vec![0, 2], vec![]];
        let faults = cycle_faults(&find_cycles(&graph, 0..3), |n| n.to_string());
        assert!(faults.contains_key(&0) && faults.contains_key(&1));
        assert!(!faults.contains_key(&2));
    }

    #[test]
    fn test_self_dependency() {
        let graph: Vec<Vec<usize>> = vec![vec![0]];
        assert_eq!(find_cycles(&graph, [0]), vec![vec![0]]);
    }

    #[test]
    fn test_restart_does_not_rereport() {
        let graph: Vec<Vec<usize>> = vec![vec![1], vec![0], vec![0]];
        let mut detector = CycleDetector::new();
        detector.visit(&graph, 0);
        detector.visit(&graph, 1);
        detector.visit(&graph, 2);
        assert_eq!(detector.cycles().len(), 1);
    }

    #[test]
    fn test_rotation_makes_faults_equal() {
        let a = cycle_faults(&[vec![1usize, 2]], |n| ["", "x", "y"][n].to_string());
        let b = cycle_faults(&[vec![2usize, 1]], |n| ["", "x", "y"][n].to_string());
        assert_eq!(a[&1], b[&1]);
    }

    #[test]
    fn test_hash_map_graph() {
        let mut graph: HashMap<&str, Vec<&str>> = HashMap::new();
        graph.insert("x", vec!["y"]);
        graph.insert("y", vec!["z"]);
        graph.insert("z", vec!["x"]);
        let cycles = find_cycles(&graph, ["x"]);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), 3);
    }

    #[test]
    fn test_long_chain_does_not_overflow() {
        let graph: Vec<Vec<usize>> = (0..100_000).map(|i| if i == 0 { vec![] } else { vec![i - 1] }).collect();
        assert!(find_cycles(&graph, [99_999]).is_empty());
    }
}
