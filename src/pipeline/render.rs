// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 sqlstage contributors

//! Plan rendering
//!
//! Text, DOT and Mermaid views of a pipeline: stages as clusters, scripts
//! as nodes, and an edge from each dependency to its dependent.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;
use std::fmt::Write;

use crate::pipeline::Pipeline;

/// Script dependency graph of one pipeline
pub struct PlanGraph<'a> {
    pipeline: &'a Pipeline,
    graph: DiGraph<String, ()>,
    /// Nodes of each stage, in execution order
    clusters: Vec<Vec<NodeIndex>>,
    /// Dependencies outside this pipeline, by dependent node
    external: HashMap<NodeIndex, Vec<String>>,
}

impl<'a> PlanGraph<'a> {
    /// Build the graph of a pipeline
    pub fn build(pipeline: &'a Pipeline) -> Self {
        let mut graph = DiGraph::new();
        let mut key_to_index = HashMap::new();
        let mut clusters = Vec::with_capacity(pipeline.stages.len());

        for stage in &pipeline.stages {
            let mut nodes = Vec::with_capacity(stage.script_count());
            for script in stage.scripts() {
                let node = graph.add_node(script.id());
                key_to_index.insert(script.entry.key(), node);
                nodes.push(node);
            }
            clusters.push(nodes);
        }

        let mut external: HashMap<NodeIndex, Vec<String>> = HashMap::new();
        for script in pipeline.scripts() {
            let to = key_to_index[&script.entry.key()];
            for dependency in &script.dependencies {
                match key_to_index.get(dependency) {
                    Some(&from) => {
                        graph.add_edge(from, to, ());
                    }
                    None => external.entry(to).or_default().push(dependency.clone()),
                }
            }
        }

        Self {
            pipeline,
            graph,
            clusters,
            external,
        }
    }

    /// Number of dependency edges inside the pipeline
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn dependencies_of(&self, node: NodeIndex) -> Vec<String> {
        let mut names: Vec<String> = self
            .graph
            .edges_directed(node, petgraph::Direction::Incoming)
            .map(|edge| self.graph[edge.source()].clone())
            .collect();
        names.sort();
        if let Some(outside) = self.external.get(&node) {
            names.extend(outside.iter().cloned());
        }
        names
    }

    /// Execution order as an indented tree
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let target = self.pipeline.connection.as_deref().unwrap_or("no connection");
        let _ = writeln!(out, "{} → {}", self.pipeline.name, target);

        let mut position = 0;
        for (stage, nodes) in self.pipeline.stages.iter().zip(&self.clusters) {
            let _ = writeln!(
                out,
                "  {} (module {}, package {})",
                stage.name, stage.module_precedence, stage.package_precedence
            );

            let mut nodes = nodes.iter();
            for step in &stage.steps {
                let _ = writeln!(out, "    [{}]", step.tag);
                for _ in &step.scripts {
                    let Some(&node) = nodes.next() else { break };
                    position += 1;
                    let _ = write!(out, "      {}. {}", position, self.graph[node]);
                    let deps = self.dependencies_of(node);
                    if !deps.is_empty() {
                        let _ = write!(out, " [depends: {}]", deps.join(", "));
                    }
                    out.push('\n');
                }
            }
        }

        out
    }

    /// Graphviz DOT with one cluster per stage
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph pipeline {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n");
        let _ = writeln!(out, "    label=\"{}\";\n", escape(&self.pipeline.name));

        for (i, (stage, nodes)) in self.pipeline.stages.iter().zip(&self.clusters).enumerate() {
            let _ = writeln!(out, "    subgraph cluster_{} {{", i);
            let _ = writeln!(out, "        label=\"{}\";", escape(&stage.name));
            if stage.has_faults() {
                out.push_str("        color=red;\n");
            }
            for node in nodes {
                let _ = writeln!(out, "        \"{}\";", escape(&self.graph[*node]));
            }
            out.push_str("    }\n");
        }

        for edge in self.graph.edge_references() {
            let _ = writeln!(
                out,
                "    \"{}\" -> \"{}\";",
                escape(&self.graph[edge.source()]),
                escape(&self.graph[edge.target()])
            );
        }

        out.push_str("}\n");
        out
    }

    /// Mermaid flowchart with one subgraph per stage
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");

        for (i, (stage, nodes)) in self.pipeline.stages.iter().zip(&self.clusters).enumerate() {
            let _ = writeln!(out, "    subgraph stage{}[\"{}\"]", i + 1, stage.name);
            for node in nodes {
                let _ = writeln!(out, "        n{}[\"{}\"]", node.index(), self.graph[*node]);
            }
            out.push_str("    end\n");
        }

        for edge in self.graph.edge_references() {
            let _ = writeln!(out, "    n{} --> n{}", edge.source().index(), edge.target().index());
        }

        out
    }
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}
