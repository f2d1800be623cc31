// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 sqlstage contributors

//! Execution plan structures
//!
//! A [`Pipeline`] is built once per product version by the
//! [`PipelineBuilder`](super::PipelineBuilder) and is read-only afterwards.
//! Problems found while building are attached to nodes as [`Fault`]s.

use serde::Serialize;

use crate::catalog::{ScriptEntry, Tag};

/// Structural problem recorded on the node where it was found
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fault {
    /// The node is part of a dependency cycle
    Cycle { members: Vec<String> },
    /// A declared dependency matched no contributing script
    UnresolvedDependency { reference: String },
    /// Summary fault on a stage: something beneath it is faulted
    ContainsFaults,
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cycle { members } => {
                write!(f, "circular dependency: {}", members.join(" → "))?;
                if let Some(first) = members.first() {
                    write!(f, " → {}", first)?;
                }
                Ok(())
            }
            Self::UnresolvedDependency { reference } => {
                write!(f, "unresolved dependency: {}", reference)
            }
            Self::ContainsFaults => write!(f, "this stage contains faults"),
        }
    }
}

/// Execution plan for one product version
#[derive(Debug, Clone, Serialize)]
pub struct Pipeline {
    /// `<product> - <version>`
    pub name: String,
    pub catalog: String,
    pub product: String,
    pub version: String,
    /// Target connection name
    pub connection: Option<String>,
    /// Batch separator for the scripts of this pipeline
    pub batch_separator: String,
    pub stages: Vec<Stage>,
}

impl Pipeline {
    /// Whether any stage of this pipeline is faulted
    pub fn has_faults(&self) -> bool {
        self.stages.iter().any(Stage::has_faults)
    }

    /// Every fault in the tree with a location label
    pub fn faults(&self) -> Vec<(String, &Fault)> {
        let mut found = Vec::new();
        for stage in &self.stages {
            for fault in &stage.faults {
                found.push((format!("{} / {}", self.name, stage.name), fault));
            }
            for step in &stage.steps {
                for script in &step.scripts {
                    for fault in &script.faults {
                        found.push((
                            format!("{} / {} / {} / {}", self.name, stage.name, step.tag, script.id()),
                            fault,
                        ));
                    }
                }
            }
        }
        found
    }

    /// Total number of scripts in the plan
    pub fn script_count(&self) -> usize {
        self.stages.iter().map(Stage::script_count).sum()
    }

    /// Iterate scripts in execution order
    pub fn scripts(&self) -> impl Iterator<Item = &PlannedScript> {
        self.stages.iter().flat_map(|stage| stage.scripts())
    }

    /// Get a stage by name
    pub fn get_stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }
}

/// Scripts sharing one (module precedence, package precedence) pair
#[derive(Debug, Clone, Serialize)]
pub struct Stage {
    /// `Stage 1`, `Stage 2`, ... in build order
    pub name: String,
    pub module_precedence: i32,
    pub package_precedence: i32,
    /// Steps in fixed tag order
    pub steps: Vec<Step>,
    pub faults: Vec<Fault>,
}

impl Stage {
    /// Whether this stage carries a fault
    ///
    /// The builder aggregates faults from beneath the stage into a
    /// [`Fault::ContainsFaults`] summary, so this never walks the subtree.
    pub fn has_faults(&self) -> bool {
        !self.faults.is_empty()
    }

    /// Get the step for a tag
    pub fn step(&self, tag: Tag) -> Option<&Step> {
        self.steps.iter().find(|s| s.tag == tag)
    }

    /// Steps that run inside or outside the stage transaction
    pub fn steps_where(&self, transactional: bool) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(move |s| s.transactional == transactional)
    }

    /// Iterate scripts in execution order
    pub fn scripts(&self) -> impl Iterator<Item = &PlannedScript> {
        self.steps.iter().flat_map(|step| step.scripts.iter())
    }

    pub fn script_count(&self) -> usize {
        self.steps.iter().map(|s| s.scripts.len()).sum()
    }
}

/// Ordered scripts sharing one tag
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    pub tag: Tag,
    /// True for pre, main and pos
    pub transactional: bool,
    pub scripts: Vec<PlannedScript>,
}

impl Step {
    pub fn new(tag: Tag, scripts: Vec<PlannedScript>) -> Self {
        Self {
            tag,
            transactional: tag.is_transactional(),
            scripts,
        }
    }
}

/// A script placed in the plan
#[derive(Debug, Clone, Serialize)]
pub struct PlannedScript {
    #[serde(flatten)]
    pub entry: ScriptEntry,
    /// Resolved dependencies, by [`ScriptEntry::key`]
    pub dependencies: Vec<String>,
    pub faults: Vec<Fault>,
}

impl PlannedScript {
    /// Identifier used in faults, logs and errors
    pub fn id(&self) -> String {
        self.entry.qualified_name()
    }

    pub fn tag(&self) -> Tag {
        self.entry.tag
    }

    pub fn has_faults(&self) -> bool {
        !self.faults.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_display() {
        let cycle = Fault::Cycle {
            members: vec!["core/schema/x".into(), "core/schema/y".into()],
        };
        assert_eq!(
            cycle.to_string(),
            "circular dependency: core/schema/x → core/schema/y → core/schema/x"
        );
        assert_eq!(
            Fault::UnresolvedDependency { reference: "z".into() }.to_string(),
            "unresolved dependency: z"
        );
        assert_eq!(Fault::ContainsFaults.to_string(), "this stage contains faults");
    }

    #[test]
    fn test_step_transactional_follows_tag() {
        assert!(Step::new(Tag::Main, vec![]).transactional);
        assert!(!Step::new(Tag::PostTransaction, vec![]).transactional);
    }
}
