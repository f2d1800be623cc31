// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 sqlstage contributors

//! Plan validation
//!
//! Collects the faults of built pipelines into a flat report and adds
//! warnings for plans that build cleanly but are unlikely to run as meant.

use std::collections::{HashMap, HashSet};

use crate::catalog::{Connection, Tag};
use crate::pipeline::{Fault, Pipeline};

/// Plan validator
pub struct PlanValidator;

/// Where a script sits in a set of pipelines
#[derive(Clone, Copy)]
struct Position {
    pipeline: usize,
    stage: usize,
    tag: Tag,
}

impl PlanValidator {
    /// Validate built pipelines
    ///
    /// Every fault except the stage summary becomes an error.
    pub fn validate(pipelines: &[Pipeline]) -> ValidationResult {
        let mut result = ValidationResult::new();

        if pipelines.is_empty() {
            result.add_warning("No enabled scripts; nothing to migrate");
        }

        let mut seen_names = HashSet::new();
        for pipeline in pipelines {
            if !seen_names.insert(&pipeline.name) {
                result.add_warning(&format!(
                    "Pipeline name '{}' is used by more than one catalog",
                    pipeline.name
                ));
            }

            for (location, fault) in pipeline.faults() {
                if *fault != Fault::ContainsFaults {
                    result.add_error(&format!("{}: {}", location, fault));
                }
            }

            if pipeline.stages.is_empty() {
                result.add_warning(&format!("Pipeline '{}' has no stages", pipeline.name));
            }
            if pipeline.connection.is_none() {
                result.add_warning(&format!(
                    "Pipeline '{}' has no target connection; declare a default connection",
                    pipeline.name
                ));
            }
        }

        Self::check_dependency_order(pipelines, &mut result);
        result
    }

    /// Check pipeline targets against declared connections
    ///
    /// `supports` answers whether a provider has a registered driver.
    pub fn validate_targets(
        pipelines: &[Pipeline],
        connections: &[Connection],
        supports: impl Fn(&str) -> bool,
    ) -> ValidationResult {
        let mut result = ValidationResult::new();

        for pipeline in pipelines {
            let Some(ref target) = pipeline.connection else {
                continue;
            };
            match connections.iter().find(|c| &c.name == target) {
                None => result.add_error(&format!(
                    "Pipeline '{}' targets unknown connection '{}'",
                    pipeline.name, target
                )),
                Some(connection) if !supports(&connection.provider) => result.add_error(&format!(
                    "Pipeline '{}': provider '{}' of connection '{}' is not available",
                    pipeline.name, connection.provider, target
                )),
                Some(_) => {}
            }
        }

        result
    }

    /// Warn about dependencies that execution order will not honor
    fn check_dependency_order(pipelines: &[Pipeline], result: &mut ValidationResult) {
        let mut positions: HashMap<String, Position> = HashMap::new();
        for (p, pipeline) in pipelines.iter().enumerate() {
            for (s, stage) in pipeline.stages.iter().enumerate() {
                for script in stage.scripts() {
                    positions.insert(
                        script.entry.key(),
                        Position {
                            pipeline: p,
                            stage: s,
                            tag: script.tag(),
                        },
                    );
                }
            }
        }

        for (p, pipeline) in pipelines.iter().enumerate() {
            for (s, stage) in pipeline.stages.iter().enumerate() {
                for script in stage.scripts() {
                    for dependency in &script.dependencies {
                        let Some(target) = positions.get(dependency) else {
                            continue;
                        };
                        let name = format!("{} / {} / {}", pipeline.name, stage.name, script.id());

                        if target.pipeline != p {
                            result.add_warning(&format!(
                                "{}: depends on {} in pipeline '{}', which runs separately",
                                name, dependency, pipelines[target.pipeline].name
                            ));
                        } else if target.stage > s {
                            result.add_warning(&format!(
                                "{}: depends on {} in later {}",
                                name, dependency, pipeline.stages[target.stage].name
                            ));
                        } else if target.stage == s && target.tag > script.tag() {
                            result.add_warning(&format!(
                                "{}: depends on {} in the later {} step",
                                name, dependency, target.tag
                            ));
                        }
                    }
                }
            }
        }
    }
}

/// Result of plan validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    /// Fold another result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
