// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 sqlstage contributors

//! Pipeline builder
//!
//! Groups contributing scripts into one [`Pipeline`] per product version,
//! one [`Stage`] per (module precedence, package precedence) pair and one
//! [`Step`] per tag, then validates the result. Problems become faults on
//! the plan; building itself never fails on bad data.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::cycle::{cycle_faults, CycleDetector};
use super::resolver::{resolve_all, resolve_declared, Resolution, ScriptIndex};
use super::sorter::ScriptSorter;
use super::{Fault, Pipeline, PlannedScript, Stage, Step};
use crate::catalog::{Catalog, Drive, NodePath, ScriptEntry, Tag, DEFAULT_SEPARATOR};
use crate::errors::{SqlstageError, SqlstageResult};

/// Catalog data a pipeline needs after scripts are flattened
#[derive(Debug, Clone)]
struct CatalogSettings {
    separator: String,
    connections: Vec<crate::catalog::Connection>,
}

/// Builder for migration pipelines
pub struct PipelineBuilder {
    entries: Vec<Arc<ScriptEntry>>,
    seen: HashSet<String>,
    catalogs: HashMap<String, CatalogSettings>,
    drive: Option<Arc<dyn Drive>>,
    resolution: Option<Resolution>,
}

impl PipelineBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            seen: HashSet::new(),
            catalogs: HashMap::new(),
            drive: None,
            resolution: None,
        }
    }

    /// Register the source script text is read from
    pub fn with_drive(mut self, drive: Arc<dyn Drive>) -> Self {
        self.drive = Some(drive);
        self
    }

    /// Register the enabled scripts beneath a catalog node
    ///
    /// Scripts already registered are skipped. Returns how many were added.
    pub fn add_scripts(&mut self, catalog: &Catalog, node: &NodePath) -> usize {
        self.catalogs
            .entry(catalog.name.clone())
            .or_insert_with(|| CatalogSettings {
                separator: catalog.separator().to_string(),
                connections: catalog.connections.clone(),
            });

        let mut added = 0;
        for mut entry in catalog.select(node) {
            if !self.seen.insert(entry.key()) {
                continue;
            }
            entry.ordinal = self.entries.len();
            self.entries.push(Arc::new(entry));
            added += 1;
        }

        if added == 0 {
            warn!(catalog = %catalog.name, node = %node, "No enabled scripts under node");
        } else {
            debug!(catalog = %catalog.name, node = %node, added, "Registered scripts");
            self.resolution = None;
        }

        added
    }

    /// Register every enabled script of a catalog
    pub fn add_catalog(&mut self, catalog: &Catalog) -> usize {
        self.add_scripts(catalog, &NodePath::catalog())
    }

    /// Number of registered scripts
    pub fn script_count(&self) -> usize {
        self.entries.len()
    }

    /// Resolve declared and inline dependencies by reading script text
    ///
    /// Without this call, [`build_pipelines`](Self::build_pipelines) only
    /// uses dependencies declared in manifests.
    pub async fn resolve_dependencies(&mut self) -> SqlstageResult<()> {
        let drive = self.drive.clone().ok_or(SqlstageError::DriveNotRegistered)?;
        let index = Arc::new(ScriptIndex::new(self.entries.clone()));
        self.resolution = Some(resolve_all(index, drive).await?);
        Ok(())
    }

    /// Build one pipeline per product version, ordered by product precedence
    pub fn build_pipelines(&self) -> Vec<Pipeline> {
        let index = ScriptIndex::new(self.entries.clone());
        let mut resolution = match self.resolution {
            Some(ref r) if r.edges.len() == index.len() => r.clone(),
            _ => resolve_declared(&index),
        };

        // Repository-wide pass: catches cycles that cross stages and products
        let mut detector = CycleDetector::new();
        detector.visit_all(&resolution.edges, 0..index.len());
        let repository_faults = cycle_faults(detector.cycles(), |i| index.entry(i).qualified_name());
        merge_faults(&mut resolution.faults, repository_faults);

        let mut products: Vec<((String, String, String), Vec<usize>)> = Vec::new();
        for i in 0..index.len() {
            let key = index.entry(i).product_key();
            match products.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(i),
                None => products.push((key, vec![i])),
            }
        }
        products.sort_by_key(|(_, members)| {
            let first = index.entry(members[0]);
            (first.product_precedence, first.ordinal)
        });

        let pipelines: Vec<Pipeline> = products
            .into_iter()
            .map(|(_, members)| self.build_pipeline(&index, &resolution, &members))
            .collect();

        info!(
            pipelines = pipelines.len(),
            scripts = index.len(),
            faulted = pipelines.iter().filter(|p| p.has_faults()).count(),
            "Built migration plan"
        );

        pipelines
    }

    fn build_pipeline(&self, index: &ScriptIndex, resolution: &Resolution, members: &[usize]) -> Pipeline {
        let first = index.entry(members[0]);
        let name = format!("{} - {}", first.product, first.version);

        let mut groups: BTreeMap<(i32, i32), Vec<usize>> = BTreeMap::new();
        for &i in members {
            let entry = index.entry(i);
            groups
                .entry((entry.module_precedence, entry.package_precedence))
                .or_default()
                .push(i);
        }

        let stages: Vec<Stage> = groups
            .into_iter()
            .enumerate()
            .map(|(n, ((module_precedence, package_precedence), scripts))| {
                let stage_name = format!("Stage {}", n + 1);
                build_stage(index, resolution, stage_name, module_precedence, package_precedence, &scripts)
            })
            .collect();

        let settings = self.catalogs.get(&first.catalog);
        let connection = settings.and_then(|s| select_connection(s, index, members));
        if connection.is_none() {
            debug!(pipeline = %name, "No connection targets this pipeline");
        }

        debug!(pipeline = %name, stages = stages.len(), "Built pipeline");

        Pipeline {
            name,
            catalog: first.catalog.clone(),
            product: first.product.clone(),
            version: first.version.clone(),
            connection,
            batch_separator: settings
                .map(|s| s.separator.clone())
                .unwrap_or_else(|| DEFAULT_SEPARATOR.to_string()),
            stages,
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn build_stage(
    index: &ScriptIndex,
    resolution: &Resolution,
    name: String,
    module_precedence: i32,
    package_precedence: i32,
    members: &[usize],
) -> Stage {
    // Stage pass: cycles among this stage's own scripts
    let in_stage: HashSet<usize> = members.iter().copied().collect();
    let stage_graph: HashMap<usize, Vec<usize>> = members
        .iter()
        .map(|&i| {
            let deps = resolution.edges[i]
                .iter()
                .copied()
                .filter(|d| in_stage.contains(d))
                .collect();
            (i, deps)
        })
        .collect();

    let mut ordered = members.to_vec();
    ordered.sort_by_key(|i| index.entry(*i).sequence());

    let mut detector = CycleDetector::new();
    detector.visit_all(&stage_graph, ordered.iter().copied());
    let mut stage_faults = cycle_faults(detector.cycles(), |i| index.entry(i).qualified_name());

    let mut by_tag: BTreeMap<Tag, Vec<PlannedScript>> = BTreeMap::new();
    for &i in &ordered {
        let entry = index.entry(i);
        let mut faults = resolution.faults[i].clone();
        for fault in stage_faults.remove(&i).unwrap_or_default() {
            if !faults.contains(&fault) {
                faults.push(fault);
            }
        }

        by_tag.entry(entry.tag).or_default().push(PlannedScript {
            entry: entry.clone(),
            dependencies: resolution.edges[i].iter().map(|d| index.entry(*d).key()).collect(),
            faults,
        });
    }

    let steps: Vec<Step> = by_tag
        .into_iter()
        .map(|(tag, scripts)| {
            let outcome = ScriptSorter::sort(scripts);
            if !outcome.complete {
                debug!(stage = %name, tag = %tag, "Cycle in step; kept declaration order for cyclic scripts");
            }
            Step::new(tag, outcome.scripts)
        })
        .collect();

    let mut faults = Vec::new();
    let faulted: Vec<String> = steps
        .iter()
        .flat_map(|s| s.scripts.iter())
        .filter(|s| s.has_faults())
        .map(PlannedScript::id)
        .collect();
    if !faulted.is_empty() {
        warn!(stage = %name, scripts = ?faulted, "Stage contains faults");
        faults.push(Fault::ContainsFaults);
    }

    Stage {
        name,
        module_precedence,
        package_precedence,
        steps,
        faults,
    }
}

fn merge_faults(target: &mut [Vec<Fault>], found: HashMap<usize, Vec<Fault>>) {
    for (i, faults) in found {
        for fault in faults {
            if !target[i].contains(&fault) {
                target[i].push(fault);
            }
        }
    }
}

/// Pick the connection a pipeline targets
///
/// First a connection named by a contributing package, then one bound to a
/// contributing module or package, then the catalog default.
fn select_connection(settings: &CatalogSettings, index: &ScriptIndex, members: &[usize]) -> Option<String> {
    let named = members
        .iter()
        .flat_map(|i| index.entry(*i).package_connections.iter())
        .next();
    if let Some(name) = named {
        return Some(name.clone());
    }

    let bound = settings.connections.iter().find(|c| {
        members.iter().any(|i| {
            let entry = index.entry(*i);
            c.is_bound_to(&entry.module, &entry.package)
        })
    });
    if let Some(connection) = bound {
        return Some(connection.name.clone());
    }

    settings
        .connections
        .iter()
        .find(|c| c.default)
        .map(|c| c.name.clone())
}
