// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 sqlstage contributors

//! Dependency resolution
//!
//! Turns the dependency references scripts declare into edges between
//! registered scripts. A reference that matches nothing becomes a
//! [`Fault::UnresolvedDependency`] on the referencing script.
//!
//! Reference forms, tried in this order:
//!
//! - `catalog:<ref>` resolves `<ref>` inside another registered catalog
//! - paths (`./x.sql`, `../pkg/x.sql`, `core/x.main.sql`): relative to the
//!   referencing script's directory, then to the catalog root
//! - `package/script` and `module/package/script` qualified names
//! - bare names: same package, same module, same product version, catalog

use futures::future::join_all;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

use super::Fault;
use crate::catalog::{normalize_path, Drive, ScriptEntry};
use crate::errors::{SqlstageError, SqlstageResult};

/// Dependency edges and faults per script, indexed like the [`ScriptIndex`]
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub edges: Vec<Vec<usize>>,
    pub faults: Vec<Vec<Fault>>,
}

impl Resolution {
    fn with_len(len: usize) -> Self {
        Self {
            edges: vec![Vec::new(); len],
            faults: vec![Vec::new(); len],
        }
    }

    fn record(&mut self, index: usize, resolved: ResolvedScript) {
        self.edges[index] = resolved.edges;
        self.faults[index] = resolved.faults;
    }
}

#[derive(Debug, Default)]
struct ResolvedScript {
    edges: Vec<usize>,
    faults: Vec<Fault>,
}

/// Lookup tables over every registered script
#[derive(Debug)]
pub struct ScriptIndex {
    entries: Vec<Arc<ScriptEntry>>,
    by_path: HashMap<(String, String), usize>,
    catalogs: Vec<String>,
}

impl ScriptIndex {
    pub fn new(entries: Vec<Arc<ScriptEntry>>) -> Self {
        let mut by_path = HashMap::new();
        let mut catalogs: Vec<String> = Vec::new();

        for (i, entry) in entries.iter().enumerate() {
            by_path
                .entry((entry.catalog.clone(), entry.path.clone()))
                .or_insert(i);
            if !catalogs.contains(&entry.catalog) {
                catalogs.push(entry.catalog.clone());
            }
        }

        Self {
            entries,
            by_path,
            catalogs,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, index: usize) -> &ScriptEntry {
        &self.entries[index]
    }

    /// Catalog names in registration order
    pub fn catalogs(&self) -> &[String] {
        &self.catalogs
    }

    /// Indices of the scripts belonging to one catalog
    pub fn catalog_members(&self, catalog: &str) -> Vec<usize> {
        (0..self.entries.len())
            .filter(|i| self.entries[*i].catalog == catalog)
            .collect()
    }

    /// Resolve one reference made by the script at `from`
    pub fn resolve(&self, from: usize, reference: &str) -> Option<usize> {
        let origin = &self.entries[from];
        let reference = reference.trim();

        let (catalog, reference, cross) = match reference.split_once(':') {
            Some((prefix, rest)) if self.catalogs.iter().any(|c| c == prefix) => {
                (prefix, rest.trim(), prefix != origin.catalog)
            }
            _ => (origin.catalog.as_str(), reference, false),
        };
        if reference.is_empty() {
            return None;
        }

        if reference.contains('/') || reference.contains('\\') || reference.ends_with(".sql") {
            if !cross {
                let dir = origin.path.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
                let relative = normalize_path(&format!("{}/{}", dir, reference));
                if let Some(found) = self.by_path.get(&(catalog.to_string(), relative)) {
                    return Some(*found);
                }
            }
            if !reference.starts_with("./") && !reference.starts_with("../") {
                if let Some(found) = self
                    .by_path
                    .get(&(catalog.to_string(), normalize_path(reference)))
                {
                    return Some(*found);
                }
            }
        }

        let parts: Vec<&str> = reference.split('/').collect();
        let in_catalog = |e: &&Arc<ScriptEntry>| e.catalog == catalog;
        let position = |pred: &dyn Fn(&ScriptEntry) -> bool| {
            self.entries
                .iter()
                .enumerate()
                .filter(|(_, e)| in_catalog(e))
                .find(|(_, e)| pred(e))
                .map(|(i, _)| i)
        };

        match parts.as_slice() {
            [module, package, name] => {
                position(&|e: &ScriptEntry| e.module == *module && e.package == *package && e.name == *name)
            }
            [package, name] => position(&|e: &ScriptEntry| {
                !cross && e.module == origin.module && e.package == *package && e.name == *name
            })
            .or_else(|| position(&|e: &ScriptEntry| e.package == *package && e.name == *name)),
            [name] => {
                let same_version =
                    |e: &ScriptEntry| e.product == origin.product && e.version == origin.version;
                if cross {
                    return position(&|e: &ScriptEntry| e.name == *name);
                }
                position(&|e: &ScriptEntry| same_version(e) && e.module == origin.module && e.package == origin.package && e.name == *name)
                    .or_else(|| position(&|e: &ScriptEntry| same_version(e) && e.module == origin.module && e.name == *name))
                    .or_else(|| position(&|e: &ScriptEntry| same_version(e) && e.name == *name))
                    .or_else(|| position(&|e: &ScriptEntry| e.name == *name))
            }
            _ => None,
        }
    }

    fn resolve_script(&self, index: usize, inline: &[String]) -> ResolvedScript {
        let entry = &self.entries[index];
        let mut resolved = ResolvedScript::default();

        for reference in entry.depends_on.iter().chain(inline.iter()) {
            match self.resolve(index, reference) {
                Some(target) => {
                    if !resolved.edges.contains(&target) {
                        resolved.edges.push(target);
                    }
                }
                None => {
                    let fault = Fault::UnresolvedDependency {
                        reference: reference.clone(),
                    };
                    if !resolved.faults.contains(&fault) {
                        debug!(script = %entry.qualified_name(), reference = %reference, "Unresolved dependency");
                        resolved.faults.push(fault);
                    }
                }
            }
        }

        resolved
    }
}

/// Resolve the references declared in manifests, without reading scripts
pub fn resolve_declared(index: &ScriptIndex) -> Resolution {
    let mut resolution = Resolution::with_len(index.len());
    for i in 0..index.len() {
        resolution.record(i, index.resolve_script(i, &[]));
    }
    resolution
}

/// Resolve declared and inline references, one concurrent task per catalog
///
/// Completes once every catalog task has completed. A failure to read a
/// script fails the whole resolution, after all tasks have finished.
pub async fn resolve_all(index: Arc<ScriptIndex>, drive: Arc<dyn Drive>) -> SqlstageResult<Resolution> {
    let catalogs = index.catalogs().to_vec();
    info!(catalogs = catalogs.len(), scripts = index.len(), "Resolving dependencies");

    let handles: Vec<_> = catalogs
        .into_iter()
        .map(|catalog| {
            let index = Arc::clone(&index);
            let drive = Arc::clone(&drive);
            tokio::spawn(async move { resolve_catalog(&index, drive.as_ref(), &catalog).await })
        })
        .collect();

    let results = join_all(handles).await;

    let mut resolution = Resolution::with_len(index.len());
    let mut first_error = None;

    for result in results {
        match result {
            Ok(Ok(resolved)) => {
                for (i, script) in resolved {
                    resolution.record(i, script);
                }
            }
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(join_error) => {
                first_error.get_or_insert(SqlstageError::Internal {
                    message: format!("dependency resolution task failed: {}", join_error),
                });
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(resolution),
    }
}

async fn resolve_catalog(
    index: &ScriptIndex,
    drive: &dyn Drive,
    catalog: &str,
) -> SqlstageResult<Vec<(usize, ResolvedScript)>> {
    let members = index.catalog_members(catalog);
    debug!(catalog = %catalog, scripts = members.len(), "Resolving catalog");

    let mut resolved = Vec::with_capacity(members.len());
    for i in members {
        let text = drive.read_text(&index.entry(i).drive_path).await?;
        let inline = inline_references(&text);
        resolved.push((i, index.resolve_script(i, &inline)));
    }

    Ok(resolved)
}

/// References declared in script text with `-- depends: a, b`
pub fn inline_references(text: &str) -> Vec<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"(?im)^[ \t]*--[ \t]*depends[ \t]*:[ \t]*(.*?)[ \t]*\r?$")
            .expect("inline dependency pattern is valid")
    });

    pattern
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .flat_map(|m| m.as_str().split(','))
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(String::from)
        .collect()
}
