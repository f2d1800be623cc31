// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 sqlstage contributors

//! Catalog definition structures
//!
//! Defines the schema for `sqlstage.yaml` manifests. The same types are the
//! in-memory catalog model; they are read-only once loaded.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::{SqlstageError, SqlstageResult};

/// A loaded collection of products from one source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    /// Catalog name, used by `<catalog>:` dependency references
    pub name: String,

    /// Script root, relative to the drive
    #[serde(default)]
    pub root: String,

    /// Batch separator line (defaults to `GO`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_separator: Option<String>,

    /// Database targets
    #[serde(default)]
    pub connections: Vec<Connection>,

    /// Products in declaration order
    #[serde(default)]
    pub products: Vec<Product>,
}

impl Catalog {
    /// Load a catalog from a YAML manifest, expanding package `include` globs
    pub fn from_file(path: &Path) -> SqlstageResult<Self> {
        if !path.exists() {
            return Err(SqlstageError::ManifestNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| SqlstageError::InvalidManifest {
            reason: format!("cannot read {}: {}", path.display(), e),
            help: None,
        })?;

        let mut catalog = Self::from_yaml(&content)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        catalog.expand_includes(base)?;
        Ok(catalog)
    }

    /// Parse a catalog from a YAML string
    pub fn from_yaml(yaml: &str) -> SqlstageResult<Self> {
        let catalog: Self = serde_yaml::from_str(yaml)?;
        catalog.check()?;
        Ok(catalog)
    }

    /// Serialize the catalog to YAML
    pub fn to_yaml(&self) -> SqlstageResult<String> {
        serde_yaml::to_string(self).map_err(Into::into)
    }

    /// Batch separator for scripts of this catalog
    pub fn separator(&self) -> &str {
        self.batch_separator.as_deref().unwrap_or(DEFAULT_SEPARATOR)
    }

    /// Get a connection by name
    pub fn get_connection(&self, name: &str) -> Option<&Connection> {
        self.connections.iter().find(|c| c.name == name)
    }

    /// The connection marked as default, if any
    pub fn default_connection(&self) -> Option<&Connection> {
        self.connections.iter().find(|c| c.default)
    }

    /// Get a product by name
    pub fn get_product(&self, name: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.name == name)
    }

    /// Drive path of a script path given relative to the catalog root
    pub fn drive_path(&self, script_path: &str) -> String {
        if self.root.is_empty() {
            normalize_path(script_path)
        } else {
            normalize_path(&format!("{}/{}", self.root, script_path))
        }
    }

    /// Structural checks serde cannot express
    fn check(&self) -> SqlstageResult<()> {
        if self.name.trim().is_empty() {
            return Err(SqlstageError::InvalidManifest {
                reason: "catalog name is empty".into(),
                help: Some("Set a top-level `name:`".into()),
            });
        }

        if self.connections.iter().filter(|c| c.default).count() > 1 {
            return Err(SqlstageError::InvalidManifest {
                reason: "more than one connection is marked `default: true`".into(),
                help: None,
            });
        }

        for product in &self.products {
            for version in &product.versions {
                for module in &version.modules {
                    for package in &module.packages {
                        for script in &package.scripts {
                            if script.path.trim().is_empty() {
                                return Err(SqlstageError::InvalidManifest {
                                    reason: format!(
                                        "script with empty path in package '{}/{}'",
                                        module.name, package.name
                                    ),
                                    help: None,
                                });
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Append scripts matched by package `include` patterns
    pub fn expand_includes(&mut self, base_dir: &Path) -> SqlstageResult<()> {
        let script_root = base_dir.join(&self.root);

        for product in &mut self.products {
            for version in &mut product.versions {
                for module in &mut version.modules {
                    for package in &mut module.packages {
                        for pattern in package.include.clone() {
                            let full = script_root.join(&pattern).to_string_lossy().to_string();
                            let mut matches: Vec<_> =
                                glob::glob(&full)?.filter_map(Result::ok).collect();
                            matches.sort();

                            for found in matches {
                                let Ok(relative) = found.strip_prefix(&script_root) else {
                                    continue;
                                };
                                let relative = normalize_path(&relative.to_string_lossy());
                                if package.scripts.iter().any(|s| normalize_path(&s.path) == relative) {
                                    continue;
                                }
                                package.scripts.push(Script::new(relative));
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

/// Default batch separator
pub const DEFAULT_SEPARATOR: &str = "GO";

/// Top-level grouping of modules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub name: String,

    #[serde(default = "enabled")]
    pub enabled: bool,

    /// Ordering among sibling products
    #[serde(default)]
    pub precedence: i32,

    #[serde(default)]
    pub versions: Vec<ProductVersion>,
}

/// Version node of a product; owns the modules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductVersion {
    pub version: String,

    #[serde(default = "enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub modules: Vec<Module>,
}

/// Container of packages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub name: String,

    #[serde(default = "enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub precedence: i32,

    #[serde(default)]
    pub packages: Vec<Package>,
}

/// Ordered container of scripts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub name: String,

    #[serde(default = "enabled")]
    pub enabled: bool,

    /// Ordering among packages that share a stage
    #[serde(default)]
    pub order: i32,

    /// Ordering across packages; packages of equal precedence share a stage
    #[serde(default)]
    pub precedence: i32,

    /// Target connection names
    #[serde(default)]
    pub connections: Vec<String>,

    /// Glob patterns, relative to the catalog root, adding scripts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,

    #[serde(default)]
    pub scripts: Vec<Script>,
}

/// A named unit of SQL text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    /// File reference, relative to the catalog root
    pub path: String,

    /// Explicit name; defaults to the file name without tag suffix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Explicit tag; defaults to the file name suffix convention
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<Tag>,

    #[serde(default = "enabled")]
    pub enabled: bool,

    /// Declared dependency references (names or paths)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl Script {
    /// Script at a path with everything else defaulted
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: None,
            tag: None,
            enabled: true,
            depends_on: Vec::new(),
        }
    }

    /// Add a declared dependency
    pub fn depends_on(mut self, reference: impl Into<String>) -> Self {
        self.depends_on.push(reference.into());
        self
    }

    /// Effective tag
    pub fn tag(&self) -> Tag {
        self.tag.unwrap_or_else(|| Tag::from_file_name(&self.path))
    }

    /// Effective name
    pub fn name(&self) -> String {
        if let Some(ref name) = self.name {
            return name.clone();
        }
        let file = file_name(&self.path);
        let stem = file.strip_suffix(".sql").unwrap_or(file);
        match stem.rsplit_once('.') {
            Some((base, suffix)) if Tag::from_suffix(suffix).is_some() => base.to_string(),
            _ => stem.to_string(),
        }
    }
}

/// A named database target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub name: String,

    /// Provider identifier (e.g. `echo`)
    pub provider: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,

    /// Environment variable holding the connection string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string_env: Option<String>,

    #[serde(default)]
    pub default: bool,

    /// Bind this connection to a module
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,

    /// Bind this connection to a package
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
}

impl Connection {
    /// Connection string, reading the environment when configured that way
    pub fn resolve_connection_string(&self) -> Option<String> {
        if let Some(ref var) = self.connection_string_env {
            if let Ok(value) = std::env::var(var) {
                return Some(value);
            }
        }
        self.connection_string.clone()
    }

    /// Whether this connection is bound to the given module or package
    pub fn is_bound_to(&self, module: &str, package: &str) -> bool {
        self.module.as_deref() == Some(module) || self.package.as_deref() == Some(package)
    }
}

/// Execution phase of a script within a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tag {
    /// Runs on the bare connection before the stage transaction
    PreTransaction,
    Pre,
    Main,
    Pos,
    /// Runs on the bare connection after the stage transaction commits
    PostTransaction,
}

impl Tag {
    /// All tags in stage execution order
    pub const ALL: [Tag; 5] = [
        Tag::PreTransaction,
        Tag::Pre,
        Tag::Main,
        Tag::Pos,
        Tag::PostTransaction,
    ];

    /// Whether scripts with this tag run inside the stage transaction
    pub fn is_transactional(self) -> bool {
        matches!(self, Tag::Pre | Tag::Main | Tag::Pos)
    }

    /// Classify a file name by its suffix, e.g. `seed.pos.sql`
    pub fn from_file_name(path: &str) -> Self {
        let file = file_name(path).to_lowercase();
        let stem = file.strip_suffix(".sql").unwrap_or(&file);
        stem.rsplit_once('.')
            .and_then(|(_, suffix)| Self::from_suffix(suffix))
            .unwrap_or(Tag::Main)
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix.to_lowercase().as_str() {
            "pretran" | "pre-transaction" => Some(Tag::PreTransaction),
            "pre" => Some(Tag::Pre),
            "main" => Some(Tag::Main),
            "pos" => Some(Tag::Pos),
            "postran" | "post-transaction" => Some(Tag::PostTransaction),
            _ => None,
        }
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PreTransaction => write!(f, "pre-transaction"),
            Self::Pre => write!(f, "pre"),
            Self::Main => write!(f, "main"),
            Self::Pos => write!(f, "pos"),
            Self::PostTransaction => write!(f, "post-transaction"),
        }
    }
}

fn enabled() -> bool {
    true
}

fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Normalize a `/`-separated path, folding `.` and `..` segments
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
name: erp
root: scripts
connections:
  - name: main
    provider: echo
    default: true
products:
  - name: erp
    versions:
      - version: "1.0"
        modules:
          - name: core
            precedence: 1
            packages:
              - name: schema
                scripts:
                  - path: core/create.main.sql
                  - path: core/seed.pos.sql
                    depends_on: [create]
"#;

    #[test]
    fn test_parse_manifest() {
        let catalog = Catalog::from_yaml(MANIFEST).unwrap();
        assert_eq!(catalog.name, "erp");
        assert_eq!(catalog.separator(), "GO");
        assert_eq!(catalog.default_connection().unwrap().name, "main");

        let package = &catalog.products[0].versions[0].modules[0].packages[0];
        assert!(package.enabled);
        assert_eq!(package.scripts.len(), 2);
        assert_eq!(package.scripts[1].tag(), Tag::Pos);
        assert_eq!(package.scripts[1].name(), "seed");
        assert_eq!(package.scripts[1].depends_on, vec!["create"]);
    }

    #[test]
    fn test_manifest_rejects_two_defaults() {
        let yaml = r#"
name: x
connections:
  - { name: a, provider: echo, default: true }
  - { name: b, provider: echo, default: true }
"#;
        assert!(matches!(
            Catalog::from_yaml(yaml),
            Err(SqlstageError::InvalidManifest { .. })
        ));
    }

    #[test]
    fn test_tag_from_file_name() {
        assert_eq!(Tag::from_file_name("a/create.main.sql"), Tag::Main);
        assert_eq!(Tag::from_file_name("a/drop.PRE.sql"), Tag::Pre);
        assert_eq!(Tag::from_file_name("seed.pos.sql"), Tag::Pos);
        assert_eq!(Tag::from_file_name("idx.pretran.sql"), Tag::PreTransaction);
        assert_eq!(Tag::from_file_name("vacuum.post-transaction.sql"), Tag::PostTransaction);
        assert_eq!(Tag::from_file_name("plain.sql"), Tag::Main);
        assert_eq!(Tag::from_file_name("v1.2.sql"), Tag::Main);
    }

    #[test]
    fn test_tag_order_and_transactional() {
        let mut tags = vec![Tag::Pos, Tag::PostTransaction, Tag::Pre, Tag::Main, Tag::PreTransaction];
        tags.sort();
        assert_eq!(tags, Tag::ALL.to_vec());
        assert!(!Tag::PreTransaction.is_transactional());
        assert!(Tag::Pre.is_transactional());
        assert!(Tag::Main.is_transactional());
        assert!(Tag::Pos.is_transactional());
        assert!(!Tag::PostTransaction.is_transactional());
    }

    #[test]
    fn test_script_name_keeps_unknown_suffix() {
        assert_eq!(Script::new("x/v1.2.sql").name(), "v1.2");
        assert_eq!(Script::new("x/create.main.sql").name(), "create");
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("a/./b/../c.sql"), "a/c.sql");
        assert_eq!(normalize_path("a\\b\\c.sql"), "a/b/c.sql");
        assert_eq!(normalize_path("/a//b"), "a/b");
    }

    #[test]
    fn test_drive_path_joins_root() {
        let catalog = Catalog::from_yaml(MANIFEST).unwrap();
        assert_eq!(catalog.drive_path("core/create.main.sql"), "scripts/core/create.main.sql");
    }

    #[test]
    fn test_from_file_expands_includes() {
        let dir = tempfile::tempdir().unwrap();
        let scripts = dir.path().join("scripts").join("core");
        std::fs::create_dir_all(&scripts).unwrap();
        std::fs::write(scripts.join("b.main.sql"), "SELECT 2").unwrap();
        std::fs::write(scripts.join("a.main.sql"), "SELECT 1").unwrap();
        std::fs::write(scripts.join("notes.txt"), "").unwrap();

        let manifest = r#"
name: erp
root: scripts
products:
  - name: erp
    versions:
      - version: "1"
        modules:
          - name: core
            packages:
              - name: schema
                include: ["core/*.sql"]
                scripts:
                  - path: core/b.main.sql
                    depends_on: [a]
"#;
        let path = dir.path().join("sqlstage.yaml");
        std::fs::write(&path, manifest).unwrap();

        let catalog = Catalog::from_file(&path).unwrap();
        let package = &catalog.products[0].versions[0].modules[0].packages[0];
        let paths: Vec<_> = package.scripts.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["core/b.main.sql", "core/a.main.sql"]);
        assert_eq!(package.scripts[0].depends_on, vec!["a"]);
    }

    #[test]
    fn test_from_file_missing() {
        let result = Catalog::from_file(Path::new("/nonexistent/sqlstage.yaml"));
        assert!(matches!(result, Err(SqlstageError::ManifestNotFound { .. })));
    }

    #[test]
    fn test_unreadable_manifest_is_a_manifest_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Catalog::from_file(dir.path());
        match result {
            Err(SqlstageError::InvalidManifest { reason, .. }) => {
                assert!(reason.starts_with("cannot read"));
                assert!(reason.contains(&dir.path().display().to_string()));
            }
            other => panic!("expected InvalidManifest, got {:?}", other.map(|c| c.name)),
        }
    }

    #[test]
    fn test_to_yaml_reloads_same_catalog() {
        let catalog = Catalog::from_yaml(MANIFEST).unwrap();
        let reloaded = Catalog::from_yaml(&catalog.to_yaml().unwrap()).unwrap();

        assert_eq!(reloaded.name, catalog.name);
        assert_eq!(reloaded.separator(), "GO");
        assert_eq!(reloaded.default_connection().unwrap().name, "main");

        let package = &reloaded.products[0].versions[0].modules[0].packages[0];
        assert_eq!(package.scripts.len(), 2);
        assert_eq!(package.scripts[1].tag(), Tag::Pos);
        assert_eq!(package.scripts[1].depends_on, vec!["create"]);
    }
}
