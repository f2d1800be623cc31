// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 sqlstage contributors

//! Node addressing and enabled-script collection
//!
//! A [`NodePath`] names any node of a catalog (the catalog itself, a
//! product, version, module, package or script). Selecting a node yields one
//! [`ScriptEntry`] per contributing script beneath it: a script contributes
//! only when it and every ancestor container are enabled.

use serde::Serialize;

use super::model::{Catalog, Tag};

/// Address of a node inside a catalog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePath {
    pub product: Option<String>,
    pub version: Option<String>,
    pub module: Option<String>,
    pub package: Option<String>,
    /// Script name or path relative to the catalog root
    pub script: Option<String>,
}

impl NodePath {
    /// The whole catalog
    pub fn catalog() -> Self {
        Self::default()
    }

    pub fn product(mut self, name: impl Into<String>) -> Self {
        self.product = Some(name.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn module(mut self, name: impl Into<String>) -> Self {
        self.module = Some(name.into());
        self
    }

    pub fn package(mut self, name: impl Into<String>) -> Self {
        self.package = Some(name.into());
        self
    }

    pub fn script(mut self, name_or_path: impl Into<String>) -> Self {
        self.script = Some(name_or_path.into());
        self
    }
}

impl std::fmt::Display for NodePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<&str> = [
            &self.product,
            &self.version,
            &self.module,
            &self.package,
            &self.script,
        ]
        .iter()
        .filter_map(|p| p.as_deref())
        .collect();

        if parts.is_empty() {
            write!(f, "*")
        } else {
            write!(f, "{}", parts.join("/"))
        }
    }
}

/// A contributing script together with the context inherited from its containers
#[derive(Debug, Clone, Serialize)]
pub struct ScriptEntry {
    pub catalog: String,
    pub product: String,
    pub product_precedence: i32,
    pub version: String,
    pub module: String,
    pub module_precedence: i32,
    pub package: String,
    pub package_precedence: i32,
    pub package_order: i32,
    pub package_connections: Vec<String>,
    pub name: String,
    /// Path relative to the catalog root
    pub path: String,
    /// Path as understood by the drive
    pub drive_path: String,
    pub tag: Tag,
    pub depends_on: Vec<String>,
    /// Declaration order across everything registered with a builder
    pub ordinal: usize,
}

impl ScriptEntry {
    /// `module/package/name`, unique within a product version
    pub fn qualified_name(&self) -> String {
        format!("{}/{}/{}", self.module, self.package, self.name)
    }

    /// `catalog:path`, unique across catalogs
    pub fn key(&self) -> String {
        format!("{}:{}", self.catalog, self.path)
    }

    /// Deterministic tie-break key inside a stage
    pub fn sequence(&self) -> (i32, usize) {
        (self.package_order, self.ordinal)
    }

    /// Product identity used to group scripts into pipelines
    pub fn product_key(&self) -> (String, String, String) {
        (self.catalog.clone(), self.product.clone(), self.version.clone())
    }
}

impl Catalog {
    /// Collect contributing scripts under a node, in declaration order
    pub fn select(&self, node: &NodePath) -> Vec<ScriptEntry> {
        let mut entries = Vec::new();

        let wanted = |want: &Option<String>, have: &str| want.as_deref().map_or(true, |w| w == have);

        for product in self.products.iter().filter(|p| p.enabled) {
            if !wanted(&node.product, &product.name) {
                continue;
            }
            for version in product.versions.iter().filter(|v| v.enabled) {
                if !wanted(&node.version, &version.version) {
                    continue;
                }
                for module in version.modules.iter().filter(|m| m.enabled) {
                    if !wanted(&node.module, &module.name) {
                        continue;
                    }
                    for package in module.packages.iter().filter(|p| p.enabled) {
                        if !wanted(&node.package, &package.name) {
                            continue;
                        }
                        for script in package.scripts.iter().filter(|s| s.enabled) {
                            let name = script.name();
                            if let Some(ref target) = node.script {
                                if *target != name && *target != script.path {
                                    continue;
                                }
                            }

                            entries.push(ScriptEntry {
                                catalog: self.name.clone(),
                                product: product.name.clone(),
                                product_precedence: product.precedence,
                                version: version.version.clone(),
                                module: module.name.clone(),
                                module_precedence: module.precedence,
                                package: package.name.clone(),
                                package_precedence: package.precedence,
                                package_order: package.order,
                                package_connections: package.connections.clone(),
                                name,
                                path: super::normalize_path(&script.path),
                                drive_path: self.drive_path(&script.path),
                                tag: script.tag(),
                                depends_on: script.depends_on.clone(),
                                ordinal: entries.len(),
                            });
                        }
                    }
                }
            }
        }

        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::from_yaml(
            r#"
name: erp
products:
  - name: erp
    versions:
      - version: "1"
        modules:
          - name: core
            packages:
              - name: schema
                scripts:
                  - path: core/create.main.sql
                  - path: core/seed.pos.sql
                    enabled: false
              - name: reports
                enabled: false
                scripts:
                  - path: reports/views.main.sql
          - name: billing
            enabled: false
            packages:
              - name: invoices
                scripts:
                  - path: billing/invoice.main.sql
  - name: crm
    enabled: false
    versions:
      - version: "1"
        modules:
          - name: contacts
            packages:
              - name: base
                scripts:
                  - path: crm/contacts.main.sql
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_disabled_ancestors_exclude_subtree() {
        let entries = catalog().select(&NodePath::catalog());
        let names: Vec<_> = entries.iter().map(|e| e.qualified_name()).collect();
        assert_eq!(names, vec!["core/schema/create"]);
    }

    #[test]
    fn test_select_subtree_of_disabled_container_is_empty() {
        let c = catalog();
        assert!(c.select(&NodePath::catalog().product("crm")).is_empty());
        assert!(c.select(&NodePath::catalog().module("billing")).is_empty());
        assert!(c.select(&NodePath::catalog().package("reports")).is_empty());
    }

    #[test]
    fn test_select_single_script_by_name_or_path() {
        let c = catalog();
        let by_name = c.select(&NodePath::catalog().product("erp").script("create"));
        let by_path = c.select(&NodePath::catalog().script("core/create.main.sql"));
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_path.len(), 1);
        assert_eq!(by_name[0].tag, Tag::Main);
    }

    #[test]
    fn test_node_path_display() {
        assert_eq!(NodePath::catalog().to_string(), "*");
        assert_eq!(
            NodePath::catalog().product("erp").module("core").to_string(),
            "erp/core"
        );
    }
}
