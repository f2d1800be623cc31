// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 sqlstage contributors

//! Recovery suggestions
//!
//! Actionable next steps printed next to plan faults and configuration errors.

use crate::pipeline::Fault;

/// A recovery suggestion with concrete steps
#[derive(Debug, Clone)]
pub struct RecoverySuggestion {
    /// Brief description of what to do
    pub action: String,
    /// Detailed steps
    pub steps: Vec<String>,
    /// Commands to run
    pub commands: Vec<String>,
}

impl RecoverySuggestion {
    /// Suggest a fix for a fault found while planning
    pub fn for_fault(fault: &Fault) -> Option<Self> {
        match fault {
            Fault::Cycle { members } => Some(Self::fix_circular_dependency(members)),
            Fault::UnresolvedDependency { reference } => Some(Self::fix_unresolved(reference)),
            Fault::ContainsFaults => None,
        }
    }

    /// Suggest fixing a circular dependency
    pub fn fix_circular_dependency(members: &[String]) -> Self {
        Self {
            action: "Remove circular dependency".into(),
            steps: vec![
                format!("Detected cycle: {}", members.join(" → ")),
                "Drop one `depends_on` entry (or inline `-- depends:` line) on the cycle".into(),
                "Split shared objects into a script both sides can depend on".into(),
            ],
            commands: vec![
                "# Visualize the script dependencies:".into(),
                "sqlstage graph --format mermaid".into(),
            ],
        }
    }

    /// Suggest fixing a dependency reference that matched no script
    pub fn fix_unresolved(reference: &str) -> Self {
        Self {
            action: format!("Resolve dependency '{}'", reference),
            steps: vec![
                "References may be relative paths (./x.sql), catalog paths, \
                 package/script names or bare script names"
                    .into(),
                "Check that the referenced script is listed and enabled".into(),
                "Prefix with `<catalog>:` to reference a script of another catalog".into(),
            ],
            commands: vec![],
        }
    }

    /// Suggest declaring a connection for a pipeline
    pub fn declare_connection(pipeline: &str) -> Self {
        Self {
            action: format!("Declare a connection for '{}'", pipeline),
            steps: vec![
                "List the connection under a package's `connections`".into(),
                "or bind it with `module:`/`package:`, or mark it `default: true`".into(),
            ],
            commands: vec![],
        }
    }
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "→ {}", self.action)?;

        for step in &self.steps {
            writeln!(f, "  {}", step)?;
        }

        if !self.commands.is_empty() {
            writeln!(f)?;
            for cmd in &self.commands {
                writeln!(f, "  {}", cmd)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_suggestion_lists_members() {
        let fault = Fault::Cycle {
            members: vec!["x".into(), "y".into()],
        };
        let suggestion = RecoverySuggestion::for_fault(&fault).unwrap();
        let text = suggestion.to_string();
        assert!(text.contains("x → y"));
        assert!(text.contains("sqlstage graph"));
    }

    #[test]
    fn test_summary_fault_has_no_suggestion() {
        assert!(RecoverySuggestion::for_fault(&Fault::ContainsFaults).is_none());
    }
}
