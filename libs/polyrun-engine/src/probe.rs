//! Toolchain probe: which adapters can actually run on this host.

use crate::adapters::LanguageRegistry;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    pub program: String,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolchainReport {
    pub language: String,
    pub tools: Vec<ToolStatus>,
}

impl ToolchainReport {
    /// True when every program the adapter invokes was found.
    pub fn available(&self) -> bool {
        self.tools.iter().all(|tool| tool.path.is_some())
    }

    pub fn missing(&self) -> Vec<&str> {
        self.tools
            .iter()
            .filter(|tool| tool.path.is_none())
            .map(|tool| tool.program.as_str())
            .collect()
    }
}

/// Resolve every adapter's programs against `PATH`.
pub fn probe_toolchains(registry: &LanguageRegistry) -> Vec<ToolchainReport> {
    registry
        .adapters()
        .map(|adapter| ToolchainReport {
            language: adapter.id.clone(),
            tools: adapter
                .programs()
                .into_iter()
                .map(|program| ToolStatus {
                    program: program.to_string(),
                    path: which::which(program).ok(),
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::LanguageAdapter;
    use polyrun_common::types::RecipeShape;

    #[test]
    fn test_reports_every_language() {
        let registry = LanguageRegistry::builtin();
        let reports = probe_toolchains(&registry);
        assert_eq!(reports.len(), registry.len());

        let java = reports.iter().find(|r| r.language == "java").unwrap();
        let programs: Vec<&str> = java.tools.iter().map(|t| t.program.as_str()).collect();
        assert_eq!(programs, vec!["javac", "java"]);
    }

    #[test]
    fn test_missing_program_is_reported() {
        let registry = LanguageRegistry::from_adapters(vec![LanguageAdapter {
            id: "ghost".to_string(),
            aliases: vec![],
            extension: "gh".to_string(),
            shape: RecipeShape::Interpreted,
            compile: None,
            run: vec!["polyrun-no-such-toolchain".to_string(), "{source}".to_string()],
            default_entry: None,
            artifact_extension: None,
        }])
        .unwrap();

        let reports = probe_toolchains(&registry);
        assert!(!reports[0].available());
        assert_eq!(reports[0].missing(), vec!["polyrun-no-such-toolchain"]);
    }
}
