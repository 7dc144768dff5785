// Language adapter registry
// Maps language identifiers (and aliases) to declarative build/run recipes.

use crate::error::ExecutionError;
use polyrun_common::types::{LanguageInfo, RecipeShape};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Entry name used by name-addressed adapters when the hint is absent or unusable.
pub const DEFAULT_ENTRY: &str = "Main";

const SOURCE: &str = "{source}";
const ARTIFACT: &str = "{artifact}";
const ENTRY: &str = "{entry}";
const WORKDIR: &str = "{workdir}";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("no languages configured")]
    Empty,
    #[error("language identifier '{0}' is registered more than once")]
    Duplicate(String),
    #[error("invalid adapter '{id}': {reason}")]
    Invalid { id: String, reason: String },
}

/// Declarative build/run recipe for one language.
///
/// Command templates are token vectors. Each token may contain the
/// placeholders `{source}`, `{artifact}`, `{entry}` and `{workdir}`, which are
/// substituted per job. The first rendered token is the program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageAdapter {
    pub id: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub extension: String,
    pub shape: RecipeShape,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile: Option<Vec<String>>,
    pub run: Vec<String>,
    /// Name-addressed only: fallback entry name (defaults to `Main`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_entry: Option<String>,
    /// Name-addressed only: extension of the artifact the compiler emits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_extension: Option<String>,
}

/// Paths and names substituted into a command template for one job.
#[derive(Debug, Clone)]
pub struct CommandContext<'a> {
    pub source: &'a Path,
    pub artifact: Option<&'a Path>,
    pub entry: &'a str,
    pub workdir: &'a Path,
}

impl LanguageAdapter {
    /// Entry name for name-addressed toolchains: the hint's file stem when it
    /// is a valid identifier, the adapter default otherwise.
    pub fn entry_name(&self, hint: Option<&str>) -> String {
        hint.and_then(|h| Path::new(h.trim()).file_stem())
            .and_then(|stem| stem.to_str())
            .filter(|stem| is_valid_entry_name(stem))
            .map(str::to_string)
            .unwrap_or_else(|| {
                self.default_entry
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ENTRY.to_string())
            })
    }

    /// File name the source is written under.
    ///
    /// Only name-addressed adapters honour the hint; everything else is keyed
    /// by the job id so concurrent jobs never collide.
    pub fn source_file_name(&self, job_id: &Uuid, entry: &str) -> String {
        match self.shape {
            RecipeShape::NameAddressed => format!("{}.{}", entry, self.extension),
            _ => format!("{}.{}", job_stem(job_id), self.extension),
        }
    }

    /// Name of the compiled artifact inside the job directory, if any.
    pub fn artifact_name(&self, job_id: &Uuid, entry: &str) -> Option<String> {
        match self.shape {
            RecipeShape::Interpreted => None,
            RecipeShape::PathAddressed => Some(job_stem(job_id)),
            RecipeShape::NameAddressed => Some(match &self.artifact_extension {
                Some(ext) => format!("{}.{}", entry, ext),
                None => entry.to_string(),
            }),
        }
    }

    pub fn compile_command(&self, ctx: &CommandContext<'_>) -> Option<Vec<String>> {
        self.compile.as_ref().map(|tokens| render(tokens, ctx))
    }

    pub fn run_command(&self, ctx: &CommandContext<'_>) -> Vec<String> {
        render(&self.run, ctx)
    }

    /// Every program this adapter invokes, in order of use.
    pub fn programs(&self) -> Vec<&str> {
        self.compile
            .iter()
            .chain(std::iter::once(&self.run))
            .filter_map(|tokens| tokens.first())
            .map(String::as_str)
            .filter(|program| !program.contains('{'))
            .collect()
    }

    pub fn info(&self) -> LanguageInfo {
        LanguageInfo {
            id: self.id.clone(),
            aliases: self.aliases.clone(),
            extension: self.extension.clone(),
            shape: self.shape,
        }
    }

    fn normalize(mut self) -> Result<Self, RegistryError> {
        self.id = self.id.trim().to_lowercase();
        self.aliases = self
            .aliases
            .iter()
            .map(|alias| alias.trim().to_lowercase())
            .filter(|alias| !alias.is_empty())
            .collect();
        self.extension = self.extension.trim().trim_start_matches('.').to_string();

        let invalid = |reason: &str| RegistryError::Invalid {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.extension.is_empty() {
            return Err(invalid("extension must not be empty"));
        }
        if self.run.is_empty() {
            return Err(invalid("run command must not be empty"));
        }
        if !mentions(&self.run, SOURCE)
            && !mentions(&self.run, ARTIFACT)
            && !mentions(&self.run, ENTRY)
        {
            return Err(invalid("run command never references the program"));
        }

        match (self.shape, &self.compile) {
            (RecipeShape::Interpreted, Some(_)) => {
                return Err(invalid("interpreted adapters take no compile command"));
            }
            (RecipeShape::Interpreted, None) => {}
            (_, None) => return Err(invalid("compiled adapters need a compile command")),
            (_, Some(tokens)) if tokens.is_empty() => {
                return Err(invalid("compile command must not be empty"));
            }
            (_, Some(_)) => {}
        }

        match self.shape {
            RecipeShape::PathAddressed => {
                let compile_writes_artifact =
                    self.compile.as_deref().is_some_and(|t| mentions(t, ARTIFACT));
                if !compile_writes_artifact || !mentions(&self.run, ARTIFACT) {
                    return Err(invalid(
                        "path-addressed adapters must compile to and run {artifact}",
                    ));
                }
            }
            RecipeShape::NameAddressed => {
                if !mentions(&self.run, ENTRY) {
                    return Err(invalid("name-addressed adapters must run {entry}"));
                }
                if let Some(default) = &self.default_entry {
                    if !is_valid_entry_name(default) {
                        return Err(invalid("default_entry is not a valid identifier"));
                    }
                }
            }
            RecipeShape::Interpreted => {}
        }

        Ok(self)
    }
}

/// Stem shared by a job's source file and artifact: `job_<32 hex chars>`.
///
/// Hex only, so it is a legal crate/module name for toolchains that derive one
/// from the file name.
pub fn job_stem(job_id: &Uuid) -> String {
    format!("job_{}", job_id.simple())
}

/// ASCII identifier: a letter or `_` followed by letters, digits, `_` or `$`.
pub fn is_valid_entry_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn mentions(tokens: &[String], placeholder: &str) -> bool {
    tokens.iter().any(|token| token.contains(placeholder))
}

fn render(tokens: &[String], ctx: &CommandContext<'_>) -> Vec<String> {
    let source = ctx.source.to_string_lossy();
    let artifact = ctx
        .artifact
        .map(|p| p.to_string_lossy())
        .unwrap_or_default();
    let workdir = ctx.workdir.to_string_lossy();

    tokens
        .iter()
        .map(|token| {
            token
                .replace(SOURCE, &source)
                .replace(ARTIFACT, &artifact)
                .replace(ENTRY, ctx.entry)
                .replace(WORKDIR, &workdir)
        })
        .collect()
}

#[derive(Debug, Serialize, Deserialize)]
struct LanguagesJson {
    languages: Vec<LanguageAdapter>,
}

/// Registry of configured languages.
///
/// Built once at startup and shared read-only between jobs.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    adapters: Vec<Arc<LanguageAdapter>>,
    index: HashMap<String, Arc<LanguageAdapter>>,
}

impl LanguageRegistry {
    /// The built-in language table.
    pub fn builtin() -> Self {
        Self::from_adapters(builtin_adapters())
            .unwrap_or_else(|e| unreachable!("built-in language table is invalid: {e}"))
    }

    pub fn from_adapters(adapters: Vec<LanguageAdapter>) -> Result<Self, RegistryError> {
        if adapters.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut registry = Self {
            adapters: Vec::with_capacity(adapters.len()),
            index: HashMap::new(),
        };

        for adapter in adapters {
            let adapter = Arc::new(adapter.normalize()?);
            for name in std::iter::once(&adapter.id).chain(adapter.aliases.iter()) {
                if registry.index.insert(name.clone(), Arc::clone(&adapter)).is_some() {
                    return Err(RegistryError::Duplicate(name.clone()));
                }
            }
            registry.adapters.push(adapter);
        }

        Ok(registry)
    }

    /// Load a language table from a `{ "languages": [...] }` JSON file.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let content = fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let parsed: LanguagesJson =
            serde_json::from_str(&content).map_err(|source| RegistryError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        Self::from_adapters(parsed.languages)
    }

    /// Load from `path` when given, otherwise use the built-in table.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self, RegistryError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::builtin()),
        }
    }

    /// Case-insensitive, alias-aware lookup.
    pub fn get(&self, language: &str) -> Option<&Arc<LanguageAdapter>> {
        self.index.get(&language.trim().to_lowercase())
    }

    /// Like `get`, but unknown identifiers become a validation error naming
    /// the supported set.
    pub fn resolve(&self, language: &str) -> Result<Arc<LanguageAdapter>, ExecutionError> {
        self.get(language).cloned().ok_or_else(|| {
            ExecutionError::validation(
                format!("Unsupported language: {}", language.trim()),
                self.supported(),
            )
        })
    }

    /// Canonical ids, in registration order.
    pub fn supported(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.id.clone()).collect()
    }

    pub fn adapters(&self) -> impl Iterator<Item = &Arc<LanguageAdapter>> {
        self.adapters.iter()
    }

    pub fn describe(&self) -> Vec<LanguageInfo> {
        self.adapters.iter().map(|a| a.info()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

fn adapter(
    id: &str,
    aliases: &[&str],
    extension: &str,
    shape: RecipeShape,
    compile: Option<&[&str]>,
    run: &[&str],
) -> LanguageAdapter {
    let owned = |tokens: &[&str]| tokens.iter().map(|t| t.to_string()).collect::<Vec<_>>();
    LanguageAdapter {
        id: id.to_string(),
        aliases: owned(aliases),
        extension: extension.to_string(),
        shape,
        compile: compile.map(owned),
        run: owned(run),
        default_entry: None,
        artifact_extension: None,
    }
}

fn builtin_adapters() -> Vec<LanguageAdapter> {
    use RecipeShape::*;

    let mut java = adapter(
        "java",
        &[],
        "java",
        NameAddressed,
        Some(&["javac", "{source}"]),
        &["java", "-cp", "{workdir}", "{entry}"],
    );
    java.default_entry = Some(DEFAULT_ENTRY.to_string());
    java.artifact_extension = Some("class".to_string());

    vec![
        adapter("python", &["py", "python3"], "py", Interpreted, None, &["python3", "{source}"]),
        adapter("javascript", &["js", "node"], "js", Interpreted, None, &["node", "{source}"]),
        adapter("typescript", &["ts"], "ts", Interpreted, None, &["ts-node", "{source}"]),
        adapter("ruby", &["rb"], "rb", Interpreted, None, &["ruby", "{source}"]),
        adapter("php", &[], "php", Interpreted, None, &["php", "{source}"]),
        adapter("bash", &["sh", "shell"], "sh", Interpreted, None, &["bash", "{source}"]),
        adapter(
            "c",
            &[],
            "c",
            PathAddressed,
            Some(&["gcc", "{source}", "-o", "{artifact}"]),
            &["{artifact}"],
        ),
        adapter(
            "cpp",
            &["c++", "cxx"],
            "cpp",
            PathAddressed,
            Some(&["g++", "{source}", "-o", "{artifact}"]),
            &["{artifact}"],
        ),
        adapter(
            "go",
            &["golang"],
            "go",
            PathAddressed,
            Some(&["go", "build", "-o", "{artifact}", "{source}"]),
            &["{artifact}"],
        ),
        adapter(
            "rust",
            &["rs"],
            "rs",
            PathAddressed,
            Some(&["rustc", "{source}", "-o", "{artifact}"]),
            &["{artifact}"],
        ),
        java,
    ]
}
