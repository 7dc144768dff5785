// CLI commands for running snippets and inspecting the language table
use anyhow::{bail, Context, Result};
use polyrun_common::config::ServiceConfig;
use polyrun_common::types::{ExecutionRequest, ExecutionResult, Outcome};
use polyrun_engine::probe::probe_toolchains;
use polyrun_engine::{ExecutionError, ExecutionService, LanguageRegistry};
use std::io::{self, Read, Write};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Exit status used when a job runs out of time, as coreutils `timeout` does.
const TIMEOUT_EXIT_STATUS: i32 = 124;

fn load_config() -> Result<ServiceConfig> {
    ServiceConfig::from_env().context("Invalid POLYRUN_* configuration")
}

fn load_registry(config: &ServiceConfig) -> Result<LanguageRegistry> {
    LanguageRegistry::load_or_builtin(config.languages_file.as_deref())
        .context("Failed to load language configuration")
}

fn is_stdin(path: &Path) -> bool {
    path == Path::new("-")
}

fn read_source(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) if !is_stdin(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        _ => {
            let mut source = String::new();
            io::stdin()
                .read_to_string(&mut source)
                .context("Failed to read source from stdin")?;
            Ok(source)
        }
    }
}

/// Explicit `--name` wins, then the source file's own name.
fn file_name_hint(file: Option<&Path>, name: Option<&str>) -> Option<String> {
    name.map(str::to_string).or_else(|| {
        file.filter(|path| !is_stdin(path))
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
    })
}

/// Process exit status mirroring the job's outcome.
fn exit_status(result: &ExecutionResult) -> i32 {
    match result.outcome {
        Outcome::Success => 0,
        Outcome::Timeout => TIMEOUT_EXIT_STATUS,
        Outcome::CompileError => 1,
        Outcome::RuntimeError => result.exit_code.filter(|code| *code != 0).unwrap_or(1),
    }
}

/// Execute one snippet and print its output; returns the exit status to use.
pub async fn run_source(
    lang: &str,
    file: Option<&Path>,
    name: Option<&str>,
    timeout: Option<u64>,
    json: bool,
) -> Result<i32> {
    let mut config = load_config()?;
    if let Some(seconds) = timeout {
        if seconds == 0 {
            bail!("--timeout must be a positive number of seconds");
        }
        config.timeout_seconds = seconds;
    }

    let registry = load_registry(&config)?;
    let service = ExecutionService::new(&config, registry)
        .context("Failed to initialize execution service")?;

    let source = read_source(file)?;
    let mut request = ExecutionRequest::new(lang, source);
    if let Some(hint) = file_name_hint(file, name) {
        request = request.with_file_name(hint);
    }

    // Ctrl+C goes through the same kill path as a timeout
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let result = match service.execute_with_cancel(request, cancel).await {
        Ok(result) => result,
        Err(ExecutionError::Validation { message, supported }) => {
            bail!("{}\nSupported languages: {}", message, supported.join(", "))
        }
        Err(ExecutionError::Infrastructure { message, output }) => {
            if !output.is_empty() {
                eprintln!("{}", output.trim_end());
            }
            bail!(message)
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", result.stdout);
        io::stdout().flush()?;
        eprint!("{}", result.stderr);
        if !result.success {
            eprintln!("❌ {} after {}ms", result.outcome, result.duration_ms);
        }
    }

    Ok(exit_status(&result))
}

/// List supported languages
pub fn list_languages(json: bool) -> Result<()> {
    let config = load_config()?;
    let registry = load_registry(&config)?;
    let languages = registry.describe();

    if json {
        println!("{}", serde_json::to_string_pretty(&languages)?);
        return Ok(());
    }

    println!("{:<12} {:<6} {:<16} ALIASES", "LANGUAGE", "EXT", "SHAPE");
    for info in languages {
        println!(
            "{:<12} {:<6} {:<16} {}",
            info.id,
            info.extension,
            info.shape.to_string(),
            info.aliases.join(", ")
        );
    }
    Ok(())
}

/// Report which adapters have their toolchain on PATH
pub fn doctor() -> Result<()> {
    let config = load_config()?;
    let registry = load_registry(&config)?;
    let reports = probe_toolchains(&registry);

    println!("🔍 Checking toolchains for {} languages\n", reports.len());

    let mut ready = 0;
    for report in &reports {
        if report.available() {
            ready += 1;
            let found: Vec<String> = report
                .tools
                .iter()
                .filter_map(|tool| tool.path.as_ref())
                .map(|path| path.display().to_string())
                .collect();
            println!("  ✅ {:<12} {}", report.language, found.join(", "));
        } else {
            println!(
                "  ❌ {:<12} missing: {}",
                report.language,
                report.missing().join(", ")
            );
        }
    }

    println!("\n{}/{} languages ready", ready, reports.len());
    Ok(())
}
