mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "polyrun-cli")]
#[command(about = "Polyrun CLI - Run snippets locally and inspect installed toolchains", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a source file (or stdin) in the given language
    Run {
        /// Language identifier or alias (e.g., python, c++, rs)
        #[arg(short, long)]
        lang: String,

        /// Source file; `-` or omitted reads stdin
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// File name hint (e.g., Hello.java); defaults to the file's name
        #[arg(short, long)]
        name: Option<String>,

        /// Wall-clock budget in seconds, shared by compile and run
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Print the full result as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// List supported languages
    Languages {
        /// Print as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Check which toolchains are installed on this host
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            lang,
            file,
            name,
            timeout,
            json,
        } => {
            let code = commands::run_source(&lang, file.as_deref(), name.as_deref(), timeout, json)
                .await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Languages { json } => {
            commands::list_languages(json)?;
        }
        Commands::Doctor => {
            commands::doctor()?;
        }
    }

    Ok(())
}

// Logs go to stderr so they never mix with the program's stdout.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
