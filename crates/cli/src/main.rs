//! CrewForge CLI entry point.
//!
//! This binary is the composition root. It:
//!
//! 1. **Parses arguments** with `clap`.
//! 2. **Wires observability** through [`telemetry`].
//! 3. **Loads configuration** ([`config`]) and the prompt and spec inputs
//!    ([`spec`]).
//! 4. **Constructs infrastructure**: the LLM gateway from the `llm` crate and
//!    the filesystem workspace from the `workspace` crate.
//! 5. **Runs** the `team` orchestrator and maps the outcome to an exit code.

mod config;
mod spec;
mod telemetry;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use team::{Orchestrator, PipelineReport};
use tracing::{error, info};
use workspace::FsWorkspace;

/// Generate a software project with a team of LLM-backed roles.
#[derive(Parser, Debug)]
#[command(name = "crewforge", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a project from a prompt file
    Generate(GenerateArgs),
    /// Print the version
    Version,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// File containing the project request
    prompt_file: PathBuf,

    /// Output directory (overrides `workspace_dir` from the config)
    #[arg(short = 'o', long = "output-dir")]
    output_dir: Option<PathBuf>,

    /// Structured spec (.yaml/.yml, otherwise Markdown)
    #[arg(short = 's', long = "spec")]
    spec: Option<PathBuf>,

    /// Config file (default: ~/.crewforge/config.yaml, then ./crewforge.yaml)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Version => {
            println!("crewforge {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        Command::Generate(args) => {
            let guard = match telemetry::init() {
                Ok(guard) => guard,
                Err(e) => {
                    eprintln!("Error: {:#}", e);
                    return ExitCode::from(1);
                }
            };
            let outcome = generate(args).await;
            let code = match outcome {
                Ok(report) => {
                    print_report(&report);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!(error = %format!("{:#}", e), "Generation failed");
                    eprintln!("Error: {:#}", e);
                    ExitCode::from(1)
                }
            };
            guard.shutdown();
            code
        }
    }
}

async fn generate(args: GenerateArgs) -> Result<PipelineReport> {
    let mut config = config::load(args.config.as_deref())?;
    if let Some(dir) = args.output_dir {
        config.workspace_dir = dir;
    }
    config.validate()?;

    let prompt = load_prompt(&args.prompt_file)?;
    let spec = match &args.spec {
        Some(path) => spec::load(path)?,
        None => Value::Object(Map::new()),
    };

    let gateway = llm::build_gateway(&config.llm).context("failed to configure the LLM gateway")?;
    let workspace = Arc::new(FsWorkspace::new(&config.workspace_dir));
    let mut orchestrator = Orchestrator::new(&config, gateway, workspace)?;

    info!(
        run_id = %orchestrator.run_id(),
        output_dir = %config.workspace_dir.display(),
        provider = ?config.llm.provider,
        model = config.llm.model(),
        developers = config.num_developers,
        "Starting project generation"
    );
    Ok(orchestrator.run(&prompt, &spec).await?)
}

fn load_prompt(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read prompt file {}", path.display()))?;
    let prompt = text.trim();
    if prompt.is_empty() {
        bail!("prompt file {} is empty", path.display());
    }
    Ok(prompt.to_string())
}

fn print_report(report: &PipelineReport) {
    println!("Project generation completed (run {})", report.run_id);
    println!("  features:      {}", report.features.len());
    for feature in &report.features {
        println!("    - {}", feature);
    }
    println!("  files written: {}", report.files_written);
    println!("  artifacts:     {}", report.artifacts.len());
    println!(
        "  tokens:        {} in / {} out / {} total",
        report.ledger.input_tokens().as_u64(),
        report.ledger.output_tokens().as_u64(),
        report.ledger.total_tokens().as_u64()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_generate_arguments() {
        let cli = Cli::try_parse_from([
            "crewforge", "generate", "prompt.txt", "-o", "out", "-s", "spec.md", "-c", "team.yaml",
        ])
        .unwrap();
        match cli.command {
            Command::Generate(args) => {
                assert_eq!(args.prompt_file, PathBuf::from("prompt.txt"));
                assert_eq!(args.output_dir, Some(PathBuf::from("out")));
                assert_eq!(args.spec, Some(PathBuf::from("spec.md")));
                assert_eq!(args.config, Some(PathBuf::from("team.yaml")));
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(Cli::try_parse_from(["crewforge", "generate"]).is_err());
    }

    #[test]
    fn test_prompt_must_not_be_blank() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "  \n").unwrap();
        assert!(load_prompt(&path).is_err());
        std::fs::write(&path, "\nBuild a URL shortener\n").unwrap();
        assert_eq!(load_prompt(&path).unwrap(), "Build a URL shortener");
    }
}
