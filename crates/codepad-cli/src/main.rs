//! codepad CLI
//!
//! A command-line tool for running submitted source code with the locally
//! installed toolchains.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codepad::{Config, EXAMPLE_CONFIG, ExecutionOutcome, ExecutionRequest, Preflight, Runner};
use tokio::io::AsyncReadExt;
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "codepad")]
#[command(about = "A tool for time-bounded execution of submitted source code")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: codepad.toml)
        #[arg(short, long, default_value = "codepad.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Run a program (build if needed, then execute)
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language ID (e.g., python, java, cpp)
        #[arg(short, long)]
        language: String,

        /// Deadline in seconds, overriding the configured one
        #[arg(short, long)]
        timeout: Option<f64>,

        /// Print the response as JSON instead of the raw streams
        #[arg(long)]
        json: bool,
    },

    /// Read a `{"language", "code"}` request from stdin and print the response
    Dispatch,

    /// Check which toolchains are installed
    Check,

    /// List available languages
    Languages,

    /// Show the active configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    // Logs go to stderr so stdout stays clean for program output and JSON
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Run {
            source,
            language,
            timeout,
            json,
        } => run_file(config, &source, &language, timeout, json).await,
        Commands::Dispatch => dispatch_stdin(config).await,
        Commands::Check => check_toolchains(config).await,
        Commands::Languages => {
            list_languages(config)?;
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
    }
}

async fn run_file(
    mut config: Config,
    source: &Path,
    language_id: &str,
    timeout: Option<f64>,
    json: bool,
) -> Result<()> {
    if let Some(timeout) = timeout {
        config.timeout = timeout;
        config.validate().context("invalid --timeout")?;
    }

    let code = tokio::fs::read_to_string(source)
        .await
        .with_context(|| format!("failed to read source file '{}'", source.display()))?;

    let runner = Runner::new(config).context("invalid configuration")?;
    info!(language = language_id, "running program");
    let outcome = runner
        .execute(ExecutionRequest::new(language_id, code))
        .await
        .context("execution failed")?;

    if json {
        let response = codepad::classify(&outcome);
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_outcome(&outcome);
    }

    match outcome {
        ExecutionOutcome::Success { .. } => Ok(()),
        ExecutionOutcome::RuntimeFailed { exit_code, .. } => {
            std::process::exit(exit_code.unwrap_or(1))
        }
        _ => std::process::exit(1),
    }
}

fn print_outcome(outcome: &ExecutionOutcome) {
    match outcome {
        ExecutionOutcome::Success { stdout, stderr, .. }
        | ExecutionOutcome::RuntimeFailed { stdout, stderr, .. } => {
            print!("{stdout}");
            eprint!("{stderr}");
        }
        ExecutionOutcome::BuildFailed { stdout, stderr, .. } => {
            eprintln!("Build failed:");
            eprint!("{stdout}{stderr}");
        }
        ExecutionOutcome::TimedOut => eprintln!("{}", codepad::report::TIMEOUT_MESSAGE),
        ExecutionOutcome::PreflightFailed {
            reason,
            remediation,
        } => {
            eprintln!("{reason}");
            if !remediation.is_empty() {
                eprintln!("\n{remediation}");
            }
        }
    }

    info!(outcome = outcome.kind(), "execution result");
}

async fn dispatch_stdin(config: Config) -> Result<()> {
    let mut body = String::new();
    tokio::io::stdin()
        .read_to_string(&mut body)
        .await
        .context("failed to read request from stdin")?;

    let runner = Runner::new(config).context("invalid configuration")?;
    let response = runner.dispatch_json(&body).await;
    debug!(status = response.status, "request dispatched");

    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}

async fn check_toolchains(config: Config) -> Result<()> {
    let runner = Runner::new(config).context("invalid configuration")?;
    let mut missing = 0;

    for spec in runner.registry().iter() {
        match runner.check(spec).await {
            Preflight::Passed => println!("  {:<15} ok", spec.id()),
            Preflight::Failed(detail) => {
                missing += 1;
                println!("  {:<15} unavailable ({detail})", spec.id());
                if let Some(preflight) = spec.preflight()
                    && !preflight.remediation.is_empty()
                {
                    for line in preflight.remediation.lines() {
                        println!("  {:<15}   {line}", "");
                    }
                }
            }
        }
    }

    if missing > 0 {
        anyhow::bail!("{missing} toolchain(s) unavailable");
    }
    Ok(())
}

fn list_languages(config: Config) -> Result<()> {
    let runner = Runner::new(config).context("invalid configuration")?;
    println!("Available languages:\n");

    for spec in runner.registry().iter() {
        let kind = if spec.toolchain().is_compiled() {
            "compiled"
        } else {
            "interpreted"
        };
        println!("  {:<15} {} ({})", spec.id(), spec.name(), kind);
    }
    Ok(())
}

fn show_config(config: &Config) {
    println!("Workspace root: {}", config.workspace_root.display());
    println!("Timeout: {:.3}s", config.timeout);
    println!("Preflight timeout: {:.3}s", config.preflight_timeout);
    println!("Kill grace: {:.3}s", config.kill_grace);
    println!("Max output: {} bytes", config.max_output);
    println!();
    println!("Toolchains configured: {}", config.toolchains.len());
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
