use anyhow::Context;
use clap::{Parser, Subcommand};
use procrun_core::{CommandDescriptor, RunSummary, RunnerConfig};
use procrun_runner::{resolve, ProcessRunner};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "procrun")]
#[command(about = "Run a command to completion and report whether it succeeded", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Runner configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command string through the shell
    Shell {
        /// Command line handed to the interpreter verbatim
        command: String,
    },

    /// Run a program directly, without a shell
    Exec {
        /// Look the program up on PATH first
        #[arg(long)]
        resolve: bool,

        /// Program path followed by its arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        argv: Vec<String>,
    },

    /// Run a program with its standard output written to a file
    Redirect {
        /// File to create or truncate
        #[arg(short, long)]
        output: PathBuf,

        /// Look the program up on PATH first
        #[arg(long)]
        resolve: bool,

        /// Program path followed by its arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        argv: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RunnerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RunnerConfig::default(),
    };
    init_tracing(&config);

    let runner = ProcessRunner::new().with_config(config);

    let summary = match cli.command {
        Commands::Shell { command } => runner.run_shell_detailed(&command),
        Commands::Exec { resolve, argv } => {
            let argv = prepare_argv(argv, resolve)?;
            runner.run_detailed(&argv)
        }
        Commands::Redirect {
            output,
            resolve,
            argv,
        } => {
            let argv = prepare_argv(argv, resolve)?;
            runner.run_redirected_detailed(&output, &argv)
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if !summary.success {
        eprintln!("{}", describe_failure(&summary));
    }

    process::exit(if summary.success { 0 } else { 1 });
}

fn init_tracing(config: &RunnerConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.log_level.as_deref().unwrap_or("warn"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn prepare_argv(argv: Vec<String>, resolve_program: bool) -> anyhow::Result<Vec<String>> {
    if !resolve_program {
        return Ok(argv);
    }

    let command = CommandDescriptor::new(argv)?;
    let resolved = resolve(&command)?;
    Ok(resolved.into())
}

fn describe_failure(summary: &RunSummary) -> String {
    let target = summary
        .output
        .as_deref()
        .map(|p: &Path| format!(" > {}", p.display()))
        .unwrap_or_default();

    match summary.outcome {
        Some(outcome) => format!("{}{}: {}", summary.command.join(" "), target, outcome),
        None => format!("{}{}: did not run", summary.command.join(" "), target),
    }
}
