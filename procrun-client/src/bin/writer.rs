use anyhow::Context;
use clap::Parser;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// Write a string to a file, replacing whatever it held.
#[derive(Parser)]
#[command(name = "writer", disable_help_flag = true, disable_version_flag = true)]
struct Args {
    /// File to create or truncate
    #[arg(allow_hyphen_values = true)]
    file_path: PathBuf,

    /// Text written verbatim, without a trailing newline
    #[arg(allow_hyphen_values = true)]
    text: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            error!("Usage: writer <file_path> <string_to_write>");
            eprintln!("Error: Incorrect number of arguments.");
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    if let Err(e) = write_file(&args.file_path, &args.text) {
        error!(path = %args.file_path.display(), error = %e, "Write failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }

    debug!("Writing '{}' to '{}'", args.text, args.file_path.display());
}

fn write_file(path: &Path, text: &str) -> anyhow::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }

    let mut file = options
        .open(path)
        .with_context(|| format!("Could not open file {}", path.display()))?;
    file.write_all(text.as_bytes())
        .with_context(|| format!("Failed to write to file {}", path.display()))?;
    Ok(())
}
