//! Driver: wires the CLI to the LALG library pipeline.
//!
//! Reads a `.lalg`/`.pas` source file, scans + compiles it to bytecode, runs
//! the bytecode through the interpreter, and prints its output. Every error
//! in the pipeline is fatal at the point it arises (spec.md §7): the
//! process prints the error's `Display` line to stdout, flushing whatever
//! interpreter output had already been produced, and exits non-zero.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use lalg::config::Config;
use lalg::error::LalgError;
use lalg::interpreter;
use lalg::lexer::tokenize;
use lalg::parser;
use lalg::reserved::ReservedWords;

/// Compiler and virtual machine for the LALG Pascal-dialect teaching language.
#[derive(Parser, Debug)]
#[command(name = "lalg")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compile and run a LALG/Pascal-subset program", long_about = None)]
struct Cli {
    /// Source file to compile and run (must end in .lalg or .pas)
    #[arg(short, long)]
    input: PathBuf,

    /// Output path (accepted for interface compatibility, currently unused)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Reserved-word list, one lowercase keyword per line (default: built-in list)
    #[arg(long)]
    keywords: Option<PathBuf>,

    /// Bytecode buffer capacity, in bytes (default: 5000)
    #[arg(long)]
    capacity: Option<usize>,

    /// Optional TOML config file providing defaults for --keywords/--capacity
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

const SOURCE_EXTENSIONS: &[&str] = &["lalg", "pas"];

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(output) => {
            print!("{output}");
            let _ = io::stdout().flush();
        }
        Err((output, err)) => {
            print!("{output}");
            println!("{err}");
            let _ = io::stdout().flush();
            std::process::exit(1);
        }
    }
}

/// Runs the full pipeline. On success, returns the program's stdout. On
/// failure, returns whatever output had already been produced alongside the
/// error, so the caller can flush both (spec.md §7).
fn run(cli: &Cli) -> Result<String, (String, LalgError)> {
    let config = load_config(cli.config.as_deref()).map_err(|e| (String::new(), e))?;

    let capacity = cli.capacity.or(config.capacity).unwrap_or(5000);
    let reserved = load_reserved_words(cli.keywords.as_deref().or(config.keywords_path.as_deref()))
        .map_err(|e| (String::new(), e))?;

    check_extension(&cli.input).map_err(|e| (String::new(), e))?;

    tracing::info!(path = %cli.input.display(), "reading source file");
    let source = std::fs::read_to_string(&cli.input)
        .map_err(|e| (String::new(), LalgError::io(cli.input.display().to_string(), e)))?;

    tracing::info!("scanning");
    let tokens = tokenize(&source, &reserved).map_err(|e| (String::new(), e))?;

    tracing::info!(token_count = tokens.len(), "parsing and generating bytecode");
    let compiled = parser::compile(tokens, capacity).map_err(|e| (String::new(), e))?;

    tracing::info!(bytecode_len = compiled.bytecode.len(), "interpreting");
    let outcome = interpreter::run(&compiled.bytecode, io::stdin().lock());
    match outcome.result {
        Ok(()) => Ok(outcome.output),
        Err(e) => {
            tracing::error!(%e, "program aborted");
            Err((outcome.output, e))
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config, LalgError> {
    match path {
        Some(p) => Config::load(p),
        None => Ok(Config::default()),
    }
}

fn load_reserved_words(path: Option<&Path>) -> Result<ReservedWords, LalgError> {
    match path {
        Some(p) => ReservedWords::load_from_file(p),
        None => Ok(ReservedWords::builtin()),
    }
}

fn check_extension(path: &Path) -> Result<(), LalgError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if SOURCE_EXTENSIONS.contains(&ext) {
        Ok(())
    } else {
        Err(LalgError::io(
            path.display().to_string(),
            format!("Expected a .{} or .{} source file", SOURCE_EXTENSIONS[0], SOURCE_EXTENSIONS[1]),
        ))
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "lalg=warn",
        1 => "lalg=info",
        _ => "lalg=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
