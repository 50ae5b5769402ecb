//! `scubywasm-run` -- run a single match locally and emit its JSON log.
//!
//! By default the log goes to stdout; `-o FILE` writes it to a file
//! instead. This binary is also what the supervisor and scenario service
//! spawn as their per-match worker process.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

use scubywasm_match::{MatchOptions, MatchRuntime};

/// Run a single Scubywasm match locally (engine + one or more agent WASM
/// modules) and write the full game log as JSON.
#[derive(Debug, Parser)]
#[command(name = "scubywasm-run", version)]
struct Cli {
    /// Engine WASM module (e.g. engine.wasm)
    #[arg(value_name = "ENGINE_WASM")]
    engine_wasmfile: PathBuf,

    /// One or more agent/team WASM modules. Each module controls one team
    #[arg(value_name = "AGENT_WASM", required = true, num_args = 1..)]
    agent_wasmfile: Vec<PathBuf>,

    /// Seed for deterministic initialization
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Number of ships per team (agent multiplicity), at least 1
    #[arg(long, default_value_t = 1, value_name = "N",
          value_parser = clap::value_parser!(u32).range(1..))]
    multiplicity: u32,

    /// Wasmtime fuel limit per agent tick, at least 100. If unset, fuel
    /// metering is disabled
    #[arg(long, value_name = "FUEL",
          value_parser = clap::value_parser!(u64).range(100..))]
    fuel_limit: Option<u64>,

    /// Wasmtime memory limit per agent instance in bytes; values <= 0
    /// disable the ceiling, positive values must be at least 2 pages
    /// (131072 bytes)
    #[arg(long, default_value_t = 64_000_000, value_name = "MEMORY",
          allow_negative_numbers = true)]
    memory_limit: i64,

    /// Maximum number of ticks to simulate, at least 1
    #[arg(long, default_value_t = 1_000, value_name = "T",
          value_parser = clap::value_parser!(u64).range(1..))]
    max_ticks: u64,

    /// Write the JSON log to FILE instead of stdout
    #[arg(short = 'o', value_name = "FILE")]
    output: Option<PathBuf>,
}

fn validation_error(message: String) -> ! {
    Cli::command().error(ErrorKind::ValueValidation, message).exit()
}

fn main() -> anyhow::Result<()> {
    scubywasm_cli::init_tracing();
    let cli = Cli::parse();

    if !cli.engine_wasmfile.is_file() {
        validation_error(format!(
            "couldn't open engine WASM file {}",
            cli.engine_wasmfile.display()
        ));
    }
    for path in &cli.agent_wasmfile {
        if !path.is_file() {
            validation_error(format!("couldn't open agent WASM file {}", path.display()));
        }
    }

    let memory_limit = match cli.memory_limit {
        v if v <= 0 => None,
        v if v < 131_072 => validation_error(format!(
            "--memory-limit must be at least 2 pages: 131072 bytes (got {v})"
        )),
        v => Some(v as usize),
    };

    let engine_wasm = fs::read(&cli.engine_wasmfile)
        .with_context(|| format!("reading {}", cli.engine_wasmfile.display()))?;
    let agent_wasms = cli
        .agent_wasmfile
        .iter()
        .map(|path| fs::read(path).with_context(|| format!("reading {}", path.display())))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let options = MatchOptions {
        multiplicity: cli.multiplicity,
        seed: cli.seed,
        fuel_limit: cli.fuel_limit,
        memory_limit,
        ..MatchOptions::default()
    };

    let mut game = MatchRuntime::new(&engine_wasm, &agent_wasms, options)?;
    game.run_to_completion(cli.max_ticks)?;

    let mut text = serde_json::to_string(&game.log())?;
    text.push('\n');

    match cli.output {
        None => std::io::stdout().write_all(text.as_bytes())?,
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
        }
    }

    Ok(())
}
