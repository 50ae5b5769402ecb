//! `scubywasm-server` -- run continuous matches in parallel and persist
//! each finished game as a JSON log.
//!
//! Starts `--workers` independent simulations (one child process per match)
//! and continuously schedules new games. Logs are written to LOG_DIR as
//! `scubywasm-log_<n>.json` with `<n>` incremented past whatever is already
//! there. Per team subdirectory of AGENTS_DIR, the highest
//! `agent-v<version>.wasm` is selected; teams are ordered by directory
//! name. The first INT/TERM stops scheduling and drains in-flight matches.

use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

use scubywasm_server::{Supervisor, SupervisorConfig};

/// Run continuous Scubywasm matches in parallel and persist each finished
/// game as a JSON log.
#[derive(Debug, Parser)]
#[command(name = "scubywasm-server", version)]
struct Cli {
    /// Path to the engine wasm module
    #[arg(value_name = "ENGINE_WASM")]
    engine_wasmfile: PathBuf,

    /// Path to agents directory; must contain team subdirectories with
    /// files named agent-v<version>.wasm
    #[arg(value_name = "AGENTS_DIR")]
    agents_dir: PathBuf,

    /// Number of worker processes / concurrent simulations, at least 1
    #[arg(long, default_value_t = 1, value_name = "N",
          value_parser = clap::value_parser!(u32).range(1..))]
    workers: u32,

    /// Seed for the server-side RNG that generates per-game seeds
    #[arg(long, default_value_t = 42, value_name = "SEED")]
    seed: u64,

    /// Number of ships per team, aka agent multiplicity, at least 1
    #[arg(long, default_value_t = 1, value_name = "N",
          value_parser = clap::value_parser!(u32).range(1..))]
    multiplicity: u32,

    /// Max. number of ticks per game, at least 1
    #[arg(long, default_value_t = 1_000, value_name = "TICKS",
          value_parser = clap::value_parser!(u64).range(1..))]
    max_ticks: u64,

    /// Fuel limit for agent calls, at least 100; unset disables fuel
    /// metering
    #[arg(long, value_name = "FUEL",
          value_parser = clap::value_parser!(u64).range(100..))]
    fuel_limit: Option<u64>,

    /// Directory to save logs as scubywasm-log_<n>.json
    #[arg(long, default_value = ".", value_name = "LOG_DIR")]
    log_dir: PathBuf,

    /// Print a line for every saved log
    #[arg(long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    scubywasm_cli::init_tracing();
    let cli = Cli::parse();

    let mut cmd = Cli::command();
    if !cli.engine_wasmfile.is_file() {
        cmd.error(
            ErrorKind::ValueValidation,
            format!(
                "couldn't open engine WASM file {}",
                cli.engine_wasmfile.display()
            ),
        )
        .exit();
    }
    if !cli.agents_dir.is_dir() {
        cmd.error(
            ErrorKind::ValueValidation,
            format!("{} is not an existing directory", cli.agents_dir.display()),
        )
        .exit();
    }

    let stop = scubywasm_cli::install_stop_flag()?;

    let supervisor = Supervisor::new(SupervisorConfig {
        engine_wasm: cli.engine_wasmfile,
        agents_dir: cli.agents_dir,
        workers: cli.workers,
        seed: cli.seed,
        multiplicity: cli.multiplicity,
        max_ticks: cli.max_ticks,
        fuel_limit: cli.fuel_limit,
        log_dir: cli.log_dir,
        verbose: cli.verbose,
    });

    supervisor.run(stop)?;
    Ok(())
}
