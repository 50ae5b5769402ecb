//! `scubywasm-service` -- continuous user-agent scenarios on a shared host.
//!
//! Runs the scenarios defined in SCENARIO_FILE in parallel, one worker per
//! scenario. Agents come from `agents/<name>/` inside each user's home
//! directory; per agent name the newest wasm file wins. A scenario restarts
//! (round counter to zero, fresh timestamped results subdirectory) whenever
//! an agent is added, removed, or updated. Each finished game is written
//! alongside the agent wasm files it used, ready to be served over HTTP.

use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

use scubywasm_server::{read_scenarios, Service, ServiceConfig};

/// Run continuous Scubywasm matches for a set of scenarios, restarting a
/// scenario whenever its agents change.
#[derive(Debug, Parser)]
#[command(name = "scubywasm-service", version)]
struct Cli {
    /// Path to the engine wasm module
    #[arg(value_name = "ENGINE_WASM")]
    engine_wasmfile: PathBuf,

    /// Path to results directory; finished game logs and used agent wasm
    /// files will be written here
    #[arg(value_name = "RESULTS_DIR")]
    results_dir: PathBuf,

    /// JSON array of scenarios; each element requires name, multiplicity,
    /// max_ticks, fuel_limit and max_rounds
    #[arg(value_name = "SCENARIO_FILE")]
    scenario_file: PathBuf,

    /// Root of the user-home tree scanned for agents
    #[arg(long, default_value = "/home", value_name = "DIR")]
    home_root: PathBuf,
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

    // Scenario-file validation happens before anything starts; a bad file
    // exits like any other argument error.
    let specs = match read_scenarios(&cli.scenario_file) {
        Ok(specs) => specs,
        Err(e) => cmd.error(ErrorKind::ValueValidation, e.to_string()).exit(),
    };
    if specs.is_empty() {
        cmd.error(
            ErrorKind::ValueValidation,
            format!("{} defines no scenarios", cli.scenario_file.display()),
        )
        .exit();
    }

    let stop = scubywasm_cli::install_stop_flag()?;

    let service = Service::new(ServiceConfig {
        engine_wasm: cli.engine_wasmfile,
        results_dir: cli.results_dir,
        home_root: cli.home_root,
    });

    service.run(specs, stop)?;
    Ok(())
}
