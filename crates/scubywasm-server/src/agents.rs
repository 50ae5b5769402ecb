//! Versioned team-agent selection for the supervisor.
//!
//! `AGENTS_DIR/<team>/agent-v<int>.wasm`: per team subdirectory exactly one
//! file is selected, the one with the largest version. Teams come back in
//! sorted `<team>` order; files that don't match the pattern are ignored.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::ServerError;

/// Select the newest agent file per team subdirectory of `agents_dir`.
pub fn select_team_agents(agents_dir: &Path) -> Result<Vec<PathBuf>, ServerError> {
    let pattern = Regex::new(r"^agent-v(\d+)\.wasm$")
        .map_err(|e| ServerError::Config(format!("agent name pattern: {e}")))?;

    let mut teams: Vec<(String, PathBuf)> = Vec::new();
    for entry in fs::read_dir(agents_dir)? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }

        let mut best: Option<(u64, PathBuf)> = None;
        for file in fs::read_dir(entry.path())? {
            let file = file?;
            let name = file.file_name();
            let name_str = name.to_string_lossy();
            let Some(caps) = pattern.captures(&name_str) else {
                continue;
            };
            let Ok(version) = caps[1].parse::<u64>() else {
                continue;
            };
            if best.as_ref().map_or(true, |(v, _)| version > *v) {
                best = Some((version, file.path()));
            }
        }

        if let Some((_, path)) = best {
            teams.push((entry.file_name().to_string_lossy().into_owned(), path));
        }
    }

    teams.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(teams.into_iter().map(|(_, path)| path).collect())
}

/// Supervisor log label for an agent file: `<team>/<file_stem>`.
pub fn team_label(path: &Path) -> String {
    let team = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{team}/{stem}")
}
