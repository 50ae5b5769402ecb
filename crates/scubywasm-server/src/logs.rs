//! Monotonic JSON log persistence.
//!
//! Logs land in `LOG_DIR/scubywasm-log_<n>.json`. The index starts one past
//! the largest numeric suffix already present and only ever counts up, so a
//! restarted supervisor never overwrites earlier sessions.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;

use crate::ServerError;

/// Writes match records into a directory under the monotonic naming scheme.
pub struct LogWriter {
    dir: PathBuf,
    next_index: u64,
    verbose: bool,
}

impl LogWriter {
    /// Create the directory if needed and scan it for the next free index.
    pub fn new(dir: &Path, verbose: bool) -> Result<Self, ServerError> {
        fs::create_dir_all(dir)?;

        let pattern = Regex::new(r"^scubywasm-log_(\d+)\.json$")
            .map_err(|e| ServerError::Config(format!("log name pattern: {e}")))?;

        let mut next_index = 0u64;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            let Some(caps) = pattern.captures(&name_str) else {
                continue;
            };
            if let Ok(index) = caps[1].parse::<u64>() {
                next_index = next_index.max(index + 1);
            }
        }

        Ok(Self {
            dir: dir.to_owned(),
            next_index,
            verbose,
        })
    }

    /// The index the next save will use.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Serialize `record` to `scubywasm-log_<n>.json` and bump the index.
    pub fn save<T: Serialize>(&mut self, record: &T) -> Result<PathBuf, ServerError> {
        let path = self
            .dir
            .join(format!("scubywasm-log_{}.json", self.next_index));

        let mut text = serde_json::to_string(record)?;
        text.push('\n');
        fs::write(&path, text)?;

        self.next_index += 1;

        if self.verbose {
            tracing::info!(path = %path.display(), "saved game log");
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_directory_starts_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = LogWriter::new(dir.path(), false).unwrap();
        assert_eq!(writer.next_index(), 0);

        for expected in 0..3u64 {
            let path = writer.save(&serde_json::json!({"ticks": expected})).unwrap();
            assert_eq!(
                path.file_name().unwrap().to_string_lossy(),
                format!("scubywasm-log_{expected}.json")
            );
            assert!(path.is_file());
        }
    }

    #[test]
    fn restart_resumes_one_past_the_largest_suffix() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("scubywasm-log_0.json"), "{}\n").unwrap();
        fs::write(dir.path().join("scubywasm-log_7.json"), "{}\n").unwrap();

        let mut writer = LogWriter::new(dir.path(), false).unwrap();
        assert_eq!(writer.next_index(), 8);

        let path = writer.save(&serde_json::json!({})).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "scubywasm-log_8.json"
        );
    }

    #[test]
    fn unrelated_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("scubywasm-log_3.json"), "{}\n").unwrap();
        fs::write(dir.path().join("scubywasm-log_x.json"), "{}\n").unwrap();
        fs::write(dir.path().join("other_9.json"), "{}\n").unwrap();
        fs::write(dir.path().join("scubywasm-log_12.json.bak"), "{}\n").unwrap();

        let writer = LogWriter::new(dir.path(), false).unwrap();
        assert_eq!(writer.next_index(), 4);
    }

    #[test]
    fn saved_logs_end_with_a_newline() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = LogWriter::new(dir.path(), false).unwrap();
        let path = writer.save(&serde_json::json!({"a": 1})).unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert!(text.ends_with('\n'));
        assert_eq!(text.trim_end(), r#"{"a":1}"#);
    }

    #[test]
    fn missing_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("logs").join("run");
        let writer = LogWriter::new(&nested, false).unwrap();
        assert!(nested.is_dir());
        assert_eq!(writer.next_index(), 0);
    }
}
