//! Append-only node journal
//!
//! One line per event: an RFC 3339 UTC timestamp, the state, and a message.
//! Events are mirrored to the `log` facade. Callers redact before recording.

use crate::error::Result;
use chrono::{SecondsFormat, Utc};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Node-local diagnostic record
#[derive(Debug)]
pub struct Journal {
    path: Option<PathBuf>,
    file: Option<File>,
}

impl Journal {
    /// Open (or create) a journal file for appending
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            file: Some(file),
        })
    }

    /// A journal that only mirrors to `log`
    pub fn log_only() -> Self {
        Self {
            path: None,
            file: None,
        }
    }

    /// Journal file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append one event
    pub fn record(&mut self, state: &str, message: &str) -> Result<()> {
        log::info!("[{state}] {message}");
        if let Some(file) = &mut self.file {
            let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
            writeln!(file, "{ts} {state} {message}")?;
            file.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_appends_across_opens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log/bootstrap.log");

        let mut journal = Journal::open(&path).unwrap();
        journal.record("init", "first").unwrap();
        drop(journal);

        let mut journal = Journal::open(&path).unwrap();
        journal.record("init", "second").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("init first"));
        assert!(lines[1].ends_with("init second"));
        assert!(lines[0].contains('T') && lines[0].split(' ').next().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_log_only_has_no_path() {
        let mut journal = Journal::log_only();
        journal.record("init", "nothing written").unwrap();
        assert!(journal.path().is_none());
    }
}
