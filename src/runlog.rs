//! Run log and debug files: append-only text files under `log/`, named
//! after the output base name and a timestamp.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::error::{MimiError, Result};

pub struct RunLog {
    pub log_path: PathBuf,
    pub debug_path: PathBuf,
    log: Box<dyn Write>,
    debug: Box<dyn Write>,
    debug_enabled: bool,
    warnings: usize,
}

impl RunLog {
    /// Create `log/<base>_<timestamp>.log` and `.debug` under the current
    /// directory. Debug lines are only written when `debug_enabled`.
    pub fn create(output: &Path, debug_enabled: bool) -> Result<Self> {
        let log_dir = PathBuf::from("log");
        fs::create_dir_all(&log_dir)
            .map_err(|e| MimiError::io(log_dir.display().to_string(), e))?;
        let base = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mimi".to_string());
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let log_path = log_dir.join(format!("{base}_{timestamp}.log"));
        let debug_path = log_dir.join(format!("{base}_{timestamp}.debug"));
        let log = File::create(&log_path)
            .map_err(|e| MimiError::io(log_path.display().to_string(), e))?;
        let debug = File::create(&debug_path)
            .map_err(|e| MimiError::io(debug_path.display().to_string(), e))?;
        Ok(Self {
            log_path,
            debug_path,
            log: Box::new(BufWriter::new(log)),
            debug: Box::new(BufWriter::new(debug)),
            debug_enabled,
            warnings: 0,
        })
    }

    /// A log that discards everything; used by tests and quiet tools.
    pub fn sink() -> Self {
        Self {
            log_path: PathBuf::new(),
            debug_path: PathBuf::new(),
            log: Box::new(io::sink()),
            debug: Box::new(io::sink()),
            debug_enabled: false,
            warnings: 0,
        }
    }

    pub fn write(&mut self, message: &str) {
        let _ = writeln!(self.log, "{message}");
    }

    /// Log a recoverable problem and count it for the end-of-run summary.
    pub fn warn(&mut self, message: &str) {
        self.warnings += 1;
        let _ = writeln!(self.log, "WARNING: {message}");
    }

    pub fn warnings(&self) -> usize {
        self.warnings
    }

    pub fn is_debug(&self) -> bool {
        self.debug_enabled
    }

    pub fn debug(&mut self, message: &str) {
        if self.debug_enabled {
            let _ = writeln!(self.debug, "{message}");
        }
    }

    pub fn flush(&mut self) {
        let _ = self.log.flush();
        let _ = self.debug.flush();
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        self.flush();
    }
}
