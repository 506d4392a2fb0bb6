use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

pub const DEFAULT_AUDIT_LOG_FILE: &str = "ocio_toolkit.log";

/// Append-only audit trail, one line per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    // Failures are logged and swallowed; the audit trail never blocks a result.
    pub fn append_line(&self, line: &str) {
        if let Err(error) = self.try_append_line(line) {
            warn!(
                audit_log = %self.path.display(),
                error = %error,
                "failed to append audit line"
            );
        }
    }

    pub fn try_append_line(&self, line: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_path())?;
        let mut record = line.trim_end_matches(['\r', '\n']).to_string();
        record.push('\n');
        file.write_all(record.as_bytes())
    }
}
