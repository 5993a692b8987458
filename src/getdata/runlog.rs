use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::getdata::paths::GetDataPaths;
use crate::getdata::util::today_utc;

pub const RUN_LOG_HEADER: &str = "##### GetData Download Logfile #####";

/// Operator-facing daily log, one file per UTC date, append-only.
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn for_today(paths: &GetDataPaths) -> Self {
        Self::at(paths.run_log_path(&today_utc()))
    }

    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a run section stamped with `started_at`.
    pub fn begin_run(&self, started_at: &str) -> Result<()> {
        let fresh = !self.path.exists();
        let mut text = String::new();
        if fresh {
            text.push_str(RUN_LOG_HEADER);
            text.push_str("\n\n");
        } else {
            text.push_str("\n\n");
        }
        text.push_str(started_at);
        text.push_str("\n\n");
        text.push_str("Lock file created.\n");
        self.append_raw(&text)
    }

    pub fn line(&self, message: &str) -> Result<()> {
        self.append_raw(&format!("{message}\n"))
    }

    fn append_raw(&self, text: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.write_all(text.as_bytes())
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        Ok(())
    }
}
