//! Advisory run marker.
//!
//! The marker's existence is the whole protocol: whoever creates it owns the
//! run, and nothing ever judges it stale. A run that dies before
//! [`RunLock::release`] leaves the marker behind and every later run backs off
//! until an operator deletes it.

use anyhow::{Context, Result};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::getdata::util::now_utc_timestamp;

pub const LOCK_FILE: &str = "GetData.lock";

#[derive(Debug)]
pub struct RunLock {
    marker: PathBuf,
    acquired_at: String,
}

#[derive(Debug)]
pub enum LockAttempt {
    Held(RunLock),
    AlreadyHeld { marker: PathBuf },
}

pub fn marker_path(scope: &Path) -> PathBuf {
    scope.join(LOCK_FILE)
}

/// Timestamp written by the run holding the marker, if a marker exists.
pub fn inspect(scope: &Path) -> Result<Option<String>> {
    let marker = marker_path(scope);
    match fs::read_to_string(&marker) {
        Ok(raw) => Ok(Some(raw.trim().to_string())),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", marker.display())),
    }
}

impl RunLock {
    pub fn acquire(scope: &Path) -> Result<LockAttempt> {
        fs::create_dir_all(scope)
            .with_context(|| format!("failed to create {}", scope.display()))?;
        let marker = marker_path(scope);

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&marker)
        {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Ok(LockAttempt::AlreadyHeld { marker });
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to create {}", marker.display()));
            }
        };

        let acquired_at = now_utc_timestamp();
        file.write_all(acquired_at.as_bytes())
            .with_context(|| format!("failed to write {}", marker.display()))?;

        Ok(LockAttempt::Held(RunLock {
            marker,
            acquired_at,
        }))
    }

    pub fn acquired_at(&self) -> &str {
        &self.acquired_at
    }

    pub fn release(self) -> Result<()> {
        match fs::remove_file(&self.marker) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to remove {}", self.marker.display()))
            }
        }
    }
}
