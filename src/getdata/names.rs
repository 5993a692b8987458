use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const CATALOG_HEADER: [&str; 3] = ["##### GetData Catalog Logfile #####", "", "# File Name"];
pub const DOWNLOAD_HEADER: [&str; 3] = ["##### GetData Download Ledger #####", "", "# File Name"];

/// Append-only set of file names, one per line.
///
/// Backs both the download ledger (frames already fetched to staging) and
/// the catalog ledger (catalog files recorded but never time-accounted).
#[derive(Debug, Clone)]
pub struct NameLedger {
    path: PathBuf,
    names: HashSet<String>,
}

impl NameLedger {
    pub fn open_or_create(path: &Path, header: &[&str]) -> Result<Self> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let mut out = header.join("\n");
            out.push('\n');
            fs::write(path, out).with_context(|| format!("failed to write {}", path.display()))?;
        }
        Self::open(path)
    }

    pub fn open(path: &Path) -> Result<Self> {
        let mut names = HashSet::new();
        if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            for line in raw.lines() {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    continue;
                }
                if let Some(name) = trimmed.split_whitespace().next() {
                    names.insert(name.to_string());
                }
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            names,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Record `name`; returns false when it was already present.
    pub fn record(&mut self, name: &str) -> Result<bool> {
        if self.contains(name) {
            return Ok(false);
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.write_all(format!("{name}\n").as_bytes())
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        self.names.insert(name.to_string());
        Ok(true)
    }
}
