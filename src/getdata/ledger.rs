//! Per-proposal time ledger.
//!
//! The on-disk file is a line-oriented log: comment lines (`#` or blank) and
//! entry lines `group  filename  aperture  seconds`. Lines for one
//! observation group sit together; a later frame of a known group is inserted
//! right after the group's first line instead of at the end of the file.
//! The file is parsed once into [`LedgerStore`], queried through an in-memory
//! index, and rewritten in full (temp file + rename) on every commit.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::GetDataError;
use crate::getdata::cost::ApertureClass;
use crate::getdata::util::{format_float, write_atomic};

const FIELD_SEPARATOR: &str = "     ";

pub const LEDGER_HEADER: [&str; 3] = [
    "##### GetData Time Allocation Logfile #####",
    "",
    "# Group Name     File Name     Instrument Name     Total Observation Time",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeEntry {
    pub group_id: String,
    pub filename: String,
    /// Absent only on lines written by the single-proposal tool.
    pub aperture: Option<ApertureClass>,
    pub cost_secs: f64,
}

impl TimeEntry {
    pub fn new(
        group_id: impl Into<String>,
        filename: impl Into<String>,
        aperture: ApertureClass,
        cost_secs: f64,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            filename: filename.into(),
            aperture: Some(aperture),
            cost_secs,
        }
    }

    pub fn to_line(&self) -> String {
        let mut fields = vec![self.group_id.clone(), self.filename.clone()];
        if let Some(aperture) = self.aperture {
            fields.push(aperture.as_str().to_string());
        }
        fields.push(format_float(self.cost_secs));
        fields.join(FIELD_SEPARATOR)
    }
}

#[derive(Debug, Clone)]
enum LedgerLine {
    Comment(String),
    Entry { text: String, entry: TimeEntry },
}

#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
    lines: Vec<LedgerLine>,
    group_first: HashMap<String, usize>,
    filenames: HashSet<String>,
}

fn parse_entry(path: &Path, line_no: usize, trimmed: &str) -> Result<TimeEntry, GetDataError> {
    let corrupt = |reason: String| GetDataError::LedgerCorrupt {
        path: path.to_path_buf(),
        line: line_no,
        reason,
    };

    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    let (group_id, filename, aperture, cost) = match fields.as_slice() {
        [group, file, aperture, cost] => {
            let aperture = aperture.parse::<ApertureClass>().map_err(corrupt)?;
            (*group, *file, Some(aperture), *cost)
        }
        [group, file, cost] => (*group, *file, None, *cost),
        other => {
            return Err(corrupt(format!(
                "expected 3 or 4 fields, found {}",
                other.len()
            )));
        }
    };
    let cost_secs = cost
        .parse::<f64>()
        .map_err(|err| corrupt(format!("invalid seconds `{cost}`: {err}")))?;

    Ok(TimeEntry {
        group_id: group_id.to_string(),
        filename: filename.to_string(),
        aperture,
        cost_secs,
    })
}

impl LedgerStore {
    fn empty(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            lines: LEDGER_HEADER
                .iter()
                .map(|line| LedgerLine::Comment((*line).to_string()))
                .collect(),
            group_first: HashMap::new(),
            filenames: HashSet::new(),
        }
    }

    /// Load the ledger at `path`. A missing file is an empty ledger; nothing
    /// is written.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::empty(path));
        }

        let raw =
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        let mut store = Self {
            path: path.to_path_buf(),
            lines: Vec::new(),
            group_first: HashMap::new(),
            filenames: HashSet::new(),
        };

        for (idx, line) in raw.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                store.lines.push(LedgerLine::Comment(line.to_string()));
                continue;
            }

            let entry = parse_entry(path, idx + 1, trimmed)?;
            if !store.filenames.insert(entry.filename.clone()) {
                return Err(GetDataError::LedgerCorrupt {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    reason: format!("frame {} appears more than once", entry.filename),
                }
                .into());
            }
            let position = store.lines.len();
            store
                .group_first
                .entry(entry.group_id.clone())
                .or_insert(position);
            store.lines.push(LedgerLine::Entry {
                text: line.to_string(),
                entry,
            });
        }

        Ok(store)
    }

    /// Load the ledger, writing the standard header first if the file does
    /// not exist yet.
    pub fn open_or_create(path: &Path) -> Result<Self> {
        let store = Self::open(path)?;
        if !path.exists() {
            store.save()?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_group(&self, group_id: &str) -> bool {
        self.group_first.contains_key(group_id)
    }

    pub fn has_filename(&self, filename: &str) -> bool {
        self.filenames.contains(filename)
    }

    pub fn entries(&self) -> impl Iterator<Item = &TimeEntry> {
        self.lines.iter().filter_map(|line| match line {
            LedgerLine::Entry { entry, .. } => Some(entry),
            LedgerLine::Comment(_) => None,
        })
    }

    pub fn entry_count(&self) -> usize {
        self.filenames.len()
    }

    pub fn group_count(&self) -> usize {
        self.group_first.len()
    }

    /// Start a new group with its first frame as the trailing line.
    pub fn append_new_group(&mut self, entry: TimeEntry) -> Result<()> {
        if self.has_group(&entry.group_id) {
            anyhow::bail!(
                "group {} already exists in {}",
                entry.group_id,
                self.path.display()
            );
        }
        let position = self.lines.len();
        self.commit_at(position, entry)
    }

    /// Add a frame to a known group, directly after the group's first line.
    pub fn insert_into_group(&mut self, entry: TimeEntry) -> Result<()> {
        let Some(&first) = self.group_first.get(&entry.group_id) else {
            anyhow::bail!(
                "group {} does not exist in {}",
                entry.group_id,
                self.path.display()
            );
        };
        self.commit_at(first + 1, entry)
    }

    fn commit_at(&mut self, position: usize, entry: TimeEntry) -> Result<()> {
        if self.has_filename(&entry.filename) {
            return Err(GetDataError::DuplicateFrame {
                filename: entry.filename,
            }
            .into());
        }

        // The next open must read back exactly this entry, or the frame
        // would be billed again or the file rejected as corrupt.
        let text = entry.to_line();
        let reads_back = !text.trim_start().starts_with('#')
            && parse_entry(&self.path, position + 1, text.trim())
                .is_ok_and(|parsed| parsed == entry);
        if !reads_back {
            anyhow::bail!(
                "entry for frame `{}` in group `{}` would not read back from {}",
                entry.filename,
                entry.group_id,
                self.path.display()
            );
        }

        let group_id = entry.group_id.clone();
        let filename = entry.filename.clone();
        self.lines.insert(position, LedgerLine::Entry { text, entry });
        for first in self.group_first.values_mut() {
            if *first >= position {
                *first += 1;
            }
        }
        let created_group = !self.group_first.contains_key(&group_id);
        if created_group {
            self.group_first.insert(group_id.clone(), position);
        }
        self.filenames.insert(filename.clone());

        if let Err(err) = self.save() {
            self.lines.remove(position);
            if created_group {
                self.group_first.remove(&group_id);
            }
            for first in self.group_first.values_mut() {
                if *first > position {
                    *first -= 1;
                }
            }
            self.filenames.remove(&filename);
            return Err(err);
        }
        Ok(())
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                LedgerLine::Comment(text) | LedgerLine::Entry { text, .. } => out.push_str(text),
            }
            out.push('\n');
        }
        out
    }

    fn save(&self) -> Result<()> {
        write_atomic(&self.path, &self.render())
    }
}
