use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::getdata::util::move_file;

/// Regular files in `dir` whose names end with `suffix`, sorted by name.
/// A missing directory holds nothing.
pub fn list_staged(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err).with_context(|| format!("failed to read {}", dir.display())),
    };

    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read {}", dir.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(suffix));
        if matches {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

pub fn move_to_final(from: &Path, final_dir: &Path) -> Result<PathBuf> {
    let name = from
        .file_name()
        .with_context(|| format!("{} has no file name", from.display()))?;
    let to = final_dir.join(name);
    move_file(from, &to)?;
    Ok(to)
}

/// Names are written under staging, as one whitespace-delimited ledger field
/// and as a whole line of the name ledgers, where a leading `#` is a comment.
pub fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
        && !name.contains(char::is_whitespace)
        && !name.starts_with('#')
}
