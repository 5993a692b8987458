use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::GetDataError;
use crate::getdata::cost;
use crate::getdata::fits::FrameMetadataReader;
use crate::getdata::frames::is_plain_file_name;
use crate::getdata::ledger::{LedgerStore, TimeEntry};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessOutcome {
    Accounted {
        entry: TimeEntry,
        first_in_group: bool,
    },
    AlreadyAccounted,
    /// The file name cannot be a single ledger field.
    UnsupportedName {
        reason: String,
    },
    UnknownInstrument {
        instrument: String,
    },
    MetadataUnavailable {
        reason: String,
    },
    /// Commit failed; the frame stays unbilled.
    Failed {
        error: String,
    },
}

impl ProcessOutcome {
    pub fn is_accounted(&self) -> bool {
        matches!(self, Self::Accounted { .. } | Self::AlreadyAccounted)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameResult {
    pub filename: String,
    pub path: PathBuf,
    pub outcome: ProcessOutcome,
}

pub fn frame_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Bills local frames into one proposal's ledger, at most once per file name.
pub struct LedgerEngine<'a, R: FrameMetadataReader + ?Sized> {
    store: &'a mut LedgerStore,
    reader: &'a R,
}

impl<'a, R: FrameMetadataReader + ?Sized> LedgerEngine<'a, R> {
    pub fn new(store: &'a mut LedgerStore, reader: &'a R) -> Self {
        Self { store, reader }
    }

    /// Account one frame. `Err` only when the ledger commit itself fails;
    /// every other condition is an outcome that leaves the ledger untouched.
    pub fn process(&mut self, path: &Path) -> Result<ProcessOutcome> {
        let name = frame_name(path);
        if !is_plain_file_name(&name) {
            return Ok(ProcessOutcome::UnsupportedName {
                reason: format!("file name `{name}` cannot be stored as a ledger field"),
            });
        }
        if self.store.has_filename(&name) {
            return Ok(ProcessOutcome::AlreadyAccounted);
        }

        let meta = match self.reader.read(path) {
            Ok(meta) => meta,
            Err(GetDataError::MetadataUnavailable { reason, .. }) => {
                return Ok(ProcessOutcome::MetadataUnavailable { reason });
            }
            Err(other) => {
                return Ok(ProcessOutcome::MetadataUnavailable {
                    reason: other.to_string(),
                });
            }
        };

        // Group lookup, cost, commit: first-in-group must be read from the
        // same store state the commit lands in.
        let first_in_group = !self.store.has_group(&meta.group_id);
        let charge = match cost::cost(&meta.instrument, meta.exposure_secs, first_in_group) {
            Ok(charge) => charge,
            Err(GetDataError::UnknownInstrumentClass { instrument }) => {
                return Ok(ProcessOutcome::UnknownInstrument { instrument });
            }
            Err(other) => return Err(other.into()),
        };

        let entry = TimeEntry::new(meta.group_id, name, charge.aperture, charge.seconds);
        if first_in_group {
            self.store.append_new_group(entry.clone())?;
        } else {
            self.store.insert_into_group(entry.clone())?;
        }

        Ok(ProcessOutcome::Accounted {
            entry,
            first_in_group,
        })
    }

    /// Account each frame in order; a failure on one frame is recorded and
    /// the rest of the batch still runs.
    pub fn process_batch(&mut self, paths: &[PathBuf]) -> Vec<FrameResult> {
        paths
            .iter()
            .map(|path| {
                let outcome = self
                    .process(path)
                    .unwrap_or_else(|err| ProcessOutcome::Failed {
                        error: format!("{err:#}"),
                    });
                FrameResult {
                    filename: frame_name(path),
                    path: path.clone(),
                    outcome,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::getdata::cost::ApertureClass;
    use crate::getdata::fits::FitsHeaderReader;
    use crate::getdata::fits::testing::frame_bytes;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn write_frame(dir: &TempDir, name: &str, group: &str, exposure: &str, inst: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, frame_bytes(group, exposure, inst)).expect("write frame");
        path
    }

    #[test]
    fn processing_twice_bills_once() {
        let tmp = tempdir().expect("tempdir");
        let frame = write_frame(&tmp, "a.fits", "g1", "100", "fl03");
        let mut store = LedgerStore::open_or_create(&tmp.path().join("TimeLog_P.txt")).expect("open");
        let mut engine = LedgerEngine::new(&mut store, &FitsHeaderReader);

        let first = engine.process(&frame).expect("first");
        assert_eq!(
            first,
            ProcessOutcome::Accounted {
                entry: TimeEntry::new("g1", "a.fits", ApertureClass::OneMeter, 230.0),
                first_in_group: true,
            }
        );
        assert_eq!(
            engine.process(&frame).expect("second"),
            ProcessOutcome::AlreadyAccounted
        );
        assert_eq!(store.entry_count(), 1);
    }

    #[test]
    fn later_frames_of_a_group_pay_continuing_cost() {
        let tmp = tempdir().expect("tempdir");
        let frames = vec![
            write_frame(&tmp, "a.fits", "g1", "100", "fs02"),
            write_frame(&tmp, "b.fits", "g2", "100", "kb71"),
            write_frame(&tmp, "c.fits", "g1", "100", "fs02"),
            write_frame(&tmp, "d.fits", "g2", "100", "kb71"),
        ];
        let mut store = LedgerStore::open_or_create(&tmp.path().join("TimeLog_P.txt")).expect("open");
        let mut engine = LedgerEngine::new(&mut store, &FitsHeaderReader);

        let results = engine.process_batch(&frames);
        let costs: Vec<(String, f64)> = results
            .iter()
            .map(|r| match &r.outcome {
                ProcessOutcome::Accounted { entry, .. } => (r.filename.clone(), entry.cost_secs),
                other => panic!("unexpected outcome {other:?}"),
            })
            .collect();
        assert_eq!(
            costs,
            vec![
                ("a.fits".to_string(), 364.5),
                ("b.fits".to_string(), 207.5),
                ("c.fits".to_string(), 124.5),
                ("d.fits".to_string(), 117.5),
            ]
        );

        let order: Vec<&str> = store.entries().map(|e| e.filename.as_str()).collect();
        assert_eq!(order, vec!["a.fits", "c.fits", "b.fits", "d.fits"]);
    }

    #[test]
    fn unknown_instrument_is_not_committed_and_can_retry() {
        let tmp = tempdir().expect("tempdir");
        let frame = write_frame(&tmp, "x.fits", "g1", "100", "xx01");
        let ledger_path = tmp.path().join("TimeLog_P.txt");
        let mut store = LedgerStore::open_or_create(&ledger_path).expect("open");
        let before = fs::read_to_string(&ledger_path).expect("read");
        let mut engine = LedgerEngine::new(&mut store, &FitsHeaderReader);

        for _ in 0..2 {
            assert_eq!(
                engine.process(&frame).expect("process"),
                ProcessOutcome::UnknownInstrument {
                    instrument: "xx01".to_string()
                }
            );
        }
        assert_eq!(fs::read_to_string(&ledger_path).expect("read"), before);
        assert!(!store.has_group("g1"));
    }

    #[test]
    fn one_bad_frame_does_not_stop_the_batch() {
        let tmp = tempdir().expect("tempdir");
        let broken = tmp.path().join("broken.fits");
        fs::write(&broken, b"not a fits file").expect("write");
        let frames = vec![
            broken,
            write_frame(&tmp, "good.fits", "g1", "10", "kb71"),
            tmp.path().join("missing.fits"),
        ];
        let mut store = LedgerStore::open_or_create(&tmp.path().join("TimeLog_P.txt")).expect("open");
        let mut engine = LedgerEngine::new(&mut store, &FitsHeaderReader);

        let results = engine.process_batch(&frames);
        assert!(matches!(
            results[0].outcome,
            ProcessOutcome::MetadataUnavailable { .. }
        ));
        assert!(results[1].outcome.is_accounted());
        assert!(matches!(
            results[2].outcome,
            ProcessOutcome::MetadataUnavailable { .. }
        ));
        assert_eq!(store.entry_count(), 1);
    }

    #[test]
    fn no_filename_is_billed_twice_across_batches() {
        let tmp = tempdir().expect("tempdir");
        let mut frames = Vec::new();
        for i in 0..12 {
            let group = format!("g{}", i % 3);
            frames.push(write_frame(&tmp, &format!("f{i}.fits"), &group, "30", "fl03"));
        }
        let ledger_path = tmp.path().join("TimeLog_P.txt");
        for round in 0..3 {
            let mut store = LedgerStore::open_or_create(&ledger_path).expect("open");
            let mut engine = LedgerEngine::new(&mut store, &FitsHeaderReader);
            let slice = &frames[..4 * (round + 1)];
            engine.process_batch(slice);
        }

        let store = LedgerStore::open(&ledger_path).expect("reopen");
        let names: Vec<&str> = store.entries().map(|e| e.filename.as_str()).collect();
        let unique: HashSet<&str> = names.iter().copied().collect();
        assert_eq!(names.len(), 12);
        assert_eq!(unique.len(), 12);
        assert_eq!(store.group_count(), 3);
    }

    #[test]
    fn comment_like_group_is_never_billed() {
        let tmp = tempdir().expect("tempdir");
        let frame = write_frame(&tmp, "a.fits", "#7", "100", "fl03");
        let ledger_path = tmp.path().join("TimeLog_P.txt");

        for _ in 0..3 {
            let mut store = LedgerStore::open_or_create(&ledger_path).expect("open");
            let mut engine = LedgerEngine::new(&mut store, &FitsHeaderReader);
            assert!(matches!(
                engine.process(&frame).expect("process"),
                ProcessOutcome::MetadataUnavailable { .. }
            ));
        }

        let raw = fs::read_to_string(&ledger_path).expect("read");
        assert!(!raw.contains("a.fits"));
        assert_eq!(LedgerStore::open(&ledger_path).expect("reopen").entry_count(), 0);
    }

    #[test]
    fn names_with_whitespace_stay_unbilled_and_ledger_stays_readable() {
        let tmp = tempdir().expect("tempdir");
        let frames = vec![
            write_frame(&tmp, "my frame.fits", "g1", "100", "fl03"),
            write_frame(&tmp, "b.fits", "g1", "100", "fl03"),
        ];
        let ledger_path = tmp.path().join("TimeLog_P.txt");
        let mut store = LedgerStore::open_or_create(&ledger_path).expect("open");
        let mut engine = LedgerEngine::new(&mut store, &FitsHeaderReader);

        let results = engine.process_batch(&frames);
        assert!(matches!(
            results[0].outcome,
            ProcessOutcome::UnsupportedName { .. }
        ));
        assert!(!results[0].outcome.is_accounted());
        assert!(results[1].outcome.is_accounted());

        let reopened = LedgerStore::open(&ledger_path).expect("reopen");
        assert_eq!(reopened.entry_count(), 1);
        assert!(!reopened.has_filename("my"));
    }
}
