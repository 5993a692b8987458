//! One invocation: lock, then per proposal download into staging, bill
//! staged frames, move billed frames out, then release and render summaries.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::GetDataErrorCode;
use crate::getdata::archive_client::{ArchiveClient, FrameDescriptor, FrameQuery};
use crate::getdata::config::{ArchiveConfig, GetDataConfig, ProposalConfig};
use crate::getdata::dedup::Deduplicator;
use crate::getdata::engine::{FrameResult, LedgerEngine, ProcessOutcome, frame_name};
use crate::getdata::fits::FrameMetadataReader;
use crate::getdata::frames::{is_plain_file_name, list_staged, move_to_final};
use crate::getdata::ledger::LedgerStore;
use crate::getdata::lock::{LockAttempt, RunLock};
use crate::getdata::names::{CATALOG_HEADER, DOWNLOAD_HEADER, NameLedger};
use crate::getdata::paths::GetDataPaths;
use crate::getdata::reduction::ReductionLevel;
use crate::getdata::runlog::RunLog;
use crate::getdata::summary::{SummaryOutcome, write_summary};
use crate::getdata::util::write_atomic;
use crate::getdata::warn::{self, WarnEvent};

pub enum FrameSource<'a> {
    Archive {
        client: &'a dyn ArchiveClient,
        archive: &'a ArchiveConfig,
    },
    /// Bill whatever is already staged; no network access.
    LocalOnly,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProposalCounts {
    pub downloaded: usize,
    pub skipped: usize,
    pub rejected: usize,
    pub catalogs_recorded: usize,
    pub accounted: usize,
    pub already_accounted: usize,
    pub unknown_instrument: usize,
    pub metadata_unavailable: usize,
    pub failed: usize,
    pub moved: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProposalRun {
    pub proposal: String,
    /// Set when the proposal's download and accounting were skipped.
    pub skipped_reason: Option<String>,
    pub counts: ProposalCounts,
    pub frames: Vec<FrameResult>,
}

impl ProposalRun {
    fn new(proposal: &str) -> Self {
        Self {
            proposal: proposal.to_string(),
            skipped_reason: None,
            counts: ProposalCounts::default(),
            frames: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    AlreadyRunning {
        marker: PathBuf,
    },
    Completed {
        started_at: String,
        run_log: PathBuf,
        proposals: Vec<ProposalRun>,
        summaries: Vec<SummaryOutcome>,
    },
}

struct Session<'a> {
    paths: &'a GetDataPaths,
    cfg: &'a GetDataConfig,
    log: &'a RunLog,
    token: Option<String>,
}

fn warn_frame(code: GetDataErrorCode, action: &str, proposal: &str, frame: &str, reason: &str) {
    warn::emit(WarnEvent {
        code: code.as_str(),
        stage: "account",
        action,
        proposal,
        frame,
        retry: "retry-next-run",
        reason,
        err: "",
    });
}

pub fn run(
    paths: &GetDataPaths,
    cfg: &GetDataConfig,
    source: &FrameSource<'_>,
    reader: &dyn FrameMetadataReader,
    only_proposal: Option<&str>,
) -> Result<RunOutcome> {
    let proposals = cfg.selected_proposals(only_proposal)?;

    let lock = match RunLock::acquire(&paths.download_log_dir)? {
        LockAttempt::Held(lock) => lock,
        LockAttempt::AlreadyHeld { marker } => return Ok(RunOutcome::AlreadyRunning { marker }),
    };
    let started_at = lock.acquired_at().to_string();

    // From here any error leaves the marker in place for the operator.
    let log = RunLog::for_today(paths);
    log.begin_run(&started_at)?;

    let mut session = Session {
        paths,
        cfg,
        log: &log,
        token: None,
    };
    let mut runs = Vec::with_capacity(proposals.len());
    for proposal in &proposals {
        let outcome = run_proposal(&mut session, proposal, source, reader)
            .with_context(|| format!("proposal {} failed", proposal.id))?;
        runs.push(outcome);
    }

    lock.release()?;
    log.line("Lock file deleted.")?;

    let mut summaries = Vec::with_capacity(proposals.len());
    for proposal in &proposals {
        log.line("Calculating total time used from all frames.")?;
        let summary = write_summary(
            &paths.ledger_path(&proposal.id),
            &paths.summary_path(&proposal.id),
            proposal,
        )?;
        log.line("Total time calculation completed.")?;
        log.line("Time used updated in HTML file.")?;
        log.line(&format!("GetData completed for proposal {}.", proposal.id))?;
        summaries.push(summary);
    }

    Ok(RunOutcome::Completed {
        started_at,
        run_log: log.path().to_path_buf(),
        proposals: runs,
        summaries,
    })
}

fn run_proposal(
    session: &mut Session<'_>,
    proposal: &ProposalConfig,
    source: &FrameSource<'_>,
    reader: &dyn FrameMetadataReader,
) -> Result<ProposalRun> {
    let mut run = ProposalRun::new(&proposal.id);
    let level = match ReductionLevel::parse(&session.cfg.query.reduction_level) {
        Ok(level) => level,
        Err(err) => {
            session
                .log
                .line("Unknown data type from the configuration file.")?;
            warn::emit(WarnEvent {
                code: GetDataErrorCode::E002UnknownReductionLevel.as_str(),
                stage: "config",
                action: "select-reduction-level",
                proposal: &proposal.id,
                frame: "",
                retry: "fix-config",
                reason: &err.to_string(),
                err: "",
            });
            run.skipped_reason = Some(err.to_string());
            return Ok(run);
        }
    };

    let paths = session.paths;
    let staging = paths.staging_dir(&proposal.id);
    fs::create_dir_all(&staging)
        .with_context(|| format!("failed to create {}", staging.display()))?;
    let mut downloads =
        NameLedger::open_or_create(&paths.downloads_path(&proposal.id), &DOWNLOAD_HEADER)?;
    let mut catalogs =
        NameLedger::open_or_create(&paths.catalog_path(&proposal.id), &CATALOG_HEADER)?;
    let mut store = LedgerStore::open_or_create(&paths.ledger_path(&proposal.id))?;

    if let FrameSource::Archive { client, archive } = source {
        let listing = list_archive(session, *client, archive, proposal, level)?;
        for descriptor in listing {
            download_one(
                session.log,
                *client,
                &descriptor,
                level,
                &staging,
                &mut downloads,
                &mut catalogs,
                &store,
                &mut run,
            )?;
        }
        session.log.line("All frames are downloaded.")?;
    }

    let log = session.log;
    log.line("Calculating time used for each frame...")?;
    let staged: Vec<PathBuf> = list_staged(&staging, level.suffix())?
        .into_iter()
        .filter(|path| level.is_science_frame(&frame_name(path)))
        .collect();
    let results = LedgerEngine::new(&mut store, reader).process_batch(&staged);

    for result in &results {
        let name = result.filename.as_str();
        let counts = &mut run.counts;
        match &result.outcome {
            ProcessOutcome::Accounted { .. } => {
                counts.accounted += 1;
                log.line(&format!("Time calculated for new frame {name}."))?;
            }
            ProcessOutcome::AlreadyAccounted => {
                counts.already_accounted += 1;
                log.line(&format!("Time already calculated for {name}."))?;
            }
            ProcessOutcome::UnsupportedName { reason } => {
                counts.rejected += 1;
                log.line(&format!("Unable to record time for frame {name}: {reason}."))?;
                warn_frame(
                    GetDataErrorCode::E004MetadataUnavailable,
                    "check-name",
                    &proposal.id,
                    name,
                    reason,
                );
            }
            ProcessOutcome::UnknownInstrument { instrument } => {
                counts.unknown_instrument += 1;
                log.line(&format!("Unknown class of instrument for frame {name}."))?;
                warn_frame(
                    GetDataErrorCode::E003UnknownInstrument,
                    "bill-frame",
                    &proposal.id,
                    name,
                    &format!("unknown instrument class {instrument}"),
                );
            }
            ProcessOutcome::MetadataUnavailable { reason } => {
                counts.metadata_unavailable += 1;
                log.line(&format!("Unable to read header of frame {name}: {reason}."))?;
                warn_frame(
                    GetDataErrorCode::E004MetadataUnavailable,
                    "read-header",
                    &proposal.id,
                    name,
                    reason,
                );
            }
            ProcessOutcome::Failed { error } => {
                counts.failed += 1;
                log.line(&format!("Unable to record time for frame {name}: {error}."))?;
                warn_frame(
                    GetDataErrorCode::E007CommitFailed,
                    "commit-ledger",
                    &proposal.id,
                    name,
                    error,
                );
            }
        }
    }
    log.line("Time calculation for each frame completed.")?;

    for result in results.iter().filter(|r| r.outcome.is_accounted()) {
        move_to_final(&result.path, &paths.final_frames_dir)?;
        run.counts.moved += 1;
    }
    for path in list_staged(&staging, &level.catalog_suffix())? {
        let name = frame_name(&path);
        if catalogs.record(&name)? {
            run.counts.catalogs_recorded += 1;
        }
        move_to_final(&path, &paths.final_frames_dir)?;
        run.counts.moved += 1;
    }
    if run.counts.moved > 0 {
        log.line("Frames moved to output directory, ready for use.")?;
    }

    run.frames = results;
    Ok(run)
}

fn list_archive(
    session: &mut Session<'_>,
    client: &dyn ArchiveClient,
    archive: &ArchiveConfig,
    proposal: &ProposalConfig,
    level: ReductionLevel,
) -> Result<Vec<FrameDescriptor>> {
    let token = match &session.token {
        Some(token) => token.clone(),
        None => {
            session.log.line("Log in to LCOGT archive...")?;
            let (username, password) = archive.credentials()?;
            let token = client.authenticate(username, password)?;
            session.token = Some(token.clone());
            token
        }
    };
    session.log.line(&format!(
        "Log in successful, downloading requested frames for proposal {}...",
        proposal.id
    ))?;

    let query = &session.cfg.query;
    let mut listing = Vec::new();
    for obs_type in &query.obs_types {
        let frames = client.list_frames(
            &token,
            &FrameQuery {
                proposal: proposal.id.clone(),
                date_start: query.date_start.clone(),
                date_end: query.date_end.clone(),
                reduction_code: level.archive_code().to_string(),
                obs_type: obs_type.clone(),
            },
        )?;
        listing.extend(frames);
    }
    Ok(listing)
}

#[allow(clippy::too_many_arguments)]
fn download_one(
    log: &RunLog,
    client: &dyn ArchiveClient,
    descriptor: &FrameDescriptor,
    level: ReductionLevel,
    staging: &Path,
    downloads: &mut NameLedger,
    catalogs: &mut NameLedger,
    store: &LedgerStore,
    run: &mut ProposalRun,
) -> Result<()> {
    let name = descriptor.filename.as_str();
    if !is_plain_file_name(name) {
        run.counts.rejected += 1;
        warn::emit(WarnEvent {
            code: GetDataErrorCode::E005TransportFailure.as_str(),
            stage: "download",
            action: "stage-frame",
            proposal: &run.proposal,
            frame: name,
            retry: "none",
            reason: "archive file name is not a plain file name",
            err: "",
        });
        return Ok(());
    }

    let target = staging.join(name);
    let is_catalog = level.is_catalog(name);
    let needed = {
        let dedup = Deduplicator::new(downloads, store, catalogs);
        if is_catalog {
            dedup.needs_catalog_download(name)
        } else if level.is_science_frame(name) {
            dedup.needs_frame_download(name, target.exists())
        } else {
            return Ok(());
        }
    };
    if !needed {
        run.counts.skipped += 1;
        log.line(&format!("Skipping {name}, already exists."))?;
        return Ok(());
    }

    let bytes = client.fetch(&descriptor.url)?;
    write_atomic(&target, bytes)?;
    if is_catalog {
        catalogs.record(name)?;
        run.counts.catalogs_recorded += 1;
    } else {
        downloads.record(name)?;
    }
    run.counts.downloaded += 1;
    log.line(&format!("{name} successfully downloaded."))?;
    Ok(())
}
