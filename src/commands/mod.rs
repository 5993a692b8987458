pub mod account;
pub mod run;
pub mod status;
pub mod summary;

use serde::Serialize;

use crate::error::GetDataErrorCode;
use crate::getdata::pipeline::{ProposalRun, RunOutcome};

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }
}

fn describe_proposal(report: &mut CommandReport, run: &ProposalRun) {
    let id = &run.proposal;
    if let Some(reason) = &run.skipped_reason {
        report.issue(format!("proposal.{id} skipped: {reason}"));
        return;
    }
    let c = &run.counts;
    report.detail(format!("proposal.{id}.downloaded={}", c.downloaded));
    report.detail(format!("proposal.{id}.skipped={}", c.skipped));
    report.detail(format!("proposal.{id}.catalogs_recorded={}", c.catalogs_recorded));
    report.detail(format!("proposal.{id}.accounted={}", c.accounted));
    report.detail(format!("proposal.{id}.already_accounted={}", c.already_accounted));
    report.detail(format!("proposal.{id}.unknown_instrument={}", c.unknown_instrument));
    report.detail(format!(
        "proposal.{id}.metadata_unavailable={}",
        c.metadata_unavailable
    ));
    report.detail(format!("proposal.{id}.moved={}", c.moved));
    if c.rejected > 0 {
        report.issue(format!(
            "proposal.{id}: {} file names rejected",
            c.rejected
        ));
    }
    if c.failed > 0 {
        report.issue(format!(
            "proposal.{id}: {} frames could not be recorded in the ledger",
            c.failed
        ));
    }
}

/// Shared rendering of a pipeline outcome for `run` and `account`.
pub fn describe_run(report: &mut CommandReport, outcome: &RunOutcome) {
    match outcome {
        RunOutcome::AlreadyRunning { marker } => {
            report.detail(format!(
                "{} another run holds {}; nothing to do",
                GetDataErrorCode::E001AlreadyRunning.as_str(),
                marker.display()
            ));
        }
        RunOutcome::Completed {
            started_at,
            run_log,
            proposals,
            summaries,
        } => {
            report.detail(format!("started_at={started_at}"));
            report.detail(format!("run_log={}", run_log.display()));
            for run in proposals {
                describe_proposal(report, run);
            }
            for summary in summaries {
                report.detail(format!(
                    "summary.{}={} hours_1m0={} hours_2m0={}",
                    summary.proposal,
                    summary.path.display(),
                    summary.totals.hours_1m0_text(),
                    summary.totals.hours_2m0_text()
                ));
            }
        }
    }
}
