use anyhow::Result;

use crate::commands::CommandReport;
use crate::getdata::config::load_config;
use crate::getdata::paths::resolve_paths;
use crate::getdata::summary::write_summary;

#[derive(Debug, Clone, Default)]
pub struct SummaryOptions {
    pub proposal: Option<String>,
}

pub fn run(opts: &SummaryOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("summary");
    let paths = resolve_paths()?;
    let cfg = load_config()?;

    for proposal in cfg.selected_proposals(opts.proposal.as_deref())? {
        match write_summary(
            &paths.ledger_path(&proposal.id),
            &paths.summary_path(&proposal.id),
            &proposal,
        ) {
            Ok(summary) => report.detail(format!(
                "summary.{}={} hours_1m0={} hours_2m0={}",
                summary.proposal,
                summary.path.display(),
                summary.totals.hours_1m0_text(),
                summary.totals.hours_2m0_text()
            )),
            Err(err) => report.issue(format!("summary.{} failed: {err:#}", proposal.id)),
        }
    }
    Ok(report)
}
