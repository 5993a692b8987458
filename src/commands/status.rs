use anyhow::Result;

use crate::commands::CommandReport;
use crate::getdata::config::{load_config, unknown_env_keys};
use crate::getdata::ledger::LedgerStore;
use crate::getdata::lock;
use crate::getdata::names::NameLedger;
use crate::getdata::paths::resolve_paths;
use crate::getdata::summary::UsageTotals;

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("build_uuid={}", env!("BUILD_UUID")));
    report.detail(format!("getdata_home={}", paths.home.display()));
    report.detail(format!("frames_dir={}", paths.frames_dir.display()));
    report.detail(format!(
        "download_log_dir={}",
        paths.download_log_dir.display()
    ));
    report.detail(format!("time_log_dir={}", paths.time_log_dir.display()));
    report.detail(format!(
        "final_frames_dir={}",
        paths.final_frames_dir.display()
    ));

    match lock::inspect(&paths.download_log_dir)? {
        Some(acquired_at) => report.detail(format!(
            "lock=held acquired_at={acquired_at} marker={}",
            lock::marker_path(&paths.download_log_dir).display()
        )),
        None => report.detail("lock=free"),
    }

    for key in unknown_env_keys() {
        report.issue(format!("unknown environment variable {key}"));
    }

    let cfg = match load_config() {
        Ok(cfg) => cfg,
        Err(err) => {
            report.issue(format!("config: {err:#}"));
            return Ok(report);
        }
    };
    report.detail(format!("reduction_level={}", cfg.query.reduction_level));

    for proposal in &cfg.proposals {
        let id = &proposal.id;
        match LedgerStore::open(&paths.ledger_path(id)) {
            Ok(store) => {
                let totals = UsageTotals::from_ledger(&store);
                report.detail(format!(
                    "proposal.{id} entries={} groups={} hours_1m0={} of {} hours_2m0={}",
                    store.entry_count(),
                    store.group_count(),
                    totals.hours_1m0_text(),
                    proposal.allocation_1m0_hours,
                    totals.hours_2m0_text()
                ));
                report.detail(format!("proposal.{id}.ledger={}", store.path().display()));
            }
            Err(err) => report.issue(format!("proposal.{id} ledger unreadable: {err:#}")),
        }
        let downloads = NameLedger::open(&paths.downloads_path(id))?;
        let catalogs = NameLedger::open(&paths.catalog_path(id))?;
        report.detail(format!(
            "proposal.{id}.downloads_recorded={} catalogs_recorded={}",
            downloads.len(),
            catalogs.len()
        ));
    }

    Ok(report)
}
