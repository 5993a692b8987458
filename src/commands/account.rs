use anyhow::Result;

use crate::commands::{CommandReport, describe_run};
use crate::getdata::config::load_config;
use crate::getdata::fits::FitsHeaderReader;
use crate::getdata::paths::resolve_paths;
use crate::getdata::pipeline::{self, FrameSource};

#[derive(Debug, Clone, Default)]
pub struct AccountOptions {
    pub proposal: Option<String>,
}

/// Bill frames already sitting in staging without contacting the archive.
pub fn run(opts: &AccountOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("account");
    let paths = resolve_paths()?;
    let cfg = load_config()?;

    let outcome = pipeline::run(
        &paths,
        &cfg,
        &FrameSource::LocalOnly,
        &FitsHeaderReader,
        opts.proposal.as_deref(),
    )?;
    describe_run(&mut report, &outcome);
    Ok(report)
}
