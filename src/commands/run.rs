use anyhow::Result;

use crate::commands::{CommandReport, describe_run};
use crate::getdata::archive_client::LcoArchiveClient;
use crate::getdata::config::load_config;
use crate::getdata::fits::FitsHeaderReader;
use crate::getdata::paths::resolve_paths;
use crate::getdata::pipeline::{self, FrameSource};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub proposal: Option<String>,
}

pub fn run(opts: &RunOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("run");
    let paths = resolve_paths()?;
    let cfg = load_config()?;
    let client = LcoArchiveClient::new(&cfg.archive)?;
    let source = FrameSource::Archive {
        client: &client,
        archive: &cfg.archive,
    };

    let outcome = pipeline::run(
        &paths,
        &cfg,
        &source,
        &FitsHeaderReader,
        opts.proposal.as_deref(),
    )?;
    describe_run(&mut report, &outcome);
    Ok(report)
}
