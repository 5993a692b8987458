use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::getdata::config::ProposalConfig;
use crate::getdata::cost::ApertureClass;
use crate::getdata::ledger::LedgerStore;
use crate::getdata::util::{format_float, round_to_hundredths, write_atomic};

const SECS_PER_HOUR: f64 = 3600.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct UsageTotals {
    pub seconds_1m0: f64,
    pub seconds_2m0: f64,
    pub has_2m0: bool,
}

impl UsageTotals {
    /// Entries written before apertures were recorded count as 1m0.
    pub fn from_ledger(store: &LedgerStore) -> Self {
        let mut totals = Self::default();
        for entry in store.entries() {
            match entry.aperture.unwrap_or(ApertureClass::OneMeter) {
                ApertureClass::OneMeter => totals.seconds_1m0 += entry.cost_secs,
                ApertureClass::TwoMeter => {
                    totals.seconds_2m0 += entry.cost_secs;
                    totals.has_2m0 = true;
                }
            }
        }
        totals
    }

    pub fn hours_1m0(&self) -> f64 {
        round_to_hundredths(self.seconds_1m0 / SECS_PER_HOUR)
    }

    pub fn hours_2m0(&self) -> f64 {
        round_to_hundredths(self.seconds_2m0 / SECS_PER_HOUR)
    }

    pub fn hours_1m0_text(&self) -> String {
        format_float(self.hours_1m0())
    }

    pub fn hours_2m0_text(&self) -> String {
        if self.has_2m0 {
            format_float(self.hours_2m0())
        } else {
            "0.00".to_string()
        }
    }
}

fn usage_line(aperture: ApertureClass, used: &str, allocated: f64) -> String {
    format!("<strong>{aperture} Time Used/Allocated: {used} of {allocated} hrs</strong><br>")
}

pub fn render_html(totals: &UsageTotals, proposal: &ProposalConfig) -> String {
    let mut out = String::from("<html><body>");
    out.push_str(&usage_line(
        ApertureClass::OneMeter,
        &totals.hours_1m0_text(),
        proposal.allocation_1m0_hours,
    ));
    if let Some(allocated) = proposal.allocation_2m0_hours {
        out.push_str(&usage_line(
            ApertureClass::TwoMeter,
            &totals.hours_2m0_text(),
            allocated,
        ));
    }
    out.push_str("</body></html>");
    out
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryOutcome {
    pub proposal: String,
    pub path: PathBuf,
    pub totals: UsageTotals,
}

/// Rewrite the proposal's summary page from the ledger at `ledger_path`.
pub fn write_summary(
    ledger_path: &Path,
    summary_path: &Path,
    proposal: &ProposalConfig,
) -> Result<SummaryOutcome> {
    let store = LedgerStore::open(ledger_path)?;
    let totals = UsageTotals::from_ledger(&store);
    write_atomic(summary_path, &render_html(&totals, proposal))?;
    Ok(SummaryOutcome {
        proposal: proposal.id.clone(),
        path: summary_path.to_path_buf(),
        totals,
    })
}
