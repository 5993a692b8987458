use crate::getdata::ledger::LedgerStore;
use crate::getdata::names::NameLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Fetched into staging, possibly not yet accounted.
    Downloaded,
    TimeAccounted,
    Catalog,
}

/// Read-only membership view over the three per-proposal stores.
pub struct Deduplicator<'a> {
    downloads: &'a NameLedger,
    ledger: &'a LedgerStore,
    catalogs: &'a NameLedger,
}

impl<'a> Deduplicator<'a> {
    pub fn new(
        downloads: &'a NameLedger,
        ledger: &'a LedgerStore,
        catalogs: &'a NameLedger,
    ) -> Self {
        Self {
            downloads,
            ledger,
            catalogs,
        }
    }

    pub fn is_known(&self, name: &str, scope: Scope) -> bool {
        match scope {
            Scope::Downloaded => self.downloads.contains(name),
            Scope::TimeAccounted => self.ledger.has_filename(name),
            Scope::Catalog => self.catalogs.contains(name),
        }
    }

    /// A science frame needs fetching unless it is already billed or is
    /// still sitting in staging from an earlier fetch.
    pub fn needs_frame_download(&self, name: &str, staged: bool) -> bool {
        if self.is_known(name, Scope::TimeAccounted) {
            return false;
        }
        !(staged && self.is_known(name, Scope::Downloaded))
    }

    pub fn needs_catalog_download(&self, name: &str) -> bool {
        !self.is_known(name, Scope::Catalog)
    }
}
