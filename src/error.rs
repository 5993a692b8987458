use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GetDataError {
    #[error("config file invalid or unreadable: {0}")]
    InvalidConfig(String),
    #[error("archive credentials missing: set GETDATA_USERNAME and GETDATA_PASSWORD")]
    MissingCredentials,
    #[error("unknown reduction level `{0}`; use raw, quicklook or reduced")]
    UnknownReductionLevel(String),
    #[error("unknown class of instrument `{instrument}`")]
    UnknownInstrumentClass { instrument: String },
    #[error("frame metadata unavailable for {}: {reason}", path.display())]
    MetadataUnavailable { path: PathBuf, reason: String },
    #[error("archive transport failure: {0}")]
    TransportFailure(String),
    #[error("ledger {} corrupt at line {line}: {reason}", path.display())]
    LedgerCorrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("frame {filename} is already accounted in the ledger")]
    DuplicateFrame { filename: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetDataErrorCode {
    E001AlreadyRunning,
    E002UnknownReductionLevel,
    E003UnknownInstrument,
    E004MetadataUnavailable,
    E005TransportFailure,
    E006LedgerCorrupt,
    E007CommitFailed,
}

impl GetDataErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001AlreadyRunning => "E001_ALREADY_RUNNING",
            Self::E002UnknownReductionLevel => "E002_UNKNOWN_REDUCTION_LEVEL",
            Self::E003UnknownInstrument => "E003_UNKNOWN_INSTRUMENT",
            Self::E004MetadataUnavailable => "E004_METADATA_UNAVAILABLE",
            Self::E005TransportFailure => "E005_TRANSPORT_FAILURE",
            Self::E006LedgerCorrupt => "E006_LEDGER_CORRUPT",
            Self::E007CommitFailed => "E007_COMMIT_FAILED",
        }
    }
}

impl GetDataError {
    pub fn code(&self) -> Option<GetDataErrorCode> {
        match self {
            Self::UnknownReductionLevel(_) => Some(GetDataErrorCode::E002UnknownReductionLevel),
            Self::UnknownInstrumentClass { .. } => Some(GetDataErrorCode::E003UnknownInstrument),
            Self::MetadataUnavailable { .. } => Some(GetDataErrorCode::E004MetadataUnavailable),
            Self::TransportFailure(_) => Some(GetDataErrorCode::E005TransportFailure),
            Self::LedgerCorrupt { .. } => Some(GetDataErrorCode::E006LedgerCorrupt),
            Self::DuplicateFrame { .. } => Some(GetDataErrorCode::E007CommitFailed),
            Self::InvalidConfig(_) | Self::MissingCredentials => None,
        }
    }
}
