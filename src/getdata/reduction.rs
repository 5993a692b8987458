use crate::error::GetDataError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionLevel {
    Raw,
    Quicklook,
    Reduced,
}

impl ReductionLevel {
    pub fn parse(raw: &str) -> Result<Self, GetDataError> {
        match raw.trim() {
            "raw" => Ok(Self::Raw),
            "quicklook" => Ok(Self::Quicklook),
            "reduced" => Ok(Self::Reduced),
            other => Err(GetDataError::UnknownReductionLevel(other.to_string())),
        }
    }

    /// `RLEVEL` query value understood by the archive.
    pub fn archive_code(self) -> &'static str {
        match self {
            Self::Raw => "00",
            Self::Quicklook => "10",
            Self::Reduced => "90",
        }
    }

    /// Suffix of files delivered at this level.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Raw => ".fz",
            Self::Quicklook | Self::Reduced => ".fits",
        }
    }

    pub fn catalog_suffix(self) -> String {
        format!("cat{}", self.suffix())
    }

    pub fn is_catalog(self, filename: &str) -> bool {
        filename.ends_with(&self.catalog_suffix())
    }

    pub fn is_science_frame(self, filename: &str) -> bool {
        filename.ends_with(self.suffix()) && !self.is_catalog(filename)
    }
}
