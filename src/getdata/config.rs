use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::error::GetDataError;

include!(concat!(env!("OUT_DIR"), "/getdata_env_allowlist.rs"));

/// Marks a proposal with no 2m0 allocation in csv overrides.
const NO_ALLOCATION: &str = "NONE";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub base_url: String,
    pub token_path: String,
    pub frames_path: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// No timeout when unset; a hung request stalls the run.
    pub request_timeout_secs: Option<u64>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            base_url: "https://archive-api.lco.global".to_string(),
            token_path: "/api-token-auth/".to_string(),
            frames_path: "/frames/".to_string(),
            username: String::new(),
            password: String::new(),
            request_timeout_secs: None,
        }
    }
}

impl ArchiveConfig {
    pub fn credentials(&self) -> Result<(&str, &str), GetDataError> {
        if self.username.trim().is_empty() || self.password.is_empty() {
            return Err(GetDataError::MissingCredentials);
        }
        Ok((self.username.trim(), &self.password))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub date_start: String,
    pub date_end: String,
    pub reduction_level: String,
    pub obs_types: Vec<String>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            date_start: String::new(),
            date_end: String::new(),
            reduction_level: "reduced".to_string(),
            obs_types: vec!["EXPOSE".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalConfig {
    pub id: String,
    pub allocation_1m0_hours: f64,
    #[serde(default)]
    pub allocation_2m0_hours: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GetDataConfig {
    pub archive: ArchiveConfig,
    pub query: QueryConfig,
    pub proposals: Vec<ProposalConfig>,
}

impl GetDataConfig {
    /// Configured proposals, or just `only` when given.
    pub fn selected_proposals(&self, only: Option<&str>) -> Result<Vec<ProposalConfig>> {
        let Some(only) = only else {
            return Ok(self.proposals.clone());
        };
        let found = self
            .proposals
            .iter()
            .find(|p| p.id == only)
            .cloned()
            .ok_or_else(|| {
                GetDataError::InvalidConfig(format!("proposal {only} is not configured"))
            })?;
        Ok(vec![found])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialGetDataConfig {
    archive: Option<ArchiveConfig>,
    query: Option<QueryConfig>,
    proposals: Option<Vec<ProposalConfig>>,
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_or_optional_u64(var: &str, fallback: Option<u64>) -> Option<u64> {
    match env::var(var) {
        Ok(v) => match v.trim() {
            "" | "0" => None,
            trimmed => trimmed.parse::<u64>().ok().or(fallback),
        },
        Err(_) => fallback,
    }
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn env_or_csv(var: &str, fallback: &[String]) -> Vec<String> {
    match env::var(var) {
        Ok(v) => {
            let out = split_csv(&v);
            if out.is_empty() {
                fallback.to_vec()
            } else {
                out
            }
        }
        Err(_) => fallback.to_vec(),
    }
}

fn parse_hours(raw: &str, what: &str) -> Result<f64, GetDataError> {
    raw.parse::<f64>()
        .map_err(|_| GetDataError::InvalidConfig(format!("invalid {what} allocation `{raw}`")))
}

/// Build proposals from parallel comma-separated lists, the shape the legacy
/// key-value config used.
fn proposals_from_csv(
    ids: &str,
    hours_1m0: Option<&str>,
    hours_2m0: Option<&str>,
) -> Result<Vec<ProposalConfig>, GetDataError> {
    let ids = split_csv(ids);
    let one = split_csv(hours_1m0.unwrap_or_default());
    let two = hours_2m0.map(split_csv);

    if one.len() != ids.len() {
        return Err(GetDataError::InvalidConfig(format!(
            "{} proposals but {} 1m0 allocations",
            ids.len(),
            one.len()
        )));
    }
    if let Some(two) = &two
        && two.len() != ids.len()
    {
        return Err(GetDataError::InvalidConfig(format!(
            "{} proposals but {} 2m0 allocations",
            ids.len(),
            two.len()
        )));
    }

    let mut out = Vec::with_capacity(ids.len());
    for (idx, id) in ids.into_iter().enumerate() {
        let allocation_2m0_hours = match two.as_ref().map(|t| t[idx].as_str()) {
            None => None,
            Some(raw) if raw.eq_ignore_ascii_case(NO_ALLOCATION) => None,
            Some(raw) => Some(parse_hours(raw, "2m0")?),
        };
        out.push(ProposalConfig {
            allocation_1m0_hours: parse_hours(&one[idx], "1m0")?,
            allocation_2m0_hours,
            id,
        });
    }
    Ok(out)
}

fn validate(cfg: &GetDataConfig) -> Result<(), GetDataError> {
    if cfg.proposals.is_empty() {
        return Err(GetDataError::InvalidConfig(
            "no proposals configured; add [[proposals]] or set GETDATA_PROPOSALS".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for proposal in &cfg.proposals {
        let id = proposal.id.trim();
        if id.is_empty() || id.contains(['/', '\\']) || id.contains(char::is_whitespace) {
            return Err(GetDataError::InvalidConfig(format!(
                "invalid proposal id `{}`",
                proposal.id
            )));
        }
        if !seen.insert(id) {
            return Err(GetDataError::InvalidConfig(format!(
                "proposal {id} is configured twice"
            )));
        }
        let allocations = [Some(proposal.allocation_1m0_hours), proposal.allocation_2m0_hours];
        if allocations
            .iter()
            .flatten()
            .any(|hours| !hours.is_finite() || *hours < 0.0)
        {
            return Err(GetDataError::InvalidConfig(format!(
                "proposal {id} allocations must be non-negative hours"
            )));
        }
    }
    if cfg.query.obs_types.is_empty() {
        return Err(GetDataError::InvalidConfig(
            "at least one observation type is required".to_string(),
        ));
    }
    Ok(())
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("GETDATA_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }
    if let Ok(home) = env::var("GETDATA_HOME") {
        let trimmed = home.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed).join("getdata.toml"));
        }
    }

    let home = dirs::home_dir()?;
    Some(home.join(".obscontrol").join("getdata.toml"))
}

fn merge_file_config(base: &mut GetDataConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw =
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: PartialGetDataConfig = toml::from_str(&raw).map_err(|err| {
        GetDataError::InvalidConfig(format!("failed to parse {}: {err}", path.display()))
    })?;
    if let Some(archive) = parsed.archive {
        base.archive = archive;
    }
    if let Some(query) = parsed.query {
        base.query = query;
    }
    if let Some(proposals) = parsed.proposals {
        base.proposals = proposals;
    }
    Ok(())
}

pub fn load_config() -> Result<GetDataConfig> {
    let mut cfg = GetDataConfig::default();
    merge_file_config(&mut cfg)?;

    cfg.archive.base_url = env_or_string("GETDATA_ARCHIVE_URL", &cfg.archive.base_url);
    cfg.archive.username = env_or_string("GETDATA_USERNAME", &cfg.archive.username);
    cfg.archive.password = env_or_string("GETDATA_PASSWORD", &cfg.archive.password);
    cfg.archive.request_timeout_secs = env_or_optional_u64(
        "GETDATA_REQUEST_TIMEOUT_SECS",
        cfg.archive.request_timeout_secs,
    );
    cfg.query.date_start = env_or_string("GETDATA_DATE_START", &cfg.query.date_start);
    cfg.query.date_end = env_or_string("GETDATA_DATE_END", &cfg.query.date_end);
    cfg.query.reduction_level = env_or_string("GETDATA_RLEVEL", &cfg.query.reduction_level);
    cfg.query.obs_types = env_or_csv("GETDATA_OBSTYPE", &cfg.query.obs_types);

    if let Ok(ids) = env::var("GETDATA_PROPOSALS")
        && !ids.trim().is_empty()
    {
        cfg.proposals = proposals_from_csv(
            &ids,
            env::var("GETDATA_ALLOCATION_1M0_HOURS").ok().as_deref(),
            env::var("GETDATA_ALLOCATION_2M0_HOURS").ok().as_deref(),
        )?;
    }

    validate(&cfg)?;
    Ok(cfg)
}

fn unknown_keys<'a>(keys: impl Iterator<Item = &'a str>, allowlist: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = keys
        .filter(|key| key.starts_with("GETDATA_") && !allowlist.contains(key))
        .map(str::to_string)
        .collect();
    out.sort();
    out
}

/// `GETDATA_*` variables set in the environment that nothing reads.
pub fn unknown_env_keys() -> Vec<String> {
    let keys: Vec<String> = env::vars_os()
        .filter_map(|(key, _)| key.into_string().ok())
        .collect();
    unknown_keys(keys.iter().map(String::as_str), GENERATED_GETDATA_ENV_ALLOWLIST)
}
