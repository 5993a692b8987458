use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;

use crate::error::GetDataError;
use crate::getdata::config::ArchiveConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameDescriptor {
    pub filename: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameQuery {
    pub proposal: String,
    pub date_start: String,
    pub date_end: String,
    pub reduction_code: String,
    pub obs_type: String,
}

impl FrameQuery {
    /// Archive query parameters; empty values are left out.
    fn params(&self) -> Vec<(&'static str, &str)> {
        [
            ("start", self.date_start.as_str()),
            ("end", self.date_end.as_str()),
            ("RLEVEL", self.reduction_code.as_str()),
            ("PROPID", self.proposal.as_str()),
            ("OBSTYPE", self.obs_type.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .collect()
    }
}

pub trait ArchiveClient {
    fn authenticate(&self, username: &str, password: &str) -> Result<String, GetDataError>;
    fn list_frames(
        &self,
        token: &str,
        query: &FrameQuery,
    ) -> Result<Vec<FrameDescriptor>, GetDataError>;
    fn fetch(&self, url: &str) -> Result<Vec<u8>, GetDataError>;
}

#[derive(Debug, Deserialize)]
struct FramePage {
    #[serde(default)]
    results: Vec<FrameDescriptor>,
    #[serde(default)]
    next: Option<String>,
}

fn endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn transport(context: &str, err: impl std::fmt::Display) -> GetDataError {
    GetDataError::TransportFailure(format!("{context}: {err}"))
}

fn ensure_success(context: &str, response: Response) -> Result<Response, GetDataError> {
    if response.status().is_success() {
        return Ok(response);
    }
    Err(GetDataError::TransportFailure(format!(
        "{context} failed with status {}",
        response.status()
    )))
}

/// Blocking client for the LCO science archive REST API.
pub struct LcoArchiveClient {
    client: Client,
    base_url: String,
    token_path: String,
    frames_path: String,
}

impl LcoArchiveClient {
    pub fn new(cfg: &ArchiveConfig) -> Result<Self, GetDataError> {
        let client = Client::builder()
            .timeout(cfg.request_timeout_secs.map(Duration::from_secs))
            .build()
            .map_err(|err| transport("failed to build http client", err))?;
        Ok(Self {
            client,
            base_url: cfg.base_url.clone(),
            token_path: cfg.token_path.clone(),
            frames_path: cfg.frames_path.clone(),
        })
    }
}

impl ArchiveClient for LcoArchiveClient {
    fn authenticate(&self, username: &str, password: &str) -> Result<String, GetDataError> {
        let url = endpoint(&self.base_url, &self.token_path);
        let response = self
            .client
            .post(&url)
            .form(&[("username", username), ("password", password)])
            .send()
            .map_err(|err| transport("archive login", err))?;
        let json: Value = ensure_success("archive login", response)?
            .json()
            .map_err(|err| transport("archive login response", err))?;
        json.get("token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                GetDataError::TransportFailure("archive login response missing token".to_string())
            })
    }

    fn list_frames(
        &self,
        token: &str,
        query: &FrameQuery,
    ) -> Result<Vec<FrameDescriptor>, GetDataError> {
        let auth = format!("Token {token}");
        let first = self
            .client
            .get(endpoint(&self.base_url, &self.frames_path))
            .query(&query.params())
            .header(reqwest::header::AUTHORIZATION, &auth)
            .send()
            .map_err(|err| transport("frame listing", err))?;
        let mut page: FramePage = ensure_success("frame listing", first)?
            .json()
            .map_err(|err| transport("frame listing response", err))?;

        let mut frames = Vec::new();
        let mut visited = HashSet::new();
        loop {
            frames.append(&mut page.results);
            let Some(next) = page.next.take().filter(|url| !url.trim().is_empty()) else {
                break;
            };
            if !visited.insert(next.clone()) {
                break;
            }
            let response = self
                .client
                .get(&next)
                .header(reqwest::header::AUTHORIZATION, &auth)
                .send()
                .map_err(|err| transport("frame listing", err))?;
            page = ensure_success("frame listing", response)?
                .json()
                .map_err(|err| transport("frame listing response", err))?;
        }
        Ok(frames)
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>, GetDataError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| transport("frame download", err))?;
        let bytes = ensure_success("frame download", response)?
            .bytes()
            .map_err(|err| transport("frame download body", err))?;
        Ok(bytes.to_vec())
    }
}
