//! Client for the backend file-listing API.

use chrono::{DateTime, Utc};
use hyper::body::Bytes;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProxyConfig;
use crate::constants::HTTP_DATE_FORMAT;
use crate::error::GateError;
use crate::secret::Secret;

#[derive(Serialize)]
struct FsGetRequest<'a> {
    path: &'a str,
}

/// Reply from `POST /api/fs/get`. `code == 200` is the only success value;
/// anything else is forwarded to the caller untouched.
#[derive(Debug, Deserialize)]
pub struct FsGetReply {
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<FsGetData>,
}

/// Direct-object description for a successful lookup.
#[derive(Debug, Deserialize)]
pub struct FsGetData {
    pub raw_url: String,
    pub modified: DateTime<Utc>,
}

impl FsGetData {
    /// The object's modification time as an HTTP-date header value.
    pub fn last_modified_header(&self) -> String {
        self.modified.format(HTTP_DATE_FORMAT).to_string()
    }
}

/// Outcome of a metadata lookup: the parsed reply plus the raw bytes, kept
/// around so backend errors can be forwarded verbatim.
pub struct FsLookup {
    pub raw: Bytes,
    pub reply: FsGetReply,
}

pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    token: Secret,
}

impl BackendClient {
    pub fn new(config: &ProxyConfig) -> Result<Self, GateError> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            base_url: config.backend_url.clone(),
            token: config.token.clone(),
        })
    }

    /// Ask the backend to resolve `path` to a direct object URL.
    pub async fn fs_get(&self, path: &str) -> Result<FsLookup, GateError> {
        let response = self
            .http
            .post(format!("{}/api/fs/get", self.base_url))
            .header(AUTHORIZATION, self.token.value())
            .json(&FsGetRequest { path })
            .send()
            .await?;

        let raw = response.bytes().await?;
        let reply: FsGetReply = serde_json::from_slice(&raw)?;
        debug!(path = %path, code = reply.code, "Backend lookup");
        Ok(FsLookup { raw, reply })
    }
}
