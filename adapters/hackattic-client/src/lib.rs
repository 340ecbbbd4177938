//! hackattic-client — HTTP adapter for the `backup_restore` challenge endpoints.
//!
//! Purpose
//! - Implements the `DumpSource` port: `GET .../problem?access_token=…`,
//!   decodes the base64 `dump` field and inflates it when gzip-compressed.
//! - Implements the `ResultSink` port: `POST .../solve?access_token=…` with
//!   the JSON solution, returning the grader's status and body verbatim.
//!
//! Notes
//! - Uses blocking `reqwest` because the domain ports are synchronous.
//! - Exactly one request per call. Non-2xx answers and transport failures
//!   are returned as errors; nothing is retried.
//! - The access token is redacted from every log line and error message.

use std::io::Read;
use std::time::Duration;

use base64::Engine;
use domain::{AccessToken, CoreError, DumpPayload, DumpSource, ResultSink, Solution, SubmitOutcome};
use flate2::read::MultiGzDecoder;
use http_common::{challenge_url, is_valid_base_url, redact_access_token, truncate_body};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use tracing::{debug, info};

/// Challenge slug on the remote service.
pub const CHALLENGE: &str = "backup_restore";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ERROR_BODY_MAX_CHARS: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid base url: {0}")]
    BaseUrl(String),
    #[error("HTTP request failed: {0}")]
    Request(reqwest::Error),
    #[error("challenge API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("invalid problem payload: {0}")]
    InvalidPayload(String),
    #[error("dump is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("dump is not valid gzip: {0}")]
    Gzip(#[source] std::io::Error),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        // reqwest embeds the request URL, which carries the token.
        ClientError::Request(e.without_url())
    }
}

impl From<ClientError> for CoreError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::BaseUrl(msg) => CoreError::InvalidConfig(msg),
            ClientError::Request(err) if err.is_decode() => CoreError::Decode(err.to_string()),
            ClientError::Request(err) => CoreError::Network(err.to_string()),
            ClientError::Api { status, body } => CoreError::Http { status, body },
            other @ (ClientError::InvalidPayload(_)
            | ClientError::Base64(_)
            | ClientError::Gzip(_)) => CoreError::Decode(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProblemResponse {
    dump: String,
}

/// Blocking client for one challenge on one service endpoint.
#[derive(Clone)]
pub struct HackatticClient {
    http: reqwest::blocking::Client,
    base_url: String,
    challenge: String,
}

impl HackatticClient {
    /// Create a client for `CHALLENGE` on `base_url` (e.g. `https://hackattic.com`).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        if !is_valid_base_url(base_url) {
            return Err(ClientError::BaseUrl(base_url.to_string()));
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("backup-restore/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            challenge: CHALLENGE.to_string(),
        })
    }

    fn url(&self, action: &str, token: &AccessToken) -> String {
        challenge_url(&self.base_url, &self.challenge, action, token.as_str())
    }

    /// Fetch and decode the problem dump.
    pub fn get_problem(&self, token: &AccessToken) -> Result<Vec<u8>, ClientError> {
        let url = self.url("problem", token);
        debug!(url = %redact_access_token(&url), "requesting problem");
        let resp = self
            .http
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()?;
        let body = ensure_success(resp)?.text()?;
        let problem: ProblemResponse = serde_json::from_str(&body)
            .map_err(|e| ClientError::InvalidPayload(e.to_string()))?;
        let dump = decode_dump(&problem.dump)?;
        info!(
            encoded_bytes = problem.dump.len(),
            dump_bytes = dump.len(),
            "received problem dump"
        );
        Ok(dump)
    }

    /// Post a solution and return the grader's answer.
    pub fn post_solution(
        &self,
        token: &AccessToken,
        solution: &Solution,
    ) -> Result<SubmitOutcome, ClientError> {
        let url = self.url("solve", token);
        debug!(
            url = %redact_access_token(&url),
            alive_ssns = solution.alive_ssns.len(),
            "posting solution"
        );
        let resp = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .json(solution)
            .send()?;
        let resp = ensure_success(resp)?;
        let status = resp.status().as_u16();
        let body = resp.text()?;
        Ok(SubmitOutcome { status, body })
    }
}

impl DumpSource for HackatticClient {
    fn fetch_dump(&self, token: &AccessToken) -> Result<DumpPayload, CoreError> {
        Ok(DumpPayload::new(self.get_problem(token)?))
    }
}

impl ResultSink for HackatticClient {
    fn submit(
        &self,
        token: &AccessToken,
        solution: &Solution,
    ) -> Result<SubmitOutcome, CoreError> {
        Ok(self.post_solution(token, solution)?)
    }
}

/// Ensure the response has a success status code, otherwise turn it into
/// an `Api` error carrying the (truncated) body.
fn ensure_success(
    resp: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp
        .text()
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(ClientError::Api {
        status: status.as_u16(),
        body: truncate_body(&body, ERROR_BODY_MAX_CHARS),
    })
}

/// Decode the `dump` field: standard base64 (whitespace tolerated), then
/// gzip inflate when the bytes carry the gzip magic number.
pub fn decode_dump(encoded: &str) -> Result<Vec<u8>, ClientError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let raw = base64::engine::general_purpose::STANDARD.decode(compact.as_bytes())?;
    if !raw.starts_with(&GZIP_MAGIC) {
        return Ok(raw);
    }
    let mut out = Vec::new();
    MultiGzDecoder::new(raw.as_slice())
        .read_to_end(&mut out)
        .map_err(ClientError::Gzip)?;
    Ok(out)
}
