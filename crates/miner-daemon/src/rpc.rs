//! Node RPC client.
//!
//! The node speaks JSON-RPC over HTTP POST with basic auth. Only three calls
//! are used: `getblocktemplate`, `submitblock`, and `getblockcount` as a
//! startup connectivity probe.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Certificate, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use solominer_core::{BlockTemplate, CandidateBlock};
use tracing::debug;

/// Longest slice of an HTTP error body carried in an error message.
const MAX_ERROR_BODY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("node returned HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("block rejected: {0}")]
    Rejected(String),

    #[error("cannot load certificate {}: {reason}", path.display())]
    Certificate { path: PathBuf, reason: String },
}

/// The node operations the miner depends on.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Fetch a fresh block template.
    async fn get_block_template(&self) -> Result<BlockTemplate, RpcError>;

    /// Submit a solved block. `Ok` means the node accepted it.
    async fn submit_block(&self, block: &CandidateBlock) -> Result<(), RpcError>;

    /// Current chain height.
    async fn get_block_count(&self) -> Result<u64, RpcError>;
}

/// Connection settings for [`RpcClient`].
#[derive(Debug, Clone)]
pub struct RpcSettings {
    pub url: String,
    pub user: String,
    pub pass: String,
    /// Extra PEM root certificates to trust, for nodes with self-signed TLS.
    pub cert: Option<PathBuf>,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'a str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// JSON-RPC client for a full node.
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    user: String,
    pass: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(settings: RpcSettings) -> Result<Self, RpcError> {
        let mut builder = reqwest::Client::builder().timeout(settings.timeout);

        if let Some(path) = &settings.cert {
            for cert in load_certificates(path)? {
                builder = builder.add_root_certificate(cert);
            }
        }

        Ok(Self {
            http: builder.build()?,
            url: settings.url,
            user: settings.user,
            pass: settings.pass,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            jsonrpc: "1.0",
            id,
            method,
            params,
        };

        debug!(method, id, "rpc request");
        let response = self
            .http
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.pass))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(method, id, %status, bytes = body.len(), "rpc response");

        decode_response(status, &body)
    }
}

#[async_trait]
impl NodeClient for RpcClient {
    async fn get_block_template(&self) -> Result<BlockTemplate, RpcError> {
        self.call("getblocktemplate", json!([{ "rules": ["segwit"] }])).await
    }

    async fn submit_block(&self, block: &CandidateBlock) -> Result<(), RpcError> {
        let reason: Option<String> = self.call("submitblock", json!([block.serialize_block_hex()])).await?;
        match reason {
            None => Ok(()),
            Some(reason) => Err(RpcError::Rejected(reason)),
        }
    }

    async fn get_block_count(&self) -> Result<u64, RpcError> {
        self.call("getblockcount", json!([])).await
    }
}

/// Decode a JSON-RPC response body.
///
/// Nodes report RPC errors with a non-2xx status and a JSON error object, so
/// the body is examined before the status. A body that is not a JSON-RPC
/// response is reported by status when the status is an error (bad
/// credentials produce an empty 401) and as malformed otherwise.
fn decode_response<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T, RpcError> {
    let response: RpcResponse = match serde_json::from_str(body) {
        Ok(response) => response,
        Err(_) if !status.is_success() => {
            return Err(RpcError::Status {
                status,
                body: truncate(body, MAX_ERROR_BODY).to_string(),
            })
        }
        Err(e) => return Err(RpcError::Malformed(e)),
    };

    if let Some(error) = response.error {
        return Err(RpcError::Rpc {
            code: error.code,
            message: error.message,
        });
    }

    if !status.is_success() {
        return Err(RpcError::Status {
            status,
            body: truncate(body, MAX_ERROR_BODY).to_string(),
        });
    }

    Ok(serde_json::from_value(response.result)?)
}

fn load_certificates(path: &Path) -> Result<Vec<Certificate>, RpcError> {
    let cert_error = |reason: String| RpcError::Certificate {
        path: path.to_path_buf(),
        reason,
    };

    let pem = std::fs::read(path).map_err(|e| cert_error(e.to_string()))?;
    let certs = Certificate::from_pem_bundle(&pem).map_err(|e| cert_error(e.to_string()))?;
    if certs.is_empty() {
        return Err(cert_error("no certificates found".to_string()));
    }
    Ok(certs)
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
