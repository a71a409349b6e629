//! RPC stub for talking to a single storage node
//!
//! The quorum layer only sees [`NodeClient`]; [`HttpNodeClient`] binds it to the
//! storage node's JSON API (`POST /set`, `GET /get/:key`, `DELETE /delete/:key`).

use crate::common::{encode_key, node_base_url, Error, Result, VersionedRecord, WriteRequest};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Append `version` to `node`'s copy of `key`.
    async fn write(&self, node: &str, key: &str, version: &VersionedRecord) -> Result<()>;

    /// Every version `node` holds for `key`, oldest first. `NotFound` when it holds none.
    async fn read(&self, node: &str, key: &str) -> Result<Vec<VersionedRecord>>;
}

/// JSON-over-HTTP node client
#[derive(Debug, Clone)]
pub struct HttpNodeClient {
    client: reqwest::Client,
}

impl HttpNodeClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn transport(node: &str, e: impl std::fmt::Display) -> Error {
        Error::Transport {
            node: node.to_string(),
            reason: e.to_string(),
        }
    }

    /// `POST /set` with an arbitrary payload.
    pub async fn write_request(&self, node: &str, req: &WriteRequest) -> Result<()> {
        let url = format!("{}/set", node_base_url(node));
        let resp = self
            .client
            .post(&url)
            .json(req)
            .send()
            .await
            .map_err(|e| Self::transport(node, e))?;
        Self::check_status(node, resp.status())
    }

    pub async fn delete(&self, node: &str, key: &str) -> Result<()> {
        let url = format!("{}/delete/{}", node_base_url(node), encode_key(key));
        let resp = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| Self::transport(node, e))?;
        Self::check_status(node, resp.status())
    }

    fn check_status(node: &str, status: StatusCode) -> Result<()> {
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::transport(node, format!("status {}", status)))
        }
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn write(&self, node: &str, key: &str, version: &VersionedRecord) -> Result<()> {
        self.write_request(node, &WriteRequest::for_version(key, version))
            .await
    }

    async fn read(&self, node: &str, key: &str) -> Result<Vec<VersionedRecord>> {
        let url = format!("{}/get/{}", node_base_url(node), encode_key(key));
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::transport(node, e))?;

        match resp.status() {
            StatusCode::NOT_FOUND => Err(Error::NotFound(key.to_string())),
            status if !status.is_success() => {
                Err(Self::transport(node, format!("status {}", status)))
            }
            _ => {
                let bytes = resp.bytes().await.map_err(|e| Self::transport(node, e))?;
                let versions: Vec<VersionedRecord> =
                    serde_json::from_slice(&bytes).map_err(|e| {
                        Error::Serialization(format!("bad read response from {}: {}", node, e))
                    })?;
                Ok(versions)
            }
        }
    }
}
