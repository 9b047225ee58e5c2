//! HTTP relay client.
//!
//! | call            | route                              |
//! |-----------------|------------------------------------|
//! | `fetch_root`    | `GET  /merkle/root`                |
//! | `merkle_path`   | `POST /merkle/path {commitment}`   |
//! | `submit`        | `POST /transactions` + `Idempotency-Key` |
//! | `tx_status`     | `GET  /transactions/{hash}/status` |
//!
//! Every response uses the `{success, data, error, code}` envelope.

use std::time::Duration;

use async_trait::async_trait;
use cipherpay_privacy::{Commitment, MerklePath, MerkleRoot};
use log::{debug, info, warn};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::Relay;
use super::types::{SubmissionReceipt, TransferSubmission, TxStatus};
use crate::error::{Result, WalletError};
use crate::http::{ApiEnvelope, build_client, join_url};

const NOT_FOUND_CODE: &str = "COMMITMENT_NOT_FOUND";

#[derive(Debug, Clone)]
pub struct HttpRelayConfig {
    pub url: String,
    pub api_key: Option<String>,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for HttpRelayConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000".to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub struct HttpRelay {
    config: HttpRelayConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: TxStatus,
}

impl HttpRelay {
    pub fn new(config: HttpRelayConfig) -> Result<Self> {
        let client = build_client(config.request_timeout)?;
        Ok(Self { config, client })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.header("x-api-key", key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        self.authorized(request)
            .send()
            .await
            .map_err(|e| WalletError::Unavailable(format!("relay request failed: {e}")))
    }

    async fn envelope<T: DeserializeOwned>(response: Response) -> Result<(StatusCode, ApiEnvelope<T>)> {
        let status = response.status();
        if status.is_server_error() {
            return Err(WalletError::Unavailable(format!("relay returned {status}")));
        }
        let envelope = response.json::<ApiEnvelope<T>>().await.map_err(|e| {
            let message = format!("relay returned an unreadable response ({status}): {e}");
            if status.is_client_error() {
                WalletError::Validation(message)
            } else {
                WalletError::Unavailable(message)
            }
        })?;
        Ok((status, envelope))
    }

    /// Unwrap a read response. Only 5xx and transport failures are
    /// transient; a refusal by the relay is final.
    fn read_data<T>(status: StatusCode, envelope: ApiEnvelope<T>) -> Result<T> {
        if !envelope.success || !status.is_success() {
            return Err(WalletError::Validation(format!(
                "relay refused the request: {}",
                envelope.failure_message()
            )));
        }
        envelope
            .data
            .ok_or_else(|| WalletError::Unavailable("relay response carried no data".into()))
    }
}

#[async_trait]
impl Relay for HttpRelay {
    async fn fetch_root(&self) -> Result<MerkleRoot> {
        let url = join_url(&self.config.url, "merkle/root");
        let response = self.send(self.client.get(&url)).await?;
        let (status, envelope) = Self::envelope::<MerkleRoot>(response).await?;
        let root = Self::read_data(status, envelope)?;
        debug!("Relay root {} ({} leaves)", root.root_hex(), root.leaf_count);
        Ok(root)
    }

    async fn merkle_path(&self, commitment: &Commitment) -> Result<MerklePath> {
        let url = join_url(&self.config.url, "merkle/path");
        let response = self
            .send(self.client.post(&url).json(&json!({ "commitment": commitment })))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(WalletError::CommitmentNotFound(commitment.to_string()));
        }
        let (status, envelope) = Self::envelope::<MerklePath>(response).await?;
        if envelope.code.as_deref() == Some(NOT_FOUND_CODE) {
            return Err(WalletError::CommitmentNotFound(commitment.to_string()));
        }
        Self::read_data(status, envelope)
    }

    async fn submit(&self, submission: &TransferSubmission) -> Result<SubmissionReceipt> {
        let url = join_url(&self.config.url, "transactions");
        info!(
            "Submitting {:?} {} to relay ({} nullifiers)",
            submission.kind,
            submission.id,
            submission.nullifiers.len()
        );
        let response = self
            .send(
                self.client
                    .post(&url)
                    .header("Idempotency-Key", &submission.id)
                    .json(submission),
            )
            .await?;

        if response.status().is_client_error() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<ApiEnvelope<serde_json::Value>>(&body)
                .map(|envelope| envelope.failure_message())
                .unwrap_or_else(|_| format!("relay returned {status}"));
            warn!("Relay rejected {}: {}", submission.id, reason);
            return Err(WalletError::SubmissionRejected(reason));
        }
        let (status, envelope) = Self::envelope::<SubmissionReceipt>(response).await?;
        if !envelope.success || !status.is_success() {
            let reason = envelope.failure_message();
            warn!("Relay rejected {}: {}", submission.id, reason);
            return Err(WalletError::SubmissionRejected(reason));
        }
        envelope.data.ok_or_else(|| {
            WalletError::SubmissionRejected("relay accepted without a transaction hash".into())
        })
    }

    async fn tx_status(&self, tx_hash: &str) -> Result<TxStatus> {
        let url = join_url(&self.config.url, &format!("transactions/{tx_hash}/status"));
        let response = self.send(self.client.get(&url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(WalletError::Validation(format!(
                "unknown transaction reference {tx_hash}"
            )));
        }
        let (status, envelope) = Self::envelope::<StatusBody>(response).await?;
        Ok(Self::read_data(status, envelope)?.status)
    }
}
