//! HTTP Prover Client
//!
//! Delegates transfer proving to an external proving service that runs the
//! transfer circuit (wasm witness generator + zkey). Verification stays
//! local, using the circuit's verification key.
//!
//! ```text
//!   HttpProver::prove()
//!         │  POST {url}/prove/transfer  {circuit, wasmUrl, zkeyUrl, input}
//!         ▼
//!   ┌──────────────────────────────┐
//!   │   Proving service            │──► {success, data: {proof, publicSignals}}
//!   └──────────────────────────────┘
//!
//!   HttpProver::verify() ──► Groth16Verifier (BN254, local)
//! ```

use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::gateway::TransferProver;
use super::groth16::Groth16Verifier;
use super::types::{Groth16Proof, TransferProof, TransferProofInput, VerifierKey};
use crate::error::{Result, WalletError};
use crate::http::{ApiEnvelope, build_client, join_url};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct HttpProverConfig {
    /// Base URL of the proving service
    pub url: String,
    pub transfer_wasm: String,
    pub transfer_zkey: String,
    /// Upper bound on one proving request
    pub request_timeout: Duration,
}

impl Default for HttpProverConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            transfer_wasm: "/circuits/transfer.wasm".to_string(),
            transfer_zkey: "/circuits/transfer.zkey".to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProveRequest<'a> {
    circuit: &'a str,
    wasm_url: &'a str,
    zkey_url: &'a str,
    input: &'a TransferProofInput,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProveResult {
    proof: Groth16Proof,
    public_signals: Vec<String>,
}

// ============================================================================
// Client
// ============================================================================

pub struct HttpProver {
    config: HttpProverConfig,
    client: reqwest::Client,
    verifier_key: VerifierKey,
    verifier: Groth16Verifier,
}

impl HttpProver {
    pub fn new(config: HttpProverConfig, verifier_key: VerifierKey) -> Result<Self> {
        let client = build_client(config.request_timeout)?;
        Ok(Self {
            config,
            client,
            verifier_key,
            verifier: Groth16Verifier,
        })
    }

    pub fn verifier_key(&self) -> &VerifierKey {
        &self.verifier_key
    }

    /// Check if the proving service is reachable
    pub async fn health_check(&self) -> bool {
        let url = join_url(&self.config.url, "health");
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("Prover health check failed: {}", e);
                false
            }
        }
    }
}

fn backend_failure(msg: String) -> WalletError {
    WalletError::ProofGeneration(msg)
}

#[async_trait]
impl TransferProver for HttpProver {
    async fn prove(&self, input: &TransferProofInput) -> Result<TransferProof> {
        let url = join_url(&self.config.url, "prove/transfer");
        let request = ProveRequest {
            circuit: "transfer",
            wasm_url: &self.config.transfer_wasm,
            zkey_url: &self.config.transfer_zkey,
            input,
        };

        info!(
            "Requesting transfer proof from {} ({} inputs, {} outputs)",
            self.config.url,
            input.inputs.len(),
            input.outputs.len()
        );
        let start = std::time::Instant::now();

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| backend_failure(format!("failed to reach prover: {e}")))?;

        let status = response.status();
        if !status.is_success() && status.as_u16() != 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(backend_failure(format!("prover returned {status}: {body}")));
        }

        let envelope: ApiEnvelope<ProveResult> = response
            .json()
            .await
            .map_err(|e| backend_failure(format!("failed to parse prover response: {e}")))?;
        if !envelope.success {
            return Err(backend_failure(envelope.failure_message()));
        }
        let result = envelope
            .data
            .ok_or_else(|| backend_failure("prover response carried no proof".into()))?;

        info!("Transfer proof received in {:?}", start.elapsed());
        Ok(TransferProof {
            proof: result.proof,
            public_signals: result.public_signals,
            verifier_key: self.verifier_key.clone(),
        })
    }

    fn verify(
        &self,
        proof: &Groth16Proof,
        public_signals: &[String],
        verifier_key: &VerifierKey,
    ) -> Result<bool> {
        self.verifier.verify(proof, public_signals, verifier_key)
    }
}

/// Load a snarkjs verification key from a file path or http(s) URL.
pub async fn load_verifier_key(location: &str, client: &reqwest::Client) -> Result<VerifierKey> {
    let config_err = |msg: String| WalletError::Config(msg);

    let value: Value = if location.starts_with("http://") || location.starts_with("https://") {
        let response = client
            .get(location)
            .send()
            .await
            .map_err(|e| config_err(format!("failed to fetch verifier key {location}: {e}")))?;
        if !response.status().is_success() {
            return Err(config_err(format!(
                "verifier key {location} returned {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| config_err(format!("verifier key {location} is not JSON: {e}")))?
    } else {
        let text = tokio::fs::read_to_string(location)
            .await
            .map_err(|e| config_err(format!("failed to read verifier key {location}: {e}")))?;
        serde_json::from_str(&text)
            .map_err(|e| config_err(format!("verifier key {location} is not JSON: {e}")))?
    };

    let key = VerifierKey::new(value);
    key.check_shape()
        .map_err(|e| config_err(format!("verifier key {location}: {e}")))?;
    Ok(key)
}
