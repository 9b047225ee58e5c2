//! Ethereum JSON-RPC signer (`eth_requestAccounts`, `eth_sendTransaction`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cipherpay_privacy::NoteValue;
use log::{debug, info};
use serde::Deserialize;
use serde_json::{Value, json};

use super::WalletProvider;
use crate::error::{Result, WalletError};
use crate::http::build_client;

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

enum CallError {
    /// Signer unreachable or spoke something other than JSON-RPC
    Transport(String),
    /// Signer answered with an error object
    Rpc(String),
}

pub struct JsonRpcWallet {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcWallet {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        Ok(Self {
            url: url.into(),
            client: build_client(request_timeout)?,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &str, params: Value) -> std::result::Result<Value, CallError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });
        debug!("Signer call {}", method);

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| CallError::Transport(e.to_string()))?;
        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| CallError::Transport(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(CallError::Rpc(format!(
                "RPC error {}: {}",
                error.code, error.message
            )));
        }
        body.result
            .ok_or_else(|| CallError::Rpc("no result in response".into()))
    }
}

#[async_trait]
impl WalletProvider for JsonRpcWallet {
    async fn connect(&self) -> Result<String> {
        let result = self
            .call("eth_requestAccounts", json!([]))
            .await
            .map_err(|e| match e {
                CallError::Transport(m) | CallError::Rpc(m) => WalletError::Connection(m),
            })?;
        let accounts: Vec<String> = serde_json::from_value(result)
            .map_err(|e| WalletError::Connection(format!("malformed account list: {e}")))?;
        accounts
            .into_iter()
            .next()
            .ok_or_else(|| WalletError::Connection("signer exposed no accounts".into()))
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn sign_and_send_deposit(&self, from: &str, to: &str, amount: NoteValue) -> Result<String> {
        let tx = json!({
            "from": from,
            "to": to,
            "value": format!("0x{:x}", amount.as_u128()),
        });
        let result = self
            .call("eth_sendTransaction", json!([tx]))
            .await
            .map_err(|e| match e {
                CallError::Transport(m) => WalletError::Unavailable(m),
                CallError::Rpc(m) => WalletError::SubmissionRejected(m),
            })?;
        let tx_hash = result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| WalletError::SubmissionRejected("signer returned no transaction hash".into()))?;
        info!("Deposit of {} sent: {}", amount, tx_hash);
        Ok(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_support::spawn_server;
    use axum::routing::post;
    use axum::{Json, Router};

    fn signer(accounts: Value) -> Router {
        Router::new().route(
            "/",
            post(move |Json(req): Json<Value>| {
                let accounts = accounts.clone();
                async move {
                    let id = req["id"].clone();
                    match req["method"].as_str() {
                        Some("eth_requestAccounts") => {
                            Json(json!({"jsonrpc": "2.0", "id": id, "result": accounts}))
                        }
                        Some("eth_sendTransaction") => {
                            let tx = &req["params"][0];
                            if tx["value"] == "0x0" {
                                Json(json!({"jsonrpc": "2.0", "id": id, "error": {"code": 4001, "message": "User denied"}}))
                            } else {
                                assert_eq!(tx["value"], "0xde0b6b3a7640000");
                                Json(json!({"jsonrpc": "2.0", "id": id, "result": "0xdeposit"}))
                            }
                        }
                        _ => Json(json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32601, "message": "method not found"}})),
                    }
                }
            }),
        )
    }

    fn wallet(url: String) -> JsonRpcWallet {
        JsonRpcWallet::new(url, Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_connect_returns_first_account() {
        let url = spawn_server(signer(json!(["0x1111", "0x2222"]))).await;
        assert_eq!(wallet(url).connect().await.unwrap(), "0x1111");
    }

    #[tokio::test]
    async fn test_no_accounts_is_connection_error() {
        let url = spawn_server(signer(json!([]))).await;
        assert!(matches!(
            wallet(url).connect().await,
            Err(WalletError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_deposit() {
        let url = spawn_server(signer(json!(["0x1111"]))).await;
        let w = wallet(url);
        let one_eth = NoteValue::new(1_000_000_000_000_000_000);
        assert_eq!(
            w.sign_and_send_deposit("0x1111", "0xpool", one_eth).await.unwrap(),
            "0xdeposit"
        );
        let err = w
            .sign_and_send_deposit("0x1111", "0xpool", NoteValue::ZERO)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            WalletError::SubmissionRejected("RPC error 4001: User denied".into())
        );
    }

    #[tokio::test]
    async fn test_unreachable_signer() {
        let w = wallet("http://127.0.0.1:9".into());
        assert!(matches!(w.connect().await, Err(WalletError::Connection(_))));
        assert!(matches!(
            w.sign_and_send_deposit("a", "b", NoteValue::new(1)).await,
            Err(WalletError::Unavailable(_))
        ));
    }
}
