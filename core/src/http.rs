//! Shared HTTP plumbing for the relay and prover clients.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, WalletError};

/// JSON envelope used by the relay and prover services.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub code: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// Error text for a failed call, including the service's code if any.
    pub fn failure_message(&self) -> String {
        let message = self.error.as_deref().unwrap_or("unknown error");
        match &self.code {
            Some(code) => format!("{message} ({code})"),
            None => message.to_string(),
        }
    }
}

pub fn build_client(request_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(request_timeout)
        .build()
        .map_err(|e| WalletError::Config(format!("failed to create HTTP client: {e}")))
}

pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::Router;

    /// Serve `app` on an ephemeral local port and return its base URL.
    pub(crate) async fn spawn_server(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://a/", "/merkle/root"), "http://a/merkle/root");
        assert_eq!(join_url("http://a", "merkle/root"), "http://a/merkle/root");
    }

    #[test]
    fn test_envelope_failure_message() {
        let env: ApiEnvelope<()> = serde_json::from_str(
            r#"{"success":false,"error":"double spend","code":"NULLIFIER_SPENT"}"#,
        )
        .unwrap();
        assert!(!env.success);
        assert_eq!(env.failure_message(), "double spend (NULLIFIER_SPENT)");
    }
}
