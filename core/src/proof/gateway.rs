//! Proof Gateway
//!
//! Single entry point for proof work. Generation runs under a timeout and
//! can be cancelled; verification is a pure function of its arguments.
//!
//! ```text
//!   Orchestrator ──► ProofGateway ──► dyn TransferProver  (HTTP prover | simulated)
//!                         │
//!                         └─────────► dyn PaymentProver   (view-key disclosure)
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cipherpay_privacy::{Note, ViewKey};
use log::{debug, warn};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::types::{
    Groth16Proof, PaymentProof, TransferProof, TransferProofInput, VerifierKey,
    check_public_signals,
};
use crate::error::{Result, WalletError};

// ============================================================================
// Prover Traits
// ============================================================================

/// Backend producing and checking transfer proofs.
#[async_trait]
pub trait TransferProver: Send + Sync {
    async fn prove(&self, input: &TransferProofInput) -> Result<TransferProof>;

    /// `Ok(false)` for a well-formed proof that does not verify.
    fn verify(
        &self,
        proof: &Groth16Proof,
        public_signals: &[String],
        verifier_key: &VerifierKey,
    ) -> Result<bool>;
}

/// Backend producing selective-disclosure payment proofs.
pub trait PaymentProver: Send + Sync {
    fn prove_payment(&self, note: &Note) -> Result<PaymentProof>;

    fn verify_payment(&self, proof: &PaymentProof, note: &Note, view_key: &ViewKey) -> Result<bool>;

    fn view_key(&self) -> ViewKey;
}

// ============================================================================
// Gateway
// ============================================================================

pub struct ProofGateway {
    prover: Arc<dyn TransferProver>,
    payments: Arc<dyn PaymentProver>,
    proof_timeout: Duration,
}

impl ProofGateway {
    pub fn new(
        prover: Arc<dyn TransferProver>,
        payments: Arc<dyn PaymentProver>,
        proof_timeout: Duration,
    ) -> Self {
        Self {
            prover,
            payments,
            proof_timeout,
        }
    }

    pub fn proof_timeout(&self) -> Duration {
        self.proof_timeout
    }

    pub async fn generate_transfer_proof(&self, input: &TransferProofInput) -> Result<TransferProof> {
        self.generate_transfer_proof_until(input, &CancellationToken::new())
            .await
    }

    /// Generate a transfer proof, giving up on timeout or when `cancel` fires.
    pub async fn generate_transfer_proof_until(
        &self,
        input: &TransferProofInput,
        cancel: &CancellationToken,
    ) -> Result<TransferProof> {
        input.validate()?;
        debug!(
            "Generating transfer proof ({} inputs, timeout {:?})",
            input.inputs.len(),
            self.proof_timeout
        );

        let proof = tokio::select! {
            _ = cancel.cancelled() => {
                warn!("Transfer proof generation cancelled");
                return Err(WalletError::ProofGeneration("proof generation cancelled".into()));
            }
            outcome = timeout(self.proof_timeout, self.prover.prove(input)) => match outcome {
                Ok(result) => result?,
                Err(_) => {
                    warn!("Transfer proof generation timed out after {:?}", self.proof_timeout);
                    return Err(WalletError::ProofGeneration(format!(
                        "proof generation timed out after {:?}",
                        self.proof_timeout
                    )));
                }
            },
        };

        proof.proof.check_shape().map_err(|e| {
            WalletError::ProofGeneration(format!("prover returned a malformed proof: {e}"))
        })?;
        Ok(proof)
    }

    pub fn verify_transfer_proof(
        &self,
        proof: &Groth16Proof,
        public_signals: &[String],
        verifier_key: &VerifierKey,
    ) -> Result<bool> {
        proof.check_shape()?;
        check_public_signals(public_signals)?;
        verifier_key.check_shape()?;
        self.prover.verify(proof, public_signals, verifier_key)
    }

    pub fn generate_payment_proof(&self, note: &Note) -> Result<PaymentProof> {
        self.payments.prove_payment(note)
    }

    pub fn verify_payment_proof(
        &self,
        proof: &PaymentProof,
        note: &Note,
        view_key: &ViewKey,
    ) -> Result<bool> {
        self.payments.verify_payment(proof, note, view_key)
    }

    pub fn export_view_key(&self) -> ViewKey {
        self.payments.view_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::disclosure::ViewKeyDisclosure;
    use crate::proof::simulated::SimulatedProver;
    use crate::proof::testing::single_note_input;
    use cipherpay_privacy::NoteValue;

    fn gateway(prover: SimulatedProver, timeout: Duration) -> ProofGateway {
        ProofGateway::new(
            Arc::new(prover),
            Arc::new(ViewKeyDisclosure::new(ViewKey::from_bytes([3u8; 32]))),
            timeout,
        )
    }

    fn input() -> TransferProofInput {
        single_note_input(5)
    }

    #[tokio::test]
    async fn test_generate_and_verify() {
        let gw = gateway(SimulatedProver::new(), Duration::from_secs(5));
        let proof = gw.generate_transfer_proof(&input()).await.unwrap();
        assert!(gw
            .verify_transfer_proof(&proof.proof, &proof.public_signals, &proof.verifier_key)
            .unwrap());
    }

    #[tokio::test]
    async fn test_malformed_input_rejected() {
        let gw = gateway(SimulatedProver::new(), Duration::from_secs(5));
        let mut bad = input();
        bad.inputs.clear();
        let err = gw.generate_transfer_proof(&bad).await.unwrap_err();
        assert!(matches!(err, WalletError::ProofGeneration(_)));
    }

    #[tokio::test]
    async fn test_timeout() {
        let slow = SimulatedProver::new().with_latency(Duration::from_millis(500));
        let gw = gateway(slow, Duration::from_millis(20));
        let err = gw.generate_transfer_proof(&input()).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_cancellation() {
        let slow = SimulatedProver::new().with_latency(Duration::from_secs(5));
        let gw = gateway(slow, Duration::from_secs(10));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = gw
            .generate_transfer_proof_until(&input(), &cancel)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            WalletError::ProofGeneration("proof generation cancelled".into())
        );
    }

    #[tokio::test]
    async fn test_truncated_proof_is_verification_error() {
        let gw = gateway(SimulatedProver::new(), Duration::from_secs(5));
        let mut proof = gw.generate_transfer_proof(&input()).await.unwrap();
        proof.proof.pi_a.truncate(1);
        let err = gw
            .verify_transfer_proof(&proof.proof, &proof.public_signals, &proof.verifier_key)
            .unwrap_err();
        assert!(matches!(err, WalletError::Verification(_)));
    }

    #[test]
    fn test_payment_proof_via_gateway() {
        let gw = gateway(SimulatedProver::new(), Duration::from_secs(5));
        let note = Note::new("0xc1".into(), "0xn1".into(), NoteValue::new(9));
        let proof = gw.generate_payment_proof(&note).unwrap();
        let key = gw.export_view_key();
        assert!(gw.verify_payment_proof(&proof, &note, &key).unwrap());
    }
}
