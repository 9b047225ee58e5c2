//! Simulated transfer prover.
//!
//! Produces proofs with the real snarkjs shape whose `pi_c` is a keyed tag
//! over `pi_a`, `pi_b` and the public signals. Verification recomputes the
//! tag, so a simulated proof verifies against exactly the signals and key it
//! was produced for and tampering is detected.
//!
//! An optional failure rate marks a deterministic fraction of proofs as
//! invalid, chosen by the tag itself so repeated verification agrees.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use rand::Rng;
use serde_json::json;

use super::gateway::TransferProver;
use super::types::{Groth16Proof, TransferProof, TransferProofInput, VerifierKey};
use crate::error::{Result, WalletError};

const TAG_CONTEXT: &str = "cipherpay simulated proof v1";

pub struct SimulatedProver {
    verifier_key: VerifierKey,
    tag_key: [u8; 32],
    latency: Duration,
    failure_rate: f64,
}

impl SimulatedProver {
    pub fn new() -> Self {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill(&mut seed);
        Self::from_seed(seed)
    }

    /// Deterministic key material, for reproducible runs.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let verifier_key = VerifierKey::new(json!({
            "protocol": "groth16",
            "curve": "bn128",
            "simulated": true,
            "keySeed": hex::encode(seed),
        }));
        Self {
            verifier_key,
            tag_key: blake3::derive_key(TAG_CONTEXT, &seed),
            latency: Duration::ZERO,
            failure_rate: 0.0,
        }
    }

    /// Simulated proving time
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn verifier_key(&self) -> &VerifierKey {
        &self.verifier_key
    }

    fn tag_key_for(verifier_key: &VerifierKey) -> Option<[u8; 32]> {
        let seed = verifier_key.as_json().get("keySeed")?.as_str()?;
        let seed = cipherpay_privacy::error::decode_hex32(seed).ok()?;
        Some(blake3::derive_key(TAG_CONTEXT, &seed))
    }

    fn tag(key: &[u8; 32], pi_a: &[String], pi_b: &[Vec<String>], signals: &[String]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_keyed(key);
        for part in pi_a.iter().chain(pi_b.iter().flatten()) {
            hasher.update(part.as_bytes());
            hasher.update(b",");
        }
        hasher.update(b"|");
        for signal in signals {
            hasher.update(signal.as_bytes());
            hasher.update(b",");
        }
        *hasher.finalize().as_bytes()
    }

    fn tag_coordinates(tag: &[u8; 32]) -> [String; 2] {
        let mut hi = [0u8; 16];
        let mut lo = [0u8; 16];
        hi.copy_from_slice(&tag[..16]);
        lo.copy_from_slice(&tag[16..]);
        [
            u128::from_be_bytes(hi).to_string(),
            u128::from_be_bytes(lo).to_string(),
        ]
    }

    fn rejected_by_failure_rate(&self, tag: &[u8; 32]) -> bool {
        let mut head = [0u8; 8];
        head.copy_from_slice(&tag[..8]);
        let draw = u64::from_be_bytes(head) as f64 / u64::MAX as f64;
        draw < self.failure_rate
    }
}

impl Default for SimulatedProver {
    fn default() -> Self {
        Self::new()
    }
}

fn random_coordinate<R: Rng>(rng: &mut R) -> String {
    rng.r#gen::<u128>().to_string()
}

#[async_trait]
impl TransferProver for SimulatedProver {
    async fn prove(&self, input: &TransferProofInput) -> Result<TransferProof> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let public_signals = input.public_signals();
        let (pi_a, pi_b) = {
            let mut rng = rand::thread_rng();
            let pi_a = vec![random_coordinate(&mut rng), random_coordinate(&mut rng), "1".into()];
            let pi_b = vec![
                vec![random_coordinate(&mut rng), random_coordinate(&mut rng)],
                vec![random_coordinate(&mut rng), random_coordinate(&mut rng)],
                vec!["1".into(), "0".into()],
            ];
            (pi_a, pi_b)
        };
        let tag = Self::tag(&self.tag_key, &pi_a, &pi_b, &public_signals);
        let [c0, c1] = Self::tag_coordinates(&tag);
        debug!(
            "Simulated transfer proof for {} inputs, {} outputs",
            input.inputs.len(),
            input.outputs.len()
        );

        Ok(TransferProof {
            proof: Groth16Proof {
                pi_a,
                pi_b,
                pi_c: vec![c0, c1, "1".into()],
                protocol: "groth16".into(),
                curve: "bn128".into(),
            },
            public_signals,
            verifier_key: self.verifier_key.clone(),
        })
    }

    fn verify(
        &self,
        proof: &Groth16Proof,
        public_signals: &[String],
        verifier_key: &VerifierKey,
    ) -> Result<bool> {
        proof.check_shape()?;
        let Some(key) = Self::tag_key_for(verifier_key) else {
            return Err(WalletError::Verification(
                "verifier key carries no simulated key seed".into(),
            ));
        };
        let tag = Self::tag(&key, &proof.pi_a, &proof.pi_b, public_signals);
        let [c0, c1] = Self::tag_coordinates(&tag);
        if proof.pi_c[0] != c0 || proof.pi_c[1] != c1 {
            return Ok(false);
        }
        Ok(!self.rejected_by_failure_rate(&tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::testing::single_note_input;

    fn input() -> TransferProofInput {
        single_note_input(10)
    }

    #[tokio::test]
    async fn test_simulated_roundtrip() {
        let prover = SimulatedProver::from_seed([1u8; 32]);
        let proof = prover.prove(&input()).await.unwrap();

        proof.proof.check_shape().unwrap();
        assert!(prover
            .verify(&proof.proof, &proof.public_signals, &proof.verifier_key)
            .unwrap());
    }

    #[tokio::test]
    async fn test_tampered_signal_fails() {
        let prover = SimulatedProver::from_seed([1u8; 32]);
        let proof = prover.prove(&input()).await.unwrap();

        let mut signals = proof.public_signals.clone();
        signals[0] = "1".into();
        assert!(!prover.verify(&proof.proof, &signals, &proof.verifier_key).unwrap());
    }

    #[tokio::test]
    async fn test_other_key_fails() {
        let prover = SimulatedProver::from_seed([1u8; 32]);
        let other = SimulatedProver::from_seed([2u8; 32]);
        let proof = prover.prove(&input()).await.unwrap();
        assert!(!prover
            .verify(&proof.proof, &proof.public_signals, other.verifier_key())
            .unwrap());
        assert!(prover
            .verify(
                &proof.proof,
                &proof.public_signals,
                &VerifierKey::new(json!({"protocol": "groth16"}))
            )
            .is_err());
    }

    #[tokio::test]
    async fn test_failure_rate_is_deterministic() {
        let always = SimulatedProver::from_seed([1u8; 32]).with_failure_rate(1.0);
        let proof = always.prove(&input()).await.unwrap();
        let verdicts: Vec<bool> = (0..3)
            .map(|_| {
                always
                    .verify(&proof.proof, &proof.public_signals, &proof.verifier_key)
                    .unwrap()
            })
            .collect();
        assert_eq!(verdicts, vec![false, false, false]);
    }
}
