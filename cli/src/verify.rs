//! Offline proof verification.

use std::fs;
use std::path::Path;

use anyhow::Context;
use cipherpay_core::proof::{Groth16Verifier, SimulatedProver, TransferProof, TransferProver};

/// Verify a `{proof, publicSignals, verifierKey}` document.
///
/// Keys produced by the simulated backend are checked with the simulated
/// verifier; anything else goes through Groth16 over BN254.
pub fn verify_file(path: &Path) -> anyhow::Result<bool> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let proof: TransferProof = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse proof document {}", path.display()))?;
    verify_proof(&proof)
}

pub fn verify_proof(proof: &TransferProof) -> anyhow::Result<bool> {
    let simulated = proof
        .verifier_key
        .as_json()
        .get("simulated")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let valid = if simulated {
        SimulatedProver::new().verify(&proof.proof, &proof.public_signals, &proof.verifier_key)?
    } else {
        Groth16Verifier.verify(&proof.proof, &proof.public_signals, &proof.verifier_key)?
    };
    log::info!(
        "Verified proof against key {}: {}",
        &proof.verifier_key.key_id()[..16],
        valid
    );
    Ok(valid)
}
