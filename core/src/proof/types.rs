//! Proof data model.
//!
//! Transfer proofs use the snarkjs Groth16 JSON layout so they can be handed
//! to any verifier that understands it:
//!
//! ```text
//! {
//!   "proof": { "pi_a": [x, y, "1"],
//!              "pi_b": [[x0, x1], [y0, y1], ["1", "0"]],
//!              "pi_c": [x, y, "1"],
//!              "protocol": "groth16", "curve": "bn128" },
//!   "publicSignals": ["<decimal>", ...],
//!   "verifierKey": { ...snarkjs verification key... }
//! }
//! ```

use cipherpay_privacy::{Commitment, Hash32, MerklePath, NoteValue, Nullifier};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::error::{Result, WalletError};

fn default_protocol() -> String {
    "groth16".into()
}

fn default_curve() -> String {
    "bn128".into()
}

/// Groth16 proof in snarkjs layout, coordinates as decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Groth16Proof {
    pub pi_a: Vec<String>,
    pub pi_b: Vec<Vec<String>>,
    pub pi_c: Vec<String>,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "default_curve")]
    pub curve: String,
}

impl Groth16Proof {
    /// Reject anything that is not a structurally complete proof.
    pub fn check_shape(&self) -> Result<()> {
        if self.protocol != "groth16" {
            return Err(malformed(format!("unsupported protocol {}", self.protocol)));
        }
        check_point("pi_a", &self.pi_a)?;
        check_point("pi_c", &self.pi_c)?;
        if self.pi_b.len() != 3 {
            return Err(malformed(format!(
                "pi_b must have 3 rows, got {}",
                self.pi_b.len()
            )));
        }
        for (i, row) in self.pi_b.iter().enumerate() {
            if row.len() != 2 {
                return Err(malformed(format!(
                    "pi_b[{i}] must have 2 coordinates, got {}",
                    row.len()
                )));
            }
            for coord in row {
                check_decimal("pi_b", coord)?;
            }
        }
        Ok(())
    }
}

fn check_point(name: &str, coords: &[String]) -> Result<()> {
    if coords.len() != 3 {
        return Err(malformed(format!(
            "{name} must have 3 coordinates, got {}",
            coords.len()
        )));
    }
    coords.iter().try_for_each(|c| check_decimal(name, c))
}

fn check_decimal(name: &str, value: &str) -> Result<()> {
    if is_decimal(value) {
        Ok(())
    } else {
        Err(malformed(format!("{name} contains non-decimal value {value:?}")))
    }
}

pub(crate) fn is_decimal(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

fn malformed(msg: String) -> WalletError {
    WalletError::Verification(msg)
}

/// Public signals must be non-empty decimal field elements.
pub fn check_public_signals(signals: &[String]) -> Result<()> {
    if signals.is_empty() {
        return Err(malformed("public signals are empty".into()));
    }
    signals
        .iter()
        .try_for_each(|s| check_decimal("publicSignals", s))
}

/// snarkjs verification key, kept as an opaque JSON resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerifierKey(pub Value);

impl VerifierKey {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_json(&self) -> &Value {
        &self.0
    }

    pub fn check_shape(&self) -> Result<()> {
        if self.0.is_object() {
            Ok(())
        } else {
            Err(malformed("verifier key must be a JSON object".into()))
        }
    }

    /// Declared number of public inputs, if the key states it.
    pub fn n_public(&self) -> Option<usize> {
        self.0.get("nPublic")?.as_u64().map(|n| n as usize)
    }

    /// Stable fingerprint of the key contents.
    pub fn key_id(&self) -> String {
        // serde_json maps are ordered, so the encoding is canonical
        let bytes = serde_json::to_vec(&self.0).unwrap_or_default();
        hex::encode(blake3::hash(&bytes).as_bytes())
    }
}

/// A transfer proof as produced by the prover backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProof {
    pub proof: Groth16Proof,
    pub public_signals: Vec<String>,
    pub verifier_key: VerifierKey,
}

/// Selective-disclosure attestation that the wallet holds a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProof {
    /// `0x`-prefixed hex tag
    pub proof: String,
    pub metadata: PaymentMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMetadata {
    pub note_id: Commitment,
    pub amount: NoteValue,
    pub timestamp: i64,
}

/// Membership witness for one note being spent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendWitness {
    pub commitment: Commitment,
    pub nullifier: Nullifier,
    pub amount: NoteValue,
    pub merkle_path: MerklePath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputRole {
    Recipient,
    Change,
}

/// Commitment to a note created by the transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputCommitment {
    pub commitment: Commitment,
    pub amount: NoteValue,
    pub role: OutputRole,
}

/// Everything the prover needs to prove one transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProofInput {
    pub amount: NoteValue,
    pub recipient: String,
    #[serde(with = "hex::serde")]
    pub merkle_root: Hash32,
    pub inputs: Vec<SpendWitness>,
    pub outputs: Vec<OutputCommitment>,
}

impl TransferProofInput {
    pub fn nullifiers(&self) -> Vec<Nullifier> {
        self.inputs.iter().map(|i| i.nullifier.clone()).collect()
    }

    pub fn output_commitments(&self) -> Vec<Commitment> {
        self.outputs.iter().map(|o| o.commitment.clone()).collect()
    }

    /// Check the input is internally consistent before spending prover time.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(WalletError::ProofGeneration(msg));

        if self.amount.is_zero() {
            return invalid("transfer amount is zero".into());
        }
        if self.recipient.trim().is_empty() {
            return invalid("recipient is empty".into());
        }
        if self.inputs.is_empty() {
            return invalid("no input notes".into());
        }

        let mut nullifiers = HashSet::new();
        for input in &self.inputs {
            if input.commitment.is_empty() || input.nullifier.is_empty() {
                return invalid("input note is missing its commitment or nullifier".into());
            }
            if !nullifiers.insert(&input.nullifier) {
                return invalid(format!("nullifier {} used twice", input.nullifier));
            }
            if !input.merkle_path.verify(&input.commitment, &self.merkle_root) {
                return invalid(format!(
                    "merkle path for {} does not match root {}",
                    input.commitment,
                    hex::encode(self.merkle_root)
                ));
            }
        }

        let spent = NoteValue::checked_sum(self.inputs.iter().map(|i| i.amount));
        let created = NoteValue::checked_sum(self.outputs.iter().map(|o| o.amount));
        match (spent, created) {
            (Some(spent), Some(created)) if spent == created => {}
            _ => return invalid("input and output amounts do not balance".into()),
        }

        let paid = NoteValue::checked_sum(
            self.outputs
                .iter()
                .filter(|o| o.role == OutputRole::Recipient)
                .map(|o| o.amount),
        );
        if paid != Some(self.amount) {
            return invalid("recipient outputs do not equal the transfer amount".into());
        }
        Ok(())
    }

    /// Public signals a prover commits to for this input.
    ///
    /// Order: merkle root, nullifiers, output commitments, amount.
    pub fn public_signals(&self) -> Vec<String> {
        let mut signals = Vec::with_capacity(self.inputs.len() + self.outputs.len() + 2);
        signals.push(field_decimal(&self.merkle_root));
        signals.extend(
            self.inputs
                .iter()
                .map(|i| field_decimal(i.nullifier.as_str().as_bytes())),
        );
        signals.extend(
            self.outputs
                .iter()
                .map(|o| field_decimal(o.commitment.as_str().as_bytes())),
        );
        signals.push(self.amount.to_string());
        signals
    }
}

/// Map arbitrary bytes to a decimal value well inside the BN254 scalar field.
pub(crate) fn field_decimal(bytes: &[u8]) -> String {
    let digest = blake3::hash(bytes);
    let mut head = [0u8; 16];
    head.copy_from_slice(&digest.as_bytes()[..16]);
    u128::from_be_bytes(head).to_string()
}
