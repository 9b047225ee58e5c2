//! Proof generation and verification.

mod disclosure;
mod gateway;
mod groth16;
mod http_prover;
mod simulated;
mod types;

pub use disclosure::ViewKeyDisclosure;
pub use gateway::{PaymentProver, ProofGateway, TransferProver};
pub use groth16::Groth16Verifier;
pub use http_prover::{HttpProver, HttpProverConfig, load_verifier_key};
pub use simulated::SimulatedProver;
pub use types::{
    Groth16Proof, OutputCommitment, OutputRole, PaymentMetadata, PaymentProof, SpendWitness,
    TransferProof, TransferProofInput, VerifierKey, check_public_signals,
};

#[cfg(test)]
pub(crate) mod testing {
    use cipherpay_privacy::{Commitment, MerkleTree, NoteValue};

    use super::*;

    /// A consistent input spending one note of `amount` to one recipient.
    pub(crate) fn single_note_input(amount: u128) -> TransferProofInput {
        let mut tree = MerkleTree::new();
        let c = Commitment::from("0xc1");
        tree.insert(&c);
        TransferProofInput {
            amount: NoteValue::new(amount),
            recipient: "0xabc".into(),
            merkle_root: tree.root(),
            inputs: vec![SpendWitness {
                commitment: c.clone(),
                nullifier: "0xn1".into(),
                amount: NoteValue::new(amount),
                merkle_path: tree.path_for(&c).unwrap(),
            }],
            outputs: vec![OutputCommitment {
                commitment: "0xout".into(),
                amount: NoteValue::new(amount),
                role: OutputRole::Recipient,
            }],
        }
    }
}
