//! Groth16 verification for snarkjs-encoded proofs on BN254.
//!
//! Coordinates arrive as decimal strings. Every point is checked to be on
//! the curve and in the prime-order subgroup before the pairing check, and
//! every scalar must be a canonical field element. Anything that fails those
//! checks is malformed input (`WalletError::Verification`); a proof that
//! parses cleanly but does not satisfy the pairing equation verifies `false`.

use ark_bn254::{Bn254, Fq, Fq2, Fr, G1Affine, G2Affine};
use ark_ff::PrimeField;
use ark_groth16::{Groth16, Proof, VerifyingKey};
use ark_snark::SNARK;
use log::debug;
use serde_json::Value;

use super::types::{Groth16Proof, VerifierKey, check_public_signals, is_decimal};
use crate::error::{Result, WalletError};

/// Stateless verifier; parsing and pairing both happen per call.
#[derive(Debug, Default, Clone, Copy)]
pub struct Groth16Verifier;

impl Groth16Verifier {
    pub fn verify(
        &self,
        proof: &Groth16Proof,
        public_signals: &[String],
        verifier_key: &VerifierKey,
    ) -> Result<bool> {
        proof.check_shape()?;
        check_public_signals(public_signals)?;

        let vk = parse_verifying_key(verifier_key)?;
        let proof = parse_proof(proof)?;
        let inputs = public_signals
            .iter()
            .map(|s| parse_field::<Fr>("publicSignals", s))
            .collect::<Result<Vec<_>>>()?;

        if vk.gamma_abc_g1.len() != inputs.len() + 1 {
            return Err(malformed(format!(
                "verifier key expects {} public signals, got {}",
                vk.gamma_abc_g1.len().saturating_sub(1),
                inputs.len()
            )));
        }

        let valid = Groth16::<Bn254>::verify(&vk, &inputs, &proof)
            .map_err(|e| malformed(format!("pairing check failed to run: {e}")))?;
        debug!("Groth16 verification result: {}", valid);
        Ok(valid)
    }
}

fn malformed(msg: String) -> WalletError {
    WalletError::Verification(msg)
}

/// Parse a decimal string into a canonical field element.
fn parse_field<F: PrimeField>(what: &str, value: &str) -> Result<F> {
    if !is_decimal(value) {
        return Err(malformed(format!("{what}: {value:?} is not a decimal")));
    }
    let parsed = F::from_str(value)
        .map_err(|_| malformed(format!("{what}: {value:?} is not a field element")))?;

    let digits = value.trim_start_matches('0');
    let digits = if digits.is_empty() { "0" } else { digits };
    if parsed.into_bigint().to_string() != digits {
        return Err(malformed(format!("{what}: {value:?} exceeds the field modulus")));
    }
    Ok(parsed)
}

fn parse_g1(what: &str, coords: &[String]) -> Result<G1Affine> {
    if coords.len() != 3 {
        return Err(malformed(format!("{what}: expected 3 coordinates")));
    }
    match coords[2].as_str() {
        "0" => return Ok(G1Affine::identity()),
        "1" => {}
        other => return Err(malformed(format!("{what}: non-affine z coordinate {other}"))),
    }

    let x: Fq = parse_field(what, &coords[0])?;
    let y: Fq = parse_field(what, &coords[1])?;
    let point = G1Affine::new_unchecked(x, y);
    if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(malformed(format!("{what}: point is not on the BN254 G1 curve")));
    }
    Ok(point)
}

fn parse_fq2(what: &str, pair: &[String]) -> Result<Fq2> {
    if pair.len() != 2 {
        return Err(malformed(format!("{what}: expected 2 coordinates per row")));
    }
    Ok(Fq2::new(parse_field(what, &pair[0])?, parse_field(what, &pair[1])?))
}

fn parse_g2(what: &str, rows: &[Vec<String>]) -> Result<G2Affine> {
    if rows.len() != 3 {
        return Err(malformed(format!("{what}: expected 3 rows")));
    }
    match (rows[2].first().map(String::as_str), rows[2].get(1).map(String::as_str)) {
        (Some("0"), Some("0")) => return Ok(G2Affine::identity()),
        (Some("1"), Some("0")) => {}
        _ => return Err(malformed(format!("{what}: non-affine z coordinate"))),
    }

    let point = G2Affine::new_unchecked(parse_fq2(what, &rows[0])?, parse_fq2(what, &rows[1])?);
    if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(malformed(format!("{what}: point is not on the BN254 G2 curve")));
    }
    Ok(point)
}

fn parse_proof(proof: &Groth16Proof) -> Result<Proof<Bn254>> {
    Ok(Proof {
        a: parse_g1("pi_a", &proof.pi_a)?,
        b: parse_g2("pi_b", &proof.pi_b)?,
        c: parse_g1("pi_c", &proof.pi_c)?,
    })
}

fn json_strings(what: &str, value: Option<&Value>) -> Result<Vec<String>> {
    let items = value
        .and_then(Value::as_array)
        .ok_or_else(|| malformed(format!("verifier key is missing {what}")))?;
    items
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| malformed(format!("{what}: coordinates must be strings")))
        })
        .collect()
}

fn json_rows(what: &str, value: Option<&Value>) -> Result<Vec<Vec<String>>> {
    let rows = value
        .and_then(Value::as_array)
        .ok_or_else(|| malformed(format!("verifier key is missing {what}")))?;
    rows.iter().map(|row| json_strings(what, Some(row))).collect()
}

fn parse_verifying_key(key: &VerifierKey) -> Result<VerifyingKey<Bn254>> {
    key.check_shape()?;
    let json = key.as_json();

    if let Some(protocol) = json.get("protocol").and_then(Value::as_str) {
        if protocol != "groth16" {
            return Err(malformed(format!("verifier key protocol {protocol} is not groth16")));
        }
    }

    let ic = json
        .get("IC")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("verifier key is missing IC".into()))?;
    let gamma_abc_g1 = ic
        .iter()
        .map(|point| parse_g1("IC", &json_strings("IC", Some(point))?))
        .collect::<Result<Vec<_>>>()?;
    if let Some(n) = key.n_public() {
        if n + 1 != gamma_abc_g1.len() {
            return Err(malformed(format!(
                "verifier key declares {n} public inputs but has {} IC points",
                gamma_abc_g1.len()
            )));
        }
    }

    Ok(VerifyingKey {
        alpha_g1: parse_g1("vk_alpha_1", &json_strings("vk_alpha_1", json.get("vk_alpha_1"))?)?,
        beta_g2: parse_g2("vk_beta_2", &json_rows("vk_beta_2", json.get("vk_beta_2"))?)?,
        gamma_g2: parse_g2("vk_gamma_2", &json_rows("vk_gamma_2", json.get("vk_gamma_2"))?)?,
        delta_g2: parse_g2("vk_delta_2", &json_rows("vk_delta_2", json.get("vk_delta_2"))?)?,
        gamma_abc_g1,
    })
}
