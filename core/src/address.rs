//! Recipient grammar and one-time stealth recipients.

use cipherpay_config::ChainType;
use rand::Rng;

use crate::error::{Result, WalletError};

const STEALTH_CONTEXT: &str = "cipherpay stealth address v1";

/// Check `recipient` against the address grammar of `chain`.
///
/// Ethereum: `0x` followed by 40 hex digits (any case).
/// Solana: base58 that decodes to exactly 32 bytes.
pub fn validate_recipient(chain: ChainType, recipient: &str) -> Result<()> {
    let ok = match chain {
        ChainType::Ethereum => is_ethereum_address(recipient),
        ChainType::Solana => is_solana_address(recipient),
    };
    if ok {
        Ok(())
    } else {
        Err(WalletError::InvalidRecipient(format!(
            "'{recipient}' is not a valid {chain} address"
        )))
    }
}

fn is_ethereum_address(s: &str) -> bool {
    s.strip_prefix("0x")
        .is_some_and(|body| body.len() == 40 && body.bytes().all(|b| b.is_ascii_hexdigit()))
}

fn is_solana_address(s: &str) -> bool {
    bs58::decode(s)
        .into_vec()
        .is_ok_and(|bytes| bytes.len() == 32)
}

/// One-time recipient identifier carried alongside a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StealthAddress {
    pub address: String,
    /// Hex of the per-transfer randomness, shared with the recipient
    pub ephemeral: String,
}

impl StealthAddress {
    pub fn derive<R: Rng + ?Sized>(chain: ChainType, recipient: &str, rng: &mut R) -> Self {
        let mut ephemeral = [0u8; 32];
        rng.fill_bytes(&mut ephemeral);
        Self::derive_with(chain, recipient, &ephemeral)
    }

    pub fn derive_with(chain: ChainType, recipient: &str, ephemeral: &[u8; 32]) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(STEALTH_CONTEXT);
        hasher.update(recipient.to_ascii_lowercase().as_bytes());
        hasher.update(ephemeral);
        let digest = hasher.finalize();
        let address = match chain {
            ChainType::Ethereum => format!("0x{}", hex::encode(&digest.as_bytes()[..20])),
            ChainType::Solana => bs58::encode(digest.as_bytes()).into_string(),
        };
        Self {
            address,
            ephemeral: hex::encode(ephemeral),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOL: &str = "8SE6gCijcFQixvDQqWu29mCm9AydN8hcwWh2e2Q6RQgE";

    #[test]
    fn test_ethereum_grammar() {
        assert!(validate_recipient(ChainType::Ethereum, "0x52908400098527886E0F7030069857D2E4169EE7").is_ok());
        assert!(validate_recipient(ChainType::Ethereum, &format!("0x{}", "ab".repeat(20))).is_ok());

        for bad in ["", "0x", "52908400098527886E0F7030069857D2E4169EE7", "0x1234", "0xZZ908400098527886E0F7030069857D2E4169EE7"] {
            let err = validate_recipient(ChainType::Ethereum, bad).unwrap_err();
            assert!(matches!(err, WalletError::InvalidRecipient(_)), "{bad}");
        }
    }

    #[test]
    fn test_solana_grammar() {
        assert!(validate_recipient(ChainType::Solana, SOL).is_ok());
        assert!(validate_recipient(ChainType::Solana, "0x52908400098527886E0F7030069857D2E4169EE7").is_err());
        assert!(validate_recipient(ChainType::Solana, "abc").is_err());
        // '0' is outside the base58 alphabet
        assert!(validate_recipient(ChainType::Solana, &SOL.replace('8', "0")).is_err());
    }

    #[test]
    fn test_stealth_address_shape() {
        let eph = [3u8; 32];
        let eth = StealthAddress::derive_with(ChainType::Ethereum, "0xabc", &eph);
        assert!(validate_recipient(ChainType::Ethereum, &eth.address).is_ok());
        assert_eq!(eth.ephemeral, hex::encode(eph));

        let sol = StealthAddress::derive_with(ChainType::Solana, SOL, &eph);
        assert!(validate_recipient(ChainType::Solana, &sol.address).is_ok());
    }

    #[test]
    fn test_stealth_addresses_are_one_time() {
        let mut rng = rand::thread_rng();
        let a = StealthAddress::derive(ChainType::Ethereum, "0xabc", &mut rng);
        let b = StealthAddress::derive(ChainType::Ethereum, "0xabc", &mut rng);
        assert_ne!(a.address, b.address);
        assert_eq!(
            StealthAddress::derive_with(ChainType::Ethereum, "0xABC", &[1u8; 32]),
            StealthAddress::derive_with(ChainType::Ethereum, "0xabc", &[1u8; 32]),
        );
    }
}
