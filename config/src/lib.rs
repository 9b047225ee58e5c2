//! CipherPay Configuration
//!
//! Configuration for the wallet core and its tools.
//!
//! Handles loading configuration from:
//! 1. CP_CONFIG env var (explicit path)
//! 2. ./config.toml (current directory)
//! 3. ~/.cipherpay/config.toml (user home)
//!
//! Environment variables take precedence over TOML config. Keys the wallet
//! does not recognize are ignored, so one file can be shared with a host
//! application.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, fs};

const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_NAME: &str = ".cipherpay";

// ============================================================================
// Default Constants
// ============================================================================

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";
const DEFAULT_RELAYER_URL: &str = "http://localhost:3000";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 500;
const DEFAULT_PROOF_TIMEOUT_SECS: u64 = 120;

const DEFAULT_TRANSFER_WASM: &str = "/circuits/transfer.wasm";
const DEFAULT_TRANSFER_ZKEY: &str = "/circuits/transfer.zkey";
const DEFAULT_TRANSFER_VKEY: &str = "/circuits/transfer.vkey.json";
const DEFAULT_MERKLE_WASM: &str = "/circuits/merkle.wasm";
const DEFAULT_MERKLE_ZKEY: &str = "/circuits/merkle.zkey";
const DEFAULT_MERKLE_VKEY: &str = "/circuits/merkle.vkey.json";

const DEFAULT_CACHE_MAX_SIZE: usize = 1000;
const DEFAULT_CACHE_TTL_MS: u64 = 300_000;

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CipherPayConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub prover: ProverConfig,
    #[serde(default)]
    pub circuits: CircuitConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub features: FeatureFlags,
}

/// Ledger the wallet targets; decides the recipient address grammar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    #[default]
    Ethereum,
    Solana,
}

impl fmt::Display for ChainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainType::Ethereum => f.write_str("ethereum"),
            ChainType::Solana => f.write_str("solana"),
        }
    }
}

impl FromStr for ChainType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ethereum" | "eth" => Ok(ChainType::Ethereum),
            "solana" | "sol" => Ok(ChainType::Solana),
            other => Err(format!("unknown chain type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub chain_type: ChainType,
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// Deposit contract (Ethereum) or program id (Solana)
    #[serde(default)]
    pub contract_address: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            chain_type: ChainType::Ethereum,
            rpc_url: DEFAULT_RPC_URL.into(),
            contract_address: None,
        }
    }
}

fn default_rpc_url() -> String {
    DEFAULT_RPC_URL.into()
}

/// Relay service connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_relayer_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Retries for idempotent reads; submissions are never retried
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_RELAYER_URL.into(),
            api_key: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

fn default_relayer_url() -> String {
    DEFAULT_RELAYER_URL.into()
}
fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}
fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_retry_delay() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

/// External proving service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProverConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_proof_timeout")]
    pub proof_timeout_secs: u64,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            url: None,
            proof_timeout_secs: DEFAULT_PROOF_TIMEOUT_SECS,
        }
    }
}

fn default_proof_timeout() -> u64 {
    DEFAULT_PROOF_TIMEOUT_SECS
}

/// Circuit artifact locations (paths or URLs), passed through to the prover
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitConfig {
    #[serde(default = "default_transfer_wasm")]
    pub transfer_wasm: String,
    #[serde(default = "default_transfer_zkey")]
    pub transfer_zkey: String,
    #[serde(default = "default_transfer_vkey")]
    pub transfer_vkey: String,
    #[serde(default = "default_merkle_wasm")]
    pub merkle_wasm: String,
    #[serde(default = "default_merkle_zkey")]
    pub merkle_zkey: String,
    #[serde(default = "default_merkle_vkey")]
    pub merkle_vkey: String,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            transfer_wasm: DEFAULT_TRANSFER_WASM.into(),
            transfer_zkey: DEFAULT_TRANSFER_ZKEY.into(),
            transfer_vkey: DEFAULT_TRANSFER_VKEY.into(),
            merkle_wasm: DEFAULT_MERKLE_WASM.into(),
            merkle_zkey: DEFAULT_MERKLE_ZKEY.into(),
            merkle_vkey: DEFAULT_MERKLE_VKEY.into(),
        }
    }
}

fn default_transfer_wasm() -> String {
    DEFAULT_TRANSFER_WASM.into()
}
fn default_transfer_zkey() -> String {
    DEFAULT_TRANSFER_ZKEY.into()
}
fn default_transfer_vkey() -> String {
    DEFAULT_TRANSFER_VKEY.into()
}
fn default_merkle_wasm() -> String {
    DEFAULT_MERKLE_WASM.into()
}
fn default_merkle_zkey() -> String {
    DEFAULT_MERKLE_ZKEY.into()
}
fn default_merkle_vkey() -> String {
    DEFAULT_MERKLE_VKEY.into()
}

/// Which backend implementation the wallet runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    Real,
    Simulated,
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendMode::Real => f.write_str("real"),
            BackendMode::Simulated => f.write_str("simulated"),
        }
    }
}

impl FromStr for BackendMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "real" => Ok(BackendMode::Real),
            "simulated" | "mock" => Ok(BackendMode::Simulated),
            other => Err(format!("unknown backend mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Unset means "decide by build profile"
    #[serde(default)]
    pub mode: Option<BackendMode>,
    /// Permit the simulated backend in release builds
    #[serde(default)]
    pub allow_simulated: bool,
    #[serde(default = "default_true")]
    pub seed_demo_notes: bool,
    /// Fraction of simulated proofs that verify as invalid, in [0, 1]
    #[serde(default)]
    pub verify_failure_rate: f64,
    /// Artificial latency of simulated proof generation
    #[serde(default)]
    pub simulated_latency_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            mode: None,
            allow_simulated: false,
            seed_demo_notes: true,
            verify_failure_rate: 0.0,
            simulated_latency_ms: 0,
        }
    }
}

/// How input notes are picked for a transfer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Oldest notes first until the amount is covered
    #[default]
    InsertionOrder,
    /// Largest notes first, ties broken by insertion order
    LargestFirst,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletConfig {
    /// JSON-RPC endpoint of an external signer (Ethereum)
    #[serde(default)]
    pub signer_url: Option<String>,
    /// Hex view key; generated per session when unset
    #[serde(default)]
    pub view_key: Option<String>,
    #[serde(default)]
    pub selection_policy: SelectionPolicy,
}

/// Merkle path cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_max_size")]
    pub max_size: usize,
    #[serde(default = "default_cache_ttl")]
    pub default_ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_CACHE_MAX_SIZE,
            default_ttl_ms: DEFAULT_CACHE_TTL_MS,
        }
    }
}

fn default_cache_max_size() -> usize {
    DEFAULT_CACHE_MAX_SIZE
}
fn default_cache_ttl() -> u64 {
    DEFAULT_CACHE_TTL_MS
}

/// Feature flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFlags {
    #[serde(default = "default_true")]
    pub enable_compliance: bool,
    #[serde(default = "default_true")]
    pub enable_caching: bool,
    #[serde(default = "default_true")]
    pub enable_stealth_addresses: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_compliance: true,
            enable_caching: true,
            enable_stealth_addresses: true,
        }
    }
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Environment Variable Helpers
// ============================================================================

/// Source of override values, `std::env` outside of tests
struct Overrides<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Overrides<'_> {
    /// Set field from var if present
    fn string(&self, key: &str, field: &mut String) {
        if let Some(v) = (self.lookup)(key) {
            *field = v;
        }
    }

    /// Set Option<String> from var if present
    fn option_string(&self, key: &str, field: &mut Option<String>) {
        if let Some(v) = (self.lookup)(key) {
            *field = Some(v);
        }
    }

    /// Set field from var if present and parseable
    fn parse<T: FromStr>(&self, key: &str, field: &mut T) {
        if let Some(v) = (self.lookup)(key) {
            match v.parse() {
                Ok(parsed) => *field = parsed,
                Err(_) => log::warn!("Ignoring unparseable value for {}: {}", key, v),
            }
        }
    }

    /// Truthy values are "1" and "true"
    fn bool(&self, key: &str) -> Option<bool> {
        (self.lookup)(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
    }

    fn flag(&self, key: &str, field: &mut bool) {
        if let Some(v) = self.bool(key) {
            *field = v;
        }
    }
}

// ============================================================================
// Implementation
// ============================================================================

impl CipherPayConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading config from: {}", path.display());
                Self::read_file(&path)?
            }
            None => {
                log::info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a TOML document without consulting the environment
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse config")
    }

    fn read_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(path) = env::var("CP_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
            log::warn!("CP_CONFIG points to missing file: {}", path.display());
        }

        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        Self::default_config_path().filter(|p| p.exists())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(&|key: &str| env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides(&mut self, lookup: &dyn Fn(&str) -> Option<String>) {
        let vars = Overrides { lookup };

        // Network
        vars.parse("CP_CHAIN_TYPE", &mut self.network.chain_type);
        vars.string("CP_RPC_URL", &mut self.network.rpc_url);
        vars.option_string("CP_CONTRACT_ADDRESS", &mut self.network.contract_address);

        // Relay
        vars.string("CP_RELAYER_URL", &mut self.relay.url);
        vars.option_string("CP_RELAYER_API_KEY", &mut self.relay.api_key);
        vars.parse("CP_RELAYER_TIMEOUT_SECS", &mut self.relay.request_timeout_secs);
        vars.parse("CP_RELAYER_MAX_RETRIES", &mut self.relay.max_retries);

        // Prover
        vars.option_string("CP_PROVER_URL", &mut self.prover.url);
        vars.parse("CP_PROOF_TIMEOUT_SECS", &mut self.prover.proof_timeout_secs);
        vars.string("CP_TRANSFER_WASM_URL", &mut self.circuits.transfer_wasm);
        vars.string("CP_TRANSFER_ZKEY_URL", &mut self.circuits.transfer_zkey);
        vars.string("CP_TRANSFER_VKEY_URL", &mut self.circuits.transfer_vkey);

        // Backend
        if let Some(v) = (vars.lookup)("CP_BACKEND") {
            match v.parse() {
                Ok(mode) => self.backend.mode = Some(mode),
                Err(e) => log::warn!("Ignoring CP_BACKEND: {}", e),
            }
        }

        // Legacy: CP_USE_REAL_SDK
        if let Some(real) = vars.bool("CP_USE_REAL_SDK") {
            self.backend.mode = Some(if real {
                BackendMode::Real
            } else {
                BackendMode::Simulated
            });
        }
        vars.flag("CP_ALLOW_SIMULATED", &mut self.backend.allow_simulated);

        // Wallet
        vars.option_string("CP_SIGNER_URL", &mut self.wallet.signer_url);
        vars.option_string("CP_VIEW_KEY", &mut self.wallet.view_key);

        // Cache
        vars.parse("CP_CACHE_MAX_SIZE", &mut self.cache.max_size);
        vars.parse("CP_CACHE_DEFAULT_TTL", &mut self.cache.default_ttl_ms);

        // Features
        vars.flag("CP_ENABLE_COMPLIANCE", &mut self.features.enable_compliance);
        vars.flag("CP_ENABLE_CACHING", &mut self.features.enable_caching);
        vars.flag(
            "CP_ENABLE_STEALTH_ADDRESSES",
            &mut self.features.enable_stealth_addresses,
        );
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        let mut sample = Self::default();
        sample.backend.mode = Some(BackendMode::Simulated);
        sample.prover.url = Some("http://localhost:8080".into());
        toml::to_string_pretty(&sample).unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================
