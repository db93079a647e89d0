//! Configuration management for the FAssets orchestrator
//!
//! Loads configuration from TOML files with environment variable substitution,
//! then applies `FASSETS__SECTION__KEY` environment overrides.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use ethers::types::Address;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::attestation::RoundSchedule;
use crate::error::{OrchestratorError, OrchestratorResult};

/// Flare contract registry, same address on all Flare networks
pub const FLARE_CONTRACT_REGISTRY: &str = "0xaD67FE66660Fb8dFE9d6b1b4240d8650e30F6019";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub network: NetworkConfig,
    pub underlying: UnderlyingConfig,
    pub attestation: AttestationConfig,
    #[serde(default)]
    pub minting: MintingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub rpc_urls: Vec<String>,
    #[serde(default = "default_registry")]
    pub registry_address: String,
    #[serde(default = "default_asset_manager_name")]
    pub asset_manager_name: String,
    /// Overrides the per-chain recommendation when set
    pub confirmation_blocks: Option<usize>,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnderlyingConfig {
    pub rpc_url: String,
    /// Classic address of the paying account
    pub account: String,
    /// Environment variable holding the account's family seed
    #[serde(default = "default_xrpl_secret_env")]
    pub secret_env: String,
    #[serde(default = "default_ledger_decimals")]
    pub decimals: u32,
    #[serde(default = "default_last_ledger_offset")]
    pub last_ledger_offset: u32,
    #[serde(default = "default_validation_timeout_secs")]
    pub validation_timeout_secs: u64,
    #[serde(default = "default_ledger_poll_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_call_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttestationConfig {
    pub verifier_url: String,
    pub da_layer_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_attestation_type")]
    pub attestation_type: String,
    #[serde(default = "default_source_id")]
    pub source_id: String,
    #[serde(default = "default_verifier_path")]
    pub verifier_path: String,
    #[serde(default = "default_proof_path")]
    pub proof_path: String,
    #[serde(default = "default_call_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default)]
    pub rounds: RoundScheduleConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoundScheduleConfig {
    pub first_round_start_ts: u64,
    pub round_duration_secs: u64,
    pub finalization_window_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MintingConfig {
    pub agent_page_size: u64,
    /// Optional executor address passed through to reserveCollateral / redeem
    pub executor: Option<String>,
    /// When set, executeMinting and redemption writes are logged, not sent
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for RoundScheduleConfig {
    fn default() -> Self {
        Self {
            first_round_start_ts: 1_658_430_000,
            round_duration_secs: 90,
            finalization_window_secs: 270,
        }
    }
}

impl Default for MintingConfig {
    fn default() -> Self {
        Self {
            agent_page_size: 10,
            executor: None,
            dry_run: true,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 2_000,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9464,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,fassets_orchestrator=debug".to_string(),
            json: false,
        }
    }
}

fn default_registry() -> String {
    FLARE_CONTRACT_REGISTRY.to_string()
}
fn default_asset_manager_name() -> String {
    "AssetManagerFXRP".to_string()
}
fn default_call_timeout_secs() -> u64 {
    30
}
fn default_private_key_env() -> String {
    "PRIVATE_KEY".to_string()
}
fn default_xrpl_secret_env() -> String {
    "XRPL_SECRET".to_string()
}
fn default_ledger_decimals() -> u32 {
    6
}
fn default_last_ledger_offset() -> u32 {
    20
}
fn default_validation_timeout_secs() -> u64 {
    120
}
fn default_ledger_poll_ms() -> u64 {
    1_000
}
fn default_api_key_env() -> String {
    "VERIFIER_API_KEY".to_string()
}
fn default_attestation_type() -> String {
    "Payment".to_string()
}
fn default_source_id() -> String {
    "testXRP".to_string()
}
fn default_verifier_path() -> String {
    "verifier/xrp/Payment/prepareRequest".to_string()
}
fn default_proof_path() -> String {
    "api/v0/fdc/get-proof-round-id-bytes".to_string()
}
fn default_initial_backoff_ms() -> u64 {
    5_000
}
fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Settings {
    /// Load settings from the file named by `FASSETS_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("FASSETS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));
        Self::load_from(config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: PathBuf) -> Result<Self> {
        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str);

        let settings: Settings = Config::builder()
            .add_source(File::from_str(&config_str, FileFormat::Toml))
            .add_source(
                Environment::with_prefix("FASSETS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.network.rpc_urls.is_empty() {
            anyhow::bail!("network.rpc_urls must not be empty");
        }
        parse_address("network.registry_address", &self.network.registry_address)?;
        if let Some(executor) = &self.minting.executor {
            parse_address("minting.executor", executor)?;
        }
        if self.minting.agent_page_size == 0 {
            anyhow::bail!("minting.agent_page_size must be positive");
        }
        if self.attestation.rounds.round_duration_secs == 0 {
            anyhow::bail!("attestation.rounds.round_duration_secs must be positive");
        }
        if self.attestation.initial_backoff_ms == 0
            || self.attestation.max_backoff_ms < self.attestation.initial_backoff_ms
        {
            anyhow::bail!("attestation backoff must satisfy 0 < initial_backoff_ms <= max_backoff_ms");
        }
        if !crate::underlying::is_classic_address(&self.underlying.account) {
            anyhow::bail!("underlying.account is not an XRPL classic address");
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.network.call_timeout_secs)
    }

    pub fn registry_address(&self) -> OrchestratorResult<Address> {
        parse_address("network.registry_address", &self.network.registry_address)
    }

    pub fn executor(&self) -> OrchestratorResult<Address> {
        match &self.minting.executor {
            Some(executor) => parse_address("minting.executor", executor),
            None => Ok(Address::zero()),
        }
    }

    pub fn round_schedule(&self) -> RoundSchedule {
        let rounds = &self.attestation.rounds;
        RoundSchedule::new(
            rounds.first_round_start_ts,
            rounds.round_duration_secs,
            rounds.finalization_window_secs,
        )
    }
}

/// Read a secret from the named environment variable
pub fn require_secret(env_name: &str) -> OrchestratorResult<String> {
    match env::var(env_name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(OrchestratorError::Config(format!(
            "environment variable {} is required",
            env_name
        ))),
    }
}

/// Parse a configured address, rejecting malformed values
pub fn parse_address(field: &str, value: &str) -> OrchestratorResult<Address> {
    value
        .parse::<Address>()
        .map_err(|e| OrchestratorError::Config(format!("{} is not a valid address: {}", field, e)))
}

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid regex");
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
[network]
chain_id = 114
rpc_urls = ["https://coston2-api.flare.network/ext/C/rpc"]

[underlying]
rpc_url = "https://s.altnet.rippletest.net:51234"
account = "rSHYuiEvsYsKR8uUHhBTuGP5zjRcGt4nm"

[attestation]
verifier_url = "https://fdc-verifiers-testnet.flare.network/"
da_layer_url = "${FASSETS_TEST_DA_URL}"
"#;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_load_minimal_file_applies_defaults() {
        env::set_var("FASSETS_TEST_DA_URL", "https://ctn2-data-availability.flare.network/");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let settings = Settings::load_from(file.path().to_path_buf()).unwrap();
        assert_eq!(settings.network.asset_manager_name, "AssetManagerFXRP");
        assert_eq!(
            settings.attestation.da_layer_url,
            "https://ctn2-data-availability.flare.network/"
        );
        assert_eq!(settings.minting.agent_page_size, 10);
        assert!(settings.minting.dry_run);
        assert_eq!(settings.underlying.decimals, 6);
        assert_eq!(settings.executor().unwrap(), Address::zero());
        assert!(settings.database.is_none());
    }

    #[test]
    fn test_rejects_bad_underlying_account() {
        let broken = MINIMAL.replace("rSHYuiEvsYsKR8uUHhBTuGP5zjRcGt4nm", "0xnotxrpl");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(broken.as_bytes()).unwrap();

        assert!(Settings::load_from(file.path().to_path_buf()).is_err());
    }

    #[test]
    fn test_missing_secret_is_config_error() {
        env::remove_var("FASSETS_TEST_UNSET_SECRET");
        let err = require_secret("FASSETS_TEST_UNSET_SECRET").unwrap_err();
        assert!(matches!(err, OrchestratorError::Config(_)));
    }
}
