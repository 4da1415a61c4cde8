//! Configuration management for VaultChain

use crate::blockchain::{check_difficulty, DEFAULT_DIFFICULTY};
use crate::crypto::{DEFAULT_RSA_KEY_BITS, MIN_RSA_KEY_BITS};
use crate::error::ChainError;
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "vaultchain.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub crypto: CryptoConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
    /// Human-readable duration such as `"30s"` or `"2m"`. Unset means no deadline.
    #[serde(default)]
    pub mining_timeout: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            mining_timeout: None,
        }
    }
}

impl LedgerConfig {
    pub fn mining_timeout(&self) -> Result<Option<Duration>, ChainError> {
        self.mining_timeout
            .as_deref()
            .map(|raw| {
                humantime::parse_duration(raw).map_err(|e| {
                    ChainError::InvalidConfig(format!("ledger.mining_timeout {:?}: {}", raw, e))
                })
            })
            .transpose()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CryptoConfig {
    #[serde(default = "default_rsa_key_bits")]
    pub rsa_key_bits: usize,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            rsa_key_bits: default_rsa_key_bits(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    pub fn level(&self) -> Result<tracing::Level, ChainError> {
        tracing::Level::from_str(&self.level)
            .map_err(|_| ChainError::InvalidConfig(format!("unknown logging.level {:?}", self.level)))
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ChainError> {
        check_difficulty(self.ledger.difficulty)?;
        self.ledger.mining_timeout()?;

        if self.crypto.rsa_key_bits < MIN_RSA_KEY_BITS {
            return Err(ChainError::InvalidConfig(format!(
                "crypto.rsa_key_bits must be at least {}, got {}",
                MIN_RSA_KEY_BITS, self.crypto.rsa_key_bits
            )));
        }

        self.logging.level()?;
        Ok(())
    }
}

/// Loads configuration from `path`. A missing file yields the defaults; an
/// unreadable or malformed one is an error.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ChainError> {
    let path = path.as_ref();
    let config = match fs::read_to_string(path) {
        Ok(contents) => toml::from_str::<Config>(&contents).map_err(|e| {
            ChainError::InvalidConfig(format!("failed to parse {}: {}", path.display(), e))
        })?,
        Err(e) if e.kind() == ErrorKind::NotFound => Config::default(),
        Err(e) => return Err(e.into()),
    };

    config.validate()?;
    Ok(config)
}

fn default_difficulty() -> u32 {
    DEFAULT_DIFFICULTY
}

fn default_rsa_key_bits() -> usize {
    DEFAULT_RSA_KEY_BITS
}

fn default_log_level() -> String {
    "info".to_string()
}
