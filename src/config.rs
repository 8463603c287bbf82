//! Configuration management
//!
//! Exchange settings come from the `[exchange]` table of a TOML file; a `.env`
//! file and process environment can override the registry address and log
//! level. Every field has a default, so an empty file is a valid config.

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

use crate::pool::ShareMetadata;

pub const ENV_REGISTRY_ADDRESS: &str = "DEXSWAP_REGISTRY_ADDRESS";
pub const ENV_LOG_LEVEL: &str = "DEXSWAP_LOG_LEVEL";

/// Resolved exchange configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeConfig {
    /// Identity of the registry; pool ids are derived from it
    pub registry_address: Address,
    pub share: ShareMetadata,
    pub log_level: String,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            registry_address: default_registry_address(),
            share: ShareMetadata::default(),
            log_level: default_log_level(),
        }
    }
}

/// Top-level TOML configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub exchange: ExchangeSection,
}

/// `[exchange]` table as written in the file
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeSection {
    pub registry_address: Option<String>,
    #[serde(default = "default_share_name")]
    pub share_name: String,
    #[serde(default = "default_share_symbol")]
    pub share_symbol: String,
    #[serde(default = "default_share_decimals")]
    pub share_decimals: u8,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ExchangeSection {
    fn default() -> Self {
        Self {
            registry_address: None,
            share_name: default_share_name(),
            share_symbol: default_share_symbol(),
            share_decimals: default_share_decimals(),
            log_level: default_log_level(),
        }
    }
}

fn default_registry_address() -> Address { Address::with_last_byte(0xfa) }
fn default_share_name() -> String { ShareMetadata::default().name }
fn default_share_symbol() -> String { ShareMetadata::default().symbol }
fn default_share_decimals() -> u8 { 18 }
fn default_log_level() -> String { "info".to_string() }

impl ExchangeSection {
    /// Apply overrides, then validate into an `ExchangeConfig`
    pub fn resolve<F>(mut self, lookup: F) -> Result<ExchangeConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = lookup(ENV_REGISTRY_ADDRESS) {
            self.registry_address = Some(address);
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level;
        }

        let registry_address = match self.registry_address.as_deref() {
            Some(raw) => Address::from_str(raw.trim())
                .with_context(|| format!("Invalid registry address: {}", raw))?,
            None => default_registry_address(),
        };
        if registry_address == Address::ZERO {
            anyhow::bail!("Registry address must not be the zero address");
        }

        Ok(ExchangeConfig {
            registry_address,
            share: ShareMetadata {
                name: self.share_name,
                symbol: self.share_symbol,
                decimals: self.share_decimals,
            },
            log_level: self.log_level,
        })
    }
}

/// Parse configuration from TOML text without consulting the environment
pub fn parse_config(content: &str) -> Result<ExchangeConfig> {
    let config: TomlConfig =
        toml::from_str(content).with_context(|| "Failed to parse TOML configuration")?;
    config.exchange.resolve(|_| None)
}

/// Load configuration from a TOML file, then apply `.env` / environment overrides
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> Result<ExchangeConfig> {
    dotenv::dotenv().ok();

    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
    let config: TomlConfig =
        toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;

    config.exchange.resolve(|key| std::env::var(key).ok())
}

/// Defaults plus `.env` / environment overrides, for runs without a file
pub fn load_config() -> Result<ExchangeConfig> {
    dotenv::dotenv().ok();
    ExchangeSection::default().resolve(|key| std::env::var(key).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[exchange]
registry_address = "0x00000000000000000000000000000000000000aa"
share_name = "Pool Share"
share_symbol = "PS"
share_decimals = 6
log_level = "debug"
"#;

        let config = parse_config(toml_str).unwrap();
        assert_eq!(config.registry_address, Address::with_last_byte(0xaa));
        assert_eq!(config.share.name, "Pool Share");
        assert_eq!(config.share.symbol, "PS");
        assert_eq!(config.share.decimals, 6);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config, ExchangeConfig::default());
        assert_eq!(config.share.symbol, "UNI-V1");
    }

    #[test]
    fn test_overrides_win() {
        let section: TomlConfig = toml::from_str(
            r#"
[exchange]
registry_address = "0x00000000000000000000000000000000000000aa"
"#,
        )
        .unwrap();

        let config = section
            .exchange
            .resolve(|key| match key {
                ENV_REGISTRY_ADDRESS => {
                    Some("0x00000000000000000000000000000000000000bb".to_string())
                }
                ENV_LOG_LEVEL => Some("warn".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.registry_address, Address::with_last_byte(0xbb));
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_invalid_address_rejected() {
        assert!(parse_config("[exchange]\nregistry_address = \"not-an-address\"").is_err());
        assert!(parse_config(
            "[exchange]\nregistry_address = \"0x0000000000000000000000000000000000000000\""
        )
        .is_err());
    }
}
