//! Startup configuration. All three variables are mandatory; the process
//! refuses to start rather than operate against a half-configured ledger.

use std::env;

use secp256k1::{Keypair, Secp256k1, SecretKey};
use thiserror::Error;

pub const CONTRACT_ADDRESS_ENV: &str = "CONTRACT_ADDRESS";
pub const PRIVATE_KEY_ENV: &str = "PRIVATE_KEY";
pub const API_URL_ENV: &str = "API_URL";

/// The HTTP surface listens on this fixed port.
pub const LISTEN_PORT: u16 = 5000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("PRIVATE_KEY is not a valid secp256k1 secret key: {0}")]
    InvalidKey(String),
}

#[derive(Clone)]
pub struct Config {
    /// Address of the deployed parcel contract (opaque text for the ledger).
    pub contract_address: String,
    /// Signing identity used for every state-changing submission.
    pub signing_key: Keypair,
    /// JSON-RPC endpoint of the ledger network.
    pub api_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_values(
            env::var(CONTRACT_ADDRESS_ENV).ok(),
            env::var(PRIVATE_KEY_ENV).ok(),
            env::var(API_URL_ENV).ok(),
        )
    }

    fn from_values(
        contract_address: Option<String>,
        private_key: Option<String>,
        api_url: Option<String>,
    ) -> Result<Self, ConfigError> {
        let contract_address = require(contract_address, CONTRACT_ADDRESS_ENV)?;
        let private_key = require(private_key, PRIVATE_KEY_ENV)?;
        let api_url = require(api_url, API_URL_ENV)?;
        let signing_key = parse_signing_key(&private_key)?;
        Ok(Self { contract_address, signing_key, api_url })
    }
}

fn require(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    value.filter(|v| !v.trim().is_empty()).ok_or(ConfigError::Missing(name))
}

fn parse_signing_key(hex_key: &str) -> Result<Keypair, ConfigError> {
    let bytes = hex::decode(hex_key.trim()).map_err(|e| ConfigError::InvalidKey(e.to_string()))?;
    let secret = SecretKey::from_slice(&bytes).map_err(|e| ConfigError::InvalidKey(e.to_string()))?;
    Ok(Keypair::from_secret_key(&Secp256k1::new(), &secret))
}
