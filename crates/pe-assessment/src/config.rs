//! # Assessment Configuration
//!
//! Confirmation depth, collaborator deadline and the per-network deployment
//! table used to resolve the contract binding.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PE_DEPLOYMENTS_FILE` | unset | JSON deployment table |
//! | `PE_CONTRACT_ADDRESS` | unset | Fallback address for unlisted networks |
//! | `PE_CONFIRMATIONS` | `1` | Confirmation depth awaited after submit |
//! | `PE_COLLABORATOR_TIMEOUT_SECS` | `120` | Deadline per collaborator call |

use std::collections::BTreeMap;
use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{AddressParseError, ChainId, ContractAddress};

/// Name under which the assessment contract is listed per network.
pub const CONTRACT_NAME: &str = "PsychoEvaluate";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Deployment file unreadable.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File path
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Deployment table malformed.
    #[error("Invalid deployment table: {0}")]
    Parse(#[from] serde_json::Error),

    /// Chain id key is not a number.
    #[error("Invalid chain id key: {0}")]
    ChainId(String),

    /// Address value malformed.
    #[error("Invalid address for {key}: {source}")]
    Address {
        /// Offending variable or key
        key: String,
        /// Underlying error
        #[source]
        source: AddressParseError,
    },

    /// Numeric variable malformed.
    #[error("Invalid value for {key}: {value}")]
    Number {
        /// Offending variable
        key: String,
        /// Value found
        value: String,
    },
}

/// Contract addresses per network.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRegistry {
    /// chain id -> contract name -> address.
    pub networks: BTreeMap<u64, BTreeMap<String, ContractAddress>>,
    /// Used for networks missing from the table.
    pub fallback: Option<ContractAddress>,
}

impl DeploymentRegistry {
    /// Parse the generated address table, `{"31337": {"PsychoEvaluate": "0x.."}}`.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: BTreeMap<String, BTreeMap<String, ContractAddress>> = serde_json::from_str(json)?;
        let mut networks = BTreeMap::new();
        for (key, contracts) in raw {
            let chain = key
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::ChainId(key.clone()))?;
            networks.insert(chain, contracts);
        }
        Ok(Self {
            networks,
            fallback: None,
        })
    }

    /// Load the address table from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Register a deployment.
    pub fn with_deployment(mut self, chain: ChainId, address: ContractAddress) -> Self {
        self.networks
            .entry(chain.0)
            .or_default()
            .insert(CONTRACT_NAME.to_string(), address);
        self
    }

    /// Set the fallback address.
    pub fn with_fallback(mut self, address: ContractAddress) -> Self {
        self.fallback = Some(address);
        self
    }

    /// Contract bound on `chain`, if deployed. The zero address counts as
    /// not deployed.
    pub fn resolve(&self, chain: ChainId) -> Option<ContractAddress> {
        let listed = self
            .networks
            .get(&chain.0)
            .and_then(|contracts| contracts.get(CONTRACT_NAME))
            .copied();
        listed
            .or(self.fallback)
            .filter(|address| !address.is_zero())
    }
}

/// Orchestrator configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssessmentConfig {
    /// Confirmation depth awaited after a submit.
    pub required_confirmations: u32,

    /// Deadline applied at the collaborator boundary, in seconds.
    pub collaborator_timeout_secs: u64,

    /// Contract address per network.
    pub deployments: DeploymentRegistry,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            required_confirmations: 1,
            collaborator_timeout_secs: 120,
            deployments: DeploymentRegistry::default(),
        }
    }
}

impl AssessmentConfig {
    /// Create a config for testing (short deadline, no deployments).
    pub fn for_testing() -> Self {
        Self {
            required_confirmations: 1,
            collaborator_timeout_secs: 5,
            deployments: DeploymentRegistry::default(),
        }
    }

    /// Load from environment variables, starting from defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = env::var("PE_DEPLOYMENTS_FILE") {
            config.deployments = DeploymentRegistry::load(&path)?;
        }
        if let Ok(value) = env::var("PE_CONTRACT_ADDRESS") {
            let address = value.parse().map_err(|source| ConfigError::Address {
                key: "PE_CONTRACT_ADDRESS".to_string(),
                source,
            })?;
            config.deployments.fallback = Some(address);
        }
        if let Ok(value) = env::var("PE_CONFIRMATIONS") {
            config.required_confirmations = parse_number("PE_CONFIRMATIONS", &value)?;
        }
        if let Ok(value) = env::var("PE_COLLABORATOR_TIMEOUT_SECS") {
            config.collaborator_timeout_secs = parse_number("PE_COLLABORATOR_TIMEOUT_SECS", &value)?;
        }

        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Number {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const LOCAL: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";

    #[test]
    fn test_default_config() {
        let config = AssessmentConfig::default();
        assert_eq!(config.required_confirmations, 1);
        assert_eq!(config.collaborator_timeout_secs, 120);
        assert!(config.deployments.networks.is_empty());
    }

    #[test]
    fn test_testing_config() {
        let config = AssessmentConfig::for_testing();
        assert_eq!(config.collaborator_timeout_secs, 5);
    }

    #[test]
    fn test_registry_from_generated_table() {
        let json = format!(r#"{{"31337": {{"PsychoEvaluate": "{LOCAL}"}}}}"#);
        let registry = DeploymentRegistry::from_json(&json).unwrap();
        assert_eq!(
            registry.resolve(ChainId(31337)),
            Some(LOCAL.parse().unwrap())
        );
        assert_eq!(registry.resolve(ChainId(11155111)), None);
    }

    #[test]
    fn test_registry_zero_address_is_not_deployed() {
        let registry =
            DeploymentRegistry::default().with_deployment(ChainId(1), ContractAddress::ZERO);
        assert_eq!(registry.resolve(ChainId(1)), None);
    }

    #[test]
    fn test_registry_fallback() {
        let fallback: ContractAddress = LOCAL.parse().unwrap();
        let registry = DeploymentRegistry::default().with_fallback(fallback);
        assert_eq!(registry.resolve(ChainId(5)), Some(fallback));
    }

    #[test]
    fn test_registry_bad_chain_key() {
        let json = format!(r#"{{"local": {{"PsychoEvaluate": "{LOCAL}"}}}}"#);
        assert!(matches!(
            DeploymentRegistry::from_json(&json),
            Err(ConfigError::ChainId(_))
        ));
    }

    #[test]
    fn test_registry_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"11155111": {{"PsychoEvaluate": "{LOCAL}"}}}}"#).unwrap();
        let registry = DeploymentRegistry::load(file.path()).unwrap();
        assert!(registry.resolve(ChainId(11155111)).is_some());
    }
}
