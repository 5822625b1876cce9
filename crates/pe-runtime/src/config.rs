//! Runtime configuration.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PE_CHAIN_ID` | `31337` | Network to connect to |
//! | `PE_ACCOUNT` | local dev account | Signer account |
//! | `PE_ANSWERS` | all `3` | Comma-separated answers |
//! | `PE_BLOCK_TIME_MS` | `0` | Simulated block time |
//!
//! plus everything `AssessmentConfig::from_env` and
//! `TelemetryConfig::from_env` read.

use std::env;
use std::time::Duration;

use pe_assessment::{AccountAddress, AssessmentConfig, ChainId, ContractAddress};
use pe_telemetry::TelemetryConfig;

use crate::questionnaire::{default_answers, parse_answers};
use crate::RuntimeError;

/// Local development chain.
pub const LOCAL_CHAIN_ID: ChainId = ChainId(31337);

/// First account of the local development node.
pub const LOCAL_ACCOUNT: AccountAddress = AccountAddress([
    0xf3, 0x9f, 0xd6, 0xe5, 0x1a, 0xad, 0x88, 0xf6, 0xf4, 0xce, 0x6a, 0xb8, 0x82, 0x72, 0x79, 0xcf,
    0xff, 0xb9, 0x22, 0x66,
]);

/// First contract deployed on a fresh local development node.
pub const LOCAL_CONTRACT: ContractAddress = ContractAddress([
    0x5f, 0xbd, 0xb2, 0x31, 0x56, 0x78, 0xaf, 0xec, 0xb3, 0x67, 0xf0, 0x32, 0xd9, 0x3f, 0x64, 0x2f,
    0x64, 0x18, 0x0a, 0xa3,
]);

/// Everything the runtime needs.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Orchestrator configuration.
    pub assessment: AssessmentConfig,
    /// Logging and metrics configuration.
    pub telemetry: TelemetryConfig,
    /// Network to connect to.
    pub chain_id: ChainId,
    /// Signer account.
    pub account: AccountAddress,
    /// Answers to submit.
    pub answers: Vec<u32>,
    /// Simulated ledger block time.
    pub block_time: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            assessment: local_assessment_config(AssessmentConfig::default()),
            telemetry: TelemetryConfig::default(),
            chain_id: LOCAL_CHAIN_ID,
            account: LOCAL_ACCOUNT,
            answers: default_answers(),
            block_time: Duration::ZERO,
        }
    }
}

/// Register the local deployment unless a table or fallback was configured.
fn local_assessment_config(mut config: AssessmentConfig) -> AssessmentConfig {
    if config.deployments.networks.is_empty() && config.deployments.fallback.is_none() {
        config.deployments = config
            .deployments
            .with_deployment(LOCAL_CHAIN_ID, LOCAL_CONTRACT);
    }
    config
}

/// Load configuration from the environment.
pub fn load_config() -> Result<RuntimeConfig, RuntimeError> {
    let mut config = RuntimeConfig {
        assessment: local_assessment_config(AssessmentConfig::from_env()?),
        telemetry: TelemetryConfig::from_env(),
        ..RuntimeConfig::default()
    };

    if let Ok(value) = env::var("PE_CHAIN_ID") {
        let id = value
            .trim()
            .parse()
            .map_err(|_| RuntimeError::Config(format!("PE_CHAIN_ID: {value:?}")))?;
        config.chain_id = ChainId(id);
    }
    if let Ok(value) = env::var("PE_ACCOUNT") {
        config.account = value
            .parse()
            .map_err(|e| RuntimeError::Config(format!("PE_ACCOUNT: {e}")))?;
    }
    if let Ok(value) = env::var("PE_ANSWERS") {
        config.answers = parse_answers(&value)?;
    }
    if let Ok(value) = env::var("PE_BLOCK_TIME_MS") {
        let ms = value
            .trim()
            .parse()
            .map_err(|_| RuntimeError::Config(format!("PE_BLOCK_TIME_MS: {value:?}")))?;
        config.block_time = Duration::from_millis(ms);
    }

    Ok(config)
}
