use core::str;

use pulsevm_error::ChainError;
use serde::{Deserialize, Serialize};

use crate::{
    config::{
        ACCOUNT_CPU_USAGE_AVERAGE_WINDOW_MS, ACCOUNT_NET_USAGE_AVERAGE_WINDOW_MS,
        BLOCK_CPU_USAGE_AVERAGE_WINDOW_MS, BLOCK_INTERVAL_MS, BLOCK_SIZE_AVERAGE_WINDOW_MS,
        DEFAULT_BASE_PER_TRANSACTION_CPU_USAGE, DEFAULT_BASE_PER_TRANSACTION_NET_USAGE,
        DEFAULT_MAX_BLOCK_CPU_USAGE, DEFAULT_MAX_BLOCK_NET_USAGE, DEFAULT_PER_SIGNATURE_CPU_USAGE,
        DEFAULT_TARGET_BLOCK_CPU_USAGE_PCT, DEFAULT_TARGET_BLOCK_NET_USAGE_PCT,
        MAXIMUM_ELASTIC_RESOURCE_MULTIPLIER,
    },
    utils::pulse_assert,
};

/// Chain level resource settings, as shipped in a genesis or configuration
/// change JSON document. Missing fields fall back to the compiled defaults.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(default)]
pub struct ChainConfig {
    pub max_block_net_usage: u64,
    pub target_block_net_usage_pct: u32,
    pub base_per_transaction_net_usage: u32,

    pub max_block_cpu_usage: u64,
    pub target_block_cpu_usage_pct: u32,
    pub base_per_transaction_cpu_usage: u32,
    pub per_signature_cpu_usage: u32,

    pub block_interval_ms: u32,
    pub block_size_average_window_ms: u32,
    pub block_cpu_usage_average_window_ms: u32,
    pub account_net_usage_average_window_ms: u32,
    pub account_cpu_usage_average_window_ms: u32,
    pub max_elastic_resource_multiplier: u32,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            max_block_net_usage: DEFAULT_MAX_BLOCK_NET_USAGE,
            target_block_net_usage_pct: DEFAULT_TARGET_BLOCK_NET_USAGE_PCT,
            base_per_transaction_net_usage: DEFAULT_BASE_PER_TRANSACTION_NET_USAGE,
            max_block_cpu_usage: DEFAULT_MAX_BLOCK_CPU_USAGE,
            target_block_cpu_usage_pct: DEFAULT_TARGET_BLOCK_CPU_USAGE_PCT,
            base_per_transaction_cpu_usage: DEFAULT_BASE_PER_TRANSACTION_CPU_USAGE,
            per_signature_cpu_usage: DEFAULT_PER_SIGNATURE_CPU_USAGE,
            block_interval_ms: BLOCK_INTERVAL_MS,
            block_size_average_window_ms: BLOCK_SIZE_AVERAGE_WINDOW_MS,
            block_cpu_usage_average_window_ms: BLOCK_CPU_USAGE_AVERAGE_WINDOW_MS,
            account_net_usage_average_window_ms: ACCOUNT_NET_USAGE_AVERAGE_WINDOW_MS,
            account_cpu_usage_average_window_ms: ACCOUNT_CPU_USAGE_AVERAGE_WINDOW_MS,
            max_elastic_resource_multiplier: MAXIMUM_ELASTIC_RESOURCE_MULTIPLIER,
        }
    }
}

impl ChainConfig {
    pub fn parse(bytes: &[u8]) -> Result<Self, ChainError> {
        let config = str::from_utf8(bytes)
            .map_err(|_| ChainError::ParseError("invalid UTF-8".to_string()))?;
        serde_json::from_str(config).map_err(|e| ChainError::ParseError(format!("{}", e)))
    }

    /// Number of blocks covered by a window given in milliseconds.
    pub fn blocks_in(&self, window_ms: u32) -> Result<u32, ChainError> {
        pulse_assert(
            self.block_interval_ms > 0,
            ChainError::InvalidConfiguration("block interval cannot be zero".to_string()),
        )?;
        let blocks = window_ms / self.block_interval_ms;
        pulse_assert(
            blocks > 0,
            ChainError::InvalidConfiguration(format!(
                "averaging window of {}ms is shorter than one block interval",
                window_ms
            )),
        )?;
        Ok(blocks)
    }
}
