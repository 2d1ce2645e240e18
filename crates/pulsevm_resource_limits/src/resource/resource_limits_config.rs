use pulsevm_chainbase::ChainbaseObject;
use pulsevm_error::ChainError;
use pulsevm_proc_macros::{NumBytes, Read, Write};
use serde::{Deserialize, Serialize};

use crate::{
    config::{
        ACCOUNT_CPU_USAGE_AVERAGE_WINDOW_MS, ACCOUNT_NET_USAGE_AVERAGE_WINDOW_MS,
        BLOCK_CPU_USAGE_AVERAGE_WINDOW_MS, BLOCK_INTERVAL_MS, BLOCK_SIZE_AVERAGE_WINDOW_MS,
        ChainConfig, DEFAULT_BASE_PER_TRANSACTION_CPU_USAGE,
        DEFAULT_BASE_PER_TRANSACTION_NET_USAGE, DEFAULT_CONTRACT_RATE, DEFAULT_EXPAND_RATE,
        DEFAULT_MAX_BLOCK_CPU_USAGE, DEFAULT_MAX_BLOCK_NET_USAGE, DEFAULT_PER_SIGNATURE_CPU_USAGE,
        DEFAULT_TARGET_BLOCK_CPU_USAGE_PCT, DEFAULT_TARGET_BLOCK_NET_USAGE_PCT,
        MAXIMUM_ELASTIC_RESOURCE_MULTIPLIER, PERCENT_100, pulse_percent,
    },
    resource::ElasticLimitParameters,
    utils::{make_ratio, pulse_assert},
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Read, Write, NumBytes, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimitsConfig {
    pub base_per_transaction_net_usage: u32,
    pub base_per_transaction_cpu_usage: u32,
    pub per_signature_cpu_usage: u32,

    pub cpu_limit_parameters: ElasticLimitParameters,
    pub net_limit_parameters: ElasticLimitParameters,

    pub account_cpu_usage_average_window: u32,
    pub account_net_usage_average_window: u32,
}

impl Default for ResourceLimitsConfig {
    fn default() -> Self {
        ResourceLimitsConfig {
            base_per_transaction_net_usage: DEFAULT_BASE_PER_TRANSACTION_NET_USAGE,
            base_per_transaction_cpu_usage: DEFAULT_BASE_PER_TRANSACTION_CPU_USAGE,
            per_signature_cpu_usage: DEFAULT_PER_SIGNATURE_CPU_USAGE,
            cpu_limit_parameters: ElasticLimitParameters {
                target: pulse_percent(
                    DEFAULT_MAX_BLOCK_CPU_USAGE,
                    DEFAULT_TARGET_BLOCK_CPU_USAGE_PCT,
                ),
                max: DEFAULT_MAX_BLOCK_CPU_USAGE,
                periods: BLOCK_CPU_USAGE_AVERAGE_WINDOW_MS / BLOCK_INTERVAL_MS,
                max_multiplier: MAXIMUM_ELASTIC_RESOURCE_MULTIPLIER,
                contract_rate: make_ratio(DEFAULT_CONTRACT_RATE.0, DEFAULT_CONTRACT_RATE.1),
                expand_rate: make_ratio(DEFAULT_EXPAND_RATE.0, DEFAULT_EXPAND_RATE.1),
            },
            net_limit_parameters: ElasticLimitParameters {
                target: pulse_percent(
                    DEFAULT_MAX_BLOCK_NET_USAGE,
                    DEFAULT_TARGET_BLOCK_NET_USAGE_PCT,
                ),
                max: DEFAULT_MAX_BLOCK_NET_USAGE,
                periods: BLOCK_SIZE_AVERAGE_WINDOW_MS / BLOCK_INTERVAL_MS,
                max_multiplier: MAXIMUM_ELASTIC_RESOURCE_MULTIPLIER,
                contract_rate: make_ratio(DEFAULT_CONTRACT_RATE.0, DEFAULT_CONTRACT_RATE.1),
                expand_rate: make_ratio(DEFAULT_EXPAND_RATE.0, DEFAULT_EXPAND_RATE.1),
            },
            account_cpu_usage_average_window: ACCOUNT_CPU_USAGE_AVERAGE_WINDOW_MS
                / BLOCK_INTERVAL_MS,
            account_net_usage_average_window: ACCOUNT_NET_USAGE_AVERAGE_WINDOW_MS
                / BLOCK_INTERVAL_MS,
        }
    }
}

impl ResourceLimitsConfig {
    pub fn from_chain_config(chain: &ChainConfig) -> Result<Self, ChainError> {
        pulse_assert(
            chain.target_block_cpu_usage_pct <= PERCENT_100
                && chain.target_block_net_usage_pct <= PERCENT_100,
            ChainError::InvalidConfiguration(
                "target block usage cannot exceed 100%".to_owned(),
            ),
        )?;
        let config = ResourceLimitsConfig {
            base_per_transaction_net_usage: chain.base_per_transaction_net_usage,
            base_per_transaction_cpu_usage: chain.base_per_transaction_cpu_usage,
            per_signature_cpu_usage: chain.per_signature_cpu_usage,
            cpu_limit_parameters: ElasticLimitParameters {
                target: pulse_percent(chain.max_block_cpu_usage, chain.target_block_cpu_usage_pct),
                max: chain.max_block_cpu_usage,
                periods: chain.blocks_in(chain.block_cpu_usage_average_window_ms)?,
                max_multiplier: chain.max_elastic_resource_multiplier,
                contract_rate: make_ratio(DEFAULT_CONTRACT_RATE.0, DEFAULT_CONTRACT_RATE.1),
                expand_rate: make_ratio(DEFAULT_EXPAND_RATE.0, DEFAULT_EXPAND_RATE.1),
            },
            net_limit_parameters: ElasticLimitParameters {
                target: pulse_percent(chain.max_block_net_usage, chain.target_block_net_usage_pct),
                max: chain.max_block_net_usage,
                periods: chain.blocks_in(chain.block_size_average_window_ms)?,
                max_multiplier: chain.max_elastic_resource_multiplier,
                contract_rate: make_ratio(DEFAULT_CONTRACT_RATE.0, DEFAULT_CONTRACT_RATE.1),
                expand_rate: make_ratio(DEFAULT_EXPAND_RATE.0, DEFAULT_EXPAND_RATE.1),
            },
            account_cpu_usage_average_window: chain
                .blocks_in(chain.account_cpu_usage_average_window_ms)?,
            account_net_usage_average_window: chain
                .blocks_in(chain.account_net_usage_average_window_ms)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ChainError> {
        self.cpu_limit_parameters.validate()?;
        self.net_limit_parameters.validate()?;
        pulse_assert(
            self.account_cpu_usage_average_window > 0,
            ChainError::InvalidConfiguration(
                "account cpu usage average window cannot be zero".to_owned(),
            ),
        )?;
        pulse_assert(
            self.account_net_usage_average_window > 0,
            ChainError::InvalidConfiguration(
                "account net usage average window cannot be zero".to_owned(),
            ),
        )?;
        Ok(())
    }

    /// Adds the fixed per-transaction overhead to measured usage, returning
    /// `(net, cpu)`.
    pub fn bill_transaction(
        &self,
        net_usage: u64,
        cpu_usage: u64,
        signatures: u32,
    ) -> Result<(u64, u64), ChainError> {
        let overflow = || ChainError::AccountingOverflow("transaction billing".to_owned());
        let net = net_usage
            .checked_add(u64::from(self.base_per_transaction_net_usage))
            .ok_or_else(overflow)?;
        let cpu = u64::from(self.per_signature_cpu_usage)
            .checked_mul(u64::from(signatures))
            .and_then(|sig| sig.checked_add(u64::from(self.base_per_transaction_cpu_usage)))
            .and_then(|base| base.checked_add(cpu_usage))
            .ok_or_else(overflow)?;
        Ok((net, cpu))
    }
}

impl ChainbaseObject for ResourceLimitsConfig {
    type PrimaryKey = u64;

    fn primary_key(&self) -> Vec<u8> {
        ResourceLimitsConfig::primary_key_to_bytes(0)
    }

    fn primary_key_to_bytes(key: Self::PrimaryKey) -> Vec<u8> {
        key.to_be_bytes().to_vec()
    }

    fn table_name() -> &'static str {
        "resource_limits_config"
    }
}
