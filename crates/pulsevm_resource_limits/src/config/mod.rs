mod chain_config;
pub use chain_config::ChainConfig;

pub const RATE_LIMITING_PRECISION: u64 = 1000 * 1000;

pub const BLOCK_INTERVAL_MS: u32 = 500;

pub const PERCENT_100: u32 = 10000; // basis points
pub const PERCENT_1: u32 = 100;

pub const ACCOUNT_CPU_USAGE_AVERAGE_WINDOW_MS: u32 = 24 * 60 * 60 * 1000;
pub const ACCOUNT_NET_USAGE_AVERAGE_WINDOW_MS: u32 = 24 * 60 * 60 * 1000;
pub const BLOCK_CPU_USAGE_AVERAGE_WINDOW_MS: u32 = 60 * 1000;
pub const BLOCK_SIZE_AVERAGE_WINDOW_MS: u32 = 60 * 1000;
pub const MAXIMUM_ELASTIC_RESOURCE_MULTIPLIER: u32 = 1000;

pub const DEFAULT_MAX_BLOCK_NET_USAGE: u64 = 1024 * 1024;
pub const DEFAULT_TARGET_BLOCK_NET_USAGE_PCT: u32 = 10 * PERCENT_1; // 10%
// 11 bytes for worst case of transaction_receipt_header + 1 byte for static_variant tag
pub const DEFAULT_BASE_PER_TRANSACTION_NET_USAGE: u32 = 12;

pub const DEFAULT_MAX_BLOCK_CPU_USAGE: u64 = 200_000;
pub const DEFAULT_TARGET_BLOCK_CPU_USAGE_PCT: u32 = 10 * PERCENT_1; // 10%
pub const DEFAULT_BASE_PER_TRANSACTION_CPU_USAGE: u32 = 512;
pub const DEFAULT_PER_SIGNATURE_CPU_USAGE: u32 = 100;

pub const DEFAULT_CONTRACT_RATE: (u64, u64) = (99, 100);
pub const DEFAULT_EXPAND_RATE: (u64, u64) = (1000, 999);

/// `percentage` is in basis points.
pub const fn pulse_percent(value: u64, percentage: u32) -> u64 {
    ((value as u128 * percentage as u128) / PERCENT_100 as u128) as u64
}
