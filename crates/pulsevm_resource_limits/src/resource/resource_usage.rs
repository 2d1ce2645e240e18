use pulsevm_chainbase::ChainbaseObject;
use pulsevm_name::Name;
use pulsevm_proc_macros::{NumBytes, Read, Write};

use crate::utils::UsageAccumulator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Read, Write, NumBytes)]
pub struct ResourceUsage {
    pub owner: Name,

    pub net_usage: UsageAccumulator,
    pub cpu_usage: UsageAccumulator,

    pub ram_usage: u64,
}

impl ChainbaseObject for ResourceUsage {
    type PrimaryKey = Name;

    fn primary_key(&self) -> Vec<u8> {
        ResourceUsage::primary_key_to_bytes(self.owner)
    }

    fn primary_key_to_bytes(key: Self::PrimaryKey) -> Vec<u8> {
        key.to_key_bytes()
    }

    fn table_name() -> &'static str {
        "resource_usage"
    }
}
