use pulsevm_chainbase::ChainbaseObject;
use pulsevm_name::Name;
use pulsevm_proc_macros::{NumBytes, Read, Write};

use super::ResourceWeight;

/// Stake-derived entitlements of one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Read, Write, NumBytes)]
pub struct ResourceLimits {
    pub owner: Name,
    pub net_weight: ResourceWeight,
    pub cpu_weight: ResourceWeight,
    pub ram_bytes: ResourceWeight,
}

impl ResourceLimits {
    pub fn new(
        owner: Name,
        net_weight: ResourceWeight,
        cpu_weight: ResourceWeight,
        ram_bytes: ResourceWeight,
    ) -> Self {
        ResourceLimits {
            owner,
            net_weight,
            cpu_weight,
            ram_bytes,
        }
    }

    pub fn unlimited(owner: Name) -> Self {
        ResourceLimits::new(
            owner,
            ResourceWeight::Unset,
            ResourceWeight::Unset,
            ResourceWeight::Unset,
        )
    }

    pub fn same_limits(&self, other: &ResourceLimits) -> bool {
        self.net_weight == other.net_weight
            && self.cpu_weight == other.cpu_weight
            && self.ram_bytes == other.ram_bytes
    }
}

impl ChainbaseObject for ResourceLimits {
    type PrimaryKey = Name;

    fn primary_key(&self) -> Vec<u8> {
        ResourceLimits::primary_key_to_bytes(self.owner)
    }

    fn primary_key_to_bytes(key: Self::PrimaryKey) -> Vec<u8> {
        key.to_key_bytes()
    }

    fn table_name() -> &'static str {
        "resource_limits"
    }
}

/// Staged limits that take effect at the next `process_account_limit_updates`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Read, Write, NumBytes)]
pub struct PendingResourceLimits(pub ResourceLimits);

impl ChainbaseObject for PendingResourceLimits {
    type PrimaryKey = Name;

    fn primary_key(&self) -> Vec<u8> {
        PendingResourceLimits::primary_key_to_bytes(self.0.owner)
    }

    fn primary_key_to_bytes(key: Self::PrimaryKey) -> Vec<u8> {
        key.to_key_bytes()
    }

    fn table_name() -> &'static str {
        "resource_limits_pending"
    }
}
