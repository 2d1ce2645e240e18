use serde::Serialize;

/// Windowed usage and entitlement of one account for CPU or NET.
/// `available` and `max` are `None` when the account is unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AccountResourceLimit {
    /// Usage averaged over the account window, as last recorded.
    pub used: u64,
    pub available: Option<u64>,
    pub max: Option<u64>,
    pub last_usage_update_ordinal: u32,
    /// `used` decayed to the ordinal the query was made at.
    pub current_used: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AccountRamLimit {
    pub used: u64,
    /// `None` when the account has no RAM quota.
    pub max: Option<u64>,
}
