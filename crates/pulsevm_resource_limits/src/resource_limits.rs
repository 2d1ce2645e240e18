use std::collections::BTreeSet;

use pulsevm_chainbase::{ChainbaseObject, Database};
use pulsevm_error::{ChainError, Resource};
use pulsevm_name::Name;
use spdlog::{debug, info, warn};

use crate::{
    config::RATE_LIMITING_PRECISION,
    resource::{
        AccountRamLimit, AccountResourceLimit, ElasticLimitParameters, PendingResourceLimits,
        ResourceLimits, ResourceLimitsConfig, ResourceLimitsState, ResourceUsage, ResourceWeight,
    },
    utils::{UsageAccumulator, integer_divide_ceil, pulse_assert},
};

/// Applies usage and stake changes to the resource tables of a [`Database`].
///
/// The manager keeps no chain state of its own. It only remembers which
/// block is open so that `begin_block`/`end_block` can enforce their order,
/// which block last had its staged limits committed, and the head ordinal
/// that usage queries are projected to.
#[derive(Debug, Default)]
pub struct ResourceLimitsManager {
    open_block: Option<u32>,
    head_ordinal: Option<u32>,
    limits_processed_in: Option<u32>,
}

/// One of the two stake-weighted resources seen through an account window.
struct WindowedResource {
    weight: ResourceWeight,
    total_weight: u64,
    virtual_limit: u64,
    block_max: u64,
    window: u32,
    usage: UsageAccumulator,
}

impl WindowedResource {
    fn cpu(
        config: &ResourceLimitsConfig,
        state: &ResourceLimitsState,
        limits: &ResourceLimits,
        usage: &ResourceUsage,
    ) -> Self {
        WindowedResource {
            weight: limits.cpu_weight,
            total_weight: state.total_cpu_weight,
            virtual_limit: state.virtual_cpu_limit,
            block_max: config.cpu_limit_parameters.max,
            window: config.account_cpu_usage_average_window,
            usage: usage.cpu_usage,
        }
    }

    fn net(
        config: &ResourceLimitsConfig,
        state: &ResourceLimitsState,
        limits: &ResourceLimits,
        usage: &ResourceUsage,
    ) -> Self {
        WindowedResource {
            weight: limits.net_weight,
            total_weight: state.total_net_weight,
            virtual_limit: state.virtual_net_limit,
            block_max: config.net_limit_parameters.max,
            window: config.account_net_usage_average_window,
            usage: usage.net_usage,
        }
    }

    /// Entitlement over one account window, `None` when unlimited. Without
    /// any stake in the system the raw weight is the cap.
    fn max_in_window(&self, greylist_limit: Option<u32>) -> Result<Option<u128>, ChainError> {
        let ResourceWeight::Weighted(weight) = self.weight else {
            return Ok(None);
        };
        if self.total_weight == 0 {
            return Ok(Some(u128::from(weight)));
        }
        let virtual_limit = match greylist_limit {
            Some(multiplier) => self
                .virtual_limit
                .min(self.block_max.saturating_mul(u64::from(multiplier))),
            None => self.virtual_limit,
        };
        let capacity = u128::from(virtual_limit)
            .checked_mul(u128::from(self.window))
            .and_then(|capacity| capacity.checked_mul(u128::from(weight)))
            .ok_or_else(|| {
                ChainError::AccountingOverflow("account capacity in window".to_owned())
            })?;
        Ok(Some(capacity / u128::from(self.total_weight)))
    }

    fn used_in_window(&self, value_ex: u64) -> u128 {
        u128::from(value_ex) * u128::from(self.window) / u128::from(RATE_LIMITING_PRECISION)
    }

    fn used_in_window_ceil(&self, value_ex: u64) -> u128 {
        integer_divide_ceil(
            u128::from(value_ex) * u128::from(self.window),
            u128::from(RATE_LIMITING_PRECISION),
        )
    }

    fn verify(&self, resource: Resource, owner: Name) -> Result<(), ChainError> {
        let Some(max_in_window) = self.max_in_window(None)? else {
            return Ok(());
        };
        pulse_assert(
            self.used_in_window(self.usage.value_ex) <= max_in_window,
            ChainError::ResourceExceeded { resource, owner },
        )
    }

    fn limit(
        &self,
        greylist_limit: Option<u32>,
        head_ordinal: u32,
    ) -> Result<AccountResourceLimit, ChainError> {
        let max = self.max_in_window(greylist_limit)?.map(downcast).transpose()?;
        let used = downcast(self.used_in_window_ceil(self.usage.value_ex))?;
        let current_value_ex = self.usage.value_ex_at(head_ordinal, self.window)?;
        let current_used = downcast(self.used_in_window_ceil(current_value_ex))?;
        Ok(AccountResourceLimit {
            used,
            available: max.map(|max| max.saturating_sub(used)),
            max,
            last_usage_update_ordinal: self.usage.last_ordinal,
            current_used,
        })
    }
}

fn downcast(value: u128) -> Result<u64, ChainError> {
    u64::try_from(value)
        .map_err(|_| ChainError::AccountingOverflow(format!("{} does not fit in 64 bits", value)))
}

fn adjust_total(total: u64, old: ResourceWeight, new: ResourceWeight) -> Result<u64, ChainError> {
    total
        .checked_sub(old.weight())
        .and_then(|total| total.checked_add(new.weight()))
        .ok_or_else(|| ChainError::AccountingOverflow("resource weight total".to_owned()))
}

impl ResourceLimitsManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ordinal of the most recently started block, if any.
    pub fn head_ordinal(&self) -> Option<u32> {
        self.head_ordinal
    }

    pub fn initialize_database(
        &self,
        db: &mut Database,
        config: &ResourceLimitsConfig,
    ) -> Result<(), ChainError> {
        config.validate()?;
        pulse_assert(
            !db.exists::<ResourceLimitsConfig>(0) && !db.exists::<ResourceLimitsState>(0),
            ChainError::DatabaseError("resource limits are already initialized".to_owned()),
        )?;
        let state = ResourceLimitsState {
            virtual_cpu_limit: config.cpu_limit_parameters.max,
            virtual_net_limit: config.net_limit_parameters.max,
            ..Default::default()
        };
        db.insert(config)?;
        db.insert(&state)?;
        info!(
            "initialized resource limits: virtual cpu {} virtual net {}",
            state.virtual_cpu_limit, state.virtual_net_limit
        );
        Ok(())
    }

    pub fn get_config(db: &Database) -> Result<ResourceLimitsConfig, ChainError> {
        db.find::<ResourceLimitsConfig>(0)?
            .ok_or(ChainError::MissingSingleton(ResourceLimitsConfig::table_name()))
    }

    pub fn get_state(db: &Database) -> Result<ResourceLimitsState, ChainError> {
        db.find::<ResourceLimitsState>(0)?
            .ok_or(ChainError::MissingSingleton(ResourceLimitsState::table_name()))
    }

    fn committed_limits(db: &Database, owner: Name) -> Result<ResourceLimits, ChainError> {
        db.find::<ResourceLimits>(owner)?
            .ok_or(ChainError::UnknownAccount(owner))
    }

    fn usage(db: &Database, owner: Name) -> Result<ResourceUsage, ChainError> {
        db.find::<ResourceUsage>(owner)?
            .ok_or(ChainError::UnknownAccount(owner))
    }

    /// Limits as most recently set, staged or not.
    fn effective_limits(db: &Database, owner: Name) -> Result<ResourceLimits, ChainError> {
        match db.find::<PendingResourceLimits>(owner)? {
            Some(pending) => Ok(pending.0),
            None => Self::committed_limits(db, owner),
        }
    }

    pub fn initialize_account(&self, db: &mut Database, owner: Name) -> Result<(), ChainError> {
        pulse_assert(
            !owner.empty(),
            ChainError::InvalidArgument("account name is empty".to_owned()),
        )?;
        pulse_assert(
            !db.exists::<ResourceLimits>(owner) && !db.exists::<ResourceUsage>(owner),
            ChainError::AccountAlreadyExists(owner),
        )?;
        db.insert(&ResourceLimits::unlimited(owner))?;
        db.insert(&ResourceUsage {
            owner,
            ..Default::default()
        })?;
        Ok(())
    }

    /// Stages new limits for `owner`; they are enforced from the next
    /// `process_account_limit_updates`. Network totals move immediately.
    /// Returns whether anything changed.
    pub fn set_account_limits(
        &self,
        db: &mut Database,
        owner: Name,
        net_weight: ResourceWeight,
        cpu_weight: ResourceWeight,
        ram_bytes: ResourceWeight,
    ) -> Result<bool, ChainError> {
        let requested = ResourceLimits::new(
            owner,
            net_weight.checked()?,
            cpu_weight.checked()?,
            ram_bytes.checked()?,
        );
        let committed = Self::committed_limits(db, owner)?;
        let pending = db.find::<PendingResourceLimits>(owner)?;
        let current = pending.map(|row| row.0).unwrap_or(committed);
        if current.same_limits(&requested) {
            return Ok(false);
        }

        let mut state = Self::get_state(db)?;
        let total_net_weight =
            adjust_total(state.total_net_weight, current.net_weight, requested.net_weight)?;
        let total_cpu_weight =
            adjust_total(state.total_cpu_weight, current.cpu_weight, requested.cpu_weight)?;
        let total_ram_bytes =
            adjust_total(state.total_ram_bytes, current.ram_bytes, requested.ram_bytes)?;

        match pending {
            Some(mut row) => db.modify(&mut row, |row| row.0 = requested)?,
            None => db.insert(&PendingResourceLimits(requested))?,
        }
        db.modify(&mut state, |state| {
            state.total_net_weight = total_net_weight;
            state.total_cpu_weight = total_cpu_weight;
            state.total_ram_bytes = total_ram_bytes;
        })?;
        Ok(true)
    }

    /// `(ram_bytes, net_weight, cpu_weight)`, staged values included.
    pub fn get_account_limits(
        &self,
        db: &Database,
        owner: Name,
    ) -> Result<(ResourceWeight, ResourceWeight, ResourceWeight), ChainError> {
        let limits = Self::effective_limits(db, owner)?;
        Ok((limits.ram_bytes, limits.net_weight, limits.cpu_weight))
    }

    pub fn process_account_limit_updates(&mut self, db: &mut Database) -> Result<(), ChainError> {
        // Before the first block there is nothing to guard.
        if let Some(head) = self.head_ordinal {
            pulse_assert(
                self.limits_processed_in != Some(head),
                ChainError::ContractViolation(format!(
                    "account limit updates already processed in block {}",
                    head
                )),
            )?;
        }

        let pending = db.rows::<PendingResourceLimits>()?;
        for row in &pending {
            let mut committed = Self::committed_limits(db, row.0.owner)?;
            db.modify(&mut committed, |committed| *committed = row.0)?;
            db.remove(row)?;
        }
        self.limits_processed_in = self.head_ordinal;
        debug!("committed {} pending resource limit rows", pending.len());
        Ok(())
    }

    /// Folds one transaction's usage into every account in `accounts` and
    /// into the block totals. Nothing is written unless every account and
    /// the block stay within their limits.
    pub fn add_transaction_usage(
        &self,
        db: &mut Database,
        accounts: &BTreeSet<Name>,
        cpu_usage: u64,
        net_usage: u64,
        ordinal: u32,
    ) -> Result<(), ChainError> {
        let config = Self::get_config(db)?;
        let mut state = Self::get_state(db)?;

        let mut updates = Vec::with_capacity(accounts.len());
        for &owner in accounts {
            let usage = Self::usage(db, owner)?;
            let limits = Self::committed_limits(db, owner)?;

            let mut updated = usage;
            updated
                .net_usage
                .add(net_usage, ordinal, config.account_net_usage_average_window)?;
            updated
                .cpu_usage
                .add(cpu_usage, ordinal, config.account_cpu_usage_average_window)?;

            WindowedResource::cpu(&config, &state, &limits, &updated)
                .verify(Resource::Cpu, owner)
                .and_then(|_| {
                    WindowedResource::net(&config, &state, &limits, &updated)
                        .verify(Resource::Net, owner)
                })
                .inspect_err(|e| warn!("rejecting transaction usage at {}: {}", ordinal, e))?;
            updates.push((usage, updated));
        }

        let pending_cpu_usage = state.pending_cpu_usage.checked_add(cpu_usage).ok_or_else(|| {
            ChainError::AccountingOverflow("pending block cpu usage".to_owned())
        })?;
        let pending_net_usage = state.pending_net_usage.checked_add(net_usage).ok_or_else(|| {
            ChainError::AccountingOverflow("pending block net usage".to_owned())
        })?;
        pulse_assert(
            pending_cpu_usage <= state.virtual_cpu_limit,
            ChainError::BlockResourceExhausted {
                resource: Resource::Cpu,
            },
        )
        .and_then(|_| {
            pulse_assert(
                pending_net_usage <= state.virtual_net_limit,
                ChainError::BlockResourceExhausted {
                    resource: Resource::Net,
                },
            )
        })
        .inspect_err(|e| warn!("rejecting transaction usage at {}: {}", ordinal, e))?;

        for (mut row, updated) in updates {
            db.modify(&mut row, |row| *row = updated)?;
        }
        db.modify(&mut state, |state| {
            state.pending_cpu_usage = pending_cpu_usage;
            state.pending_net_usage = pending_net_usage;
        })?;
        Ok(())
    }

    /// Decays the usage of `accounts` up to `ordinal` without adding any.
    pub fn update_account_usage(
        &self,
        db: &mut Database,
        accounts: &BTreeSet<Name>,
        ordinal: u32,
    ) -> Result<(), ChainError> {
        let config = Self::get_config(db)?;
        for &owner in accounts {
            let mut usage = Self::usage(db, owner)?;
            let mut updated = usage;
            updated
                .net_usage
                .add(0, ordinal, config.account_net_usage_average_window)?;
            updated
                .cpu_usage
                .add(0, ordinal, config.account_cpu_usage_average_window)?;
            db.modify(&mut usage, |usage| *usage = updated)?;
        }
        Ok(())
    }

    pub fn add_pending_ram_usage(
        &self,
        db: &mut Database,
        owner: Name,
        ram_delta: i64,
    ) -> Result<(), ChainError> {
        if ram_delta == 0 {
            return Ok(());
        }
        let mut usage = Self::usage(db, owner)?;
        let ram_usage = if ram_delta < 0 {
            usage
                .ram_usage
                .checked_sub(ram_delta.unsigned_abs())
                .ok_or(ChainError::RamUsageUnderflow(owner))?
        } else {
            usage
                .ram_usage
                .checked_add(ram_delta.unsigned_abs())
                .ok_or_else(|| {
                    ChainError::AccountingOverflow(format!("ram usage of account {}", owner))
                })?
        };
        db.modify(&mut usage, |usage| usage.ram_usage = ram_usage)?;
        Ok(())
    }

    pub fn verify_account_ram_usage(&self, db: &Database, owner: Name) -> Result<(), ChainError> {
        let limits = Self::effective_limits(db, owner)?;
        let usage = Self::usage(db, owner)?;
        if let ResourceWeight::Weighted(quota) = limits.ram_bytes {
            if usage.ram_usage > quota {
                warn!(
                    "account {} has insufficient ram; needs {} bytes has {} bytes",
                    owner, usage.ram_usage, quota
                );
                return Err(ChainError::ResourceExceeded {
                    resource: Resource::Ram,
                    owner,
                });
            }
        }
        Ok(())
    }

    pub fn get_account_ram_usage(&self, db: &Database, owner: Name) -> Result<u64, ChainError> {
        Ok(Self::usage(db, owner)?.ram_usage)
    }

    pub fn get_account_cpu_limit(
        &self,
        db: &Database,
        owner: Name,
        greylist_limit: Option<u32>,
    ) -> Result<AccountResourceLimit, ChainError> {
        let config = Self::get_config(db)?;
        let state = Self::get_state(db)?;
        let limits = Self::committed_limits(db, owner)?;
        let usage = Self::usage(db, owner)?;
        WindowedResource::cpu(&config, &state, &limits, &usage)
            .limit(greylist_limit, self.head_ordinal.unwrap_or_default())
    }

    pub fn get_account_net_limit(
        &self,
        db: &Database,
        owner: Name,
        greylist_limit: Option<u32>,
    ) -> Result<AccountResourceLimit, ChainError> {
        let config = Self::get_config(db)?;
        let state = Self::get_state(db)?;
        let limits = Self::committed_limits(db, owner)?;
        let usage = Self::usage(db, owner)?;
        WindowedResource::net(&config, &state, &limits, &usage)
            .limit(greylist_limit, self.head_ordinal.unwrap_or_default())
    }

    pub fn get_account_ram_limit(
        &self,
        db: &Database,
        owner: Name,
    ) -> Result<AccountRamLimit, ChainError> {
        let limits = Self::effective_limits(db, owner)?;
        let usage = Self::usage(db, owner)?;
        Ok(AccountRamLimit {
            used: usage.ram_usage,
            max: match limits.ram_bytes {
                ResourceWeight::Unset => None,
                ResourceWeight::Weighted(quota) => Some(quota),
            },
        })
    }

    /// Folds the block's pending usage into the block averages and moves
    /// both virtual limits one step.
    pub fn update_virtual_limits(&self, db: &mut Database, ordinal: u32) -> Result<(), ChainError> {
        let config = Self::get_config(db)?;
        let mut state = Self::get_state(db)?;

        let mut average_block_cpu_usage = state.average_block_cpu_usage;
        average_block_cpu_usage.add(
            state.pending_cpu_usage,
            ordinal,
            config.cpu_limit_parameters.periods,
        )?;
        let virtual_cpu_limit = config
            .cpu_limit_parameters
            .update_elastic_limit(state.virtual_cpu_limit, average_block_cpu_usage.average())?;

        let mut average_block_net_usage = state.average_block_net_usage;
        average_block_net_usage.add(
            state.pending_net_usage,
            ordinal,
            config.net_limit_parameters.periods,
        )?;
        let virtual_net_limit = config
            .net_limit_parameters
            .update_elastic_limit(state.virtual_net_limit, average_block_net_usage.average())?;

        db.modify(&mut state, |state| {
            state.average_block_cpu_usage = average_block_cpu_usage;
            state.virtual_cpu_limit = virtual_cpu_limit;
            state.pending_cpu_usage = 0;
            state.average_block_net_usage = average_block_net_usage;
            state.virtual_net_limit = virtual_net_limit;
            state.pending_net_usage = 0;
        })?;
        debug!(
            "virtual limits at {}: cpu {} net {}",
            ordinal, virtual_cpu_limit, virtual_net_limit
        );
        Ok(())
    }

    pub fn set_block_parameters(
        &self,
        db: &mut Database,
        cpu_limit_parameters: ElasticLimitParameters,
        net_limit_parameters: ElasticLimitParameters,
    ) -> Result<(), ChainError> {
        cpu_limit_parameters.validate()?;
        net_limit_parameters.validate()?;
        let mut config = Self::get_config(db)?;
        info!(
            "setting block parameters: cpu {:?} net {:?}",
            cpu_limit_parameters, net_limit_parameters
        );
        db.modify(&mut config, |config| {
            config.cpu_limit_parameters = cpu_limit_parameters;
            config.net_limit_parameters = net_limit_parameters;
        })?;
        Ok(())
    }

    pub fn set_account_usage_windows(
        &self,
        db: &mut Database,
        cpu_window: u32,
        net_window: u32,
    ) -> Result<(), ChainError> {
        pulse_assert(
            cpu_window > 0 && net_window > 0,
            ChainError::InvalidConfiguration(
                "account usage average window cannot be zero".to_owned(),
            ),
        )?;
        let mut config = Self::get_config(db)?;
        info!(
            "setting account usage windows: cpu {} net {}",
            cpu_window, net_window
        );
        db.modify(&mut config, |config| {
            config.account_cpu_usage_average_window = cpu_window;
            config.account_net_usage_average_window = net_window;
        })?;
        Ok(())
    }

    pub fn begin_block(&mut self, ordinal: u32) -> Result<(), ChainError> {
        if let Some(open) = self.open_block {
            return Err(ChainError::ContractViolation(format!(
                "block {} has not ended",
                open
            )));
        }
        if let Some(head) = self.head_ordinal {
            pulse_assert(
                ordinal > head,
                ChainError::ContractViolation(format!(
                    "block {} does not follow block {}",
                    ordinal, head
                )),
            )?;
        }
        self.open_block = Some(ordinal);
        self.head_ordinal = Some(ordinal);
        Ok(())
    }

    /// Commits staged limits, if that has not happened yet, then updates the
    /// virtual limits for the block.
    pub fn end_block(&mut self, db: &mut Database) -> Result<(), ChainError> {
        let ordinal = self
            .open_block
            .ok_or_else(|| ChainError::ContractViolation("no block in progress".to_owned()))?;
        if self.limits_processed_in != Some(ordinal) {
            self.process_account_limit_updates(db)?;
        }
        self.update_virtual_limits(db, ordinal)?;
        self.open_block = None;
        Ok(())
    }

    pub fn on_transaction_net_cpu_usage(
        &self,
        db: &mut Database,
        owners: &BTreeSet<Name>,
        net_usage: u64,
        cpu_usage: u64,
        ordinal: u32,
    ) -> Result<(), ChainError> {
        if let Some(open) = self.open_block {
            pulse_assert(
                open == ordinal,
                ChainError::ContractViolation(format!(
                    "usage for ordinal {} reported during block {}",
                    ordinal, open
                )),
            )?;
        }
        self.add_transaction_usage(db, owners, cpu_usage, net_usage, ordinal)
    }

    /// Applies a RAM delta and, when it grows usage, checks the quota. The
    /// delta is discarded if the quota check fails.
    pub fn on_ram_delta(
        &self,
        db: &mut Database,
        owner: Name,
        ram_delta: i64,
    ) -> Result<(), ChainError> {
        let mut session = db.undo_session();
        self.add_pending_ram_usage(&mut session, owner, ram_delta)?;
        if ram_delta > 0 {
            self.verify_account_ram_usage(&session, owner)?;
        }
        session.commit()?;
        Ok(())
    }

    /// Runs `f` inside an undo session. Its writes are kept when it returns
    /// `Ok` and reverted when it returns `Err`.
    pub fn execute_transaction<T, F>(db: &mut Database, f: F) -> Result<T, ChainError>
    where
        F: FnOnce(&mut Database) -> Result<T, ChainError>,
    {
        let mut session = db.undo_session();
        match f(&mut *session) {
            Ok(value) => {
                session.commit()?;
                Ok(value)
            }
            Err(e) => {
                session.rollback()?;
                Err(e)
            }
        }
    }

    pub fn get_virtual_block_cpu_limit(&self, db: &Database) -> Result<u64, ChainError> {
        Ok(Self::get_state(db)?.virtual_cpu_limit)
    }

    pub fn get_virtual_block_net_limit(&self, db: &Database) -> Result<u64, ChainError> {
        Ok(Self::get_state(db)?.virtual_net_limit)
    }

    /// Room left in the current block.
    pub fn get_block_cpu_limit(&self, db: &Database) -> Result<u64, ChainError> {
        let state = Self::get_state(db)?;
        Ok(state.virtual_cpu_limit.saturating_sub(state.pending_cpu_usage))
    }

    pub fn get_block_net_limit(&self, db: &Database) -> Result<u64, ChainError> {
        let state = Self::get_state(db)?;
        Ok(state.virtual_net_limit.saturating_sub(state.pending_net_usage))
    }

    pub fn get_total_cpu_weight(&self, db: &Database) -> Result<u64, ChainError> {
        Ok(Self::get_state(db)?.total_cpu_weight)
    }

    pub fn get_total_net_weight(&self, db: &Database) -> Result<u64, ChainError> {
        Ok(Self::get_state(db)?.total_net_weight)
    }

    pub fn get_total_ram_bytes(&self, db: &Database) -> Result<u64, ChainError> {
        Ok(Self::get_state(db)?.total_ram_bytes)
    }
}

#[cfg(test)]
mod tests {
    use pulsevm_error::ErrorSeverity;
    use pulsevm_name_macro::name;

    use super::*;
    use crate::utils::make_ratio;

    const ALICE: Name = Name::new(name!("alice"));
    const BOB: Name = Name::new(name!("bob"));

    fn test_config() -> ResourceLimitsConfig {
        let parameters = ElasticLimitParameters::new(
            1000,
            10_000,
            60,
            10,
            make_ratio(99, 100),
            make_ratio(1000, 999),
        );
        ResourceLimitsConfig {
            cpu_limit_parameters: parameters.clone(),
            net_limit_parameters: parameters,
            account_cpu_usage_average_window: 10,
            account_net_usage_average_window: 10,
            ..Default::default()
        }
    }

    fn setup() -> (ResourceLimitsManager, Database) {
        let manager = ResourceLimitsManager::new();
        let mut db = Database::new();
        manager.initialize_database(&mut db, &test_config()).unwrap();
        manager.initialize_account(&mut db, ALICE).unwrap();
        manager.initialize_account(&mut db, BOB).unwrap();
        (manager, db)
    }

    /// alice gets 1% of cpu and net, bob 99%.
    fn staked() -> (ResourceLimitsManager, Database) {
        let (mut manager, mut db) = setup();
        let w = ResourceWeight::Weighted;
        manager
            .set_account_limits(&mut db, ALICE, w(1), w(1), w(1000))
            .unwrap();
        manager
            .set_account_limits(&mut db, BOB, w(99), w(99), ResourceWeight::Unset)
            .unwrap();
        manager.process_account_limit_updates(&mut db).unwrap();
        (manager, db)
    }

    fn accounts(owners: &[Name]) -> BTreeSet<Name> {
        owners.iter().copied().collect()
    }

    #[test]
    fn initialize_database_once() {
        let (manager, mut db) = setup();
        assert_eq!(manager.get_virtual_block_cpu_limit(&db).unwrap(), 10_000);
        assert_eq!(manager.get_virtual_block_net_limit(&db).unwrap(), 10_000);
        assert!(matches!(
            manager.initialize_database(&mut db, &test_config()),
            Err(ChainError::DatabaseError(_))
        ));
    }

    #[test]
    fn missing_singletons_are_fatal() {
        let manager = ResourceLimitsManager::new();
        let db = Database::new();
        let err = manager.get_total_cpu_weight(&db).unwrap_err();
        assert_eq!(err, ChainError::MissingSingleton("resource_limits_state"));
        assert_eq!(err.severity(), ErrorSeverity::Fatal);
    }

    #[test]
    fn invalid_config_leaves_database_empty() {
        let manager = ResourceLimitsManager::new();
        let mut db = Database::new();
        let mut config = test_config();
        config.net_limit_parameters.periods = 0;
        assert!(matches!(
            manager.initialize_database(&mut db, &config),
            Err(ChainError::InvalidConfiguration(_))
        ));
        assert!(!db.exists::<ResourceLimitsConfig>(0));
    }

    #[test]
    fn accounts_start_unlimited() {
        let (manager, mut db) = setup();
        assert_eq!(
            manager.initialize_account(&mut db, ALICE),
            Err(ChainError::AccountAlreadyExists(ALICE))
        );
        assert!(matches!(
            manager.initialize_account(&mut db, Name::default()),
            Err(ChainError::InvalidArgument(_))
        ));
        assert!(!db.exists::<ResourceUsage>(Name::default()));
        assert_eq!(
            manager.get_account_limits(&db, ALICE).unwrap(),
            (ResourceWeight::Unset, ResourceWeight::Unset, ResourceWeight::Unset)
        );
        let cpu = manager.get_account_cpu_limit(&db, ALICE, None).unwrap();
        assert_eq!(cpu.max, None);
        assert_eq!(cpu.available, None);
        assert_eq!(
            manager.get_account_ram_limit(&db, ALICE).unwrap(),
            AccountRamLimit { used: 0, max: None }
        );
    }

    #[test]
    fn set_account_limits_is_idempotent() {
        let (manager, mut db) = setup();
        let w = ResourceWeight::Weighted;
        assert!(manager.set_account_limits(&mut db, ALICE, w(10), w(20), w(300)).unwrap());
        assert!(!manager.set_account_limits(&mut db, ALICE, w(10), w(20), w(300)).unwrap());
        assert_eq!(manager.get_total_net_weight(&db).unwrap(), 10);
        assert_eq!(manager.get_total_cpu_weight(&db).unwrap(), 20);
        assert_eq!(manager.get_total_ram_bytes(&db).unwrap(), 300);

        assert!(manager.set_account_limits(&mut db, ALICE, w(5), w(20), w(300)).unwrap());
        assert_eq!(manager.get_total_net_weight(&db).unwrap(), 5);
        assert_eq!(db.rows::<PendingResourceLimits>().unwrap().len(), 1);
    }

    #[test]
    fn pending_limits_are_not_enforced_until_processed() {
        let (mut manager, mut db) = setup();
        let w = ResourceWeight::Weighted;
        manager
            .set_account_limits(&mut db, ALICE, w(10), w(10), w(1000))
            .unwrap();

        assert_eq!(
            manager.get_account_limits(&db, ALICE).unwrap(),
            (w(1000), w(10), w(10))
        );
        assert_eq!(db.get::<ResourceLimits>(ALICE).unwrap(), ResourceLimits::unlimited(ALICE));
        assert_eq!(manager.get_account_cpu_limit(&db, ALICE, None).unwrap().max, None);

        manager.process_account_limit_updates(&mut db).unwrap();
        assert!(db.rows::<PendingResourceLimits>().unwrap().is_empty());
        let committed = db.get::<ResourceLimits>(ALICE).unwrap();
        assert_eq!(committed.cpu_weight, w(10));
        // alice holds all the stake: 10_000 per block over a 10 block window
        assert_eq!(
            manager.get_account_cpu_limit(&db, ALICE, None).unwrap().max,
            Some(100_000)
        );
    }

    #[test]
    fn limit_updates_run_once_per_block() {
        let (mut manager, mut db) = setup();
        manager.begin_block(1).unwrap();
        manager.process_account_limit_updates(&mut db).unwrap();
        let err = manager.process_account_limit_updates(&mut db).unwrap_err();
        assert_eq!(err.severity(), ErrorSeverity::ContractViolation);
        manager.end_block(&mut db).unwrap();
    }

    #[test]
    fn limit_updates_after_end_block_wait_for_the_next_block() {
        let (mut manager, mut db) = setup();
        manager.begin_block(1).unwrap();
        manager.process_account_limit_updates(&mut db).unwrap();
        manager.end_block(&mut db).unwrap();

        let err = manager.process_account_limit_updates(&mut db).unwrap_err();
        assert_eq!(err.severity(), ErrorSeverity::ContractViolation);

        manager.begin_block(2).unwrap();
        manager.process_account_limit_updates(&mut db).unwrap();
        manager.end_block(&mut db).unwrap();
    }

    #[test]
    fn end_block_processes_staged_limits_once() {
        let (mut manager, mut db) = setup();
        manager.begin_block(1).unwrap();
        manager
            .set_account_limits(
                &mut db,
                ALICE,
                ResourceWeight::Weighted(5),
                ResourceWeight::Weighted(5),
                ResourceWeight::Weighted(100),
            )
            .unwrap();
        manager.end_block(&mut db).unwrap();
        assert!(db.rows::<PendingResourceLimits>().unwrap().is_empty());
        assert!(matches!(
            manager.process_account_limit_updates(&mut db),
            Err(ChainError::ContractViolation(_))
        ));
    }

    #[test]
    fn block_brackets_are_enforced() {
        let (mut manager, mut db) = setup();
        assert!(matches!(
            manager.end_block(&mut db),
            Err(ChainError::ContractViolation(_))
        ));
        manager.begin_block(5).unwrap();
        assert!(matches!(manager.begin_block(6), Err(ChainError::ContractViolation(_))));
        assert!(matches!(
            manager.on_transaction_net_cpu_usage(&mut db, &accounts(&[ALICE]), 1, 1, 4),
            Err(ChainError::ContractViolation(_))
        ));
        manager.end_block(&mut db).unwrap();
        assert!(matches!(manager.begin_block(5), Err(ChainError::ContractViolation(_))));
        manager.begin_block(6).unwrap();
        assert_eq!(manager.head_ordinal(), Some(6));
    }

    #[test]
    fn transaction_within_share_is_admitted() {
        let (manager, mut db) = staked();
        // alice may use 10_000 * 10 * 1 / 100 = 1_000 units per window
        manager
            .add_transaction_usage(&mut db, &accounts(&[ALICE]), 500, 100, 1)
            .unwrap();
        let cpu = manager.get_account_cpu_limit(&db, ALICE, None).unwrap();
        assert_eq!(cpu.used, 500);
        assert_eq!(cpu.max, Some(1_000));
        assert_eq!(cpu.available, Some(500));
        assert_eq!(cpu.last_usage_update_ordinal, 1);
        assert_eq!(manager.get_block_cpu_limit(&db).unwrap(), 9_500);
        assert_eq!(manager.get_block_net_limit(&db).unwrap(), 9_900);
    }

    #[test]
    fn transaction_over_share_is_rejected_without_side_effects() {
        let (manager, mut db) = staked();
        manager
            .add_transaction_usage(&mut db, &accounts(&[ALICE]), 500, 0, 1)
            .unwrap();
        let before = db.get::<ResourceUsage>(ALICE).unwrap();

        let err = manager
            .add_transaction_usage(&mut db, &accounts(&[ALICE, BOB]), 600, 0, 1)
            .unwrap_err();
        assert_eq!(
            err,
            ChainError::ResourceExceeded {
                resource: Resource::Cpu,
                owner: ALICE
            }
        );
        assert_eq!(err.severity(), ErrorSeverity::Recoverable);
        assert_eq!(db.get::<ResourceUsage>(ALICE).unwrap(), before);
        assert_eq!(db.get::<ResourceUsage>(BOB).unwrap().cpu_usage.value_ex, 0);
        assert_eq!(ResourceLimitsManager::get_state(&db).unwrap().pending_cpu_usage, 500);
    }

    #[test]
    fn block_limit_is_enforced() {
        let (manager, mut db) = staked();
        assert_eq!(
            manager.add_transaction_usage(&mut db, &accounts(&[BOB]), 10_001, 0, 1),
            Err(ChainError::BlockResourceExhausted {
                resource: Resource::Cpu
            })
        );
        assert_eq!(
            manager.add_transaction_usage(&mut db, &accounts(&[BOB]), 0, 10_001, 1),
            Err(ChainError::BlockResourceExhausted {
                resource: Resource::Net
            })
        );
        assert_eq!(manager.get_block_cpu_limit(&db).unwrap(), 10_000);
    }

    #[test]
    fn unlimited_accounts_are_only_bound_by_the_block() {
        let (manager, mut db) = setup();
        manager
            .add_transaction_usage(&mut db, &accounts(&[ALICE]), 10_000, 10_000, 1)
            .unwrap();
        let net = manager.get_account_net_limit(&db, ALICE, None).unwrap();
        assert_eq!(net.used, 10_000);
        assert_eq!(net.max, None);
    }

    #[test]
    fn usage_must_not_go_back_in_time() {
        let (manager, mut db) = staked();
        manager
            .add_transaction_usage(&mut db, &accounts(&[ALICE]), 1, 1, 5)
            .unwrap();
        let err = manager
            .add_transaction_usage(&mut db, &accounts(&[ALICE]), 1, 1, 4)
            .unwrap_err();
        assert_eq!(
            err,
            ChainError::InvalidOrdinal {
                ordinal: 4,
                last_ordinal: 5
            }
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn unknown_accounts_are_rejected() {
        let (manager, mut db) = setup();
        let carol = Name::new(name!("carol"));
        assert_eq!(
            manager.add_transaction_usage(&mut db, &accounts(&[carol]), 1, 1, 1),
            Err(ChainError::UnknownAccount(carol))
        );
        assert_eq!(
            manager.set_account_limits(
                &mut db,
                carol,
                ResourceWeight::Unset,
                ResourceWeight::Unset,
                ResourceWeight::Unset
            ),
            Err(ChainError::UnknownAccount(carol))
        );
    }

    #[test]
    fn current_used_is_projected_to_the_head_block() {
        let (mut manager, mut db) = staked();
        manager.begin_block(1).unwrap();
        manager
            .on_transaction_net_cpu_usage(&mut db, &accounts(&[ALICE]), 0, 500, 1)
            .unwrap();
        manager.end_block(&mut db).unwrap();
        manager.begin_block(6).unwrap();

        let cpu = manager.get_account_cpu_limit(&db, ALICE, None).unwrap();
        assert_eq!(cpu.used, 500);
        assert_eq!(cpu.current_used, 250);

        manager
            .update_account_usage(&mut db, &accounts(&[ALICE]), 6)
            .unwrap();
        let cpu = manager.get_account_cpu_limit(&db, ALICE, None).unwrap();
        assert_eq!(cpu.used, 250);
        assert_eq!(cpu.last_usage_update_ordinal, 6);
    }

    #[test]
    fn greylist_caps_the_virtual_limit() {
        let (mut manager, mut db) = staked();
        manager.begin_block(1).unwrap();
        manager.end_block(&mut db).unwrap();
        // idle block: 10_000 * 1000 / 999
        assert_eq!(manager.get_virtual_block_cpu_limit(&db).unwrap(), 10_010);

        let open = manager.get_account_cpu_limit(&db, ALICE, None).unwrap();
        assert_eq!(open.max, Some(1_001));
        let greylisted = manager.get_account_cpu_limit(&db, ALICE, Some(1)).unwrap();
        assert_eq!(greylisted.max, Some(1_000));
    }

    #[test]
    fn zero_weight_gets_nothing() {
        let (mut manager, mut db) = staked();
        let w = ResourceWeight::Weighted;
        manager
            .set_account_limits(&mut db, ALICE, w(0), w(0), w(1000))
            .unwrap();
        manager.process_account_limit_updates(&mut db).unwrap();
        assert_eq!(
            manager.get_account_net_limit(&db, ALICE, None).unwrap().max,
            Some(0)
        );
        assert_eq!(
            manager.add_transaction_usage(&mut db, &accounts(&[ALICE]), 1, 0, 1),
            Err(ChainError::ResourceExceeded {
                resource: Resource::Cpu,
                owner: ALICE
            })
        );
    }

    #[test]
    fn ram_usage_is_checked_against_quota() {
        let (manager, mut db) = staked();
        manager.on_ram_delta(&mut db, ALICE, 800).unwrap();
        assert_eq!(
            manager.on_ram_delta(&mut db, ALICE, 300),
            Err(ChainError::ResourceExceeded {
                resource: Resource::Ram,
                owner: ALICE
            })
        );
        assert_eq!(manager.get_account_ram_usage(&db, ALICE).unwrap(), 800);

        let err = manager.add_pending_ram_usage(&mut db, ALICE, -801).unwrap_err();
        assert_eq!(err, ChainError::RamUsageUnderflow(ALICE));
        assert!(err.is_fatal());
        manager.on_ram_delta(&mut db, ALICE, -800).unwrap();
        assert_eq!(
            manager.get_account_ram_limit(&db, ALICE).unwrap(),
            AccountRamLimit {
                used: 0,
                max: Some(1000)
            }
        );

        // bob has no quota
        manager.on_ram_delta(&mut db, BOB, i64::MAX).unwrap();
        assert!(matches!(
            manager.add_pending_ram_usage(&mut db, BOB, i64::MAX),
            Ok(())
        ));
        assert!(matches!(
            manager.add_pending_ram_usage(&mut db, BOB, 2),
            Err(ChainError::AccountingOverflow(_))
        ));
    }

    #[test]
    fn ram_quota_change_applies_before_commit() {
        let (manager, mut db) = staked();
        manager.on_ram_delta(&mut db, ALICE, 800).unwrap();
        let w = ResourceWeight::Weighted;
        manager
            .set_account_limits(&mut db, ALICE, w(1), w(1), w(500))
            .unwrap();
        assert!(matches!(
            manager.verify_account_ram_usage(&db, ALICE),
            Err(ChainError::ResourceExceeded { .. })
        ));
    }

    #[test]
    fn failed_transaction_is_undone() {
        let (manager, mut db) = staked();
        let w = ResourceWeight::Weighted;
        let result: Result<(), ChainError> =
            ResourceLimitsManager::execute_transaction(&mut db, |db| {
                manager.set_account_limits(db, BOB, w(50), w(50), w(50))?;
                manager.add_pending_ram_usage(db, ALICE, 100)?;
                manager.add_transaction_usage(db, &accounts(&[ALICE]), 5_000, 0, 1)
            });
        assert!(matches!(result, Err(ChainError::ResourceExceeded { .. })));
        assert!(db.rows::<PendingResourceLimits>().unwrap().is_empty());
        assert_eq!(manager.get_total_cpu_weight(&db).unwrap(), 100);
        assert_eq!(manager.get_account_ram_usage(&db, ALICE).unwrap(), 0);

        let staged = ResourceLimitsManager::execute_transaction(&mut db, |db| {
            manager.set_account_limits(db, BOB, w(50), w(50), w(50))
        })
        .unwrap();
        assert!(staged);
        assert_eq!(manager.get_total_cpu_weight(&db).unwrap(), 51);
        assert_eq!(db.revision(), 0);
    }

    #[test]
    fn block_parameters_are_validated() {
        let (manager, mut db) = setup();
        let mut cpu = test_config().cpu_limit_parameters;
        cpu.target = cpu.max + 1;
        assert!(matches!(
            manager.set_block_parameters(&mut db, cpu, test_config().net_limit_parameters),
            Err(ChainError::InvalidConfiguration(_))
        ));
        assert_eq!(ResourceLimitsManager::get_config(&db).unwrap(), test_config());

        assert!(matches!(
            manager.set_account_usage_windows(&mut db, 0, 10),
            Err(ChainError::InvalidConfiguration(_))
        ));
        manager.set_account_usage_windows(&mut db, 20, 30).unwrap();
        let config = ResourceLimitsManager::get_config(&db).unwrap();
        assert_eq!(config.account_cpu_usage_average_window, 20);
        assert_eq!(config.account_net_usage_average_window, 30);
    }

    #[test]
    fn pending_usage_resets_each_block() {
        let (mut manager, mut db) = staked();
        manager.begin_block(1).unwrap();
        manager
            .on_transaction_net_cpu_usage(&mut db, &accounts(&[BOB]), 2_000, 3_000, 1)
            .unwrap();
        manager.end_block(&mut db).unwrap();

        let state = ResourceLimitsManager::get_state(&db).unwrap();
        assert_eq!(state.pending_cpu_usage, 0);
        assert_eq!(state.pending_net_usage, 0);
        assert_eq!(state.average_block_cpu_usage.last_ordinal, 1);
        // 3_000 / 60 is below the 1_000 target
        assert_eq!(state.virtual_cpu_limit, 10_010);
    }
}
