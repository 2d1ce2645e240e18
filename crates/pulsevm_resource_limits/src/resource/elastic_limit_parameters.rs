use pulsevm_error::ChainError;
use pulsevm_proc_macros::{NumBytes, Read, Write};
use serde::{Deserialize, Serialize};

use crate::utils::{Ratio, pulse_assert};

#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Default, Read, Write, NumBytes, Serialize, Deserialize,
)]
pub struct ElasticLimitParameters {
    /// Desired usage per block.
    pub target: u64,
    /// Hard floor of the virtual limit.
    pub max: u64,
    /// Number of blocks in the averaging window.
    pub periods: u32,
    /// Ceiling of the virtual limit, as a multiple of `max`.
    pub max_multiplier: u32,
    /// Applied per block while the average is above target.
    pub contract_rate: Ratio<u64>,
    /// Applied per block while the average is at or below target.
    pub expand_rate: Ratio<u64>,
}

impl ElasticLimitParameters {
    pub fn new(
        target: u64,
        max: u64,
        periods: u32,
        max_multiplier: u32,
        contract_rate: Ratio<u64>,
        expand_rate: Ratio<u64>,
    ) -> Self {
        ElasticLimitParameters {
            target,
            max,
            periods,
            max_multiplier,
            contract_rate,
            expand_rate,
        }
    }

    pub fn validate(&self) -> Result<(), ChainError> {
        pulse_assert(
            self.periods > 0,
            ChainError::InvalidConfiguration(
                "elastic limit parameter 'periods' cannot be zero".to_owned(),
            ),
        )?;
        pulse_assert(
            self.target <= self.max,
            ChainError::InvalidConfiguration(format!(
                "elastic limit target {} exceeds max {}",
                self.target, self.max
            )),
        )?;
        pulse_assert(
            self.max_multiplier > 0,
            ChainError::InvalidConfiguration(
                "elastic limit parameter 'max_multiplier' cannot be zero".to_owned(),
            ),
        )?;
        pulse_assert(
            self.max.checked_mul(u64::from(self.max_multiplier)).is_some(),
            ChainError::InvalidConfiguration(
                "elastic limit 'max' * 'max_multiplier' overflows".to_owned(),
            ),
        )?;
        pulse_assert(
            self.contract_rate.denominator > 0,
            ChainError::InvalidConfiguration(
                "elastic limit parameter 'contract_rate' is not a well-defined ratio".to_owned(),
            ),
        )?;
        pulse_assert(
            self.expand_rate.denominator > 0,
            ChainError::InvalidConfiguration(
                "elastic limit parameter 'expand_rate' is not a well-defined ratio".to_owned(),
            ),
        )?;
        pulse_assert(
            self.contract_rate.numerator <= self.contract_rate.denominator,
            ChainError::InvalidConfiguration(
                "elastic limit parameter 'contract_rate' must not exceed 1".to_owned(),
            ),
        )?;
        pulse_assert(
            self.expand_rate.numerator >= self.expand_rate.denominator,
            ChainError::InvalidConfiguration(
                "elastic limit parameter 'expand_rate' must be at least 1".to_owned(),
            ),
        )?;
        Ok(())
    }

    /// Highest value the virtual limit may reach.
    pub fn ceiling(&self) -> Result<u64, ChainError> {
        self.max
            .checked_mul(u64::from(self.max_multiplier))
            .ok_or_else(|| ChainError::AccountingOverflow("elastic limit ceiling".to_owned()))
    }

    /// Next virtual limit given the current one and the windowed average usage.
    pub fn update_elastic_limit(
        &self,
        current_limit: u64,
        average_usage: u64,
    ) -> Result<u64, ChainError> {
        let ceiling = self.ceiling()?;
        let next = if average_usage > self.target {
            // contract_rate <= 1, cannot overflow
            (current_limit * self.contract_rate)?
        } else {
            match current_limit * self.expand_rate {
                Ok(next) => next,
                Err(ChainError::AccountingOverflow(_)) => ceiling,
                Err(e) => return Err(e),
            }
        };
        Ok(next.clamp(self.max, ceiling))
    }
}
