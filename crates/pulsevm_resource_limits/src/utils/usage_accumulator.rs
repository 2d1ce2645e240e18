use std::ops::{Add, Div, Mul, Rem};

use pulsevm_error::ChainError;
use pulsevm_proc_macros::{NumBytes, Read, Write};
use serde::{Deserialize, Serialize};

use crate::{config::RATE_LIMITING_PRECISION, utils::pulse_assert};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Read, Write, NumBytes, Serialize, Deserialize,
)]
pub struct Ratio<T> {
    pub numerator: T,
    pub denominator: T,
}

pub const fn make_ratio<T>(n: T, d: T) -> Ratio<T> {
    Ratio {
        numerator: n,
        denominator: d,
    }
}

/// `value * numerator / denominator`, computed in `u128` and truncated toward zero.
impl Mul<Ratio<u64>> for u64 {
    type Output = Result<u64, ChainError>;

    fn mul(self, r: Ratio<u64>) -> Self::Output {
        pulse_assert(
            r.denominator > 0,
            ChainError::InvalidArgument("ratio denominator cannot be zero".to_string()),
        )?;
        let wide = u128::from(self) * u128::from(r.numerator) / u128::from(r.denominator);
        u64::try_from(wide).map_err(|_| {
            ChainError::AccountingOverflow(format!(
                "{} * {}/{} does not fit in 64 bits",
                self, r.numerator, r.denominator
            ))
        })
    }
}

pub fn integer_divide_ceil<T>(num: T, den: T) -> T
where
    T: Copy + PartialOrd + Div<Output = T> + Rem<Output = T> + Add<Output = T> + From<u8>,
{
    let div = num / den;
    if num % den > T::from(0) {
        div + T::from(1)
    } else {
        div
    }
}

/// Moving average of per-ordinal usage over a window of `window_size`
/// ordinals. Every ordinal that passes without input scales the value by
/// `(window_size - 1) / window_size`, so usage older than one window has
/// fully expired.
#[derive(
    Debug, Clone, Copy, NumBytes, Read, Write, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct UsageAccumulator {
    /// Ordinal of the last period which has contributed to the average.
    pub last_ordinal: u32,
    /// The current average pre-multiplied by `RATE_LIMITING_PRECISION`.
    pub value_ex: u64,
}

impl UsageAccumulator {
    pub fn average(&self) -> u64 {
        integer_divide_ceil(self.value_ex, RATE_LIMITING_PRECISION)
    }

    pub const fn max_raw_value() -> u64 {
        u64::MAX / RATE_LIMITING_PRECISION
    }

    /// `value_ex` decayed to `ordinal` without touching the accumulator.
    /// Ordinals at or before `last_ordinal` see the stored value.
    pub fn value_ex_at(&self, ordinal: u32, window_size: u32) -> Result<u64, ChainError> {
        if self.last_ordinal >= ordinal {
            return Ok(self.value_ex);
        }
        let delta = ordinal - self.last_ordinal;
        if delta < window_size {
            self.value_ex * make_ratio(u64::from(window_size - delta), u64::from(window_size))
        } else {
            Ok(0)
        }
    }

    pub fn add(&mut self, units: u64, ordinal: u32, window_size: u32) -> Result<(), ChainError> {
        // check for numerical limits before doing any state mutations
        pulse_assert(units <= Self::max_raw_value(), ChainError::UsageOverflow)?;
        pulse_assert(
            window_size > 0,
            ChainError::InvalidArgument("averaging window cannot be zero".to_string()),
        )?;

        let value_ex_contrib =
            integer_divide_ceil(units * RATE_LIMITING_PRECISION, u64::from(window_size));

        let decayed = if self.last_ordinal != ordinal {
            pulse_assert(
                ordinal > self.last_ordinal,
                ChainError::InvalidOrdinal {
                    ordinal,
                    last_ordinal: self.last_ordinal,
                },
            )?;
            self.value_ex_at(ordinal, window_size)?
        } else {
            self.value_ex
        };

        let value_ex = decayed.checked_add(value_ex_contrib).ok_or_else(|| {
            ChainError::AccountingOverflow(
                "overflow in accumulated value when adding usage".to_string(),
            )
        })?;

        self.value_ex = value_ex;
        self.last_ordinal = ordinal;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn ratio_multiplication_truncates() {
        assert_eq!((10u64 * make_ratio(1, 3)).unwrap(), 3);
        assert_eq!((u64::MAX * make_ratio(99, 100)).unwrap(), 18_262_276_632_972_456_098);
        assert!(matches!(
            u64::MAX * make_ratio(1000, 999),
            Err(ChainError::AccountingOverflow(_))
        ));
        assert!(matches!(
            5u64 * make_ratio(1, 0),
            Err(ChainError::InvalidArgument(_))
        ));
    }

    #[test]
    fn divide_ceil_rounds_up_only_on_remainder() {
        assert_eq!(integer_divide_ceil(10u64, 5), 2);
        assert_eq!(integer_divide_ceil(11u64, 5), 3);
        assert_eq!(integer_divide_ceil(0u64, 5), 0);
        assert_eq!(integer_divide_ceil(u128::MAX, 2), 1u128 << 127);
    }

    #[test]
    fn single_add_spreads_over_window() {
        let mut acc = UsageAccumulator::default();
        acc.add(600, 1, 60).unwrap();
        assert_eq!(acc.value_ex, 10 * RATE_LIMITING_PRECISION);
        assert_eq!(acc.average(), 10);
        assert_eq!(acc.last_ordinal, 1);
    }

    #[test]
    fn same_ordinal_accumulates_without_decay() {
        let mut acc = UsageAccumulator::default();
        acc.add(100, 5, 10).unwrap();
        acc.add(100, 5, 10).unwrap();
        assert_eq!(acc.value_ex, 20 * RATE_LIMITING_PRECISION);
    }

    #[test]
    fn decays_linearly_inside_window_and_expires_after() {
        let mut acc = UsageAccumulator::default();
        acc.add(1000, 10, 10).unwrap();
        let base = acc.value_ex;
        assert_eq!(acc.value_ex_at(10, 10).unwrap(), base);
        assert_eq!(acc.value_ex_at(5, 10).unwrap(), base);
        assert_eq!(acc.value_ex_at(14, 10).unwrap(), base * 6 / 10);
        assert_eq!(acc.value_ex_at(19, 10).unwrap(), base / 10);
        assert_eq!(acc.value_ex_at(20, 10).unwrap(), 0);
        assert_eq!(acc.value_ex_at(u32::MAX, 10).unwrap(), 0);
        // projection is read only
        assert_eq!(acc.value_ex, base);
    }

    #[test]
    fn rejects_ordinal_going_backwards() {
        let mut acc = UsageAccumulator::default();
        acc.add(1, 10, 10).unwrap();
        let before = acc;
        assert_eq!(
            acc.add(1, 9, 10),
            Err(ChainError::InvalidOrdinal {
                ordinal: 9,
                last_ordinal: 10
            })
        );
        assert_eq!(acc, before);
    }

    #[test]
    fn usage_overflow_is_reported_not_wrapped() {
        let mut acc = UsageAccumulator::default();
        assert_eq!(
            acc.add(UsageAccumulator::max_raw_value() + 1, 1, 1),
            Err(ChainError::UsageOverflow)
        );
        assert_eq!(acc, UsageAccumulator::default());
        acc.add(UsageAccumulator::max_raw_value(), 1, 1).unwrap();
    }

    #[test]
    fn accumulated_overflow_leaves_state_untouched() {
        let mut acc = UsageAccumulator::default();
        acc.add(UsageAccumulator::max_raw_value(), 1, 1).unwrap();
        let before = acc;
        assert!(matches!(
            acc.add(UsageAccumulator::max_raw_value(), 1, 1),
            Err(ChainError::AccountingOverflow(_))
        ));
        assert_eq!(acc, before);
    }

    #[test]
    fn zero_window_is_rejected() {
        let mut acc = UsageAccumulator::default();
        assert!(matches!(acc.add(1, 1, 0), Err(ChainError::InvalidArgument(_))));
    }

    #[test]
    fn constant_feed_settles_on_fed_value() {
        let mut acc = UsageAccumulator::default();
        for ordinal in 1..=2_000 {
            acc.add(1_000, ordinal, 60).unwrap();
        }
        let average = acc.average();
        assert!((999..=1_001).contains(&average), "average {}", average);
    }

    proptest! {
        #[test]
        fn average_never_grows_without_input(
            units in 0..UsageAccumulator::max_raw_value() / 2,
            window in 1u32..10_000,
            first in 0u32..1_000_000,
            gap1 in 0u32..20_000,
            gap2 in 0u32..20_000,
        ) {
            let mut acc = UsageAccumulator::default();
            acc.add(units, first, window).unwrap();
            let at1 = acc.value_ex_at(first + gap1, window).unwrap();
            let at2 = acc.value_ex_at(first + gap1 + gap2, window).unwrap();
            prop_assert!(at1 <= acc.value_ex);
            prop_assert!(at2 <= at1);
        }

        #[test]
        fn decayed_add_matches_projection(
            seed in 0u64..1_000_000_000,
            units in 0u64..1_000_000_000,
            window in 1u32..1_000,
            gap in 1u32..2_000,
        ) {
            let mut acc = UsageAccumulator::default();
            acc.add(seed, 1, window).unwrap();
            let projected = acc.value_ex_at(1 + gap, window).unwrap();
            acc.add(units, 1 + gap, window).unwrap();
            let contrib = integer_divide_ceil(units * RATE_LIMITING_PRECISION, u64::from(window));
            prop_assert_eq!(acc.value_ex, projected + contrib);
        }
    }
}
