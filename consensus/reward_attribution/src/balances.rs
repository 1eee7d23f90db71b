use crate::{DataUnavailable, Epoch, EpochBalances, Error, MAX_EFFECTIVE_BALANCE_INCREMENTS};
use std::collections::HashMap;

/// Aggregate balances for the epoch being processed and the one after it.
///
/// Reward tables combine the attesting balances of the current epoch with the active balance of
/// the next, so both are kept and rotated together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceSnapshots {
    current: EpochBalances,
    next: EpochBalances,
}

impl BalanceSnapshots {
    /// Seeds the snapshots with the balances of the first epoch to be processed. `current` is
    /// unset until the first call to `advance`.
    pub fn new(first: EpochBalances) -> Self {
        Self {
            current: EpochBalances::default(),
            next: first,
        }
    }

    pub fn advance(&mut self, next: EpochBalances) {
        self.current = std::mem::replace(&mut self.next, next);
    }

    pub fn current(&self) -> &EpochBalances {
        &self.current
    }

    pub fn next(&self) -> &EpochBalances {
        &self.next
    }
}

/// Per-validator effective balance lookup, in increments.
///
/// Almost every validator sits at the protocol maximum for its entire life, so only validators
/// that ever deviated from it ("impaired" validators) carry a time series.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectiveBalances {
    impaired: HashMap<usize, Vec<u64>>,
}

impl EffectiveBalances {
    /// `impaired` maps a validator index to its effective balance at each epoch, starting from
    /// its activation epoch.
    pub fn new(impaired: HashMap<usize, Vec<u64>>) -> Self {
        Self { impaired }
    }

    pub fn is_impaired(&self, validator_index: usize) -> bool {
        self.impaired.contains_key(&validator_index)
    }

    pub fn impaired_count(&self) -> usize {
        self.impaired.len()
    }

    pub fn effective_balance(
        &self,
        validator_index: usize,
        activation_epoch: Epoch,
        epoch: Epoch,
    ) -> Result<u64, Error> {
        let series = match self.impaired.get(&validator_index) {
            Some(series) => series,
            None => return Ok(MAX_EFFECTIVE_BALANCE_INCREMENTS),
        };

        let unavailable = DataUnavailable::EffectiveBalance {
            validator: validator_index,
            epoch,
        };

        let offset = epoch.checked_sub(activation_epoch).ok_or(unavailable)?;
        usize::try_from(offset)
            .ok()
            .and_then(|offset| series.get(offset))
            .copied()
            .ok_or_else(|| unavailable.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balances(active: u64) -> EpochBalances {
        EpochBalances {
            active,
            attesting: active / 2,
            target: active / 3,
            head: active / 4,
        }
    }

    #[test]
    fn snapshots_rotate() {
        let mut snapshots = BalanceSnapshots::new(balances(100));
        assert_eq!(*snapshots.current(), EpochBalances::default());
        assert_eq!(*snapshots.next(), balances(100));

        snapshots.advance(balances(200));
        assert_eq!(*snapshots.current(), balances(100));
        assert_eq!(*snapshots.next(), balances(200));
    }

    #[test]
    fn unimpaired_validator_uses_ceiling() {
        let effective_balances = EffectiveBalances::default();
        assert!(!effective_balances.is_impaired(3));
        assert_eq!(
            effective_balances.effective_balance(3, 10, 1_000),
            Ok(MAX_EFFECTIVE_BALANCE_INCREMENTS)
        );
    }

    #[test]
    fn impaired_validator_indexed_from_activation() {
        let mut impaired = HashMap::new();
        impaired.insert(7, vec![32, 31, 30]);
        let effective_balances = EffectiveBalances::new(impaired);

        assert!(effective_balances.is_impaired(7));
        assert_eq!(effective_balances.effective_balance(7, 4, 4), Ok(32));
        assert_eq!(effective_balances.effective_balance(7, 4, 6), Ok(30));
    }

    #[test]
    fn impaired_validator_outside_series() {
        let mut impaired = HashMap::new();
        impaired.insert(7, vec![31]);
        let effective_balances = EffectiveBalances::new(impaired);

        let expected = Err(Error::DataUnavailable(DataUnavailable::EffectiveBalance {
            validator: 7,
            epoch: 9,
        }));
        assert_eq!(effective_balances.effective_balance(7, 4, 9), expected);

        let expected = Err(Error::DataUnavailable(DataUnavailable::EffectiveBalance {
            validator: 7,
            epoch: 2,
        }));
        assert_eq!(effective_balances.effective_balance(7, 4, 2), expected);
    }
}
