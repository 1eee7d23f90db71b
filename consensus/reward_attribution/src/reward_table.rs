use crate::{
    BalanceSnapshots, Epoch, Error, BASE_REWARDS_PER_EPOCH, BASE_REWARD_FACTOR,
    EFFECTIVE_BALANCE_INCREMENT, MAX_EFFECTIVE_BALANCE_INCREMENTS, PROPOSER_REWARD_QUOTIENT,
    SLOTS_PER_EPOCH,
};
use integer_sqrt::IntegerSquareRoot;
use safe_arith::{ArithError, SafeArith};

const BUCKET_COUNT: usize = MAX_EFFECTIVE_BALANCE_INCREMENTS as usize;

/// Attestation reward components for validators with one particular effective balance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketRewards {
    pub base: i64,
    /// Reward for having an attestation included at all (the source component).
    pub inclusion: i64,
    pub target: i64,
    pub head: i64,
}

impl BucketRewards {
    /// The base reward less the share paid to the proposer that includes the attestation.
    pub fn attester_inclusion_share(&self) -> Result<i64, Error> {
        let proposer_share = self.base.safe_div(PROPOSER_REWARD_QUOTIENT as i64)?;
        Ok(self.base.safe_sub(proposer_share)?)
    }

    /// The inclusion reward earned by an attestation included `delay` slots late.
    pub fn delay_reward(&self, delay: u64) -> Result<i64, Error> {
        let delay = i64::try_from(delay).map_err(|_| ArithError::Overflow)?;
        Ok(self.attester_inclusion_share()?.safe_div(delay)?)
    }
}

/// The best possible attestation outcome for one bucket in one slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaxReward {
    /// Inclusion reward at the minimum possible delay.
    pub delay: i64,
    pub total: i64,
}

/// Per-bucket maxima for attestations in a single slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotMaxima {
    min_inclusion_delay: u64,
    buckets: [MaxReward; BUCKET_COUNT],
}

impl SlotMaxima {
    pub fn min_inclusion_delay(&self) -> u64 {
        self.min_inclusion_delay
    }

    pub fn bucket(&self, effective_balance: u64) -> Option<&MaxReward> {
        self.buckets.get(bucket_index(effective_balance)?)
    }
}

/// Reward components for every effective balance bucket (1 to 32 increments) in one epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardTable {
    buckets: [BucketRewards; BUCKET_COUNT],
}

impl RewardTable {
    /// Builds the table from the *next* epoch's active balance and this epoch's participating
    /// balances, mirroring when the protocol actually applies the rewards.
    pub fn build(
        epoch: Epoch,
        active_balance_next: u64,
        attesting_balance: u64,
        target_balance: u64,
        head_balance: u64,
    ) -> Result<Self, Error> {
        if active_balance_next == 0 {
            return Err(Error::DegenerateBalance { epoch });
        }
        let active_sqrt = active_balance_next.integer_sqrt();

        let mut buckets = [BucketRewards::default(); BUCKET_COUNT];
        for (effective_balance, bucket) in (1..=MAX_EFFECTIVE_BALANCE_INCREMENTS).zip(&mut buckets) {
            let base = effective_balance
                .safe_mul(EFFECTIVE_BALANCE_INCREMENT)?
                .safe_mul(BASE_REWARD_FACTOR)?
                .safe_div(active_sqrt)?
                .safe_div(BASE_REWARDS_PER_EPOCH)?;

            *bucket = BucketRewards {
                base: to_signed(base)?,
                inclusion: to_signed(mul_div(base, attesting_balance, active_balance_next)?)?,
                target: to_signed(mul_div(base, target_balance, active_balance_next)?)?,
                head: to_signed(mul_div(base, head_balance, active_balance_next)?)?,
            };
        }

        Ok(Self { buckets })
    }

    pub fn from_snapshots(epoch: Epoch, snapshots: &BalanceSnapshots) -> Result<Self, Error> {
        let current = snapshots.current();
        Self::build(
            epoch,
            snapshots.next().active,
            current.attesting,
            current.target,
            current.head,
        )
    }

    pub fn bucket(&self, effective_balance: u64) -> Option<&BucketRewards> {
        self.buckets.get(bucket_index(effective_balance)?)
    }

    pub fn slot_maxima(&self, min_inclusion_delay: u64) -> Result<SlotMaxima, Error> {
        let mut buckets = [MaxReward::default(); BUCKET_COUNT];
        for (max, rewards) in buckets.iter_mut().zip(&self.buckets) {
            let delay = rewards.delay_reward(min_inclusion_delay)?;
            let total = rewards
                .inclusion
                .safe_add(rewards.target)?
                .safe_add(rewards.head)?
                .safe_add(delay)?;
            *max = MaxReward { delay, total };
        }

        Ok(SlotMaxima {
            min_inclusion_delay,
            buckets,
        })
    }

    /// Estimated reward forfeited by a proposer that missed its slot.
    ///
    /// A missed block leaves no balance change to observe, so this assumes an average block: the
    /// proposer share of the smallest bucket's base reward for every increment of attesting
    /// balance, spread over the slots of an epoch. The proposer's own effective balance is
    /// deliberately not used.
    pub fn missed_block_estimate(&self, attesting_balance: u64) -> Result<i64, Error> {
        let base = u64::try_from(self.buckets[0].base).map_err(|_| ArithError::Overflow)?;
        let denominator = EFFECTIVE_BALANCE_INCREMENT
            .safe_mul(PROPOSER_REWARD_QUOTIENT)?
            .safe_mul(SLOTS_PER_EPOCH)?;
        to_signed(mul_div(base, attesting_balance, denominator)?)
    }
}

fn bucket_index(effective_balance: u64) -> Option<usize> {
    if (1..=MAX_EFFECTIVE_BALANCE_INCREMENTS).contains(&effective_balance) {
        Some(effective_balance as usize - 1)
    } else {
        None
    }
}

/// `value * numerator / denominator`, with the product taken in 128 bits. Base rewards multiplied
/// by network-wide balances routinely exceed `u64::MAX`.
fn mul_div(value: u64, numerator: u64, denominator: u64) -> Result<u64, Error> {
    let quotient = u128::from(value)
        .checked_mul(u128::from(numerator))
        .ok_or(ArithError::Overflow)?
        .checked_div(u128::from(denominator))
        .ok_or(ArithError::DivisionByZero)?;
    Ok(u64::try_from(quotient).map_err(|_| ArithError::Overflow)?)
}

fn to_signed(value: u64) -> Result<i64, Error> {
    Ok(i64::try_from(value).map_err(|_| ArithError::Overflow)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GWEI_PER_INCREMENT: u64 = EFFECTIVE_BALANCE_INCREMENT;

    fn scenario_table() -> RewardTable {
        RewardTable::build(
            0,
            1_000_000 * GWEI_PER_INCREMENT,
            900_000 * GWEI_PER_INCREMENT,
            850_000 * GWEI_PER_INCREMENT,
            800_000 * GWEI_PER_INCREMENT,
        )
        .unwrap()
    }

    #[test]
    fn max_bucket_values() {
        let table = scenario_table();
        let bucket = table.bucket(32).unwrap();

        let expected_base =
            32 * GWEI_PER_INCREMENT * 16 / (1_000_000 * GWEI_PER_INCREMENT).integer_sqrt();
        assert_eq!(bucket.base, expected_base as i64);
        assert_eq!(bucket.base, 16_190);
        assert_eq!(bucket.inclusion, 14_571);
        assert_eq!(bucket.target, 13_761);
        assert_eq!(bucket.head, 12_952);
    }

    #[test]
    fn base_reward_strictly_increasing() {
        let table = scenario_table();
        for effective_balance in 2..=MAX_EFFECTIVE_BALANCE_INCREMENTS {
            let lower = table.bucket(effective_balance - 1).unwrap();
            let higher = table.bucket(effective_balance).unwrap();
            assert!(higher.base > lower.base, "bucket {}", effective_balance);
        }
    }

    #[test]
    fn buckets_outside_range() {
        let table = scenario_table();
        assert!(table.bucket(0).is_none());
        assert!(table.bucket(33).is_none());
    }

    #[test]
    fn zero_active_balance() {
        assert_eq!(
            RewardTable::build(12, 0, 0, 0, 0),
            Err(Error::DegenerateBalance { epoch: 12 })
        );
    }

    #[test]
    fn large_balances_do_not_overflow() {
        let active = 3_000_000 * GWEI_PER_INCREMENT;
        let table = RewardTable::build(0, active, active, active, active).unwrap();
        let bucket = table.bucket(32).unwrap();
        assert_eq!(bucket.inclusion, bucket.base);
        assert_eq!(bucket.head, bucket.base);
    }

    #[test]
    fn slot_maxima_scale_with_delay() {
        let table = scenario_table();
        let bucket = *table.bucket(32).unwrap();

        let prompt = table.slot_maxima(1).unwrap();
        let max = prompt.bucket(32).unwrap();
        assert_eq!(max.delay, 14_167);
        assert_eq!(
            max.total,
            bucket.inclusion + bucket.target + bucket.head + max.delay
        );

        let late = table.slot_maxima(2).unwrap();
        assert_eq!(late.min_inclusion_delay(), 2);
        assert_eq!(late.bucket(32).unwrap().delay, 7_083);
    }

    #[test]
    fn missed_block_estimate_uses_smallest_bucket() {
        let table = scenario_table();
        let base = table.bucket(1).unwrap().base as u64;
        let attesting = 900_000 * GWEI_PER_INCREMENT;
        let expected = base * 900_000 / (8 * 32);
        assert_eq!(
            table.missed_block_estimate(attesting).unwrap(),
            expected as i64
        );
    }
}
