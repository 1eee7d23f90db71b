use crate::{
    BucketRewards, ChainDataSource, DataUnavailable, Epoch, Error, FilledSlots, MaxReward,
    RewardTable, RewardTotals, ValidatorEpochSummary, ValidatorRegistry, SLOTS_PER_EPOCH,
};
use safe_arith::SafeArith;

/// The gap between the maximum and the actual attestation reward, by cause.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Shortfall {
    pub missed: i64,
    pub target: i64,
    pub head: i64,
    pub delay: i64,
}

impl Shortfall {
    pub fn total(&self) -> Result<i64, Error> {
        Ok(self
            .missed
            .safe_add(self.target)?
            .safe_add(self.head)?
            .safe_add(self.delay)?)
    }
}

/// The outcome of a single attestation duty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttestationDelta {
    pub reward: i64,
    pub max_reward: i64,
    pub shortfall: Shortfall,
}

impl RewardTotals {
    pub fn apply_attestation(&mut self, delta: &AttestationDelta) -> Result<(), Error> {
        self.attestation_reward.safe_add_assign(delta.reward)?;
        self.max_attestation_reward
            .safe_add_assign(delta.max_reward)?;
        self.shortfall_missed
            .safe_add_assign(delta.shortfall.missed)?;
        self.shortfall_target
            .safe_add_assign(delta.shortfall.target)?;
        self.shortfall_head.safe_add_assign(delta.shortfall.head)?;
        self.shortfall_delay
            .safe_add_assign(delta.shortfall.delay)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttestationPassSummary {
    pub scheduled: usize,
    pub included: usize,
}

/// Computes the reward for one attestation duty.
///
/// An included attestation earns the inclusion reward, a delay-scaled share of the base reward,
/// and the target and head rewards when those votes were correct. A wrong vote costs one base
/// reward, so the shortfall for it is the forgone reward plus that penalty. A missed attestation
/// is penalised three base rewards.
pub fn attestation_delta(
    rewards: &BucketRewards,
    max: &MaxReward,
    summary: &ValidatorEpochSummary,
    epoch: Epoch,
) -> Result<AttestationDelta, Error> {
    let mut reward = 0i64;
    let mut shortfall = Shortfall::default();

    if summary.attestation_included {
        let inclusion_delay =
            summary
                .inclusion_delay
                .ok_or(DataUnavailable::InclusionDelay {
                    validator: summary.validator_index,
                    epoch,
                })?;

        reward.safe_add_assign(rewards.inclusion)?;

        let delay_reward = rewards.delay_reward(inclusion_delay)?;
        reward.safe_add_assign(delay_reward)?;
        shortfall.delay = max.delay.safe_sub(delay_reward)?;

        if summary.target_correct {
            reward.safe_add_assign(rewards.target)?;
        } else {
            reward.safe_sub_assign(rewards.base)?;
            shortfall.target = rewards.target.safe_add(rewards.base)?;
        }

        if summary.head_correct {
            reward.safe_add_assign(rewards.head)?;
        } else {
            reward.safe_sub_assign(rewards.base)?;
            shortfall.head = rewards.head.safe_add(rewards.base)?;
        }
    } else {
        let penalty = rewards.base.safe_mul(3)?;
        reward.safe_sub_assign(penalty)?;
        shortfall.missed = max.total.safe_add(penalty)?;
    }

    Ok(AttestationDelta {
        reward,
        max_reward: max.total,
        shortfall,
    })
}

/// Credits every validator scheduled to attest in `epoch` with its attestation reward, maximum
/// reward and shortfalls.
///
/// Committee membership decides who is accounted for, whether or not the attestation landed.
/// `filled_slots` must have been advanced so that its first half covers `epoch`.
pub fn process_attestation_rewards<S: ChainDataSource>(
    source: &mut S,
    registry: &mut ValidatorRegistry,
    table: &RewardTable,
    filled_slots: &FilledSlots,
    epoch: Epoch,
) -> Result<AttestationPassSummary, Error> {
    let mut pass = AttestationPassSummary::default();
    let epoch_start = epoch.safe_mul(SLOTS_PER_EPOCH)?;

    for offset in 0..SLOTS_PER_EPOCH {
        let slot = epoch_start.safe_add(offset)?;
        let min_inclusion_delay = filled_slots
            .min_inclusion_delay(offset as usize)
            .ok_or(DataUnavailable::NoInclusionSlot(slot))?;
        let maxima = table.slot_maxima(min_inclusion_delay)?;

        for validator_index in source.scheduled_attestors(slot)? {
            let validator = registry.get_mut(validator_index)?;
            let summary = validator.summary(epoch)?;
            let effective_balance = validator.scratch.effective_balance;
            let out_of_range = Error::EffectiveBalanceOutOfRange {
                validator: validator_index,
                effective_balance,
            };
            let rewards = table
                .bucket(effective_balance)
                .ok_or_else(|| out_of_range.clone())?;
            let max = maxima.bucket(effective_balance).ok_or(out_of_range)?;

            let delta = attestation_delta(rewards, max, &summary, epoch)?;

            validator.scratch.attestation_slot = Some(slot);
            validator.scratch.this_att_reward = delta.reward;
            validator.totals.apply_attestation(&delta)?;

            pass.scheduled += 1;
            if summary.attestation_included {
                pass.included += 1;
            }
        }
    }

    Ok(pass)
}
