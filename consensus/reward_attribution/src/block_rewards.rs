use crate::{
    BalanceSnapshots, ChainDataSource, DataUnavailable, Epoch, EpochBalances, Error, FilledSlots,
    RewardTable, Validator, ValidatorRegistry, SLOTS_PER_EPOCH,
};
use log::debug;
use safe_arith::{ArithError, SafeArith};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockPassSummary {
    pub proposed: usize,
    pub missed: usize,
}

/// The block reward earned for one of `filled_duties` blocks proposed in an epoch.
///
/// Block rewards are not recorded on chain, so they are inferred as whatever part of the
/// proposer's balance change its attestation does not explain, shared evenly between its
/// proposals. The remainder of the division is dropped.
pub fn inferred_block_reward(
    balance_delta: i64,
    attestation_reward: i64,
    filled_duties: i64,
) -> Result<i64, Error> {
    let unexplained = balance_delta.safe_sub(attestation_reward)?;
    // Floor division, so that negative deltas round towards negative infinity.
    Ok(unexplained
        .checked_div_euclid(filled_duties)
        .ok_or(ArithError::DivisionByZero)?)
}

/// Credits the proposers of the slots `epoch * 32 + 1 ..= epoch * 32 + 32`.
///
/// The window is shifted one slot forward because a proposer's reward only shows up in the
/// balance recorded after its block. Proposers of filled slots get an inferred block reward,
/// proposers of empty slots accumulate an estimate of the reward they missed.
///
/// Must run after `process_attestation_rewards` for the same epoch.
pub fn process_block_rewards<S: ChainDataSource>(
    source: &mut S,
    registry: &mut ValidatorRegistry,
    table: &RewardTable,
    filled_slots: &FilledSlots,
    balances: &EpochBalances,
    epoch: Epoch,
) -> Result<BlockPassSummary, Error> {
    let proposers = shifted_proposers(source, epoch)?;
    credit_proposers(
        source,
        registry,
        table,
        filled_slots,
        balances,
        epoch,
        proposers,
        |_| true,
    )
}

/// Credits the proposers in `epoch`'s window that only activate after `epoch`.
///
/// The last slot of the window belongs to `epoch + 1`, so its proposer may have no row for
/// `epoch`. Its credit then only exists in memory, and a run resuming after `epoch` has to apply
/// it again on top of the restored accumulators. Such a validator attested nothing in `epoch`, so
/// its whole balance change counts towards the block.
pub fn replay_pending_block_rewards<S: ChainDataSource>(
    source: &mut S,
    registry: &mut ValidatorRegistry,
    epoch: Epoch,
) -> Result<BlockPassSummary, Error> {
    let proposers = shifted_proposers(source, epoch)?;

    let mut pending = false;
    for validator_index in &proposers {
        pending |= registry.get(*validator_index)?.activation_epoch > epoch;
    }
    if !pending {
        return Ok(BlockPassSummary::default());
    }

    let next_epoch = epoch.safe_add(1)?;
    let mut balances = BalanceSnapshots::new(source.epoch_summary_balances(epoch)?);
    balances.advance(source.epoch_summary_balances(next_epoch)?);
    let mut filled_slots = FilledSlots::new(source.filled_slots(epoch)?);
    filled_slots.advance(source.filled_slots(next_epoch)?);
    let table = RewardTable::from_snapshots(epoch, &balances)?;

    let pass = credit_proposers(
        source,
        registry,
        &table,
        &filled_slots,
        balances.current(),
        epoch,
        proposers,
        |validator| validator.activation_epoch > epoch,
    )?;
    debug!(
        "Replayed block rewards for pending validators, epoch: {}, proposed: {}, missed: {}",
        epoch, pass.proposed, pass.missed
    );
    Ok(pass)
}

fn shifted_proposers<S: ChainDataSource>(source: &mut S, epoch: Epoch) -> Result<Vec<usize>, Error> {
    let proposers = source.shifted_proposers(epoch)?;
    if proposers.len() != SLOTS_PER_EPOCH as usize {
        return Err(DataUnavailable::ProposerDuties {
            epoch,
            found: proposers.len(),
        }
        .into());
    }
    Ok(proposers)
}

/// Applies the block pass to every proposer for which `credit` holds. Filled duties are counted
/// over the whole window regardless.
#[allow(clippy::too_many_arguments)]
fn credit_proposers<S: ChainDataSource>(
    source: &mut S,
    registry: &mut ValidatorRegistry,
    table: &RewardTable,
    filled_slots: &FilledSlots,
    balances: &EpochBalances,
    epoch: Epoch,
    proposers: Vec<usize>,
    credit: impl Fn(&Validator) -> bool,
) -> Result<BlockPassSummary, Error> {
    let mut filled_duties: HashMap<usize, i64> = HashMap::new();
    for (offset, validator_index) in proposers.iter().enumerate() {
        if filled_slots.is_filled(offset + 1) {
            *filled_duties.entry(*validator_index).or_default() += 1;
        }
    }

    let missed_block_reward = table.missed_block_estimate(balances.attesting)?;
    let mut pass = BlockPassSummary::default();

    for (offset, validator_index) in proposers.into_iter().enumerate() {
        if !credit(registry.get(validator_index)?) {
            continue;
        }

        if filled_slots.is_filled(offset + 1) {
            let balance_delta = source.balance_delta(validator_index, epoch)?;
            let duties = filled_duties.get(&validator_index).copied().unwrap_or(1);

            let validator = registry.get_mut(validator_index)?;
            let block_reward =
                inferred_block_reward(balance_delta, validator.scratch.this_att_reward, duties)?;
            validator.totals.block_reward.safe_add_assign(block_reward)?;
            pass.proposed += 1;
        } else {
            registry
                .get_mut(validator_index)?
                .totals
                .missed_block_reward
                .safe_add_assign(missed_block_reward)?;
            pass.missed += 1;
        }
    }

    Ok(pass)
}
