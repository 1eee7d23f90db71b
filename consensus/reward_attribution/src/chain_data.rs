use crate::{Epoch, Error, Slot, SLOTS_PER_EPOCH};
use safe_arith::SafeArith;
use std::collections::HashMap;

/// Canonical block occupancy for each slot of one epoch.
pub type EpochSlots = [bool; SLOTS_PER_EPOCH as usize];

/// Static facts about a validator, as recorded in the validator registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorRecord {
    pub index: usize,
    pub activation_epoch: Epoch,
    pub exit_epoch: Epoch,
    pub slashed: bool,
    pub pubkey: Vec<u8>,
}

/// Aggregate effective balances (in gwei) for one epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpochBalances {
    pub active: u64,
    pub attesting: u64,
    pub target: u64,
    pub head: u64,
}

/// A validator's participation in one epoch, as summarised by the indexer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidatorEpochSummary {
    pub validator_index: usize,
    pub proposer_duties: u32,
    pub proposals_included: u32,
    pub attestation_included: bool,
    pub target_correct: bool,
    pub head_correct: bool,
    /// Only present when `attestation_included` is true.
    pub inclusion_delay: Option<u64>,
}

/// Running reward accounting for a single validator. Every value is in gwei and accumulates from
/// the first processed epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewardTotals {
    pub attestation_reward: i64,
    pub max_attestation_reward: i64,
    pub shortfall_missed: i64,
    pub shortfall_target: i64,
    pub shortfall_head: i64,
    pub shortfall_delay: i64,
    pub block_reward: i64,
    pub missed_block_reward: i64,
}

impl RewardTotals {
    /// Sum of the four shortfall categories.
    pub fn total_shortfall(&self) -> Result<i64, Error> {
        Ok(self
            .shortfall_missed
            .safe_add(self.shortfall_target)?
            .safe_add(self.shortfall_head)?
            .safe_add(self.shortfall_delay)?)
    }
}

/// One persisted row: the state of a validator's accumulators at the end of `epoch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochExtras {
    pub epoch: Epoch,
    pub validator_index: usize,
    pub attestation_slot: Option<Slot>,
    pub totals: RewardTotals,
}

/// Read access to the historical chain data the engine reconstructs rewards from.
///
/// Methods take `&mut self` so that implementations may hold a single database connection.
pub trait ChainDataSource {
    /// Every validator known to the chain, ordered by index.
    fn validator_records(&mut self) -> Result<Vec<ValidatorRecord>, Error>;

    /// Effective balance series (in increments, one entry per epoch from activation) for every
    /// validator whose effective balance ever differed from the protocol maximum.
    fn impaired_effective_balances(&mut self) -> Result<HashMap<usize, Vec<u64>>, Error>;

    /// The highest epoch with persisted extras, if any.
    fn latest_extras_epoch(&mut self) -> Result<Option<Epoch>, Error>;

    /// The highest epoch with an epoch summary, if any.
    fn latest_summary_epoch(&mut self) -> Result<Option<Epoch>, Error>;

    /// All persisted extras rows for `epoch`.
    fn epoch_extras(&mut self, epoch: Epoch) -> Result<Vec<EpochExtras>, Error>;

    /// Must return `DataUnavailable::EpochNotFound` if no summary exists for `epoch`.
    fn epoch_summary_balances(&mut self, epoch: Epoch) -> Result<EpochBalances, Error>;

    fn filled_slots(&mut self, epoch: Epoch) -> Result<EpochSlots, Error>;

    fn validator_epoch_summaries(
        &mut self,
        epoch: Epoch,
    ) -> Result<Vec<ValidatorEpochSummary>, Error>;

    /// Indices of every validator in every committee assigned to `slot`.
    fn scheduled_attestors(&mut self, slot: Slot) -> Result<Vec<usize>, Error>;

    /// Proposers for the slots `epoch * 32 + 1 ..= epoch * 32 + 32`, ordered by slot.
    fn shifted_proposers(&mut self, epoch: Epoch) -> Result<Vec<usize>, Error>;

    /// The validator's balance at `epoch + 2` minus its balance at `epoch + 1`.
    fn balance_delta(&mut self, validator_index: usize, epoch: Epoch) -> Result<i64, Error>;
}

/// Durable storage for the engine's output.
///
/// An epoch is written as `begin_epoch_write`, one or more `insert_epoch_extras` calls, then
/// either `commit_epoch_write` or `abort_epoch_write`. Sinks that support transactions should make
/// the rows of an epoch visible only on commit, so that a writer dying half way leaves no trace.
pub trait ExtrasSink {
    fn begin_epoch_write(&mut self, _epoch: Epoch) -> Result<(), Error> {
        Ok(())
    }

    fn insert_epoch_extras(&mut self, epoch: Epoch, rows: &[EpochExtras]) -> Result<(), Error>;

    fn commit_epoch_write(&mut self, _epoch: Epoch) -> Result<(), Error> {
        Ok(())
    }

    /// Discards the rows inserted since `begin_epoch_write`, returning how many there were.
    fn abort_epoch_write(&mut self, epoch: Epoch) -> Result<usize, Error> {
        self.delete_epoch_extras(epoch)
    }

    /// Removes every row for `epoch`, returning the number of rows deleted.
    fn delete_epoch_extras(&mut self, epoch: Epoch) -> Result<usize, Error>;
}
