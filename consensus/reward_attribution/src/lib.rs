//! Reconstructs the phase 0 reward and penalty accounting applied to each validator in each
//! epoch, using only historical chain data that has already been persisted.
//!
//! For every epoch the engine computes the maximum attestation reward each scheduled validator
//! could have earned, the reward it actually earned, the shortfall between the two broken down by
//! cause (missed, wrong target, wrong head, late inclusion) and the block proposal rewards inferred
//! from balance changes.
//!
//! All I/O goes through the [`ChainDataSource`] and [`ExtrasSink`] traits.
mod attestation_rewards;
mod balances;
mod block_rewards;
mod chain_data;
mod engine;
mod errors;
mod filled_slots;
mod reward_table;
mod validator_registry;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use attestation_rewards::{
    attestation_delta, process_attestation_rewards, AttestationDelta, AttestationPassSummary,
    Shortfall,
};
pub use balances::{BalanceSnapshots, EffectiveBalances};
pub use block_rewards::{
    inferred_block_reward, process_block_rewards, replay_pending_block_rewards, BlockPassSummary,
};
pub use chain_data::{
    ChainDataSource, EpochBalances, EpochExtras, EpochSlots, ExtrasSink, RewardTotals,
    ValidatorEpochSummary, ValidatorRecord,
};
pub use engine::{
    EngineConfig, EpochOutcome, RewardEngine, RunOutcome, DEFAULT_INSERT_BATCH_SIZE,
    DEFAULT_PROGRESS_INTERVAL,
};
pub use errors::{DataUnavailable, Error};
pub use filled_slots::FilledSlots;
pub use reward_table::{BucketRewards, MaxReward, RewardTable, SlotMaxima};
pub use validator_registry::{EpochScratch, Validator, ValidatorRegistry};

pub type Epoch = u64;
pub type Slot = u64;

pub const SLOTS_PER_EPOCH: u64 = 32;
/// Sentinel used for activation and exit epochs that have not been set.
pub const FAR_FUTURE_EPOCH: Epoch = u64::MAX;
/// Effective balances are tracked in whole multiples of this many gwei.
pub const EFFECTIVE_BALANCE_INCREMENT: u64 = 1_000_000_000;
/// The protocol ceiling for effective balance, in increments.
pub const MAX_EFFECTIVE_BALANCE_INCREMENTS: u64 = 32;
pub const BASE_REWARD_FACTOR: u64 = 64;
pub const BASE_REWARDS_PER_EPOCH: u64 = 4;
pub const PROPOSER_REWARD_QUOTIENT: u64 = 8;
