use crate::{
    ChainDataSource, DataUnavailable, EffectiveBalances, Epoch, EpochExtras, Error, RewardTotals,
    Slot, ValidatorEpochSummary, ValidatorRecord,
};
use log::debug;

/// Values that are only meaningful for the epoch currently being processed.
///
/// Cleared by `ValidatorRegistry::begin_epoch` so that nothing leaks from one epoch into the next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpochScratch {
    pub summary: Option<ValidatorEpochSummary>,
    /// In increments.
    pub effective_balance: u64,
    pub attestation_slot: Option<Slot>,
    /// Attestation reward earned this epoch, consumed when inferring block rewards.
    pub this_att_reward: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validator {
    pub index: usize,
    pub activation_epoch: Epoch,
    pub exit_epoch: Epoch,
    pub slashed: bool,
    pub pubkey: Vec<u8>,
    pub totals: RewardTotals,
    pub scratch: EpochScratch,
}

impl Validator {
    pub fn from_record(record: ValidatorRecord) -> Self {
        Self {
            index: record.index,
            activation_epoch: record.activation_epoch,
            exit_epoch: record.exit_epoch,
            slashed: record.slashed,
            pubkey: record.pubkey,
            totals: RewardTotals::default(),
            scratch: EpochScratch::default(),
        }
    }

    pub fn is_active_at(&self, epoch: Epoch) -> bool {
        self.activation_epoch <= epoch && epoch < self.exit_epoch
    }

    /// The participation summary loaded for `epoch`.
    pub fn summary(&self, epoch: Epoch) -> Result<ValidatorEpochSummary, Error> {
        self.scratch.summary.ok_or_else(|| {
            DataUnavailable::ValidatorSummary {
                validator: self.index,
                epoch,
            }
            .into()
        })
    }

    pub fn extras(&self, epoch: Epoch) -> EpochExtras {
        EpochExtras {
            epoch,
            validator_index: self.index,
            attestation_slot: self.scratch.attestation_slot,
            totals: self.totals,
        }
    }
}

/// Every validator in the chain, addressed by index, along with their running reward totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorRegistry {
    validators: Vec<Validator>,
}

impl ValidatorRegistry {
    /// Builds a registry with zeroed accumulators. `records` may be in any order but must cover
    /// every index from zero without gaps.
    pub fn new(mut records: Vec<ValidatorRecord>) -> Result<Self, Error> {
        if records.is_empty() {
            return Err(DataUnavailable::EmptyValidatorSet.into());
        }

        records.sort_by_key(|record| record.index);
        if let Some(position) = records
            .iter()
            .enumerate()
            .position(|(position, record)| record.index != position)
        {
            return Err(DataUnavailable::UnknownValidator(position).into());
        }

        Ok(Self {
            validators: records.into_iter().map(Validator::from_record).collect(),
        })
    }

    /// Loads the validator set from `source` and, when `resume_from` is given, restores the
    /// accumulators persisted for that epoch.
    pub fn initialize<S: ChainDataSource>(
        source: &mut S,
        resume_from: Option<Epoch>,
    ) -> Result<Self, Error> {
        let mut registry = Self::new(source.validator_records()?)?;

        if let Some(epoch) = resume_from {
            let rows = source.epoch_extras(epoch)?;
            debug!(
                "Restoring validator accumulators, epoch: {}, rows: {}",
                epoch,
                rows.len()
            );
            registry.restore(&rows)?;
        }

        Ok(registry)
    }

    /// Overwrites accumulators with the persisted `rows`. Scratch values are left untouched.
    pub fn restore(&mut self, rows: &[EpochExtras]) -> Result<(), Error> {
        for row in rows {
            self.get_mut(row.validator_index)?.totals = row.totals;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Validator> {
        self.validators.iter()
    }

    pub fn get(&self, index: usize) -> Result<&Validator, Error> {
        self.validators
            .get(index)
            .ok_or_else(|| DataUnavailable::UnknownValidator(index).into())
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut Validator, Error> {
        self.validators
            .get_mut(index)
            .ok_or_else(|| DataUnavailable::UnknownValidator(index).into())
    }

    /// Clears every validator's scratch values, then loads the participation `summaries` and
    /// effective balances for `epoch`.
    pub fn begin_epoch(
        &mut self,
        epoch: Epoch,
        summaries: Vec<ValidatorEpochSummary>,
        effective_balances: &EffectiveBalances,
    ) -> Result<(), Error> {
        for validator in &mut self.validators {
            validator.scratch = EpochScratch::default();
        }

        for summary in summaries {
            let validator = self.get_mut(summary.validator_index)?;
            validator.scratch.effective_balance = effective_balances.effective_balance(
                validator.index,
                validator.activation_epoch,
                epoch,
            )?;
            validator.scratch.summary = Some(summary);
        }

        Ok(())
    }

    /// One row per validator active at `epoch`.
    pub fn epoch_extras(&self, epoch: Epoch) -> Vec<EpochExtras> {
        self.validators
            .iter()
            .filter(|validator| validator.is_active_at(epoch))
            .map(|validator| validator.extras(epoch))
            .collect()
    }
}
