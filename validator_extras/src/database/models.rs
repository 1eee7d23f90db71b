use crate::database::{schema::t_validator_epoch_extras, Error};
use diesel::{Insertable, Queryable};
use reward_attribution::{
    EpochBalances, EpochExtras, RewardTotals, ValidatorEpochSummary, ValidatorRecord,
    FAR_FUTURE_EPOCH,
};

pub fn to_u64(column: &'static str, value: i64) -> Result<u64, Error> {
    u64::try_from(value).map_err(|_| Error::InvalidInteger(column))
}

pub fn to_i64(column: &'static str, value: u64) -> Result<i64, Error> {
    i64::try_from(value).map_err(|_| Error::InvalidInteger(column))
}

pub fn to_index(column: &'static str, value: i64) -> Result<usize, Error> {
    usize::try_from(value).map_err(|_| Error::InvalidInteger(column))
}

/// A row of `t_validators`.
#[derive(Debug, Queryable)]
pub struct ChaindValidator {
    pub index: i64,
    pub public_key: Vec<u8>,
    pub activation_epoch: Option<i64>,
    pub exit_epoch: Option<i64>,
    pub slashed: bool,
}

impl ChaindValidator {
    /// chaind leaves unset epochs `NULL`.
    pub fn into_record(self) -> Result<ValidatorRecord, Error> {
        let epoch = |column, value: Option<i64>| {
            value.map_or(Ok(FAR_FUTURE_EPOCH), |epoch| to_u64(column, epoch))
        };
        Ok(ValidatorRecord {
            index: to_index("f_index", self.index)?,
            activation_epoch: epoch("f_activation_epoch", self.activation_epoch)?,
            exit_epoch: epoch("f_exit_epoch", self.exit_epoch)?,
            slashed: self.slashed,
            pubkey: self.public_key,
        })
    }
}

/// A row of `t_epoch_summaries`, balances in gwei.
#[derive(Debug, Queryable)]
pub struct ChaindEpochSummary {
    pub active_balance: i64,
    pub attesting_balance: i64,
    pub target_correct_balance: i64,
    pub head_correct_balance: i64,
}

impl ChaindEpochSummary {
    pub fn into_balances(self) -> Result<EpochBalances, Error> {
        Ok(EpochBalances {
            active: to_u64("f_active_balance", self.active_balance)?,
            attesting: to_u64("f_attesting_balance", self.attesting_balance)?,
            target: to_u64("f_target_correct_balance", self.target_correct_balance)?,
            head: to_u64("f_head_correct_balance", self.head_correct_balance)?,
        })
    }
}

/// A row of `t_validator_epoch_summaries`.
#[derive(Debug, Queryable)]
pub struct ChaindValidatorEpochSummary {
    pub validator_index: i64,
    pub proposer_duties: i32,
    pub proposals_included: i32,
    pub attestation_included: bool,
    pub target_correct: Option<bool>,
    pub head_correct: Option<bool>,
    pub inclusion_delay: Option<i32>,
}

impl ChaindValidatorEpochSummary {
    pub fn into_summary(self) -> Result<ValidatorEpochSummary, Error> {
        let count = |column, value: i32| {
            u32::try_from(value).map_err(|_| Error::InvalidInteger(column))
        };
        Ok(ValidatorEpochSummary {
            validator_index: to_index("f_validator_index", self.validator_index)?,
            proposer_duties: count("f_proposer_duties", self.proposer_duties)?,
            proposals_included: count("f_proposals_included", self.proposals_included)?,
            attestation_included: self.attestation_included,
            target_correct: self.target_correct.unwrap_or(false),
            head_correct: self.head_correct.unwrap_or(false),
            inclusion_delay: self
                .inclusion_delay
                .map(|delay| {
                    u64::try_from(delay)
                        .map_err(|_| Error::InvalidInteger("f_attestation_inclusion_delay"))
                })
                .transpose()?,
        })
    }
}

/// A row of `t_validator_epoch_extras`. Totals are cumulative up to and including `epoch`.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Insertable)]
#[diesel(table_name = t_validator_epoch_extras)]
pub struct ValidatorEpochExtrasRow {
    #[diesel(column_name = f_epoch)]
    pub epoch: i64,
    #[diesel(column_name = f_validator_index)]
    pub validator_index: i64,
    #[diesel(column_name = f_attestation_slot)]
    pub attestation_slot: Option<i64>,
    #[diesel(column_name = f_attestation_reward)]
    pub attestation_reward: i64,
    #[diesel(column_name = f_max_attestation_reward)]
    pub max_attestation_reward: i64,
    #[diesel(column_name = f_shortfall_missed)]
    pub shortfall_missed: i64,
    #[diesel(column_name = f_shortfall_target)]
    pub shortfall_target: i64,
    #[diesel(column_name = f_shortfall_head)]
    pub shortfall_head: i64,
    #[diesel(column_name = f_shortfall_delay)]
    pub shortfall_delay: i64,
    #[diesel(column_name = f_block_reward)]
    pub block_reward: i64,
    #[diesel(column_name = f_missed_block_reward)]
    pub missed_block_reward: i64,
}

impl ValidatorEpochExtrasRow {
    pub fn from_extras(extras: &EpochExtras) -> Result<Self, Error> {
        let totals = &extras.totals;
        Ok(Self {
            epoch: to_i64("f_epoch", extras.epoch)?,
            validator_index: to_i64("f_validator_index", extras.validator_index as u64)?,
            attestation_slot: extras
                .attestation_slot
                .map(|slot| to_i64("f_attestation_slot", slot))
                .transpose()?,
            attestation_reward: totals.attestation_reward,
            max_attestation_reward: totals.max_attestation_reward,
            shortfall_missed: totals.shortfall_missed,
            shortfall_target: totals.shortfall_target,
            shortfall_head: totals.shortfall_head,
            shortfall_delay: totals.shortfall_delay,
            block_reward: totals.block_reward,
            missed_block_reward: totals.missed_block_reward,
        })
    }

    pub fn into_extras(self) -> Result<EpochExtras, Error> {
        Ok(EpochExtras {
            epoch: to_u64("f_epoch", self.epoch)?,
            validator_index: to_index("f_validator_index", self.validator_index)?,
            attestation_slot: self
                .attestation_slot
                .map(|slot| to_u64("f_attestation_slot", slot))
                .transpose()?,
            totals: RewardTotals {
                attestation_reward: self.attestation_reward,
                max_attestation_reward: self.max_attestation_reward,
                shortfall_missed: self.shortfall_missed,
                shortfall_target: self.shortfall_target,
                shortfall_head: self.shortfall_head,
                shortfall_delay: self.shortfall_delay,
                block_reward: self.block_reward,
                missed_block_reward: self.missed_block_reward,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extras_row_conversion() {
        let extras = EpochExtras {
            epoch: 1_000,
            validator_index: 21_063,
            attestation_slot: Some(32_017),
            totals: RewardTotals {
                attestation_reward: -48_570,
                max_attestation_reward: 12_000,
                shortfall_missed: 60_570,
                block_reward: 2_000_000,
                ..Default::default()
            },
        };

        let row = ValidatorEpochExtrasRow::from_extras(&extras).unwrap();
        assert_eq!(row.attestation_reward, -48_570);
        assert_eq!(row.attestation_slot, Some(32_017));
        assert_eq!(row.into_extras().unwrap(), extras);
    }

    #[test]
    fn unset_epochs_are_far_future() {
        let record = ChaindValidator {
            index: 3,
            public_key: vec![0xaa; 48],
            activation_epoch: Some(0),
            exit_epoch: None,
            slashed: false,
        }
        .into_record()
        .unwrap();

        assert_eq!(record.activation_epoch, 0);
        assert_eq!(record.exit_epoch, FAR_FUTURE_EPOCH);
    }

    #[test]
    fn negative_balance_is_rejected() {
        let summary = ChaindEpochSummary {
            active_balance: -1,
            attesting_balance: 0,
            target_correct_balance: 0,
            head_correct_balance: 0,
        };
        assert!(matches!(
            summary.into_balances(),
            Err(Error::InvalidInteger("f_active_balance"))
        ));
    }

    #[test]
    fn missing_votes_are_incorrect() {
        let summary = ChaindValidatorEpochSummary {
            validator_index: 7,
            proposer_duties: 0,
            proposals_included: 0,
            attestation_included: false,
            target_correct: None,
            head_correct: None,
            inclusion_delay: None,
        }
        .into_summary()
        .unwrap();

        assert!(!summary.target_correct);
        assert!(!summary.head_correct);
        assert_eq!(summary.inclusion_delay, None);
    }
}
