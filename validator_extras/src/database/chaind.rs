use crate::database::models::{
    to_i64, to_index, to_u64, ChaindEpochSummary, ChaindValidator, ChaindValidatorEpochSummary,
    ValidatorEpochExtrasRow,
};
use crate::database::{Error, PgConn};
use crate::effective_balance_cache::{self, ImpairedBalances};
use diesel::connection::{AnsiTransactionManager, TransactionManager};
use diesel::dsl::max;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use log::{debug, info};
use reward_attribution::{
    ChainDataSource, DataUnavailable, Epoch, EpochBalances, EpochExtras, EpochSlots,
    Error as RewardError, ExtrasSink, Slot, ValidatorEpochSummary, ValidatorRecord,
    EFFECTIVE_BALANCE_INCREMENT, MAX_EFFECTIVE_BALANCE_INCREMENTS, SLOTS_PER_EPOCH,
};
use safe_arith::SafeArith;
use std::path::PathBuf;
use std::time::Instant;

/// First and last slot of the 32 slot range starting `shift` slots into `epoch`.
fn slot_range(epoch: Epoch, shift: u64) -> Result<(i64, i64), Error> {
    let first_slot = epoch.safe_mul(SLOTS_PER_EPOCH)?.safe_add(shift)?;
    let last_slot = first_slot.safe_add(SLOTS_PER_EPOCH - 1)?;
    Ok((to_i64("f_slot", first_slot)?, to_i64("f_slot", last_slot)?))
}

/// Reads chain data from the tables populated by chaind and writes the computed extras back to
/// the same database.
pub struct ChaindStore {
    conn: PgConn,
    effective_balance_cache: PathBuf,
    /// Rows inserted in the open epoch transaction.
    pending_rows: usize,
}

impl ChaindStore {
    pub fn new(conn: PgConn, effective_balance_cache: PathBuf) -> Self {
        Self {
            conn,
            effective_balance_cache,
            pending_rows: 0,
        }
    }

    /// Every validator whose effective balance was ever below the maximum, with its effective
    /// balance series in increments, ordered by epoch.
    fn query_impaired_effective_balances(&mut self) -> Result<ImpairedBalances, Error> {
        use crate::database::schema::t_validator_balances::dsl::*;

        let timer = Instant::now();
        let max_effective_balance = to_i64(
            "f_effective_balance",
            MAX_EFFECTIVE_BALANCE_INCREMENTS * EFFECTIVE_BALANCE_INCREMENT,
        )?;
        let impaired = t_validator_balances
            .select(f_validator_index)
            .filter(f_effective_balance.ne(max_effective_balance))
            .distinct()
            .load::<i64>(&mut self.conn)?;
        info!(
            "Identified impaired validators, count: {}, time_taken: {:?}",
            impaired.len(),
            timer.elapsed()
        );

        let mut balances = ImpairedBalances::with_capacity(impaired.len());
        for validator_index in impaired {
            let series = t_validator_balances
                .select(f_effective_balance)
                .filter(f_validator_index.eq(validator_index))
                .order(f_epoch.asc())
                .load::<i64>(&mut self.conn)?
                .into_iter()
                .map(|balance| {
                    to_u64("f_effective_balance", balance)
                        .map(|balance| balance / EFFECTIVE_BALANCE_INCREMENT)
                })
                .collect::<Result<Vec<_>, _>>()?;
            balances.insert(to_index("f_validator_index", validator_index)?, series);
        }

        Ok(balances)
    }

    /// `bal(epoch + 2) - bal(epoch + 1)`, or `None` if either balance is missing.
    fn query_balance_delta(
        &mut self,
        validator_index: usize,
        epoch: Epoch,
    ) -> Result<Option<i64>, Error> {
        use crate::database::schema::t_validator_balances::dsl::*;

        let before = to_i64("f_epoch", epoch.safe_add(1)?)?;
        let after = to_i64("f_epoch", epoch.safe_add(2)?)?;
        let balances = t_validator_balances
            .select((f_epoch, f_balance))
            .filter(f_validator_index.eq(to_i64("f_validator_index", validator_index as u64)?))
            .filter(f_epoch.eq_any(vec![before, after]))
            .order(f_epoch.asc())
            .load::<(i64, i64)>(&mut self.conn)?;

        match balances.as_slice() {
            [(first, before_balance), (second, after_balance)]
                if *first == before && *second == after =>
            {
                Ok(Some(after_balance - before_balance))
            }
            _ => Ok(None),
        }
    }
}

impl ChainDataSource for ChaindStore {
    fn validator_records(&mut self) -> Result<Vec<ValidatorRecord>, RewardError> {
        use crate::database::schema::t_validators::dsl::*;

        let records = t_validators
            .select((
                f_index,
                f_public_key,
                f_activation_epoch,
                f_exit_epoch,
                f_slashed,
            ))
            .order(f_index.asc())
            .load::<ChaindValidator>(&mut self.conn)
            .map_err(Error::from)?
            .into_iter()
            .map(ChaindValidator::into_record)
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Validators read, count: {}", records.len());
        Ok(records)
    }

    fn impaired_effective_balances(&mut self) -> Result<ImpairedBalances, RewardError> {
        if let Some(balances) = effective_balance_cache::load(&self.effective_balance_cache)? {
            return Ok(balances);
        }

        let balances = self.query_impaired_effective_balances()?;
        effective_balance_cache::store(&self.effective_balance_cache, &balances)?;
        Ok(balances)
    }

    fn latest_extras_epoch(&mut self) -> Result<Option<Epoch>, RewardError> {
        use crate::database::schema::t_validator_epoch_extras::dsl::*;

        let epoch = t_validator_epoch_extras
            .select(max(f_epoch))
            .first::<Option<i64>>(&mut self.conn)
            .map_err(Error::from)?;
        Ok(epoch.map(|epoch| to_u64("f_epoch", epoch)).transpose()?)
    }

    fn latest_summary_epoch(&mut self) -> Result<Option<Epoch>, RewardError> {
        use crate::database::schema::t_epoch_summaries::dsl::*;

        let epoch = t_epoch_summaries
            .select(max(f_epoch))
            .first::<Option<i64>>(&mut self.conn)
            .map_err(Error::from)?;
        Ok(epoch.map(|epoch| to_u64("f_epoch", epoch)).transpose()?)
    }

    fn epoch_extras(&mut self, epoch: Epoch) -> Result<Vec<EpochExtras>, RewardError> {
        use crate::database::schema::t_validator_epoch_extras::dsl::*;

        let rows = t_validator_epoch_extras
            .filter(f_epoch.eq(to_i64("f_epoch", epoch)?))
            .order(f_validator_index.asc())
            .load::<ValidatorEpochExtrasRow>(&mut self.conn)
            .map_err(Error::from)?;

        Ok(rows
            .into_iter()
            .map(ValidatorEpochExtrasRow::into_extras)
            .collect::<Result<Vec<_>, _>>()?)
    }

    fn epoch_summary_balances(&mut self, epoch: Epoch) -> Result<EpochBalances, RewardError> {
        use crate::database::schema::t_epoch_summaries::dsl::*;

        let summary = t_epoch_summaries
            .select((
                f_active_balance,
                f_attesting_balance,
                f_target_correct_balance,
                f_head_correct_balance,
            ))
            .filter(f_epoch.eq(to_i64("f_epoch", epoch)?))
            .first::<ChaindEpochSummary>(&mut self.conn)
            .optional()
            .map_err(Error::from)?
            .ok_or(DataUnavailable::EpochNotFound(epoch))?;

        Ok(summary.into_balances()?)
    }

    fn filled_slots(&mut self, epoch: Epoch) -> Result<EpochSlots, RewardError> {
        use crate::database::schema::t_blocks::dsl::*;

        let (first_slot, last_slot) = slot_range(epoch, 0)?;
        let slots = t_blocks
            .select(f_slot)
            .filter(f_slot.between(first_slot, last_slot))
            .filter(f_canonical.eq(true))
            .load::<i64>(&mut self.conn)
            .map_err(Error::from)?;

        let mut filled = [false; SLOTS_PER_EPOCH as usize];
        for slot in slots {
            filled[(slot - first_slot) as usize] = true;
        }
        Ok(filled)
    }

    fn validator_epoch_summaries(
        &mut self,
        epoch: Epoch,
    ) -> Result<Vec<ValidatorEpochSummary>, RewardError> {
        use crate::database::schema::t_validator_epoch_summaries::dsl::*;

        let summaries = t_validator_epoch_summaries
            .select((
                f_validator_index,
                f_proposer_duties,
                f_proposals_included,
                f_attestation_included,
                f_attestation_target_correct,
                f_attestation_head_correct,
                f_attestation_inclusion_delay,
            ))
            .filter(f_epoch.eq(to_i64("f_epoch", epoch)?))
            .load::<ChaindValidatorEpochSummary>(&mut self.conn)
            .map_err(Error::from)?;

        Ok(summaries
            .into_iter()
            .map(ChaindValidatorEpochSummary::into_summary)
            .collect::<Result<Vec<_>, _>>()?)
    }

    fn scheduled_attestors(&mut self, slot: Slot) -> Result<Vec<usize>, RewardError> {
        use crate::database::schema::t_beacon_committees::dsl::*;

        let committees = t_beacon_committees
            .select(f_committee)
            .filter(f_slot.eq(to_i64("f_slot", slot)?))
            .order(f_index.asc())
            .load::<Vec<i64>>(&mut self.conn)
            .map_err(Error::from)?;

        Ok(committees
            .into_iter()
            .flatten()
            .map(|validator_index| to_index("f_committee", validator_index))
            .collect::<Result<Vec<_>, _>>()?)
    }

    fn shifted_proposers(&mut self, epoch: Epoch) -> Result<Vec<usize>, RewardError> {
        use crate::database::schema::t_proposer_duties::dsl::*;

        let (first_slot, last_slot) = slot_range(epoch, 1)?;
        let proposers = t_proposer_duties
            .select(f_validator_index)
            .filter(f_slot.between(first_slot, last_slot))
            .order(f_slot.asc())
            .load::<i64>(&mut self.conn)
            .map_err(Error::from)?;

        Ok(proposers
            .into_iter()
            .map(|validator_index| to_index("f_validator_index", validator_index))
            .collect::<Result<Vec<_>, _>>()?)
    }

    fn balance_delta(&mut self, validator_index: usize, epoch: Epoch) -> Result<i64, RewardError> {
        let delta = self.query_balance_delta(validator_index, epoch)?;
        delta.ok_or_else(|| {
            DataUnavailable::BalanceDelta {
                validator: validator_index,
                epoch,
            }
            .into()
        })
    }
}

/// Each epoch is written inside one transaction, so a process killed between batches leaves no
/// partial epoch behind.
impl ExtrasSink for ChaindStore {
    fn begin_epoch_write(&mut self, _epoch: Epoch) -> Result<(), RewardError> {
        let conn: &mut PgConnection = &mut self.conn;
        AnsiTransactionManager::begin_transaction(conn).map_err(Error::from)?;
        self.pending_rows = 0;
        Ok(())
    }

    fn insert_epoch_extras(
        &mut self,
        epoch: Epoch,
        rows: &[EpochExtras],
    ) -> Result<(), RewardError> {
        use crate::database::schema::t_validator_epoch_extras::dsl::*;

        let rows = rows
            .iter()
            .map(ValidatorEpochExtrasRow::from_extras)
            .collect::<Result<Vec<_>, _>>()?;

        let count = diesel::insert_into(t_validator_epoch_extras)
            .values(&rows)
            .execute(&mut self.conn)
            .map_err(Error::from)?;
        self.pending_rows += count;

        debug!(
            "Validator epoch extras inserted, epoch: {}, count: {}",
            epoch, count
        );
        Ok(())
    }

    fn commit_epoch_write(&mut self, epoch: Epoch) -> Result<(), RewardError> {
        let conn: &mut PgConnection = &mut self.conn;
        AnsiTransactionManager::commit_transaction(conn).map_err(Error::from)?;
        debug!(
            "Validator epoch extras committed, epoch: {}, count: {}",
            epoch, self.pending_rows
        );
        self.pending_rows = 0;
        Ok(())
    }

    fn abort_epoch_write(&mut self, _epoch: Epoch) -> Result<usize, RewardError> {
        let conn: &mut PgConnection = &mut self.conn;
        AnsiTransactionManager::rollback_transaction(conn).map_err(Error::from)?;
        Ok(std::mem::take(&mut self.pending_rows))
    }

    fn delete_epoch_extras(&mut self, epoch: Epoch) -> Result<usize, RewardError> {
        use crate::database::schema::t_validator_epoch_extras::dsl::*;

        let epoch = to_i64("f_epoch", epoch)?;
        let count = diesel::delete(t_validator_epoch_extras.filter(f_epoch.eq(epoch)))
            .execute(&mut self.conn)
            .map_err(Error::from)?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use safe_arith::ArithError;

    #[test]
    fn epoch_slot_ranges() {
        assert_eq!(slot_range(0, 0).unwrap(), (0, 31));
        assert_eq!(slot_range(2, 0).unwrap(), (64, 95));
        assert_eq!(slot_range(2, 1).unwrap(), (65, 96));
    }

    #[test]
    fn slot_range_overflow() {
        assert!(matches!(
            slot_range(u64::MAX / SLOTS_PER_EPOCH + 1, 0),
            Err(Error::ArithError(ArithError::Overflow))
        ));
        assert!(matches!(
            slot_range(u64::MAX / SLOTS_PER_EPOCH, 0),
            Err(Error::InvalidInteger("f_slot"))
        ));
    }
}
