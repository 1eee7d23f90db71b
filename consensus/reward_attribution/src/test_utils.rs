//! An in-memory chain for exercising the engine without a database.
use crate::{
    ChainDataSource, DataUnavailable, Epoch, EpochBalances, EpochExtras, EpochSlots, Error,
    ExtrasSink, Slot, ValidatorEpochSummary, ValidatorRecord, EFFECTIVE_BALANCE_INCREMENT,
    FAR_FUTURE_EPOCH, MAX_EFFECTIVE_BALANCE_INCREMENTS, SLOTS_PER_EPOCH,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct MemoryChain {
    pub validators: Vec<ValidatorRecord>,
    pub impaired: HashMap<usize, Vec<u64>>,
    pub epoch_summaries: BTreeMap<Epoch, EpochBalances>,
    /// Slots with a canonical block.
    pub blocks: BTreeSet<Slot>,
    pub validator_summaries: BTreeMap<Epoch, Vec<ValidatorEpochSummary>>,
    pub committees: BTreeMap<Slot, Vec<usize>>,
    pub proposers: BTreeMap<Slot, usize>,
    /// Keyed by `(validator_index, epoch)`.
    pub balances: BTreeMap<(usize, Epoch), i64>,
    /// Committed rows, keyed by `(epoch, validator_index)`.
    pub extras: BTreeMap<(Epoch, usize), EpochExtras>,
    /// Raises the flag after the first batch written for the epoch.
    pub interrupt_on_insert: Option<(Epoch, Arc<AtomicBool>)>,
    /// Fails the n-th (1-based) insert call for the epoch.
    pub fail_insert_at: Option<(Epoch, usize)>,
    insert_calls: HashMap<Epoch, usize>,
    /// Rows inserted since the last `begin_epoch_write`, not yet visible in `extras`.
    staged: Vec<EpochExtras>,
}

#[derive(Debug, Clone, Copy)]
pub struct SimulationParams {
    pub validators: usize,
    /// Number of epochs with an epoch summary.
    pub epochs: u64,
    pub seed: u64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            validators: 64,
            epochs: 8,
            seed: 42,
        }
    }
}

impl MemoryChain {
    /// Generates a deterministic chain with skipped slots, late and incorrect attestations,
    /// repeat proposers, one validator with a reduced effective balance, one validator that exits
    /// at epoch 3 and one that activates at epoch 2.
    pub fn simulate(params: SimulationParams) -> Self {
        let SimulationParams {
            validators,
            epochs,
            seed,
        } = params;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut chain = Self::default();

        for index in 0..validators {
            let activation_epoch = if index + 1 == validators { 2 } else { 0 };
            let exit_epoch = if index + 2 == validators {
                3
            } else {
                FAR_FUTURE_EPOCH
            };
            chain.validators.push(ValidatorRecord {
                index,
                activation_epoch,
                exit_epoch,
                slashed: false,
                pubkey: vec![index as u8; 48],
            });
        }

        if validators > 1 {
            let series = (0..epochs + 2)
                .map(|epoch| {
                    if epoch % 3 == 2 {
                        31
                    } else {
                        MAX_EFFECTIVE_BALANCE_INCREMENTS
                    }
                })
                .collect();
            chain.impaired.insert(1, series);
        }

        let last_slot = (epochs + 2) * SLOTS_PER_EPOCH;
        for slot in 0..last_slot {
            if slot % SLOTS_PER_EPOCH == 0 || rng.gen_bool(0.85) {
                chain.blocks.insert(slot);
            }
        }

        for slot in 0..=last_slot {
            let active = chain.active_indices(slot / SLOTS_PER_EPOCH);
            if let Some(proposer) = active.choose(&mut rng) {
                chain.proposers.insert(slot, *proposer);
            }
        }

        for epoch in 0..epochs {
            let mut active = chain.active_indices(epoch);
            active.shuffle(&mut rng);

            let mut balances = EpochBalances::default();
            let mut summaries = vec![];

            for (position, validator_index) in active.into_iter().enumerate() {
                let slot = epoch * SLOTS_PER_EPOCH + position as u64 % SLOTS_PER_EPOCH;
                chain
                    .committees
                    .entry(slot)
                    .or_default()
                    .push(validator_index);

                let included = rng.gen_bool(0.9);
                let target_correct = included && rng.gen_bool(0.9);
                let head_correct = included && rng.gen_bool(0.8);
                let inclusion_delay = if included {
                    let extra_delay = if rng.gen_bool(0.2) {
                        rng.gen_range(1..=2)
                    } else {
                        0
                    };
                    Some(chain.min_inclusion_delay(slot) + extra_delay)
                } else {
                    None
                };

                let effective_balance = chain.effective_balance(validator_index, epoch)
                    * EFFECTIVE_BALANCE_INCREMENT;
                balances.active += effective_balance;
                if included {
                    balances.attesting += effective_balance;
                }
                if target_correct {
                    balances.target += effective_balance;
                }
                if head_correct {
                    balances.head += effective_balance;
                }

                let epoch_slots = epoch * SLOTS_PER_EPOCH..(epoch + 1) * SLOTS_PER_EPOCH;
                let proposer_duties = epoch_slots
                    .clone()
                    .filter(|slot| chain.proposers.get(slot) == Some(&validator_index))
                    .count() as u32;
                let proposals_included = epoch_slots
                    .filter(|slot| {
                        chain.proposers.get(slot) == Some(&validator_index)
                            && chain.blocks.contains(slot)
                    })
                    .count() as u32;

                summaries.push(ValidatorEpochSummary {
                    validator_index,
                    proposer_duties,
                    proposals_included,
                    attestation_included: included,
                    target_correct,
                    head_correct,
                    inclusion_delay,
                });
            }

            chain.epoch_summaries.insert(epoch, balances);
            chain.validator_summaries.insert(epoch, summaries);
        }

        for validator_index in 0..validators {
            let mut balance =
                (MAX_EFFECTIVE_BALANCE_INCREMENTS * EFFECTIVE_BALANCE_INCREMENT) as i64;
            for epoch in 0..epochs + 2 {
                balance += rng.gen_range(-20_000..60_000);
                chain.balances.insert((validator_index, epoch), balance);
            }
        }

        chain
    }

    fn active_indices(&self, epoch: Epoch) -> Vec<usize> {
        self.validators
            .iter()
            .filter(|v| v.activation_epoch <= epoch && epoch < v.exit_epoch)
            .map(|v| v.index)
            .collect()
    }

    fn effective_balance(&self, validator_index: usize, epoch: Epoch) -> u64 {
        let activation_epoch = self.validators[validator_index].activation_epoch;
        self.impaired
            .get(&validator_index)
            .and_then(|series| series.get((epoch - activation_epoch) as usize))
            .copied()
            .unwrap_or(MAX_EFFECTIVE_BALANCE_INCREMENTS)
    }

    fn min_inclusion_delay(&self, slot: Slot) -> u64 {
        (1..)
            .find(|delay| self.blocks.contains(&(slot + delay)))
            .expect("every epoch starts with a block")
    }

    /// Distinct epochs with at least one extras row, ascending.
    pub fn extras_epochs(&self) -> Vec<Epoch> {
        self.extras
            .keys()
            .map(|(epoch, _)| *epoch)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn extras_at(&self, epoch: Epoch) -> Vec<EpochExtras> {
        self.extras
            .range((epoch, 0)..=(epoch, usize::MAX))
            .map(|(_, row)| *row)
            .collect()
    }
}

impl ChainDataSource for MemoryChain {
    fn validator_records(&mut self) -> Result<Vec<ValidatorRecord>, Error> {
        Ok(self.validators.clone())
    }

    fn impaired_effective_balances(&mut self) -> Result<HashMap<usize, Vec<u64>>, Error> {
        Ok(self.impaired.clone())
    }

    fn latest_extras_epoch(&mut self) -> Result<Option<Epoch>, Error> {
        Ok(self.extras.keys().next_back().map(|(epoch, _)| *epoch))
    }

    fn latest_summary_epoch(&mut self) -> Result<Option<Epoch>, Error> {
        Ok(self.epoch_summaries.keys().next_back().copied())
    }

    fn epoch_extras(&mut self, epoch: Epoch) -> Result<Vec<EpochExtras>, Error> {
        Ok(self.extras_at(epoch))
    }

    fn epoch_summary_balances(&mut self, epoch: Epoch) -> Result<EpochBalances, Error> {
        self.epoch_summaries
            .get(&epoch)
            .copied()
            .ok_or_else(|| DataUnavailable::EpochNotFound(epoch).into())
    }

    fn filled_slots(&mut self, epoch: Epoch) -> Result<EpochSlots, Error> {
        let mut filled = [false; SLOTS_PER_EPOCH as usize];
        for slot in self
            .blocks
            .range(epoch * SLOTS_PER_EPOCH..(epoch + 1) * SLOTS_PER_EPOCH)
        {
            filled[(slot % SLOTS_PER_EPOCH) as usize] = true;
        }
        Ok(filled)
    }

    fn validator_epoch_summaries(
        &mut self,
        epoch: Epoch,
    ) -> Result<Vec<ValidatorEpochSummary>, Error> {
        Ok(self
            .validator_summaries
            .get(&epoch)
            .cloned()
            .unwrap_or_default())
    }

    fn scheduled_attestors(&mut self, slot: Slot) -> Result<Vec<usize>, Error> {
        Ok(self.committees.get(&slot).cloned().unwrap_or_default())
    }

    fn shifted_proposers(&mut self, epoch: Epoch) -> Result<Vec<usize>, Error> {
        let first = epoch * SLOTS_PER_EPOCH + 1;
        Ok(self
            .proposers
            .range(first..first + SLOTS_PER_EPOCH)
            .map(|(_, validator_index)| *validator_index)
            .collect())
    }

    fn balance_delta(&mut self, validator_index: usize, epoch: Epoch) -> Result<i64, Error> {
        let unavailable = DataUnavailable::BalanceDelta {
            validator: validator_index,
            epoch,
        };
        let before = self
            .balances
            .get(&(validator_index, epoch + 1))
            .ok_or(unavailable)?;
        let after = self
            .balances
            .get(&(validator_index, epoch + 2))
            .ok_or(unavailable)?;
        Ok(after - before)
    }
}

impl ExtrasSink for MemoryChain {
    fn begin_epoch_write(&mut self, _epoch: Epoch) -> Result<(), Error> {
        // Rows staged by a writer that never committed are lost, as with a dropped connection.
        self.staged.clear();
        Ok(())
    }

    fn insert_epoch_extras(&mut self, epoch: Epoch, rows: &[EpochExtras]) -> Result<(), Error> {
        let calls = self.insert_calls.entry(epoch).or_default();
        *calls += 1;
        if self.fail_insert_at == Some((epoch, *calls)) {
            return Err(Error::Store(format!("insert failed for epoch {}", epoch)));
        }

        for row in rows {
            let key = (row.epoch, row.validator_index);
            let staged = self
                .staged
                .iter()
                .any(|staged| (staged.epoch, staged.validator_index) == key);
            if staged || self.extras.contains_key(&key) {
                return Err(Error::Store(format!("duplicate key {:?}", key)));
            }
            self.staged.push(*row);
        }

        if let Some((interrupt_epoch, interrupt)) = &self.interrupt_on_insert {
            if *interrupt_epoch == epoch {
                interrupt.store(true, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    fn commit_epoch_write(&mut self, _epoch: Epoch) -> Result<(), Error> {
        for row in self.staged.drain(..) {
            self.extras.insert((row.epoch, row.validator_index), row);
        }
        Ok(())
    }

    fn abort_epoch_write(&mut self, _epoch: Epoch) -> Result<usize, Error> {
        let discarded = self.staged.len();
        self.staged.clear();
        Ok(discarded)
    }

    fn delete_epoch_extras(&mut self, epoch: Epoch) -> Result<usize, Error> {
        let before = self.extras.len();
        self.extras.retain(|(row_epoch, _), _| *row_epoch != epoch);
        Ok(before - self.extras.len())
    }
}
