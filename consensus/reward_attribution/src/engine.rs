use crate::{
    process_attestation_rewards, process_block_rewards, replay_pending_block_rewards,
    BalanceSnapshots, ChainDataSource, EffectiveBalances, Epoch, EpochExtras, Error, ExtrasSink,
    FilledSlots, RewardTable, ValidatorRegistry,
};
use log::{debug, error, info, warn};
use safe_arith::SafeArith;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_INSERT_BATCH_SIZE: usize = 1_000;
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of rows written by a single call to `ExtrasSink::insert_epoch_extras`.
    pub insert_batch_size: usize,
    /// Number of epochs between progress log lines.
    pub progress_interval: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            insert_batch_size: DEFAULT_INSERT_BATCH_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochOutcome {
    Persisted,
    /// An interrupt was observed before or during the write. Nothing from the epoch remains in
    /// the sink.
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every epoch with sufficient chain data has been persisted.
    Completed { epochs_processed: u64 },
    /// The run stopped at `epoch`, which has no rows in the sink. Re-running resumes from it.
    Interrupted { epoch: Epoch },
}

/// Processes epochs in increasing order, carrying validator accumulators, the filled-slot window
/// and balance snapshots from one epoch to the next.
///
/// Each epoch moves through the same phases: snapshot the balances and block occupancy, build the
/// reward table, attribute attestation rewards, attribute block rewards, then persist. Epochs are
/// strictly sequential. After an `Err` the engine's carried state is undefined and it must not be
/// used again; re-running from the sink's latest epoch is always safe.
pub struct RewardEngine<S> {
    store: S,
    registry: ValidatorRegistry,
    effective_balances: EffectiveBalances,
    balances: BalanceSnapshots,
    filled_slots: FilledSlots,
    epoch: Epoch,
    config: EngineConfig,
    interrupt: Arc<AtomicBool>,
}

impl<S: ChainDataSource + ExtrasSink> RewardEngine<S> {
    /// Loads the validator registry and seeds the carried state, resuming after the latest epoch
    /// already present in `store`. Block credit from that epoch's window which never reached a
    /// row is applied again.
    pub fn new(mut store: S, config: EngineConfig, interrupt: Arc<AtomicBool>) -> Result<Self, Error> {
        let latest_extras_epoch = store.latest_extras_epoch()?;
        let epoch = match latest_extras_epoch {
            Some(latest) => latest.safe_add(1)?,
            None => 0,
        };

        let mut registry = ValidatorRegistry::initialize(&mut store, latest_extras_epoch)?;
        if let Some(latest) = latest_extras_epoch {
            replay_pending_block_rewards(&mut store, &mut registry, latest)?;
        }
        let effective_balances = EffectiveBalances::new(store.impaired_effective_balances()?);
        let balances = BalanceSnapshots::new(store.epoch_summary_balances(epoch)?);
        let filled_slots = FilledSlots::new(store.filled_slots(epoch)?);

        info!(
            "Reward engine initialized, validators: {}, impaired: {}, start_epoch: {}",
            registry.len(),
            effective_balances.impaired_count(),
            epoch
        );

        Ok(Self {
            store,
            registry,
            effective_balances,
            balances,
            filled_slots,
            epoch,
            config,
            interrupt,
        })
    }

    /// The next epoch to be processed.
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn registry(&self) -> &ValidatorRegistry {
        &self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    /// The first epoch that cannot be processed yet. Processing epoch `e` needs the summary of
    /// `e + 1` and balances at `e + 2`.
    pub fn end_epoch(&mut self) -> Result<Epoch, Error> {
        Ok(self
            .store
            .latest_summary_epoch()?
            .map_or(0, |latest| latest.saturating_sub(1)))
    }

    /// Processes every available epoch, stopping early if the interrupt flag is raised.
    pub fn run(&mut self) -> Result<RunOutcome, Error> {
        let start_epoch = self.epoch;
        let end_epoch = self.end_epoch()?;
        let total = end_epoch.saturating_sub(start_epoch);
        let timer = Instant::now();

        if total == 0 {
            info!(
                "Validator epoch extras are up to date, next_epoch: {}",
                self.epoch
            );
        }

        while self.epoch < end_epoch {
            if self.interrupted() {
                warn!("Interrupted before processing epoch {}", self.epoch);
                return Ok(RunOutcome::Interrupted { epoch: self.epoch });
            }

            let epoch = self.epoch;
            if self.process_epoch()? == EpochOutcome::Interrupted {
                return Ok(RunOutcome::Interrupted { epoch });
            }

            let done = self.epoch - start_epoch;
            if self.config.progress_interval > 0 && done % self.config.progress_interval == 0 {
                let elapsed = timer.elapsed();
                info!(
                    "Calculated validator epoch extras for epoch {}, progress: {}/{}, elapsed: {:?}, remaining: {:?}",
                    epoch,
                    done,
                    total,
                    elapsed,
                    estimate_remaining(elapsed, done, total)
                );
            }
        }

        let epochs_processed = self.epoch - start_epoch;
        info!(
            "Reward engine finished, epochs_processed: {}, next_epoch: {}, time_taken: {:?}",
            epochs_processed,
            self.epoch,
            timer.elapsed()
        );
        Ok(RunOutcome::Completed { epochs_processed })
    }

    /// Runs every phase for the next epoch and persists the result.
    pub fn process_epoch(&mut self) -> Result<EpochOutcome, Error> {
        let epoch = self.epoch;
        let next_epoch = epoch.safe_add(1)?;
        let timer = Instant::now();

        self.balances
            .advance(self.store.epoch_summary_balances(next_epoch)?);
        self.filled_slots.advance(self.store.filled_slots(next_epoch)?);

        let table = RewardTable::from_snapshots(epoch, &self.balances)?;
        debug!(
            "Reward table built, epoch: {}, active_balance_next: {}, attesting_balance: {}",
            epoch,
            self.balances.next().active,
            self.balances.current().attesting
        );

        let summaries = self.store.validator_epoch_summaries(epoch)?;
        self.registry
            .begin_epoch(epoch, summaries, &self.effective_balances)?;

        let attestations = process_attestation_rewards(
            &mut self.store,
            &mut self.registry,
            &table,
            &self.filled_slots,
            epoch,
        )?;
        let blocks = process_block_rewards(
            &mut self.store,
            &mut self.registry,
            &table,
            &self.filled_slots,
            self.balances.current(),
            epoch,
        )?;
        debug!(
            "Epoch rewards attributed, epoch: {}, attesters: {}, included: {}, proposed: {}, missed_blocks: {}",
            epoch, attestations.scheduled, attestations.included, blocks.proposed, blocks.missed
        );

        let rows = self.registry.epoch_extras(epoch);
        let outcome = self.persist(epoch, &rows)?;
        if outcome == EpochOutcome::Persisted {
            self.epoch = next_epoch;
            info!(
                "Validator epoch extras persisted, epoch: {}, rows: {}, time_taken: {:?}",
                epoch,
                rows.len(),
                timer.elapsed()
            );
        }

        Ok(outcome)
    }

    /// Writes `rows` in batches as one epoch write. If the interrupt flag is raised while writing,
    /// or a write fails, the rows already written for `epoch` are discarded again.
    fn persist(&mut self, epoch: Epoch, rows: &[EpochExtras]) -> Result<EpochOutcome, Error> {
        if self.interrupted() {
            warn!("Interrupted before persisting epoch {}", epoch);
            return Ok(EpochOutcome::Interrupted);
        }

        self.store.begin_epoch_write(epoch)?;
        for batch in rows.chunks(self.config.insert_batch_size.max(1)) {
            if let Err(e) = self.store.insert_epoch_extras(epoch, batch) {
                error!("Failed to insert extras for epoch {}: {:?}", epoch, e);
                self.rollback(epoch)?;
                return Err(e);
            }

            if self.interrupted() {
                warn!("Interrupted during processing for epoch {}", epoch);
                self.rollback(epoch)?;
                return Ok(EpochOutcome::Interrupted);
            }
        }
        self.store.commit_epoch_write(epoch)?;

        Ok(EpochOutcome::Persisted)
    }

    fn rollback(&mut self, epoch: Epoch) -> Result<(), Error> {
        let discarded = self.store.abort_epoch_write(epoch)?;
        warn!(
            "Discarded partially written epoch {}, rows: {}",
            epoch, discarded
        );
        Ok(())
    }
}

fn estimate_remaining(elapsed: Duration, done: u64, total: u64) -> Duration {
    if done == 0 {
        return Duration::ZERO;
    }
    let per_epoch = elapsed.as_secs_f64() / done as f64;
    Duration::from_secs_f64(per_epoch * total.saturating_sub(done) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MemoryChain, SimulationParams};

    fn engine(chain: MemoryChain) -> RewardEngine<MemoryChain> {
        RewardEngine::new(chain, EngineConfig::default(), Arc::new(AtomicBool::new(false)))
            .unwrap()
    }

    #[test]
    fn estimate_remaining_is_linear() {
        assert_eq!(
            estimate_remaining(Duration::from_secs(10), 5, 15),
            Duration::from_secs(20)
        );
        assert_eq!(
            estimate_remaining(Duration::from_secs(10), 0, 15),
            Duration::ZERO
        );
    }

    #[test]
    fn stops_two_epochs_before_latest_summary() {
        let chain = MemoryChain::simulate(SimulationParams {
            epochs: 6,
            ..Default::default()
        });
        let latest = chain.epoch_summaries.keys().max().copied().unwrap();

        let mut engine = engine(chain);
        assert_eq!(
            engine.run(),
            Ok(RunOutcome::Completed {
                epochs_processed: latest - 1
            })
        );
        assert_eq!(engine.epoch(), latest - 1);
        assert_eq!(engine.store().extras_epochs(), (0..latest - 1).collect::<Vec<_>>());
    }

    #[test]
    fn up_to_date_store_processes_nothing() {
        let chain = MemoryChain::simulate(SimulationParams {
            epochs: 4,
            ..Default::default()
        });
        let mut engine = engine(chain);
        engine.run().unwrap();

        let mut resumed = RewardEngine::new(
            engine.into_store(),
            EngineConfig::default(),
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();
        assert_eq!(
            resumed.run(),
            Ok(RunOutcome::Completed {
                epochs_processed: 0
            })
        );
    }

    #[test]
    fn interrupt_before_first_epoch() {
        let chain = MemoryChain::simulate(SimulationParams::default());
        let interrupt = Arc::new(AtomicBool::new(true));
        let mut engine = RewardEngine::new(chain, EngineConfig::default(), interrupt).unwrap();

        assert_eq!(engine.run(), Ok(RunOutcome::Interrupted { epoch: 0 }));
        assert!(engine.store().extras.is_empty());
    }

    #[test]
    fn failed_insert_is_rolled_back() {
        let mut chain = MemoryChain::simulate(SimulationParams::default());
        chain.fail_insert_at = Some((2, 2));
        let config = EngineConfig {
            insert_batch_size: 8,
            ..Default::default()
        };
        let mut engine =
            RewardEngine::new(chain, config, Arc::new(AtomicBool::new(false))).unwrap();

        assert!(matches!(engine.run(), Err(Error::Store(_))));
        assert_eq!(engine.store().extras_epochs(), vec![0, 1]);
    }
}
