use crate::{engine, init_logging, simulate};
use reward_attribution::test_utils::MemoryChain;
use reward_attribution::{
    DataUnavailable, Error, RewardEngine, RewardTable, RunOutcome, SLOTS_PER_EPOCH,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[test]
fn shortfall_explains_the_gap_in_every_row() {
    init_logging();
    let mut engine = engine(simulate(10));
    assert!(matches!(engine.run(), Ok(RunOutcome::Completed { .. })));

    let store = engine.store();
    assert!(!store.extras.is_empty());
    for row in store.extras.values() {
        let totals = &row.totals;
        assert!(
            totals.max_attestation_reward >= totals.attestation_reward,
            "{:?}",
            row
        );
        assert_eq!(
            totals.max_attestation_reward - totals.attestation_reward,
            totals.total_shortfall().unwrap(),
            "{:?}",
            row
        );
        assert!(totals.shortfall_missed >= 0);
        assert!(totals.shortfall_target >= 0);
        assert!(totals.shortfall_head >= 0);
        assert!(totals.shortfall_delay >= 0);
    }
}

#[test]
fn totals_never_decrease_in_maximum() {
    let mut engine = engine(simulate(8));
    engine.run().unwrap();
    let store = engine.store();

    let epochs = store.extras_epochs();
    for pair in epochs.windows(2) {
        let earlier = store.extras_at(pair[0]);
        for row in store.extras_at(pair[1]) {
            if let Some(before) = earlier
                .iter()
                .find(|before| before.validator_index == row.validator_index)
            {
                assert!(row.totals.max_attestation_reward > before.totals.max_attestation_reward);
                assert!(row.totals.missed_block_reward >= before.totals.missed_block_reward);
            }
        }
    }
}

#[test]
fn attestation_slots_match_committees() {
    let chain = simulate(6);
    let committees = chain.committees.clone();
    let mut engine = engine(chain);
    engine.run().unwrap();

    for row in engine.store().extras.values() {
        let slot = row
            .attestation_slot
            .expect("every active validator is scheduled each epoch");
        assert_eq!(slot / SLOTS_PER_EPOCH, row.epoch);
        assert!(committees[&slot].contains(&row.validator_index));
    }
}

#[test]
fn missed_blocks_follow_the_shifted_window() {
    let chain = simulate(8);
    let mut expected = 0;
    let end_epoch = *chain.epoch_summaries.keys().max().unwrap() - 1;
    for epoch in 0..end_epoch {
        let current = chain.epoch_summaries[&epoch];
        let next = chain.epoch_summaries[&(epoch + 1)];
        let table = RewardTable::build(
            epoch,
            next.active,
            current.attesting,
            current.target,
            current.head,
        )
        .unwrap();
        let first = epoch * SLOTS_PER_EPOCH + 1;
        let empty = (first..first + SLOTS_PER_EPOCH)
            .filter(|slot| !chain.blocks.contains(slot))
            .count() as i64;
        expected += empty * table.missed_block_estimate(current.attesting).unwrap();
    }

    let mut engine = engine(chain);
    engine.run().unwrap();
    let missed: i64 = engine
        .registry()
        .iter()
        .map(|validator| validator.totals.missed_block_reward)
        .sum();
    assert_eq!(missed, expected);
}

#[test]
fn empty_validator_set() {
    let mut chain = MemoryChain::default();
    chain.epoch_summaries.insert(0, Default::default());

    assert!(matches!(
        RewardEngine::new(chain, Default::default(), Arc::new(AtomicBool::new(false))),
        Err(Error::DataUnavailable(DataUnavailable::EmptyValidatorSet))
    ));
}

#[test]
fn missing_epoch_summary_stops_the_run() {
    let mut chain = simulate(6);
    chain.epoch_summaries.remove(&2);
    let mut engine = engine(chain);

    assert_eq!(
        engine.run(),
        Err(Error::DataUnavailable(DataUnavailable::EpochNotFound(2)))
    );
    assert_eq!(engine.store().extras_epochs(), vec![0]);
}

#[test]
fn missing_validator_summary_stops_the_run() {
    let mut chain = simulate(6);
    let removed = chain.validator_summaries.get_mut(&1).unwrap().remove(0);
    let mut engine = engine(chain);

    assert_eq!(
        engine.run(),
        Err(Error::DataUnavailable(DataUnavailable::ValidatorSummary {
            validator: removed.validator_index,
            epoch: 1
        }))
    );
    assert_eq!(engine.store().extras_epochs(), vec![0]);
}
