use crate::{engine, engine_with, init_logging, simulate};
use reward_attribution::{ExtrasSink, RunOutcome, SLOTS_PER_EPOCH};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[test]
fn interrupted_run_resumes_to_identical_rows() {
    init_logging();
    let chain = simulate(10);

    let mut uninterrupted = engine(chain.clone());
    uninterrupted.run().unwrap();

    let mut interrupted = chain;
    let interrupt = Arc::new(AtomicBool::new(false));
    interrupted.interrupt_on_insert = Some((4, interrupt.clone()));
    let mut first = engine_with(interrupted, 8, interrupt);
    assert_eq!(first.run(), Ok(RunOutcome::Interrupted { epoch: 4 }));
    assert_eq!(first.store().extras_epochs(), vec![0, 1, 2, 3]);

    let mut store = first.into_store();
    store.interrupt_on_insert = None;
    let mut second = engine(store);
    assert_eq!(second.epoch(), 4);
    assert_eq!(
        second.run(),
        Ok(RunOutcome::Completed {
            epochs_processed: 4
        })
    );

    assert_eq!(second.store().extras, uninterrupted.store().extras);
}

#[test]
fn resume_after_deleting_the_latest_epoch() {
    let chain = simulate(8);

    let mut full = engine(chain);
    full.run().unwrap();
    let expected = full.store().extras.clone();

    let mut store = full.into_store();
    let latest = *store.extras_epochs().last().unwrap();
    assert!(store.delete_epoch_extras(latest).unwrap() > 0);

    let mut resumed = engine(store);
    assert_eq!(resumed.epoch(), latest);
    assert_eq!(
        resumed.run(),
        Ok(RunOutcome::Completed {
            epochs_processed: 1
        })
    );
    assert_eq!(resumed.store().extras, expected);
}

#[test]
fn interrupt_mid_write_leaves_previous_epoch_latest() {
    let mut chain = simulate(60);
    let interrupt = Arc::new(AtomicBool::new(false));
    chain.interrupt_on_insert = Some((50, interrupt.clone()));

    let mut engine = engine_with(chain, 4, interrupt);
    assert_eq!(engine.run(), Ok(RunOutcome::Interrupted { epoch: 50 }));
    assert_eq!(engine.epoch(), 50);

    let store = engine.store();
    assert_eq!(store.extras_epochs().last(), Some(&49));
    assert!(store.extras_at(50).is_empty());
}

#[test]
fn resume_keeps_block_reward_of_validator_activating_next_epoch() {
    let mut chain = simulate(8);
    let late = chain.validators.len() - 1;
    assert_eq!(chain.validators[late].activation_epoch, 2);

    // Slot 64 opens epoch 2 but closes the proposer window of epoch 1, where `late` has no row.
    let slot = 2 * SLOTS_PER_EPOCH;
    assert!(chain.blocks.contains(&slot));
    chain.proposers.insert(slot, late);
    let before = chain.balances[&(late, 2)];
    chain.balances.insert((late, 3), before + 35_000);

    let mut full = engine(chain.clone());
    full.process_epoch().unwrap();
    full.process_epoch().unwrap();
    assert_eq!(full.registry().get(late).unwrap().totals.block_reward, 35_000);
    full.run().unwrap();

    let interrupt = Arc::new(AtomicBool::new(false));
    chain.interrupt_on_insert = Some((2, interrupt.clone()));
    let mut first = engine_with(chain, 8, interrupt);
    assert_eq!(first.run(), Ok(RunOutcome::Interrupted { epoch: 2 }));
    assert!(first
        .store()
        .extras_at(1)
        .iter()
        .all(|row| row.validator_index != late));

    let mut store = first.into_store();
    store.interrupt_on_insert = None;
    let mut second = engine(store);
    assert_eq!(
        second.registry().get(late).unwrap().totals.block_reward,
        35_000
    );
    second.run().unwrap();

    assert_eq!(second.store().extras, full.store().extras);
}

#[test]
fn unfinished_epoch_write_is_not_resumed_from() {
    let chain = simulate(8);

    let mut full = engine(chain.clone());
    full.run().unwrap();

    let mut partial = engine(chain);
    partial.process_epoch().unwrap();
    partial.process_epoch().unwrap();
    let mut store = partial.into_store();

    // The writer dies after its first batch for epoch 2, without committing or aborting.
    let rows = full.store().extras_at(2);
    store.begin_epoch_write(2).unwrap();
    store.insert_epoch_extras(2, &rows[..8]).unwrap();
    assert_eq!(store.extras_epochs(), vec![0, 1]);

    let mut resumed = engine(store);
    assert_eq!(resumed.epoch(), 2);
    resumed.run().unwrap();
    assert_eq!(resumed.store().extras, full.store().extras);
}
