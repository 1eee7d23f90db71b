mod accounting;
mod resume;

use reward_attribution::test_utils::{MemoryChain, SimulationParams};
use reward_attribution::{EngineConfig, RewardEngine};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn simulate(epochs: u64) -> MemoryChain {
    MemoryChain::simulate(SimulationParams {
        epochs,
        ..Default::default()
    })
}

pub fn engine_with(
    chain: MemoryChain,
    insert_batch_size: usize,
    interrupt: Arc<AtomicBool>,
) -> RewardEngine<MemoryChain> {
    let config = EngineConfig {
        insert_batch_size,
        ..Default::default()
    };
    RewardEngine::new(chain, config, interrupt).unwrap()
}

pub fn engine(chain: MemoryChain) -> RewardEngine<MemoryChain> {
    engine_with(chain, 8, Arc::new(AtomicBool::new(false)))
}
