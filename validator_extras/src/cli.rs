use crate::config::Config;
use crate::database::{self, ChaindStore};
use crate::logger;
use clap::{App, Arg, ArgMatches};
use log::{info, warn};
use reward_attribution::{RewardEngine, RunOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const CONFIG: &str = "config";
pub const RESET: &str = "reset";

pub fn app<'a, 'b>() -> App<'a, 'b> {
    App::new("validator_extras")
        .about(
            "Computes per-validator attestation and block rewards, maximum rewards and \
             shortfalls for every epoch in a chaind database.",
        )
        .setting(clap::AppSettings::ColoredHelp)
        .arg(
            Arg::with_name(CONFIG)
                .long(CONFIG)
                .value_name("PATH_TO_CONFIG")
                .help("Path to configuration file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name(RESET)
                .long(RESET)
                .short("r")
                .help(
                    "Drop all previously computed extras and start again from epoch 0. \
                     Without this flag the run resumes after the latest stored epoch.",
                ),
        )
}

pub fn load_config(matches: &ArgMatches) -> Result<Config, String> {
    match matches.value_of(CONFIG) {
        Some(path) => Config::load_from_file(path.to_string()),
        None => Ok(Config::default()),
    }
}

/// Raises the returned flag on Ctrl-C. The engine checks it between epochs and insert batches.
fn interrupt_flag() -> Result<Arc<AtomicBool>, String> {
    let interrupt = Arc::new(AtomicBool::new(false));
    let handler_interrupt = interrupt.clone();
    ctrlc::set_handler(move || {
        warn!("Received Ctrl-C, stopping after the current step");
        handler_interrupt.store(true, Ordering::SeqCst);
    })
    .map_err(|e| format!("Could not set ctrlc handler: {:?}", e))?;
    Ok(interrupt)
}

pub fn run() -> Result<(), String> {
    let matches = app().get_matches();
    let config = load_config(&matches)?;

    logger::init_logger(&config.log_level)?;
    let interrupt = interrupt_flag()?;

    let pool = database::build_connection_pool(&config.database)
        .map_err(|e| format!("Failure: {:?}", e))?;
    let mut conn = database::get_connection(&pool).map_err(|e| format!("Failure: {:?}", e))?;

    if matches.is_present(RESET) {
        database::reset(&mut conn).map_err(|e| format!("Failure: {:?}", e))?;
    } else {
        database::run_migrations(&mut conn).map_err(|e| format!("Failure: {:?}", e))?;
    }

    let store = ChaindStore::new(conn, config.effective_balance_cache.clone());
    let mut engine = RewardEngine::new(store, config.engine_config(), interrupt)
        .map_err(|e| format!("Failure: {:?}", e))?;

    match engine.run().map_err(|e| format!("Failure: {:?}", e))? {
        RunOutcome::Completed { epochs_processed } => {
            info!("Done, epochs_processed: {}", epochs_processed)
        }
        RunOutcome::Interrupted { epoch } => {
            info!("Stopped by interrupt, resume will start at epoch {}", epoch)
        }
    }
    Ok(())
}
