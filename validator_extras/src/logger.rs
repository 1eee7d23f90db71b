use env_logger::Builder;
use log::{info, LevelFilter};

/// Crates whose log output is shown. Everything else, notably diesel and r2d2, is silenced.
const LOG_TARGETS: [&str; 2] = ["validator_extras", "reward_attribution"];

pub fn parse_log_level(log_level: &str) -> Result<LevelFilter, String> {
    match log_level.to_lowercase().as_str() {
        "error" => Ok(LevelFilter::Error),
        "warn" => Ok(LevelFilter::Warn),
        "info" => Ok(LevelFilter::Info),
        "debug" => Ok(LevelFilter::Debug),
        "trace" => Ok(LevelFilter::Trace),
        other => Err(format!("Unsupported log level: {}", other)),
    }
}

pub fn init_logger(log_level: &str) -> Result<(), String> {
    let log_level = parse_log_level(log_level)?;

    let mut builder = Builder::new();
    for target in LOG_TARGETS {
        builder.filter(Some(target), log_level);
    }
    builder
        .try_init()
        .map_err(|e| format!("Failed to initialize logger: {}", e))?;

    info!("Logger initialized with log-level: {}", log_level);
    Ok(())
}
