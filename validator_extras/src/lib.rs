//! Fills `t_validator_epoch_extras` in a chaind database with the per-validator reward
//! accounting computed by `reward_attribution`.
pub mod cli;
pub mod config;
pub mod database;
pub mod effective_balance_cache;
pub mod logger;
