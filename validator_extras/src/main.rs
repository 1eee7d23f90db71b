use log::error;
use std::process::exit;

fn main() {
    match validator_extras::cli::run() {
        Ok(()) => exit(0),
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("{}", e);
            exit(1)
        }
    }
}
