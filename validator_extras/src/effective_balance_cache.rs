//! Persists the effective balance series of impaired validators between runs.
//!
//! Finding them scans the whole of `t_validator_balances`, which takes far longer than a typical
//! incremental run. The file maps a validator index to its effective balance in increments for
//! every epoch since activation.
use crate::database::Error;
use log::{debug, info};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;

pub type ImpairedBalances = HashMap<usize, Vec<u64>>;

/// Returns `Ok(None)` if there is no cache at `path`.
pub fn load(path: &Path) -> Result<Option<ImpairedBalances>, Error> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No effective balance cache at {}", path.display());
            return Ok(None);
        }
        Err(e) => return Err(cache_error(path, e)),
    };

    let balances: ImpairedBalances =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| cache_error(path, e))?;
    info!(
        "Loaded impaired validator balances from {}, validators: {}",
        path.display(),
        balances.len()
    );
    Ok(Some(balances))
}

/// Writes `balances` to `path`, creating parent directories as required.
pub fn store(path: &Path, balances: &ImpairedBalances) -> Result<(), Error> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| cache_error(path, e))?;
    }

    let file = File::create(path).map_err(|e| cache_error(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, balances).map_err(|e| cache_error(path, e))?;
    writer.flush().map_err(|e| cache_error(path, e))?;

    info!(
        "Stored impaired validator balances to {}, validators: {}",
        path.display(),
        balances.len()
    );
    Ok(())
}

fn cache_error(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::EffectiveBalanceCache(format!("{}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file() {
        let dir = tempdir().unwrap();
        assert!(load(&dir.path().join("effective_balances.json"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn store_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tmp").join("effective_balances.json");
        let mut balances = ImpairedBalances::new();
        balances.insert(4, vec![32, 31, 31, 30]);
        balances.insert(20_511, vec![16]);

        store(&path, &balances).unwrap();
        assert_eq!(load(&path).unwrap(), Some(balances));
    }

    #[test]
    fn reads_string_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("effective_balances.json");
        fs::write(&path, r#"{"12": [32, 31], "7": []}"#).unwrap();

        let balances = load(&path).unwrap().unwrap();
        assert_eq!(balances[&12], vec![32, 31]);
        assert!(balances[&7].is_empty());
    }

    #[test]
    fn corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("effective_balances.json");
        fs::write(&path, "{\"12\": [").unwrap();

        assert!(matches!(
            load(&path),
            Err(Error::EffectiveBalanceCache(_))
        ));
    }
}
