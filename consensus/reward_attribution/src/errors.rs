use crate::{Epoch, Slot};
use safe_arith::ArithError;
use std::fmt;

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Error {
    /// Data required to account for an epoch is absent from the chain data source.
    DataUnavailable(DataUnavailable),
    /// A validator's effective balance does not fall in any reward bucket.
    EffectiveBalanceOutOfRange {
        validator: usize,
        effective_balance: u64,
    },
    /// The active balance used to scale base rewards was zero.
    DegenerateBalance { epoch: Epoch },
    ArithError(ArithError),
    /// An error reported by a `ChainDataSource` or `ExtrasSink` implementation.
    Store(String),
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DataUnavailable {
    EmptyValidatorSet,
    EpochNotFound(Epoch),
    /// The validator registry has no entry at this index.
    UnknownValidator(usize),
    /// A validator was scheduled to attest but has no participation summary for the epoch.
    ValidatorSummary { validator: usize, epoch: Epoch },
    EffectiveBalance { validator: usize, epoch: Epoch },
    /// An included attestation was recorded without an inclusion delay.
    InclusionDelay { validator: usize, epoch: Epoch },
    /// The shifted proposer window did not contain one duty per slot.
    ProposerDuties { epoch: Epoch, found: usize },
    BalanceDelta { validator: usize, epoch: Epoch },
    /// No block exists in the two-epoch window after `slot`, so no attestation for it could have
    /// been included.
    NoInclusionSlot(Slot),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {}

impl From<DataUnavailable> for Error {
    fn from(e: DataUnavailable) -> Self {
        Error::DataUnavailable(e)
    }
}

impl From<ArithError> for Error {
    fn from(e: ArithError) -> Self {
        Error::ArithError(e)
    }
}
