use diesel::result::{ConnectionError, Error as PgError};
use r2d2::Error as PoolError;
use reward_attribution::Error as RewardError;
use safe_arith::ArithError;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    Database(PgError),
    PostgresConnection(ConnectionError),
    Pool(PoolError),
    Migration(String),
    /// A value did not fit the integer type on the other side of the database boundary.
    InvalidInteger(&'static str),
    EffectiveBalanceCache(String),
    ArithError(ArithError),
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<ConnectionError> for Error {
    fn from(e: ConnectionError) -> Self {
        Error::PostgresConnection(e)
    }
}

impl From<PgError> for Error {
    fn from(e: PgError) -> Self {
        Error::Database(e)
    }
}

impl From<PoolError> for Error {
    fn from(e: PoolError) -> Self {
        Error::Pool(e)
    }
}

impl From<ArithError> for Error {
    fn from(e: ArithError) -> Self {
        Error::ArithError(e)
    }
}

impl From<Error> for RewardError {
    fn from(e: Error) -> Self {
        RewardError::Store(e.to_string())
    }
}
