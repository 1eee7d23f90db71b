use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{Builder, ConnectionManager, Pool, PooledConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{info, warn};

pub use self::chaind::ChaindStore;
pub use self::config::Config;
pub use self::error::Error;

mod chaind;
mod config;
mod error;

pub mod models;
pub mod schema;

pub type PgPool = Pool<ConnectionManager<PgConnection>>;
pub type PgConn = PooledConnection<ConnectionManager<PgConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

/// Postgres accepts at most this many bind parameters in one statement.
const MAX_BIND_PARAMETERS: usize = 65_535;
const EXTRAS_COLUMNS: usize = 11;
/// The largest number of `t_validator_epoch_extras` rows that fit in a single INSERT.
pub const MAX_INSERT_BATCH_SIZE: usize = MAX_BIND_PARAMETERS / EXTRAS_COLUMNS;

/// Connect to a Postgresql database and build a connection pool.
pub fn build_connection_pool(config: &Config) -> Result<PgPool, Error> {
    let database_url = config.build_database_url();
    info!(
        "Building connection pool at: {}:{}/{}",
        config.host, config.port, config.dbname
    );
    let pg = ConnectionManager::<PgConnection>::new(database_url);
    Builder::new().max_size(1).build(pg).map_err(Error::Pool)
}

/// Retrieve an idle connection from the pool.
pub fn get_connection(pool: &PgPool) -> Result<PgConn, Error> {
    pool.get().map_err(Error::Pool)
}

/// Creates `t_validator_epoch_extras` if it does not exist yet.
pub fn run_migrations(conn: &mut PgConn) -> Result<(), Error> {
    let conn: &mut PgConnection = conn;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| Error::Migration(e.to_string()))?;
    for version in applied {
        info!("Applied migration: {}", version);
    }
    Ok(())
}

/// Drops `t_validator_epoch_extras`, discarding every computed epoch, then recreates it.
pub fn reset(conn: &mut PgConn) -> Result<(), Error> {
    warn!("Dropping t_validator_epoch_extras");
    {
        let conn: &mut PgConnection = conn;
        conn.revert_all_migrations(MIGRATIONS)
            .map_err(|e| Error::Migration(e.to_string()))?;
        // The table may predate the migration history.
        diesel::sql_query("DROP TABLE IF EXISTS t_validator_epoch_extras").execute(conn)?;
    }
    run_migrations(conn)
}
