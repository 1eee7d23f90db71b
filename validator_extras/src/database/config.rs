use serde::{Deserialize, Serialize};

pub const DEFAULT_USER: &str = "chain";
pub const DEFAULT_PASSWORD: &str = "medalla";
pub const DEFAULT_DBNAME: &str = "chain";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_CONNECT_TIMEOUT_MILLIS: u64 = 2_000;

fn user() -> String {
    DEFAULT_USER.to_string()
}

fn password() -> String {
    DEFAULT_PASSWORD.to_string()
}

fn dbname() -> String {
    DEFAULT_DBNAME.to_string()
}

fn host() -> String {
    DEFAULT_HOST.to_string()
}

const fn port() -> u16 {
    DEFAULT_PORT
}

const fn connect_timeout_millis() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MILLIS
}

/// Connection details for the chaind database.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "user")]
    pub user: String,
    #[serde(default = "password")]
    pub password: String,
    #[serde(default = "dbname")]
    pub dbname: String,
    #[serde(default = "host")]
    pub host: String,
    #[serde(default = "port")]
    pub port: u16,
    #[serde(default = "connect_timeout_millis")]
    pub connect_timeout_millis: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user: user(),
            password: password(),
            dbname: dbname(),
            host: host(),
            port: port(),
            connect_timeout_millis: connect_timeout_millis(),
        }
    }
}

impl Config {
    pub fn build_database_url(&self) -> String {
        // libpq only accepts whole seconds, and 0 means wait forever.
        let connect_timeout_secs = (self.connect_timeout_millis / 1_000).max(1);
        format!(
            "postgres://{}:{}@{}:{}/{}?connect_timeout={}",
            self.user, self.password, self.host, self.port, self.dbname, connect_timeout_secs
        )
    }
}
