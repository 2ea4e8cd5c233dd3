use anyhow::Context;
use serde::Deserialize;

/// Connection settings of the analytical store, read from `AQCAST_DB_*`.
#[derive(Clone, Debug, Deserialize)]
pub struct DbConfig {
    /// HTTP endpoint, e.g. `https://clickhouse.internal:8443`
    pub url: String,
    pub name: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl DbConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        envy::prefixed("AQCAST_DB_")
            .from_env::<DbConfig>()
            .context("Missing database config. Required env vars: AQCAST_DB_URL, AQCAST_DB_NAME, AQCAST_DB_USER, AQCAST_DB_PASSWORD")
    }
}
