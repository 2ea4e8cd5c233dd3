//! ClickHouse source for raw forecast rows.
//!
//! Queries the deduplicated (`final`) view of each `api_*` table over the
//! ClickHouse HTTP interface and decodes the `JSONEachRow` output.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use shared::DatasetKind;

use crate::config::DbConfig;
use crate::models::RawRecord;

/// Anything able to provide the raw rows of a dataset.
#[async_trait]
pub trait RowSource: Send + Sync {
    async fn fetch(&self, kind: DatasetKind) -> Result<Vec<RawRecord>>;
}

pub struct ClickHouseSource {
    client: reqwest::Client,
    config: DbConfig,
}

impl ClickHouseSource {
    pub fn new(config: DbConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(600))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    pub fn build_query(kind: DatasetKind) -> String {
        format!("select * from {} final FORMAT JSONEachRow", kind.spec().table)
    }
}

#[async_trait]
impl RowSource for ClickHouseSource {
    async fn fetch(&self, kind: DatasetKind) -> Result<Vec<RawRecord>> {
        let response = self
            .client
            .post(&self.config.url)
            .query(&[
                ("database", self.config.name.as_str()),
                // Keep 64-bit keys as JSON numbers rather than strings
                ("output_format_json_quote_64bit_integers", "0"),
            ])
            .basic_auth(&self.config.user, Some(&self.config.password))
            .body(Self::build_query(kind))
            .send()
            .await
            .with_context(|| format!("Failed to query {}", kind.spec().table))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Error reading response body")?;

        if status != reqwest::StatusCode::OK {
            return Err(anyhow!(
                "ClickHouse query for {} failed with status {}: {}",
                kind,
                status,
                body.trim()
            ));
        }

        let rows = parse_rows(&body)?;
        log::debug!("Fetched {} {} rows", rows.len(), kind);
        Ok(rows)
    }
}

/// Decode a `JSONEachRow` body: one JSON object per line.
pub fn parse_rows(body: &str) -> Result<Vec<RawRecord>> {
    body.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str::<RawRecord>(line).with_context(|| format!("Invalid row at line {}", index + 1))
        })
        .collect()
}
