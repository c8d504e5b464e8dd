//! The record store: hierarchical keys in, string values out.

use crate::client::{StandardTableClient, TableClient};
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::key::HierarchicalKey;
use crate::table::{ensure_table, WaitOptions};

use metrics::{counter, histogram};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Largest number of items the service accepts in one batch request
pub const MAX_BATCH_ITEMS: usize = 25;

/// One page of decoded keys from a table scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPage {
    /// Keys found on this page
    pub keys: Vec<HierarchicalKey>,

    /// Pass to [`DynamoDataSource::scan_page`] to read the next page.
    /// `None` once the table is exhausted.
    pub next: Option<String>,
}

/// Key-value store over a single DynamoDB table.
///
/// A data source is connected once it has been constructed; [`disconnect`] moves it
/// to a terminal state in which every operation fails with [`Error::Disconnected`].
/// All operations take `&self` and may be called concurrently. Writes to the same
/// key race at the service and the last one wins.
///
/// [`disconnect`]: DynamoDataSource::disconnect
pub struct DynamoDataSource {
    config: ConnectionConfig,
    client: Option<Arc<dyn TableClient>>,
}

impl DynamoDataSource {
    /// Parses a descriptor URI and connects to the table it names
    pub async fn from_uri(uri: &str) -> Result<Self> {
        Self::connect(ConnectionConfig::from_uri(uri)?).await
    }

    /// Opens an AWS SDK session for `config` and makes sure the table exists.
    ///
    /// On a custom endpoint a missing table is created and waited for; against the
    /// managed service it is reported as [`Error::TableNotFound`].
    pub async fn connect(config: ConnectionConfig) -> Result<Self> {
        let client = StandardTableClient::connect(&config).await?;
        Self::with_client(config, Arc::new(client)).await
    }

    /// Uses an existing client. The table check is the same as in [`connect`](Self::connect).
    pub async fn with_client(config: ConnectionConfig, client: Arc<dyn TableClient>) -> Result<Self> {
        ensure_table(
            client.as_ref(),
            config.table_name(),
            config.missing_table_policy(),
            WaitOptions::new(config.wait_timeout()),
        )
        .await?;

        log::info!(
            "connected to table \"{}\" in {}",
            config.table_name(),
            client.endpoint()
        );

        Ok(Self {
            config,
            client: Some(client),
        })
    }

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// Fails with [`Error::ReadOnly`] without contacting the service when the data
    /// source was opened read-only.
    pub async fn set<S: AsRef<str> + Sync>(&self, key: &[S], value: &str) -> Result<()> {
        let client = self.session()?;

        if self.config.read_only() {
            return Err(Error::ReadOnly(format!(
                "table \"{}\" was opened read-only",
                self.config.table_name()
            )));
        }

        let flat = self.config.key_encoding().encode(key)?;
        log::trace!("set {}", flat);

        let start = Instant::now();
        let result = client
            .put_item(self.config.table_name(), &flat, value)
            .await;
        record("set", start, result.is_err());

        result
    }

    /// Reads the value stored under `key`, or `None` if nothing is stored there
    pub async fn get<S: AsRef<str> + Sync>(&self, key: &[S]) -> Result<Option<String>> {
        let client = self.session()?;
        let flat = self.config.key_encoding().encode(key)?;
        log::trace!("get {}", flat);

        let start = Instant::now();
        let result = client
            .get_item(
                self.config.table_name(),
                &flat,
                self.config.consistent_read(),
            )
            .await;
        record("get", start, result.is_err());

        result
    }

    /// Every key in the table.
    ///
    /// Reads the whole table, one scan page after another, so the cost grows with
    /// the table size.
    pub async fn key_set(&self) -> Result<HashSet<HierarchicalKey>> {
        let mut keys = HashSet::new();
        let mut start: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self.scan_page(start.as_deref()).await?;
            pages += 1;
            keys.extend(page.keys);

            match page.next {
                Some(next) => start = Some(next),
                None => break,
            }
        }

        log::debug!(
            "read {} keys from \"{}\" in {} page(s)",
            keys.len(),
            self.config.table_name(),
            pages
        );

        Ok(keys)
    }

    /// Reads a single scan page, starting after `start`
    pub async fn scan_page(&self, start: Option<&str>) -> Result<KeyPage> {
        let client = self.session()?;

        let started = Instant::now();
        let result = client.scan_keys(self.config.table_name(), start).await;
        record("scan", started, result.is_err());

        let page = result?;
        let encoding = self.config.key_encoding();

        Ok(KeyPage {
            keys: page.keys.iter().map(|flat| encoding.decode(flat)).collect(),
            next: page.last_evaluated_key,
        })
    }

    /// Marks the start of a group of writes.
    ///
    /// Each write is applied on its own; there is no cross-item atomicity.
    pub fn begin_transaction(&self) -> Result<()> {
        self.session()?;
        log::trace!("begin transaction on \"{}\"", self.config.table_name());
        Ok(())
    }

    /// Marks the end of a group of writes. A rollback cannot undo applied writes.
    pub fn end_transaction(&self, rollback: bool) -> Result<()> {
        self.session()?;
        if rollback {
            log::debug!(
                "rollback requested on \"{}\", writes already applied are kept",
                self.config.table_name()
            );
        } else {
            log::trace!("end transaction on \"{}\"", self.config.table_name());
        }
        Ok(())
    }

    /// Releases the session. Calling it again has no effect.
    pub fn disconnect(&mut self) {
        if self.client.take().is_some() {
            log::debug!("disconnected from \"{}\"", self.config.table_name());
        }
    }

    /// Whether the data source can still be used
    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// The configuration this data source was opened with
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Target table
    pub fn table_name(&self) -> &str {
        self.config.table_name()
    }

    fn session(&self) -> Result<&dyn TableClient> {
        self.client.as_deref().ok_or(Error::Disconnected)
    }
}

impl fmt::Debug for DynamoDataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamoDataSource")
            .field("config", &self.config)
            .field(
                "endpoint",
                &self.client.as_ref().map(|client| client.endpoint().to_string()),
            )
            .finish()
    }
}

fn record(operation: &'static str, start: Instant, failed: bool) {
    histogram!("dynamodb_datasource.latency", start.elapsed(), "operation" => operation);
    counter!("dynamodb_datasource.calls", 1, "operation" => operation);
    if failed {
        counter!("dynamodb_datasource.errors", 1, "operation" => operation);
    }
}
