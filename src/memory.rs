use crate::client::{ScanPage, TableClient, TableStatus};
use crate::error::{Error, Result};
use crate::table::{CreateTableRequest, TableProvisioning};

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// Page size used by [`InMemoryTableClient::scan_keys`] unless overridden
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Number of calls made against an [`InMemoryTableClient`], per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `describe_table` calls
    pub describe_table: usize,
    /// `create_table` calls
    pub create_table: usize,
    /// `get_item` calls
    pub get_item: usize,
    /// `put_item` calls
    pub put_item: usize,
    /// `scan_keys` calls
    pub scan_keys: usize,
}

#[derive(Default)]
struct Counters {
    describe_table: AtomicUsize,
    create_table: AtomicUsize,
    get_item: AtomicUsize,
    put_item: AtomicUsize,
    scan_keys: AtomicUsize,
}

struct MemoryTable {
    /// flat key -> value, ordered so scans page deterministically
    items: BTreeMap<String, String>,
    provisioning: TableProvisioning,
    /// describe calls still answered with `Creating`
    creating_polls: usize,
}

impl MemoryTable {
    fn active(provisioning: TableProvisioning) -> Self {
        Self {
            items: BTreeMap::new(),
            provisioning,
            creating_polls: 0,
        }
    }
}

/// An in-memory implementation of the [`TableClient`] trait
///
/// Tables live only as long as the client. Useful for tests and for running the
/// data source without a DynamoDB endpoint.
pub struct InMemoryTableClient {
    tables: Mutex<HashMap<String, MemoryTable>>,
    counters: Counters,
    page_size: usize,
    creating_polls: usize,
    endpoint: String,
}

impl InMemoryTableClient {
    /// Creates a client with no tables
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            counters: Counters::default(),
            page_size: DEFAULT_PAGE_SIZE,
            creating_polls: 0,
            endpoint: "memory".to_string(),
        }
    }

    /// Limits how many keys each scan page returns
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Makes newly created tables report `Creating` for this many status checks
    pub fn with_creating_polls(mut self, polls: usize) -> Self {
        self.creating_polls = polls;
        self
    }

    /// Adds an empty, already active, on-demand table
    pub async fn create_table_now(&self, table_name: &str) {
        self.tables
            .lock()
            .await
            .entry(table_name.to_string())
            .or_insert_with(|| MemoryTable::active(TableProvisioning::on_demand()));
    }

    /// Stores a raw flat key, bypassing any key encoding
    pub async fn insert_raw(&self, table_name: &str, key: &str, value: &str) {
        let mut tables = self.tables.lock().await;
        let table = tables
            .entry(table_name.to_string())
            .or_insert_with(|| MemoryTable::active(TableProvisioning::on_demand()));
        table.items.insert(key.to_string(), value.to_string());
    }

    /// Capacity settings a table was created with
    pub async fn provisioning_of(&self, table_name: &str) -> Option<TableProvisioning> {
        self.tables
            .lock()
            .await
            .get(table_name)
            .map(|table| table.provisioning)
    }

    /// Number of items currently in a table
    pub async fn item_count(&self, table_name: &str) -> usize {
        self.tables
            .lock()
            .await
            .get(table_name)
            .map_or(0, |table| table.items.len())
    }

    /// Snapshot of the calls made so far
    pub fn calls(&self) -> CallCounts {
        CallCounts {
            describe_table: self.counters.describe_table.load(Ordering::Relaxed),
            create_table: self.counters.create_table.load(Ordering::Relaxed),
            get_item: self.counters.get_item.load(Ordering::Relaxed),
            put_item: self.counters.put_item.load(Ordering::Relaxed),
            scan_keys: self.counters.scan_keys.load(Ordering::Relaxed),
        }
    }

    fn missing(table_name: &str) -> Error {
        Error::StorageUnavailable(format!("requested resource not found: table \"{}\"", table_name))
    }
}

impl Default for InMemoryTableClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TableClient for InMemoryTableClient {
    async fn describe_table(&self, table_name: &str) -> Result<Option<TableStatus>> {
        self.counters.describe_table.fetch_add(1, Ordering::Relaxed);
        let mut tables = self.tables.lock().await;

        Ok(tables.get_mut(table_name).map(|table| {
            if table.creating_polls > 0 {
                table.creating_polls -= 1;
                TableStatus::Creating
            } else {
                TableStatus::Active
            }
        }))
    }

    async fn create_table(&self, request: &CreateTableRequest) -> Result<()> {
        self.counters.create_table.fetch_add(1, Ordering::Relaxed);
        let mut tables = self.tables.lock().await;

        if tables.contains_key(request.table_name()) {
            return Err(Error::Configuration(format!(
                "table \"{}\" already exists in {}",
                request.table_name(),
                self.endpoint
            )));
        }

        let mut table = MemoryTable::active(*request.provisioning());
        table.creating_polls = self.creating_polls;
        tables.insert(request.table_name().to_string(), table);

        Ok(())
    }

    async fn get_item(
        &self,
        table_name: &str,
        key: &str,
        _consistent_read: bool,
    ) -> Result<Option<String>> {
        self.counters.get_item.fetch_add(1, Ordering::Relaxed);
        let tables = self.tables.lock().await;

        let table = tables.get(table_name).ok_or_else(|| Self::missing(table_name))?;
        Ok(table.items.get(key).cloned())
    }

    async fn put_item(&self, table_name: &str, key: &str, value: &str) -> Result<()> {
        self.counters.put_item.fetch_add(1, Ordering::Relaxed);
        let mut tables = self.tables.lock().await;

        let table = tables
            .get_mut(table_name)
            .ok_or_else(|| Self::missing(table_name))?;
        table.items.insert(key.to_string(), value.to_string());

        Ok(())
    }

    async fn scan_keys(
        &self,
        table_name: &str,
        exclusive_start_key: Option<&str>,
    ) -> Result<ScanPage> {
        self.counters.scan_keys.fetch_add(1, Ordering::Relaxed);
        let tables = self.tables.lock().await;

        let table = tables.get(table_name).ok_or_else(|| Self::missing(table_name))?;

        let lower = match exclusive_start_key {
            Some(start) => Bound::Excluded(start.to_string()),
            None => Bound::Unbounded,
        };

        let keys: Vec<String> = table
            .items
            .range::<String, _>((lower, Bound::Unbounded))
            .take(self.page_size)
            .map(|(key, _)| key.clone())
            .collect();

        let last_evaluated_key = match keys.last() {
            Some(last)
                if table
                    .items
                    .range::<String, _>((Bound::Excluded(last), Bound::Unbounded))
                    .next()
                    .is_some() =>
            {
                Some(last.clone())
            }
            _ => None,
        };

        Ok(ScanPage {
            keys,
            last_evaluated_key,
        })
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
