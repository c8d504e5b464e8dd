use async_trait::async_trait;
use dynamodb_datasource::client::ScanPage;
use dynamodb_datasource::table::CreateTableRequest;
use dynamodb_datasource::{
    ConnectionConfig, DynamoDataSource, Error, HierarchicalKey, InMemoryTableClient, Result,
    TableClient, TableStatus,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_test::block_on;

// A mock table client whose availability can be switched off mid-test
struct MockTableClient {
    healthy: AtomicBool,
    puts: AtomicUsize,
    reads: Mutex<Vec<bool>>,
    items: Mutex<HashMap<String, String>>,
}

impl MockTableClient {
    fn new() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            puts: AtomicUsize::new(0),
            reads: Mutex::new(Vec::new()),
            items: Mutex::new(HashMap::new()),
        }
    }

    fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::StorageUnavailable(
                "ProvisionedThroughputExceededException".into(),
            ))
        }
    }
}

#[async_trait]
impl TableClient for MockTableClient {
    async fn describe_table(&self, _table_name: &str) -> Result<Option<TableStatus>> {
        self.check()?;
        Ok(Some(TableStatus::Active))
    }

    async fn create_table(&self, _request: &CreateTableRequest) -> Result<()> {
        panic!("the mock table always exists");
    }

    async fn get_item(
        &self,
        _table_name: &str,
        key: &str,
        consistent_read: bool,
    ) -> Result<Option<String>> {
        self.check()?;
        self.reads.lock().unwrap().push(consistent_read);
        Ok(self.items.lock().unwrap().get(key).cloned())
    }

    async fn put_item(&self, _table_name: &str, key: &str, value: &str) -> Result<()> {
        self.check()?;
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.items
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn scan_keys(
        &self,
        _table_name: &str,
        _exclusive_start_key: Option<&str>,
    ) -> Result<ScanPage> {
        self.check()?;
        Ok(ScanPage {
            keys: self.items.lock().unwrap().keys().cloned().collect(),
            last_evaluated_key: None,
        })
    }

    fn endpoint(&self) -> &str {
        "mock"
    }
}

fn key(parts: &[&str]) -> HierarchicalKey {
    parts.iter().map(|s| s.to_string()).collect()
}

fn local_config(extra: &str) -> ConnectionConfig {
    ConnectionConfig::from_uri(&format!(
        "dynamodb://localhost:8000?tableName=settings{}",
        extra
    ))
    .unwrap()
}

#[tokio::test]
async fn test_consistent_set_then_get_returns_written_value() {
    let client = Arc::new(InMemoryTableClient::new());
    let store = DynamoDataSource::with_client(local_config("&consistentRead=true"), client)
        .await
        .unwrap();

    store.set(&["server", "motd"], "hello").await.unwrap();
    store.set(&["server", "motd"], "welcome").await.unwrap();

    assert_eq!(
        store.get(&["server", "motd"]).await.unwrap(),
        Some("welcome".to_string())
    );
}

#[tokio::test]
async fn test_consistent_read_reaches_the_client() {
    let client = Arc::new(MockTableClient::new());
    let store = DynamoDataSource::with_client(local_config("&consistentRead=true"), client.clone())
        .await
        .unwrap();

    store.set(&["server", "motd"], "hello").await.unwrap();
    assert_eq!(
        store.get(&["server", "motd"]).await.unwrap(),
        Some("hello".to_string())
    );

    assert_eq!(*client.reads.lock().unwrap(), vec![true]);
}

#[tokio::test]
async fn test_reads_are_eventually_consistent_by_default() {
    let client = Arc::new(MockTableClient::new());
    let store = DynamoDataSource::with_client(local_config(""), client.clone())
        .await
        .unwrap();

    store.get(&["a"]).await.unwrap();
    store.get(&["b"]).await.unwrap();

    assert_eq!(*client.reads.lock().unwrap(), vec![false, false]);
}

#[tokio::test]
async fn test_get_unwritten_key_is_absent() {
    let client = Arc::new(InMemoryTableClient::new());
    let store = DynamoDataSource::with_client(local_config(""), client)
        .await
        .unwrap();

    assert_eq!(store.get(&["never", "written"]).await.unwrap(), None);
}

#[tokio::test]
async fn test_key_set_single_page() {
    let client = Arc::new(InMemoryTableClient::new());
    let store = DynamoDataSource::with_client(local_config(""), client)
        .await
        .unwrap();

    store.set(&["a"], "1").await.unwrap();
    store.set(&["b", "c"], "2").await.unwrap();

    let expected: HashSet<HierarchicalKey> = [key(&["a"]), key(&["b", "c"])].into_iter().collect();
    assert_eq!(store.key_set().await.unwrap(), expected);
}

#[tokio::test]
async fn test_key_set_is_complete_across_pages() {
    let client = Arc::new(InMemoryTableClient::new().with_page_size(3));
    let store = DynamoDataSource::with_client(local_config(""), client.clone())
        .await
        .unwrap();

    let mut expected = HashSet::new();
    for i in 0..10 {
        let k = key(&["users", &i.to_string()]);
        store.set(&k, "x").await.unwrap();
        expected.insert(k);
    }

    // a single page stops short of the full table
    let first = store.scan_page(None).await.unwrap();
    assert_eq!(first.keys.len(), 3);
    assert!(first.next.is_some());

    let scans_before = client.calls().scan_keys;
    assert_eq!(store.key_set().await.unwrap(), expected);
    assert_eq!(client.calls().scan_keys - scans_before, 4);
}

#[tokio::test]
async fn test_escaped_keys_survive_key_set() {
    let client = Arc::new(InMemoryTableClient::new());
    let store = DynamoDataSource::with_client(local_config("&keyEncoding=escaped"), client)
        .await
        .unwrap();

    store.set(&["hosts", "example.com"], "up").await.unwrap();

    let keys = store.key_set().await.unwrap();
    assert!(keys.contains(&key(&["hosts", "example.com"])));
    assert_eq!(
        store.get(&["hosts", "example.com"]).await.unwrap(),
        Some("up".to_string())
    );
}

#[tokio::test]
async fn test_read_only_store_refuses_writes_without_a_put() {
    let client = Arc::new(MockTableClient::new());
    let store = DynamoDataSource::with_client(local_config("&readOnly=true"), client.clone())
        .await
        .unwrap();

    assert!(matches!(
        store.set(&["a"], "1").await,
        Err(Error::ReadOnly(_))
    ));
    assert_eq!(client.puts.load(Ordering::SeqCst), 0);

    // reads still work
    assert_eq!(store.get(&["a"]).await.unwrap(), None);
}

#[test]
fn test_storage_failures_surface_without_retry() {
    block_on(async {
        let client = Arc::new(MockTableClient::new());
        let store = DynamoDataSource::with_client(local_config(""), client.clone())
            .await
            .unwrap();

        store.set(&["a"], "1").await.unwrap();
        client.set_healthy(false);

        let err = store.set(&["a"], "2").await.unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable(_)));
        assert!(err.is_retryable());
        assert_eq!(client.puts.load(Ordering::SeqCst), 1);

        assert!(matches!(
            store.get(&["a"]).await,
            Err(Error::StorageUnavailable(_))
        ));
        assert!(matches!(
            store.key_set().await,
            Err(Error::StorageUnavailable(_))
        ));

        client.set_healthy(true);
        assert_eq!(store.get(&["a"]).await.unwrap(), Some("1".to_string()));
    });
}

#[test]
fn test_unavailable_service_fails_construction() {
    block_on(async {
        let client = Arc::new(MockTableClient::new());
        client.set_healthy(false);

        let result = DynamoDataSource::with_client(local_config(""), client).await;
        assert!(matches!(result, Err(Error::StorageUnavailable(_))));
    });
}

#[tokio::test]
async fn test_disconnected_store_fails_fast() {
    let client = Arc::new(MockTableClient::new());
    let mut store = DynamoDataSource::with_client(local_config(""), client.clone())
        .await
        .unwrap();

    store.disconnect();

    assert!(matches!(store.get(&["a"]).await, Err(Error::Disconnected)));
    assert!(matches!(store.set(&["a"], "1").await, Err(Error::Disconnected)));
    assert!(matches!(store.scan_page(None).await, Err(Error::Disconnected)));
    assert!(matches!(store.end_transaction(false), Err(Error::Disconnected)));
    assert_eq!(client.puts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_concurrent_writers_last_write_wins() {
    let client = Arc::new(InMemoryTableClient::new());
    let store = Arc::new(
        DynamoDataSource::with_client(local_config(""), client)
            .await
            .unwrap(),
    );

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.set(&["shared"], &i.to_string()).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let value = store.get(&["shared"]).await.unwrap().unwrap();
    let written: i32 = value.parse().unwrap();
    assert!((0..8).contains(&written));
}

#[test]
fn test_mismatched_credentials_fail_before_any_call() {
    let result = ConnectionConfig::from_uri("dynamodb://aws?tableName=settings&accessKeyId=abc");
    assert!(matches!(result, Err(Error::Configuration(_))));

    let result = block_on(DynamoDataSource::from_uri(
        "dynamodb://aws?tableName=settings&accessKeySecret=shh",
    ));
    assert!(matches!(result, Err(Error::Configuration(_))));
}
