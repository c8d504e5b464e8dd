//! Runs against a real endpoint, e.g. DynamoDB Local:
//!
//! ```text
//! docker run -p 8000:8000 amazon/dynamodb-local
//! DYNAMODB_ENDPOINT=localhost:8000 cargo test --test live_dynamodb_test -- --ignored
//! ```

use dynamodb_datasource::{DynamoDataSource, Error};
use std::time::{SystemTime, UNIX_EPOCH};

fn descriptor() -> Option<String> {
    let endpoint = std::env::var("DYNAMODB_ENDPOINT").ok()?;
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();

    Some(format!(
        "dynamodb://{}?tableName=datasource-test-{}&accessKeyId=local&accessKeySecret=local&consistentRead=true",
        endpoint, suffix
    ))
}

#[tokio::test]
#[ignore = "needs DYNAMODB_ENDPOINT"]
async fn test_round_trip_against_local_endpoint() {
    let Some(uri) = descriptor() else {
        return;
    };

    let mut store = DynamoDataSource::from_uri(&uri).await.unwrap();

    store.set(&["a"], "1").await.unwrap();
    store.set(&["b", "c"], "2").await.unwrap();

    assert_eq!(store.get(&["b", "c"]).await.unwrap(), Some("2".to_string()));
    assert_eq!(store.get(&["missing"]).await.unwrap(), None);
    assert_eq!(store.key_set().await.unwrap().len(), 2);

    store.disconnect();
    assert!(matches!(store.get(&["a"]).await, Err(Error::Disconnected)));
}

#[tokio::test]
#[ignore = "needs DYNAMODB_ENDPOINT"]
async fn test_reconnect_reuses_created_table() {
    let Some(uri) = descriptor() else {
        return;
    };

    let first = DynamoDataSource::from_uri(&uri).await.unwrap();
    first.set(&["kept"], "yes").await.unwrap();
    drop(first);

    let second = DynamoDataSource::from_uri(&uri).await.unwrap();
    assert_eq!(second.get(&["kept"]).await.unwrap(), Some("yes".to_string()));
}
