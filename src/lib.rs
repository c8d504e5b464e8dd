//! # DynamoDB Data Source
//!
//! A key-value store for hierarchical string keys on top of a single DynamoDB table.
//!
//! A hierarchical key such as `["users", "42", "name"]` is flattened into the table's
//! string partition key (`users.42.name`) and the value is kept in a second string
//! attribute. The table has exactly one hash key named `key` and one value attribute
//! named `value`; the `create-table` binary provisions such a table.
//!
//! The connection is described by a URI:
//!
//! - `dynamodb://aws?tableName=settings&region=eu-west-1` targets the managed service.
//!   A missing table is an error there.
//! - `dynamodb://localhost:8000?tableName=settings` targets a custom endpoint such as
//!   DynamoDB Local, where a missing table is created on connect.
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use dynamodb_datasource::DynamoDataSource;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = DynamoDataSource::from_uri(
//!     "dynamodb://localhost:8000?tableName=settings&consistentRead=true",
//! )
//! .await?;
//!
//! store.set(&["users", "42", "name"], "ada").await?;
//! assert_eq!(
//!     store.get(&["users", "42", "name"]).await?.as_deref(),
//!     Some("ada")
//! );
//!
//! for key in store.key_set().await? {
//!     println!("{}", key.join("/"));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing without DynamoDB
//!
//! [`InMemoryTableClient`] implements the same [`TableClient`] seam the AWS SDK client
//! does and can be handed to [`DynamoDataSource::with_client`].

pub mod client;
pub mod config;
pub mod error;
pub mod key;
pub mod memory;
pub mod store;
pub mod table;

pub use crate::client::{StandardTableClient, TableClient, TableStatus};
pub use crate::config::{ConnectionConfig, ConnectionConfigBuilder, Endpoint, StaticCredentials};
pub use crate::error::{Error, Result};
pub use crate::key::{HierarchicalKey, KeyEncoding};
pub use crate::memory::InMemoryTableClient;
pub use crate::store::{DynamoDataSource, KeyPage};
pub use crate::table::{
    create_table, ensure_table, wait_for_active, BillingMode, MissingTablePolicy,
    TableProvisioning, WaitOptions,
};
