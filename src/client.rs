use crate::config::{ConnectionConfig, Endpoint, StaticCredentials};
use crate::error::{Error, Result};
use crate::table::{BillingMode, CreateTableRequest};
use async_trait::async_trait;
use aws_sdk_dynamodb::config::Region;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode as SdkBillingMode, KeySchemaElement, KeyType,
    ProvisionedThroughput, ScalarAttributeType, TableStatus as SdkTableStatus,
};
use aws_sdk_dynamodb::Client as AwsDynamoDbClient;
use std::collections::HashMap;

/// Name of the table's sole (hash) key attribute
pub const PARTITION_KEY: &str = "key";

/// Name of the attribute holding the stored string
pub const VALUE_ATTRIBUTE: &str = "value";

// `key` is a reserved word in expressions, so it is always aliased
const PARTITION_KEY_ALIAS: &str = "#k";

/// Lifecycle state of a remote table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    /// Being provisioned; not usable yet
    Creating,
    /// Ready for reads and writes
    Active,
    /// Usable while settings change
    Updating,
    /// Going away
    Deleting,
    /// Any other state reported by the service
    Other,
}

/// One page of partition keys from a scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Flat keys found on this page
    pub keys: Vec<String>,

    /// Where the next page starts; `None` once the table is exhausted
    pub last_evaluated_key: Option<String>,
}

/// The operations the data source needs from the remote table service
#[async_trait]
pub trait TableClient: Send + Sync {
    /// Looks up a table's status. `Ok(None)` means the table does not exist.
    async fn describe_table(&self, table_name: &str) -> Result<Option<TableStatus>>;

    /// Issues a create-table call with the fixed single-hash-key schema
    async fn create_table(&self, request: &CreateTableRequest) -> Result<()>;

    /// Reads the value stored under `key`
    async fn get_item(
        &self,
        table_name: &str,
        key: &str,
        consistent_read: bool,
    ) -> Result<Option<String>>;

    /// Creates or replaces the value stored under `key`
    async fn put_item(&self, table_name: &str, key: &str, value: &str) -> Result<()>;

    /// Reads one page of partition keys, starting after `exclusive_start_key`
    async fn scan_keys(
        &self,
        table_name: &str,
        exclusive_start_key: Option<&str>,
    ) -> Result<ScanPage>;

    /// Human readable location of the service, for messages
    fn endpoint(&self) -> &str;
}

/// [`TableClient`] backed by the AWS SDK
pub struct StandardTableClient {
    /// AWS SDK DynamoDB client
    client: AwsDynamoDbClient,

    /// Where the client points, for messages
    endpoint: String,
}

impl StandardTableClient {
    /// Wraps an already configured SDK client
    pub fn new(client: AwsDynamoDbClient, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Builds a client session for a resolved connection configuration
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        Self::from_endpoint(config.endpoint(), config.credentials()).await
    }

    /// Builds a client session for an endpoint.
    ///
    /// Explicit credentials take precedence; without them the SDK's default provider
    /// chain (environment, profile, instance metadata, ...) is used.
    pub async fn from_endpoint(
        endpoint: &Endpoint,
        credentials: Option<&StaticCredentials>,
    ) -> Result<Self> {
        let mut loader =
            aws_config::from_env().region(Region::new(endpoint.region().to_string()));

        if let Some(url) = endpoint.url() {
            loader = loader.endpoint_url(url);
        }

        if let Some(credentials) = credentials {
            log::debug!(
                "using static credentials for access key {}",
                credentials.access_key_id()
            );
            loader = loader.credentials_provider(credentials.to_sdk_credentials());
        }

        let config = loader.load().await;
        log::debug!("DynamoDB client configured for {}", endpoint);

        Ok(Self::new(AwsDynamoDbClient::new(&config), endpoint.to_string()))
    }

    fn string_attribute(value: &str) -> AttributeValue {
        AttributeValue::S(value.to_string())
    }
}

impl From<&SdkTableStatus> for TableStatus {
    fn from(status: &SdkTableStatus) -> Self {
        match status {
            SdkTableStatus::Active => TableStatus::Active,
            SdkTableStatus::Creating => TableStatus::Creating,
            SdkTableStatus::Updating => TableStatus::Updating,
            SdkTableStatus::Deleting => TableStatus::Deleting,
            _ => TableStatus::Other,
        }
    }
}

impl From<BillingMode> for SdkBillingMode {
    fn from(mode: BillingMode) -> Self {
        match mode {
            BillingMode::Provisioned => SdkBillingMode::Provisioned,
            BillingMode::PayPerRequest => SdkBillingMode::PayPerRequest,
        }
    }
}

fn flat_key(item: &HashMap<String, AttributeValue>) -> Result<String> {
    item.get(PARTITION_KEY)
        .and_then(|av| av.as_s().ok())
        .cloned()
        .ok_or_else(|| Error::UnexpectedItem(format!("missing or invalid {} attribute", PARTITION_KEY)))
}

#[async_trait]
impl TableClient for StandardTableClient {
    async fn describe_table(&self, table_name: &str) -> Result<Option<TableStatus>> {
        match self.client.describe_table().table_name(table_name).send().await {
            Ok(output) => {
                let status = output
                    .table()
                    .and_then(|table| table.table_status())
                    .map(TableStatus::from)
                    .unwrap_or(TableStatus::Other);
                Ok(Some(status))
            }
            Err(err) => {
                let err = err.into_service_error();
                if err.is_resource_not_found_exception() {
                    Ok(None)
                } else {
                    Err(Error::StorageUnavailable(format!(
                        "DynamoDB describe_table error: {}",
                        DisplayErrorContext(&err)
                    )))
                }
            }
        }
    }

    async fn create_table(&self, request: &CreateTableRequest) -> Result<()> {
        let provisioning = request.provisioning();

        let mut create = self
            .client
            .create_table()
            .table_name(request.table_name())
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name(PARTITION_KEY)
                    .attribute_type(ScalarAttributeType::S)
                    .build(),
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name(PARTITION_KEY)
                    .key_type(KeyType::Hash)
                    .build(),
            )
            .billing_mode(provisioning.billing_mode().into());

        // on-demand tables must not carry a throughput block
        if provisioning.billing_mode() == BillingMode::Provisioned {
            create = create.provisioned_throughput(
                ProvisionedThroughput::builder()
                    .read_capacity_units(provisioning.read_capacity_units())
                    .write_capacity_units(provisioning.write_capacity_units())
                    .build(),
            );
        }

        match create.send().await {
            Ok(_) => Ok(()),
            Err(err) => {
                let err = err.into_service_error();
                if err.is_resource_in_use_exception() {
                    Err(Error::Configuration(format!(
                        "table \"{}\" already exists in {}",
                        request.table_name(),
                        self.endpoint
                    )))
                } else {
                    Err(Error::StorageUnavailable(format!(
                        "DynamoDB create_table error: {}",
                        DisplayErrorContext(&err)
                    )))
                }
            }
        }
    }

    async fn get_item(
        &self,
        table_name: &str,
        key: &str,
        consistent_read: bool,
    ) -> Result<Option<String>> {
        let result = self
            .client
            .get_item()
            .table_name(table_name)
            .key(PARTITION_KEY, Self::string_attribute(key))
            .consistent_read(consistent_read)
            .send()
            .await
            .map_err(|e| {
                Error::StorageUnavailable(format!(
                    "DynamoDB get_item error: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        let item = match result.item() {
            Some(item) if !item.is_empty() => item,
            _ => return Ok(None),
        };

        match item.get(VALUE_ATTRIBUTE) {
            Some(AttributeValue::S(value)) => Ok(Some(value.clone())),
            None => Ok(None),
            Some(_) => Err(Error::UnexpectedItem(format!(
                "{} attribute of \"{}\" is not a string",
                VALUE_ATTRIBUTE, key
            ))),
        }
    }

    async fn put_item(&self, table_name: &str, key: &str, value: &str) -> Result<()> {
        self.client
            .put_item()
            .table_name(table_name)
            .item(PARTITION_KEY, Self::string_attribute(key))
            .item(VALUE_ATTRIBUTE, Self::string_attribute(value))
            .send()
            .await
            .map_err(|e| {
                Error::StorageUnavailable(format!(
                    "DynamoDB put_item error: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        Ok(())
    }

    async fn scan_keys(
        &self,
        table_name: &str,
        exclusive_start_key: Option<&str>,
    ) -> Result<ScanPage> {
        let mut request = self
            .client
            .scan()
            .table_name(table_name)
            .projection_expression(PARTITION_KEY_ALIAS)
            .expression_attribute_names(PARTITION_KEY_ALIAS, PARTITION_KEY);

        if let Some(start) = exclusive_start_key {
            request = request.exclusive_start_key(PARTITION_KEY, Self::string_attribute(start));
        }

        let result = request.send().await.map_err(|e| {
            Error::StorageUnavailable(format!("DynamoDB scan error: {}", DisplayErrorContext(&e)))
        })?;

        let mut keys = Vec::new();
        if let Some(items) = result.items() {
            for item in items {
                keys.push(flat_key(item)?);
            }
        }

        let last_evaluated_key = match result.last_evaluated_key() {
            Some(last) if !last.is_empty() => Some(flat_key(last)?),
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
