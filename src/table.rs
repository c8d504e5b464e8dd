//! Table lifecycle: existence checks, provisioning, and waiting for a table to
//! become active.

use crate::client::{TableClient, TableStatus};
use crate::error::{Error, Result};
use crate::key::validate_table_name;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;

/// Interval between status polls while waiting for a table
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// What to do when the target table does not exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingTablePolicy {
    /// Fail with [`Error::TableNotFound`]
    Fail,
    /// Create the table (on-demand billing) and wait for it
    Create,
}

/// How throughput is paid for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingMode {
    /// Fixed, pre-purchased read and write capacity
    Provisioned,
    /// Charged per request; capacity units are ignored
    PayPerRequest,
}

impl fmt::Display for BillingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BillingMode::Provisioned => f.write_str("PROVISIONED"),
            BillingMode::PayPerRequest => f.write_str("PAY_PER_REQUEST"),
        }
    }
}

impl FromStr for BillingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "PROVISIONED" => Ok(BillingMode::Provisioned),
            "PAY_PER_REQUEST" => Ok(BillingMode::PayPerRequest),
            _ => Err(Error::Configuration(format!(
                "unknown billing mode \"{}\", expected PROVISIONED or PAY_PER_REQUEST",
                s
            ))),
        }
    }
}

/// Validated capacity settings for a new table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableProvisioning {
    billing_mode: BillingMode,
    read_capacity_units: i64,
    write_capacity_units: i64,
}

impl TableProvisioning {
    /// Checks and normalises capacity settings.
    ///
    /// Provisioned billing needs both unit counts to be positive; every violation is
    /// reported together. Under on-demand billing the counts are ignored and set to 0.
    pub fn new(
        billing_mode: BillingMode,
        read_capacity_units: i64,
        write_capacity_units: i64,
    ) -> Result<Self> {
        match billing_mode {
            BillingMode::PayPerRequest => Ok(Self::on_demand()),
            BillingMode::Provisioned => {
                let mut errors = Vec::new();
                if read_capacity_units <= 0 {
                    errors.push(format!(
                        "read capacity units must be positive under PROVISIONED billing, got {}",
                        read_capacity_units
                    ));
                }
                if write_capacity_units <= 0 {
                    errors.push(format!(
                        "write capacity units must be positive under PROVISIONED billing, got {}",
                        write_capacity_units
                    ));
                }
                if !errors.is_empty() {
                    return Err(Error::Configuration(errors.join("; ")));
                }
                Ok(Self {
                    billing_mode,
                    read_capacity_units,
                    write_capacity_units,
                })
            }
        }
    }

    /// On-demand billing with no fixed capacity
    pub fn on_demand() -> Self {
        Self {
            billing_mode: BillingMode::PayPerRequest,
            read_capacity_units: 0,
            write_capacity_units: 0,
        }
    }

    /// The billing mode
    pub fn billing_mode(&self) -> BillingMode {
        self.billing_mode
    }

    /// Strongly consistent reads per second; 0 under on-demand billing
    pub fn read_capacity_units(&self) -> i64 {
        self.read_capacity_units
    }

    /// Writes per second; 0 under on-demand billing
    pub fn write_capacity_units(&self) -> i64 {
        self.write_capacity_units
    }
}

/// A create-table call. The key schema is always the single string hash key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTableRequest {
    table_name: String,
    provisioning: TableProvisioning,
}

impl CreateTableRequest {
    /// Validates the name and assembles the request
    pub fn new(table_name: impl Into<String>, provisioning: TableProvisioning) -> Result<Self> {
        let table_name = table_name.into();
        validate_table_name(&table_name)?;
        Ok(Self {
            table_name,
            provisioning,
        })
    }

    /// Table to create
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Capacity settings
    pub fn provisioning(&self) -> &TableProvisioning {
        &self.provisioning
    }
}

/// Bounds on waiting for a table to become active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Give up after this long
    pub timeout: Duration,
    /// Pause between status checks
    pub poll_interval: Duration,
}

impl WaitOptions {
    /// Waits up to `timeout`, polling at the default interval
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the poll interval
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_WAIT_TIMEOUT)
    }
}

/// Makes sure `table_name` exists and can serve requests.
///
/// A table still being created is waited for; one being updated is used as is and
/// one being deleted is an error.
///
/// A missing table is either reported as [`Error::TableNotFound`] (no create call is
/// made) or created with on-demand billing, depending on `policy`.
pub async fn ensure_table(
    client: &dyn TableClient,
    table_name: &str,
    policy: MissingTablePolicy,
    wait: WaitOptions,
) -> Result<()> {
    match client.describe_table(table_name).await? {
        Some(TableStatus::Creating) => {
            log::info!(
                "table \"{}\" is still being created, waiting for it to become active",
                table_name
            );
            wait_for_active(client, table_name, wait).await
        }
        Some(TableStatus::Deleting) => Err(deleting(table_name)),
        // an updating table keeps serving reads and writes
        Some(status) => {
            log::debug!("table \"{}\" is {:?}", table_name, status);
            Ok(())
        }
        None => match policy {
            MissingTablePolicy::Fail => Err(Error::TableNotFound {
                table: table_name.to_string(),
                location: client.endpoint().to_string(),
            }),
            MissingTablePolicy::Create => {
                log::info!(
                    "table \"{}\" not found in {}, creating it",
                    table_name,
                    client.endpoint()
                );
                create_table(table_name, client, TableProvisioning::on_demand(), wait).await
            }
        },
    }
}

/// Creates a table with the fixed schema and waits until it is active.
///
/// The name is validated before anything is sent.
pub async fn create_table(
    table_name: &str,
    client: &dyn TableClient,
    provisioning: TableProvisioning,
    wait: WaitOptions,
) -> Result<()> {
    let request = CreateTableRequest::new(table_name, provisioning)?;

    log::debug!(
        "creating table \"{}\" ({}, rcu={}, wcu={})",
        table_name,
        provisioning.billing_mode(),
        provisioning.read_capacity_units(),
        provisioning.write_capacity_units()
    );
    client.create_table(&request).await?;

    wait_for_active(client, table_name, wait).await
}

/// Polls the table status until it is active.
///
/// Fails with [`Error::WaitTimeout`] once `wait.timeout` has passed. Dropping the
/// returned future stops the wait; a create call already issued is left alone.
pub async fn wait_for_active(
    client: &dyn TableClient,
    table_name: &str,
    wait: WaitOptions,
) -> Result<()> {
    let started = Instant::now();

    match tokio::time::timeout(wait.timeout, poll_until_active(client, table_name, wait)).await {
        Ok(result) => result,
        Err(_) => Err(Error::WaitTimeout {
            table: table_name.to_string(),
            waited: started.elapsed(),
        }),
    }
}

async fn poll_until_active(
    client: &dyn TableClient,
    table_name: &str,
    wait: WaitOptions,
) -> Result<()> {
    loop {
        match client.describe_table(table_name).await? {
            Some(TableStatus::Active | TableStatus::Updating) => {
                log::debug!("table \"{}\" is active", table_name);
                return Ok(());
            }
            Some(TableStatus::Deleting) => return Err(deleting(table_name)),
            Some(status) => log::debug!("table \"{}\" is {:?}", table_name, status),
            None => log::debug!("table \"{}\" is not visible yet", table_name),
        }

        tokio::time::sleep(wait.poll_interval).await;
    }
}

fn deleting(table_name: &str) -> Error {
    Error::StorageUnavailable(format!("table \"{}\" is being deleted", table_name))
}
