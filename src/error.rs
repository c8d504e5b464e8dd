use std::time::Duration;
use thiserror::Error;

/// Result type for data source operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the DynamoDB data source
#[derive(Error, Debug)]
pub enum Error {
    /// Bad or missing connection parameters. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The table name breaks the DynamoDB naming rules
    #[error("{}", describe_table_name_errors(.name, .errors))]
    InvalidTableName {
        /// The rejected name
        name: String,
        /// Every rule the name violates
        errors: Vec<String>,
    },

    /// A hierarchical key that cannot be stored
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The table does not exist and will not be created automatically
    #[error(
        "The table \"{table}\" was not found in {location}. You must manually create this table \
         yourself, or use the create-table command line tool."
    )]
    TableNotFound {
        /// Table that was looked up
        table: String,
        /// Region or endpoint that was searched
        location: String,
    },

    /// Transport failure or throttling reported by the remote service
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// An item in the table does not have the expected attributes
    #[error("Unexpected item: {0}")]
    UnexpectedItem(String),

    /// A write was issued against a store opened read-only
    #[error("Read-only violation: {0}")]
    ReadOnly(String),

    /// The store has been disconnected
    #[error("Data source is disconnected")]
    Disconnected,

    /// The table did not become active in time
    #[error("Timed out after {waited:?} waiting for table \"{table}\" to become active")]
    WaitTimeout {
        /// Table being waited on
        table: String,
        /// How long the wait lasted
        waited: Duration,
    },

    /// Errors related to I/O operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the failed call may succeed if the caller repeats it.
    ///
    /// Only storage availability problems qualify; the data source itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StorageUnavailable(_))
    }
}

fn describe_table_name_errors(name: &str, errors: &[String]) -> String {
    let noun = if errors.len() == 1 { "was 1 error" } else { "were" };
    let count = if errors.len() == 1 {
        String::new()
    } else {
        format!(" {} errors", errors.len())
    };
    format!(
        "There {}{} with the provided table name \"{}\":\n- {}",
        noun,
        count,
        name,
        errors.join("\n- ")
    )
}
