//! Connection configuration for the DynamoDB data source
//!
//! A configuration is normally parsed from a descriptor URI such as
//!
//! ```text
//! dynamodb://aws?tableName=settings&region=us-west-2
//! dynamodb://localhost:8000?tableName=settings&protocol=http&consistentRead=true
//! ```
//!
//! The host `aws` selects the managed service in the given region; any other host
//! (plus port) selects a custom endpoint such as DynamoDB Local. Every problem found
//! in a descriptor is reported together in one [`Error::Configuration`].

use crate::error::{Error, Result};
use crate::key::{validate_table_name, KeyEncoding};
use crate::table::MissingTablePolicy;
use aws_sdk_dynamodb::config::Credentials;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

/// Host value selecting the managed service instead of a custom endpoint
pub const MANAGED_HOST: &str = "aws";

/// Region used when none is given
pub const DEFAULT_REGION: &str = "us-east-1";

/// Protocol used for custom endpoints when none is given
pub const DEFAULT_PROTOCOL: &str = "http";

/// Port used for custom endpoints when none is given (DynamoDB Local's default)
pub const DEFAULT_LOCAL_PORT: u16 = 8000;

/// Upper bound on waiting for a new table to become active
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Regions accepted by the resolver
pub const KNOWN_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "us-gov-east-1",
    "us-gov-west-1",
    "ca-central-1",
    "ca-west-1",
    "sa-east-1",
    "eu-central-1",
    "eu-central-2",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-south-1",
    "eu-south-2",
    "eu-north-1",
    "af-south-1",
    "me-south-1",
    "me-central-1",
    "il-central-1",
    "ap-east-1",
    "ap-south-1",
    "ap-south-2",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-southeast-3",
    "ap-southeast-4",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "cn-north-1",
    "cn-northwest-1",
];

/// Checks that `region` names a known AWS region
pub fn validate_region(region: &str) -> Result<()> {
    if KNOWN_REGIONS.contains(&region) {
        Ok(())
    } else {
        Err(Error::Configuration(format!(
            "unknown region \"{}\", expected one of: {}",
            region,
            KNOWN_REGIONS.join(", ")
        )))
    }
}

/// Where the table service lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Endpoint {
    /// The managed cloud service in a region
    ManagedRegion {
        /// AWS region name
        region: String,
    },

    /// A custom endpoint, e.g. DynamoDB Local
    Custom {
        /// `http` or `https`
        protocol: String,
        /// Host name or address
        host: String,
        /// TCP port
        port: u16,
        /// Region used for request signing
        region: String,
    },
}

impl Endpoint {
    /// Region requests are signed for
    pub fn region(&self) -> &str {
        match self {
            Endpoint::ManagedRegion { region } | Endpoint::Custom { region, .. } => region,
        }
    }

    /// Endpoint URL override, present only for custom endpoints
    pub fn url(&self) -> Option<String> {
        match self {
            Endpoint::ManagedRegion { .. } => None,
            Endpoint::Custom {
                protocol,
                host,
                port,
                ..
            } => Some(format!("{}://{}:{}", protocol, host, port)),
        }
    }

    /// Whether this endpoint is a custom (non-managed) one
    pub fn is_custom(&self) -> bool {
        matches!(self, Endpoint::Custom { .. })
    }

    /// Interprets a command line location.
    ///
    /// `host:port` selects a custom endpoint signed for the default region; anything
    /// else must be a known region name.
    pub fn from_region_or_host(value: &str, protocol: &str) -> Result<Self> {
        match value.rsplit_once(':') {
            Some((host, port)) => {
                if host.is_empty() {
                    return Err(Error::Configuration(format!(
                        "missing host in \"{}\"",
                        value
                    )));
                }
                let port = port.parse::<u16>().map_err(|_| {
                    Error::Configuration(format!("invalid port in \"{}\"", value))
                })?;
                let protocol = protocol.to_ascii_lowercase();
                if protocol != "http" && protocol != "https" {
                    return Err(Error::Configuration(format!(
                        "protocol must be http or https, got \"{}\"",
                        protocol
                    )));
                }
                Ok(Endpoint::Custom {
                    protocol,
                    host: host.to_string(),
                    port,
                    region: DEFAULT_REGION.to_string(),
                })
            }
            None => {
                validate_region(value)?;
                Ok(Endpoint::ManagedRegion {
                    region: value.to_string(),
                })
            }
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::ManagedRegion { region } => write!(f, "AWS:{}", region),
            Endpoint::Custom { host, port, .. } => write!(f, "{}:{}", host, port),
        }
    }
}

/// An explicit access key pair
#[derive(Clone, PartialEq, Eq)]
pub struct StaticCredentials {
    access_key_id: String,
    access_key_secret: String,
}

impl StaticCredentials {
    /// Creates a credential pair
    pub fn new(access_key_id: impl Into<String>, access_key_secret: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
        }
    }

    /// Combines optional halves of a pair. Both or neither must be present.
    pub fn from_parts(
        access_key_id: Option<String>,
        access_key_secret: Option<String>,
    ) -> Result<Option<Self>> {
        match (access_key_id, access_key_secret) {
            (Some(id), Some(secret)) => Ok(Some(Self::new(id, secret))),
            (None, None) => Ok(None),
            _ => Err(Error::Configuration(
                "accessKeyId and accessKeySecret must either both be provided, or neither".into(),
            )),
        }
    }

    /// The access key id
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Credentials in the form the SDK config loader accepts
    pub fn to_sdk_credentials(&self) -> Credentials {
        Credentials::new(
            self.access_key_id.clone(),
            self.access_key_secret.clone(),
            None,
            None,
            "dynamodb-datasource",
        )
    }
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"** redacted **")
            .finish()
    }
}

/// Fully resolved connection parameters. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    endpoint: Endpoint,
    credentials: Option<StaticCredentials>,
    table_name: String,
    consistent_read: bool,
    read_only: bool,
    key_encoding: KeyEncoding,
    wait_timeout: Duration,
}

impl ConnectionConfig {
    /// Starts a builder
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new()
    }

    /// Parses a descriptor URI.
    ///
    /// Recognised query parameters: `protocol`, `region`, `accessKeyId`,
    /// `accessKeySecret`, `tableName` (required), `consistentRead`, `readOnly`,
    /// `keyEncoding` and `waitTimeoutSecs`.
    pub fn from_uri(uri: &str) -> Result<Self> {
        let url = Url::parse(uri).map_err(|e| {
            Error::Configuration(format!("invalid DynamoDB descriptor \"{}\": {}", uri, e))
        })?;

        let mut builder = Self::builder();

        match url.host_str() {
            Some(host) if host.eq_ignore_ascii_case(MANAGED_HOST) => {
                if url.port().is_some() {
                    log::debug!("ignoring port in managed descriptor");
                }
            }
            Some(host) => {
                builder = builder.host(host);
                if let Some(port) = url.port() {
                    builder = builder.port(port);
                }
            }
            None => builder.errors.push(format!(
                "descriptor has no host; use \"{}\" for the managed service or host:port for a custom endpoint",
                MANAGED_HOST
            )),
        }

        for (name, value) in url.query_pairs() {
            match &*name {
                "protocol" => builder = builder.protocol(&*value),
                "region" => builder = builder.region(&*value),
                "accessKeyId" => builder.access_key_id = Some(value.into_owned()),
                "accessKeySecret" => builder.access_key_secret = Some(value.into_owned()),
                "tableName" => builder = builder.table_name(&*value),
                "consistentRead" => match parse_flag("consistentRead", &value) {
                    Ok(flag) => builder = builder.consistent_read(flag),
                    Err(message) => builder.errors.push(message),
                },
                "readOnly" => match parse_flag("readOnly", &value) {
                    Ok(flag) => builder = builder.read_only(flag),
                    Err(message) => builder.errors.push(message),
                },
                "keyEncoding" => match value.parse::<KeyEncoding>() {
                    Ok(encoding) => builder = builder.key_encoding(encoding),
                    Err(e) => builder.errors.push(strip_prefix(e)),
                },
                "waitTimeoutSecs" => match value.parse::<u64>() {
                    Ok(secs) => builder = builder.wait_timeout(Duration::from_secs(secs)),
                    Err(_) => builder.errors.push(format!(
                        "waitTimeoutSecs must be a whole number of seconds, got \"{}\"",
                        value
                    )),
                },
                other => log::warn!("ignoring unknown DynamoDB parameter \"{}\"", other),
            }
        }

        builder.build()
    }

    /// Where the table lives
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Explicit credentials, if any. `None` means the ambient provider chain.
    pub fn credentials(&self) -> Option<&StaticCredentials> {
        self.credentials.as_ref()
    }

    /// Target table
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Whether reads are strongly consistent
    pub fn consistent_read(&self) -> bool {
        self.consistent_read
    }

    /// Whether writes are refused
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// How hierarchical keys are flattened
    pub fn key_encoding(&self) -> KeyEncoding {
        self.key_encoding
    }

    /// Bound on waiting for a created table to become active
    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    /// What happens when the table is missing at connect time.
    ///
    /// Tables are only created automatically on custom endpoints; against the managed
    /// service the operator has to provision them.
    pub fn missing_table_policy(&self) -> MissingTablePolicy {
        if self.endpoint.is_custom() {
            MissingTablePolicy::Create
        } else {
            MissingTablePolicy::Fail
        }
    }
}

/// Builder for [`ConnectionConfig`]. Validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    table_name: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    protocol: Option<String>,
    region: Option<String>,
    access_key_id: Option<String>,
    access_key_secret: Option<String>,
    consistent_read: bool,
    read_only: bool,
    key_encoding: KeyEncoding,
    wait_timeout: Duration,
    errors: Vec<String>,
}

impl Default for ConnectionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionConfigBuilder {
    /// Creates a builder targeting the managed service in the default region
    pub fn new() -> Self {
        Self {
            table_name: None,
            host: None,
            port: None,
            protocol: None,
            region: None,
            access_key_id: None,
            access_key_secret: None,
            consistent_read: false,
            read_only: false,
            key_encoding: KeyEncoding::default(),
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            errors: Vec::new(),
        }
    }

    /// Sets the table name
    pub fn table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    /// Uses a custom endpoint host. `aws` switches back to the managed service.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        let host = host.into();
        self.host = if host.eq_ignore_ascii_case(MANAGED_HOST) {
            None
        } else {
            Some(host)
        };
        self
    }

    /// Sets the custom endpoint port
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the custom endpoint protocol
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    /// Sets the region
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Sets an explicit access key pair
    pub fn credentials(
        mut self,
        access_key_id: impl Into<String>,
        access_key_secret: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.access_key_secret = Some(access_key_secret.into());
        self
    }

    /// Sets only the access key id; the secret must be supplied as well
    pub fn access_key_id(mut self, access_key_id: impl Into<String>) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self
    }

    /// Sets only the access key secret; the id must be supplied as well
    pub fn access_key_secret(mut self, access_key_secret: impl Into<String>) -> Self {
        self.access_key_secret = Some(access_key_secret.into());
        self
    }

    /// Enables strongly consistent reads
    pub fn consistent_read(mut self, consistent_read: bool) -> Self {
        self.consistent_read = consistent_read;
        self
    }

    /// Refuses writes
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Selects the key encoding
    pub fn key_encoding(mut self, key_encoding: KeyEncoding) -> Self {
        self.key_encoding = key_encoding;
        self
    }

    /// Bounds the wait for a newly created table
    pub fn wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    /// Validates everything and builds the configuration
    pub fn build(self) -> Result<ConnectionConfig> {
        let mut errors = self.errors;

        let table_name = match self.table_name {
            Some(name) => {
                if let Err(Error::InvalidTableName { errors: found, .. }) =
                    validate_table_name(&name)
                {
                    errors.extend(found);
                }
                name
            }
            None => {
                errors.push("tableName is a required parameter in the DynamoDB configuration.".into());
                String::new()
            }
        };

        let region = self.region.unwrap_or_else(|| DEFAULT_REGION.to_string());
        if !KNOWN_REGIONS.contains(&region.as_str()) {
            errors.push(format!("unknown region \"{}\"", region));
        }

        let protocol = self
            .protocol
            .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string())
            .to_ascii_lowercase();
        if protocol != "http" && protocol != "https" {
            errors.push(format!("protocol must be http or https, got \"{}\"", protocol));
        }

        let credentials = match StaticCredentials::from_parts(
            self.access_key_id,
            self.access_key_secret,
        ) {
            Ok(credentials) => credentials,
            Err(e) => {
                errors.push(strip_prefix(e));
                None
            }
        };

        if self.wait_timeout.is_zero() {
            errors.push("waitTimeoutSecs must be greater than zero".into());
        }

        if !errors.is_empty() {
            return Err(Error::Configuration(errors.join("; ")));
        }

        let endpoint = match self.host {
            Some(host) => Endpoint::Custom {
                protocol,
                host,
                port: self.port.unwrap_or(DEFAULT_LOCAL_PORT),
                region,
            },
            None => Endpoint::ManagedRegion { region },
        };

        Ok(ConnectionConfig {
            endpoint,
            credentials,
            table_name,
            consistent_read: self.consistent_read,
            read_only: self.read_only,
            key_encoding: self.key_encoding,
            wait_timeout: self.wait_timeout,
        })
    }
}

fn parse_flag(name: &str, value: &str) -> std::result::Result<bool, String> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(format!("{} must be true or false, got \"{}\"", name, value))
    }
}

fn strip_prefix(err: Error) -> String {
    match err {
        Error::Configuration(message) => message,
        other => other.to_string(),
    }
}
