#![allow(clippy::print_stdout, clippy::print_stderr)]

//! Creates a DynamoDB table with the layout the data source expects.

use clap::Parser;
use dynamodb_datasource::key::validate_table_name;
use dynamodb_datasource::{
    create_table, BillingMode, Endpoint, Error, Result, StandardTableClient, StaticCredentials,
    TableProvisioning, WaitOptions,
};
use std::process::ExitCode;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const PROMPT: &str = "If this looks correct, type Y to continue: ";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Creates a DynamoDB table in the format the data source requires",
    long_about = "The tables used by the data source must follow a specific format. While it is \
                  possible to create these tables yourself, this tool automates the process."
)]
struct Options {
    /// AWS region to create the table in, or <host>:<port> to use a custom endpoint
    /// such as DynamoDB Local instead of AWS
    region: String,

    /// Name of the table. See
    /// https://docs.aws.amazon.com/amazondynamodb/latest/developerguide/HowItWorks.NamingRulesDataTypes.html
    table_name: String,

    /// Access key id. Without it the credentials configured on the system are used
    #[arg(long)]
    access_key_id: Option<String>,

    /// Access key secret. Required if --access-key-id is given
    #[arg(long)]
    access_key_secret: Option<String>,

    /// Read capacity per second (PROVISIONED billing only)
    #[arg(long, default_value_t = 0)]
    read_capacity_units: i64,

    /// Write capacity per second (PROVISIONED billing only)
    #[arg(long, default_value_t = 0)]
    write_capacity_units: i64,

    /// PROVISIONED or PAY_PER_REQUEST
    #[arg(long)]
    billing_mode: BillingMode,

    /// Protocol for a custom endpoint
    #[arg(long, default_value = "http")]
    protocol: String,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    yes: bool,

    /// Give up waiting for the table to become active after this many seconds
    #[arg(long, default_value_t = 300)]
    wait_timeout_secs: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Everything needed to issue the create call, checked up front
struct Plan {
    endpoint: Endpoint,
    credentials: Option<StaticCredentials>,
    table_name: String,
    provisioning: TableProvisioning,
    wait: WaitOptions,
}

impl Plan {
    /// Checks every option, reporting all problems in one configuration error
    fn from_options(options: &Options) -> Result<Self> {
        let mut errors = Vec::new();

        let credentials = StaticCredentials::from_parts(
            options.access_key_id.clone(),
            options.access_key_secret.clone(),
        )
        .unwrap_or_else(|_| {
            errors.push(
                "access-key-id and access-key-secret must either both be provided, or neither"
                    .to_string(),
            );
            None
        });

        let endpoint = Endpoint::from_region_or_host(&options.region, &options.protocol)
            .map_err(|e| errors.extend(messages(e)))
            .ok();

        if let Err(e) = validate_table_name(&options.table_name) {
            errors.extend(messages(e));
        }

        let provisioning = TableProvisioning::new(
            options.billing_mode,
            options.read_capacity_units,
            options.write_capacity_units,
        )
        .map_err(|e| errors.extend(messages(e)))
        .ok();

        if options.wait_timeout_secs == 0 {
            errors.push("--wait-timeout-secs must be greater than zero".to_string());
        }

        match (endpoint, provisioning) {
            (Some(endpoint), Some(provisioning)) if errors.is_empty() => Ok(Self {
                endpoint,
                credentials,
                table_name: options.table_name.clone(),
                provisioning,
                wait: WaitOptions::new(Duration::from_secs(options.wait_timeout_secs)),
            }),
            _ => Err(Error::Configuration(errors.join("; "))),
        }
    }

    fn print(&self) {
        println!("Using the following settings:");
        match &self.endpoint {
            Endpoint::ManagedRegion { region } => {
                println!("Host: AWS");
                println!("Region: {}", region);
            }
            Endpoint::Custom {
                protocol,
                host,
                port,
                region,
            } => {
                println!("Host: {}", host);
                println!("Port: {}", port);
                println!("Protocol: {}", protocol);
                println!("Region: {}", region);
            }
        }
        match &self.credentials {
            Some(_) => println!("Using provided credentials"),
            None => println!("Using built in credentials"),
        }
        println!("Table Name: {}", self.table_name);
        println!("Read Capacity Units: {}", self.provisioning.read_capacity_units());
        println!("Write Capacity Units: {}", self.provisioning.write_capacity_units());
        println!("Billing Mode: {}", self.provisioning.billing_mode());
    }
}

/// Splits an error into the individual problems it reports
fn messages(err: Error) -> Vec<String> {
    match err {
        Error::Configuration(message) => vec![message],
        Error::InvalidTableName { errors, .. } => errors,
        other => vec![other.to_string()],
    }
}

async fn confirm() -> Result<bool> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(PROMPT.as_bytes()).await?;
    stdout.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;

    Ok(matches!(line.trim_start().chars().next(), Some('y' | 'Y')))
}

#[tokio::main]
async fn main() -> ExitCode {
    let options = Options::parse();

    let level = if options.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let plan = match Plan::from_options(&options) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    plan.print();

    if !options.yes {
        match confirm().await {
            Ok(true) => {}
            Ok(false) => {
                println!("Aborting operation.");
                return ExitCode::FAILURE;
            }
            Err(e) => {
                eprintln!("Could not read confirmation. {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    println!("Creating table...");

    let client = match StandardTableClient::from_endpoint(&plan.endpoint, plan.credentials.as_ref()).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match create_table(&plan.table_name, &client, plan.provisioning, plan.wait).await {
        Ok(()) => {
            println!("Done.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::debug!("create_table failed: {:?}", e);
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Options {
        Options::try_parse_from(std::iter::once("create-table").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_local_on_demand_plan() {
        let options = parse(&["localhost:8000", "settings", "--billing-mode", "PAY_PER_REQUEST"]);
        let plan = Plan::from_options(&options).unwrap();

        assert!(plan.endpoint.is_custom());
        assert!(plan.credentials.is_none());
        assert_eq!(plan.provisioning, TableProvisioning::on_demand());
        assert_eq!(plan.wait.timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_mismatched_credentials_rejected() {
        let options = parse(&[
            "us-east-1",
            "settings",
            "--billing-mode",
            "PAY_PER_REQUEST",
            "--access-key-id",
            "id",
        ]);

        let err = Plan::from_options(&options).err().unwrap();
        assert!(err
            .to_string()
            .contains("access-key-id and access-key-secret must either both be provided"));
    }

    #[test]
    fn test_provisioned_needs_capacity() {
        let options = parse(&["us-east-1", "settings", "--billing-mode", "PROVISIONED"]);
        assert!(Plan::from_options(&options).is_err());

        let options = parse(&[
            "us-east-1",
            "settings",
            "--billing-mode",
            "provisioned",
            "--read-capacity-units",
            "5",
            "--write-capacity-units",
            "5",
        ]);
        let plan = Plan::from_options(&options).unwrap();
        assert_eq!(plan.provisioning.billing_mode(), BillingMode::Provisioned);
    }

    #[test]
    fn test_bad_table_name_and_region_rejected() {
        let options = parse(&["us-east-1", "a@", "--billing-mode", "PAY_PER_REQUEST"]);
        assert!(Plan::from_options(&options).is_err());

        let options = parse(&["nowhere-1", "settings", "--billing-mode", "PAY_PER_REQUEST"]);
        assert!(Plan::from_options(&options).is_err());
    }

    #[test]
    fn test_unknown_billing_mode_is_a_parse_error() {
        let result = Options::try_parse_from([
            "create-table",
            "us-east-1",
            "settings",
            "--billing-mode",
            "FREE",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_every_problem_is_reported_together() {
        let options = parse(&[
            "nowhere-1",
            "a@",
            "--billing-mode",
            "PROVISIONED",
            "--access-key-id",
            "id",
            "--wait-timeout-secs",
            "0",
        ]);

        let message = match Plan::from_options(&options) {
            Err(Error::Configuration(message)) => message,
            Err(other) => panic!("expected a configuration error, got {:?}", other),
            Ok(_) => panic!("expected a configuration error"),
        };

        assert!(message.contains("access-key-id and access-key-secret"));
        assert!(message.contains("unknown region \"nowhere-1\""));
        assert!(message.contains("Table name length must be between 3 and 255"));
        assert!(message.contains("Table names may only contain"));
        assert!(message.contains("read capacity units must be positive"));
        assert!(message.contains("write capacity units must be positive"));
        assert!(message.contains("--wait-timeout-secs"));
    }

    #[test]
    fn test_prompt_io_failure_is_an_io_error() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "stdin closed").into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(messages(err), vec!["I/O error: stdin closed".to_string()]);
    }
}
