//! Command-line argument parsing for athena-console.

use crate::commands::output::OutputFormat;
use crate::config::ServiceConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Browse workgroups, run queries and page through results.
#[derive(Parser, Debug)]
#[command(name = "athena-console")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Query service endpoint (overrides config)
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Region used to build the default endpoint
    #[arg(long, value_name = "REGION")]
    pub region: Option<String>,

    /// Use the in-memory demo service instead of a remote endpoint
    #[arg(long)]
    pub mock: bool,

    /// Output format: text or json
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    pub output: String,

    /// Also write logs to the log file
    #[arg(long)]
    pub log_file: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List workgroups
    Workgroups {
        /// Fetch every page
        #[arg(long)]
        all: bool,
    },

    /// List saved queries of a workgroup
    Queries {
        #[arg(short, long, value_name = "NAME")]
        workgroup: Option<String>,

        /// Fetch every page
        #[arg(long)]
        all: bool,
    },

    /// List recent executions of a workgroup
    Executions {
        #[arg(short, long, value_name = "NAME")]
        workgroup: Option<String>,

        /// Fetch every page
        #[arg(long)]
        all: bool,
    },

    /// Submit a query, wait for it and print the first result page
    Run {
        /// Query text
        #[arg(value_name = "SQL", required_unless_present = "saved", conflicts_with = "saved")]
        sql: Option<String>,

        /// Run the saved query with this name
        #[arg(long, value_name = "NAME")]
        saved: Option<String>,

        #[arg(short, long, value_name = "NAME")]
        workgroup: Option<String>,

        /// Fetch every result page
        #[arg(long)]
        all: bool,
    },

    /// Print the results of a finished execution
    Results {
        #[arg(value_name = "EXECUTION_ID")]
        id: String,

        /// Fetch every page
        #[arg(long)]
        all: bool,
    },

    /// Print the status of one or more executions
    Status {
        #[arg(value_name = "EXECUTION_ID", required = true)]
        ids: Vec<String>,
    },
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::Config::default_path)
    }

    /// Parses the output format from the --output argument.
    pub fn parse_output_format(&self) -> std::result::Result<OutputFormat, String> {
        self.output.parse()
    }

    /// Service settings given on the command line, for merging over the file config.
    pub fn service_overrides(&self) -> ServiceConfig {
        ServiceConfig {
            endpoint: self.endpoint.clone(),
            region: self.region.clone(),
            ..ServiceConfig::default()
        }
    }
}
