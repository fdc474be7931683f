//! athena-console: browse workgroups, run queries and page through results.

use std::sync::Arc;

use athena_console::athena::{self, MockQueryService, QueryService};
use athena_console::cli::Cli;
use athena_console::commands::CommandContext;
use athena_console::config::Config;
use athena_console::error::{ConsoleError, Result};
use athena_console::logging;
use athena_console::poller::Poller;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        // A missing .env file is the common case.
        if !e.not_found() {
            eprintln!("Warning: Could not load .env: {e}");
        }
    }

    let cli = Cli::parse_args();

    if cli.log_file {
        logging::init_file_logging();
    } else {
        logging::init_stderr_logging();
    }

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let format = cli.parse_output_format().map_err(ConsoleError::config)?;

    let config_path = cli.config_path();
    debug!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;

    // Precedence: CLI flags, then the config file, then environment variables.
    config.service.merge(&cli.service_overrides());
    config.service.apply_env_defaults();

    let service: Arc<dyn QueryService> = if cli.mock {
        info!("Using in-memory demo service");
        Arc::new(MockQueryService::demo())
    } else {
        info!("Service: {}", config.service.display_string());
        athena::connect(&config)?
    };

    let poller = Poller::new(config.polling.to_policy()?);
    let ctx = CommandContext::new(service, poller, config.service.clone());

    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            cancel.cancel();
        }
    });

    let report = tokio::select! {
        biased;

        _ = ctx.cancel.cancelled() => return Err(ConsoleError::Cancelled),
        report = ctx.execute(&cli.command) => report?,
    };

    println!("{}", report.render(format)?);
    Ok(())
}
