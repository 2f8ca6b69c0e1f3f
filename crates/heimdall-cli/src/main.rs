//! Heimdall - command-line shell over the session runtime.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use auth_config_and_utils::{init_logging_for_service, Config, Paths};
use clap::{Parser, Subcommand};
use heimdall::{HttpRequest, PageLocation, SessionCollaborators, SessionEvent, SessionRuntime};
use session_storage::create_file_vault;
use tracing::info;

/// Heimdall session command-line interface.
#[derive(Parser)]
#[command(name = "heimdall")]
#[command(about = "Inspect and drive the stored authentication session")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, env = "HEIMDALL_LOG_LEVEL")]
    log_level: Option<String>,

    /// Base directory for runtime files (config, session, logs). Defaults to ~/.heimdall
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Restore the stored session and print it
    Status,
    /// Restore the stored session, optionally from a page URL carrying an access token
    Restore {
        /// Page URL, e.g. http://localhost:4200/?accessToken=...
        #[arg(long)]
        location: Option<String>,
    },
    /// Exchange the server-side session for a token
    Token,
    /// Send an authenticated GET request to an API path
    Get {
        /// Path relative to the API base URL
        path: String,
    },
    /// Start a fresh login
    Login,
    /// End the session
    Logout,
    /// Drop the stored token
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;
    let config = Config::load(&paths)?;

    let level = cli.log_level.unwrap_or_else(|| config.log_level.clone());
    init_logging_for_service("heimdall", &level, Some(paths.log_file()))
        .context("failed to initialize logging")?;

    let vault = create_file_vault(paths.session_file())?;
    let mut collaborators = SessionCollaborators::from_config(&config)?;
    if let Some(Commands::Restore {
        location: Some(location),
    }) = &cli.command
    {
        collaborators = collaborators.with_location(PageLocation::parse(location)?);
    }
    let runtime = SessionRuntime::new(Arc::new(vault), config.token_rotation, collaborators);

    match cli.command.unwrap_or(Commands::Status) {
        // A stored token only counts once the session has been restored.
        Commands::Status | Commands::Restore { .. } => runtime.restore(),
        Commands::Token => runtime.load_token(),
        Commands::Login => runtime.login(),
        Commands::Logout => runtime.logout(),
        Commands::Clear => runtime.clear_token(),
        Commands::Get { path } => {
            // The session must be restored before its token can be used.
            runtime.restore();
            runtime.settle().await;

            let url = config.endpoint(&path)?;
            let result = runtime.client().send(HttpRequest::get(url)).await;
            report(&runtime.settle().await);
            let response = result?;
            println!("{}", response.text());
            return Ok(());
        }
    }

    report(&runtime.settle().await);
    println!("{}", serde_json::to_string_pretty(&runtime.view())?);
    Ok(())
}

fn report(events: &[SessionEvent]) {
    for event in events {
        info!(event = event.name(), "Processed session event");
    }
}
