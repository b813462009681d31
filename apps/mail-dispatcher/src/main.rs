//! Mail Dispatcher
//!
//! Consumes notification tasks from RabbitMQ and delivers them over SMTP.

use clap::{Parser, Subcommand};
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::{load_dotenv, Environment};
use eyre::Result;
use tracing::debug;

#[derive(Parser)]
#[command(name = "mail-dispatcher")]
#[command(about = "Deliver templated email notifications from a RabbitMQ queue", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume the queue and send emails (default)
    Run {
        /// Render and log messages without contacting the SMTP relay
        #[arg(long)]
        dry_run: bool,
    },

    /// Check broker connectivity; exits 0 when reachable, 1 otherwise
    Healthcheck,

    /// Publish a JSON task to the queue (development helper)
    Publish {
        /// Task payload, e.g. '{"action":"pin-code","pin":"123456","email":"a@b.com"}'
        payload: String,

        /// Target queue. Defaults to QUEUE_NAME.
        #[arg(short, long)]
        queue: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let environment = Environment::from_env();
    let loaded = load_dotenv(&environment);
    init_tracing(&environment);
    for file in &loaded {
        debug!(file = %file, "Loaded environment file");
    }

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run { dry_run: false }) {
        Commands::Run { dry_run } => mail_dispatcher::run(dry_run).await,
        Commands::Healthcheck => {
            if mail_dispatcher::healthcheck().await? {
                Ok(())
            } else {
                std::process::exit(1);
            }
        }
        Commands::Publish { payload, queue } => mail_dispatcher::publish(&payload, queue).await,
    }
}
