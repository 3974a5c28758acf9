//! Shelfkeeper CLI - migrations, seller accounts and scheduled jobs.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! sk-cli migrate
//!
//! # Create a seller account
//! sk-cli seller create -e owner@example.com -n "Ada" -s "Ada's Patterns" -p 'long-password'
//!
//! # Renew, mark past due or expire subscriptions whose period has ended
//! sk-cli subscriptions renew-due --limit 500
//!
//! # Send communications left queued
//! sk-cli communications flush
//!
//! # Load demo data
//! sk-cli seed crates/cli/seed/demo.yaml
//! ```
//!
//! All commands read `DESK_DATABASE_URL` (or `DATABASE_URL`).

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "sk-cli")]
#[command(author, version, about = "Shelfkeeper CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage seller accounts
    Seller {
        #[command(subcommand)]
        action: SellerAction,
    },
    /// Subscription billing jobs
    Subscriptions {
        #[command(subcommand)]
        action: SubscriptionAction,
    },
    /// Customer communication jobs
    Communications {
        #[command(subcommand)]
        action: CommunicationAction,
    },
    /// Seed a seller's catalog and customers from a YAML file
    Seed {
        /// Path to the YAML file
        file: String,
    },
}

#[derive(Subcommand)]
enum SellerAction {
    /// Create a new seller account
    Create {
        /// Login email address
        #[arg(short, long)]
        email: String,

        /// Seller's display name
        #[arg(short, long)]
        name: String,

        /// Store name shown to customers
        #[arg(short, long)]
        store: String,

        /// Password (at least 8 characters)
        #[arg(short, long)]
        password: String,
    },
}

#[derive(Subcommand)]
enum SubscriptionAction {
    /// Process subscriptions whose current period has ended
    RenewDue {
        /// Maximum subscriptions to process in one run
        #[arg(short, long, default_value_t = 500)]
        limit: i64,
    },
}

#[derive(Subcommand)]
enum CommunicationAction {
    /// Send queued communications (requires SMTP configuration)
    Flush {
        /// Maximum messages to send in one run
        #[arg(short, long, default_value_t = 200)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shelfkeeper_cli=info,shelfkeeper_admin=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seller { action } => match action {
            SellerAction::Create {
                email,
                name,
                store,
                password,
            } => {
                commands::seller::create(&email, &name, &store, &password).await?;
            }
        },
        Commands::Subscriptions { action } => match action {
            SubscriptionAction::RenewDue { limit } => {
                commands::billing::renew_due(limit).await?;
            }
        },
        Commands::Communications { action } => match action {
            CommunicationAction::Flush { limit } => {
                commands::billing::flush_communications(limit).await?;
            }
        },
        Commands::Seed { file } => commands::seed::from_file(&file).await?,
    }
    Ok(())
}
