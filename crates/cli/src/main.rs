//! Bozor CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! bozor-cli migrate
//!
//! # Create a staff user (password from BOZOR_NEW_USER_PASSWORD)
//! bozor-cli user create-staff -u aziza -e aziza@example.com --superuser
//!
//! # Load categories and products from YAML
//! bozor-cli seed catalog data/catalog.yaml --clear
//!
//! # Drop stock reservations that have run out
//! bozor-cli inventory release-expired
//! ```
//!
//! # Environment Variables
//!
//! - `DATABASE_URL` - `PostgreSQL` connection string shared by both services
//! - `BOZOR_NEW_USER_PASSWORD` - Password for `user create-staff`

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "bozor-cli")]
#[command(author, version, about = "Bozor CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage shop users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Load data from files
    Seed {
        #[command(subcommand)]
        target: SeedTarget,
    },
    /// Stock reservation maintenance
    Inventory {
        #[command(subcommand)]
        action: InventoryAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a user who can log in to the dashboard
    CreateStaff {
        /// Username (letters, digits and @.+-_)
        #[arg(short, long)]
        username: String,

        /// Email address
        #[arg(short, long)]
        email: String,

        /// Also grant superuser
        #[arg(long)]
        superuser: bool,

        /// Password; read from the environment when omitted
        #[arg(long, env = "BOZOR_NEW_USER_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Upsert categories and products from a YAML file
    Catalog {
        /// Path to the YAML file
        file: String,

        /// Remove catalog rows no order or cart references first
        #[arg(long)]
        clear: bool,
    },
}

#[derive(Subcommand)]
enum InventoryAction {
    /// Delete inventory commitments whose expiry has passed
    ReleaseExpired,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

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
        Commands::User { action } => match action {
            UserAction::CreateStaff {
                username,
                email,
                superuser,
                password,
            } => {
                commands::user::create_staff(&username, &email, &password, superuser).await?;
            }
        },
        Commands::Seed { target } => match target {
            SeedTarget::Catalog { file, clear } => commands::seed::catalog(&file, clear).await?,
        },
        Commands::Inventory { action } => match action {
            InventoryAction::ReleaseExpired => commands::inventory::release_expired().await?,
        },
    }
    Ok(())
}
