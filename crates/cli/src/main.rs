//! cartsync CLI - inspect and edit the cart from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Show the active cart (guest cart unless a session token is configured)
//! cartsync show
//!
//! # Add two units of a product variant
//! cartsync add 42 -q 2 --variant 7 --option size=M
//!
//! # Set a line to an absolute quantity, or remove lines
//! cartsync update line-3 5
//! cartsync remove line-3 line-4
//!
//! # Merge the guest cart into the signed-in cart, retrying failed lines
//! cartsync session sync --retries 2
//!
//! # Drop lines that can no longer be bought
//! cartsync validate
//! ```
//!
//! # Environment Variables
//!
//! - `CARTSYNC_API_BASE_URL` - Base URL of the cart backend (required)
//! - `CARTSYNC_SESSION_TOKEN` - Bearer token; without it the guest cart is used
//! - `CARTSYNC_GUEST_CART_PATH` - Guest cart file (default `.cartsync/guest_cart.json`)
//! - `SENTRY_DSN` / `SENTRY_ENVIRONMENT` - Error tracking

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cartsync::CartSyncConfig;

mod commands;

use commands::CliError;

#[derive(Parser)]
#[command(name = "cartsync")]
#[command(author, version, about = "Guest/authoritative cart client")]
struct Cli {
    /// Print snapshots and reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the active cart
    Show,
    /// Add units of a product, incrementing an existing line
    Add {
        /// Product id
        product_id: String,

        /// Units to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,

        /// Backend variant id
        #[arg(short, long)]
        variant: Option<String>,

        /// Variant option as `name=value`; repeatable
        #[arg(short = 'o', long = "option", value_parser = commands::cart::parse_option)]
        options: Vec<(String, String)>,
    },
    /// Set the absolute quantity of a line (at least 1)
    Update {
        /// Line id as shown by `show`
        line_id: String,

        /// New quantity
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Remove one or more lines
    Remove {
        /// Line ids as shown by `show`
        #[arg(required = true, num_args = 1..)]
        line_ids: Vec<String>,
    },
    /// Empty the active cart
    Clear,
    /// Remove lines the backend flags as no longer purchasable
    Validate,
    /// Inspect or resolve the authenticated session
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Show whether the cart is the guest cart or a signed-in cart
    Status,
    /// Resolve the session and merge the guest cart into it
    Sync {
        /// Extra attempts for guest lines that failed to merge
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &CartSyncConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration from environment (needed for Sentry init)
    #[allow(clippy::expect_used)]
    let config = CartSyncConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cartsync=info,cartsync_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    if let Err(e) = run(cli, &config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &CartSyncConfig) -> Result<(), CliError> {
    let mut cart = commands::open(config).await?;
    let json = cli.json;

    match cli.command {
        Commands::Show => commands::cart::show(&mut cart, json).await,
        Commands::Add {
            product_id,
            quantity,
            variant,
            options,
        } => commands::cart::add(&mut cart, &product_id, quantity, variant, options, json).await,
        Commands::Update { line_id, quantity } => {
            commands::cart::update(&mut cart, &line_id, quantity, json).await
        }
        Commands::Remove { line_ids } => commands::cart::remove(&mut cart, &line_ids, json).await,
        Commands::Clear => commands::cart::clear(&mut cart, json).await,
        Commands::Validate => commands::cart::validate(&mut cart, json).await,
        Commands::Session { action } => match action {
            SessionAction::Status => commands::session::status(&cart, json),
            SessionAction::Sync { retries } => {
                commands::session::sync(&mut cart, config, retries, json).await
            }
        },
    }
}
