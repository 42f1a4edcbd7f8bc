//! Smart-home bridge: MQTT telemetry bridge and HTTP API.
//!
//! Run with: `cargo run -p smarthome-bridge`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use clap::{Parser, Subcommand};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use smarthome_bridge::{AppState, Bridge, Config, api};
use smarthome_store::Store;
use smarthome_types::AuthorisedCard;

/// Smart-home bridge - MQTT telemetry bridge and HTTP REST API.
#[derive(Parser, Debug)]
#[command(name = "smarthome-bridge")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long, global = true)]
    bind: Option<String>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Do not connect to the broker (API only mode).
    #[arg(long, global = true)]
    no_bridge: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bridge in the foreground (default behavior).
    Run,

    /// Manage authorised RFID cards.
    Card {
        #[command(subcommand)]
        action: CardAction,
    },
}

#[derive(Subcommand, Debug)]
enum CardAction {
    /// Register a card.
    Add {
        /// Card identifier as read by the RFID reader.
        card_id: String,

        /// Owning user.
        #[arg(long)]
        user_id: Option<Uuid>,

        /// Display name of the card holder.
        #[arg(long)]
        username: Option<String>,

        /// Register the card as inactive (denied).
        #[arg(long)]
        inactive: bool,
    },

    /// List registered cards.
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Some(Command::Card { ref action }) => {
            let config = load_config(&args)?;
            handle_card_action(action, &config)
        }
        Some(Command::Run) | None => run_server(args).await,
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(db_path) = &args.database {
        config.storage.path = db_path.clone();
    }

    config.validate()?;
    Ok(config)
}

fn handle_card_action(action: &CardAction, config: &Config) -> anyhow::Result<()> {
    let store = Store::open(&config.storage.path)?;

    match action {
        CardAction::Add {
            card_id,
            user_id,
            username,
            inactive,
        } => {
            let mut card = AuthorisedCard::new(card_id.trim());
            card.user_id = *user_id;
            card.username = username.clone();
            card.is_active = !inactive;
            store.insert_authorised_card(&card)?;
            println!(
                "Registered card {} ({})",
                card.card_id,
                if card.is_active { "active" } else { "inactive" }
            );
        }
        CardAction::List => {
            let cards = store.list_authorised_cards()?;
            if cards.is_empty() {
                println!("No cards registered");
            }
            for card in cards {
                println!(
                    "{:<20} {:<8} {}",
                    card.card_id,
                    if card.is_active { "active" } else { "inactive" },
                    card.username.as_deref().unwrap_or("-")
                );
            }
        }
    }
    Ok(())
}

async fn run_server(args: Args) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("smarthome_bridge=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let config = load_config(&args)?;

    info!("Opening database at {:?}", config.storage.path);
    let store = Store::open(&config.storage.path)?;

    let state = AppState::new(store, config.clone());

    let bridge = Bridge::new(Arc::clone(&state));
    if !args.no_bridge {
        bridge.start().await?;
    } else {
        info!("Broker bridge disabled");
    }

    let app = Router::new()
        .merge(api::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr: SocketAddr = config.server.bind.parse()?;
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    bridge.stop().await;
    Ok(())
}
