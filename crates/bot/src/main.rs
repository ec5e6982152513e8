use anyhow::{bail, Context as _};
use clap::Parser;
use serenity::all::{Client, GatewayIntents};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use accord_core::config::{Settings, StoreSettings};
use accord_core::Registry;
use accord_db::{queries, BatchPolicy, Database, MemoryStore, PgStore};
use accord_worker::{wake_signal, DanbooruClient, SyncConfig, SyncWorker};

mod commands;
mod discord;
mod error;
mod guilds;
mod state;

use crate::discord::{DiscordTransport, Handler};
use crate::state::BotState;

#[derive(Debug, Parser)]
#[command(name = "accord")]
#[command(about = "Posts new Danbooru items to Discord channels", version)]
struct Args {
    /// Verbose logs; create the table when it is missing.
    #[arg(short, long)]
    debug: bool,
    /// Install the global slash commands and exit.
    #[arg(long, conflicts_with = "unregister")]
    register: bool,
    /// Remove the global slash commands and exit.
    #[arg(long)]
    unregister: bool,
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .init();
}

async fn open_database(settings: &Settings, debug: bool) -> anyhow::Result<Database> {
    let policy = BatchPolicy {
        unit: settings.store_backoff_unit,
        max_retries: settings.store_max_retries,
    };

    match &settings.store {
        StoreSettings::Memory => {
            warn!("using the in-memory store, nothing survives a restart");
            Ok(Database::new(Arc::new(MemoryStore::new()), policy))
        }
        StoreSettings::Postgres {
            database_url,
            table,
        } => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await
                .context("connecting to the database")?;
            let store = PgStore::new(pool, table)?;

            if !store.table_exists().await? {
                if !debug {
                    bail!("table {} does not exist; create it or start with --debug", table);
                }
                warn!(table = %table, "table missing, creating it");
                store.create_table().await?;
            }
            Ok(Database::new(Arc::new(store), policy))
        }
    }
}

async fn shutdown_signal() -> anyhow::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.debug);

    let settings = Settings::from_env()?;
    info!(env = %settings.accord_env, debug = args.debug, "accord starting");

    if args.register || args.unregister {
        return discord::sync_global_commands(&settings.discord_token, args.register).await;
    }

    let db = open_database(&settings, args.debug).await?;
    let guilds = queries::guilds::load_all(&db).await?;
    info!(guilds = guilds.len(), "state loaded");

    let (wake, wake_receiver) = wake_signal();
    let state = BotState {
        db,
        registry: Arc::new(Registry::new(guilds)),
        wake,
    };

    let source = DanbooruClient::with_defaults(
        settings.danbooru_url.clone(),
        settings.danbooru_credentials.clone(),
    )?;

    let ready = Arc::new(Notify::new());
    let mut client = Client::builder(&settings.discord_token, GatewayIntents::GUILDS)
        .event_handler(Handler::new(state.clone(), ready.clone()))
        .await?;

    let sync = SyncWorker::new(
        state.db.clone(),
        state.registry.clone(),
        Arc::new(source),
        Arc::new(DiscordTransport::new(client.http.clone())),
        SyncConfig::from(&settings),
    );
    let worker_ready = ready.clone();
    let mut worker = tokio::spawn(async move {
        worker_ready.notified().await;
        sync.run(wake_receiver).await
    });

    let shard_manager = client.shard_manager.clone();
    let mut gateway = tokio::spawn(async move { client.start().await });

    let mut worker_done = false;
    let mut gateway_done = false;
    let outcome: anyhow::Result<()> = tokio::select! {
        result = shutdown_signal() => {
            info!("shutdown requested");
            result
        }
        result = &mut worker => {
            worker_done = true;
            match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(err.into()),
                Err(err) => Err(err.into()),
            }
        }
        result = &mut gateway => {
            gateway_done = true;
            match result {
                Ok(Ok(())) => Err(anyhow::anyhow!("gateway closed")),
                Ok(Err(err)) => Err(err.into()),
                Err(err) => Err(err.into()),
            }
        }
    };

    // Let the worker finish the subscription in flight. Waking it also covers
    // a shutdown that arrives before the gateway was ever ready.
    state.wake.shutdown();
    ready.notify_one();
    if !worker_done {
        match worker.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(error = %err, "sync worker failed"),
            Err(err) => error!(error = %err, "sync worker panicked"),
        }
    }

    shard_manager.shutdown_all().await;
    if !gateway_done {
        match gateway.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, "gateway closed with an error"),
            Err(err) => error!(error = %err, "gateway task panicked"),
        }
    }

    if let Err(err) = &outcome {
        error!(error = %err, "accord stopped");
    } else {
        info!("accord stopped");
    }
    outcome
}
