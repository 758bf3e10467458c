// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

use anyhow::Context;
use clap::{Parser, Subcommand};
use market_search::app::{create_router, AppState, VERSION};
use market_search::services::auth::PgAuthContext;
use market_search::services::backend::SearchEngine;
use market_search::services::cache::Cache;
use market_search::services::fallback::DatabaseSearch;
use market_search::services::history::{HistoryService, PgHistoryStore};
use market_search::services::logging::init_tracing;
use market_search::services::product_repo::{PgProductRepository, ProductRepository};
use market_search::services::rate_limit::{RateLimitConfig, RateLimiter};
use market_search::services::saved_search::PgSavedSearchStore;
use market_search::services::search::{EngineConfig, MeilisearchEngine};
use market_search::services::unified::{SearchServiceConfig, UnifiedSearchService};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

const RATE_LIMIT_PRUNE_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Parser)]
#[command(name = "market-search", version = VERSION, about = "Marketplace product search service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve {
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
    /// Push every available listing to the search index
    Reindex,
    /// Remove every document from the search index
    ClearIndex,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let pool = connect_database().await?;
    let engine = connect_engine().await?;

    let products: Arc<dyn ProductRepository> = Arc::new(PgProductRepository::new(pool.clone()));
    let history = Arc::new(HistoryService::new(Some(Arc::new(PgHistoryStore::new(
        pool.clone(),
    )))));
    let search = Arc::new(UnifiedSearchService::new(
        engine,
        Arc::new(DatabaseSearch::new(products.clone())),
        products,
        Cache::in_memory(),
        history.clone(),
        SearchServiceConfig::from_env(),
    ));

    match cli.command.unwrap_or(Command::Serve { port: 3000 }) {
        Command::Reindex => {
            let indexed = search.reindex_all().await.context("Reindex failed")?;
            tracing::info!("Reindexed {} products", indexed);
        }
        Command::ClearIndex => {
            search.clear_index().await.context("Clearing the index failed")?;
            tracing::info!("Search index cleared");
        }
        Command::Serve { port } => {
            let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig::from_env()));
            let pruned = rate_limiter.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(RATE_LIMIT_PRUNE_INTERVAL);
                loop {
                    ticker.tick().await;
                    pruned.prune();
                }
            });

            let admin_token = env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty());
            if admin_token.is_none() {
                tracing::warn!("ADMIN_TOKEN not set, admin routes are disabled");
            }

            let state = AppState {
                search,
                history,
                saved_searches: Arc::new(PgSavedSearchStore::new(pool.clone())),
                auth: Arc::new(PgAuthContext::new(pool)),
                rate_limiter,
                admin_token,
            };
            let app = create_router(state);

            // Bind to 0.0.0.0 to accept connections from any network interface (required for Docker)
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind {addr}"))?;

            tracing::info!("market-search v{} listening on {}", VERSION, addr);
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .context("Server error")?;
        }
    }

    Ok(())
}

async fn connect_database() -> anyhow::Result<PgPool> {
    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let max_connections = env::var("DATABASE_MAX_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(10);

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Connected to PostgreSQL");
    Ok(pool)
}

/// The hosted engine, or `None` when it is not configured or unreachable.
async fn connect_engine() -> anyhow::Result<Option<Arc<dyn SearchEngine>>> {
    let Some(config) = EngineConfig::from_env()? else {
        tracing::info!("MEILISEARCH_HOST not set, serving search from the database");
        return Ok(None);
    };

    match MeilisearchEngine::connect(&config).await {
        Ok(engine) => Ok(Some(Arc::new(engine))),
        Err(e) => {
            tracing::error!("Failed to connect to Meilisearch: {}", e);
            tracing::warn!("Continuing with database search only");
            Ok(None)
        }
    }
}
