use axum::{routing::get, Router};
use std::{env, sync::Arc};
use tokio::net::TcpListener;
use tower_http::{cors::{Any, CorsLayer}, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tutordash_runtime::{
    config::{Config, StoreConfig},
    db,
    postgrest::PostgrestStore,
    routes::{self, SharedStore},
    store::MemStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "tutordash_runtime=info,axum=info".into())
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let store = open_store(&config.store).await?;

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(routes::router(store))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("listening on http://0.0.0.0:{}", config.port);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn open_store(cfg: &StoreConfig) -> anyhow::Result<SharedStore> {
    let store: SharedStore = match cfg {
        StoreConfig::Postgres { database_url } => {
            let pool = db::connect(database_url).await?;
            tracing::info!("using postgres store");
            Arc::new(db::PgStore::new(pool))
        }
        StoreConfig::Postgrest { base_url, api_key } => {
            tracing::info!(%base_url, "using hosted row api");
            Arc::new(PostgrestStore::new(base_url, api_key.clone())?)
        }
        StoreConfig::Memory => {
            tracing::warn!("using in-memory store; data is lost on exit");
            Arc::new(MemStore::new())
        }
    };
    Ok(store)
}
