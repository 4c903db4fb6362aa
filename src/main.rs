mod config;
mod error;
mod helpers;
mod middleware;
mod models;
mod routes;
mod schema;
mod services;

use std::sync::Arc;

use anyhow::anyhow;
use axum::Router;

use diesel::Connection;
use diesel_async::async_connection_wrapper::AsyncConnectionWrapper;
use diesel_async::pooled_connection::deadpool::{Hook, Pool};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use tera::Tera;
use tracing::*;

use config::AppCfg;
use routes::AppState;
use services::{DbStore, MemoryStore, Store};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AppCfg::load()?;

    config::tracing::init();

    let tera = Arc::new(Tera::new(&cfg.templates)?);
    let key = cfg.session_key()?;

    let app = match &cfg.database_url {
        Some(database_url) => {
            run_migrations(database_url.clone()).await?;
            let store = DbStore::new(create_pool(database_url, cfg.db_pool_size)?);
            build(store, tera, key, &cfg)
        }
        None => {
            warn!("no database_url configured, using the in-memory store");
            build(MemoryStore::new(), tera, key, &cfg)
        }
    };

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
    info!("starting listening at {}", cfg.listen_addr);
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn build<S: Store>(
    store: S,
    tera: Arc<Tera>,
    key: axum_extra::extract::cookie::Key,
    cfg: &AppCfg,
) -> Router {
    routes::app(AppState { store, tera, key }, &cfg.assets_dir)
}

fn create_pool(database_url: &str, max_size: usize) -> anyhow::Result<services::Pool> {
    let mgr = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);

    info!("Starting DB pool");
    let pool = Pool::builder(mgr)
        .max_size(max_size)
        .pre_recycle(Hook::async_fn(|_conn, metrics| {
            Box::pin(async move {
                tracing::trace!(?metrics, "dbpool::pre_recycle");
                Ok(())
            })
        }))
        .post_create(Hook::async_fn(|_conn, metrics| {
            Box::pin(async move {
                tracing::trace!(?metrics, "dbpool::post_create");
                Ok(())
            })
        }))
        .build()?;
    Ok(pool)
}

/// Migrations run on a blocking thread through the sync connection wrapper.
async fn run_migrations(database_url: String) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let mut conn = AsyncConnectionWrapper::<AsyncPgConnection>::establish(&database_url)?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow!("running migrations failed: {e}"))?;
        info!(count = applied.len(), "migrations applied");
        Ok(())
    })
    .await?
}
