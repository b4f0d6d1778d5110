use anyhow::Result;
use axum::Router;
use diesel_migrations::{EmbeddedMigrations, embed_migrations};
use farmconnect_marketplace::{
    core::{
        app_state::AppState,
        bootstrap::{self, bootstrap},
        config, db,
    },
    realtime::RealtimePublisher,
    routes,
};

/// Migrations embedded into the binary which helps with streamlining image building process
const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> Result<()> {
    bootstrap::init_tracing();
    bootstrap::init_env();

    let config = config::load()?;

    tracing::info!("Running migrations...");
    let migrations_count = db::run_migrations_blocking(MIGRATIONS, &config.database.url).await?;
    tracing::info!("Run {} new migrations successfully", migrations_count);

    let db_pool = db::create_pool(&config.database.url).await?;
    let realtime = RealtimePublisher::connect(&config.amqp.url).await?;
    let state = AppState { db_pool, realtime };

    let app = Router::new()
        .merge(routes::health::routes())
        .merge(routes::carts::routes())
        .merge(routes::orders::routes())
        .merge(routes::notifications::routes())
        .merge(routes::messages::routes())
        .with_state(state);

    tracing::info!("Bootstrapping...");
    bootstrap("MarketplaceService", app, &config.server).await?;
    Ok(())
}
