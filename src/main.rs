use dotenvy::dotenv;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

use carbonyx::{
    api::{db_client::Connector, supabase::SupabaseConnector},
    config::{RuntimeConfig, ServerConfig},
    utils::{
        analytics::DbAnalytics,
        init_gate::{Dependency, InitGate},
        staging::FileStaging,
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let runtime_config = RuntimeConfig::from_env();
    let default_filter = runtime_config
        .as_ref()
        .map(|c| c.log_filter())
        .unwrap_or_else(|_| "info,carbonyx=debug".to_string());
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let _sentry = std::env::var("SENTRY_DSN").ok().filter(|dsn| !dsn.is_empty()).map(|dsn| {
        sentry::init((dsn, sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        }))
    });

    let settings = ServerConfig::from_env()?;

    let config_slot: Arc<Dependency<RuntimeConfig>> = Arc::new(Dependency::new());
    let connector_slot: Arc<Dependency<dyn Connector>> = Arc::new(Dependency::new());
    let init_gate = Arc::new(InitGate::new(config_slot.clone(), connector_slot.clone(), settings.init_policy));

    let state = Arc::new(AppState::new(
        init_gate.clone(),
        Arc::new(FileStaging::new(settings.staging_path.clone())),
        Arc::new(DbAnalytics::new(init_gate.clone())),
        settings.clone(),
    ));

    init_gate.start();

    // the two dependencies arrive independently; the gate copes with either order
    match runtime_config {
        Ok(config) => {
            tracing::info!("Runtime configuration loaded for {}", config.environment.as_str());
            config_slot.provide(Arc::new(config));
        }
        Err(e) => tracing::error!("Runtime configuration unavailable: {}", e),
    }
    connector_slot.provide(Arc::new(SupabaseConnector));

    carbonyx::spawn_price_feed(state.clone());
    carbonyx::spawn_limiter_maintenance(state.clone());

    let app = carbonyx::router(state);
    tracing::info!("Starting server on port {}", settings.port);
    let listener = TcpListener::bind(format!("0.0.0.0:{}", settings.port)).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
