use std::sync::{Arc, Mutex};

use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use governor::{DefaultKeyedRateLimiter, RateLimiter};
use tokio::sync::broadcast;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

pub mod config;
pub mod error;
pub mod api {
    pub mod db_client;
    pub mod supabase;
}
pub mod handlers {
    pub mod auth_middleware;
    pub mod admin_handlers;
    pub mod market_handlers;
    pub mod page_handlers;
    pub mod registration_handlers;
}
pub mod models {
    pub mod market_models;
    pub mod registration_models;
}
pub mod repositories {
    pub mod market_repository;
    pub mod registration_repository;
}
pub mod utils {
    pub mod analytics;
    pub mod calculator;
    pub mod countdown;
    pub mod init_gate;
    pub mod staging;
    pub mod submission_guard;
}

use api::db_client::Subscription;
use config::ServerConfig;
use handlers::{admin_handlers, market_handlers, page_handlers, registration_handlers};
use models::market_models::MarketPrices;
use repositories::{market_repository::MarketRepository, registration_repository::RegistrationRepository};
use utils::{analytics::AnalyticsSink, init_gate::InitGate, staging::StagingArea, submission_guard::SubmissionGuard};

pub type KeyedLimiter = DefaultKeyedRateLimiter<String>;

// how often phone numbers with a refilled allowance are forgotten
const LIMITER_PRUNE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

pub struct AppState {
    pub init_gate: Arc<InitGate>,
    pub submission_guard: SubmissionGuard,
    pub registrations: RegistrationRepository,
    pub market: MarketRepository,
    pub staging: Arc<dyn StagingArea>,
    pub analytics: Arc<dyn AnalyticsSink>,
    pub price_updates: broadcast::Sender<MarketPrices>,
    pub price_subscription: Mutex<Option<Subscription>>,
    pub registration_limiter: KeyedLimiter,
    pub settings: ServerConfig,
}

impl AppState {
    pub fn new(
        init_gate: Arc<InitGate>,
        staging: Arc<dyn StagingArea>,
        analytics: Arc<dyn AnalyticsSink>,
        settings: ServerConfig,
    ) -> Self {
        let (price_updates, _) = broadcast::channel(16);
        Self {
            submission_guard: SubmissionGuard::new(init_gate.clone()),
            registrations: RegistrationRepository::new(init_gate.clone()),
            market: MarketRepository::new(init_gate.clone()),
            init_gate,
            staging,
            analytics,
            price_updates,
            price_subscription: Mutex::new(None),
            registration_limiter: RateLimiter::keyed(registration_handlers::registration_quota()),
            settings,
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}

/// Once the database client is up, relays active market price changes to
/// `price_updates`. Replaces any earlier feed.
pub fn spawn_price_feed(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if !state.init_gate.wait_settled().await.is_ready() {
            tracing::warn!("Market price feed not started: database client unavailable");
            return;
        }
        let sender = state.price_updates.clone();
        match state.market.subscribe(move |prices| {
            // no open pages is fine
            let _ = sender.send(prices);
        }) {
            Ok(subscription) => match state.price_subscription.lock() {
                Ok(mut slot) => *slot = Some(subscription),
                Err(e) => tracing::error!("Price subscription slot poisoned: {}", e),
            },
            Err(e) => tracing::error!("Failed to subscribe to market prices: {}", e),
        }
    })
}

/// Keeps the registration limiter from growing with every phone number it
/// has ever seen.
pub fn spawn_limiter_maintenance(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(LIMITER_PRUNE_INTERVAL);
        loop {
            ticker.tick().await;
            let tracked = registration_handlers::prune_limiter(&state.registration_limiter);
            tracing::debug!("Registration limiter tracking {} phone numbers", tracked);
        }
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    // Public routes for the landing page
    let public_routes = Router::new()
        .route("/api/health", get(health_check))
        .route("/api/pre-registrations", post(registration_handlers::submit_pre_registration))
        .route("/api/market-prices", get(market_handlers::get_market_prices))
        .route("/api/market-prices/stream", get(market_handlers::stream_market_prices))
        .route("/api/calculator", post(market_handlers::calculate_revenue))
        .route("/api/page-visits", post(page_handlers::log_page_visit))
        .route("/api/countdown", get(page_handlers::get_countdown));
    // Admin routes that need the admin token
    let admin_routes = Router::new()
        .route("/api/admin/pre-registrations", get(admin_handlers::list_pre_registrations))
        .route("/api/admin/market-prices", post(admin_handlers::update_market_prices))
        .route("/api/admin/status", get(admin_handlers::get_status))
        .route("/api/admin/reinit", post(admin_handlers::reinit_client))
        .route("/api/admin/pending", get(admin_handlers::list_pending).delete(admin_handlers::clear_pending))
        .route_layer(middleware::from_fn_with_state(state.clone(), handlers::auth_middleware::require_admin));

    let allow_origin = match state.settings.frontend_url.parse::<HeaderValue>() {
        Ok(origin) => AllowOrigin::exact(origin),
        Err(_) => {
            tracing::warn!("Invalid FRONTEND_URL {:?}, cross-origin requests disabled", state.settings.frontend_url);
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
    };

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO))
        )
        .layer(
            CorsLayer::new()
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST, axum::http::Method::OPTIONS, axum::http::Method::DELETE])
                .allow_origin(allow_origin)
                .allow_headers([
                    axum::http::header::CONTENT_TYPE,
                    axum::http::header::AUTHORIZATION,
                    axum::http::header::ACCEPT,
                    axum::http::header::ORIGIN,
                ])
        )
        .with_state(state)
}
