//! API router

use std::sync::Arc;
use std::time::Instant;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sea_orm::DatabaseConnection;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::modules::health::{health_check, HealthState};
use super::modules::metrics::{http_metrics_middleware, prometheus_metrics, MetricsState};
use super::modules::{orders, payments, rates, sessions, wallets};
use crate::application::{
    OrderRegistry, RateTable, ReconciliationEngine, SessionService, SettlementService,
    WalletLedger,
};
use crate::server::AppServices;

/// State shared by every `/api/v1` handler.
#[derive(Clone)]
pub struct ApiState {
    pub sessions: Arc<SessionService>,
    pub settlement: Arc<SettlementService>,
    pub wallets: Arc<WalletLedger>,
    pub orders: Arc<OrderRegistry>,
    pub reconciliation: Arc<ReconciliationEngine>,
    pub rates: Arc<RateTable>,
}

impl From<&AppServices> for ApiState {
    fn from(services: &AppServices) -> Self {
        Self {
            sessions: services.sessions.clone(),
            settlement: services.settlement.clone(),
            wallets: services.wallets.clone(),
            orders: services.orders.clone(),
            reconciliation: services.reconciliation.clone(),
            rates: services.rates.clone(),
        }
    }
}

fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route(
            "/api/v1/sessions",
            post(sessions::start_session).get(sessions::list_sessions),
        )
        .route("/api/v1/sessions/{id}", get(sessions::get_session))
        .route("/api/v1/sessions/{id}/pause", post(sessions::pause_session))
        .route("/api/v1/sessions/{id}/resume", post(sessions::resume_session))
        .route("/api/v1/sessions/{id}/stop", post(sessions::stop_session))
        .route("/api/v1/sessions/{id}/meter", post(sessions::record_meter))
        .route("/api/v1/sessions/{id}/fault", post(sessions::fault_session))
        .route(
            "/api/v1/sessions/{id}/settlement/retry",
            post(sessions::retry_settlement),
        )
        .route("/api/v1/sessions/{id}/orders", get(orders::list_session_orders))
        .route(
            "/api/v1/wallets/{user}",
            get(wallets::get_wallet).post(wallets::open_wallet),
        )
        .route("/api/v1/wallets/{user}/audit", get(wallets::audit_wallet))
        .route("/api/v1/wallets/{user}/recharge", post(wallets::recharge_wallet))
        .route("/api/v1/orders/{id}", get(orders::get_order))
        .route("/api/v1/payments/callback", post(payments::payment_callback))
        .route("/api/v1/rates", get(rates::list_rates))
        .route("/api/v1/rates/{station}", get(rates::get_rate))
        .with_state(state)
}

/// Build the full HTTP surface.
///
/// `metrics` is `None` when no Prometheus recorder is installed (tests);
/// `/metrics` is then not mounted.
pub fn create_api_router(
    services: &AppServices,
    db: Option<DatabaseConnection>,
    metrics: Option<PrometheusHandle>,
) -> Router {
    let health = Router::new()
        .route("/health", get(health_check))
        .with_state(HealthState {
            db,
            started_at: Arc::new(Instant::now()),
        });

    let mut router = Router::new()
        .merge(health)
        .merge(api_routes(ApiState::from(services)));

    if let Some(handle) = metrics {
        router = router.merge(
            Router::new()
                .route("/metrics", get(prometheus_metrics))
                .with_state(MetricsState { handle }),
        );
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router
        .layer(middleware::from_fn(http_metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
