//! Server runtime
//!
//! [`AppServices`] wires the service graph over one repository backend and
//! one payment gateway. [`ServerHandle`] owns the full process lifecycle:
//! store selection, migrations, rate seeding, the sweep worker, the HTTP
//! server, metrics and graceful shutdown.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::services::DEFAULT_ESTIMATED_POWER_KW;
use crate::application::{
    create_event_bus, CostCalculator, OrderRegistry, RateTable, ReconciliationEngine,
    SessionService, SettlementService, SharedEventBus, SweepWorker, WalletLedger,
};
use crate::config::{AppConfig, ConfigError, DEFAULT_RATE_STATION};
use crate::domain::ports::{DiscountPolicy, NoDiscount, PaymentGateway};
use crate::domain::{DomainError, DomainResult, Rate, RepositoryProvider};
use crate::infrastructure::database::migrate;
use crate::infrastructure::{
    init_database, GatewayConfig, HttpGateway, InMemoryStorage, SandboxGateway,
    SeaOrmRepositoryProvider,
};
use crate::interfaces::http::create_api_router;
use crate::shared::shutdown::{ShutdownCoordinator, ShutdownSignal};
use crate::shared::RetryConfig;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

// ── Service graph ──────────────────────────────────────────────────

/// Knobs of the service graph that do not come from the backend.
#[derive(Clone)]
pub struct ServiceSettings {
    pub default_rate: Option<Rate>,
    pub estimated_power_kw: Decimal,
    pub retry: RetryConfig,
    pub discounts: Arc<dyn DiscountPolicy>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            default_rate: Some(Rate {
                station_id: DEFAULT_RATE_STATION.to_string(),
                electricity_fee_per_kwh: Decimal::new(60, 2),
                service_fee_per_kwh: Decimal::new(40, 2),
                currency: "CNY".to_string(),
            }),
            estimated_power_kw: DEFAULT_ESTIMATED_POWER_KW,
            retry: RetryConfig::default(),
            discounts: Arc::new(NoDiscount),
        }
    }
}

impl ServiceSettings {
    pub fn from_config(config: &AppConfig) -> DomainResult<Self> {
        Ok(Self {
            default_rate: config.rates.default_rate()?,
            estimated_power_kw: config.settlement.estimated_power_kw,
            retry: config.settlement.retry(),
            discounts: Arc::new(NoDiscount),
        })
    }
}

/// Every application service, sharing one repository provider and event bus.
#[derive(Clone)]
pub struct AppServices {
    pub repos: Arc<dyn RepositoryProvider>,
    pub events: SharedEventBus,
    pub rates: Arc<RateTable>,
    pub orders: Arc<OrderRegistry>,
    pub wallets: Arc<WalletLedger>,
    pub reconciliation: Arc<ReconciliationEngine>,
    pub settlement: Arc<SettlementService>,
    pub sessions: Arc<SessionService>,
}

impl AppServices {
    pub fn build(
        repos: Arc<dyn RepositoryProvider>,
        gateway: Arc<dyn PaymentGateway>,
        settings: ServiceSettings,
    ) -> Self {
        let events = create_event_bus();
        let rates = Arc::new(RateTable::new(repos.clone(), settings.default_rate));
        let orders = Arc::new(OrderRegistry::new(repos.clone(), events.clone()));
        let wallets = Arc::new(WalletLedger::new(repos.clone(), events.clone()));
        let reconciliation = Arc::new(ReconciliationEngine::new(
            repos.clone(),
            orders.clone(),
            gateway,
            settings.retry.clone(),
            events.clone(),
        ));
        let settlement = Arc::new(SettlementService::new(
            repos.clone(),
            orders.clone(),
            reconciliation.clone(),
            settings.discounts,
            settings.retry,
            events.clone(),
        ));
        let sessions = Arc::new(SessionService::new(
            repos.clone(),
            rates.clone(),
            CostCalculator::new(settings.estimated_power_kw),
            settlement.clone(),
            events.clone(),
        ));

        Self {
            repos,
            events,
            rates,
            orders,
            wallets,
            reconciliation,
            settlement,
            sessions,
        }
    }

    /// Write each configured station rate to the store.
    pub async fn seed_rates(&self, rates: Vec<Rate>) -> DomainResult<usize> {
        let count = rates.len();
        for rate in rates {
            self.rates.upsert(rate).await?;
        }
        Ok(count)
    }
}

/// Sandbox or remote provider, per `gateway.sandbox`. A sandbox without a
/// configured secret signs with a random key that only this process knows.
pub fn build_gateway(config: &GatewayConfig) -> DomainResult<Arc<dyn PaymentGateway>> {
    if config.sandbox {
        warn!("Using the sandbox payment gateway; no real payments will be taken");
        let secret = if config.secret.is_empty() {
            uuid::Uuid::new_v4().simple().to_string()
        } else {
            config.secret.clone()
        };
        return Ok(Arc::new(SandboxGateway::new(secret)));
    }
    info!(base_url = %config.base_url, merchant_id = %config.merchant_id, "Using remote payment gateway");
    Ok(Arc::new(HttpGateway::new(config.clone())?))
}

// ── Options ────────────────────────────────────────────────────────

pub struct ServerOptions {
    pub config: AppConfig,
    /// Overrides `database.run_migrations` when set
    pub auto_migrate: Option<bool>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            config: AppConfig::default(),
            auto_migrate: None,
        }
    }
}

// ── ServerHandle ───────────────────────────────────────────────────

/// Handle to a running settlement service.
pub struct ServerHandle {
    pub services: AppServices,
    pub config: AppConfig,
    /// Address the HTTP server actually bound (port 0 resolves here)
    pub local_addr: SocketAddr,

    db: Option<DatabaseConnection>,
    shutdown: ShutdownCoordinator,
    api_task: JoinHandle<()>,
    sweep_task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub async fn start(opts: ServerOptions) -> Result<Self, ServerError> {
        let app_cfg = opts.config;
        app_cfg.validate()?;

        info!("Starting charge settlement service...");

        let prometheus_handle = prometheus_handle();

        // ── Store ──────────────────────────────────────────────
        let (repos, db): (Arc<dyn RepositoryProvider>, Option<DatabaseConnection>) =
            if app_cfg.uses_memory_store() {
                warn!("Using the in-memory store; data is lost on exit");
                (Arc::new(InMemoryStorage::new()), None)
            } else {
                info!(url = %app_cfg.database.url, "Connecting to database");
                let db = init_database(&app_cfg.database).await?;
                if opts.auto_migrate.unwrap_or(app_cfg.database.run_migrations) {
                    info!("Running database migrations...");
                    migrate(&db).await?;
                    info!("Migrations completed");
                }
                (Arc::new(SeaOrmRepositoryProvider::new(db.clone())), Some(db))
            };

        // ── Services ───────────────────────────────────────────
        let gateway = build_gateway(&app_cfg.gateway)?;
        let services = AppServices::build(repos, gateway, ServiceSettings::from_config(&app_cfg)?);
        let seeded = services.seed_rates(app_cfg.rates.station_rates()?).await?;
        if seeded > 0 {
            info!(count = seeded, "Station rates seeded from configuration");
        }

        // ── Shutdown coordinator ───────────────────────────────
        let shutdown = ShutdownCoordinator::new(app_cfg.server.shutdown_timeout);
        let shutdown_signal = shutdown.signal();

        // ── Background tasks ───────────────────────────────────
        let sweep_task = if app_cfg.sweep.enabled {
            let worker = SweepWorker::new(
                services.reconciliation.clone(),
                app_cfg.sweep.to_sweep_config(),
            );
            Some(worker.start(shutdown_signal.clone()))
        } else {
            info!("Pending-payment sweep disabled");
            None
        };

        // ── HTTP server ────────────────────────────────────────
        let router = create_api_router(&services, db.clone(), prometheus_handle);

        let addr = app_cfg.server.address();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
        info!(%local_addr, "HTTP server listening");

        let api_shutdown = shutdown_signal.clone();
        let api_server = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            api_shutdown.wait().await;
            info!("HTTP server received shutdown signal");
        });

        let api_task = tokio::spawn(async move {
            if let Err(e) = api_server.await {
                error!(error = %e, "HTTP server error");
            }
        });

        Ok(Self {
            services,
            config: app_cfg,
            local_addr,
            db,
            shutdown,
            api_task,
            sweep_task,
        })
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.signal()
    }

    /// Install SIGTERM / SIGINT listeners that trigger shutdown.
    pub fn install_signal_handler(&self) {
        self.shutdown.start_signal_listener();
    }

    pub fn trigger_shutdown(&self) {
        self.shutdown.signal().trigger();
    }

    /// Wait for the server to stop after shutdown has been triggered. Tasks
    /// still running after `server.shutdown_timeout` are abandoned.
    pub async fn wait(self) {
        let Self {
            db,
            shutdown,
            api_task,
            sweep_task,
            ..
        } = self;

        shutdown
            .shutdown_with_cleanup(|| async move {
                match api_task.await {
                    Ok(()) => info!("HTTP server stopped"),
                    Err(e) => error!(error = %e, "HTTP server task panicked"),
                }
                if let Some(task) = sweep_task {
                    if let Err(e) = task.await {
                        error!(error = %e, "Sweep task panicked");
                    }
                }
            })
            .await;

        if let Some(db) = db {
            if let Err(e) = db.close().await {
                warn!(error = %e, "Error closing database connection");
            } else {
                info!("Database connection closed");
            }
        }

        info!("Charge settlement service shutdown complete");
    }

    pub async fn shutdown(self) {
        info!("Shutting down charge settlement service...");
        self.trigger_shutdown();
        self.wait().await;
    }

    pub fn is_running(&self) -> bool {
        !self.api_task.is_finished()
    }
}

/// The global recorder can be installed once per process; restarts reuse it.
fn prometheus_handle() -> Option<PrometheusHandle> {
    static PROM_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

    PROM_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                info!("Prometheus metrics recorder installed");
                Some(handle)
            }
            Err(e) => {
                warn!(error = %e, "Prometheus recorder unavailable; /metrics disabled");
                None
            }
        })
        .clone()
}

/// Initialise tracing from the logging config. `RUST_LOG` overrides the level.
/// Call once, before [`ServerHandle::start`].
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{PaymentRequest, ProviderTradeStatus};

    #[tokio::test]
    async fn services_use_configured_default_rate() {
        let cfg = AppConfig::from_toml(
            "[rates]\nelectricity_fee_per_kwh = \"0.8\"\nservice_fee_per_kwh = \"0.2\"\ncurrency = \"EUR\"\n\
             [gateway]\nsandbox = true\n",
        )
        .unwrap();
        let services = AppServices::build(
            Arc::new(InMemoryStorage::new()),
            Arc::new(SandboxGateway::new("k")),
            ServiceSettings::from_config(&cfg).unwrap(),
        );

        let rate = services.rates.rate_for("ST-42").await.unwrap();
        assert_eq!(rate.station_id, "ST-42");
        assert_eq!(rate.currency, "EUR");
        assert_eq!(rate.unit_price().unwrap(), Decimal::ONE);
    }

    #[tokio::test]
    async fn seeded_station_rates_take_precedence() {
        let services = AppServices::build(
            Arc::new(InMemoryStorage::new()),
            Arc::new(SandboxGateway::new("k")),
            ServiceSettings::default(),
        );
        let seeded = services
            .seed_rates(vec![Rate::new("ST-1", Decimal::new(15, 1), Decimal::ZERO, "CNY").unwrap()])
            .await
            .unwrap();
        assert_eq!(seeded, 1);
        assert_eq!(
            services.rates.rate_for("ST-1").await.unwrap().unit_price().unwrap(),
            Decimal::new(15, 1)
        );
    }

    fn sandbox_config() -> GatewayConfig {
        GatewayConfig {
            sandbox: true,
            ..GatewayConfig::default()
        }
    }

    #[tokio::test]
    async fn sandbox_is_selected_when_enabled() {
        let gateway = build_gateway(&sandbox_config()).unwrap();
        let redirect = gateway
            .create_payment(&PaymentRequest {
                order_id: "ORD1".into(),
                amount: Decimal::ONE,
                subject: "test".into(),
            })
            .await
            .unwrap();
        assert!(redirect.redirect_url.contains("ORD1"));
    }

    #[test]
    fn sandbox_without_secret_rejects_callbacks_signed_with_placeholder() {
        let gateway = build_gateway(&sandbox_config()).unwrap();
        let forged = SandboxGateway::new("change-me").signed_callback(
            "ORD1",
            "T-1",
            ProviderTradeStatus::Success,
            Decimal::ONE_HUNDRED,
        );
        assert!(gateway.verify_callback(&forged).is_err());
    }

    #[test]
    fn live_gateway_is_the_default() {
        let mut config = AppConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        config.gateway.secret = "9f2c4e7a1b3d5f60aa".into();
        config.validate().unwrap();
        assert!(!config.gateway.sandbox);
    }

    #[tokio::test]
    async fn memory_server_starts_and_stops() {
        let mut config = AppConfig::default();
        config.database.url = "memory".into();
        config.gateway.sandbox = true;
        config.server.host = "127.0.0.1".into();
        config.server.port = 0;
        config.server.shutdown_timeout = 5;

        let handle = ServerHandle::start(ServerOptions {
            config,
            auto_migrate: None,
        })
        .await
        .unwrap();
        assert!(handle.is_running());
        assert_ne!(handle.local_addr.port(), 0);
        handle.shutdown().await;
    }
}
