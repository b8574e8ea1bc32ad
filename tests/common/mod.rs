#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;

use charge_settlement::application::services::StartSession;
use charge_settlement::domain::ports::{CallbackPayload, ProviderTradeStatus};
use charge_settlement::domain::{
    ChargingSession, ChargingTargets, MeterReading, PaymentMethod, Rate, RepositoryProvider,
    StopReason,
};
use charge_settlement::infrastructure::SandboxGateway;
use charge_settlement::server::{AppServices, ServiceSettings};
use charge_settlement::shared::RetryConfig;
use charge_settlement::InMemoryStorage;

pub const SECRET: &str = "test-secret";

/// Full service graph over one backend and a sandbox gateway.
pub struct Harness {
    pub services: AppServices,
    pub gateway: Arc<SandboxGateway>,
}

pub fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// Default rate is 1.00 per kWh (0.60 electricity + 0.40 service).
pub fn settings() -> ServiceSettings {
    ServiceSettings {
        default_rate: Some(Rate::new("default", d("0.60"), d("0.40"), "CNY").unwrap()),
        retry: RetryConfig::no_retry(),
        ..ServiceSettings::default()
    }
}

pub fn harness() -> Harness {
    harness_over(Arc::new(InMemoryStorage::new()))
}

pub fn harness_over(repos: Arc<dyn RepositoryProvider>) -> Harness {
    let gateway = Arc::new(SandboxGateway::new(SECRET));
    let services = AppServices::build(repos, gateway.clone(), settings());
    Harness { services, gateway }
}

impl Harness {
    /// Open a wallet and top it up through a paid recharge order.
    pub async fn fund(&self, user_id: &str, amount: Decimal) {
        self.services.wallets.open_wallet(user_id).await.unwrap();
        if amount.is_zero() {
            return;
        }
        let recharge = self
            .services
            .reconciliation
            .start_recharge(user_id, amount)
            .await
            .unwrap();
        let payload = self.paid_callback(&recharge.order.order_id, amount);
        let ack = self.services.reconciliation.handle_callback(&payload).await;
        assert_eq!(ack.as_str(), "success");
    }

    pub fn paid_callback(&self, order_id: &str, amount: Decimal) -> CallbackPayload {
        self.gateway.signed_callback(
            order_id,
            &format!("T-{}", order_id),
            ProviderTradeStatus::Success,
            amount,
        )
    }

    pub async fn start(
        &self,
        user_id: &str,
        charger_id: &str,
        method: PaymentMethod,
    ) -> ChargingSession {
        self.services
            .sessions
            .start(start_cmd(user_id, charger_id, method))
            .await
            .unwrap()
    }

    pub async fn balance(&self, user_id: &str) -> Decimal {
        self.services.wallets.balance(user_id).await.unwrap()
    }

    pub async fn assert_ledger_consistent(&self, user_id: &str) {
        let audit = self.services.wallets.audit(user_id).await.unwrap();
        assert!(
            audit.consistent,
            "balance {} != ledger sum {}",
            audit.balance, audit.ledger_sum
        );
    }
}

pub fn start_cmd(user_id: &str, charger_id: &str, method: PaymentMethod) -> StartSession {
    StartSession {
        user_id: user_id.to_string(),
        charger_id: charger_id.to_string(),
        station_id: "ST-1".to_string(),
        payment_method: method,
        targets: ChargingTargets::default(),
        start_energy_level: Some(20),
    }
}

pub fn meter(kwh: &str) -> Option<MeterReading> {
    Some(MeterReading::energy(d(kwh)))
}

pub const LOCAL: StopReason = StopReason::Local;
