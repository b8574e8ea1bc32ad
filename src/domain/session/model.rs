//! Charging session domain entity
//!
//! Transitions are pure: they take `now` explicitly and only mutate the
//! in-memory value. Persisting a transition is a compare-and-swap on
//! `(status, version)` done by the repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order::PaymentMethod;
use crate::domain::rate::Rate;
use crate::domain::{DomainError, DomainResult};
use crate::shared::money::{round_energy, MAX_ENERGY_KWH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Suspended,
    Completed,
    Faulted,
}

str_enum!(SessionStatus {
    Active => "active",
    Suspended => "suspended",
    Completed => "completed",
    Faulted => "faulted",
});

impl SessionStatus {
    /// Active or suspended: the session still holds its charger.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Active | Self::Suspended)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    /// Nothing to pay (zero energy or fully discounted)
    NotRequired,
}

str_enum!(PaymentStatus {
    Pending => "pending",
    Paid => "paid",
    NotRequired => "not_required",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    Local,
    Remote,
    #[serde(rename = "EVDisconnected")]
    EvDisconnected,
    EmergencyStop,
    PowerLoss,
    LimitReached,
    Other,
}

str_enum!(StopReason {
    Local => "Local",
    Remote => "Remote",
    EvDisconnected => "EVDisconnected",
    EmergencyStop => "EmergencyStop",
    PowerLoss => "PowerLoss",
    LimitReached => "LimitReached",
    Other => "Other",
});

/// Energy delivered by a session, tagged with its provenance for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "kwh", rename_all = "snake_case")]
pub enum EnergyReading {
    /// Reported by the charger's meter
    Measured(Decimal),
    /// Derived from active duration because telemetry was missing
    Estimated(Decimal),
}

impl EnergyReading {
    pub fn kwh(&self) -> Decimal {
        match self {
            Self::Measured(kwh) | Self::Estimated(kwh) => *kwh,
        }
    }

    pub fn is_estimated(&self) -> bool {
        matches!(self, Self::Estimated(_))
    }
}

/// Optional limits requested at start. Stored for audit; enforcement is the
/// hardware monitor's job (it calls stop on cutoff).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargingTargets {
    pub max_energy_kwh: Option<Decimal>,
    pub max_cost: Option<Decimal>,
    /// Target state of charge (%)
    pub target_soc: Option<u8>,
}

impl ChargingTargets {
    pub fn validate(&self) -> DomainResult<()> {
        let non_positive = |v: &Option<Decimal>| v.map_or(false, |v| v <= Decimal::ZERO);
        if non_positive(&self.max_energy_kwh) || non_positive(&self.max_cost) {
            return Err(DomainError::Validation("charging targets must be positive".into()));
        }
        if self.max_energy_kwh.map_or(false, |kwh| kwh > MAX_ENERGY_KWH) {
            return Err(DomainError::Validation(format!(
                "max_energy_kwh exceeds {} kWh",
                MAX_ENERGY_KWH
            )));
        }
        if self.target_soc.map_or(false, |soc| soc == 0 || soc > 100) {
            return Err(DomainError::Validation("target_soc must be within 1..=100".into()));
        }
        Ok(())
    }
}

/// One telemetry sample. `energy_kwh` is cumulative since session start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterReading {
    pub energy_kwh: Decimal,
    #[serde(default)]
    pub power_kw: Option<Decimal>,
    /// State of charge (%)
    #[serde(default)]
    pub soc: Option<u8>,
}

impl MeterReading {
    pub fn energy(energy_kwh: Decimal) -> Self {
        Self {
            energy_kwh,
            power_kw: None,
            soc: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingSession {
    pub session_id: String,
    pub user_id: String,
    pub charger_id: String,
    pub station_id: String,
    pub status: SessionStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    /// Prices resolved at start
    pub rate: Rate,
    pub targets: ChargingTargets,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Battery level (%) reported at start
    pub start_energy_level: Option<u8>,
    /// Battery level (%) at stop
    pub end_energy_level: Option<u8>,
    /// Active seconds accumulated over completed active segments
    pub active_seconds: i64,
    /// Start of the current active segment; `None` while suspended or closed
    pub resumed_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub duration_seconds: i64,
    pub last_meter_kwh: Option<Decimal>,
    pub current_power_kw: Option<Decimal>,
    pub state_of_charge: Option<u8>,
    pub last_meter_update: Option<DateTime<Utc>>,
    pub energy_delivered_kwh: Decimal,
    pub energy_estimated: bool,
    /// Fixed once the session is closed
    pub total_cost: Decimal,
    pub stop_reason: Option<String>,
    pub version: i64,
}

/// Final figures applied by [`ChargingSession::close`].
#[derive(Debug, Clone)]
pub struct SessionClosing {
    pub status: SessionStatus,
    pub reading: EnergyReading,
    pub total_cost: Decimal,
    pub reason: String,
}

impl ChargingSession {
    pub fn open(
        user_id: impl Into<String>,
        charger_id: impl Into<String>,
        rate: Rate,
        payment_method: PaymentMethod,
        targets: ChargingTargets,
        start_energy_level: Option<u8>,
        now: DateTime<Utc>,
    ) -> Self {
        let session_id = format!("CS{}", &uuid::Uuid::new_v4().simple().to_string()[..24]);
        Self {
            session_id,
            user_id: user_id.into(),
            charger_id: charger_id.into(),
            station_id: rate.station_id.clone(),
            status: SessionStatus::Active,
            payment_method,
            payment_status: PaymentStatus::Pending,
            rate,
            targets,
            start_time: now,
            end_time: None,
            start_energy_level,
            end_energy_level: None,
            active_seconds: 0,
            resumed_at: Some(now),
            paused_at: None,
            duration_seconds: 0,
            last_meter_kwh: None,
            current_power_kw: None,
            state_of_charge: start_energy_level,
            last_meter_update: None,
            energy_delivered_kwh: Decimal::ZERO,
            energy_estimated: false,
            total_cost: Decimal::ZERO,
            stop_reason: None,
            version: 1,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    /// Active seconds as of `now`, excluding suspended intervals.
    pub fn active_seconds_at(&self, now: DateTime<Utc>) -> i64 {
        let running = match (self.status, self.resumed_at) {
            (SessionStatus::Active, Some(since)) => (now - since).num_seconds().max(0),
            _ => 0,
        };
        self.active_seconds + running
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != SessionStatus::Active {
            return Err(self.invalid_state("pause"));
        }
        self.active_seconds = self.active_seconds_at(now);
        self.resumed_at = None;
        self.paused_at = Some(now);
        self.status = SessionStatus::Suspended;
        self.version += 1;
        Ok(())
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != SessionStatus::Suspended {
            return Err(self.invalid_state("resume"));
        }
        self.resumed_at = Some(now);
        self.paused_at = None;
        self.status = SessionStatus::Active;
        self.version += 1;
        Ok(())
    }

    /// Record a telemetry sample. Cumulative energy must not go backwards.
    pub fn record_meter(&mut self, reading: &MeterReading, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.is_open() {
            return Err(self.invalid_state("record meter values"));
        }
        let energy = round_energy(reading.energy_kwh);
        if energy < Decimal::ZERO {
            return Err(DomainError::Validation("energy reading must not be negative".into()));
        }
        if energy > MAX_ENERGY_KWH {
            return Err(DomainError::Validation(format!(
                "energy reading {} kWh exceeds {} kWh",
                energy, MAX_ENERGY_KWH
            )));
        }
        if let Some(last) = self.last_meter_kwh {
            if energy < last {
                return Err(DomainError::Validation(format!(
                    "energy reading {} kWh is below the previous {} kWh",
                    energy, last
                )));
            }
        }
        if reading.soc.map_or(false, |soc| soc > 100) {
            return Err(DomainError::Validation("soc must be within 0..=100".into()));
        }

        self.last_meter_kwh = Some(energy);
        if reading.power_kw.is_some() {
            self.current_power_kw = reading.power_kw;
        }
        if reading.soc.is_some() {
            self.state_of_charge = reading.soc;
        }
        self.last_meter_update = Some(now);
        self.version += 1;
        Ok(())
    }

    /// Move to a terminal status with the final energy and cost.
    pub fn close(&mut self, closing: SessionClosing, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.is_open() {
            return Err(self.invalid_state("close"));
        }
        if closing.status.is_open() {
            return Err(DomainError::Validation(format!(
                "{} is not a terminal session status",
                closing.status
            )));
        }

        self.duration_seconds = self.active_seconds_at(now);
        self.active_seconds = self.duration_seconds;
        self.resumed_at = None;
        self.end_time = Some(now);
        self.end_energy_level = self.state_of_charge;
        self.energy_delivered_kwh = closing.reading.kwh();
        self.energy_estimated = closing.reading.is_estimated();
        self.total_cost = closing.total_cost;
        self.stop_reason = Some(closing.reason);
        self.status = closing.status;
        self.version += 1;
        Ok(())
    }

    pub fn energy_reading(&self) -> EnergyReading {
        if self.energy_estimated {
            EnergyReading::Estimated(self.energy_delivered_kwh)
        } else {
            EnergyReading::Measured(self.energy_delivered_kwh)
        }
    }

    pub fn invalid_state(&self, operation: &'static str) -> DomainError {
        DomainError::InvalidState {
            session_id: self.session_id.clone(),
            actual: self.status.to_string(),
            operation,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn sample_session(now: DateTime<Utc>) -> ChargingSession {
        let rate = Rate::new("ST-1", d("0.6"), d("0.4"), "CNY").unwrap();
        ChargingSession::open(
            "u1",
            "CH-1",
            rate,
            PaymentMethod::Balance,
            ChargingTargets::default(),
            Some(20),
            now,
        )
    }

    fn closing(kwh: &str, cost: &str) -> SessionClosing {
        SessionClosing {
            status: SessionStatus::Completed,
            reading: EnergyReading::Measured(d(kwh)),
            total_cost: d(cost),
            reason: "Local".into(),
        }
    }

    #[test]
    fn new_session_is_active() {
        let s = sample_session(Utc::now());
        assert_eq!(s.status, SessionStatus::Active);
        assert_eq!(s.payment_status, PaymentStatus::Pending);
        assert_eq!(s.station_id, "ST-1");
        assert!(s.session_id.starts_with("CS"));
        assert_eq!(s.version, 1);
    }

    #[test]
    fn paused_interval_is_excluded_from_duration() {
        let t0 = Utc::now();
        let mut s = sample_session(t0);
        s.pause(t0 + Duration::seconds(600)).unwrap();
        s.resume(t0 + Duration::seconds(1500)).unwrap();
        s.close(closing("10", "10.00"), t0 + Duration::seconds(1800)).unwrap();
        assert_eq!(s.duration_seconds, 900);
        assert_eq!(s.end_time, Some(t0 + Duration::seconds(1800)));
    }

    #[test]
    fn closing_while_suspended_counts_only_active_time() {
        let t0 = Utc::now();
        let mut s = sample_session(t0);
        s.pause(t0 + Duration::seconds(300)).unwrap();
        s.close(closing("1", "1.00"), t0 + Duration::seconds(3000)).unwrap();
        assert_eq!(s.duration_seconds, 300);
    }

    #[test]
    fn pause_requires_active_and_resume_requires_suspended() {
        let now = Utc::now();
        let mut s = sample_session(now);
        assert!(matches!(s.resume(now), Err(DomainError::InvalidState { .. })));
        s.pause(now).unwrap();
        assert!(matches!(s.pause(now), Err(DomainError::InvalidState { .. })));
    }

    #[test]
    fn closed_session_rejects_further_transitions() {
        let now = Utc::now();
        let mut s = sample_session(now);
        s.close(closing("10", "10.00"), now).unwrap();
        assert!(s.pause(now).is_err());
        assert!(s.close(closing("20", "20.00"), now).is_err());
        assert!(s.record_meter(&MeterReading::energy(d("30")), now).is_err());
        assert_eq!(s.total_cost, d("10.00"));
    }

    #[test]
    fn close_requires_terminal_status() {
        let now = Utc::now();
        let mut s = sample_session(now);
        let mut c = closing("1", "1.00");
        c.status = SessionStatus::Suspended;
        assert!(matches!(s.close(c, now), Err(DomainError::Validation(_))));
    }

    #[test]
    fn meter_readings_are_monotonic() {
        let now = Utc::now();
        let mut s = sample_session(now);
        s.record_meter(&MeterReading { energy_kwh: d("2.5"), power_kw: Some(d("7.2")), soc: Some(40) }, now)
            .unwrap();
        assert_eq!(s.last_meter_kwh, Some(d("2.5")));
        assert_eq!(s.state_of_charge, Some(40));
        let err = s.record_meter(&MeterReading::energy(d("2.0")), now).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn oversized_meter_reading_is_rejected() {
        let now = Utc::now();
        let mut s = sample_session(now);
        s.record_meter(&MeterReading::energy(MAX_ENERGY_KWH), now).unwrap();
        let huge = MeterReading::energy(d("79000000000000000000000000000"));
        let err = s.record_meter(&huge, now).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(s.last_meter_kwh, Some(MAX_ENERGY_KWH));
    }

    #[test]
    fn estimated_energy_survives_close() {
        let now = Utc::now();
        let mut s = sample_session(now);
        let mut c = closing("1.5", "1.50");
        c.reading = EnergyReading::Estimated(d("1.5"));
        s.close(c, now).unwrap();
        assert!(s.energy_estimated);
        assert_eq!(s.energy_reading(), EnergyReading::Estimated(d("1.5")));
    }

    #[test]
    fn targets_validation() {
        let bad = ChargingTargets { target_soc: Some(120), ..Default::default() };
        assert!(bad.validate().is_err());
        let bad = ChargingTargets { max_cost: Some(Decimal::ZERO), ..Default::default() };
        assert!(bad.validate().is_err());
        let bad = ChargingTargets { max_energy_kwh: Some(d("1000000000.001")), ..Default::default() };
        assert!(bad.validate().is_err());
        let ok = ChargingTargets { max_energy_kwh: Some(d("30")), target_soc: Some(80), max_cost: None };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn stop_reason_parsing() {
        assert_eq!(StopReason::parse("EVDisconnected"), Some(StopReason::EvDisconnected));
        assert_eq!(StopReason::parse("Remote").map(|r| r.as_str()), Some("Remote"));
        assert_eq!(StopReason::parse("bogus"), None);
    }
}
