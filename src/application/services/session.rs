//! Charging session service
//!
//! Every transition is read → pure domain mutation → compare-and-swap on
//! `(status, version)`. A conflicting write makes the loop re-read, so a
//! concurrent terminal transition surfaces as `InvalidState`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use crate::application::events::{
    Event, SessionClosedEvent, SessionStartedEvent, SessionStatusChangedEvent, SharedEventBus,
};
use crate::application::services::cost::{CostBreakdown, CostCalculator};
use crate::application::services::rates::RateTable;
use crate::application::services::settlement::{SettlementOutcome, SettlementService};
use crate::domain::{
    ChargingSession, ChargingTargets, DomainError, DomainResult, MeterReading, PaymentMethod,
    RepositoryProvider, SessionClosing, SessionStatus, StopReason,
};

const MAX_CAS_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Deserialize)]
pub struct StartSession {
    pub user_id: String,
    pub charger_id: String,
    pub station_id: String,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub targets: ChargingTargets,
    #[serde(default)]
    pub start_energy_level: Option<u8>,
}

/// A session moved to a terminal status, with the settlement attempt made
/// right after.
#[derive(Debug, Clone)]
pub struct SessionClosed {
    pub session: ChargingSession,
    pub cost: CostBreakdown,
    pub settlement: SettlementOutcome,
}

pub struct SessionService {
    repos: Arc<dyn RepositoryProvider>,
    rates: Arc<RateTable>,
    calculator: CostCalculator,
    settlement: Arc<SettlementService>,
    events: SharedEventBus,
}

impl SessionService {
    pub fn new(
        repos: Arc<dyn RepositoryProvider>,
        rates: Arc<RateTable>,
        calculator: CostCalculator,
        settlement: Arc<SettlementService>,
        events: SharedEventBus,
    ) -> Self {
        Self {
            repos,
            rates,
            calculator,
            settlement,
            events,
        }
    }

    pub async fn start(&self, cmd: StartSession) -> DomainResult<ChargingSession> {
        for (field, value) in [
            ("user_id", &cmd.user_id),
            ("charger_id", &cmd.charger_id),
            ("station_id", &cmd.station_id),
        ] {
            if value.trim().is_empty() {
                return Err(DomainError::Validation(format!("{} is required", field)));
            }
        }
        cmd.targets.validate()?;
        if cmd.start_energy_level.map_or(false, |soc| soc > 100) {
            return Err(DomainError::Validation("start_energy_level must be within 0..=100".into()));
        }

        let rate = self.rates.rate_for(&cmd.station_id).await?;
        let session = ChargingSession::open(
            cmd.user_id,
            cmd.charger_id,
            rate,
            cmd.payment_method,
            cmd.targets,
            cmd.start_energy_level,
            Utc::now(),
        );
        self.repos.sessions().insert_open(&session).await?;

        metrics::counter!("sessions_started_total").increment(1);
        info!(
            session_id = %session.session_id,
            user_id = %session.user_id,
            charger_id = %session.charger_id,
            station_id = %session.station_id,
            method = %session.payment_method,
            "Charging session started"
        );
        self.events.publish(Event::SessionStarted(SessionStartedEvent {
            session_id: session.session_id.clone(),
            user_id: session.user_id.clone(),
            charger_id: session.charger_id.clone(),
            station_id: session.station_id.clone(),
            timestamp: session.start_time,
        }));
        Ok(session)
    }

    pub async fn pause(&self, session_id: &str, user_id: &str) -> DomainResult<ChargingSession> {
        let session = self
            .transition(session_id, Some(user_id), "pause", |s, now| s.pause(now))
            .await?;
        self.publish_status(&session, SessionStatus::Active);
        Ok(session)
    }

    pub async fn resume(&self, session_id: &str, user_id: &str) -> DomainResult<ChargingSession> {
        let session = self
            .transition(session_id, Some(user_id), "resume", |s, now| s.resume(now))
            .await?;
        self.publish_status(&session, SessionStatus::Suspended);
        Ok(session)
    }

    /// Complete the session and settle it. A settlement failure is reported
    /// in the outcome; the session stays completed with payment pending.
    pub async fn stop(
        &self,
        session_id: &str,
        user_id: &str,
        reason: StopReason,
        final_reading: Option<MeterReading>,
    ) -> DomainResult<SessionClosed> {
        self.close(
            session_id,
            Some(user_id),
            SessionStatus::Completed,
            reason.to_string(),
            final_reading,
        )
        .await
    }

    /// System-initiated close from any open state. Energy delivered so far is
    /// billed the same way as a stop.
    pub async fn fault(&self, session_id: &str, reason: &str) -> DomainResult<SessionClosed> {
        self.close(session_id, None, SessionStatus::Faulted, reason.to_string(), None)
            .await
    }

    pub async fn record_meter_reading(
        &self,
        session_id: &str,
        reading: MeterReading,
    ) -> DomainResult<ChargingSession> {
        let session = self
            .transition(session_id, None, "record meter values", |s, now| {
                s.record_meter(&reading, now)
            })
            .await?;
        debug!(
            session_id,
            energy_kwh = %reading.energy_kwh,
            power_kw = ?reading.power_kw,
            soc = ?reading.soc,
            "Meter reading recorded"
        );
        Ok(session)
    }

    pub async fn get(&self, session_id: &str) -> DomainResult<ChargingSession> {
        self.repos
            .sessions()
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| DomainError::not_found("ChargingSession", "session_id", session_id))
    }

    /// Like [`SessionService::get`] but hides sessions of other users.
    pub async fn get_for_user(&self, session_id: &str, user_id: &str) -> DomainResult<ChargingSession> {
        self.load(session_id, Some(user_id)).await
    }

    pub async fn active_for_user(&self, user_id: &str) -> DomainResult<Option<ChargingSession>> {
        self.repos.sessions().find_open_for_user(user_id).await
    }

    pub async fn list_for_user(&self, user_id: &str) -> DomainResult<Vec<ChargingSession>> {
        self.repos.sessions().find_by_user(user_id).await
    }

    /// Itemised cost of a session as of now (final for closed sessions).
    pub fn cost_of(&self, session: &ChargingSession) -> DomainResult<CostBreakdown> {
        let reading = if session.is_open() {
            self.calculator
                .resolve_energy(session.last_meter_kwh, session.active_seconds_at(Utc::now()))
        } else {
            session.energy_reading()
        };
        self.calculator.breakdown(reading, &session.rate)
    }

    async fn close(
        &self,
        session_id: &str,
        owner: Option<&str>,
        status: SessionStatus,
        reason: String,
        final_reading: Option<MeterReading>,
    ) -> DomainResult<SessionClosed> {
        let operation = match status {
            SessionStatus::Faulted => "fault",
            _ => "stop",
        };
        let calculator = &self.calculator;
        let session = self
            .transition(session_id, owner, operation, |s, now| {
                if let Some(reading) = &final_reading {
                    s.record_meter(reading, now)?;
                }
                let reading = calculator.resolve_energy(s.last_meter_kwh, s.active_seconds_at(now));
                let total_cost = calculator.cost(reading.kwh(), &s.rate)?;
                s.close(
                    SessionClosing {
                        status,
                        reading,
                        total_cost,
                        reason: reason.clone(),
                    },
                    now,
                )
            })
            .await?;

        let cost = self.calculator.breakdown(session.energy_reading(), &session.rate)?;
        info!(
            session_id = %session.session_id,
            user_id = %session.user_id,
            status = %session.status,
            energy_kwh = %session.energy_delivered_kwh,
            estimated = session.energy_estimated,
            duration_seconds = session.duration_seconds,
            total_cost = %session.total_cost,
            reason = %reason,
            "Charging session closed"
        );
        self.events.publish(Event::SessionClosed(SessionClosedEvent {
            session_id: session.session_id.clone(),
            user_id: session.user_id.clone(),
            status: session.status.to_string(),
            energy_kwh: session.energy_delivered_kwh,
            energy_estimated: session.energy_estimated,
            duration_seconds: session.duration_seconds,
            total_cost: session.total_cost,
            currency: session.rate.currency.clone(),
            reason: session.stop_reason.clone(),
            timestamp: session.end_time.unwrap_or_else(Utc::now),
        }));

        let settlement = self.settlement.settle_session(&session).await;
        let session = self.get(session_id).await.unwrap_or(session);
        Ok(SessionClosed {
            session,
            cost,
            settlement,
        })
    }

    async fn load(&self, session_id: &str, owner: Option<&str>) -> DomainResult<ChargingSession> {
        self.repos
            .sessions()
            .find_by_id(session_id)
            .await?
            .filter(|s| owner.map_or(true, |user| s.is_owned_by(user)))
            .ok_or_else(|| DomainError::not_found("ChargingSession", "session_id", session_id))
    }

    async fn transition<F>(
        &self,
        session_id: &str,
        owner: Option<&str>,
        operation: &'static str,
        mutate: F,
    ) -> DomainResult<ChargingSession>
    where
        F: Fn(&mut ChargingSession, DateTime<Utc>) -> DomainResult<()>,
    {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self.load(session_id, owner).await?;
            let mut next = current.clone();
            mutate(&mut next, Utc::now())?;
            if self
                .repos
                .sessions()
                .compare_and_swap(current.status, current.version, &next)
                .await?
            {
                return Ok(next);
            }
            debug!(session_id, operation, attempt, "Session CAS conflict, re-reading");
        }
        Err(self.load(session_id, owner).await?.invalid_state(operation))
    }

    fn publish_status(&self, session: &ChargingSession, old_status: SessionStatus) {
        info!(
            session_id = %session.session_id,
            user_id = %session.user_id,
            status = %session.status,
            "Charging session status changed"
        );
        self.events.publish(Event::SessionStatusChanged(SessionStatusChangedEvent {
            session_id: session.session_id.clone(),
            old_status: old_status.to_string(),
            new_status: session.status.to_string(),
            timestamp: Utc::now(),
        }));
    }
}
