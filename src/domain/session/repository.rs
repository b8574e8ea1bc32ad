//! Session repository interface

use async_trait::async_trait;

use super::model::{ChargingSession, PaymentStatus, SessionStatus};
use crate::domain::DomainResult;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a new open session, claiming its charger and its user.
    ///
    /// Fails `ChargerBusy` when another open session holds the charger, then
    /// `UserAlreadyCharging` when the user has an open session elsewhere.
    /// Either check and the insert are one atomic step.
    async fn insert_open(&self, session: &ChargingSession) -> DomainResult<()>;
    async fn find_by_id(&self, session_id: &str) -> DomainResult<Option<ChargingSession>>;
    /// Replace the stored session only if it is still at
    /// `(expected_status, expected_version)`. Returns `false` on conflict.
    /// Moving to a terminal status releases the charger and user claims.
    async fn compare_and_swap(
        &self,
        expected_status: SessionStatus,
        expected_version: i64,
        session: &ChargingSession,
    ) -> DomainResult<bool>;
    /// Update only the payment status of a closed session.
    async fn set_payment_status(&self, session_id: &str, status: PaymentStatus) -> DomainResult<()>;
    async fn find_open_for_user(&self, user_id: &str) -> DomainResult<Option<ChargingSession>>;
    /// All sessions of a user, newest first.
    async fn find_by_user(&self, user_id: &str) -> DomainResult<Vec<ChargingSession>>;
}
