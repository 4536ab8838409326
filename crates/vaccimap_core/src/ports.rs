//! crates/vaccimap_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the client's external collaborators.
//! These traits form the boundary of the hexagonal architecture, allowing the
//! lifecycle core to be independent of any identity vendor, document store or
//! device location API.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::domain::{
    Accuracy, ChallengeId, HomeLocationPatch, LocationFix, NewProfile, Permission, PhoneNumber,
    Profile, Session, SubjectId, VaccinationSchedule, VerifierToken,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
///
/// The message is the provider's own and is shown to the user verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    PermissionDenied(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// A subscription to session changes. Each item is the session as of that
/// notification (`None` once signed out). Dropping the stream unsubscribes.
pub type SessionChanges = Pin<Box<dyn Stream<Item = Option<Session>> + Send>>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Subscribes to session changes. The first notification reports the
    /// current (possibly restored) session.
    async fn subscribe_session_changes(&self) -> PortResult<SessionChanges>;

    /// Sends an OTP to `phone` and returns the challenge it must be paired with.
    async fn create_challenge(
        &self,
        phone: &PhoneNumber,
        verifier: &VerifierToken,
    ) -> PortResult<ChallengeId>;

    /// Exchanges a challenge and the code the user typed for a session.
    async fn resolve_challenge(&self, challenge: &ChallengeId, code: &str) -> PortResult<Session>;

    async fn sign_out(&self) -> PortResult<()>;

    async fn current_session(&self) -> PortResult<Option<Session>>;
}

/// Per-subject profile documents. Implementations namespace every document by
/// application instance and then by subject.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, subject: SubjectId) -> PortResult<Option<Profile>>;

    async fn create(&self, subject: SubjectId, profile: &NewProfile) -> PortResult<()>;

    /// Writes only the fields carried by the patch.
    async fn update_partial(&self, subject: SubjectId, patch: &HomeLocationPatch) -> PortResult<()>;
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn request_permission(&self) -> PortResult<Permission>;

    /// Acquires a fresh one-shot fix.
    async fn current_fix(&self, accuracy: Accuracy) -> PortResult<LocationFix>;
}

#[async_trait]
pub trait ScheduleSource: Send + Sync {
    async fn schedule(&self) -> PortResult<VaccinationSchedule>;
}
