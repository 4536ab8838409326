//! crates/vaccimap_core/src/bootstrap.rs
//!
//! The session-notification service. It is constructed explicitly by the
//! composition root, subscribes to the identity provider once, decides whether
//! the app starts authenticated, and keeps relaying later session changes until
//! it is stopped.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{error, info};

use crate::domain::Session;
use crate::ports::{IdentityProvider, PortError, SessionChanges};

/// Where the launch-time session determination stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootState {
    Unknown,
    /// Waiting for the first notification; no protected screen may render.
    Initializing,
    Authenticated(Session),
    Unauthenticated,
    /// The subscription could not be established or closed before reporting.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootstrapError {
    #[error("Could not check for an existing session: {0}")]
    Subscribe(#[from] PortError),
    #[error("The session listener closed before reporting a session")]
    ClosedBeforeFirstNotification,
    #[error("The session listener was already started")]
    AlreadyStarted,
    #[error("The session listener has been stopped")]
    Stopped,
}

pub struct SessionNotifier {
    identity: Arc<dyn IdentityProvider>,
    changes: Option<SessionChanges>,
    state: BootState,
    stopped: bool,
}

impl SessionNotifier {
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            identity,
            changes: None,
            state: BootState::Unknown,
            stopped: false,
        }
    }

    pub fn state(&self) -> &BootState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.changes.is_some()
    }

    /// Subscribes and waits for the first notification.
    ///
    /// May be called again after a failure (the retry affordance), but never
    /// once a determination has been made or after `stop`.
    pub async fn start(&mut self) -> Result<&BootState, BootstrapError> {
        if self.stopped {
            return Err(BootstrapError::Stopped);
        }
        if !matches!(self.state, BootState::Unknown | BootState::Failed(_)) {
            return Err(BootstrapError::AlreadyStarted);
        }

        self.state = BootState::Initializing;
        info!("Checking for an existing session...");

        let mut changes = match self.identity.subscribe_session_changes().await {
            Ok(changes) => changes,
            Err(e) => {
                error!("Session subscription failed: {:?}", e);
                self.state = BootState::Failed(e.to_string());
                return Err(e.into());
            }
        };

        match changes.next().await {
            Some(first) => {
                self.state = match first {
                    Some(session) => {
                        info!("Restored session for subject {}", session.subject_id);
                        BootState::Authenticated(session)
                    }
                    None => {
                        info!("No existing session.");
                        BootState::Unauthenticated
                    }
                };
                self.changes = Some(changes);
                Ok(&self.state)
            }
            None => {
                error!("Session subscription closed before its first notification.");
                let err = BootstrapError::ClosedBeforeFirstNotification;
                self.state = BootState::Failed(err.to_string());
                Err(err)
            }
        }
    }

    /// Waits for the next session change after bootstrap. Returns `None` when
    /// the listener is not running or the provider closed the subscription.
    pub async fn next_change(&mut self) -> Option<Option<Session>> {
        let changes = self.changes.as_mut()?;
        let change = changes.next().await;
        if change.is_none() {
            info!("Session subscription ended.");
            self.changes = None;
        }
        change
    }

    /// Unsubscribes. Only the first call has any effect.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if self.changes.take().is_some() {
            info!("Session listener stopped.");
        }
    }
}

impl Drop for SessionNotifier {
    fn drop(&mut self) {
        self.stop();
    }
}
