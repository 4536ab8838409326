//! crates/vaccimap_core/src/gate.rs
//!
//! The profile-existence gate run after every successful authentication.

use std::sync::Arc;

use tracing::{error, info};

use crate::domain::Session;
use crate::ports::{PortError, ProfileStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Dashboard,
    Onboarding,
}

pub struct ProfileGate {
    profiles: Arc<dyn ProfileStore>,
}

impl ProfileGate {
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        Self { profiles }
    }

    /// Decides where an authenticated subject goes next.
    ///
    /// A failed read is returned as an error rather than guessed at; the caller
    /// keeps the user on a retry screen instead of routing anywhere.
    pub async fn route(&self, session: &Session) -> Result<Route, PortError> {
        match self.profiles.get(session.subject_id).await {
            Ok(Some(_)) => {
                info!("Profile found for {}; routing to dashboard.", session.subject_id);
                Ok(Route::Dashboard)
            }
            Ok(None) => {
                info!("No profile for {}; routing to onboarding.", session.subject_id);
                Ok(Route::Onboarding)
            }
            Err(e) => {
                error!("Profile check failed for {}: {:?}", session.subject_id, e);
                Err(e)
            }
        }
    }
}
