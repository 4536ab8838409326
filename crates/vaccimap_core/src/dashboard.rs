//! crates/vaccimap_core/src/dashboard.rs
//!
//! The signed-in home screen: profile card, vaccination schedule, a map fix
//! with the nearest center, and the logout / update-home actions.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::{
    Accuracy, HomeLocationPatch, LocationFix, Permission, Profile, Session, VaccinationCenter,
    VaccinationSchedule,
};
use crate::guard::{while_mounted, Detached};
use crate::ports::{IdentityProvider, LocationProvider, PortError, ProfileStore, ScheduleSource};

const PERMISSION_DENIED: &str = "Permission to access location was denied";
const FIX_FAILED: &str = "Could not fetch location. Please ensure GPS is on.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardState {
    Loading,
    LoadFailed,
    Ready,
    Locating,
    UpdatingHome,
    LoggingOut,
    SignedOut,
}

/// What the map panel can show.
#[derive(Debug, Clone, PartialEq)]
pub enum MapState {
    Locating,
    Located(LocationFix),
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DashboardError {
    /// Signed in but no profile document: resolved by routing to onboarding.
    #[error("No profile data found")]
    ProfileMissing,
    #[error("{0}")]
    Provider(#[from] PortError),
    #[error("Get a location fix before updating your home location.")]
    NoFix,
    #[error("Please wait for the current action to finish.")]
    Busy,
    #[error(transparent)]
    Detached(#[from] Detached),
}

pub struct Dashboard {
    identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    location: Arc<dyn LocationProvider>,
    schedule_source: Arc<dyn ScheduleSource>,
    session: Session,
    state: DashboardState,
    profile: Option<Profile>,
    schedule: VaccinationSchedule,
    map: MapState,
    teardown: CancellationToken,
}

impl Dashboard {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        location: Arc<dyn LocationProvider>,
        schedule_source: Arc<dyn ScheduleSource>,
        session: Session,
    ) -> Self {
        Self {
            identity,
            profiles,
            location,
            schedule_source,
            session,
            state: DashboardState::Loading,
            profile: None,
            schedule: VaccinationSchedule::default(),
            map: MapState::Locating,
            teardown: CancellationToken::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> DashboardState {
        self.state
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn schedule(&self) -> &VaccinationSchedule {
        &self.schedule
    }

    pub fn map(&self) -> &MapState {
        &self.map
    }

    pub fn teardown_token(&self) -> CancellationToken {
        self.teardown.clone()
    }

    pub fn teardown(&self) {
        self.teardown.cancel();
    }

    /// The closest center to the current map fix, with its distance in km.
    pub fn nearest_center(&self) -> Option<(&VaccinationCenter, f64)> {
        match &self.map {
            MapState::Located(fix) => self.schedule.nearest_center(&fix.coordinates),
            _ => None,
        }
    }

    /// Reads the profile, the schedule and a fresh map fix. The three run
    /// concurrently and complete in no particular order.
    pub async fn load(&mut self) -> Result<&Profile, DashboardError> {
        if !matches!(self.state, DashboardState::Loading | DashboardState::LoadFailed) {
            return Err(DashboardError::Busy);
        }
        self.state = DashboardState::Loading;
        self.map = MapState::Locating;

        let subject = self.session.subject_id;
        let (profile, schedule, map) = while_mounted(&self.teardown, async {
            futures::join!(
                self.profiles.get(subject),
                self.schedule_source.schedule(),
                self.locate_for_map()
            )
        })
        .await?;
        self.map = map;

        let loaded = match (profile, schedule) {
            (Ok(Some(profile)), Ok(schedule)) => Ok((profile, schedule)),
            (Ok(None), _) => {
                error!("No profile data found for {}", subject);
                Err(DashboardError::ProfileMissing)
            }
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to fetch dashboard data: {:?}", e);
                Err(DashboardError::Provider(e))
            }
        };

        match loaded {
            Ok((profile, schedule)) => {
                info!("Dashboard loaded for {}", subject);
                self.schedule = schedule;
                self.state = DashboardState::Ready;
                Ok(&*self.profile.insert(profile))
            }
            Err(e) => {
                self.state = DashboardState::LoadFailed;
                Err(e)
            }
        }
    }

    async fn locate_for_map(&self) -> MapState {
        match self.location.request_permission().await {
            Ok(Permission::Granted) => {}
            Ok(Permission::Denied) => {
                warn!("Location permission denied on dashboard.");
                return MapState::Unavailable(PERMISSION_DENIED.to_string());
            }
            Err(e) => {
                error!("Location permission request failed: {:?}", e);
                return MapState::Unavailable(e.to_string());
            }
        }
        match self.location.current_fix(Accuracy::Balanced).await {
            Ok(fix) => MapState::Located(fix),
            Err(e) => {
                error!("Location error: {:?}", e);
                MapState::Unavailable(FIX_FAILED.to_string())
            }
        }
    }

    /// Takes a new map fix.
    pub async fn refresh_location(&mut self) -> Result<&MapState, DashboardError> {
        if self.state != DashboardState::Ready {
            return Err(DashboardError::Busy);
        }
        self.state = DashboardState::Locating;
        self.map = MapState::Locating;
        let map = while_mounted(&self.teardown, self.locate_for_map()).await;
        self.state = DashboardState::Ready;
        self.map = map?;
        Ok(&self.map)
    }

    /// Stores the current map fix as the profile's home location.
    ///
    /// Only the location and `updated_at` are written; the rest of the profile
    /// is never sent.
    pub async fn update_home_location(&mut self) -> Result<&Profile, DashboardError> {
        if self.state != DashboardState::Ready {
            return Err(DashboardError::Busy);
        }
        let fix = match &self.map {
            MapState::Located(fix) => *fix,
            _ => return Err(DashboardError::NoFix),
        };
        let patch = HomeLocationPatch {
            home_location: fix.coordinates,
            updated_at: Utc::now(),
        };

        self.state = DashboardState::UpdatingHome;
        let subject = self.session.subject_id;
        let written = while_mounted(&self.teardown, self.profiles.update_partial(subject, &patch)).await;
        self.state = DashboardState::Ready;

        match written? {
            Ok(()) => {
                info!("Home location updated for {}", subject);
                let profile = self.profile.as_mut().ok_or(DashboardError::ProfileMissing)?;
                patch.apply_to(profile);
                Ok(&*profile)
            }
            Err(e) => {
                error!("Home location update failed: {:?}", e);
                Err(e.into())
            }
        }
    }

    /// Signs out through the identity provider.
    pub async fn logout(&mut self) -> Result<(), DashboardError> {
        let previous = self.state;
        if !matches!(previous, DashboardState::Ready | DashboardState::LoadFailed) {
            return Err(DashboardError::Busy);
        }
        self.state = DashboardState::LoggingOut;
        let signed_out = while_mounted(&self.teardown, self.identity.sign_out()).await;

        match signed_out {
            Ok(Ok(())) => {
                info!("Signed out {}", self.session.subject_id);
                self.state = DashboardState::SignedOut;
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Logout error: {:?}", e);
                self.state = previous;
                Err(e.into())
            }
            Err(detached) => Err(detached.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{profile_for, session, FakeIdentity, FakeLocation, FakeProfiles, FakeSchedule};

    struct Harness {
        identity: Arc<FakeIdentity>,
        profiles: Arc<FakeProfiles>,
        location: Arc<FakeLocation>,
    }

    impl Harness {
        fn with_profile() -> Self {
            Self {
                identity: Arc::new(FakeIdentity::new()),
                profiles: Arc::new(FakeProfiles::with_profile(profile_for(&session()))),
                location: Arc::new(FakeLocation::granted()),
            }
        }

        fn dashboard(&self) -> Dashboard {
            Dashboard::new(
                self.identity.clone(),
                self.profiles.clone(),
                self.location.clone(),
                Arc::new(FakeSchedule),
                session(),
            )
        }
    }

    #[tokio::test]
    async fn load_reads_profile_schedule_and_fix() {
        let harness = Harness::with_profile();
        let mut dashboard = harness.dashboard();

        let profile = dashboard.load().await.unwrap().clone();
        assert_eq!(profile.child_name, "Kavin");
        assert_eq!(dashboard.state(), DashboardState::Ready);
        assert_eq!(dashboard.schedule().upcoming.len(), 1);
        assert!(matches!(dashboard.map(), MapState::Located(_)));

        let (center, km) = dashboard.nearest_center().unwrap();
        assert_eq!(center.name, "VacciMap Polio Center");
        assert!(km < 20.0);
    }

    #[tokio::test]
    async fn missing_profile_is_reported_for_rerouting() {
        let harness = Harness {
            profiles: Arc::new(FakeProfiles::default()),
            ..Harness::with_profile()
        };
        let mut dashboard = harness.dashboard();

        assert_eq!(dashboard.load().await.unwrap_err(), DashboardError::ProfileMissing);
        assert_eq!(dashboard.state(), DashboardState::LoadFailed);
    }

    #[tokio::test]
    async fn denied_location_does_not_block_the_dashboard() {
        let harness = Harness {
            location: Arc::new(FakeLocation::denied()),
            ..Harness::with_profile()
        };
        let mut dashboard = harness.dashboard();

        dashboard.load().await.unwrap();
        assert_eq!(dashboard.map(), &MapState::Unavailable(PERMISSION_DENIED.to_string()));
        assert!(dashboard.nearest_center().is_none());
        assert_eq!(dashboard.update_home_location().await.unwrap_err(), DashboardError::NoFix);
        assert!(harness.profiles.patches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn home_update_sends_only_location_and_timestamp() {
        let harness = Harness::with_profile();
        let original = profile_for(&session());
        let mut dashboard = harness.dashboard();
        dashboard.load().await.unwrap();

        let updated = dashboard.update_home_location().await.unwrap().clone();
        assert_eq!(updated.parent_name, original.parent_name);
        assert_ne!(updated.home_location, original.home_location);

        let patches = harness.profiles.patches.lock().unwrap();
        assert_eq!(patches.len(), 1);
        let payload = serde_json::to_value(patches[0].1).unwrap();
        let mut keys: Vec<&str> = payload.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, HomeLocationPatch::field_names());
        for identity_field in ["parent_name", "child_name", "child_dob"] {
            assert!(payload.get(identity_field).is_none());
        }
    }

    #[tokio::test]
    async fn failed_logout_keeps_the_dashboard() {
        let harness = Harness::with_profile();
        *harness.identity.sign_out_result.lock().unwrap() =
            Err(PortError::Unavailable("network-request-failed".to_string()));
        let mut dashboard = harness.dashboard();
        dashboard.load().await.unwrap();

        assert_eq!(dashboard.logout().await.unwrap_err().to_string(), "network-request-failed");
        assert_eq!(dashboard.state(), DashboardState::Ready);

        *harness.identity.sign_out_result.lock().unwrap() = Ok(());
        dashboard.logout().await.unwrap();
        assert_eq!(dashboard.state(), DashboardState::SignedOut);
    }

    #[tokio::test]
    async fn refresh_takes_a_new_fix() {
        let harness = Harness::with_profile();
        let mut dashboard = harness.dashboard();
        dashboard.load().await.unwrap();
        let first = dashboard.map().clone();

        let second = dashboard.refresh_location().await.unwrap().clone();
        assert_ne!(first, second);
        assert_eq!(*harness.location.fixes_served.lock().unwrap(), 2);
    }
}
