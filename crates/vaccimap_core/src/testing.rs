//! In-memory fakes of every port, recording calls so tests can assert what was
//! (and was not) sent to a provider.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::{
    Accuracy, ChallengeId, Coordinates, HomeLocationPatch, LocationFix, NewProfile, Permission,
    PhoneNumber, Profile, Session, SubjectId, UpcomingDose, VaccinationCenter, VaccinationSchedule,
    VerifierToken,
};
use crate::lifecycle::Services;
use crate::ports::{
    IdentityProvider, LocationProvider, PortError, PortResult, ProfileStore, ScheduleSource,
    SessionChanges,
};

pub fn session() -> Session {
    Session {
        subject_id: SubjectId(Uuid::from_u128(0xfeed)),
        phone_number: PhoneNumber::parse("+15551234567").unwrap(),
    }
}

pub fn profile_for(session: &Session) -> Profile {
    let now = Utc::now();
    Profile {
        subject_id: session.subject_id,
        phone_number: session.phone_number.clone(),
        parent_name: "Meena".to_string(),
        child_name: "Kavin".to_string(),
        child_dob: NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
        home_location: Coordinates::new(13.0, 80.2),
        created_at: now,
        updated_at: now,
    }
}

//=========================================================================================
// Identity
//=========================================================================================

pub struct FakeIdentity {
    pub challenge_result: Mutex<PortResult<ChallengeId>>,
    pub resolve_result: Mutex<PortResult<Session>>,
    pub sign_out_result: Mutex<PortResult<()>>,
    pub subscribe_fails: Mutex<bool>,
    pub calls: Mutex<Vec<String>>,
    changes_tx: mpsc::UnboundedSender<Option<Session>>,
    changes_rx: Mutex<Option<mpsc::UnboundedReceiver<Option<Session>>>>,
}

impl FakeIdentity {
    pub fn new() -> Self {
        let (changes_tx, changes_rx) = mpsc::unbounded_channel();
        Self {
            challenge_result: Mutex::new(Ok(ChallengeId("abc123".to_string()))),
            resolve_result: Mutex::new(Ok(session())),
            sign_out_result: Mutex::new(Ok(())),
            subscribe_fails: Mutex::new(false),
            calls: Mutex::new(Vec::new()),
            changes_tx,
            changes_rx: Mutex::new(Some(changes_rx)),
        }
    }

    /// Queues a session-change notification.
    pub fn notify(&self, session: Option<Session>) {
        let _ = self.changes_tx.send(session);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn subscribe_session_changes(&self) -> PortResult<SessionChanges> {
        self.record("subscribe".to_string());
        if *self.subscribe_fails.lock().unwrap() {
            return Err(PortError::Unavailable("listener refused".to_string()));
        }
        let rx = self
            .changes_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| PortError::Unexpected("already subscribed".to_string()))?;
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|change| (change, rx))
        });
        Ok(Box::pin(stream))
    }

    async fn create_challenge(
        &self,
        phone: &PhoneNumber,
        _verifier: &VerifierToken,
    ) -> PortResult<ChallengeId> {
        self.record(format!("create_challenge:{phone}"));
        self.challenge_result.lock().unwrap().clone()
    }

    async fn resolve_challenge(&self, challenge: &ChallengeId, code: &str) -> PortResult<Session> {
        self.record(format!("resolve_challenge:{challenge}:{code}"));
        self.resolve_result.lock().unwrap().clone()
    }

    async fn sign_out(&self) -> PortResult<()> {
        self.record("sign_out".to_string());
        self.sign_out_result.lock().unwrap().clone()
    }

    async fn current_session(&self) -> PortResult<Option<Session>> {
        Ok(None)
    }
}

//=========================================================================================
// Profiles
//=========================================================================================

#[derive(Default)]
pub struct FakeProfiles {
    pub documents: Mutex<HashMap<SubjectId, Profile>>,
    pub get_error: Mutex<Option<PortError>>,
    pub create_error: Mutex<Option<PortError>>,
    pub update_error: Mutex<Option<PortError>>,
    pub created: Mutex<Vec<(SubjectId, NewProfile)>>,
    pub patches: Mutex<Vec<(SubjectId, HomeLocationPatch)>>,
}

impl FakeProfiles {
    pub fn with_profile(profile: Profile) -> Self {
        let store = Self::default();
        store.documents.lock().unwrap().insert(profile.subject_id, profile);
        store
    }
}

#[async_trait]
impl ProfileStore for FakeProfiles {
    async fn get(&self, subject: SubjectId) -> PortResult<Option<Profile>> {
        if let Some(err) = self.get_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.documents.lock().unwrap().get(&subject).cloned())
    }

    async fn create(&self, subject: SubjectId, profile: &NewProfile) -> PortResult<()> {
        self.created.lock().unwrap().push((subject, profile.clone()));
        if let Some(err) = self.create_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.documents
            .lock()
            .unwrap()
            .insert(subject, profile.clone().into_profile(subject));
        Ok(())
    }

    async fn update_partial(&self, subject: SubjectId, patch: &HomeLocationPatch) -> PortResult<()> {
        self.patches.lock().unwrap().push((subject, *patch));
        if let Some(err) = self.update_error.lock().unwrap().clone() {
            return Err(err);
        }
        match self.documents.lock().unwrap().get_mut(&subject) {
            Some(profile) => {
                patch.apply_to(profile);
                Ok(())
            }
            None => Err(PortError::NotFound(format!("no profile for {subject}"))),
        }
    }
}

//=========================================================================================
// Location
//=========================================================================================

pub struct FakeLocation {
    pub permission: Mutex<Permission>,
    pub fix_error: Mutex<Option<PortError>>,
    pub fixes_served: Mutex<u32>,
}

impl FakeLocation {
    pub fn granted() -> Self {
        Self {
            permission: Mutex::new(Permission::Granted),
            fix_error: Mutex::new(None),
            fixes_served: Mutex::new(0),
        }
    }

    pub fn denied() -> Self {
        let location = Self::granted();
        *location.permission.lock().unwrap() = Permission::Denied;
        location
    }
}

#[async_trait]
impl LocationProvider for FakeLocation {
    async fn request_permission(&self) -> PortResult<Permission> {
        Ok(*self.permission.lock().unwrap())
    }

    async fn current_fix(&self, _accuracy: Accuracy) -> PortResult<LocationFix> {
        if let Some(err) = self.fix_error.lock().unwrap().clone() {
            return Err(err);
        }
        let mut served = self.fixes_served.lock().unwrap();
        *served += 1;
        // Every fix drifts a little so successive readings are distinguishable.
        let drift = f64::from(*served) * 0.001;
        Ok(LocationFix {
            coordinates: Coordinates::new(12.9 + drift, 80.1 + drift),
            captured_at: Utc::now(),
        })
    }
}

//=========================================================================================
// Schedule
//=========================================================================================

pub struct FakeSchedule;

pub fn sample_schedule() -> VaccinationSchedule {
    VaccinationSchedule {
        status: vec![("bcg".to_string(), true), ("opv".to_string(), false)],
        upcoming: vec![UpcomingDose {
            vaccine: "OPV 1".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
        }],
        centers: vec![VaccinationCenter {
            name: "VacciMap Polio Center".to_string(),
            description: "Nearest vaccination center".to_string(),
            coordinates: Coordinates::new(12.8245, 80.0450),
        }],
    }
}

#[async_trait]
impl ScheduleSource for FakeSchedule {
    async fn schedule(&self) -> PortResult<VaccinationSchedule> {
        Ok(sample_schedule())
    }
}

//=========================================================================================
// Wiring
//=========================================================================================

pub struct Fakes {
    pub identity: Arc<FakeIdentity>,
    pub profiles: Arc<FakeProfiles>,
    pub location: Arc<FakeLocation>,
}

impl Fakes {
    pub fn new() -> Self {
        Self {
            identity: Arc::new(FakeIdentity::new()),
            profiles: Arc::new(FakeProfiles::default()),
            location: Arc::new(FakeLocation::granted()),
        }
    }

    pub fn services(&self) -> Services {
        Services {
            identity: self.identity.clone(),
            profiles: self.profiles.clone(),
            location: self.location.clone(),
            schedule: Arc::new(FakeSchedule),
        }
    }
}
