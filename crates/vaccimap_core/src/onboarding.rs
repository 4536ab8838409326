//! crates/vaccimap_core/src/onboarding.rs
//!
//! The profile-creation form: field entry, one GPS capture, and the write that
//! hands the user over to the dashboard.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::{Accuracy, LocationFix, NewProfile, Permission, Profile, Session};
use crate::guard::{while_mounted, Detached};
use crate::ports::{LocationProvider, PortError, ProfileStore};
use crate::validation::{parse_dob_text, required_text, FieldError};

/// What the user has entered so far. Kept intact across failed saves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileForm {
    pub parent_name: String,
    pub child_name: String,
    pub child_dob: Option<NaiveDate>,
    pub home_location: Option<LocationFix>,
}

impl ProfileForm {
    /// Checks every required field, reporting all problems at once.
    pub fn validate(&self, session: &Session) -> Result<NewProfile, Vec<FieldError>> {
        let mut problems = Vec::new();
        let parent_name = required_text(&self.parent_name, FieldError::MissingParentName)
            .map_err(|e| problems.push(e))
            .ok();
        let child_name = required_text(&self.child_name, FieldError::MissingChildName)
            .map_err(|e| problems.push(e))
            .ok();
        if self.child_dob.is_none() {
            problems.push(FieldError::MissingChildDob);
        }
        if self.home_location.is_none() {
            problems.push(FieldError::MissingHomeLocation);
        }

        match (parent_name, child_name, self.child_dob, self.home_location) {
            (Some(parent_name), Some(child_name), Some(child_dob), Some(fix)) if problems.is_empty() => {
                Ok(NewProfile {
                    phone_number: session.phone_number.clone(),
                    parent_name,
                    child_name,
                    child_dob,
                    home_location: fix.coordinates,
                    created_at: Utc::now(),
                })
            }
            _ => Err(problems),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingState {
    Editing,
    Locating,
    Saving,
    Saved,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OnboardingError {
    #[error("{}", join_fields(.0))]
    Invalid(Vec<FieldError>),
    #[error("Permission to access location was denied")]
    PermissionDenied,
    #[error("{0}")]
    Provider(#[from] PortError),
    #[error("Please wait for the current action to finish.")]
    Busy,
    #[error(transparent)]
    Detached(#[from] Detached),
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

impl From<FieldError> for OnboardingError {
    fn from(value: FieldError) -> Self {
        OnboardingError::Invalid(vec![value])
    }
}

pub struct OnboardingFlow {
    profiles: Arc<dyn ProfileStore>,
    location: Arc<dyn LocationProvider>,
    session: Session,
    form: ProfileForm,
    state: OnboardingState,
    teardown: CancellationToken,
}

impl OnboardingFlow {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        location: Arc<dyn LocationProvider>,
        session: Session,
    ) -> Self {
        Self {
            profiles,
            location,
            session,
            form: ProfileForm::default(),
            state: OnboardingState::Editing,
            teardown: CancellationToken::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn form(&self) -> &ProfileForm {
        &self.form
    }

    pub fn state(&self) -> OnboardingState {
        self.state
    }

    pub fn teardown_token(&self) -> CancellationToken {
        self.teardown.clone()
    }

    pub fn teardown(&self) {
        self.teardown.cancel();
    }

    pub fn set_parent_name(&mut self, value: &str) {
        self.form.parent_name = value.to_string();
    }

    pub fn set_child_name(&mut self, value: &str) {
        self.form.child_name = value.to_string();
    }

    /// Takes a date straight from a date picker.
    pub fn pick_child_dob(&mut self, date: NaiveDate) {
        self.form.child_dob = Some(date);
    }

    /// Takes a typed `YYYY-MM-DD` date. A bad value leaves the previous one in place.
    pub fn enter_child_dob(&mut self, raw: &str) -> Result<NaiveDate, FieldError> {
        let date = parse_dob_text(raw)?;
        self.form.child_dob = Some(date);
        Ok(date)
    }

    /// Asks for permission and takes one high-accuracy fix, held in memory
    /// until the profile is saved. Each call takes a fresh reading.
    pub async fn capture_location(&mut self) -> Result<LocationFix, OnboardingError> {
        if self.state != OnboardingState::Editing {
            return Err(OnboardingError::Busy);
        }
        self.state = OnboardingState::Locating;
        let result = self.locate().await;
        self.state = OnboardingState::Editing;

        match result {
            Ok(fix) => {
                info!(
                    "Captured home location ({:.5}, {:.5})",
                    fix.coordinates.latitude, fix.coordinates.longitude
                );
                self.form.home_location = Some(fix);
                Ok(fix)
            }
            Err(e) => {
                if matches!(e, OnboardingError::PermissionDenied) {
                    self.form.home_location = None;
                }
                error!("Location capture failed: {:?}", e);
                Err(e)
            }
        }
    }

    async fn locate(&self) -> Result<LocationFix, OnboardingError> {
        let permission = while_mounted(&self.teardown, self.location.request_permission()).await??;
        if permission == Permission::Denied {
            return Err(OnboardingError::PermissionDenied);
        }
        let fix = while_mounted(&self.teardown, self.location.current_fix(Accuracy::High)).await??;
        Ok(fix)
    }

    /// Validates the form and writes the profile under the session's subject.
    ///
    /// Nothing is sent when a field is missing. On a failed write the form is
    /// kept as entered so the user can retry.
    pub async fn save_profile(&mut self) -> Result<Profile, OnboardingError> {
        if self.state != OnboardingState::Editing {
            return Err(OnboardingError::Busy);
        }
        let new_profile = self.form.validate(&self.session).map_err(|problems| {
            warn!("Profile form incomplete: {:?}", problems);
            OnboardingError::Invalid(problems)
        })?;

        self.state = OnboardingState::Saving;
        let subject = self.session.subject_id;
        let written = while_mounted(&self.teardown, self.profiles.create(subject, &new_profile)).await;

        match written {
            Ok(Ok(())) => {
                info!("Profile created for {}", subject);
                self.state = OnboardingState::Saved;
                Ok(new_profile.into_profile(subject))
            }
            Ok(Err(e)) => {
                error!("Save profile error: {:?}", e);
                self.state = OnboardingState::Editing;
                Err(e.into())
            }
            Err(detached) => Err(detached.into()),
        }
    }
}
