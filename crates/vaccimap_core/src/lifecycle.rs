//! crates/vaccimap_core/src/lifecycle.rs
//!
//! The composition root of the client. It owns the injected ports, the session
//! listener and the one screen currently shown, and performs every hand-off
//! between screens: bootstrap, login, the profile gate, onboarding and the
//! dashboard.
//!
//! Screens are replaced, never stacked. A replaced screen is torn down so any
//! call it still has in flight is discarded.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::auth_flow::{AuthError, AuthFlow};
use crate::bootstrap::{BootState, BootstrapError, SessionNotifier};
use crate::dashboard::{Dashboard, DashboardError, DashboardState};
use crate::domain::{ChallengeId, Session, VerifierToken};
use crate::gate::{ProfileGate, Route};
use crate::onboarding::{OnboardingError, OnboardingFlow};
use crate::ports::{IdentityProvider, LocationProvider, PortError, ProfileStore, ScheduleSource};

/// The external collaborators, injected once at startup.
#[derive(Clone)]
pub struct Services {
    pub identity: Arc<dyn IdentityProvider>,
    pub profiles: Arc<dyn ProfileStore>,
    pub location: Arc<dyn LocationProvider>,
    pub schedule: Arc<dyn ScheduleSource>,
}

pub enum Screen {
    /// Waiting for the session listener's first report.
    Initializing,
    /// The session listener could not start; `retry` tries again.
    StartupFailed { reason: String },
    Login(AuthFlow),
    Onboarding(OnboardingFlow),
    Dashboard(Dashboard),
    /// Signed in, but the profile check could not be completed.
    ProfileUnavailable { session: Session, reason: String },
}

impl Screen {
    pub fn name(&self) -> &'static str {
        match self {
            Screen::Initializing => "initializing",
            Screen::StartupFailed { .. } => "startup_failed",
            Screen::Login(_) => "login",
            Screen::Onboarding(_) => "onboarding",
            Screen::Dashboard(_) => "dashboard",
            Screen::ProfileUnavailable { .. } => "profile_unavailable",
        }
    }

    /// The signed-in session this screen is working for, if any.
    pub fn session(&self) -> Option<&Session> {
        match self {
            Screen::Onboarding(flow) => Some(flow.session()),
            Screen::Dashboard(dashboard) => Some(dashboard.session()),
            Screen::ProfileUnavailable { session, .. } => Some(session),
            _ => None,
        }
    }

    fn teardown(&self) {
        match self {
            Screen::Login(flow) => flow.teardown(),
            Screen::Onboarding(flow) => flow.teardown(),
            Screen::Dashboard(dashboard) => dashboard.teardown(),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("Could not load your profile: {0}")]
    ProfileCheck(PortError),
    #[error(transparent)]
    Onboarding(#[from] OnboardingError),
    #[error(transparent)]
    Dashboard(#[from] DashboardError),
    #[error("'{action}' is not available on the {screen} screen")]
    WrongScreen { action: &'static str, screen: &'static str },
}

pub struct Lifecycle {
    services: Services,
    notifier: SessionNotifier,
    gate: ProfileGate,
    screen: Screen,
}

impl Lifecycle {
    pub fn new(services: Services) -> Self {
        let notifier = SessionNotifier::new(services.identity.clone());
        let gate = ProfileGate::new(services.profiles.clone());
        Self {
            services,
            notifier,
            gate,
            screen: Screen::Initializing,
        }
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn boot_state(&self) -> &BootState {
        self.notifier.state()
    }

    fn wrong_screen(&self, action: &'static str) -> LifecycleError {
        LifecycleError::WrongScreen {
            action,
            screen: self.screen.name(),
        }
    }

    fn replace(&mut self, next: Screen) {
        info!("Screen {} -> {}", self.screen.name(), next.name());
        self.screen.teardown();
        self.screen = next;
    }

    fn login_screen(&self) -> Screen {
        Screen::Login(AuthFlow::new(self.services.identity.clone()))
    }

    fn onboarding_screen(&self, session: Session) -> Screen {
        Screen::Onboarding(OnboardingFlow::new(
            self.services.profiles.clone(),
            self.services.location.clone(),
            session,
        ))
    }

    //=====================================================================================
    // Bootstrap and routing
    //=====================================================================================

    /// Determines the launch session and shows the first real screen.
    pub async fn start(&mut self) -> Result<(), LifecycleError> {
        if !matches!(self.screen, Screen::Initializing | Screen::StartupFailed { .. }) {
            return Err(self.wrong_screen("start"));
        }
        if matches!(self.screen, Screen::StartupFailed { .. }) {
            self.replace(Screen::Initializing);
        }

        let boot = match self.notifier.start().await {
            Ok(state) => state.clone(),
            Err(e) => {
                error!("Bootstrap failed: {}", e);
                self.replace(Screen::StartupFailed {
                    reason: e.to_string(),
                });
                return Err(e.into());
            }
        };

        match boot {
            BootState::Authenticated(session) => self.enter_authenticated(session).await,
            _ => {
                let login = self.login_screen();
                self.replace(login);
                Ok(())
            }
        }
    }

    /// Runs the profile gate for a freshly authenticated or restored session.
    async fn enter_authenticated(&mut self, session: Session) -> Result<(), LifecycleError> {
        match self.gate.route(&session).await {
            Ok(Route::Dashboard) => self.open_dashboard(session).await,
            Ok(Route::Onboarding) => {
                let onboarding = self.onboarding_screen(session);
                self.replace(onboarding);
                Ok(())
            }
            Err(e) => {
                self.replace(Screen::ProfileUnavailable {
                    session,
                    reason: e.to_string(),
                });
                Err(LifecycleError::ProfileCheck(e))
            }
        }
    }

    async fn open_dashboard(&mut self, session: Session) -> Result<(), LifecycleError> {
        let dashboard = Dashboard::new(
            self.services.identity.clone(),
            self.services.profiles.clone(),
            self.services.location.clone(),
            self.services.schedule.clone(),
            session.clone(),
        );
        self.replace(Screen::Dashboard(dashboard));
        self.reload_dashboard(session).await
    }

    async fn reload_dashboard(&mut self, session: Session) -> Result<(), LifecycleError> {
        let Screen::Dashboard(dashboard) = &mut self.screen else {
            return Err(self.wrong_screen("load dashboard"));
        };
        let loaded = dashboard.load().await.map(|_| ());
        match loaded {
            Ok(()) => Ok(()),
            Err(DashboardError::ProfileMissing) => {
                warn!("Profile vanished for {}; sending user to onboarding.", session.subject_id);
                let onboarding = self.onboarding_screen(session);
                self.replace(onboarding);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    //=====================================================================================
    // Login
    //=====================================================================================

    pub async fn send_verification(
        &mut self,
        raw_phone: &str,
        verifier: &VerifierToken,
    ) -> Result<ChallengeId, LifecycleError> {
        let Screen::Login(flow) = &mut self.screen else {
            return Err(self.wrong_screen("send code"));
        };
        let challenge = flow.send_verification(raw_phone, verifier).await?;
        Ok(challenge.clone())
    }

    /// Verifies the code and, on success, always leaves the login screen.
    pub async fn confirm_code(&mut self, code: &str) -> Result<(), LifecycleError> {
        let Screen::Login(flow) = &mut self.screen else {
            return Err(self.wrong_screen("verify code"));
        };
        let session = flow.confirm_code(code).await?;
        self.enter_authenticated(session).await
    }

    pub fn change_number(&mut self) -> Result<(), LifecycleError> {
        let Screen::Login(flow) = &mut self.screen else {
            return Err(self.wrong_screen("change number"));
        };
        flow.change_number()?;
        Ok(())
    }

    //=====================================================================================
    // Onboarding and dashboard
    //=====================================================================================

    pub fn onboarding_mut(&mut self) -> Result<&mut OnboardingFlow, LifecycleError> {
        let screen = self.screen.name();
        match &mut self.screen {
            Screen::Onboarding(flow) => Ok(flow),
            _ => Err(LifecycleError::WrongScreen {
                action: "edit profile",
                screen,
            }),
        }
    }

    pub fn dashboard_mut(&mut self) -> Result<&mut Dashboard, LifecycleError> {
        let screen = self.screen.name();
        match &mut self.screen {
            Screen::Dashboard(dashboard) => Ok(dashboard),
            _ => Err(LifecycleError::WrongScreen {
                action: "use dashboard",
                screen,
            }),
        }
    }

    /// Saves the profile and replaces onboarding with the dashboard.
    ///
    /// A profile that already exists for the subject is not an error for the
    /// user: the gate runs again and routes to wherever the stored profile says.
    pub async fn save_profile(&mut self) -> Result<(), LifecycleError> {
        let flow = self.onboarding_mut()?;
        let session = flow.session().clone();
        match flow.save_profile().await {
            Ok(_) => self.open_dashboard(session).await,
            Err(OnboardingError::Provider(PortError::Conflict(reason))) => {
                warn!(
                    "Profile for {} already exists ({}); re-running the profile check.",
                    session.subject_id, reason
                );
                self.enter_authenticated(session).await
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn logout(&mut self) -> Result<(), LifecycleError> {
        self.dashboard_mut()?.logout().await?;
        let login = self.login_screen();
        self.replace(login);
        Ok(())
    }

    /// The retry affordance for whichever step last failed.
    pub async fn retry(&mut self) -> Result<(), LifecycleError> {
        match &self.screen {
            Screen::StartupFailed { .. } => self.start().await,
            Screen::ProfileUnavailable { session, .. } => {
                let session = session.clone();
                self.enter_authenticated(session).await
            }
            Screen::Dashboard(dashboard) if dashboard.state() == DashboardState::LoadFailed => {
                let session = dashboard.session().clone();
                self.reload_dashboard(session).await
            }
            _ => Err(self.wrong_screen("retry")),
        }
    }

    //=====================================================================================
    // Session changes and shutdown
    //=====================================================================================

    /// Waits for the identity provider's next session change.
    pub async fn next_session_change(&mut self) -> Option<Option<Session>> {
        self.notifier.next_change().await
    }

    /// Reacts to a session change reported after bootstrap.
    pub async fn apply_session_change(&mut self, change: Option<Session>) -> Result<(), LifecycleError> {
        match change {
            None => {
                if matches!(self.screen, Screen::Login(_) | Screen::Initializing | Screen::StartupFailed { .. }) {
                    return Ok(());
                }
                info!("Session ended; returning to login.");
                let login = self.login_screen();
                self.replace(login);
                Ok(())
            }
            Some(session) => {
                let current = self.screen.session().map(|s| s.subject_id);
                if current == Some(session.subject_id) {
                    return Ok(());
                }
                if matches!(self.screen, Screen::Initializing | Screen::StartupFailed { .. }) {
                    return Ok(());
                }
                info!("Session changed to subject {}", session.subject_id);
                self.enter_authenticated(session).await
            }
        }
    }

    /// Stops the session listener and tears down the current screen. Safe to
    /// call more than once.
    pub fn shutdown(&mut self) {
        self.screen.teardown();
        self.notifier.stop();
    }
}
