pub mod auth_flow;
pub mod bootstrap;
pub mod dashboard;
pub mod domain;
pub mod gate;
pub mod guard;
pub mod lifecycle;
pub mod onboarding;
pub mod ports;
pub mod validation;

#[cfg(test)]
mod testing;

pub use auth_flow::{AuthError, AuthFlow, AuthState};
pub use bootstrap::{BootState, BootstrapError, SessionNotifier};
pub use dashboard::{Dashboard, DashboardError, DashboardState, MapState};
pub use domain::{
    Accuracy, ChallengeId, Coordinates, HomeLocationPatch, LocationFix, NewProfile, Permission,
    PhoneNumber, Profile, Session, SubjectId, UpcomingDose, VaccinationCenter, VaccinationSchedule,
    VerifierToken,
};
pub use gate::{ProfileGate, Route};
pub use guard::Detached;
pub use lifecycle::{Lifecycle, LifecycleError, Screen, Services};
pub use onboarding::{OnboardingError, OnboardingFlow, OnboardingState, ProfileForm};
pub use ports::{
    IdentityProvider, LocationProvider, PortError, PortResult, ProfileStore, ScheduleSource,
    SessionChanges,
};
pub use validation::FieldError;
