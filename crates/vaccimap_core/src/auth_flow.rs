//! crates/vaccimap_core/src/auth_flow.rs
//!
//! The two-step phone OTP challenge/response.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::{ChallengeId, PhoneNumber, Session, VerifierToken};
use crate::guard::{while_mounted, Detached};
use crate::ports::{IdentityProvider, PortError};
use crate::validation::FieldError;

/// A single explicit state tag for the login screen. The in-flight variants
/// replace separate loading flags and make re-entrant submits impossible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    EnteringPhone,
    SendingCode { phone: PhoneNumber },
    CodeSent { phone: PhoneNumber, challenge: ChallengeId },
    Verifying { phone: PhoneNumber, challenge: ChallengeId },
    Resolved(Session),
}

impl AuthState {
    pub fn name(&self) -> &'static str {
        match self {
            AuthState::EnteringPhone => "entering_phone",
            AuthState::SendingCode { .. } => "sending_code",
            AuthState::CodeSent { .. } => "code_sent",
            AuthState::Verifying { .. } => "verifying",
            AuthState::Resolved(_) => "resolved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Invalid(#[from] FieldError),
    /// The provider's own message, surfaced verbatim.
    #[error("{0}")]
    Provider(#[from] PortError),
    #[error("'{action}' is not available while {state}")]
    NotAllowed { action: &'static str, state: &'static str },
    #[error(transparent)]
    Detached(#[from] Detached),
}

pub struct AuthFlow {
    identity: Arc<dyn IdentityProvider>,
    state: AuthState,
    teardown: CancellationToken,
}

impl AuthFlow {
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            identity,
            state: AuthState::EnteringPhone,
            teardown: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn challenge(&self) -> Option<&ChallengeId> {
        match &self.state {
            AuthState::CodeSent { challenge, .. } | AuthState::Verifying { challenge, .. } => {
                Some(challenge)
            }
            _ => None,
        }
    }

    pub fn teardown_token(&self) -> CancellationToken {
        self.teardown.clone()
    }

    pub fn teardown(&self) {
        self.teardown.cancel();
    }

    fn not_allowed(&self, action: &'static str) -> AuthError {
        AuthError::NotAllowed {
            action,
            state: self.state.name(),
        }
    }

    /// Validates the number locally and asks the provider to send an OTP.
    ///
    /// A malformed number never reaches the provider.
    pub async fn send_verification(
        &mut self,
        raw_phone: &str,
        verifier: &VerifierToken,
    ) -> Result<&ChallengeId, AuthError> {
        if self.state != AuthState::EnteringPhone {
            return Err(self.not_allowed("send code"));
        }
        let phone = PhoneNumber::parse(raw_phone).map_err(|e| {
            warn!("Rejected phone number input: {}", e);
            e
        })?;

        self.state = AuthState::SendingCode {
            phone: phone.clone(),
        };
        let sent = while_mounted(&self.teardown, self.identity.create_challenge(&phone, verifier)).await?;

        match sent {
            Ok(challenge) => {
                info!("Verification code sent to {}", phone);
                self.state = AuthState::CodeSent { phone, challenge };
                self.challenge().ok_or_else(|| self.not_allowed("send code"))
            }
            Err(e) => {
                error!("Phone auth error: {:?}", e);
                self.state = AuthState::EnteringPhone;
                Err(e.into())
            }
        }
    }

    /// Exchanges the stored challenge and `code` for a session.
    ///
    /// On rejection the flow stays on the code step with the same challenge, so
    /// the user can simply try again.
    pub async fn confirm_code(&mut self, code: &str) -> Result<Session, AuthError> {
        let (phone, challenge) = match &self.state {
            AuthState::CodeSent { phone, challenge } => (phone.clone(), challenge.clone()),
            AuthState::EnteringPhone => return Err(FieldError::MissingCode.into()),
            _ => return Err(self.not_allowed("verify code")),
        };
        let code = code.trim();
        if code.is_empty() {
            return Err(FieldError::MissingCode.into());
        }

        self.state = AuthState::Verifying {
            phone: phone.clone(),
            challenge: challenge.clone(),
        };
        let resolved = while_mounted(&self.teardown, self.identity.resolve_challenge(&challenge, code)).await?;

        match resolved {
            Ok(session) => {
                info!("Phone authentication succeeded for subject {}", session.subject_id);
                self.state = AuthState::Resolved(session.clone());
                Ok(session)
            }
            Err(e) => {
                error!("OTP confirm error: {:?}", e);
                self.state = AuthState::CodeSent { phone, challenge };
                Err(e.into())
            }
        }
    }

    /// Abandons the current challenge and goes back to the phone step.
    pub fn change_number(&mut self) -> Result<(), AuthError> {
        match self.state {
            AuthState::CodeSent { .. } => {
                info!("Discarding verification challenge; re-entering phone number.");
                self.state = AuthState::EnteringPhone;
                Ok(())
            }
            _ => Err(self.not_allowed("change number")),
        }
    }
}
