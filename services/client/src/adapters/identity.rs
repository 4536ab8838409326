//! services/client/src/adapters/identity.rs
//!
//! A local implementation of the `IdentityProvider` port for development and
//! offline use. It issues six-digit OTP codes, hands them to a delivery channel
//! instead of an SMS gateway, and persists the signed-in session to disk so it
//! is restored on the next launch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use argon2::{
    password_hash::{
        rand_core::{OsRng, RngCore},
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
    Argon2,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;
use vaccimap_core::domain::{ChallengeId, PhoneNumber, Session, SubjectId, VerifierToken};
use vaccimap_core::ports::{IdentityProvider, PortError, PortResult, SessionChanges};

//=========================================================================================
// Delivery and persisted state
//=========================================================================================

/// An OTP handed to the delivery channel in place of an SMS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredCode {
    pub phone: PhoneNumber,
    pub code: String,
}

/// What survives a restart: the signed-in session and a stable subject id
/// per phone number.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PersistedState {
    subjects: HashMap<String, SubjectId>,
    session: Option<Session>,
}

struct PendingChallenge {
    phone: PhoneNumber,
    code_hash: String,
    expires_at: DateTime<Utc>,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

pub struct LocalIdentityAdapter {
    store_path: PathBuf,
    otp_ttl: chrono::Duration,
    deliveries: mpsc::UnboundedSender<DeliveredCode>,
    state: Mutex<PersistedState>,
    challenges: Mutex<HashMap<ChallengeId, PendingChallenge>>,
    sessions: watch::Sender<Option<Session>>,
}

impl LocalIdentityAdapter {
    /// Opens the adapter, restoring any session persisted at `store_path`.
    pub async fn open(
        store_path: impl Into<PathBuf>,
        otp_ttl: std::time::Duration,
        deliveries: mpsc::UnboundedSender<DeliveredCode>,
    ) -> PortResult<Self> {
        let store_path = store_path.into();
        let otp_ttl = chrono::Duration::from_std(otp_ttl)
            .map_err(|e| PortError::Unexpected(format!("Invalid OTP lifetime: {}", e)))?;
        let state = load_state(&store_path).await?;

        if let Some(session) = &state.session {
            info!("Restored persisted session for subject {}", session.subject_id);
        }
        let (sessions, _) = watch::channel(state.session.clone());

        Ok(Self {
            store_path,
            otp_ttl,
            deliveries,
            state: Mutex::new(state),
            challenges: Mutex::new(HashMap::new()),
            sessions,
        })
    }

    async fn persist(&self, state: &PersistedState) -> PortResult<()> {
        let json = serde_json::to_vec_pretty(state)
            .map_err(|e| PortError::Unexpected(format!("Could not encode session state: {}", e)))?;
        if let Some(parent) = self.store_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let tmp = self.store_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_error)?;
        tokio::fs::rename(&tmp, &self.store_path).await.map_err(io_error)?;
        Ok(())
    }
}

async fn load_state(path: &Path) -> PortResult<PersistedState> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!("Ignoring unreadable session store {}: {}", path.display(), e);
                Ok(PersistedState::default())
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PersistedState::default()),
        Err(e) => Err(io_error(e)),
    }
}

fn io_error(e: std::io::Error) -> PortError {
    PortError::Unavailable(format!("Session storage error: {}", e))
}

fn issue_code() -> String {
    format!("{:06}", OsRng.next_u32() % 1_000_000)
}

fn hash_code(code: &str) -> PortResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(code.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash verification code: {:?}", e);
            PortError::Unexpected("Failed to issue a verification code".to_string())
        })
}

fn code_matches(code: &str, code_hash: &str) -> bool {
    PasswordHash::new(code_hash)
        .map(|parsed| Argon2::default().verify_password(code.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

//=========================================================================================
// `IdentityProvider` Trait Implementation
//=========================================================================================

#[async_trait]
impl IdentityProvider for LocalIdentityAdapter {
    async fn subscribe_session_changes(&self) -> PortResult<SessionChanges> {
        let mut rx = self.sessions.subscribe();
        let changes = async_stream::stream! {
            let current = rx.borrow_and_update().clone();
            yield current;
            while rx.changed().await.is_ok() {
                let next = rx.borrow_and_update().clone();
                yield next;
            }
        };
        Ok(Box::pin(changes))
    }

    async fn create_challenge(
        &self,
        phone: &PhoneNumber,
        verifier: &VerifierToken,
    ) -> PortResult<ChallengeId> {
        if verifier.0.trim().is_empty() {
            return Err(PortError::Unauthorized(
                "The human verification step was not completed.".to_string(),
            ));
        }

        let code = issue_code();
        let pending = PendingChallenge {
            phone: phone.clone(),
            code_hash: hash_code(&code)?,
            expires_at: Utc::now() + self.otp_ttl,
        };
        let challenge = ChallengeId(Uuid::new_v4().to_string());
        {
            let mut challenges = self.challenges.lock().await;
            let now = Utc::now();
            challenges.retain(|_, c| c.expires_at > now);
            challenges.insert(challenge.clone(), pending);
        }

        self.deliveries
            .send(DeliveredCode {
                phone: phone.clone(),
                code,
            })
            .map_err(|_| PortError::Unavailable("The code delivery channel is closed.".to_string()))?;
        info!("Issued verification challenge {} for {}", challenge, phone);
        Ok(challenge)
    }

    async fn resolve_challenge(&self, challenge: &ChallengeId, code: &str) -> PortResult<Session> {
        // The challenge stays open until the new session is safely on disk.
        let mut challenges = self.challenges.lock().await;
        let pending = challenges.get(challenge).ok_or_else(|| {
            PortError::NotFound("The verification ID is invalid. Please request a new code.".to_string())
        })?;
        if pending.expires_at <= Utc::now() {
            challenges.remove(challenge);
            return Err(PortError::Unauthorized(
                "The SMS code has expired. Please re-send the verification code to try again."
                    .to_string(),
            ));
        }
        if !code_matches(code, &pending.code_hash) {
            warn!("Wrong code entered for challenge {}", challenge);
            return Err(PortError::Unauthorized("The SMS verification code is invalid.".to_string()));
        }
        let phone = pending.phone.clone();

        let session = {
            let mut state = self.state.lock().await;
            let mut next = state.clone();
            let subject_id = *next
                .subjects
                .entry(phone.as_str().to_string())
                .or_insert_with(SubjectId::new);
            let session = Session {
                subject_id,
                phone_number: phone,
            };
            next.session = Some(session.clone());
            self.persist(&next).await?;
            *state = next;
            session
        };
        challenges.remove(challenge);
        drop(challenges);

        info!("Signed in subject {}", session.subject_id);
        self.sessions.send_replace(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> PortResult<()> {
        {
            let mut state = self.state.lock().await;
            let next = PersistedState {
                session: None,
                ..state.clone()
            };
            self.persist(&next).await?;
            *state = next;
        }
        info!("Signed out.");
        self.sessions.send_replace(None);
        Ok(())
    }

    async fn current_session(&self) -> PortResult<Option<Session>> {
        Ok(self.state.lock().await.session.clone())
    }
}
