//! Signed-in state: the opaque token, its persisted slot, and the login flow.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{Role, User},
    error::{ApiError, ErrorCode, PersistenceError},
    protocol::{ApiRequest, ApiResponse, AuthResponse, AuthState, LoginRequest},
};
use storage::KeyValueStore;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

use crate::{data_source::DataSource, fallback, network::NetworkError};

pub const AUTH_STORAGE_KEY: &str = "auth_data";
pub const TOKEN_LIFETIME_HOURS: i64 = 24;

/// Decoded token payload. Times are milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub username: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

impl TokenClaims {
    pub fn for_user(user: &User, issued_at: DateTime<Utc>) -> Self {
        let iat = issued_at.timestamp_millis();
        Self {
            sub: user.id.to_string(),
            username: user.username.clone(),
            role: user.role,
            iat,
            exp: iat + Duration::hours(TOKEN_LIFETIME_HOURS).num_milliseconds(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp_millis()
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("token payload is malformed: {0}")]
    Payload(#[from] serde_json::Error),
}

pub fn encode_token(claims: &TokenClaims) -> Result<String, TokenError> {
    Ok(STANDARD.encode(serde_json::to_vec(claims)?))
}

pub fn decode_token(token: &str) -> Result<TokenClaims, TokenError> {
    let bytes = STANDARD.decode(token)?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn issue_token(user: &User, issued_at: DateTime<Utc>) -> Result<String, TokenError> {
    encode_token(&TokenClaims::for_user(user, issued_at))
}

/// Unreadable tokens are treated as expired.
pub fn is_token_valid_at(token: &str, now: DateTime<Utc>) -> bool {
    match decode_token(token) {
        Ok(claims) => !claims.is_expired_at(now),
        Err(err) => {
            warn!(error = %err, "discarding unreadable token");
            false
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("administrator role required")]
    AdminRequired,
    #[error("token could not be issued: {0}")]
    Token(#[from] TokenError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl From<AuthError> for ApiError {
    fn from(value: AuthError) -> Self {
        let code = match &value {
            AuthError::InvalidCredentials => ErrorCode::Unauthorized,
            AuthError::AdminRequired => ErrorCode::Forbidden,
            AuthError::Network(err) => return err.clone().into(),
            AuthError::Token(_) | AuthError::Persistence(_) => ErrorCode::Internal,
        };
        ApiError::new(code, value.to_string())
    }
}

/// The persisted authentication slot.
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub async fn save(&self, state: &AuthState) -> Result<(), PersistenceError> {
        let raw = serde_json::to_string(state)?;
        self.kv.set(AUTH_STORAGE_KEY, &raw).await
    }

    pub async fn load(&self) -> Result<Option<AuthState>, PersistenceError> {
        match self.kv.get(AUTH_STORAGE_KEY).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn clear(&self) -> Result<(), PersistenceError> {
        self.kv.remove(AUTH_STORAGE_KEY).await
    }
}

pub struct AuthService {
    source: Arc<dyn DataSource>,
    sessions: SessionStore,
    state: RwLock<AuthState>,
    events: broadcast::Sender<AuthState>,
}

impl AuthService {
    pub fn new(source: Arc<dyn DataSource>, sessions: SessionStore) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            source,
            sessions,
            state: RwLock::new(AuthState::signed_out()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthState> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> AuthState {
        self.state.read().await.clone()
    }

    pub async fn current_user(&self) -> Option<User> {
        self.state.read().await.user.clone()
    }

    pub async fn token(&self) -> Option<String> {
        self.state.read().await.token.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.is_authenticated
    }

    pub async fn has_role(&self, role: Role) -> bool {
        self.state
            .read()
            .await
            .user
            .as_ref()
            .is_some_and(|user| user.role == role)
    }

    pub async fn is_admin(&self) -> bool {
        self.has_role(Role::Admin).await
    }

    pub async fn require_admin(&self) -> Result<User, AuthError> {
        match self.current_user().await {
            Some(user) if user.is_admin() => Ok(user),
            _ => Err(AuthError::AdminRequired),
        }
    }

    /// Authenticates against the remote `Login` endpoint. A 401 from the
    /// remote side rejects the credentials; any other failure falls back to
    /// the built-in users, with a token issued locally at `now`.
    pub async fn login(&self, credentials: LoginRequest) -> Result<AuthResponse, AuthError> {
        self.login_at(credentials, Utc::now()).await
    }

    pub async fn login_at(
        &self,
        credentials: LoginRequest,
        now: DateTime<Utc>,
    ) -> Result<AuthResponse, AuthError> {
        let response = match self.source.call(ApiRequest::Login(credentials.clone())).await {
            Ok(ApiResponse::Authenticated(remote)) => AuthResponse {
                user: remote.user.without_password(),
                token: remote.token,
            },
            Err(err) if err.status() == Some(401) => {
                info!(username = %credentials.username, "remote login rejected");
                return Err(AuthError::InvalidCredentials);
            }
            Ok(other) => {
                warn!(response = ?other, "unexpected login response; using built-in users");
                builtin_login(&credentials, now)?
            }
            Err(err) => {
                warn!(error = %err, "login endpoint unavailable; using built-in users");
                builtin_login(&credentials, now)?
            }
        };

        self.set_state(AuthState::signed_in(
            response.user.clone(),
            response.token.clone(),
        ))
        .await;
        info!(username = %response.user.username, "signed in");
        Ok(response)
    }

    /// Signs out locally. The remote call is best-effort.
    pub async fn logout(&self) {
        if let Err(err) = self.source.call(ApiRequest::Logout).await {
            warn!(error = %err, "remote logout failed; clearing local session anyway");
        }
        self.set_state(AuthState::signed_out()).await;
        info!("signed out");
    }

    /// Loads the persisted session. Missing, unreadable or expired sessions
    /// leave the service signed out and clear the slot.
    pub async fn restore(&self) -> AuthState {
        self.restore_at(Utc::now()).await
    }

    pub async fn restore_at(&self, now: DateTime<Utc>) -> AuthState {
        let stored = match self.sessions.load().await {
            Ok(stored) => stored,
            Err(err) => {
                warn!(error = %err, "stored session unreadable; treating as signed out");
                None
            }
        };

        let restored = stored.filter(|state| {
            state.is_authenticated
                && state.user.is_some()
                && state
                    .token
                    .as_deref()
                    .is_some_and(|token| is_token_valid_at(token, now))
        });

        match restored {
            Some(state) => {
                *self.state.write().await = state.clone();
                let _ = self.events.send(state.clone());
                state
            }
            None => {
                self.set_state(AuthState::signed_out()).await;
                AuthState::signed_out()
            }
        }
    }

    async fn set_state(&self, next: AuthState) {
        let persisted = if next.is_authenticated {
            self.sessions.save(&next).await
        } else {
            self.sessions.clear().await
        };
        if let Err(err) = persisted {
            warn!(error = %err, "failed to persist session state");
        }
        *self.state.write().await = next.clone();
        let _ = self.events.send(next);
    }
}

fn builtin_login(credentials: &LoginRequest, now: DateTime<Utc>) -> Result<AuthResponse, AuthError> {
    let user = fallback::users()
        .into_iter()
        .find(|u| u.username == credentials.username && u.password == credentials.password)
        .ok_or(AuthError::InvalidCredentials)?
        .without_password();
    let token = issue_token(&user, now)?;
    Ok(AuthResponse { user, token })
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
