use base64::Engine as _;
use chrono::TimeZone;
use shared::domain::UserId;
use storage::{FileKeyValueStore, MemoryKeyValueStore, Storage};

use super::*;
use crate::{
    data_source::{OfflineApi, SimulatedApi},
    network::NetworkSimulationConfig,
};

fn issued_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).single().expect("valid date")
}

fn credentials(username: &str, password: &str) -> LoginRequest {
    LoginRequest {
        username: username.to_string(),
        password: password.to_string(),
    }
}

fn offline_service(kv: Arc<dyn KeyValueStore>) -> AuthService {
    AuthService::new(Arc::new(OfflineApi), SessionStore::new(kv))
}

#[test]
fn token_round_trips_with_a_day_of_validity() {
    let user = fallback::users()[0].clone();
    let token = issue_token(&user, issued_at()).expect("token");
    let claims = decode_token(&token).expect("claims");

    assert_eq!(claims.sub, "1");
    assert_eq!(claims.username, "admin");
    assert_eq!(claims.role, Role::Admin);
    assert_eq!(claims.exp - claims.iat, 24 * 60 * 60 * 1000);
    assert_eq!(claims.iat, issued_at().timestamp_millis());
}

#[test]
fn token_validity_follows_expiry() {
    let user = fallback::users()[1].clone();
    let token = issue_token(&user, issued_at()).expect("token");

    assert!(is_token_valid_at(&token, issued_at() + Duration::hours(23)));
    assert!(!is_token_valid_at(&token, issued_at() + Duration::hours(24)));
    assert!(!is_token_valid_at(&token, issued_at() + Duration::days(3)));
    assert!(!is_token_valid_at("not base64!", issued_at()));
    assert!(!is_token_valid_at(&STANDARD.encode("{}"), issued_at()));
}

#[test]
fn persisted_auth_state_round_trips() {
    let state = AuthState::signed_in(
        fallback::users()[0].without_password(),
        issue_token(&fallback::users()[0], issued_at()).expect("token"),
    );
    let raw = serde_json::to_string(&state).expect("serialize");
    assert!(raw.contains("\"isAuthenticated\":true"));
    let back: AuthState = serde_json::from_str(&raw).expect("deserialize");
    assert_eq!(back, state);
}

#[tokio::test]
async fn login_falls_back_to_builtin_users_and_persists_session() {
    let kv = Arc::new(MemoryKeyValueStore::new());
    let auth = offline_service(kv.clone());
    let mut events = auth.subscribe();

    let response = auth
        .login_at(credentials("admin", "admin123"), issued_at())
        .await
        .expect("login");
    assert!(response.user.password.is_empty());
    assert!(auth.is_authenticated().await);
    assert!(auth.is_admin().await);
    assert!(auth.has_role(Role::Admin).await);
    assert_eq!(auth.require_admin().await.expect("admin").id, UserId::new("1"));
    assert!(events.recv().await.expect("event").is_authenticated);

    let raw = kv.get(AUTH_STORAGE_KEY).await.expect("get").expect("stored");
    let stored: AuthState = serde_json::from_str(&raw).expect("parse");
    assert_eq!(stored, auth.state().await);
}

#[tokio::test]
async fn wrong_password_is_rejected_and_nothing_is_stored() {
    let kv = Arc::new(MemoryKeyValueStore::new());
    let auth = offline_service(kv.clone());
    let err = auth
        .login(credentials("admin", "nope"))
        .await
        .expect_err("invalid");
    assert!(matches!(err, AuthError::InvalidCredentials));
    assert!(!auth.is_authenticated().await);
    assert_eq!(kv.get(AUTH_STORAGE_KEY).await.expect("get"), None);
}

#[tokio::test]
async fn login_authenticates_against_the_remote_endpoint() {
    let remote = Storage::new();
    let mut tutor = fallback::users()[1].clone();
    tutor.id = UserId::new("7");
    tutor.username = "tutor".into();
    tutor.password = "chalk".into();
    remote.users.upsert(tutor).await;
    let api = Arc::new(SimulatedApi::with_config(
        NetworkSimulationConfig::instant(),
        remote,
    ));
    let auth = AuthService::new(
        api.clone(),
        SessionStore::new(Arc::new(MemoryKeyValueStore::new())),
    );

    let response = auth.login(credentials("tutor", "chalk")).await.expect("login");
    assert_eq!(response.user.id, UserId::new("7"));
    assert!(response.user.password.is_empty());
    assert_eq!(decode_token(&response.token).expect("claims").sub, "7");
    assert_eq!(api.network().stats().calls, 1);
    assert!(!auth.is_admin().await);
    assert!(matches!(
        auth.require_admin().await,
        Err(AuthError::AdminRequired)
    ));

    // A 401 from the remote side is final; built-in users are not consulted.
    let err = auth
        .login(credentials("admin", "admin123"))
        .await
        .expect_err("unknown remotely");
    assert!(matches!(err, AuthError::InvalidCredentials));
    assert_eq!(auth.current_user().await.map(|u| u.username), Some("tutor".to_string()));
}

#[tokio::test]
async fn restore_keeps_fresh_sessions_and_drops_expired_ones() {
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
    let first = offline_service(kv.clone());
    first
        .login_at(credentials("user", "user123"), issued_at())
        .await
        .expect("login");

    let second = offline_service(kv.clone());
    let restored = second.restore_at(issued_at() + Duration::hours(1)).await;
    assert!(restored.is_authenticated);
    assert_eq!(second.current_user().await.map(|u| u.username), Some("user".to_string()));

    let third = offline_service(kv.clone());
    let expired = third.restore_at(issued_at() + Duration::hours(25)).await;
    assert_eq!(expired, AuthState::signed_out());
    assert_eq!(kv.get(AUTH_STORAGE_KEY).await.expect("get"), None);
}

#[tokio::test]
async fn corrupted_slot_is_treated_as_signed_out() {
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
    kv.set(AUTH_STORAGE_KEY, "{not json").await.expect("set");
    let auth = offline_service(kv.clone());
    assert_eq!(auth.restore().await, AuthState::signed_out());
    assert_eq!(kv.get(AUTH_STORAGE_KEY).await.expect("get"), None);
}

#[tokio::test]
async fn logout_clears_the_slot_even_when_remote_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let kv: Arc<dyn KeyValueStore> = Arc::new(FileKeyValueStore::new(dir.path()));
    let auth = offline_service(kv.clone());
    auth.login(credentials("admin", "admin123")).await.expect("login");
    assert!(dir.path().join("auth_data.json").exists());

    auth.logout().await;
    assert!(!auth.is_authenticated().await);
    assert!(!dir.path().join("auth_data.json").exists());
}
