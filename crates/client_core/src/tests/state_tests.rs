use shared::domain::{CourseId, Role, StudentId, UserId};

use super::*;
use crate::fallback;

fn admin() -> User {
    User {
        id: UserId::new("1"),
        username: "admin".into(),
        password: String::new(),
        role: Role::Admin,
        name: "Administrator".into(),
        email: "admin@example.com".into(),
    }
}

#[test]
fn login_flow_updates_auth_slice() {
    let state = reduce_app(AppState::default(), AppAction::Login);
    assert!(state.loading);
    assert!(!state.auth.is_authenticated);

    let state = reduce_app(
        state,
        AppAction::LoginSucceeded {
            user: admin(),
            token: "token".into(),
        },
    );
    assert!(!state.loading);
    assert!(state.auth.is_authenticated);
    assert_eq!(state.auth.token.as_deref(), Some("token"));

    let state = reduce_app(state, AppAction::SetPageTitle("Students".into()));
    let state = reduce_app(state, AppAction::LogoutSucceeded);
    assert_eq!(state.auth, AuthState::signed_out());
    assert!(state.page_title.is_empty());
}

#[test]
fn login_failure_clears_credentials() {
    let state = AppState {
        auth: AuthState::signed_in(admin(), "stale".into()),
        ..AppState::default()
    };
    let state = reduce_app(reduce_app(state, AppAction::Login), AppAction::LoginFailed);
    assert_eq!(state.auth, AuthState::signed_out());
    assert!(!state.loading);
}

#[test]
fn collection_lifecycle_applies_changes_by_key() {
    let state = reduce_collection(CollectionState::<Student>::default(), CollectionAction::Load);
    assert!(state.loading);
    let state = reduce_collection(state, CollectionAction::Loaded(fallback::students()));
    assert!(!state.loading);
    assert_eq!(state.records.len(), 3);

    let state = reduce_collection(state, CollectionAction::Select(Some("87654321".to_string())));
    assert_eq!(state.selected.as_ref().map(|s| s.id.clone()), Some(StudentId::new("2")));

    let mut maria = state.records[1].clone();
    maria.average = 9.5;
    let state = reduce_collection(state, CollectionAction::Update);
    let state = reduce_collection(state, CollectionAction::Updated(maria));
    assert_eq!(state.records[1].average, 9.5);
    assert_eq!(state.selected.as_ref().map(|s| s.average), Some(9.5));

    let state = reduce_collection(state, CollectionAction::Deleted("87654321".to_string()));
    assert_eq!(state.records.len(), 2);
    assert!(state.selected.is_none());
}

#[test]
fn failure_keeps_records_and_records_error() {
    let state = reduce_collection(
        CollectionState::default(),
        CollectionAction::Loaded(fallback::courses()),
    );
    let state = reduce_collection(state, CollectionAction::Add);
    let state = reduce_collection(state, CollectionAction::Failed("Service unavailable".into()));
    assert_eq!(state.records.len(), 3);
    assert_eq!(state.error.as_deref(), Some("Service unavailable"));
    assert!(!state.loading);

    let state = reduce_collection(state, CollectionAction::Deleted(CourseId::new("9")));
    assert_eq!(state.records.len(), 3);
    assert!(state.error.is_none());
}

#[test]
fn root_reducer_routes_to_one_slice() {
    let before = RootState::default();
    let after = reduce(
        before.clone(),
        RootAction::Enrollments(CollectionAction::Loaded(fallback::enrollments())),
    );
    assert_eq!(after.enrollments.records.len(), 3);
    assert_eq!(after.students, before.students);
    assert_eq!(after.app, before.app);

    let after = reduce(after, RootAction::App(AppAction::Initialize));
    assert!(after.app.loading);
    let after = reduce(after, RootAction::Users(CollectionAction::Added(admin())));
    assert_eq!(after.users.records, vec![admin()]);
}
