//! Client-side view state as plain values and pure reducers.
//!
//! Every reducer takes the previous state by value and returns the next one.
//! Nothing here touches the stores or the network.

use shared::{
    domain::{Course, Enrollment, Student, User},
    protocol::AuthState,
};
use storage::Keyed;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub auth: AuthState,
    pub page_title: String,
    pub loading: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppAction {
    Login,
    LoginSucceeded { user: User, token: String },
    LoginFailed,
    Logout,
    LogoutSucceeded,
    SetPageTitle(String),
    ClearPageTitle,
    Initialize,
    Initialized,
}

pub fn reduce_app(state: AppState, action: AppAction) -> AppState {
    match action {
        AppAction::Login => AppState {
            loading: true,
            auth: AuthState {
                is_authenticated: false,
                ..state.auth
            },
            ..state
        },
        AppAction::LoginSucceeded { user, token } => AppState {
            auth: AuthState::signed_in(user, token),
            loading: false,
            ..state
        },
        AppAction::LoginFailed => AppState {
            auth: AuthState::signed_out(),
            loading: false,
            ..state
        },
        AppAction::Logout => AppState {
            auth: AuthState {
                is_authenticated: false,
                ..state.auth
            },
            ..state
        },
        AppAction::LogoutSucceeded => AppState {
            auth: AuthState::signed_out(),
            page_title: String::new(),
            ..state
        },
        AppAction::SetPageTitle(page_title) => AppState { page_title, ..state },
        AppAction::ClearPageTitle => AppState {
            page_title: String::new(),
            ..state
        },
        AppAction::Initialize => AppState {
            loading: true,
            ..state
        },
        AppAction::Initialized => AppState {
            loading: false,
            ..state
        },
    }
}

/// One entity collection as the UI sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionState<T> {
    pub records: Vec<T>,
    pub selected: Option<T>,
    pub loading: bool,
    pub error: Option<String>,
}

impl<T> Default for CollectionState<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            selected: None,
            loading: false,
            error: None,
        }
    }
}

/// Request actions (`Load`, `Add`, ...) mark the collection busy; the matching
/// outcome actions apply the change and clear it.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionAction<T: Keyed> {
    Load,
    Loaded(Vec<T>),
    Add,
    Added(T),
    Update,
    Updated(T),
    Delete,
    Deleted(T::Key),
    Select(Option<T::Key>),
    Failed(String),
}

pub fn reduce_collection<T: Keyed>(
    state: CollectionState<T>,
    action: CollectionAction<T>,
) -> CollectionState<T> {
    match action {
        CollectionAction::Load
        | CollectionAction::Add
        | CollectionAction::Update
        | CollectionAction::Delete => CollectionState {
            loading: true,
            error: None,
            ..state
        },
        CollectionAction::Loaded(records) => CollectionState {
            records,
            loading: false,
            error: None,
            ..state
        },
        CollectionAction::Added(record) => {
            let mut records = state.records;
            records.push(record);
            CollectionState {
                records,
                loading: false,
                error: None,
                ..state
            }
        }
        CollectionAction::Updated(record) => {
            let selected = match state.selected {
                Some(current) if current.key() == record.key() => Some(record.clone()),
                other => other,
            };
            let records = state
                .records
                .into_iter()
                .map(|existing| {
                    if existing.key() == record.key() {
                        record.clone()
                    } else {
                        existing
                    }
                })
                .collect();
            CollectionState {
                records,
                selected,
                loading: false,
                error: None,
            }
        }
        CollectionAction::Deleted(key) => CollectionState {
            records: state
                .records
                .into_iter()
                .filter(|existing| existing.key() != &key)
                .collect(),
            selected: state.selected.filter(|s| s.key() != &key),
            loading: false,
            error: None,
        },
        CollectionAction::Select(key) => {
            let selected = key.and_then(|key| {
                state
                    .records
                    .iter()
                    .find(|record| record.key() == &key)
                    .cloned()
            });
            CollectionState { selected, ..state }
        }
        CollectionAction::Failed(error) => CollectionState {
            loading: false,
            error: Some(error),
            ..state
        },
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RootState {
    pub app: AppState,
    pub students: CollectionState<Student>,
    pub courses: CollectionState<Course>,
    pub enrollments: CollectionState<Enrollment>,
    pub users: CollectionState<User>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RootAction {
    App(AppAction),
    Students(CollectionAction<Student>),
    Courses(CollectionAction<Course>),
    Enrollments(CollectionAction<Enrollment>),
    Users(CollectionAction<User>),
}

pub fn reduce(state: RootState, action: RootAction) -> RootState {
    match action {
        RootAction::App(action) => RootState {
            app: reduce_app(state.app, action),
            ..state
        },
        RootAction::Students(action) => RootState {
            students: reduce_collection(state.students, action),
            ..state
        },
        RootAction::Courses(action) => RootState {
            courses: reduce_collection(state.courses, action),
            ..state
        },
        RootAction::Enrollments(action) => RootState {
            enrollments: reduce_collection(state.enrollments, action),
            ..state
        },
        RootAction::Users(action) => RootState {
            users: reduce_collection(state.users, action),
            ..state
        },
    }
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
