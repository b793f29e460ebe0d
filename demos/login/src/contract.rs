//! Login feature types.

use statebus::router::{Navigate, RouteAction, RouteReducer, RouterEvent, RouterReducer};
use statebus::{Model, Reducer};

/// Type bundle for the login store.
pub struct LoginModel;

impl Model for LoginModel {
    type State = LoginState;
    type Action = LoginAction;
    type Reducer = LoginReducer;
    type Event = LoginEvent;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginState {
    pub name: Option<String>,
    pub token: Option<String>,
}

impl LoginState {
    pub fn is_logged_in(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone)]
pub enum LoginAction {
    RequestLogin { name: String, pass: String },
    Logout,
    Navigate(Navigate),
}

impl LoginAction {
    pub fn request_login(name: impl Into<String>, pass: impl Into<String>) -> Self {
        Self::RequestLogin {
            name: name.into(),
            pass: pass.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum LoginReducer {
    Success { name: String, token: String },
    Failure { message: String },
    Logout,
    Route(RouterReducer),
    Empty,
}

impl Reducer<LoginState> for LoginReducer {
    fn reduce(&self, state: &LoginState) -> LoginState {
        match self {
            LoginReducer::Success { name, token } => LoginState {
                name: Some(name.clone()),
                token: Some(token.clone()),
            },
            // A failed attempt also clears whoever was logged in before
            LoginReducer::Failure { .. } | LoginReducer::Logout => LoginState {
                name: None,
                token: None,
            },
            LoginReducer::Route(router) => router.reduce(state),
            LoginReducer::Empty => state.clone(),
        }
    }

    fn empty() -> Self {
        LoginReducer::Empty
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginEvent {
    Success,
    Failure(String),
    Navigated(RouterEvent),
}

impl RouteAction for LoginAction {
    fn as_navigate(&self) -> Option<&Navigate> {
        match self {
            LoginAction::Navigate(navigate) => Some(navigate),
            _ => None,
        }
    }
}

impl RouteReducer for LoginReducer {
    fn as_router(&self) -> Option<&RouterReducer> {
        match self {
            LoginReducer::Route(router) => Some(router),
            _ => None,
        }
    }
}

impl From<RouterReducer> for LoginReducer {
    fn from(router: RouterReducer) -> Self {
        LoginReducer::Route(router)
    }
}

impl From<RouterEvent> for LoginEvent {
    fn from(event: RouterEvent) -> Self {
        LoginEvent::Navigated(event)
    }
}

/// Maps folded reducers to the events the login screen shows.
pub fn login_events(reducer: &LoginReducer) -> Option<LoginEvent> {
    match reducer {
        LoginReducer::Success { .. } => Some(LoginEvent::Success),
        LoginReducer::Failure { message } => Some(LoginEvent::Failure(message.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logged_in() -> LoginState {
        LoginState {
            name: Some("admin".into()),
            token: Some("token".into()),
        }
    }

    #[test]
    fn test_success_sets_name_and_token() {
        let next = LoginReducer::Success {
            name: "admin".into(),
            token: "token".into(),
        }
        .reduce(&LoginState::default());

        assert_eq!(next, logged_in());
        assert!(next.is_logged_in());
    }

    #[test]
    fn test_failure_and_logout_clear_session() {
        let failure = LoginReducer::Failure {
            message: "login failed".into(),
        };
        assert_eq!(failure.reduce(&logged_in()), LoginState::default());
        assert_eq!(LoginReducer::Logout.reduce(&logged_in()), LoginState::default());
    }

    #[test]
    fn test_empty_is_identity() {
        assert_eq!(LoginReducer::empty().reduce(&logged_in()), logged_in());
    }

    #[test]
    fn test_login_events() {
        assert_eq!(
            login_events(&LoginReducer::Success {
                name: "admin".into(),
                token: "token".into()
            }),
            Some(LoginEvent::Success)
        );
        assert_eq!(
            login_events(&LoginReducer::Failure {
                message: "login failed".into()
            }),
            Some(LoginEvent::Failure("login failed".into()))
        );
        assert_eq!(login_events(&LoginReducer::Logout), None);
    }
}
