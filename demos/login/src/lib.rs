//! A login screen backed by a statebus store.
//!
//! - `RequestLogin` goes through [`LoginMiddleware`], then [`LoginPipeline`]
//!   calls the [`UserRepository`] and yields `Success` or `Failure`
//! - `Logout` clears the session
//! - `Navigate` is handled by the router contract the view model installs

pub mod config;
pub mod contract;
pub mod repository;
pub mod view_model;

pub use config::DemoConfig;
pub use contract::{login_events, LoginAction, LoginEvent, LoginModel, LoginReducer, LoginState};
pub use repository::{LoginResponse, MockUserRepository, UserRepository};
pub use view_model::{LoginMiddleware, LoginPipeline, LoginViewModel, LogoutPipeline};
