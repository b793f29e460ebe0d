//! Login store recipe: pipelines, middleware and the view model.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use statebus::mvi::ViewModel;
use statebus::{Middleware, Pipeline, PipelineContext, StoreBuilder, StoreConfig, StoreHandle};
use tracing::{debug, info};

use crate::contract::{login_events, LoginAction, LoginModel, LoginReducer, LoginState};
use crate::repository::UserRepository;

/// `RequestLogin` → repository call → `Success` or `Failure`.
pub struct LoginPipeline {
    repository: Arc<dyn UserRepository>,
}

impl LoginPipeline {
    pub fn new(repository: Arc<dyn UserRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl Pipeline<LoginModel> for LoginPipeline {
    type Input = (String, String);

    fn select(&self, action: &LoginAction) -> Option<(String, String)> {
        match action {
            LoginAction::RequestLogin { name, pass } => Some((name.clone(), pass.clone())),
            _ => None,
        }
    }

    async fn execute(
        &self,
        (name, pass): (String, String),
        _ctx: PipelineContext<LoginModel>,
    ) -> Result<Option<LoginReducer>> {
        let response = self
            .repository
            .login(&name, &pass)
            .await
            .with_context(|| format!("login request for {name}"))?;

        let reducer = if response.success {
            info!(user = %name, "login succeeded");
            LoginReducer::Success {
                name,
                token: response.token.unwrap_or_default(),
            }
        } else {
            info!(user = %name, reason = %response.message, "login rejected");
            LoginReducer::Failure {
                message: response.message,
            }
        };
        Ok(Some(reducer))
    }
}

/// `Logout` → repository call → `Logout`.
pub struct LogoutPipeline {
    repository: Arc<dyn UserRepository>,
}

impl LogoutPipeline {
    pub fn new(repository: Arc<dyn UserRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl Pipeline<LoginModel> for LogoutPipeline {
    type Input = ();

    fn select(&self, action: &LoginAction) -> Option<()> {
        matches!(action, LoginAction::Logout).then_some(())
    }

    async fn execute(&self, _: (), ctx: PipelineContext<LoginModel>) -> Result<Option<LoginReducer>> {
        if !ctx.state().is_logged_in() {
            debug!("logout without a session");
        }
        self.repository.logout().await.context("logout request")?;
        Ok(Some(LoginReducer::Logout))
    }
}

/// Normalizes credentials before they reach the pipelines.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoginMiddleware;

#[async_trait]
impl Middleware<LoginModel> for LoginMiddleware {
    async fn handle(&self, store: &StoreHandle<LoginModel>, action: LoginAction) -> LoginAction {
        match action {
            LoginAction::RequestLogin { name, pass } => {
                let trimmed = name.trim();
                if trimmed.len() != name.len() {
                    debug!(store = %store.id(), "trimmed user name");
                }
                LoginAction::RequestLogin {
                    name: trimmed.to_string(),
                    pass,
                }
            }
            other => other,
        }
    }
}

/// The login screen's store recipe.
pub struct LoginViewModel {
    repository: Arc<dyn UserRepository>,
    config: StoreConfig,
}

impl LoginViewModel {
    pub fn new(repository: Arc<dyn UserRepository>) -> Self {
        Self {
            repository,
            config: StoreConfig::default(),
        }
    }

    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }
}

impl ViewModel for LoginViewModel {
    type Model = LoginModel;

    fn initial_state(&self) -> LoginState {
        LoginState::default()
    }

    fn build_store(&self, builder: StoreBuilder<LoginModel>) -> StoreBuilder<LoginModel> {
        builder
            .add_pipeline(LoginPipeline::new(self.repository.clone()))
            .add_pipeline(LogoutPipeline::new(self.repository.clone()))
            .add_single_event_reducer(login_events)
            .add_middleware(LoginMiddleware)
            .with_router()
    }

    fn config(&self) -> StoreConfig {
        self.config.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockUserRepository;
    use std::time::Duration;

    fn pipeline() -> LoginPipeline {
        LoginPipeline::new(Arc::new(MockUserRepository::with_latency(Duration::ZERO)))
    }

    #[test]
    fn test_login_pipeline_selects_requests_only() {
        let pipeline = pipeline();
        assert_eq!(
            pipeline.select(&LoginAction::request_login("a", "b")),
            Some(("a".to_string(), "b".to_string()))
        );
        assert_eq!(pipeline.select(&LoginAction::Logout), None);
    }

    #[tokio::test]
    async fn test_middleware_trims_name() {
        let store = StoreBuilder::<LoginModel>::new(LoginState::default())
            .build()
            .unwrap();
        let handle = store.handle();

        let action = LoginMiddleware
            .handle(&handle, LoginAction::request_login("  admin ", "admin"))
            .await;

        match action {
            LoginAction::RequestLogin { name, pass } => {
                assert_eq!(name, "admin");
                assert_eq!(pass, "admin");
            }
            other => panic!("unexpected action {other:?}"),
        }
    }
}
