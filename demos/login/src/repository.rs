//! User backend.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Response of a login request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub token: Option<String>,
}

#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    async fn login(&self, name: &str, pass: &str) -> Result<LoginResponse>;

    async fn logout(&self) -> Result<()>;
}

/// Accepts `admin`/`admin` after a fixed latency.
#[derive(Debug, Clone)]
pub struct MockUserRepository {
    latency: Duration,
}

impl MockUserRepository {
    pub const DEFAULT_LATENCY: Duration = Duration::from_millis(500);

    pub fn new() -> Self {
        Self::with_latency(Self::DEFAULT_LATENCY)
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for MockUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserRepository for MockUserRepository {
    async fn login(&self, name: &str, pass: &str) -> Result<LoginResponse> {
        tokio::time::sleep(self.latency).await;
        let response = if name == "admin" && pass == "admin" {
            LoginResponse {
                success: true,
                message: "success".into(),
                token: Some("token".into()),
            }
        } else {
            LoginResponse {
                success: false,
                message: "login failed".into(),
                token: None,
            }
        };
        debug!(user = name, success = response.success, "login answered");
        Ok(response)
    }

    async fn logout(&self) -> Result<()> {
        Ok(())
    }
}
