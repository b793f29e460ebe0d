//! Structured error types for statebus.
//!
//! Two families, with different propagation rules:
//!
//! - [`StoreError`] is construction-time misuse. It is returned from
//!   [`StoreBuilder::build`](crate::StoreBuilder::build) and is the only
//!   error a caller ever sees.
//! - [`PipelineError`] is a runtime failure while producing a reducer. It
//!   never leaves the store: the error guard logs it and folds the empty
//!   reducer instead.
//!
//! # Error Example
//!
//! ```ignore
//! match StoreBuilder::<LoginModel>::new(LoginState::default()).build() {
//!     Ok(store) => run(store),
//!     Err(StoreError::NoRuntime) => eprintln!("build the store inside a tokio runtime"),
//!     Err(e) => eprintln!("store misconfigured: {e}"),
//! }
//! ```

use thiserror::Error;

/// Errors raised while constructing a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No scope was supplied and no tokio runtime is running on this thread.
    #[error("no tokio runtime available; build the store inside a runtime or supply a StoreScope")]
    NoRuntime,

    /// The supplied scope was already cancelled, so the store could not start.
    #[error("store scope is cancelled")]
    ScopeCancelled,

    /// The store configuration was rejected.
    #[error("invalid store configuration: {message}")]
    InvalidConfig {
        /// What was wrong with the configuration.
        message: String,
    },
}

/// A failure while a pipeline was producing a reducer.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The pipeline's effect returned an error.
    #[error("pipeline {pipeline} failed: {message}")]
    Failed {
        /// Type name of the pipeline.
        pipeline: &'static str,
        /// The underlying error, with its context chain.
        message: String,
    },

    /// The pipeline's effect panicked.
    #[error("pipeline {pipeline} panicked: {message}")]
    Panicked {
        /// Type name of the pipeline.
        pipeline: &'static str,
        /// The panic payload, if it was a string.
        message: String,
    },
}

impl PipelineError {
    /// Wrap an effect error, keeping its context chain in the message.
    pub fn failed(pipeline: &'static str, err: &anyhow::Error) -> Self {
        Self::Failed {
            pipeline,
            message: format!("{err:#}"),
        }
    }

    /// Name of the pipeline that failed.
    pub fn pipeline(&self) -> &'static str {
        match self {
            Self::Failed { pipeline, .. } | Self::Panicked { pipeline, .. } => pipeline,
        }
    }
}

/// Extract a readable message from a caught panic payload.
pub(crate) fn panic_message(panic_info: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_keeps_context_chain() {
        let err = anyhow::anyhow!("connection reset").context("login request");
        let failure = PipelineError::failed("LoginPipeline", &err);

        let rendered = failure.to_string();
        assert!(rendered.contains("LoginPipeline"));
        assert!(rendered.contains("login request"));
        assert!(rendered.contains("connection reset"));
        assert_eq!(failure.pipeline(), "LoginPipeline");
    }

    #[test]
    fn test_panic_message_from_str_and_string() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&payload), "boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(panic_message(&payload), "kaboom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(&payload), "unknown panic");
    }

    #[test]
    fn test_store_error_messages() {
        let err = StoreError::InvalidConfig {
            message: "reducer_capacity must be greater than zero".into(),
        };
        assert!(err.to_string().contains("reducer_capacity"));
        assert!(StoreError::NoRuntime.to_string().contains("tokio runtime"));
    }
}
