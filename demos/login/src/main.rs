use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use login_demo::{DemoConfig, LoginAction, LoginEvent, LoginViewModel, MockUserRepository};
use statebus::mvi::ViewModelHost;
use statebus::router::{Destination, Navigate, Navigator};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Prints navigations instead of switching screens.
struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn navigate(&self, destination: &Destination) -> Result<()> {
        println!("-> navigate to {} {:?}", destination.route, destination.params);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = DemoConfig::from_env()?;
    info!(?config, "starting login demo");

    let repository = Arc::new(MockUserRepository::with_latency(config.latency()));
    let host = ViewModelHost::new(LoginViewModel::new(repository).with_config(config.store.clone()))?;
    let store = host.store();

    let mut events = store.single_event();
    let mut session = store.select(|s| s.name.clone());
    tokio::spawn(async move {
        while let Some(name) = session.next().await {
            println!("session: {}", name.as_deref().unwrap_or("<none>"));
        }
    });

    let timeout = config.latency() + Duration::from_secs(2);

    store.dispatch(LoginAction::request_login("guest", "guest"));
    match tokio::time::timeout(timeout, events.recv()).await.context("waiting for login")? {
        Some(LoginEvent::Failure(message)) => println!("login rejected: {message}"),
        other => println!("unexpected event: {other:?}"),
    }

    store.dispatch(LoginAction::request_login(" admin ", "admin"));
    if let Some(LoginEvent::Success) = tokio::time::timeout(timeout, events.recv()).await.context("waiting for login")? {
        println!("login success, token = {:?}", store.state().token);
    }

    let navigator = Arc::new(ConsoleNavigator);
    store.dispatch(LoginAction::Navigate(Navigate::new(
        &navigator,
        Destination::new("home").with_param("user", "admin"),
    )));
    if let Some(LoginEvent::Navigated(event)) = tokio::time::timeout(timeout, events.recv()).await.context("waiting for navigation")? {
        println!("navigation: {:?}", event.outcome);
    }

    store.dispatch(LoginAction::Logout);
    let mut state = store.watch_state();
    tokio::time::timeout(timeout, state.wait_for(|s| !s.is_logged_in()))
        .await
        .context("waiting for logout")??;
    println!("logged out: {:?}", store.state());

    host.clear();
    Ok(())
}
