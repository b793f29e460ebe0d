use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use login_demo::{
    login_events, LoginAction, LoginEvent, LoginMiddleware, LoginModel, LoginPipeline, LoginReducer,
    LoginResponse, LoginState, LogoutPipeline, MockUserRepository, UserRepository,
};
use statebus::{Store, StoreBuilder};
use statebus_testing::{
    shared_latch, wait_for_state, EventCollector, RecordingMiddleware, ScriptedPipeline, StateRecorder,
};

const WAIT: Duration = Duration::from_secs(2);

fn builder(repository: Arc<dyn UserRepository>) -> StoreBuilder<LoginModel> {
    StoreBuilder::<LoginModel>::new(LoginState::default())
        .add_pipeline(LoginPipeline::new(repository.clone()))
        .add_pipeline(LogoutPipeline::new(repository))
        .add_single_event_reducer(login_events)
}

fn mock(latency_ms: u64) -> Arc<dyn UserRepository> {
    Arc::new(MockUserRepository::with_latency(Duration::from_millis(latency_ms)))
}

/// Fails the first `failures` logins with a transport error.
struct FlakyRepository {
    failures: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl UserRepository for FlakyRepository {
    async fn login(&self, name: &str, pass: &str) -> Result<LoginResponse> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            anyhow::bail!("connection reset");
        }
        MockUserRepository::with_latency(Duration::ZERO).login(name, pass).await
    }

    async fn logout(&self) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_non_overlapping_actions_fold_left_in_order() {
    let store = builder(mock(5)).build().unwrap();
    let recorder = StateRecorder::start(&store);

    let steps = [
        (LoginAction::request_login("admin", "admin"), true),
        (LoginAction::Logout, false),
        (LoginAction::request_login("admin", "admin"), true),
        (LoginAction::request_login("x", "y"), false),
    ];
    for (action, logged_in) in steps {
        store.dispatch(action);
        wait_for_state(&store, |s| s.is_logged_in() == logged_in, WAIT).await.unwrap();
    }
    // let the recorder drain the last transition
    tokio::time::sleep(Duration::from_millis(20)).await;

    let observed: Vec<bool> = recorder.states().iter().map(LoginState::is_logged_in).collect();
    assert_eq!(observed, vec![false, true, false, true, false]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_randomized_latencies_fold_every_reducer_once() {
    // Each pipeline invocation takes a random time; completion order decides the fold.
    let counter = Arc::new(AtomicUsize::new(0));
    let store = builder(mock(0))
        .add_single_event_reducer({
            let counter = counter.clone();
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                None
            }
        })
        .build()
        .unwrap();
    let events = EventCollector::start(&store);

    for i in 0..50 {
        tokio::time::sleep(Duration::from_millis(fastrand::u64(0..3))).await;
        if i % 2 == 0 {
            store.dispatch(LoginAction::request_login("admin", "admin"));
        } else {
            store.dispatch(LoginAction::request_login("x", "y"));
        }
    }

    let delivered = events.wait_for_count(50, WAIT).await.unwrap();
    assert_eq!(delivered.len(), 50);
    assert_eq!(delivered.iter().filter(|e| **e == LoginEvent::Success).count(), 25);
    assert_eq!(counter.load(Ordering::SeqCst), 50);
}

#[tokio::test]
async fn test_burst_of_logins_reaches_a_late_reader_intact() {
    const BURST: usize = 1_500;
    let folded = shared_latch(BURST);
    let store = builder(mock(0))
        .add_single_event_reducer({
            let folded = folded.clone();
            move |_| {
                folded.dec();
                None
            }
        })
        .build()
        .unwrap();
    let mut events = store.single_event();

    for i in 0..BURST {
        if i % 2 == 0 {
            store.dispatch(LoginAction::request_login("admin", "admin"));
        } else {
            store.dispatch(LoginAction::request_login("x", "y"));
        }
    }
    // the subscriber reads nothing until every login has folded
    tokio::time::timeout(Duration::from_secs(10), folded.await_zero())
        .await
        .expect("logins were lost before the fold");

    let mut successes = 0;
    for _ in 0..BURST {
        match tokio::time::timeout(WAIT, events.recv()).await.unwrap() {
            Some(LoginEvent::Success) => successes += 1,
            Some(LoginEvent::Failure(message)) => assert_eq!(message, "login failed"),
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(successes, BURST / 2);
}

#[tokio::test]
async fn test_scripted_effects_fold_only_their_reducers() {
    let pipeline = ScriptedPipeline::<LoginModel>::new(|a| matches!(a, LoginAction::RequestLogin { .. }))
        .then_error("backend down")
        .then_reducer(LoginReducer::Success {
            name: "admin".into(),
            token: "scripted".into(),
        })
        .then_unchanged();
    let invocations = pipeline.invocations();
    let store = StoreBuilder::<LoginModel>::new(LoginState::default())
        .add_pipeline(pipeline)
        .add_single_event_reducer(login_events)
        .build()
        .unwrap();
    let events = EventCollector::start(&store);

    // one of the two errors and one succeeds, whichever starts first
    store.dispatch(LoginAction::request_login("admin", "admin"));
    store.dispatch(LoginAction::request_login("admin", "admin"));
    let state = wait_for_state(&store, LoginState::is_logged_in, WAIT).await.unwrap();
    assert_eq!(state.token.as_deref(), Some("scripted"));

    // an unchanged step and an exhausted script both leave the session alone
    store.dispatch(LoginAction::request_login("admin", "admin"));
    store.dispatch(LoginAction::request_login("admin", "admin"));
    tokio::time::timeout(WAIT, async {
        while invocations.load(Ordering::SeqCst) < 4 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(store.state(), state);
    assert_eq!(events.events(), vec![LoginEvent::Success]);
}

#[tokio::test]
async fn test_failing_effect_is_contained() {
    let repository = Arc::new(FlakyRepository {
        failures: 1,
        calls: AtomicUsize::new(0),
    });
    let store = builder(repository.clone()).build().unwrap();
    let events = EventCollector::start(&store);
    let mut states = store.state_stream();
    assert_eq!(states.next().await, Some(LoginState::default()));

    store.dispatch(LoginAction::request_login("admin", "admin"));
    let nothing = tokio::time::timeout(Duration::from_millis(100), states.next()).await;
    assert!(nothing.is_err(), "failed effect must not publish a state");
    assert!(events.events().is_empty());

    store.dispatch(LoginAction::request_login("admin", "admin"));
    let state = wait_for_state(&store, LoginState::is_logged_in, WAIT).await.unwrap();
    assert_eq!(state.token.as_deref(), Some("token"));
    assert_eq!(events.wait_for_count(1, WAIT).await.unwrap(), vec![LoginEvent::Success]);
    assert_eq!(repository.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_events_reach_only_subscribers_present_at_emission() {
    let store = builder(mock(5)).build().unwrap();
    let early = EventCollector::start(&store);

    store.dispatch(LoginAction::request_login("admin", "admin"));
    early.wait_for_count(1, WAIT).await.unwrap();

    let late = EventCollector::start(&store);
    store.dispatch(LoginAction::request_login("x", "y"));

    assert_eq!(
        early.wait_for_count(2, WAIT).await.unwrap(),
        vec![LoginEvent::Success, LoginEvent::Failure("login failed".into())]
    );
    assert_eq!(
        late.wait_for_count(1, WAIT).await.unwrap(),
        vec![LoginEvent::Failure("login failed".into())]
    );
}

#[tokio::test]
async fn test_middlewares_apply_in_registration_order() {
    let before = RecordingMiddleware::<LoginModel>::new();
    let after = RecordingMiddleware::<LoginModel>::new();
    let store = builder(mock(5))
        .add_middleware(before.clone())
        .add_middleware(LoginMiddleware)
        .add_middleware(after.clone())
        .build()
        .unwrap();

    store.dispatch(LoginAction::request_login(" admin ", "admin"));
    let state = wait_for_state(&store, LoginState::is_logged_in, WAIT).await.unwrap();

    let name_of = |actions: Vec<LoginAction>| match actions.first() {
        Some(LoginAction::RequestLogin { name, .. }) => name.clone(),
        other => panic!("unexpected actions {other:?}"),
    };
    assert_eq!(name_of(before.actions()), " admin ");
    assert_eq!(name_of(after.actions()), "admin");
    assert_eq!(state.name.as_deref(), Some("admin"));
}

#[tokio::test]
async fn test_destroy_stops_everything() {
    let store: Store<LoginModel> = builder(mock(200)).build().unwrap();
    let events = EventCollector::start(&store);

    store.dispatch(LoginAction::request_login("admin", "admin"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(store.scope().active_tasks() > 0);

    store.destroy();
    store.destroy();
    store.dispatch(LoginAction::request_login("admin", "admin"));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(events.is_finished());
    assert!(events.events().is_empty());
    assert_eq!(store.state(), LoginState::default());
    assert_eq!(store.scope().active_tasks(), 0);
}
