//! Controller state machine and health monitoring behavior.

mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use support::{failing_callback, noop_callback, spawn_health_endpoint};
use warden::ServiceState;
use warden::supervisor::{HealthPoller, HealthSample, ServiceController, ServiceDescriptor, StateEvent, Supervisor};

async fn next_state(
    events: &mut broadcast::Receiver<StateEvent>,
) -> ServiceState {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for a state event")
        .expect("event channel closed")
        .state
}

#[tokio::test]
async fn start_reaches_healthy_and_emits_transitions() {
    let supervisor = Supervisor::new();
    let url = spawn_health_endpoint(|| true).await;
    let descriptor =
        ServiceDescriptor::new("tiles", &url, noop_callback(), noop_callback()).unwrap();
    let controller = supervisor.register(descriptor).unwrap();
    let mut events = supervisor.subscribe();

    assert_eq!(controller.state(), ServiceState::NotStarted);
    controller.request_start().await.unwrap();

    assert_eq!(next_state(&mut events).await, ServiceState::Starting);
    assert_eq!(next_state(&mut events).await, ServiceState::Healthy);
    assert_eq!(controller.state(), ServiceState::Healthy);
}

#[tokio::test]
async fn start_failure_lands_in_error() {
    let (events, _keepalive) = broadcast::channel(16);
    let descriptor = ServiceDescriptor::new(
        "tiles",
        "http://localhost:9000/health",
        failing_callback("spawn failed"),
        noop_callback(),
    )
    .unwrap();
    let controller = ServiceController::new(descriptor, events);

    assert!(controller.request_start().await.is_err());
    assert_eq!(controller.state(), ServiceState::Error);
}

#[tokio::test]
async fn startup_health_window_expiry_lands_in_error() {
    let (events, _keepalive) = broadcast::channel(16);
    let url = spawn_health_endpoint(|| false).await;
    let descriptor =
        ServiceDescriptor::new("tiles", &url, noop_callback(), noop_callback()).unwrap();
    let controller = ServiceController::with_startup_timing(
        descriptor,
        events,
        Duration::from_millis(300),
        Duration::from_millis(100),
    );

    assert!(controller.request_start().await.is_err());
    assert_eq!(controller.state(), ServiceState::Error);
}

#[tokio::test]
async fn poller_failures_drop_healthy_to_error_at_threshold() {
    let supervisor = Supervisor::new();
    let healthy = Arc::new(AtomicBool::new(true));
    let responder = healthy.clone();
    let url = spawn_health_endpoint(move || responder.load(Ordering::SeqCst)).await;

    let mut descriptor =
        ServiceDescriptor::new("tiles", &url, noop_callback(), noop_callback()).unwrap();
    // Short interval so three consecutive failures arrive quickly.
    descriptor.poll_interval = Duration::from_millis(50);
    let controller = supervisor.register(descriptor).unwrap();
    let mut events = supervisor.subscribe();

    controller.request_start().await.unwrap();
    assert_eq!(next_state(&mut events).await, ServiceState::Starting);
    assert_eq!(next_state(&mut events).await, ServiceState::Healthy);

    healthy.store(false, Ordering::SeqCst);
    assert_eq!(next_state(&mut events).await, ServiceState::Error);
    assert_eq!(controller.state(), ServiceState::Error);

    // Error is stable until explicitly retried.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(controller.state(), ServiceState::Error);

    // Error -> Starting -> Healthy on an explicit restart request.
    healthy.store(true, Ordering::SeqCst);
    controller.request_restart().await.unwrap();
    assert_eq!(next_state(&mut events).await, ServiceState::Starting);
    assert_eq!(next_state(&mut events).await, ServiceState::Healthy);
}

#[tokio::test]
async fn stop_during_starting_is_final() {
    let (events, _keepalive) = broadcast::channel(16);
    let url = spawn_health_endpoint(|| false).await;
    let descriptor =
        ServiceDescriptor::new("tiles", &url, noop_callback(), noop_callback()).unwrap();
    let controller = ServiceController::with_startup_timing(
        descriptor,
        events,
        Duration::from_millis(600),
        Duration::from_millis(100),
    );

    let starter = controller.clone();
    let start_task = tokio::spawn(async move { starter.request_start().await });
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(controller.state(), ServiceState::Starting);

    let outcome = controller.request_stop().await;
    assert!(outcome.is_clean());
    assert_eq!(controller.state(), ServiceState::NotStarted);

    // The abandoned startup wait expires with an error, but the stop's
    // outcome stands.
    assert!(start_task.await.unwrap().is_err());
    assert_eq!(controller.state(), ServiceState::NotStarted);
}

#[tokio::test]
async fn disposal_during_starting_is_silent() {
    let (sender, mut events) = broadcast::channel(16);
    let url = spawn_health_endpoint(|| false).await;
    let descriptor =
        ServiceDescriptor::new("tiles", &url, noop_callback(), noop_callback()).unwrap();
    let controller = ServiceController::with_startup_timing(
        descriptor,
        sender,
        Duration::from_millis(600),
        Duration::from_millis(100),
    );

    let starter = controller.clone();
    let start_task = tokio::spawn(async move { starter.request_start().await });
    assert_eq!(next_state(&mut events).await, ServiceState::Starting);

    controller.dispose();
    start_task.await.unwrap().unwrap_err();
    assert!(
        timeout(Duration::from_millis(200), events.recv())
            .await
            .is_err(),
        "a controller disposed mid-start must not emit state events"
    );
}

#[tokio::test]
async fn second_start_during_starting_coalesces() {
    let (events, _keepalive) = broadcast::channel(16);
    let starts = Arc::new(AtomicU32::new(0));
    let ready = Arc::new(AtomicBool::new(false));
    let responder = ready.clone();
    let url = spawn_health_endpoint(move || responder.load(Ordering::SeqCst)).await;

    let descriptor = ServiceDescriptor::new(
        "tiles",
        &url,
        support::counting_callback(starts.clone()),
        noop_callback(),
    )
    .unwrap();
    let controller = ServiceController::with_startup_timing(
        descriptor,
        events,
        Duration::from_secs(5),
        Duration::from_millis(50),
    );

    let starter = controller.clone();
    let start_task = tokio::spawn(async move { starter.request_start().await });
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(controller.state(), ServiceState::Starting);

    // The in-flight attempt absorbs the second request.
    controller.request_start().await.unwrap();
    assert_eq!(starts.load(Ordering::SeqCst), 1);

    ready.store(true, Ordering::SeqCst);
    start_task.await.unwrap().unwrap();
    assert_eq!(controller.state(), ServiceState::Healthy);
    assert_eq!(starts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stop_returns_to_not_started() {
    let supervisor = Supervisor::new();
    let url = spawn_health_endpoint(|| true).await;
    let descriptor =
        ServiceDescriptor::new("tiles", &url, noop_callback(), noop_callback()).unwrap();
    let controller = supervisor.register(descriptor).unwrap();

    controller.request_start().await.unwrap();
    assert_eq!(controller.state(), ServiceState::Healthy);

    let outcome = controller.request_stop().await;
    assert!(outcome.is_clean());
    assert_eq!(controller.state(), ServiceState::NotStarted);
}

#[tokio::test]
async fn second_start_request_coalesces() {
    let supervisor = Supervisor::new();
    let starts = Arc::new(AtomicU32::new(0));
    let url = spawn_health_endpoint(|| true).await;
    let descriptor = ServiceDescriptor::new(
        "tiles",
        &url,
        support::counting_callback(starts.clone()),
        noop_callback(),
    )
    .unwrap();
    let controller = supervisor.register(descriptor).unwrap();

    controller.request_start().await.unwrap();
    // Healthy already; a second start is an idempotent no-op.
    controller.request_start().await.unwrap();
    assert_eq!(starts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn disposal_silences_all_further_events() {
    let supervisor = Supervisor::new();
    let url = spawn_health_endpoint(|| true).await;
    let descriptor =
        ServiceDescriptor::new("tiles", &url, noop_callback(), noop_callback()).unwrap();
    let controller = supervisor.register(descriptor).unwrap();
    let mut events = supervisor.subscribe();

    controller.request_start().await.unwrap();
    assert_eq!(next_state(&mut events).await, ServiceState::Starting);
    assert_eq!(next_state(&mut events).await, ServiceState::Healthy);

    controller.dispose();
    controller.dispose();

    // A disposed controller ignores lifecycle requests and emits nothing.
    controller.request_stop().await;
    assert!(controller.request_start().await.is_ok());
    assert!(
        timeout(Duration::from_millis(200), events.recv())
            .await
            .is_err(),
        "disposed controller must not emit state events"
    );
}

#[tokio::test]
async fn poller_dispose_is_idempotent_and_stops_sampling() {
    let url = spawn_health_endpoint(|| true).await;
    let samples = Arc::new(AtomicU32::new(0));
    let sink_samples = samples.clone();

    let poller = HealthPoller::spawn(
        url,
        Duration::from_millis(50),
        3,
        Arc::new(move |sample: HealthSample| {
            if sample.is_healthy {
                sink_samples.fetch_add(1, Ordering::SeqCst);
            }
        }),
    );

    assert!(poller.is_running());
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(samples.load(Ordering::SeqCst) > 0);

    poller.dispose();
    poller.dispose();
    assert!(!poller.is_running());

    let after_dispose = samples.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(samples.load(Ordering::SeqCst), after_dispose);
}

#[tokio::test]
async fn poller_counts_consecutive_failures() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let poller = HealthPoller::spawn(
        format!("http://{addr}/health"),
        Duration::from_millis(50),
        3,
        Arc::new(|_| {}),
    );

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(poller.consecutive_failures() >= 3);
    poller.dispose();
}
