//! Lifecycle manager behavior: failure classification, restart ordering,
//! stop semantics, and the startup health window.

mod support;

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tokio::net::TcpListener;

use support::{counting_callback, failing_callback, noop_callback};
use warden::error::SupervisorError;
use warden::supervisor::{LifecycleCallback, LifecycleManager, ServiceDescriptor};

fn manager(descriptor: ServiceDescriptor) -> LifecycleManager {
    LifecycleManager::new(Arc::new(descriptor))
}

fn addr_in_use_callback() -> LifecycleCallback {
    Arc::new(|| {
        async {
            Err(anyhow::Error::from(io::Error::new(
                io::ErrorKind::AddrInUse,
                "bind failed",
            )))
        }
        .boxed()
    })
}

#[tokio::test]
async fn addr_in_use_becomes_port_conflict_with_parsed_port() {
    let descriptor = ServiceDescriptor::new(
        "tiles",
        "http://localhost:60123/health",
        addr_in_use_callback(),
        noop_callback(),
    )
    .unwrap();

    match manager(descriptor).start().await {
        Err(SupervisorError::PortConflict { server_name, port }) => {
            assert_eq!(server_name, "tiles");
            assert_eq!(port, 60123);
        }
        other => panic!("expected PortConflict, got {other:?}"),
    }
}

#[tokio::test]
async fn port_falls_back_to_the_scheme_default() {
    let descriptor = ServiceDescriptor::new(
        "tiles",
        "http://localhost/health",
        addr_in_use_callback(),
        noop_callback(),
    )
    .unwrap();

    match manager(descriptor).start().await {
        Err(SupervisorError::PortConflict { port, .. }) => assert_eq!(port, 80),
        other => panic!("expected PortConflict, got {other:?}"),
    }
}

#[tokio::test]
async fn other_start_failures_become_startup_errors() {
    let descriptor = ServiceDescriptor::new(
        "tiles",
        "http://localhost:9000/health",
        failing_callback("missing binary"),
        noop_callback(),
    )
    .unwrap();

    match manager(descriptor).start().await {
        Err(SupervisorError::Startup { detail, .. }) => {
            assert!(detail.contains("missing binary"));
        }
        other => panic!("expected Startup, got {other:?}"),
    }
}

#[tokio::test]
async fn stop_failures_are_logged_never_raised() {
    let descriptor = ServiceDescriptor::new(
        "tiles",
        "http://localhost:9000/health",
        noop_callback(),
        failing_callback("refused to die"),
    )
    .unwrap();

    let outcome = manager(descriptor).stop().await;
    assert!(!outcome.is_clean());
    assert!(outcome.logged_error().unwrap().contains("refused to die"));
}

#[tokio::test(start_paused = true)]
async fn default_restart_is_stop_then_settle_then_start() {
    let log: Arc<Mutex<Vec<(&'static str, tokio::time::Instant)>>> =
        Arc::new(Mutex::new(Vec::new()));

    let recording = |verb: &'static str, log: &Arc<Mutex<Vec<(&'static str, tokio::time::Instant)>>>| -> LifecycleCallback {
        let log = log.clone();
        Arc::new(move || {
            let log = log.clone();
            async move {
                log.lock().unwrap().push((verb, tokio::time::Instant::now()));
                Ok(())
            }
            .boxed()
        })
    };

    let descriptor = ServiceDescriptor::new(
        "tiles",
        "http://localhost:9000/health",
        recording("start", &log),
        recording("stop", &log),
    )
    .unwrap();

    manager(descriptor).restart().await.unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].0, "stop");
    assert_eq!(log[1].0, "start");
    assert!(log[1].1 - log[0].1 >= Duration::from_millis(1_000));
}

#[tokio::test]
async fn custom_restart_bypasses_stop_and_start() {
    let starts = Arc::new(AtomicU32::new(0));
    let stops = Arc::new(AtomicU32::new(0));
    let restarts = Arc::new(AtomicU32::new(0));

    let descriptor = ServiceDescriptor::new(
        "tiles",
        "http://localhost:9000/health",
        counting_callback(starts.clone()),
        counting_callback(stops.clone()),
    )
    .unwrap()
    .with_restart(counting_callback(restarts.clone()));

    manager(descriptor).restart().await.unwrap();

    assert_eq!(restarts.load(Ordering::SeqCst), 1);
    assert_eq!(starts.load(Ordering::SeqCst), 0);
    assert_eq!(stops.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn custom_restart_failure_is_wrapped_as_callback_error() {
    let descriptor = ServiceDescriptor::new(
        "tiles",
        "http://localhost:9000/health",
        noop_callback(),
        noop_callback(),
    )
    .unwrap()
    .with_restart(failing_callback("restart hook exploded"));

    match manager(descriptor).restart().await {
        Err(SupervisorError::Callback {
            callback, detail, ..
        }) => {
            assert_eq!(callback, "on_restart");
            assert!(detail.contains("restart hook exploded"));
        }
        other => panic!("expected Callback, got {other:?}"),
    }
}

#[tokio::test]
async fn wait_for_healthy_times_out_with_the_window_in_the_message() {
    // Bind then drop to get a local port with no listener.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let descriptor = ServiceDescriptor::new(
        "tiles",
        &format!("http://{addr}/health"),
        noop_callback(),
        noop_callback(),
    )
    .unwrap();

    let err = manager(descriptor)
        .wait_for_healthy(Duration::from_millis(500), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, SupervisorError::HealthCheckTimeout { .. }));
    assert!(err.to_string().contains("500ms"));
}

#[tokio::test]
async fn wait_for_healthy_resolves_once_the_endpoint_comes_up() {
    let url = support::health_endpoint_after_failures(2).await;
    let descriptor =
        ServiceDescriptor::new("tiles", &url, noop_callback(), noop_callback()).unwrap();

    manager(descriptor)
        .wait_for_healthy(Duration::from_secs(5), Duration::from_millis(50))
        .await
        .unwrap();
}

#[tokio::test]
async fn non_success_status_during_startup_polling_is_not_fatal() {
    // Endpoint returns 503 forever; polling keeps going until the window
    // elapses rather than failing on the first bad status.
    let url = support::spawn_health_endpoint(|| false).await;
    let descriptor =
        ServiceDescriptor::new("tiles", &url, noop_callback(), noop_callback()).unwrap();

    let err = manager(descriptor)
        .wait_for_healthy(Duration::from_millis(400), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, SupervisorError::HealthCheckTimeout { .. }));
}
