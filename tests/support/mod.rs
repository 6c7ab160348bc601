#![allow(dead_code)]

//! Shared fixtures for integration tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use futures::FutureExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use warden::supervisor::LifecycleCallback;

/// Spawn a minimal HTTP health endpoint whose response is decided per
/// request by `respond_ok`. Returns the health-check URL.
pub async fn spawn_health_endpoint<F>(respond_ok: F) -> String
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let respond_ok = Arc::new(respond_ok);

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let respond_ok = respond_ok.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let status = if respond_ok() {
                    "200 OK"
                } else {
                    "503 Service Unavailable"
                };
                let response =
                    format!("HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    format!("http://{addr}/health")
}

/// Health endpoint that fails the first `failures` probes, then succeeds.
pub async fn health_endpoint_after_failures(failures: u32) -> String {
    let seen = AtomicU32::new(0);
    spawn_health_endpoint(move || seen.fetch_add(1, Ordering::SeqCst) >= failures).await
}

/// Lifecycle callback that always succeeds.
pub fn noop_callback() -> LifecycleCallback {
    Arc::new(|| async { Ok(()) }.boxed())
}

/// Lifecycle callback that always fails with the given message.
pub fn failing_callback(message: &'static str) -> LifecycleCallback {
    Arc::new(move || async move { Err(anyhow::anyhow!(message)) }.boxed())
}

/// Lifecycle callback that counts invocations.
pub fn counting_callback(counter: Arc<AtomicU32>) -> LifecycleCallback {
    Arc::new(move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        .boxed()
    })
}
