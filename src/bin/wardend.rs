//! `wardend` – supervision daemon exposing the Warden command bridge.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::net::TcpListener;

use warden::bridge::listener::{serve_rpc, serve_ui};
use warden::bridge::store::MemoryDocumentStore;
use warden::config::WardenConfig;
use warden::supervisor::process::ProcessService;
use warden::{Bridge, Supervisor};

const DEFAULT_UI_LISTEN: &str = "127.0.0.1:7311";
const DEFAULT_RPC_LISTEN: &str = "127.0.0.1:7312";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let mut args = env::args().skip(1);
    let mut config_path: Option<PathBuf> = None;
    let mut ui_listen: Option<String> = None;
    let mut rpc_listen: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let Some(path) = args.next() else {
                    print_usage();
                    bail!("--config requires a path argument");
                };
                config_path = Some(PathBuf::from(path));
            }
            "--ui-listen" => {
                let Some(addr) = args.next() else {
                    print_usage();
                    bail!("--ui-listen requires an address argument");
                };
                ui_listen = Some(addr);
            }
            "--rpc-listen" => {
                let Some(addr) = args.next() else {
                    print_usage();
                    bail!("--rpc-listen requires an address argument");
                };
                rpc_listen = Some(addr);
            }
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            other => {
                print_usage();
                bail!("unknown argument: {other}");
            }
        }
    }

    let Some(config_path) = config_path else {
        print_usage();
        bail!("--config is required");
    };
    let config = WardenConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let supervisor = Arc::new(Supervisor::new());
    let mut autostart = Vec::new();
    for service in &config.services {
        let mut process = ProcessService::new(&service.name, service.start_command.clone());
        if let Some(stop_command) = &service.stop_command {
            process = process.with_stop_command(stop_command.clone());
        }
        let mut descriptor = process.into_descriptor(&service.health_check_url)?;
        if let Some(interval_ms) = service.poll_interval_ms {
            descriptor = descriptor.with_poll_interval_ms(interval_ms)?;
        }
        let controller = supervisor.register(descriptor)?;
        if service.autostart {
            autostart.push(controller);
        }
    }

    for controller in autostart {
        tokio::spawn(async move {
            if let Err(err) = controller.request_start().await {
                tracing::error!(service = %controller.name(), error = %err, "startup failed");
            }
        });
    }

    let store = Arc::new(MemoryDocumentStore::new());
    let bridge = Arc::new(Bridge::new(supervisor.clone(), store));

    let ui_addr = ui_listen
        .or_else(|| config.ui_listen.clone())
        .unwrap_or_else(|| DEFAULT_UI_LISTEN.to_string());
    let rpc_addr = rpc_listen
        .or_else(|| config.rpc_listen.clone())
        .unwrap_or_else(|| DEFAULT_RPC_LISTEN.to_string());

    let ui_listener = TcpListener::bind(&ui_addr)
        .await
        .with_context(|| format!("binding UI listener on {ui_addr}"))?;
    let rpc_listener = TcpListener::bind(&rpc_addr)
        .await
        .with_context(|| format!("binding RPC listener on {rpc_addr}"))?;
    tracing::info!(ui = %ui_addr, rpc = %rpc_addr, "wardend listening");

    tokio::spawn(serve_ui(bridge.clone(), ui_listener));
    tokio::spawn(serve_rpc(bridge.clone(), rpc_listener));

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("shutting down");
    for name in supervisor.names() {
        if let Some(controller) = supervisor.get(&name) {
            controller.request_stop().await;
        }
    }
    supervisor.dispose_all();
    Ok(())
}

fn print_usage() {
    eprintln!(
        "Usage: wardend --config PATH [--ui-listen ADDR] [--rpc-listen ADDR]\n\
         \n\
         Options:\n\
           --config PATH      Service roster configuration file (JSON)\n\
           --ui-listen ADDR   Persistent UI socket address (default: {DEFAULT_UI_LISTEN})\n\
           --rpc-listen ADDR  Per-request endpoint address (default: {DEFAULT_RPC_LISTEN})\n"
    );
}
