//! Stratus scheduler binary.
//!
//! Binds every channel, connects to the coordination store and runs the
//! event loop until SIGINT or SIGTERM.

use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use stratus_scheduler::{
    serve, Collaborators, CoordinationStore, Listeners, Scheduler, SchedulerConfig, TcpExecutorClient,
    TcpManagementClient, TcpPeerClient,
};
use stratus_state::{open_kv, KvBackend, MemoryKv};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("stratus_scheduler=info".parse()?))
        .init();

    info!("Stratus scheduler starting");

    let config = SchedulerConfig::load("scheduler.toml")?;
    info!(
        public_ip = %config.listen.public_ip,
        management = %config.management.address,
        store = config.store.kv.backend_name(),
        "Configuration loaded"
    );

    let kv: Arc<dyn KvBackend> = match open_kv(&config.store.kv).await {
        Ok(kv) => kv,
        Err(e) => {
            error!(error = %e, "Failed to open coordination store, using in-memory store");
            Arc::new(MemoryKv::new())
        }
    };
    let store = CoordinationStore::new(kv, config.store.metadata_namespace.clone());

    let collaborators = Collaborators {
        management: Arc::new(TcpManagementClient::new(&config.management)),
        executors: Arc::new(TcpExecutorClient::new(&config.dispatch)),
        peers: Arc::new(TcpPeerClient::new(
            config.listen.ports.scheduler_update,
            config.management.request_timeout,
        )),
    };

    let listeners = Listeners::bind(&config.listen).await?;
    let scheduler = Scheduler::new(config, store, collaborators);

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, initiating graceful shutdown");
        cancel_on_signal.cancel();
    });

    serve(scheduler, listeners, cancel).await;

    info!("Scheduler shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C");
        }
        () = terminate => {
            info!("Received SIGTERM");
        }
    }
}
