//! Process bootstrap for the `serve` and `worker` commands

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};

use auditbox::api::{self, AppState};
use auditbox::app::Components;
use auditbox::config::Config;
use auditbox::worker::WorkerSettings;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// HTTP API plus, unless disabled, one worker per type.
pub async fn serve(config: Config, address: Option<std::net::SocketAddr>, no_workers: bool) -> Result<(), AnyError> {
    let components = Components::from_config(&config)?;
    let address = address.unwrap_or(config.server.bind_addr);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = JoinSet::new();
    if config.worker.enabled && !no_workers {
        spawn_workers(&components, &config, shutdown_rx, &mut workers);
    } else {
        info!("Workers disabled for this process");
    }

    let state = AppState::new(&components, config.server.max_body_bytes.as_usize());
    let result = api::serve(address, state, shutdown_signal()).await;

    let _ = shutdown_tx.send(true);
    drain(workers).await;
    components.ledger.persist()?;
    result
}

/// Workers only; runs until a shutdown signal arrives.
pub async fn work(config: Config) -> Result<(), AnyError> {
    let components = Components::from_config(&config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = JoinSet::new();
    spawn_workers(&components, &config, shutdown_rx, &mut workers);

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
    drain(workers).await;
    components.ledger.persist()?;
    Ok(())
}

fn spawn_workers(
    components: &Components,
    config: &Config,
    shutdown: watch::Receiver<bool>,
    workers: &mut JoinSet<()>,
) {
    let settings = WorkerSettings::from(&config.worker);
    for worker in components.workers(&settings) {
        info!(kind = %worker.kind(), queue_target = %worker.target(), "Spawning worker");
        workers.spawn(worker.run(shutdown.clone()));
    }
}

async fn drain(mut workers: JoinSet<()>) {
    while let Some(joined) = workers.join_next().await {
        if let Err(error) = joined {
            warn!(%error, "Worker task ended abnormally");
        }
    }
    info!("All workers stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                warn!(%error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
