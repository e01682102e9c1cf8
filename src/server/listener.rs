use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{watch, Semaphore};
use tracing::{error, info, warn};

use crate::server::handler::handle_connection;
use crate::server::{ProtocolKind, ServerContext};

/// How long in-flight sessions get to finish after shutdown is requested.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Bind the three protocol listeners and serve until interrupted.
///
/// All listeners draw permits from one shared semaphore sized by the
/// configured maximum, so total concurrency is bounded across protocols;
/// an accept loop only takes the next connection once a permit is free. A
/// listener that cannot bind is fatal for its protocol alone.
pub async fn run(ctx: Arc<ServerContext>) -> std::io::Result<()> {
    let permits = Arc::new(Semaphore::new(ctx.config.max_connections));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    for kind in [ProtocolKind::Smtp, ProtocolKind::Imap, ProtocolKind::Pop3] {
        let ctx = ctx.clone();
        let permits = permits.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(err) = accept_loop(kind, ctx, permits, shutdown).await {
                error!(protocol = kind.name(), %err, "listener failed");
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested, draining sessions");
    let _ = shutdown_tx.send(true);
    tokio::time::sleep(SHUTDOWN_GRACE).await;
    info!("shutdown complete");
    Ok(())
}

async fn accept_loop(
    kind: ProtocolKind,
    ctx: Arc<ServerContext>,
    permits: Arc<Semaphore>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", kind.port())).await?;
    info!(protocol = kind.name(), port = kind.port(), "listening");

    loop {
        // Take a worker slot before accepting: when the pool is exhausted,
        // pending connections wait in the kernel backlog.
        let permit = tokio::select! {
            permit = permits.clone().acquire_owned() => {
                permit.expect("semaphore never closes")
            }
            _ = shutdown.changed() => break,
        };

        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(protocol = kind.name(), %err, "accept failed");
                    continue;
                }
            },
            _ = shutdown.changed() => break,
        };

        let ctx = ctx.clone();
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(err) = handle_connection(kind, stream, peer, ctx).await {
                warn!(protocol = kind.name(), %peer, %err, "session ended with error");
            }
        });
    }

    info!(protocol = kind.name(), "listener stopped");
    Ok(())
}
