//! Accept loop
//!
//! Starts the RelayServer actor and spawns one handler task per accepted
//! connection until the shutdown future resolves.

use std::future::Future;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::SHUTDOWN_GRACE;
use crate::error::AppError;
use crate::handler::handle_connection;
use crate::server::{RelayServer, ServerCommand};

/// Serve connections on `listener` until `shutdown` completes
///
/// On shutdown the actor drops every active connection, then this waits
/// (up to `SHUTDOWN_GRACE`) for each handler to flush its queued frames
/// and send Close. Accept and handler errors are logged, never returned.
pub async fn serve<F>(listener: TcpListener, command_buffer: usize, shutdown: F) -> Result<(), AppError>
where
    F: Future<Output = ()>,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Group relay listening on {}", addr);
    }

    // Create RelayServer actor channel and start
    let (cmd_tx, cmd_rx) = mpsc::channel(command_buffer);
    let actor = tokio::spawn(RelayServer::new(cmd_rx).run());

    let mut handlers = JoinSet::new();

    tokio::pin!(shutdown);

    // Connection accept loop
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let cmd_tx = cmd_tx.clone();

                    // Spawn handler task for each connection
                    handlers.spawn(async move {
                        if let Err(e) = handle_connection(stream, cmd_tx).await {
                            error!("Connection handler error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            },
            // Reap finished handlers so the set only holds live connections
            Some(_) = handlers.join_next(), if !handlers.is_empty() => {}
            _ = &mut shutdown => break,
        }
    }

    info!("Shutdown requested");
    let (done_tx, done_rx) = oneshot::channel();
    if cmd_tx.send(ServerCommand::Shutdown { done: done_tx }).await.is_ok() {
        let _ = done_rx.await;
    }
    let _ = actor.await;

    info!("Waiting for {} connection handlers to close", handlers.len());
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while handlers.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!("{} handlers still running after grace period, aborting", handlers.len());
        handlers.shutdown().await;
    }

    Ok(())
}
