//! Server network layer: TCP listener, per-connection tasks and shutdown

use crate::catalog::ItemCatalog;
use crate::config::ServerConfig;
use crate::connection;
use crate::context::ServerContext;
use crate::error::ServerError;
use crate::monitor;
use crate::peer;
use crate::stats;
use log::{debug, error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Resolves once shutdown has been requested, or the sender is gone.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Requests a graceful stop of a running [`Server`]
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }
}

/// Main server accepting peers and coordinating the background tasks
pub struct Server {
    listener: TcpListener,
    ctx: Arc<ServerContext>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl Server {
    /// Validates the configuration and binds the listen address.
    pub async fn bind(config: ServerConfig, catalog: ItemCatalog) -> Result<Self, ServerError> {
        config.validate()?;

        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind_addr.clone(),
                source,
            })?;
        info!("Server listening on {}", listener.local_addr()?);
        info!("{} items in catalog", catalog.len());

        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            listener,
            ctx: ServerContext::new(config, catalog),
            shutdown_tx: Arc::new(shutdown_tx),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn context(&self) -> Arc<ServerContext> {
        Arc::clone(&self.ctx)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Accepts peers until shutdown is requested, then closes every peer and
    /// waits for all tasks to finish.
    pub async fn run(self) -> Result<(), ServerError> {
        let mut tasks = JoinSet::new();
        tasks.spawn(stats::run_stats_loop(
            Arc::clone(&self.ctx),
            self.shutdown_tx.subscribe(),
        ));
        tasks.spawn(monitor::run_timeout_monitor(
            Arc::clone(&self.ctx),
            self.shutdown_tx.subscribe(),
        ));

        info!("Server started successfully");
        let mut shutdown = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.spawn_connection(&mut tasks, stream, addr),
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
                Some(finished) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = finished {
                        error!("Server task failed: {}", e);
                    }
                }
            }
        }

        info!("Shutting down");
        for (player, peer) in self.ctx.registry.drain().await {
            debug!("Closing player {}", player.id);
            peer.close();
        }
        while let Some(finished) = tasks.join_next().await {
            if let Err(e) = finished {
                error!("Server task failed: {}", e);
            }
        }
        info!("Server stopped");
        Ok(())
    }

    fn spawn_connection(&self, tasks: &mut JoinSet<()>, stream: TcpStream, addr: SocketAddr) {
        debug!("Accepted connection from {}", addr);
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }

        let (reader, writer) = stream.into_split();
        let (peer, queues) = peer::channel(addr, self.ctx.config.outbound_capacity());

        tasks.spawn(peer::run_writer(queues, writer));
        tasks.spawn(connection::serve(
            Arc::clone(&self.ctx),
            peer,
            reader,
            self.shutdown_tx.subscribe(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{FrameBuffer, Message};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn local_config() -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let config = ServerConfig {
            max_players: 0,
            ..local_config()
        };
        let result = Server::bind(config, ItemCatalog::default()).await;
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let first = Server::bind(local_config(), ItemCatalog::default())
            .await
            .unwrap();
        let taken = first.local_addr().unwrap();

        let config = ServerConfig {
            bind_addr: taken.to_string(),
            ..ServerConfig::default()
        };
        let result = Server::bind(config, ItemCatalog::default()).await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_accept_and_shutdown() {
        let server = Server::bind(local_config(), ItemCatalog::default())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let ctx = server.context();
        let handle = server.shutdown_handle();
        let running = tokio::spawn(server.run());

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = Message::ConnectionRequest {
            player_name: "Alice".into(),
        };
        stream.write_all(&request.encode()).await.unwrap();

        let mut frames = FrameBuffer::new();
        let accept = loop {
            if let Some(frame) = frames.next_frame().unwrap() {
                break Message::from_frame(&frame).unwrap();
            }
            let read = stream.read_buf(frames.buffer_mut()).await.unwrap();
            assert!(read > 0, "server closed the connection");
        };
        assert!(matches!(accept, Message::ConnectionAccept { player_id: 1, .. }));
        assert_eq!(ctx.registry.len().await, 1);

        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(2), running)
            .await
            .expect("server should stop")
            .unwrap()
            .unwrap();
        assert!(ctx.registry.is_empty().await);

        // the peer sees the connection close
        let mut rest = Vec::new();
        let _ = tokio::time::timeout(Duration::from_secs(1), stream.read_to_end(&mut rest))
            .await
            .expect("connection should be closed");
    }
}
