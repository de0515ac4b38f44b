//! Server network layer: TCP listener, connection intake and graceful shutdown

use crate::connection::Connection;
use crate::lobby::Lobby;
use crate::rules::RulesConfig;
use log::{debug, error, info};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 12346;

/// How long shutdown waits for seated connections to flush.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub rules: RulesConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("{}:{}", DEFAULT_HOST, DEFAULT_PORT),
            rules: RulesConfig::default(),
        }
    }
}

/// Accepts players and hands them to the lobby
pub struct Server {
    listener: TcpListener,
    lobby: Arc<Lobby>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, BoxError> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            lobby: Arc::new(Lobby::new(config.rules)),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn lobby(&self) -> Arc<Lobby> {
        Arc::clone(&self.lobby)
    }

    /// Serves until the process is stopped.
    pub async fn run(self) -> Result<(), BoxError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` resolves, then closes every room
    /// and waiting connection.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), BoxError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.intake(stream, addr).await,
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        }

        self.lobby.shutdown(SHUTDOWN_GRACE).await;
        info!("Server stopped");
        Ok(())
    }

    async fn intake(&self, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }

        let identity = self.lobby.next_identity().await;
        info!("Player {} connected from {}", identity, addr);

        let conn = Connection::new(identity, addr.to_string(), stream);
        if let Some(room_id) = self.lobby.enqueue(conn).await {
            info!("Paired into room {}", room_id);
        }
    }
}
