use crate::domain::error::TransportError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const CLIENT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct ClientConnection {
    pub addr: SocketAddr,
    pub connected_at: chrono::DateTime<chrono::Utc>,
    pub bytes_echoed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStats {
    pub bind_addr: SocketAddr,
    pub client_count: usize,
    pub total_bytes_echoed: u64,
}

/// Local TCP server that sends every received byte straight back. Used for
/// bench testing and by the integration tests.
pub struct EchoServer {
    listener: Option<TcpListener>,
    bind_addr: SocketAddr,
    clients: Arc<Mutex<Vec<ClientConnection>>>,
    total_echoed: Arc<Mutex<u64>>,
    shutdown_sender: watch::Sender<bool>,
    server_handle: Option<JoinHandle<()>>,
}

impl EchoServer {
    pub async fn bind(bind_addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(bind_addr).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::AddrInUse => TransportError::AddressInUse(bind_addr.to_string()),
            _ => TransportError::OpenFailed(format!("failed to bind {}: {}", bind_addr, e)),
        })?;
        let actual_addr = listener
            .local_addr()
            .map_err(|e| TransportError::OpenFailed(format!("failed to get local address: {}", e)))?;

        let (shutdown_sender, _) = watch::channel(false);
        info!("Echo server bound to {}", actual_addr);

        Ok(Self {
            listener: Some(listener),
            bind_addr: actual_addr,
            clients: Arc::new(Mutex::new(Vec::new())),
            total_echoed: Arc::new(Mutex::new(0)),
            shutdown_sender,
            server_handle: None,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Start accepting clients. A server can only be started once.
    pub fn start(&mut self) -> Result<(), TransportError> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| TransportError::OpenFailed("server was already started".to_string()))?;

        let clients = Arc::clone(&self.clients);
        let total_echoed = Arc::clone(&self.total_echoed);
        let mut shutdown = self.shutdown_sender.subscribe();
        let client_shutdown = self.shutdown_sender.subscribe();

        self.server_handle = Some(tokio::spawn(async move {
            let mut handlers = Vec::new();
            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, addr)) => {
                            info!("Client connected: {}", addr);
                            clients.lock().await.push(ClientConnection {
                                addr,
                                connected_at: chrono::Utc::now(),
                                bytes_echoed: 0,
                            });

                            let clients = Arc::clone(&clients);
                            let total_echoed = Arc::clone(&total_echoed);
                            let shutdown = client_shutdown.clone();
                            handlers.push(tokio::spawn(async move {
                                if let Err(e) =
                                    handle_client(stream, addr, &clients, &total_echoed, shutdown).await
                                {
                                    warn!("Client {} failed: {}", addr, e);
                                }
                                clients.lock().await.retain(|c| c.addr != addr);
                                info!("Client disconnected: {}", addr);
                            }));
                        }
                        Err(e) => error!("Failed to accept connection: {}", e),
                    },
                    _ = shutdown.changed() => {
                        info!("Echo server shutting down");
                        break;
                    }
                }
            }
            for handler in handlers {
                let _ = handler.await;
            }
        }));

        info!("Echo server listening on {}", self.bind_addr);
        Ok(())
    }

    /// Stop accepting, close every client connection and wait for them
    pub async fn stop(&mut self) {
        if let Some(handle) = self.server_handle.take() {
            let _ = self.shutdown_sender.send(true);
            if let Err(e) = handle.await {
                warn!("Echo server task ended abnormally: {}", e);
            }
            info!("Echo server stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.server_handle.is_some()
    }

    pub async fn connected_clients(&self) -> Vec<ClientConnection> {
        self.clients.lock().await.clone()
    }

    pub async fn stats(&self) -> ServerStats {
        ServerStats {
            bind_addr: self.bind_addr,
            client_count: self.clients.lock().await.len(),
            total_bytes_echoed: *self.total_echoed.lock().await,
        }
    }
}

async fn handle_client(
    mut stream: TcpStream,
    addr: SocketAddr,
    clients: &Mutex<Vec<ClientConnection>>,
    total_echoed: &Mutex<u64>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let mut buffer = vec![0u8; 4096];

    loop {
        let read = tokio::select! {
            _ = shutdown.changed() => break,
            read = tokio::time::timeout(CLIENT_IDLE_TIMEOUT, stream.read(&mut buffer)) => read,
        };

        let n = match read {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                debug!("Client {} idle, closing", addr);
                break;
            }
        };

        debug!(
            "Echoing {} bytes to {}: {:?}",
            n,
            addr,
            String::from_utf8_lossy(&buffer[..n])
        );
        stream.write_all(&buffer[..n]).await?;
        stream.flush().await?;

        if let Some(client) = clients.lock().await.iter_mut().find(|c| c.addr == addr) {
            client.bytes_echoed += n as u64;
        }
        *total_echoed.lock().await += n as u64;
    }

    let _ = stream.shutdown().await;
    Ok(())
}

impl Drop for EchoServer {
    fn drop(&mut self) {
        if self.server_handle.is_some() {
            let _ = self.shutdown_sender.send(true);
        }
    }
}
