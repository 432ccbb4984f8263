use crate::domain::config::TcpConfig;
use crate::domain::error::TransportError;
use crate::infrastructure::transport::{ReadSink, Transport, Utf8Carry, READ_BUFFER_SIZE};
use async_trait::async_trait;
use socket2::{SockRef, TcpKeepalive};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant, Interval};
use tracing::{debug, info, warn};

/// Client side TCP transport
pub struct TcpHandler {
    config: TcpConfig,
    peer: SocketAddr,
    writer: Option<OwnedWriteHalf>,
    /// Taken by `spawn_reader`
    reader: Option<OwnedReadHalf>,
    reader_task: Option<JoinHandle<()>>,
    shutdown_sender: Option<mpsc::Sender<()>>,
}

impl TcpHandler {
    async fn connect(config: &TcpConfig) -> Result<TcpStream, TransportError> {
        let address = config.address();

        let attempt = async {
            let mut last_error = None;
            for addr in lookup_host(address.as_str()).await? {
                let socket = if addr.is_ipv4() {
                    TcpSocket::new_v4()?
                } else {
                    TcpSocket::new_v6()?
                };
                if config.keep_alive {
                    apply_keepalive(&socket, config.keep_alive_interval())?;
                }

                match socket.connect(addr).await {
                    Ok(stream) => return Ok(stream),
                    Err(e) => {
                        debug!("Connect to {} failed: {}", addr, e);
                        last_error = Some(e);
                    }
                }
            }
            Err::<TcpStream, io::Error>(last_error.unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
            }))
        };

        timeout(config.connect_timeout(), attempt)
            .await
            .map_err(|_| TransportError::NetworkTimeout(address.clone()))?
            .map_err(|e| TransportError::from_connect_io(&address, &e))
    }
}

/// Unanswered kernel probes before the peer is declared dead
const KEEPALIVE_RETRIES: u32 = 3;

/// Arm kernel keep-alive: first probe after `interval` of silence, then one
/// every `interval` until `KEEPALIVE_RETRIES` go unanswered
fn apply_keepalive(socket: &TcpSocket, interval: Duration) -> io::Result<()> {
    socket.set_keepalive(true)?;

    let keepalive = TcpKeepalive::new().with_time(interval);
    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "windows"
    ))]
    let keepalive = keepalive.with_interval(interval);
    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "netbsd"
    ))]
    let keepalive = keepalive.with_retries(KEEPALIVE_RETRIES);

    SockRef::from(socket).set_tcp_keepalive(&keepalive)
}

#[async_trait]
impl Transport for TcpHandler {
    type Config = TcpConfig;

    async fn open(config: &TcpConfig) -> Result<Self, TransportError> {
        let stream = Self::connect(config).await?;

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }
        let peer = stream
            .peer_addr()
            .map_err(|e| TransportError::from_connect_io(&config.address(), &e))?;

        info!("TCP connection established to {}", peer);

        let (reader, writer) = stream.into_split();
        Ok(Self {
            config: config.clone(),
            peer,
            writer: Some(writer),
            reader: Some(reader),
            reader_task: None,
            shutdown_sender: None,
        })
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| TransportError::WriteFailed("connection is closed".to_string()))?;

        writer
            .write_all(data)
            .await
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;

        debug!("Sent {} bytes over TCP", data.len());
        Ok(())
    }

    fn spawn_reader(&mut self, sink: ReadSink) -> Result<(), TransportError> {
        let reader = self
            .reader
            .take()
            .ok_or_else(|| TransportError::ReadFailed("reader already started".to_string()))?;

        let (shutdown_sender, shutdown_receiver) = mpsc::channel(1);
        let keep_alive = self
            .config
            .keep_alive
            .then(|| self.config.keep_alive_interval());

        self.shutdown_sender = Some(shutdown_sender);
        self.reader_task = Some(tokio::spawn(read_loop(
            reader,
            sink,
            self.config.read_timeout(),
            keep_alive,
            shutdown_receiver,
        )));
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(shutdown_sender) = self.shutdown_sender.take() {
            let _ = shutdown_sender.try_send(());
        }
        if let Some(task) = self.reader_task.take() {
            if let Err(e) = task.await {
                warn!("TCP read task ended abnormally: {}", e);
            }
        }
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("TCP shutdown: {}", e);
            }
            info!("TCP connection to {} closed", self.peer);
        }
        self.reader = None;
    }

    fn endpoint(&self) -> String {
        self.peer.to_string()
    }
}

enum Step {
    Stop,
    Probe,
    Read(Result<io::Result<usize>, tokio::time::error::Elapsed>),
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    sink: ReadSink,
    read_timeout: Duration,
    keep_alive: Option<Duration>,
    mut shutdown_receiver: mpsc::Receiver<()>,
) {
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    let mut carry = Utf8Carry::default();
    let mut probe = keep_alive.filter(|period| !period.is_zero()).and_then(|period| {
        Instant::now()
            .checked_add(period)
            .map(|start| tokio::time::interval_at(start, period))
    });

    loop {
        let step = tokio::select! {
            _ = shutdown_receiver.recv() => Step::Stop,
            _ = next_probe(&mut probe) => Step::Probe,
            result = timeout(read_timeout, reader.read(&mut buffer)) => Step::Read(result),
        };

        match step {
            Step::Stop => {
                debug!("TCP read loop stopped");
                break;
            }
            Step::Probe => {
                if let Err(error) = probe_socket(&reader) {
                    warn!("Keep-alive probe failed: {}", error);
                    flush(&mut carry, &sink).await;
                    sink.closed(error).await;
                    break;
                }
            }
            // Idle; not an error
            Step::Read(Err(_)) => {
                if !flush(&mut carry, &sink).await {
                    break;
                }
            }
            Step::Read(Ok(Ok(0))) => {
                info!("TCP connection closed by peer");
                flush(&mut carry, &sink).await;
                sink.closed(TransportError::UnexpectedClose(
                    "connection closed by peer".to_string(),
                ))
                .await;
                break;
            }
            Step::Read(Ok(Ok(n))) => {
                debug!("Received {} bytes over TCP", n);
                if let Some(bytes) = carry.push(&buffer[..n]) {
                    if !sink.data(bytes).await {
                        break;
                    }
                }
            }
            Step::Read(Ok(Err(e))) => {
                warn!("Failed to read from TCP stream: {}", e);
                flush(&mut carry, &sink).await;
                sink.closed(TransportError::ReadFailed(e.to_string())).await;
                break;
            }
        }
    }
}

/// Deliver bytes held back by `carry`. False once the consumer is gone.
async fn flush(carry: &mut Utf8Carry, sink: &ReadSink) -> bool {
    match carry.flush() {
        Some(bytes) => sink.data(bytes).await,
        None => true,
    }
}

async fn next_probe(probe: &mut Option<Interval>) {
    match probe {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Check for a pending socket error or a vanished peer
fn probe_socket(reader: &OwnedReadHalf) -> Result<(), TransportError> {
    let stream: &TcpStream = reader.as_ref();

    match stream.take_error() {
        Ok(None) => {}
        Ok(Some(e)) | Err(e) => return Err(TransportError::UnexpectedClose(e.to_string())),
    }
    stream
        .peer_addr()
        .map(|_| ())
        .map_err(|e| TransportError::UnexpectedClose(format!("peer lost: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection::events::ProcessorInput;
    use crate::infrastructure::transport::ReadEvent;
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[tokio::test]
    async fn test_connect_refused_is_open_error() {
        let (listener, port) = listener().await;
        drop(listener);

        let result = TcpHandler::open(&TcpConfig::new("127.0.0.1", port)).await;
        let err = result.err().unwrap();
        assert!(err.is_open_error());
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (listener, port) = listener().await;
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(b"world").await.unwrap();
            buf
        });

        let mut handler = TcpHandler::open(&TcpConfig::new("127.0.0.1", port)).await.unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        handler.spawn_reader(ReadSink::new(7, tx)).unwrap();
        handler.write(b"hello").await.unwrap();

        assert_eq!(&server.await.unwrap(), b"hello");

        let mut received = Vec::new();
        while received.len() < 5 {
            match rx.recv().await.unwrap() {
                ProcessorInput::Read {
                    session,
                    event: ReadEvent::Data(bytes),
                } => {
                    assert_eq!(session, 7);
                    received.extend(bytes);
                }
                ProcessorInput::Read {
                    event: ReadEvent::Closed(_),
                    ..
                } => break,
                other => panic!("unexpected input {:?}", other),
            }
        }
        assert_eq!(received, b"world");

        handler.close().await;
        handler.close().await;
    }

    async fn next_data(rx: &mut mpsc::Receiver<ProcessorInput>) -> Vec<u8> {
        match timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap() {
            ProcessorInput::Read {
                event: ReadEvent::Data(bytes),
                ..
            } => bytes,
            other => panic!("unexpected input {:?}", other),
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_keep_alive_interval_reaches_socket() {
        let (listener, port) = listener().await;
        let mut config = TcpConfig::new("127.0.0.1", port);
        config.keep_alive_interval_sec = 7;

        let stream = TcpHandler::connect(&config).await.unwrap();
        let socket = SockRef::from(&stream);
        assert!(socket.keepalive().unwrap());
        assert_eq!(socket.keepalive_time().unwrap(), Duration::from_secs(7));
        assert_eq!(socket.keepalive_interval().unwrap(), Duration::from_secs(7));
        assert_eq!(socket.keepalive_retries().unwrap(), KEEPALIVE_RETRIES);
        drop(listener);
    }

    #[tokio::test]
    async fn test_keep_alive_probe_leaves_healthy_peer_alone() {
        let (listener, port) = listener().await;
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(1500)).await;
            socket.write_all(b"ping").await.unwrap();
            socket
        });

        let mut config = TcpConfig::new("127.0.0.1", port);
        config.keep_alive_interval_sec = 1;
        let mut handler = TcpHandler::open(&config).await.unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        handler.spawn_reader(ReadSink::new(1, tx)).unwrap();

        let mut received = Vec::new();
        while received.len() < 4 {
            received.extend(next_data(&mut rx).await);
        }
        assert_eq!(received, b"ping");

        handler.close().await;
        drop(server.await.unwrap());
    }

    #[tokio::test]
    async fn test_huge_keep_alive_interval_does_not_kill_reader() {
        let (listener, port) = listener().await;
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"up").await.unwrap();
            socket
        });

        let mut config = TcpConfig::new("127.0.0.1", port);
        config.keep_alive = false;
        let mut handler = TcpHandler::open(&config).await.unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let reader = handler.reader.take().unwrap();
        let (_stop, stop_rx) = mpsc::channel(1);
        let task = tokio::spawn(read_loop(
            reader,
            ReadSink::new(1, tx),
            Duration::from_secs(30),
            Some(Duration::from_secs(u64::MAX)),
            stop_rx,
        ));

        let mut received = Vec::new();
        while received.len() < 2 {
            received.extend(next_data(&mut rx).await);
        }
        assert_eq!(received, b"up");

        task.abort();
        handler.close().await;
        drop(server.await.unwrap());
    }

    #[tokio::test]
    async fn test_split_utf8_character_arrives_whole() {
        let (listener, port) = listener().await;
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let bytes = "caf\u{e9}!".as_bytes();
            socket.write_all(&bytes[..4]).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            socket.write_all(&bytes[4..]).await.unwrap();
            socket
        });

        let mut handler = TcpHandler::open(&TcpConfig::new("127.0.0.1", port)).await.unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        handler.spawn_reader(ReadSink::new(1, tx)).unwrap();

        let mut chunks = Vec::new();
        let mut total = 0;
        while total < "caf\u{e9}!".len() {
            let chunk = next_data(&mut rx).await;
            total += chunk.len();
            chunks.push(chunk);
        }
        for chunk in &chunks {
            assert!(std::str::from_utf8(chunk).is_ok(), "chunk {:?} split a character", chunk);
        }
        assert_eq!(chunks.concat(), "caf\u{e9}!".as_bytes());

        handler.close().await;
        drop(server.await.unwrap());
    }

    #[tokio::test]
    async fn test_peer_close_reports_unexpected_close() {
        let (listener, port) = listener().await;
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let mut handler = TcpHandler::open(&TcpConfig::new("127.0.0.1", port)).await.unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        handler.spawn_reader(ReadSink::new(1, tx)).unwrap();
        server.await.unwrap();

        match rx.recv().await.unwrap() {
            ProcessorInput::Read {
                event: ReadEvent::Closed(err),
                ..
            } => assert_eq!(err.kind(), "unexpected_close"),
            other => panic!("unexpected input {:?}", other),
        }

        handler.close().await;
    }
}
