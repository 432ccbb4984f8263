use crate::core::connection::events::ProcessorInput;
use crate::domain::config::{ConnectionConfig, TransportConfig};
use crate::domain::error::TransportError;
use crate::infrastructure::serial::SerialHandler;
use crate::infrastructure::tcp::TcpHandler;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Size of the buffer each read loop reads into
pub const READ_BUFFER_SIZE: usize = 4096;

/// What a read loop reports
#[derive(Debug, Clone, PartialEq)]
pub enum ReadEvent {
    Data(Vec<u8>),
    /// Terminal; the loop has exited
    Closed(TransportError),
}

/// Where a read loop delivers its events. Each event is tagged with the
/// session it came from so the consumer can drop events from a session
/// that has already been torn down.
#[derive(Debug, Clone)]
pub struct ReadSink {
    session: u64,
    tx: mpsc::Sender<ProcessorInput>,
}

impl ReadSink {
    pub(crate) fn new(session: u64, tx: mpsc::Sender<ProcessorInput>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    fn wrap(&self, event: ReadEvent) -> ProcessorInput {
        ProcessorInput::Read {
            session: self.session,
            event,
        }
    }

    /// Deliver a chunk. Returns false once the consumer is gone.
    pub async fn data(&self, bytes: Vec<u8>) -> bool {
        self.tx.send(self.wrap(ReadEvent::Data(bytes))).await.is_ok()
    }

    pub async fn closed(&self, error: TransportError) {
        let _ = self.tx.send(self.wrap(ReadEvent::Closed(error))).await;
    }

    /// Blocking variant of [`ReadSink::data`] for read loops running on a
    /// blocking thread
    pub fn blocking_data(&self, bytes: Vec<u8>) -> bool {
        self.tx.blocking_send(self.wrap(ReadEvent::Data(bytes))).is_ok()
    }

    pub fn blocking_closed(&self, error: TransportError) {
        let _ = self.tx.blocking_send(self.wrap(ReadEvent::Closed(error)));
    }
}

/// Holds back a trailing partial UTF-8 sequence so a character split
/// across two reads reaches the log in one piece
#[derive(Debug, Default)]
pub struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    /// Bytes ready to deliver, or `None` when everything was held back
    pub fn push(&mut self, chunk: &[u8]) -> Option<Vec<u8>> {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let held = incomplete_utf8_tail(&bytes);
        self.pending = bytes.split_off(bytes.len() - held);
        (!bytes.is_empty()).then_some(bytes)
    }

    /// Release whatever is held back
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        let bytes = std::mem::take(&mut self.pending);
        (!bytes.is_empty()).then_some(bytes)
    }
}

/// Length of a UTF-8 sequence cut short at the end of `bytes`, or 0
fn incomplete_utf8_tail(bytes: &[u8]) -> usize {
    let start = bytes.len().saturating_sub(3);
    for i in (start..bytes.len()).rev() {
        // Continuation byte; the lead byte is further back
        if bytes[i] & 0xC0 == 0x80 {
            continue;
        }
        return match std::str::from_utf8(&bytes[i..]) {
            Err(e) if e.valid_up_to() == 0 && e.error_len().is_none() => bytes.len() - i,
            _ => 0,
        };
    }
    0
}

/// Capability shared by every transport
#[async_trait]
pub trait Transport: Send {
    type Config: Send + Sync;

    /// Open the channel described by `config`
    async fn open(config: &Self::Config) -> Result<Self, TransportError>
    where
        Self: Sized;

    /// Write every byte of `data` or fail
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Start the read loop. It runs until `close` is called or the channel
    /// fails, in which case exactly one `ReadEvent::Closed` is delivered.
    fn spawn_reader(&mut self, sink: ReadSink) -> Result<(), TransportError>;

    /// Stop the read loop, wait for it and release the channel. Idempotent.
    async fn close(&mut self);

    /// Short label for logs, e.g. the port name or peer address
    fn endpoint(&self) -> String;
}

/// The live transport owned by a connection manager
pub enum TransportHandler {
    Serial(SerialHandler),
    Tcp(TcpHandler),
}

impl TransportHandler {
    /// Open the variant matching `config`
    pub async fn open(config: &ConnectionConfig) -> Result<Self, TransportError> {
        match &config.transport {
            TransportConfig::Serial(serial) => {
                SerialHandler::open(serial).await.map(TransportHandler::Serial)
            }
            TransportConfig::Tcp(tcp) => TcpHandler::open(tcp).await.map(TransportHandler::Tcp),
        }
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        match self {
            TransportHandler::Serial(handler) => handler.write(data).await,
            TransportHandler::Tcp(handler) => handler.write(data).await,
        }
    }

    pub fn spawn_reader(&mut self, sink: ReadSink) -> Result<(), TransportError> {
        match self {
            TransportHandler::Serial(handler) => handler.spawn_reader(sink),
            TransportHandler::Tcp(handler) => handler.spawn_reader(sink),
        }
    }

    pub async fn close(&mut self) {
        match self {
            TransportHandler::Serial(handler) => handler.close().await,
            TransportHandler::Tcp(handler) => handler.close().await,
        }
    }

    pub fn endpoint(&self) -> String {
        match self {
            TransportHandler::Serial(handler) => handler.endpoint(),
            TransportHandler::Tcp(handler) => handler.endpoint(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TransportHandler::Serial(_) => "serial",
            TransportHandler::Tcp(_) => "tcp",
        }
    }
}

impl std::fmt::Debug for TransportHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHandler")
            .field("kind", &self.kind())
            .field("endpoint", &self.endpoint())
            .finish()
    }
}
