use crate::core::codec::{self, InputMode, LineEnding};
use crate::core::command_history::CommandHistory;
use crate::core::connection::events::{ConnectionEvent, ProcessorInput};
use crate::core::connection::reconnect::ReconnectPolicy;
use crate::core::connection::state::ConnectionStatus;
use crate::core::export::{self, ExportOptions};
use crate::core::message::{MessageQuery, TerminalMessage};
use crate::core::message_log::MessageLog;
use crate::domain::config::{ConnectionConfig, GlobalConfig};
use crate::domain::error::{ConnectionError, ConnectionResult, TermLinkResult, TransportError};
use crate::infrastructure::transport::{ReadEvent, ReadSink, TransportHandler};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Sizing knobs for a [`ConnectionManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerOptions {
    pub message_log_capacity: usize,
    pub command_history_capacity: usize,
    /// Bound of the channel between read loops and the event processor
    pub inbound_capacity: usize,
    /// Events a slow subscriber may lag behind before it starts missing some
    pub event_capacity: usize,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            message_log_capacity: MessageLog::DEFAULT_CAPACITY,
            command_history_capacity: CommandHistory::DEFAULT_CAPACITY,
            inbound_capacity: 256,
            event_capacity: 1024,
        }
    }
}

impl From<&GlobalConfig> for ManagerOptions {
    fn from(global: &GlobalConfig) -> Self {
        Self {
            message_log_capacity: global.message_log_capacity,
            command_history_capacity: global.command_history_capacity,
            ..Self::default()
        }
    }
}

/// Lifecycle state guarded by the lifecycle lock
struct SessionSlot {
    /// Bumped whenever a handler is installed or torn down
    generation: u64,
    config: Option<ConnectionConfig>,
    reconnect: Option<JoinHandle<()>>,
}

struct Inner {
    /// Serializes connect, disconnect, close handling and reconnect attempts.
    /// Not held while a transport is opening.
    lifecycle: Mutex<SessionSlot>,
    /// Serializes writes and teardown
    writer: Mutex<Option<TransportHandler>>,
    /// Mirror of `SessionSlot::generation` for the event processor and for
    /// opens in flight, which give up once it moves
    generation: watch::Sender<u64>,
    status_tx: watch::Sender<ConnectionStatus>,
    events_tx: broadcast::Sender<ConnectionEvent>,
    inbound_tx: mpsc::Sender<ProcessorInput>,
    log: Mutex<MessageLog>,
    history: Mutex<CommandHistory>,
    last_error: Mutex<Option<ConnectionError>>,
    processor: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

/// Owns at most one live transport and everything exchanged over it.
///
/// Cloning yields another handle to the same manager. Must be created
/// inside a tokio runtime; the event processor is spawned on construction.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(options: ManagerOptions) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        let (events_tx, _) = broadcast::channel(options.event_capacity.max(1));
        let (inbound_tx, inbound_rx) = mpsc::channel(options.inbound_capacity.max(1));

        let inner = Arc::new_cyclic(|weak| Inner {
            lifecycle: Mutex::new(SessionSlot {
                generation: 0,
                config: None,
                reconnect: None,
            }),
            writer: Mutex::new(None),
            generation: watch::channel(0).0,
            status_tx,
            events_tx,
            inbound_tx,
            log: Mutex::new(MessageLog::new(options.message_log_capacity)),
            history: Mutex::new(CommandHistory::new(options.command_history_capacity)),
            last_error: Mutex::new(None),
            processor: Mutex::new(Some(tokio::spawn(run_processor(
                weak.clone(),
                inbound_rx,
            )))),
            shut_down: AtomicBool::new(false),
        });

        Self { inner }
    }

    fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    // ---- connection lifecycle ----

    /// Open a session described by `config`
    pub async fn connect(&self, config: ConnectionConfig) -> ConnectionResult<()> {
        config.validate()?;
        self.ensure_running()?;

        let session = {
            let mut slot = self.inner.lifecycle.lock().await;
            if self.status().is_active() {
                warn!("Connect requested while {}", self.status());
                return Err(ConnectionError::AlreadyConnected);
            }

            info!("Connecting: {}", config.describe());
            self.transition(ConnectionStatus::Connecting, Some(config.describe()));
            self.advance_generation(&mut slot)
        };

        let opened = self.open_transport(&config, session).await;

        let mut slot = self.inner.lifecycle.lock().await;
        if slot.generation != session {
            discard(opened).await;
            info!("Connect to {} cancelled", config.describe());
            return Err(ConnectionError::Cancelled);
        }

        match opened {
            Some(Ok(handler)) => self.install(&mut slot, handler, config).await,
            Some(Err(e)) => {
                error!("Failed to open {}: {}", config.describe(), e);
                let err = ConnectionError::from(e);
                self.fail(&mut slot, err.clone()).await;
                Err(err)
            }
            // Only a generation change cancels an open
            None => Err(ConnectionError::Cancelled),
        }
    }

    /// Open `config`, giving up as soon as `session` is superseded
    async fn open_transport(
        &self,
        config: &ConnectionConfig,
        session: u64,
    ) -> Option<Result<TransportHandler, TransportError>> {
        let generation = self.inner.generation.subscribe();
        tokio::select! {
            result = TransportHandler::open(config) => Some(result),
            _ = superseded(generation, session) => None,
        }
    }

    /// Caller holds the lifecycle lock
    fn advance_generation(&self, slot: &mut SessionSlot) -> u64 {
        slot.generation += 1;
        self.inner.generation.send_replace(slot.generation);
        slot.generation
    }

    /// Close the active session and cancel any pending reconnect.
    /// Calling this while already disconnected is a no-op.
    pub async fn disconnect(&self) -> ConnectionResult<()> {
        let mut slot = self.inner.lifecycle.lock().await;

        if let Some(task) = slot.reconnect.take() {
            debug!("Cancelling pending reconnect");
            task.abort();
            let _ = task.await;
        }

        self.advance_generation(&mut slot);

        let handler = self.inner.writer.lock().await.take();
        let had_handler = handler.is_some();
        if let Some(mut handler) = handler {
            handler.close().await;
        }
        slot.config = None;

        if !had_handler && self.status() == ConnectionStatus::Disconnected {
            debug!("Disconnect requested while already disconnected");
            return Ok(());
        }

        info!("Disconnected");
        self.transition(
            ConnectionStatus::Disconnected,
            Some("disconnected by user".to_string()),
        );
        Ok(())
    }

    /// Disconnect and stop the event processor. The manager rejects
    /// further connects afterwards.
    pub async fn shutdown(&self) -> ConnectionResult<()> {
        self.disconnect().await?;

        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _ = self.inner.inbound_tx.send(ProcessorInput::Shutdown).await;
        if let Some(processor) = self.inner.processor.lock().await.take() {
            if let Err(e) = processor.await {
                warn!("Event processor ended abnormally: {}", e);
            }
        }
        info!("Connection manager shut down");
        Ok(())
    }

    fn ensure_running(&self) -> ConnectionResult<()> {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            Err(ConnectionError::Shutdown)
        } else {
            Ok(())
        }
    }

    /// Make `handler` the live transport and start its read loop.
    /// Caller holds the lifecycle lock.
    async fn install(
        &self,
        slot: &mut SessionSlot,
        mut handler: TransportHandler,
        config: ConnectionConfig,
    ) -> ConnectionResult<()> {
        let session = self.advance_generation(slot);

        let sink = ReadSink::new(session, self.inner.inbound_tx.clone());
        if let Err(e) = handler.spawn_reader(sink) {
            error!("Failed to start read loop: {}", e);
            handler.close().await;
            let err = ConnectionError::from(e);
            self.fail(slot, err.clone()).await;
            return Err(err);
        }

        let endpoint = handler.endpoint();
        *self.inner.writer.lock().await = Some(handler);
        let detail = config.describe();
        slot.config = Some(config);

        info!("Connected to {}", endpoint);
        self.transition(ConnectionStatus::Connected, Some(detail));
        Ok(())
    }

    /// Settle on `Disconnected` through a transient `Error` status.
    /// Caller holds the lifecycle lock.
    async fn fail(&self, slot: &mut SessionSlot, err: ConnectionError) {
        slot.config = None;
        *self.inner.last_error.lock().await = Some(err.clone());

        self.transition(ConnectionStatus::Error(err.to_string()), Some(err.kind().to_string()));
        self.transition(ConnectionStatus::Disconnected, None);
    }

    /// Move to `next` if the state machine allows it, publishing the change.
    /// Caller holds the lifecycle lock.
    fn transition(&self, next: ConnectionStatus, detail: Option<String>) -> bool {
        let current = self.status();
        if !current.can_transition_to(&next) {
            warn!("Refusing status transition {} -> {}", current, next);
            return false;
        }

        debug!("Status {} -> {}", current, next);
        self.inner.status_tx.send_replace(next.clone());
        self.publish(ConnectionEvent::status(next, detail));
        true
    }

    fn publish(&self, event: ConnectionEvent) {
        // No subscribers is fine
        let _ = self.inner.events_tx.send(event);
    }

    /// Tear down after the read loop of `session` reported a failure, then
    /// either start reconnecting or settle on `Disconnected`.
    async fn handle_unexpected_close(&self, session: u64, error: TransportError) {
        let mut slot = self.inner.lifecycle.lock().await;
        if slot.generation != session || !self.status().is_connected() {
            debug!("Ignoring close from stale session {}", session);
            return;
        }

        warn!("Connection lost: {}", error);
        let reconnect_session = self.advance_generation(&mut slot);

        if let Some(mut handler) = self.inner.writer.lock().await.take() {
            handler.close().await;
        }
        *self.inner.last_error.lock().await = Some(ConnectionError::from(error.clone()));

        let config = slot.config.clone();
        let policy = config.as_ref().and_then(ReconnectPolicy::from_config);
        match (policy, config) {
            (Some(policy), Some(config)) => {
                info!(
                    "Reconnecting every {:?} ({})",
                    policy.interval,
                    match policy.max_attempts {
                        Some(max) => format!("up to {} attempts", max),
                        None => "unlimited attempts".to_string(),
                    }
                );
                self.transition(
                    ConnectionStatus::Connecting,
                    Some(format!("connection lost: {}", error)),
                );
                slot.reconnect = Some(tokio::spawn(reconnect_loop(
                    Arc::downgrade(&self.inner),
                    policy,
                    config,
                    reconnect_session,
                )));
            }
            _ => {
                slot.config = None;
                self.transition(ConnectionStatus::Error(error.to_string()), Some(error.kind().to_string()));
                self.transition(ConnectionStatus::Disconnected, None);
            }
        }
    }

    // ---- data path ----

    /// Write `payload` to the device and record it as sent
    pub async fn send(&self, payload: Vec<u8>) -> ConnectionResult<()> {
        self.send_with_mode(payload, InputMode::Text).await
    }

    /// Encode `text`, remember it in the command history, then send it
    pub async fn send_text(
        &self,
        text: &str,
        mode: InputMode,
        line_ending: LineEnding,
    ) -> ConnectionResult<()> {
        let payload = codec::encode(text, mode, line_ending);
        self.inner.history.lock().await.push(text);
        self.send_with_mode(payload, mode).await
    }

    async fn send_with_mode(&self, payload: Vec<u8>, mode: InputMode) -> ConnectionResult<()> {
        if !self.status().is_connected() {
            return Err(ConnectionError::NotConnected);
        }

        let mut writer = self.inner.writer.lock().await;
        let handler = writer.as_mut().ok_or(ConnectionError::NotConnected)?;

        if payload.is_empty() {
            debug!("Skipping empty payload");
            return Ok(());
        }

        let result = handler.write(&payload).await;
        let message = match &result {
            Ok(()) => TerminalMessage::sent(payload, mode),
            Err(e) => {
                error!("Failed to send {} bytes: {}", payload.len(), e);
                TerminalMessage::send_failed(payload, mode, e.to_string())
            }
        };

        // Posted while the write lock is held so sends are logged in order
        if self
            .inner
            .inbound_tx
            .send(ProcessorInput::Sent(message))
            .await
            .is_err()
        {
            warn!("Event processor is gone; sent message not logged");
        }

        if let Err(e) = result {
            let err = ConnectionError::from(e);
            *self.inner.last_error.lock().await = Some(err.clone());
            return Err(err);
        }
        Ok(())
    }

    // ---- observation ----

    pub fn status(&self) -> ConnectionStatus {
        self.inner.status_tx.borrow().clone()
    }

    /// Receiver that always holds the latest status
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Stream of message and status events
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Most recent failure, kept after the status settles
    pub async fn last_error(&self) -> Option<ConnectionError> {
        self.inner.last_error.lock().await.clone()
    }

    /// Summary of the active or pending session
    pub async fn connection_info(&self) -> Option<String> {
        self.active_config().await.map(|config| config.describe())
    }

    pub async fn active_config(&self) -> Option<ConnectionConfig> {
        self.inner.lifecycle.lock().await.config.clone()
    }

    // ---- message log ----

    pub async fn messages(&self) -> Vec<TerminalMessage> {
        self.inner.log.lock().await.snapshot()
    }

    pub async fn filter_messages(&self, query: &str, case_sensitive: bool) -> Vec<TerminalMessage> {
        self.inner.log.lock().await.filter(query, case_sensitive)
    }

    pub async fn query_messages(&self, query: &MessageQuery) -> Vec<TerminalMessage> {
        self.inner.log.lock().await.query(query)
    }

    pub async fn clear_messages(&self) {
        self.inner.log.lock().await.clear();
    }

    pub async fn export_messages(&self, options: &ExportOptions) -> TermLinkResult<String> {
        let messages = self.messages().await;
        export::export_messages(&messages, options)
    }

    // ---- command history ----

    pub async fn command_history(&self) -> Vec<String> {
        self.inner.history.lock().await.entries()
    }

    pub async fn search_commands(&self, query: &str) -> Vec<String> {
        self.inner.history.lock().await.search(query)
    }

    pub async fn previous_command(&self) -> Option<String> {
        self.inner.history.lock().await.navigate_previous()
    }

    pub async fn next_command(&self) -> Option<String> {
        self.inner.history.lock().await.navigate_next()
    }

    pub async fn clear_command_history(&self) {
        self.inner.history.lock().await.clear();
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(ManagerOptions::default())
    }
}

/// Single consumer of read loop output and sent messages. The only code
/// that appends to the message log.
async fn run_processor(inner: Weak<Inner>, mut inbound_rx: mpsc::Receiver<ProcessorInput>) {
    while let Some(input) = inbound_rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };

        match input {
            ProcessorInput::Read { session, event } => {
                let current = *inner.generation.borrow();
                if session != current {
                    debug!("Dropping event from stale session {}", session);
                    continue;
                }
                match event {
                    ReadEvent::Data(bytes) => {
                        let message = TerminalMessage::received(bytes);
                        let evicted = inner.log.lock().await.append(message.clone());
                        if evicted > 0 {
                            debug!("Message log full, evicted {}", evicted);
                        }
                        let _ = inner
                            .events_tx
                            .send(ConnectionEvent::MessageReceived { message });
                    }
                    ReadEvent::Closed(error) => {
                        inner
                            .log
                            .lock()
                            .await
                            .append(TerminalMessage::receive_failed(error.to_string()));
                        // Never block the processor on the lifecycle lock
                        let manager = ConnectionManager::from_inner(inner);
                        tokio::spawn(async move {
                            manager.handle_unexpected_close(session, error).await;
                        });
                    }
                }
            }
            ProcessorInput::Sent(message) => {
                inner.log.lock().await.append(message);
            }
            ProcessorInput::Shutdown => break,
        }
    }
    debug!("Event processor stopped");
}

/// Retry `config` under `policy` until it opens, the budget runs out or
/// `session` is superseded by `disconnect`.
async fn reconnect_loop(
    inner: Weak<Inner>,
    policy: ReconnectPolicy,
    config: ConnectionConfig,
    session: u64,
) {
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        if !policy.allows(attempt) {
            break;
        }

        tokio::time::sleep(policy.interval).await;

        let Some(inner) = inner.upgrade() else {
            return;
        };
        let manager = ConnectionManager::from_inner(inner);
        {
            let slot = manager.inner.lifecycle.lock().await;
            if slot.generation != session || manager.status() != ConnectionStatus::Connecting {
                return;
            }

            let progress = match policy.max_attempts {
                Some(max) => format!("reconnect attempt {}/{}", attempt, max),
                None => format!("reconnect attempt {}", attempt),
            };
            info!("{}: {}", progress, config.describe());
            manager.publish(ConnectionEvent::status(
                ConnectionStatus::Connecting,
                Some(progress),
            ));
        }

        let opened = manager.open_transport(&config, session).await;

        let mut slot = manager.inner.lifecycle.lock().await;
        if slot.generation != session {
            discard(opened).await;
            return;
        }
        match opened {
            Some(Ok(handler)) => {
                slot.reconnect = None;
                if let Err(e) = manager.install(&mut slot, handler, config).await {
                    error!("Reconnect opened but could not start: {}", e);
                }
                return;
            }
            Some(Err(e)) => {
                warn!("Reconnect attempt {} failed: {}", attempt, e);
                *manager.inner.last_error.lock().await = Some(ConnectionError::from(e));
            }
            None => return,
        }
    }

    let Some(inner) = inner.upgrade() else {
        return;
    };
    let manager = ConnectionManager::from_inner(inner);
    let mut slot = manager.inner.lifecycle.lock().await;
    if slot.generation != session || manager.status() != ConnectionStatus::Connecting {
        return;
    }

    let attempts = attempt - 1;
    error!("Giving up after {} reconnect attempts", attempts);
    slot.reconnect = None;
    manager
        .fail(&mut slot, ConnectionError::ReconnectExhausted { attempts })
        .await;
}

/// Resolves once the generation moves past `session`
async fn superseded(mut generation: watch::Receiver<u64>, session: u64) {
    let _ = generation.wait_for(|current| *current != session).await;
}

/// Close a transport opened for a session that no longer exists
async fn discard(opened: Option<Result<TransportHandler, TransportError>>) {
    if let Some(Ok(mut handler)) = opened {
        debug!("Closing transport of a cancelled session");
        handler.close().await;
    }
}
