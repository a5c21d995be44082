//! Reconnecting streaming client
//!
//! [`StreamingClient::connect`] spawns a connection loop that opens the
//! transport, feeds received events into a bounded queue and reconnects
//! with backoff, resuming after the last sequence it saw. Listeners run
//! only when the queue is drained, one bounded batch per [`tick`], on
//! whatever schedule the caller chooses ([`spawn_drain_loop`] provides a
//! tokio interval).
//!
//! [`tick`]: StreamingClient::tick
//! [`spawn_drain_loop`]: StreamingClient::spawn_drain_loop

use crate::backoff::BackoffPolicy;
use crate::error::ClientError;
use crate::listeners::{ListenerId, ListenerRegistry};
use crate::queue::{EventQueue, OverflowReporter, DEFAULT_BATCH_SIZE, DEFAULT_QUEUE_CAPACITY};
use crate::transport::{EventStream, Transport};
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tether_protocol::{EventKind, StreamEvent};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Connection state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    /// Not connected yet
    Idle,
    /// Opening the transport
    Connecting,
    /// Receiving events
    Open,
    /// Waiting before reconnect attempt `attempt`
    Backoff {
        /// Consecutive failures so far
        attempt: u32,
    },
    /// Stopped reconnecting; [`StreamingClient::retry`] starts over
    GaveUp {
        /// Last error
        reason: String,
    },
    /// Stream ended with a terminal event, or the client was closed
    Closed,
}

/// Tuning for [`StreamingClient`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Reconnect policy
    pub backoff: BackoffPolicy,
    /// Events held before the oldest is dropped
    pub queue_capacity: usize,
    /// Events dispatched per drain tick
    pub batch_size: usize,
    /// Period of [`StreamingClient::spawn_drain_loop`]
    pub drain_interval: Duration,
    /// Minimum time between overflow reports
    pub overflow_report_interval: Duration,
    /// Reconnect when an open connection yields nothing for this long.
    ///
    /// Only set this for transports that deliver events steadily;
    /// [`HttpTransport`](crate::HttpTransport) watches the server's
    /// keep-alives itself.
    pub idle_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
            drain_interval: Duration::from_millis(16),
            overflow_report_interval: Duration::from_secs(1),
            idle_timeout: None,
        }
    }
}

impl ClientOptions {
    /// Set the reconnect policy
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set queue capacity and batch size
    #[must_use]
    pub fn with_queue(mut self, capacity: usize, batch_size: usize) -> Self {
        self.queue_capacity = capacity;
        self.batch_size = batch_size;
        self
    }

    /// Reconnect after `timeout` without events
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }
}

type OpenCallback = Arc<dyn Fn() + Send + Sync>;
type GiveUpCallback = Arc<dyn Fn(&str) + Send + Sync>;
type OverflowCallback = Arc<dyn Fn(u64) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    on_open: Option<OpenCallback>,
    on_give_up: Option<GiveUpCallback>,
    on_overflow: Option<OverflowCallback>,
}

struct Shared {
    queue: Mutex<EventQueue>,
    reporter: Mutex<OverflowReporter>,
    listeners: Mutex<ListenerRegistry>,
    callbacks: Mutex<Callbacks>,
    last_sequence: Mutex<Option<u64>>,
    state: watch::Sender<ClientState>,
    closed: AtomicBool,
}

impl Shared {
    fn set_state(&self, state: ClientState) {
        if self.closed.load(Ordering::SeqCst) && state != ClientState::Closed {
            return;
        }
        trace!(?state, "Client state");
        self.state.send_replace(state);
    }

    /// Queue an event; returns whether it ends the stream
    fn accept(&self, event: StreamEvent) -> bool {
        let terminal = event.is_terminal();
        if self.closed.load(Ordering::SeqCst) {
            return terminal;
        }
        if let Some(sequence) = event.sequence() {
            let mut last = self.last_sequence.lock();
            if last.is_some_and(|l| sequence <= l) {
                trace!(sequence, "Discarding replayed duplicate");
                return false;
            }
            *last = Some(sequence);
        }

        let dropped = self.queue.lock().push(event);
        if dropped && self.reporter.lock().record(1, Instant::now()) {
            self.report_overflow();
        }
        terminal
    }

    /// Report the running total of dropped events
    fn report_overflow(&self) {
        let total = self.queue.lock().dropped_total();
        warn!(dropped_total = total, "Event queue overflow");
        let callback = self.callbacks.lock().on_overflow.clone();
        if let Some(callback) = callback {
            callback(total);
        }
    }

    fn fire_open(&self) {
        let callback = self.callbacks.lock().on_open.clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    fn give_up(&self, reason: String) {
        warn!(%reason, "Giving up on stream");
        self.set_state(ClientState::GaveUp {
            reason: reason.clone(),
        });
        let callback = self.callbacks.lock().on_give_up.clone();
        if let Some(callback) = callback {
            callback(&reason);
        }
    }

    fn tick(&self) -> usize {
        let batch = self.queue.lock().drain_batch();
        if self.reporter.lock().flush(Instant::now()) {
            self.report_overflow();
        }
        let mut dispatched = 0;
        for event in &batch {
            if self.closed.load(Ordering::SeqCst) {
                break;
            }
            // Listeners may call back into the client, so none is run under the lock
            let listeners = self.listeners.lock().matching(event.kind());
            for listener in listeners {
                if self.closed.load(Ordering::SeqCst) {
                    return dispatched;
                }
                listener(event);
            }
            dispatched += 1;
        }
        dispatched
    }
}

struct Connection {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

enum Pumped {
    Terminal,
    Cancelled,
    Failed(ClientError),
}

/// Reconnecting consumer of one session's event stream
pub struct StreamingClient {
    transport: Arc<dyn Transport>,
    options: ClientOptions,
    shared: Arc<Shared>,
    session_id: Mutex<Option<Uuid>>,
    connection: Mutex<Option<Connection>>,
    closed: CancellationToken,
}

impl StreamingClient {
    /// Client with default options
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_options(transport, ClientOptions::default())
    }

    /// Client with custom options
    #[must_use]
    pub fn with_options(transport: Arc<dyn Transport>, options: ClientOptions) -> Self {
        let (state, _) = watch::channel(ClientState::Idle);
        let shared = Arc::new(Shared {
            queue: Mutex::new(EventQueue::new(options.queue_capacity, options.batch_size)),
            reporter: Mutex::new(OverflowReporter::new(options.overflow_report_interval)),
            listeners: Mutex::new(ListenerRegistry::new()),
            callbacks: Mutex::new(Callbacks::default()),
            last_sequence: Mutex::new(None),
            state,
            closed: AtomicBool::new(false),
        });
        Self {
            transport,
            options,
            shared,
            session_id: Mutex::new(None),
            connection: Mutex::new(None),
            closed: CancellationToken::new(),
        }
    }

    /// Listen to one event kind
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.shared.listeners.lock().on(kind, listener)
    }

    /// Listen to every event
    pub fn on_any<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.shared.listeners.lock().on_any(listener)
    }

    /// Remove a listener
    pub fn off(&self, id: ListenerId) -> bool {
        self.shared.listeners.lock().off(id)
    }

    /// Called each time a connection opens
    pub fn on_open<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.callbacks.lock().on_open = Some(Arc::new(callback));
    }

    /// Called once reconnecting stops for good
    pub fn on_give_up<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.shared.callbacks.lock().on_give_up = Some(Arc::new(callback));
    }

    /// Called with the running total of events dropped by the queue.
    ///
    /// Reports are rate limited; the last one always carries the final total.
    pub fn on_overflow<F>(&self, callback: F)
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.shared.callbacks.lock().on_overflow = Some(Arc::new(callback));
    }

    /// Start streaming a session from the beginning of its buffer
    pub fn connect(&self, session_id: Uuid) {
        self.connect_from(session_id, None);
    }

    /// Start streaming a session after `last_sequence`
    pub fn connect_from(&self, session_id: Uuid, last_sequence: Option<u64>) {
        if self.shared.closed.load(Ordering::SeqCst) {
            warn!(%session_id, "Client is closed; ignoring connect");
            return;
        }
        *self.session_id.lock() = Some(session_id);
        *self.shared.last_sequence.lock() = last_sequence;
        self.start(session_id);
    }

    /// Restart the connection loop after the client gave up.
    ///
    /// Returns `false` unless the client is in [`ClientState::GaveUp`].
    pub fn retry(&self) -> bool {
        if !matches!(self.state(), ClientState::GaveUp { .. }) {
            return false;
        }
        let Some(session_id) = *self.session_id.lock() else {
            return false;
        };
        info!(%session_id, "Retrying stream");
        self.start(session_id);
        true
    }

    fn start(&self, session_id: Uuid) {
        let cancel = self.closed.child_token();
        let task = tokio::spawn(run(
            Arc::clone(&self.transport),
            Arc::clone(&self.shared),
            self.options.backoff.clone(),
            self.options.idle_timeout,
            session_id,
            cancel.clone(),
        ));
        if let Some(previous) = self.connection.lock().replace(Connection { cancel, task }) {
            previous.cancel.cancel();
            previous.task.abort();
        }
    }

    /// Stop reconnecting and drop queued events and listeners.
    ///
    /// Takes effect immediately: no reconnect is attempted and no further
    /// listener call starts after this returns, even from a drain loop
    /// running on another thread.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.closed.cancel();
        if let Some(connection) = self.connection.lock().take() {
            connection.task.abort();
        }
        self.shared.queue.lock().clear();
        self.shared.listeners.lock().clear();
        self.shared.set_state(ClientState::Closed);
        debug!("Client closed");
    }

    /// Dispatch one bounded batch of queued events; returns how many ran
    pub fn tick(&self) -> usize {
        self.shared.tick()
    }

    /// Drive [`tick`](Self::tick) on a tokio interval until the client closes
    pub fn spawn_drain_loop(&self) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let closed = self.closed.clone();
        let period = self.options.drain_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = closed.cancelled() => break,
                    _ = interval.tick() => {
                        shared.tick();
                    }
                }
            }
        })
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ClientState {
        self.shared.state.borrow().clone()
    }

    /// Observe state changes
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ClientState> {
        self.shared.state.subscribe()
    }

    /// Highest `output` sequence received
    #[must_use]
    pub fn last_sequence(&self) -> Option<u64> {
        *self.shared.last_sequence.lock()
    }

    /// Events waiting for the next tick
    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Events dropped by the queue since creation
    #[must_use]
    pub fn dropped_total(&self) -> u64 {
        self.shared.queue.lock().dropped_total()
    }
}

impl Drop for StreamingClient {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

impl std::fmt::Debug for StreamingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingClient")
            .field("state", &self.state())
            .field("last_sequence", &self.last_sequence())
            .field("queued", &self.queued())
            .finish()
    }
}

/// Next item of `stream`, or `Err(limit)` once it has been silent that long
async fn next_within(
    stream: &mut EventStream,
    idle_timeout: Option<Duration>,
) -> Result<Option<crate::Result<StreamEvent>>, Duration> {
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, stream.next())
            .await
            .map_err(|_| limit),
        None => Ok(stream.next().await),
    }
}

async fn pump(
    shared: &Shared,
    stream: &mut EventStream,
    idle_timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Pumped {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Pumped::Cancelled,
            next = next_within(stream, idle_timeout) => next,
        };
        match next {
            Ok(Some(Ok(event))) => {
                if shared.accept(event) {
                    return Pumped::Terminal;
                }
            }
            Ok(Some(Err(ClientError::Protocol(e)))) => {
                warn!(error = %e, "Skipping malformed frame");
            }
            Ok(Some(Err(e))) => return Pumped::Failed(e),
            Ok(None) => {
                return Pumped::Failed(ClientError::Transport(
                    "stream closed by server".to_string(),
                ))
            }
            Err(limit) => {
                return Pumped::Failed(ClientError::Transport(format!(
                    "no events for {}s",
                    limit.as_secs()
                )))
            }
        }
    }
}

async fn run(
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    backoff: BackoffPolicy,
    idle_timeout: Option<Duration>,
    session_id: Uuid,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;
    loop {
        shared.set_state(ClientState::Connecting);
        let last_sequence = *shared.last_sequence.lock();
        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            result = transport.connect(session_id, last_sequence) => result,
        };

        let failure = match connected {
            Ok(mut stream) => {
                attempt = 0;
                shared.set_state(ClientState::Open);
                info!(%session_id, ?last_sequence, "Stream open");
                shared.fire_open();
                match pump(&shared, &mut stream, idle_timeout, &cancel).await {
                    Pumped::Terminal => {
                        info!(%session_id, "Stream ended");
                        shared.set_state(ClientState::Closed);
                        return;
                    }
                    Pumped::Cancelled => return,
                    Pumped::Failed(e) => e,
                }
            }
            Err(e) => e,
        };

        if failure.is_fatal() {
            shared.give_up(failure.to_string());
            return;
        }

        attempt += 1;
        if attempt > backoff.max_attempts {
            shared.give_up(format!(
                "gave up after {} attempts: {failure}",
                backoff.max_attempts
            ));
            return;
        }

        let delay = backoff.delay(attempt - 1);
        warn!(
            %session_id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %failure,
            "Stream disconnected, reconnecting"
        );
        shared.set_state(ClientState::Backoff { attempt });
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
