// client-core/src/messaging/client.rs
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::MessagingConfig;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::frame::{Command, Frame};
use super::transport::{LinkSink, LinkStream, Transport, WireMessage, WsTransport};
use crate::error::MessagingError;

/// Connection lifecycle of the broker channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Exponential backoff policy for reconnects
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Delay before the given 1-based attempt: `base × 2^(attempt-1)`.
    /// `None` once the attempt cap is exceeded.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        Some(self.base_delay * 2u32.pow(attempt - 1))
    }
}

/// One inbound message for a topic handler. `json` is the parsed body when
/// it is valid JSON; `raw` always carries the body so a parse failure
/// degrades instead of dropping data.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub topic: String,
    pub json: Option<serde_json::Value>,
    pub raw: String,
}

pub type MessageHandler = Arc<dyn Fn(Delivery) + Send + Sync>;

/// Handle for one topic subscription. A handle issued while the client was
/// not connected is dead: it names no live subscription and unsubscribing it
/// is a no-op.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: Uuid,
    topic: String,
    live: bool,
}

impl SubscriptionHandle {
    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

struct Subscription {
    topic: String,
    handler: MessageHandler,
}

/// Reconnecting, topic-addressed client over the broker channel.
///
/// State machine: `Disconnected → Connecting → Connected`; an abnormal close
/// drops back to `Disconnected` and schedules a reconnect with exponential
/// backoff up to the attempt cap; a deliberate `disconnect` never reconnects.
/// Handlers fire in arrival order from a single reader task.
pub struct MessagingClient {
    inner: Arc<Inner>,
}

struct Inner {
    url: String,
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    heartbeat_interval: Duration,
    state: watch::Sender<ConnectionState>,
    subscriptions: DashMap<Uuid, Subscription>,
    outbound: Mutex<Option<mpsc::UnboundedSender<WireMessage>>>,
    attempts: AtomicU32,
    deliberate: AtomicBool,
    exhausted: AtomicBool,
    /// Monotonic link generation; stale link tasks lose the close race
    generation: AtomicU64,
    last_inbound: Mutex<Instant>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
    link_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MessagingClient {
    pub fn new(
        url: impl Into<String>,
        transport: Arc<dyn Transport>,
        policy: ReconnectPolicy,
        heartbeat_interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                transport,
                policy,
                heartbeat_interval,
                state,
                subscriptions: DashMap::new(),
                outbound: Mutex::new(None),
                attempts: AtomicU32::new(0),
                deliberate: AtomicBool::new(false),
                exhausted: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                last_inbound: Mutex::new(Instant::now()),
                reconnect_task: Mutex::new(None),
                link_tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Websocket client wired from configuration
    pub fn from_config(config: &MessagingConfig) -> Self {
        Self::new(
            config.broker_url.clone(),
            Arc::new(WsTransport),
            ReconnectPolicy {
                base_delay: Duration::from_millis(config.reconnect_base_delay_ms),
                max_attempts: config.max_reconnect_attempts,
            },
            Duration::from_secs(config.heartbeat_interval_secs),
        )
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Observe connection state transitions
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Whether the reconnect attempt cap was reached with no connection
    pub fn is_exhausted(&self) -> bool {
        self.inner.exhausted.load(Ordering::SeqCst)
    }

    /// Open the channel. Idempotent: a no-op while connecting or connected.
    /// Resolves only once the broker acknowledged the connection; a
    /// transport failure is returned to the caller and a reconnect is
    /// scheduled.
    pub async fn connect(&self) -> Result<(), MessagingError> {
        if self.state() != ConnectionState::Disconnected {
            return Ok(());
        }
        self.inner.deliberate.store(false, Ordering::SeqCst);
        self.inner.exhausted.store(false, Ordering::SeqCst);
        self.inner.attempts.store(0, Ordering::SeqCst);
        Inner::run_connect(self.inner.clone()).await
    }

    /// Unsubscribe every topic and deactivate the transport. Always lands in
    /// `Disconnected`, observable on the state feed, and cancels any pending
    /// reconnect.
    pub fn disconnect(&self) {
        let inner = &self.inner;
        inner.deliberate.store(true, Ordering::SeqCst);

        if let Some(pending) = inner.reconnect_task.lock().take() {
            pending.abort();
        }

        let outbound = inner.outbound.lock().take();
        if let Some(tx) = outbound {
            for entry in inner.subscriptions.iter() {
                let _ = tx.send(WireMessage::Frame(Frame::unsubscribe(
                    &entry.key().to_string(),
                )));
            }
            let _ = tx.send(WireMessage::Frame(Frame::disconnect()));
            let _ = tx.send(WireMessage::Close);
            // Dropping the sender ends the writer task after the flush
        }
        inner.subscriptions.clear();

        let _ = inner.state.send_replace(ConnectionState::Disconnected);
        tracing::info!("Messaging client disconnected");
    }

    /// Register a handler for a topic. Requires `Connected`: while
    /// disconnected this warns and returns a dead handle instead of queuing,
    /// and never panics. Callers subscribe after observing the connected
    /// state.
    pub fn subscribe(&self, topic: &str, handler: MessageHandler) -> SubscriptionHandle {
        if self.state() != ConnectionState::Connected {
            tracing::warn!(
                "subscribe to {} ignored: client is not connected",
                topic
            );
            return SubscriptionHandle {
                id: Uuid::new_v4(),
                topic: topic.to_string(),
                live: false,
            };
        }

        // The link can close between the state check and registration; the
        // outbound slot is cleared first on close, so an empty slot means the
        // subscription would never reach the broker
        let tx = match self.inner.outbound.lock().clone() {
            Some(tx) => tx,
            None => {
                tracing::warn!(
                    "subscribe to {} ignored: link closed during registration",
                    topic
                );
                return SubscriptionHandle {
                    id: Uuid::new_v4(),
                    topic: topic.to_string(),
                    live: false,
                };
            }
        };

        let id = Uuid::new_v4();
        self.inner.subscriptions.insert(
            id,
            Subscription {
                topic: topic.to_string(),
                handler,
            },
        );
        let _ = tx.send(WireMessage::Frame(Frame::subscribe(&id.to_string(), topic)));
        tracing::debug!("Subscribed to {}", topic);
        SubscriptionHandle {
            id,
            topic: topic.to_string(),
            live: true,
        }
    }

    /// Remove one subscription; a no-op for dead or unknown handles
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        if !handle.live {
            return;
        }
        if self.inner.subscriptions.remove(&handle.id).is_some() {
            if let Some(tx) = self.inner.outbound.lock().clone() {
                let _ = tx.send(WireMessage::Frame(Frame::unsubscribe(
                    &handle.id.to_string(),
                )));
            }
            tracing::debug!("Unsubscribed from {}", handle.topic);
        }
    }

    /// Publish a payload to a destination. Unlike `subscribe`, failing while
    /// not connected is loud: a silently dropped outbound message is a
    /// correctness problem.
    pub fn send<T: Serialize>(&self, destination: &str, payload: &T) -> Result<(), MessagingError> {
        if self.state() != ConnectionState::Connected {
            return Err(MessagingError::NotConnected);
        }
        let body = serde_json::to_string(payload)?;
        let tx = self
            .inner
            .outbound
            .lock()
            .clone()
            .ok_or(MessagingError::NotConnected)?;
        tx.send(WireMessage::Frame(Frame::send(destination, body)))
            .map_err(|_| MessagingError::NotConnected)
    }

    /// Active subscription count, mainly for diagnostics
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.len()
    }
}

impl Drop for MessagingClient {
    fn drop(&mut self) {
        if let Some(pending) = self.inner.reconnect_task.lock().take() {
            pending.abort();
        }
        for task in self.inner.link_tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Inner {
    /// One connection attempt: open the transport, run the handshake, then
    /// wire up the writer, reader and heartbeat tasks.
    async fn run_connect(inner: Arc<Inner>) -> Result<(), MessagingError> {
        let _ = inner.state.send_replace(ConnectionState::Connecting);
        tracing::info!("Connecting to broker at {}", inner.url);

        let (mut sink, mut stream) = match inner.transport.connect(&inner.url).await {
            Ok(link) => link,
            Err(e) => return Inner::fail_attempt(&inner, e),
        };

        // Connection establishment is a round trip: resolve only on the
        // broker's CONNECTED frame, not on socket open
        let heartbeat_ms = inner.heartbeat_interval.as_millis() as u64;
        if let Err(e) = sink
            .send(WireMessage::Frame(Frame::connect(heartbeat_ms)))
            .await
        {
            return Inner::fail_attempt(&inner, e);
        }
        loop {
            match stream.next().await {
                Some(Ok(WireMessage::Frame(frame))) => match frame.command {
                    Command::Connected => break,
                    Command::Error => {
                        return Inner::fail_attempt(
                            &inner,
                            MessagingError::HandshakeFailed(frame.body),
                        );
                    }
                    _ => continue,
                },
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Inner::fail_attempt(&inner, e),
                None => {
                    return Inner::fail_attempt(
                        &inner,
                        MessagingError::Transport("link closed during handshake".to_string()),
                    );
                }
            }
        }

        if inner.deliberate.load(Ordering::SeqCst) {
            // disconnect() raced the handshake; honor it
            let _ = inner.state.send_replace(ConnectionState::Disconnected);
            return Ok(());
        }

        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        *inner.outbound.lock() = Some(tx.clone());
        *inner.last_inbound.lock() = Instant::now();
        inner.attempts.store(0, Ordering::SeqCst);
        let _ = inner.state.send_replace(ConnectionState::Connected);
        tracing::info!("Broker acknowledged connection");

        let mut tasks = inner.link_tasks.lock();
        tasks.push(tokio::spawn(Inner::writer(sink, rx, inner.clone(), generation)));
        tasks.push(tokio::spawn(Inner::reader(stream, inner.clone(), generation)));
        tasks.push(tokio::spawn(Inner::heartbeat(tx, inner.clone(), generation)));
        drop(tasks);

        Ok(())
    }

    /// Attempt failed before establishment: surface the error and schedule a
    /// retry
    fn fail_attempt(inner: &Arc<Inner>, error: MessagingError) -> Result<(), MessagingError> {
        tracing::error!("Broker connection attempt failed: {}", error);
        let _ = inner.state.send_replace(ConnectionState::Disconnected);
        if !inner.deliberate.load(Ordering::SeqCst) {
            Inner::schedule_reconnect(inner);
        }
        Err(error)
    }

    fn schedule_reconnect(inner: &Arc<Inner>) {
        let attempt = inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        match inner.policy.delay_for(attempt) {
            Some(delay) => {
                tracing::info!("Scheduling reconnect attempt {} in {:?}", attempt, delay);
                let task_inner = inner.clone();
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if task_inner.deliberate.load(Ordering::SeqCst) {
                        return;
                    }
                    let _ = Inner::run_connect(task_inner.clone()).await;
                });
                *inner.reconnect_task.lock() = Some(handle);
            }
            None => {
                tracing::error!(
                    "Giving up on broker after {} reconnect attempts",
                    inner.policy.max_attempts
                );
                inner.exhausted.store(true, Ordering::SeqCst);
            }
        }
    }

    /// The link died or was closed. The generation claim makes sure exactly
    /// one of the link tasks performs the transition.
    fn on_link_closed(inner: &Arc<Inner>, generation: u64) {
        if inner
            .generation
            .compare_exchange(generation, generation + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        *inner.outbound.lock() = None;
        inner.subscriptions.clear();
        let _ = inner.state.send_replace(ConnectionState::Disconnected);

        if inner.deliberate.load(Ordering::SeqCst) {
            tracing::info!("Broker link closed");
        } else {
            tracing::warn!("Broker link lost");
            Inner::schedule_reconnect(inner);
        }

        for task in inner.link_tasks.lock().drain(..) {
            task.abort();
        }
    }

    async fn writer(
        mut sink: Box<dyn LinkSink>,
        mut rx: mpsc::UnboundedReceiver<WireMessage>,
        inner: Arc<Inner>,
        generation: u64,
    ) {
        while let Some(msg) = rx.recv().await {
            let is_close = matches!(msg, WireMessage::Close);
            if let Err(e) = sink.send(msg).await {
                tracing::error!("Failed to write to broker link: {}", e);
                break;
            }
            // The close frame is the last thing on this link; the heartbeat
            // holds a sender clone, so recv() alone would never end
            if is_close {
                break;
            }
        }
        Inner::on_link_closed(&inner, generation);
    }

    async fn reader(mut stream: Box<dyn LinkStream>, inner: Arc<Inner>, generation: u64) {
        loop {
            match stream.next().await {
                Some(Ok(WireMessage::Frame(frame))) => {
                    *inner.last_inbound.lock() = Instant::now();
                    inner.dispatch(frame);
                }
                Some(Ok(WireMessage::Ping)) => {
                    *inner.last_inbound.lock() = Instant::now();
                    if let Some(tx) = inner.outbound.lock().clone() {
                        let _ = tx.send(WireMessage::Pong);
                    }
                }
                Some(Ok(WireMessage::Pong)) => {
                    *inner.last_inbound.lock() = Instant::now();
                }
                Some(Ok(WireMessage::Close)) => {
                    tracing::info!("Broker closed the link");
                    break;
                }
                Some(Err(e)) => {
                    tracing::error!("Broker link error: {}", e);
                    break;
                }
                None => break,
            }
        }
        Inner::on_link_closed(&inner, generation);
    }

    /// Keepalive in both directions: ping on every tick, and treat a link
    /// with nothing inbound for two intervals as dead rather than hanging
    async fn heartbeat(
        tx: mpsc::UnboundedSender<WireMessage>,
        inner: Arc<Inner>,
        generation: u64,
    ) {
        let mut ticker = tokio::time::interval(inner.heartbeat_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let silent_for = inner.last_inbound.lock().elapsed();
            if silent_for > inner.heartbeat_interval * 2 {
                tracing::warn!(
                    "No broker traffic for {:?}, treating link as dead",
                    silent_for
                );
                break;
            }
            if tx.send(WireMessage::Ping).is_err() {
                break;
            }
        }
        Inner::on_link_closed(&inner, generation);
    }

    /// Route an inbound frame to its topic handler, in arrival order
    fn dispatch(&self, frame: Frame) {
        match frame.command {
            Command::Message => {
                // Prefer the subscription id; fall back to destination match
                let handler = frame
                    .get_header("subscription")
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .and_then(|id| {
                        self.subscriptions
                            .get(&id)
                            .map(|s| (s.topic.clone(), s.handler.clone()))
                    })
                    .or_else(|| {
                        frame.get_header("destination").and_then(|d| {
                            self.subscriptions
                                .iter()
                                .find(|e| e.topic == d)
                                .map(|e| (e.topic.clone(), e.handler.clone()))
                        })
                    });

                match handler {
                    Some((topic, handler)) => {
                        // Deliver the raw body when it is not valid JSON
                        let json = serde_json::from_str(&frame.body).ok();
                        handler(Delivery {
                            topic,
                            json,
                            raw: frame.body,
                        });
                    }
                    None => {
                        tracing::debug!(
                            "Dropping message with no subscriber: {:?}",
                            frame.get_header("destination")
                        );
                    }
                }
            }
            Command::Error => {
                tracing::error!("Broker error frame: {}", frame.body);
            }
            other => {
                tracing::debug!("Ignoring unexpected {:?} frame", other);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delays_double_per_attempt() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_millis(100),
            max_attempts: 4,
        };
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay_for(4), Some(Duration::from_millis(800)));
        assert_eq!(policy.delay_for(5), None);
    }

    #[test]
    fn test_backoff_rejects_zeroth_attempt() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_millis(100),
            max_attempts: 4,
        };
        assert_eq!(policy.delay_for(0), None);
    }

    struct NeverTransport;

    #[async_trait::async_trait]
    impl Transport for NeverTransport {
        async fn connect(
            &self,
            _url: &str,
        ) -> Result<(Box<dyn LinkSink>, Box<dyn LinkStream>), MessagingError> {
            Err(MessagingError::Transport("unused".to_string()))
        }
    }

    #[test]
    fn test_subscribe_without_outbound_link_yields_dead_handle() {
        let client = MessagingClient::new(
            "ws://test/ws",
            Arc::new(NeverTransport),
            ReconnectPolicy {
                base_delay: Duration::from_millis(10),
                max_attempts: 1,
            },
            Duration::from_secs(60),
        );

        // Connected state with an empty outbound slot models the link
        // closing between the caller's state check and registration
        let _ = client.inner.state.send_replace(ConnectionState::Connected);

        let handle = client.subscribe("/topic/posts", Arc::new(|_| {}));
        assert!(!handle.is_live());
        assert_eq!(client.subscription_count(), 0);
    }
}
