// client-core/tests/support/mod.rs
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use client_core::messaging::{Command, Frame};
use client_core::messaging::{LinkSink, LinkStream, Transport, WireMessage};
use client_core::{ApiError, Clock, CommentApi, MessagingError};
use common::models::{Comment, NewComment, User};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Build an unsigned three-segment token with the given payload
pub fn make_token(payload: &Value) -> String {
    let encode = |v: &Value| base64::encode_config(v.to_string(), base64::URL_SAFE_NO_PAD);
    let header = serde_json::json!({"alg": "HS256", "typ": "JWT"});
    format!("{}.{}.signature", encode(&header), encode(payload))
}

/// Token expiring `secs_from_now` seconds from now (negative for the past)
pub fn token_expiring_in(secs_from_now: i64) -> String {
    make_token(&serde_json::json!({
        "sub": "ada",
        "exp": Utc::now().timestamp() + secs_from_now,
    }))
}

pub fn test_user() -> User {
    User {
        id: Uuid::new_v4(),
        username: "ada".to_string(),
        display_name: "Ada".to_string(),
        email: "ada@example.com".to_string(),
        roles: vec!["USER".to_string()],
        avatar_url: None,
    }
}

/// Clock frozen at a settable instant
pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
}

impl FakeClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Comment endpoint double that counts calls and can be made to fail
pub struct CountingCommentApi {
    pub calls: AtomicU32,
    pub fail: AtomicBool,
}

impl CountingCommentApi {
    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn failing() -> Self {
        let api = Self::new();
        api.fail.store(true, Ordering::SeqCst);
        api
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommentApi for CountingCommentApi {
    async fn create_comment(
        &self,
        post_id: &Uuid,
        comment: &NewComment,
    ) -> Result<Comment, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::Transport("connection reset".to_string()));
        }
        Ok(Comment {
            id: Uuid::new_v4(),
            post_id: *post_id,
            author: "ada".to_string(),
            content: comment.content.clone(),
            parent_comment_id: comment.parent_comment_id,
            created_at: Utc::now(),
        })
    }
}

/// Authentication endpoint double issuing a fixed user/token pair
pub struct FakeAuthApi {
    pub user: User,
    pub token: String,
    pub fail: AtomicBool,
}

impl FakeAuthApi {
    pub fn issuing(user: User, token: String) -> Self {
        Self {
            user,
            token,
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl client_core::AuthApi for FakeAuthApi {
    async fn login(
        &self,
        _credentials: &client_core::LoginRequest,
    ) -> Result<client_core::AuthResponse, ApiError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::unauthorized());
        }
        Ok(client_core::AuthResponse {
            user: self.user.clone(),
            access_token: self.token.clone(),
        })
    }

    async fn logout(&self) -> Result<(), ApiError> {
        Ok(())
    }

    async fn current_user(&self) -> Result<User, ApiError> {
        Ok(self.user.clone())
    }
}

type InboundTx = mpsc::UnboundedSender<Result<WireMessage, MessagingError>>;

struct BrokerState {
    connects: AtomicU32,
    pings: AtomicU32,
    sent: Mutex<Vec<Frame>>,
    slot: Mutex<Option<InboundTx>>,
}

/// In-memory broker double. Acknowledges CONNECT with CONNECTED, records
/// every frame the client writes, and lets tests inject messages or kill the
/// link.
#[derive(Clone)]
pub struct FakeBroker {
    state: Arc<BrokerState>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(BrokerState {
                connects: AtomicU32::new(0),
                pings: AtomicU32::new(0),
                sent: Mutex::new(Vec::new()),
                slot: Mutex::new(None),
            }),
        }
    }

    pub fn connect_count(&self) -> u32 {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Keepalive pings the client has written so far
    pub fn ping_count(&self) -> u32 {
        self.state.pings.load(Ordering::SeqCst)
    }

    pub fn sent_frames(&self) -> Vec<Frame> {
        self.state.sent.lock().clone()
    }

    /// Subscription id the client registered for a topic, once the
    /// SUBSCRIBE frame arrived
    pub fn subscription_id_for(&self, topic: &str) -> Option<String> {
        self.sent_frames().iter().rev().find_map(|f| {
            (f.command == Command::Subscribe && f.get_header("destination") == Some(topic))
                .then(|| f.get_header("id").map(String::from))
                .flatten()
        })
    }

    /// Push a MESSAGE frame to the client
    pub fn deliver(&self, subscription_id: &str, topic: &str, body: &str) {
        let frame = Frame::new(Command::Message)
            .header("subscription", subscription_id)
            .header("destination", topic)
            .with_body(body);
        if let Some(tx) = self.state.slot.lock().as_ref() {
            let _ = tx.send(Ok(WireMessage::Frame(frame)));
        }
    }

    /// Kill the link abruptly, as an abnormal close
    pub fn drop_link(&self) {
        self.state.slot.lock().take();
    }
}

#[async_trait]
impl Transport for FakeBroker {
    async fn connect(
        &self,
        _url: &str,
    ) -> Result<(Box<dyn LinkSink>, Box<dyn LinkStream>), MessagingError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        *self.state.slot.lock() = Some(tx);
        Ok((
            Box::new(FakeSink {
                state: self.state.clone(),
            }),
            Box::new(FakeStream { rx }),
        ))
    }
}

struct FakeSink {
    state: Arc<BrokerState>,
}

#[async_trait]
impl LinkSink for FakeSink {
    async fn send(&mut self, msg: WireMessage) -> Result<(), MessagingError> {
        match msg {
            WireMessage::Frame(frame) => {
                let is_connect = frame.command == Command::Connect;
                self.state.sent.lock().push(frame);
                if is_connect {
                    if let Some(tx) = self.state.slot.lock().as_ref() {
                        let _ = tx.send(Ok(WireMessage::Frame(Frame::new(Command::Connected))));
                    }
                }
            }
            WireMessage::Ping => {
                self.state.pings.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
        Ok(())
    }
}

struct FakeStream {
    rx: mpsc::UnboundedReceiver<Result<WireMessage, MessagingError>>,
}

#[async_trait]
impl LinkStream for FakeStream {
    async fn next(&mut self) -> Option<Result<WireMessage, MessagingError>> {
        self.rx.recv().await
    }
}

/// Transport whose every attempt fails, for backoff tests
pub struct FailingTransport {
    pub attempts: AtomicU32,
}

impl FailingTransport {
    pub fn new() -> Self {
        Self {
            attempts: AtomicU32::new(0),
        }
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FailingTransport {
    async fn connect(
        &self,
        _url: &str,
    ) -> Result<(Box<dyn LinkSink>, Box<dyn LinkStream>), MessagingError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(MessagingError::Transport("connection refused".to_string()))
    }
}

/// Poll `predicate` until it holds or the timeout elapses
pub async fn wait_until(timeout: std::time::Duration, predicate: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    predicate()
}
