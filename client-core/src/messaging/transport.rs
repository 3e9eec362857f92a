// client-core/src/messaging/transport.rs
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::protocol::Message as WsMessage;

use super::frame::Frame;
use crate::error::MessagingError;

/// One unit on the wire, transport-agnostic
#[derive(Debug)]
pub enum WireMessage {
    Frame(Frame),
    Ping,
    Pong,
    Close,
}

/// Outbound half of an established link
#[async_trait]
pub trait LinkSink: Send {
    async fn send(&mut self, msg: WireMessage) -> Result<(), MessagingError>;
}

/// Inbound half of an established link. `None` means the link is gone.
#[async_trait]
pub trait LinkStream: Send {
    async fn next(&mut self) -> Option<Result<WireMessage, MessagingError>>;
}

/// Minimal wire contract the messaging client needs. Keeps the backoff and
/// state-machine logic independent of the underlying protocol library.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Box<dyn LinkSink>, Box<dyn LinkStream>), MessagingError>;
}

/// Websocket transport over tokio-tungstenite
pub struct WsTransport;

type WsSplitSink = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    WsMessage,
>;
type WsSplitStream =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

struct WsSink {
    inner: WsSplitSink,
}

struct WsStream {
    inner: WsSplitStream,
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Box<dyn LinkSink>, Box<dyn LinkStream>), MessagingError> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| MessagingError::Transport(e.to_string()))?;
        let (sink, stream) = ws_stream.split();
        Ok((
            Box::new(WsSink { inner: sink }),
            Box::new(WsStream { inner: stream }),
        ))
    }
}

#[async_trait]
impl LinkSink for WsSink {
    async fn send(&mut self, msg: WireMessage) -> Result<(), MessagingError> {
        let ws_msg = match msg {
            WireMessage::Frame(frame) => WsMessage::Text(frame.encode()),
            WireMessage::Ping => WsMessage::Ping(Vec::new()),
            WireMessage::Pong => WsMessage::Pong(Vec::new()),
            WireMessage::Close => WsMessage::Close(None),
        };
        self.inner
            .send(ws_msg)
            .await
            .map_err(|e| MessagingError::Transport(e.to_string()))
    }
}

#[async_trait]
impl LinkStream for WsStream {
    async fn next(&mut self) -> Option<Result<WireMessage, MessagingError>> {
        loop {
            let msg = match self.inner.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(MessagingError::Transport(e.to_string()))),
            };
            return match msg {
                WsMessage::Text(text) => Some(Frame::decode(&text).map(WireMessage::Frame)),
                WsMessage::Ping(_) => Some(Ok(WireMessage::Ping)),
                WsMessage::Pong(_) => Some(Ok(WireMessage::Pong)),
                WsMessage::Close(_) => Some(Ok(WireMessage::Close)),
                WsMessage::Binary(_) | WsMessage::Frame(_) => {
                    // The broker speaks text frames; skip anything else
                    continue;
                }
            };
        }
    }
}
