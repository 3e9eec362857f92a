// client-core/src/messaging/mod.rs

pub mod client;
pub mod frame;
pub mod transport;

pub use client::{
    ConnectionState, Delivery, MessageHandler, MessagingClient, ReconnectPolicy,
    SubscriptionHandle,
};
pub use frame::{Command, Frame};
pub use transport::{LinkSink, LinkStream, Transport, WireMessage, WsTransport};
