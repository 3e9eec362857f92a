// client-core/src/messaging/frame.rs
use crate::error::MessagingError;

/// STOMP-style commands used on the broker channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Message,
    Error,
    Disconnect,
}

impl Command {
    fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Send => "SEND",
            Command::Message => "MESSAGE",
            Command::Error => "ERROR",
            Command::Disconnect => "DISCONNECT",
        }
    }

    fn parse(s: &str) -> Result<Self, MessagingError> {
        match s {
            "CONNECT" => Ok(Command::Connect),
            "CONNECTED" => Ok(Command::Connected),
            "SUBSCRIBE" => Ok(Command::Subscribe),
            "UNSUBSCRIBE" => Ok(Command::Unsubscribe),
            "SEND" => Ok(Command::Send),
            "MESSAGE" => Ok(Command::Message),
            "ERROR" => Ok(Command::Error),
            "DISCONNECT" => Ok(Command::Disconnect),
            other => Err(MessagingError::Codec(format!(
                "unknown command `{}`",
                other
            ))),
        }
    }
}

/// One frame on the wire: command line, header lines, blank line, body,
/// NUL terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First header with the given name, if any
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Client handshake frame. `heartbeat_ms` is advertised in both
    /// directions.
    pub fn connect(heartbeat_ms: u64) -> Self {
        Frame::new(Command::Connect)
            .header("accept-version", "1.2")
            .header("heart-beat", &format!("{0},{0}", heartbeat_ms))
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).header("id", id)
    }

    pub fn send(destination: &str, body: String) -> Self {
        Frame::new(Command::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .with_body(body)
    }

    pub fn disconnect() -> Self {
        Frame::new(Command::Disconnect)
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            out.push_str(name);
            out.push(':');
            out.push_str(value);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    pub fn decode(raw: &str) -> Result<Self, MessagingError> {
        let raw = raw.strip_suffix('\0').unwrap_or(raw);
        let (head, body) = raw
            .split_once("\n\n")
            .ok_or_else(|| MessagingError::Codec("missing header terminator".to_string()))?;

        let mut lines = head.lines();
        let command_line = lines
            .next()
            .ok_or_else(|| MessagingError::Codec("empty frame".to_string()))?;
        let command = Command::parse(command_line.trim_end())?;

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| {
                MessagingError::Codec(format!("malformed header line `{}`", line))
            })?;
            headers.push((name.to_string(), value.to_string()));
        }

        Ok(Frame {
            command,
            headers,
            body: body.to_string(),
        })
    }
}
