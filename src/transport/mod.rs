//! The session collaborator contract.
//!
//! A [`Connector`] turns [`SessionParams`] into a live [`Session`] plus a
//! stream of [`SessionEvent`]s. Everything above this module only ever talks
//! to those traits, so the supervisor can run against the TCP line transport
//! in production and the loopback transport in tests.

mod error;
pub mod line;
pub mod loopback;

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

pub use error::{ConnectError, TransportError};

/// A block coordinate in the world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Control inputs the client can hold down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Input {
    Jump,
    Sneak,
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Jump => write!(f, "jump"),
            Input::Sneak => write!(f, "sneak"),
        }
    }
}

/// Asynchronous notifications coming out of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The player entered the world.
    Spawned,
    /// A text message from the server (chat, system broadcast, plugin reply).
    Message(String),
    /// The navigation goal was reached.
    GoalReached { position: Option<Position> },
    /// The player died and was respawned.
    Died { position: Option<Position> },
    /// The server kicked us.
    Kicked { reason: String },
    /// The transport hit an error; the session may or may not survive it.
    Errored(TransportError),
    /// The session is gone. Emitted exactly once per session.
    Ended { reason: String },
}

/// Everything needed to open one session.
#[derive(Clone)]
pub struct SessionParams {
    pub username: String,
    pub password: Option<String>,
    pub host: String,
    pub port: u16,
    pub version: String,
}

impl fmt::Debug for SessionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionParams")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("version", &self.version)
            .finish()
    }
}

impl SessionParams {
    /// Format the address as `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject parameters no server would accept, before touching the network.
    pub fn validate(&self) -> Result<(), ConnectError> {
        if self.username.is_empty() {
            return Err(ConnectError::malformed("username", "must not be empty"));
        }
        if self.username.chars().any(char::is_whitespace) {
            return Err(ConnectError::malformed(
                "username",
                "must not contain whitespace",
            ));
        }
        if self.host.trim().is_empty() {
            return Err(ConnectError::malformed("host", "must not be empty"));
        }
        if self.port == 0 {
            return Err(ConnectError::malformed("port", "must be non-zero"));
        }
        if self.version.trim().is_empty() {
            return Err(ConnectError::malformed("version", "must not be empty"));
        }
        Ok(())
    }
}

/// One live connection. All calls are fire-and-forget.
pub trait Session: Send + Sync {
    /// Send a chat-style command string, e.g. `/login hunter2`.
    fn send_command(&self, text: &str);

    /// Start navigating towards a coordinate; completion arrives as [`SessionEvent::GoalReached`].
    fn seek_goal(&self, goal: Position);

    /// Press or release a control input.
    fn set_input_state(&self, input: Input, pressed: bool);

    /// Force the session closed. The transport answers with [`SessionEvent::Ended`].
    fn end(&self);
}

/// A freshly created session and the receiving end of its event stream.
pub struct SessionHandle {
    pub session: Arc<dyn Session>,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
}

/// Creates sessions. Must be called from within a tokio runtime.
pub trait Connector: Send + Sync {
    fn create_session(&self, params: &SessionParams) -> Result<SessionHandle, ConnectError>;
}
