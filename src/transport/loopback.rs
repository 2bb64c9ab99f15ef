//! In-process transport.
//!
//! [`LoopbackConnector`] hands every session it creates to a
//! [`LoopbackServer`], which plays the remote side: it injects lifecycle
//! events and inspects what the client sent. Used by the test suite and for
//! exercising the supervisor without a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use super::{
    ConnectError, Connector, Input, Position, Session, SessionEvent, SessionHandle, SessionParams,
    TransportError,
};

/// Something the client did to a loopback session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCall {
    Command(String),
    SeekGoal(Position),
    Input(Input, bool),
    End,
}

/// State shared between a session and its remote.
struct Wire {
    events: mpsc::UnboundedSender<SessionEvent>,
    calls: Mutex<Vec<SessionCall>>,
    ended: AtomicBool,
    end_on_request: bool,
}

impl Wire {
    fn record(&self, call: SessionCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn emit(&self, event: SessionEvent) {
        if self.ended.load(Ordering::SeqCst) {
            return;
        }
        if matches!(event, SessionEvent::Ended { .. }) {
            self.ended.store(true, Ordering::SeqCst);
        }
        let _ = self.events.send(event);
    }
}

struct LoopbackSession {
    wire: Arc<Wire>,
}

impl Session for LoopbackSession {
    fn send_command(&self, text: &str) {
        self.wire.record(SessionCall::Command(text.to_string()));
    }

    fn seek_goal(&self, goal: Position) {
        self.wire.record(SessionCall::SeekGoal(goal));
    }

    fn set_input_state(&self, input: Input, pressed: bool) {
        self.wire.record(SessionCall::Input(input, pressed));
    }

    fn end(&self) {
        self.wire.record(SessionCall::End);
        if self.wire.end_on_request {
            self.wire.emit(SessionEvent::Ended {
                reason: "client requested disconnect".to_string(),
            });
        }
    }
}

/// The remote side of one loopback session.
#[derive(Clone)]
pub struct LoopbackRemote {
    pub params: SessionParams,
    wire: Arc<Wire>,
}

impl LoopbackRemote {
    pub fn spawn(&self) {
        self.wire.emit(SessionEvent::Spawned);
    }

    pub fn say(&self, message: impl Into<String>) {
        self.wire.emit(SessionEvent::Message(message.into()));
    }

    pub fn goal_reached(&self, position: Option<Position>) {
        self.wire.emit(SessionEvent::GoalReached { position });
    }

    pub fn die(&self, position: Option<Position>) {
        self.wire.emit(SessionEvent::Died { position });
    }

    pub fn kick(&self, reason: impl Into<String>) {
        self.wire.emit(SessionEvent::Kicked {
            reason: reason.into(),
        });
    }

    pub fn fail(&self, error: TransportError) {
        self.wire.emit(SessionEvent::Errored(error));
    }

    /// Close the session from the server side.
    pub fn end(&self, reason: impl Into<String>) {
        self.wire.emit(SessionEvent::Ended {
            reason: reason.into(),
        });
    }

    pub fn is_ended(&self) -> bool {
        self.wire.ended.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.wire
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Return only the chat commands, in send order.
    pub fn commands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SessionCall::Command(text) => Some(text),
                _ => None,
            })
            .collect()
    }
}

struct ConnectorState {
    rejections: VecDeque<ConnectError>,
    end_on_request: bool,
}

/// Creates loopback sessions and forwards their remotes to a [`LoopbackServer`].
#[derive(Clone)]
pub struct LoopbackConnector {
    state: Arc<Mutex<ConnectorState>>,
    accepted: mpsc::UnboundedSender<LoopbackRemote>,
}

/// Receives the remote half of every session the connector creates.
pub struct LoopbackServer {
    accepted: mpsc::UnboundedReceiver<LoopbackRemote>,
}

impl LoopbackConnector {
    pub fn new() -> (Self, LoopbackServer) {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        let connector = Self {
            state: Arc::new(Mutex::new(ConnectorState {
                rejections: VecDeque::new(),
                end_on_request: true,
            })),
            accepted: accepted_tx,
        };
        (
            connector,
            LoopbackServer {
                accepted: accepted_rx,
            },
        )
    }

    /// Fail the next `create_session` call with `error`.
    pub fn reject_next(&self, error: ConnectError) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rejections
            .push_back(error);
    }

    /// When false, `Session::end` is recorded but no `Ended` event follows.
    pub fn set_end_on_request(&self, enabled: bool) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .end_on_request = enabled;
    }
}

impl Connector for LoopbackConnector {
    fn create_session(&self, params: &SessionParams) -> Result<SessionHandle, ConnectError> {
        params.validate()?;

        let end_on_request = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(error) = state.rejections.pop_front() {
                return Err(error);
            }
            state.end_on_request
        };

        let (events_tx, events) = mpsc::unbounded_channel();
        let wire = Arc::new(Wire {
            events: events_tx,
            calls: Mutex::new(Vec::new()),
            ended: AtomicBool::new(false),
            end_on_request,
        });

        let _ = self.accepted.send(LoopbackRemote {
            params: params.clone(),
            wire: wire.clone(),
        });

        Ok(SessionHandle {
            session: Arc::new(LoopbackSession { wire }),
            events,
        })
    }
}

impl LoopbackServer {
    /// Wait for the next session, or `None` once the connector is gone.
    pub async fn accept(&mut self) -> Option<LoopbackRemote> {
        self.accepted.recv().await
    }

    /// A session that was already created, without waiting.
    pub fn try_accept(&mut self) -> Option<LoopbackRemote> {
        self.accepted.try_recv().ok()
    }
}
