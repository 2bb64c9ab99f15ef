//! Line-oriented TCP transport.
//!
//! Every frame is one UTF-8 line. The client opens with
//! `login <username> <version>` and then sends `chat`, `goal`, `input` and
//! `quit` lines; the server answers with `spawn`, `chat`, `goal_reached`,
//! `death`, `kick` and `error` lines. Anything else from the server is
//! ignored, as are server lines longer than [`MAX_LINE_LEN`] bytes.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use super::{
    ConnectError, Connector, Input, Position, Session, SessionEvent, SessionHandle, SessionParams,
    TransportError,
};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest server line that is parsed. Longer lines are skipped whole.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Outgoing frames queued by [`LineSession`].
#[derive(Debug, Clone, PartialEq)]
enum Outgoing {
    Chat(String),
    Goal(Position),
    Input(Input, bool),
}

impl Outgoing {
    fn to_line(&self) -> String {
        match self {
            Outgoing::Chat(text) => format!("chat {}", text),
            Outgoing::Goal(p) => format!("goal {} {} {}", p.x, p.y, p.z),
            Outgoing::Input(input, pressed) => {
                format!("input {} {}", input, if *pressed { "on" } else { "off" })
            }
        }
    }
}

/// Opens sessions over plain TCP.
#[derive(Debug, Clone)]
pub struct LineConnector {
    connect_timeout: Duration,
}

impl LineConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for LineConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl Connector for LineConnector {
    fn create_session(&self, params: &SessionParams) -> Result<SessionHandle, ConnectError> {
        params.validate()?;

        let (event_tx, events) = mpsc::unbounded_channel();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = watch::channel(false);

        let link = Link {
            address: params.address(),
            hello: format!("login {} {}", params.username, params.version),
            connect_timeout: self.connect_timeout,
            outgoing: outgoing_rx,
            close: close_rx,
            events: event_tx,
        };
        tokio::spawn(link.drive());

        let session = LineSession {
            outgoing: outgoing_tx,
            close: close_tx,
        };

        Ok(SessionHandle {
            session: Arc::new(session),
            events,
        })
    }
}

/// Client-side handle; writes are queued to the connection task.
pub struct LineSession {
    outgoing: mpsc::UnboundedSender<Outgoing>,
    close: watch::Sender<bool>,
}

impl Session for LineSession {
    fn send_command(&self, text: &str) {
        let _ = self.outgoing.send(Outgoing::Chat(text.to_string()));
    }

    fn seek_goal(&self, goal: Position) {
        let _ = self.outgoing.send(Outgoing::Goal(goal));
    }

    fn set_input_state(&self, input: Input, pressed: bool) {
        let _ = self.outgoing.send(Outgoing::Input(input, pressed));
    }

    fn end(&self) {
        let _ = self.close.send(true);
    }
}

/// The connection task's half of a session.
struct Link {
    address: String,
    hello: String,
    connect_timeout: Duration,
    outgoing: mpsc::UnboundedReceiver<Outgoing>,
    close: watch::Receiver<bool>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Link {
    async fn drive(mut self) {
        let reason = match self.pump().await {
            Ok(reason) => reason,
            Err(err) => {
                let reason = err.to_string();
                let _ = self.events.send(SessionEvent::Errored(err.into()));
                reason
            }
        };

        info!(target: "net", address = %self.address, "Session closed: {}", reason);
        let _ = self.events.send(SessionEvent::Ended { reason });
    }

    async fn pump(&mut self) -> io::Result<String> {
        let stream = tokio::select! {
            result = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.address)) => {
                match result {
                    Ok(stream) => stream?,
                    Err(_) => {
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!("no answer from {} within {:?}", self.address, self.connect_timeout),
                        ));
                    }
                }
            }
            _ = self.close.changed() => return Ok("ended before connecting".to_string()),
        };
        debug!(target: "net", address = %self.address, "TCP connection established");

        let (read_half, mut write_half) = stream.into_split();
        let mut lines = LineReader::new(BufReader::new(read_half), MAX_LINE_LEN);
        write_line(&mut write_half, &self.hello).await?;

        // Queued frames go out before more input is read, and before a close
        // request is honoured
        loop {
            tokio::select! {
                biased;
                frame = self.outgoing.recv() => {
                    let Some(frame) = frame else {
                        return Ok("session dropped".to_string());
                    };
                    write_line(&mut write_half, &frame.to_line()).await?;
                }
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        return Ok("server closed the connection".to_string());
                    };
                    match parse_server_line(&line) {
                        Some(event) => {
                            let _ = self.events.send(event);
                        }
                        None => debug!(target: "net", "Ignoring server line: {}", line),
                    }
                }
                _ = self.close.changed() => {
                    let _ = write_line(&mut write_half, "quit").await;
                    let _ = write_half.shutdown().await;
                    return Ok("client requested disconnect".to_string());
                }
            }
        }
    }
}

/// Splits server input into lines of at most `max_len` bytes.
///
/// Oversized lines are dropped and invalid UTF-8 is replaced with U+FFFD, so
/// neither ends the session. `next_line` is cancel safe: a partial line stays
/// in `pending` until the rest of it arrives.
struct LineReader<R> {
    inner: R,
    pending: Vec<u8>,
    discarding: bool,
    max_len: usize,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    fn new(inner: R, max_len: usize) -> Self {
        Self {
            inner,
            pending: Vec::new(),
            discarding: false,
            max_len,
        }
    }

    /// Read the next line without its `\n`. Returns `None` at end of stream.
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                let skipped = std::mem::take(&mut self.discarding);
                if skipped || self.pending.is_empty() {
                    self.pending.clear();
                    return Ok(None);
                }
                return Ok(Some(self.take_line()));
            }

            let (chunk, used, complete) = match available.iter().position(|b| *b == b'\n') {
                Some(end) => (&available[..end], end + 1, true),
                None => (available, available.len(), false),
            };

            if !self.discarding {
                if self.pending.len() + chunk.len() > self.max_len {
                    debug!(target: "net", max_len = self.max_len, "Skipping oversized server line");
                    self.pending.clear();
                    self.discarding = true;
                } else {
                    self.pending.extend_from_slice(chunk);
                }
            }
            self.inner.consume(used);

            if complete && !std::mem::take(&mut self.discarding) {
                return Ok(Some(self.take_line()));
            }
        }
    }

    fn take_line(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        line
    }
}

async fn write_line(writer: &mut OwnedWriteHalf, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

fn parse_position(rest: &str) -> Option<Position> {
    let mut parts = rest.split_whitespace().map(str::parse::<f64>);
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(Ok(x)), Some(Ok(y)), Some(Ok(z)), None) => Some(Position::new(x, y, z)),
        _ => None,
    }
}

/// Map one server line to a session event.
pub(crate) fn parse_server_line(line: &str) -> Option<SessionEvent> {
    let line = line.trim_end_matches('\r');
    let (verb, rest) = match line.split_once(' ') {
        Some((verb, rest)) => (verb, rest),
        None => (line, ""),
    };

    match verb {
        "spawn" => Some(SessionEvent::Spawned),
        "chat" => Some(SessionEvent::Message(rest.to_string())),
        "goal_reached" => Some(SessionEvent::GoalReached {
            position: parse_position(rest),
        }),
        "death" => Some(SessionEvent::Died {
            position: parse_position(rest),
        }),
        "kick" => Some(SessionEvent::Kicked {
            reason: rest.to_string(),
        }),
        "error" => Some(SessionEvent::Errored(TransportError::Protocol(
            rest.to_string(),
        ))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server_lines() {
        assert_eq!(parse_server_line("spawn"), Some(SessionEvent::Spawned));
        assert_eq!(
            parse_server_line("chat Please /register <password> <password>\r"),
            Some(SessionEvent::Message(
                "Please /register <password> <password>".to_string()
            ))
        );
        assert_eq!(
            parse_server_line("goal_reached 1 64 -2"),
            Some(SessionEvent::GoalReached {
                position: Some(Position::new(1.0, 64.0, -2.0))
            })
        );
        assert_eq!(
            parse_server_line("death"),
            Some(SessionEvent::Died { position: None })
        );
        assert_eq!(
            parse_server_line("kick You have been idle for too long"),
            Some(SessionEvent::Kicked {
                reason: "You have been idle for too long".to_string()
            })
        );
        assert_eq!(
            parse_server_line("error Outdated client"),
            Some(SessionEvent::Errored(TransportError::Protocol(
                "Outdated client".to_string()
            )))
        );
        assert_eq!(parse_server_line("keepalive 42"), None);
    }

    #[test]
    fn test_malformed_position_is_dropped() {
        assert_eq!(
            parse_server_line("goal_reached 1 two 3"),
            Some(SessionEvent::GoalReached { position: None })
        );
    }

    async fn read_all(input: &[u8], capacity: usize, max_len: usize) -> Vec<String> {
        let mut reader = LineReader::new(BufReader::with_capacity(capacity, input), max_len);
        let mut lines = Vec::new();
        while let Some(line) = reader.next_line().await.unwrap() {
            lines.push(line);
        }
        lines
    }

    #[tokio::test]
    async fn test_reader_splits_lines() {
        let lines = read_all(b"spawn\nchat hi\r\n\nkick bye", 8192, 64).await;
        assert_eq!(lines, vec!["spawn", "chat hi\r", "", "kick bye"]);
    }

    #[tokio::test]
    async fn test_reader_skips_oversized_lines() {
        // a small buffer forces the long line to arrive in several pieces
        let input = b"chat 0123456789abcdef\n12345678\nspawn\nchat 0123456789";
        let lines = read_all(input, 4, 8).await;
        assert_eq!(lines, vec!["12345678", "spawn"]);
    }

    #[tokio::test]
    async fn test_reader_replaces_invalid_utf8() {
        let lines = read_all(b"chat caf\xff\nspawn\n", 8192, 64).await;
        assert_eq!(lines, vec!["chat caf\u{FFFD}", "spawn"]);
    }

    #[test]
    fn test_outgoing_lines() {
        assert_eq!(Outgoing::Chat("/login pw".to_string()).to_line(), "chat /login pw");
        assert_eq!(
            Outgoing::Goal(Position::new(0.0, 70.0, 5.0)).to_line(),
            "goal 0 70 5"
        );
        assert_eq!(Outgoing::Input(Input::Sneak, false).to_line(), "input sneak off");
    }

    #[tokio::test]
    async fn test_malformed_params_never_touch_network() {
        let connector = LineConnector::default();
        let params = SessionParams {
            username: String::new(),
            password: None,
            host: "127.0.0.1".to_string(),
            port: 1,
            version: "1.20.1".to_string(),
        };
        assert!(matches!(
            connector.create_session(&params),
            Err(ConnectError::Malformed { field: "username", .. })
        ));
    }
}
