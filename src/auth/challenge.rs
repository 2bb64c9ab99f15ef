use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

use super::inbox::Inbox;
use crate::activity::Reporter;
use crate::transport::Session;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("{challenge} rejected by server: {message}")]
    Rejected {
        challenge: &'static str,
        message: String,
    },

    #[error("no {challenge} reply within {timeout:?}")]
    Timeout {
        challenge: &'static str,
        timeout: Duration,
    },

    #[error("session closed before {challenge} completed")]
    SessionClosed { challenge: &'static str },
}

impl AuthError {
    pub fn challenge(&self) -> &'static str {
        match self {
            AuthError::Rejected { challenge, .. }
            | AuthError::Timeout { challenge, .. }
            | AuthError::SessionClosed { challenge } => challenge,
        }
    }
}

/// How a single server message relates to a pending challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected,
}

/// One command/response exchange over the chat stream.
#[derive(Clone)]
pub struct AuthChallenge {
    name: &'static str,
    command: String,
    success: Vec<String>,
    failure: Vec<String>,
    timeout: Duration,
}

impl std::fmt::Debug for AuthChallenge {
    // The command usually carries a password
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthChallenge")
            .field("name", &self.name)
            .field("success", &self.success)
            .field("failure", &self.failure)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl AuthChallenge {
    pub fn new(name: &'static str, command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name,
            command: command.into(),
            success: Vec::new(),
            failure: Vec::new(),
            timeout,
        }
    }

    pub fn with_success<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.success
            .extend(patterns.into_iter().map(|p| p.into().to_lowercase()));
        self
    }

    pub fn with_failure<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failure
            .extend(patterns.into_iter().map(|p| p.into().to_lowercase()));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Classify a message by case-insensitive substring match. Success patterns win ties.
    pub fn classify(&self, message: &str) -> Option<Verdict> {
        let message = message.to_lowercase();
        if self.success.iter().any(|p| message.contains(p.as_str())) {
            Some(Verdict::Accepted)
        } else if self.failure.iter().any(|p| message.contains(p.as_str())) {
            Some(Verdict::Rejected)
        } else {
            None
        }
    }

    /// Send the command and wait for a matching reply.
    ///
    /// The inbox slot is held for the whole exchange and released on every
    /// exit path, including cancellation of this future. The timeout starts
    /// when the command is sent, not while waiting for the slot.
    pub async fn run(
        &self,
        session: &dyn Session,
        inbox: &Inbox,
        report: &Reporter,
    ) -> Result<(), AuthError> {
        let mut observer = inbox
            .observe()
            .await
            .map_err(|_| AuthError::SessionClosed {
                challenge: self.name,
            })?;

        session.send_command(&self.command);
        report.info(format!("[{}] command sent", self.name));

        let deadline = Instant::now() + self.timeout;
        loop {
            let message = match tokio::time::timeout_at(deadline, observer.recv()).await {
                Err(_) => {
                    return Err(AuthError::Timeout {
                        challenge: self.name,
                        timeout: self.timeout,
                    })
                }
                Ok(None) => {
                    return Err(AuthError::SessionClosed {
                        challenge: self.name,
                    })
                }
                Ok(Some(message)) => message,
            };

            report.info(format!("[{}] {}", self.name, message));

            match self.classify(&message) {
                Some(Verdict::Accepted) => return Ok(()),
                Some(Verdict::Rejected) => {
                    return Err(AuthError::Rejected {
                        challenge: self.name,
                        message,
                    })
                }
                None => debug!(target: "auth", challenge = self.name, "Unrelated message ignored"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::LogBuffer;
    use crate::transport::{Input, Position};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingSession {
        commands: Mutex<Vec<String>>,
    }

    impl Session for RecordingSession {
        fn send_command(&self, text: &str) {
            self.commands.lock().unwrap().push(text.to_string());
        }
        fn seek_goal(&self, _goal: Position) {}
        fn set_input_state(&self, _input: Input, _pressed: bool) {}
        fn end(&self) {}
    }

    fn login(timeout: Duration) -> AuthChallenge {
        AuthChallenge::new("login", "/login hunter2", timeout)
            .with_success(["Successfully logged in"])
            .with_failure(["Invalid password", "not registered"])
    }

    async fn timed<F>(started: Instant, run: F) -> (AuthError, Duration)
    where
        F: std::future::Future<Output = Result<(), AuthError>>,
    {
        let err = run.await.expect_err("no reply was ever delivered");
        (err, started.elapsed())
    }

    fn reporter() -> (LogBuffer, Reporter) {
        let buffer = LogBuffer::new();
        let report = Reporter::new(Arc::new(buffer.clone()), "auth");
        (buffer, report)
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        let challenge = login(Duration::from_secs(1));
        assert_eq!(
            challenge.classify("SUCCESSFULLY LOGGED IN!"),
            Some(Verdict::Accepted)
        );
        assert_eq!(
            challenge.classify("Wrong: invalid password"),
            Some(Verdict::Rejected)
        );
        assert_eq!(challenge.classify("Steve joined the game"), None);
    }

    #[test]
    fn test_debug_hides_command() {
        let rendered = format!("{:?}", login(Duration::from_secs(1)));
        assert!(!rendered.contains("hunter2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrelated_messages_do_not_resolve() {
        let session = RecordingSession::default();
        let inbox = Inbox::new();
        let (buffer, report) = reporter();
        let challenge = login(Duration::from_secs(5));

        let feeder = {
            let inbox = inbox.clone();
            async move {
                while inbox.observer_count() == 0 {
                    tokio::task::yield_now().await;
                }
                inbox.deliver("Welcome to the server!");
                inbox.deliver("Steve joined the game");
                inbox.deliver("Successfully logged in");
            }
        };

        let (result, _) = tokio::join!(challenge.run(&session, &inbox, &report), feeder);
        assert_eq!(result, Ok(()));
        assert_eq!(*session.commands.lock().unwrap(), vec!["/login hunter2"]);
        assert_eq!(inbox.observer_count(), 0);
        // command line plus three observed messages, none of them with the password
        assert_eq!(buffer.len(), 4);
        assert!(buffer.matching("hunter2").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_pattern_rejects() {
        let session = RecordingSession::default();
        let inbox = Inbox::new();
        let (_buffer, report) = reporter();
        let challenge = login(Duration::from_secs(5));

        let feeder = {
            let inbox = inbox.clone();
            async move {
                while inbox.observer_count() == 0 {
                    tokio::task::yield_now().await;
                }
                inbox.deliver("Invalid password!");
            }
        };

        let (result, _) = tokio::join!(challenge.run(&session, &inbox, &report), feeder);
        assert_eq!(
            result,
            Err(AuthError::Rejected {
                challenge: "login",
                message: "Invalid password!".to_string()
            })
        );
        assert_eq!(inbox.observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_times_out_once() {
        let session = RecordingSession::default();
        let inbox = Inbox::new();
        let (_buffer, report) = reporter();
        let challenge = login(Duration::from_secs(3));

        let started = Instant::now();
        let result = challenge.run(&session, &inbox, &report).await;

        assert_eq!(
            result,
            Err(AuthError::Timeout {
                challenge: "login",
                timeout: Duration::from_secs(3)
            })
        );
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(inbox.observer_count(), 0);
        // late replies find nobody listening
        assert!(!inbox.deliver("Successfully logged in"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_inbox_resolves_as_session_closed() {
        let session = RecordingSession::default();
        let inbox = Inbox::new();
        let (_buffer, report) = reporter();
        let challenge = login(Duration::from_secs(30));

        let closer = {
            let inbox = inbox.clone();
            async move {
                while inbox.observer_count() == 0 {
                    tokio::task::yield_now().await;
                }
                inbox.close();
            }
        };

        let (result, _) = tokio::join!(challenge.run(&session, &inbox, &report), closer);
        assert_eq!(result, Err(AuthError::SessionClosed { challenge: "login" }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_run_releases_slot() {
        let session = RecordingSession::default();
        let inbox = Inbox::new();
        let (_buffer, report) = reporter();
        let challenge = login(Duration::from_secs(30));

        let cancelled =
            tokio::time::timeout(Duration::from_secs(1), challenge.run(&session, &inbox, &report))
                .await;
        assert!(cancelled.is_err());
        assert_eq!(inbox.observer_count(), 0);
        assert!(inbox.observe().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_runs_take_turns() {
        let session = RecordingSession::default();
        let inbox = Inbox::new();
        let (_buffer, report) = reporter();
        let first = login(Duration::from_secs(10));
        let second = AuthChallenge::new(
            "register",
            "/register hunter2 hunter2",
            Duration::from_secs(10),
        );

        let started = Instant::now();

        let watcher = async {
            // sample the slot every half second until both runs are done
            for _ in 0..42 {
                assert!(inbox.observer_count() <= 1);
                let sent = session.commands.lock().unwrap().len();
                if started.elapsed() < Duration::from_secs(10) {
                    assert_eq!(sent, 1, "second command sent before the first run resolved");
                } else if started.elapsed() > Duration::from_secs(10) {
                    assert_eq!(sent, 2);
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        };

        let (first_done, second_done, _) = tokio::join!(
            timed(started, first.run(&session, &inbox, &report)),
            timed(started, second.run(&session, &inbox, &report)),
            watcher
        );

        assert_eq!(first_done.0.challenge(), "login");
        assert_eq!(first_done.1, Duration::from_secs(10));
        assert!(matches!(second_done.0, AuthError::Timeout { challenge: "register", .. }));
        assert_eq!(second_done.1, Duration::from_secs(20));
        assert_eq!(
            *session.commands.lock().unwrap(),
            vec!["/login hunter2", "/register hunter2 hunter2"]
        );
        assert_eq!(inbox.observer_count(), 0);
    }
}
