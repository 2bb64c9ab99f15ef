use std::future::{pending, Future};
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use super::anti_afk::{AntiAfk, IdleStep};
use super::events::{LifecycleEventRouter, LifecycleHandler};
use super::state::{ReconnectDecision, ReconnectState, SupervisorState};
use crate::activity::{ActivityLog, Reporter};
use crate::auth::{AuthError, AuthSequencer, Inbox};
use crate::config::Settings;
use crate::transport::{Connector, Session, SessionEvent, SessionHandle, TransportError};

type AuthFuture = Pin<Box<dyn Future<Output = Result<(), AuthError>> + Send>>;

/// Everything tied to one session. Dropping it closes the inbox and cancels
/// the pending authentication and the anti-idle timer with it.
struct Generation {
    id: u64,
    session: Arc<dyn Session>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    inbox: Inbox,
    auth: Option<AuthFuture>,
    idle: Option<AntiAfk>,
}

impl Generation {
    fn new(id: u64, handle: SessionHandle) -> Self {
        Self {
            id,
            session: handle.session,
            events: handle.events,
            inbox: Inbox::new(),
            auth: None,
            idle: None,
        }
    }
}

impl Drop for Generation {
    fn drop(&mut self) {
        self.inbox.close();
    }
}

enum Step {
    Event(u64, Option<SessionEvent>),
    AuthFinished(Result<(), AuthError>),
    Idle(IdleStep),
    Reconnect,
    Shutdown,
}

/// Owns the session, the reconnect counter and the lifecycle state.
///
/// All work happens on the task that awaits [`SessionSupervisor::run`]:
/// session events, the authentication exchange, the anti-idle timer and the
/// backoff delay are raced in one `select!`, so no two handlers ever run at
/// the same time.
pub struct SessionSupervisor {
    router: LifecycleEventRouter,
    machine: LifecycleMachine,
}

impl SessionSupervisor {
    pub fn new(
        settings: Arc<Settings>,
        connector: Box<dyn Connector>,
        log: Arc<dyn ActivityLog>,
    ) -> Self {
        let report = Reporter::new(log, "supervisor");
        let (state_tx, _) = watch::channel(SupervisorState::Idle);

        Self {
            router: LifecycleEventRouter::new(report.scoped("events")),
            machine: LifecycleMachine {
                sequencer: AuthSequencer::from_config(&settings.auto_auth),
                reconnect: ReconnectState::new(settings.reconnect.clone()),
                connector,
                settings,
                report,
                state_tx,
                next_generation: 0,
                generation: None,
                reconnect_at: None,
            },
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.machine.state()
    }

    /// Subscribe to every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<SupervisorState> {
        self.machine.state_tx.subscribe()
    }

    /// Connect and keep the session alive until reconnects run out, reconnecting
    /// is disabled, or `shutdown` turns true. Returns in the Stopped state.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        self.machine.start();

        while self.machine.state() != SupervisorState::Stopped {
            match self.machine.next_step(&mut shutdown).await {
                Step::Event(generation, Some(event)) => {
                    self.router.route(generation, event, &mut self.machine)
                }
                Step::Event(generation, None) => self.router.route(
                    generation,
                    SessionEvent::Ended {
                        reason: "event stream closed".to_string(),
                    },
                    &mut self.machine,
                ),
                Step::AuthFinished(result) => self.machine.finish_auth(result),
                Step::Idle(step) => self.machine.idle_step(step),
                Step::Reconnect => self.machine.start(),
                Step::Shutdown => self.machine.shutdown(),
            }
        }

        debug!(target: "supervisor", "Supervisor stopped");
    }
}

struct LifecycleMachine {
    connector: Box<dyn Connector>,
    settings: Arc<Settings>,
    sequencer: AuthSequencer,
    report: Reporter,
    state_tx: watch::Sender<SupervisorState>,
    reconnect: ReconnectState,
    next_generation: u64,
    generation: Option<Generation>,
    reconnect_at: Option<Instant>,
}

impl LifecycleMachine {
    fn state(&self) -> SupervisorState {
        *self.state_tx.borrow()
    }

    fn set_state(&mut self, state: SupervisorState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(target: "supervisor", from = %previous, to = %state, "State change");
        }
    }

    async fn next_step(&mut self, shutdown: &mut watch::Receiver<bool>) -> Step {
        let Some(generation) = self.generation.as_mut() else {
            return match self.reconnect_at {
                Some(at) => tokio::select! {
                    biased;
                    _ = shutdown_requested(shutdown) => Step::Shutdown,
                    _ = sleep_until(at) => Step::Reconnect,
                },
                None => {
                    shutdown_requested(shutdown).await;
                    Step::Shutdown
                }
            };
        };

        let Generation {
            id,
            events,
            auth,
            idle,
            ..
        } = generation;

        // Auth is polled before events so its observer is attached before
        // the replies to its command are delivered.
        tokio::select! {
            biased;
            _ = shutdown_requested(shutdown) => Step::Shutdown,
            result = pending_auth(auth) => Step::AuthFinished(result),
            step = idle_tick(idle) => Step::Idle(step),
            event = events.recv() => Step::Event(*id, event),
        }
    }

    fn start(&mut self) {
        self.reconnect_at = None;

        let params = self.settings.session_params();
        self.report.info(format!(
            "connecting to {} as {}",
            params.address(),
            params.username
        ));

        match self.connector.create_session(&params) {
            Ok(handle) => {
                self.next_generation += 1;
                self.generation = Some(Generation::new(self.next_generation, handle));
                self.set_state(SupervisorState::Connecting);
            }
            Err(e) => {
                self.report.error(format!("could not create session: {}", e));
                self.schedule_reconnect();
            }
        }
    }

    fn finish_auth(&mut self, result: Result<(), AuthError>) {
        if let Some(generation) = self.generation.as_mut() {
            generation.auth = None;
        }

        match result {
            Ok(()) => self.enter_active(),
            Err(e) => {
                self.report.error(format!("authentication failed: {}", e));
                self.force_end();
            }
        }
    }

    fn enter_active(&mut self) {
        self.set_state(SupervisorState::Active);
        self.reconnect.reset();

        let Some(generation) = self.generation.as_mut() else {
            return;
        };

        if self.settings.position.enabled {
            let target = self.settings.position.target();
            generation.session.seek_goal(target);
            self.report.info(format!("heading to {}", target));
        }

        if self.settings.anti_afk.enabled {
            generation.idle = Some(AntiAfk::new(self.settings.anti_afk.sneak));
            self.report.info("anti-afk started");
        }
    }

    fn idle_step(&mut self, step: IdleStep) {
        let Some(generation) = self.generation.as_ref() else {
            return;
        };
        if let Some(idle) = generation.idle.as_ref() {
            for input in idle.inputs() {
                generation.session.set_input_state(*input, step.pressed());
            }
        }
    }

    /// End the session ourselves; the reconnect still goes through `on_ended`.
    fn force_end(&mut self) {
        if self.state() == SupervisorState::Ending {
            return;
        }
        let Some(generation) = self.generation.as_mut() else {
            return;
        };

        generation.idle = None;
        if generation.auth.take().is_some() {
            self.report.warn("authentication abandoned: session is ending");
        }
        generation.inbox.close();
        generation.session.end();
        self.set_state(SupervisorState::Ending);
    }

    fn schedule_reconnect(&mut self) {
        if !self.reconnect.config().enabled {
            self.report.info("auto-reconnect is disabled, stopping");
            self.set_state(SupervisorState::Stopped);
            return;
        }

        match self.reconnect.record_end() {
            ReconnectDecision::Retry { attempt, delay } => {
                let limit = match self.reconnect.config().max_attempts {
                    0 => "unlimited".to_string(),
                    max => max.to_string(),
                };
                self.report.info(format!(
                    "reconnecting in {}ms (attempt {}/{})",
                    delay.as_millis(),
                    attempt,
                    limit
                ));
                self.reconnect_at = Some(Instant::now() + delay);
                self.set_state(SupervisorState::Connecting);
            }
            ReconnectDecision::Exhausted(e) => {
                self.report.fatal(e.to_string());
                self.reconnect_at = None;
                self.set_state(SupervisorState::Stopped);
            }
        }
    }

    fn shutdown(&mut self) {
        self.report.info("shutting down");
        if let Some(generation) = self.generation.take() {
            generation.session.end();
        }
        self.reconnect_at = None;
        self.set_state(SupervisorState::Stopped);
    }
}

impl LifecycleHandler for LifecycleMachine {
    fn on_spawned(&mut self) {
        if self.state() == SupervisorState::Ending {
            return;
        }
        self.set_state(SupervisorState::Spawned);

        if !self.settings.auto_auth.enabled {
            self.enter_active();
            return;
        }

        let Some(generation) = self.generation.as_mut() else {
            return;
        };

        let sequencer = self.sequencer.clone();
        let session = generation.session.clone();
        let inbox = generation.inbox.clone();
        let report = self.report.scoped("auth");
        let password = self.settings.auto_auth.password.clone();
        generation.auth = Some(Box::pin(async move {
            sequencer
                .authenticate(session.as_ref(), &inbox, &report, &password)
                .await
        }));
        self.set_state(SupervisorState::Authenticating);
    }

    fn on_message(&mut self, message: String) {
        if let Some(generation) = self.generation.as_ref() {
            generation.inbox.deliver(&message);
        }
    }

    fn on_errored(&mut self, error: &TransportError) {
        if error.is_connection_reset() {
            self.force_end();
        }
    }

    fn on_ended(&mut self, _reason: &str) {
        if let Some(mut generation) = self.generation.take() {
            if generation.auth.take().is_some() {
                self.report.warn("authentication abandoned: session ended");
            }
        }
        self.schedule_reconnect();
    }
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            pending::<()>().await;
        }
    }
}

async fn pending_auth(auth: &mut Option<AuthFuture>) -> Result<(), AuthError> {
    match auth {
        Some(future) => future.as_mut().await,
        None => pending().await,
    }
}

async fn idle_tick(idle: &mut Option<AntiAfk>) -> IdleStep {
    match idle {
        Some(timer) => timer.next().await,
        None => pending().await,
    }
}
