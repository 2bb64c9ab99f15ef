use tracing::{debug, trace};

use crate::activity::Reporter;
use crate::transport::{Position, SessionEvent, TransportError};

/// Supervisor transitions the router dispatches into.
///
/// Implementers hold the state machine; the router only logs and calls.
pub trait LifecycleHandler {
    fn on_spawned(&mut self);

    fn on_message(&mut self, message: String);

    fn on_errored(&mut self, error: &TransportError);

    fn on_ended(&mut self, reason: &str);

    fn on_goal_reached(&mut self, _position: Option<Position>) {}

    fn on_died(&mut self, _position: Option<Position>) {}

    fn on_kicked(&mut self, _reason: &str) {}
}

/// Dispatch table from [`SessionEvent`] to [`LifecycleHandler`].
///
/// `spawned` is bound once per session generation: a repeated spawn within
/// the same generation (a respawn after death, for instance) is traced and
/// dropped. Every other event is recurring.
pub struct LifecycleEventRouter {
    report: Reporter,
    generation: u64,
    spawned: bool,
}

impl LifecycleEventRouter {
    pub fn new(report: Reporter) -> Self {
        Self {
            report,
            generation: 0,
            spawned: false,
        }
    }

    /// Route one event from session `generation` into `handler`.
    pub fn route<H: LifecycleHandler>(
        &mut self,
        generation: u64,
        event: SessionEvent,
        handler: &mut H,
    ) {
        if generation != self.generation {
            self.generation = generation;
            self.spawned = false;
        }

        match event {
            SessionEvent::Spawned => {
                if self.spawned {
                    debug!(target: "events", generation, "Ignoring repeated spawn");
                    return;
                }
                self.spawned = true;
                self.report.info("joined the server");
                handler.on_spawned();
            }
            SessionEvent::Message(message) => {
                trace!(target: "events", generation, %message, "Server message");
                handler.on_message(message);
            }
            SessionEvent::GoalReached { position } => {
                match position {
                    Some(pos) => self
                        .report
                        .info(format!("arrived at the target location {}", pos)),
                    None => self.report.info("arrived at the target location"),
                }
                handler.on_goal_reached(position);
            }
            SessionEvent::Died { position } => {
                match position {
                    Some(pos) => self
                        .report
                        .info(format!("died and respawned at {}", pos)),
                    None => self.report.info("died and respawned"),
                }
                handler.on_died(position);
            }
            SessionEvent::Kicked { reason } => {
                self.report
                    .warn(format!("kicked from the server: {}", reason));
                handler.on_kicked(&reason);
            }
            SessionEvent::Errored(error) => {
                self.report.error(format!("transport error: {}", error));
                handler.on_errored(&error);
            }
            SessionEvent::Ended { reason } => {
                self.report.info(format!("disconnected: {}", reason));
                handler.on_ended(&reason);
            }
        }
    }
}
