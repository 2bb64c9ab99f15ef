//! Session lifecycle: connect, authenticate, idle, reconnect with backoff.

pub mod anti_afk;
pub mod events;
pub mod state;
#[allow(clippy::module_inception)]
mod supervisor;

pub use anti_afk::{AntiAfk, IdleStep};
pub use events::{LifecycleEventRouter, LifecycleHandler};
pub use state::{ReconnectDecision, ReconnectState, SupervisorError, SupervisorState};
pub use supervisor::SessionSupervisor;
