//! Chat-command authentication (`/register`, `/login`).

pub mod challenge;
pub mod inbox;
mod sequencer;

pub use challenge::{AuthChallenge, AuthError, Verdict};
pub use inbox::{Inbox, InboxClosed, InboxObserver};
pub use sequencer::AuthSequencer;
