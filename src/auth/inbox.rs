use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};

/// The inbox was closed because its session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboxClosed;

struct Tap {
    id: u64,
    tx: mpsc::UnboundedSender<String>,
}

struct Shared {
    slot: Mutex<Option<Tap>>,
    turn: Arc<Semaphore>,
    next_id: AtomicU64,
}

/// A session's incoming text messages, with room for at most one observer.
///
/// Observers take turns: a second `observe` call waits until the current
/// observer is dropped. Messages that arrive with no observer attached are
/// not buffered.
#[derive(Clone)]
pub struct Inbox {
    shared: Arc<Shared>,
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Inbox {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(None),
                turn: Arc::new(Semaphore::new(1)),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Wait for the slot and attach an observer to it.
    pub async fn observe(&self) -> Result<InboxObserver, InboxClosed> {
        let permit = self
            .shared
            .turn
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| InboxClosed)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        *self.lock_slot() = Some(Tap { id, tx });

        Ok(InboxObserver {
            id,
            rx,
            shared: self.shared.clone(),
            _turn: permit,
        })
    }

    /// Hand a message to the current observer. Returns false if nobody is listening.
    pub fn deliver(&self, message: &str) -> bool {
        match self.lock_slot().as_ref() {
            Some(tap) => tap.tx.send(message.to_string()).is_ok(),
            None => false,
        }
    }

    pub fn observer_count(&self) -> usize {
        usize::from(self.lock_slot().is_some())
    }

    /// Detach the current observer and refuse new ones.
    pub fn close(&self) {
        self.shared.turn.close();
        self.lock_slot().take();
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Option<Tap>> {
        self.shared
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds the inbox slot; dropping it detaches the observer.
pub struct InboxObserver {
    id: u64,
    rx: mpsc::UnboundedReceiver<String>,
    shared: Arc<Shared>,
    _turn: OwnedSemaphorePermit,
}

impl InboxObserver {
    /// Receive the next delivered message, or `None` once the inbox is closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

impl Drop for InboxObserver {
    fn drop(&mut self) {
        let mut slot = self
            .shared
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|tap| tap.id == self.id) {
            slot.take();
        }
    }
}
