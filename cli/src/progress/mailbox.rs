//! Named delivery policies for progress channels
//!
//! Two policies are used between the submission side and the presentation:
//!
//! * [`latest`]: at most one pending value, a newer value replaces the older
//!   one. Producers never block and never queue. Used for activity messages,
//!   upload samples and table snapshots where only the most recent state
//!   matters.
//! * [`bounded`]: a FIFO with a fixed capacity and an explicit
//!   [`Overflow`] rule. Used for decoded build statuses, which are a log
//!   rather than a state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

/// Create a latest-wins mailbox
pub fn latest<T>() -> (LatestSender<T>, LatestReceiver<T>) {
    let (tx, rx) = watch::channel(None);
    (LatestSender { tx }, LatestReceiver { rx })
}

/// Producer half of a latest-wins mailbox
#[derive(Debug, Clone)]
pub struct LatestSender<T> {
    tx: watch::Sender<Option<T>>,
}

impl<T> LatestSender<T> {
    /// Replace the pending value. Never blocks, succeeds with no receiver.
    pub fn publish(&self, value: T) {
        self.tx.send_replace(Some(value));
    }
}

impl<T: Clone> LatestSender<T> {
    /// Most recently published value
    pub fn current(&self) -> Option<T> {
        self.tx.borrow().clone()
    }
}

/// Consumer half of a latest-wins mailbox
#[derive(Debug)]
pub struct LatestReceiver<T> {
    rx: watch::Receiver<Option<T>>,
}

impl<T: Clone> LatestReceiver<T> {
    /// Wait for a value not seen yet.
    ///
    /// Returns `None` once the sender is gone and the last value was seen.
    pub async fn next(&mut self) -> Option<T> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(value) = self.rx.borrow_and_update().clone() {
                return Some(value);
            }
        }
    }

    /// Most recent value, seen or not
    pub fn current(&self) -> Option<T> {
        self.rx.borrow().clone()
    }

    /// Take the pending value if there is one, without waiting
    pub fn take_pending(&mut self) -> Option<T> {
        if self.rx.has_changed().unwrap_or(false) {
            self.rx.borrow_and_update().clone()
        } else {
            None
        }
    }
}

/// What a bounded mailbox does with a value when it is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overflow {
    /// Producer waits for room
    Wait,
    /// The incoming value is discarded
    DropNewest,
}

/// Create a bounded mailbox
pub fn bounded<T>(capacity: usize, overflow: Overflow) -> (MailboxSender<T>, mpsc::Receiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        MailboxSender {
            tx,
            overflow,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}

/// Producer half of a bounded mailbox
#[derive(Debug, Clone)]
pub struct MailboxSender<T> {
    tx: mpsc::Sender<T>,
    overflow: Overflow,
    dropped: Arc<AtomicU64>,
}

impl<T> MailboxSender<T> {
    /// Deliver a value following the mailbox policy.
    ///
    /// Returns whether the value was enqueued. A closed mailbox drops the
    /// value.
    pub async fn deliver(&self, value: T) -> bool {
        match self.overflow {
            Overflow::Wait => self.tx.send(value).await.is_ok(),
            Overflow::DropNewest => match self.tx.try_send(value) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            },
        }
    }

    /// Values discarded because the mailbox was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn overflow(&self) -> Overflow {
        self.overflow
    }
}
