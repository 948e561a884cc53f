//! Level-triggered cancellation shared by a component's pump threads

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crossbeam_channel::{Receiver, Sender};

use super::lock;

/// One-shot cancellation token
///
/// `signal()` is a channel that nobody ever sends on; cancelling drops its
/// only sender, so every `recv` on it returns immediately from then on. This
/// lets pump loops race a queue operation against cancellation in a
/// `crossbeam_channel::select!`.
#[derive(Debug)]
pub struct Cancellation {
    cancelled: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

impl Cancellation {
    pub fn new() -> Self {
        let (trigger, signal) = crossbeam_channel::bounded(0);
        Cancellation {
            cancelled: AtomicBool::new(false),
            trigger: Mutex::new(Some(trigger)),
            signal,
        }
    }

    /// Cancel the token
    ///
    /// Returns `true` for the call that actually cancelled it, `false` if it
    /// was already cancelled.
    pub fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        drop(lock(&self.trigger).take());
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Receiver that becomes ready (disconnected) once cancelled
    pub fn signal(&self) -> &Receiver<()> {
        &self.signal
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}
