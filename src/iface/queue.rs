//! Bounded queue pair and pump-thread lifecycle
//!
//! Both the device and the IP pipeline own one incoming and one outgoing
//! queue, a pair of pump threads and a cancellation token. [`Queues`] holds
//! that shared shape; the owners only supply the loop bodies.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{never, select, Receiver, Sender};

use super::cancel::Cancellation;
use super::lock;
use crate::error::{Error, Result};

/// Lifecycle of a device or pipeline
///
/// Moves only forward: Created -> Running -> Closing -> Closed. A component
/// closed before it was started goes straight to Closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Created,
    Running,
    Closing,
    Closed,
}

/// The queue ends handed to the pump threads
pub(crate) struct PumpEnds<I, O> {
    /// Producer side of the incoming queue
    pub incoming: Sender<I>,
    /// Consumer side of the outgoing queue
    pub outgoing: Receiver<O>,
}

pub(crate) struct Queues<I, O> {
    incoming: Receiver<I>,
    outgoing: Sender<O>,
    ends: Mutex<Option<PumpEnds<I, O>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    cancel: Arc<Cancellation>,
    closed_error: fn() -> Error,
}

impl<I, O> Queues<I, O> {
    /// Two queues of `capacity` slots each
    ///
    /// `closed_error` builds the error `send` returns once the owner is closed.
    pub fn new(capacity: usize, closed_error: fn() -> Error) -> Self {
        let (incoming_tx, incoming_rx) = crossbeam_channel::bounded(capacity);
        let (outgoing_tx, outgoing_rx) = crossbeam_channel::bounded(capacity);
        Queues {
            incoming: incoming_rx,
            outgoing: outgoing_tx,
            ends: Mutex::new(Some(PumpEnds {
                incoming: incoming_tx,
                outgoing: outgoing_rx,
            })),
            workers: Mutex::new(Vec::new()),
            cancel: Arc::new(Cancellation::new()),
            closed_error,
        }
    }

    pub fn cancellation(&self) -> &Arc<Cancellation> {
        &self.cancel
    }

    /// Hand out the pump ends; only the first call succeeds
    pub fn take_ends(&self) -> Result<PumpEnds<I, O>> {
        if self.cancel.is_cancelled() {
            return Err((self.closed_error)());
        }
        lock(&self.ends).take().ok_or(Error::AlreadyStarted)
    }

    /// Spawn a named pump thread tracked for [`state`](Self::state)
    pub fn spawn<F>(&self, name: String, body: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(name)
            .spawn(body)
            .map_err(Error::Spawn)?;
        lock(&self.workers).push(handle);
        Ok(())
    }

    /// Blocking dequeue from the incoming queue
    ///
    /// After close, frames still buffered are handed out before
    /// `QueueClosed` is returned. `extra` lets a caller abort the wait with
    /// its own token, which yields `Cancelled`.
    pub fn recv(&self, extra: Option<&Cancellation>) -> Result<I> {
        if extra.is_some_and(Cancellation::is_cancelled) {
            return Err(Error::Cancelled);
        }

        let idle = never();
        let extra = match extra {
            Some(token) => token.signal(),
            None => &idle,
        };

        select! {
            recv(self.incoming) -> item => item.map_err(|_| Error::QueueClosed),
            recv(self.cancel.signal()) -> _ => {
                self.incoming.try_recv().map_err(|_| Error::QueueClosed)
            }
            recv(extra) -> _ => Err(Error::Cancelled),
        }
    }

    /// Blocking enqueue onto the outgoing queue
    ///
    /// Fails at once if the owner is already closed, and unblocks with the
    /// closed error if it closes while waiting for a free slot.
    pub fn send(&self, item: O, extra: Option<&Cancellation>) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err((self.closed_error)());
        }
        if extra.is_some_and(Cancellation::is_cancelled) {
            return Err(Error::Cancelled);
        }

        let idle = never();
        let extra = match extra {
            Some(token) => token.signal(),
            None => &idle,
        };

        select! {
            send(self.outgoing, item) -> res => res.map_err(|_| (self.closed_error)()),
            recv(self.cancel.signal()) -> _ => Err((self.closed_error)()),
            recv(extra) -> _ => Err(Error::Cancelled),
        }
    }

    /// Signal cancellation; returns `false` if already closed
    ///
    /// Unused pump ends are dropped so a never-started component reports
    /// `QueueClosed` to readers right away.
    pub fn close(&self) -> bool {
        if !self.cancel.cancel() {
            return false;
        }
        drop(lock(&self.ends).take());
        true
    }

    pub fn state(&self) -> State {
        let workers = lock(&self.workers);
        if !self.cancel.is_cancelled() {
            if workers.is_empty() {
                State::Created
            } else {
                State::Running
            }
        } else if workers.iter().all(JoinHandle::is_finished) {
            State::Closed
        } else {
            State::Closing
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn queues() -> Queues<u32, u32> {
        Queues::new(2, || Error::DeviceClosed)
    }

    #[test]
    fn test_ends_taken_once() {
        let q = queues();
        assert!(q.take_ends().is_ok());
        assert!(matches!(q.take_ends(), Err(Error::AlreadyStarted)));
    }

    #[test]
    fn test_fifo_through_ends() {
        let q = queues();
        let ends = q.take_ends().unwrap();
        q.send(1, None).unwrap();
        q.send(2, None).unwrap();
        assert_eq!(ends.outgoing.recv().unwrap(), 1);
        assert_eq!(ends.outgoing.recv().unwrap(), 2);

        ends.incoming.send(7).unwrap();
        ends.incoming.send(8).unwrap();
        assert_eq!(q.recv(None).unwrap(), 7);
        assert_eq!(q.recv(None).unwrap(), 8);
    }

    #[test]
    fn test_send_after_close_fails_fast() {
        let q = queues();
        assert!(q.close());
        assert!(!q.close());
        assert!(matches!(q.send(1, None), Err(Error::DeviceClosed)));
        assert!(matches!(q.take_ends(), Err(Error::DeviceClosed)));
    }

    #[test]
    fn test_recv_drains_then_reports_closed() {
        let q = queues();
        let ends = q.take_ends().unwrap();
        ends.incoming.send(5).unwrap();
        q.close();

        assert_eq!(q.recv(None).unwrap(), 5);
        assert!(matches!(q.recv(None), Err(Error::QueueClosed)));
    }

    #[test]
    fn test_close_unblocks_full_send() {
        let q = Arc::new(queues());
        let _ends = q.take_ends().unwrap();
        q.send(1, None).unwrap();
        q.send(2, None).unwrap();

        let blocked = {
            let q = q.clone();
            thread::spawn(move || q.send(3, None))
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!blocked.is_finished());

        q.close();
        assert!(matches!(blocked.join().unwrap(), Err(Error::DeviceClosed)));
    }

    #[test]
    fn test_extra_token_aborts_recv() {
        let q = Arc::new(queues());
        let _ends = q.take_ends().unwrap();
        let token = Arc::new(Cancellation::new());

        let waiter = {
            let (q, token) = (q.clone(), token.clone());
            thread::spawn(move || q.recv(Some(&token)))
        };
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert!(matches!(waiter.join().unwrap(), Err(Error::Cancelled)));
        assert_eq!(q.state(), State::Created);
    }

    #[test]
    fn test_state_transitions() {
        let q = queues();
        assert_eq!(q.state(), State::Created);

        let (tx, rx) = crossbeam_channel::bounded::<()>(0);
        q.spawn("test-worker".to_string(), move || {
            let _ = rx.recv();
        })
        .unwrap();
        assert_eq!(q.state(), State::Running);

        q.close();
        assert_eq!(q.state(), State::Closing);

        drop(tx);
        for _ in 0..100 {
            if q.state() == State::Closed {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("worker did not finish");
    }

    #[test]
    fn test_close_before_start() {
        let q = queues();
        q.close();
        assert_eq!(q.state(), State::Closed);
        assert!(matches!(q.recv(None), Err(Error::QueueClosed)));
    }
}
