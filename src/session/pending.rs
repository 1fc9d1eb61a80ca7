// SPDX-License-Identifier: GPL-3.0-only

//! Result handle for work queued on a session

use crate::errors::{SessionError, SessionResult};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Outcome of an operation queued on a session's work queue
///
/// Await it, block on it with [`wait`](Self::wait), or drop it to fire and
/// forget. Dropping does not cancel the operation.
#[must_use = "dropping a Pending discards the outcome, the operation still runs"]
#[derive(Debug)]
pub struct Pending<T> {
    reply: oneshot::Receiver<SessionResult<T>>,
}

impl<T> Pending<T> {
    pub(crate) fn channel() -> (Self, oneshot::Sender<SessionResult<T>>) {
        let (tx, rx) = oneshot::channel();
        (Self { reply: rx }, tx)
    }

    /// An already-completed operation
    pub fn ready(result: SessionResult<T>) -> Self {
        let (pending, reply) = Self::channel();
        let _ = reply.send(result);
        pending
    }

    /// Block the current thread until the operation has run
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait(self) -> SessionResult<T> {
        self.reply
            .blocking_recv()
            .unwrap_or(Err(SessionError::QueueClosed))
    }

    /// Detach from the outcome
    pub fn detach(self) {}
}

impl<T> Future for Pending<T> {
    type Output = SessionResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().reply)
            .poll(cx)
            .map(|reply| reply.unwrap_or(Err(SessionError::QueueClosed)))
    }
}
