//! Correlation table.
//!
//! Pairs outstanding request ids with single-use waiters so a caller can
//! block on the reply to a message that went out over a one-way transport.

use super::types::RequestId;
use crate::error::HoldError;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::Duration;
use tokio::sync::oneshot;

pub struct Hold<T> {
    waiters: DashMap<RequestId, oneshot::Sender<T>>,
}

impl<T: Send> Hold<T> {
    pub fn new() -> Self {
        Self {
            waiters: DashMap::new(),
        }
    }

    /// Registers a waiter for `id` and waits for its value, or fails after `timeout`.
    pub async fn get(&self, id: RequestId, timeout: Duration) -> Result<T, HoldError> {
        self.register(id)?.wait(timeout).await
    }

    /// Registers a waiter for `id` without waiting yet.
    ///
    /// Lets a caller register before sending the request, so a reply that
    /// arrives before `wait` is called is not lost.
    pub fn register(&self, id: RequestId) -> Result<Waiter<'_, T>, HoldError> {
        let (tx, rx) = oneshot::channel();
        match self.waiters.entry(id) {
            Entry::Occupied(_) => return Err(HoldError::Duplicate(id)),
            Entry::Vacant(slot) => {
                slot.insert(tx);
            }
        }
        Ok(Waiter { hold: self, id, rx })
    }

    /// Hands `value` to the waiter for `id`. Returns `false` (and drops the
    /// value) when nobody is waiting.
    ///
    /// `true` means the value reached the waiter's channel, not that the
    /// caller received it: a put racing with the waiter's timeout is accepted
    /// and then dropped along with the waiter.
    pub fn put(&self, id: RequestId, value: T) -> bool {
        match self.waiters.remove(&id) {
            Some((_, tx)) => {
                if tx.send(value).is_err() {
                    tracing::debug!("Waiter for {} went away before delivery", id);
                    return false;
                }
                true
            }
            None => {
                tracing::debug!("No waiter for {}, dropping reply", id);
                false
            }
        }
    }

    /// Number of registered waiters.
    pub fn pending(&self) -> usize {
        self.waiters.len()
    }
}

impl<T: Send> Default for Hold<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered, not yet fulfilled request.
///
/// Dropping it, or any exit from [`Waiter::wait`], removes the entry.
pub struct Waiter<'a, T> {
    hold: &'a Hold<T>,
    id: RequestId,
    rx: oneshot::Receiver<T>,
}

impl<T> Waiter<'_, T> {
    pub async fn wait(mut self, timeout: Duration) -> Result<T, HoldError> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(HoldError::Dropped(self.id)),
            Err(_) => {
                tracing::debug!("Request {} timed out after {:?}", self.id, timeout);
                Err(HoldError::Timeout {
                    id: self.id,
                    after: timeout,
                })
            }
        }
    }
}

impl<T> Drop for Waiter<'_, T> {
    fn drop(&mut self) {
        self.hold.waiters.remove(&self.id);
    }
}
