// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A single-assignment placeholder awaited by any number of callers.

use crate::error::{ResolveError, ResolveResult};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// A result-once placeholder shared by every caller interested in one key.
///
/// The first call to [`resolve`](Self::resolve) or [`reject`](Self::reject)
/// settles it; later calls are no-ops and return `false`, so a value is never
/// overwritten. Clones share the same slot.
///
/// Waiting is cooperative: [`wait`](Self::wait) suspends the task until the
/// slot is settled and never blocks a worker thread.
pub struct PendingRequest<T> {
    slot: Arc<watch::Sender<Option<ResolveResult<T>>>>,
}

impl<T> Clone for PendingRequest<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Clone> PendingRequest<T> {
    /// Creates an unsettled placeholder.
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            slot: Arc::new(slot),
        }
    }

    /// Creates a placeholder that is already resolved with `value`.
    pub fn resolved(value: T) -> Self {
        let (slot, _) = watch::channel(Some(Ok(value)));
        Self {
            slot: Arc::new(slot),
        }
    }

    /// Settles the placeholder with a value. Returns `false` if it was already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settles the placeholder with an error. Returns `false` if it was already settled.
    pub fn reject(&self, error: ResolveError) -> bool {
        self.settle(Err(error))
    }

    fn settle(&self, outcome: ResolveResult<T>) -> bool {
        self.slot.send_if_modified(move |slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        })
    }

    /// Returns `true` while nobody has settled the placeholder.
    pub fn is_pending(&self) -> bool {
        self.slot.borrow().is_none()
    }

    /// Returns the outcome if the placeholder is settled, without waiting.
    pub fn peek(&self) -> Option<ResolveResult<T>> {
        self.slot.borrow().clone()
    }

    /// Returns `true` if both handles point at the same slot.
    pub fn same_slot(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    /// Waits until the placeholder is settled and returns its outcome.
    pub async fn wait(&self) -> ResolveResult<T> {
        let mut receiver = self.slot.subscribe();
        let outcome = match receiver.wait_for(Option::is_some).await {
            Ok(slot) => (*slot).clone(),
            Err(_) => None,
        };
        // The sender lives as long as `self`, so the channel cannot close here.
        outcome.unwrap_or(Err(ResolveError::Disconnected))
    }
}

impl<T: Clone> Default for PendingRequest<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + fmt::Debug> fmt::Debug for PendingRequest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("outcome", &*self.slot.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn every_waiter_sees_the_single_value() {
        let pending = PendingRequest::<u32>::new();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let pending = pending.clone();
                tokio::spawn(async move { pending.wait().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(pending.is_pending());
        assert!(pending.resolve(7));

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), Ok(7));
        }
    }

    #[tokio::test]
    async fn settling_twice_never_overwrites() {
        let pending = PendingRequest::resolved("first".to_string());
        assert!(!pending.resolve("second".to_string()));
        assert!(!pending.reject(ResolveError::Disconnected));
        assert_eq!(pending.wait().await, Ok("first".to_string()));
    }

    #[tokio::test]
    async fn rejection_reaches_late_waiters() {
        let pending = PendingRequest::<u32>::new();
        assert!(pending.reject(ResolveError::UpstreamFetch("boom".into())));
        assert!(!pending.is_pending());
        assert_eq!(
            pending.wait().await,
            Err(ResolveError::UpstreamFetch("boom".into()))
        );
    }

    #[test]
    fn clones_share_a_slot() {
        let a = PendingRequest::<u8>::new();
        let b = a.clone();
        assert!(a.same_slot(&b));
        assert!(!a.same_slot(&PendingRequest::new()));
        b.resolve(1);
        assert_eq!(a.peek(), Some(Ok(1)));
    }
}
