/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Single-assignment cell that turns several racing broker events into one answer.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use static_assertions::assert_impl_all;
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::common::Outcome;

/// Why [`OutcomeResolver::wait_for`] returned without an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No outcome was set within the waiting window.
    #[error("no outcome within {0:?}")]
    Timeout(Duration),
    /// The wait was interrupted before an outcome was set.
    #[error("wait for outcome was interrupted")]
    Interrupted,
}

/// A write-once result cell shared between broker listeners and the waiting publisher.
///
/// Confirm, return and shutdown listeners each hold a clone and call
/// [`complete`](Self::complete) from whatever thread the broker client delivers
/// events on. The first call stores its outcome; every later call is a no-op
/// that returns `false`. The publisher suspends in [`wait_for`](Self::wait_for).
///
/// The resolver performs no side effects of its own. Tracker cleanup and
/// logging belong to the listener code that calls `complete`.
///
/// Resolvers created with [`renewed`](Self::renewed) share one interrupt
/// handle: [`interrupt`](Self::interrupt) on any of them reaches the newest cell.
#[derive(Debug, Clone, Default)]
pub struct OutcomeResolver {
    inner: Arc<ResolverInner>,
    interrupter: Arc<Mutex<CancellationToken>>,
}

#[derive(Debug, Default)]
struct ResolverInner {
    outcome: OnceLock<Outcome>,
    notify: Notify,
}

assert_impl_all!(OutcomeResolver: Send, Sync, Clone);

impl OutcomeResolver {
    /// Creates an unresolved cell.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An unresolved cell for the next attempt that keeps this one's interrupt handle.
    ///
    /// An interrupt aimed at an earlier cell and not yet consumed is discarded.
    /// Listeners still holding the earlier cell write only to it.
    #[must_use]
    pub fn renewed(&self) -> Self {
        *self.interrupter.lock() = CancellationToken::new();
        Self {
            inner: Arc::default(),
            interrupter: Arc::clone(&self.interrupter),
        }
    }

    /// Attempts to store `outcome`. Returns `true` if this call set the value.
    pub fn complete(&self, outcome: Outcome) -> bool {
        let won = self.inner.outcome.set(outcome).is_ok();
        if won {
            trace!(outcome = ?self.inner.outcome.get(), "Outcome resolved");
            self.inner.notify.notify_waiters();
        }
        won
    }

    /// The stored outcome, if one has been set.
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome> {
        self.inner.outcome.get().cloned()
    }

    /// Returns `true` once an outcome has been stored.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.inner.outcome.get().is_some()
    }

    /// Wakes every waiter with [`ResolveError::Interrupted`] unless an outcome is already set.
    pub fn interrupt(&self) {
        self.interrupter.lock().cancel();
    }

    /// Waits for an outcome for at most `timeout`.
    ///
    /// An outcome that is already set is returned immediately, even if the
    /// resolver has been interrupted.
    ///
    /// # Errors
    ///
    /// * [`ResolveError::Timeout`] if nothing was set within `timeout`.
    /// * [`ResolveError::Interrupted`] if [`interrupt`](Self::interrupt) was called first.
    pub async fn wait_for(&self, timeout: Duration) -> Result<Outcome, ResolveError> {
        let inner = &self.inner;
        let interrupted = self.interrupter.lock().clone();
        let wait = async {
            loop {
                // Register interest before checking, so a concurrent `complete`
                // between the check and the await cannot be missed.
                let notified = inner.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if let Some(outcome) = inner.outcome.get() {
                    return Ok(outcome.clone());
                }

                tokio::select! {
                    biased;
                    () = &mut notified => {}
                    () = interrupted.cancelled() => {
                        return inner.outcome.get().cloned().ok_or(ResolveError::Interrupted);
                    }
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| ResolveError::Timeout(timeout))?
    }
}
