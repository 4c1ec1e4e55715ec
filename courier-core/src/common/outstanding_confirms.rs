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

//! Bookkeeping for published messages that still await a publisher confirm.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use static_assertions::assert_impl_all;
use tracing::{debug, trace};

/// Ordered table of in-flight messages keyed by publish sequence number.
///
/// Broker confirms name a delivery tag and may be cumulative, covering every
/// outstanding tag up to and including the one named. The table is a
/// `BTreeMap` so that cumulative removal is a single `split_off`.
///
/// Cloning an `OutstandingConfirms` yields another handle to the *same* table,
/// so listener callbacks running on broker-client threads can share it with
/// the publishing task without any locking on the caller's side.
#[derive(Debug, Clone, Default)]
pub struct OutstandingConfirms {
    entries: Arc<Mutex<BTreeMap<u64, Vec<u8>>>>,
}

assert_impl_all!(OutstandingConfirms: Send, Sync, Clone);

impl OutstandingConfirms {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message body under its publish sequence number.
    ///
    /// Must be called before the message is sent, otherwise a fast confirm
    /// could arrive for an entry that does not exist yet.
    pub fn record(&self, sequence_number: u64, body: &[u8]) {
        trace!(sequence_number, len = body.len(), "Recording outstanding confirm");
        self.entries.lock().insert(sequence_number, body.to_vec());
    }

    /// Removes the entries covered by a confirm and returns how many were removed.
    ///
    /// With `multiple == false` only `sequence_number` itself is removed. With
    /// `multiple == true` every entry whose key is `<= sequence_number` is removed.
    /// Removing keys that are absent is a no-op: confirms may legitimately arrive
    /// after the owning session has already cleaned up.
    pub fn resolve(&self, sequence_number: u64, multiple: bool) -> usize {
        debug!(sequence_number, multiple, "Cleaning outstanding confirm");
        let mut entries = self.entries.lock();
        if !multiple {
            return usize::from(entries.remove(&sequence_number).is_some());
        }
        let retained = match sequence_number.checked_add(1) {
            Some(first_retained) => entries.split_off(&first_retained),
            None => BTreeMap::new(),
        };
        std::mem::replace(&mut *entries, retained).len()
    }

    /// Returns `true` if `sequence_number` is still awaiting a confirm.
    #[must_use]
    pub fn contains(&self, sequence_number: u64) -> bool {
        self.entries.lock().contains_key(&sequence_number)
    }

    /// Returns a copy of the body recorded under `sequence_number`, if any.
    #[must_use]
    pub fn body(&self, sequence_number: u64) -> Option<Vec<u8>> {
        self.entries.lock().get(&sequence_number).cloned()
    }

    /// Number of entries awaiting a confirm.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` when nothing awaits a confirm.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Outstanding sequence numbers in ascending order.
    #[must_use]
    pub fn sequence_numbers(&self) -> Vec<u64> {
        self.entries.lock().keys().copied().collect()
    }
}
