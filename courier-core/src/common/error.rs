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

use std::time::Duration;

use thiserror::Error;

use crate::message::PropertyFormatError;
use crate::traits::BrokerError;

/// Why a publish attempt produced no reply code.
///
/// Rejections by the broker are *not* errors: nacks, returns and shutdowns
/// resolve to a reply code. These variants cover the cases where no answer
/// exists at all.
#[derive(Debug, Error)]
pub enum PublishError {
    /// A recognised property value could not be converted. Nothing was sent.
    #[error(transparent)]
    PropertyFormat(#[from] PropertyFormatError),
    /// The broker did not answer within the waiting window.
    ///
    /// The message may still have been delivered.
    #[error("no confirmation received within {0:?}")]
    Timeout(Duration),
    /// The broker client failed after the connection was established.
    #[error(transparent)]
    Broker(#[from] BrokerError),
    /// A blocking publish was requested from inside a current-thread Tokio runtime,
    /// which cannot make progress while its only thread is blocked.
    #[error("blocking publish is not supported on a current-thread Tokio runtime")]
    BlockingInCurrentThreadRuntime,
    /// The fallback runtime for blocking publishes could not be started.
    #[error("failed to start fallback runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl PublishError {
    /// Returns `true` if the attempt ended because the waiting window elapsed.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
