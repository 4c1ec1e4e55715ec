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

use std::collections::HashMap;

use async_trait::async_trait;

use crate::common::reply_code::ReplyCode;
use crate::common::PublishError;

/// Publishes one message and reports the broker's definitive answer as a reply code.
#[async_trait]
pub trait ReplyCodePublisher: Send + Sync {
    /// Publishes `body` with the given string-keyed properties and waits for the outcome.
    ///
    /// Returns `REPLY_SUCCESS` on ack, `INTERNAL_ERROR` on nack, the broker's
    /// code on a return or shutdown and `INVALID_PATH` when the broker cannot
    /// be reached.
    ///
    /// # Errors
    ///
    /// See [`PublishError`].
    async fn publish_message_and_get_reply_code(
        &self,
        body: &[u8],
        properties: Option<&HashMap<String, String>>,
    ) -> Result<ReplyCode, PublishError>;
}

/// A [`ReplyCodePublisher`] bound to a configurable exchange and queue.
pub trait TargetedPublisher: ReplyCodePublisher {
    /// Sets the exchange later publishes go to.
    fn set_exchange_name(&mut self, exchange_name: String);

    /// Sets the queue name, used as the routing key.
    fn set_queue_name(&mut self, queue_name: String);

    /// The current exchange.
    fn exchange_name(&self) -> &str;

    /// The current queue name.
    fn queue_name(&self) -> &str;
}
