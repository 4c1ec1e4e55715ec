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

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// Whether the broker should persist a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryMode {
    /// Kept in memory only (`1` on the wire).
    Transient,
    /// Written to disk by durable queues (`2` on the wire).
    Persistent,
    /// Any other octet, passed through for the broker to interpret.
    Other(u8),
}

impl DeliveryMode {
    /// The wire value of this mode.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Transient => 1,
            Self::Persistent => 2,
            Self::Other(value) => value,
        }
    }

    /// Maps a wire value back to a mode.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Transient,
            2 => Self::Persistent,
            other => Self::Other(other),
        }
    }
}

/// Typed metadata attached to one publish.
///
/// Built once per call by [`PropertyBuilder`](crate::message::PropertyBuilder)
/// and not modified afterwards. Every field is optional; a default value
/// carries no properties at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageAttributes {
    /// Transient or persistent delivery.
    pub delivery_mode: Option<DeliveryMode>,
    /// Broker-defined time to live, passed through as a string.
    pub expiration: Option<String>,
    /// Message priority.
    pub priority: Option<u8>,
    /// Identity of the publishing user, validated by the broker.
    pub user_id: Option<String>,
    /// Identity of the publishing application.
    pub app_id: Option<String>,
    /// MIME content encoding of the body.
    pub content_encoding: Option<String>,
    /// MIME content type of the body.
    pub content_type: Option<String>,
    /// Correlates a reply with its request.
    pub correlation_id: Option<String>,
    /// Application message identifier.
    pub message_id: Option<String>,
    /// Address to send replies to.
    pub reply_to: Option<String>,
    /// The AMQP `type` property.
    pub kind: Option<String>,
    /// Point in time the message was created.
    pub timestamp: Option<DateTime<Utc>>,
    /// Application headers decoded from JSON.
    pub headers: Option<BTreeMap<String, serde_json::Value>>,
}

impl MessageAttributes {
    /// Returns `true` if no property is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
