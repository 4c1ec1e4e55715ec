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

#![forbid(unsafe_code)]
//! Courier Core Library
//!
//! Publishes one message to an AMQP 0-9-1 broker and resolves it to a single
//! reply code: acknowledged, negatively acknowledged, returned as unroutable
//! or lost to a channel or connection shutdown, within a bounded wait.
//!
//! The broker itself is reached through the traits in [`prelude`]
//! ([`BrokerConnector`](prelude::BrokerConnector) and friends), so the
//! confirmation protocol here is independent of any particular AMQP client.

/// Sessions, publishers, outcome bookkeeping and configuration.
pub(crate) mod common;

pub(crate) mod message;
/// Broker-client and publisher traits.
pub(crate) mod traits;

pub use common::reply_code;

/// Prelude module for convenient imports.
///
/// Re-exports everything needed to publish with Courier or to implement a
/// broker client for it, as well as the `async_trait` crate.
pub mod prelude {
    pub use async_trait;

    pub use crate::common::reply_code::{self, ReplyCode};
    pub use crate::common::{
        BrokerConfig, ConfigError, CourierConfig, Outcome, OutcomeResolver, OutstandingConfirms,
        PublishConfig, PublishError, PublishSession, PublishSettings, PublishState, Publisher,
        ResolveError,
    };
    pub use crate::message::{
        DeliveryMode, MessageAttributes, PropertyBuilder, PropertyCause, PropertyFormatError,
    };
    pub use crate::traits::{
        BrokerChannel, BrokerConnection, BrokerConnector, BrokerError, ConfirmEvent,
        ConfirmListener, PublishRequest, ReplyCodePublisher, ReturnListener, ReturnedMessage,
        ShutdownListener, ShutdownScope, ShutdownSignal, TargetedPublisher,
    };
}
