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

//! The narrow surface through which a publish session reaches the broker.
//!
//! A session needs very little from an AMQP client: open a connection, open a
//! confirm-mode channel on it, subscribe to three kinds of asynchronous event,
//! read the next publish sequence number, publish, and close. Keeping that
//! surface behind traits lets the confirmation protocol run unchanged against
//! the `lapin` client in production and against a scripted in-memory broker in
//! tests.
//!
//! Listener callbacks are plain synchronous closures. Implementations invoke
//! them from their own tasks or threads, possibly concurrently with each other
//! and with the publishing task.

use std::fmt::Debug;

use async_trait::async_trait;
use derive_new::new;
use thiserror::Error;

use crate::common::reply_code::{ReplyCode, INTERNAL_ERROR};
use crate::message::MessageAttributes;

/// Called for every publisher confirm the broker sends on a channel.
pub type ConfirmListener = Box<dyn Fn(ConfirmEvent) + Send + Sync>;
/// Called for every mandatory message the broker could not route.
pub type ReturnListener = Box<dyn Fn(ReturnedMessage) + Send + Sync>;
/// Called once when the channel (or the connection under it) shuts down.
pub type ShutdownListener = Box<dyn Fn(ShutdownSignal) + Send + Sync>;

/// A publisher confirm as delivered by the broker.
///
/// With `multiple` set the confirm covers every outstanding delivery tag up to
/// and including `delivery_tag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmEvent {
    /// The broker took responsibility for the message(s).
    Ack {
        /// Delivery tag named by the broker.
        delivery_tag: u64,
        /// Whether the confirm is cumulative.
        multiple: bool,
    },
    /// The broker could not take responsibility for the message(s).
    Nack {
        /// Delivery tag named by the broker.
        delivery_tag: u64,
        /// Whether the confirm is cumulative.
        multiple: bool,
    },
}

impl ConfirmEvent {
    /// The delivery tag named by this confirm.
    #[must_use]
    pub const fn delivery_tag(&self) -> u64 {
        match *self {
            Self::Ack { delivery_tag, .. } | Self::Nack { delivery_tag, .. } => delivery_tag,
        }
    }

    /// Whether this confirm is cumulative.
    #[must_use]
    pub const fn multiple(&self) -> bool {
        match *self {
            Self::Ack { multiple, .. } | Self::Nack { multiple, .. } => multiple,
        }
    }

    /// Returns `true` for a positive acknowledgment.
    #[must_use]
    pub const fn is_ack(&self) -> bool {
        matches!(self, Self::Ack { .. })
    }
}

/// A message handed back by the broker because it could not be routed.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct ReturnedMessage {
    /// Protocol reply code, usually `NO_ROUTE` or `NOT_FOUND`.
    pub reply_code: ReplyCode,
    /// Broker's explanation.
    pub reply_text: String,
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key the message was published with.
    pub routing_key: String,
    /// The returned body.
    pub body: Vec<u8>,
}

/// Which level of the client stack went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownScope {
    /// Only the channel was closed.
    Channel,
    /// The whole connection was closed, taking the channel with it.
    Connection,
}

/// Cause of a channel or connection shutdown.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct ShutdownSignal {
    /// Level of the client stack that went down.
    pub scope: ShutdownScope,
    /// The protocol close code, when the shutdown was a protocol close.
    pub reply_code: Option<ReplyCode>,
    /// Human-readable cause.
    pub reply_text: String,
    /// `true` when the application itself asked for the close.
    pub initiated_by_application: bool,
}

impl ShutdownSignal {
    /// The reply code a publish attempt reports for this shutdown.
    ///
    /// Shutdowns that carry no protocol close (lost sockets, I/O errors)
    /// report `INTERNAL_ERROR`.
    #[must_use]
    pub fn effective_reply_code(&self) -> ReplyCode {
        self.reply_code.unwrap_or(INTERNAL_ERROR)
    }
}

/// Everything `basic.publish` needs for one message.
#[derive(Debug, Clone, Copy, new)]
pub struct PublishRequest<'a> {
    /// Target exchange; `""` is the default exchange.
    pub exchange: &'a str,
    /// Routing key; with the default exchange, the queue name.
    pub routing_key: &'a str,
    /// Ask the broker to return the message when it is unroutable.
    pub mandatory: bool,
    /// Message properties.
    pub attributes: &'a MessageAttributes,
    /// Message body.
    pub body: &'a [u8],
}

/// Failures reported by a broker client.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The connection could not be established (unknown host, refused, bad credentials).
    #[error("failed to connect to broker: {0}")]
    Connect(String),
    /// A channel could not be opened or switched into confirm mode.
    #[error("channel error: {0}")]
    Channel(String),
    /// The message could not be sent.
    #[error("failed to publish: {0}")]
    Publish(String),
    /// Closing a channel or connection failed.
    #[error("failed to close: {0}")]
    Close(String),
    /// Transport-level failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Opens connections to a broker.
///
/// One connector is shared by every publish; each call to
/// [`connect`](Self::connect) yields a fresh connection owned by a single
/// publish attempt.
#[async_trait]
pub trait BrokerConnector: Debug + Send + Sync {
    /// Opens a new connection.
    async fn connect(&self) -> Result<Box<dyn BrokerConnection>, BrokerError>;
}

/// An open broker connection.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Opens a new channel on this connection.
    async fn create_channel(&self) -> Result<Box<dyn BrokerChannel>, BrokerError>;

    /// Returns `true` while the connection is usable.
    fn is_open(&self) -> bool;

    /// Closes the connection.
    async fn close(&self) -> Result<(), BrokerError>;
}

/// An open channel.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Switches the channel into publisher-confirm mode.
    async fn confirm_select(&self) -> Result<(), BrokerError>;

    /// Registers a confirm listener.
    fn add_confirm_listener(&self, listener: ConfirmListener);

    /// Registers a return listener.
    fn add_return_listener(&self, listener: ReturnListener);

    /// Registers a shutdown listener.
    fn add_shutdown_listener(&self, listener: ShutdownListener);

    /// Sequence number the next publish on this channel will carry.
    fn next_publish_seq_no(&self) -> u64;

    /// Sends one message.
    async fn basic_publish(&self, request: PublishRequest<'_>) -> Result<(), BrokerError>;

    /// Returns `true` while the channel is usable.
    fn is_open(&self) -> bool;

    /// Closes the channel.
    async fn close(&self) -> Result<(), BrokerError>;
}
