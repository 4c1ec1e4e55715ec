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

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_core::prelude::*;
use parking_lot::Mutex;
use tracing::{debug, trace};

/// How the mock broker answers a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerScript {
    /// Acknowledge the message.
    Ack,
    /// Negatively acknowledge the message.
    Nack,
    /// Acknowledge the message with a cumulative confirm.
    CumulativeAck,
    /// Acknowledge from inside `basic_publish`, before it returns.
    AckDuringPublish,
    /// Return the message with `reply_code`, then acknowledge it.
    Return {
        /// Code carried by the return.
        reply_code: ReplyCode,
    },
    /// Close the channel with `reply_code`.
    ChannelShutdown {
        /// Code carried by the close.
        reply_code: ReplyCode,
    },
    /// Drop the connection without a protocol close.
    ConnectionShutdownWithoutCode,
    /// Close the channel with `reply_code` from inside `basic_publish`, then fail the send.
    ShutdownDuringPublish {
        /// Code carried by the close.
        reply_code: ReplyCode,
    },
    /// Never answer.
    Silent,
    /// Refuse every connection.
    Unreachable,
    /// Fail to open a channel.
    FailChannel,
    /// Fail the send without any event.
    FailPublish,
}

/// Everything the mock was asked to do, across all connections.
#[derive(Debug, Default)]
pub struct CallCounters {
    connects: AtomicUsize,
    channels: AtomicUsize,
    publishes: AtomicUsize,
    channel_closes: AtomicUsize,
    connection_closes: AtomicUsize,
}

impl CallCounters {
    /// Calls to `connect`, successful or not.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Channels opened.
    pub fn channels(&self) -> usize {
        self.channels.load(Ordering::SeqCst)
    }

    /// Calls to `basic_publish`.
    pub fn publishes(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }

    /// Calls to `BrokerChannel::close`.
    pub fn channel_closes(&self) -> usize {
        self.channel_closes.load(Ordering::SeqCst)
    }

    /// Calls to `BrokerConnection::close`.
    pub fn connection_closes(&self) -> usize {
        self.connection_closes.load(Ordering::SeqCst)
    }
}

/// A message as the mock received it.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    /// Sequence number the message was sent under.
    pub sequence_number: u64,
    /// Target exchange.
    pub exchange: String,
    /// Routing key.
    pub routing_key: String,
    /// Mandatory flag.
    pub mandatory: bool,
    /// Properties.
    pub attributes: MessageAttributes,
    /// Body.
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
struct MockOptions {
    script: BrokerScript,
    event_delay: Duration,
    first_sequence_number: u64,
    fail_channel_close: bool,
    fail_connection_close: bool,
}

/// An in-memory [`BrokerConnector`] answering every publish per its [`BrokerScript`].
///
/// Events are delivered from a spawned Tokio task after the configured delay,
/// the way a real client delivers them from its I/O loop. Closing an open
/// channel fires its shutdown listeners as an application-initiated close.
#[derive(Debug, Clone)]
pub struct MockConnector {
    options: MockOptions,
    counters: Arc<CallCounters>,
    published: Arc<Mutex<Vec<PublishedMessage>>>,
}

impl MockConnector {
    /// A connector following `script`, with events delayed by 10ms.
    pub fn new(script: BrokerScript) -> Self {
        Self {
            options: MockOptions {
                script,
                event_delay: Duration::from_millis(10),
                first_sequence_number: 1,
                fail_channel_close: false,
                fail_connection_close: false,
            },
            counters: Arc::default(),
            published: Arc::default(),
        }
    }

    /// Delays scripted events by `delay`.
    #[must_use]
    pub fn with_event_delay(mut self, delay: Duration) -> Self {
        self.options.event_delay = delay;
        self
    }

    /// Starts every channel's sequence numbers at `sequence_number`.
    #[must_use]
    pub fn with_first_sequence_number(mut self, sequence_number: u64) -> Self {
        self.options.first_sequence_number = sequence_number;
        self
    }

    /// Makes `BrokerChannel::close` fail.
    #[must_use]
    pub fn with_failing_channel_close(mut self) -> Self {
        self.options.fail_channel_close = true;
        self
    }

    /// Makes `BrokerConnection::close` fail.
    #[must_use]
    pub fn with_failing_connection_close(mut self) -> Self {
        self.options.fail_connection_close = true;
        self
    }

    /// Shared call counters.
    pub fn counters(&self) -> Arc<CallCounters> {
        Arc::clone(&self.counters)
    }

    /// Messages received so far, in order.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl BrokerConnector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        if self.options.script == BrokerScript::Unreachable {
            return Err(BrokerError::Connect(
                "failed to lookup address information: Name or service not known".into(),
            ));
        }
        trace!("Mock connection opened");
        Ok(Box::new(MockConnection {
            options: self.options,
            counters: Arc::clone(&self.counters),
            published: Arc::clone(&self.published),
            open: Arc::new(AtomicBool::new(true)),
        }))
    }
}

/// A connection handed out by [`MockConnector`].
#[derive(Debug)]
pub struct MockConnection {
    options: MockOptions,
    counters: Arc<CallCounters>,
    published: Arc<Mutex<Vec<PublishedMessage>>>,
    open: Arc<AtomicBool>,
}

#[async_trait]
impl BrokerConnection for MockConnection {
    async fn create_channel(&self) -> Result<Box<dyn BrokerChannel>, BrokerError> {
        if self.options.script == BrokerScript::FailChannel {
            return Err(BrokerError::Channel("channel_max reached".into()));
        }
        self.counters.channels.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockChannel {
            options: self.options,
            counters: Arc::clone(&self.counters),
            published: Arc::clone(&self.published),
            connection_open: Arc::clone(&self.open),
            shared: Arc::new(ChannelShared {
                open: AtomicBool::new(true),
                listeners: Mutex::default(),
            }),
            next_sequence_number: AtomicU64::new(self.options.first_sequence_number),
        }))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.counters.connection_closes.fetch_add(1, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
        if self.options.fail_connection_close {
            return Err(BrokerError::Close("connection close timed out".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
struct Listeners {
    confirm: Vec<ConfirmListener>,
    returns: Vec<ReturnListener>,
    shutdown: Vec<ShutdownListener>,
}

struct ChannelShared {
    open: AtomicBool,
    listeners: Mutex<Listeners>,
}

impl ChannelShared {
    fn confirm(&self, event: ConfirmEvent) {
        for listener in &self.listeners.lock().confirm {
            listener(event);
        }
    }

    fn return_message(&self, returned: &ReturnedMessage) {
        for listener in &self.listeners.lock().returns {
            listener(returned.clone());
        }
    }

    /// Fires the shutdown listeners once; later shutdowns are ignored.
    fn shut_down(&self, signal: &ShutdownSignal) {
        if !self.open.swap(false, Ordering::SeqCst) {
            return;
        }
        for listener in &self.listeners.lock().shutdown {
            listener(signal.clone());
        }
    }
}

/// A channel handed out by [`MockConnection`].
pub struct MockChannel {
    options: MockOptions,
    counters: Arc<CallCounters>,
    published: Arc<Mutex<Vec<PublishedMessage>>>,
    connection_open: Arc<AtomicBool>,
    shared: Arc<ChannelShared>,
    next_sequence_number: AtomicU64,
}

impl std::fmt::Debug for MockChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockChannel")
            .field("script", &self.options.script)
            .field("open", &self.shared.open.load(Ordering::SeqCst))
            .field("next_sequence_number", &self.next_sequence_number)
            .finish_non_exhaustive()
    }
}

impl MockChannel {
    fn schedule(&self, request: &PublishRequest<'_>, sequence_number: u64) {
        let script = self.options.script;
        let delay = self.options.event_delay;
        let shared = Arc::clone(&self.shared);
        let connection_open = Arc::clone(&self.connection_open);
        let returned = ReturnedMessage::new(
            0,
            String::new(),
            request.exchange.to_string(),
            request.routing_key.to_string(),
            request.body.to_vec(),
        );

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!(?script, sequence_number, "Mock broker answering");
            match script {
                BrokerScript::Ack => shared.confirm(ConfirmEvent::Ack {
                    delivery_tag: sequence_number,
                    multiple: false,
                }),
                BrokerScript::Nack => shared.confirm(ConfirmEvent::Nack {
                    delivery_tag: sequence_number,
                    multiple: false,
                }),
                BrokerScript::CumulativeAck => shared.confirm(ConfirmEvent::Ack {
                    delivery_tag: sequence_number,
                    multiple: true,
                }),
                BrokerScript::Return { reply_code } => {
                    let returned = ReturnedMessage {
                        reply_code,
                        reply_text: reply_code::name(reply_code).unwrap_or("").to_string(),
                        ..returned
                    };
                    shared.return_message(&returned);
                    shared.confirm(ConfirmEvent::Ack {
                        delivery_tag: sequence_number,
                        multiple: false,
                    });
                }
                BrokerScript::ChannelShutdown { reply_code } => {
                    shared.shut_down(&ShutdownSignal::new(
                        ShutdownScope::Channel,
                        Some(reply_code),
                        reply_code::name(reply_code).unwrap_or("").to_string(),
                        false,
                    ));
                }
                BrokerScript::ConnectionShutdownWithoutCode => {
                    connection_open.store(false, Ordering::SeqCst);
                    shared.shut_down(&ShutdownSignal::new(
                        ShutdownScope::Connection,
                        None,
                        "connection reset by peer".into(),
                        false,
                    ));
                }
                BrokerScript::AckDuringPublish
                | BrokerScript::ShutdownDuringPublish { .. }
                | BrokerScript::Silent
                | BrokerScript::Unreachable
                | BrokerScript::FailChannel
                | BrokerScript::FailPublish => {}
            }
        });
    }
}

#[async_trait]
impl BrokerChannel for MockChannel {
    async fn confirm_select(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    fn add_confirm_listener(&self, listener: ConfirmListener) {
        self.shared.listeners.lock().confirm.push(listener);
    }

    fn add_return_listener(&self, listener: ReturnListener) {
        self.shared.listeners.lock().returns.push(listener);
    }

    fn add_shutdown_listener(&self, listener: ShutdownListener) {
        self.shared.listeners.lock().shutdown.push(listener);
    }

    fn next_publish_seq_no(&self) -> u64 {
        self.next_sequence_number.load(Ordering::SeqCst)
    }

    async fn basic_publish(&self, request: PublishRequest<'_>) -> Result<(), BrokerError> {
        self.counters.publishes.fetch_add(1, Ordering::SeqCst);
        let sequence_number = self.next_sequence_number.load(Ordering::SeqCst);

        match self.options.script {
            BrokerScript::FailPublish => {
                return Err(BrokerError::Publish("socket closed".into()));
            }
            BrokerScript::ShutdownDuringPublish { reply_code } => {
                self.shared.shut_down(&ShutdownSignal::new(
                    ShutdownScope::Channel,
                    Some(reply_code),
                    reply_code::name(reply_code).unwrap_or("").to_string(),
                    false,
                ));
                return Err(BrokerError::Publish("channel closed".into()));
            }
            _ => {}
        }

        self.published.lock().push(PublishedMessage {
            sequence_number,
            exchange: request.exchange.to_string(),
            routing_key: request.routing_key.to_string(),
            mandatory: request.mandatory,
            attributes: request.attributes.clone(),
            body: request.body.to_vec(),
        });
        self.next_sequence_number.fetch_add(1, Ordering::SeqCst);

        if self.options.script == BrokerScript::AckDuringPublish {
            self.shared.confirm(ConfirmEvent::Ack {
                delivery_tag: sequence_number,
                multiple: false,
            });
        } else {
            self.schedule(&request, sequence_number);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst) && self.connection_open.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.counters.channel_closes.fetch_add(1, Ordering::SeqCst);
        self.shared.shut_down(&ShutdownSignal::new(
            ShutdownScope::Channel,
            Some(reply_code::REPLY_SUCCESS),
            "OK".into(),
            true,
        ));
        if self.options.fail_channel_close {
            return Err(BrokerError::Close("channel close timed out".into()));
        }
        Ok(())
    }
}
