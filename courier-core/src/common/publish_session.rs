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

//! One confirmed publish, from property parsing to resource release.
//!
//! A session opens its own connection and channel, switches the channel into
//! confirm mode and registers three listeners that all feed a single
//! [`OutcomeResolver`]:
//!
//! * the confirm listener clears the acknowledged entries from the session's
//!   [`OutstandingConfirms`] and resolves to [`Outcome::Acked`] or [`Outcome::Nacked`];
//! * the return listener resolves to [`Outcome::Returned`] with the broker's code;
//! * the shutdown listener resolves to [`Outcome::Shutdown`] with the close code.
//!
//! Whichever fires first decides the reply code. The publishing task records
//! the body under the channel's next sequence number, sends it, and waits for
//! the resolver with a bounded timeout. Channel and connection are closed on
//! every exit path, independently of each other, and close failures never
//! replace the result. If the `publish` future is dropped mid-flight, the
//! closes move to a background task on the current runtime.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::common::reply_code::{self, ReplyCode, INTERNAL_ERROR, INVALID_PATH};
use crate::common::{
    CourierConfig, Outcome, OutcomeResolver, OutstandingConfirms, PublishError, ResolveError,
};
use crate::message::{MessageAttributes, PropertyBuilder};
use crate::traits::{BrokerChannel, BrokerConnection, BrokerConnector, PublishRequest};

/// Where a message goes and how long to wait for the broker's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishSettings {
    /// Target exchange; `""` is the default exchange.
    pub exchange: String,
    /// Routing key; with the default exchange this is the queue name.
    pub routing_key: String,
    /// Ask the broker to return unroutable messages.
    pub mandatory: bool,
    /// Upper bound on the wait for a confirm, return or shutdown.
    pub timeout: Duration,
    /// `chrono` format for the `timestamp` property.
    pub date_format: String,
}

impl Default for PublishSettings {
    fn default() -> Self {
        CourierConfig::default().publish_settings()
    }
}

/// Lifecycle of a [`PublishSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublishState {
    /// Nothing has happened yet.
    Idle,
    /// Properties were converted successfully.
    AttributesBuilt,
    /// A confirm-mode channel is open and listeners are registered.
    ChannelAcquired,
    /// The message was handed to the broker client.
    Published,
    /// A listener produced the outcome.
    Resolved,
    /// No outcome arrived within the waiting window.
    TimedOut,
    /// Resources were released. Terminal.
    Closed,
}

/// A single publish attempt.
///
/// Every session owns its connection, its channel and its outstanding-confirm
/// table; nothing is shared with other sessions. Calling
/// [`publish`](Self::publish) again starts a fresh attempt.
#[derive(Debug)]
pub struct PublishSession {
    connector: Arc<dyn BrokerConnector>,
    settings: PublishSettings,
    builder: PropertyBuilder,
    confirms: OutstandingConfirms,
    resolver: OutcomeResolver,
    sequence_number: Option<u64>,
    state: Arc<Mutex<PublishState>>,
}

impl PublishSession {
    /// Creates an idle session.
    pub fn new(connector: Arc<dyn BrokerConnector>, settings: PublishSettings) -> Self {
        let builder = PropertyBuilder::new(settings.date_format.clone());
        Self {
            connector,
            settings,
            builder,
            confirms: OutstandingConfirms::new(),
            resolver: OutcomeResolver::new(),
            sequence_number: None,
            state: Arc::new(Mutex::new(PublishState::Idle)),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PublishState {
        *self.state.lock()
    }

    /// Settings this session publishes with.
    #[must_use]
    pub const fn settings(&self) -> &PublishSettings {
        &self.settings
    }

    /// The session's outstanding-confirm table.
    #[must_use]
    pub const fn confirms(&self) -> &OutstandingConfirms {
        &self.confirms
    }

    /// The resolver of the current attempt.
    ///
    /// A clone taken at any time can [`interrupt`](OutcomeResolver::interrupt)
    /// the wait of the attempt in progress, including later attempts of a
    /// reused session.
    #[must_use]
    pub const fn resolver(&self) -> &OutcomeResolver {
        &self.resolver
    }

    /// Sequence number the message was recorded under, once known.
    #[must_use]
    pub const fn sequence_number(&self) -> Option<u64> {
        self.sequence_number
    }

    /// Publishes `body` and returns the broker's reply code.
    ///
    /// An unreachable broker yields `INVALID_PATH` and an interrupted wait
    /// yields `INTERNAL_ERROR`; both are reply codes, not errors.
    ///
    /// # Errors
    ///
    /// * [`PublishError::PropertyFormat`] before anything is sent.
    /// * [`PublishError::Broker`] when channel setup or the send itself fails.
    /// * [`PublishError::Timeout`] when no outcome arrives within the configured window.
    #[instrument(
        skip(self, body, properties),
        fields(
            exchange = %self.settings.exchange,
            routing_key = %self.settings.routing_key,
            len = body.len()
        )
    )]
    pub async fn publish(
        &mut self,
        body: &[u8],
        properties: Option<&HashMap<String, String>>,
    ) -> Result<ReplyCode, PublishError> {
        if self.state() != PublishState::Idle {
            self.reset();
        }

        let attributes = match self.builder.build(properties) {
            Ok(attributes) => attributes,
            Err(err) => {
                self.transition(PublishState::Closed);
                return Err(err.into());
            }
        };
        self.transition(PublishState::AttributesBuilt);

        let connection = match self.connector.connect().await {
            Ok(connection) => connection,
            Err(err) => {
                warn!(%err, "Broker unreachable");
                self.transition(PublishState::Closed);
                return Ok(INVALID_PATH);
            }
        };

        let mut teardown = Teardown::new(
            Arc::from(connection),
            self.confirms.clone(),
            Arc::clone(&self.state),
        );
        let result = self.attempt(&mut teardown, body, &attributes).await;
        teardown.release().await;
        self.transition(PublishState::Closed);

        match &result {
            Ok(code) => trace!(
                reply_code = code,
                name = reply_code::name(*code).unwrap_or("unknown"),
                "Publish finished"
            ),
            Err(err) => trace!(%err, "Publish failed"),
        }
        result
    }

    async fn attempt(
        &mut self,
        teardown: &mut Teardown,
        body: &[u8],
        attributes: &MessageAttributes,
    ) -> Result<ReplyCode, PublishError> {
        let channel: Arc<dyn BrokerChannel> =
            Arc::from(teardown.connection.create_channel().await?);
        teardown.channel = Some(Arc::clone(&channel));
        channel.confirm_select().await?;
        self.register_listeners(&*channel);
        self.transition(PublishState::ChannelAcquired);

        // Recorded before the send: a confirm can arrive before basic_publish returns.
        let sequence_number = channel.next_publish_seq_no();
        self.sequence_number = Some(sequence_number);
        teardown.sequence_number = Some(sequence_number);
        self.confirms.record(sequence_number, body);

        let request = PublishRequest::new(
            &self.settings.exchange,
            &self.settings.routing_key,
            self.settings.mandatory,
            attributes,
            body,
        );
        let sent = channel.basic_publish(request).await;
        if let Err(err) = sent {
            if let Some(outcome) = self.resolver.outcome() {
                debug!(%err, %outcome, "Send failed after the outcome was already decided");
                self.transition(PublishState::Resolved);
                return Ok(outcome.reply_code());
            }
            error!(%err, sequence_number, "Failed to publish message");
            return Err(err.into());
        }
        self.transition(PublishState::Published);

        match self.resolver.wait_for(self.settings.timeout).await {
            Ok(outcome) => {
                self.transition(PublishState::Resolved);
                Ok(outcome.reply_code())
            }
            Err(ResolveError::Timeout(waited)) => {
                self.transition(PublishState::TimedOut);
                warn!(sequence_number, ?waited, "No confirmation received in time");
                Err(PublishError::Timeout(waited))
            }
            Err(ResolveError::Interrupted) => {
                warn!(sequence_number, "Wait for confirmation was interrupted");
                self.transition(PublishState::Resolved);
                Ok(INTERNAL_ERROR)
            }
        }
    }

    fn register_listeners(&self, channel: &dyn BrokerChannel) {
        let confirms = self.confirms.clone();
        let resolver = self.resolver.clone();
        channel.add_confirm_listener(Box::new(move |event| {
            let delivery_tag = event.delivery_tag();
            let multiple = event.multiple();
            confirms.resolve(delivery_tag, multiple);
            let outcome = if event.is_ack() {
                info!(delivery_tag, multiple, "Message acknowledged");
                Outcome::Acked
            } else {
                info!(delivery_tag, multiple, "Message negatively acknowledged");
                Outcome::Nacked
            };
            resolver.complete(outcome);
        }));

        let resolver = self.resolver.clone();
        channel.add_return_listener(Box::new(move |returned| {
            error!(
                reply_code = returned.reply_code,
                reply_text = %returned.reply_text,
                exchange = %returned.exchange,
                routing_key = %returned.routing_key,
                "Message returned"
            );
            resolver.complete(Outcome::Returned {
                reply_code: returned.reply_code,
                reply_text: returned.reply_text,
            });
        }));

        let resolver = self.resolver.clone();
        channel.add_shutdown_listener(Box::new(move |signal| {
            let reply_code = signal.effective_reply_code();
            if signal.initiated_by_application {
                debug!(scope = ?signal.scope, reply_code, "Channel closed by application");
            } else if !reply_code::is_hard_error(reply_code) {
                warn!(
                    scope = ?signal.scope,
                    reply_code,
                    reply_text = %signal.reply_text,
                    "Channel closed by broker"
                );
            } else {
                error!(
                    scope = ?signal.scope,
                    reply_code,
                    reply_text = %signal.reply_text,
                    "Channel or connection shut down"
                );
            }
            resolver.complete(Outcome::Shutdown {
                reply_code,
                reply_text: signal.reply_text,
            });
        }));
    }

    fn reset(&mut self) {
        trace!("Starting a fresh attempt");
        self.confirms = OutstandingConfirms::new();
        self.resolver = self.resolver.renewed();
        self.sequence_number = None;
        *self.state.lock() = PublishState::Idle;
    }

    fn transition(&self, next: PublishState) {
        let mut state = self.state.lock();
        trace!(from = ?*state, to = ?next, "Publish state transition");
        *state = next;
    }
}

/// Broker resources of one attempt.
///
/// [`release`](Self::release) closes them on the normal path. Dropped while
/// still armed, it drops the tracker entry, marks the session `Closed` and
/// hands the closes to a task on the current runtime.
struct Teardown {
    connection: Arc<dyn BrokerConnection>,
    channel: Option<Arc<dyn BrokerChannel>>,
    sequence_number: Option<u64>,
    confirms: OutstandingConfirms,
    state: Arc<Mutex<PublishState>>,
    armed: bool,
}

impl Teardown {
    fn new(
        connection: Arc<dyn BrokerConnection>,
        confirms: OutstandingConfirms,
        state: Arc<Mutex<PublishState>>,
    ) -> Self {
        Self {
            connection,
            channel: None,
            sequence_number: None,
            confirms,
            state,
            armed: true,
        }
    }

    async fn release(&mut self) {
        self.armed = false;
        self.forget_entry();
        close_resources(self.channel.take(), Arc::clone(&self.connection)).await;
    }

    fn forget_entry(&self) {
        if let Some(sequence_number) = self.sequence_number {
            if self.confirms.resolve(sequence_number, false) > 0 {
                debug!(sequence_number, "Dropped unconfirmed entry");
            }
        }
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.forget_entry();
        {
            let mut state = self.state.lock();
            trace!(from = ?*state, to = ?PublishState::Closed, "Publish state transition");
            *state = PublishState::Closed;
        }

        let channel = self.channel.take();
        let connection = Arc::clone(&self.connection);
        match Handle::try_current() {
            Ok(handle) => {
                warn!("Publish cancelled, closing channel and connection in the background");
                handle.spawn(close_resources(channel, connection));
            }
            Err(_) => {
                error!("Publish cancelled outside a runtime, channel and connection left unclosed");
            }
        }
    }
}

async fn close_resources(
    channel: Option<Arc<dyn BrokerChannel>>,
    connection: Arc<dyn BrokerConnection>,
) {
    if let Some(channel) = channel.filter(|channel| channel.is_open()) {
        if let Err(err) = channel.close().await {
            error!(%err, "Error closing channel");
        }
    }
    if connection.is_open() {
        if let Err(err) = connection.close().await {
            error!(%err, "Error closing connection");
        }
    }
}
