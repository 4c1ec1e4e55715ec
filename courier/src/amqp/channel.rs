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

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use courier_core::prelude::*;
use lapin::message::BasicReturnMessage;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use lapin::publisher_confirm::Confirmation;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::amqp::properties::basic_properties;

/// Listeners registered on one channel, plus the once-only shutdown latch.
#[derive(Default)]
pub(crate) struct ChannelListeners {
    shut_down: AtomicBool,
    confirm: Mutex<Vec<ConfirmListener>>,
    returns: Mutex<Vec<ReturnListener>>,
    shutdown: Mutex<Vec<ShutdownListener>>,
}

impl ChannelListeners {
    fn confirm(&self, event: ConfirmEvent) {
        for listener in self.confirm.lock().iter() {
            listener(event);
        }
    }

    fn return_message(&self, returned: &ReturnedMessage) {
        for listener in self.returns.lock().iter() {
            listener(returned.clone());
        }
    }

    /// Fires the shutdown listeners; only the first shutdown is reported.
    pub(crate) fn shut_down(&self, signal: &ShutdownSignal) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        for listener in self.shutdown.lock().iter() {
            listener(signal.clone());
        }
    }
}

/// Builds the shutdown cause for a `lapin` error.
///
/// Protocol closes carry the broker's reply code; anything else (I/O,
/// heartbeat loss, parser errors) has none.
pub(crate) fn shutdown_signal(scope: ShutdownScope, err: &lapin::Error) -> ShutdownSignal {
    match err {
        lapin::Error::ProtocolError(amqp_error) => ShutdownSignal::new(
            scope,
            Some(amqp_error.get_id()),
            amqp_error.get_message().as_str().to_string(),
            false,
        ),
        other => ShutdownSignal::new(scope, None, other.to_string(), false),
    }
}

fn returned_message(returned: BasicReturnMessage) -> ReturnedMessage {
    ReturnedMessage::new(
        returned.reply_code,
        returned.reply_text.as_str().to_string(),
        returned.delivery.exchange.as_str().to_string(),
        returned.delivery.routing_key.as_str().to_string(),
        returned.delivery.data,
    )
}

/// A [`BrokerChannel`] over a `lapin` channel.
///
/// `lapin` reports each publish's confirm through its own future; the channel
/// awaits it on a spawned task and turns the result into listener calls:
/// a returned message first, then the ack or nack. A failed confirm (the
/// broker closed the channel) fires the shutdown listeners.
pub struct LapinChannel {
    channel: lapin::Channel,
    listeners: Arc<ChannelListeners>,
    next_sequence_number: AtomicU64,
}

impl std::fmt::Debug for LapinChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LapinChannel")
            .field("id", &self.channel.id())
            .field("next_sequence_number", &self.next_sequence_number)
            .finish_non_exhaustive()
    }
}

impl LapinChannel {
    pub(crate) fn new(channel: lapin::Channel, listeners: Arc<ChannelListeners>) -> Self {
        let on_error = Arc::clone(&listeners);
        channel.on_error(move |err| {
            on_error.shut_down(&shutdown_signal(ShutdownScope::Channel, &err));
        });
        Self {
            channel,
            listeners,
            next_sequence_number: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl BrokerChannel for LapinChannel {
    async fn confirm_select(&self) -> Result<(), BrokerError> {
        self.channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|err| BrokerError::Channel(err.to_string()))
    }

    fn add_confirm_listener(&self, listener: ConfirmListener) {
        self.listeners.confirm.lock().push(listener);
    }

    fn add_return_listener(&self, listener: ReturnListener) {
        self.listeners.returns.lock().push(listener);
    }

    fn add_shutdown_listener(&self, listener: ShutdownListener) {
        self.listeners.shutdown.lock().push(listener);
    }

    fn next_publish_seq_no(&self) -> u64 {
        self.next_sequence_number.load(Ordering::SeqCst)
    }

    async fn basic_publish(&self, request: PublishRequest<'_>) -> Result<(), BrokerError> {
        let options = BasicPublishOptions {
            mandatory: request.mandatory,
            ..BasicPublishOptions::default()
        };
        let confirm = self
            .channel
            .basic_publish(
                request.exchange,
                request.routing_key,
                options,
                request.body,
                basic_properties(request.attributes),
            )
            .await
            .map_err(|err| BrokerError::Publish(err.to_string()))?;
        let delivery_tag = self.next_sequence_number.fetch_add(1, Ordering::SeqCst);
        trace!(channel = self.channel.id(), delivery_tag, "Message handed to lapin");

        let listeners = Arc::clone(&self.listeners);
        tokio::spawn(async move {
            match confirm.await {
                Ok(Confirmation::Ack(returned)) => {
                    if let Some(returned) = returned {
                        listeners.return_message(&returned_message(*returned));
                    }
                    listeners.confirm(ConfirmEvent::Ack {
                        delivery_tag,
                        multiple: false,
                    });
                }
                Ok(Confirmation::Nack(returned)) => {
                    if let Some(returned) = returned {
                        listeners.return_message(&returned_message(*returned));
                    }
                    listeners.confirm(ConfirmEvent::Nack {
                        delivery_tag,
                        multiple: false,
                    });
                }
                Ok(Confirmation::NotRequested) => {
                    warn!(delivery_tag, "Confirm not requested on a confirm-mode channel");
                }
                Err(err) => {
                    debug!(delivery_tag, %err, "Publisher confirm failed");
                    listeners.shut_down(&shutdown_signal(ShutdownScope::Channel, &err));
                }
            }
        });
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.channel.status().connected()
    }

    async fn close(&self) -> Result<(), BrokerError> {
        let result = self
            .channel
            .close(reply_code::REPLY_SUCCESS, "OK")
            .await
            .map_err(|err| BrokerError::Close(err.to_string()));
        self.listeners.shut_down(&ShutdownSignal::new(
            ShutdownScope::Channel,
            Some(reply_code::REPLY_SUCCESS),
            "OK".into(),
            true,
        ));
        result
    }
}
