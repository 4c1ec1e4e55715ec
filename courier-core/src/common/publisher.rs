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
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use tracing::{debug, instrument, trace, warn};

use crate::common::reply_code::ReplyCode;
use crate::common::{CourierConfig, PublishError, PublishSession, PublishSettings};
use crate::traits::{BrokerConnector, ReplyCodePublisher, TargetedPublisher};

/// Shared runtime for [`Publisher::publish_blocking`] calls made outside any Tokio runtime.
///
/// Multi-threaded with one worker, so tasks the broker client spawns keep
/// running while the caller's thread is blocked.
static BLOCKING_RUNTIME: OnceLock<Runtime> = OnceLock::new();

fn blocking_runtime() -> Result<&'static Runtime, PublishError> {
    if let Some(runtime) = BLOCKING_RUNTIME.get() {
        return Ok(runtime);
    }
    debug!("Creating shared fallback runtime for blocking publishes");
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .thread_name("courier-blocking")
        .build()?;
    Ok(BLOCKING_RUNTIME.get_or_init(|| runtime))
}

/// Publishes single messages to a fixed exchange and queue and reports the reply code.
///
/// Each call runs its own [`PublishSession`] on a fresh connection, so a
/// `Publisher` can be shared (behind an `Arc`) by any number of concurrent
/// callers. Exchange and queue may be changed between calls; the waiting
/// window and the timestamp format are fixed when the publisher is created.
///
/// ```rust,ignore
/// let mut publisher = Publisher::new(Arc::new(LapinConnector::new(uri)), PublishSettings::default());
/// publisher.set_queue_name("hello".to_string());
/// let code = publisher.publish_message_and_get_reply_code(b"hi", None).await?;
/// assert_eq!(code, REPLY_SUCCESS);
/// ```
#[derive(Debug, Clone)]
pub struct Publisher {
    connector: Arc<dyn BrokerConnector>,
    settings: PublishSettings,
}

impl Publisher {
    /// Creates a publisher over `connector`.
    pub fn new(connector: Arc<dyn BrokerConnector>, settings: PublishSettings) -> Self {
        Self {
            connector,
            settings,
        }
    }

    /// Creates a publisher with the `[publish]` section of `config`.
    pub fn from_config(connector: Arc<dyn BrokerConnector>, config: &CourierConfig) -> Self {
        Self::new(connector, config.publish_settings())
    }

    /// Settings the next publish will use.
    #[must_use]
    pub const fn settings(&self) -> &PublishSettings {
        &self.settings
    }

    /// A fresh session carrying this publisher's current settings.
    #[must_use]
    pub fn session(&self) -> PublishSession {
        PublishSession::new(Arc::clone(&self.connector), self.settings.clone())
    }

    /// Synchronous form of
    /// [`publish_message_and_get_reply_code`](ReplyCodePublisher::publish_message_and_get_reply_code).
    ///
    /// Inside a multi-threaded Tokio runtime the current worker is handed over
    /// with `block_in_place`. Outside any runtime a shared single-worker
    /// runtime is created on first use.
    ///
    /// # Errors
    ///
    /// As the async form, plus [`PublishError::BlockingInCurrentThreadRuntime`]
    /// when called from a current-thread runtime.
    #[instrument(skip(self, body, properties), fields(len = body.len()))]
    pub fn publish_blocking(
        &self,
        body: &[u8],
        properties: Option<&HashMap<String, String>>,
    ) -> Result<ReplyCode, PublishError> {
        let publish = self.publish_message_and_get_reply_code(body, properties);
        match Handle::try_current() {
            Ok(handle) => {
                if handle.runtime_flavor() == RuntimeFlavor::CurrentThread {
                    warn!("publish_blocking() called on a current-thread runtime");
                    return Err(PublishError::BlockingInCurrentThreadRuntime);
                }
                trace!("Blocking in place on the current runtime");
                tokio::task::block_in_place(|| handle.block_on(publish))
            }
            Err(_) => {
                trace!("Blocking on the shared fallback runtime");
                blocking_runtime()?.block_on(publish)
            }
        }
    }
}

#[async_trait]
impl ReplyCodePublisher for Publisher {
    async fn publish_message_and_get_reply_code(
        &self,
        body: &[u8],
        properties: Option<&HashMap<String, String>>,
    ) -> Result<ReplyCode, PublishError> {
        self.session().publish(body, properties).await
    }
}

impl TargetedPublisher for Publisher {
    fn set_exchange_name(&mut self, exchange_name: String) {
        self.settings.exchange = exchange_name;
    }

    fn set_queue_name(&mut self, queue_name: String) {
        self.settings.routing_key = queue_name;
    }

    fn exchange_name(&self) -> &str {
        &self.settings.exchange
    }

    fn queue_name(&self) -> &str {
        &self.settings.routing_key
    }
}
