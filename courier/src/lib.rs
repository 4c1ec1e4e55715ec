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
//! Courier
//!
//! Publishes a single message to an AMQP 0-9-1 broker and reports one
//! definitive reply code for it: `200` when the broker acknowledged it,
//! `541` when the broker rejected it, the broker's own code when the message
//! came back unroutable or the channel was closed, and `402` when the broker
//! could not be reached at all.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use courier::prelude::*;
//!
//! # async fn run() -> Result<(), PublishError> {
//! let config = CourierConfig::load();
//! let mut publisher = Publisher::from_config(Arc::new(LapinConnector::from_config(&config)), &config);
//! publisher.set_queue_name("hello".to_string());
//!
//! let code = publisher
//!     .publish_message_and_get_reply_code(b"Hello World!", None)
//!     .await?;
//! assert_eq!(code, reply_code::REPLY_SUCCESS);
//! # Ok(())
//! # }
//! ```

/// The `lapin`-backed broker client.
pub mod amqp;

/// Prelude module for convenient imports.
///
/// Everything from `courier_core::prelude` plus the `lapin` client.
pub mod prelude {
    pub use courier_core::prelude::*;

    pub use crate::amqp::{basic_properties, LapinConnector};
}
