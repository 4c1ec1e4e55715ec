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

//! Contracts at the edges of the crate: what a broker client must provide and
//! what a publisher offers its callers.

pub use broker_client::{
    BrokerChannel, BrokerConnection, BrokerConnector, BrokerError, ConfirmEvent, ConfirmListener,
    PublishRequest, ReturnListener, ReturnedMessage, ShutdownListener, ShutdownScope,
    ShutdownSignal,
};
pub use targeted_publisher::{ReplyCodePublisher, TargetedPublisher};

/// Broker-client traits and the events they deliver.
mod broker_client;
/// Publisher-facing traits.
mod targeted_publisher;
