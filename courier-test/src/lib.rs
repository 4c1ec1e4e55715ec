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
//! Test support for Courier.
//!
//! * [`MockConnector`]: an in-memory broker client that answers every publish
//!   according to a [`BrokerScript`] and counts what it was asked to do.
//! * [`initialize_tracing`]: a once-only tracing subscriber writing to `logs/`.

pub use mock_broker::{
    BrokerScript, CallCounters, MockChannel, MockConnection, MockConnector, PublishedMessage,
};
pub use setup::initialize_tracing;

/// Scripted in-memory broker client.
mod mock_broker;
/// Shared tracing setup.
mod setup;
