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

pub use config::{BrokerConfig, ConfigError, CourierConfig, PublishConfig};
pub use error::PublishError;
pub use outcome::Outcome;
pub use outcome_resolver::{OutcomeResolver, ResolveError};
pub use outstanding_confirms::OutstandingConfirms;
pub use publish_session::{PublishSession, PublishSettings, PublishState};
pub use publisher::Publisher;

/// AMQP 0-9-1 reply codes.
pub mod reply_code;

mod config;
mod error;
mod outcome;
mod outcome_resolver;
mod outstanding_confirms;
mod publish_session;
mod publisher;
