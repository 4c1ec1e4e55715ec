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

use std::num::ParseIntError;

use thiserror::Error;

/// A recognised property value could not be converted to its typed form.
///
/// Building attributes fails as a whole on the first such value; no partially
/// populated attributes are ever handed to the broker.
#[derive(Debug, Error)]
#[error("error processing property {key}")]
pub struct PropertyFormatError {
    /// The offending property key, exactly as the caller supplied it.
    pub key: &'static str,
    /// What went wrong while converting the value.
    #[source]
    pub cause: PropertyCause,
}

/// The underlying reason a property value was rejected.
#[derive(Debug, Error)]
pub enum PropertyCause {
    /// The value is not an integer.
    #[error(transparent)]
    Integer(#[from] ParseIntError),
    /// The value is an integer outside the range the broker accepts.
    #[error("{value} is outside the accepted range {min}..={max}")]
    OutOfRange {
        /// The parsed value.
        value: i64,
        /// Smallest accepted value.
        min: i64,
        /// Largest accepted value.
        max: i64,
    },
    /// The value does not match the configured date/time format.
    #[error(transparent)]
    Timestamp(#[from] chrono::ParseError),
    /// The value is not a JSON-encoded object.
    #[error(transparent)]
    Headers(#[from] serde_json::Error),
}

impl PropertyFormatError {
    pub(crate) const fn new(key: &'static str, cause: PropertyCause) -> Self {
        Self { key, cause }
    }
}
