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

use std::fmt;

use crate::common::reply_code::{self, ReplyCode, INTERNAL_ERROR, REPLY_SUCCESS};

/// What happened to one published message.
///
/// Broker-reported failures are outcomes, not errors: a nack, a return and a
/// shutdown are all valid, resolved answers that carry a reply code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The broker acknowledged the message.
    Acked,
    /// The broker negatively acknowledged the message.
    Nacked,
    /// The broker could not route the message and sent it back.
    Returned {
        /// Reply code supplied by the broker.
        reply_code: ReplyCode,
        /// Reply text supplied by the broker.
        reply_text: String,
    },
    /// The channel or connection closed before any other answer arrived.
    Shutdown {
        /// Reply code taken from the close reason.
        reply_code: ReplyCode,
        /// Reply text taken from the close reason.
        reply_text: String,
    },
}

impl Outcome {
    /// The reply code reported to the caller for this outcome.
    #[must_use]
    pub const fn reply_code(&self) -> ReplyCode {
        match self {
            Self::Acked => REPLY_SUCCESS,
            Self::Nacked => INTERNAL_ERROR,
            Self::Returned { reply_code, .. } | Self::Shutdown { reply_code, .. } => *reply_code,
        }
    }

    /// Returns `true` only for [`Outcome::Acked`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Acked)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.reply_code();
        let name = reply_code::name(code).unwrap_or("unknown");
        match self {
            Self::Acked => write!(f, "acked ({code} {name})"),
            Self::Nacked => write!(f, "nacked ({code} {name})"),
            Self::Returned { reply_text, .. } => {
                write!(f, "returned ({code} {name}): {reply_text}")
            }
            Self::Shutdown { reply_text, .. } => {
                write!(f, "shutdown ({code} {name}): {reply_text}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::reply_code::{NOT_FOUND, PRECONDITION_FAILED};

    #[test]
    fn reply_codes_follow_the_outcome() {
        assert_eq!(Outcome::Acked.reply_code(), REPLY_SUCCESS);
        assert_eq!(Outcome::Nacked.reply_code(), INTERNAL_ERROR);
        let returned = Outcome::Returned {
            reply_code: NOT_FOUND,
            reply_text: "NOT_FOUND".into(),
        };
        assert_eq!(returned.reply_code(), NOT_FOUND);
        let shutdown = Outcome::Shutdown {
            reply_code: PRECONDITION_FAILED,
            reply_text: "PRECONDITION_FAILED - message size".into(),
        };
        assert_eq!(shutdown.reply_code(), PRECONDITION_FAILED);
    }

    #[test]
    fn display_names_the_code() {
        let text = Outcome::Returned {
            reply_code: NOT_FOUND,
            reply_text: "no exchange".into(),
        }
        .to_string();
        assert!(text.contains("404"));
        assert!(text.contains("not-found"));
        assert!(text.contains("no exchange"));
    }
}
