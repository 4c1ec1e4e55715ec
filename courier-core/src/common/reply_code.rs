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

//! AMQP 0-9-1 reply codes.
//!
//! Values are the protocol constants, reproduced verbatim. Codes received from
//! the broker (on a return or a close) are passed through unchanged, so callers
//! may see any value in the `u16` range, not only the ones named here.

/// A broker reply code.
pub type ReplyCode = u16;

/// The operation completed successfully.
pub const REPLY_SUCCESS: ReplyCode = 200;
/// The message was too large to be delivered.
pub const CONTENT_TOO_LARGE: ReplyCode = 311;
/// A mandatory message could not be routed to any queue.
pub const NO_ROUTE: ReplyCode = 312;
/// An immediate message had no consumer to deliver to.
pub const NO_CONSUMERS: ReplyCode = 313;
/// An operator closed the connection.
pub const CONNECTION_FORCED: ReplyCode = 320;
/// The client tried to work with an unknown virtual host, or could not reach the broker at all.
pub const INVALID_PATH: ReplyCode = 402;
/// The client lacks permission for the requested entity.
pub const ACCESS_REFUSED: ReplyCode = 403;
/// The client worked with an entity that does not exist.
pub const NOT_FOUND: ReplyCode = 404;
/// The entity is locked by another client.
pub const RESOURCE_LOCKED: ReplyCode = 405;
/// A precondition for the requested method failed.
pub const PRECONDITION_FAILED: ReplyCode = 406;
/// A malformed frame was received.
pub const FRAME_ERROR: ReplyCode = 501;
/// A frame contained illegal field values.
pub const SYNTAX_ERROR: ReplyCode = 502;
/// An invalid sequence of frames was received.
pub const COMMAND_INVALID: ReplyCode = 503;
/// A channel was used that was not correctly opened.
pub const CHANNEL_ERROR: ReplyCode = 504;
/// A frame arrived that the peer did not expect.
pub const UNEXPECTED_FRAME: ReplyCode = 505;
/// The server ran out of a resource.
pub const RESOURCE_ERROR: ReplyCode = 506;
/// The method is not allowed in the current state.
pub const NOT_ALLOWED: ReplyCode = 530;
/// The method is not implemented by the server.
pub const NOT_IMPLEMENTED: ReplyCode = 540;
/// An internal error occurred, or the broker negatively acknowledged a message.
pub const INTERNAL_ERROR: ReplyCode = 541;

/// Returns the protocol name of a reply code, or `None` for codes outside the AMQP table.
#[must_use]
pub const fn name(code: ReplyCode) -> Option<&'static str> {
    match code {
        REPLY_SUCCESS => Some("reply-success"),
        CONTENT_TOO_LARGE => Some("content-too-large"),
        NO_ROUTE => Some("no-route"),
        NO_CONSUMERS => Some("no-consumers"),
        CONNECTION_FORCED => Some("connection-forced"),
        INVALID_PATH => Some("invalid-path"),
        ACCESS_REFUSED => Some("access-refused"),
        NOT_FOUND => Some("not-found"),
        RESOURCE_LOCKED => Some("resource-locked"),
        PRECONDITION_FAILED => Some("precondition-failed"),
        FRAME_ERROR => Some("frame-error"),
        SYNTAX_ERROR => Some("syntax-error"),
        COMMAND_INVALID => Some("command-invalid"),
        CHANNEL_ERROR => Some("channel-error"),
        UNEXPECTED_FRAME => Some("unexpected-frame"),
        RESOURCE_ERROR => Some("resource-error"),
        NOT_ALLOWED => Some("not-allowed"),
        NOT_IMPLEMENTED => Some("not-implemented"),
        INTERNAL_ERROR => Some("internal-error"),
        _ => None,
    }
}

/// Returns `true` for the codes the protocol classifies as hard (connection-level) errors.
#[must_use]
pub const fn is_hard_error(code: ReplyCode) -> bool {
    matches!(
        code,
        CONNECTION_FORCED
            | INVALID_PATH
            | FRAME_ERROR
            | SYNTAX_ERROR
            | COMMAND_INVALID
            | CHANNEL_ERROR
            | UNEXPECTED_FRAME
            | RESOURCE_ERROR
            | NOT_ALLOWED
            | NOT_IMPLEMENTED
            | INTERNAL_ERROR
    )
}
