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

//! Translation of a string-keyed property bag into typed [`MessageAttributes`].
//!
//! Callers hand properties over as plain strings (from configuration, another
//! language, a command line). Each recognised key has exactly one coercion rule
//! in [`PROPERTY_RULES`]; unknown keys are ignored. The first value that fails
//! its rule fails the whole build.
//!
//! ```rust,ignore
//! let builder = PropertyBuilder::new("%Y-%m-%d %H:%M:%S");
//! let mut properties = HashMap::new();
//! properties.insert("priority".to_string(), "5".to_string());
//! properties.insert("headers".to_string(), r#"{"tenant":"acme"}"#.to_string());
//! let attributes = builder.build(Some(&properties))?;
//! ```

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use tracing::{error, trace};

use crate::message::{DeliveryMode, MessageAttributes, PropertyCause, PropertyFormatError};

/// Coerces one raw value into the attributes being built.
type Coercion = fn(&PropertyBuilder, &str, &mut MessageAttributes) -> Result<(), PropertyCause>;

/// One entry of the key → coercion table.
struct PropertyRule {
    key: &'static str,
    apply: Coercion,
}

/// Every recognised property key and its coercion, in evaluation order.
static PROPERTY_RULES: [PropertyRule; 13] = [
    PropertyRule {
        key: "deliveryMode",
        apply: delivery_mode,
    },
    PropertyRule {
        key: "expiration",
        apply: |_, value, attributes| {
            attributes.expiration = Some(value.to_owned());
            Ok(())
        },
    },
    PropertyRule {
        key: "priority",
        apply: priority,
    },
    PropertyRule {
        key: "userId",
        apply: |_, value, attributes| {
            attributes.user_id = Some(value.to_owned());
            Ok(())
        },
    },
    PropertyRule {
        key: "appId",
        apply: |_, value, attributes| {
            attributes.app_id = Some(value.to_owned());
            Ok(())
        },
    },
    PropertyRule {
        key: "contentEncoding",
        apply: |_, value, attributes| {
            attributes.content_encoding = Some(value.to_owned());
            Ok(())
        },
    },
    PropertyRule {
        key: "contentType",
        apply: |_, value, attributes| {
            attributes.content_type = Some(value.to_owned());
            Ok(())
        },
    },
    PropertyRule {
        key: "correlationId",
        apply: |_, value, attributes| {
            attributes.correlation_id = Some(value.to_owned());
            Ok(())
        },
    },
    PropertyRule {
        key: "messageId",
        apply: |_, value, attributes| {
            attributes.message_id = Some(value.to_owned());
            Ok(())
        },
    },
    PropertyRule {
        key: "replyTo",
        apply: |_, value, attributes| {
            attributes.reply_to = Some(value.to_owned());
            Ok(())
        },
    },
    PropertyRule {
        key: "timestamp",
        apply: timestamp,
    },
    PropertyRule {
        key: "type",
        apply: |_, value, attributes| {
            attributes.kind = Some(value.to_owned());
            Ok(())
        },
    },
    PropertyRule {
        key: "headers",
        apply: headers,
    },
];

/// Builds [`MessageAttributes`] from an untyped property bag.
///
/// The only configuration is the `chrono` format string used for the
/// `timestamp` property, fixed at construction.
#[derive(Debug, Clone)]
pub struct PropertyBuilder {
    date_format: String,
}

impl PropertyBuilder {
    /// Creates a builder that parses timestamps with `date_format` (`chrono` syntax).
    pub fn new(date_format: impl Into<String>) -> Self {
        Self {
            date_format: date_format.into(),
        }
    }

    /// The configured timestamp format.
    #[must_use]
    pub fn date_format(&self) -> &str {
        &self.date_format
    }

    /// The property keys this builder understands, in evaluation order.
    pub fn recognized_keys() -> impl Iterator<Item = &'static str> {
        PROPERTY_RULES.iter().map(|rule| rule.key)
    }

    /// Returns `true` if `key` has a coercion rule.
    #[must_use]
    pub fn is_recognized(key: &str) -> bool {
        PROPERTY_RULES.iter().any(|rule| rule.key == key)
    }

    /// Builds typed attributes from `properties`.
    ///
    /// `None` yields empty attributes. Keys without a rule are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyFormatError`] naming the first recognised key (in
    /// [`recognized_keys`](Self::recognized_keys) order) whose value could not
    /// be converted.
    pub fn build(
        &self,
        properties: Option<&HashMap<String, String>>,
    ) -> Result<MessageAttributes, PropertyFormatError> {
        let mut attributes = MessageAttributes::default();
        let Some(properties) = properties else {
            return Ok(attributes);
        };

        for rule in &PROPERTY_RULES {
            let Some(value) = properties.get(rule.key) else {
                continue;
            };
            (rule.apply)(self, value, &mut attributes).map_err(|cause| {
                error!(key = rule.key, %cause, "Error processing property");
                PropertyFormatError::new(rule.key, cause)
            })?;
        }

        for key in properties.keys().filter(|key| !Self::is_recognized(key)) {
            trace!(key = %key, "Ignoring unrecognized property");
        }
        Ok(attributes)
    }

    fn parse_timestamp(&self, value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        if let Ok(with_offset) = DateTime::parse_from_str(value, &self.date_format) {
            return Ok(with_offset.with_timezone(&Utc));
        }
        match NaiveDateTime::parse_from_str(value, &self.date_format) {
            Ok(naive) => Ok(Utc.from_utc_datetime(&naive)),
            // A date-only format still yields a point in time: midnight UTC.
            Err(err) => NaiveDate::parse_from_str(value, &self.date_format)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| Utc.from_utc_datetime(&naive))
                .ok_or(err),
        }
    }
}

fn parse_bounded(value: &str, min: i64, max: i64) -> Result<i64, PropertyCause> {
    let parsed: i64 = value.parse()?;
    if (min..=max).contains(&parsed) {
        Ok(parsed)
    } else {
        Err(PropertyCause::OutOfRange {
            value: parsed,
            min,
            max,
        })
    }
}

fn delivery_mode(
    _: &PropertyBuilder,
    value: &str,
    attributes: &mut MessageAttributes,
) -> Result<(), PropertyCause> {
    let mode = parse_bounded(value, 0, i64::from(u8::MAX))?;
    attributes.delivery_mode = u8::try_from(mode).ok().map(DeliveryMode::from_u8);
    Ok(())
}

fn priority(
    _: &PropertyBuilder,
    value: &str,
    attributes: &mut MessageAttributes,
) -> Result<(), PropertyCause> {
    let priority = parse_bounded(value, 0, i64::from(u8::MAX))?;
    attributes.priority = u8::try_from(priority).ok();
    Ok(())
}

fn timestamp(
    builder: &PropertyBuilder,
    value: &str,
    attributes: &mut MessageAttributes,
) -> Result<(), PropertyCause> {
    attributes.timestamp = Some(builder.parse_timestamp(value)?);
    Ok(())
}

fn headers(
    _: &PropertyBuilder,
    value: &str,
    attributes: &mut MessageAttributes,
) -> Result<(), PropertyCause> {
    let decoded: BTreeMap<String, serde_json::Value> = serde_json::from_str(value)?;
    attributes.headers = Some(decoded);
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Datelike;
    use serde_json::json;

    use super::*;

    const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    fn bag(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect()
    }

    fn builder() -> PropertyBuilder {
        PropertyBuilder::new(DATE_FORMAT)
    }

    #[test]
    fn absent_bag_builds_empty_attributes() {
        let attributes = builder().build(None).unwrap();
        assert!(attributes.is_empty());
    }

    #[test]
    fn every_recognized_key_is_applied() {
        let properties = bag(&[
            ("deliveryMode", "2"),
            ("expiration", "60000"),
            ("priority", "7"),
            ("userId", "guest"),
            ("appId", "billing"),
            ("contentEncoding", "gzip"),
            ("contentType", "application/json"),
            ("correlationId", "corr-1"),
            ("messageId", "msg-1"),
            ("replyTo", "replies"),
            ("timestamp", "2024-03-01 12:30:00"),
            ("type", "invoice.created"),
            ("headers", r#"{"tenant":"acme","retries":3,"tags":["a","b"]}"#),
        ]);

        let attributes = builder().build(Some(&properties)).unwrap();

        assert_eq!(attributes.delivery_mode, Some(DeliveryMode::Persistent));
        assert_eq!(attributes.expiration.as_deref(), Some("60000"));
        assert_eq!(attributes.priority, Some(7));
        assert_eq!(attributes.user_id.as_deref(), Some("guest"));
        assert_eq!(attributes.app_id.as_deref(), Some("billing"));
        assert_eq!(attributes.content_encoding.as_deref(), Some("gzip"));
        assert_eq!(attributes.content_type.as_deref(), Some("application/json"));
        assert_eq!(attributes.correlation_id.as_deref(), Some("corr-1"));
        assert_eq!(attributes.message_id.as_deref(), Some("msg-1"));
        assert_eq!(attributes.reply_to.as_deref(), Some("replies"));
        assert_eq!(attributes.kind.as_deref(), Some("invoice.created"));

        let timestamp = attributes.timestamp.unwrap();
        assert_eq!(timestamp.to_rfc3339(), "2024-03-01T12:30:00+00:00");

        let headers = attributes.headers.unwrap();
        assert_eq!(headers["tenant"], json!("acme"));
        assert_eq!(headers["retries"], json!(3));
        assert_eq!(headers["tags"], json!(["a", "b"]));
    }

    #[test]
    fn identical_input_builds_identical_attributes() {
        let properties = bag(&[
            ("priority", "1"),
            ("timestamp", "2023-12-31 23:59:59"),
            ("headers", r#"{"x":{"y":[1,2.5,null,true]}}"#),
            ("messageId", "same"),
        ]);
        let first = builder().build(Some(&properties)).unwrap();
        let second = builder().build(Some(&properties)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let properties = bag(&[("colour", "blue"), ("DeliveryMode", "not-a-number")]);
        let attributes = builder().build(Some(&properties)).unwrap();
        assert!(attributes.is_empty());
    }

    #[test]
    fn non_numeric_integers_name_their_key() {
        for key in ["deliveryMode", "priority"] {
            let properties = bag(&[(key, "not-a-number"), ("appId", "ignored")]);
            let err = builder().build(Some(&properties)).unwrap_err();
            assert_eq!(err.key, key);
            assert!(matches!(err.cause, PropertyCause::Integer(_)));
        }
    }

    #[test]
    fn out_of_range_integers_are_rejected() {
        let err = builder()
            .build(Some(&bag(&[("deliveryMode", "300")])))
            .unwrap_err();
        assert_eq!(err.key, "deliveryMode");
        assert!(matches!(
            err.cause,
            PropertyCause::OutOfRange { value: 300, min: 0, max: 255 }
        ));

        let err = builder()
            .build(Some(&bag(&[("priority", "256")])))
            .unwrap_err();
        assert_eq!(err.key, "priority");

        let err = builder()
            .build(Some(&bag(&[("priority", "-1")])))
            .unwrap_err();
        assert_eq!(err.key, "priority");
    }

    #[test]
    fn unusual_delivery_modes_pass_through() {
        let attributes = builder()
            .build(Some(&bag(&[("deliveryMode", "3")])))
            .unwrap();
        assert_eq!(attributes.delivery_mode, Some(DeliveryMode::Other(3)));
        assert_eq!(DeliveryMode::Other(3).as_u8(), 3);
        assert_eq!(DeliveryMode::from_u8(1), DeliveryMode::Transient);
    }

    #[test]
    fn unparseable_timestamp_names_its_key() {
        let err = builder()
            .build(Some(&bag(&[("timestamp", "01/03/2024")])))
            .unwrap_err();
        assert_eq!(err.key, "timestamp");
        assert!(matches!(err.cause, PropertyCause::Timestamp(_)));
    }

    #[test]
    fn malformed_headers_fail_the_build() {
        for raw in [r#"{"tenant": "#, "[1, 2, 3]", "\"just a string\""] {
            let err = builder()
                .build(Some(&bag(&[("headers", raw), ("priority", "1")])))
                .unwrap_err();
            assert_eq!(err.key, "headers");
            assert!(matches!(err.cause, PropertyCause::Headers(_)));
        }
    }

    #[test]
    fn date_only_formats_resolve_to_midnight_utc() {
        let builder = PropertyBuilder::new("%Y-%m-%d");
        let attributes = builder
            .build(Some(&bag(&[("timestamp", "2024-02-29")])))
            .unwrap();
        let timestamp = attributes.timestamp.unwrap();
        assert_eq!(timestamp.day(), 29);
        assert_eq!(timestamp.to_rfc3339(), "2024-02-29T00:00:00+00:00");
    }

    #[test]
    fn offset_aware_formats_are_normalised_to_utc() {
        let builder = PropertyBuilder::new("%Y-%m-%d %H:%M:%S %z");
        let attributes = builder
            .build(Some(&bag(&[("timestamp", "2024-03-01 14:30:00 +0200")])))
            .unwrap();
        assert_eq!(
            attributes.timestamp.unwrap().to_rfc3339(),
            "2024-03-01T12:30:00+00:00"
        );
    }

    #[test]
    fn recognized_keys_match_the_documented_set() {
        let keys: Vec<_> = PropertyBuilder::recognized_keys().collect();
        assert_eq!(
            keys,
            vec![
                "deliveryMode",
                "expiration",
                "priority",
                "userId",
                "appId",
                "contentEncoding",
                "contentType",
                "correlationId",
                "messageId",
                "replyTo",
                "timestamp",
                "type",
                "headers",
            ]
        );
        assert!(PropertyBuilder::is_recognized("headers"));
        assert!(!PropertyBuilder::is_recognized("Headers"));
    }
}
