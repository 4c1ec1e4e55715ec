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

use std::collections::BTreeMap;

use courier_core::prelude::MessageAttributes;
use lapin::types::{AMQPValue, FieldArray, FieldTable, LongString, ShortString};
use lapin::BasicProperties;
use serde_json::Value;
use tracing::warn;

/// Converts typed attributes into `lapin` message properties.
///
/// Timestamps are sent as whole seconds since the Unix epoch; timestamps
/// before the epoch cannot be represented and are dropped with a warning.
#[must_use]
pub fn basic_properties(attributes: &MessageAttributes) -> BasicProperties {
    let mut properties = BasicProperties::default();

    if let Some(mode) = attributes.delivery_mode {
        properties = properties.with_delivery_mode(mode.as_u8());
    }
    if let Some(expiration) = &attributes.expiration {
        properties = properties.with_expiration(short(expiration));
    }
    if let Some(priority) = attributes.priority {
        properties = properties.with_priority(priority);
    }
    if let Some(user_id) = &attributes.user_id {
        properties = properties.with_user_id(short(user_id));
    }
    if let Some(app_id) = &attributes.app_id {
        properties = properties.with_app_id(short(app_id));
    }
    if let Some(encoding) = &attributes.content_encoding {
        properties = properties.with_content_encoding(short(encoding));
    }
    if let Some(content_type) = &attributes.content_type {
        properties = properties.with_content_type(short(content_type));
    }
    if let Some(correlation_id) = &attributes.correlation_id {
        properties = properties.with_correlation_id(short(correlation_id));
    }
    if let Some(message_id) = &attributes.message_id {
        properties = properties.with_message_id(short(message_id));
    }
    if let Some(reply_to) = &attributes.reply_to {
        properties = properties.with_reply_to(short(reply_to));
    }
    if let Some(kind) = &attributes.kind {
        properties = properties.with_kind(short(kind));
    }
    if let Some(timestamp) = attributes.timestamp {
        match u64::try_from(timestamp.timestamp()) {
            Ok(seconds) => properties = properties.with_timestamp(seconds),
            Err(_) => warn!(%timestamp, "Dropping timestamp before the Unix epoch"),
        }
    }
    if let Some(headers) = &attributes.headers {
        properties = properties.with_headers(field_table(headers));
    }
    properties
}

fn short(value: &str) -> ShortString {
    ShortString::from(value.to_owned())
}

fn field_table(entries: &BTreeMap<String, Value>) -> FieldTable {
    let mut table = FieldTable::default();
    for (key, value) in entries {
        table.insert(short(key), amqp_value(value));
    }
    table
}

/// Maps a JSON value onto the closest AMQP field type.
fn amqp_value(value: &Value) -> AMQPValue {
    match value {
        Value::Null => AMQPValue::Void,
        Value::Bool(flag) => AMQPValue::Boolean(*flag),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => AMQPValue::LongLongInt(integer),
            None => AMQPValue::Double(number.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(text) => AMQPValue::LongString(LongString::from(text.clone())),
        Value::Array(items) => {
            AMQPValue::FieldArray(FieldArray::from(items.iter().map(amqp_value).collect::<Vec<_>>()))
        }
        Value::Object(entries) => {
            let mut table = FieldTable::default();
            for (key, value) in entries {
                table.insert(short(key), amqp_value(value));
            }
            AMQPValue::FieldTable(table)
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use courier_core::prelude::DeliveryMode;
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_attributes_produce_empty_properties() {
        let properties = basic_properties(&MessageAttributes::default());
        assert_eq!(properties, BasicProperties::default());
    }

    #[test]
    fn scalar_attributes_are_carried_over() {
        let attributes = MessageAttributes {
            delivery_mode: Some(DeliveryMode::Persistent),
            priority: Some(9),
            content_type: Some("application/json".into()),
            correlation_id: Some("corr-7".into()),
            kind: Some("order.created".into()),
            timestamp: Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()),
            ..MessageAttributes::default()
        };

        let properties = basic_properties(&attributes);

        assert_eq!(*properties.delivery_mode(), Some(2));
        assert_eq!(*properties.priority(), Some(9));
        assert_eq!(
            properties.content_type().as_ref().map(ShortString::as_str),
            Some("application/json")
        );
        assert_eq!(
            properties.correlation_id().as_ref().map(ShortString::as_str),
            Some("corr-7")
        );
        assert_eq!(
            properties.kind().as_ref().map(ShortString::as_str),
            Some("order.created")
        );
        assert_eq!(*properties.timestamp(), Some(1_709_296_200));
        assert!(properties.headers().is_none());
    }

    #[test]
    fn pre_epoch_timestamps_are_dropped() {
        let attributes = MessageAttributes {
            timestamp: Some(Utc.with_ymd_and_hms(1969, 12, 31, 23, 59, 0).unwrap()),
            ..MessageAttributes::default()
        };
        assert!(basic_properties(&attributes).timestamp().is_none());
    }

    #[test]
    fn json_headers_map_onto_amqp_field_types() {
        let headers: BTreeMap<String, Value> = serde_json::from_value(json!({
            "tenant": "acme",
            "retries": 3,
            "ratio": 0.5,
            "urgent": true,
            "nothing": null,
            "tags": ["a", 1],
            "nested": { "depth": 2 }
        }))
        .unwrap();
        let attributes = MessageAttributes {
            headers: Some(headers),
            ..MessageAttributes::default()
        };

        let properties = basic_properties(&attributes);
        let table = properties.headers().as_ref().unwrap().inner();

        assert_eq!(
            table[&short("tenant")],
            AMQPValue::LongString(LongString::from("acme".to_string()))
        );
        assert_eq!(table[&short("retries")], AMQPValue::LongLongInt(3));
        assert_eq!(table[&short("ratio")], AMQPValue::Double(0.5));
        assert_eq!(table[&short("urgent")], AMQPValue::Boolean(true));
        assert_eq!(table[&short("nothing")], AMQPValue::Void);
        assert_eq!(
            table[&short("tags")],
            AMQPValue::FieldArray(FieldArray::from(vec![
                AMQPValue::LongString(LongString::from("a".to_string())),
                AMQPValue::LongLongInt(1),
            ]))
        );
        let AMQPValue::FieldTable(nested) = &table[&short("nested")] else {
            panic!("nested object should become a field table");
        };
        assert_eq!(nested.inner()[&short("depth")], AMQPValue::LongLongInt(2));
    }
}
