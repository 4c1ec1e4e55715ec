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
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use courier::prelude::*;
use courier_test::{initialize_tracing, BrokerScript, MockConnector};

fn settings(timeout: Duration) -> PublishSettings {
    PublishSettings {
        exchange: "orders".to_string(),
        routing_key: "orders.created".to_string(),
        timeout,
        ..PublishSettings::default()
    }
}

fn session(connector: &MockConnector, timeout: Duration) -> PublishSession {
    PublishSession::new(Arc::new(connector.clone()), settings(timeout))
}

fn bag(entries: &[(&str, &str)]) -> HashMap<String, String> {
    entries
        .iter()
        .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
        .collect()
}

#[tokio::test]
async fn acknowledged_message_reports_success() -> Result<()> {
    initialize_tracing();
    let connector = MockConnector::new(BrokerScript::Ack);
    let counters = connector.counters();
    let mut session = session(&connector, Duration::from_secs(5));

    let properties = bag(&[("contentType", "text/plain"), ("priority", "3")]);
    let code = session.publish(b"Hello World!", Some(&properties)).await?;

    assert_eq!(code, reply_code::REPLY_SUCCESS);
    assert_eq!(session.state(), PublishState::Closed);
    assert_eq!(session.sequence_number(), Some(1));
    assert!(session.confirms().is_empty());
    assert_eq!(counters.publishes(), 1);
    assert_eq!(counters.channel_closes(), 1);
    assert_eq!(counters.connection_closes(), 1);

    let published = connector.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].exchange, "orders");
    assert_eq!(published[0].routing_key, "orders.created");
    assert!(published[0].mandatory);
    assert_eq!(published[0].body, b"Hello World!");
    assert_eq!(published[0].attributes.priority, Some(3));
    assert_eq!(
        published[0].attributes.content_type.as_deref(),
        Some("text/plain")
    );
    Ok(())
}

#[tokio::test]
async fn returned_message_reports_the_broker_code() -> Result<()> {
    initialize_tracing();
    let connector = MockConnector::new(BrokerScript::Return {
        reply_code: reply_code::NOT_FOUND,
    });
    let mut session = session(&connector, Duration::from_secs(5));

    let code = session.publish(b"payload", None).await?;

    // The ack that follows the return must not override it.
    assert_eq!(code, reply_code::NOT_FOUND);
    assert_eq!(
        session.resolver().outcome(),
        Some(Outcome::Returned {
            reply_code: reply_code::NOT_FOUND,
            reply_text: "not-found".to_string(),
        })
    );
    Ok(())
}

#[tokio::test]
async fn unreachable_broker_reports_invalid_path_without_opening_a_channel() -> Result<()> {
    initialize_tracing();
    let connector = MockConnector::new(BrokerScript::Unreachable);
    let counters = connector.counters();
    let mut session = session(&connector, Duration::from_secs(5));

    let code = session.publish(b"payload", None).await?;

    assert_eq!(code, reply_code::INVALID_PATH);
    assert!(!session.resolver().is_resolved());
    assert_eq!(counters.connects(), 1);
    assert_eq!(counters.channels(), 0);
    assert_eq!(counters.publishes(), 0);
    assert_eq!(counters.channel_closes(), 0);
    assert_eq!(counters.connection_closes(), 0);
    Ok(())
}

#[tokio::test]
async fn silent_broker_times_out_and_releases_everything_once() -> Result<()> {
    initialize_tracing();
    let connector = MockConnector::new(BrokerScript::Silent);
    let counters = connector.counters();
    let timeout = Duration::from_millis(100);
    let mut session = session(&connector, timeout);

    let err = session.publish(b"payload", None).await.unwrap_err();

    assert!(matches!(err, PublishError::Timeout(waited) if waited == timeout));
    assert!(err.is_timeout());
    assert_eq!(session.state(), PublishState::Closed);
    assert!(session.confirms().is_empty());
    assert_eq!(counters.channel_closes(), 1);
    assert_eq!(counters.connection_closes(), 1);
    Ok(())
}

#[tokio::test]
async fn malformed_property_fails_before_connecting() -> Result<()> {
    initialize_tracing();
    let connector = MockConnector::new(BrokerScript::Ack);
    let counters = connector.counters();
    let mut session = session(&connector, Duration::from_secs(5));

    let properties = bag(&[("priority", "not-a-number")]);
    let err = session.publish(b"payload", Some(&properties)).await.unwrap_err();

    let PublishError::PropertyFormat(format_error) = err else {
        panic!("expected a property format error, got {err:?}");
    };
    assert_eq!(format_error.key, "priority");
    assert_eq!(counters.connects(), 0);
    assert_eq!(session.state(), PublishState::Closed);
    Ok(())
}

#[tokio::test]
async fn nacked_message_reports_internal_error() -> Result<()> {
    initialize_tracing();
    let connector = MockConnector::new(BrokerScript::Nack);
    let mut session = session(&connector, Duration::from_secs(5));

    let code = session.publish(b"payload", None).await?;

    assert_eq!(code, reply_code::INTERNAL_ERROR);
    assert_eq!(session.resolver().outcome(), Some(Outcome::Nacked));
    assert!(session.confirms().is_empty());
    Ok(())
}

#[tokio::test]
async fn cumulative_ack_clears_the_entry() -> Result<()> {
    initialize_tracing();
    let connector = MockConnector::new(BrokerScript::CumulativeAck).with_first_sequence_number(42);
    let mut session = session(&connector, Duration::from_secs(5));

    let code = session.publish(b"payload", None).await?;

    assert_eq!(code, reply_code::REPLY_SUCCESS);
    assert_eq!(session.sequence_number(), Some(42));
    assert!(session.confirms().is_empty());
    Ok(())
}

#[tokio::test]
async fn ack_arriving_before_the_send_returns_is_not_lost() -> Result<()> {
    initialize_tracing();
    let connector = MockConnector::new(BrokerScript::AckDuringPublish);
    let mut session = session(&connector, Duration::from_millis(500));

    let code = session.publish(b"payload", None).await?;

    assert_eq!(code, reply_code::REPLY_SUCCESS);
    assert!(session.confirms().is_empty());
    Ok(())
}

#[tokio::test]
async fn channel_close_reports_its_reply_code() -> Result<()> {
    initialize_tracing();
    let connector = MockConnector::new(BrokerScript::ChannelShutdown {
        reply_code: reply_code::PRECONDITION_FAILED,
    });
    let counters = connector.counters();
    let mut session = session(&connector, Duration::from_secs(5));

    let code = session.publish(&vec![0_u8; 1024], None).await?;

    assert_eq!(code, reply_code::PRECONDITION_FAILED);
    // The broker already closed the channel; only the connection is left to close.
    assert_eq!(counters.channel_closes(), 0);
    assert_eq!(counters.connection_closes(), 1);
    Ok(())
}

#[tokio::test]
async fn connection_loss_without_a_code_reports_internal_error() -> Result<()> {
    initialize_tracing();
    let connector = MockConnector::new(BrokerScript::ConnectionShutdownWithoutCode);
    let counters = connector.counters();
    let mut session = session(&connector, Duration::from_secs(5));

    let code = session.publish(b"payload", None).await?;

    assert_eq!(code, reply_code::INTERNAL_ERROR);
    assert!(matches!(
        session.resolver().outcome(),
        Some(Outcome::Shutdown { reply_code: reply_code::INTERNAL_ERROR, .. })
    ));
    assert_eq!(counters.channel_closes(), 0);
    Ok(())
}

#[tokio::test]
async fn failed_send_is_a_broker_error() -> Result<()> {
    initialize_tracing();
    let connector = MockConnector::new(BrokerScript::FailPublish);
    let counters = connector.counters();
    let mut session = session(&connector, Duration::from_secs(5));

    let err = session.publish(b"payload", None).await.unwrap_err();

    assert!(matches!(err, PublishError::Broker(BrokerError::Publish(_))));
    assert!(session.confirms().is_empty());
    assert_eq!(counters.channel_closes(), 1);
    assert_eq!(counters.connection_closes(), 1);
    Ok(())
}

#[tokio::test]
async fn outcome_decided_during_a_failed_send_wins() -> Result<()> {
    initialize_tracing();
    let connector = MockConnector::new(BrokerScript::ShutdownDuringPublish {
        reply_code: reply_code::ACCESS_REFUSED,
    });
    let mut session = session(&connector, Duration::from_secs(5));

    let code = session.publish(b"payload", None).await?;

    assert_eq!(code, reply_code::ACCESS_REFUSED);
    Ok(())
}

#[tokio::test]
async fn channel_failure_is_a_broker_error() -> Result<()> {
    initialize_tracing();
    let connector = MockConnector::new(BrokerScript::FailChannel);
    let counters = connector.counters();
    let mut session = session(&connector, Duration::from_secs(5));

    let err = session.publish(b"payload", None).await.unwrap_err();

    assert!(matches!(err, PublishError::Broker(BrokerError::Channel(_))));
    assert_eq!(counters.connection_closes(), 1);
    Ok(())
}

#[tokio::test]
async fn close_failures_do_not_mask_the_result() -> Result<()> {
    initialize_tracing();
    let connector = MockConnector::new(BrokerScript::Ack)
        .with_failing_channel_close()
        .with_failing_connection_close();
    let counters = connector.counters();
    let mut session = session(&connector, Duration::from_secs(5));

    let code = session.publish(b"payload", None).await?;

    assert_eq!(code, reply_code::REPLY_SUCCESS);
    assert_eq!(counters.channel_closes(), 1);
    assert_eq!(counters.connection_closes(), 1);
    Ok(())
}

#[tokio::test]
async fn interrupted_wait_reports_internal_error() -> Result<()> {
    initialize_tracing();
    let connector = MockConnector::new(BrokerScript::Silent);
    let mut session = session(&connector, Duration::from_secs(5));
    let resolver = session.resolver().clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        resolver.interrupt();
    });

    let code = session.publish(b"payload", None).await?;

    assert_eq!(code, reply_code::INTERNAL_ERROR);
    assert!(session.confirms().is_empty());
    Ok(())
}

#[tokio::test]
async fn a_session_can_publish_again() -> Result<()> {
    initialize_tracing();
    let connector = MockConnector::new(BrokerScript::Ack);
    let counters = connector.counters();
    let mut session = session(&connector, Duration::from_secs(5));

    assert_eq!(session.publish(b"first", None).await?, reply_code::REPLY_SUCCESS);
    assert_eq!(session.publish(b"second", None).await?, reply_code::REPLY_SUCCESS);

    assert_eq!(counters.connects(), 2);
    assert_eq!(counters.connection_closes(), 2);
    Ok(())
}

#[tokio::test]
async fn cancelled_publish_still_closes_channel_and_connection() -> Result<()> {
    initialize_tracing();
    let connector = MockConnector::new(BrokerScript::Silent);
    let counters = connector.counters();
    let mut session = session(&connector, Duration::from_secs(5));

    let cancelled =
        tokio::time::timeout(Duration::from_millis(100), session.publish(b"payload", None)).await;
    assert!(cancelled.is_err());

    assert_eq!(session.state(), PublishState::Closed);
    assert!(session.confirms().is_empty());
    // The closes run on a spawned task.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(counters.channel_closes(), 1);
    assert_eq!(counters.connection_closes(), 1);
    Ok(())
}

#[tokio::test]
async fn interrupt_reaches_a_later_attempt_of_a_reused_session() -> Result<()> {
    initialize_tracing();
    let connector = MockConnector::new(BrokerScript::Silent);
    let mut session = session(&connector, Duration::from_millis(300));

    let first = session.publish(b"first", None).await;
    assert!(matches!(first, Err(PublishError::Timeout(_))));

    let resolver = session.resolver().clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        resolver.interrupt();
    });

    let code = session.publish(b"second", None).await?;
    assert_eq!(code, reply_code::INTERNAL_ERROR);
    assert_eq!(session.state(), PublishState::Closed);
    Ok(())
}
