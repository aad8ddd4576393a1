use std::time::Duration;

use serde_json::json;

use meshtask_core::TaskBatch;
use meshtask_services::{CorrelationOutcome, DispatchError, SessionState, TransportError};

use crate::*;

#[tokio::test]
async fn mixed_batch_waits_for_every_owed_reply() {
    let broker = gateway([
        json!({"type": "GET_STATUS"}),
        json!({"type": "GET_SETTING", "value": 1}),
        json!({"type": "GET_SERIES", "points": []}),
        json!({"type": "GET_SETTING", "value": 2}),
    ]);
    let raw = r#"{"actions":[
        {"opcode":"GET_STATUS","addr":"0001"},
        {"opcode":"GET_SETTING","addr":"0001"},
        {"opcode":"GET_SETTING","addr":"0002"},
        {"opcode":"GET_SERIES","addr":"0003"}
    ]}"#;
    let outcome = submit(&broker, raw).await.unwrap();
    assert_eq!(
        outcome,
        CorrelationOutcome::Completed {
            last: json!({"type": "GET_SETTING", "value": 2}).into()
        }
    );
}

#[tokio::test]
async fn removal_batch_completes_on_any_reply() {
    let broker = gateway([json!("removed")]);
    let batch = TaskBatch::removal(["nightly", "hourly"]);
    let outcome = correlator(&broker).dispatch(&batch).await.unwrap();
    assert!(matches!(outcome, CorrelationOutcome::Completed { .. }));
    assert_eq!(
        published_json(&broker, 0),
        json!({"actions": [{"name": "nightly"}, {"name": "hourly"}]})
    );
}

#[tokio::test]
async fn device_error_mid_batch_stops_waiting() {
    let broker = gateway([
        json!({"type": "GET_SETTING"}),
        json!({"error": true, "reason": "addr unreachable"}),
        json!({"type": "GET_CADENCE"}),
    ]);
    let raw = r#"{"actions":[{"opcode":"GET_SETTING","addr":"0001"},{"opcode":"GET_CADENCE","addr":"0002"}]}"#;
    let outcome = submit(&broker, raw).await.unwrap();
    assert_eq!(
        outcome,
        CorrelationOutcome::ErrorSignaled {
            payload: json!({"error": true, "reason": "addr unreachable"}).into()
        }
    );
    assert_eq!(broker.disconnects(), 1);
}

#[tokio::test(start_paused = true)]
async fn partial_replies_still_time_out() {
    let broker = gateway([json!({"type": "GET_SETTING"})]);
    let raw = r#"{"actions":[{"opcode":"GET_SETTING","addr":"0001"},{"opcode":"GET_DESCRIPTOR","addr":"0001"}]}"#;
    let outcome = submit(&broker, raw).await.unwrap();
    assert_eq!(
        outcome,
        CorrelationOutcome::TimedOut {
            waited: WAIT,
            during: SessionState::AwaitingResponses,
        }
    );
    assert_eq!(broker.subscriber_count(RESPONSE_TOPIC), 0);
}

#[tokio::test(start_paused = true)]
async fn replies_on_other_topics_do_not_count() {
    let broker = MemoryBroker::new();
    broker.respond_to(
        COMMAND_TOPIC,
        "/sensors/results/dashboard",
        [json!({"type": "GET_SETTING"})],
    );
    let outcome = submit(&broker, r#"{"actions":[{"opcode":"GET_SETTING","addr":"0001"}]}"#)
        .await
        .unwrap();
    assert!(matches!(outcome, CorrelationOutcome::TimedOut { .. }));
}

#[tokio::test(start_paused = true)]
async fn reply_after_window_is_too_late() {
    let broker = MemoryBroker::new();
    let device = broker.clone();
    tokio::spawn(async move {
        tokio::time::sleep(WAIT + Duration::from_secs(1)).await;
        device.inject(RESPONSE_TOPIC, br#"{"type":"GET_SETTING"}"#.to_vec());
    });
    let outcome = submit(&broker, r#"{"actions":[{"opcode":"GET_SETTING","addr":"0001"}]}"#)
        .await
        .unwrap();
    assert!(matches!(outcome, CorrelationOutcome::TimedOut { .. }));
}

#[tokio::test]
async fn sequential_dispatches_reuse_nothing() {
    let broker = gateway([json!({"type": "GET_SETTING"})]);
    let raw = r#"{"actions":[{"opcode":"GET_SETTING","addr":"0001"}]}"#;
    for _ in 0..3 {
        submit(&broker, raw).await.unwrap();
    }
    assert_eq!(broker.connects(), 3);
    assert_eq!(broker.disconnects(), 3);
    assert_eq!(broker.subscriber_count(RESPONSE_TOPIC), 0);
}

#[tokio::test]
async fn unreachable_broker_surfaces_connect_error() {
    let broker = MemoryBroker::new();
    broker.refuse_connections(true);
    let batch = TaskBatch::removal(["x"]);
    let err = correlator(&broker).dispatch(&batch).await.unwrap_err();
    assert!(matches!(err, DispatchError::Transport(TransportError::Connect(_))));
}
