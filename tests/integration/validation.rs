use serde_json::json;

use meshtask_core::config::{AutoMetadataMode, SchemaConfig};
use meshtask_core::Opcode;
use meshtask_services::{validate, SchemaRules, ValidationErrorKind, Validator};

use crate::*;

/// The canonical operator template passes and is published unchanged.
#[tokio::test]
async fn template_batch_round_trips_to_the_wire() {
    let broker = gateway([json!({"ok": true})]);
    let raw = r#"{
        "actions": [
            {"opcode": "GET_STATUS", "addr": "00aa", "auto": true, "delay": 5, "name": "t"}
        ]
    }"#;
    let outcome = submit(&broker, raw).await.unwrap();
    assert!(matches!(outcome, CorrelationOutcome::Completed { .. }));
    assert_eq!(
        published_json(&broker, 0),
        json!({"actions": [{"opcode": "GET_STATUS", "addr": "00aa", "auto": true, "delay": 5, "name": "t"}]})
    );
}

/// Schedule metadata on non-status opcodes never reaches the device.
#[tokio::test]
async fn schedule_fields_are_stripped_before_publish() {
    let broker = gateway([json!({"type": "GET_SETTING"})]);
    let raw = r#"{"actions":[{"opcode":"GET_SETTING","addr":"0001","auto":true,"delay":9,"name":"x"}]}"#;
    submit(&broker, raw).await.unwrap();
    assert_eq!(
        published_json(&broker, 0),
        json!({"actions": [{"opcode": "GET_SETTING", "addr": "0001"}]})
    );
}

/// Rejected batches never open a connection.
#[tokio::test]
async fn invalid_batch_is_never_published() {
    let broker = gateway([]);
    let err = submit(&broker, r#"{"actions":[{"opcode":"GET_SETTING","addr":"12G4"}]}"#)
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("invalid character"));
    assert_eq!(broker.connects(), 0);
    assert!(broker.published(COMMAND_TOPIC).is_empty());
}

#[test]
fn first_failing_action_wins() {
    let raw = json!({"actions": [
        {"opcode": "GET_SETTING", "addr": "0001"},
        {"opcode": "GET_NOTHING", "addr": "0002"},
        {"addr": "0003"}
    ]});
    let err = Validator::default().validate_value(&raw).unwrap_err();
    assert_eq!(err.kind(), ValidationErrorKind::InvalidOpcode);
    assert_eq!(err.index(), Some(1));
}

#[test]
fn mixed_removal_and_request_batch() {
    let batch = validate(
        r#"{"actions":[{"name":"nightly"},{"opcode":"GET_COLUMN","addr":"ABCD","sensor_prop_id":"0a0b"}]}"#,
    )
    .unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch.requested_opcodes().collect::<Vec<_>>(), vec![Opcode::GetColumn]);
}

#[test]
fn configured_rules_change_the_matrix() {
    let config = SchemaConfig {
        auto_metadata: AutoMetadataMode::Always,
        scheduled_opcodes: vec![],
        opcodes: vec![Opcode::GetStatus, Opcode::GetSeries],
    };
    let validator = Validator::new(SchemaRules::from(&config));

    let err = validator
        .validate(r#"{"actions":[{"opcode":"GET_SERIES","addr":"0001","auto":true,"name":"s"}]}"#)
        .unwrap_err();
    assert_eq!(err.kind(), ValidationErrorKind::MissingAutoMetadata);
    assert_eq!(err.field(), Some("delay"));

    let err = validator
        .validate(r#"{"actions":[{"opcode":"GET_SETTING","addr":"0001"}]}"#)
        .unwrap_err();
    assert_eq!(err.kind(), ValidationErrorKind::InvalidOpcode);
    assert_eq!(err.allowed().as_deref(), Some("[GET_STATUS, GET_SERIES]"));
}
