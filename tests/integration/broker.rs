use std::time::Duration;

use meshtask_core::{QoS, TaskBatch};
use meshtask_services::{CorrelationOutcome, Correlator, MqttTransport, Transport, TransportEvent};

use crate::*;

/// Subscribe, publish to ourselves, and see the message come back.
#[tokio::test]
async fn mqtt_transport_loops_back() {
    let Some((host, port)) = test_broker() else {
        eprintln!("SKIP: MESHTASK_TEST_BROKER not set");
        return;
    };

    let mut transport = MqttTransport::new(&host, port, "meshtask-it-loopback");
    let mut events = transport.connect().await.unwrap();
    transport
        .subscribe("/meshtask/it/loopback", QoS::AtLeastOnce)
        .await
        .unwrap();

    let mut got = None;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let mut published = false;
    while let Ok(Some(event)) = tokio::time::timeout_at(deadline, events.recv()).await {
        match event {
            TransportEvent::SubAck if !published => {
                transport
                    .publish("/meshtask/it/loopback", QoS::AtLeastOnce, false, "ping".into())
                    .await
                    .unwrap();
                published = true;
            }
            TransportEvent::Message { payload, .. } => {
                got = Some(payload);
                break;
            }
            _ => {}
        }
    }
    drop(events);
    transport.disconnect().await.unwrap();
    assert_eq!(got.as_deref(), Some(&b"ping"[..]));
}

/// With no gateway on the broker, a real round trip times out cleanly.
#[tokio::test]
async fn silent_gateway_times_out_over_mqtt() {
    let Some((host, port)) = test_broker() else {
        eprintln!("SKIP: MESHTASK_TEST_BROKER not set");
        return;
    };

    let transport = MqttTransport::new(&host, port, "meshtask-it-timeout");
    let topics = Topics {
        command: "/meshtask/it/commands".to_string(),
        response: "/meshtask/it/results".to_string(),
    };
    let mut correlator = Correlator::new(transport, topics, Duration::from_secs(1));
    let outcome = correlator.dispatch(&TaskBatch::removal(["it"])).await.unwrap();
    assert!(matches!(outcome, CorrelationOutcome::TimedOut { .. }));
}
