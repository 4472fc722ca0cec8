//! Relay tests against the in-process broker.
//!
//! The health route is exercised through `tower::ServiceExt` without a
//! socket. The streaming tests bind an ephemeral port and connect real
//! `WebSocket` clients.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use firewatch_broker::{LocalBroker, StatusFeed, StatusSink};
use firewatch_relay::server::serve;
use firewatch_relay::{AppState, build_router};
use firewatch_types::{IncidentId, LifecycleState, ResponderId, StatusEvent};
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

type Client = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

fn event(incident: IncidentId, sequence: u32, state: LifecycleState) -> StatusEvent {
    StatusEvent {
        incident_id: Some(incident),
        sequence,
        responder_id: ResponderId::new("d1"),
        state,
        location_label: String::from("Ridge"),
        timestamp: Utc::now(),
    }
}

async fn start(broker: &Arc<LocalBroker>) -> (Arc<AppState>, std::net::SocketAddr) {
    let feed: Arc<dyn StatusFeed> = Arc::clone(broker) as Arc<dyn StatusFeed>;
    let state = Arc::new(AppState::new(feed));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, Arc::clone(&state)));
    (state, addr)
}

async fn connect(addr: std::net::SocketAddr, observer: &str) -> Client {
    let url = format!("ws://{addr}/ws/updates?observer_id={observer}");
    let (client, _response) = tokio_tungstenite::connect_async(url).await.unwrap();
    client
}

/// Wait until the broker has exactly `expected` live subscriptions.
async fn wait_for_subscribers(broker: &LocalBroker, expected: usize) {
    for _ in 0..200 {
        if broker.subscriber_count() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {expected} subscribers, found {}",
        broker.subscriber_count()
    );
}

async fn next_event(client: &mut Client) -> StatusEvent {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Text(text) = frame {
            return StatusEvent::decode(text.as_bytes()).unwrap();
        }
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let broker = Arc::new(LocalBroker::new());
    let state = Arc::new(AppState::new(broker as Arc<dyn StatusFeed>));
    let app = build_router(state);

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["observers"], 0);
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let broker = Arc::new(LocalBroker::new());
    let app = build_router(Arc::new(AppState::new(broker as Arc<dyn StatusFeed>)));
    let response = app
        .oneshot(Request::get("/ws/history").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn every_observer_receives_its_own_copy_in_order() {
    let broker = Arc::new(LocalBroker::new());
    let (_state, addr) = start(&broker).await;
    let mut first = connect(addr, "first").await;
    let mut second = connect(addr, "second").await;
    wait_for_subscribers(&broker, 2).await;

    let incident = IncidentId::new();
    let states = [
        LifecycleState::Assigned,
        LifecycleState::EnRoute,
        LifecycleState::Suppressing,
        LifecycleState::Extinguished,
    ];
    for (sequence, state) in (0_u32..).zip(states) {
        broker
            .publish_status(&event(incident, sequence, state))
            .await
            .unwrap();
    }

    for client in [&mut first, &mut second] {
        for (sequence, state) in (0_u32..).zip(states) {
            let received = next_event(client).await;
            assert_eq!(received.sequence, sequence);
            assert_eq!(received.state, state);
            assert_eq!(received.incident_id, Some(incident));
        }
    }
}

#[tokio::test]
async fn malformed_payloads_are_skipped() {
    let broker = Arc::new(LocalBroker::new());
    let (state, addr) = start(&broker).await;
    let mut client = connect(addr, "solo").await;
    wait_for_subscribers(&broker, 1).await;

    let incident = IncidentId::new();
    broker.publish_raw(b"{not json".to_vec());
    broker.publish_raw(br#"{"state":"Melting"}"#.to_vec());
    broker
        .publish_status(&event(incident, 0, LifecycleState::Assigned))
        .await
        .unwrap();

    let received = next_event(&mut client).await;
    assert_eq!(received.state, LifecycleState::Assigned);
    assert_eq!(state.dropped(), 2);
}

#[tokio::test]
async fn disconnecting_observer_does_not_affect_others() {
    let broker = Arc::new(LocalBroker::new());
    let (state, addr) = start(&broker).await;
    let mut staying = connect(addr, "staying").await;
    let mut leaving = connect(addr, "leaving").await;
    wait_for_subscribers(&broker, 2).await;

    let incident = IncidentId::new();
    broker
        .publish_status(&event(incident, 0, LifecycleState::Assigned))
        .await
        .unwrap();
    assert_eq!(next_event(&mut leaving).await.sequence, 0);

    leaving.close(None).await.unwrap();
    drop(leaving);
    wait_for_subscribers(&broker, 1).await;

    broker
        .publish_status(&event(incident, 1, LifecycleState::EnRoute))
        .await
        .unwrap();

    assert_eq!(next_event(&mut staying).await.sequence, 0);
    assert_eq!(next_event(&mut staying).await.sequence, 1);
    assert_eq!(state.observers(), 1);

    staying.send(Message::Close(None)).await.unwrap();
}

#[tokio::test]
async fn late_observer_sees_no_backlog() {
    let broker = Arc::new(LocalBroker::new());
    let (_state, addr) = start(&broker).await;

    let incident = IncidentId::new();
    broker
        .publish_status(&event(incident, 0, LifecycleState::Assigned))
        .await
        .unwrap();

    let mut late = connect(addr, "late").await;
    wait_for_subscribers(&broker, 1).await;
    broker
        .publish_status(&event(incident, 1, LifecycleState::EnRoute))
        .await
        .unwrap();

    assert_eq!(next_event(&mut late).await.sequence, 1);
}
