// Test module - relaxed lint rules
#![allow(clippy::indexing_slicing)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

use autoplay::bridge::{
    BridgeClient, BridgeClientConfig, Connector, TcpConnector, MAX_LINE_BYTES,
};
use autoplay::ErrorCode;
use autoplay_fixtures::FakeBridge;
use serde_json::json;
use std::io;
use std::net::TcpStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn config(port: u16) -> BridgeClientConfig {
    BridgeClientConfig {
        host: "127.0.0.1".to_string(),
        port,
        connect_timeout: Duration::from_millis(500),
        request_timeout: Duration::from_millis(500),
    }
}

fn client_for(bridge: &FakeBridge) -> BridgeClient {
    BridgeClient::new(config(bridge.port()))
}

/// Fails the first `failures` connects, then delegates to TCP.
struct FlakyConnector {
    inner: TcpConnector,
    failures: usize,
    attempts: Arc<AtomicUsize>,
}

impl Connector for FlakyConnector {
    fn connect(&self) -> io::Result<TcpStream> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "flaky"));
        }
        self.inner.connect()
    }
}

fn flaky_client(bridge: &FakeBridge, failures: usize) -> (BridgeClient, Arc<AtomicUsize>) {
    let attempts = Arc::new(AtomicUsize::new(0));
    let connector = FlakyConnector {
        inner: TcpConnector::new("127.0.0.1", bridge.port(), Duration::from_millis(500)),
        failures,
        attempts: Arc::clone(&attempts),
    };
    (
        BridgeClient::with_connector(config(bridge.port()), connector),
        attempts,
    )
}

#[test]
fn typed_wrappers_round_trip() {
    let bridge = FakeBridge::start();
    bridge.set_state(json!({"map_id": 3, "party": []}));
    bridge.push_events(vec![json!({"type": "badge_earned"}), json!(5)]);
    let client = client_for(&bridge);

    client.ping().unwrap();
    let state = client.get_state().unwrap();
    assert_eq!(state.get("map_id"), Some(&json!(3)));
    let events = client.get_events().unwrap();
    assert_eq!(events.len(), 1);
    assert!(client.get_events().unwrap().is_empty());
    client.set_debug(true).unwrap();
    assert_eq!(bridge.debug(), Some(true));

    assert_eq!(bridge.connections(), 1);
    assert_eq!(
        bridge.requests().last(),
        Some(&json!({"cmd": "set", "key": "debug", "value": true}))
    );
}

#[test]
fn one_failed_connect_then_success_uses_two_attempts() {
    let bridge = FakeBridge::start();
    let (client, attempts) = flaky_client(&bridge, 1);
    client.ping().unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(client.is_connected());
}

#[test]
fn two_failed_connects_give_connection_error() {
    let bridge = FakeBridge::start();
    let (client, attempts) = flaky_client(&bridge, 2);

    let err = client.ping().unwrap_err();
    assert_eq!(err.code, ErrorCode::Connection);
    assert_eq!(err.message, "bridge request failed after retries");
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(!client.is_connected());

    // The next call starts over with a fresh connect.
    client.ping().unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[test]
fn dropped_connection_is_retried_once() {
    let bridge = FakeBridge::start();
    bridge.drop_connections(1);
    let client = client_for(&bridge);

    client.ping().unwrap();
    assert_eq!(bridge.connections(), 2);
    assert_eq!(bridge.request_count("ping"), 2);
}

#[test]
fn two_dropped_connections_fail_and_leave_client_disconnected() {
    let bridge = FakeBridge::start();
    bridge.drop_connections(2);
    let client = client_for(&bridge);

    let err = client.get_state().unwrap_err();
    assert_eq!(err.code, ErrorCode::Connection);
    assert!(!client.is_connected());

    client.get_state().unwrap();
    assert_eq!(bridge.connections(), 3);
}

#[test]
fn malformed_json_counts_as_transport_failure() {
    let bridge = FakeBridge::start();
    bridge.respond_raw("ping", "this is not json");
    let client = client_for(&bridge);

    let err = client.ping().unwrap_err();
    assert_eq!(err.code, ErrorCode::Connection);
    assert_eq!(bridge.request_count("ping"), 2);
    assert_eq!(bridge.connections(), 2);
}

#[test]
fn protocol_violations_are_not_retried() {
    let bridge = FakeBridge::start();
    let client = client_for(&bridge);

    bridge.respond_raw("ping", r#"{"ok":true}"#);
    assert_eq!(client.ping().unwrap_err().code, ErrorCode::Protocol);

    bridge.respond_raw("state", r#"{"ok":true,"state":[1,2]}"#);
    let err = client.get_state().unwrap_err();
    assert_eq!(err.code, ErrorCode::Protocol);
    assert!(err.context.unwrap()["received"]
        .as_str()
        .unwrap()
        .contains("[1,2]"));

    bridge.respond_raw("events", r#"{"ok":true,"events":"nope"}"#);
    assert_eq!(client.get_events().unwrap_err().code, ErrorCode::Protocol);

    bridge.respond_raw("set", r#"{"ok":false,"error":"denied"}"#);
    assert_eq!(client.set_debug(false).unwrap_err().code, ErrorCode::Protocol);

    assert_eq!(bridge.connections(), 1);
    assert_eq!(bridge.requests().len(), 4);

    // The connection survives the violations and serves scripted responses.
    bridge.clear_raw();
    client.ping().unwrap();
    assert_eq!(bridge.connections(), 1);
}

#[test]
fn missing_events_field_is_empty() {
    let bridge = FakeBridge::start();
    bridge.respond_raw("events", r#"{"ok":true}"#);
    let client = client_for(&bridge);
    assert!(client.get_events().unwrap().is_empty());
}

/// A `state` response padded to exactly `len` bytes, newline excluded.
fn state_line_of_len(len: usize) -> String {
    let frame = r#"{"ok":true,"state":{"blob":""}}"#;
    let padding = "x".repeat(len - frame.len());
    format!(r#"{{"ok":true,"state":{{"blob":"{padding}"}}}}"#)
}

#[test]
fn response_lines_up_to_one_mebibyte_are_accepted() {
    let bridge = FakeBridge::start();
    let cap = usize::try_from(MAX_LINE_BYTES).unwrap();
    bridge.respond_raw("state", &state_line_of_len(cap - 1));
    let client = client_for(&bridge);

    let state = client.get_state().unwrap();
    assert!(state["blob"].as_str().unwrap().starts_with("xxx"));
    assert_eq!(bridge.connections(), 1);
}

#[test]
fn oversized_response_line_is_a_transport_failure() {
    let bridge = FakeBridge::start();
    let cap = usize::try_from(MAX_LINE_BYTES).unwrap();
    bridge.respond_raw("state", &state_line_of_len(cap + 16));
    let client = client_for(&bridge);

    let err = client.get_state().unwrap_err();
    assert_eq!(err.code, ErrorCode::Connection);
    assert_eq!(bridge.request_count("state"), 2);
    assert!(!client.is_connected());
}

#[test]
fn concurrent_callers_are_serialized() {
    let bridge = FakeBridge::start();
    let client = Arc::new(client_for(&bridge));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let client = Arc::clone(&client);
            std::thread::spawn(move || {
                for _ in 0..25 {
                    client.ping().unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(bridge.request_count("ping"), 100);
    assert_eq!(bridge.connections(), 1);
}

#[test]
fn close_then_request_reconnects() {
    let bridge = FakeBridge::start();
    let client = client_for(&bridge);
    client.ping().unwrap();
    client.close();
    client.close();
    assert!(!client.is_connected());
    client.ping().unwrap();
    assert_eq!(bridge.connections(), 2);
}
