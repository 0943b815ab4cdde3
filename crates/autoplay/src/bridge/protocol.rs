//! Request builders and response validation for the bridge wire protocol.
//!
//! | request | response |
//! |---|---|
//! | `{"cmd":"ping"}` | `{"ok":true,"pong":true}` |
//! | `{"cmd":"state"}` | `{"ok":true,"state":{...}}` |
//! | `{"cmd":"events"}` | `{"ok":true,"events":[...]}` |
//! | `{"cmd":"set","key":"debug","value":bool}` | `{"ok":true,...}` |

use crate::error::{AgentError, AgentResult};
use serde_json::{json, Map, Value};

#[must_use]
pub fn ping_request() -> Value {
    json!({ "cmd": "ping" })
}

#[must_use]
pub fn state_request() -> Value {
    json!({ "cmd": "state" })
}

#[must_use]
pub fn events_request() -> Value {
    json!({ "cmd": "events" })
}

#[must_use]
pub fn set_debug_request(enabled: bool) -> Value {
    json!({ "cmd": "set", "key": "debug", "value": enabled })
}

/// Fail unless the response is an object with `ok: true`.
pub fn expect_ok(response: &Value, cmd: &str) -> AgentResult<()> {
    if response.get("ok").and_then(Value::as_bool) == Some(true) {
        Ok(())
    } else {
        Err(protocol_error(format!("bridge {cmd} error"), response))
    }
}

pub fn parse_pong(response: &Value) -> AgentResult<()> {
    expect_ok(response, "ping")?;
    if response.get("pong").and_then(Value::as_bool) == Some(true) {
        Ok(())
    } else {
        Err(protocol_error("bridge ping missing pong", response))
    }
}

pub fn parse_state(mut response: Value) -> AgentResult<Map<String, Value>> {
    expect_ok(&response, "state")?;
    if let Some(Value::Object(state)) = response.get_mut("state") {
        return Ok(std::mem::take(state));
    }
    Err(protocol_error("bridge state invalid", &response))
}

/// Events must be an array; non-object entries are dropped.
pub fn parse_events(mut response: Value) -> AgentResult<Vec<Map<String, Value>>> {
    expect_ok(&response, "events")?;
    match response.get("events") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(_)) => {}
        Some(_) => return Err(protocol_error("bridge events invalid", &response)),
    }
    let events = match response.get_mut("events").map(Value::take) {
        Some(Value::Array(events)) => events,
        _ => Vec::new(),
    };
    Ok(events
        .into_iter()
        .filter_map(|event| match event {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect())
}

fn protocol_error(message: impl Into<String>, response: &Value) -> AgentError {
    let received: String = response.to_string().chars().take(200).collect();
    AgentError::protocol(message, json!({ "received": received }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::ErrorCode;

    #[test]
    fn requests_match_wire_format() {
        assert_eq!(ping_request().to_string(), r#"{"cmd":"ping"}"#);
        assert_eq!(
            set_debug_request(true),
            json!({"cmd": "set", "key": "debug", "value": true})
        );
    }

    #[test]
    fn pong_requires_ok_and_pong() {
        assert!(parse_pong(&json!({"ok": true, "pong": true})).is_ok());
        assert!(parse_pong(&json!({"ok": true})).is_err());
        assert!(parse_pong(&json!({"ok": false, "pong": true})).is_err());
        assert!(parse_pong(&json!({"pong": true})).is_err());
    }

    #[test]
    fn state_must_be_an_object() {
        let state = parse_state(json!({"ok": true, "state": {"hp": 3}})).unwrap();
        assert_eq!(state.get("hp"), Some(&json!(3)));

        let err = parse_state(json!({"ok": true, "state": [1, 2]})).unwrap_err();
        assert_eq!(err.code, ErrorCode::Protocol);
        assert!(parse_state(json!({"ok": true})).is_err());
        assert!(parse_state(json!({"ok": "yes", "state": {}})).is_err());
    }

    #[test]
    fn events_drop_non_objects() {
        let events = parse_events(json!({
            "ok": true,
            "events": [{"type": "badge_earned"}, 3, "x", {"type": "pokemon_death"}]
        }))
        .unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn missing_events_is_empty() {
        assert!(parse_events(json!({"ok": true})).unwrap().is_empty());
    }

    #[test]
    fn wrong_typed_events_is_protocol_error() {
        let err = parse_events(json!({"ok": true, "events": {"a": 1}})).unwrap_err();
        assert_eq!(err.code, ErrorCode::Protocol);
    }

    #[test]
    fn non_object_response_is_protocol_error() {
        let err = expect_ok(&json!([true]), "set").unwrap_err();
        assert_eq!(err.code, ErrorCode::Protocol);
    }
}
