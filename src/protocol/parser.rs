//! Line interpretation for the device protocol.
//!
//! A line is either a state update (`_v_=` followed by JSON) or an
//! opaque diagnostic line. State updates mutate the mirror; everything
//! else is surfaced to the logging sink and to event subscribers.

use serde_json::Value;

use crate::event::{Event, EventDispatcher};
use crate::protocol::STATE_PREFIX;
use crate::state::StateHandle;

/// Parses one protocol line and applies its effect.
///
/// An object payload is merged into the mirror key by key; any other
/// JSON value replaces the mirror wholesale. Malformed JSON is logged
/// and discarded with no state mutation. Lines without the state prefix
/// never touch the mirror.
pub fn parse_line(line: &str, state: &StateHandle, dispatcher: &EventDispatcher) {
    let Some(payload) = line.strip_prefix(STATE_PREFIX) else {
        tracing::info!(line, "device log line");
        dispatcher.dispatch(Event::LogLine(line.to_owned()));
        return;
    };

    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(map)) => {
            tracing::trace!(keys = map.len(), "state update merged");
            state.merge(map);
        }
        Ok(value) => {
            tracing::debug!(?value, "scalar state payload replaced mirror");
            state.replace(value);
        }
        Err(e) => {
            tracing::warn!(line, error = %e, "failed to parse state payload");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DeviceState;
    use serde_json::json;

    fn fixture() -> (StateHandle, EventDispatcher) {
        (StateHandle::new(), EventDispatcher::new(16))
    }

    #[test]
    fn test_object_payloads_merge() {
        let (state, dispatcher) = fixture();
        parse_line("_v_={\"a\":1}", &state, &dispatcher);
        parse_line("_v_={\"b\":2}", &state, &dispatcher);

        assert_eq!(state.get("a"), Some(json!(1)));
        assert_eq!(state.get("b"), Some(json!(2)));
    }

    #[test]
    fn test_overwrite_not_append() {
        let (state, dispatcher) = fixture();
        parse_line("_v_={\"a\":1}", &state, &dispatcher);
        parse_line("_v_={\"a\":2}", &state, &dispatcher);

        assert_eq!(state.get("a"), Some(json!(2)));
    }

    #[test]
    fn test_scalar_payload_replaces() {
        let (state, dispatcher) = fixture();
        parse_line("_v_={\"a\":1}", &state, &dispatcher);
        parse_line("_v_=42", &state, &dispatcher);

        assert_eq!(state.current(), DeviceState::Scalar(json!(42)));
        assert_eq!(state.get("a"), None);
    }

    #[test]
    fn test_malformed_json_leaves_state_unchanged() {
        let (state, dispatcher) = fixture();
        parse_line("_v_={\"a\":1}", &state, &dispatcher);
        parse_line("_v_=not json", &state, &dispatcher);

        assert_eq!(state.get("a"), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_plain_line_only_logged() {
        let (state, dispatcher) = fixture();
        let mut sub = dispatcher.subscribe();

        parse_line("MicroPython v1.22.0 on 2024-01-05", &state, &dispatcher);

        assert_eq!(state.current(), DeviceState::Map(serde_json::Map::new()));
        let event = sub.recv().await;
        assert!(
            matches!(event, Some(Event::LogLine(line)) if line.starts_with("MicroPython"))
        );
    }

    #[test]
    fn test_empty_line_is_a_log_line() {
        let (state, dispatcher) = fixture();
        parse_line("", &state, &dispatcher);
        assert_eq!(state.current(), DeviceState::Map(serde_json::Map::new()));
    }
}
