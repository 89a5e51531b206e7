//! Push events the backend sends over the event stream.
//!
//! Frames are JSON objects `{"event": "...", "payload": ...}`. Payload shape
//! depends on the event; anything we don't recognize parses to `Unknown` so a
//! newer backend never breaks an older shell.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{BridgeError, BridgeResult};

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// Overlay should become visible in the given state ("recording", ...).
    ShowOverlay(String),
    /// Overlay should show an error with the given message.
    ShowOverlayError(String),
    HideOverlay,
    /// Backend decided which prompt mode the dictation belongs to.
    ModeDetermined(String),
    /// Microphone level in [0, 1]; sent rapidly while recording.
    MicLevel(f32),
    PromptModeChanged(String),
    CategoryDetected(String),
    ProcessingCommand,
    ComputerUseStart,
    ComputerUseStep(String),
    ComputerUseEnd,
    ChatsUpdated,
    HistoryUpdated,
    ResetClippingState,
    FocusChanged(bool),
    /// Event name this shell doesn't know; carried for trace context only.
    Unknown(String),
}

#[derive(Debug, Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    payload: Value,
}

fn payload_str(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Parse one event-stream frame. A frame that isn't valid JSON or has no
/// `event` field is an error; an unknown event name is not.
pub fn parse_frame(raw: &str) -> BridgeResult<BridgeEvent> {
    let frame: Frame = serde_json::from_str(raw)
        .map_err(|e| BridgeError::new("E_BRIDGE_EVENT_DECODE", e.to_string()))?;

    let ev = match frame.event.as_str() {
        "show-overlay" => BridgeEvent::ShowOverlay(payload_str(&frame.payload)),
        "show-overlay-error" => BridgeEvent::ShowOverlayError(payload_str(&frame.payload)),
        "hide-overlay" => BridgeEvent::HideOverlay,
        "mode-determined" => BridgeEvent::ModeDetermined(payload_str(&frame.payload)),
        "mic-level" => BridgeEvent::MicLevel(frame.payload.as_f64().unwrap_or(0.0) as f32),
        "prompt-mode-changed" => BridgeEvent::PromptModeChanged(payload_str(&frame.payload)),
        "category-detected" => BridgeEvent::CategoryDetected(payload_str(&frame.payload)),
        "processing-command" => BridgeEvent::ProcessingCommand,
        "computer-use-start" => BridgeEvent::ComputerUseStart,
        "computer-use-step" => BridgeEvent::ComputerUseStep(payload_str(&frame.payload)),
        "computer-use-end" => BridgeEvent::ComputerUseEnd,
        "chats-updated" => BridgeEvent::ChatsUpdated,
        "history-updated" => BridgeEvent::HistoryUpdated,
        "reset-clipping-state" => BridgeEvent::ResetClippingState,
        "focus-changed" => BridgeEvent::FocusChanged(frame.payload.as_bool().unwrap_or(false)),
        other => BridgeEvent::Unknown(other.to_string()),
    };
    Ok(ev)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overlay_state_event() {
        let ev = parse_frame(r#"{"event":"show-overlay","payload":"recording"}"#).unwrap();
        assert_eq!(ev, BridgeEvent::ShowOverlay("recording".to_string()));
    }

    #[test]
    fn parses_mic_level_as_f32() {
        let ev = parse_frame(r#"{"event":"mic-level","payload":0.42}"#).unwrap();
        match ev {
            BridgeEvent::MicLevel(v) => assert!((v - 0.42).abs() < 1e-6),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn missing_payload_is_fine_for_unit_events() {
        let ev = parse_frame(r#"{"event":"chats-updated"}"#).unwrap();
        assert_eq!(ev, BridgeEvent::ChatsUpdated);
    }

    #[test]
    fn unknown_event_name_is_not_an_error() {
        let ev = parse_frame(r#"{"event":"telemetry-tick","payload":1}"#).unwrap();
        assert_eq!(ev, BridgeEvent::Unknown("telemetry-tick".to_string()));
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        let err = parse_frame("{nope").unwrap_err();
        assert_eq!(err.code, "E_BRIDGE_EVENT_DECODE");
    }

    #[test]
    fn focus_changed_carries_bool() {
        let ev = parse_frame(r#"{"event":"focus-changed","payload":true}"#).unwrap();
        assert_eq!(ev, BridgeEvent::FocusChanged(true));
    }
}
