//! Long-lived task that owns the bridge event stream and fans events out:
//! overlay events go through the reducer, domain events are re-emitted to the
//! webviews (which refetch on them), clipping resets clear the poller.

use std::time::Duration;

use murmur_bridge::{BridgeEvent, RemoteBridge};
use tauri::{AppHandle, Emitter, Manager};
use tokio_util::sync::CancellationToken;

use crate::clipping::ClipController;
use crate::overlay::OverlayController;
use crate::trace;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Events the overlay reducer consumes; everything else is domain fan-out.
pub fn is_overlay_event(ev: &BridgeEvent) -> bool {
    matches!(
        ev,
        BridgeEvent::ShowOverlay(_)
            | BridgeEvent::ShowOverlayError(_)
            | BridgeEvent::HideOverlay
            | BridgeEvent::MicLevel(_)
            | BridgeEvent::ModeDetermined(_)
            | BridgeEvent::ProcessingCommand
            | BridgeEvent::ComputerUseStart
            | BridgeEvent::ComputerUseStep(_)
            | BridgeEvent::ComputerUseEnd
    )
}

fn dispatch(app: &AppHandle, ev: BridgeEvent) {
    if is_overlay_event(&ev) {
        if let Some(overlay) = app.try_state::<OverlayController>() {
            overlay.apply_and_emit(app, &ev);
        }
        return;
    }
    match ev {
        BridgeEvent::ChatsUpdated => {
            // Chat windows and the settings window refetch their lists.
            let _ = app.emit("chats-updated", ());
        }
        BridgeEvent::HistoryUpdated => {
            let _ = app.emit("history-updated", ());
        }
        BridgeEvent::PromptModeChanged(mode) => {
            let _ = app.emit("prompt-mode-changed", mode);
        }
        BridgeEvent::CategoryDetected(category_id) => {
            let _ = app.emit("category-detected", category_id);
        }
        BridgeEvent::ResetClippingState => {
            if let Some(clip) = app.try_state::<ClipController>() {
                clip.reset();
            }
            let _ = app.emit("reset-clipping-state", ());
        }
        BridgeEvent::FocusChanged(focused) => {
            let _ = app.emit("focus-changed", focused);
        }
        BridgeEvent::Unknown(name) => {
            if let Ok(dir) = crate::data_dir::data_dir() {
                trace::event(
                    &dir,
                    None,
                    "Pump",
                    "PUMP.unknown_event",
                    "ok",
                    Some(serde_json::json!({"event": name})),
                );
            }
        }
        _ => {}
    }
}

/// Spawn the pump. It reconnects forever with a fixed short delay; the token
/// stops it at shutdown.
pub fn spawn(app: AppHandle, bridge: RemoteBridge, shutdown: CancellationToken) {
    tauri::async_runtime::spawn(async move {
        let dir = crate::data_dir::data_dir().ok();
        loop {
            if shutdown.is_cancelled() {
                return;
            }
            let mut stream = match bridge.connect_events().await {
                Ok(s) => {
                    if let Some(dir) = &dir {
                        trace::event(dir, None, "Pump", "PUMP.connected", "ok", None);
                    }
                    s
                }
                Err(e) => {
                    if let Some(dir) = &dir {
                        trace::event(
                            &dir,
                            None,
                            "Pump",
                            "PUMP.connect",
                            "err",
                            Some(serde_json::json!({"code": e.code, "message": e.message})),
                        );
                    }
                    tokio::select! {
                        _ = shutdown.cancelled() => return,
                        _ = tokio::time::sleep(RECONNECT_DELAY) => continue,
                    }
                }
            };

            loop {
                let next = tokio::select! {
                    _ = shutdown.cancelled() => return,
                    ev = stream.next_event() => ev,
                };
                match next {
                    Some(Ok(ev)) => dispatch(&app, ev),
                    Some(Err(e)) => {
                        // One bad frame doesn't kill the stream.
                        if let Some(dir) = &dir {
                            trace::event(
                                &dir,
                                None,
                                "Pump",
                                "PUMP.frame",
                                "err",
                                Some(serde_json::json!({"code": e.code, "message": e.message})),
                            );
                        }
                    }
                    None => break,
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_events_route_to_the_reducer() {
        assert!(is_overlay_event(&BridgeEvent::ShowOverlay(
            "recording".to_string()
        )));
        assert!(is_overlay_event(&BridgeEvent::MicLevel(0.2)));
        assert!(is_overlay_event(&BridgeEvent::ComputerUseEnd));
        assert!(!is_overlay_event(&BridgeEvent::ChatsUpdated));
        assert!(!is_overlay_event(&BridgeEvent::ResetClippingState));
        assert!(!is_overlay_event(&BridgeEvent::FocusChanged(true)));
    }
}
