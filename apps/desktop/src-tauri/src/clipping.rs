//! Screen-clipping orchestration: the selection drag model for the clipping
//! overlay, the capture choreography (hide everything, capture, restore), and
//! the 500 ms pending-clip poller chat windows use to pick up a finished
//! capture. The poller is a workaround for unreliable cross-window events;
//! keep it dumb.

use std::sync::Mutex;
use std::time::Duration;

use murmur_bridge::{Region, RemoteBridge};
use tauri::{AppHandle, Emitter};
use tokio_util::sync::CancellationToken;

use crate::trace::Span;
use crate::windows;

/// A selection this small is treated as an aborted drag, not a capture.
pub const MIN_SELECTION_PX: u32 = 5;
pub const CLIP_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Event a chat webview receives when its armed capture arrives.
pub const CLIP_READY_EVENT: &str = "clip-ready";

/// Drag model for the clipping overlay. Coordinates are screen pixels; the
/// drag may move in any direction and the resulting region is normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionDrag {
    origin: (i32, i32),
    current: (i32, i32),
}

impl SelectionDrag {
    pub fn press(x: i32, y: i32) -> Self {
        Self {
            origin: (x, y),
            current: (x, y),
        }
    }

    pub fn drag(&mut self, x: i32, y: i32) {
        self.current = (x, y);
    }

    /// The normalized region under the drag right now (for drawing the
    /// rubber band); zero-size while the pointer hasn't moved.
    pub fn region(&self) -> Region {
        let x = self.origin.0.min(self.current.0);
        let y = self.origin.1.min(self.current.1);
        let width = self.origin.0.abs_diff(self.current.0);
        let height = self.origin.1.abs_diff(self.current.1);
        Region {
            x,
            y,
            width,
            height,
        }
    }

    /// Finish the drag. None means cancel: no capture call may be made.
    pub fn release(self) -> Option<Region> {
        let r = self.region();
        if r.width <= MIN_SELECTION_PX || r.height <= MIN_SELECTION_PX {
            return None;
        }
        Some(r)
    }
}

struct Armed {
    target_window: String,
    cancel: CancellationToken,
}

/// Shared clipping state: which chat window (if any) is waiting for a clip.
pub struct ClipController {
    armed: Mutex<Option<Armed>>,
}

impl ClipController {
    pub fn new() -> Self {
        Self {
            armed: Mutex::new(None),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.lock().unwrap().is_some()
    }

    /// Arm the poller for `target_window`. Any previous poller is cancelled;
    /// only one chat window waits for a clip at a time.
    pub fn arm(&self, app: &AppHandle, bridge: RemoteBridge, target_window: &str) {
        let cancel = CancellationToken::new();
        {
            let mut armed = self.armed.lock().unwrap();
            if let Some(prev) = armed.take() {
                prev.cancel.cancel();
            }
            *armed = Some(Armed {
                target_window: target_window.to_string(),
                cancel: cancel.clone(),
            });
        }

        let app = app.clone();
        let target = target_window.to_string();
        tauri::async_runtime::spawn(async move {
            let mut ticker = tokio::time::interval(CLIP_POLL_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                match bridge.get_pending_clip().await {
                    Ok(Some(clip)) => {
                        let _ = app.emit_to(target.as_str(), CLIP_READY_EVENT, clip);
                        if let Some(ctl) = app.try_state::<ClipController>() {
                            ctl.disarm();
                        }
                        return;
                    }
                    // Nothing pending yet, or a transient bridge hiccup:
                    // keep polling either way, the next tick retries.
                    Ok(None) | Err(_) => {}
                }
            }
        });
    }

    pub fn disarm(&self) {
        if let Some(prev) = self.armed.lock().unwrap().take() {
            prev.cancel.cancel();
        }
    }

    /// `reset-clipping-state` from the backend: drop any armed poller.
    pub fn reset(&self) {
        self.disarm();
    }
}

/// Full region capture choreography. The clipping window has already closed
/// its selection; everything app-owned hides so the capture shows the screen
/// underneath, then visibility is restored no matter how the capture went.
pub async fn run_region_capture(
    app: &AppHandle,
    bridge: &RemoteBridge,
    region: Region,
) -> Result<String, String> {
    let dir = crate::data_dir::data_dir().map_err(|e| e.to_string())?;
    let span = Span::start(
        &dir,
        None,
        "Clipping",
        "CLIP.capture_region",
        Some(serde_json::json!({"w": region.width, "h": region.height})),
    );

    windows::hide_clipping_window(app);
    windows::set_chat_window_visibility(app, false);
    windows::set_overlay_visibility(app, false);
    // Give the OS a moment to actually hide the windows before capturing.
    tokio::time::sleep(Duration::from_millis(150)).await;

    let result = bridge.capture_region(region).await;

    windows::set_chat_window_visibility(app, true);
    windows::set_overlay_visibility(app, true);

    match result {
        Ok(b64) => {
            span.ok(Some(serde_json::json!({"bytes": b64.len()})));
            Ok(b64)
        }
        Err(e) => {
            span.err("bridge", "E_CLIP_CAPTURE", &e.to_string(), None);
            Err(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_of_a_real_drag_yields_normalized_region() {
        let mut drag = SelectionDrag::press(100, 200);
        drag.drag(40, 120);
        let r = drag.release().expect("region");
        assert_eq!(r, Region { x: 40, y: 120, width: 60, height: 80 });
    }

    #[test]
    fn tiny_width_cancels_without_region() {
        let mut drag = SelectionDrag::press(10, 10);
        drag.drag(15, 300);
        assert!(drag.release().is_none(), "width 5 is a cancel");
    }

    #[test]
    fn tiny_height_cancels_without_region() {
        let mut drag = SelectionDrag::press(10, 10);
        drag.drag(300, 14);
        assert!(drag.release().is_none(), "height 4 is a cancel");
    }

    #[test]
    fn six_by_six_is_the_smallest_accepted_selection() {
        let mut drag = SelectionDrag::press(0, 0);
        drag.drag(6, 6);
        let r = drag.release().expect("accepted");
        assert_eq!((r.width, r.height), (6, 6));
    }

    #[test]
    fn click_without_movement_cancels() {
        let drag = SelectionDrag::press(50, 50);
        assert!(drag.release().is_none());
    }

    #[test]
    fn controller_single_armed_slot() {
        let ctl = ClipController::new();
        assert!(!ctl.is_armed());
        ctl.disarm(); // disarming empty is fine
        assert!(!ctl.is_armed());
    }
}
