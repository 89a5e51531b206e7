//! Recording/status overlay: a pure reducer over backend push events plus a
//! thin controller that mirrors the result into the always-on-top overlay
//! window. The backend computes every state; the shell only renders it.

use std::sync::Mutex;

use murmur_bridge::BridgeEvent;
use serde::Serialize;
use tauri::{AppHandle, Emitter, Manager};

pub const OVERLAY_WINDOW_LABEL: &str = "overlay";
/// Event name the overlay webview listens for.
pub const OVERLAY_VIEW_EVENT: &str = "overlay-view";

#[derive(Debug, Clone, PartialEq)]
pub enum OverlayStatus {
    Idle,
    Recording,
    Transcribing,
    MakingCoherent,
    ProcessingCommand,
    ComputerUse,
    Paused,
    Error(String),
}

impl OverlayStatus {
    /// Map the `show-overlay` payload string. Unknown strings map to None and
    /// leave the previous view untouched.
    pub fn from_event_state(s: &str) -> Option<Self> {
        match s {
            "recording" => Some(OverlayStatus::Recording),
            "transcribing" => Some(OverlayStatus::Transcribing),
            "making_coherent" => Some(OverlayStatus::MakingCoherent),
            "processing_command" => Some(OverlayStatus::ProcessingCommand),
            "computer_use" => Some(OverlayStatus::ComputerUse),
            "paused" => Some(OverlayStatus::Paused),
            _ => None,
        }
    }
}

/// What the overlay webview renders. One state, one combination.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OverlayView {
    pub visible: bool,
    pub icon: String,
    pub label: String,
    pub detail: Option<String>,
    /// Pause/resume toggle button. Shown while recording and while paused
    /// (where it reads as resume).
    pub show_pause_toggle: bool,
    pub show_cancel: bool,
    pub mic_level: f32,
}

#[derive(Debug)]
pub struct OverlayModel {
    status: OverlayStatus,
    detail: Option<String>,
    mic_level: f32,
}

impl Default for OverlayModel {
    fn default() -> Self {
        Self {
            status: OverlayStatus::Idle,
            detail: None,
            mic_level: 0.0,
        }
    }
}

impl OverlayModel {
    pub fn status(&self) -> &OverlayStatus {
        &self.status
    }

    /// Apply one backend event. Returns the new view when it changed.
    pub fn apply(&mut self, ev: &BridgeEvent) -> Option<OverlayView> {
        let before = self.view();
        match ev {
            BridgeEvent::ShowOverlay(state) => {
                if let Some(status) = OverlayStatus::from_event_state(state) {
                    if status != OverlayStatus::Recording {
                        self.mic_level = 0.0;
                    }
                    self.status = status;
                    self.detail = None;
                }
            }
            BridgeEvent::ShowOverlayError(msg) => {
                self.status = OverlayStatus::Error(msg.clone());
                self.detail = None;
                self.mic_level = 0.0;
            }
            BridgeEvent::HideOverlay => {
                self.status = OverlayStatus::Idle;
                self.detail = None;
                self.mic_level = 0.0;
            }
            BridgeEvent::MicLevel(v) => {
                // The meter only animates while recording.
                if self.status == OverlayStatus::Recording {
                    self.mic_level = v.clamp(0.0, 1.0);
                }
            }
            BridgeEvent::ModeDetermined(mode) => {
                self.detail = Some(mode.clone());
            }
            BridgeEvent::ProcessingCommand => {
                self.status = OverlayStatus::ProcessingCommand;
                self.mic_level = 0.0;
            }
            BridgeEvent::ComputerUseStart => {
                self.status = OverlayStatus::ComputerUse;
                self.detail = None;
                self.mic_level = 0.0;
            }
            BridgeEvent::ComputerUseStep(step) => {
                if self.status == OverlayStatus::ComputerUse {
                    self.detail = Some(step.clone());
                }
            }
            // The backend follows up with hide-overlay when the whole
            // operation is done; end only clears the step line.
            BridgeEvent::ComputerUseEnd => {
                if self.status == OverlayStatus::ComputerUse {
                    self.detail = None;
                }
            }
            _ => {}
        }
        let after = self.view();
        (after != before).then_some(after)
    }

    /// The presentation lookup table.
    pub fn view(&self) -> OverlayView {
        let (visible, icon, label, pause, cancel): (bool, &str, &str, bool, bool) =
            match &self.status {
                OverlayStatus::Idle => (false, "idle", "", false, false),
                OverlayStatus::Recording => (true, "mic", "Listening", true, true),
                OverlayStatus::Transcribing => (true, "waveform", "Transcribing", false, true),
                OverlayStatus::MakingCoherent => (true, "sparkles", "Refining", false, true),
                OverlayStatus::ProcessingCommand => (true, "gear", "Running command", false, true),
                OverlayStatus::ComputerUse => (true, "cursor", "Computer use", false, true),
                OverlayStatus::Paused => (true, "pause", "Paused", true, true),
                OverlayStatus::Error(_) => (true, "error", "Error", false, false),
            };
        let detail = match &self.status {
            OverlayStatus::Error(msg) => Some(msg.clone()),
            _ => self.detail.clone(),
        };
        OverlayView {
            visible,
            icon: icon.to_string(),
            label: label.to_string(),
            detail,
            show_pause_toggle: pause,
            show_cancel: cancel,
            mic_level: self.mic_level,
        }
    }
}

/// Shared reducer state; the event pump applies, the overlay window renders.
pub struct OverlayController {
    model: Mutex<OverlayModel>,
}

impl OverlayController {
    pub fn new() -> Self {
        Self {
            model: Mutex::new(OverlayModel::default()),
        }
    }

    pub fn current_view(&self) -> OverlayView {
        self.model.lock().unwrap().view()
    }

    /// Apply the event and, if the view changed, push it to the overlay
    /// window and sync window visibility.
    pub fn apply_and_emit(&self, app: &AppHandle, ev: &BridgeEvent) {
        let changed = self.model.lock().unwrap().apply(ev);
        if let Some(view) = changed {
            if let Some(w) = app.get_webview_window(OVERLAY_WINDOW_LABEL) {
                if view.visible {
                    let _ = w.show();
                } else {
                    let _ = w.hide();
                }
            }
            let _ = app.emit(OVERLAY_VIEW_EVENT, view);
        }
    }

    pub fn set_visible(&self, app: &AppHandle, visible: bool) {
        if let Some(w) = app.get_webview_window(OVERLAY_WINDOW_LABEL) {
            let shown = self.current_view().visible;
            if visible && shown {
                let _ = w.show();
            } else {
                let _ = w.hide();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn show(model: &mut OverlayModel, state: &str) -> Option<OverlayView> {
        model.apply(&BridgeEvent::ShowOverlay(state.to_string()))
    }

    #[test]
    fn every_state_has_a_distinct_icon_label_combo() {
        let mut model = OverlayModel::default();
        let mut seen = std::collections::HashSet::new();
        for s in [
            "recording",
            "transcribing",
            "making_coherent",
            "processing_command",
            "computer_use",
            "paused",
        ] {
            let view = show(&mut model, s).expect("view changes");
            assert!(view.visible, "{s} must be visible");
            assert!(seen.insert((view.icon.clone(), view.label.clone())));
        }
    }

    #[test]
    fn paused_shows_both_pause_toggle_and_cancel() {
        let mut model = OverlayModel::default();
        let view = show(&mut model, "paused").unwrap();
        assert!(view.show_pause_toggle);
        assert!(view.show_cancel);
    }

    #[test]
    fn error_shows_detail_and_no_buttons_until_hidden() {
        let mut model = OverlayModel::default();
        let view = model
            .apply(&BridgeEvent::ShowOverlayError("no default model".to_string()))
            .unwrap();
        assert!(view.visible);
        assert_eq!(view.detail.as_deref(), Some("no default model"));
        assert!(!view.show_pause_toggle);
        assert!(!view.show_cancel);

        let hidden = model.apply(&BridgeEvent::HideOverlay).unwrap();
        assert!(!hidden.visible);
    }

    #[test]
    fn unknown_state_string_keeps_previous_view() {
        let mut model = OverlayModel::default();
        show(&mut model, "recording").unwrap();
        assert!(show(&mut model, "defragmenting").is_none());
        assert_eq!(*model.status(), OverlayStatus::Recording);
    }

    #[test]
    fn mic_level_only_moves_the_meter_while_recording() {
        let mut model = OverlayModel::default();
        assert!(model.apply(&BridgeEvent::MicLevel(0.8)).is_none());

        show(&mut model, "recording").unwrap();
        let view = model.apply(&BridgeEvent::MicLevel(0.8)).unwrap();
        assert!((view.mic_level - 0.8).abs() < 1e-6);

        let view = model.apply(&BridgeEvent::MicLevel(3.0)).unwrap();
        assert!((view.mic_level - 1.0).abs() < 1e-6, "clamped to 1.0");

        show(&mut model, "transcribing").unwrap();
        assert!(model.apply(&BridgeEvent::MicLevel(0.5)).is_none());
    }

    #[test]
    fn computer_use_steps_update_detail_and_end_clears_it() {
        let mut model = OverlayModel::default();
        model.apply(&BridgeEvent::ComputerUseStart).unwrap();
        let view = model
            .apply(&BridgeEvent::ComputerUseStep("clicking Save".to_string()))
            .unwrap();
        assert_eq!(view.detail.as_deref(), Some("clicking Save"));

        let view = model.apply(&BridgeEvent::ComputerUseEnd).unwrap();
        assert!(view.detail.is_none());
        assert!(view.visible, "stays visible until hide-overlay");
    }

    #[test]
    fn mode_determined_shows_as_detail() {
        let mut model = OverlayModel::default();
        show(&mut model, "recording").unwrap();
        let view = model
            .apply(&BridgeEvent::ModeDetermined("coherent".to_string()))
            .unwrap();
        assert_eq!(view.detail.as_deref(), Some("coherent"));
    }
}
