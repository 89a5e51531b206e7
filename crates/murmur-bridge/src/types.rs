//! Wire types for the backend command bridge.
//!
//! These mirror what the backend owns; the shell only caches them and
//! refetches on push events. Field names stay camelCase-free on purpose:
//! the envelope is serde_json with default (snake_case) field names.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

impl ChatMessage {
    pub fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            images: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedChat {
    pub id: i64,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: i64,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub message_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmProvider {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    pub supports_vision: bool,
    pub is_custom: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmModel {
    pub id: String,
    pub provider_id: String,
    /// Model id as the provider's API knows it.
    pub model_id: String,
    pub display_name: String,
    pub supports_vision: bool,
    pub enabled: bool,
}

/// A model as listed by a provider's models endpoint, before the user adds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedModel {
    pub model_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DefaultModels {
    pub chat: Option<String>,
    pub coherent: Option<String>,
    pub voice: Option<String>,
    pub context_chat: Option<String>,
}

/// Feature slot a default model can be assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureSlot {
    Chat,
    Coherent,
    Voice,
    ContextChat,
}

impl FeatureSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureSlot::Chat => "chat",
            FeatureSlot::Coherent => "coherent",
            FeatureSlot::Voice => "voice",
            FeatureSlot::ContextChat => "context_chat",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "chat" => Some(FeatureSlot::Chat),
            "coherent" => Some(FeatureSlot::Coherent),
            "voice" => Some(FeatureSlot::Voice),
            "context_chat" => Some(FeatureSlot::ContextChat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthStartResult {
    pub auth_url: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthResult {
    pub success: bool,
    pub email: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthStatus {
    pub authenticated: bool,
    pub email: Option<String>,
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    Shell,
    AppleScript,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceCommand {
    pub id: String,
    pub name: String,
    /// Spoken trigger phrase.
    pub phrase: String,
    /// Present for bespoke (user-scripted) commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    pub script_kind: ScriptKind,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownApp {
    pub bundle_identifier: String,
    pub display_name: String,
    pub suggested_category_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledApp {
    pub bundle_identifier: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppCategoryMapping {
    pub bundle_identifier: String,
    pub display_name: String,
    pub category_id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverlayPosition {
    Top,
    Bottom,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TtsSettings {
    pub voice: String,
    pub speed: f32,
    pub enabled: bool,
}

/// The slice of backend settings the settings window edits directly.
/// Providers, models, voice commands, and mappings travel through their own
/// commands; this is the general pane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UiSettings {
    pub push_to_talk: bool,
    pub audio_feedback: bool,
    pub audio_feedback_volume: f32,
    pub start_hidden: bool,
    pub autostart_enabled: bool,
    pub selected_language: String,
    pub overlay_position: OverlayPosition,
    pub history_limit: usize,
    pub tts: TtsSettings,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            push_to_talk: false,
            audio_feedback: true,
            audio_feedback_volume: 1.0,
            start_hidden: false,
            autostart_enabled: false,
            selected_language: "en".to_string(),
            overlay_position: OverlayPosition::Bottom,
            history_limit: 100,
            tts: TtsSettings {
                voice: "default".to_string(),
                speed: 1.0,
                enabled: false,
            },
        }
    }
}

/// Partial update; None fields are left untouched by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UiSettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_to_talk: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_feedback: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_feedback_volume: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_hidden: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autostart_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay_position: Option<OverlayPosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts: Option<TtsSettings>,
}

impl UiSettingsPatch {
    /// Apply this patch on top of a settings snapshot (optimistic local copy).
    pub fn apply_to(&self, base: &UiSettings) -> UiSettings {
        UiSettings {
            push_to_talk: self.push_to_talk.unwrap_or(base.push_to_talk),
            audio_feedback: self.audio_feedback.unwrap_or(base.audio_feedback),
            audio_feedback_volume: self
                .audio_feedback_volume
                .unwrap_or(base.audio_feedback_volume),
            start_hidden: self.start_hidden.unwrap_or(base.start_hidden),
            autostart_enabled: self.autostart_enabled.unwrap_or(base.autostart_enabled),
            selected_language: self
                .selected_language
                .clone()
                .unwrap_or_else(|| base.selected_language.clone()),
            overlay_position: self.overlay_position.unwrap_or(base.overlay_position),
            history_limit: self.history_limit.unwrap_or(base.history_limit),
            tts: self.tts.clone().unwrap_or_else(|| base.tts.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_slot_round_trips_all_four() {
        for s in ["chat", "coherent", "voice", "context_chat"] {
            let slot = FeatureSlot::from_str(s).expect("known slot");
            assert_eq!(slot.as_str(), s);
        }
        assert!(FeatureSlot::from_str("transcribe").is_none());
    }

    #[test]
    fn patch_apply_keeps_unpatched_fields() {
        let base = UiSettings::default();
        let patch = UiSettingsPatch {
            push_to_talk: Some(true),
            ..Default::default()
        };
        let next = patch.apply_to(&base);
        assert!(next.push_to_talk);
        assert_eq!(next.selected_language, base.selected_language);
        assert_eq!(next.history_limit, base.history_limit);
    }

    #[test]
    fn patch_serializes_only_set_fields() {
        let patch = UiSettingsPatch {
            audio_feedback: Some(false),
            ..Default::default()
        };
        let v = serde_json::to_value(&patch).expect("serialize");
        let obj = v.as_object().expect("object");
        assert_eq!(obj.len(), 1);
        assert_eq!(obj.get("audio_feedback"), Some(&serde_json::json!(false)));
    }
}
