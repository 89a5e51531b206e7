//! UI-side settings state. The backend owns the durable settings; this is the
//! fetched copy the settings window edits, with optimistic toggles that
//! reconcile against whatever the backend answers. Plus the advisory form
//! validation for provider/model editors.

use std::sync::Mutex;

use murmur_bridge::{LlmModel, LlmProvider, UiSettings, UiSettingsPatch};

#[derive(Debug, Clone, PartialEq)]
pub enum CacheState {
    /// Nothing fetched yet (or a fetch failed with nothing prior).
    Empty,
    /// Last known backend truth.
    Synced(UiSettings),
    /// Local copy ran ahead of the backend; the patch is in flight or failed.
    Optimistic { local: UiSettings, error: Option<String> },
}

pub struct SettingsCache {
    state: Mutex<CacheState>,
}

impl SettingsCache {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CacheState::Empty),
        }
    }

    /// Current settings to render; None when nothing was ever fetched.
    pub fn current(&self) -> Option<UiSettings> {
        match &*self.state.lock().unwrap() {
            CacheState::Empty => None,
            CacheState::Synced(s) => Some(s.clone()),
            CacheState::Optimistic { local, .. } => Some(local.clone()),
        }
    }

    pub fn last_error(&self) -> Option<String> {
        match &*self.state.lock().unwrap() {
            CacheState::Optimistic { error, .. } => error.clone(),
            _ => None,
        }
    }

    /// Apply a patch locally before the backend answers. Returns the
    /// settings the UI should show immediately, or None when there is no
    /// base copy to patch.
    pub fn apply_optimistic(&self, patch: &UiSettingsPatch) -> Option<UiSettings> {
        let mut state = self.state.lock().unwrap();
        let base = match &*state {
            CacheState::Empty => return None,
            CacheState::Synced(s) => s.clone(),
            CacheState::Optimistic { local, .. } => local.clone(),
        };
        let local = patch.apply_to(&base);
        *state = CacheState::Optimistic {
            local: local.clone(),
            error: None,
        };
        Some(local)
    }

    /// Backend answered (update response or fresh get): its copy wins.
    pub fn reconcile(&self, fetched: UiSettings) {
        *self.state.lock().unwrap() = CacheState::Synced(fetched);
    }

    /// The in-flight update failed. The optimistic copy stays on screen with
    /// the error alongside; the next refetch will straighten things out.
    pub fn mark_failed(&self, message: String) {
        let mut state = self.state.lock().unwrap();
        if let CacheState::Optimistic { error, .. } = &mut *state {
            *error = Some(message);
        }
    }
}

/// Advisory client-side validation for the provider form. The backend
/// revalidates; this only gates the save button.
pub fn validate_provider(p: &LlmProvider) -> Result<(), String> {
    if p.name.trim().is_empty() {
        return Err("Provider name is required".to_string());
    }
    if p.base_url.trim().is_empty() {
        return Err("Base URL is required".to_string());
    }
    Ok(())
}

pub fn validate_model(m: &LlmModel) -> Result<(), String> {
    if m.provider_id.trim().is_empty() {
        return Err("Select a provider".to_string());
    }
    if m.model_id.trim().is_empty() {
        return Err("Model ID is required".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(name: &str, base_url: &str) -> LlmProvider {
        LlmProvider {
            id: "p1".to_string(),
            name: name.to_string(),
            base_url: base_url.to_string(),
            api_key: String::new(),
            supports_vision: false,
            is_custom: true,
        }
    }

    #[test]
    fn optimistic_toggle_shows_immediately_then_reconciles() {
        let cache = SettingsCache::new();
        cache.reconcile(UiSettings::default());

        let patch = UiSettingsPatch {
            push_to_talk: Some(true),
            ..Default::default()
        };
        let local = cache.apply_optimistic(&patch).expect("has base");
        assert!(local.push_to_talk);

        // Backend answers with its own truth (it rejected the toggle).
        let mut backend = UiSettings::default();
        backend.push_to_talk = false;
        cache.reconcile(backend);
        assert!(!cache.current().unwrap().push_to_talk);
        assert!(cache.last_error().is_none());
    }

    #[test]
    fn optimistic_without_base_copy_is_a_noop() {
        let cache = SettingsCache::new();
        let patch = UiSettingsPatch {
            push_to_talk: Some(true),
            ..Default::default()
        };
        assert!(cache.apply_optimistic(&patch).is_none());
        assert!(cache.current().is_none());
    }

    #[test]
    fn failed_update_keeps_local_copy_and_records_error() {
        let cache = SettingsCache::new();
        cache.reconcile(UiSettings::default());
        let patch = UiSettingsPatch {
            audio_feedback: Some(false),
            ..Default::default()
        };
        cache.apply_optimistic(&patch);
        cache.mark_failed("bridge unreachable".to_string());

        let current = cache.current().unwrap();
        assert!(!current.audio_feedback, "optimistic copy survives");
        assert_eq!(cache.last_error().as_deref(), Some("bridge unreachable"));
    }

    #[test]
    fn stacked_optimistic_patches_compose() {
        let cache = SettingsCache::new();
        cache.reconcile(UiSettings::default());
        cache.apply_optimistic(&UiSettingsPatch {
            push_to_talk: Some(true),
            ..Default::default()
        });
        cache.apply_optimistic(&UiSettingsPatch {
            start_hidden: Some(true),
            ..Default::default()
        });
        let current = cache.current().unwrap();
        assert!(current.push_to_talk && current.start_hidden);
    }

    #[test]
    fn provider_form_requires_name_and_base_url() {
        assert!(validate_provider(&provider("OpenAI", "https://api.openai.com/v1")).is_ok());
        assert!(validate_provider(&provider("  ", "https://x")).is_err());
        assert!(validate_provider(&provider("X", "")).is_err());
    }

    #[test]
    fn model_form_requires_provider_and_model_id() {
        let m = LlmModel {
            id: "m1".to_string(),
            provider_id: "p1".to_string(),
            model_id: "gpt-4o".to_string(),
            display_name: "GPT-4o".to_string(),
            supports_vision: true,
            enabled: true,
        };
        assert!(validate_model(&m).is_ok());
        let mut bad = m.clone();
        bad.model_id = " ".to_string();
        assert!(validate_model(&bad).is_err());
    }
}
