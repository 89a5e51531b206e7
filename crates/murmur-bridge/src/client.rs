//! HTTP + WebSocket client for the backend command bridge.
//!
//! Request/response commands are a JSON envelope POSTed to `{base}/cmd`:
//! `{"command": "...", "params": {...}}` answered by
//! `{"ok": true, "result": ...}` or `{"ok": false, "error": {code, message}}`.
//! Push events arrive as JSON text frames on a WebSocket at `{base}/events`.

use futures_util::StreamExt;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{BridgeError, BridgeResult};
use crate::events::{parse_frame, BridgeEvent};
use crate::types::*;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:48620";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Clone)]
pub struct RemoteBridge {
    base_url: String,
    http: Client,
}

impl RemoteBridge {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    pub fn from_env() -> Self {
        let base = std::env::var("MURMUR_BRIDGE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self::new(base)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<T: DeserializeOwned>(&self, command: &str, params: Value) -> BridgeResult<T> {
        let url = format!("{}/cmd", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&json!({"command": command, "params": params}))
            .send()
            .await
            .map_err(|e| BridgeError::new("E_BRIDGE_TRANSPORT", e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(BridgeError::new(
                "E_BRIDGE_HTTP",
                format!("{command}: status {status}"),
            ));
        }

        let envelope: Envelope = resp
            .json()
            .await
            .map_err(|e| BridgeError::new("E_BRIDGE_DECODE", format!("{command}: {e}")))?;

        if !envelope.ok {
            let (code, message) = match envelope.error {
                Some(e) => (
                    e.code.unwrap_or_else(|| "E_BACKEND".to_string()),
                    e.message.unwrap_or_else(|| "backend error".to_string()),
                ),
                None => ("E_BACKEND".to_string(), format!("{command} failed")),
            };
            return Err(BridgeError { code, message });
        }

        serde_json::from_value(envelope.result)
            .map_err(|e| BridgeError::new("E_BRIDGE_DECODE", format!("{command}: {e}")))
    }

    // --- settings ---

    pub async fn get_settings(&self) -> BridgeResult<UiSettings> {
        self.call("get_settings", json!({})).await
    }

    /// Returns the settings as the backend sees them after the patch; the
    /// caller reconciles its optimistic copy with this.
    pub async fn update_settings(&self, patch: &UiSettingsPatch) -> BridgeResult<UiSettings> {
        self.call("update_settings", json!({"patch": patch})).await
    }

    // --- providers and models ---

    pub async fn get_llm_providers(&self) -> BridgeResult<Vec<LlmProvider>> {
        self.call("get_llm_providers", json!({})).await
    }

    pub async fn save_llm_provider(&self, provider: &LlmProvider) -> BridgeResult<LlmProvider> {
        self.call("save_llm_provider", json!({"provider": provider}))
            .await
    }

    pub async fn delete_llm_provider(&self, provider_id: &str) -> BridgeResult<()> {
        self.call("delete_llm_provider", json!({"provider_id": provider_id}))
            .await
    }

    pub async fn update_provider_api_key(
        &self,
        provider_id: &str,
        api_key: &str,
    ) -> BridgeResult<()> {
        self.call(
            "update_provider_api_key",
            json!({"provider_id": provider_id, "api_key": api_key}),
        )
        .await
    }

    pub async fn get_llm_models(&self) -> BridgeResult<Vec<LlmModel>> {
        self.call("get_llm_models", json!({})).await
    }

    pub async fn save_llm_model(&self, model: &LlmModel) -> BridgeResult<LlmModel> {
        self.call("save_llm_model", json!({"model": model})).await
    }

    pub async fn delete_llm_model(&self, model_id: &str) -> BridgeResult<()> {
        self.call("delete_llm_model", json!({"model_id": model_id}))
            .await
    }

    pub async fn fetch_provider_models(&self, provider_id: &str) -> BridgeResult<Vec<FetchedModel>> {
        self.call("fetch_provider_models", json!({"provider_id": provider_id}))
            .await
    }

    pub async fn set_default_model(
        &self,
        feature: FeatureSlot,
        model_id: Option<&str>,
    ) -> BridgeResult<()> {
        self.call(
            "set_default_model",
            json!({"feature": feature.as_str(), "model_id": model_id}),
        )
        .await
    }

    pub async fn get_default_models(&self) -> BridgeResult<DefaultModels> {
        self.call("get_default_models", json!({})).await
    }

    // --- chat ---

    pub async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        model_id: Option<&str>,
    ) -> BridgeResult<String> {
        self.call(
            "chat_completion",
            json!({"messages": messages, "model_id": model_id}),
        )
        .await
    }

    pub async fn generate_chat_title(
        &self,
        user_message: &str,
        assistant_response: &str,
    ) -> BridgeResult<String> {
        self.call(
            "generate_chat_title",
            json!({"user_message": user_message, "assistant_response": assistant_response}),
        )
        .await
    }

    // --- saved chats ---

    pub async fn save_chat(
        &self,
        title: Option<&str>,
        messages: &[ChatMessage],
    ) -> BridgeResult<i64> {
        self.call("save_chat", json!({"title": title, "messages": messages}))
            .await
    }

    pub async fn update_chat(&self, id: i64, messages: &[ChatMessage]) -> BridgeResult<()> {
        self.call("update_chat", json!({"id": id, "messages": messages}))
            .await
    }

    pub async fn get_chat(&self, id: i64) -> BridgeResult<Option<SavedChat>> {
        self.call("get_chat", json!({"id": id})).await
    }

    pub async fn list_saved_chats(&self) -> BridgeResult<Vec<ChatSummary>> {
        self.call("list_saved_chats", json!({})).await
    }

    pub async fn delete_saved_chat(&self, id: i64) -> BridgeResult<()> {
        self.call("delete_saved_chat", json!({"id": id})).await
    }

    pub async fn update_chat_title(&self, id: i64, title: &str) -> BridgeResult<()> {
        self.call("update_chat_title", json!({"id": id, "title": title}))
            .await
    }

    // --- oauth ---

    pub async fn oauth_start(&self, provider: &str) -> BridgeResult<OAuthStartResult> {
        self.call("oauth_start", json!({"provider": provider})).await
    }

    pub async fn oauth_await_callback(
        &self,
        provider: &str,
        state: &str,
    ) -> BridgeResult<OAuthResult> {
        self.call(
            "oauth_await_callback",
            json!({"provider": provider, "state": state}),
        )
        .await
    }

    pub async fn oauth_refresh(&self, provider: &str) -> BridgeResult<bool> {
        self.call("oauth_refresh", json!({"provider": provider}))
            .await
    }

    pub async fn oauth_logout(&self, provider: &str) -> BridgeResult<()> {
        self.call("oauth_logout", json!({"provider": provider}))
            .await
    }

    pub async fn oauth_status(&self, provider: &str) -> BridgeResult<OAuthStatus> {
        self.call("oauth_status", json!({"provider": provider}))
            .await
    }

    pub async fn oauth_supports_provider(&self, provider_id: &str) -> BridgeResult<bool> {
        self.call(
            "oauth_supports_provider",
            json!({"provider_id": provider_id}),
        )
        .await
    }

    // --- capture ---

    pub async fn capture_screen(&self) -> BridgeResult<String> {
        self.call("capture_screen", json!({})).await
    }

    pub async fn capture_region(&self, region: Region) -> BridgeResult<String> {
        self.call("capture_region", json!({"region": region})).await
    }

    /// Retrieve-and-clear the pending clip, if a capture finished since the
    /// last poll.
    pub async fn get_pending_clip(&self) -> BridgeResult<Option<String>> {
        self.call("get_pending_clip", json!({})).await
    }

    // --- voice commands ---

    pub async fn list_voice_commands(&self) -> BridgeResult<Vec<VoiceCommand>> {
        self.call("list_voice_commands", json!({})).await
    }

    pub async fn save_voice_command(&self, cmd: &VoiceCommand) -> BridgeResult<VoiceCommand> {
        self.call("save_voice_command", json!({"command": cmd}))
            .await
    }

    pub async fn delete_voice_command(&self, id: &str) -> BridgeResult<()> {
        self.call("delete_voice_command", json!({"id": id})).await
    }

    // --- app categories ---

    pub async fn get_known_applications(&self) -> BridgeResult<Vec<KnownApp>> {
        self.call("get_known_applications", json!({})).await
    }

    pub async fn get_installed_applications(&self) -> BridgeResult<Vec<InstalledApp>> {
        self.call("get_installed_applications", json!({})).await
    }

    pub async fn get_app_category_mappings(&self) -> BridgeResult<Vec<AppCategoryMapping>> {
        self.call("get_app_category_mappings", json!({})).await
    }

    pub async fn set_app_category_mapping(
        &self,
        mapping: &AppCategoryMapping,
    ) -> BridgeResult<()> {
        self.call("set_app_category_mapping", json!({"mapping": mapping}))
            .await
    }

    pub async fn remove_app_category_mapping(&self, bundle_id: &str) -> BridgeResult<()> {
        self.call(
            "remove_app_category_mapping",
            json!({"bundle_id": bundle_id}),
        )
        .await
    }

    // --- tts ---

    pub async fn speak_text(&self, text: &str) -> BridgeResult<()> {
        self.call("speak_text", json!({"text": text})).await
    }

    pub async fn stop_speaking(&self) -> BridgeResult<()> {
        self.call("stop_speaking", json!({})).await
    }

    // --- operation control ---

    pub async fn cancel_operation(&self) -> BridgeResult<()> {
        self.call("cancel_operation", json!({})).await
    }

    pub async fn pause_operation(&self) -> BridgeResult<bool> {
        self.call("pause_operation", json!({})).await
    }

    pub async fn resume_operation(&self) -> BridgeResult<bool> {
        self.call("resume_operation", json!({})).await
    }

    // --- events ---

    pub fn events_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        format!("{ws_base}/events")
    }

    pub async fn connect_events(&self) -> BridgeResult<EventStream> {
        let (ws, _) = connect_async(self.events_url())
            .await
            .map_err(|e| BridgeError::new("E_BRIDGE_WS_CONNECT", e.to_string()))?;
        Ok(EventStream { ws })
    }
}

pub struct EventStream {
    ws: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl EventStream {
    /// Next parsed event; None when the stream is closed. Non-text frames are
    /// skipped, unparseable text frames surface as errors so the pump can
    /// trace them and carry on.
    pub async fn next_event(&mut self) -> Option<BridgeResult<BridgeEvent>> {
        loop {
            let msg = match self.ws.next().await {
                Some(Ok(m)) => m,
                Some(Err(e)) => {
                    return Some(Err(BridgeError::new("E_BRIDGE_WS_READ", e.to_string())))
                }
                None => return None,
            };
            match msg {
                Message::Text(raw) => return Some(parse_frame(&raw)),
                Message::Close(_) => return None,
                _ => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let b = RemoteBridge::new("http://127.0.0.1:48620/");
        assert_eq!(b.base_url(), "http://127.0.0.1:48620");
    }

    #[test]
    fn events_url_swaps_scheme() {
        let b = RemoteBridge::new("http://127.0.0.1:48620");
        assert_eq!(b.events_url(), "ws://127.0.0.1:48620/events");
        let b = RemoteBridge::new("https://bridge.local");
        assert_eq!(b.events_url(), "wss://bridge.local/events");
    }

    #[test]
    fn error_envelope_maps_to_bridge_error() {
        let raw = r#"{"ok":false,"error":{"code":"E_NO_MODEL","message":"no default chat model"}}"#;
        let env: Envelope = serde_json::from_str(raw).unwrap();
        assert!(!env.ok);
        let e = env.error.unwrap();
        assert_eq!(e.code.as_deref(), Some("E_NO_MODEL"));
    }

    #[test]
    fn ok_envelope_with_missing_result_decodes_unit() {
        let raw = r#"{"ok":true}"#;
        let env: Envelope = serde_json::from_str(raw).unwrap();
        assert!(env.ok);
        let v: () = serde_json::from_value(env.result).unwrap();
        let _ = v;
    }
}
