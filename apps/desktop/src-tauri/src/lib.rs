mod chat;
mod clipping;
mod data_dir;
mod event_pump;
mod oauth;
mod overlay;
mod panic_log;
mod settings_cache;
mod trace;
mod voice_commands;
mod windows;

use chat::{ChatSession, ChatSessions, ChatViewState, SavePlan};
use clipping::{ClipController, SelectionDrag};
use murmur_bridge::{
    AppCategoryMapping, ChatMessage, ChatSummary, DefaultModels, FeatureSlot, FetchedModel,
    InstalledApp, KnownApp, LlmModel, LlmProvider, RemoteBridge, UiSettings, UiSettingsPatch,
    VoiceCommand,
};
use oauth::{OAuthPanels, OAuthPhase};
use overlay::{OverlayController, OverlayView};
use settings_cache::SettingsCache;
use tauri::Manager;
use tokio_util::sync::CancellationToken;
use trace::Span;

fn cmd_span(
    data_dir: &std::path::Path,
    task_id: Option<&str>,
    step_id: &str,
    ctx: Option<serde_json::Value>,
) -> Span {
    Span::start(data_dir, task_id, "Cmd", step_id, ctx)
}

fn dir_or_err() -> Result<std::path::PathBuf, String> {
    data_dir::data_dir().map_err(|e| e.to_string())
}

// --- windows ---

#[tauri::command]
fn open_chat_window(
    app: tauri::AppHandle,
    sessions: tauri::State<ChatSessions>,
    context: Option<String>,
) -> Result<String, String> {
    let dir = dir_or_err()?;
    let span = cmd_span(
        &dir,
        None,
        "CMD.open_chat_window",
        Some(serde_json::json!({"has_context": context.is_some()})),
    );
    match windows::open_chat_window(&app, context.as_deref(), None, None) {
        Ok(label) => {
            sessions.insert(
                &label,
                ChatSession::from_bootstrap(chat::ChatBootstrap {
                    context,
                    ..Default::default()
                }),
            );
            span.ok(Some(serde_json::json!({"label": label})));
            Ok(label)
        }
        Err(e) => {
            span.err_anyhow("window", "E_CMD_OPEN_CHAT", &e, None);
            Err(e.to_string())
        }
    }
}

/// Fork: a fresh chat window seeded with a message prefix.
#[tauri::command]
fn open_chat_window_with_messages(
    app: tauri::AppHandle,
    sessions: tauri::State<ChatSessions>,
    messages: Vec<ChatMessage>,
) -> Result<String, String> {
    let dir = dir_or_err()?;
    let span = cmd_span(
        &dir,
        None,
        "CMD.open_chat_fork",
        Some(serde_json::json!({"seed_messages": messages.len()})),
    );
    match windows::open_chat_window(&app, None, None, Some(&messages)) {
        Ok(label) => {
            sessions.insert(
                &label,
                ChatSession::from_bootstrap(chat::ChatBootstrap {
                    messages,
                    ..Default::default()
                }),
            );
            span.ok(Some(serde_json::json!({"label": label})));
            Ok(label)
        }
        Err(e) => {
            span.err_anyhow("window", "E_CMD_OPEN_FORK", &e, None);
            Err(e.to_string())
        }
    }
}

/// Reopen a saved chat in a new window.
#[tauri::command]
async fn open_saved_chat(
    app: tauri::AppHandle,
    sessions: tauri::State<'_, ChatSessions>,
    bridge: tauri::State<'_, RemoteBridge>,
    id: i64,
) -> Result<String, String> {
    let dir = dir_or_err()?;
    let span = cmd_span(&dir, None, "CMD.open_saved_chat", Some(serde_json::json!({"id": id})));
    let saved = match bridge.get_chat(id).await {
        Ok(Some(c)) => c,
        Ok(None) => {
            span.err("bridge", "E_CMD_CHAT_MISSING", "chat not found", None);
            return Err(format!("Chat {id} not found"));
        }
        Err(e) => {
            span.err("bridge", "E_CMD_GET_CHAT", &e.to_string(), None);
            return Err(e.to_string());
        }
    };
    match windows::open_chat_window(&app, None, Some(id), Some(&saved.messages)) {
        Ok(label) => {
            let mut session = ChatSession::from_bootstrap(chat::ChatBootstrap {
                chat_id: Some(id),
                messages: saved.messages,
                ..Default::default()
            });
            session.title = Some(saved.title);
            sessions.insert(&label, session);
            span.ok(Some(serde_json::json!({"label": label})));
            Ok(label)
        }
        Err(e) => {
            span.err_anyhow("window", "E_CMD_OPEN_SAVED", &e, None);
            Err(e.to_string())
        }
    }
}

#[tauri::command]
fn restore_app_visibility(app: tauri::AppHandle) -> Result<(), String> {
    let dir = dir_or_err()?;
    let span = cmd_span(&dir, None, "CMD.restore_visibility", None);
    windows::restore_app_visibility(&app);
    span.ok(None);
    Ok(())
}

// --- chat ---

/// First call a chat webview makes, passing its own URL query string. Windows
/// the shell opened already have a session; a reloaded or externally-opened
/// window gets one parsed from the query.
#[tauri::command]
fn chat_bootstrap(
    sessions: tauri::State<ChatSessions>,
    window_label: &str,
    query: &str,
) -> ChatViewState {
    sessions.bootstrap(window_label, query)
}

#[tauri::command]
fn chat_view(
    sessions: tauri::State<ChatSessions>,
    window_label: &str,
) -> Result<ChatViewState, String> {
    sessions
        .with(window_label, |s| s.view())
        .ok_or_else(|| format!("Unknown chat window '{window_label}'"))
}

#[tauri::command]
fn chat_attach_image(
    sessions: tauri::State<ChatSessions>,
    window_label: &str,
    image_b64: String,
) -> Result<ChatViewState, String> {
    sessions
        .with(window_label, |s| {
            s.attach_image(image_b64);
            s.view()
        })
        .ok_or_else(|| format!("Unknown chat window '{window_label}'"))
}

/// Send the user's message: completion, then autosave (create + optional
/// title on first save, update afterwards). Bridge errors land inline on the
/// session; the command itself only fails for an unknown window.
#[tauri::command]
async fn chat_send(
    sessions: tauri::State<'_, ChatSessions>,
    bridge: tauri::State<'_, RemoteBridge>,
    window_label: &str,
    text: &str,
    model_id: Option<String>,
) -> Result<ChatViewState, String> {
    let dir = dir_or_err()?;
    let task_id = uuid::Uuid::new_v4().to_string();
    let span = cmd_span(
        &dir,
        Some(&task_id),
        "CMD.chat_send",
        Some(serde_json::json!({"window": window_label, "chars": text.len(), "model_id": model_id})),
    );

    let outbound = sessions
        .with(window_label, |s| {
            if s.busy {
                return Err("A message is already in flight".to_string());
            }
            s.busy = true;
            s.push_user(text.to_string());
            Ok(s.outbound_messages())
        })
        .ok_or_else(|| format!("Unknown chat window '{window_label}'"))?;
    let outbound = match outbound {
        Ok(v) => v,
        Err(e) => {
            span.err("logic", "E_CMD_CHAT_BUSY", &e, None);
            return Err(e);
        }
    };

    let completion = bridge.chat_completion(&outbound, model_id.as_deref()).await;
    match completion {
        Ok(reply) => {
            sessions.with(window_label, |s| {
                s.push_assistant(reply);
                s.busy = false;
            });
        }
        Err(e) => {
            // Non-fatal: error text shows inline, history stays as typed.
            sessions.with(window_label, |s| {
                s.set_error(e.to_string());
                s.busy = false;
            });
            span.err("bridge", "E_CMD_COMPLETION", &e.to_string(), None);
            return sessions
                .with(window_label, |s| s.view())
                .ok_or_else(|| format!("Unknown chat window '{window_label}'"));
        }
    }

    autosave(&dir, &task_id, &sessions, &bridge, window_label).await;

    let view = sessions
        .with(window_label, |s| s.view())
        .ok_or_else(|| format!("Unknown chat window '{window_label}'"))?;
    span.ok(Some(serde_json::json!({"messages": view.messages.len(), "chat_id": view.id})));
    Ok(view)
}

/// Autosave after a completed exchange. Every failure here is swallowed
/// (traced only): persistence is a convenience, not part of the send.
async fn autosave(
    dir: &std::path::Path,
    task_id: &str,
    sessions: &ChatSessions,
    bridge: &RemoteBridge,
    window_label: &str,
) {
    let plan = sessions
        .with(window_label, |s| s.save_plan())
        .unwrap_or(SavePlan::Skip);
    match plan {
        SavePlan::Skip => {}
        SavePlan::Update(id) => {
            let messages = sessions
                .with(window_label, |s| s.messages.clone())
                .unwrap_or_default();
            if let Err(e) = bridge.update_chat(id, &messages).await {
                trace::event(
                    dir,
                    Some(task_id),
                    "Chat",
                    "CHAT.autosave_update",
                    "err",
                    Some(serde_json::json!({"id": id, "error": e.to_string()})),
                );
            }
        }
        SavePlan::Create { generate_title } => {
            let messages = sessions
                .with(window_label, |s| s.messages.clone())
                .unwrap_or_default();
            let id = match bridge.save_chat(None, &messages).await {
                Ok(id) => id,
                Err(e) => {
                    trace::event(
                        dir,
                        Some(task_id),
                        "Chat",
                        "CHAT.autosave_create",
                        "err",
                        Some(serde_json::json!({"error": e.to_string()})),
                    );
                    return;
                }
            };
            sessions.with(window_label, |s| s.id = Some(id));

            if !generate_title {
                return;
            }
            let exchange = sessions
                .with(window_label, |s| {
                    s.last_exchange()
                        .map(|(u, a)| (u.to_string(), a.to_string()))
                })
                .flatten();
            let Some((user, assistant)) = exchange else {
                return;
            };
            // Title generation is best-effort; the chat keeps "New Chat".
            match bridge.generate_chat_title(&user, &assistant).await {
                Ok(title) => {
                    if bridge.update_chat_title(id, &title).await.is_ok() {
                        sessions.with(window_label, |s| s.title = Some(title));
                    }
                }
                Err(e) => {
                    trace::event(
                        dir,
                        Some(task_id),
                        "Chat",
                        "CHAT.autosave_title",
                        "err",
                        Some(serde_json::json!({"id": id, "error": e.to_string()})),
                    );
                }
            }
        }
    }
}

#[tauri::command]
async fn list_saved_chats(
    bridge: tauri::State<'_, RemoteBridge>,
) -> Result<Vec<ChatSummary>, String> {
    let dir = dir_or_err()?;
    let span = cmd_span(&dir, None, "CMD.list_saved_chats", None);
    match bridge.list_saved_chats().await {
        Ok(v) => {
            span.ok(Some(serde_json::json!({"count": v.len()})));
            Ok(v)
        }
        Err(e) => {
            span.err("bridge", "E_CMD_LIST_CHATS", &e.to_string(), None);
            Err(e.to_string())
        }
    }
}

#[tauri::command]
async fn delete_saved_chat(
    bridge: tauri::State<'_, RemoteBridge>,
    id: i64,
) -> Result<(), String> {
    let dir = dir_or_err()?;
    let span = cmd_span(&dir, None, "CMD.delete_saved_chat", Some(serde_json::json!({"id": id})));
    match bridge.delete_saved_chat(id).await {
        Ok(()) => {
            span.ok(None);
            Ok(())
        }
        Err(e) => {
            span.err("bridge", "E_CMD_DELETE_CHAT", &e.to_string(), None);
            Err(e.to_string())
        }
    }
}

#[tauri::command]
async fn update_chat_title(
    sessions: tauri::State<'_, ChatSessions>,
    bridge: tauri::State<'_, RemoteBridge>,
    window_label: Option<String>,
    id: i64,
    title: String,
) -> Result<(), String> {
    let dir = dir_or_err()?;
    let span = cmd_span(&dir, None, "CMD.update_chat_title", Some(serde_json::json!({"id": id})));
    match bridge.update_chat_title(id, &title).await {
        Ok(()) => {
            if let Some(label) = window_label.as_deref() {
                sessions.with(label, |s| s.title = Some(title.clone()));
            }
            span.ok(None);
            Ok(())
        }
        Err(e) => {
            span.err("bridge", "E_CMD_RETITLE", &e.to_string(), None);
            Err(e.to_string())
        }
    }
}

// --- settings ---

#[tauri::command]
async fn get_ui_settings(
    cache: tauri::State<'_, SettingsCache>,
    bridge: tauri::State<'_, RemoteBridge>,
) -> Result<UiSettings, String> {
    let dir = dir_or_err()?;
    let span = cmd_span(&dir, None, "CMD.get_settings", None);
    match bridge.get_settings().await {
        Ok(s) => {
            cache.reconcile(s.clone());
            span.ok(None);
            Ok(s)
        }
        Err(e) => {
            span.err("bridge", "E_CMD_GET_SETTINGS", &e.to_string(), None);
            // A failed fetch leaves the last known copy on screen.
            cache.current().ok_or_else(|| e.to_string())
        }
    }
}

/// Optimistic update: the local copy changes immediately, the backend's
/// answer reconciles it. On failure the optimistic copy stays with the error
/// recorded; the caller shows both.
#[tauri::command]
async fn update_ui_settings(
    cache: tauri::State<'_, SettingsCache>,
    bridge: tauri::State<'_, RemoteBridge>,
    patch: UiSettingsPatch,
) -> Result<UiSettings, String> {
    let dir = dir_or_err()?;
    let span = cmd_span(&dir, None, "CMD.update_settings", None);
    let local = cache.apply_optimistic(&patch);
    match bridge.update_settings(&patch).await {
        Ok(s) => {
            cache.reconcile(s.clone());
            span.ok(None);
            Ok(s)
        }
        Err(e) => {
            cache.mark_failed(e.to_string());
            span.err("bridge", "E_CMD_UPDATE_SETTINGS", &e.to_string(), None);
            local.ok_or_else(|| e.to_string())
        }
    }
}

#[tauri::command]
fn settings_last_error(cache: tauri::State<SettingsCache>) -> Option<String> {
    cache.last_error()
}

// --- providers and models ---

#[tauri::command]
async fn get_llm_providers(
    bridge: tauri::State<'_, RemoteBridge>,
) -> Result<Vec<LlmProvider>, String> {
    let dir = dir_or_err()?;
    let span = cmd_span(&dir, None, "CMD.get_providers", None);
    match bridge.get_llm_providers().await {
        Ok(v) => {
            span.ok(Some(serde_json::json!({"count": v.len()})));
            Ok(v)
        }
        Err(e) => {
            span.err("bridge", "E_CMD_GET_PROVIDERS", &e.to_string(), None);
            Err(e.to_string())
        }
    }
}

#[tauri::command]
async fn save_llm_provider(
    bridge: tauri::State<'_, RemoteBridge>,
    provider: LlmProvider,
) -> Result<LlmProvider, String> {
    let dir = dir_or_err()?;
    let span = cmd_span(
        &dir,
        None,
        "CMD.save_provider",
        Some(serde_json::json!({"id": provider.id})),
    );
    if let Err(e) = settings_cache::validate_provider(&provider) {
        span.err("logic", "E_CMD_PROVIDER_INVALID", &e, None);
        return Err(e);
    }
    match bridge.save_llm_provider(&provider).await {
        Ok(p) => {
            span.ok(None);
            Ok(p)
        }
        Err(e) => {
            span.err("bridge", "E_CMD_SAVE_PROVIDER", &e.to_string(), None);
            Err(e.to_string())
        }
    }
}

#[tauri::command]
async fn delete_llm_provider(
    bridge: tauri::State<'_, RemoteBridge>,
    provider_id: String,
) -> Result<(), String> {
    let dir = dir_or_err()?;
    let span = cmd_span(
        &dir,
        None,
        "CMD.delete_provider",
        Some(serde_json::json!({"id": provider_id})),
    );
    match bridge.delete_llm_provider(&provider_id).await {
        Ok(()) => {
            span.ok(None);
            Ok(())
        }
        Err(e) => {
            span.err("bridge", "E_CMD_DELETE_PROVIDER", &e.to_string(), None);
            Err(e.to_string())
        }
    }
}

#[tauri::command]
async fn update_provider_api_key(
    bridge: tauri::State<'_, RemoteBridge>,
    provider_id: String,
    api_key: String,
) -> Result<(), String> {
    let dir = dir_or_err()?;
    let span = cmd_span(
        &dir,
        None,
        "CMD.update_api_key",
        Some(serde_json::json!({"id": provider_id, "key_chars": api_key.len()})),
    );
    match bridge.update_provider_api_key(&provider_id, &api_key).await {
        Ok(()) => {
            span.ok(None);
            Ok(())
        }
        Err(e) => {
            span.err("bridge", "E_CMD_UPDATE_KEY", &e.to_string(), None);
            Err(e.to_string())
        }
    }
}

#[tauri::command]
async fn get_llm_models(bridge: tauri::State<'_, RemoteBridge>) -> Result<Vec<LlmModel>, String> {
    let dir = dir_or_err()?;
    let span = cmd_span(&dir, None, "CMD.get_models", None);
    match bridge.get_llm_models().await {
        Ok(v) => {
            span.ok(Some(serde_json::json!({"count": v.len()})));
            Ok(v)
        }
        Err(e) => {
            span.err("bridge", "E_CMD_GET_MODELS", &e.to_string(), None);
            Err(e.to_string())
        }
    }
}

#[tauri::command]
async fn save_llm_model(
    bridge: tauri::State<'_, RemoteBridge>,
    model: LlmModel,
) -> Result<LlmModel, String> {
    let dir = dir_or_err()?;
    let span = cmd_span(&dir, None, "CMD.save_model", Some(serde_json::json!({"id": model.id})));
    if let Err(e) = settings_cache::validate_model(&model) {
        span.err("logic", "E_CMD_MODEL_INVALID", &e, None);
        return Err(e);
    }
    match bridge.save_llm_model(&model).await {
        Ok(m) => {
            span.ok(None);
            Ok(m)
        }
        Err(e) => {
            span.err("bridge", "E_CMD_SAVE_MODEL", &e.to_string(), None);
            Err(e.to_string())
        }
    }
}

#[tauri::command]
async fn delete_llm_model(
    bridge: tauri::State<'_, RemoteBridge>,
    model_id: String,
) -> Result<(), String> {
    let dir = dir_or_err()?;
    let span = cmd_span(
        &dir,
        None,
        "CMD.delete_model",
        Some(serde_json::json!({"id": model_id})),
    );
    match bridge.delete_llm_model(&model_id).await {
        Ok(()) => {
            span.ok(None);
            Ok(())
        }
        Err(e) => {
            span.err("bridge", "E_CMD_DELETE_MODEL", &e.to_string(), None);
            Err(e.to_string())
        }
    }
}

#[tauri::command]
async fn fetch_provider_models(
    bridge: tauri::State<'_, RemoteBridge>,
    provider_id: String,
) -> Result<Vec<FetchedModel>, String> {
    let dir = dir_or_err()?;
    let span = cmd_span(
        &dir,
        None,
        "CMD.fetch_models",
        Some(serde_json::json!({"id": provider_id})),
    );
    match bridge.fetch_provider_models(&provider_id).await {
        Ok(v) => {
            span.ok(Some(serde_json::json!({"count": v.len()})));
            Ok(v)
        }
        Err(e) => {
            span.err("bridge", "E_CMD_FETCH_MODELS", &e.to_string(), None);
            Err(e.to_string())
        }
    }
}

#[tauri::command]
async fn set_default_model(
    bridge: tauri::State<'_, RemoteBridge>,
    feature: String,
    model_id: Option<String>,
) -> Result<(), String> {
    let dir = dir_or_err()?;
    let span = cmd_span(
        &dir,
        None,
        "CMD.set_default_model",
        Some(serde_json::json!({"feature": feature, "model_id": model_id})),
    );
    let Some(slot) = FeatureSlot::from_str(&feature) else {
        let msg = format!("Unknown feature '{feature}'. Valid: chat, coherent, voice, context_chat");
        span.err("logic", "E_CMD_BAD_SLOT", &msg, None);
        return Err(msg);
    };
    match bridge.set_default_model(slot, model_id.as_deref()).await {
        Ok(()) => {
            span.ok(None);
            Ok(())
        }
        Err(e) => {
            span.err("bridge", "E_CMD_SET_DEFAULT", &e.to_string(), None);
            Err(e.to_string())
        }
    }
}

#[tauri::command]
async fn get_default_models(
    bridge: tauri::State<'_, RemoteBridge>,
) -> Result<DefaultModels, String> {
    let dir = dir_or_err()?;
    let span = cmd_span(&dir, None, "CMD.get_default_models", None);
    match bridge.get_default_models().await {
        Ok(v) => {
            span.ok(None);
            Ok(v)
        }
        Err(e) => {
            span.err("bridge", "E_CMD_GET_DEFAULTS", &e.to_string(), None);
            Err(e.to_string())
        }
    }
}

// --- oauth ---

#[tauri::command]
async fn oauth_start(
    app: tauri::AppHandle,
    panels: tauri::State<'_, OAuthPanels>,
    bridge: tauri::State<'_, RemoteBridge>,
    provider: String,
) -> Result<OAuthPhase, String> {
    use tauri_plugin_opener::OpenerExt;
    let dir = dir_or_err()?;
    let span = cmd_span(&dir, None, "CMD.oauth_start", Some(serde_json::json!({"provider": provider})));
    panels.with(&provider, |p| p.on_start_requested());
    match bridge.oauth_start(&provider).await {
        Ok(r) => {
            // Hand the consent page to the default browser; the backend's
            // callback server finishes the dance.
            if let Err(e) = app.opener().open_url(&r.auth_url, None::<&str>) {
                crate::safe_eprintln!("oauth: open browser failed: {e}");
            }
            span.ok(None);
            Ok(panels.with(&provider, |p| {
                p.on_start_ok(r.state.clone());
                p.phase().clone()
            }))
        }
        Err(e) => {
            span.err("bridge", "E_CMD_OAUTH_START", &e.to_string(), None);
            Ok(panels.with(&provider, |p| {
                p.on_start_error(e.to_string());
                p.phase().clone()
            }))
        }
    }
}

#[tauri::command]
async fn oauth_await_callback(
    panels: tauri::State<'_, OAuthPanels>,
    bridge: tauri::State<'_, RemoteBridge>,
    provider: String,
    state: String,
) -> Result<OAuthPhase, String> {
    let dir = dir_or_err()?;
    let span = cmd_span(&dir, None, "CMD.oauth_await", Some(serde_json::json!({"provider": provider})));
    match bridge.oauth_await_callback(&provider, &state).await {
        Ok(result) => {
            span.ok(Some(serde_json::json!({"success": result.success})));
            Ok(panels.with(&provider, |p| {
                p.on_callback(&result);
                p.phase().clone()
            }))
        }
        Err(e) => {
            span.err("bridge", "E_CMD_OAUTH_AWAIT", &e.to_string(), None);
            Ok(panels.with(&provider, |p| {
                p.on_start_error(e.to_string());
                p.phase().clone()
            }))
        }
    }
}

#[tauri::command]
async fn oauth_refresh(
    panels: tauri::State<'_, OAuthPanels>,
    bridge: tauri::State<'_, RemoteBridge>,
    provider: String,
) -> Result<bool, String> {
    let dir = dir_or_err()?;
    let span = cmd_span(&dir, None, "CMD.oauth_refresh", Some(serde_json::json!({"provider": provider})));
    match bridge.oauth_refresh(&provider).await {
        Ok(refreshed) => {
            panels.with(&provider, |p| p.on_refresh(refreshed));
            span.ok(Some(serde_json::json!({"refreshed": refreshed})));
            Ok(refreshed)
        }
        Err(e) => {
            span.err("bridge", "E_CMD_OAUTH_REFRESH", &e.to_string(), None);
            Err(e.to_string())
        }
    }
}

#[tauri::command]
async fn oauth_logout(
    panels: tauri::State<'_, OAuthPanels>,
    bridge: tauri::State<'_, RemoteBridge>,
    provider: String,
) -> Result<OAuthPhase, String> {
    let dir = dir_or_err()?;
    let span = cmd_span(&dir, None, "CMD.oauth_logout", Some(serde_json::json!({"provider": provider})));
    match bridge.oauth_logout(&provider).await {
        Ok(()) => {
            span.ok(None);
            Ok(panels.with(&provider, |p| {
                p.on_logout();
                p.phase().clone()
            }))
        }
        Err(e) => {
            span.err("bridge", "E_CMD_OAUTH_LOGOUT", &e.to_string(), None);
            Err(e.to_string())
        }
    }
}

#[tauri::command]
async fn oauth_status(
    panels: tauri::State<'_, OAuthPanels>,
    bridge: tauri::State<'_, RemoteBridge>,
    provider: String,
) -> Result<OAuthPhase, String> {
    let dir = dir_or_err()?;
    let span = cmd_span(&dir, None, "CMD.oauth_status", Some(serde_json::json!({"provider": provider})));
    match bridge.oauth_status(&provider).await {
        Ok(status) => {
            span.ok(Some(serde_json::json!({"authenticated": status.authenticated})));
            Ok(panels.with(&provider, |p| {
                p.on_status(&status);
                p.phase().clone()
            }))
        }
        Err(e) => {
            span.err("bridge", "E_CMD_OAUTH_STATUS", &e.to_string(), None);
            Err(e.to_string())
        }
    }
}

#[tauri::command]
async fn oauth_supports_provider(
    bridge: tauri::State<'_, RemoteBridge>,
    provider_id: String,
) -> Result<bool, String> {
    bridge
        .oauth_supports_provider(&provider_id)
        .await
        .map_err(|e| e.to_string())
}

// --- voice commands & app categories ---

#[tauri::command]
async fn list_voice_commands(
    bridge: tauri::State<'_, RemoteBridge>,
) -> Result<Vec<VoiceCommand>, String> {
    bridge.list_voice_commands().await.map_err(|e| e.to_string())
}

#[tauri::command]
async fn save_voice_command(
    bridge: tauri::State<'_, RemoteBridge>,
    command: VoiceCommand,
) -> Result<VoiceCommand, String> {
    let dir = dir_or_err()?;
    let span = cmd_span(
        &dir,
        None,
        "CMD.save_voice_command",
        Some(serde_json::json!({"id": command.id})),
    );
    if let Err(e) = voice_commands::validate_voice_command(&command) {
        span.err("logic", "E_CMD_VOICE_INVALID", &e, None);
        return Err(e);
    }
    match bridge.save_voice_command(&command).await {
        Ok(c) => {
            span.ok(None);
            Ok(c)
        }
        Err(e) => {
            span.err("bridge", "E_CMD_SAVE_VOICE", &e.to_string(), None);
            Err(e.to_string())
        }
    }
}

#[tauri::command]
async fn delete_voice_command(
    bridge: tauri::State<'_, RemoteBridge>,
    id: String,
) -> Result<(), String> {
    bridge.delete_voice_command(&id).await.map_err(|e| e.to_string())
}

#[tauri::command]
async fn get_known_applications(
    bridge: tauri::State<'_, RemoteBridge>,
) -> Result<Vec<KnownApp>, String> {
    bridge.get_known_applications().await.map_err(|e| e.to_string())
}

#[tauri::command]
async fn get_installed_applications(
    bridge: tauri::State<'_, RemoteBridge>,
) -> Result<Vec<InstalledApp>, String> {
    bridge
        .get_installed_applications()
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
async fn get_app_category_mappings(
    bridge: tauri::State<'_, RemoteBridge>,
) -> Result<Vec<AppCategoryMapping>, String> {
    bridge
        .get_app_category_mappings()
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
async fn set_app_category_mapping(
    bridge: tauri::State<'_, RemoteBridge>,
    mapping: AppCategoryMapping,
) -> Result<(), String> {
    let dir = dir_or_err()?;
    let span = cmd_span(
        &dir,
        None,
        "CMD.set_app_mapping",
        Some(serde_json::json!({"bundle": mapping.bundle_identifier, "category": mapping.category_id})),
    );
    match bridge.set_app_category_mapping(&mapping).await {
        Ok(()) => {
            span.ok(None);
            Ok(())
        }
        Err(e) => {
            span.err("bridge", "E_CMD_SET_MAPPING", &e.to_string(), None);
            Err(e.to_string())
        }
    }
}

#[tauri::command]
async fn remove_app_category_mapping(
    bridge: tauri::State<'_, RemoteBridge>,
    bundle_id: String,
) -> Result<(), String> {
    bridge
        .remove_app_category_mapping(&bundle_id)
        .await
        .map_err(|e| e.to_string())
}

// --- clipping & capture ---

/// Open the clipping overlay on behalf of a chat window and arm its
/// pending-clip poller.
#[tauri::command]
async fn open_clipping_tool(
    app: tauri::AppHandle,
    clip: tauri::State<'_, ClipController>,
    bridge: tauri::State<'_, RemoteBridge>,
    target_window: String,
) -> Result<(), String> {
    let dir = dir_or_err()?;
    let span = cmd_span(
        &dir,
        None,
        "CMD.open_clipping_tool",
        Some(serde_json::json!({"target": target_window})),
    );
    match windows::open_clipping_window(&app).await {
        Ok(()) => {
            clip.arm(&app, bridge.inner().clone(), &target_window);
            span.ok(None);
            Ok(())
        }
        Err(e) => {
            windows::restore_app_visibility(&app);
            span.err_anyhow("window", "E_CMD_OPEN_CLIP", &e, None);
            Err(e.to_string())
        }
    }
}

/// The clipping webview reports the raw drag; the ≤5 px rule and region
/// normalization live here. Returns whether a capture was actually taken.
#[tauri::command]
async fn finish_region_selection(
    app: tauri::AppHandle,
    clip: tauri::State<'_, ClipController>,
    bridge: tauri::State<'_, RemoteBridge>,
    start_x: i32,
    start_y: i32,
    end_x: i32,
    end_y: i32,
) -> Result<bool, String> {
    let dir = dir_or_err()?;
    let span = cmd_span(
        &dir,
        None,
        "CMD.finish_region",
        Some(serde_json::json!({"start": [start_x, start_y], "end": [end_x, end_y]})),
    );

    let mut drag = SelectionDrag::press(start_x, start_y);
    drag.drag(end_x, end_y);
    let Some(region) = drag.release() else {
        // Too small: cancel without touching the bridge.
        clip.disarm();
        if let Some(w) = app.get_webview_window(windows::CLIPPING_WINDOW_LABEL) {
            let _ = w.destroy();
        }
        windows::restore_app_visibility(&app);
        span.ok(Some(serde_json::json!({"captured": false})));
        return Ok(false);
    };

    let result = clipping::run_region_capture(&app, &bridge, region).await;
    if let Some(w) = app.get_webview_window(windows::CLIPPING_WINDOW_LABEL) {
        let _ = w.destroy();
    }
    windows::restore_app_visibility(&app);
    match result {
        Ok(_) => {
            // The armed poller delivers the clip to its chat window.
            span.ok(Some(serde_json::json!({"captured": true})));
            Ok(true)
        }
        Err(e) => {
            clip.disarm();
            span.err("bridge", "E_CMD_REGION_CAPTURE", &e, None);
            Err(e)
        }
    }
}

/// Abandon the clipping tool: destroy its window, stop the pending-clip
/// poller, bring everything back.
#[tauri::command]
fn cancel_clipping(
    app: tauri::AppHandle,
    clip: tauri::State<ClipController>,
) -> Result<(), String> {
    let dir = dir_or_err()?;
    let span = cmd_span(&dir, None, "CMD.cancel_clipping", None);
    clip.disarm();
    if let Some(w) = app.get_webview_window(windows::CLIPPING_WINDOW_LABEL) {
        let _ = w.destroy();
    }
    windows::restore_app_visibility(&app);
    span.ok(None);
    Ok(())
}

#[tauri::command]
async fn capture_full_screen(
    app: tauri::AppHandle,
    bridge: tauri::State<'_, RemoteBridge>,
) -> Result<String, String> {
    let dir = dir_or_err()?;
    let span = cmd_span(&dir, None, "CMD.capture_screen", None);
    windows::set_chat_window_visibility(&app, false);
    windows::set_overlay_visibility(&app, false);
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    let result = bridge.capture_screen().await;
    windows::restore_app_visibility(&app);
    match result {
        Ok(b64) => {
            span.ok(Some(serde_json::json!({"bytes": b64.len()})));
            Ok(b64)
        }
        Err(e) => {
            span.err("bridge", "E_CMD_CAPTURE_SCREEN", &e.to_string(), None);
            Err(e.to_string())
        }
    }
}

// --- overlay controls & operation state ---

#[tauri::command]
fn overlay_view(overlay: tauri::State<OverlayController>) -> OverlayView {
    overlay.current_view()
}

#[tauri::command]
async fn overlay_pause_toggle(bridge: tauri::State<'_, RemoteBridge>) -> Result<bool, String> {
    let dir = dir_or_err()?;
    let span = cmd_span(&dir, None, "CMD.pause_toggle", None);
    match bridge.pause_operation().await {
        Ok(paused) => {
            span.ok(Some(serde_json::json!({"paused": paused})));
            Ok(paused)
        }
        Err(e) => {
            span.err("bridge", "E_CMD_PAUSE", &e.to_string(), None);
            Err(e.to_string())
        }
    }
}

#[tauri::command]
async fn overlay_cancel(bridge: tauri::State<'_, RemoteBridge>) -> Result<(), String> {
    let dir = dir_or_err()?;
    let span = cmd_span(&dir, None, "CMD.cancel_operation", None);
    match bridge.cancel_operation().await {
        Ok(()) => {
            span.ok(None);
            Ok(())
        }
        Err(e) => {
            span.err("bridge", "E_CMD_CANCEL", &e.to_string(), None);
            Err(e.to_string())
        }
    }
}

// --- tts ---

#[tauri::command]
async fn speak_text(bridge: tauri::State<'_, RemoteBridge>, text: String) -> Result<(), String> {
    let dir = dir_or_err()?;
    let span = cmd_span(&dir, None, "CMD.speak_text", Some(serde_json::json!({"chars": text.len()})));
    match bridge.speak_text(&text).await {
        Ok(()) => {
            span.ok(None);
            Ok(())
        }
        Err(e) => {
            span.err("bridge", "E_CMD_SPEAK", &e.to_string(), None);
            Err(e.to_string())
        }
    }
}

#[tauri::command]
async fn stop_speaking(bridge: tauri::State<'_, RemoteBridge>) -> Result<(), String> {
    bridge.stop_speaking().await.map_err(|e| e.to_string())
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    panic_log::install_best_effort();
    let ctx = tauri::generate_context!();
    let shutdown = CancellationToken::new();
    let pump_shutdown = shutdown.clone();
    tauri::Builder::default()
        .manage(RemoteBridge::from_env())
        .manage(ChatSessions::new())
        .manage(OverlayController::new())
        .manage(ClipController::new())
        .manage(SettingsCache::new())
        .manage(OAuthPanels::new())
        .manage(shutdown)
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_single_instance::init(|app, _argv, _cwd| {
            // Second launch: surface the settings window instead.
            if let Some(main) = app.get_webview_window("main") {
                let _ = main.show();
                let _ = main.set_focus();
            }
        }))
        .setup(move |app| {
            // Small always-on-top overlay window. Hidden by default; the
            // event pump shows it when the backend pushes a visible state.
            let _overlay = tauri::WebviewWindowBuilder::new(
                app,
                overlay::OVERLAY_WINDOW_LABEL,
                tauri::WebviewUrl::App("overlay.html".into()),
            )
            .title("Murmur Overlay")
            .inner_size(260.0, 72.0)
            .resizable(false)
            .decorations(false)
            .always_on_top(true)
            .visible(false)
            .skip_taskbar(true)
            .focused(false)
            .build();

            let bridge = app.state::<RemoteBridge>().inner().clone();
            event_pump::spawn(app.handle().clone(), bridge, pump_shutdown.clone());
            Ok(())
        })
        .on_window_event(|window, event| {
            if let tauri::WindowEvent::Destroyed = event {
                let label = window.label().to_string();
                if label.starts_with(windows::CHAT_WINDOW_PREFIX) {
                    window.app_handle().state::<ChatSessions>().remove(&label);
                }
            }
        })
        .invoke_handler(tauri::generate_handler![
            open_chat_window,
            open_chat_window_with_messages,
            open_saved_chat,
            restore_app_visibility,
            chat_bootstrap,
            chat_view,
            chat_attach_image,
            chat_send,
            list_saved_chats,
            delete_saved_chat,
            update_chat_title,
            get_ui_settings,
            update_ui_settings,
            settings_last_error,
            get_llm_providers,
            save_llm_provider,
            delete_llm_provider,
            update_provider_api_key,
            get_llm_models,
            save_llm_model,
            delete_llm_model,
            fetch_provider_models,
            set_default_model,
            get_default_models,
            oauth_start,
            oauth_await_callback,
            oauth_refresh,
            oauth_logout,
            oauth_status,
            oauth_supports_provider,
            list_voice_commands,
            save_voice_command,
            delete_voice_command,
            get_known_applications,
            get_installed_applications,
            get_app_category_mappings,
            set_app_category_mapping,
            remove_app_category_mapping,
            open_clipping_tool,
            finish_region_selection,
            cancel_clipping,
            capture_full_screen,
            overlay_view,
            overlay_pause_toggle,
            overlay_cancel,
            speak_text,
            stop_speaking
        ])
        .run(ctx)
        .expect("error while running tauri application");
}
