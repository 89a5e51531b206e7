//! Window management: chat windows (monotonic labels, URL-query bootstrap),
//! the clipping overlay window, and the visibility sweeps used around screen
//! captures.

use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{anyhow, Result};
use murmur_bridge::ChatMessage;
use tauri::{AppHandle, Manager, WebviewWindowBuilder};

use crate::overlay::OVERLAY_WINDOW_LABEL;

pub const CHAT_WINDOW_PREFIX: &str = "chat_";
pub const CLIPPING_WINDOW_LABEL: &str = "clipping_overlay";

static CHAT_WINDOW_COUNTER: AtomicU32 = AtomicU32::new(0);

pub fn next_chat_label() -> String {
    let id = CHAT_WINDOW_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{CHAT_WINDOW_PREFIX}{id}")
}

/// Build the chat window URL carrying the bootstrap state in its query
/// string. The window parses it back out on load.
pub fn chat_bootstrap_url(
    context: Option<&str>,
    chat_id: Option<i64>,
    messages: Option<&[ChatMessage]>,
) -> Result<String> {
    let mut params: Vec<String> = Vec::new();
    if let Some(ctx) = context {
        params.push(format!("context={}", urlencoding::encode(ctx)));
    }
    if let Some(id) = chat_id {
        params.push(format!("chatId={id}"));
    }
    if let Some(msgs) = messages {
        let json = serde_json::to_string(msgs)?;
        params.push(format!("messages={}", urlencoding::encode(&json)));
    }
    Ok(if params.is_empty() {
        "chat.html".to_string()
    } else {
        format!("chat.html?{}", params.join("&"))
    })
}

/// Create and focus a chat window; returns its label.
pub fn open_chat_window(
    app: &AppHandle,
    context: Option<&str>,
    chat_id: Option<i64>,
    messages: Option<&[ChatMessage]>,
) -> Result<String> {
    let label = next_chat_label();
    let url = chat_bootstrap_url(context, chat_id, messages)?;

    let window = WebviewWindowBuilder::new(app, &label, tauri::WebviewUrl::App(url.into()))
        .title("Murmur Chat")
        .inner_size(500.0, 600.0)
        .min_inner_size(400.0, 400.0)
        .resizable(true)
        .visible(true)
        .focused(true)
        .always_on_top(true)
        .build()
        .map_err(|e| anyhow!("create chat window failed: {e}"))?;
    let _ = window.set_focus();
    Ok(label)
}

/// Show/hide all chat windows (never the main settings window).
pub fn set_chat_window_visibility(app: &AppHandle, visible: bool) {
    for (label, window) in app.webview_windows() {
        if !label.starts_with(CHAT_WINDOW_PREFIX) {
            continue;
        }
        if visible {
            let _ = window.show();
        } else {
            let _ = window.hide();
        }
    }
}

/// Hide or restore the status overlay around a capture. Restoring only
/// re-shows it when the reducer says it should be visible.
pub fn set_overlay_visibility(app: &AppHandle, visible: bool) {
    if let Some(ctl) = app.try_state::<crate::overlay::OverlayController>() {
        ctl.set_visible(app, visible);
    } else if let Some(w) = app.get_webview_window(OVERLAY_WINDOW_LABEL) {
        let _ = w.hide();
    }
}

pub fn hide_clipping_window(app: &AppHandle) {
    if let Some(w) = app.get_webview_window(CLIPPING_WINDOW_LABEL) {
        let _ = w.hide();
    }
}

/// Open the clipping tool: hide everything app-owned, then create a fresh
/// transparent fullscreen window. Any stale clipping window is destroyed
/// first so the selection state never leaks between runs.
pub async fn open_clipping_window(app: &AppHandle) -> Result<()> {
    set_chat_window_visibility(app, false);
    set_overlay_visibility(app, false);
    if let Some(main) = app.get_webview_window("main") {
        let _ = main.hide();
    }

    if let Some(stale) = app.get_webview_window(CLIPPING_WINDOW_LABEL) {
        let _ = stale.destroy();
        // Give the runtime a moment to tear the window down before rebuilding.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    let window = WebviewWindowBuilder::new(
        app,
        CLIPPING_WINDOW_LABEL,
        tauri::WebviewUrl::App("clip.html".into()),
    )
    .title("Clipping Tool")
    .transparent(true)
    .decorations(false)
    .always_on_top(true)
    .maximized(true)
    .shadow(false)
    .visible(true)
    .build()
    .map_err(|e| anyhow!("create clipping window failed: {e}"))?;
    let _ = window.set_focus();
    Ok(())
}

/// Restore everything hidden for a capture or aborted clip.
pub fn restore_app_visibility(app: &AppHandle) {
    set_chat_window_visibility(app, true);
    set_overlay_visibility(app, true);
    if let Some(main) = app.get_webview_window("main") {
        let _ = main.show();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_labels_are_monotonic_and_prefixed() {
        let a = next_chat_label();
        let b = next_chat_label();
        assert!(a.starts_with(CHAT_WINDOW_PREFIX));
        assert!(b.starts_with(CHAT_WINDOW_PREFIX));
        let na: u32 = a[CHAT_WINDOW_PREFIX.len()..].parse().unwrap();
        let nb: u32 = b[CHAT_WINDOW_PREFIX.len()..].parse().unwrap();
        assert_eq!(nb, na + 1);
    }

    #[test]
    fn plain_url_has_no_query() {
        assert_eq!(chat_bootstrap_url(None, None, None).unwrap(), "chat.html");
    }

    #[test]
    fn context_is_url_encoded() {
        let url = chat_bootstrap_url(Some("a b&c"), None, None).unwrap();
        assert_eq!(url, "chat.html?context=a%20b%26c");
    }

    #[test]
    fn bootstrap_url_round_trips_through_query_parser() {
        let msgs = vec![
            ChatMessage::text("user", "hi"),
            ChatMessage::text("assistant", "hello & welcome"),
        ];
        let url = chat_bootstrap_url(Some("ctx"), Some(9), Some(&msgs)).unwrap();
        let query = url.split_once('?').expect("query").1;
        let b = crate::chat::parse_bootstrap_query(query);
        assert_eq!(b.context.as_deref(), Some("ctx"));
        assert_eq!(b.chat_id, Some(9));
        assert_eq!(b.messages, msgs);
    }
}
