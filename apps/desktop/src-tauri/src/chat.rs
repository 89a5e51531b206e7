//! Chat window sessions: URL-query bootstrap, the outbound message shape for
//! completions, and the autosave/title rules. Durable chats live behind the
//! bridge; a session is the transient view model of one chat window.

use std::collections::HashMap;
use std::sync::Mutex;

use murmur_bridge::ChatMessage;
use serde::Serialize;

pub const DEFAULT_CHAT_TITLE: &str = "New Chat";
/// A conversation at most this long (system + user + assistant) still gets an
/// auto-generated title on first save.
pub const TITLE_GEN_MAX_MESSAGES: usize = 3;

/// Initial state a chat window is opened with, decoded from its own URL query
/// string (`context`, `chatId`, `messages`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatBootstrap {
    pub context: Option<String>,
    pub chat_id: Option<i64>,
    pub messages: Vec<ChatMessage>,
}

/// Parse a raw query string (no leading '?'). Missing keys are fine; a
/// `messages` value that fails to decode yields an empty seed rather than an
/// error — a broken fork link opens an empty chat.
pub fn parse_bootstrap_query(query: &str) -> ChatBootstrap {
    let mut out = ChatBootstrap::default();
    for pair in query.split('&') {
        let Some((key, raw)) = pair.split_once('=') else {
            continue;
        };
        let Ok(value) = urlencoding::decode(raw) else {
            continue;
        };
        match key {
            "context" => {
                if !value.is_empty() {
                    out.context = Some(value.into_owned());
                }
            }
            "chatId" => out.chat_id = value.parse::<i64>().ok(),
            "messages" => {
                out.messages =
                    serde_json::from_str::<Vec<ChatMessage>>(&value).unwrap_or_default();
            }
            _ => {}
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePlan {
    /// No completed exchange yet, nothing worth saving.
    Skip,
    /// First save of this window's conversation.
    Create { generate_title: bool },
    Update(i64),
}

/// Transient view model of one chat window.
#[derive(Debug, Default)]
pub struct ChatSession {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub context: Option<String>,
    pub messages: Vec<ChatMessage>,
    /// Base64 images attached to the next user message (clips land here).
    pub pending_images: Vec<String>,
    pub busy: bool,
    pub last_error: Option<String>,
}

impl ChatSession {
    pub fn from_bootstrap(b: ChatBootstrap) -> Self {
        Self {
            id: b.chat_id,
            context: b.context,
            messages: b.messages,
            ..Default::default()
        }
    }

    pub fn attach_image(&mut self, b64: String) {
        self.pending_images.push(b64);
    }

    /// Append the user's message, consuming any pending attachments.
    pub fn push_user(&mut self, text: String) {
        let images = if self.pending_images.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending_images))
        };
        self.messages.push(ChatMessage {
            role: "user".to_string(),
            content: text,
            images,
        });
        self.last_error = None;
    }

    pub fn push_assistant(&mut self, text: String) {
        self.messages
            .push(ChatMessage::text("assistant", text));
    }

    pub fn set_error(&mut self, message: String) {
        self.last_error = Some(message);
    }

    /// Messages as sent to `chat_completion`: the window context (when
    /// present) leads as a system message, history follows verbatim.
    pub fn outbound_messages(&self) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        if let Some(ctx) = &self.context {
            out.push(ChatMessage::text("system", ctx.clone()));
        }
        out.extend(self.messages.iter().cloned());
        out
    }

    /// Autosave decision after a completed exchange.
    pub fn save_plan(&self) -> SavePlan {
        if self.messages.is_empty() {
            return SavePlan::Skip;
        }
        match self.id {
            Some(id) => SavePlan::Update(id),
            None => SavePlan::Create {
                generate_title: self.outbound_messages().len() <= TITLE_GEN_MAX_MESSAGES,
            },
        }
    }

    /// The (user, assistant) pair a generated title is based on.
    pub fn last_exchange(&self) -> Option<(&str, &str)> {
        let assistant = self
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "assistant")?;
        let user = self.messages.iter().rev().find(|m| m.role == "user")?;
        Some((user.content.as_str(), assistant.content.as_str()))
    }
}

/// Snapshot handed to the chat webview for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct ChatViewState {
    pub id: Option<i64>,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub pending_images: usize,
    pub busy: bool,
    pub last_error: Option<String>,
}

impl ChatSession {
    pub fn view(&self) -> ChatViewState {
        ChatViewState {
            id: self.id,
            title: self
                .title
                .clone()
                .unwrap_or_else(|| DEFAULT_CHAT_TITLE.to_string()),
            messages: self.messages.clone(),
            pending_images: self.pending_images.len(),
            busy: self.busy,
            last_error: self.last_error.clone(),
        }
    }
}

/// All live sessions, keyed by chat window label. Sessions die with their
/// window; nothing here survives a restart.
pub struct ChatSessions {
    inner: Mutex<HashMap<String, ChatSession>>,
}

impl ChatSessions {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, label: &str, session: ChatSession) {
        self.inner.lock().unwrap().insert(label.to_string(), session);
    }

    pub fn remove(&self, label: &str) {
        self.inner.lock().unwrap().remove(label);
    }

    pub fn with<R>(&self, label: &str, f: impl FnOnce(&mut ChatSession) -> R) -> Option<R> {
        let mut map = self.inner.lock().unwrap();
        map.get_mut(label).map(f)
    }

    /// Ensure a session exists for `label`. A window the shell opened itself
    /// already has one; a reloaded or externally-opened window initializes
    /// from its own URL query here.
    pub fn bootstrap(&self, label: &str, query: &str) -> ChatViewState {
        let mut map = self.inner.lock().unwrap();
        map.entry(label.to_string())
            .or_insert_with(|| ChatSession::from_bootstrap(parse_bootstrap_query(query)))
            .view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_bootstrap_creates_from_the_window_query() {
        let sessions = ChatSessions::new();
        let seed = serde_json::json!([{"role": "user", "content": "hi"}]).to_string();
        let query = format!("chatId=7&messages={}", urlencoding::encode(&seed));
        let view = sessions.bootstrap("chat_40", &query);
        assert_eq!(view.id, Some(7));
        assert_eq!(view.messages.len(), 1);
        // The session is live now, not just a parsed view.
        assert!(sessions.with("chat_40", |_| ()).is_some());
    }

    #[test]
    fn sessions_bootstrap_never_clobbers_a_live_session() {
        let sessions = ChatSessions::new();
        sessions.insert("chat_41", ChatSession::default());
        sessions.with("chat_41", |s| s.push_user("typed already".to_string()));
        let view = sessions.bootstrap("chat_41", "chatId=99");
        assert_eq!(view.id, None);
        assert_eq!(view.messages.len(), 1);
    }

    #[test]
    fn sessions_bootstrap_with_broken_messages_json_opens_empty() {
        let sessions = ChatSessions::new();
        let view = sessions.bootstrap("chat_42", "messages=%7Bnot-json");
        assert!(view.messages.is_empty());
        assert_eq!(view.id, None);
    }

    #[test]
    fn bootstrap_parses_context_only() {
        let b = parse_bootstrap_query("context=Selected%20text%20here");
        assert_eq!(b.context.as_deref(), Some("Selected text here"));
        assert_eq!(b.chat_id, None);
        assert!(b.messages.is_empty());
    }

    #[test]
    fn bootstrap_parses_fork_messages_json() {
        let seed = serde_json::json!([
            {"role": "user", "content": "hi"},
            {"role": "assistant", "content": "hello"}
        ])
        .to_string();
        let q = format!("messages={}&chatId=7", urlencoding::encode(&seed));
        let b = parse_bootstrap_query(&q);
        assert_eq!(b.chat_id, Some(7));
        assert_eq!(b.messages.len(), 2);
        assert_eq!(b.messages[1].role, "assistant");
    }

    #[test]
    fn bootstrap_invalid_messages_json_yields_empty_session() {
        let q = format!("messages={}", urlencoding::encode("[not json"));
        let b = parse_bootstrap_query(&q);
        assert!(b.messages.is_empty());
    }

    #[test]
    fn outbound_puts_context_first_as_system() {
        let mut s = ChatSession::from_bootstrap(ChatBootstrap {
            context: Some("clipboard dump".to_string()),
            ..Default::default()
        });
        s.push_user("summarize".to_string());
        let out = s.outbound_messages();
        assert_eq!(out[0].role, "system");
        assert_eq!(out[0].content, "clipboard dump");
        assert_eq!(out[1].role, "user");
    }

    #[test]
    fn first_save_of_short_conversation_creates_and_titles() {
        let mut s = ChatSession::from_bootstrap(ChatBootstrap {
            context: Some("ctx".to_string()),
            ..Default::default()
        });
        s.push_user("q".to_string());
        s.push_assistant("a".to_string());
        // system + user + assistant = 3 outbound messages
        assert_eq!(
            s.save_plan(),
            SavePlan::Create {
                generate_title: true
            }
        );
    }

    #[test]
    fn longer_first_save_skips_title_generation() {
        let mut s = ChatSession::default();
        s.push_user("q1".to_string());
        s.push_assistant("a1".to_string());
        s.push_user("q2".to_string());
        s.push_assistant("a2".to_string());
        assert_eq!(
            s.save_plan(),
            SavePlan::Create {
                generate_title: false
            }
        );
    }

    #[test]
    fn existing_id_always_updates() {
        let mut s = ChatSession::from_bootstrap(ChatBootstrap {
            chat_id: Some(42),
            ..Default::default()
        });
        s.push_user("q".to_string());
        s.push_assistant("a".to_string());
        assert_eq!(s.save_plan(), SavePlan::Update(42));
    }

    #[test]
    fn empty_session_skips_autosave() {
        let s = ChatSession::default();
        assert_eq!(s.save_plan(), SavePlan::Skip);
    }

    #[test]
    fn push_user_consumes_pending_attachments() {
        let mut s = ChatSession::default();
        s.attach_image("aGVsbG8=".to_string());
        s.push_user("look at this".to_string());
        assert!(s.pending_images.is_empty());
        let imgs = s.messages[0].images.as_ref().expect("images attached");
        assert_eq!(imgs.len(), 1);
    }

    #[test]
    fn last_exchange_finds_latest_pair() {
        let mut s = ChatSession::default();
        s.push_user("first".to_string());
        s.push_assistant("one".to_string());
        s.push_user("second".to_string());
        s.push_assistant("two".to_string());
        let (u, a) = s.last_exchange().expect("pair");
        assert_eq!((u, a), ("second", "two"));
    }
}
