//! OAuth panel state machine. The backend runs the actual flow (browser,
//! callback server, token storage); the panel only tracks which phase the
//! user is looking at.

use std::sync::Mutex;

use murmur_bridge::{OAuthResult, OAuthStatus};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum OAuthPhase {
    SignedOut { error: Option<String> },
    Starting,
    AwaitingCallback { state: String },
    SignedIn { email: Option<String> },
}

impl Default for OAuthPhase {
    fn default() -> Self {
        OAuthPhase::SignedOut { error: None }
    }
}

#[derive(Debug, Default)]
pub struct OAuthPanel {
    phase: OAuthPhase,
}

impl OAuthPanel {
    pub fn phase(&self) -> &OAuthPhase {
        &self.phase
    }

    /// Panel opened: reflect the stored token status.
    pub fn on_status(&mut self, status: &OAuthStatus) {
        self.phase = if status.authenticated {
            OAuthPhase::SignedIn {
                email: status.email.clone(),
            }
        } else {
            OAuthPhase::SignedOut { error: None }
        };
    }

    pub fn on_start_requested(&mut self) {
        self.phase = OAuthPhase::Starting;
    }

    pub fn on_start_ok(&mut self, state: String) {
        self.phase = OAuthPhase::AwaitingCallback { state };
    }

    pub fn on_start_error(&mut self, message: String) {
        self.phase = OAuthPhase::SignedOut {
            error: Some(message),
        };
    }

    /// Callback finished, success or not. Failure lands back on SignedOut
    /// with the message inline.
    pub fn on_callback(&mut self, result: &OAuthResult) {
        self.phase = if result.success {
            OAuthPhase::SignedIn {
                email: result.email.clone(),
            }
        } else {
            OAuthPhase::SignedOut {
                error: result.error.clone(),
            }
        };
    }

    /// A refresh failure is non-fatal: the user stays signed in and may
    /// retry; the backend kept the old tokens.
    pub fn on_refresh(&mut self, refreshed: bool) {
        let _ = refreshed;
    }

    pub fn on_logout(&mut self) {
        self.phase = OAuthPhase::SignedOut { error: None };
    }
}

/// Panels per provider id, shared with the settings window commands.
pub struct OAuthPanels {
    inner: Mutex<std::collections::HashMap<String, OAuthPanel>>,
}

impl OAuthPanels {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn with<R>(&self, provider: &str, f: impl FnOnce(&mut OAuthPanel) -> R) -> R {
        let mut map = self.inner.lock().unwrap();
        f(map.entry(provider.to_string()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_start_await_signed_in() {
        let mut p = OAuthPanel::default();
        p.on_start_requested();
        assert_eq!(*p.phase(), OAuthPhase::Starting);
        p.on_start_ok("state-abc".to_string());
        assert_eq!(
            *p.phase(),
            OAuthPhase::AwaitingCallback {
                state: "state-abc".to_string()
            }
        );
        p.on_callback(&OAuthResult {
            success: true,
            email: Some("a@b.c".to_string()),
            error: None,
        });
        assert_eq!(
            *p.phase(),
            OAuthPhase::SignedIn {
                email: Some("a@b.c".to_string())
            }
        );
    }

    #[test]
    fn failed_callback_lands_signed_out_with_message() {
        let mut p = OAuthPanel::default();
        p.on_start_requested();
        p.on_start_ok("s".to_string());
        p.on_callback(&OAuthResult {
            success: false,
            email: None,
            error: Some("user denied access".to_string()),
        });
        assert_eq!(
            *p.phase(),
            OAuthPhase::SignedOut {
                error: Some("user denied access".to_string())
            }
        );
    }

    #[test]
    fn refresh_failure_keeps_signed_in() {
        let mut p = OAuthPanel::default();
        p.on_status(&OAuthStatus {
            authenticated: true,
            email: Some("a@b.c".to_string()),
            expires_at: Some(0),
        });
        p.on_refresh(false);
        assert!(matches!(p.phase(), OAuthPhase::SignedIn { .. }));
    }

    #[test]
    fn logout_always_lands_signed_out() {
        let mut p = OAuthPanel::default();
        p.on_status(&OAuthStatus {
            authenticated: true,
            email: None,
            expires_at: None,
        });
        p.on_logout();
        assert_eq!(*p.phase(), OAuthPhase::SignedOut { error: None });
    }

    #[test]
    fn status_probe_reflects_stored_tokens() {
        let mut p = OAuthPanel::default();
        p.on_status(&OAuthStatus {
            authenticated: false,
            email: None,
            expires_at: None,
        });
        assert_eq!(*p.phase(), OAuthPhase::SignedOut { error: None });
    }
}
