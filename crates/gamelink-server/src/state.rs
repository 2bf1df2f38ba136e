//! Shared application state

use crate::render::{PageRenderer, PlainRenderer};
use axum::http::{header, HeaderMap};
use gamelink_auth::{PairingService, RequestId, SessionAuthenticator, User};
use gamelink_core::Config;
use std::sync::Arc;

/// Cookie carrying the browser session token
pub const SESSION_COOKIE: &str = "session_id";

/// Shared application state
pub struct AppState {
    /// Pairing state machine
    pub pairing: PairingService,
    /// Browser session lookup
    pub sessions: Arc<dyn SessionAuthenticator>,
    /// Browser page rendering
    pub renderer: Arc<dyn PageRenderer>,
    /// Base URL pairing links are built from, without trailing slash
    pub public_url: String,
    /// External sign-in page
    pub login_url: String,
}

impl AppState {
    /// Create a new application state
    pub fn new(
        config: &Config,
        pairing: PairingService,
        sessions: Arc<dyn SessionAuthenticator>,
    ) -> Self {
        Self {
            pairing,
            sessions,
            renderer: Arc::new(PlainRenderer),
            public_url: config.public_base_url(),
            login_url: config.login_url.clone(),
        }
    }

    /// Builder pattern: set page renderer
    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Link the user opens to approve a request
    pub fn pairing_url(&self, id: &RequestId) -> String {
        format!("{}/game?id={}", self.public_url, id)
    }

    /// Sign-in link that returns to the approval page afterwards
    pub fn sign_in_url(&self, id: &RequestId) -> String {
        let separator = if self.login_url.contains('?') { '&' } else { '?' };
        let redirect = format!("/game?id={}", id);
        format!(
            "{}{}redirect={}",
            self.login_url,
            separator,
            urlencoding::encode(&redirect)
        )
    }

    /// Resolve the signed-in user from the session cookie
    pub async fn current_user(&self, headers: &HeaderMap) -> Option<User> {
        let token = session_token(headers)?;
        self.sessions.authenticate(&token).await
    }
}

/// Extract the session cookie value from request headers
fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}
