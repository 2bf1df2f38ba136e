//! Browser session lookup
//!
//! Signing users in and issuing session cookies happens elsewhere. The
//! pairing flow only needs to turn a session token into a user.

use async_trait::async_trait;
use gamelink_core::{SessionSeed, UserIdentity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
}

impl User {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
        }
    }
}

impl From<&User> for UserIdentity {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
        }
    }
}

impl From<User> for UserIdentity {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
        }
    }
}

/// Resolves a browser session token to the user it belongs to
#[async_trait]
pub trait SessionAuthenticator: Send + Sync {
    /// Returns `None` for unknown or ended sessions
    async fn authenticate(&self, session_token: &str) -> Option<User>;
}

/// Fixed table of sessions, for local setups and tests
#[derive(Debug, Clone, Default)]
pub struct StaticSessions {
    sessions: HashMap<String, User>,
}

impl StaticSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from configured session seeds
    pub fn from_seeds(seeds: &[SessionSeed]) -> Self {
        seeds.iter().fold(Self::new(), |sessions, seed| {
            sessions.with_session(
                seed.token.clone(),
                User::new(seed.user_id.clone(), seed.username.clone()),
            )
        })
    }

    /// Builder pattern: add a session
    pub fn with_session(mut self, token: impl Into<String>, user: User) -> Self {
        self.sessions.insert(token.into(), user);
        self
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionAuthenticator for StaticSessions {
    async fn authenticate(&self, session_token: &str) -> Option<User> {
        self.sessions.get(session_token).cloned()
    }
}
