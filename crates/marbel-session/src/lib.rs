//! Application session state: the account's profiles, the selected profile,
//! and the auth tokens, persisted through a storage adapter.
//!
//! Only this crate mutates session state; everything else reads it. The
//! persisted keys match what browser embedders already keep in local
//! storage, so an existing login survives an SDK swap-in.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use marbel_types::{AuthTokens, MarbelError, ProfileId, Result};

pub mod memory;

pub use memory::MemoryStore;

/// Persisted key holding the selected profile index.
pub const SELECTED_PROFILE_KEY: &str = "selectedProfile";
/// Persisted key holding the API access token.
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
/// Persisted key holding the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// The slice of a profile the session tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProfile {
    pub id: ProfileId,
    pub handle: String,
}

/// Key-value persistence behind the session (local storage in a browser
/// embedder, in-memory elsewhere).
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// The logged-in account's state.
pub struct Session {
    profiles: Vec<SessionProfile>,
    selected: Option<usize>,
    tokens: Option<AuthTokens>,
    store: Arc<dyn SessionStore>,
}

impl Session {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            profiles: Vec::new(),
            selected: None,
            tokens: None,
            store,
        }
    }

    /// Adopt a fresh login: persist the tokens and select the first profile.
    pub async fn login(&mut self, profiles: Vec<SessionProfile>, tokens: AuthTokens) -> Result<()> {
        self.store.set(ACCESS_TOKEN_KEY, &tokens.access_token).await?;
        self.store
            .set(REFRESH_TOKEN_KEY, &tokens.refresh_token)
            .await?;
        self.selected = if profiles.is_empty() { None } else { Some(0) };
        self.profiles = profiles;
        self.tokens = Some(tokens);
        Ok(())
    }

    /// Rebuild state from the persisted keys. Returns whether a usable
    /// token pair was found.
    pub async fn restore(&mut self, profiles: Vec<SessionProfile>) -> Result<bool> {
        let access = self.store.get(ACCESS_TOKEN_KEY).await?;
        let refresh = self.store.get(REFRESH_TOKEN_KEY).await?;
        self.tokens = match (access, refresh) {
            (Some(access_token), Some(refresh_token)) => Some(AuthTokens {
                access_token,
                refresh_token,
            }),
            _ => None,
        };

        let stored = self.store.get(SELECTED_PROFILE_KEY).await?;
        let index = stored.and_then(|s| s.parse::<usize>().ok()).unwrap_or(0);
        self.selected = if index < profiles.len() {
            Some(index)
        } else if !profiles.is_empty() {
            // Stored index can outlive the profile list it indexed into.
            Some(0)
        } else {
            None
        };
        self.profiles = profiles;

        Ok(self.tokens.is_some())
    }

    /// Switch the selected profile and persist the choice.
    pub async fn select_profile(&mut self, index: usize) -> Result<()> {
        if index >= self.profiles.len() {
            return Err(MarbelError::Other(format!("no profile at index {}", index)));
        }
        self.store
            .set(SELECTED_PROFILE_KEY, &index.to_string())
            .await?;
        self.selected = Some(index);
        Ok(())
    }

    /// Clear the persisted keys and all in-memory state.
    pub async fn logout(&mut self) -> Result<()> {
        self.store.remove(SELECTED_PROFILE_KEY).await?;
        self.store.remove(ACCESS_TOKEN_KEY).await?;
        self.store.remove(REFRESH_TOKEN_KEY).await?;
        self.profiles.clear();
        self.selected = None;
        self.tokens = None;
        Ok(())
    }

    pub fn current_profile(&self) -> Option<&SessionProfile> {
        self.selected.and_then(|i| self.profiles.get(i))
    }

    pub fn profiles(&self) -> &[SessionProfile] {
        &self.profiles
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens.is_some()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.access_token.as_str())
    }
}
