use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{ChatError, Result};
use crate::models::User;

/// Bearer credential captured for a single outgoing call
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }

    /// Value for the `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

#[derive(Debug, Default)]
struct SessionState {
    credential: Option<Credential>,
    user: Option<User>,
}

/// Holds the current credential and the user it belongs to.
///
/// Clones share state. Every service call reads a snapshot through
/// [`SessionStore::credential`], so signing out affects calls issued afterwards
/// while calls already in flight keep the credential they captured.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<SessionState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        store.sign_in(token);
        store
    }

    pub fn sign_in(&self, token: impl Into<String>) {
        let token = token.into();
        let mut state = self.write();
        if token.trim().is_empty() {
            state.credential = None;
        } else {
            state.credential = Some(Credential::new(token));
        }
        state.user = None;
    }

    /// Forget the credential and user
    pub fn sign_out(&self) {
        let mut state = self.write();
        state.credential = None;
        state.user = None;
        tracing::debug!("session credential cleared");
    }

    /// Snapshot of the credential, or `Unauthenticated` before any request is built
    pub fn credential(&self) -> Result<Credential> {
        self.read()
            .credential
            .clone()
            .ok_or(ChatError::Unauthenticated)
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().credential.is_some()
    }

    pub fn set_user(&self, user: User) {
        self.write().user = Some(user);
    }

    pub fn user(&self) -> Option<User> {
        self.read().user.clone()
    }

    /// Gates admin-only features
    pub fn is_admin(&self) -> bool {
        self.read().user.as_ref().is_some_and(User::is_admin)
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_requires_sign_in() {
        let store = SessionStore::new();
        assert_eq!(store.credential(), Err(ChatError::Unauthenticated));

        store.sign_in("abc");
        assert_eq!(store.credential().unwrap().bearer(), "Bearer abc");
    }

    #[test]
    fn blank_token_is_not_a_credential() {
        let store = SessionStore::with_token("   ");
        assert!(!store.is_authenticated());
    }

    #[test]
    fn sign_out_is_visible_to_clones() {
        let store = SessionStore::with_token("abc");
        let shared = store.clone();
        let captured = shared.credential().unwrap();

        store.sign_out();

        assert!(!shared.is_authenticated());
        // a call that already captured the credential keeps it
        assert_eq!(captured.token(), "abc");
    }

    #[test]
    fn admin_gate_follows_user_role() {
        let store = SessionStore::with_token("abc");
        assert!(!store.is_admin());

        store.set_user(User {
            id: "u1".into(),
            username: "root".into(),
            email: String::new(),
            role: "admin".into(),
        });
        assert!(store.is_admin());

        store.sign_out();
        assert!(!store.is_admin());
        assert!(store.user().is_none());
    }

    #[test]
    fn debug_output_hides_token() {
        let credential = Credential::new("secret");
        assert_eq!(format!("{:?}", credential), "Credential(***)");
    }
}
