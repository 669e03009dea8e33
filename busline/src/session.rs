//! Session storage and demo authentication.
//!
//! The logged-in user is kept as a JSON record under [`SESSION_KEY`] in an
//! opaque key/value [`SessionStore`], so the backing medium can be swapped
//! without touching the engine.

use crate::error::AuthError;
use crate::seed::DemoCredential;
use crate::types::{User, UserId};
use busline_core::environment::IdGenerator;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Key under which the current user is stored
pub const SESSION_KEY: &str = "busUser";

/// Opaque key/value storage for the session marker
pub trait SessionStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value
    fn set(&self, key: &str, value: String);

    /// Remove a value
    fn remove(&self, key: &str);
}

/// Process-local session storage
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemorySessionStore {
    /// An empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).remove(key);
    }
}

/// Login, registration and the "who is logged in" view
#[derive(Clone)]
pub struct AuthService {
    session: Arc<dyn SessionStore>,
    ids: Arc<dyn IdGenerator>,
    credentials: Arc<Vec<DemoCredential>>,
    latency: Duration,
}

impl AuthService {
    /// Creates the service over a session store and a credential list
    #[must_use]
    pub fn new(
        session: Arc<dyn SessionStore>,
        ids: Arc<dyn IdGenerator>,
        credentials: Vec<DemoCredential>,
        latency: Duration,
    ) -> Self {
        Self {
            session,
            ids,
            credentials: Arc::new(credentials),
            latency,
        }
    }

    fn store_user(&self, user: &User) -> Result<(), AuthError> {
        let record = serde_json::to_string(user).map_err(|e| AuthError::Session(e.to_string()))?;
        self.session.set(SESSION_KEY, record);
        Ok(())
    }

    /// Log in with email and password
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] if the pair matches no
    /// account, or [`AuthError::Session`] if the session cannot be written.
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        tokio::time::sleep(self.latency).await;

        let user = self
            .credentials
            .iter()
            .find(|c| c.email == email && c.password == password)
            .map(|c| c.user.clone())
            .ok_or(AuthError::InvalidCredentials)?;

        self.store_user(&user)?;
        tracing::info!(user_id = %user.id, admin = user.is_admin, "User logged in");
        Ok(user)
    }

    /// Register a new passenger account and log it in
    ///
    /// The password is accepted but not stored.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Session`] if the session cannot be written.
    #[tracing::instrument(skip(self, _password))]
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        _password: &str,
    ) -> Result<User, AuthError> {
        tokio::time::sleep(self.latency).await;

        let user = User {
            id: UserId::new(self.ids.next_id()),
            name: name.to_string(),
            email: email.to_string(),
            is_admin: false,
        };

        self.store_user(&user)?;
        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Clear the session
    pub fn logout(&self) {
        self.session.remove(SESSION_KEY);
        tracing::info!("User logged out");
    }

    /// The logged-in user, if any
    ///
    /// A session record that does not decode is treated as logged out.
    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        let record = self.session.get(SESSION_KEY)?;
        match serde_json::from_str(&record) {
            Ok(user) => Some(user),
            Err(error) => {
                tracing::warn!(%error, "Discarding unreadable session record");
                None
            },
        }
    }

    /// Whether anyone is logged in
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.current_user().is_some()
    }

    /// Whether the logged-in user is an administrator
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.current_user().is_some_and(|u| u.is_admin)
    }
}
