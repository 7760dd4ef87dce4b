//! Credential resolution and administrative access control.
//!
//! The engine never parses authorization headers; the API layer hands it a
//! bearer token, and the [`AccessController`] port resolves that token to a
//! user identity and answers admin-membership queries against the control
//! cluster's ACLs.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use ferry_core::Secret;

use crate::error::{Error, Result};

/// Identity and ACL port backed by the control cluster.
#[async_trait]
pub trait AccessController: Send + Sync {
    /// Resolves a bearer token to a user name.
    ///
    /// Returns `None` when the token is unknown; the caller surfaces that
    /// as an authentication error.
    async fn resolve_user(&self, token: &Secret) -> Result<Option<String>>;

    /// Returns true when `user` may administer tasks owned by other users.
    async fn is_admin(&self, user: &str) -> Result<bool>;
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

/// Table-driven access controller for tests and development.
#[derive(Debug, Default)]
pub struct StaticAccessController {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<String, String>,
    admins: HashSet<String>,
}

impl StaticAccessController {
    /// Creates a controller that knows no tokens and no admins.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a token -> user mapping.
    ///
    /// # Panics
    ///
    /// Panics if the table lock is poisoned (test-only type).
    #[must_use]
    pub fn with_user(self, token: impl Into<String>, user: impl Into<String>) -> Self {
        self.inner
            .write()
            .unwrap()
            .users
            .insert(token.into(), user.into());
        self
    }

    /// Grants `user` administrative rights.
    ///
    /// # Panics
    ///
    /// Panics if the table lock is poisoned (test-only type).
    #[must_use]
    pub fn with_admin(self, user: impl Into<String>) -> Self {
        self.inner.write().unwrap().admins.insert(user.into());
        self
    }
}

#[async_trait]
impl AccessController for StaticAccessController {
    async fn resolve_user(&self, token: &Secret) -> Result<Option<String>> {
        let inner = self.inner.read().map_err(poison_err)?;
        Ok(inner.users.get(token.expose()).cloned())
    }

    async fn is_admin(&self, user: &str) -> Result<bool> {
        let inner = self.inner.read().map_err(poison_err)?;
        Ok(inner.admins.contains(user))
    }
}
