//! Authorization gate guarding every administrative write.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Caller identity as resolved by the identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Option<String>,
    /// Stable account handle compared against the allow-list.
    pub account_handle: Option<String>,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("session is invalid or expired")]
    InvalidSession,
    #[error("identity provider request failed: {0}")]
    Transport(String),
    #[error("identity provider returned an unexpected response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn user_for_credential(&self, credential: &str) -> Result<Identity, IdentityError>;
}

/// Source of the current administrator allow-list.
#[async_trait]
pub trait AllowListSource: Send + Sync {
    async fn allow_list(&self) -> Vec<String>;
}

/// Reasons an authorization attempt is rejected. The display text is shown
/// to the caller verbatim.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("identity provider unavailable")]
    ProviderUnavailable,
    #[error("authentication required")]
    AuthenticationRequired,
    #[error("account handle unavailable")]
    HandleUnavailable,
    #[error("not authorized")]
    NotAuthorized,
}

/// Proof that a caller passed [`AuthorizationGate::authorize`]. Only the gate
/// can construct one.
#[derive(Debug, Clone)]
pub struct Authorized {
    handle: String,
}

impl Authorized {
    pub fn handle(&self) -> &str {
        &self.handle
    }
}

/// Result of the non-failing admin probe used by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStatus {
    pub ok: bool,
    pub is_admin: bool,
}

pub struct AuthorizationGate {
    identity: Option<Arc<dyn IdentityProvider>>,
    allow_list: Arc<dyn AllowListSource>,
}

impl AuthorizationGate {
    pub fn new(
        identity: Option<Arc<dyn IdentityProvider>>,
        allow_list: Arc<dyn AllowListSource>,
    ) -> Self {
        Self {
            identity,
            allow_list,
        }
    }

    /// Run every check afresh. Nothing here is cached, so a handle removed
    /// from the allow-list loses access on the next call.
    #[instrument(skip_all)]
    pub async fn authorize(&self, credential: &str) -> Result<Authorized, AuthError> {
        let provider = self
            .identity
            .as_ref()
            .ok_or(AuthError::ProviderUnavailable)?;

        if credential.trim().is_empty() {
            return Err(AuthError::AuthenticationRequired);
        }

        let identity = provider
            .user_for_credential(credential)
            .await
            .map_err(|err| {
                debug!(target = "gitfolio::auth", error = %err, "credential rejected");
                AuthError::AuthenticationRequired
            })?;

        let handle = identity
            .account_handle
            .filter(|handle| !handle.is_empty())
            .ok_or(AuthError::HandleUnavailable)?;

        let admins = self.allow_list.allow_list().await;
        if !admins.iter().any(|admin| admin == &handle) {
            warn!(
                target = "gitfolio::auth",
                handle = %handle,
                "write rejected for account outside the allow-list"
            );
            return Err(AuthError::NotAuthorized);
        }

        Ok(Authorized { handle })
    }

    /// Same checks as [`authorize`](Self::authorize), folded into a status
    /// that never fails: a session without a handle or outside the allow-list
    /// is `ok` but not admin.
    pub async fn check_admin(&self, credential: &str) -> AdminStatus {
        match self.authorize(credential).await {
            Ok(_) => AdminStatus {
                ok: true,
                is_admin: true,
            },
            Err(AuthError::HandleUnavailable | AuthError::NotAuthorized) => AdminStatus {
                ok: true,
                is_admin: false,
            },
            Err(AuthError::ProviderUnavailable | AuthError::AuthenticationRequired) => {
                AdminStatus {
                    ok: false,
                    is_admin: false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct StubIdentity {
        handle: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl StubIdentity {
        fn with_handle(handle: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                handle,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl IdentityProvider for StubIdentity {
        async fn user_for_credential(&self, credential: &str) -> Result<Identity, IdentityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if credential != "valid" {
                return Err(IdentityError::InvalidSession);
            }
            Ok(Identity {
                user_id: Some("user-1".to_string()),
                account_handle: self.handle.map(str::to_string),
            })
        }
    }

    #[derive(Default)]
    struct StubAllowList {
        admins: Mutex<Vec<String>>,
    }

    impl StubAllowList {
        fn with(admins: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                admins: Mutex::new(admins.iter().map(|a| a.to_string()).collect()),
            })
        }

        fn replace(&self, admins: &[&str]) {
            *self.admins.lock().expect("lock") = admins.iter().map(|a| a.to_string()).collect();
        }
    }

    #[async_trait]
    impl AllowListSource for StubAllowList {
        async fn allow_list(&self) -> Vec<String> {
            self.admins.lock().expect("lock").clone()
        }
    }

    #[tokio::test]
    async fn missing_provider_is_reported_first() {
        let gate = AuthorizationGate::new(None, StubAllowList::with(&["alice"]));
        let err = gate.authorize("valid").await.expect_err("no provider");
        assert_eq!(err.to_string(), "identity provider unavailable");
    }

    #[tokio::test]
    async fn invalid_or_empty_credential_requires_authentication() {
        let identity = StubIdentity::with_handle(Some("alice"));
        let gate = AuthorizationGate::new(Some(identity.clone()), StubAllowList::with(&["alice"]));

        let err = gate.authorize("expired").await.expect_err("bad token");
        assert_eq!(err.to_string(), "authentication required");

        let err = gate.authorize("  ").await.expect_err("empty token");
        assert_eq!(err, AuthError::AuthenticationRequired);
        assert_eq!(identity.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn identity_without_handle_is_rejected() {
        let gate = AuthorizationGate::new(
            Some(StubIdentity::with_handle(None)),
            StubAllowList::with(&["alice"]),
        );
        let err = gate.authorize("valid").await.expect_err("no handle");
        assert_eq!(err.to_string(), "account handle unavailable");
    }

    #[tokio::test]
    async fn handle_must_match_exactly() {
        let gate = AuthorizationGate::new(
            Some(StubIdentity::with_handle(Some("Alice"))),
            StubAllowList::with(&["alice"]),
        );
        let err = gate.authorize("valid").await.expect_err("case differs");
        assert_eq!(err.to_string(), "not authorized");
    }

    #[tokio::test]
    async fn allow_list_changes_apply_on_next_call() {
        let allow_list = StubAllowList::with(&["alice"]);
        let identity = StubIdentity::with_handle(Some("alice"));
        let gate = AuthorizationGate::new(Some(identity.clone()), allow_list.clone());

        let authorized = gate.authorize("valid").await.expect("allowed");
        assert_eq!(authorized.handle(), "alice");

        allow_list.replace(&["bob"]);
        assert_eq!(
            gate.authorize("valid").await.expect_err("revoked"),
            AuthError::NotAuthorized
        );
        assert_eq!(identity.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn check_admin_folds_reasons() {
        let allow_list = StubAllowList::with(&["alice"]);
        let gate = AuthorizationGate::new(
            Some(StubIdentity::with_handle(Some("alice"))),
            allow_list.clone(),
        );
        assert_eq!(
            gate.check_admin("valid").await,
            AdminStatus {
                ok: true,
                is_admin: true
            }
        );
        assert_eq!(
            gate.check_admin("bogus").await,
            AdminStatus {
                ok: false,
                is_admin: false
            }
        );

        allow_list.replace(&[]);
        assert_eq!(
            gate.check_admin("valid").await,
            AdminStatus {
                ok: true,
                is_admin: false
            }
        );

        let unconfigured = AuthorizationGate::new(None, allow_list);
        assert!(!unconfigured.check_admin("valid").await.ok);
    }
}
