//! Session manager.
//!
//! The session manager follows an identity provider and holds the current
//! principal. Dependents observe transitions through a [`SessionWatch`]; the
//! manager is the only writer.

use crate::error::SessionError;
use crate::provider::IdentityProvider;
use futures::StreamExt;
use parley_core::PrincipalId;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Receiver side of the current-principal binding.
pub type SessionWatch = watch::Receiver<Option<PrincipalId>>;

/// Tracks the authenticated principal for the lifetime of the process.
///
/// Dropping the manager (or calling [`SessionManager::shutdown`]) stops the
/// listener; dependents then see the binding as closed and receive no further
/// transitions.
#[derive(Debug)]
pub struct SessionManager {
    principal: SessionWatch,
    listener: JoinHandle<()>,
}

impl SessionManager {
    /// Starts following `provider`.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(provider: &dyn IdentityProvider) -> Self {
        let (tx, rx) = watch::channel(None);
        let mut changes = provider.auth_changes();

        let listener = tokio::spawn(async move {
            while let Some(next) = changes.next().await {
                tx.send_if_modified(|current| {
                    if *current == next {
                        return false;
                    }
                    match (&*current, &next) {
                        (_, Some(principal)) => info!(%principal, "principal signed in"),
                        (Some(principal), None) => info!(%principal, "principal signed out"),
                        (None, None) => {}
                    }
                    *current = next;
                    true
                });
            }
            debug!("identity provider stream ended");
        });

        Self {
            principal: rx,
            listener,
        }
    }

    /// Returns the active principal, if any.
    #[must_use]
    pub fn current_principal(&self) -> Option<PrincipalId> {
        self.principal.borrow().clone()
    }

    /// Returns the active principal or fails with `Unauthenticated`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Unauthenticated`] if nobody is signed in.
    pub fn require_authenticated(&self) -> parley_core::Result<PrincipalId, SessionError> {
        self.current_principal()
            .ok_or_else(|| SessionError::Unauthenticated.into())
    }

    /// Subscribes to principal transitions.
    ///
    /// The returned receiver starts with the current value marked as seen.
    #[must_use]
    pub fn subscribe(&self) -> SessionWatch {
        let mut rx = self.principal.clone();
        rx.mark_unchanged();
        rx
    }

    /// Waits until a principal is signed in and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ProviderClosed`] if the identity provider ends
    /// before anyone signs in.
    pub async fn wait_for_principal(&self) -> parley_core::Result<PrincipalId, SessionError> {
        let mut rx = self.principal.clone();
        let principal = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| SessionError::ProviderClosed)?;
        principal
            .clone()
            .ok_or_else(|| SessionError::ProviderClosed.into())
    }

    /// Stops following the identity provider.
    pub fn shutdown(&self) {
        self.listener.abort();
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
