//! Identity provider contract.
//!
//! An identity provider reports the authenticated principal as a stream of
//! transitions: `Some(id)` on sign-in, `None` on sign-out. Dropping the stream
//! unsubscribes.

use futures::StreamExt;
use futures::stream::BoxStream;
use parley_core::PrincipalId;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Stream of sign-in/sign-out transitions.
pub type AuthChangeStream = BoxStream<'static, Option<PrincipalId>>;

/// Source of authentication state.
pub trait IdentityProvider: Send + Sync {
    /// Subscribes to authentication transitions.
    ///
    /// The first item reports the state at subscription time.
    fn auth_changes(&self) -> AuthChangeStream;
}

/// In-process identity provider driven by explicit sign-in/sign-out calls.
///
/// Clones share the same state. Bursts of transitions may be coalesced; a
/// subscriber always observes the latest state.
#[derive(Debug, Clone)]
pub struct LocalIdentityProvider {
    state: Arc<watch::Sender<Option<PrincipalId>>>,
}

impl LocalIdentityProvider {
    /// Creates a provider with nobody signed in.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self {
            state: Arc::new(state),
        }
    }

    /// Creates a provider with `principal` already signed in.
    #[must_use]
    pub fn signed_in(principal: PrincipalId) -> Self {
        let provider = Self::new();
        provider.sign_in(principal);
        provider
    }

    /// Signs `principal` in, replacing any current principal.
    pub fn sign_in(&self, principal: PrincipalId) {
        self.set(Some(principal));
    }

    /// Signs the current principal out.
    pub fn sign_out(&self) {
        self.set(None);
    }

    /// Returns the currently signed-in principal.
    #[must_use]
    pub fn current(&self) -> Option<PrincipalId> {
        self.state.borrow().clone()
    }

    fn set(&self, next: Option<PrincipalId>) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

impl Default for LocalIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for LocalIdentityProvider {
    fn auth_changes(&self) -> AuthChangeStream {
        WatchStream::new(self.state.subscribe()).boxed()
    }
}
