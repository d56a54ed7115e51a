//! Session tracking for parley.
//!
//! This crate provides:
//! - The `IdentityProvider` contract: a stream of sign-in/sign-out transitions
//! - `LocalIdentityProvider`, an in-process provider driven by explicit calls
//! - `SessionManager`, which holds the current principal, notifies dependents
//!   and gates messaging operations behind `require_authenticated`
//!
//! # Example
//!
//! ```
//! use parley_core::PrincipalId;
//! use parley_session::{LocalIdentityProvider, SessionManager};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let provider = LocalIdentityProvider::new();
//! let manager = SessionManager::start(&provider);
//! assert!(manager.require_authenticated().is_err());
//!
//! provider.sign_in(PrincipalId::new("s1"));
//! let principal = manager.wait_for_principal().await.expect("signed in");
//! assert_eq!(principal.as_str(), "s1");
//! # }
//! ```

pub mod error;
pub mod manager;
pub mod provider;

pub use error::SessionError;
pub use manager::{SessionManager, SessionWatch};
pub use provider::{AuthChangeStream, IdentityProvider, LocalIdentityProvider};
