//! Authentication state and the sign-out dispatcher.
//!
//! The dispatcher is handed to the API client at construction time. Any
//! irrecoverable auth failure in the request pipeline ends in
//! `dispatch(AuthAction::SignOut)`, which wipes both tokens and flips the
//! published state so the front end can fall back to the login flow.

use std::sync::Arc;

use tokio::sync::watch;

use crate::api::auth::{CredentialStore, TokenKind};

/// Transitions the dispatcher understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    SignIn,
    SignOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    SignedIn,
    SignedOut,
}

/// Receiver of authentication transitions.
///
/// Must be idempotent: several failing calls may each dispatch `SignOut`.
pub trait AuthDispatcher: Send + Sync {
    fn dispatch(&self, action: AuthAction);
}

/// Process-wide session owning the credential store's lifecycle.
pub struct Session {
    store: Arc<dyn CredentialStore>,
    state: watch::Sender<AuthState>,
}

impl Session {
    /// Create a session; it starts signed in iff an access token is stored.
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        let initial = match store.get(TokenKind::Access) {
            Ok(Some(token)) if !token.is_empty() => AuthState::SignedIn,
            Ok(_) => AuthState::SignedOut,
            Err(e) => {
                log::warn!("Failed to read access token at startup: {}", e);
                AuthState::SignedOut
            }
        };
        let (state, _) = watch::channel(initial);
        Self { store, state }
    }

    pub fn current(&self) -> AuthState {
        *self.state.borrow()
    }

    /// Watch for state transitions.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    fn clear_tokens(&self) {
        for kind in TokenKind::ALL {
            if let Err(e) = self.store.delete(kind) {
                log::warn!("Failed to delete {} during sign-out: {}", kind.key(), e);
            }
        }
    }
}

impl AuthDispatcher for Session {
    fn dispatch(&self, action: AuthAction) {
        match action {
            AuthAction::SignOut => {
                self.clear_tokens();
                let previous = self.state.send_replace(AuthState::SignedOut);
                if previous == AuthState::SignedIn {
                    log::info!("Signed out");
                }
            }
            AuthAction::SignIn => {
                let previous = self.state.send_replace(AuthState::SignedIn);
                if previous == AuthState::SignedOut {
                    log::info!("Signed in");
                }
            }
        }
    }
}
