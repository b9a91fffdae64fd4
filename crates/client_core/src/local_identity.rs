//! In-process identity service used by the desktop demo and tests.
//!
//! Holds a credential table and the persisted session, restores that session to
//! every new subscriber, and parks redirect logins until the next
//! `get_redirect_result` call, which is how a page reload would observe them.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use async_trait::async_trait;
use shared::{
    domain::{AuthProvider, Identity, PendingCredential},
    error::{AuthAction, AuthActionError, RedirectResolutionError},
};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{AuthChange, AuthSubscription, IdentityService, RedirectOptions};

const INVALID_CREDENTIALS: &str = "invalid credentials";

struct LocalAccount {
    identity: Identity,
    password: String,
}

struct PendingRedirect {
    provider: AuthProvider,
    options: RedirectOptions,
}

#[derive(Default)]
struct LocalState {
    accounts: HashMap<String, LocalAccount>,
    linked_identities: HashMap<AuthProvider, Identity>,
    current: Option<Identity>,
    pending_redirect: Option<PendingRedirect>,
    listeners: HashMap<u64, mpsc::UnboundedSender<AuthChange>>,
    next_listener_id: u64,
}

impl LocalState {
    fn notify(&mut self) {
        let change = self.current.clone();
        self.listeners
            .retain(|_, listener| listener.send(change.clone()).is_ok());
    }
}

#[derive(Clone, Default)]
pub struct LocalIdentityService {
    state: Arc<Mutex<LocalState>>,
    latency: Duration,
}

impl LocalIdentityService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(
        self,
        user_id: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let email = email.into();
        self.lock().accounts.insert(
            normalize_email(&email),
            LocalAccount {
                identity: Identity::new(user_id, Some(email)),
                password: password.into(),
            },
        );
        self
    }

    /// Identity returned when a redirect login through `provider` completes.
    pub fn with_linked_identity(self, provider: AuthProvider, identity: Identity) -> Self {
        self.lock().linked_identities.insert(provider, identity);
        self
    }

    /// A session persisted by an earlier visit, restored on subscribe.
    pub fn with_restored_session(self, identity: Identity) -> Self {
        self.lock().current = Some(identity);
        self
    }

    /// Simulated round trip applied to every request.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.lock().current.clone()
    }

    pub fn has_pending_redirect(&self) -> bool {
        self.lock().pending_redirect.is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    fn lock(&self) -> MutexGuard<'_, LocalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn round_trip(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl IdentityService for LocalIdentityService {
    fn subscribe_auth_changes(&self) -> AuthSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        let listener_id = state.next_listener_id;
        state.next_listener_id += 1;

        // Session restoration is the first firing every subscriber sees.
        let _ = tx.send(state.current.clone());
        state.listeners.insert(listener_id, tx);
        debug!(listener_id, "local identity: listener subscribed");

        let weak_state: Weak<Mutex<LocalState>> = Arc::downgrade(&self.state);
        AuthSubscription::new(rx, move || {
            if let Some(state) = weak_state.upgrade() {
                state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .listeners
                    .remove(&listener_id);
                debug!(listener_id, "local identity: listener disposed");
            }
        })
    }

    async fn sign_in_with_password(
        &self,
        credential: &PendingCredential,
    ) -> Result<Identity, AuthActionError> {
        self.round_trip().await;
        let mut state = self.lock();
        let identity = match state.accounts.get(&normalize_email(credential.email())) {
            Some(account) if account.password == credential.password() => account.identity.clone(),
            _ => {
                return Err(AuthActionError::new(
                    AuthAction::PasswordSignIn,
                    INVALID_CREDENTIALS,
                ))
            }
        };

        info!(user_id = %identity.user_id, "local identity: password sign-in");
        state.current = Some(identity.clone());
        state.notify();
        Ok(identity)
    }

    async fn sign_in_with_redirect(
        &self,
        provider: AuthProvider,
        options: RedirectOptions,
    ) -> Result<(), AuthActionError> {
        self.round_trip().await;
        info!(
            provider = provider.as_str(),
            return_to = %options.return_to,
            "local identity: redirecting to provider"
        );
        self.lock().pending_redirect = Some(PendingRedirect { provider, options });
        Ok(())
    }

    async fn get_redirect_result(&self) -> Result<Option<Identity>, RedirectResolutionError> {
        self.round_trip().await;
        let mut state = self.lock();
        let Some(pending) = state.pending_redirect.take() else {
            return Ok(None);
        };

        if pending.options.return_to.cannot_be_a_base() {
            return Err(RedirectResolutionError::new(format!(
                "redirect return url '{}' cannot receive a result",
                pending.options.return_to
            )));
        }

        let identity = state
            .linked_identities
            .get(&pending.provider)
            .cloned()
            .unwrap_or_else(|| {
                Identity::new(
                    format!("{}-{}", pending.provider.as_str(), Uuid::new_v4()),
                    None,
                )
            });

        info!(
            provider = pending.provider.as_str(),
            user_id = %identity.user_id,
            "local identity: redirect sign-in completed"
        );
        state.current = Some(identity.clone());
        state.notify();
        Ok(Some(identity))
    }

    async fn sign_out(&self) -> Result<(), AuthActionError> {
        self.round_trip().await;
        let mut state = self.lock();
        info!("local identity: signed out");
        state.current = None;
        state.notify();
        Ok(())
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

#[cfg(test)]
#[path = "tests/local_identity_tests.rs"]
mod tests;
