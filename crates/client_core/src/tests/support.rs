//! Scriptable identity service double shared by the reconciler and bootstrap tests.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use shared::{
    domain::{AuthProvider, Identity, PendingCredential},
    error::{AuthAction, AuthActionError, RedirectResolutionError},
};
use tokio::sync::{mpsc, Notify};

use crate::{AuthChange, AuthSubscription, IdentityService, RedirectOptions};

pub(crate) struct ScriptedIdentityService {
    listeners: Mutex<Vec<mpsc::UnboundedSender<AuthChange>>>,
    pub(crate) subscriptions: AtomicUsize,
    pub(crate) disposed: Arc<AtomicUsize>,
    password_result: Mutex<Result<Identity, AuthActionError>>,
    emit_on_password_sign_in: bool,
    sign_out_result: Mutex<Result<(), AuthActionError>>,
    redirect_start_result: Mutex<Result<(), AuthActionError>>,
    redirect_result: Mutex<Result<Option<Identity>, RedirectResolutionError>>,
    redirect_gate: Option<Arc<Notify>>,
    pub(crate) redirect_checks: AtomicUsize,
    pub(crate) redirect_requests: Mutex<Vec<(AuthProvider, RedirectOptions)>>,
    pub(crate) password_attempts: Mutex<Vec<String>>,
}

impl ScriptedIdentityService {
    pub(crate) fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            subscriptions: AtomicUsize::new(0),
            disposed: Arc::new(AtomicUsize::new(0)),
            password_result: Mutex::new(Err(AuthActionError::new(
                AuthAction::PasswordSignIn,
                "invalid credentials",
            ))),
            emit_on_password_sign_in: false,
            sign_out_result: Mutex::new(Ok(())),
            redirect_start_result: Mutex::new(Ok(())),
            redirect_result: Mutex::new(Ok(None)),
            redirect_gate: None,
            redirect_checks: AtomicUsize::new(0),
            redirect_requests: Mutex::new(Vec::new()),
            password_attempts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn accepting_password(mut self, identity: Identity, emit: bool) -> Self {
        self.password_result = Mutex::new(Ok(identity));
        self.emit_on_password_sign_in = emit;
        self
    }

    pub(crate) fn rejecting_sign_out(self, message: &str) -> Self {
        *self.sign_out_result.lock().unwrap() =
            Err(AuthActionError::new(AuthAction::SignOut, message));
        self
    }

    pub(crate) fn rejecting_redirect_start(self, message: &str) -> Self {
        *self.redirect_start_result.lock().unwrap() =
            Err(AuthActionError::new(AuthAction::RedirectSignIn, message));
        self
    }

    pub(crate) fn with_redirect_result(
        self,
        result: Result<Option<Identity>, RedirectResolutionError>,
    ) -> Self {
        *self.redirect_result.lock().unwrap() = result;
        self
    }

    /// The redirect check blocks until the returned gate is notified.
    pub(crate) fn with_redirect_gate(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.redirect_gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub(crate) fn emit(&self, change: AuthChange) {
        self.listeners
            .lock()
            .unwrap()
            .retain(|listener| listener.send(change.clone()).is_ok());
    }

    pub(crate) fn active_listeners(&self) -> usize {
        self.listeners
            .lock()
            .unwrap()
            .iter()
            .filter(|listener| !listener.is_closed())
            .count()
    }
}

#[async_trait]
impl IdentityService for ScriptedIdentityService {
    fn subscribe_auth_changes(&self) -> AuthSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.lock().unwrap().push(tx);
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let disposed = Arc::clone(&self.disposed);
        AuthSubscription::new(rx, move || {
            disposed.fetch_add(1, Ordering::SeqCst);
        })
    }

    async fn sign_in_with_password(
        &self,
        credential: &PendingCredential,
    ) -> Result<Identity, AuthActionError> {
        self.password_attempts
            .lock()
            .unwrap()
            .push(credential.email().to_string());
        let result = self.password_result.lock().unwrap().clone();
        if let (Ok(identity), true) = (&result, self.emit_on_password_sign_in) {
            self.emit(Some(identity.clone()));
        }
        result
    }

    async fn sign_in_with_redirect(
        &self,
        provider: AuthProvider,
        options: RedirectOptions,
    ) -> Result<(), AuthActionError> {
        self.redirect_requests
            .lock()
            .unwrap()
            .push((provider, options));
        self.redirect_start_result.lock().unwrap().clone()
    }

    async fn get_redirect_result(&self) -> Result<Option<Identity>, RedirectResolutionError> {
        self.redirect_checks.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.redirect_gate {
            gate.notified().await;
        }
        self.redirect_result.lock().unwrap().clone()
    }

    async fn sign_out(&self) -> Result<(), AuthActionError> {
        self.sign_out_result.lock().unwrap().clone()
    }
}

pub(crate) fn redirect_options() -> RedirectOptions {
    RedirectOptions {
        return_to: "http://localhost:5173/".parse().expect("valid url"),
    }
}
