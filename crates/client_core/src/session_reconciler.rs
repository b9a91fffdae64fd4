//! Session reconciliation.
//!
//! A single actor task owns the session state. The ambient auth listener is the
//! only input that changes `session`; explicit actions and the one-shot redirect
//! check only ever touch `last_error` and `redirect`.

use std::sync::Arc;

use serde::Serialize;
use shared::{
    domain::{AuthProvider, PendingCredential, RedirectOutcome, Session},
    error::{AuthAction, AuthActionError, SessionError},
};
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{AuthChange, AuthSubscription, IdentityService, RedirectOptions};

const SESSION_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub session: Session,
    pub is_session_ready: bool,
    pub last_error: Option<SessionError>,
    pub redirect: RedirectOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SessionChanged(Session),
    ErrorChanged(Option<SessionError>),
    RedirectSettled(RedirectOutcome),
}

enum ReconcilerCommand {
    AttemptStarted {
        action: AuthAction,
        ack: oneshot::Sender<()>,
    },
    ActionFailed {
        error: AuthActionError,
        ack: oneshot::Sender<()>,
    },
    RedirectResolved(RedirectOutcome),
}

pub struct SessionReconciler {
    identity: Arc<dyn IdentityService>,
    redirect_options: RedirectOptions,
    commands: mpsc::UnboundedSender<ReconcilerCommand>,
    snapshot: watch::Receiver<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
    actor: JoinHandle<()>,
}

impl SessionReconciler {
    /// Subscribes to the identity service and starts the one-shot redirect check.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(identity: Arc<dyn IdentityService>, redirect_options: RedirectOptions) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(SessionSnapshot::default());
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);

        let subscription = identity.subscribe_auth_changes();
        let actor = tokio::spawn(
            SessionActor {
                snapshot: snapshot_tx,
                events: events.clone(),
            }
            .run(subscription, command_rx),
        );

        let redirect_identity = Arc::clone(&identity);
        let redirect_commands = commands.clone();
        tokio::spawn(async move {
            let outcome =
                RedirectOutcome::from_resolution(redirect_identity.get_redirect_result().await);
            // The reconciler may already be torn down; the outcome is then unobserved.
            let _ = redirect_commands.send(ReconcilerCommand::RedirectResolved(outcome));
        });

        info!("session: reconciler started");
        Self {
            identity,
            redirect_options,
            commands,
            snapshot,
            events,
            actor,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Every individual transition, in order. Unlike [`Self::subscribe`] nothing is coalesced.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn sign_in_with_password(&self, credential: PendingCredential) {
        self.begin_attempt(AuthAction::PasswordSignIn).await;
        info!(email = credential.email(), "session: password sign-in requested");
        match self.identity.sign_in_with_password(&credential).await {
            Ok(identity) => debug!(
                user_id = %identity.user_id,
                "session: password sign-in accepted, awaiting listener"
            ),
            Err(err) => self.report_failure(err).await,
        }
    }

    /// Leaves for the provider; the outcome is picked up by the next reconciler's redirect check.
    pub async fn sign_in_with_google_redirect(&self) {
        self.begin_attempt(AuthAction::RedirectSignIn).await;
        let provider = AuthProvider::Google;
        info!(
            provider = provider.as_str(),
            return_to = %self.redirect_options.return_to,
            "session: redirect sign-in requested"
        );
        if let Err(err) = self
            .identity
            .sign_in_with_redirect(provider, self.redirect_options.clone())
            .await
        {
            self.report_failure(err).await;
        }
    }

    pub async fn sign_out(&self) {
        self.begin_attempt(AuthAction::SignOut).await;
        info!("session: sign-out requested");
        match self.identity.sign_out().await {
            Ok(()) => debug!("session: sign-out accepted, awaiting listener"),
            Err(err) => self.report_failure(err).await,
        }
    }

    /// Cancels the ambient subscription. In-flight actions may still finish but are ignored.
    pub fn shutdown(&self) {
        if !self.actor.is_finished() {
            info!("session: reconciler stopped");
        }
        self.actor.abort();
    }

    async fn begin_attempt(&self, action: AuthAction) {
        self.dispatch(|ack| ReconcilerCommand::AttemptStarted { action, ack })
            .await;
    }

    async fn report_failure(&self, error: AuthActionError) {
        warn!(
            action = error.action.as_str(),
            error = %error,
            "session: identity service rejected action"
        );
        self.dispatch(|ack| ReconcilerCommand::ActionFailed { error, ack })
            .await;
    }

    async fn dispatch(&self, command: impl FnOnce(oneshot::Sender<()>) -> ReconcilerCommand) {
        let (ack, applied) = oneshot::channel();
        if self.commands.send(command(ack)).is_err() {
            return;
        }
        let _ = applied.await;
    }
}

impl Drop for SessionReconciler {
    fn drop(&mut self) {
        self.actor.abort();
    }
}

struct SessionActor {
    snapshot: watch::Sender<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionActor {
    async fn run(
        self,
        mut subscription: AuthSubscription,
        mut commands: mpsc::UnboundedReceiver<ReconcilerCommand>,
    ) {
        let mut listener_open = true;
        loop {
            tokio::select! {
                change = subscription.recv(), if listener_open => match change {
                    Some(change) => self.apply_auth_change(change),
                    None => {
                        warn!("session: identity service closed the auth listener");
                        listener_open = false;
                    }
                },
                command = commands.recv() => match command {
                    Some(command) => self.apply_command(command),
                    None => break,
                },
            }
        }
    }

    fn apply_auth_change(&self, change: AuthChange) {
        let next = Session::from_auth_change(change);
        let mut became_ready = false;
        let changed = self.snapshot.send_if_modified(|state| {
            became_ready = !state.is_session_ready;
            state.is_session_ready = true;
            if state.session == next {
                return became_ready;
            }
            state.session = next.clone();
            true
        });

        if !changed {
            debug!("session: listener repeated current state");
            return;
        }
        if became_ready {
            info!("session: ready");
        }
        match next.identity() {
            Some(identity) => info!(user_id = %identity.user_id, "session: authenticated"),
            None => info!("session: anonymous"),
        }
        let _ = self.events.send(SessionEvent::SessionChanged(next));
    }

    fn apply_command(&self, command: ReconcilerCommand) {
        match command {
            ReconcilerCommand::AttemptStarted { action, ack } => {
                debug!(action = action.as_str(), "session: clearing error for new attempt");
                self.set_error(None);
                let _ = ack.send(());
            }
            ReconcilerCommand::ActionFailed { error, ack } => {
                self.set_error(Some(SessionError::Action(error)));
                let _ = ack.send(());
            }
            ReconcilerCommand::RedirectResolved(outcome) => self.apply_redirect(outcome),
        }
    }

    fn apply_redirect(&self, outcome: RedirectOutcome) {
        match &outcome {
            RedirectOutcome::Succeeded(identity) => info!(
                user_id = %identity.user_id,
                "session: redirect sign-in completed, awaiting listener"
            ),
            RedirectOutcome::Failed(err) => {
                warn!(error = %err, "session: redirect resolution failed");
                self.set_error(Some(SessionError::Redirect(err.clone())));
            }
            RedirectOutcome::None | RedirectOutcome::Pending => {
                debug!("session: no redirect result pending")
            }
        }

        self.snapshot.send_modify(|state| state.redirect = outcome.clone());
        let _ = self.events.send(SessionEvent::RedirectSettled(outcome));
    }

    fn set_error(&self, error: Option<SessionError>) {
        let changed = self.snapshot.send_if_modified(|state| {
            if state.last_error == error {
                return false;
            }
            state.last_error = error.clone();
            true
        });
        if changed {
            let _ = self.events.send(SessionEvent::ErrorChanged(error));
        }
    }
}

#[cfg(test)]
#[path = "tests/session_reconciler_tests.rs"]
mod tests;
