//! Bootstrap orchestration: module acquisition and session reconciliation run
//! side by side and are folded into one snapshot for presentation.

use std::sync::Arc;

use serde::Serialize;
use shared::{
    domain::{Identity, PendingCredential, RedirectOutcome, Session},
    error::ModuleLoadError,
};
use tokio::{sync::watch, task::JoinHandle};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info};

use crate::{
    config::BootstrapSettings,
    module_loader::{ModuleHandle, ModuleLoader},
    session_reconciler::{SessionEvent, SessionReconciler, SessionSnapshot},
    IdentityService, RedirectOptions,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum ModuleOutput {
    #[default]
    Loading,
    Ready(String),
    Failed(ModuleLoadError),
}

impl ModuleOutput {
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Loading)
    }
}

/// What presentation reads. Session and module output are independent fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapSnapshot {
    pub session: Session,
    pub is_session_ready: bool,
    pub module_output: ModuleOutput,
    pub last_error: Option<String>,
    pub redirect: RedirectOutcome,
}

impl BootstrapSnapshot {
    pub fn user(&self) -> Option<&Identity> {
        self.session.identity()
    }

    fn apply_session(&mut self, session: &SessionSnapshot) {
        self.session = session.session.clone();
        self.is_session_ready = session.is_session_ready;
        self.last_error = session
            .last_error
            .as_ref()
            .map(|err| err.message().to_string());
        self.redirect = session.redirect.clone();
    }
}

/// The line shown once the module is ready, e.g. `Hello, React from Rust! | sum=42`.
pub fn render_module_output(handle: &ModuleHandle, settings: &BootstrapSettings) -> String {
    let (a, b) = settings.add_operands;
    format!(
        "{} | sum={}",
        handle.hello(&settings.greeting_name),
        handle.add(a, b)
    )
}

pub struct BootstrapController {
    reconciler: SessionReconciler,
    snapshot: watch::Receiver<BootstrapSnapshot>,
    combiner: JoinHandle<()>,
}

impl BootstrapController {
    /// Starts module acquisition and session reconciliation concurrently.
    ///
    /// Must be called from within a tokio runtime.
    pub fn activate(
        identity: Arc<dyn IdentityService>,
        loader: Arc<ModuleLoader>,
        settings: &BootstrapSettings,
    ) -> Self {
        info!("bootstrap: activating");
        let reconciler = SessionReconciler::start(
            identity,
            RedirectOptions {
                return_to: settings.redirect_return_url.clone(),
            },
        );

        let (snapshot_tx, snapshot) = watch::channel(BootstrapSnapshot::default());
        let combiner = tokio::spawn(combine(
            snapshot_tx,
            reconciler.subscribe(),
            loader,
            settings.clone(),
        ));

        Self {
            reconciler,
            snapshot,
            combiner,
        }
    }

    pub fn snapshot(&self) -> BootstrapSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BootstrapSnapshot> {
        self.snapshot.clone()
    }

    /// Current snapshot first, then one item per change.
    pub fn snapshots(&self) -> WatchStream<BootstrapSnapshot> {
        WatchStream::new(self.snapshot.clone())
    }

    pub fn subscribe_session_events(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.reconciler.subscribe_events()
    }

    pub async fn sign_in_with_password(&self, credential: PendingCredential) {
        self.reconciler.sign_in_with_password(credential).await;
    }

    pub async fn sign_in_with_google_redirect(&self) {
        self.reconciler.sign_in_with_google_redirect().await;
    }

    pub async fn sign_out(&self) {
        self.reconciler.sign_out().await;
    }

    /// Tears down the auth subscription. Module initialization keeps going.
    pub fn deactivate(self) {
        info!("bootstrap: deactivating");
    }
}

impl Drop for BootstrapController {
    fn drop(&mut self) {
        self.combiner.abort();
        self.reconciler.shutdown();
    }
}

async fn combine(
    snapshot: watch::Sender<BootstrapSnapshot>,
    mut session: watch::Receiver<SessionSnapshot>,
    loader: Arc<ModuleLoader>,
    settings: BootstrapSettings,
) {
    let module = async move {
        match loader.acquire().await {
            Ok(handle) => ModuleOutput::Ready(render_module_output(&handle, &settings)),
            Err(err) => ModuleOutput::Failed(err),
        }
    };
    tokio::pin!(module);

    let mut module_pending = true;
    let mut session_open = true;
    while module_pending || session_open {
        tokio::select! {
            output = &mut module, if module_pending => {
                module_pending = false;
                debug!(settled = output.is_settled(), "bootstrap: module output available");
                publish(&snapshot, |state| state.module_output = output);
            }
            changed = session.changed(), if session_open => {
                if changed.is_err() {
                    session_open = false;
                    continue;
                }
                let current = session.borrow_and_update().clone();
                publish(&snapshot, |state| state.apply_session(&current));
            }
        }
    }
}

fn publish(snapshot: &watch::Sender<BootstrapSnapshot>, update: impl FnOnce(&mut BootstrapSnapshot)) {
    snapshot.send_if_modified(|state| {
        let before = state.clone();
        update(state);
        *state != before
    });
}

#[cfg(test)]
#[path = "tests/bootstrap_tests.rs"]
mod tests;
