use std::{fmt, sync::Arc};

use async_trait::async_trait;
use shared::{
    domain::{AuthProvider, Identity, PendingCredential},
    error::{AuthActionError, ModuleLoadError, RedirectResolutionError},
};
use tokio::sync::mpsc;
use url::Url;

pub mod bootstrap;
pub mod config;
mod local_identity;
pub mod module_loader;
pub mod session_reconciler;

pub use bootstrap::{BootstrapController, BootstrapSnapshot, ModuleOutput};
pub use local_identity::LocalIdentityService;
pub use module_loader::{acquire_module, global_loader, ModuleHandle, ModuleLoader};
pub use session_reconciler::{SessionEvent, SessionReconciler, SessionSnapshot};

/// `None` means signed out.
pub type AuthChange = Option<Identity>;

/// A standing subscription to auth-state changes reported by an identity service.
///
/// Dropping or cancelling the subscription runs the service's disposer exactly once.
pub struct AuthSubscription {
    changes: mpsc::UnboundedReceiver<AuthChange>,
    disposer: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl AuthSubscription {
    pub fn new(
        changes: mpsc::UnboundedReceiver<AuthChange>,
        disposer: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            changes,
            disposer: Some(Box::new(disposer)),
        }
    }

    /// Waits for the next change. Returns `None` once the service stops reporting.
    pub async fn recv(&mut self) -> Option<AuthChange> {
        self.changes.recv().await
    }

    pub fn cancel(mut self) {
        self.dispose();
    }

    fn dispose(&mut self) {
        if let Some(disposer) = self.disposer.take() {
            disposer();
        }
    }
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for AuthSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSubscription")
            .field("active", &self.disposer.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectOptions {
    pub return_to: Url,
}

/// The external system of record for who is signed in.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Fires on session restoration, on every completed sign-in and on sign-out.
    fn subscribe_auth_changes(&self) -> AuthSubscription;
    async fn sign_in_with_password(
        &self,
        credential: &PendingCredential,
    ) -> Result<Identity, AuthActionError>;
    /// Starts a redirect login. The result is only available through
    /// [`IdentityService::get_redirect_result`] on the next load.
    async fn sign_in_with_redirect(
        &self,
        provider: AuthProvider,
        options: RedirectOptions,
    ) -> Result<(), AuthActionError>;
    async fn get_redirect_result(&self) -> Result<Option<Identity>, RedirectResolutionError>;
    async fn sign_out(&self) -> Result<(), AuthActionError>;
}

/// Exported functions of an instantiated compute module.
pub trait ComputeModule: Send + Sync {
    fn add(&self, a: i32, b: i32) -> i32;
    fn hello(&self, name: &str) -> String;
    fn sum_f32(&self, buf: &[f32]) -> f32;
}

#[async_trait]
pub trait ModuleInstantiator: Send + Sync {
    async fn instantiate(&self) -> Result<Arc<dyn ComputeModule>, ModuleLoadError>;
}

pub struct NativeComputeModule;

impl ComputeModule for NativeComputeModule {
    fn add(&self, a: i32, b: i32) -> i32 {
        compute_core::add(a, b)
    }

    fn hello(&self, name: &str) -> String {
        compute_core::hello(name)
    }

    fn sum_f32(&self, buf: &[f32]) -> f32 {
        compute_core::sum_f32(buf)
    }
}

/// Binds the statically linked `compute_core` exports.
pub struct NativeModuleInstantiator;

#[async_trait]
impl ModuleInstantiator for NativeModuleInstantiator {
    async fn instantiate(&self) -> Result<Arc<dyn ComputeModule>, ModuleLoadError> {
        tokio::task::yield_now().await;
        Ok(Arc::new(NativeComputeModule))
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
