//! One-time initialization of the compute module.
//!
//! The first [`ModuleLoader::acquire`] starts instantiation on its own task and
//! caches the shared outcome. Every later or concurrent call awaits that same
//! outcome, including a failure: a loader never instantiates twice.

use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use shared::error::ModuleLoadError;
use tracing::{error, info};

use crate::{ComputeModule, ModuleInstantiator, NativeModuleInstantiator};

type ModuleReady = Shared<BoxFuture<'static, Result<ModuleHandle, ModuleLoadError>>>;

/// An initialized compute module. Clones refer to the same instance.
#[derive(Clone)]
pub struct ModuleHandle {
    module: Arc<dyn ComputeModule>,
}

impl ModuleHandle {
    fn new(module: Arc<dyn ComputeModule>) -> Self {
        Self { module }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.module, &other.module)
    }

    pub fn add(&self, a: i32, b: i32) -> i32 {
        self.module.add(a, b)
    }

    pub fn hello(&self, name: &str) -> String {
        self.module.hello(name)
    }

    pub fn sum_f32(&self, buf: &[f32]) -> f32 {
        self.module.sum_f32(buf)
    }
}

impl PartialEq for ModuleHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ModuleHandle {}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("module", &Arc::as_ptr(&self.module).cast::<()>())
            .finish()
    }
}

pub struct ModuleLoader {
    instantiator: Arc<dyn ModuleInstantiator>,
    ready: OnceLock<ModuleReady>,
}

impl ModuleLoader {
    pub fn new(instantiator: Arc<dyn ModuleInstantiator>) -> Self {
        Self {
            instantiator,
            ready: OnceLock::new(),
        }
    }

    /// Returns the module, starting initialization if nobody has yet.
    ///
    /// A failed initialization stays failed for the lifetime of this loader.
    pub async fn acquire(&self) -> Result<ModuleHandle, ModuleLoadError> {
        let ready = self
            .ready
            .get_or_init(|| self.start_initialization())
            .clone();
        ready.await
    }

    /// Whether some caller has already triggered initialization.
    pub fn is_started(&self) -> bool {
        self.ready.get().is_some()
    }

    /// The settled outcome, if initialization has finished.
    pub fn peek(&self) -> Option<Result<ModuleHandle, ModuleLoadError>> {
        self.ready.get().and_then(|ready| ready.peek().cloned())
    }

    fn start_initialization(&self) -> ModuleReady {
        info!("compute module: initialization started");
        let instantiator = Arc::clone(&self.instantiator);
        let task = tokio::spawn(async move { instantiator.instantiate().await });

        async move {
            match task.await {
                Ok(Ok(module)) => {
                    info!("compute module: ready");
                    Ok(ModuleHandle::new(module))
                }
                Ok(Err(err)) => {
                    error!(error = %err, "compute module: initialization failed");
                    Err(err)
                }
                Err(join_err) => {
                    error!(error = %join_err, "compute module: initialization task died");
                    Err(ModuleLoadError::Aborted(join_err.to_string()))
                }
            }
        }
        .boxed()
        .shared()
    }
}

static GLOBAL_LOADER: OnceLock<Arc<ModuleLoader>> = OnceLock::new();

/// The process-wide loader bound to the native compute module. It is never torn down.
pub fn global_loader() -> Arc<ModuleLoader> {
    Arc::clone(
        GLOBAL_LOADER.get_or_init(|| Arc::new(ModuleLoader::new(Arc::new(NativeModuleInstantiator)))),
    )
}

pub async fn acquire_module() -> Result<ModuleHandle, ModuleLoadError> {
    global_loader().acquire().await
}

#[cfg(test)]
#[path = "tests/module_loader_tests.rs"]
mod tests;
