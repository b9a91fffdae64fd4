use super::*;
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use futures::future::join_all;

use crate::NativeComputeModule;

struct CountingInstantiator {
    calls: Arc<AtomicUsize>,
    delay: Duration,
    fail_with: Option<ModuleLoadError>,
}

impl CountingInstantiator {
    fn ok(delay: Duration) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            delay,
            fail_with: None,
        }
    }

    fn failing(err: ModuleLoadError) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            delay: Duration::from_millis(5),
            fail_with: Some(err),
        }
    }
}

#[async_trait]
impl ModuleInstantiator for CountingInstantiator {
    async fn instantiate(&self) -> Result<Arc<dyn ComputeModule>, ModuleLoadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        Ok(Arc::new(NativeComputeModule))
    }
}

#[tokio::test]
async fn back_to_back_acquisitions_share_one_instance() {
    let instantiator = CountingInstantiator::ok(Duration::from_millis(20));
    let calls = instantiator.calls.clone();
    let loader = ModuleLoader::new(Arc::new(instantiator));

    let pending = vec![
        loader.acquire(),
        loader.acquire(),
        loader.acquire(),
        loader.acquire(),
        loader.acquire(),
    ];
    let handles = join_all(pending)
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .expect("module ready");

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(handles.len(), 5);
    for handle in &handles {
        assert!(handle.ptr_eq(&handles[0]));
        assert_eq!(handle.add(21, 21), 42);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_tasks_trigger_a_single_initialization() {
    let instantiator = CountingInstantiator::ok(Duration::from_millis(30));
    let calls = instantiator.calls.clone();
    let loader = Arc::new(ModuleLoader::new(Arc::new(instantiator)));

    let tasks = (0..32)
        .map(|_| {
            let loader = Arc::clone(&loader);
            tokio::spawn(async move { loader.acquire().await })
        })
        .collect::<Vec<_>>();

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.expect("join").expect("module ready"));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(handles.iter().all(|handle| handle == &handles[0]));
}

#[tokio::test]
async fn later_acquisition_reuses_resolved_handle() {
    let instantiator = CountingInstantiator::ok(Duration::from_millis(1));
    let calls = instantiator.calls.clone();
    let loader = ModuleLoader::new(Arc::new(instantiator));

    assert!(!loader.is_started());
    assert!(loader.peek().is_none());

    let first = loader.acquire().await.expect("first");
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = loader.acquire().await.expect("second");

    assert!(first.ptr_eq(&second));
    assert!(loader.is_started());
    assert_eq!(loader.peek(), Some(Ok(first)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_initialization_is_sticky() {
    let err = ModuleLoadError::Fetch("404 wasm_core_bg.wasm".to_string());
    let instantiator = CountingInstantiator::failing(err.clone());
    let calls = instantiator.calls.clone();
    let loader = ModuleLoader::new(Arc::new(instantiator));

    let (first, second) = tokio::join!(loader.acquire(), loader.acquire());
    assert_eq!(first, Err(err.clone()));
    assert_eq!(second, Err(err.clone()));

    let later = loader.acquire().await;
    assert_eq!(later, Err(err));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn initialization_survives_dropped_waiters() {
    let instantiator = CountingInstantiator::ok(Duration::from_millis(20));
    let calls = instantiator.calls.clone();
    let loader = Arc::new(ModuleLoader::new(Arc::new(instantiator)));

    let waiter = {
        let loader = Arc::clone(&loader);
        tokio::spawn(async move { loader.acquire().await })
    };
    tokio::time::sleep(Duration::from_millis(2)).await;
    waiter.abort();

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(loader.is_started());

    let handle = tokio::time::timeout(Duration::from_millis(5), loader.acquire())
        .await
        .expect("instantiation finished without waiters")
        .expect("ready");
    assert_eq!(handle.add(1, 2), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn handle_exposes_all_exports() {
    let handle = acquire_module().await.expect("native module");
    assert_eq!(handle.add(21, 21), 42);
    assert_eq!(handle.hello("React"), "Hello, React from Rust!");
    assert_eq!(handle.sum_f32(&[0.5, 0.25, 0.25]), 1.0);

    let again = acquire_module().await.expect("native module");
    assert!(handle.ptr_eq(&again));
}
