pub mod config;
pub mod manager;

pub use config::InstanceConfig;
pub use manager::{ManagedInstance, ManagedInstanceBuilder, DEFAULT_HOST, DEFAULT_POLL_INTERVAL};

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;

use async_trait::async_trait;
use futures_util::FutureExt;

use crate::core::error::WrapperResult;

/// What the caller's work sees of a running instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceHandle {
    pub host: String,
    pub port: String,
    pub url: String,
    pub version: String,
    pub instance_dir: PathBuf,
}

/// Lifecycle capabilities shared by every managed service.
#[async_trait]
pub trait ManagedServiceInstance: Send + Sync {
    fn handle(&self) -> InstanceHandle;

    /// Idempotent install; returns the instance directory.
    async fn extract(&self) -> WrapperResult<PathBuf>;

    async fn start(&mut self) -> WrapperResult<()>;

    /// Always safe to call, including on an instance that never started.
    async fn stop(&mut self);

    async fn restart(&mut self) -> WrapperResult<()>;

    async fn status(&self) -> bool;

    /// Stop and remove every file the instance created.
    async fn clean(&mut self);
}

/// Start `instance`, hand it to `work`, and stop it whatever happens.
///
/// A failed start skips `work` and is returned after the stop. A panic in
/// `work` is resumed once the instance has been stopped.
pub async fn run_wrapped<I, F, Fut, T>(instance: &mut I, work: F) -> WrapperResult<T>
where
    I: ManagedServiceInstance + ?Sized,
    F: FnOnce(InstanceHandle) -> Fut,
    Fut: Future<Output = WrapperResult<T>>,
{
    let outcome = match instance.start().await {
        Ok(()) => {
            let handle = instance.handle();
            AssertUnwindSafe(async move { work(handle).await })
                .catch_unwind()
                .await
        }
        Err(err) => Ok(Err(err)),
    };

    instance.stop().await;

    match outcome {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
