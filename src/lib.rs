pub mod core;

use std::future::Future;

use tracing_subscriber::EnvFilter;

pub use crate::core::error::{WrapperError, WrapperResult};
pub use crate::core::instance::{
    InstanceConfig, InstanceHandle, ManagedInstance, ManagedInstanceBuilder,
    ManagedServiceInstance,
};
pub use crate::core::options::{ConfigLoader, Options};
pub use crate::core::service::{Fcrepo, ServiceProfile, DEFAULT_FCREPO_VERSION};

/// Ensure a Fedora repository is running while `work` executes.
///
/// Options are layered over the default config files and any listed under
/// `config`; the instance is stopped on every exit path.
pub async fn wrap<F, Fut, T>(options: Options, work: F) -> WrapperResult<T>
where
    F: FnOnce(InstanceHandle) -> Fut,
    Fut: Future<Output = WrapperResult<T>>,
{
    let options = ConfigLoader::new().load(options)?;
    let mut instance = ManagedInstance::new(options)?;
    instance.wrap(work).await
}

/// Install a `tracing` subscriber for binaries. `RUST_LOG` wins when set.
pub fn init_tracing(verbose: bool) {
    let default = if verbose {
        "info,fcrepo_wrapper=debug"
    } else {
        "warn,fcrepo_wrapper=info"
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .try_init();
}
