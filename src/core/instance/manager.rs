use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::config::InstanceConfig;
use super::{run_wrapped, InstanceHandle, ManagedServiceInstance};
use crate::core::checksum::ChecksumVerifier;
use crate::core::downloader::{Downloader, LogProgress, ProgressObserver};
use crate::core::error::{WrapperError, WrapperResult};
use crate::core::options::Options;
use crate::core::process::{
    random_open_port, HealthProbe, LaunchSpec, ProcessSupervisor, SystemSupervisor, TcpHttpProbe,
};
use crate::core::service::{Fcrepo, ServiceProfile};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// One installed copy of the service and at most one running process.
///
/// State moves `NotInstalled -> Installed -> Running -> Installed`; the
/// running state is exactly "a pid is tracked". Callers must not point two
/// instances at the same instance directory and extract concurrently.
pub struct ManagedInstance {
    config: InstanceConfig,
    host: String,
    port: String,
    downloader: Downloader,
    supervisor: Arc<dyn ProcessSupervisor>,
    probe: Arc<dyn HealthProbe>,
    poll_interval: Duration,
    pid: Option<u32>,
}

impl std::fmt::Debug for ManagedInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedInstance")
            .field("url", &self.url())
            .field("version", &self.config.version())
            .field("instance_dir", &self.config.instance_dir())
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

pub struct ManagedInstanceBuilder {
    options: Options,
    profile: Arc<dyn ServiceProfile>,
    supervisor: Option<Arc<dyn ProcessSupervisor>>,
    probe: Option<Arc<dyn HealthProbe>>,
    observer: Option<Arc<dyn ProgressObserver>>,
    poll_interval: Duration,
}

impl ManagedInstanceBuilder {
    pub fn profile(mut self, profile: Arc<dyn ServiceProfile>) -> Self {
        self.profile = profile;
        self
    }

    pub fn supervisor(mut self, supervisor: Arc<dyn ProcessSupervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn progress(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Resolve the configuration and fix the port for the instance's
    /// lifetime, picking a free one when the options ask for none.
    pub fn build(self) -> WrapperResult<ManagedInstance> {
        let config = InstanceConfig::resolve(self.options, self.profile.as_ref())?;
        let port = match config.port() {
            Some(port) => port.to_string(),
            None => random_open_port()?.to_string(),
        };
        let probe = match self.probe {
            Some(probe) => probe,
            None => Arc::new(TcpHttpProbe::new(config.health_path().map(str::to_string))),
        };
        let observer = self.observer.unwrap_or_else(|| Arc::new(LogProgress));

        Ok(ManagedInstance {
            host: DEFAULT_HOST.to_string(),
            port,
            downloader: Downloader::with_observer(observer)?,
            supervisor: self
                .supervisor
                .unwrap_or_else(|| Arc::new(SystemSupervisor::new())),
            probe,
            poll_interval: self.poll_interval,
            pid: None,
            config,
        })
    }
}

impl ManagedInstance {
    /// Default Fedora profile, real processes, real network probe.
    pub fn new(options: Options) -> WrapperResult<Self> {
        Self::builder(options).build()
    }

    pub fn builder(options: Options) -> ManagedInstanceBuilder {
        ManagedInstanceBuilder {
            options,
            profile: Arc::new(Fcrepo),
            supervisor: None,
            probe: None,
            observer: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    pub fn options(&self) -> &Options {
        self.config.options()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    /// A (likely) URL to the running service.
    pub fn url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }

    pub fn version(&self) -> &str {
        self.config.version()
    }

    pub fn instance_dir(&self) -> &Path {
        self.config.instance_dir()
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn handle(&self) -> InstanceHandle {
        InstanceHandle {
            host: self.host.clone(),
            port: self.port.clone(),
            url: self.url(),
            version: self.version().to_string(),
            instance_dir: self.instance_dir().to_path_buf(),
        }
    }

    pub fn checksum(&self) -> ChecksumVerifier<'_> {
        ChecksumVerifier::new(&self.config, &self.downloader)
    }

    pub fn process_arguments(&self) -> Vec<String> {
        self.config.process_arguments(Some(&self.port))
    }

    // ── Installation ────────────────────────────────────

    /// Version recorded in the marker file, if any.
    pub fn extracted_version(&self) -> Option<String> {
        std::fs::read_to_string(self.config.version_file())
            .ok()
            .map(|v| v.trim().to_string())
    }

    pub fn is_extracted(&self) -> bool {
        self.config.binary_path().is_file()
            && self.extracted_version().as_deref() == Some(self.config.version())
    }

    /// Install the artifact into the instance directory.
    ///
    /// A no-op when the binary is present and the marker names the
    /// configured version. The marker is written only after the copy.
    pub async fn extract(&self) -> WrapperResult<PathBuf> {
        let instance_dir = self.config.instance_dir().to_path_buf();
        if self.is_extracted() {
            debug!("Version {} already extracted at {:?}", self.version(), instance_dir);
            self.write_support_files().await?;
            return Ok(instance_dir);
        }

        let artifact = self.download().await?;

        tokio::fs::create_dir_all(&instance_dir)
            .await
            .map_err(WrapperError::io(&instance_dir))?;
        let binary = self.config.binary_path();
        tokio::fs::copy(&artifact, binary)
            .await
            .map_err(WrapperError::io(binary))?;
        self.write_support_files().await?;
        self.write_extracted_version().await?;

        info!("Installed version {} into {:?}", self.version(), instance_dir);
        Ok(instance_dir)
    }

    /// Fail unless `extract` has completed for the configured version.
    pub fn configure(&self) -> WrapperResult<()> {
        if self.is_extracted() {
            Ok(())
        } else {
            Err(WrapperError::NotInstalled {
                instance_dir: self.config.instance_dir().to_path_buf(),
            })
        }
    }

    pub async fn extract_and_configure(&self) -> WrapperResult<PathBuf> {
        let instance_dir = self.extract().await?;
        self.configure()?;
        Ok(instance_dir)
    }

    /// Reuse a verified artifact at the download path, else fetch and
    /// verify a fresh one.
    async fn download(&self) -> WrapperResult<PathBuf> {
        let path = self.config.download_path().to_path_buf();
        let checksum = self.checksum();

        if path.is_file() && checksum.is_valid(&path).await? {
            debug!("Reusing verified download {:?}", path);
            return Ok(path);
        }

        self.downloader
            .fetch(self.config.download_url(), &path)
            .await?;
        checksum.enforce(&path).await?;
        Ok(path)
    }

    async fn write_support_files(&self) -> WrapperResult<()> {
        for file in self.config.support_files() {
            let path = self.config.instance_dir().join(file.name);
            tokio::fs::write(&path, file.contents)
                .await
                .map_err(WrapperError::io(&path))?;
        }
        Ok(())
    }

    async fn write_extracted_version(&self) -> WrapperResult<()> {
        let version_file = self.config.version_file();
        if let Some(parent) = version_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(WrapperError::io(parent))?;
        }
        tokio::fs::write(version_file, format!("{}\n", self.version()))
            .await
            .map_err(WrapperError::io(version_file))
    }

    // ── Process lifecycle ───────────────────────────────

    /// Install if needed, spawn the service and block until it answers.
    ///
    /// Polls every `poll_interval`. Without a `startup_timeout` this waits
    /// forever for a service that never comes up.
    pub async fn start(&mut self) -> WrapperResult<()> {
        self.extract_and_configure().await?;
        if !self.config.managed() {
            debug!("Unmanaged instance at {}, assuming it is running", self.url());
            return Ok(());
        }

        if let Some(pid) = self.pid {
            if self.status().await {
                debug!("Process {} already running at {}", pid, self.url());
                return Ok(());
            }
            debug!("Process {} is not answering at {}, replacing it", pid, self.url());
            self.stop().await;
        }

        let spec = LaunchSpec::from_argv(
            self.process_arguments(),
            self.config.env().to_vec(),
            self.config.verbose(),
        )?;
        let pid = self.supervisor.spawn(&spec).await?;
        self.pid = Some(pid);
        info!("Started process {}, waiting for {}", pid, self.url());

        let started = Instant::now();
        while !self.status().await {
            if let Some(limit) = self.config.startup_timeout() {
                if started.elapsed() >= limit {
                    return Err(WrapperError::StartupTimeout {
                        url: self.url(),
                        waited: started.elapsed(),
                    });
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        info!("Service ready at {} after {:?}", self.url(), started.elapsed());
        Ok(())
    }

    /// Liveness: the tracked process exists and answers on its port.
    ///
    /// Never fails. A process that exists but does not answer is reported
    /// as down, same as no process at all.
    pub async fn status(&self) -> bool {
        if !self.config.managed() {
            return true;
        }
        let Some(pid) = self.pid else {
            return false;
        };
        if !self.supervisor.is_alive(pid) {
            return false;
        }
        self.probe.is_reachable(&self.host, &self.port).await
    }

    pub async fn is_started(&self) -> bool {
        self.status().await
    }

    /// Signal the process, wait for it to go away, then reap it.
    ///
    /// Safe to call at any time. The tracked pid is cleared even when the
    /// process does not exit within `shutdown_timeout`; such a process is
    /// left running and never reaped.
    pub async fn stop(&mut self) {
        if self.config.managed() {
            if let Some(pid) = self.pid {
                if self.supervisor.is_alive(pid) {
                    self.shutdown(pid).await;
                } else {
                    self.supervisor.reap(pid).await;
                }
            }
        }
        self.pid = None;
    }

    async fn shutdown(&self, pid: u32) {
        if let Err(e) = self.supervisor.terminate(pid) {
            warn!("Failed to signal process {}: {}", pid, e);
        }
        info!("Stopping process {}", pid);

        let started = Instant::now();
        let limit = self.config.shutdown_timeout();
        let expired = || limit.is_some_and(|limit| started.elapsed() >= limit);

        while self.status().await {
            if expired() {
                warn!("Process {} still answering after {:?}, giving up", pid, started.elapsed());
                return;
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        // Reap only once the process has exited.
        while self.supervisor.is_alive(pid) {
            if expired() {
                warn!("Process {} did not exit after {:?}, leaving it", pid, started.elapsed());
                return;
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        self.supervisor.reap(pid).await;
        info!("Process {} stopped", pid);
    }

    /// Stop and start again; only acts on a running managed instance.
    pub async fn restart(&mut self) -> WrapperResult<()> {
        if self.config.managed() && self.is_started().await {
            self.stop().await;
            self.start().await?;
        }
        Ok(())
    }

    /// Run `work` against a started instance. The instance is stopped on
    /// every exit path: success, error, failed start or panic.
    pub async fn wrap<F, Fut, T>(&mut self, work: F) -> WrapperResult<T>
    where
        F: FnOnce(InstanceHandle) -> Fut,
        Fut: Future<Output = WrapperResult<T>>,
    {
        run_wrapped(self, work).await
    }

    // ── Cleanup ─────────────────────────────────────────

    /// Stop, then delete everything this instance put on disk. Each
    /// removal is independent; missing files are skipped.
    pub async fn clean(&mut self) {
        self.stop().await;
        self.remove_instance_dir().await;
        remove_entry(self.config.download_path()).await;
        remove_entry(self.config.tmp_save_dir()).await;
        self.checksum().clean().await;
        remove_entry(self.config.version_file()).await;
        info!("Cleaned instance files for version {}", self.version());
    }

    pub async fn remove_instance_dir(&self) {
        remove_entry(self.config.instance_dir()).await;
    }
}

#[async_trait]
impl ManagedServiceInstance for ManagedInstance {
    fn handle(&self) -> InstanceHandle {
        ManagedInstance::handle(self)
    }

    async fn extract(&self) -> WrapperResult<PathBuf> {
        ManagedInstance::extract(self).await
    }

    async fn start(&mut self) -> WrapperResult<()> {
        ManagedInstance::start(self).await
    }

    async fn stop(&mut self) {
        ManagedInstance::stop(self).await
    }

    async fn restart(&mut self) -> WrapperResult<()> {
        ManagedInstance::restart(self).await
    }

    async fn status(&self) -> bool {
        ManagedInstance::status(self).await
    }

    async fn clean(&mut self) {
        ManagedInstance::clean(self).await
    }
}

async fn remove_entry(path: &Path) {
    let result = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => debug!("Removed {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {:?}: {}", path, e),
    }
}
