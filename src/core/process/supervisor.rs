use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::LaunchSpec;
use crate::core::error::{WrapperError, WrapperResult};

/// Owns the OS side of a managed process.
#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    /// Start the process and return its pid.
    async fn spawn(&self, spec: &LaunchSpec) -> WrapperResult<u32>;

    /// Whether the process still exists. Never fails: unknown means dead.
    fn is_alive(&self, pid: u32) -> bool;

    /// Ask the process to shut down (SIGHUP on unix). A process that is
    /// already gone is not an error.
    fn terminate(&self, pid: u32) -> WrapperResult<()>;

    /// Wait for the OS to collect the exited process.
    async fn reap(&self, pid: u32);
}

/// Real processes via `tokio::process`.
#[derive(Debug, Default)]
pub struct SystemSupervisor {
    children: Mutex<HashMap<u32, Child>>,
}

impl SystemSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    fn children(&self) -> MutexGuard<'_, HashMap<u32, Child>> {
        self.children
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ProcessSupervisor for SystemSupervisor {
    async fn spawn(&self, spec: &LaunchSpec) -> WrapperResult<u32> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null());
        if spec.inherit_output {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        debug!("Spawning {} {}", spec.program, spec.args.join(" "));
        let child = cmd.spawn().map_err(|source| WrapperError::Spawn {
            program: spec.program.clone(),
            source,
        })?;
        let pid = child
            .id()
            .ok_or_else(|| WrapperError::Other(format!("{} exited during spawn", spec.program)))?;

        self.children().insert(pid, child);
        info!("Spawned {} (pid {})", spec.program, pid);
        Ok(pid)
    }

    fn is_alive(&self, pid: u32) -> bool {
        if let Some(child) = self.children().get_mut(&pid) {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!("Process {} exited with {}", pid, status);
                    return false;
                }
                Ok(None) => {}
                Err(e) => {
                    debug!("Cannot poll process {}: {}", pid, e);
                    return false;
                }
            }
        }
        process_exists(pid)
    }

    fn terminate(&self, pid: u32) -> WrapperResult<()> {
        #[cfg(unix)]
        return hangup(pid);

        #[cfg(not(unix))]
        return self.kill_child(pid);
    }

    async fn reap(&self, pid: u32) {
        let child = self.children().remove(&pid);
        match child {
            Some(mut child) => match child.wait().await {
                Ok(status) => debug!("Reaped process {} ({})", pid, status),
                Err(e) => warn!("Failed to reap process {}: {}", pid, e),
            },
            None => debug!("Process {} is not ours to reap", pid),
        }
    }
}

#[cfg(not(unix))]
impl SystemSupervisor {
    fn kill_child(&self, pid: u32) -> WrapperResult<()> {
        match self.children().get_mut(&pid) {
            Some(child) => match child.start_kill() {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
                Err(err) => Err(WrapperError::from(err)),
            },
            None => Ok(()),
        }
    }
}

#[cfg(unix)]
fn hangup(pid: u32) -> WrapperResult<()> {
    let raw = libc::pid_t::try_from(pid)
        .map_err(|_| WrapperError::Other(format!("pid {pid} out of range")))?;
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(raw, libc::SIGHUP) };
    if rc == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        debug!("Process {} already gone", pid);
        return Ok(());
    }
    Err(WrapperError::from(err))
}

#[cfg(unix)]
fn process_exists(pid: u32) -> bool {
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: getpgid(2) only inspects the process table.
    unsafe { libc::getpgid(raw) >= 0 }
}

#[cfg(not(unix))]
fn process_exists(_pid: u32) -> bool {
    // Only tracked children can be observed here; `is_alive` already
    // answered for those.
    false
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sleeper() -> LaunchSpec {
        LaunchSpec::from_argv(vec!["sleep".into(), "30".into()], Vec::new(), false).unwrap()
    }

    #[tokio::test]
    async fn hangup_stops_a_child() {
        let supervisor = SystemSupervisor::new();
        let pid = supervisor.spawn(&sleeper()).await.unwrap();
        assert!(supervisor.is_alive(pid));

        supervisor.terminate(pid).unwrap();
        let mut waited = Duration::ZERO;
        while supervisor.is_alive(pid) && waited < Duration::from_secs(5) {
            tokio::time::sleep(Duration::from_millis(20)).await;
            waited += Duration::from_millis(20);
        }
        assert!(!supervisor.is_alive(pid));
        supervisor.reap(pid).await;
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let supervisor = SystemSupervisor::new();
        let spec = LaunchSpec::from_argv(
            vec!["/nonexistent/definitely-not-java".into()],
            Vec::new(),
            false,
        )
        .unwrap();
        assert!(matches!(
            supervisor.spawn(&spec).await,
            Err(WrapperError::Spawn { .. })
        ));
    }

    #[tokio::test]
    async fn env_is_passed_to_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("env.txt");
        let spec = LaunchSpec::from_argv(
            vec![
                "sh".into(),
                "-c".into(),
                format!("printf %s \"$WRAPPER_TEST\" > {}", out.display()),
            ],
            vec![("WRAPPER_TEST".into(), "hello".into())],
            false,
        )
        .unwrap();
        let supervisor = SystemSupervisor::new();
        let pid = supervisor.spawn(&spec).await.unwrap();
        supervisor.reap(pid).await;
        assert_eq!(std::fs::read_to_string(out).unwrap(), "hello");
    }

    #[test]
    fn unknown_pids_are_not_alive_and_terminate_quietly() {
        let supervisor = SystemSupervisor::new();
        // Above the default pid_max on Linux.
        let pid = 4_194_304 + 17;
        assert!(!supervisor.is_alive(pid));
        assert!(supervisor.terminate(pid).is_ok());
    }
}
