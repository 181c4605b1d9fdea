// ─── Process ───
// Spawning and signalling the service process, plus the liveness probe.
// Both sit behind traits so the lifecycle can be driven against spies.

pub mod probe;
pub mod supervisor;

pub use probe::{HealthProbe, TcpHttpProbe};
pub use supervisor::{ProcessSupervisor, SystemSupervisor};

use std::net::{Ipv4Addr, TcpListener};

use crate::core::error::{WrapperError, WrapperResult};

/// What to run: program, arguments and extra environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Share the caller's stdout/stderr instead of discarding output.
    pub inherit_output: bool,
}

impl LaunchSpec {
    /// Split a full argv into program and arguments.
    pub fn from_argv(
        argv: Vec<String>,
        env: Vec<(String, String)>,
        inherit_output: bool,
    ) -> WrapperResult<Self> {
        let mut argv = argv.into_iter();
        let program = argv
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| WrapperError::Other("Empty command line".into()))?;
        Ok(Self {
            program,
            args: argv.collect(),
            env,
            inherit_output,
        })
    }
}

/// Ask the OS for a currently free TCP port on the loopback interface.
///
/// The port is released before returning, so another process could still
/// grab it before the service binds.
pub fn random_open_port() -> WrapperResult<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    Ok(listener.local_addr()?.port())
}
