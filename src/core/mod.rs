// ─── fcrepo_wrapper core ───
// Lifecycle engine for a locally managed Fedora Commons repository.
//
// Architecture:
//   core/
//     options/   : Flat option mapping + layered YAML config files
//     service/   : Service profiles (artifact URL, port, JVM flags)
//     instance/  : Resolved config + ManagedInstance state machine
//     downloader/: Streaming HTTP downloads with progress observers
//     checksum/  : Expected vs. computed artifact digests
//     process/   : Spawn / signal / reap + TCP/HTTP liveness probe

pub mod checksum;
pub mod downloader;
pub mod error;
pub mod http;
pub mod instance;
pub mod options;
pub mod process;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;
