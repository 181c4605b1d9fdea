pub mod client;
pub mod progress;

pub use client::Downloader;
pub use progress::{DownloadProgress, LogProgress, ProgressObserver, SilentProgress};
