use tracing::{info, trace};

/// Snapshot handed to observers while a download streams.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DownloadProgress {
    pub url: String,
    pub bytes_downloaded: u64,
    /// `None` when the server did not send `Content-Length`.
    pub total_bytes: Option<u64>,
    pub file_name: String,
}

impl DownloadProgress {
    /// Completed share in `0.0..=1.0`, or `None` when the total is unknown
    /// or zero.
    pub fn fraction(&self) -> Option<f64> {
        match self.total_bytes {
            Some(total) if total > 0 => {
                Some((self.bytes_downloaded as f64 / total as f64).min(1.0))
            }
            _ => None,
        }
    }
}

pub trait ProgressObserver: Send + Sync {
    fn started(&self, _progress: &DownloadProgress) {}

    fn advanced(&self, progress: &DownloadProgress);

    fn finished(&self, _progress: &DownloadProgress) {}
}

/// Default observer: start and finish at `info`, every chunk at `trace`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn started(&self, progress: &DownloadProgress) {
        match progress.total_bytes {
            Some(total) => info!("Downloading {} ({} bytes)", progress.file_name, total),
            None => info!("Downloading {} (size unknown)", progress.file_name),
        }
    }

    fn advanced(&self, progress: &DownloadProgress) {
        match progress.fraction() {
            Some(fraction) => trace!("{}: {:.1}%", progress.file_name, fraction * 100.0),
            None => trace!("{}: {} bytes", progress.file_name, progress.bytes_downloaded),
        }
    }

    fn finished(&self, progress: &DownloadProgress) {
        info!(
            "Downloaded {} ({} bytes)",
            progress.file_name, progress.bytes_downloaded
        );
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressObserver for SilentProgress {
    fn advanced(&self, _progress: &DownloadProgress) {}
}
