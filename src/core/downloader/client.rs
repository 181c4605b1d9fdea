use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::progress::{DownloadProgress, LogProgress, ProgressObserver};
use crate::core::error::{WrapperError, WrapperResult};
use crate::core::http::build_http_client;

/// Streams remote resources to disk, reporting progress as it goes.
///
/// No retries: a failed fetch leaves nothing at the destination and the
/// caller decides whether to try again.
pub struct Downloader {
    client: Client,
    observer: Arc<dyn ProgressObserver>,
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader").finish_non_exhaustive()
    }
}

impl Downloader {
    pub fn new() -> WrapperResult<Self> {
        Self::with_observer(Arc::new(LogProgress))
    }

    pub fn with_observer(observer: Arc<dyn ProgressObserver>) -> WrapperResult<Self> {
        Ok(Self {
            client: build_http_client()?,
            observer,
        })
    }

    /// Download `url` to `dest`.
    ///
    /// Bytes land in `<dest>.part` first and are renamed into place once the
    /// body is complete, so `dest` only ever holds a whole response.
    pub async fn fetch(&self, url: &str, dest: &Path) -> WrapperResult<()> {
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(WrapperError::io(parent))?;
        }

        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WrapperError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut progress = DownloadProgress {
            url: url.to_string(),
            bytes_downloaded: 0,
            total_bytes: response.content_length(),
            file_name: dest
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        };
        self.observer.started(&progress);

        let partial = partial_path(dest)?;
        if let Err(err) = self.stream_to(response, &partial, &mut progress).await {
            if let Err(e) = tokio::fs::remove_file(&partial).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Could not remove partial download {:?}: {}", partial, e);
                }
            }
            return Err(err);
        }

        tokio::fs::rename(&partial, dest)
            .await
            .map_err(WrapperError::io(dest))?;

        self.observer.finished(&progress);
        debug!("Downloaded: {} -> {:?}", url, dest);
        Ok(())
    }

    async fn stream_to(
        &self,
        response: reqwest::Response,
        partial: &Path,
        progress: &mut DownloadProgress,
    ) -> WrapperResult<()> {
        let mut file = tokio::fs::File::create(partial)
            .await
            .map_err(WrapperError::io(partial))?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(WrapperError::io(partial))?;
            progress.bytes_downloaded = progress.bytes_downloaded.saturating_add(chunk.len() as u64);
            self.observer.advanced(progress);
        }

        file.flush().await.map_err(WrapperError::io(partial))?;
        Ok(())
    }
}

fn partial_path(dest: &Path) -> WrapperResult<PathBuf> {
    let name = dest
        .file_name()
        .ok_or_else(|| WrapperError::Other(format!("Download target {dest:?} has no file name")))?;
    let mut partial = name.to_os_string();
    partial.push(".part");
    Ok(dest.with_file_name(partial))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::{Route, TestServer};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(u64, Option<u64>)>>,
    }

    impl ProgressObserver for Recorder {
        fn advanced(&self, progress: &DownloadProgress) {
            self.events
                .lock()
                .unwrap()
                .push((progress.bytes_downloaded, progress.total_bytes));
        }
    }

    #[tokio::test]
    async fn fetch_writes_body_and_reports_progress() {
        let server = TestServer::start(vec![("/a.jar", Route::ok("jar bytes"))]).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested").join("a.jar");
        let recorder = Arc::new(Recorder::default());

        Downloader::with_observer(recorder.clone())
            .unwrap()
            .fetch(&server.url("/a.jar"), &dest)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"jar bytes");
        assert!(!dir.path().join("nested").join("a.jar.part").exists());
        let events = recorder.events.lock().unwrap();
        assert_eq!(events.last(), Some(&(9, Some(9))));
    }

    #[tokio::test]
    async fn unknown_length_is_tolerated() {
        let server =
            TestServer::start(vec![("/a.jar", Route::ok("streamed").without_length())]).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.jar");
        let recorder = Arc::new(Recorder::default());

        Downloader::with_observer(recorder.clone())
            .unwrap()
            .fetch(&server.url("/a.jar"), &dest)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"streamed");
        let events = recorder.events.lock().unwrap();
        assert!(events.iter().all(|(_, total)| total.is_none()));
    }

    #[tokio::test]
    async fn non_success_status_is_a_download_failure() {
        let server = TestServer::start(vec![("/gone", Route::status(404))]).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("gone.jar");

        let err = Downloader::new()
            .unwrap()
            .fetch(&server.url("/gone"), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, WrapperError::DownloadFailed { status: 404, .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn refused_connection_is_a_download_failure() {
        let port = crate::core::process::random_open_port().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = Downloader::new()
            .unwrap()
            .fetch(&format!("http://127.0.0.1:{port}/a.jar"), &dir.path().join("a.jar"))
            .await
            .unwrap_err();
        assert!(matches!(err, WrapperError::Http(_)));
    }

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/tmp/fcrepo.jar")).unwrap(),
            PathBuf::from("/tmp/fcrepo.jar.part")
        );
        assert!(partial_path(Path::new("/")).is_err());
    }
}
