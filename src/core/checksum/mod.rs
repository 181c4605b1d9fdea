// ─── Checksum ───
// Expected digest (explicit or from the remote checksum file) versus the
// digest of the downloaded artifact.

use std::io::Read;
use std::path::{Path, PathBuf};

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::core::downloader::Downloader;
use crate::core::error::{WrapperError, WrapperResult};
use crate::core::instance::InstanceConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Md5,
    Sha1,
    Sha256,
}

impl ChecksumAlgorithm {
    /// Pick the algorithm from the checksum file's extension; MD5 otherwise.
    pub fn from_url(url: &str) -> Self {
        let lower = url.to_ascii_lowercase();
        if lower.ends_with(".sha256") {
            ChecksumAlgorithm::Sha256
        } else if lower.ends_with(".sha1") {
            ChecksumAlgorithm::Sha1
        } else {
            ChecksumAlgorithm::Md5
        }
    }

    /// Infer from the length of a hex digest, falling back to the URL.
    pub fn detect(expected: &str, url: &str) -> Self {
        match expected.len() {
            32 => ChecksumAlgorithm::Md5,
            40 => ChecksumAlgorithm::Sha1,
            64 => ChecksumAlgorithm::Sha256,
            _ => Self::from_url(url),
        }
    }
}

impl std::fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChecksumAlgorithm::Md5 => write!(f, "md5"),
            ChecksumAlgorithm::Sha1 => write!(f, "sha1"),
            ChecksumAlgorithm::Sha256 => write!(f, "sha256"),
        }
    }
}

/// Lowercase hex digest of a file, read in chunks.
pub fn digest_file(path: &Path, algorithm: ChecksumAlgorithm) -> WrapperResult<String> {
    let file = std::fs::File::open(path).map_err(WrapperError::io(path))?;
    let digest = match algorithm {
        ChecksumAlgorithm::Md5 => hash_reader::<Md5>(file),
        ChecksumAlgorithm::Sha1 => hash_reader::<Sha1>(file),
        ChecksumAlgorithm::Sha256 => hash_reader::<Sha256>(file),
    };
    digest.map_err(WrapperError::io(path))
}

fn hash_reader<D: Digest>(mut reader: impl Read) -> std::io::Result<String> {
    let mut hasher = D::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// First whitespace-delimited token of a checksum file.
pub fn parse_checksum_file(contents: &str) -> Option<String> {
    contents.split_whitespace().next().map(str::to_string)
}

pub struct ChecksumVerifier<'a> {
    config: &'a InstanceConfig,
    downloader: &'a Downloader,
}

impl<'a> ChecksumVerifier<'a> {
    pub fn new(config: &'a InstanceConfig, downloader: &'a Downloader) -> Self {
        Self { config, downloader }
    }

    /// The configured checksum, else the first token of the remote
    /// checksum file.
    pub async fn expected_checksum(&self) -> WrapperResult<String> {
        if let Some(sum) = self.config.expected_checksum() {
            return Ok(sum.trim().to_string());
        }

        let path = self.checksum_file().await?;
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(WrapperError::io(&path))?;
        parse_checksum_file(&contents).ok_or(WrapperError::EmptyChecksumFile(path))
    }

    /// Local copy of the checksum file, fetched once and then reused.
    pub async fn checksum_file(&self) -> WrapperResult<PathBuf> {
        let path = self.config.checksum_path().to_path_buf();
        if !path.exists() {
            debug!("Fetching checksum file {}", self.config.checksum_url());
            self.downloader
                .fetch(self.config.checksum_url(), &path)
                .await?;
        }
        Ok(path)
    }

    /// Digest `path` with the algorithm `expected` implies, off the runtime.
    pub async fn actual_checksum(&self, path: &Path, expected: &str) -> WrapperResult<String> {
        let algorithm = ChecksumAlgorithm::detect(expected, self.config.checksum_url());
        let target = path.to_path_buf();
        let actual = tokio::task::spawn_blocking(move || digest_file(&target, algorithm))
            .await
            .map_err(|e| WrapperError::Other(format!("Task join error: {e}")))??;
        debug!("{} of {:?}: {}", algorithm, path, actual);
        Ok(actual)
    }

    /// Digest `path` and compare with `expected`, ignoring case.
    pub async fn matches(&self, path: &Path, expected: &str) -> WrapperResult<bool> {
        let actual = self.actual_checksum(path, expected).await?;
        Ok(actual.eq_ignore_ascii_case(expected))
    }

    /// Always true when validation is turned off.
    pub async fn is_valid(&self, path: &Path) -> WrapperResult<bool> {
        if !self.config.validate_checksum() {
            return Ok(true);
        }
        let expected = self.expected_checksum().await?;
        self.matches(path, &expected).await
    }

    /// Fail with `ChecksumMismatch` unless the file verifies or mismatches
    /// are configured to be ignored.
    pub async fn enforce(&self, path: &Path) -> WrapperResult<()> {
        if !self.config.validate_checksum() {
            return Ok(());
        }

        let expected = self.expected_checksum().await?;
        let actual = self.actual_checksum(path, &expected).await?;
        if actual.eq_ignore_ascii_case(&expected) {
            info!("Checksum verified for {:?}", path);
            return Ok(());
        }

        if self.config.ignore_checksum_mismatch() {
            debug!("Ignoring checksum mismatch for {:?}", path);
            return Ok(());
        }

        Err(WrapperError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected,
            actual,
        })
    }

    /// Drop the cached checksum file.
    pub async fn clean(&self) {
        let path = self.config.checksum_path();
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!("Removed {:?}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {:?}: {}", path, e),
        }
    }
}
