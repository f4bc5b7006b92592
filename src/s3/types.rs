//! Request and result types of the object operations

use crate::transfer::Progress;
use hyper::StatusCode;
use std::path::PathBuf;

/// Shareable link options attached to an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlOptions {
    /// Carry a query-string signature
    pub signed: bool,
    /// Link lifetime in seconds (signed links only)
    pub expires_in: i64,
}

/// Upload of one local file as one object
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub bucket: String,
    pub key: String,
    pub path: PathBuf,
    /// Generate a download link once the object is stored
    pub url: Option<UrlOptions>,
    pub progress_enabled: bool,
    progress: Progress,
}

impl TransferRequest {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            path: path.into(),
            url: None,
            progress_enabled: false,
            progress: Progress::new(),
        }
    }

    /// Return a download link in the result, signed and valid for
    /// `expires_in` seconds when `signed` is set
    pub fn with_download_url(mut self, signed: bool, expires_in: i64) -> Self {
        self.url = Some(UrlOptions { signed, expires_in });
        self
    }

    pub fn without_download_url(mut self) -> Self {
        self.url = None;
        self
    }

    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress_enabled = enabled;
        self
    }

    /// Handle on the progress of this request; clone it before starting the
    /// transfer to poll from another task or thread
    pub fn progress(&self) -> &Progress {
        &self.progress
    }
}

/// Successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutput {
    pub status: StatusCode,
    /// Entity tag without surrounding quotes
    pub etag: String,
    /// base64(MD5) sent as Content-MD5
    pub checksum: String,
    pub download_url: Option<String>,
}

/// Where a download reads from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectSource {
    /// Object addressed by name; requests are signed
    Named { bucket: String, key: String },
    /// Full URL, typically a shareable link; requests are not signed
    Url(String),
}

/// Download of one object into a local file
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub source: ObjectSource,
    pub save_path: PathBuf,
    /// base64(MD5) the saved file must match
    pub expected_md5: Option<String>,
    pub progress_enabled: bool,
    progress: Progress,
}

impl DownloadRequest {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, save_path: impl Into<PathBuf>) -> Self {
        Self::from_source(
            ObjectSource::Named {
                bucket: bucket.into(),
                key: key.into(),
            },
            save_path.into(),
        )
    }

    pub fn by_url(url: impl Into<String>, save_path: impl Into<PathBuf>) -> Self {
        Self::from_source(ObjectSource::Url(url.into()), save_path.into())
    }

    fn from_source(source: ObjectSource, save_path: PathBuf) -> Self {
        Self {
            source,
            save_path,
            expected_md5: None,
            progress_enabled: false,
            progress: Progress::new(),
        }
    }

    pub fn with_base64_md5(mut self, md5: impl Into<String>) -> Self {
        self.expected_md5 = Some(md5.into());
        self
    }

    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress_enabled = enabled;
        self
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }
}

/// Successful download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutput {
    pub size: u64,
    pub etag: Option<String>,
    pub path: PathBuf,
}

/// Object metadata from a HEAD request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub size: u64,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}
