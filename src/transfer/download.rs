//! Safe persistence of a downloaded object body
//!
//! The body goes to `<path>.download` first. Only when the byte count and the
//! optional checksum check out is the temp file renamed over `path`; on any
//! failure it is removed and whatever was at `path` before stays untouched.

use crate::error::{Result, TransferError};
use crate::transfer::digest::base64_md5_reader;
use crate::transfer::progress::{percent_of, Progress};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const TEMP_SUFFIX: &str = ".download";

/// Checks applied to a saved body
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Exact number of bytes the body must have
    pub expected_size: Option<u64>,
    /// base64(MD5) the saved file must match
    pub expected_md5: Option<String>,
    /// Updated from the temp file size while copying, 100 once saved
    pub progress: Option<Progress>,
    pub poll_interval: Duration,
}

/// `<path>.download`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Stream `body` into `path` atomically. Returns the number of bytes saved.
pub async fn save_to_file<S>(path: &Path, body: S, options: &SaveOptions) -> Result<u64>
where
    S: Stream<Item = std::io::Result<Bytes>> + Unpin,
{
    let tmp = temp_path(path);
    if let Some(progress) = &options.progress {
        progress.reset();
    }

    let saved = match write_verified(&tmp, body, options).await {
        Ok(written) => tokio::fs::rename(&tmp, path)
            .await
            .map(|()| written)
            .map_err(|e| {
                TransferError::io(format!("rename {} to {}", tmp.display(), path.display()), e)
            }),
        Err(e) => Err(e),
    };

    match saved {
        Ok(written) => {
            if let Some(progress) = &options.progress {
                progress.complete();
            }
            debug!(path = %path.display(), bytes = written, "object saved");
            Ok(written)
        }
        Err(e) => {
            remove_temp(&tmp).await;
            Err(e)
        }
    }
}

async fn write_verified<S>(tmp: &Path, body: S, options: &SaveOptions) -> Result<u64>
where
    S: Stream<Item = std::io::Result<Bytes>> + Unpin,
{
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(tmp)
        .await
        .map_err(|e| TransferError::io(format!("open {}", tmp.display()), e))?;

    let poller = match (&options.progress, options.expected_size) {
        (Some(progress), Some(total)) if total > 0 => Some(SizePoller::spawn(
            tmp.to_path_buf(),
            total,
            progress.clone(),
            options.poll_interval,
        )),
        _ => None,
    };
    let copied = copy_body(&mut file, tmp, body).await;
    if let Some(poller) = poller {
        poller.stop().await;
    }
    let written = copied?;

    if let Some(expected) = options.expected_size {
        if written != expected {
            return Err(TransferError::Integrity(format!(
                "lost data while saving: {} bytes written, {} expected",
                written, expected
            )));
        }
    }

    file.sync_all()
        .await
        .map_err(|e| TransferError::io(format!("sync {}", tmp.display()), e))?;

    if let Some(expected) = &options.expected_md5 {
        let actual = base64_md5_reader(&mut file)
            .await
            .map_err(|e| TransferError::io(format!("checksum {}", tmp.display()), e))?;
        if &actual != expected {
            return Err(TransferError::Integrity(format!(
                "checksum mismatch: expected {}, got {}",
                expected, actual
            )));
        }
    }

    Ok(written)
}

async fn copy_body<S>(file: &mut File, tmp: &Path, mut body: S) -> Result<u64>
where
    S: Stream<Item = std::io::Result<Bytes>> + Unpin,
{
    let mut written: u64 = 0;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| TransferError::network("read response body", e))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| TransferError::io(format!("write {}", tmp.display()), e))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| TransferError::io(format!("write {}", tmp.display()), e))?;
    Ok(written)
}

async fn remove_temp(tmp: &Path) {
    match tokio::fs::remove_file(tmp).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %tmp.display(), error = %e, "failed to remove temp file"),
    }
}

/// Reports progress from the temp file's size on disk
struct SizePoller {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl SizePoller {
    fn spawn(tmp: PathBuf, total: u64, progress: Progress, interval: Duration) -> Self {
        let (stop, mut stopped) = oneshot::channel();
        let interval = interval.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // first tick fires immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        if let Ok(meta) = tokio::fs::metadata(&tmp).await {
                            progress.advance(percent_of(meta.len(), total));
                        }
                    }
                }
            }
        });
        Self { stop, handle }
    }

    async fn stop(self) {
        let _ = self.stop.send(());
        let _ = self.handle.await;
    }
}
