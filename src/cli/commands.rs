use crate::cli::args::{is_url, parse_object_path};
use crate::s3::{Client, DownloadRequest, ObjectSource, TransferRequest, UrlOptions};
use crate::transfer::Progress;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Upload command
pub async fn cmd_put(
    client: &Client,
    file: &str,
    dest: &str,
    url: Option<UrlOptions>,
    progress: bool,
) -> Result<()> {
    let (bucket, key) = parse_object_path(dest)?;
    let local_path = Path::new(file);

    let mut request = TransferRequest::new(&bucket, &key, local_path).with_progress(progress);
    if let Some(options) = url {
        request = request.with_download_url(options.signed, options.expires_in);
    }

    println!("{} -> s3://{}/{}", local_path.display(), bucket, key);

    let watcher = progress
        .then(|| ProgressWatcher::start(request.progress().clone(), "Uploading"))
        .transpose()?;
    let result = client.put_object(&request).await;
    if let Some(watcher) = watcher {
        watcher.finish(result.is_ok(), "Upload complete").await;
    }
    let output = result.with_context(|| format!("Failed to upload {}", local_path.display()))?;

    println!("ETag: {}", output.etag);
    println!("Content-MD5: {}", output.checksum);
    if let Some(url) = output.download_url {
        println!("URL: {}", url);
    }
    Ok(())
}

/// Download by bucket and key
pub async fn cmd_get(
    client: &Client,
    source: &str,
    file: &str,
    md5: Option<String>,
    progress: bool,
) -> Result<()> {
    let (bucket, key) = parse_object_path(source)?;
    println!("s3://{}/{} -> {}", bucket, key, file);
    download(client, DownloadRequest::new(bucket, key, file), md5, progress).await
}

/// Download by URL
pub async fn cmd_fetch(
    client: &Client,
    url: &str,
    file: &str,
    md5: Option<String>,
    progress: bool,
) -> Result<()> {
    if !is_url(url) {
        anyhow::bail!("Expected an http:// URL, got '{}'", url);
    }
    println!("{} -> {}", url, file);
    download(client, DownloadRequest::by_url(url, file), md5, progress).await
}

async fn download(
    client: &Client,
    request: DownloadRequest,
    md5: Option<String>,
    progress: bool,
) -> Result<()> {
    let mut request = request.with_progress(progress);
    if let Some(md5) = md5 {
        request = request.with_base64_md5(md5);
    }

    if let Some(parent) = request.save_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let watcher = progress
        .then(|| ProgressWatcher::start(request.progress().clone(), "Downloading"))
        .transpose()?;
    let result = client.get_object(&request).await;
    if let Some(watcher) = watcher {
        watcher.finish(result.is_ok(), "Download complete").await;
    }
    let output = result.with_context(|| format!("Failed to download into {}", request.save_path.display()))?;

    println!("  {} downloaded", format_bytes(output.size));
    Ok(())
}

/// Object info command
pub async fn cmd_stat(client: &Client, path: &str) -> Result<()> {
    let source = if is_url(path) {
        ObjectSource::Url(path.trim().to_string())
    } else {
        let (bucket, key) = parse_object_path(path)?;
        ObjectSource::Named { bucket, key }
    };

    let info = client
        .stat_object(&source)
        .await
        .with_context(|| format!("Failed to stat {}", path))?;

    println!("Object: {}", path);
    println!("Size: {} ({})", format_bytes(info.size), info.size);
    println!("Last Modified: {}", info.last_modified.as_deref().unwrap_or("Unknown"));
    if let Some(ref etag) = info.etag {
        println!("ETag: {}", etag);
    }
    Ok(())
}

/// Download link command
pub fn cmd_url(client: &Client, path: &str, signed: bool, expires: i64) -> Result<()> {
    let (bucket, key) = parse_object_path(path)?;
    if signed && expires <= 0 {
        anyhow::bail!("Link lifetime must be positive, got {}", expires);
    }
    let url = client.download_url(
        &bucket,
        &key,
        UrlOptions {
            signed,
            expires_in: expires,
        },
    );
    println!("{}", url);
    Ok(())
}

/// Mirrors a [`Progress`] handle onto a terminal progress bar
struct ProgressWatcher {
    bar: ProgressBar,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl ProgressWatcher {
    const REFRESH: Duration = Duration::from_millis(200);

    fn start(progress: Progress, message: &str) -> Result<Self> {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}% {msg}")?
                .progress_chars("=>-"),
        );
        bar.set_message(message.to_string());

        let (stop, mut stopped) = oneshot::channel();
        let shown = bar.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Self::REFRESH);
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => shown.set_position(progress.get() as u64),
                }
            }
        });

        Ok(Self { bar, stop, handle })
    }

    async fn finish(self, success: bool, message: &str) {
        let _ = self.stop.send(());
        let _ = self.handle.await;
        if success {
            self.bar.set_position(100);
            self.bar.finish_with_message(message.to_string());
        } else {
            self.bar.abandon();
        }
    }
}

/// Format bytes in human-readable form (B, KB, MB, GB, TB)
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f64 = bytes as f64;
    let exponent = (bytes_f64.ln() / 1024_f64.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);

    let value = bytes_f64 / 1024_f64.powi(exponent as i32);

    if exponent == 0 {
        format!("{} {}", bytes, UNITS[exponent])
    } else {
        format!("{:.2} {}", value, UNITS[exponent])
    }
}
