//! Object upload over a hand-framed HTTP/1.1 PUT
//!
//! The request is written straight onto a TCP stream instead of going
//! through an HTTP client, because the socket must stay readable while the
//! body is still being sent (see [`crate::transfer::session`]).

use crate::config::{Profile, TransferConfig};
use crate::error::{Result, TransferError};
use crate::s3::signer::{http_date, S3SignerV2};
use crate::s3::types::{TransferRequest, UploadOutput};
use crate::s3::url::{download_url, request_target, resource_path};
use crate::transfer::digest::base64_md5_reader;
use crate::transfer::response::ParsedResponse;
use crate::transfer::session::{ConnectionSession, TaskError, UploadBody};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use hyper::header::{HeaderMap, HeaderValue};
use hyper::StatusCode;
use std::fmt::Write as FmtWrite;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncSeekExt;
use tokio::time::Instant;
use tracing::{debug, info};

pub const USER_AGENT: &str = concat!("s3xfer/", env!("CARGO_PKG_VERSION"));
pub const UPLOAD_CONTENT_TYPE: &str = "binary/octet-stream";

/// Stand-in for "no deadline yet" before the body is fully written
const UNBOUNDED_WAIT: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Upload `request.path` as `request.bucket/request.key`.
///
/// Returns once the endpoint has given a final answer and both connection
/// tasks have stopped. A non-200 final status becomes
/// [`TransferError::Protocol`] carrying the response body.
pub async fn put_object(
    profile: &Profile,
    settings: &TransferConfig,
    request: &TransferRequest,
) -> Result<UploadOutput> {
    profile.validate().await?;

    let progress = request.progress_enabled.then(|| request.progress().clone());
    if let Some(progress) = &progress {
        progress.reset();
    }

    let path = &request.path;
    let mut file = File::open(path)
        .await
        .map_err(|e| TransferError::io(format!("open {}", path.display()), e))?;
    let size = file
        .metadata()
        .await
        .map_err(|e| TransferError::io(format!("stat {}", path.display()), e))?
        .len();
    let checksum = base64_md5_reader(&mut file)
        .await
        .map_err(|e| TransferError::io(format!("checksum {}", path.display()), e))?;
    file.seek(std::io::SeekFrom::Start(0))
        .await
        .map_err(|e| TransferError::io(format!("seek {}", path.display()), e))?;

    let head = request_head(profile, request, size, &checksum, Utc::now());

    info!(
        bucket = %request.bucket,
        key = %request.key,
        size = size,
        host = %profile.host,
        "upload started"
    );
    let started = std::time::Instant::now();

    let body = UploadBody {
        head,
        file,
        path: path.clone(),
        size,
        progress,
    };
    let mut session = ConnectionSession::open(&profile.host, settings, body).await?;
    let outcome = await_final_response(&mut session, settings).await;
    session.close().await;

    let response = outcome?;
    if response.status != StatusCode::OK {
        return Err(TransferError::Protocol {
            status: response.status,
            message: response.body_text(),
        });
    }

    let download_url = request
        .url
        .map(|options| download_url(profile, &request.bucket, &request.key, options));
    let output = UploadOutput {
        status: response.status,
        etag: response.etag().unwrap_or_default(),
        checksum,
        download_url,
    };

    info!(
        bucket = %request.bucket,
        key = %request.key,
        etag = %output.etag,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "upload complete"
    );
    Ok(output)
}

/// Wait for the first final response, a task failure, or the deadline.
///
/// The deadline is effectively unbounded while the body is being written
/// and becomes `final_wait` once the writer reports completion. A writer
/// failure only gets one read deadline of grace: the peer may already have
/// answered before dropping the connection, and that answer wins.
async fn await_final_response(
    session: &mut ConnectionSession,
    settings: &TransferConfig,
) -> Result<ParsedResponse> {
    let timer = tokio::time::sleep(UNBOUNDED_WAIT);
    tokio::pin!(timer);

    let mut write_done = false;
    let mut write_error: Option<TransferError> = None;

    loop {
        tokio::select! {
            biased;

            Some(response) = session.responses.recv() => {
                if response.is_provisional() {
                    debug!(status = %response.status, "provisional response, waiting");
                    continue;
                }
                return Ok(response);
            }

            Some(failure) = session.errors.recv() => match failure {
                TaskError::Read(e) => return Err(write_error.unwrap_or(e)),
                TaskError::Write(e) => {
                    debug!(error = %e, "body write failed, waiting briefly for a response");
                    write_error = Some(e);
                    timer.as_mut().reset(Instant::now() + settings.read_deadline());
                }
            },

            done = &mut session.write_done, if !write_done => {
                write_done = true;
                match done {
                    Ok(()) => {
                        debug!(final_wait_ms = settings.final_wait_ms, "body sent, awaiting response");
                        timer.as_mut().reset(Instant::now() + settings.final_wait());
                    }
                    Err(_) if write_error.is_some() => {}
                    Err(_) => {
                        return Err(TransferError::network(
                            "send body",
                            std::io::Error::other("writer task exited unexpectedly"),
                        ));
                    }
                }
            }

            () = &mut timer => {
                return Err(write_error.unwrap_or_else(|| {
                    TransferError::Timeout(format!(
                        "no response within {:?} after the body was sent",
                        settings.final_wait()
                    ))
                }));
            }
        }
    }
}

/// Serialize the request line and headers, including the blank line
fn request_head(
    profile: &Profile,
    request: &TransferRequest,
    size: u64,
    checksum: &str,
    now: DateTime<Utc>,
) -> Bytes {
    let date = http_date(now);

    let mut signed = HeaderMap::new();
    signed.insert("date", header_value(&date));
    signed.insert("content-type", HeaderValue::from_static(UPLOAD_CONTENT_TYPE));
    signed.insert("content-md5", header_value(checksum));

    let signer = S3SignerV2::new(profile.access_key.clone(), profile.secret_key.clone());
    let authorization = signer.authorization(
        "PUT",
        &signed,
        &resource_path(&request.bucket, &request.key),
        "",
    );

    let mut head = String::with_capacity(512);
    let _ = write!(
        head,
        "PUT {} HTTP/1.1\r\n",
        request_target(&request.bucket, &request.key)
    );
    let _ = write!(head, "Host: {}\r\n", profile.host);
    let _ = write!(head, "User-Agent: {}\r\n", USER_AGENT);
    head.push_str("Accept-Encoding: identity\r\n");
    let _ = write!(head, "Content-Type: {}\r\n", UPLOAD_CONTENT_TYPE);
    let _ = write!(head, "Content-Length: {}\r\n", size);
    let _ = write!(head, "Content-MD5: {}\r\n", checksum);
    let _ = write!(head, "Date: {}\r\n", date);
    let _ = write!(head, "Authorization: {}\r\n", authorization);
    head.push_str("\r\n");

    Bytes::from(head)
}

fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::signer::signature;

    #[test]
    fn test_request_head_layout() {
        let profile = Profile::new("ceph1:7480", "AKID", "secret");
        let request = TransferRequest::new("bucket", "dir/my file.bin", "/tmp/x");
        let now = DateTime::from_timestamp(1_175_030_145, 0).unwrap();
        let head = request_head(&profile, &request, 42, "1B2M2Y8AsgTpgAmY7PhCfg==", now);
        let text = std::str::from_utf8(&head).unwrap();

        let mut signed = HeaderMap::new();
        signed.insert("date", HeaderValue::from_static("Tue, 27 Mar 2007 21:15:45 GMT"));
        signed.insert("content-type", HeaderValue::from_static("binary/octet-stream"));
        signed.insert("content-md5", HeaderValue::from_static("1B2M2Y8AsgTpgAmY7PhCfg=="));
        let sig = signature("secret", "PUT", &signed, "/bucket/dir/my file.bin", "");

        let expected = format!(
            "PUT /bucket/dir/my%20file.bin HTTP/1.1\r\n\
             Host: ceph1:7480\r\n\
             User-Agent: {}\r\n\
             Accept-Encoding: identity\r\n\
             Content-Type: binary/octet-stream\r\n\
             Content-Length: 42\r\n\
             Content-MD5: 1B2M2Y8AsgTpgAmY7PhCfg==\r\n\
             Date: Tue, 27 Mar 2007 21:15:45 GMT\r\n\
             Authorization: AWS AKID:{}\r\n\
             \r\n",
            USER_AGENT, sig
        );
        assert_eq!(text, expected);
    }
}
