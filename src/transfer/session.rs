//! One duplex connection driven by a reader task and a writer task
//!
//! The peer may answer and close while the body is still being written, so
//! the response has to be read concurrently with the upload:
//!
//! - the reader task parses responses off the read half, one bounded read
//!   at a time, and forwards every response it finds
//! - the writer task writes the request head and streams the file body
//! - both report failures on a shared error channel and watch a shared stop
//!   flag; the writer signals completion on a oneshot
//!
//! Teardown raises the stop flag, joins both tasks, reunites the halves and
//! shuts the socket down. Channel receivers live in the session and are only
//! dropped after the join.

use crate::config::TransferConfig;
use crate::error::{Result, TransferError};
use crate::transfer::progress::{percent_of, Progress};
use crate::transfer::response::{parse_response, ParsedResponse};
use bytes::{Bytes, BytesMut};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

/// Failure reported by one of the two tasks
#[derive(Debug)]
pub(crate) enum TaskError {
    Read(TransferError),
    Write(TransferError),
}

/// What the writer task sends
pub(crate) struct UploadBody {
    /// Serialized request line and headers, blank line included
    pub head: Bytes,
    /// Source file positioned at its start
    pub file: File,
    pub path: PathBuf,
    /// Exact number of body bytes announced in Content-Length
    pub size: u64,
    pub progress: Option<Progress>,
}

/// Result of one bounded read attempt
enum ReadOutcome {
    Data,
    Eof,
    /// Read deadline elapsed with nothing new; routine, try again
    DeadlineElapsed,
}

pub(crate) struct ConnectionSession {
    host: String,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<OwnedReadHalf>>,
    writer: Option<JoinHandle<OwnedWriteHalf>>,
    pub responses: mpsc::Receiver<ParsedResponse>,
    pub errors: mpsc::Receiver<TaskError>,
    pub write_done: oneshot::Receiver<()>,
}

impl ConnectionSession {
    /// Dial `host` and start both tasks
    pub async fn open(host: &str, settings: &TransferConfig, body: UploadBody) -> Result<Self> {
        let stream = match timeout(settings.connect_timeout(), TcpStream::connect(host)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(TransferError::network(format!("dial {}", host), e)),
            Err(_) => {
                return Err(TransferError::Timeout(format!(
                    "dial {} exceeded {:?}",
                    host,
                    settings.connect_timeout()
                )))
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(host = %host, error = %e, "set_nodelay failed");
        }
        debug!(host = %host, "connected");

        let (read_half, write_half) = stream.into_split();
        let stop = Arc::new(AtomicBool::new(false));
        // one error per task at most
        let (err_tx, errors) = mpsc::channel(2);
        let (resp_tx, responses) = mpsc::channel(4);
        let (done_tx, write_done) = oneshot::channel();

        let reader = tokio::spawn(read_loop(
            read_half,
            stop.clone(),
            settings.read_deadline(),
            resp_tx,
            err_tx.clone(),
        ));
        let writer = tokio::spawn(write_loop(
            write_half,
            body,
            WriterSettings::from(settings),
            stop.clone(),
            err_tx,
            done_tx,
        ));

        Ok(Self {
            host: host.to_string(),
            stop,
            reader: Some(reader),
            writer: Some(writer),
            responses,
            errors,
            write_done,
        })
    }

    /// Stop both tasks, wait for them, then close the socket
    pub async fn close(mut self) {
        self.stop.store(true, Ordering::Release);

        let read_half = match self.reader.take() {
            Some(handle) => handle.await.ok(),
            None => None,
        };
        let write_half = match self.writer.take() {
            Some(handle) => handle.await.ok(),
            None => None,
        };
        if read_half.is_none() || write_half.is_none() {
            warn!(host = %self.host, "transfer task ended abnormally");
        }

        if let (Some(read_half), Some(write_half)) = (read_half, write_half) {
            if let Ok(mut stream) = read_half.reunite(write_half) {
                let _ = stream.shutdown().await;
            }
        }
        debug!(host = %self.host, "connection closed");
        // receivers drop with `self`, after both tasks are gone
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        // a session dropped without close() still winds its tasks down
        self.stop.store(true, Ordering::Release);
    }
}

/// Deliver `item` unless the session is stopping or the receiver is gone.
///
/// Waits for channel capacity in slices of `patience` so a raised stop flag
/// is noticed even when nobody drains the channel anymore.
async fn forward<T>(tx: &mpsc::Sender<T>, item: T, stop: &AtomicBool, patience: Duration) -> bool {
    loop {
        if stop.load(Ordering::Acquire) {
            return false;
        }
        match timeout(patience, tx.reserve()).await {
            Ok(Ok(permit)) => {
                permit.send(item);
                return true;
            }
            Ok(Err(_)) => return false,
            Err(_) => continue,
        }
    }
}

async fn read_some(
    read_half: &mut OwnedReadHalf,
    buf: &mut BytesMut,
    deadline: Duration,
) -> std::io::Result<ReadOutcome> {
    if buf.capacity() - buf.len() < 4096 {
        buf.reserve(8192);
    }
    match timeout(deadline, read_half.read_buf(buf)).await {
        Err(_) => Ok(ReadOutcome::DeadlineElapsed),
        Ok(Ok(0)) => Ok(ReadOutcome::Eof),
        Ok(Ok(_)) => Ok(ReadOutcome::Data),
        Ok(Err(e)) => Err(e),
    }
}

async fn read_loop(
    mut read_half: OwnedReadHalf,
    stop: Arc<AtomicBool>,
    deadline: Duration,
    responses: mpsc::Sender<ParsedResponse>,
    errors: mpsc::Sender<TaskError>,
) -> OwnedReadHalf {
    let mut buf = BytesMut::with_capacity(8192);
    let mut eof = false;

    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }

        match parse_response(&mut buf, eof) {
            Ok(Some(response)) => {
                let terminal = !response.is_provisional();
                debug!(status = %response.status, "response received");
                if !forward(&responses, response, &stop, deadline).await || terminal {
                    break;
                }
                continue;
            }
            Ok(None) if eof => {
                let err = TransferError::network(
                    "read response",
                    std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed before a response arrived",
                    ),
                );
                forward(&errors, TaskError::Read(err), &stop, deadline).await;
                break;
            }
            Ok(None) => {}
            Err(e) => {
                forward(&errors, TaskError::Read(e), &stop, deadline).await;
                break;
            }
        }

        match read_some(&mut read_half, &mut buf, deadline).await {
            Ok(ReadOutcome::Data) => {}
            Ok(ReadOutcome::Eof) => eof = true,
            Ok(ReadOutcome::DeadlineElapsed) => trace!("read deadline elapsed, retrying"),
            Err(e) => {
                let err = TransferError::network("read response", e);
                forward(&errors, TaskError::Read(err), &stop, deadline).await;
                break;
            }
        }
    }

    read_half
}

#[derive(Clone, Copy)]
struct WriterSettings {
    write_deadline: Duration,
    progress_interval: Duration,
    chunk_size: usize,
}

impl From<&TransferConfig> for WriterSettings {
    fn from(settings: &TransferConfig) -> Self {
        Self {
            write_deadline: settings.write_deadline(),
            progress_interval: settings.progress_interval(),
            chunk_size: settings.chunk_size(),
        }
    }
}

async fn write_loop(
    mut write_half: OwnedWriteHalf,
    body: UploadBody,
    settings: WriterSettings,
    stop: Arc<AtomicBool>,
    errors: mpsc::Sender<TaskError>,
    done: oneshot::Sender<()>,
) -> OwnedWriteHalf {
    match send_request(&mut write_half, body, settings, &stop).await {
        Ok(true) => {
            let _ = done.send(());
        }
        Ok(false) => debug!("upload stopped before the body was complete"),
        Err(e) => {
            forward(&errors, TaskError::Write(e), &stop, settings.write_deadline).await;
        }
    }
    write_half
}

/// Write head, body and trailing CRLF. `Ok(false)` when stopped early.
async fn send_request(
    write_half: &mut OwnedWriteHalf,
    mut body: UploadBody,
    settings: WriterSettings,
    stop: &AtomicBool,
) -> Result<bool> {
    let deadline = settings.write_deadline;
    write_with_deadline(write_half, &body.head, deadline, "write request header").await?;

    let mut chunk = vec![0u8; settings.chunk_size];
    let mut written: u64 = 0;
    let mut last_update: Option<Instant> = None;

    while written < body.size {
        if stop.load(Ordering::Acquire) {
            return Ok(false);
        }

        let want = (body.size - written).min(chunk.len() as u64) as usize;
        let n = body
            .file
            .read(&mut chunk[..want])
            .await
            .map_err(|e| TransferError::io(format!("read {}", body.path.display()), e))?;
        if n == 0 {
            return Err(TransferError::io(
                format!("read {}", body.path.display()),
                std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("file shrank to {} of {} bytes", written, body.size),
                ),
            ));
        }

        write_with_deadline(write_half, &chunk[..n], deadline, "send body").await?;
        written += n as u64;

        if let Some(progress) = &body.progress {
            let due = last_update.map_or(true, |t| t.elapsed() >= settings.progress_interval);
            if due {
                progress.advance(percent_of(written, body.size));
                last_update = Some(Instant::now());
            }
        }
    }

    write_with_deadline(write_half, b"\r\n", deadline, "send body").await?;
    if let Some(progress) = &body.progress {
        progress.complete();
    }
    debug!(bytes = written, "request body written");
    Ok(true)
}

async fn write_with_deadline(
    write_half: &mut OwnedWriteHalf,
    data: &[u8],
    deadline: Duration,
    what: &str,
) -> Result<()> {
    match timeout(deadline, write_half.write_all(data)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(TransferError::network(what, e)),
        Err(_) => Err(TransferError::Timeout(format!("{} exceeded {:?}", what, deadline))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_forward_delivers() {
        let (tx, mut rx) = mpsc::channel(1);
        let stop = AtomicBool::new(false);
        assert!(forward(&tx, 7u32, &stop, Duration::from_millis(10)).await);
        assert_eq!(rx.recv().await, Some(7));
    }

    #[tokio::test]
    async fn test_forward_gives_up_on_stop_when_full() {
        let (tx, _rx) = mpsc::channel(1);
        let stop = Arc::new(AtomicBool::new(false));
        tx.send(1u32).await.unwrap();

        let flag = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::Release);
        });
        assert!(!forward(&tx, 2u32, &stop, Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_forward_receiver_gone() {
        let (tx, rx) = mpsc::channel::<u32>(1);
        drop(rx);
        let stop = AtomicBool::new(false);
        assert!(!forward(&tx, 1, &stop, Duration::from_millis(10)).await);
    }
}
