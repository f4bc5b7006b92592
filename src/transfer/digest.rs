//! Whole-file content checksum (base64 of the MD5 digest)

use crate::error::{Result, TransferError};
use base64::Engine;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

const READ_BUF: usize = 64 * 1024;

/// base64(MD5) of an in-memory buffer
pub fn base64_md5(data: &[u8]) -> String {
    encode(md5::compute(data))
}

/// base64(MD5) of a file, read from the start
pub async fn base64_md5_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .await
        .map_err(|e| TransferError::io(format!("open {}", path.display()), e))?;
    base64_md5_reader(&mut file)
        .await
        .map_err(|e| TransferError::io(format!("checksum {}", path.display()), e))
}

/// base64(MD5) of an already open file; rewinds to the start first
pub(crate) async fn base64_md5_reader(file: &mut File) -> std::io::Result<String> {
    file.seek(std::io::SeekFrom::Start(0)).await?;
    let mut ctx = md5::Context::new();
    let mut buf = vec![0u8; READ_BUF];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        ctx.consume(&buf[..n]);
    }
    Ok(encode(ctx.compute()))
}

fn encode(digest: md5::Digest) -> String {
    base64::engine::general_purpose::STANDARD.encode(digest.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_digest() {
        assert_eq!(base64_md5(b""), "1B2M2Y8AsgTpgAmY7PhCfg==");
    }

    #[tokio::test]
    async fn test_file_digest_matches_buffer_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        assert_eq!(base64_md5_file(&path).await.unwrap(), base64_md5(&data));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = base64_md5_file(&dir.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, TransferError::Io { .. }));
    }
}
