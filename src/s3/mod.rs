//! S3 client module with AWS signature v2 signing
//!
//! This module provides:
//! - AWS Signature Version 2 signing (header and query-string forms)
//! - Object upload, download and HEAD against one gateway
//! - Shareable download links

pub mod client;
pub mod rest;
pub mod signer;
pub mod types;
pub mod url;

// Re-export main types for convenience
pub use client::Client;
pub use signer::{S3SignerV2, SignatureContext};
pub use types::{
    DownloadOutput, DownloadRequest, ObjectInfo, ObjectSource, TransferRequest, UploadOutput,
    UrlOptions,
};
pub use url::{download_url, object_url, presigned_url};
