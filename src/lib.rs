//! s3xfer - single-object transfers against S3-compatible gateways

pub mod cli;
pub mod config;
pub mod error;
pub mod s3;
pub mod transfer;

pub use config::{Config, Profile, TransferConfig};
pub use error::{Result, TransferError};
pub use s3::Client;
