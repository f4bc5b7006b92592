//! CLI module for s3xfer
//!
//! # Usage
//!
//! ```bash
//! # Upload and print a signed link valid for one hour
//! s3xfer put ./report.pdf s3://docs/2024/report.pdf --url --signed --expires 3600
//!
//! # Download with checksum verification
//! s3xfer get s3://docs/2024/report.pdf ./report.pdf --md5 <base64 md5> --progress
//!
//! # Download from a shared link
//! s3xfer fetch 'http://ceph1:7480/docs/2024%2Freport.pdf' ./report.pdf
//!
//! # Object info
//! s3xfer stat s3://docs/2024/report.pdf
//! ```

pub mod args;
pub mod commands;

use crate::config::Config;
use crate::s3::{Client, UrlOptions};
use anyhow::{Context, Result};
use tracing::debug;

use args::Commands;
use commands::*;

/// Execute one parsed command against the config's default profile
pub async fn run(command: Commands, config: &Config) -> Result<()> {
    let profile = config
        .get_profile(None)
        .cloned()
        .context("No profile configured")?;
    debug!(host = %profile.host, "using profile");
    let client = Client::new(profile, config.transfer.clone());

    match command {
        Commands::Put {
            file,
            dest,
            url,
            signed,
            expires,
            progress,
        } => {
            let url = url.then_some(UrlOptions {
                signed,
                expires_in: expires,
            });
            cmd_put(&client, &file, &dest, url, progress).await?;
        }

        Commands::Get {
            source,
            file,
            md5,
            progress,
        } => {
            cmd_get(&client, &source, &file, md5, progress).await?;
        }

        Commands::Fetch {
            url,
            file,
            md5,
            progress,
        } => {
            cmd_fetch(&client, &url, &file, md5, progress).await?;
        }

        Commands::Stat { path } => {
            cmd_stat(&client, &path).await?;
        }

        Commands::Url {
            path,
            signed,
            expires,
        } => {
            cmd_url(&client, &path, signed, expires)?;
        }
    }

    Ok(())
}
