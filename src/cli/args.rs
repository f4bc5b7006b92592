use clap::{Parser, Subcommand};

/// s3xfer - single-object transfers against S3-compatible gateways
#[derive(Parser, Debug)]
#[command(name = "s3xfer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path (environment variables are used when omitted)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Profile to use from config
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload a local file as one object
    Put {
        /// Local file
        #[arg(value_name = "FILE")]
        file: String,

        /// Destination (s3://bucket/key)
        #[arg(value_name = "DEST")]
        dest: String,

        /// Print a download link after the upload
        #[arg(long)]
        url: bool,

        /// Sign the download link
        #[arg(long, requires = "url")]
        signed: bool,

        /// Signed link lifetime in seconds
        #[arg(long, default_value = "3600")]
        expires: i64,

        /// Show progress bar
        #[arg(short, long)]
        progress: bool,
    },

    /// Download an object by bucket and key
    Get {
        /// Source (s3://bucket/key)
        #[arg(value_name = "SOURCE")]
        source: String,

        /// Local destination file
        #[arg(value_name = "FILE")]
        file: String,

        /// Expected base64 MD5 of the object
        #[arg(long)]
        md5: Option<String>,

        /// Show progress bar
        #[arg(short, long)]
        progress: bool,
    },

    /// Download an object from a (shareable) URL
    Fetch {
        /// http:// URL of the object
        #[arg(value_name = "URL")]
        url: String,

        /// Local destination file
        #[arg(value_name = "FILE")]
        file: String,

        /// Expected base64 MD5 of the object
        #[arg(long)]
        md5: Option<String>,

        /// Show progress bar
        #[arg(short, long)]
        progress: bool,
    },

    /// Show object info
    Stat {
        /// s3://bucket/key or http:// URL
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Print a download link for an object
    Url {
        /// Object (s3://bucket/key)
        #[arg(value_name = "PATH")]
        path: String,

        /// Sign the link
        #[arg(long)]
        signed: bool,

        /// Signed link lifetime in seconds
        #[arg(long, default_value = "3600")]
        expires: i64,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Parse an object path into (bucket, key)
///
/// Accepts `s3://bucket/key` and the shorter `s3/bucket/key`.
pub fn parse_object_path(path: &str) -> anyhow::Result<(String, String)> {
    let path = path.trim();

    let stripped = if let Some(p) = path.strip_prefix("s3://") {
        p
    } else if let Some(p) = path.strip_prefix("s3/") {
        p
    } else {
        anyhow::bail!("Invalid object path '{}'. Expected: s3://bucket/key", path);
    };

    let (bucket, key) = match stripped.split_once('/') {
        Some((bucket, key)) => (bucket, key),
        None => (stripped, ""),
    };
    if bucket.is_empty() {
        anyhow::bail!("Bucket name cannot be empty");
    }
    if key.is_empty() {
        anyhow::bail!("Object key cannot be empty");
    }

    Ok((bucket.to_string(), key.to_string()))
}

/// Whether the argument is a URL rather than an object path
pub fn is_url(path: &str) -> bool {
    let path = path.trim();
    path.starts_with("http://") || path.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_path() {
        assert_eq!(
            parse_object_path("s3://bucket/dir/file.bin").unwrap(),
            ("bucket".to_string(), "dir/file.bin".to_string())
        );
        assert_eq!(
            parse_object_path("s3/bucket/file.bin").unwrap(),
            ("bucket".to_string(), "file.bin".to_string())
        );
    }

    #[test]
    fn test_parse_object_path_rejects() {
        assert!(parse_object_path("bucket/key").is_err());
        assert!(parse_object_path("s3://bucket").is_err());
        assert!(parse_object_path("s3://bucket/").is_err());
        assert!(parse_object_path("s3:///key").is_err());
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("http://ceph1:7480/b/k"));
        assert!(!is_url("s3://b/k"));
    }

    #[test]
    fn test_cli_parses_put() {
        let cli = Cli::try_parse_from([
            "s3xfer", "put", "./a.bin", "s3://b/a.bin", "--url", "--signed", "--expires", "60",
        ])
        .unwrap();
        match cli.command {
            Commands::Put {
                url,
                signed,
                expires,
                progress,
                ..
            } => {
                assert!(url && signed && !progress);
                assert_eq!(expires, 60);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.log_level, "info");
    }
}
