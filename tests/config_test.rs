use std::env;
use std::fs;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

/// Environment variables are process-wide; tests touching them take turns
static ENV_LOCK: Mutex<()> = Mutex::new(());

const ENV_VARS: &[&str] = &[
    "S3XFER_HOST",
    "S3XFER_ACCESS_KEY",
    "S3XFER_SECRET_KEY",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "S3XFER_FINAL_WAIT_MS",
    "S3XFER_READ_DEADLINE_MS",
    "S3XFER_WRITE_DEADLINE_MS",
];

/// Test loading configuration from YAML file
#[test]
fn test_load_yaml_config() {
    let yaml = r#"
profiles:
  test:
    host: ceph1:7480
    access_key: AKIATEST
    secret_key: secrettest
default_profile: test
transfer:
  connect_timeout_ms: 2000
  read_deadline_ms: 250
  write_deadline_ms: 3000
  final_wait_ms: 10000
  progress_interval_ms: 500
  chunk_size: 65536
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();

    let config = s3xfer::config::load_from_yaml(&config_path).unwrap();

    assert_eq!(config.profiles.len(), 1);
    let profile = config.profiles.get("test").unwrap();
    assert_eq!(profile.host, "ceph1:7480");
    assert_eq!(profile.access_key, "AKIATEST");
    assert_eq!(profile.secret_key, "secrettest");
    assert_eq!(config.default_profile.as_deref(), Some("test"));

    let transfer = &config.transfer;
    assert_eq!(transfer.connect_timeout(), Duration::from_secs(2));
    assert_eq!(transfer.read_deadline(), Duration::from_millis(250));
    assert_eq!(transfer.write_deadline(), Duration::from_secs(3));
    assert_eq!(transfer.final_wait(), Duration::from_secs(10));
    assert_eq!(transfer.progress_interval(), Duration::from_millis(500));
    assert_eq!(transfer.chunk_size(), 65536);
}

/// Test loading configuration from environment variables (AWS standard names)
#[test]
fn test_load_env_config_aws_names() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let saved = save_env();

    env::set_var("S3XFER_HOST", " ceph2:7480 ");
    env::set_var("AWS_ACCESS_KEY_ID", "test_key");
    env::set_var("AWS_SECRET_ACCESS_KEY", "test_secret");
    env::set_var("S3XFER_FINAL_WAIT_MS", "1500");

    let config = s3xfer::config::load_from_env().unwrap();

    assert_eq!(config.profiles.len(), 1);
    let profile = config.get_profile(None).unwrap();
    assert_eq!(profile.host, "ceph2:7480");
    assert_eq!(profile.access_key, "test_key");
    assert_eq!(profile.secret_key, "test_secret");
    assert_eq!(config.default_profile.as_deref(), Some("default"));
    assert_eq!(config.transfer.final_wait(), Duration::from_millis(1500));
    assert_eq!(config.transfer.read_deadline(), Duration::from_secs(1));

    restore_env(saved);
}

/// Tool-specific names win over the AWS ones
#[test]
fn test_load_env_config_prefers_own_names() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let saved = save_env();

    env::set_var("S3XFER_HOST", "ceph1:7480");
    env::set_var("S3XFER_ACCESS_KEY", "own_key");
    env::set_var("S3XFER_SECRET_KEY", "own_secret");
    env::set_var("AWS_ACCESS_KEY_ID", "aws_key");
    env::set_var("AWS_SECRET_ACCESS_KEY", "aws_secret");
    env::set_var("S3XFER_READ_DEADLINE_MS", "not-a-number");

    let config = s3xfer::config::load_from_env().unwrap();
    let profile = config.get_profile(None).unwrap();
    assert_eq!(profile.access_key, "own_key");
    assert_eq!(profile.secret_key, "own_secret");
    // unparsable overrides are ignored
    assert_eq!(config.transfer.read_deadline(), Duration::from_secs(1));

    restore_env(saved);
}

/// Missing host is an error
#[test]
fn test_load_env_config_requires_host() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let saved = save_env();

    env::set_var("S3XFER_ACCESS_KEY", "key");
    env::set_var("S3XFER_SECRET_KEY", "secret");

    assert!(s3xfer::config::load_from_env().is_err());

    restore_env(saved);
}

/// Test default values
#[test]
fn test_default_values() {
    let yaml = r#"
profiles:
  minimal:
    host: 127.0.0.1:7480
    access_key: key
    secret_key: secret
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();

    let config = s3xfer::config::load_from_yaml(&config_path).unwrap();

    assert!(config.default_profile.is_none());
    let transfer = &config.transfer;
    assert_eq!(transfer.connect_timeout(), Duration::from_secs(5));
    assert_eq!(transfer.read_deadline(), Duration::from_secs(1));
    assert_eq!(transfer.write_deadline(), Duration::from_secs(5));
    assert_eq!(transfer.final_wait(), Duration::from_secs(5));
    assert_eq!(transfer.progress_interval(), Duration::from_secs(1));
    assert_eq!(transfer.chunk_size(), 8192);

    // the only profile doubles as the default
    assert_eq!(config.get_profile(None).unwrap().access_key, "key");
}

/// Test get_profile method
#[test]
fn test_get_profile() {
    let yaml = r#"
profiles:
  prod:
    host: ceph-prod:7480
    access_key: prod_key
    secret_key: prod_secret
  dev:
    host: ceph-dev:7480
    access_key: dev_key
    secret_key: dev_secret
default_profile: prod
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();

    let config = s3xfer::config::load_from_yaml(&config_path).unwrap();

    let dev_profile = config.get_profile(Some("dev")).unwrap();
    assert_eq!(dev_profile.access_key, "dev_key");

    let default_profile = config.get_profile(None).unwrap();
    assert_eq!(default_profile.access_key, "prod_key");

    assert!(config.get_profile(Some("nonexistent")).is_none());
}

/// A named profile becomes the default; an unknown one is rejected
#[test]
fn test_load_config_selects_profile() {
    let yaml = r#"
profiles:
  prod:
    host: ceph-prod:7480
    access_key: prod_key
    secret_key: prod_secret
  dev:
    host: ceph-dev:7480
    access_key: dev_key
    secret_key: dev_secret
default_profile: prod
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();
    let path = config_path.to_str().unwrap();

    let config = s3xfer::config::load_config(Some(path), Some("dev")).unwrap();
    assert_eq!(config.get_profile(None).unwrap().host, "ceph-dev:7480");

    assert!(s3xfer::config::load_config(Some(path), Some("staging")).is_err());
}

/// Broken YAML is reported, not defaulted
#[test]
fn test_invalid_yaml() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, "profiles: [not, a, map").unwrap();

    assert!(s3xfer::config::load_from_yaml(&config_path).is_err());
    assert!(s3xfer::config::load_from_yaml(temp_dir.path().join("missing.yaml")).is_err());
}

/// Snapshot and clear every variable the loader reads
fn save_env() -> Vec<(&'static str, Option<String>)> {
    ENV_VARS
        .iter()
        .map(|&key| {
            let val = env::var(key).ok();
            env::remove_var(key);
            (key, val)
        })
        .collect()
}

/// Helper function to cleanup environment variables
fn restore_env(saved: Vec<(&'static str, Option<String>)>) {
    for (key, orig_val) in saved {
        match orig_val {
            Some(val) => env::set_var(key, val),
            None => env::remove_var(key),
        }
    }
}
