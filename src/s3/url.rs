//! Object paths and shareable links

use crate::config::Profile;
use crate::s3::signer::S3SignerV2;
use crate::s3::types::UrlOptions;
use std::borrow::Cow;

/// Hex lookup table for percent encoding
static HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// Unescaped resource path as it enters the canonical string
pub(crate) fn resource_path(bucket: &str, key: &str) -> String {
    let mut path = String::with_capacity(bucket.len() + key.len() + 2);
    path.push('/');
    path.push_str(bucket);
    path.push('/');
    path.push_str(key);
    path
}

/// Escaped path for a request line or URL, keeping `/` inside the key
pub(crate) fn request_target(bucket: &str, key: &str) -> String {
    let bucket = urlencoding::encode(bucket);
    let key = encode_key(key);
    let mut target = String::with_capacity(bucket.len() + key.len() + 2);
    target.push('/');
    target.push_str(&bucket);
    target.push('/');
    target.push_str(&key);
    target
}

/// Percent-encode an object key, preserving forward slashes.
/// Borrows when nothing needs encoding.
pub(crate) fn encode_key(key: &str) -> Cow<'_, str> {
    let needs_encoding = key.bytes().any(|b| !is_key_safe(b));
    if !needs_encoding {
        return Cow::Borrowed(key);
    }

    let mut result = String::with_capacity(key.len() + 32);
    for byte in key.bytes() {
        if is_key_safe(byte) {
            result.push(byte as char);
        } else {
            result.push('%');
            result.push(HEX_UPPER[(byte >> 4) as usize] as char);
            result.push(HEX_UPPER[(byte & 0xf) as usize] as char);
        }
    }
    Cow::Owned(result)
}

fn is_key_safe(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/')
}

/// Plain link: `http://<host>/<bucket>/<object>`, both names escaped
pub fn object_url(host: &str, bucket: &str, key: &str) -> String {
    format!(
        "http://{}/{}/{}",
        host,
        urlencoding::encode(bucket),
        urlencoding::encode(key)
    )
}

/// Query-string authenticated link valid until `expires` (unix seconds)
pub fn presigned_url(profile: &Profile, bucket: &str, key: &str, expires: i64) -> String {
    let signer = S3SignerV2::new(profile.access_key.clone(), profile.secret_key.clone());
    let signature = signer.presign(&resource_path(bucket, key), expires);
    format!(
        "{}?Signature={}&Expires={}&AWSAccessKeyId={}",
        object_url(&profile.host, bucket, key),
        urlencoding::encode(&signature),
        expires,
        urlencoding::encode(signer.access_key())
    )
}

/// Link for a stored object, signed relative to now when requested
pub fn download_url(profile: &Profile, bucket: &str, key: &str, options: UrlOptions) -> String {
    if options.signed {
        let expires = chrono::Utc::now()
            .timestamp()
            .saturating_add(options.expires_in);
        presigned_url(profile, bucket, key, expires)
    } else {
        object_url(&profile.host, bucket, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::signer::SignatureContext;

    fn profile() -> Profile {
        Profile::new("ceph1:7480", "AKID", "secret")
    }

    #[test]
    fn test_encode_key() {
        assert!(matches!(encode_key("path/to/file.txt"), Cow::Borrowed(_)));
        assert_eq!(encode_key("path/to/my file.txt"), "path/to/my%20file.txt");
        assert_eq!(encode_key("a+b"), "a%2Bb");
    }

    #[test]
    fn test_paths() {
        assert_eq!(resource_path("b", "dir/my file"), "/b/dir/my file");
        assert_eq!(request_target("b", "dir/my file"), "/b/dir/my%20file");
    }

    #[test]
    fn test_unsigned_url() {
        assert_eq!(
            object_url("ceph1:7480", "bucket", "dir/a b.txt"),
            "http://ceph1:7480/bucket/dir%2Fa%20b.txt"
        );
        let url = download_url(
            &profile(),
            "bucket",
            "obj",
            UrlOptions {
                signed: false,
                expires_in: 3600,
            },
        );
        assert_eq!(url, "http://ceph1:7480/bucket/obj");
    }

    #[test]
    fn test_presigned_url() {
        let url = presigned_url(&profile(), "bucket", "obj", 1_800_000_000);
        let signature = SignatureContext::for_presigned_get("/bucket/obj", 1_800_000_000).sign("secret");
        assert_eq!(
            url,
            format!(
                "http://ceph1:7480/bucket/obj?Signature={}&Expires=1800000000&AWSAccessKeyId=AKID",
                urlencoding::encode(&signature)
            )
        );
    }

    #[test]
    fn test_presigned_url_escapes_access_key() {
        let profile = Profile::new("ceph1:7480", "AK/ID+1", "secret");
        let url = presigned_url(&profile, "bucket", "obj", 1_800_000_000);
        assert!(url.ends_with("&AWSAccessKeyId=AK%2FID%2B1"));
    }

    #[test]
    fn test_signed_download_url_expiry() {
        let before = chrono::Utc::now().timestamp();
        let url = download_url(
            &profile(),
            "bucket",
            "obj",
            UrlOptions {
                signed: true,
                expires_in: 60,
            },
        );
        let expires: i64 = url
            .split("Expires=")
            .nth(1)
            .and_then(|rest| rest.split('&').next())
            .unwrap()
            .parse()
            .unwrap();
        assert!(expires >= before + 60 && expires <= before + 62);
        assert!(url.ends_with("&AWSAccessKeyId=AKID"));
    }

    #[test]
    fn test_huge_lifetime_saturates() {
        let url = download_url(
            &profile(),
            "bucket",
            "obj",
            UrlOptions {
                signed: true,
                expires_in: i64::MAX,
            },
        );
        assert!(url.contains(&format!("&Expires={}&", i64::MAX)));
    }
}
