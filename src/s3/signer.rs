//! AWS signature version 2 signer for S3-compatible endpoints
//!
//! The canonical string is the exact digest input the endpoint recomputes:
//!
//! ```text
//! METHOD\n
//! <content-md5>\n
//! <content-type>\n
//! <date>\n
//! <resource path>[?<allow-listed sub-resources>]
//! ```
//!
//! Only those three headers are ever signed, and only query parameters in
//! [`SUB_RESOURCES`] survive into the resource part.

use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use hyper::header::HeaderMap;
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Query parameter names that are part of the signed resource.
///
/// Storage sub-resources and response overrides, as recognized by RGW and
/// S3. Anything else in the query string is ignored by the signer.
pub const SUB_RESOURCES: &[&str] = &[
    "acl",
    "cors",
    "defaultObjectAcl",
    "location",
    "logging",
    "partNumber",
    "policy",
    "requestPayment",
    "torrent",
    "versioning",
    "versions",
    "website",
    "uploads",
    "uploadId",
    "response-content-type",
    "response-content-language",
    "response-expires",
    "response-cache-control",
    "response-content-disposition",
    "response-content-encoding",
    "delete",
    "lifecycle",
    "tagging",
    "restore",
    "storageClass",
    "websiteConfig",
    "compose",
];

/// Normalized view of a request at sign time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureContext {
    method: String,
    content_md5: String,
    content_type: String,
    date: String,
    resource: String,
    /// Allow-listed parameters, sorted by name; `None` for bare names like `acl`
    sub_resources: Vec<(String, Option<String>)>,
}

impl SignatureContext {
    /// Capture the signed parts of a request.
    ///
    /// `resource` is the unescaped path (`/bucket/key`); `query` is the raw
    /// query string without the leading `?`.
    pub fn new(method: &str, headers: &HeaderMap, resource: &str, query: &str) -> Self {
        Self {
            method: method.to_string(),
            content_md5: header_value(headers, "content-md5"),
            content_type: header_value(headers, "content-type"),
            date: header_value(headers, "date"),
            resource: resource.to_string(),
            sub_resources: filter_sub_resources(query),
        }
    }

    /// Build the context for a query-string authenticated URL.
    ///
    /// The expiry timestamp takes the place of the date header.
    pub fn for_presigned_get(resource: &str, expires: i64) -> Self {
        Self {
            method: "GET".to_string(),
            content_md5: String::new(),
            content_type: String::new(),
            date: expires.to_string(),
            resource: resource.to_string(),
            sub_resources: Vec::new(),
        }
    }

    /// Exact byte sequence fed to the HMAC
    pub fn canonical_string(&self) -> String {
        let mut canonical = String::with_capacity(
            self.method.len()
                + self.content_md5.len()
                + self.content_type.len()
                + self.date.len()
                + self.resource.len()
                + 64,
        );
        canonical.push_str(&self.method);
        canonical.push('\n');
        // content-md5 < content-type < date
        canonical.push_str(&self.content_md5);
        canonical.push('\n');
        canonical.push_str(&self.content_type);
        canonical.push('\n');
        canonical.push_str(&self.date);
        canonical.push('\n');
        canonical.push_str(&self.resource);

        if !self.sub_resources.is_empty() {
            let entries: Vec<String> = self
                .sub_resources
                .iter()
                .map(|(name, value)| match value {
                    Some(v) => format!("{}={}", name, v),
                    None => name.clone(),
                })
                .collect();
            canonical.push('?');
            canonical.push_str(&entries.join("&"));
        }

        canonical
    }

    /// base64(HMAC-SHA1(secret_key, canonical string))
    pub fn sign(&self, secret_key: &str) -> String {
        let digest = hmac_sha1(secret_key.as_bytes(), self.canonical_string().as_bytes());
        base64::engine::general_purpose::STANDARD.encode(digest)
    }
}

/// Compute a request signature in one call
pub fn signature(
    secret_key: &str,
    method: &str,
    headers: &HeaderMap,
    resource: &str,
    query: &str,
) -> String {
    SignatureContext::new(method, headers, resource, query).sign(secret_key)
}

/// Format a timestamp the way the `Date` header expects (RFC 1123, GMT)
pub fn http_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Credentials bound signer producing `Authorization` header values
#[derive(Clone)]
pub struct S3SignerV2 {
    access_key: String,
    secret_key: String,
}

impl S3SignerV2 {
    pub fn new(access_key: String, secret_key: String) -> Self {
        Self {
            access_key,
            secret_key,
        }
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    /// `AWS <access key>:<signature>` for a request whose other headers are final.
    ///
    /// Signing only reads `headers`; callers set Date, Content-MD5 and
    /// Content-Type first and add the returned value last.
    pub fn authorization(
        &self,
        method: &str,
        headers: &HeaderMap,
        resource: &str,
        query: &str,
    ) -> String {
        let signature = signature(&self.secret_key, method, headers, resource, query);
        format!("AWS {}:{}", self.access_key, signature)
    }

    /// Signature for a presigned GET expiring at `expires` (unix seconds)
    pub fn presign(&self, resource: &str, expires: i64) -> String {
        SignatureContext::for_presigned_get(resource, expires).sign(&self.secret_key)
    }
}

impl std::fmt::Debug for S3SignerV2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3SignerV2")
            .field("access_key", &self.access_key)
            .finish_non_exhaustive()
    }
}

/// All values of a header joined by a space, or empty when absent
fn header_value(headers: &HeaderMap, name: &str) -> String {
    let values: Vec<String> = headers
        .get_all(name)
        .iter()
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .collect();
    values.join(" ")
}

/// Keep allow-listed parameters, decoded, sorted by name (stable)
fn filter_sub_resources(query: &str) -> Vec<(String, Option<String>)> {
    let query = query.strip_prefix('?').unwrap_or(query);
    let mut params: Vec<(String, Option<String>)> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) => (decode_component(name), Some(decode_component(value))),
            None => (decode_component(pair), None),
        })
        .filter(|(name, _)| SUB_RESOURCES.contains(&name.as_str()))
        .collect();

    params.sort_by(|a, b| a.0.cmp(&b.0));
    params
}

/// Form-style decoding: `+` is a space, then percent escapes
fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

fn hmac_sha1(key: &[u8], msg: &[u8]) -> [u8; 20] {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(msg);
    let result = mac.finalize().into_bytes();
    let mut output = [0u8; 20];
    output.copy_from_slice(&result);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_canonical_string_layout() {
        let h = headers(&[
            ("Date", "Tue, 27 Mar 2007 21:15:45 GMT"),
            ("Content-Type", "image/jpeg"),
            ("Content-MD5", "4gJE4saaMU4BqNR0kLY+lw=="),
            ("X-Amz-Meta-Owner", "ignored"),
        ]);
        let ctx = SignatureContext::new("PUT", &h, "/photos/puppy.jpg", "");
        assert_eq!(
            ctx.canonical_string(),
            "PUT\n4gJE4saaMU4BqNR0kLY+lw==\nimage/jpeg\nTue, 27 Mar 2007 21:15:45 GMT\n/photos/puppy.jpg"
        );
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let upper = headers(&[("DATE", "d"), ("CONTENT-TYPE", "t")]);
        let lower = headers(&[("date", "d"), ("content-type", "t")]);
        assert_eq!(
            SignatureContext::new("GET", &upper, "/b", ""),
            SignatureContext::new("GET", &lower, "/b", "")
        );
    }

    #[test]
    fn test_missing_header_equals_empty_header() {
        let without = headers(&[("Date", "d")]);
        let with_empty = headers(&[("Date", "d"), ("Content-MD5", "")]);
        let a = SignatureContext::new("PUT", &without, "/b/o", "");
        let b = SignatureContext::new("PUT", &with_empty, "/b/o", "");
        assert_eq!(a.canonical_string(), b.canonical_string());
        assert_eq!(a.canonical_string(), "PUT\n\n\nd\n/b/o");
    }

    #[test]
    fn test_multiple_values_joined_by_space() {
        let h = headers(&[("Content-Type", "a"), ("Content-Type", "b")]);
        let ctx = SignatureContext::new("GET", &h, "/", "");
        assert_eq!(ctx.canonical_string(), "GET\n\na b\n\n/");
    }

    #[test]
    fn test_allow_list_filtering() {
        let ctx = SignatureContext::new("GET", &HeaderMap::new(), "/b/o", "foo=1&acl&uploadId=7");
        assert_eq!(ctx.canonical_string(), "GET\n\n\n\n/b/o?acl&uploadId=7");
    }

    #[test]
    fn test_sub_resources_sorted_and_values_kept_in_order() {
        let ctx = SignatureContext::new(
            "GET",
            &HeaderMap::new(),
            "/b/o",
            "versions&partNumber=2&acl&partNumber=1&max-keys=10",
        );
        assert_eq!(
            ctx.canonical_string(),
            "GET\n\n\n\n/b/o?acl&partNumber=2&partNumber=1&versions"
        );
    }

    #[test]
    fn test_sub_resource_values_are_decoded() {
        let ctx = SignatureContext::new(
            "GET",
            &HeaderMap::new(),
            "/b/o",
            "response-content-type=text%2Fplain&response-content-disposition=a+b",
        );
        assert_eq!(
            ctx.canonical_string(),
            "GET\n\n\n\n/b/o?response-content-disposition=a b&response-content-type=text/plain"
        );
    }

    #[test]
    fn test_no_sub_resources_no_question_mark() {
        let ctx = SignatureContext::new("GET", &HeaderMap::new(), "/b/o", "prefix=x&marker=y");
        assert_eq!(ctx.canonical_string(), "GET\n\n\n\n/b/o");
    }

    #[test]
    fn test_signature_matches_hmac_of_canonical_string() {
        let h = headers(&[("Date", "Thu, 01 Jan 2026 00:00:00 GMT")]);
        let sig = signature("secret", "GET", &h, "/bucket/key", "");

        let mut mac = HmacSha1::new_from_slice(b"secret").unwrap();
        mac.update(b"GET\n\n\nThu, 01 Jan 2026 00:00:00 GMT\n/bucket/key");
        let expected =
            base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
        assert_eq!(sig, expected);
        // 20 byte digest -> 28 base64 chars
        assert_eq!(sig.len(), 28);
    }

    #[test]
    fn test_signature_determinism_and_sensitivity() {
        let base = headers(&[
            ("Date", "d1"),
            ("Content-MD5", "m1"),
            ("Content-Type", "t1"),
        ]);
        let sig = signature("k", "PUT", &base, "/b/o", "acl");
        assert_eq!(sig, signature("k", "PUT", &base, "/b/o", "acl"));

        for (name, value) in [("Date", "d2"), ("Content-MD5", "m2"), ("Content-Type", "t2")] {
            let mut changed = base.clone();
            changed.insert(name, HeaderValue::from_static(value));
            assert_ne!(sig, signature("k", "PUT", &changed, "/b/o", "acl"), "{}", name);
        }

        assert_ne!(sig, signature("k", "PUT", &base, "/b/o", "acl&uploadId=3"));
        assert_eq!(sig, signature("k", "PUT", &base, "/b/o", "acl&foo=bar"));

        let mut unsigned_header = base.clone();
        unsigned_header.insert("x-amz-acl", HeaderValue::from_static("public-read"));
        assert_eq!(sig, signature("k", "PUT", &unsigned_header, "/b/o", "acl"));
    }

    #[test]
    fn test_authorization_header_format() {
        let signer = S3SignerV2::new("AKID".to_string(), "secret".to_string());
        let h = headers(&[("Date", "d")]);
        let auth = signer.authorization("HEAD", &h, "/b/o", "");
        let expected = format!("AWS AKID:{}", signature("secret", "HEAD", &h, "/b/o", ""));
        assert_eq!(auth, expected);
        assert!(!format!("{:?}", signer).contains("secret"));
    }

    #[test]
    fn test_presigned_context_uses_expiry_as_date() {
        let ctx = SignatureContext::for_presigned_get("/b/o", 1_700_000_000);
        assert_eq!(ctx.canonical_string(), "GET\n\n\n1700000000\n/b/o");
    }

    #[test]
    fn test_http_date_format() {
        let ts = DateTime::from_timestamp(1_175_030_145, 0).unwrap();
        assert_eq!(http_date(ts), "Tue, 27 Mar 2007 21:15:45 GMT");
    }
}
