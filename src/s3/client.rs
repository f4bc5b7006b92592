//! Object operations against one S3-compatible gateway
//!
//! - Uploads go through the duplex transfer engine ([`crate::transfer::upload`])
//! - HEAD and GET go through the pooled [`RestClient`]
//! - Requests by bucket and key are signed with AWS signature v2; requests
//!   by URL are sent as is, the URL carries its own authorization if any

use crate::config::{Profile, TransferConfig};
use crate::error::{Result, TransferError};
use crate::s3::rest::{RestClient, RestResponse};
use crate::s3::signer::{http_date, S3SignerV2};
use crate::s3::types::{
    DownloadOutput, DownloadRequest, ObjectInfo, ObjectSource, TransferRequest, UploadOutput,
    UrlOptions,
};
use crate::s3::url::{download_url, request_target, resource_path};
use crate::transfer::download::{save_to_file, SaveOptions};
use crate::transfer::upload;
use chrono::Utc;
use hyper::header::{
    HeaderMap, HeaderValue, ACCEPT_ENCODING, AUTHORIZATION, CONTENT_LENGTH, DATE, ETAG,
    LAST_MODIFIED,
};
use hyper::Method;
use tracing::info;

/// S3 client bound to one profile
///
/// Clone is cheap - the HTTP pool is shared.
#[derive(Clone)]
pub struct Client {
    profile: Profile,
    settings: TransferConfig,
    signer: S3SignerV2,
    rest: RestClient,
}

impl Client {
    pub fn new(profile: Profile, settings: TransferConfig) -> Self {
        let signer = S3SignerV2::new(profile.access_key.clone(), profile.secret_key.clone());
        let rest = RestClient::new(&settings);
        Self {
            profile,
            settings,
            signer,
            rest,
        }
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Upload one local file as one object
    pub async fn put_object(&self, request: &TransferRequest) -> Result<UploadOutput> {
        upload::put_object(&self.profile, &self.settings, request).await
    }

    /// Size, ETag and Last-Modified of an object
    pub async fn stat_object(&self, source: &ObjectSource) -> Result<ObjectInfo> {
        self.profile.validate().await?;
        self.head(source).await
    }

    /// Download an object into `request.save_path`.
    ///
    /// The body is saved next to the destination first and only renamed into
    /// place once its size and optional checksum match.
    pub async fn get_object(&self, request: &DownloadRequest) -> Result<DownloadOutput> {
        self.profile.validate().await?;

        let info = self.head(&request.source).await?;
        let response = self
            .send(Method::GET, &request.source)
            .await?
            .error_for_status()
            .await?;

        let options = SaveOptions {
            expected_size: Some(info.size),
            expected_md5: request.expected_md5.clone(),
            progress: request
                .progress_enabled
                .then(|| request.progress().clone()),
            poll_interval: self.settings.progress_interval(),
        };
        let size = save_to_file(&request.save_path, response.into_stream(), &options).await?;

        info!(
            source = %describe(&request.source),
            path = %request.save_path.display(),
            size = size,
            "download complete"
        );
        Ok(DownloadOutput {
            size,
            etag: info.etag,
            path: request.save_path.clone(),
        })
    }

    /// Shareable link for a stored object; no request is made
    pub fn download_url(&self, bucket: &str, key: &str, options: UrlOptions) -> String {
        download_url(&self.profile, bucket, key, options)
    }

    async fn head(&self, source: &ObjectSource) -> Result<ObjectInfo> {
        let response = self
            .send(Method::HEAD, source)
            .await?
            .error_for_status()
            .await?;
        object_info(&response.headers)
    }

    async fn send(&self, method: Method, source: &ObjectSource) -> Result<RestResponse> {
        let mut headers = HeaderMap::new();
        let date = HeaderValue::from_str(&http_date(Utc::now()))
            .map_err(|e| TransferError::Validation(format!("invalid date header: {}", e)))?;
        headers.insert(DATE, date);
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

        let url = match source {
            ObjectSource::Named { bucket, key } => {
                let authorization = self.signer.authorization(
                    method.as_str(),
                    &headers,
                    &resource_path(bucket, key),
                    "",
                );
                let value = HeaderValue::from_str(&authorization).map_err(|e| {
                    TransferError::Validation(format!("invalid authorization header: {}", e))
                })?;
                headers.insert(AUTHORIZATION, value);
                format!("http://{}{}", self.profile.host, request_target(bucket, key))
            }
            ObjectSource::Url(url) => url.clone(),
        };

        self.rest.send(method, &url, headers).await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("host", &self.profile.host)
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}

fn object_info(headers: &HeaderMap) -> Result<ObjectInfo> {
    let size = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or_else(|| TransferError::malformed("object info without a valid Content-Length"))?;
    let etag = headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_matches('"').to_string());
    let last_modified = headers
        .get(LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    Ok(ObjectInfo {
        size,
        etag,
        last_modified,
    })
}

fn describe(source: &ObjectSource) -> String {
    match source {
        ObjectSource::Named { bucket, key } => format!("{}/{}", bucket, key),
        ObjectSource::Url(url) => url.clone(),
    }
}
