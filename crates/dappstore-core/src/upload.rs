//! Permanent storage uploads.
//!
//! An upload is one multipart `POST` with a single `file` field. It succeeds
//! only when the response is 2xx **and** its JSON body carries a non-empty
//! transaction `id`; the durable URI is the gateway base plus that id.
//! Failures come back as [`UploadError`] values, never panics: the network is
//! expected to fail routinely.
//!
//! Uploads are not deduplicated. Sending identical bytes twice stores two
//! independent copies.
//!
//! Asset files are never held in memory whole: [`upload_asset`] hashes the
//! file in chunks, then the bundler streams it from disk.

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use std::path::{Path, PathBuf};

use crate::config::PipelineSettings;
use crate::digest::ContentHash;
use crate::imaging::{image_mime, dimensions_from_bytes, read_dimensions, Dimensions};
use crate::package::APK_MIME;

/// Which release asset is being uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Icon,
    Banner,
    /// One-based position in the declared screenshot list.
    Screenshot(usize),
    Apk,
}

impl AssetKind {
    /// Label used in progress steps and error messages.
    pub fn label(&self) -> String {
        match self {
            AssetKind::Icon => "Icon".to_string(),
            AssetKind::Banner => "Banner".to_string(),
            AssetKind::Screenshot(n) => format!("Screenshot {}", n),
            AssetKind::Apk => "APK".to_string(),
        }
    }

    pub fn is_image(&self) -> bool {
        !matches!(self, AssetKind::Apk)
    }

    fn content_type(&self, path: &Path) -> &'static str {
        match self {
            AssetKind::Apk => APK_MIME,
            AssetKind::Icon | AssetKind::Banner | AssetKind::Screenshot(_) => image_mime(path),
        }
    }
}

/// A local asset paired with the durable URI it was uploaded to.
///
/// Only `uri`, `sha256` and the declared shape survive into the metadata
/// document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedAsset {
    pub kind: AssetKind,
    pub path: PathBuf,
    pub content_type: String,
    pub uri: String,
    /// Hash of the local bytes that were sent.
    pub sha256: ContentHash,
    pub size: u64,
    pub dimensions: Option<Dimensions>,
}

impl UploadedAsset {
    /// Describe a local file as if it had been uploaded to `uri`.
    ///
    /// Used for offline previews; no bytes leave the machine.
    pub fn local(kind: AssetKind, path: &Path, uri: &str) -> std::io::Result<Self> {
        let (sha256, size) = ContentHash::from_reader(std::fs::File::open(path)?)?;
        let dimensions = if kind.is_image() {
            read_dimensions(path).ok()
        } else {
            None
        };
        Ok(UploadedAsset {
            kind,
            path: path.to_path_buf(),
            content_type: kind.content_type(path).to_string(),
            uri: uri.to_string(),
            sha256,
            size,
            dimensions,
        })
    }
}

/// Every asset URI produced by the upload stage, in declared order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedAssets {
    pub icon: UploadedAsset,
    pub banner: Option<UploadedAsset>,
    pub screenshots: Vec<UploadedAsset>,
    pub apk: UploadedAsset,
}

/// Where the bytes of an upload come from.
#[derive(Debug, Clone)]
pub enum UploadBody {
    /// Small in-memory payloads (the metadata document).
    Bytes(Vec<u8>),
    /// A file streamed from disk; `len` is its size when it was hashed.
    File { path: PathBuf, len: u64 },
}

impl UploadBody {
    pub fn len(&self) -> u64 {
        match self {
            UploadBody::Bytes(bytes) => bytes.len() as u64,
            UploadBody::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Payload to upload plus the metadata the multipart part needs.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub content_type: String,
    pub body: UploadBody,
}

impl UploadRequest {
    pub fn new(file_name: &str, content_type: &str, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            body: UploadBody::Bytes(bytes),
        }
    }

    /// Upload a file streamed from disk.
    pub fn file(file_name: &str, content_type: &str, path: &Path, len: u64) -> Self {
        Self {
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            body: UploadBody::File {
                path: path.to_path_buf(),
                len,
            },
        }
    }
}

/// Reasons an upload did not produce a durable URI.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response carried no transaction id")]
    MissingTransactionId,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid content type {0}")]
    InvalidContentType(String),

    #[error("cannot read asset: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        UploadError::Transport(err.to_string())
    }
}

/// Pushes bytes to permanent storage and returns the durable URI.
#[async_trait]
pub trait AssetUploader: Send + Sync {
    async fn upload(&self, request: UploadRequest) -> Result<String, UploadError>;
}

/// Hash a local asset, upload it, and pair the result with its local hash.
///
/// The hash is computed from the local file, never from the remote copy.
pub async fn upload_asset(
    uploader: &dyn AssetUploader,
    kind: AssetKind,
    path: &Path,
) -> Result<UploadedAsset, UploadError> {
    let (sha256, size) = ContentHash::from_async_file(path).await?;
    let dimensions = if kind.is_image() {
        dimensions_from_bytes(&tokio::fs::read(path).await?)
    } else {
        None
    };
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("asset")
        .to_string();
    let content_type = kind.content_type(path).to_string();

    let request = UploadRequest::file(&file_name, &content_type, path, size);
    let uri = uploader.upload(request).await?;
    Ok(UploadedAsset {
        kind,
        path: path.to_path_buf(),
        content_type,
        uri,
        sha256,
        size,
        dimensions,
    })
}

#[derive(Debug, Deserialize)]
struct BundlerReceipt {
    #[serde(default)]
    id: Option<String>,
}

/// Uploader for an Irys-style bundler in front of Arweave.
pub struct BundlerUploader {
    upload_url: String,
    gateway_url: String,
    http_client: reqwest::Client,
}

impl BundlerUploader {
    /// Create an uploader for the given bundler endpoint and gateway base.
    pub fn new(upload_url: &str, gateway_url: &str) -> Result<Self, UploadError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("dappstore-publish/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(BundlerUploader {
            upload_url: upload_url.to_string(),
            gateway_url: gateway_url.to_string(),
            http_client,
        })
    }

    /// Create an uploader from pipeline settings.
    pub fn from_settings(settings: &PipelineSettings) -> Result<Self, UploadError> {
        Self::new(&settings.upload_url, &settings.gateway_url)
    }
}

#[async_trait]
impl AssetUploader for BundlerUploader {
    async fn upload(&self, request: UploadRequest) -> Result<String, UploadError> {
        let size = request.body.len();
        debug!(file = %request.file_name, size, "uploading to permanent storage");

        let part = match request.body {
            UploadBody::Bytes(bytes) => reqwest::multipart::Part::bytes(bytes),
            UploadBody::File { path, len } => {
                let file = tokio::fs::File::open(&path).await?;
                let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
                reqwest::multipart::Part::stream_with_length(body, len)
            }
        };
        let part = part
            .file_name(request.file_name.clone())
            .mime_str(&request.content_type)
            .map_err(|_| UploadError::InvalidContentType(request.content_type.clone()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http_client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            warn!(file = %request.file_name, status = status.as_u16(), body = %body, "upload rejected");
            return Err(UploadError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let tx_id = serde_json::from_str::<BundlerReceipt>(&body)
            .ok()
            .and_then(|r| r.id)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                warn!(file = %request.file_name, body = %body, "upload response missing id");
                UploadError::MissingTransactionId
            })?;

        let uri = join_gateway(&self.gateway_url, &tx_id);
        debug!(file = %request.file_name, uri = %uri, "uploaded");
        Ok(uri)
    }
}

/// Uploader that never touches the network and hands out synthetic ids.
pub struct SimulatedUploader {
    gateway_url: String,
}

impl SimulatedUploader {
    pub fn new(gateway_url: &str) -> Self {
        Self {
            gateway_url: gateway_url.to_string(),
        }
    }
}

#[async_trait]
impl AssetUploader for SimulatedUploader {
    async fn upload(&self, request: UploadRequest) -> Result<String, UploadError> {
        let tx_id = format!("sim-{}", uuid::Uuid::new_v4().simple());
        debug!(file = %request.file_name, tx_id = %tx_id, "SIMULATION: upload skipped");
        Ok(join_gateway(&self.gateway_url, &tx_id))
    }
}

fn join_gateway(base: &str, tx_id: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, tx_id)
    } else {
        format!("{}/{}", base, tx_id)
    }
}
