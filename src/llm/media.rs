use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use reqwest::StatusCode;
use teloxide::types::FileId;
use tracing::{debug, error, warn};

use crate::utils::http::get_http_client;

/// Media type assumed when neither the bytes nor the source say otherwise.
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

const MEDIA_DOWNLOAD_MAX_ATTEMPTS: usize = 3;
const MEDIA_DOWNLOAD_BASE_DELAY_MS: u64 = 400;
const MEDIA_DOWNLOAD_ERROR_BODY_LIMIT: usize = 800;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("failed to read image file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to download image: {0}")]
    Download(String),
    #[error("image source is empty")]
    Empty,
    #[error("no reader available for {0}")]
    Unsupported(&'static str),
}

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

fn normalize_image_mime(mime_type: &str) -> Option<String> {
    let lowered = mime_type.trim().to_ascii_lowercase();
    let normalized = match lowered.as_str() {
        "image/jpg" => "image/jpeg".to_string(),
        "image/heif" => "image/heic".to_string(),
        _ => lowered,
    };
    matches!(
        normalized.as_str(),
        "image/png" | "image/jpeg" | "image/webp" | "image/heic" | "image/gif"
    )
    .then_some(normalized)
}

/// Sniffed type first, then the type the source declared, then the default.
pub fn resolve_image_mime(bytes: &[u8], declared: Option<&str>) -> String {
    detect_mime_type(bytes)
        .as_deref()
        .and_then(normalize_image_mime)
        .or_else(|| declared.and_then(normalize_image_mime))
        .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string())
}

/// Where the bytes of an attached image can be read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageBlob {
    Telegram {
        file_id: FileId,
        mime_type: Option<String>,
    },
    File {
        path: PathBuf,
    },
    Memory {
        bytes: Vec<u8>,
        mime_type: Option<String>,
    },
}

impl ImageBlob {
    pub fn declared_mime(&self) -> Option<&str> {
        match self {
            ImageBlob::Telegram { mime_type, .. } | ImageBlob::Memory { mime_type, .. } => {
                mime_type.as_deref()
            }
            ImageBlob::File { .. } => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ImageBlob::Telegram { .. } => "telegram file",
            ImageBlob::File { .. } => "local file",
            ImageBlob::Memory { .. } => "in-memory image",
        }
    }
}

/// A selected image together with the reference used to show it back to the
/// user. Released when dropped.
#[derive(Debug)]
pub struct ImagePreview {
    blob: ImageBlob,
    preview_ref: String,
}

impl ImagePreview {
    pub fn new(blob: ImageBlob, preview_ref: impl Into<String>) -> Self {
        let preview_ref = preview_ref.into();
        debug!("Acquired image preview {}", preview_ref);
        Self { blob, preview_ref }
    }

    pub fn blob(&self) -> &ImageBlob {
        &self.blob
    }

    pub fn preview_ref(&self) -> &str {
        &self.preview_ref
    }
}

impl Drop for ImagePreview {
    fn drop(&mut self) {
        debug!("Released image preview {}", self.preview_ref);
    }
}

pub trait BlobReader {
    fn read(&self, blob: &ImageBlob) -> impl Future<Output = Result<Vec<u8>, EncodeError>> + Send;
}

/// Reads blobs that need no network access.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalBlobReader;

pub async fn read_local_blob(blob: &ImageBlob) -> Result<Vec<u8>, EncodeError> {
    match blob {
        ImageBlob::File { path } => {
            tokio::fs::read(path)
                .await
                .map_err(|source| EncodeError::Io {
                    path: path.clone(),
                    source,
                })
        }
        ImageBlob::Memory { bytes, .. } => Ok(bytes.clone()),
        other => Err(EncodeError::Unsupported(other.label())),
    }
}

impl BlobReader for LocalBlobReader {
    fn read(&self, blob: &ImageBlob) -> impl Future<Output = Result<Vec<u8>, EncodeError>> + Send {
        read_local_blob(blob)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime_type: String,
    pub data: String,
}

pub fn encode_data_uri(bytes: &[u8], declared_mime: Option<&str>) -> String {
    let mime_type = resolve_image_mime(bytes, declared_mime);
    format!(
        "data:{};base64,{}",
        mime_type,
        general_purpose::STANDARD.encode(bytes)
    )
}

/// Splits `data:<mime>;base64,<payload>` into its media type and payload. A
/// string without a header is treated as a bare payload.
pub fn strip_data_uri_header(encoded: &str) -> EncodedImage {
    let Some((header, payload)) = encoded.split_once(',') else {
        return EncodedImage {
            mime_type: DEFAULT_IMAGE_MIME.to_string(),
            data: encoded.to_string(),
        };
    };

    let mime_type = header
        .strip_prefix("data:")
        .and_then(|rest| rest.split(';').next())
        .and_then(normalize_image_mime)
        .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string());

    EncodedImage {
        mime_type,
        data: payload.to_string(),
    }
}

pub async fn encode_image<R: BlobReader>(
    reader: &R,
    blob: &ImageBlob,
) -> Result<EncodedImage, EncodeError> {
    let bytes = reader.read(blob).await?;
    if bytes.is_empty() {
        return Err(EncodeError::Empty);
    }
    let data_uri = encode_data_uri(&bytes, blob.declared_mime());
    let encoded = strip_data_uri_header(&data_uri);
    debug!(
        "Encoded {} as {} ({} base64 bytes)",
        blob.label(),
        encoded.mime_type,
        encoded.data.len()
    );
    Ok(encoded)
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn should_retry_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

pub async fn download_media(url: &str) -> Option<Vec<u8>> {
    let client = get_http_client();
    for attempt in 0..MEDIA_DOWNLOAD_MAX_ATTEMPTS {
        let response = match client.get(url).send().await {
            Ok(resp) => resp,
            Err(err) => {
                let retryable = should_retry_error(&err);
                let (timeout, connect, status) = (err.is_timeout(), err.is_connect(), err.status());
                warn!(
                    "Failed to fetch media: {} (timeout={}, connect={}, status={:?}, attempt={}/{})",
                    err.without_url(),
                    timeout,
                    connect,
                    status,
                    attempt + 1,
                    MEDIA_DOWNLOAD_MAX_ATTEMPTS
                );
                if !retryable || attempt + 1 == MEDIA_DOWNLOAD_MAX_ATTEMPTS {
                    return None;
                }
                let delay = Duration::from_millis(MEDIA_DOWNLOAD_BASE_DELAY_MS << attempt);
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(
                "Media download failed with status {}: {}",
                status,
                truncate_for_log(&body, MEDIA_DOWNLOAD_ERROR_BODY_LIMIT)
            );
            if !should_retry_status(status) || attempt + 1 == MEDIA_DOWNLOAD_MAX_ATTEMPTS {
                return None;
            }
            let delay = Duration::from_millis(MEDIA_DOWNLOAD_BASE_DELAY_MS << attempt);
            tokio::time::sleep(delay).await;
            continue;
        }

        return match response.bytes().await {
            Ok(bytes) => Some(bytes.to_vec()),
            Err(err) => {
                error!(
                    "Failed to read media bytes: {} (attempt={}/{})",
                    err.without_url(),
                    attempt + 1,
                    MEDIA_DOWNLOAD_MAX_ATTEMPTS
                );
                if attempt + 1 == MEDIA_DOWNLOAD_MAX_ATTEMPTS {
                    None
                } else {
                    let delay = Duration::from_millis(MEDIA_DOWNLOAD_BASE_DELAY_MS << attempt);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }
        };
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: [u8; 16] = [
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D',
        b'R',
    ];

    #[tokio::test]
    async fn encode_then_strip_matches_plain_base64() {
        let bytes = PNG_HEADER.to_vec();
        let blob = ImageBlob::Memory {
            bytes: bytes.clone(),
            mime_type: None,
        };
        let encoded = encode_image(&LocalBlobReader, &blob).await.unwrap();
        assert_eq!(encoded.data, general_purpose::STANDARD.encode(&bytes));
        assert_eq!(encoded.mime_type, "image/png");
    }

    #[test]
    fn data_uri_uses_sniffed_type() {
        let uri = encode_data_uri(&PNG_HEADER, Some("image/webp"));
        assert!(uri.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn unknown_bytes_fall_back_to_declared_then_default() {
        let bytes = b"not really an image";
        assert!(encode_data_uri(bytes, Some("image/webp")).starts_with("data:image/webp;base64,"));
        assert!(encode_data_uri(bytes, None).starts_with("data:image/jpeg;base64,"));
        assert!(encode_data_uri(bytes, Some("text/plain")).starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn strip_without_header_keeps_payload() {
        let stripped = strip_data_uri_header("aGVsbG8=");
        assert_eq!(stripped.data, "aGVsbG8=");
        assert_eq!(stripped.mime_type, DEFAULT_IMAGE_MIME);
    }

    #[test]
    fn strip_with_ambiguous_header_defaults_mime() {
        let stripped = strip_data_uri_header("data:;base64,aGVsbG8=");
        assert_eq!(stripped.data, "aGVsbG8=");
        assert_eq!(stripped.mime_type, DEFAULT_IMAGE_MIME);
        let jpg = strip_data_uri_header("data:image/jpg;base64,AAAA");
        assert_eq!(jpg.mime_type, "image/jpeg");
    }

    #[tokio::test]
    async fn missing_file_propagates_read_error() {
        let blob = ImageBlob::File {
            path: PathBuf::from("/definitely/not/here.png"),
        };
        let err = encode_image(&LocalBlobReader, &blob).await.unwrap_err();
        assert!(matches!(err, EncodeError::Io { .. }));
    }

    #[tokio::test]
    async fn empty_blob_is_rejected() {
        let blob = ImageBlob::Memory {
            bytes: Vec::new(),
            mime_type: None,
        };
        assert!(matches!(
            encode_image(&LocalBlobReader, &blob).await,
            Err(EncodeError::Empty)
        ));
    }

    #[tokio::test]
    async fn local_reader_refuses_telegram_files() {
        let blob = ImageBlob::Telegram {
            file_id: FileId("abc".to_string()),
            mime_type: None,
        };
        assert!(matches!(
            LocalBlobReader.read(&blob).await,
            Err(EncodeError::Unsupported(_))
        ));
    }
}
