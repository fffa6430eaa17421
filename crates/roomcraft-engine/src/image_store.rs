use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::Client as HttpClient;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::CloudinaryConfig;
use crate::error::PipelineError;
use crate::{build_http_client, truncate_text};

/// Remote object store for room photos and generated images.
///
/// Every call creates a new object; there is no dedup or idempotency key.
pub trait ImageStore: Send + Sync {
    fn name(&self) -> &str;
    fn upload(&self, bytes: &[u8], mime_type: Option<&str>) -> Result<String, PipelineError>;
}

pub struct CloudinaryStore {
    config: CloudinaryConfig,
    http: HttpClient,
}

impl CloudinaryStore {
    pub fn new(config: CloudinaryConfig, timeout: Duration) -> Result<Self, PipelineError> {
        Ok(Self {
            config,
            http: build_http_client(timeout).map_err(PipelineError::Storage)?,
        })
    }

    fn upload_endpoint(&self, cloud_name: &str) -> String {
        format!("{}/{}/image/upload", self.config.api_base, cloud_name)
    }

    fn extract_url(payload: &Value) -> Option<String> {
        payload
            .get("secure_url")
            .or_else(|| payload.get("url"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}

impl ImageStore for CloudinaryStore {
    fn name(&self) -> &str {
        "cloudinary"
    }

    fn upload(&self, bytes: &[u8], mime_type: Option<&str>) -> Result<String, PipelineError> {
        let Some((cloud_name, api_key, api_secret)) = self.config.credentials() else {
            return Err(PipelineError::Storage(
                "CLOUDINARY_CLOUD_NAME, CLOUDINARY_API_KEY and CLOUDINARY_API_SECRET must be set"
                    .to_string(),
            ));
        };

        let timestamp = chrono::Utc::now().timestamp();
        let signature = upload_signature(timestamp, api_secret);
        let mime = mime_type
            .map(str::to_string)
            .unwrap_or_else(|| mime_for_bytes(bytes).to_string());
        let file = MultipartPart::bytes(bytes.to_vec())
            .file_name(format!("upload.{}", extension_for_bytes(bytes, Some(&mime))))
            .mime_str(&mime)
            .map_err(|err| PipelineError::Storage(format!("invalid upload mime type: {err}")))?;
        let form = MultipartForm::new()
            .part("file", file)
            .text("api_key", api_key.to_string())
            .text("timestamp", timestamp.to_string())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let endpoint = self.upload_endpoint(cloud_name);
        let response = self
            .http
            .post(&endpoint)
            .multipart(form)
            .send()
            .map_err(|err| PipelineError::Storage(format!("Cloudinary upload failed: {err}")))?;
        let status = response.status();
        let body = response.text().map_err(|err| {
            PipelineError::Storage(format!("Cloudinary response body read failed: {err}"))
        })?;
        if !status.is_success() {
            return Err(PipelineError::Storage(format!(
                "Cloudinary upload failed ({}): {}",
                status.as_u16(),
                truncate_text(&body, 512)
            )));
        }
        let payload: Value = serde_json::from_str(&body).map_err(|err| {
            PipelineError::Storage(format!("Cloudinary returned invalid JSON payload: {err}"))
        })?;
        Self::extract_url(&payload).ok_or_else(|| {
            PipelineError::Storage("Cloudinary response missing secure_url".to_string())
        })
    }
}

/// Writes uploads into a directory and hands back `file://` URLs.
pub struct LocalImageStore {
    dir: PathBuf,
}

impl LocalImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ImageStore for LocalImageStore {
    fn name(&self) -> &str {
        "local"
    }

    fn upload(&self, bytes: &[u8], mime_type: Option<&str>) -> Result<String, PipelineError> {
        fs::create_dir_all(&self.dir).map_err(|err| {
            PipelineError::Storage(format!("failed to create {}: {err}", self.dir.display()))
        })?;
        let digest = hex::encode(Sha256::digest(bytes));
        let file_name = format!(
            "{}-{}.{}",
            &digest[..12],
            uuid::Uuid::new_v4().simple(),
            extension_for_bytes(bytes, mime_type)
        );
        let path = self.dir.join(file_name);
        fs::write(&path, bytes).map_err(|err| {
            PipelineError::Storage(format!("failed to write {}: {err}", path.display()))
        })?;
        let absolute = path.canonicalize().map_err(|err| {
            PipelineError::Storage(format!("failed to resolve {}: {err}", path.display()))
        })?;
        Ok(format!("file://{}", absolute.display()))
    }
}

fn upload_signature(timestamp: i64, api_secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("timestamp={timestamp}{api_secret}").as_bytes());
    hex::encode(hasher.finalize())
}

pub(crate) fn mime_for_bytes(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(format) => format.to_mime_type(),
        Err(_) => "application/octet-stream",
    }
}

fn extension_for_bytes(bytes: &[u8], mime_type: Option<&str>) -> &'static str {
    if let Ok(format) = image::guess_format(bytes) {
        if let Some(ext) = format.extensions_str().first() {
            return ext;
        }
    }
    let lowered = mime_type.unwrap_or_default().to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return "jpg";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    if lowered.contains("png") {
        return "png";
    }
    "bin"
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use image::{ImageFormat, Rgb, RgbImage};

    use super::*;

    fn png_bytes() -> Vec<u8> {
        let image = RgbImage::from_pixel(4, 4, Rgb([200, 180, 150]));
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, ImageFormat::Png)
            .expect("encode png");
        out.into_inner()
    }

    #[test]
    fn local_store_creates_a_new_object_per_call() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = LocalImageStore::new(temp.path().join("uploads"));
        let bytes = png_bytes();

        let first = store.upload(&bytes, None)?;
        let second = store.upload(&bytes, None)?;

        assert_ne!(first, second);
        assert!(first.starts_with("file://"));
        assert!(first.ends_with(".png"));
        let stored = fs::read(first.trim_start_matches("file://"))?;
        assert_eq!(stored, bytes);
        assert_eq!(fs::read_dir(store.dir())?.count(), 2);
        Ok(())
    }

    #[test]
    fn local_store_falls_back_to_mime_extension() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = LocalImageStore::new(temp.path());
        let url = store.upload(b"not really an image", Some("image/jpeg"))?;
        assert!(url.ends_with(".jpg"));
        Ok(())
    }

    #[test]
    fn cloudinary_without_credentials_is_a_storage_error() -> anyhow::Result<()> {
        let store = CloudinaryStore::new(
            CloudinaryConfig {
                cloud_name: Some("demo".to_string()),
                api_key: None,
                api_secret: None,
                api_base: "http://127.0.0.1:9".to_string(),
            },
            Duration::from_secs(5),
        )?;
        let err = store.upload(&png_bytes(), None).err();
        assert!(matches!(err, Some(PipelineError::Storage(_))));
        Ok(())
    }

    #[test]
    fn signature_is_hex_sha256_of_signed_params() {
        let signature = upload_signature(1_700_000_000, "secret");
        let expected = hex::encode(Sha256::digest(b"timestamp=1700000000secret"));
        assert_eq!(signature, expected);
        assert_eq!(signature.len(), 64);
    }

    #[test]
    fn extract_url_prefers_secure_url() {
        let payload = serde_json::json!({
            "url": "http://res.cloudinary.com/demo/a.png",
            "secure_url": "https://res.cloudinary.com/demo/a.png",
        });
        assert_eq!(
            CloudinaryStore::extract_url(&payload).as_deref(),
            Some("https://res.cloudinary.com/demo/a.png")
        );
    }

    #[test]
    fn mime_sniffing_recognizes_png() {
        assert_eq!(mime_for_bytes(&png_bytes()), "image/png");
        assert_eq!(mime_for_bytes(b"plain"), "application/octet-stream");
    }
}
