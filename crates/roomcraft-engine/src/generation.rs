use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use image::{ImageFormat, Rgb, RgbImage};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::config::HuggingFaceConfig;
use crate::error::{upstream, PipelineError};
use crate::image_store::ImageStore;
use crate::{build_http_client, map_object, truncate_text};

pub const STYLE_DIRECTIVE: &str = "Make it elegant, cozy, and realistic with good lighting and decor.";

/// Provider response envelope. The result URL may sit under any of the keys
/// checked by [`resolve_generated_url`].
pub type GenerationEnvelope = Map<String, Value>;

/// Text-to-image model returning raw encoded image bytes.
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;
    fn render(&self, prompt: &str) -> Result<Vec<u8>, PipelineError>;
}

/// Fail-hard generation capability: errors propagate to the caller.
pub trait ImageGenerator: Send + Sync {
    fn name(&self) -> &str;
    fn generate(
        &self,
        image_url: &str,
        suggestions: &str,
    ) -> Result<GenerationEnvelope, PipelineError>;
}

pub fn compose_prompt(suggestions: &str) -> String {
    format!(
        "Redesign this room based on these interior design suggestions:\n{}\n\n{STYLE_DIRECTIVE}",
        suggestions.trim()
    )
}

type UrlAccessor = fn(&GenerationEnvelope) -> Option<&Value>;

fn generated_image_url_key(envelope: &GenerationEnvelope) -> Option<&Value> {
    envelope.get("generatedImageUrl")
}

fn url_key(envelope: &GenerationEnvelope) -> Option<&Value> {
    envelope.get("url")
}

fn image_url_key(envelope: &GenerationEnvelope) -> Option<&Value> {
    envelope.get("image_url")
}

fn nested_data_url(envelope: &GenerationEnvelope) -> Option<&Value> {
    envelope.get("data").and_then(|data| data.get("url"))
}

/// Tried in order; the first non-empty string wins.
const URL_ACCESSORS: [UrlAccessor; 4] = [
    generated_image_url_key,
    url_key,
    image_url_key,
    nested_data_url,
];

pub fn resolve_generated_url(envelope: &GenerationEnvelope) -> Result<String, PipelineError> {
    URL_ACCESSORS
        .iter()
        .find_map(|accessor| {
            accessor(envelope)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        })
        .ok_or(PipelineError::NoUrl)
}

pub struct GenerationAdapter {
    backend: Arc<dyn GenerationBackend>,
    store: Arc<dyn ImageStore>,
}

impl GenerationAdapter {
    pub fn new(backend: Arc<dyn GenerationBackend>, store: Arc<dyn ImageStore>) -> Self {
        Self { backend, store }
    }
}

impl ImageGenerator for GenerationAdapter {
    fn name(&self) -> &str {
        self.backend.name()
    }

    fn generate(
        &self,
        image_url: &str,
        suggestions: &str,
    ) -> Result<GenerationEnvelope, PipelineError> {
        let prompt = compose_prompt(suggestions);
        let bytes = self.backend.render(&prompt)?;
        let png = reencode_png(&bytes)?;
        let stored_url = self.store.upload(&png, Some("image/png"))?;
        Ok(map_object(json!({
            "image_url": stored_url,
            "provider": self.backend.name(),
            "source_url": image_url,
        })))
    }
}

fn reencode_png(bytes: &[u8]) -> Result<Vec<u8>, PipelineError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|err| PipelineError::Decode(format!("provider returned unreadable image: {err}")))?;
    let mut out = Cursor::new(Vec::new());
    decoded
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|err| PipelineError::Decode(format!("failed to re-encode PNG: {err}")))?;
    Ok(out.into_inner())
}

pub struct HuggingFaceGenerator {
    config: HuggingFaceConfig,
    http: HttpClient,
}

impl HuggingFaceGenerator {
    pub fn new(config: HuggingFaceConfig, timeout: Duration) -> Result<Self, PipelineError> {
        Ok(Self {
            config,
            http: build_http_client(timeout).map_err(PipelineError::Upstream)?,
        })
    }
}

impl GenerationBackend for HuggingFaceGenerator {
    fn name(&self) -> &str {
        "huggingface"
    }

    fn render(&self, prompt: &str) -> Result<Vec<u8>, PipelineError> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(PipelineError::Upstream("HF_API_KEY not set".to_string()));
        };
        let response = self
            .http
            .post(&self.config.api_url)
            .header(AUTHORIZATION, format!("Bearer {api_key}"))
            .header(ACCEPT, "image/png")
            .json(&json!({ "inputs": prompt }))
            .send()
            .map_err(|err| upstream("Hugging Face", err))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let body = response
            .bytes()
            .map_err(|err| upstream("Hugging Face", err))?;
        if !status.is_success() {
            return Err(PipelineError::Upstream(format!(
                "Hugging Face request failed ({}): {}",
                status.as_u16(),
                truncate_text(&String::from_utf8_lossy(&body), 512)
            )));
        }
        if content_type.contains("json") {
            return Err(PipelineError::Upstream(format!(
                "Hugging Face returned JSON instead of image bytes: {}",
                truncate_text(&String::from_utf8_lossy(&body), 512)
            )));
        }
        Ok(body.to_vec())
    }
}

/// Offline back-end: a solid-color PNG seeded by the prompt.
pub struct DryrunGenerator {
    width: u32,
    height: u32,
}

impl DryrunGenerator {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }
}

impl Default for DryrunGenerator {
    fn default() -> Self {
        Self::new(512, 512)
    }
}

impl GenerationBackend for DryrunGenerator {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn render(&self, prompt: &str) -> Result<Vec<u8>, PipelineError> {
        let (r, g, b) = color_from_prompt(prompt);
        let image = RgbImage::from_pixel(self.width, self.height, Rgb([r, g, b]));
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, ImageFormat::Png)
            .map_err(|err| PipelineError::Upstream(format!("dryrun render failed: {err}")))?;
        Ok(out.into_inner())
    }
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let digest = Sha256::digest(prompt.as_bytes());
    (digest[0], digest[1], digest[2])
}
