use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgba, RgbaImage};
use reqwest::blocking::Client as HttpClient;
use roomcraft_contracts::analysis::AnalysisOutcome;
use serde_json::{json, Value};

use crate::config::GeminiConfig;
use crate::{build_http_client, error_chain_text, response_json_or_error, truncate_text};

pub const ROOM_ANALYSIS_PROMPT: &str = "Analyze this room image and suggest:
1. Ideal color palette for walls
2. Furniture style recommendations
3. Lighting setup improvements
4. Additional decor suggestions (plants, art, etc.)
Give a short AI interior design summary.";

const VISION_MAX_DIM: u32 = 1536;
const FAILURE_REASON_MAX_CHARS: usize = 1024;

/// A multimodal model that turns a decoded room photo into free text.
pub trait VisionBackend: Send + Sync {
    fn name(&self) -> &str;
    fn describe(&self, image: &DynamicImage, prompt: &str) -> Result<String>;
}

/// Fail-soft analysis capability: always yields an outcome, never an error.
pub trait RoomAnalyzer: Send + Sync {
    fn name(&self) -> &str;
    fn analyze(&self, image_url: &str) -> AnalysisOutcome;
}

pub const UNSUPPORTED_IMAGE_SCHEME: &str = "unsupported image URL scheme";
pub const LOCAL_IMAGE_UNAVAILABLE: &str = "image is not in the upload directory";

/// Downloads `http(s)://` references. `file://` references are read only when
/// a local upload root is configured, and only from inside that root.
pub struct ImageFetcher {
    http: HttpClient,
    local_root: Option<PathBuf>,
}

impl ImageFetcher {
    pub fn new(timeout: Duration, local_root: Option<PathBuf>) -> Result<Self> {
        Ok(Self {
            http: build_http_client(timeout).map_err(anyhow::Error::msg)?,
            local_root,
        })
    }

    pub fn fetch(&self, image_url: &str) -> Result<Vec<u8>> {
        let trimmed = image_url.trim();
        if let Some(path) = trimmed.strip_prefix("file://") {
            return self.read_local(path);
        }
        let lowered = trimmed.to_ascii_lowercase();
        if !(lowered.starts_with("http://") || lowered.starts_with("https://")) {
            bail!(UNSUPPORTED_IMAGE_SCHEME);
        }
        let response = self
            .http
            .get(trimmed)
            .send()
            .with_context(|| format!("failed downloading room image ({trimmed})"))?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            bail!(
                "room image download failed ({code}): {}",
                truncate_text(&body, 512)
            );
        }
        Ok(response
            .bytes()
            .context("failed reading room image bytes")?
            .to_vec())
    }

    /// Missing files and files outside the root fail with the same reason.
    fn read_local(&self, path: &str) -> Result<Vec<u8>> {
        let Some(root) = self.local_root.as_deref() else {
            bail!(UNSUPPORTED_IMAGE_SCHEME);
        };
        let inside = fs::canonicalize(root)
            .ok()
            .zip(fs::canonicalize(path).ok())
            .filter(|(root, path)| path.starts_with(root))
            .map(|(_, path)| path);
        let Some(path) = inside else {
            bail!(LOCAL_IMAGE_UNAVAILABLE);
        };
        fs::read(&path).context(LOCAL_IMAGE_UNAVAILABLE)
    }
}

pub struct VisionAdapter {
    fetcher: ImageFetcher,
    backend: Arc<dyn VisionBackend>,
}

impl VisionAdapter {
    pub fn new(fetcher: ImageFetcher, backend: Arc<dyn VisionBackend>) -> Self {
        Self { fetcher, backend }
    }

    fn try_analyze(&self, image_url: &str) -> Result<String> {
        let bytes = self.fetcher.fetch(image_url)?;
        let image = image::load_from_memory(&bytes).context("failed decoding room image")?;
        self.backend.describe(&image, ROOM_ANALYSIS_PROMPT)
    }
}

impl RoomAnalyzer for VisionAdapter {
    fn name(&self) -> &str {
        self.backend.name()
    }

    fn analyze(&self, image_url: &str) -> AnalysisOutcome {
        match self.try_analyze(image_url) {
            Ok(text) => AnalysisOutcome::success(text),
            Err(err) => AnalysisOutcome::failure(error_chain_text(&err, FAILURE_REASON_MAX_CHARS)),
        }
    }
}

pub struct GeminiVision {
    config: GeminiConfig,
    http: HttpClient,
}

impl GeminiVision {
    pub fn new(config: GeminiConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            config,
            http: build_http_client(timeout).map_err(anyhow::Error::msg)?,
        })
    }

    fn endpoint(&self) -> String {
        let trimmed = self.config.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.config.api_base, model_path)
    }

    fn extract_text(response: &Value) -> String {
        let candidates = response
            .get("candidates")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut parts_out: Vec<String> = Vec::new();
        for candidate in candidates {
            let parts = candidate
                .get("content")
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for part in parts {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    if !text.trim().is_empty() {
                        parts_out.push(text.trim().to_string());
                    }
                }
            }
        }
        parts_out.join("\n").trim().to_string()
    }
}

impl VisionBackend for GeminiVision {
    fn name(&self) -> &str {
        "gemini"
    }

    fn describe(&self, image: &DynamicImage, prompt: &str) -> Result<String> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            bail!("GEMINI_API_KEY not set");
        };
        let jpeg = encode_vision_jpeg(image, VISION_MAX_DIM)?;
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": prompt },
                    {
                        "inlineData": {
                            "mimeType": "image/jpeg",
                            "data": BASE64.encode(jpeg),
                        }
                    }
                ]
            }]
        });
        let endpoint = self.endpoint();
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .json(&payload)
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let parsed = response_json_or_error("Gemini", response)?;
        let text = Self::extract_text(&parsed);
        if text.is_empty() {
            let reason = parsed
                .get("promptFeedback")
                .and_then(|feedback| feedback.get("blockReason"))
                .and_then(Value::as_str)
                .unwrap_or("empty response");
            bail!("Gemini returned no analysis text ({reason})");
        }
        Ok(text)
    }
}

/// Offline back-end: a canned critique derived from the photo's own pixels.
pub struct DryrunVision;

impl VisionBackend for DryrunVision {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn describe(&self, image: &DynamicImage, _prompt: &str) -> Result<String> {
        let stats = RoomImageStats::from_image(image);
        let mood = color_name(stats.mean_r, stats.mean_g, stats.mean_b);
        let lighting = if stats.brightness < 0.3 {
            "The room reads dark; layer a warm ceiling fixture with two floor lamps."
        } else if stats.brightness > 0.8 {
            "The room is bright; soften glare with sheer curtains and dimmable bulbs."
        } else {
            "Lighting is balanced; add a reading lamp to create a second focal zone."
        };
        let palette = stats.palette.join(", ");

        Ok(format!(
            "**Color palette:** The space is dominated by {mood} tones ({palette}). \
Keep walls in a soft neutral and carry the dominant hue into textiles.\n\n\
**Furniture style:** Favor clean-lined pieces in natural wood to ground the {width}x{height} frame.\n\n\
**Lighting:** {lighting}\n\n\
**Decor:** Add one large plant and a piece of wall art that repeats the palette.\n\n\
**Summary:** A calm, cohesive refresh built around the existing {mood} character.",
            width = stats.width,
            height = stats.height,
        ))
    }
}

struct RoomImageStats {
    width: u32,
    height: u32,
    mean_r: f64,
    mean_g: f64,
    mean_b: f64,
    brightness: f64,
    palette: Vec<String>,
}

impl RoomImageStats {
    fn from_image(image: &DynamicImage) -> Self {
        let resized = image.resize_exact(96, 96, FilterType::Triangle).to_rgb8();
        let mut total = (0f64, 0f64, 0f64);
        let mut bins: HashMap<(u8, u8, u8), u64> = HashMap::new();
        let count = f64::from(resized.width() * resized.height()).max(1.0);

        for pixel in resized.pixels() {
            total.0 += f64::from(pixel[0]);
            total.1 += f64::from(pixel[1]);
            total.2 += f64::from(pixel[2]);
            let quantize = |channel: u8| (channel / 32) * 32;
            *bins
                .entry((quantize(pixel[0]), quantize(pixel[1]), quantize(pixel[2])))
                .or_insert(0) += 1;
        }

        let mut dominant: Vec<((u8, u8, u8), u64)> = bins.into_iter().collect();
        dominant.sort_by(|left, right| right.1.cmp(&left.1).then(left.0.cmp(&right.0)));
        let palette = dominant
            .into_iter()
            .take(3)
            .map(|((r, g, b), _)| format!("#{r:02X}{g:02X}{b:02X}"))
            .collect();

        let (mean_r, mean_g, mean_b) = (total.0 / count, total.1 / count, total.2 / count);
        Self {
            width: image.width(),
            height: image.height(),
            mean_r,
            mean_g,
            mean_b,
            brightness: ((mean_r + mean_g + mean_b) / (255.0 * 3.0)).clamp(0.0, 1.0),
            palette,
        }
    }
}

fn color_name(r: f64, g: f64, b: f64) -> &'static str {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let brightness = ((r + g + b) / (255.0 * 3.0)).clamp(0.0, 1.0);
    if max - min < 18.0 {
        if brightness > 0.78 {
            return "soft neutral";
        }
        if brightness < 0.22 {
            return "deep neutral";
        }
        return "muted neutral";
    }
    if max == r && g > b {
        "warm amber"
    } else if max == r {
        "terracotta red"
    } else if max == g {
        "sage green"
    } else if r > g {
        "dusky violet"
    } else {
        "cool blue"
    }
}

/// Flatten alpha onto white, bound the long edge, and re-encode as JPEG.
fn encode_vision_jpeg(image: &DynamicImage, max_dim: u32) -> Result<Vec<u8>> {
    let rgba = image.to_rgba8();
    let mut flattened = RgbaImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend =
            |channel: u8| -> u8 { (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8 };
        flattened.put_pixel(
            x,
            y,
            Rgba([blend(pixel[0]), blend(pixel[1]), blend(pixel[2]), 255]),
        );
    }
    let mut resized = DynamicImage::ImageRgba8(flattened);
    if resized.width().max(resized.height()) > max_dim {
        resized = resized.resize(max_dim, max_dim, FilterType::Triangle);
    }
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, 90)
        .encode_image(&DynamicImage::ImageRgb8(resized.to_rgb8()))
        .context("failed encoding room image as JPEG")?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use serde_json::json;

    use super::*;
    use crate::test_http::serve_once;

    struct ScriptedBackend {
        reply: Result<String, String>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(reply: Result<&str, &str>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(str::to_string).map_err(str::to_string),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl VisionBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        fn describe(&self, _image: &DynamicImage, prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(prompt.contains("Ideal color palette for walls"));
            self.reply.clone().map_err(anyhow::Error::msg)
        }
    }

    fn room_png() -> anyhow::Result<Vec<u8>> {
        let image = RgbImage::from_pixel(32, 24, Rgb([210, 190, 160]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }

    fn write_room_png(dir: &Path) -> anyhow::Result<String> {
        let path = dir.join("room.png");
        fs::write(&path, room_png()?)?;
        Ok(format!("file://{}", path.display()))
    }

    fn adapter(
        backend: Arc<dyn VisionBackend>,
        local_root: Option<&Path>,
    ) -> anyhow::Result<VisionAdapter> {
        Ok(VisionAdapter::new(
            ImageFetcher::new(Duration::from_secs(5), local_root.map(Path::to_path_buf))?,
            backend,
        ))
    }

    fn gemini(api_base: &str) -> anyhow::Result<Arc<GeminiVision>> {
        Ok(Arc::new(GeminiVision::new(
            GeminiConfig {
                api_key: Some("test-key".to_string()),
                api_base: api_base.to_string(),
                model: "gemini-2.5-flash".to_string(),
            },
            Duration::from_secs(5),
        )?))
    }

    fn failure_reason(outcome: AnalysisOutcome) -> anyhow::Result<String> {
        match outcome {
            AnalysisOutcome::Failure { reason } => Ok(reason),
            other => anyhow::bail!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn success_text_passes_through() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let url = write_room_png(temp.path())?;
        let backend = ScriptedBackend::new(Ok("Use warm neutral tones."));
        let outcome = adapter(backend.clone(), Some(temp.path()))?.analyze(&url);
        assert_eq!(outcome, AnalysisOutcome::success("Use warm neutral tones."));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn model_errors_become_failures() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let url = write_room_png(temp.path())?;
        let outcome =
            adapter(ScriptedBackend::new(Err("quota exhausted")), Some(temp.path()))?.analyze(&url);
        assert_eq!(outcome, AnalysisOutcome::failure("quota exhausted"));
        Ok(())
    }

    #[test]
    fn missing_local_files_become_failures_without_model_call() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let missing = format!("file://{}", temp.path().join("missing.png").display());
        let backend = ScriptedBackend::new(Ok("unused"));
        let outcome = adapter(backend.clone(), Some(temp.path()))?.analyze(&missing);
        assert_eq!(failure_reason(outcome)?, LOCAL_IMAGE_UNAVAILABLE);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn file_urls_are_refused_without_a_local_root() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let existing = write_room_png(temp.path())?;
        let backend = ScriptedBackend::new(Ok("unused"));
        let adapter = adapter(backend.clone(), None)?;

        for url in [
            "file:///etc/hostname",
            "file:///nonexistent/x.png",
            existing.as_str(),
        ] {
            assert_eq!(failure_reason(adapter.analyze(url))?, UNSUPPORTED_IMAGE_SCHEME);
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn file_urls_outside_the_root_look_like_missing_files() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let uploads = temp.path().join("uploads");
        fs::create_dir_all(&uploads)?;
        let outside = write_room_png(temp.path())?;
        let escaped = format!("file://{}/../room.png", uploads.display());
        let missing = format!("file://{}/gone.png", uploads.display());
        let backend = ScriptedBackend::new(Ok("unused"));
        let adapter = adapter(backend.clone(), Some(&uploads))?;

        for url in [outside.as_str(), escaped.as_str(), missing.as_str()] {
            assert_eq!(failure_reason(adapter.analyze(url))?, LOCAL_IMAGE_UNAVAILABLE);
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn other_schemes_are_refused() -> anyhow::Result<()> {
        let adapter = adapter(ScriptedBackend::new(Ok("unused")), None)?;
        for url in ["ftp://cdn.test/room.png", "/etc/hostname", "data:image/png;base64,AA=="] {
            assert_eq!(failure_reason(adapter.analyze(url))?, UNSUPPORTED_IMAGE_SCHEME);
        }
        Ok(())
    }

    #[test]
    fn undecodable_bytes_become_failures() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("notes.txt");
        fs::write(&path, b"definitely not pixels")?;
        let backend = ScriptedBackend::new(Ok("unused"));
        let outcome = adapter(backend.clone(), Some(temp.path()))?
            .analyze(&format!("file://{}", path.display()));
        let reason = failure_reason(outcome)?;
        assert!(reason.contains("failed decoding room image"), "{reason}");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn http_download_is_decoded_and_described() -> anyhow::Result<()> {
        let (base, server) = serve_once("200 OK", "image/png", room_png()?)?;
        let backend = ScriptedBackend::new(Ok("Add a rug."));
        let outcome = adapter(backend.clone(), None)?.analyze(&format!("{base}/room.png"));
        assert_eq!(outcome, AnalysisOutcome::success("Add a rug."));
        assert!(server.request()?.starts_with("GET /room.png "));
        Ok(())
    }

    #[test]
    fn download_error_status_becomes_failure() -> anyhow::Result<()> {
        let (base, server) = serve_once("404 Not Found", "text/plain", b"gone".to_vec())?;
        let backend = ScriptedBackend::new(Ok("unused"));
        let outcome = adapter(backend.clone(), None)?.analyze(&format!("{base}/room.png"));
        let reason = failure_reason(outcome)?;
        assert!(reason.contains("room image download failed (404): gone"), "{reason}");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        server.request()?;
        Ok(())
    }

    #[test]
    fn gemini_error_status_becomes_failure() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let url = write_room_png(temp.path())?;
        let (base, server) = serve_once(
            "503 Service Unavailable",
            "application/json",
            br#"{"error":{"message":"overloaded"}}"#.to_vec(),
        )?;
        let outcome = adapter(gemini(&base)?, Some(temp.path()))?.analyze(&url);
        let reason = failure_reason(outcome)?;
        assert!(reason.contains("Gemini request failed (503)"), "{reason}");
        let request = server.request()?;
        assert!(request.starts_with("POST /models/gemini-2.5-flash:generateContent?key=test-key "));
        Ok(())
    }

    #[test]
    fn gemini_block_reason_becomes_failure() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let url = write_room_png(temp.path())?;
        let (base, server) = serve_once(
            "200 OK",
            "application/json",
            br#"{"candidates":[],"promptFeedback":{"blockReason":"SAFETY"}}"#.to_vec(),
        )?;
        let outcome = adapter(gemini(&base)?, Some(temp.path()))?.analyze(&url);
        assert_eq!(
            failure_reason(outcome)?,
            "Gemini returned no analysis text (SAFETY)"
        );
        server.request()?;
        Ok(())
    }

    #[test]
    fn gemini_empty_candidates_become_failure() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let url = write_room_png(temp.path())?;
        let (base, server) = serve_once("200 OK", "application/json", br#"{"candidates":[]}"#.to_vec())?;
        let outcome = adapter(gemini(&base)?, Some(temp.path()))?.analyze(&url);
        assert_eq!(
            failure_reason(outcome)?,
            "Gemini returned no analysis text (empty response)"
        );
        server.request()?;
        Ok(())
    }

    #[test]
    fn gemini_candidate_text_is_the_analysis() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let url = write_room_png(temp.path())?;
        let body = json!({
            "candidates": [{"content": {"parts": [{"text": "1. **Sage** walls"}]}}]
        });
        let (base, server) = serve_once("200 OK", "application/json", serde_json::to_vec(&body)?)?;
        let outcome = adapter(gemini(&base)?, Some(temp.path()))?.analyze(&url);
        assert_eq!(outcome, AnalysisOutcome::success("1. **Sage** walls"));
        assert!(server.request()?.contains("\"inlineData\""));
        Ok(())
    }

    #[test]
    fn gemini_without_key_fails_before_network() -> anyhow::Result<()> {
        let backend = GeminiVision::new(
            GeminiConfig {
                api_key: None,
                api_base: "http://127.0.0.1:9".to_string(),
                model: "gemini-2.5-flash".to_string(),
            },
            Duration::from_secs(5),
        )?;
        let image = DynamicImage::ImageRgb8(RgbImage::new(8, 8));
        let err = backend.describe(&image, ROOM_ANALYSIS_PROMPT).err();
        assert_eq!(
            err.map(|err| err.to_string()).as_deref(),
            Some("GEMINI_API_KEY not set")
        );
        Ok(())
    }

    #[test]
    fn gemini_endpoint_normalizes_model_prefix() -> anyhow::Result<()> {
        let backend = GeminiVision::new(
            GeminiConfig {
                api_key: None,
                api_base: "https://example.test/v1beta".to_string(),
                model: "models/gemini-2.5-flash".to_string(),
            },
            Duration::from_secs(5),
        )?;
        assert_eq!(
            backend.endpoint(),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
        Ok(())
    }

    #[test]
    fn gemini_text_parts_are_joined() {
        let response = json!({
            "candidates": [{
                "content": {"parts": [{"text": "1. Warm whites"}, {"text": " 2. Oak "}]}
            }]
        });
        assert_eq!(
            GeminiVision::extract_text(&response),
            "1. Warm whites\n2. Oak"
        );
    }

    #[test]
    fn dryrun_critique_mentions_palette_and_size() -> anyhow::Result<()> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 30, Rgb([240, 240, 238])));
        let text = DryrunVision.describe(&image, ROOM_ANALYSIS_PROMPT)?;
        assert!(text.contains("soft neutral"));
        assert!(text.contains("40x30"));
        assert!(text.contains("#E0E0E0"));
        Ok(())
    }

    #[test]
    fn vision_jpeg_is_bounded() -> anyhow::Result<()> {
        let image = DynamicImage::ImageRgb8(RgbImage::new(3000, 1000));
        let jpeg = encode_vision_jpeg(&image, 1536)?;
        let decoded = image::load_from_memory(&jpeg)?;
        assert_eq!(decoded.width(), 1536);
        Ok(())
    }
}
