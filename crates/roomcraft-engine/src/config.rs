use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_VISION_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_HF_API_URL: &str =
    "https://router.huggingface.co/hf-inference/models/stabilityai/stable-diffusion-xl-base-1.0";
pub const DEFAULT_CLOUDINARY_API_BASE: &str = "https://api.cloudinary.com/v1_1";
pub const DATABASE_FILE_NAME: &str = "interior_design.db";
pub const EVENTS_FILE_NAME: &str = "events.jsonl";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuggingFaceConfig {
    pub api_key: Option<String>,
    pub api_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudinaryConfig {
    pub cloud_name: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub api_base: String,
}

impl CloudinaryConfig {
    /// All three credentials, or `None` if any is missing.
    pub fn credentials(&self) -> Option<(&str, &str, &str)> {
        Some((
            self.cloud_name.as_deref()?,
            self.api_key.as_deref()?,
            self.api_secret.as_deref()?,
        ))
    }
}

/// Everything the adapters need, resolved once at startup and handed to each
/// adapter constructor. Adapters never read the environment themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub vision_provider: String,
    pub generation_provider: String,
    pub image_store: String,
    pub gemini: GeminiConfig,
    pub huggingface: HuggingFaceConfig,
    pub cloudinary: CloudinaryConfig,
    pub upload_dir: PathBuf,
    pub data_dir: PathBuf,
    pub request_timeout: Duration,
    pub generation_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vision_provider: "gemini".to_string(),
            generation_provider: "huggingface".to_string(),
            image_store: "cloudinary".to_string(),
            gemini: GeminiConfig {
                api_key: None,
                api_base: DEFAULT_GEMINI_API_BASE.to_string(),
                model: DEFAULT_VISION_MODEL.to_string(),
            },
            huggingface: HuggingFaceConfig {
                api_key: None,
                api_url: DEFAULT_HF_API_URL.to_string(),
            },
            cloudinary: CloudinaryConfig {
                cloud_name: None,
                api_key: None,
                api_secret: None,
                api_base: DEFAULT_CLOUDINARY_API_BASE.to_string(),
            },
            upload_dir: PathBuf::from("uploads"),
            data_dir: PathBuf::from("."),
            request_timeout: Duration::from_secs(90),
            generation_timeout: Duration::from_secs(180),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup so tests never touch process env.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let first = |keys: &[&str]| first_non_empty(&lookup, keys);
        let defaults = Self::default();

        Self {
            vision_provider: first(&["ROOMCRAFT_VISION_PROVIDER"])
                .map(|value| value.to_ascii_lowercase())
                .unwrap_or(defaults.vision_provider),
            generation_provider: first(&["ROOMCRAFT_GENERATION_PROVIDER"])
                .map(|value| value.to_ascii_lowercase())
                .unwrap_or(defaults.generation_provider),
            image_store: first(&["ROOMCRAFT_IMAGE_STORE"])
                .map(|value| value.to_ascii_lowercase())
                .unwrap_or(defaults.image_store),
            gemini: GeminiConfig {
                api_key: first(&["GEMINI_API_KEY", "GOOGLE_API_KEY"]),
                api_base: first(&["GEMINI_API_BASE"])
                    .map(|value| value.trim_end_matches('/').to_string())
                    .unwrap_or(defaults.gemini.api_base),
                model: first(&["ROOMCRAFT_VISION_MODEL"]).unwrap_or(defaults.gemini.model),
            },
            huggingface: HuggingFaceConfig {
                api_key: first(&["HF_API_KEY", "HUGGINGFACE_API_KEY"]),
                api_url: first(&["HF_API_URL"]).unwrap_or(defaults.huggingface.api_url),
            },
            cloudinary: CloudinaryConfig {
                cloud_name: first(&["CLOUDINARY_CLOUD_NAME"]),
                api_key: first(&["CLOUDINARY_API_KEY"]),
                api_secret: first(&["CLOUDINARY_API_SECRET"]),
                api_base: first(&["CLOUDINARY_API_BASE"])
                    .map(|value| value.trim_end_matches('/').to_string())
                    .unwrap_or(defaults.cloudinary.api_base),
            },
            upload_dir: first(&["ROOMCRAFT_UPLOAD_DIR"])
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            data_dir: first(&["ROOMCRAFT_DATA_DIR"])
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            request_timeout: seconds(
                first(&["ROOMCRAFT_REQUEST_TIMEOUT_SECS"]),
                defaults.request_timeout,
            ),
            generation_timeout: seconds(
                first(&["ROOMCRAFT_GENERATION_TIMEOUT_SECS"]),
                defaults.generation_timeout,
            ),
        }
    }

    /// Offline configuration: dryrun providers and a local upload directory.
    pub fn dryrun(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            vision_provider: "dryrun".to_string(),
            generation_provider: "dryrun".to_string(),
            image_store: "local".to_string(),
            upload_dir: data_dir.join("uploads"),
            data_dir,
            ..Self::default()
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE_NAME)
    }

    pub fn events_path(&self) -> PathBuf {
        self.data_dir.join(EVENTS_FILE_NAME)
    }
}

fn first_non_empty(lookup: &impl Fn(&str) -> Option<String>, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(value) = lookup(key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

fn seconds(raw: Option<String>, default: Duration) -> Duration {
    raw.and_then(|value| value.parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs.clamp(5, 600)))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[]));
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.database_path(), PathBuf::from("./interior_design.db"));
    }

    #[test]
    fn first_non_empty_key_wins() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "   "),
            ("GOOGLE_API_KEY", "google-key"),
            ("HF_API_KEY", "hf-key"),
        ]));
        assert_eq!(config.gemini.api_key.as_deref(), Some("google-key"));
        assert_eq!(config.huggingface.api_key.as_deref(), Some("hf-key"));
    }

    #[test]
    fn api_bases_are_trimmed_and_providers_lowercased() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("GEMINI_API_BASE", "http://localhost:9000/v1beta/"),
            ("ROOMCRAFT_VISION_PROVIDER", "DryRun"),
        ]));
        assert_eq!(config.gemini.api_base, "http://localhost:9000/v1beta");
        assert_eq!(config.vision_provider, "dryrun");
    }

    #[test]
    fn timeouts_are_clamped() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("ROOMCRAFT_REQUEST_TIMEOUT_SECS", "1"),
            ("ROOMCRAFT_GENERATION_TIMEOUT_SECS", "nope"),
        ]));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.generation_timeout, Duration::from_secs(180));
    }

    #[test]
    fn cloudinary_credentials_require_all_three() {
        let partial = EngineConfig::from_lookup(lookup(&[
            ("CLOUDINARY_CLOUD_NAME", "demo"),
            ("CLOUDINARY_API_KEY", "123"),
        ]));
        assert!(partial.cloudinary.credentials().is_none());

        let full = EngineConfig::from_lookup(lookup(&[
            ("CLOUDINARY_CLOUD_NAME", "demo"),
            ("CLOUDINARY_API_KEY", "123"),
            ("CLOUDINARY_API_SECRET", "shh"),
        ]));
        assert_eq!(full.cloudinary.credentials(), Some(("demo", "123", "shh")));
    }
}
