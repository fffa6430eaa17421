use std::sync::Arc;

use roomcraft_contracts::analysis::{AnalysisOutcome, AnalysisRecord, GeneratedImage};
use roomcraft_contracts::events::EventWriter;
use roomcraft_contracts::providers::ProviderRegistry;
use serde_json::{json, Value};

use crate::config::EngineConfig;
use crate::error::PipelineError;
use crate::generation::{
    resolve_generated_url, DryrunGenerator, GenerationAdapter, GenerationBackend,
    HuggingFaceGenerator, ImageGenerator,
};
use crate::image_store::{CloudinaryStore, ImageStore, LocalImageStore};
use crate::map_object;
use crate::render::{render_markdown, render_plain};
use crate::store::AnalysisRecords;
use crate::vision::{
    DryrunVision, GeminiVision, ImageFetcher, RoomAnalyzer, VisionAdapter, VisionBackend,
};

pub const MISSING_IMAGE_URL: &str = "No image URL provided";
pub const MISSING_GENERATION_INPUTS: &str = "Missing imageUrl or suggestions";
pub const MISSING_IMAGE_FILE: &str = "No image file";

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub record: AnalysisRecord,
    pub html: String,
}

impl AnalysisResult {
    pub fn record_id(&self) -> &str {
        &self.record.id
    }

    /// Carries both the legacy snake_case keys and the camelCase ones.
    pub fn to_json(&self) -> Value {
        json!({
            "analysis": self.html,
            "record_id": self.record.id,
            "analysisHtml": self.html,
            "recordId": self.record.id,
            "outcome": self.record.payload.kind(),
        })
    }
}

/// Stateless coordinator over the adapters and the record store.
///
/// Stages run strictly in sequence on the calling thread; nothing is
/// retried here.
pub struct RoomPipeline {
    analyzer: Arc<dyn RoomAnalyzer>,
    generator: Arc<dyn ImageGenerator>,
    images: Arc<dyn ImageStore>,
    records: Arc<dyn AnalysisRecords>,
    events: EventWriter,
}

impl RoomPipeline {
    pub fn new(
        analyzer: Arc<dyn RoomAnalyzer>,
        generator: Arc<dyn ImageGenerator>,
        images: Arc<dyn ImageStore>,
        records: Arc<dyn AnalysisRecords>,
        events: EventWriter,
    ) -> Self {
        Self {
            analyzer,
            generator,
            images,
            records,
            events,
        }
    }

    /// Wires the configured back-ends. Builds blocking HTTP clients, so call
    /// it outside any async runtime.
    pub fn from_config(
        config: &EngineConfig,
        records: Arc<dyn AnalysisRecords>,
        events: EventWriter,
    ) -> Result<Self, PipelineError> {
        let mut stores: ProviderRegistry<dyn ImageStore> = ProviderRegistry::new();
        stores.register(
            "cloudinary",
            Arc::new(CloudinaryStore::new(
                config.cloudinary.clone(),
                config.request_timeout,
            )?),
        );
        stores.register("local", Arc::new(LocalImageStore::new(config.upload_dir.clone())));
        let images = stores
            .select(&config.image_store)
            .map_err(PipelineError::Validation)?;

        let mut vision: ProviderRegistry<dyn VisionBackend> = ProviderRegistry::new();
        vision.register(
            "gemini",
            Arc::new(
                GeminiVision::new(config.gemini.clone(), config.request_timeout)
                    .map_err(|err| PipelineError::Upstream(format!("{err:#}")))?,
            ),
        );
        vision.register("dryrun", Arc::new(DryrunVision));
        let vision_backend = vision
            .select(&config.vision_provider)
            .map_err(PipelineError::Validation)?;
        // `file://` references are only meaningful for the local store's own uploads.
        let local_root = (config.image_store == "local").then(|| config.upload_dir.clone());
        let fetcher = ImageFetcher::new(config.request_timeout, local_root)
            .map_err(|err| PipelineError::Upstream(format!("{err:#}")))?;

        let mut generators: ProviderRegistry<dyn GenerationBackend> = ProviderRegistry::new();
        generators.register(
            "huggingface",
            Arc::new(HuggingFaceGenerator::new(
                config.huggingface.clone(),
                config.generation_timeout,
            )?),
        );
        generators.register("dryrun", Arc::new(DryrunGenerator::default()));
        let generation_backend = generators
            .select(&config.generation_provider)
            .map_err(PipelineError::Validation)?;

        Ok(Self::new(
            Arc::new(VisionAdapter::new(fetcher, vision_backend)),
            Arc::new(GenerationAdapter::new(generation_backend, images.clone())),
            images,
            records,
            events,
        ))
    }

    pub fn image_store_name(&self) -> &str {
        self.images.name()
    }

    pub fn upload(&self, bytes: &[u8], mime_type: Option<&str>) -> Result<String, PipelineError> {
        if bytes.is_empty() {
            return Err(PipelineError::Validation(MISSING_IMAGE_FILE.to_string()));
        }
        let url = self.images.upload(bytes, mime_type)?;
        self.events.emit_quiet(
            "image_uploaded",
            map_object(json!({
                "request_id": request_id(),
                "store": self.images.name(),
                "bytes": bytes.len(),
                "url": url,
            })),
        );
        Ok(url)
    }

    /// Vision failures are captured into the stored record rather than
    /// returned; only a missing image or a failed write is an `Err`.
    pub fn analyze(
        &self,
        image_ref: Option<&str>,
        user_ref: Option<&str>,
    ) -> Result<AnalysisResult, PipelineError> {
        let Some(image_ref) = non_empty(image_ref) else {
            return Err(PipelineError::Validation(MISSING_IMAGE_URL.to_string()));
        };
        let request_id = request_id();
        self.events.emit_quiet(
            "analysis_started",
            map_object(json!({
                "request_id": request_id,
                "provider": self.analyzer.name(),
                "image_url": image_ref,
                "user_id": user_ref,
            })),
        );

        let outcome = self.analyzer.analyze(image_ref);
        let html = match &outcome {
            AnalysisOutcome::Success { text } => render_markdown(text),
            AnalysisOutcome::Failure { reason } => {
                self.events.emit_quiet(
                    "analysis_captured_failure",
                    map_object(json!({ "request_id": request_id, "reason": reason })),
                );
                render_plain(reason)
            }
        };

        let payload = outcome.into_payload();
        let record = match self.records.create(user_ref, image_ref, &payload) {
            Ok(record) => record,
            Err(err) => {
                self.events.emit_quiet(
                    "analysis_persist_failed",
                    map_object(json!({ "request_id": request_id, "error": err.to_string() })),
                );
                return Err(PipelineError::Persistence(err.to_string()));
            }
        };
        self.events.emit_quiet(
            "analysis_persisted",
            map_object(json!({
                "request_id": request_id,
                "record_id": record.id,
                "outcome": record.payload.kind(),
            })),
        );
        Ok(AnalysisResult { record, html })
    }

    /// Both inputs are checked before any provider or store is touched.
    pub fn generate_inspiration(
        &self,
        image_ref: Option<&str>,
        suggestions: Option<&str>,
    ) -> Result<GeneratedImage, PipelineError> {
        let (Some(image_ref), Some(suggestions)) = (non_empty(image_ref), non_empty(suggestions))
        else {
            return Err(PipelineError::Validation(
                MISSING_GENERATION_INPUTS.to_string(),
            ));
        };
        let request_id = request_id();
        self.events.emit_quiet(
            "inspiration_started",
            map_object(json!({
                "request_id": request_id,
                "provider": self.generator.name(),
                "image_url": image_ref,
            })),
        );

        let resolved = self
            .generator
            .generate(image_ref, suggestions)
            .and_then(|envelope| resolve_generated_url(&envelope));
        match resolved {
            Ok(generated_url) => {
                self.events.emit_quiet(
                    "inspiration_generated",
                    map_object(json!({
                        "request_id": request_id,
                        "generated_url": generated_url,
                    })),
                );
                Ok(GeneratedImage { generated_url })
            }
            Err(err) => {
                self.events.emit_quiet(
                    "inspiration_failed",
                    map_object(json!({
                        "request_id": request_id,
                        "kind": err.kind(),
                        "error": err.to_string(),
                    })),
                );
                Err(err)
            }
        }
    }

    pub fn record(&self, id: &str) -> Result<AnalysisRecord, PipelineError> {
        Ok(self.records.get(id.trim())?)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
