use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Persisted body of one analysis.
///
/// Serialized in the single-key shape older rows already use, so the key is
/// the discriminant: `{"suggestions": ..}`, `{"error": ..}` or `{"text": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisPayload {
    Suggestions(String),
    Error(String),
    /// Legacy shape; never produced by the pipeline, only read back.
    Text(String),
}

impl AnalysisPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Suggestions(_) => "suggestions",
            Self::Error(_) => "error",
            Self::Text(_) => "text",
        }
    }

    pub fn body(&self) -> &str {
        match self {
            Self::Suggestions(text) | Self::Error(text) | Self::Text(text) => text,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn to_value(&self) -> Value {
        let mut object = serde_json::Map::new();
        object.insert(self.kind().to_string(), Value::String(self.body().to_string()));
        Value::Object(object)
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// Result of one vision call. Produced by the fail-soft adapter, which never
/// raises: every provider problem becomes a `Failure`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    Success { text: String },
    Failure { reason: String },
}

impl AnalysisOutcome {
    pub fn success(text: impl Into<String>) -> Self {
        Self::Success { text: text.into() }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn into_payload(self) -> AnalysisPayload {
        match self {
            Self::Success { text } => AnalysisPayload::Suggestions(text),
            Self::Failure { reason } => AnalysisPayload::Error(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRecord {
    pub id: String,
    pub user_ref: Option<String>,
    pub image_ref: String,
    pub payload: AnalysisPayload,
    pub created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    /// Wire shape used by the HTTP API and `roomcraft show`.
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "user_id": self.user_ref,
            "image_path": self.image_ref,
            "analysis_data": self.payload.to_value(),
            "outcome": self.payload.kind(),
            "created_at": self.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        })
    }
}

/// Transient result of an inspiration request; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub generated_url: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn payload_keeps_single_key_shape() -> anyhow::Result<()> {
        let payload = AnalysisPayload::Suggestions("Use warm neutral tones.".to_string());
        assert_eq!(
            serde_json::to_value(&payload)?,
            json!({"suggestions": "Use warm neutral tones."})
        );
        assert_eq!(payload.to_value(), serde_json::to_value(&payload)?);

        let failed = AnalysisPayload::Error("timeout".to_string());
        assert_eq!(serde_json::to_value(&failed)?, json!({"error": "timeout"}));
        Ok(())
    }

    #[test]
    fn legacy_text_rows_decode() -> anyhow::Result<()> {
        let payload = AnalysisPayload::from_value(json!({"text": "old row"}))?;
        assert_eq!(payload, AnalysisPayload::Text("old row".to_string()));
        assert_eq!(payload.kind(), "text");
        Ok(())
    }

    #[test]
    fn unknown_shapes_are_rejected() {
        assert!(AnalysisPayload::from_value(json!({"colors": ["red"]})).is_err());
        assert!(AnalysisPayload::from_value(json!("bare string")).is_err());
    }

    #[test]
    fn outcome_maps_to_payload_variant() {
        let ok = AnalysisOutcome::success("Add plants.").into_payload();
        assert_eq!(ok, AnalysisPayload::Suggestions("Add plants.".to_string()));

        let failed = AnalysisOutcome::failure("403 Forbidden").into_payload();
        assert!(failed.is_error());
        assert_eq!(failed.body(), "403 Forbidden");
    }

    #[test]
    fn record_json_uses_column_names() {
        let record = AnalysisRecord {
            id: "rec-1".to_string(),
            user_ref: None,
            image_ref: "https://cdn.example/room.png".to_string(),
            payload: AnalysisPayload::Error("boom".to_string()),
            created_at: Utc::now(),
        };
        let value = record.to_json();
        assert_eq!(value["image_path"], json!("https://cdn.example/room.png"));
        assert_eq!(value["user_id"], Value::Null);
        assert_eq!(value["analysis_data"], json!({"error": "boom"}));
        assert_eq!(value["outcome"], json!("error"));
    }
}
