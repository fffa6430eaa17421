use rusqlite::{params, OptionalExtension, Row};
use roomcraft_contracts::analysis::{AnalysisPayload, AnalysisRecord};

use super::{new_id, now_utc, parse_timestamp, timestamp_text, SqliteStore, StoreError};

/// Create/lookup over persisted analyses. There is no update or delete.
pub trait AnalysisRecords: Send + Sync {
    fn create(
        &self,
        user_ref: Option<&str>,
        image_ref: &str,
        payload: &AnalysisPayload,
    ) -> Result<AnalysisRecord, StoreError>;

    fn get(&self, id: &str) -> Result<AnalysisRecord, StoreError>;
}

impl AnalysisRecords for SqliteStore {
    fn create(
        &self,
        user_ref: Option<&str>,
        image_ref: &str,
        payload: &AnalysisPayload,
    ) -> Result<AnalysisRecord, StoreError> {
        let image_ref = image_ref.trim();
        if image_ref.is_empty() {
            return Err(StoreError::InvalidInput("image_path is required"));
        }
        let record = AnalysisRecord {
            id: new_id(),
            user_ref: user_ref
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            image_ref: image_ref.to_string(),
            payload: payload.clone(),
            created_at: now_utc(),
        };
        let analysis_data = serde_json::to_string(&record.payload.to_value())?;

        self.write(|tx| {
            tx.execute(
                r#"
                INSERT INTO room_analyses(id,user_id,image_path,analysis_data,outcome,created_at)
                VALUES (?1,?2,?3,?4,?5,?6)
                "#,
                params![
                    record.id,
                    record.user_ref,
                    record.image_ref,
                    analysis_data,
                    record.payload.kind(),
                    timestamp_text(&record.created_at),
                ],
            )?;
            Ok(())
        })?;
        Ok(record)
    }

    fn get(&self, id: &str) -> Result<AnalysisRecord, StoreError> {
        let row = self.read(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id,user_id,image_path,analysis_data,created_at FROM room_analyses WHERE id=?1",
                    params![id],
                    raw_row,
                )
                .optional()?)
        })?;
        let Some(raw) = row else {
            return Err(StoreError::NotFound(id.to_string()));
        };
        raw.into_record()
    }
}

struct RawAnalysisRow {
    id: String,
    user_id: Option<String>,
    image_path: String,
    analysis_data: String,
    created_at: String,
}

fn raw_row(row: &Row<'_>) -> rusqlite::Result<RawAnalysisRow> {
    Ok(RawAnalysisRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        image_path: row.get(2)?,
        analysis_data: row.get(3)?,
        created_at: row.get(4)?,
    })
}

impl RawAnalysisRow {
    fn into_record(self) -> Result<AnalysisRecord, StoreError> {
        let value: serde_json::Value = serde_json::from_str(&self.analysis_data)?;
        let payload = AnalysisPayload::from_value(value).map_err(|err| {
            StoreError::Corrupt(format!("analysis {} has unknown payload shape: {err}", self.id))
        })?;
        Ok(AnalysisRecord {
            created_at: parse_timestamp(&self.created_at)?,
            id: self.id,
            user_ref: self.user_id,
            image_ref: self.image_path,
            payload,
        })
    }
}
