//! Bounding-box and polygon annotations
//!
//! Annotations are keyed to (transformerNo, inspectionNo) and store
//! their geometry as JSON-encoded strings, mirroring what the detector
//! and the review UI exchange.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::Row;

use crate::error::{Error, Result};
use crate::models::ResponseCode;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub id: u64,
    pub transformer_no: String,
    pub inspection_no: String,
    /// JSON array `[x1, y1, x2, y2]`
    pub bbox: String,
    /// JSON array of points `[[x1,y1],[x2,y2],...]`
    pub polygon: Option<String>,
    pub shape: Option<String>,
    pub class_name: String,
    pub confidence: Option<f64>,
    /// AI_DETECTED, MANUAL_ADDED, EDITED, DELETED
    pub annotation_type: String,
    /// pending, accepted, rejected
    pub status: Option<String>,
    pub comment: Option<String>,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationRequest {
    pub bbox: Option<serde_json::Value>,
    pub polygon: Option<serde_json::Value>,
    pub shape: Option<String>,
    pub class_name: Option<String>,
    pub confidence: Option<f64>,
    pub annotation_type: Option<String>,
    pub status: Option<String>,
    pub comment: Option<String>,
    pub user_id: Option<String>,
}

pub struct AnnotationService {
    pool: MySqlPool,
}

impl AnnotationService {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        transformer_no: &str,
        inspection_no: &str,
        request: AnnotationRequest,
    ) -> Result<Annotation> {
        let (bbox, class_name, annotation_type) = validate(&request)?;
        let polygon = request.polygon.as_ref().map(|p| p.to_string());
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO annotations
                (transformer_no, inspection_no, bbox, polygon, shape, class_name,
                 confidence, annotation_type, status, comment, user_id,
                 created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(transformer_no)
        .bind(inspection_no)
        .bind(&bbox)
        .bind(&polygon)
        .bind(request.shape.as_deref().unwrap_or("bbox"))
        .bind(&class_name)
        .bind(request.confidence)
        .bind(&annotation_type)
        .bind(request.status.as_deref().unwrap_or("pending"))
        .bind(&request.comment)
        .bind(&request.user_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to insert annotation");
            Error::Operation(ResponseCode::AnnotationNotCreated)
        })?;

        let id = result.last_insert_id();
        tracing::info!(
            id = id,
            transformer_no = %transformer_no,
            inspection_no = %inspection_no,
            class_name = %class_name,
            "Annotation created"
        );
        self.get(id).await
    }

    pub async fn get(&self, id: u64) -> Result<Annotation> {
        let row = sqlx::query(&select_sql(" WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Annotation not found for id: {}", id)))?;
        row_to_annotation(row)
    }

    pub async fn list(&self, transformer_no: &str, inspection_no: &str) -> Result<Vec<Annotation>> {
        let rows = sqlx::query(&select_sql(
            " WHERE transformer_no = ? AND inspection_no = ? ORDER BY id DESC",
        ))
        .bind(transformer_no)
        .bind(inspection_no)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_annotation).collect()
    }

    pub async fn update(&self, id: u64, request: AnnotationRequest) -> Result<Annotation> {
        let existing = self.get(id).await?;
        let bbox = request
            .bbox
            .as_ref()
            .map(|b| b.to_string())
            .unwrap_or(existing.bbox);
        let polygon = request
            .polygon
            .as_ref()
            .map(|p| p.to_string())
            .or(existing.polygon);

        sqlx::query(
            r#"
            UPDATE annotations
            SET bbox = ?, polygon = ?, shape = ?, class_name = ?, confidence = ?,
                annotation_type = ?, status = ?, comment = ?, user_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&bbox)
        .bind(&polygon)
        .bind(request.shape.as_deref().or(existing.shape.as_deref()))
        .bind(request.class_name.as_deref().unwrap_or(&existing.class_name))
        .bind(request.confidence.or(existing.confidence))
        .bind(
            request
                .annotation_type
                .as_deref()
                .unwrap_or(&existing.annotation_type),
        )
        .bind(request.status.as_deref().or(existing.status.as_deref()))
        .bind(request.comment.as_deref().or(existing.comment.as_deref()))
        .bind(request.user_id.as_deref().or(existing.user_id.as_deref()))
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(id = id, error = %e, "Failed to update annotation");
            Error::Operation(ResponseCode::AnnotationNotUpdated)
        })?;

        self.get(id).await
    }

    pub async fn delete(&self, id: u64) -> Result<()> {
        let result = sqlx::query("DELETE FROM annotations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(id = id, error = %e, "Failed to delete annotation");
                Error::Operation(ResponseCode::AnnotationNotDeleted)
            })?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Annotation not found for id: {}", id)));
        }
        Ok(())
    }
}

fn select_sql(suffix: &str) -> String {
    format!(
        "SELECT id, transformer_no, inspection_no, bbox, polygon, shape, class_name, \
         confidence, annotation_type, status, comment, user_id, created_at, updated_at \
         FROM annotations{}",
        suffix
    )
}

fn validate(request: &AnnotationRequest) -> Result<(String, String, String)> {
    let bbox = request
        .bbox
        .as_ref()
        .map(|b| b.to_string())
        .ok_or_else(|| Error::BadRequest("Mandatory fields are missing for Annotation".to_string()))?;
    let class_name = request
        .class_name
        .clone()
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| Error::BadRequest("Mandatory fields are missing for Annotation".to_string()))?;
    let annotation_type = request
        .annotation_type
        .clone()
        .unwrap_or_else(|| "MANUAL_ADDED".to_string());
    Ok((bbox, class_name, annotation_type))
}

fn row_to_annotation(row: MySqlRow) -> Result<Annotation> {
    let created_at: chrono::NaiveDateTime = row.try_get("created_at")?;
    let updated_at: Option<chrono::NaiveDateTime> = row.try_get("updated_at")?;

    Ok(Annotation {
        id: row.try_get("id")?,
        transformer_no: row.try_get("transformer_no")?,
        inspection_no: row.try_get("inspection_no")?,
        bbox: row.try_get("bbox")?,
        polygon: row.try_get("polygon")?,
        shape: row.try_get("shape")?,
        class_name: row.try_get("class_name")?,
        confidence: row.try_get("confidence")?,
        annotation_type: row.try_get("annotation_type")?,
        status: row.try_get("status")?,
        comment: row.try_get("comment")?,
        user_id: row.try_get("user_id")?,
        created_at: DateTime::from_naive_utc_and_offset(created_at, Utc),
        updated_at: updated_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_requires_bbox_and_class() {
        let request = AnnotationRequest {
            bbox: Some(json!([0.1, 0.2, 0.3, 0.4])),
            polygon: None,
            shape: None,
            class_name: Some("hotspot".to_string()),
            confidence: Some(0.9),
            annotation_type: None,
            status: None,
            comment: None,
            user_id: None,
        };
        let (bbox, class_name, annotation_type) = validate(&request).unwrap();
        assert_eq!(bbox, "[0.1,0.2,0.3,0.4]");
        assert_eq!(class_name, "hotspot");
        assert_eq!(annotation_type, "MANUAL_ADDED");

        let missing_bbox = AnnotationRequest {
            bbox: None,
            ..request.clone()
        };
        assert!(validate(&missing_bbox).is_err());

        let missing_class = AnnotationRequest {
            class_name: None,
            ..request
        };
        assert!(validate(&missing_class).is_err());
    }

    #[test]
    fn test_bbox_stored_as_compact_json() {
        let request = AnnotationRequest {
            bbox: Some(json!([1, 2, 3, 4])),
            polygon: Some(json!([[1, 2], [3, 4]])),
            shape: Some("polygon".to_string()),
            class_name: Some("corrosion".to_string()),
            confidence: None,
            annotation_type: Some("AI_DETECTED".to_string()),
            status: None,
            comment: None,
            user_id: None,
        };
        let (bbox, _, annotation_type) = validate(&request).unwrap();
        assert_eq!(bbox, "[1,2,3,4]");
        assert_eq!(annotation_type, "AI_DETECTED");
        assert_eq!(
            request.polygon.as_ref().map(|p| p.to_string()),
            Some("[[1,2],[3,4]]".to_string())
        );
    }
}
