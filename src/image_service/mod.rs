//! Uploaded inspection images
//!
//! ## Responsibilities
//!
//! - Upsert/get/update/delete image blobs keyed by
//!   (transformerNo, inspectionNo, type)
//! - Run on-demand anomaly detection against the stored thermal image
//!   and persist the resulting anomaly list as JSON on the record
//!
//! Detector failures never become hard errors here: they degrade to a
//! partial-success report with an empty anomaly list. A missing stored
//! image, by contrast, is a hard not-found.

use std::sync::Arc;

use base64::Engine;
use serde::Serialize;
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::Row;

use crate::detector::{AnomalyDetector, DetectionOutcome};
use crate::error::{Error, Result};
use crate::models::{display_now, AnomaliesResponse, Anomaly, ResponseCode};

/// Image type with baseline lookup semantics: resolved by transformer
/// only, independent of inspection
const BASELINE_TYPE: &str = "Baseline";

/// Image type the detector runs against
const THERMAL_TYPE: &str = "Thermal";

/// Decoded multipart upload
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub transformer_no: Option<String>,
    pub inspection_no: Option<String>,
    pub image_type: Option<String>,
    pub weather: Option<String>,
    pub uploader: Option<String>,
    pub photo: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    pub id: u64,
    #[serde(rename = "type")]
    pub image_type: String,
    pub transformer_no: String,
    pub inspection_no: String,
    pub weather: Option<String>,
    pub uploader: String,
    pub date_time: String,
    /// Base64-encoded image bytes
    pub photo: String,
    /// JSON-encoded anomaly list from the last detection run
    pub detection_json: Option<String>,
}

/// Outcome of the top-level detect operation, ready for the envelope
#[derive(Debug, Clone)]
pub struct DetectionReport {
    pub code: ResponseCode,
    pub description: String,
    pub anomalies: AnomaliesResponse,
}

pub struct ImageDataService {
    pool: MySqlPool,
    detector: Arc<AnomalyDetector>,
}

impl ImageDataService {
    pub fn new(pool: MySqlPool, detector: Arc<AnomalyDetector>) -> Self {
        Self { pool, detector }
    }

    /// Upsert an image by (transformerNo, inspectionNo, type): any
    /// existing record under the same key is replaced.
    pub async fn save(&self, upload: ImageUpload) -> Result<()> {
        let (transformer_no, inspection_no, image_type) = validate_upload(&upload)?;
        let uploader = upload
            .uploader
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| "System".to_string());

        sqlx::query(
            "DELETE FROM images WHERE transformer_no = ? AND inspection_no = ? AND image_type = ?",
        )
        .bind(&transformer_no)
        .bind(&inspection_no)
        .bind(&image_type)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to replace existing image");
            Error::Operation(ResponseCode::ImageNotCreated)
        })?;

        sqlx::query(
            r#"
            INSERT INTO images
                (image_type, transformer_no, inspection_no, weather, uploader, date_time, image)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&image_type)
        .bind(&transformer_no)
        .bind(&inspection_no)
        .bind(&upload.weather)
        .bind(&uploader)
        .bind(display_now())
        .bind(&upload.photo)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to insert image");
            Error::Operation(ResponseCode::ImageNotCreated)
        })?;

        tracing::info!(
            transformer_no = %transformer_no,
            inspection_no = %inspection_no,
            image_type = %image_type,
            size = upload.photo.len(),
            "Image saved"
        );
        Ok(())
    }

    /// Fetch an image. `Baseline` images belong to the transformer and
    /// are resolved without the inspection number.
    pub async fn get(
        &self,
        transformer_no: &str,
        inspection_no: &str,
        image_type: &str,
    ) -> Result<ImageResponse> {
        let row = if image_type == BASELINE_TYPE {
            sqlx::query(
                "SELECT id, image_type, transformer_no, inspection_no, weather, uploader, \
                 date_time, image, detection_json FROM images \
                 WHERE transformer_no = ? AND image_type = ? ORDER BY id DESC LIMIT 1",
            )
            .bind(transformer_no)
            .bind(image_type)
            .fetch_optional(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT id, image_type, transformer_no, inspection_no, weather, uploader, \
                 date_time, image, detection_json FROM images \
                 WHERE transformer_no = ? AND inspection_no = ? AND image_type = ? \
                 ORDER BY id DESC LIMIT 1",
            )
            .bind(transformer_no)
            .bind(inspection_no)
            .bind(image_type)
            .fetch_optional(&self.pool)
            .await?
        };

        let row = row.ok_or_else(|| {
            Error::NotFound(format!(
                "Image not found for Transformer: {}, Inspection: {}",
                transformer_no, inspection_no
            ))
        })?;

        row_to_response(row)
    }

    pub async fn update(
        &self,
        transformer_no: &str,
        inspection_no: &str,
        upload: ImageUpload,
    ) -> Result<()> {
        let image_type = upload
            .image_type
            .clone()
            .ok_or_else(|| Error::BadRequest("Mandatory fields are missing for Image".to_string()))?;

        let existing: Option<u64> = sqlx::query(
            "SELECT id FROM images \
             WHERE transformer_no = ? AND inspection_no = ? AND image_type = ? \
             ORDER BY id DESC LIMIT 1",
        )
        .bind(transformer_no)
        .bind(inspection_no)
        .bind(&image_type)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| row.try_get("id"))
        .transpose()?;

        let id = existing.ok_or_else(|| {
            Error::NotFound(format!(
                "Image not found for Transformer: {}, Inspection: {}",
                transformer_no, inspection_no
            ))
        })?;

        sqlx::query(
            "UPDATE images SET weather = ?, uploader = COALESCE(?, uploader), \
             date_time = ?, image = ? WHERE id = ?",
        )
        .bind(&upload.weather)
        .bind(&upload.uploader)
        .bind(display_now())
        .bind(&upload.photo)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(id = id, error = %e, "Failed to update image");
            Error::Operation(ResponseCode::ImageNotUpdated)
        })?;

        tracing::info!(id = id, "Image updated");
        Ok(())
    }

    pub async fn delete(&self, transformer_no: &str, inspection_no: &str) -> Result<()> {
        let result = sqlx::query(
            "DELETE FROM images WHERE transformer_no = ? AND inspection_no = ?",
        )
        .bind(transformer_no)
        .bind(inspection_no)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to delete image");
            Error::Operation(ResponseCode::ImageNotDeleted)
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!(
                "Image not found for Transformer: {}, Inspection: {}",
                transformer_no, inspection_no
            )));
        }
        Ok(())
    }

    /// Run the external detector against the stored thermal image.
    ///
    /// Missing image -> hard not-found. Detector failure -> degraded
    /// partial-success report, never an error.
    pub async fn detect(
        &self,
        transformer_no: &str,
        inspection_no: &str,
    ) -> Result<DetectionReport> {
        let row = sqlx::query(
            "SELECT id, image FROM images \
             WHERE transformer_no = ? AND inspection_no = ? AND image_type = ? \
             ORDER BY id DESC LIMIT 1",
        )
        .bind(transformer_no)
        .bind(inspection_no)
        .bind(THERMAL_TYPE)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            Error::NotFound(format!(
                "Thermal image not found for Transformer: {}, Inspection: {}",
                transformer_no, inspection_no
            ))
        })?;

        let image_id: u64 = row.try_get("id")?;
        let image: Vec<u8> = row.try_get("image")?;
        if image.is_empty() {
            return Err(Error::Validation(format!(
                "Stored image bytes are empty for Transformer: {}, Inspection: {}",
                transformer_no, inspection_no
            )));
        }

        let report = match self.detector.detect(&image).await {
            DetectionOutcome::Success(anomalies) => {
                self.persist_detections(image_id, &anomalies).await;
                let description = if anomalies.is_empty() {
                    "No errors".to_string()
                } else {
                    ResponseCode::Success.message().to_string()
                };
                DetectionReport {
                    code: ResponseCode::Success,
                    description,
                    anomalies: AnomaliesResponse { anomalies },
                }
            }
            DetectionOutcome::PartialFailure { reason, preserved } => {
                tracing::warn!(
                    transformer_no = %transformer_no,
                    inspection_no = %inspection_no,
                    reason = %reason,
                    "Detection degraded to partial failure"
                );
                self.persist_detections(image_id, &[]).await;
                let description = match preserved {
                    Some(path) => {
                        format!("Detection failed; preserved image at: {}", path.display())
                    }
                    None => "Detection ran but returned no anomalies (see logs).".to_string(),
                };
                DetectionReport {
                    code: ResponseCode::PartialSuccess,
                    description,
                    anomalies: AnomaliesResponse { anomalies: vec![] },
                }
            }
            DetectionOutcome::Fatal(reason) => {
                tracing::error!(
                    transformer_no = %transformer_no,
                    inspection_no = %inspection_no,
                    reason = %reason,
                    "Detection failed without a preserved artifact"
                );
                self.persist_detections(image_id, &[]).await;
                DetectionReport {
                    code: ResponseCode::PartialSuccess,
                    description: "Detection ran but returned no anomalies (see logs).".to_string(),
                    anomalies: AnomaliesResponse { anomalies: vec![] },
                }
            }
        };

        Ok(report)
    }

    /// Write the anomaly list back onto the image record. A failed
    /// persist is logged and does not overturn the detection result.
    async fn persist_detections(&self, image_id: u64, anomalies: &[Anomaly]) {
        let detection_json = match serde_json::to_string(anomalies) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(image_id = image_id, error = %e, "Failed to encode detections");
                return;
            }
        };

        let result = sqlx::query("UPDATE images SET detection_json = ? WHERE id = ?")
            .bind(&detection_json)
            .bind(image_id)
            .execute(&self.pool)
            .await;

        if let Err(e) = result {
            tracing::error!(image_id = image_id, error = %e, "Failed to persist detections");
        }
    }
}

fn validate_upload(upload: &ImageUpload) -> Result<(String, String, String)> {
    match (&upload.transformer_no, &upload.inspection_no, &upload.image_type) {
        (Some(t), Some(i), Some(ty)) if !upload.photo.is_empty() => {
            Ok((t.clone(), i.clone(), ty.clone()))
        }
        _ => Err(Error::BadRequest(
            "Mandatory fields are missing for Image".to_string(),
        )),
    }
}

fn row_to_response(row: MySqlRow) -> Result<ImageResponse> {
    let image: Vec<u8> = row.try_get("image")?;
    Ok(ImageResponse {
        id: row.try_get("id")?,
        image_type: row.try_get("image_type")?,
        transformer_no: row.try_get("transformer_no")?,
        inspection_no: row.try_get("inspection_no")?,
        weather: row.try_get("weather")?,
        uploader: row.try_get("uploader")?,
        date_time: row.try_get("date_time")?,
        photo: base64::engine::general_purpose::STANDARD.encode(image),
        detection_json: row.try_get("detection_json")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload() -> ImageUpload {
        ImageUpload {
            transformer_no: Some("TX100".to_string()),
            inspection_no: Some("INSP-001".to_string()),
            image_type: Some("Thermal".to_string()),
            weather: Some("Sunny".to_string()),
            uploader: None,
            photo: vec![0xFF, 0xD8],
        }
    }

    #[test]
    fn test_validate_upload_accepts_complete_request() {
        let (t, i, ty) = validate_upload(&upload()).unwrap();
        assert_eq!(t, "TX100");
        assert_eq!(i, "INSP-001");
        assert_eq!(ty, "Thermal");
    }

    #[test]
    fn test_validate_upload_rejects_missing_fields() {
        let mut missing_type = upload();
        missing_type.image_type = None;
        assert!(validate_upload(&missing_type).is_err());

        let mut empty_photo = upload();
        empty_photo.photo.clear();
        assert!(validate_upload(&empty_photo).is_err());
    }

    #[test]
    fn test_image_response_wire_shape() {
        let response = ImageResponse {
            id: 1,
            image_type: "Thermal".to_string(),
            transformer_no: "TX100".to_string(),
            inspection_no: "INSP-001".to_string(),
            weather: None,
            uploader: "System".to_string(),
            date_time: "Mon(02), Jun, 2025 03:04 PM".to_string(),
            photo: "AAAA".to_string(),
            detection_json: Some("[]".to_string()),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["type"], "Thermal");
        assert_eq!(json["transformerNo"], "TX100");
        assert_eq!(json["detectionJson"], "[]");
    }
}
