//! API Routes

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::annotation_service::{Annotation, AnnotationRequest};
use crate::error::{Error, Result};
use crate::filtering::FilterRequest;
use crate::image_service::{DetectionReport, ImageResponse, ImageUpload};
use crate::inspection_service::{Inspection, InspectionRequest};
use crate::login_service::{LoginRequest, User};
use crate::maintenance_service::{MaintenanceRecord, MaintenanceRecordRequest};
use crate::models::{AnomaliesResponse, ApiResponse, ResponseCode};
use crate::state::AppState;
use crate::transformer_service::{Transformer, TransformerRequest};

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Login
        .route("/api/login/save", post(save_user))
        .route("/api/login/verify", post(verify_user))
        .route("/api/login/view/:id", get(view_user))
        // Transformers
        .route("/api/transformer-data/create", post(create_transformer))
        .route("/api/transformer-data/view", get(list_transformers))
        .route("/api/transformer-data/view/:id", get(view_transformer))
        .route("/api/transformer-data/update/:id", put(update_transformer))
        .route("/api/transformer-data/delete/:id", delete(delete_transformer))
        .route("/api/transformer-data/filter", post(filter_transformers))
        // Inspections
        .route("/api/inspection-data/create", post(create_inspection))
        .route("/api/inspection-data/view", get(list_inspections))
        .route("/api/inspection-data/view/:id", get(view_inspection))
        .route("/api/inspection-data/update/:id", put(update_inspection))
        .route("/api/inspection-data/delete/:id", delete(delete_inspection))
        .route("/api/inspection-data/filter", post(filter_inspections))
        .route(
            "/api/inspection-data/transformer/:transformerNo",
            get(inspections_by_transformer),
        )
        // Images
        .route("/api/image-data/create", post(create_image))
        .route("/api/image-data/view", get(view_image))
        .route("/api/image-data/detect", post(detect_image))
        .route("/api/image-data/update", put(update_image))
        .route("/api/image-data/delete", delete(delete_image))
        // Annotations
        .route(
            "/api/transformers/:transformerNo/inspections/:inspectionNo/annotations",
            post(create_annotation).get(list_annotations),
        )
        .route(
            "/api/transformers/:transformerNo/inspections/:inspectionNo/annotations/:id",
            put(update_annotation).delete(delete_annotation),
        )
        // Maintenance records
        .route("/api/maintenance-record/save", post(save_maintenance))
        .route("/api/maintenance-record/update", put(update_maintenance))
        .route("/api/maintenance-record/:id", get(view_maintenance))
        .route(
            "/api/maintenance-record/inspection/:inspectionId",
            get(maintenance_by_inspection),
        )
        .route("/api/maintenance-record/:id", delete(delete_maintenance))
        // Dev tooling for preserved detector inputs
        .route("/dev/failed-detections", get(list_failed_detections))
        .route(
            "/dev/failed-detections/download/:fileName",
            get(download_failed_detection),
        )
        .with_state(state)
}

// ---- Login ----

async fn save_user(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<ApiResponse<User>> {
    let user = state.login.save(request).await?;
    Ok(ApiResponse::success(user))
}

async fn verify_user(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<ApiResponse<User>> {
    let user = state.login.verify(request).await?;
    Ok(ApiResponse::success(user))
}

async fn view_user(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<ApiResponse<User>> {
    let user = state.login.get(id).await?;
    Ok(ApiResponse::success(user))
}

// ---- Transformers ----

async fn create_transformer(
    State(state): State<AppState>,
    Json(request): Json<TransformerRequest>,
) -> Result<ApiResponse<Transformer>> {
    let transformer = state.transformers.create(request).await?;
    Ok(ApiResponse::success(transformer))
}

async fn list_transformers(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<Transformer>>> {
    let transformers = state.transformers.list().await?;
    Ok(ApiResponse::success(transformers))
}

async fn view_transformer(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<ApiResponse<Transformer>> {
    let transformer = state.transformers.get(id).await?;
    Ok(ApiResponse::success(transformer))
}

async fn update_transformer(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<TransformerRequest>,
) -> Result<ApiResponse<Transformer>> {
    let transformer = state.transformers.update(id, request).await?;
    Ok(ApiResponse::success(transformer))
}

async fn delete_transformer(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<ApiResponse<()>> {
    state.transformers.delete(id).await?;
    Ok(ApiResponse::of(ResponseCode::Success, None))
}

async fn filter_transformers(
    State(state): State<AppState>,
    Json(request): Json<FilterRequest>,
) -> Result<ApiResponse<Vec<Transformer>>> {
    let (transformers, page) = state.transformers.filter(&request).await?;
    Ok(ApiResponse::success(transformers).with_page(page))
}

// ---- Inspections ----

async fn create_inspection(
    State(state): State<AppState>,
    Json(request): Json<InspectionRequest>,
) -> Result<ApiResponse<Inspection>> {
    let inspection = state.inspections.create(request).await?;
    Ok(ApiResponse::success(inspection))
}

async fn list_inspections(State(state): State<AppState>) -> Result<ApiResponse<Vec<Inspection>>> {
    let inspections = state.inspections.list().await?;
    Ok(ApiResponse::success(inspections))
}

async fn view_inspection(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<ApiResponse<Inspection>> {
    let inspection = state.inspections.get(id).await?;
    Ok(ApiResponse::success(inspection))
}

async fn update_inspection(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<InspectionRequest>,
) -> Result<ApiResponse<Inspection>> {
    let inspection = state.inspections.update(id, request).await?;
    Ok(ApiResponse::success(inspection))
}

async fn delete_inspection(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<ApiResponse<()>> {
    state.inspections.delete(id).await?;
    Ok(ApiResponse::of(ResponseCode::Success, None))
}

async fn filter_inspections(
    State(state): State<AppState>,
    Json(request): Json<FilterRequest>,
) -> Result<ApiResponse<Vec<Inspection>>> {
    let (inspections, page) = state.inspections.filter(&request).await?;
    Ok(ApiResponse::success(inspections).with_page(page))
}

async fn inspections_by_transformer(
    State(state): State<AppState>,
    Path(transformer_no): Path<String>,
) -> Result<ApiResponse<Vec<Inspection>>> {
    let inspections = state.inspections.list_by_transformer(&transformer_no).await?;
    Ok(ApiResponse::success(inspections))
}

// ---- Images ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageQuery {
    transformer_no: String,
    inspection_no: String,
    #[serde(rename = "type")]
    image_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageKeyQuery {
    transformer_no: String,
    inspection_no: String,
}

async fn create_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<ApiResponse<ImageResponse>> {
    let upload = read_upload(multipart).await?;
    let transformer_no = upload.transformer_no.clone().unwrap_or_default();
    let inspection_no = upload.inspection_no.clone().unwrap_or_default();
    let image_type = upload.image_type.clone().unwrap_or_default();

    state.images.save(upload).await?;

    // Best-effort detection after the save. A failed attempt (including
    // a missing thermal image when a baseline was uploaded) becomes a
    // note in the description, never an error.
    let note = match state.images.detect(&transformer_no, &inspection_no).await {
        Ok(report) => detection_note(report.code.code(), &report.description),
        Err(e) => {
            tracing::warn!(
                transformer_no = %transformer_no,
                inspection_no = %inspection_no,
                error = %e,
                "Detection attempt failed after upload"
            );
            detection_note(
                ResponseCode::PartialSuccess.code(),
                &format!("Detection attempt failed: {}", e.description()),
            )
        }
    };

    let image = state
        .images
        .get(&transformer_no, &inspection_no, &image_type)
        .await?;
    let description = format!("{} | {}", ResponseCode::Success.message(), note);
    Ok(ApiResponse::with_description(
        ResponseCode::Success,
        description,
        image,
    ))
}

fn detection_note(code: &str, message: &str) -> String {
    format!("Detection: ({}) {}", code, message)
}

async fn view_image(
    State(state): State<AppState>,
    Query(query): Query<ImageQuery>,
) -> Result<ApiResponse<ImageResponse>> {
    let image = state
        .images
        .get(&query.transformer_no, &query.inspection_no, &query.image_type)
        .await?;
    Ok(ApiResponse::success(image))
}

async fn detect_image(
    State(state): State<AppState>,
    Query(query): Query<ImageKeyQuery>,
) -> Result<ApiResponse<AnomaliesResponse>> {
    let DetectionReport {
        code,
        description,
        anomalies,
    } = state
        .images
        .detect(&query.transformer_no, &query.inspection_no)
        .await?;
    Ok(ApiResponse::with_description(code, description, anomalies))
}

async fn update_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<ApiResponse<()>> {
    let upload = read_upload(multipart).await?;
    let (transformer_no, inspection_no) = match (&upload.transformer_no, &upload.inspection_no) {
        (Some(t), Some(i)) => (t.clone(), i.clone()),
        _ => {
            return Err(Error::BadRequest(
                "Mandatory fields are missing for Image".to_string(),
            ))
        }
    };
    state.images.update(&transformer_no, &inspection_no, upload).await?;
    Ok(ApiResponse::of(ResponseCode::Success, None))
}

async fn delete_image(
    State(state): State<AppState>,
    Query(query): Query<ImageKeyQuery>,
) -> Result<ApiResponse<()>> {
    state
        .images
        .delete(&query.transformer_no, &query.inspection_no)
        .await?;
    Ok(ApiResponse::of(ResponseCode::Success, None))
}

/// Collect the multipart form into an upload. Unknown fields are
/// ignored so the frontend can evolve independently.
async fn read_upload(mut multipart: Multipart) -> Result<ImageUpload> {
    let mut upload = ImageUpload {
        transformer_no: None,
        inspection_no: None,
        image_type: None,
        weather: None,
        uploader: None,
        photo: Vec::new(),
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::BadRequest(format!("Malformed multipart request: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "photo" => {
                upload.photo = field
                    .bytes()
                    .await
                    .map_err(|e| Error::BadRequest(format!("Unreadable photo field: {}", e)))?
                    .to_vec();
            }
            "transformerNo" => upload.transformer_no = Some(read_text(field).await?),
            "inspectionNo" => upload.inspection_no = Some(read_text(field).await?),
            "type" => upload.image_type = Some(read_text(field).await?),
            "weather" => upload.weather = Some(read_text(field).await?),
            "uploader" => upload.uploader = Some(read_text(field).await?),
            _ => {}
        }
    }

    Ok(upload)
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String> {
    field
        .text()
        .await
        .map_err(|e| Error::BadRequest(format!("Unreadable form field: {}", e)))
}

// ---- Annotations ----

async fn create_annotation(
    State(state): State<AppState>,
    Path((transformer_no, inspection_no)): Path<(String, String)>,
    Json(request): Json<AnnotationRequest>,
) -> Result<ApiResponse<Annotation>> {
    let annotation = state
        .annotations
        .create(&transformer_no, &inspection_no, request)
        .await?;
    Ok(ApiResponse::success(annotation))
}

async fn list_annotations(
    State(state): State<AppState>,
    Path((transformer_no, inspection_no)): Path<(String, String)>,
) -> Result<ApiResponse<Vec<Annotation>>> {
    let annotations = state.annotations.list(&transformer_no, &inspection_no).await?;
    Ok(ApiResponse::success(annotations))
}

async fn update_annotation(
    State(state): State<AppState>,
    Path((_transformer_no, _inspection_no, id)): Path<(String, String, u64)>,
    Json(request): Json<AnnotationRequest>,
) -> Result<ApiResponse<Annotation>> {
    let annotation = state.annotations.update(id, request).await?;
    Ok(ApiResponse::success(annotation))
}

async fn delete_annotation(
    State(state): State<AppState>,
    Path((_transformer_no, _inspection_no, id)): Path<(String, String, u64)>,
) -> Result<ApiResponse<()>> {
    state.annotations.delete(id).await?;
    Ok(ApiResponse::of(ResponseCode::Success, None))
}

// ---- Maintenance records ----

async fn save_maintenance(
    State(state): State<AppState>,
    Json(request): Json<MaintenanceRecordRequest>,
) -> Result<ApiResponse<MaintenanceRecord>> {
    let record = state.maintenance.create(request).await?;
    Ok(ApiResponse::success(record))
}

async fn update_maintenance(
    State(state): State<AppState>,
    Json(request): Json<MaintenanceRecordRequest>,
) -> Result<ApiResponse<MaintenanceRecord>> {
    let id = request.id.ok_or_else(|| {
        Error::BadRequest("Mandatory fields are missing for Maintenance record".to_string())
    })?;
    let record = state.maintenance.update(id, request).await?;
    Ok(ApiResponse::success(record))
}

async fn view_maintenance(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<ApiResponse<MaintenanceRecord>> {
    let record = state.maintenance.get(id).await?;
    Ok(ApiResponse::success(record))
}

async fn maintenance_by_inspection(
    State(state): State<AppState>,
    Path(inspection_id): Path<u64>,
) -> Result<ApiResponse<Vec<MaintenanceRecord>>> {
    let records = state.maintenance.list_by_inspection(inspection_id).await?;
    Ok(ApiResponse::success(records))
}

async fn delete_maintenance(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<ApiResponse<()>> {
    state.maintenance.delete(id).await?;
    Ok(ApiResponse::of(ResponseCode::Success, None))
}

// ---- Preserved detector inputs ----

async fn list_failed_detections(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<String>>> {
    let dir = state.detector.failed_dir().to_path_buf();
    let mut names = Vec::new();

    match tokio::fs::read_dir(&dir).await {
        Ok(mut entries) => {
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_file() {
                    names.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
        }
        // Nothing preserved yet
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    names.sort();
    Ok(ApiResponse::success(names))
}

async fn download_failed_detection(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
) -> Result<impl IntoResponse> {
    if file_name.contains('/') || file_name.contains('\\') || file_name.contains("..") {
        return Err(Error::BadRequest("Invalid file name".to_string()));
    }

    let path = state.detector.failed_dir().join(&file_name);
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(format!("No preserved image named: {}", file_name))
        } else {
            e.into()
        }
    })?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "image/jpeg")],
        bytes,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_description_carries_detection_outcome() {
        let note = detection_note(ResponseCode::Success.code(), "No errors");
        assert_eq!(note, "Detection: (2000) No errors");
        let description = format!("{} | {}", ResponseCode::Success.message(), note);
        assert_eq!(description, "Operation Successful | Detection: (2000) No errors");

        let degraded = detection_note(
            ResponseCode::PartialSuccess.code(),
            "Detection attempt failed: Thermal image not found for Transformer: TX100, Inspection: INSP-001",
        );
        assert!(degraded.starts_with("Detection: (2007) Detection attempt failed:"));
    }

    #[test]
    fn test_traversal_names_are_rejected() {
        for name in ["../etc/passwd", "a/b.jpg", "a\\b.jpg", ".."] {
            let bad = name.contains('/') || name.contains('\\') || name.contains("..");
            assert!(bad, "{} should be rejected", name);
        }
        let good = "failed_1717300000000.jpg";
        assert!(!(good.contains('/') || good.contains('\\') || good.contains("..")));
    }
}
