//! Shared wire models
//!
//! ## Responsibilities
//!
//! - Uniform API envelope (responseCode / responseDescription / responseData / pageDetail)
//! - Response code taxonomy and HTTP status mapping
//! - Anomaly records exchanged with the external detector

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Response code taxonomy.
///
/// Codes are stringly-typed on the wire ("2000", "2007", ...) and map
/// to HTTP status as: 2000/2001 -> 200, 2007 -> 207, 4000/4001 -> 400,
/// 4003 -> 422, everything else -> 500.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Success,
    Created,
    PartialSuccess,
    BadRequest,
    NotFound,
    ValidationFailed,
    InternalServerError,
    OperationFailed,
    TransformerNotCreated,
    TransformerNotUpdated,
    TransformerNotDeleted,
    TransformerNotConnected,
    InspectionNotCreated,
    InspectionNotUpdated,
    InspectionNotDeleted,
    InspectionNotConnected,
    ImageNotCreated,
    ImageNotUpdated,
    ImageNotDeleted,
    ImageNotConnected,
    ImageNotDetected,
    AnnotationNotCreated,
    AnnotationNotUpdated,
    AnnotationNotDeleted,
    MaintenanceNotCreated,
    MaintenanceNotUpdated,
    MaintenanceNotDeleted,
    MaintenanceNotConnected,
    UserNotCreated,
}

impl ResponseCode {
    pub fn code(&self) -> &'static str {
        match self {
            ResponseCode::Success => "2000",
            ResponseCode::Created => "2001",
            ResponseCode::PartialSuccess => "2007",
            ResponseCode::BadRequest => "4000",
            ResponseCode::NotFound => "4001",
            ResponseCode::ValidationFailed => "4003",
            _ => "5000",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ResponseCode::Success => "Operation Successful",
            ResponseCode::Created => "Created",
            ResponseCode::PartialSuccess => "Partial Success",
            ResponseCode::BadRequest => "Bad Request",
            ResponseCode::NotFound => "Not found",
            ResponseCode::ValidationFailed => "Validation Failed",
            ResponseCode::InternalServerError => "Internal Server Error",
            ResponseCode::OperationFailed => "Operation Failed!",
            ResponseCode::TransformerNotCreated => {
                "Transformer is partially created or not created"
            }
            ResponseCode::TransformerNotUpdated => {
                "Transformer is partially updated or not updated"
            }
            ResponseCode::TransformerNotDeleted => "Transformer is not deleted",
            ResponseCode::TransformerNotConnected => "Transformer is not connected",
            ResponseCode::InspectionNotCreated => "Inspection is partially created or not created",
            ResponseCode::InspectionNotUpdated => "Inspection is partially updated or not updated",
            ResponseCode::InspectionNotDeleted => "Inspection is not deleted",
            ResponseCode::InspectionNotConnected => "Inspection is not connected",
            ResponseCode::ImageNotCreated => "Image is partially created or not created",
            ResponseCode::ImageNotUpdated => "Image is partially updated or not updated",
            ResponseCode::ImageNotDeleted => "Image is not deleted",
            ResponseCode::ImageNotConnected => "Image is not connected",
            ResponseCode::ImageNotDetected => "Image detection failed",
            ResponseCode::AnnotationNotCreated => "Annotation is partially created or not created",
            ResponseCode::AnnotationNotUpdated => "Annotation is partially updated or not updated",
            ResponseCode::AnnotationNotDeleted => "Annotation is not deleted",
            ResponseCode::MaintenanceNotCreated => {
                "Maintenance record is partially created or not created"
            }
            ResponseCode::MaintenanceNotUpdated => {
                "Maintenance record is partially updated or not updated"
            }
            ResponseCode::MaintenanceNotDeleted => "Maintenance record is not deleted",
            ResponseCode::MaintenanceNotConnected => "Maintenance record is not connected",
            ResponseCode::UserNotCreated => "User is partially created or not created",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self.code() {
            "2000" | "2001" => StatusCode::OK,
            "2007" => StatusCode::MULTI_STATUS,
            "4000" | "4001" => StatusCode::BAD_REQUEST,
            "4003" => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Page metadata attached to filter responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDetail {
    /// Matched records before pagination
    pub total_records: i64,
    /// 1-based page number (request offset + 1)
    pub page_number: u32,
    /// Records actually returned in this page
    pub page_element_count: u32,
}

/// Uniform API envelope
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub response_code: &'static str,
    pub response_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_detail: Option<PageDetail>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self::of(ResponseCode::Success, Some(data))
    }

    pub fn of(code: ResponseCode, data: Option<T>) -> Self {
        Self {
            response_code: code.code(),
            response_description: code.message().to_string(),
            response_data: data,
            page_detail: None,
        }
    }

    pub fn with_description(code: ResponseCode, description: impl Into<String>, data: T) -> Self {
        Self {
            response_code: code.code(),
            response_description: description.into(),
            response_data: Some(data),
            page_detail: None,
        }
    }

    pub fn with_page(mut self, page_detail: PageDetail) -> Self {
        self.page_detail = Some(page_detail);
        self
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = match self.response_code {
            "2000" | "2001" => StatusCode::OK,
            "2007" => StatusCode::MULTI_STATUS,
            "4000" | "4001" => StatusCode::BAD_REQUEST,
            "4003" => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

/// One detected defect region in a thermal image.
///
/// Matches the detector's output shape:
/// `{"class": "...", "confidence": 0.9, "box": [x1, y1, x2, y2]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "class")]
    pub class_name: String,
    pub confidence: f64,
    #[serde(rename = "box")]
    pub box_coords: Vec<f64>,
}

/// Detection payload returned by the detect endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomaliesResponse {
    pub anomalies: Vec<Anomaly>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub db_connected: bool,
}

/// Display timestamp stored on inspection and image records,
/// e.g. `Mon(02), Jun, 2025 03:04 PM`
pub fn display_timestamp(at: chrono::DateTime<chrono::Local>) -> String {
    at.format("%a(%d), %b, %Y %I:%M %p").to_string()
}

/// Formatted "now" for record defaults
pub fn display_now() -> String {
    display_timestamp(chrono::Local::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_status_mapping() {
        assert_eq!(ResponseCode::Success.http_status(), StatusCode::OK);
        assert_eq!(ResponseCode::Created.http_status(), StatusCode::OK);
        assert_eq!(
            ResponseCode::PartialSuccess.http_status(),
            StatusCode::MULTI_STATUS
        );
        assert_eq!(ResponseCode::BadRequest.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(ResponseCode::NotFound.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ResponseCode::ValidationFailed.http_status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ResponseCode::ImageNotDetected.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_envelope_skips_absent_fields() {
        let resp: ApiResponse<()> = ApiResponse::of(ResponseCode::Success, None);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["responseCode"], "2000");
        assert_eq!(json["responseDescription"], "Operation Successful");
        assert!(json.get("responseData").is_none());
        assert!(json.get("pageDetail").is_none());
    }

    #[test]
    fn test_envelope_with_page_detail() {
        let resp = ApiResponse::success(vec![1, 2, 3]).with_page(PageDetail {
            total_records: 25,
            page_number: 1,
            page_element_count: 3,
        });
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["pageDetail"]["totalRecords"], 25);
        assert_eq!(json["pageDetail"]["pageNumber"], 1);
        assert_eq!(json["pageDetail"]["pageElementCount"], 3);
    }

    #[test]
    fn test_anomaly_wire_names() {
        let anomaly = Anomaly {
            class_name: "hotspot".to_string(),
            confidence: 0.9,
            box_coords: vec![1.0, 2.0, 3.0, 4.0],
        };
        let json = serde_json::to_value(&anomaly).unwrap();
        assert_eq!(json["class"], "hotspot");
        assert_eq!(json["box"], serde_json::json!([1.0, 2.0, 3.0, 4.0]));
        assert!(json.get("class_name").is_none());
    }

    #[test]
    fn test_display_timestamp_format() {
        use chrono::TimeZone;
        let at = chrono::Local.with_ymd_and_hms(2025, 6, 2, 15, 4, 0).unwrap();
        assert_eq!(display_timestamp(at), "Mon(02), Jun, 2025 03:04 PM");
    }

    #[test]
    fn test_anomaly_list_round_trip() {
        let anomalies = vec![
            Anomaly {
                class_name: "hotspot".to_string(),
                confidence: 0.92,
                box_coords: vec![0.1, 0.2, 0.3, 0.4],
            },
            Anomaly {
                class_name: "loose-joint".to_string(),
                confidence: 0.55,
                box_coords: vec![0.5, 0.6, 0.7, 0.8],
            },
        ];
        let json = serde_json::to_string(&anomalies).unwrap();
        let back: Vec<Anomaly> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, anomalies);
    }
}
