//! Transformer Inspection Backend
//!
//! CRUD backend for a transformer thermal-inspection programme.
//!
//! ## Components
//!
//! 1. TransformerService - Transformer asset records
//! 2. InspectionService - Inspection lifecycle (INSP-xxx numbering)
//! 3. ImageDataService - Baseline/thermal image storage + detection
//! 4. AnnotationService - Bounding-box/polygon review annotations
//! 5. MaintenanceService - Paper maintenance form capture
//! 6. LoginService - User accounts
//! 7. AnomalyDetector - Subprocess bridge to the Python detector
//! 8. Filtering - Generic allow-listed filter/pagination builder
//! 9. WebAPI - REST API endpoints
//!
//! ## Design Principles
//!
//! - Uniform response envelope with string response codes
//! - Detector failures degrade to partial success, never hard errors

pub mod annotation_service;
pub mod detector;
pub mod error;
pub mod filtering;
pub mod image_service;
pub mod inspection_service;
pub mod login_service;
pub mod maintenance_service;
pub mod models;
pub mod state;
pub mod transformer_service;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
