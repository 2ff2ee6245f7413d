//! Maintenance record sheets
//!
//! Free-form field set captured from the paper maintenance form. Every
//! column except the inspection link is optional text; the form is
//! filled in over several visits so partial saves are normal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::Row;

use crate::error::{Error, Result};
use crate::models::ResponseCode;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceRecord {
    pub id: u64,
    pub inspection_id: u64,
    pub pole_no: Option<String>,
    pub location_details: Option<String>,
    pub record_type: Option<String>,
    pub inspected: Option<String>,
    pub ir_left: Option<String>,
    pub ir_right: Option<String>,
    pub ir_front: Option<String>,
    pub last_month_kva: Option<String>,
    pub last_month_date: Option<String>,
    pub last_month_time: Option<String>,
    pub current_month_kva: Option<String>,
    pub serial: Option<String>,
    pub meter_ct_ratio: Option<String>,
    pub make: Option<String>,
    pub start_time: Option<String>,
    pub completion_time: Option<String>,
    pub supervised_by: Option<String>,
    pub tech_i: Option<String>,
    pub tech_ii: Option<String>,
    pub tech_iii: Option<String>,
    pub helpers: Option<String>,
    pub inspected_by: Option<String>,
    pub inspected_by_date: Option<String>,
    pub reflected_by: Option<String>,
    pub reflected_by_date: Option<String>,
    pub re_inspected_by: Option<String>,
    pub re_inspected_by_date: Option<String>,
    pub css: Option<String>,
    pub css_date: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceRecordRequest {
    /// Record id, required on update only
    pub id: Option<u64>,
    pub inspection_id: Option<u64>,
    pub pole_no: Option<String>,
    pub location_details: Option<String>,
    pub record_type: Option<String>,
    pub inspected: Option<String>,
    pub ir_left: Option<String>,
    pub ir_right: Option<String>,
    pub ir_front: Option<String>,
    pub last_month_kva: Option<String>,
    pub last_month_date: Option<String>,
    pub last_month_time: Option<String>,
    pub current_month_kva: Option<String>,
    pub serial: Option<String>,
    pub meter_ct_ratio: Option<String>,
    pub make: Option<String>,
    pub start_time: Option<String>,
    pub completion_time: Option<String>,
    pub supervised_by: Option<String>,
    pub tech_i: Option<String>,
    pub tech_ii: Option<String>,
    pub tech_iii: Option<String>,
    pub helpers: Option<String>,
    pub inspected_by: Option<String>,
    pub inspected_by_date: Option<String>,
    pub reflected_by: Option<String>,
    pub reflected_by_date: Option<String>,
    pub re_inspected_by: Option<String>,
    pub re_inspected_by_date: Option<String>,
    pub css: Option<String>,
    pub css_date: Option<String>,
}

pub struct MaintenanceService {
    pool: MySqlPool,
}

impl MaintenanceService {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, request: MaintenanceRecordRequest) -> Result<MaintenanceRecord> {
        let inspection_id = validate(&request)?;
        self.ensure_inspection_exists(inspection_id).await?;

        let result = sqlx::query(&insert_sql())
            .bind(inspection_id)
            .bind(&request.pole_no)
            .bind(&request.location_details)
            .bind(&request.record_type)
            .bind(&request.inspected)
            .bind(&request.ir_left)
            .bind(&request.ir_right)
            .bind(&request.ir_front)
            .bind(&request.last_month_kva)
            .bind(&request.last_month_date)
            .bind(&request.last_month_time)
            .bind(&request.current_month_kva)
            .bind(&request.serial)
            .bind(&request.meter_ct_ratio)
            .bind(&request.make)
            .bind(&request.start_time)
            .bind(&request.completion_time)
            .bind(&request.supervised_by)
            .bind(&request.tech_i)
            .bind(&request.tech_ii)
            .bind(&request.tech_iii)
            .bind(&request.helpers)
            .bind(&request.inspected_by)
            .bind(&request.inspected_by_date)
            .bind(&request.reflected_by)
            .bind(&request.reflected_by_date)
            .bind(&request.re_inspected_by)
            .bind(&request.re_inspected_by_date)
            .bind(&request.css)
            .bind(&request.css_date)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(inspection_id = inspection_id, error = %e, "Failed to insert maintenance record");
                Error::Operation(ResponseCode::MaintenanceNotCreated)
            })?;

        let id = result.last_insert_id();
        tracing::info!(id = id, inspection_id = inspection_id, "Maintenance record created");
        self.get(id).await
    }

    pub async fn get(&self, id: u64) -> Result<MaintenanceRecord> {
        let row = sqlx::query(&select_sql(" WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("Maintenance record not found for id: {}", id))
            })?;
        row_to_record(row)
    }

    pub async fn list_by_inspection(&self, inspection_id: u64) -> Result<Vec<MaintenanceRecord>> {
        let rows = sqlx::query(&select_sql(" WHERE inspection_id = ? ORDER BY id DESC"))
            .bind(inspection_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_record).collect()
    }

    pub async fn update(&self, id: u64, request: MaintenanceRecordRequest) -> Result<MaintenanceRecord> {
        let existing = self.get(id).await?;
        let inspection_id = request.inspection_id.unwrap_or(existing.inspection_id);
        if inspection_id != existing.inspection_id {
            self.ensure_inspection_exists(inspection_id).await?;
        }

        sqlx::query(&update_sql())
            .bind(inspection_id)
            .bind(request.pole_no.as_deref().or(existing.pole_no.as_deref()))
            .bind(request.location_details.as_deref().or(existing.location_details.as_deref()))
            .bind(request.record_type.as_deref().or(existing.record_type.as_deref()))
            .bind(request.inspected.as_deref().or(existing.inspected.as_deref()))
            .bind(request.ir_left.as_deref().or(existing.ir_left.as_deref()))
            .bind(request.ir_right.as_deref().or(existing.ir_right.as_deref()))
            .bind(request.ir_front.as_deref().or(existing.ir_front.as_deref()))
            .bind(request.last_month_kva.as_deref().or(existing.last_month_kva.as_deref()))
            .bind(request.last_month_date.as_deref().or(existing.last_month_date.as_deref()))
            .bind(request.last_month_time.as_deref().or(existing.last_month_time.as_deref()))
            .bind(request.current_month_kva.as_deref().or(existing.current_month_kva.as_deref()))
            .bind(request.serial.as_deref().or(existing.serial.as_deref()))
            .bind(request.meter_ct_ratio.as_deref().or(existing.meter_ct_ratio.as_deref()))
            .bind(request.make.as_deref().or(existing.make.as_deref()))
            .bind(request.start_time.as_deref().or(existing.start_time.as_deref()))
            .bind(request.completion_time.as_deref().or(existing.completion_time.as_deref()))
            .bind(request.supervised_by.as_deref().or(existing.supervised_by.as_deref()))
            .bind(request.tech_i.as_deref().or(existing.tech_i.as_deref()))
            .bind(request.tech_ii.as_deref().or(existing.tech_ii.as_deref()))
            .bind(request.tech_iii.as_deref().or(existing.tech_iii.as_deref()))
            .bind(request.helpers.as_deref().or(existing.helpers.as_deref()))
            .bind(request.inspected_by.as_deref().or(existing.inspected_by.as_deref()))
            .bind(request.inspected_by_date.as_deref().or(existing.inspected_by_date.as_deref()))
            .bind(request.reflected_by.as_deref().or(existing.reflected_by.as_deref()))
            .bind(request.reflected_by_date.as_deref().or(existing.reflected_by_date.as_deref()))
            .bind(request.re_inspected_by.as_deref().or(existing.re_inspected_by.as_deref()))
            .bind(request.re_inspected_by_date.as_deref().or(existing.re_inspected_by_date.as_deref()))
            .bind(request.css.as_deref().or(existing.css.as_deref()))
            .bind(request.css_date.as_deref().or(existing.css_date.as_deref()))
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(id = id, error = %e, "Failed to update maintenance record");
                Error::Operation(ResponseCode::MaintenanceNotUpdated)
            })?;

        self.get(id).await
    }

    pub async fn delete(&self, id: u64) -> Result<()> {
        let result = sqlx::query("DELETE FROM maintenance_records WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(id = id, error = %e, "Failed to delete maintenance record");
                Error::Operation(ResponseCode::MaintenanceNotDeleted)
            })?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!(
                "Maintenance record not found for id: {}",
                id
            )));
        }
        Ok(())
    }

    async fn ensure_inspection_exists(&self, inspection_id: u64) -> Result<()> {
        sqlx::query("SELECT id FROM inspections WHERE id = ?")
            .bind(inspection_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("Inspection not found for id: {}", inspection_id))
            })?;
        Ok(())
    }
}

const FIELDS: &[&str] = &[
    "inspection_id",
    "pole_no",
    "location_details",
    "record_type",
    "inspected",
    "ir_left",
    "ir_right",
    "ir_front",
    "last_month_kva",
    "last_month_date",
    "last_month_time",
    "current_month_kva",
    "serial",
    "meter_ct_ratio",
    "make",
    "start_time",
    "completion_time",
    "supervised_by",
    "tech_i",
    "tech_ii",
    "tech_iii",
    "helpers",
    "inspected_by",
    "inspected_by_date",
    "reflected_by",
    "reflected_by_date",
    "re_inspected_by",
    "re_inspected_by_date",
    "css",
    "css_date",
];

fn select_sql(suffix: &str) -> String {
    format!(
        "SELECT id, {}, created_at, updated_at FROM maintenance_records{}",
        FIELDS.join(", "),
        suffix
    )
}

fn insert_sql() -> String {
    let placeholders = vec!["?"; FIELDS.len() + 1].join(", ");
    format!(
        "INSERT INTO maintenance_records ({}, created_at) VALUES ({})",
        FIELDS.join(", "),
        placeholders
    )
}

fn update_sql() -> String {
    let assignments: Vec<String> = FIELDS.iter().map(|f| format!("{} = ?", f)).collect();
    format!(
        "UPDATE maintenance_records SET {}, updated_at = ? WHERE id = ?",
        assignments.join(", ")
    )
}

fn validate(request: &MaintenanceRecordRequest) -> Result<u64> {
    request.inspection_id.ok_or_else(|| {
        Error::BadRequest("Mandatory fields are missing for Maintenance record".to_string())
    })
}

fn row_to_record(row: MySqlRow) -> Result<MaintenanceRecord> {
    let created_at: chrono::NaiveDateTime = row.try_get("created_at")?;
    let updated_at: Option<chrono::NaiveDateTime> = row.try_get("updated_at")?;

    Ok(MaintenanceRecord {
        id: row.try_get("id")?,
        inspection_id: row.try_get("inspection_id")?,
        pole_no: row.try_get("pole_no")?,
        location_details: row.try_get("location_details")?,
        record_type: row.try_get("record_type")?,
        inspected: row.try_get("inspected")?,
        ir_left: row.try_get("ir_left")?,
        ir_right: row.try_get("ir_right")?,
        ir_front: row.try_get("ir_front")?,
        last_month_kva: row.try_get("last_month_kva")?,
        last_month_date: row.try_get("last_month_date")?,
        last_month_time: row.try_get("last_month_time")?,
        current_month_kva: row.try_get("current_month_kva")?,
        serial: row.try_get("serial")?,
        meter_ct_ratio: row.try_get("meter_ct_ratio")?,
        make: row.try_get("make")?,
        start_time: row.try_get("start_time")?,
        completion_time: row.try_get("completion_time")?,
        supervised_by: row.try_get("supervised_by")?,
        tech_i: row.try_get("tech_i")?,
        tech_ii: row.try_get("tech_ii")?,
        tech_iii: row.try_get("tech_iii")?,
        helpers: row.try_get("helpers")?,
        inspected_by: row.try_get("inspected_by")?,
        inspected_by_date: row.try_get("inspected_by_date")?,
        reflected_by: row.try_get("reflected_by")?,
        reflected_by_date: row.try_get("reflected_by_date")?,
        re_inspected_by: row.try_get("re_inspected_by")?,
        re_inspected_by_date: row.try_get("re_inspected_by_date")?,
        css: row.try_get("css")?,
        css_date: row.try_get("css_date")?,
        created_at: DateTime::from_naive_utc_and_offset(created_at, Utc),
        updated_at: updated_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_inspection_id() {
        let request = MaintenanceRecordRequest::default();
        assert!(validate(&request).is_err());

        let request = MaintenanceRecordRequest {
            inspection_id: Some(9),
            ..Default::default()
        };
        assert_eq!(validate(&request).unwrap(), 9);
    }

    #[test]
    fn test_generated_sql_is_consistent() {
        let insert = insert_sql();
        // one placeholder per field plus created_at
        assert_eq!(insert.matches('?').count(), FIELDS.len() + 1);

        let update = update_sql();
        // field assignments plus updated_at and the id predicate
        assert_eq!(update.matches('?').count(), FIELDS.len() + 2);
        assert!(update.ends_with("WHERE id = ?"));

        let select = select_sql(" WHERE inspection_id = ?");
        assert!(select.starts_with("SELECT id, inspection_id,"));
        assert!(select.contains("created_at, updated_at FROM maintenance_records"));
    }
}
