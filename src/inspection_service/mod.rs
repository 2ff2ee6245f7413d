//! Inspection records
//!
//! CRUD and filtered listing over the `inspections` table. Inspection
//! numbers are generated from the row id after insert (`INSP-007`).

use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::Row;

use crate::error::{Error, Result};
use crate::filtering::{build_sql_filter, page_detail, ColumnMap, FilterRequest};
use crate::models::{display_now, PageDetail, ResponseCode};

/// Filterable columns: api name -> SQL column
pub const INSPECTION_COLUMNS: ColumnMap = &[
    ("id", "id"),
    ("branch", "branch"),
    ("inspectionNo", "inspection_no"),
    ("transformerNo", "transformer_no"),
    ("inspectedDate", "inspected_date"),
    ("maintenanceDate", "maintenance_date"),
    ("status", "status"),
    ("inspectorName", "inspector_name"),
    ("engineerStatus", "engineer_status"),
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inspection {
    pub id: u64,
    pub branch: Option<String>,
    pub inspection_no: Option<String>,
    pub transformer_no: String,
    pub inspected_date: Option<String>,
    pub maintenance_date: Option<String>,
    pub status: String,
    pub inspector_name: Option<String>,
    pub engineer_status: Option<String>,
    pub voltage: Option<String>,
    pub current: Option<String>,
    pub recommended_action: Option<String>,
    pub additional_remarks: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionRequest {
    pub branch: Option<String>,
    pub transformer_no: Option<String>,
    pub inspected_date: Option<String>,
    pub maintenance_date: Option<String>,
    pub status: Option<String>,
    pub inspector_name: Option<String>,
    pub engineer_status: Option<String>,
    pub voltage: Option<String>,
    pub current: Option<String>,
    pub recommended_action: Option<String>,
    pub additional_remarks: Option<String>,
}

/// `INSP-007` style number derived from the row id
pub fn format_inspection_no(id: u64) -> String {
    format!("INSP-{:03}", id)
}

pub struct InspectionService {
    pool: MySqlPool,
}

impl InspectionService {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, request: InspectionRequest) -> Result<Inspection> {
        let transformer_no = validate(&request)?;
        let maintenance_date = request.maintenance_date.clone().unwrap_or_else(display_now);
        let status = request.status.clone().unwrap_or_else(|| "Pending".to_string());

        let result = sqlx::query(
            r#"
            INSERT INTO inspections
                (branch, transformer_no, inspected_date, maintenance_date, status,
                 inspector_name, engineer_status, voltage, current,
                 recommended_action, additional_remarks)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&request.branch)
        .bind(&transformer_no)
        .bind(&request.inspected_date)
        .bind(&maintenance_date)
        .bind(&status)
        .bind(&request.inspector_name)
        .bind(&request.engineer_status)
        .bind(&request.voltage)
        .bind(&request.current)
        .bind(&request.recommended_action)
        .bind(&request.additional_remarks)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to insert inspection");
            Error::Operation(ResponseCode::InspectionNotCreated)
        })?;

        let id = result.last_insert_id();
        let inspection_no = format_inspection_no(id);

        sqlx::query("UPDATE inspections SET inspection_no = ? WHERE id = ?")
            .bind(&inspection_no)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(id = id, error = %e, "Failed to assign inspection number");
                Error::Operation(ResponseCode::InspectionNotCreated)
            })?;

        tracing::info!(id = id, inspection_no = %inspection_no, "Inspection created");
        self.get(id).await
    }

    pub async fn get(&self, id: u64) -> Result<Inspection> {
        let row = sqlx::query(&select_sql(" WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Inspection not found for id: {}", id)))?;

        row_to_inspection(row)
    }

    pub async fn list(&self) -> Result<Vec<Inspection>> {
        let rows = sqlx::query(&select_sql(" ORDER BY id DESC"))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_inspection).collect()
    }

    pub async fn list_by_transformer(&self, transformer_no: &str) -> Result<Vec<Inspection>> {
        let rows = sqlx::query(&select_sql(" WHERE transformer_no = ? ORDER BY id DESC"))
            .bind(transformer_no)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_inspection).collect()
    }

    pub async fn update(&self, id: u64, request: InspectionRequest) -> Result<Inspection> {
        let transformer_no = validate(&request)?;
        let existing = self.get(id).await?;

        sqlx::query(
            r#"
            UPDATE inspections
            SET branch = ?, transformer_no = ?, inspected_date = ?,
                maintenance_date = ?, status = ?, inspector_name = ?,
                engineer_status = ?, voltage = ?, current = ?,
                recommended_action = ?, additional_remarks = ?
            WHERE id = ?
            "#,
        )
        .bind(merged(&request.branch, &existing.branch))
        .bind(&transformer_no)
        .bind(merged(&request.inspected_date, &existing.inspected_date))
        .bind(merged(&request.maintenance_date, &existing.maintenance_date))
        .bind(request.status.as_deref().unwrap_or(&existing.status))
        .bind(merged(&request.inspector_name, &existing.inspector_name))
        .bind(merged(&request.engineer_status, &existing.engineer_status))
        .bind(merged(&request.voltage, &existing.voltage))
        .bind(merged(&request.current, &existing.current))
        .bind(merged(&request.recommended_action, &existing.recommended_action))
        .bind(merged(&request.additional_remarks, &existing.additional_remarks))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(id = id, error = %e, "Failed to update inspection");
            Error::Operation(ResponseCode::InspectionNotUpdated)
        })?;

        self.get(id).await
    }

    pub async fn delete(&self, id: u64) -> Result<()> {
        let result = sqlx::query("DELETE FROM inspections WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(id = id, error = %e, "Failed to delete inspection");
                Error::Operation(ResponseCode::InspectionNotDeleted)
            })?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Inspection not found for id: {}", id)));
        }
        tracing::info!(id = id, "Inspection deleted");
        Ok(())
    }

    /// Filtered, id-descending page of inspections
    pub async fn filter(&self, request: &FilterRequest) -> Result<(Vec<Inspection>, PageDetail)> {
        let filter = build_sql_filter(request, INSPECTION_COLUMNS);

        let count_sql = format!(
            "SELECT COUNT(*) AS total FROM inspections{}",
            filter.where_sql()
        );
        let mut count_query = sqlx::query(&count_sql);
        for bind in &filter.binds {
            count_query = count_query.bind(bind);
        }
        let total: i64 = count_query.fetch_one(&self.pool).await?.try_get("total")?;

        let page_sql = format!(
            "{} ORDER BY id DESC LIMIT ? OFFSET ?",
            select_sql(&filter.where_sql())
        );
        let mut page_query = sqlx::query(&page_sql);
        for bind in &filter.binds {
            page_query = page_query.bind(bind);
        }
        let rows = page_query
            .bind(request.limit())
            .bind(request.row_offset())
            .fetch_all(&self.pool)
            .await?;

        let inspections: Vec<Inspection> = rows
            .into_iter()
            .map(row_to_inspection)
            .collect::<Result<_>>()?;

        let detail = page_detail(total, request.offset(), inspections.len());
        Ok((inspections, detail))
    }
}

fn select_sql(suffix: &str) -> String {
    format!(
        "SELECT id, branch, inspection_no, transformer_no, inspected_date, \
         maintenance_date, status, inspector_name, engineer_status, voltage, \
         current, recommended_action, additional_remarks FROM inspections{}",
        suffix
    )
}

/// Omitted update fields keep their stored value
fn merged<'a>(new: &'a Option<String>, old: &'a Option<String>) -> Option<&'a str> {
    new.as_deref().or(old.as_deref())
}

fn validate(request: &InspectionRequest) -> Result<String> {
    match &request.transformer_no {
        Some(no) if !no.trim().is_empty() => Ok(no.clone()),
        _ => Err(Error::BadRequest(
            "Mandatory fields are missing for Inspection".to_string(),
        )),
    }
}

fn row_to_inspection(row: MySqlRow) -> Result<Inspection> {
    Ok(Inspection {
        id: row.try_get("id")?,
        branch: row.try_get("branch")?,
        inspection_no: row.try_get("inspection_no")?,
        transformer_no: row.try_get("transformer_no")?,
        inspected_date: row.try_get("inspected_date")?,
        maintenance_date: row.try_get("maintenance_date")?,
        status: row.try_get("status")?,
        inspector_name: row.try_get("inspector_name")?,
        engineer_status: row.try_get("engineer_status")?,
        voltage: row.try_get("voltage")?,
        current: row.try_get("current")?,
        recommended_action: row.try_get("recommended_action")?,
        additional_remarks: row.try_get("additional_remarks")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inspection_no_is_zero_padded() {
        assert_eq!(format_inspection_no(7), "INSP-007");
        assert_eq!(format_inspection_no(42), "INSP-042");
        assert_eq!(format_inspection_no(1234), "INSP-1234");
    }

    #[test]
    fn test_validate_requires_transformer_no() {
        let request = InspectionRequest {
            branch: Some("Colombo".to_string()),
            transformer_no: Some("".to_string()),
            inspected_date: None,
            maintenance_date: None,
            status: None,
            inspector_name: None,
            engineer_status: None,
            voltage: None,
            current: None,
            recommended_action: None,
            additional_remarks: None,
        };
        assert!(validate(&request).is_err());
    }

    #[test]
    fn test_update_preserves_omitted_fields() {
        let stored = Some("Colombo".to_string());
        assert_eq!(merged(&None, &stored), Some("Colombo"));
        assert_eq!(merged(&Some("Kandy".to_string()), &stored), Some("Kandy"));
        assert_eq!(merged(&None, &None), None);
    }

    #[test]
    fn test_select_sql_embeds_where() {
        let sql = select_sql(" WHERE transformer_no = ?");
        assert!(sql.ends_with("FROM inspections WHERE transformer_no = ?"));
    }
}
