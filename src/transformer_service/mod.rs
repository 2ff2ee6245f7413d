//! Transformer records
//!
//! CRUD and filtered listing over the `transformers` table.

use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::Row;

use crate::error::{Error, Result};
use crate::filtering::{build_sql_filter, page_detail, ColumnMap, FilterRequest};
use crate::models::{PageDetail, ResponseCode};

/// Filterable columns: api name -> SQL column
pub const TRANSFORMER_COLUMNS: ColumnMap = &[
    ("id", "id"),
    ("region", "region"),
    ("transformerNo", "transformer_no"),
    ("poleNo", "pole_no"),
    ("type", "transformer_type"),
    ("locationDetails", "location_details"),
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transformer {
    pub id: u64,
    pub region: Option<String>,
    pub transformer_no: String,
    pub pole_no: Option<String>,
    #[serde(rename = "type")]
    pub transformer_type: Option<String>,
    pub location_details: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformerRequest {
    pub region: Option<String>,
    pub transformer_no: Option<String>,
    pub pole_no: Option<String>,
    #[serde(rename = "type")]
    pub transformer_type: Option<String>,
    pub location_details: Option<String>,
}

pub struct TransformerService {
    pool: MySqlPool,
}

impl TransformerService {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, request: TransformerRequest) -> Result<Transformer> {
        let transformer_no = validate(&request)?;

        let result = sqlx::query(
            r#"
            INSERT INTO transformers
                (region, transformer_no, pole_no, transformer_type, location_details)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&request.region)
        .bind(&transformer_no)
        .bind(&request.pole_no)
        .bind(&request.transformer_type)
        .bind(&request.location_details)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to insert transformer");
            Error::Operation(ResponseCode::TransformerNotCreated)
        })?;

        let id = result.last_insert_id();
        tracing::info!(id = id, transformer_no = %transformer_no, "Transformer created");
        self.get(id).await
    }

    pub async fn get(&self, id: u64) -> Result<Transformer> {
        let row = sqlx::query(
            "SELECT id, region, transformer_no, pole_no, transformer_type, location_details \
             FROM transformers WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Transformer not found for id: {}", id)))?;

        row_to_transformer(row)
    }

    pub async fn list(&self) -> Result<Vec<Transformer>> {
        let rows = sqlx::query(
            "SELECT id, region, transformer_no, pole_no, transformer_type, location_details \
             FROM transformers ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_transformer).collect()
    }

    pub async fn update(&self, id: u64, request: TransformerRequest) -> Result<Transformer> {
        let transformer_no = validate(&request)?;
        // Surface missing ids before the generic not-updated code
        self.get(id).await?;

        sqlx::query(
            r#"
            UPDATE transformers
            SET region = ?, transformer_no = ?, pole_no = ?,
                transformer_type = ?, location_details = ?
            WHERE id = ?
            "#,
        )
        .bind(&request.region)
        .bind(&transformer_no)
        .bind(&request.pole_no)
        .bind(&request.transformer_type)
        .bind(&request.location_details)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(id = id, error = %e, "Failed to update transformer");
            Error::Operation(ResponseCode::TransformerNotUpdated)
        })?;

        self.get(id).await
    }

    pub async fn delete(&self, id: u64) -> Result<()> {
        let result = sqlx::query("DELETE FROM transformers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(id = id, error = %e, "Failed to delete transformer");
                Error::Operation(ResponseCode::TransformerNotDeleted)
            })?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Transformer not found for id: {}", id)));
        }
        tracing::info!(id = id, "Transformer deleted");
        Ok(())
    }

    /// Filtered, id-descending page of transformers
    pub async fn filter(&self, request: &FilterRequest) -> Result<(Vec<Transformer>, PageDetail)> {
        let filter = build_sql_filter(request, TRANSFORMER_COLUMNS);

        let count_sql = format!(
            "SELECT COUNT(*) AS total FROM transformers{}",
            filter.where_sql()
        );
        let mut count_query = sqlx::query(&count_sql);
        for bind in &filter.binds {
            count_query = count_query.bind(bind);
        }
        let total: i64 = count_query.fetch_one(&self.pool).await?.try_get("total")?;

        let page_sql = format!(
            "SELECT id, region, transformer_no, pole_no, transformer_type, location_details \
             FROM transformers{} ORDER BY id DESC LIMIT ? OFFSET ?",
            filter.where_sql()
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

        let transformers: Vec<Transformer> = rows
            .into_iter()
            .map(row_to_transformer)
            .collect::<Result<_>>()?;

        let detail = page_detail(total, request.offset(), transformers.len());
        Ok((transformers, detail))
    }
}

fn validate(request: &TransformerRequest) -> Result<String> {
    match &request.transformer_no {
        Some(no) if !no.trim().is_empty() => Ok(no.clone()),
        _ => Err(Error::BadRequest(
            "Mandatory fields are missing for Transformer".to_string(),
        )),
    }
}

fn row_to_transformer(row: MySqlRow) -> Result<Transformer> {
    Ok(Transformer {
        id: row.try_get("id")?,
        region: row.try_get("region")?,
        transformer_no: row.try_get("transformer_no")?,
        pole_no: row.try_get("pole_no")?,
        transformer_type: row.try_get("transformer_type")?,
        location_details: row.try_get("location_details")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_transformer_no() {
        let request = TransformerRequest {
            region: Some("North".to_string()),
            transformer_no: None,
            pole_no: None,
            transformer_type: None,
            location_details: None,
        };
        assert!(validate(&request).is_err());

        let request = TransformerRequest {
            transformer_no: Some("TX100".to_string()),
            ..request
        };
        assert_eq!(validate(&request).unwrap(), "TX100");
    }

    #[test]
    fn test_column_map_covers_entity_fields() {
        let api_names: Vec<&str> = TRANSFORMER_COLUMNS.iter().map(|(api, _)| *api).collect();
        assert!(api_names.contains(&"transformerNo"));
        assert!(api_names.contains(&"locationDetails"));
        assert!(!api_names.contains(&"image"));
    }

    #[test]
    fn test_transformer_serializes_camel_case() {
        let transformer = Transformer {
            id: 7,
            region: Some("North".to_string()),
            transformer_no: "TX100".to_string(),
            pole_no: Some("P-1".to_string()),
            transformer_type: Some("Bulk".to_string()),
            location_details: None,
        };
        let json = serde_json::to_value(&transformer).unwrap();
        assert_eq!(json["transformerNo"], "TX100");
        assert_eq!(json["type"], "Bulk");
        assert_eq!(json["poleNo"], "P-1");
    }
}
