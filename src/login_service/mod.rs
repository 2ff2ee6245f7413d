//! User accounts and credential checks
//!
//! Credentials are compared as stored, matching the upstream system
//! this service replaces. Passwords never appear in responses.

use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::Row;

use crate::error::{Error, Result};
use crate::models::ResponseCode;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub username: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub display_name: Option<String>,
}

pub struct LoginService {
    pool: MySqlPool,
}

impl LoginService {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, request: LoginRequest) -> Result<User> {
        let (username, password) = validate(&request)?;

        let result = sqlx::query(
            "INSERT INTO users (username, password, display_name) VALUES (?, ?, ?)",
        )
        .bind(&username)
        .bind(&password)
        .bind(&request.display_name)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(username = %username, error = %e, "Failed to insert user");
            Error::Operation(ResponseCode::UserNotCreated)
        })?;

        let id = result.last_insert_id();
        tracing::info!(id = id, username = %username, "User created");
        self.get(id).await
    }

    pub async fn verify(&self, request: LoginRequest) -> Result<User> {
        let (username, password) = validate(&request)?;

        let row = sqlx::query(
            "SELECT id, username, display_name FROM users \
             WHERE username = ? AND password = ?",
        )
        .bind(&username)
        .bind(&password)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_user(row),
            None => {
                tracing::warn!(username = %username, "Login rejected");
                Err(Error::BadRequest("Invalid username or password".to_string()))
            }
        }
    }

    pub async fn get(&self, id: u64) -> Result<User> {
        let row = sqlx::query("SELECT id, username, display_name FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("User not found for id: {}", id)))?;
        row_to_user(row)
    }
}

fn validate(request: &LoginRequest) -> Result<(String, String)> {
    let username = request
        .username
        .clone()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| Error::BadRequest("Mandatory fields are missing for User".to_string()))?;
    let password = request
        .password
        .clone()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| Error::BadRequest("Mandatory fields are missing for User".to_string()))?;
    Ok((username, password))
}

fn row_to_user(row: MySqlRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        display_name: row.try_get("display_name")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_username_and_password() {
        let request = LoginRequest {
            username: Some("admin".to_string()),
            password: None,
            display_name: None,
        };
        assert!(validate(&request).is_err());

        let request = LoginRequest {
            username: Some("  ".to_string()),
            password: Some("secret".to_string()),
            display_name: None,
        };
        assert!(validate(&request).is_err());

        let request = LoginRequest {
            username: Some("admin".to_string()),
            password: Some("secret".to_string()),
            display_name: None,
        };
        assert_eq!(
            validate(&request).unwrap(),
            ("admin".to_string(), "secret".to_string())
        );
    }

    #[test]
    fn test_user_never_serializes_password() {
        let user = User {
            id: 1,
            username: "admin".to_string(),
            display_name: Some("Administrator".to_string()),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["username"], "admin");
        assert_eq!(json["displayName"], "Administrator");
    }
}
