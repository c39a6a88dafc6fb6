use crate::utils::{config::DatabaseConfig, ApiError, ApiResult};
use postgrest::{Builder, Postgrest};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Display;

/// Database client wrapper for the PostgREST endpoint in front of PostgreSQL
#[derive(Clone)]
pub struct Database {
    client: Postgrest,
    base_url: String,
}

impl Database {
    /// Create a new database client
    pub fn new(config: &DatabaseConfig) -> Self {
        let base_url = config.url.trim_end_matches('/').to_string();
        let client = Postgrest::new(format!("{}/rest/v1", base_url))
            .insert_header("apikey", &config.service_key)
            .insert_header("Authorization", format!("Bearer {}", config.service_key));

        Self { client, base_url }
    }

    /// Get a reference to the PostgREST client
    pub fn client(&self) -> &Postgrest {
        &self.client
    }

    /// Start a query against a table
    pub fn table(&self, name: &str) -> Builder {
        self.client.from(name)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run a select and decode every returned row
    pub async fn fetch_all<T: DeserializeOwned>(&self, query: Builder) -> ApiResult<Vec<T>> {
        let response = query.execute().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            tracing::error!("Select failed with status {}: {}", status, body);
            return Err(ApiError::internal_error("Database query failed"));
        }

        decode_rows(&body)
    }

    /// Run a select limited to one row
    pub async fn fetch_optional<T: DeserializeOwned>(&self, query: Builder) -> ApiResult<Option<T>> {
        let rows: Vec<T> = self.fetch_all(query.limit(1)).await?;
        Ok(rows.into_iter().next())
    }

    /// Like `fetch_optional`, but a missing row is a 404
    pub async fn fetch_one<T: DeserializeOwned>(&self, query: Builder, what: &str) -> ApiResult<T> {
        self.fetch_optional(query)
            .await?
            .ok_or_else(|| ApiError::not_found_error(format!("{} not found", what)))
    }

    /// Number of rows matched by a `select("id")` query
    pub async fn count(&self, query: Builder) -> ApiResult<usize> {
        let rows: Vec<serde_json::Value> = self.fetch_all(query).await?;
        Ok(rows.len())
    }

    /// Insert a row and return its stored representation
    pub async fn insert<T: DeserializeOwned>(&self, table: &str, row: &impl Serialize) -> ApiResult<T> {
        let body = serde_json::to_string(row)?;
        let response = self
            .table(table)
            .insert(body)
            .execute()
            .await
            .map_err(transport_error)?;
        let status = response.status();

        if status.as_u16() == 409 {
            return Err(ApiError::conflict_error("Record already exists"));
        }
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            tracing::error!("Insert into {} failed with status {}: {}", table, status, body);
            return Err(ApiError::internal_error("Database write failed"));
        }

        let rows: Vec<T> = decode_rows(&body)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| ApiError::internal_error("Insert returned no row"))
    }

    /// Patch every row matched by `query` and return the updated rows
    pub async fn update<T: DeserializeOwned>(
        &self,
        query: Builder,
        changes: &impl Serialize,
    ) -> ApiResult<Vec<T>> {
        let body = serde_json::to_string(changes)?;
        let response = query.update(body).execute().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            tracing::error!("Update failed with status {}: {}", status, body);
            return Err(ApiError::internal_error("Database write failed"));
        }

        decode_rows(&body)
    }

    /// Patch a single row; none matched is a 404
    pub async fn update_one<T: DeserializeOwned>(
        &self,
        query: Builder,
        changes: &impl Serialize,
        what: &str,
    ) -> ApiResult<T> {
        self.update(query, changes)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::not_found_error(format!("{} not found", what)))
    }

    /// Delete the rows matched by `query`, returning how many went away
    pub async fn delete(&self, query: Builder) -> ApiResult<usize> {
        let response = query.delete().execute().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            tracing::error!("Delete failed with status {}: {}", status, body);
            return Err(ApiError::internal_error("Database write failed"));
        }

        // `return=minimal` answers with an empty body
        if body.trim().is_empty() {
            return Ok(0);
        }
        let rows: Vec<serde_json::Value> = decode_rows(&body)?;
        Ok(rows.len())
    }

    /// Reachability check used by the health endpoints
    pub async fn ping(&self) -> bool {
        match self.table("users").select("id").limit(1).execute().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::warn!("Database ping failed: {}", e);
                false
            }
        }
    }
}

fn transport_error(err: impl Display) -> ApiError {
    tracing::error!("PostgREST request failed: {}", err);
    ApiError::service_unavailable("Database unavailable")
}

/// Decode a PostgREST JSON array of rows
fn decode_rows<T: DeserializeOwned>(body: &str) -> ApiResult<Vec<T>> {
    serde_json::from_str(body).map_err(|e| {
        tracing::error!("Unexpected PostgREST payload: {}", e);
        ApiError::internal_error("Database returned an unexpected payload")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[derive(Debug, serde::Deserialize)]
    struct Row {
        id: i64,
    }

    #[test]
    fn rows_decode_from_a_json_array() {
        let rows: Vec<Row> = decode_rows(r#"[{"id":1},{"id":2}]"#).unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn malformed_payload_is_an_internal_error() {
        let err = decode_rows::<Row>("<html>bad gateway</html>").unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn selects_decode_the_response_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/users")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id":4}]"#)
            .create_async()
            .await;
        let db = Database::new(&DatabaseConfig {
            url: server.url(),
            service_key: "test".to_string(),
        });

        let row: Option<Row> = db.fetch_optional(db.table("users").select("id")).await.unwrap();
        assert_eq!(row.map(|r| r.id), Some(4));
    }

    #[tokio::test]
    async fn single_row_reads_limit_through_the_range_header() {
        let mut server = mockito::Server::new_async().await;
        let read = server
            .mock("GET", "/rest/v1/users")
            .match_query(mockito::Matcher::Exact("select=*".into()))
            .match_header("range", "0-0")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("[]")
            .create_async()
            .await;
        let db = Database::new(&DatabaseConfig {
            url: server.url(),
            service_key: "test".to_string(),
        });

        let row: Option<Row> = db
            .fetch_optional(db.table("users").select("*").limit(1))
            .await
            .unwrap();
        assert!(row.is_none());
        read.assert_async().await;
    }

    #[tokio::test]
    async fn unreachable_database_is_unavailable() {
        let db = Database::new(&DatabaseConfig {
            url: "http://127.0.0.1:1".to_string(),
            service_key: "test".to_string(),
        });

        let err = db
            .fetch_all::<Row>(db.table("users").select("id"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
