//! Postgres + pgvector index
//!
//! Expects the ingestion job to have filled a table shaped like
//! `(text TEXT, source TEXT, embedding vector(N))`. The pool is opened once
//! at startup and shared across requests.

use super::VectorIndex;
use crate::error::ComplianceError;
use crate::models::RetrievedDocument;
use crate::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;
use tracing::info;

pub struct PgVectorIndex {
    pool: PgPool,
    table: String,
}

impl PgVectorIndex {
    pub async fn connect(database_url: &str, table: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;

        info!(table = %table, "Connected to pgvector compliance index");
        Self::from_pool(pool, table)
    }

    pub fn from_pool(pool: PgPool, table: &str) -> Result<Self> {
        Ok(Self {
            pool,
            table: validate_table_name(table)?,
        })
    }
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    async fn nearest(
        &self,
        embedding: &[f32],
        k: usize,
        min_score: Option<f32>,
    ) -> Result<Vec<RetrievedDocument>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        // `<=>` is cosine distance; similarity = 1 - distance.
        let sql = format!(
            r#"
            SELECT text, source, (1 - (embedding <=> $1::vector))::float8 AS score
            FROM {table}
            WHERE $3::float8 IS NULL OR 1 - (embedding <=> $1::vector) >= $3::float8
            ORDER BY embedding <=> $1::vector
            LIMIT $2
            "#,
            table = self.table
        );

        let rows = sqlx::query(&sql)
            .bind(vector_literal(embedding))
            .bind(k as i64)
            .bind(min_score.map(f64::from))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<RetrievedDocument> {
                let source: Option<String> = row.try_get("source")?;
                let score: f64 = row.try_get("score")?;
                Ok(RetrievedDocument {
                    text: row.try_get("text")?,
                    source: source.unwrap_or_default(),
                    score: score as f32,
                })
            })
            .collect()
    }

    async fn is_empty(&self) -> Result<bool> {
        let sql = format!("SELECT EXISTS (SELECT 1 FROM {}) AS present", self.table);
        let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
        let present: bool = row.try_get("present")?;
        Ok(!present)
    }
}

/// pgvector text input format: `[0.1,0.2,...]`.
fn vector_literal(embedding: &[f32]) -> String {
    let values: Vec<String> = embedding.iter().map(|v| v.to_string()).collect();
    format!("[{}]", values.join(","))
}

/// Table names are interpolated into SQL, so only plain (optionally schema-qualified) identifiers pass.
fn validate_table_name(table: &str) -> Result<String> {
    let valid = !table.is_empty()
        && table.split('.').count() <= 2
        && table.split('.').all(|part| {
            !part.is_empty()
                && part
                    .chars()
                    .next()
                    .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
                && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });

    if valid {
        Ok(table.to_string())
    } else {
        Err(ComplianceError::Config(format!(
            "invalid index table name: {}",
            table
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_literal() {
        assert_eq!(vector_literal(&[0.5, -1.0, 2.25]), "[0.5,-1,2.25]");
        assert_eq!(vector_literal(&[]), "[]");
    }

    #[test]
    fn test_table_name_validation() {
        assert!(validate_table_name("compliance_chunks").is_ok());
        assert!(validate_table_name("rag.compliance_chunks").is_ok());
        assert!(validate_table_name("chunks; DROP TABLE users").is_err());
        assert!(validate_table_name("1chunks").is_err());
        assert!(validate_table_name("a.b.c").is_err());
        assert!(validate_table_name("").is_err());
    }
}
