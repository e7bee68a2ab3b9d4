//! Rendering inputs and the rendering service
//!
//! Jobs only carry a reference (`data`) into a domain table. The worker
//! resolves it through a [`SubjectSource`] and hands the result to a
//! [`TicketRenderer`], which returns encoded raster images.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use tracing::debug;

use crate::job::JobType;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Subject repository error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Render service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Invalid subject table name: {0}")]
    InvalidTable(String),
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Domain record a job refers to, as opaque JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintSubject {
    pub reference: String,
    pub payload: serde_json::Value,
}

/// Read-only access to the records jobs point at
#[async_trait]
pub trait SubjectSource: Send + Sync {
    /// `Ok(None)` when the referenced record does not exist
    async fn load(&self, job_type: JobType, reference: &str) -> SourceResult<Option<PrintSubject>>;
}

/// Turns a subject into printable images (PNG or any format `image` decodes)
#[async_trait]
pub trait TicketRenderer: Send + Sync {
    async fn render(&self, job_type: JobType, subject: &PrintSubject) -> SourceResult<Vec<Vec<u8>>>;
}

// ============================================================================
// PostgreSQL subject source
// ============================================================================

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Loads subjects as whole rows (`row_to_json`) from per-job-type tables
#[derive(Clone)]
pub struct PgSubjectSource {
    pool: PgPool,
    tables: HashMap<JobType, String>,
}

impl PgSubjectSource {
    pub fn new(pool: PgPool) -> Self {
        let tables = HashMap::from([
            (JobType::ChefOrder, "chef_orders".to_string()),
            (JobType::LabelTicket, "orders".to_string()),
            (JobType::Invoice, "invoices".to_string()),
        ]);
        Self { pool, tables }
    }

    /// Override the table for one job type; the name is interpolated, so it
    /// must be a plain identifier
    pub fn with_table(mut self, job_type: JobType, table: &str) -> SourceResult<Self> {
        if !is_identifier(table) {
            return Err(SourceError::InvalidTable(table.to_string()));
        }
        self.tables.insert(job_type, table.to_string());
        Ok(self)
    }
}

#[async_trait]
impl SubjectSource for PgSubjectSource {
    async fn load(&self, job_type: JobType, reference: &str) -> SourceResult<Option<PrintSubject>> {
        let table = self
            .tables
            .get(&job_type)
            .ok_or_else(|| SourceError::InvalidTable(format!("none for {}", job_type)))?;

        let sql = format!(
            "SELECT row_to_json(t)::TEXT FROM {} t WHERE t.id::TEXT = $1",
            table
        );
        let row: Option<String> = sqlx::query_scalar(&sql)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|json| {
            let payload = serde_json::from_str(&json)
                .map_err(|e| SourceError::Render(format!("subject row is not JSON: {}", e)))?;
            Ok(PrintSubject {
                reference: reference.to_string(),
                payload,
            })
        })
        .transpose()
    }
}

// ============================================================================
// HTTP render service
// ============================================================================

#[derive(Serialize)]
struct RenderRequest<'a> {
    reference: &'a str,
    payload: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct RenderResponse {
    /// Base64-encoded images, one per printed page or label
    images: Vec<String>,
}

/// Client for an external render service
///
/// `POST {base_url}/render/{job_type}` with the subject, answered by
/// `{"images": ["<base64>", ...]}`.
#[derive(Debug, Clone)]
pub struct HttpRenderer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRenderer {
    pub fn new(base_url: &str, timeout: Duration) -> SourceResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn render_url(&self, job_type: JobType) -> String {
        format!("{}/render/{}", self.base_url, job_type)
    }
}

#[async_trait]
impl TicketRenderer for HttpRenderer {
    async fn render(
        &self,
        job_type: JobType,
        subject: &PrintSubject,
    ) -> SourceResult<Vec<Vec<u8>>> {
        let resp = self
            .client
            .post(self.render_url(job_type))
            .json(&RenderRequest {
                reference: &subject.reference,
                payload: &subject.payload,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(SourceError::Render(format!("{}: {}", status, text)));
        }

        let body: RenderResponse = resp.json().await?;
        debug!(job_type = %job_type, images = body.images.len(), "Render service responded");

        body.images
            .iter()
            .map(|image| {
                base64::engine::general_purpose::STANDARD
                    .decode(image)
                    .map_err(|e| SourceError::Render(format!("invalid base64 image: {}", e)))
            })
            .collect()
    }
}
