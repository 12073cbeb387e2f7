// API request/response models (DTOs)

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::import::batch::{AmbiguousRow, ImportCounts, ImportReport, ItemError};
use crate::store::InventoryRow;

/// Import request body. The optional fields are validated by the handler so
/// missing pieces produce a 400 with a useful message instead of a
/// deserializer error.
#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub pharmacy_id: Option<Uuid>,
    pub items: Option<Vec<Value>>,
    /// Applied to rows that omit `category`; defaults to "product".
    pub default_category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub pharmacy_id: Uuid,
    pub processed: usize,
    pub counts: ImportCounts,
    pub ambiguous_rows: Vec<AmbiguousRow>,
    pub errors: Vec<ItemError>,
}

impl ImportResponse {
    pub fn new(pharmacy_id: Uuid, processed: usize, report: ImportReport) -> Self {
        Self {
            pharmacy_id,
            processed,
            counts: report.counts,
            ambiguous_rows: report.ambiguous_rows,
            errors: report.errors,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub pharmacy_id: Option<Uuid>,
    /// "json" (default) or "csv".
    pub format: Option<String>,
    /// Restrict to catalog entries created by the calling account.
    #[serde(default)]
    pub my_only: bool,
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub pharmacy_id: Uuid,
    pub my_only: bool,
    pub count: usize,
    pub items: Vec<InventoryRow>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub uptime_seconds: u64,
}

/// Uniform error body for non-200 responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
