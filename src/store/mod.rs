//! Store seams for the import engine.
//!
//! The engine never talks to the database directly; it goes through two
//! narrow handles so the authorization check and the privileged writes stay
//! separately scoped and testable:
//!
//! * [`AccessStore`] — "may this account manage that pharmacy's inventory".
//! * [`CatalogStore`] — reads/writes against the shared canonical catalog
//!   and the per-pharmacy inventory association table.
//!
//! `store::postgres` implements both against Postgres; tests use the
//! in-memory implementation in `store::memory`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::import::item::{AssociationStatus, Category};

pub mod postgres;

#[cfg(test)]
pub mod memory;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected a write. The catalog writer recovers
    /// from this only for the barcode constraint; everything else is a
    /// plain item failure.
    #[error("unique constraint violated ({})", constraint.as_deref().unwrap_or("unknown"))]
    UniqueViolation { constraint: Option<String> },

    #[error("store query failed: {0}")]
    Backend(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Canonical catalog row, shared across all pharmacies.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CatalogItem {
    pub id: Uuid,
    pub category: String,
    pub name_el: Option<String>,
    pub name_en: Option<String>,
    pub name_el_norm: Option<String>,
    pub name_en_norm: Option<String>,
    pub desc_el: Option<String>,
    pub desc_en: Option<String>,
    pub barcode: Option<String>,
    pub brand: Option<String>,
    pub strength: Option<String>,
    pub strength_norm: Option<String>,
    pub form: Option<String>,
    pub form_norm: Option<String>,
    pub active_ingredient_el: Option<String>,
    pub active_ingredient_en: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for a brand-new catalog row. Only non-blank fields are set; the
/// store writes NULL for the rest.
#[derive(Debug, Clone)]
pub struct NewCatalogItem {
    pub category: Category,
    pub name_el: Option<String>,
    pub name_en: Option<String>,
    pub name_el_norm: Option<String>,
    pub name_en_norm: Option<String>,
    pub desc_el: Option<String>,
    pub desc_en: Option<String>,
    pub barcode: Option<String>,
    pub brand: Option<String>,
    pub strength: Option<String>,
    pub strength_norm: Option<String>,
    pub form: Option<String>,
    pub form_norm: Option<String>,
    pub active_ingredient_el: Option<String>,
    pub active_ingredient_en: Option<String>,
    pub created_by: Uuid,
}

/// Fill-missing-only update for an existing catalog row. Every field here is
/// written only when the stored value is still blank; a populated canonical
/// field is never overwritten.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogPatch {
    pub name_el: Option<String>,
    pub name_en: Option<String>,
    pub name_el_norm: Option<String>,
    pub name_en_norm: Option<String>,
    pub desc_el: Option<String>,
    pub desc_en: Option<String>,
    pub barcode: Option<String>,
    pub brand: Option<String>,
    pub strength: Option<String>,
    pub strength_norm: Option<String>,
    pub form: Option<String>,
    pub form_norm: Option<String>,
    pub active_ingredient_el: Option<String>,
    pub active_ingredient_en: Option<String>,
}

impl CatalogPatch {
    pub fn is_empty(&self) -> bool {
        *self == CatalogPatch::default()
    }
}

/// Which localized name column a name-tier lookup targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameLang {
    El,
    En,
}

/// Name-tier lookup: normalized name scoped to a category, optionally
/// narrowed by normalized form/strength.
#[derive(Debug, Clone)]
pub struct NameQuery<'a> {
    pub category: Category,
    pub lang: NameLang,
    pub name_norm: &'a str,
    pub form_norm: Option<&'a str>,
    pub strength_norm: Option<&'a str>,
}

/// Upsert payload for the (pharmacy, product) association. `status` is
/// always written; the `Option` fields are written only when the import row
/// explicitly carried them. `notes` set to an empty string clears the note.
#[derive(Debug, Clone)]
pub struct AssociationUpsert {
    pub pharmacy_id: Uuid,
    pub product_id: Uuid,
    pub status: AssociationStatus,
    pub in_stock: Option<bool>,
    pub price: Option<f64>,
    pub notes: Option<String>,
}

/// One row of the association+catalog join served by the export endpoint.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct InventoryRow {
    pub pharmacy_id: Uuid,
    pub product_id: Uuid,
    pub category: String,
    pub name_el: Option<String>,
    pub name_en: Option<String>,
    pub barcode: Option<String>,
    pub brand: Option<String>,
    pub form: Option<String>,
    pub strength: Option<String>,
    pub association_status: String,
    pub in_stock: bool,
    pub price: Option<f64>,
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait AccessStore: Send + Sync {
    /// Single boolean authorization check, evaluated once per batch before
    /// any write happens.
    async fn can_manage_pharmacy(
        &self,
        account_id: Uuid,
        pharmacy_id: Uuid,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// All catalog rows carrying exactly this barcode, oldest first.
    async fn catalog_by_barcode(&self, barcode: &str) -> Result<Vec<CatalogItem>, StoreError>;

    /// Name-tier candidates for one localized name column.
    async fn catalog_by_name(&self, query: &NameQuery<'_>) -> Result<Vec<CatalogItem>, StoreError>;

    /// Insert a new canonical row; surfaces `StoreError::UniqueViolation`
    /// when a constraint (notably the barcode unique index) rejects it.
    async fn insert_catalog(&self, item: &NewCatalogItem) -> Result<CatalogItem, StoreError>;

    /// Apply a fill-missing-only patch to an existing row.
    async fn backfill_catalog(&self, id: Uuid, patch: &CatalogPatch) -> Result<(), StoreError>;

    /// True upsert on (pharmacy_id, product_id).
    async fn upsert_association(&self, upsert: &AssociationUpsert) -> Result<(), StoreError>;

    /// Association+catalog join for one pharmacy; `created_by` restricts to
    /// catalog rows created by that account ("my items only").
    async fn inventory_rows(
        &self,
        pharmacy_id: Uuid,
        created_by: Option<Uuid>,
    ) -> Result<Vec<InventoryRow>, StoreError>;
}

/// Blank test shared by the writer and both store implementations: NULL and
/// whitespace-only both count as "not yet curated".
pub fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |s| s.trim().is_empty())
}
