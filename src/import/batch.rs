//! Batch orchestration: preconditions, the sequential per-item pipeline and
//! the aggregated report.
//!
//! Items are processed strictly in order — catalog resolution both reads and
//! writes the shared catalog, and ordering keeps the duplicate-barcode race
//! handling deterministic. One item's failure never halts the rest, and
//! there is no cross-item transaction: each successful write is durable on
//! its own.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::import::item::{parse_item, Category};
use crate::import::matcher::{self, MatchOutcome};
use crate::import::writer;
use crate::store::{AccessStore, CatalogStore, StoreError};

/// Hard ceiling on items per request; larger batches are rejected wholesale
/// before any write.
pub const MAX_BATCH_ITEMS: usize = 500;

/// Fatal, whole-request failures. None of these leave partial effects.
#[derive(Debug, Error)]
pub enum ImportRequestError {
    #[error("items must be a non-empty array")]
    EmptyBatch,

    #[error("batch of {len} items exceeds the limit of {max}")]
    BatchTooLarge { len: usize, max: usize },

    #[error("account is not allowed to manage this pharmacy's inventory")]
    Forbidden,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Pipeline stage an item error was recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStage {
    Parse,
    Match,
    Catalog,
    Inventory,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportCounts {
    pub created_catalog: usize,
    pub updated_catalog: usize,
    pub upserted_inventory: usize,
    pub skipped_invalid: usize,
    pub ambiguous_skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemError {
    pub index: usize,
    pub stage: ImportStage,
    pub message: String,
    pub item: Value,
}

/// Ambiguity report: blocking for the name tier, informational for
/// duplicate barcodes (where the oldest row is still used).
#[derive(Debug, Clone, Serialize)]
pub struct AmbiguousRow {
    pub index: usize,
    pub message: String,
    pub candidate_count: usize,
    pub candidate_ids: Vec<Uuid>,
    pub created_new: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    pub counts: ImportCounts,
    pub errors: Vec<ItemError>,
    pub ambiguous_rows: Vec<AmbiguousRow>,
}

impl ImportReport {
    fn item_error(&mut self, index: usize, stage: ImportStage, message: String, item: &Value) {
        debug!(index, ?stage, %message, "import item failed");
        self.counts.skipped_invalid += 1;
        self.errors.push(ItemError {
            index,
            stage,
            message,
            item: item.clone(),
        });
    }
}

/// Run one import batch for `pharmacy_id` on behalf of `account_id`.
///
/// Preconditions (non-empty batch, size ceiling, management rights) are
/// checked once up front and abort the whole call; after that each item is
/// parsed, matched, resolved against the catalog and upserted into the
/// pharmacy's inventory, with per-item outcomes folded into the report.
pub async fn run_import(
    access: &dyn AccessStore,
    catalog: &dyn CatalogStore,
    account_id: Uuid,
    pharmacy_id: Uuid,
    default_category: Category,
    items: &[Value],
) -> Result<ImportReport, ImportRequestError> {
    if items.is_empty() {
        return Err(ImportRequestError::EmptyBatch);
    }
    if items.len() > MAX_BATCH_ITEMS {
        return Err(ImportRequestError::BatchTooLarge {
            len: items.len(),
            max: MAX_BATCH_ITEMS,
        });
    }
    if !access.can_manage_pharmacy(account_id, pharmacy_id).await? {
        return Err(ImportRequestError::Forbidden);
    }

    info!(%pharmacy_id, items = items.len(), "starting inventory import");
    let mut report = ImportReport::default();

    for (index, raw) in items.iter().enumerate() {
        let parsed = match parse_item(raw, default_category) {
            Ok(p) => p,
            Err(message) => {
                report.item_error(index, ImportStage::Parse, message, raw);
                continue;
            }
        };

        let outcome = match matcher::resolve(catalog, &parsed).await {
            Ok(o) => o,
            Err(e) => {
                report.item_error(index, ImportStage::Match, e.to_string(), raw);
                continue;
            }
        };

        let product_id = match outcome {
            MatchOutcome::Ambiguous { candidate_ids } => {
                warn!(index, candidates = candidate_ids.len(), "ambiguous name match; skipping item");
                report.counts.ambiguous_skipped += 1;
                report.ambiguous_rows.push(AmbiguousRow {
                    index,
                    message: "multiple catalog entries match by name; refusing to guess"
                        .to_string(),
                    candidate_count: candidate_ids.len(),
                    candidate_ids,
                    created_new: false,
                });
                continue;
            }
            MatchOutcome::Matched {
                item,
                extra_barcode_ids,
            } => {
                if !extra_barcode_ids.is_empty() {
                    // Duplicate barcode rows are a catalog data issue, not a
                    // reason to skip the item; surface them and carry on with
                    // the oldest row.
                    let mut candidate_ids = vec![item.id];
                    candidate_ids.extend(extra_barcode_ids);
                    report.ambiguous_rows.push(AmbiguousRow {
                        index,
                        message: "multiple catalog entries share this barcode; using the oldest"
                            .to_string(),
                        candidate_count: candidate_ids.len(),
                        candidate_ids,
                        created_new: false,
                    });
                }
                let patch = writer::backfill_patch(&item, &parsed);
                if !patch.is_empty() {
                    match catalog.backfill_catalog(item.id, &patch).await {
                        Ok(()) => report.counts.updated_catalog += 1,
                        Err(e) => {
                            report.item_error(index, ImportStage::Catalog, e.to_string(), raw);
                            continue;
                        }
                    }
                }
                item.id
            }
            MatchOutcome::NoMatch => {
                match writer::create_catalog_row(catalog, &parsed, account_id).await {
                    Ok(row) => {
                        if row.created {
                            report.counts.created_catalog += 1;
                        }
                        row.item.id
                    }
                    Err(e) => {
                        report.item_error(index, ImportStage::Catalog, e.to_string(), raw);
                        continue;
                    }
                }
            }
        };

        let upsert = writer::association_upsert(pharmacy_id, product_id, &parsed);
        match catalog.upsert_association(&upsert).await {
            Ok(()) => report.counts.upserted_inventory += 1,
            Err(e) => report.item_error(index, ImportStage::Inventory, e.to_string(), raw),
        }
    }

    info!(
        %pharmacy_id,
        created = report.counts.created_catalog,
        updated = report.counts.updated_catalog,
        upserted = report.counts.upserted_inventory,
        skipped = report.counts.skipped_invalid,
        ambiguous = report.counts.ambiguous_skipped,
        "inventory import finished"
    );
    Ok(report)
}
