//! Catalog and association writes.
//!
//! Creation is idempotent under concurrent imports of the same barcode: when
//! the insert loses the race against another request, the unique violation
//! is caught, the row is re-read by barcode and adopted. Only that specific
//! recovery exists; any other store failure is the item's error.
//!
//! Backfill is fill-missing-only: a canonical field that already holds a
//! value is never overwritten, whatever the incoming row says.

use uuid::Uuid;

use crate::import::item::{AssociationStatus, ParsedItem};
use crate::store::{
    is_blank, AssociationUpsert, CatalogItem, CatalogPatch, CatalogStore, NewCatalogItem,
    StoreError,
};

/// Result of creating a catalog row for an unmatched item.
#[derive(Debug)]
pub struct CreatedCatalogRow {
    pub item: CatalogItem,
    /// False when the insert hit the barcode race and an existing row was
    /// adopted instead.
    pub created: bool,
}

fn new_catalog_item(parsed: &ParsedItem, created_by: Uuid) -> NewCatalogItem {
    NewCatalogItem {
        category: parsed.category,
        name_el: parsed.name_el.clone(),
        name_en: parsed.name_en.clone(),
        name_el_norm: parsed.name_el_norm.clone(),
        name_en_norm: parsed.name_en_norm.clone(),
        desc_el: parsed.desc_el.clone(),
        desc_en: parsed.desc_en.clone(),
        barcode: parsed.barcode.clone(),
        brand: parsed.brand.clone(),
        strength: parsed.strength.clone(),
        strength_norm: parsed.strength_norm.clone(),
        form: parsed.form.clone(),
        form_norm: parsed.form_norm.clone(),
        active_ingredient_el: parsed.active_ingredient_el.clone(),
        active_ingredient_en: parsed.active_ingredient_en.clone(),
        created_by,
    }
}

/// Insert a new canonical row from every non-blank field of the parsed item.
/// On a uniqueness race for the barcode, re-query and adopt the winner.
pub async fn create_catalog_row(
    store: &dyn CatalogStore,
    parsed: &ParsedItem,
    created_by: Uuid,
) -> Result<CreatedCatalogRow, StoreError> {
    match store.insert_catalog(&new_catalog_item(parsed, created_by)).await {
        Ok(item) => Ok(CreatedCatalogRow {
            item,
            created: true,
        }),
        Err(StoreError::UniqueViolation { constraint }) => {
            let Some(barcode) = parsed.barcode.as_deref() else {
                return Err(StoreError::UniqueViolation { constraint });
            };
            let mut rows = store.catalog_by_barcode(barcode).await?.into_iter();
            match rows.next() {
                Some(item) => Ok(CreatedCatalogRow {
                    item,
                    created: false,
                }),
                // The conflicting row vanished between the insert and the
                // re-read; report the original violation.
                None => Err(StoreError::UniqueViolation { constraint }),
            }
        }
        Err(e) => Err(e),
    }
}

fn fill<'a>(current: Option<&str>, incoming: Option<&'a str>) -> Option<String> {
    if is_blank(current) && !is_blank(incoming) {
        incoming.map(str::to_string)
    } else {
        None
    }
}

/// Compute the subset of canonical fields that are blank on the stored row
/// and non-blank on the incoming item. Empty patch means nothing to do.
pub fn backfill_patch(current: &CatalogItem, parsed: &ParsedItem) -> CatalogPatch {
    CatalogPatch {
        name_el: fill(current.name_el.as_deref(), parsed.name_el.as_deref()),
        name_en: fill(current.name_en.as_deref(), parsed.name_en.as_deref()),
        name_el_norm: fill(current.name_el_norm.as_deref(), parsed.name_el_norm.as_deref()),
        name_en_norm: fill(current.name_en_norm.as_deref(), parsed.name_en_norm.as_deref()),
        desc_el: fill(current.desc_el.as_deref(), parsed.desc_el.as_deref()),
        desc_en: fill(current.desc_en.as_deref(), parsed.desc_en.as_deref()),
        barcode: fill(current.barcode.as_deref(), parsed.barcode.as_deref()),
        brand: fill(current.brand.as_deref(), parsed.brand.as_deref()),
        strength: fill(current.strength.as_deref(), parsed.strength.as_deref()),
        strength_norm: fill(
            current.strength_norm.as_deref(),
            parsed.strength_norm.as_deref(),
        ),
        form: fill(current.form.as_deref(), parsed.form.as_deref()),
        form_norm: fill(current.form_norm.as_deref(), parsed.form_norm.as_deref()),
        active_ingredient_el: fill(
            current.active_ingredient_el.as_deref(),
            parsed.active_ingredient_el.as_deref(),
        ),
        active_ingredient_en: fill(
            current.active_ingredient_en.as_deref(),
            parsed.active_ingredient_en.as_deref(),
        ),
    }
}

/// Association upsert payload: status always present (explicit value or
/// default "active"); stock/price/notes only when the row carried them, so
/// re-imports never reset fields the caller omitted.
pub fn association_upsert(
    pharmacy_id: Uuid,
    product_id: Uuid,
    parsed: &ParsedItem,
) -> AssociationUpsert {
    AssociationUpsert {
        pharmacy_id,
        product_id,
        status: parsed.status.unwrap_or(AssociationStatus::Active),
        in_stock: parsed.in_stock,
        price: parsed.price,
        notes: parsed.notes.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::item::{parse_item, Category};
    use crate::store::memory::MemoryStore;
    use crate::store::{InventoryRow, NameQuery};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn parsed(raw: serde_json::Value) -> ParsedItem {
        parse_item(&raw, Category::Product).expect("test row should parse")
    }

    #[tokio::test]
    async fn creates_row_from_non_blank_fields() {
        let store = MemoryStore::new();
        let account = Uuid::new_v4();
        let item = parsed(json!({
            "category": "medication",
            "name_el": "Παρακεταμόλη 500mg",
            "form": "tablet",
            "strength": "500mg",
        }));

        let row = create_catalog_row(&store, &item, account).await.unwrap();
        assert!(row.created);
        assert_eq!(row.item.category, "medication");
        assert_eq!(row.item.name_el_norm.as_deref(), Some("παρακεταμόλη 500mg"));
        assert_eq!(row.item.created_by, Some(account));
        assert_eq!(row.item.brand, None);
    }

    /// Wrapper that sneaks a competing row in just before the first insert,
    /// simulating a concurrent import of the same barcode.
    struct RacingStore {
        inner: MemoryStore,
        raced: AtomicBool,
    }

    #[async_trait]
    impl CatalogStore for RacingStore {
        async fn catalog_by_barcode(
            &self,
            barcode: &str,
        ) -> Result<Vec<CatalogItem>, StoreError> {
            self.inner.catalog_by_barcode(barcode).await
        }

        async fn catalog_by_name(
            &self,
            query: &NameQuery<'_>,
        ) -> Result<Vec<CatalogItem>, StoreError> {
            self.inner.catalog_by_name(query).await
        }

        async fn insert_catalog(
            &self,
            item: &NewCatalogItem,
        ) -> Result<CatalogItem, StoreError> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                self.inner.seed_catalog(json!({
                    "category": "product",
                    "barcode": item.barcode,
                    "name_en": "winner",
                }));
            }
            self.inner.insert_catalog(item).await
        }

        async fn backfill_catalog(
            &self,
            id: Uuid,
            patch: &CatalogPatch,
        ) -> Result<(), StoreError> {
            self.inner.backfill_catalog(id, patch).await
        }

        async fn upsert_association(
            &self,
            upsert: &AssociationUpsert,
        ) -> Result<(), StoreError> {
            self.inner.upsert_association(upsert).await
        }

        async fn inventory_rows(
            &self,
            pharmacy_id: Uuid,
            created_by: Option<Uuid>,
        ) -> Result<Vec<InventoryRow>, StoreError> {
            self.inner.inventory_rows(pharmacy_id, created_by).await
        }
    }

    #[tokio::test]
    async fn barcode_race_adopts_the_winning_row() {
        let store = RacingStore {
            inner: MemoryStore::new(),
            raced: AtomicBool::new(false),
        };
        let item = parsed(json!({"category": "product", "barcode": "123"}));

        let row = create_catalog_row(&store, &item, Uuid::new_v4()).await.unwrap();
        assert!(!row.created, "race loser must adopt, not create");
        assert_eq!(row.item.name_en.as_deref(), Some("winner"));
        assert_eq!(store.inner.catalog_len(), 1, "no duplicate row");
    }

    #[tokio::test]
    async fn non_barcode_unique_violations_are_not_recovered() {
        let store = MemoryStore::new();
        store.fail_next_insert_with_unique_violation("catalog_items_pkey");
        let item = parsed(json!({"name_en": "no barcode here"}));

        let err = create_catalog_row(&store, &item, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn backfill_never_overwrites_populated_fields() {
        let store = MemoryStore::new();
        let id = store.seed_catalog(json!({
            "category": "product",
            "name_el": "Αντηλιακό",
            "brand": "Acme",
        }));
        let current = store.catalog_row(id);

        let item = parsed(json!({
            "name_el": "Αντηλιακό",
            "name_en": "Sunscreen",
            "brand": "Other",
        }));
        let patch = backfill_patch(&current, &item);
        assert_eq!(patch.brand, None, "populated brand must stay untouched");
        assert_eq!(patch.name_en.as_deref(), Some("Sunscreen"));
        assert_eq!(patch.name_el, None);

        store.backfill_catalog(id, &patch).await.unwrap();
        let after = store.catalog_row(id);
        assert_eq!(after.brand.as_deref(), Some("Acme"));
        assert_eq!(after.name_en.as_deref(), Some("Sunscreen"));
    }

    #[test]
    fn empty_patch_when_nothing_to_fill() {
        let store = MemoryStore::new();
        let id = store.seed_catalog(json!({
            "category": "product",
            "name_el": "Αντηλιακό",
            "brand": "Acme",
        }));
        let current = store.catalog_row(id);
        let item = parsed(json!({"name_el": "Αντηλιακό", "brand": "Other"}));
        assert!(backfill_patch(&current, &item).is_empty());
    }

    #[test]
    fn association_payload_respects_presence_flags() {
        let pharmacy = Uuid::new_v4();
        let product = Uuid::new_v4();

        let sparse = association_upsert(pharmacy, product, &parsed(json!({"barcode": "1"})));
        assert_eq!(sparse.status, AssociationStatus::Active);
        assert_eq!(sparse.in_stock, None);
        assert_eq!(sparse.price, None);
        assert_eq!(sparse.notes, None);

        let full = association_upsert(
            pharmacy,
            product,
            &parsed(json!({
                "barcode": "1",
                "association_status": "inactive",
                "in_stock": false,
                "price": 9.9,
                "notes": "behind the counter",
            })),
        );
        assert_eq!(full.status, AssociationStatus::Inactive);
        assert_eq!(full.in_stock, Some(false));
        assert_eq!(full.price, Some(9.9));
        assert_eq!(full.notes.as_deref(), Some("behind the counter"));
    }
}
