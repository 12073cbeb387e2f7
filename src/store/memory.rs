//! In-memory implementation of the store traits for engine tests. Mirrors
//! the Postgres semantics that matter to the engine: unique barcodes,
//! fill-missing-only backfill and composite-key association upserts.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::import::item::normalize;
use crate::store::{
    is_blank, AccessStore, AssociationUpsert, CatalogItem, CatalogPatch, CatalogStore,
    InventoryRow, NameLang, NameQuery, NewCatalogItem, StoreError,
};

#[derive(Debug, Clone)]
struct AssocRecord {
    status: String,
    in_stock: bool,
    price: Option<f64>,
    notes: Option<String>,
    updated_at: chrono::DateTime<Utc>,
}

#[derive(Default)]
struct State {
    catalog: Vec<CatalogItem>,
    associations: HashMap<(Uuid, Uuid), AssocRecord>,
    managers: HashSet<(Uuid, Uuid)>,
    fail_next_insert: Option<String>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant_manager(&self, account_id: Uuid, pharmacy_id: Uuid) {
        self.lock().managers.insert((account_id, pharmacy_id));
    }

    /// Seed one catalog row from a JSON object of raw field values; `_norm`
    /// shadows are derived the same way the importer derives them. Panics on
    /// a duplicate barcode (use `seed_catalog_unchecked` to model dirty
    /// data).
    pub fn seed_catalog(&self, fields: Value) -> Uuid {
        let row = Self::row_from_json(&fields);
        let mut state = self.lock();
        if let Some(bc) = row.barcode.as_deref() {
            assert!(
                !state.catalog.iter().any(|r| r.barcode.as_deref() == Some(bc)),
                "seed_catalog: duplicate barcode {bc}"
            );
        }
        let id = row.id;
        state.catalog.push(row);
        id
    }

    /// Seed without the unique-barcode assertion, for duplicate-barcode
    /// anomaly scenarios.
    pub fn seed_catalog_unchecked(&self, fields: Value) -> Uuid {
        let row = Self::row_from_json(&fields);
        let id = row.id;
        self.lock().catalog.push(row);
        id
    }

    /// Make the next `insert_catalog` fail with a unique violation on the
    /// given constraint name.
    pub fn fail_next_insert_with_unique_violation(&self, constraint: &str) {
        self.lock().fail_next_insert = Some(constraint.to_string());
    }

    pub fn catalog_len(&self) -> usize {
        self.lock().catalog.len()
    }

    pub fn catalog_row(&self, id: Uuid) -> CatalogItem {
        self.lock()
            .catalog
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .expect("catalog row should exist")
    }

    pub fn association_count(&self, pharmacy_id: Uuid) -> usize {
        self.lock()
            .associations
            .keys()
            .filter(|(p, _)| *p == pharmacy_id)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("memory store lock poisoned")
    }

    fn row_from_json(fields: &Value) -> CatalogItem {
        let text = |key: &str| {
            fields
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let name_el = text("name_el");
        let name_en = text("name_en");
        let strength = text("strength");
        let form = text("form");
        let now = Utc::now();
        CatalogItem {
            id: Uuid::new_v4(),
            category: fields
                .get("category")
                .and_then(Value::as_str)
                .unwrap_or("product")
                .to_string(),
            name_el_norm: name_el.as_deref().map(normalize),
            name_en_norm: name_en.as_deref().map(normalize),
            name_el,
            name_en,
            desc_el: text("desc_el"),
            desc_en: text("desc_en"),
            barcode: text("barcode"),
            brand: text("brand"),
            strength_norm: strength.as_deref().map(normalize),
            strength,
            form_norm: form.as_deref().map(normalize),
            form,
            active_ingredient_el: text("active_ingredient_el"),
            active_ingredient_en: text("active_ingredient_en"),
            created_by: fields
                .get("created_by")
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok()),
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
impl AccessStore for MemoryStore {
    async fn can_manage_pharmacy(
        &self,
        account_id: Uuid,
        pharmacy_id: Uuid,
    ) -> Result<bool, StoreError> {
        Ok(self.lock().managers.contains(&(account_id, pharmacy_id)))
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn catalog_by_barcode(&self, barcode: &str) -> Result<Vec<CatalogItem>, StoreError> {
        // Insertion order doubles as created_at order.
        Ok(self
            .lock()
            .catalog
            .iter()
            .filter(|r| r.barcode.as_deref() == Some(barcode))
            .cloned()
            .collect())
    }

    async fn catalog_by_name(&self, query: &NameQuery<'_>) -> Result<Vec<CatalogItem>, StoreError> {
        Ok(self
            .lock()
            .catalog
            .iter()
            .filter(|r| r.category == query.category.as_str())
            .filter(|r| {
                let stored = match query.lang {
                    NameLang::El => r.name_el_norm.as_deref(),
                    NameLang::En => r.name_en_norm.as_deref(),
                };
                stored == Some(query.name_norm)
            })
            .filter(|r| match query.form_norm {
                Some(f) => r.form_norm.as_deref() == Some(f),
                None => true,
            })
            .filter(|r| match query.strength_norm {
                Some(s) => r.strength_norm.as_deref() == Some(s),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn insert_catalog(&self, item: &NewCatalogItem) -> Result<CatalogItem, StoreError> {
        let mut state = self.lock();
        if let Some(constraint) = state.fail_next_insert.take() {
            return Err(StoreError::UniqueViolation {
                constraint: Some(constraint),
            });
        }
        if let Some(bc) = item.barcode.as_deref() {
            if state.catalog.iter().any(|r| r.barcode.as_deref() == Some(bc)) {
                return Err(StoreError::UniqueViolation {
                    constraint: Some("catalog_items_barcode_key".to_string()),
                });
            }
        }
        let now = Utc::now();
        let row = CatalogItem {
            id: Uuid::new_v4(),
            category: item.category.as_str().to_string(),
            name_el: item.name_el.clone(),
            name_en: item.name_en.clone(),
            name_el_norm: item.name_el_norm.clone(),
            name_en_norm: item.name_en_norm.clone(),
            desc_el: item.desc_el.clone(),
            desc_en: item.desc_en.clone(),
            barcode: item.barcode.clone(),
            brand: item.brand.clone(),
            strength: item.strength.clone(),
            strength_norm: item.strength_norm.clone(),
            form: item.form.clone(),
            form_norm: item.form_norm.clone(),
            active_ingredient_el: item.active_ingredient_el.clone(),
            active_ingredient_en: item.active_ingredient_en.clone(),
            created_by: Some(item.created_by),
            created_at: now,
            updated_at: now,
        };
        state.catalog.push(row.clone());
        Ok(row)
    }

    async fn backfill_catalog(&self, id: Uuid, patch: &CatalogPatch) -> Result<(), StoreError> {
        let mut state = self.lock();
        let row = state
            .catalog
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::Unavailable(format!("no catalog row {id}")))?;

        fn apply(target: &mut Option<String>, incoming: &Option<String>) {
            if let Some(v) = incoming {
                if is_blank(target.as_deref()) {
                    *target = Some(v.clone());
                }
            }
        }
        apply(&mut row.name_el, &patch.name_el);
        apply(&mut row.name_en, &patch.name_en);
        apply(&mut row.name_el_norm, &patch.name_el_norm);
        apply(&mut row.name_en_norm, &patch.name_en_norm);
        apply(&mut row.desc_el, &patch.desc_el);
        apply(&mut row.desc_en, &patch.desc_en);
        apply(&mut row.barcode, &patch.barcode);
        apply(&mut row.brand, &patch.brand);
        apply(&mut row.strength, &patch.strength);
        apply(&mut row.strength_norm, &patch.strength_norm);
        apply(&mut row.form, &patch.form);
        apply(&mut row.form_norm, &patch.form_norm);
        apply(&mut row.active_ingredient_el, &patch.active_ingredient_el);
        apply(&mut row.active_ingredient_en, &patch.active_ingredient_en);
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn upsert_association(&self, upsert: &AssociationUpsert) -> Result<(), StoreError> {
        let mut state = self.lock();
        let record = state
            .associations
            .entry((upsert.pharmacy_id, upsert.product_id))
            .or_insert_with(|| AssocRecord {
                status: "active".to_string(),
                in_stock: true,
                price: None,
                notes: None,
                updated_at: Utc::now(),
            });
        record.status = upsert.status.as_str().to_string();
        if let Some(in_stock) = upsert.in_stock {
            record.in_stock = in_stock;
        }
        if let Some(price) = upsert.price {
            record.price = Some(price);
        }
        if let Some(notes) = &upsert.notes {
            record.notes = if notes.is_empty() {
                None
            } else {
                Some(notes.clone())
            };
        }
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn inventory_rows(
        &self,
        pharmacy_id: Uuid,
        created_by: Option<Uuid>,
    ) -> Result<Vec<InventoryRow>, StoreError> {
        let state = self.lock();
        let mut rows: Vec<InventoryRow> = state
            .associations
            .iter()
            .filter(|((p, _), _)| *p == pharmacy_id)
            .filter_map(|((_, product_id), assoc)| {
                let item = state.catalog.iter().find(|r| r.id == *product_id)?;
                if let Some(account) = created_by {
                    if item.created_by != Some(account) {
                        return None;
                    }
                }
                Some(InventoryRow {
                    pharmacy_id,
                    product_id: *product_id,
                    category: item.category.clone(),
                    name_el: item.name_el.clone(),
                    name_en: item.name_en.clone(),
                    barcode: item.barcode.clone(),
                    brand: item.brand.clone(),
                    form: item.form.clone(),
                    strength: item.strength.clone(),
                    association_status: assoc.status.clone(),
                    in_stock: assoc.in_stock,
                    price: assoc.price,
                    notes: assoc.notes.clone(),
                    updated_at: assoc.updated_at,
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            let key = |r: &InventoryRow| {
                r.name_el
                    .clone()
                    .or_else(|| r.name_en.clone())
                    .unwrap_or_default()
                    .to_lowercase()
            };
            key(a).cmp(&key(b)).then(a.product_id.cmp(&b.product_id))
        });
        Ok(rows)
    }
}
