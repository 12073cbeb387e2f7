//! Postgres implementation of the store traits.
//!
//! All queries run with `.persistent(false)` so the service stays safe
//! behind transaction-mode PgBouncer (the managed Postgres setups this ships
//! against pool that way by default).

use async_trait::async_trait;
use sqlx::QueryBuilder;
use tracing::instrument;
use uuid::Uuid;

use crate::db::Db;
use crate::store::{
    AccessStore, AssociationUpsert, CatalogItem, CatalogPatch, CatalogStore, InventoryRow,
    NameLang, NameQuery, NewCatalogItem, StoreError,
};

const CATALOG_COLUMNS: &str = "id, category, name_el, name_en, name_el_norm, name_en_norm, \
     desc_el, desc_en, barcode, brand, strength, strength_norm, form, form_norm, \
     active_ingredient_el, active_ingredient_en, created_by, created_at, updated_at";

pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.db.pool
    }
}

/// Translate sqlx errors, pulling unique-constraint violations out into
/// their own variant so the catalog writer can recover from the barcode
/// race without masking unrelated failures.
fn map_sqlx(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation() {
            return StoreError::UniqueViolation {
                constraint: db_err.constraint().map(str::to_string),
            };
        }
    }
    StoreError::Backend(e)
}

#[async_trait]
impl AccessStore for PgStore {
    #[instrument(skip(self))]
    async fn can_manage_pharmacy(
        &self,
        account_id: Uuid,
        pharmacy_id: Uuid,
    ) -> Result<bool, StoreError> {
        sqlx::query_scalar(
            "SELECT EXISTS(
                 SELECT 1 FROM pharmacy_members
                 WHERE pharmacy_id = $1 AND account_id = $2
                   AND role IN ('owner', 'manager')
             )",
        )
        .persistent(false)
        .bind(pharmacy_id)
        .bind(account_id)
        .fetch_one(&self.db.pool)
        .await
        .map_err(map_sqlx)
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn catalog_by_barcode(&self, barcode: &str) -> Result<Vec<CatalogItem>, StoreError> {
        let sql = format!(
            "SELECT {CATALOG_COLUMNS} FROM catalog_items WHERE barcode = $1 ORDER BY created_at, id"
        );
        sqlx::query_as::<_, CatalogItem>(&sql)
            .persistent(false)
            .bind(barcode)
            .fetch_all(&self.db.pool)
            .await
            .map_err(map_sqlx)
    }

    async fn catalog_by_name(&self, query: &NameQuery<'_>) -> Result<Vec<CatalogItem>, StoreError> {
        let name_column = match query.lang {
            NameLang::El => "name_el_norm",
            NameLang::En => "name_en_norm",
        };
        let mut qb: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(format!(
            "SELECT {CATALOG_COLUMNS} FROM catalog_items WHERE category = "
        ));
        qb.push_bind(query.category.as_str());
        qb.push(format!(" AND {name_column} = "));
        qb.push_bind(query.name_norm);
        if let Some(form) = query.form_norm {
            qb.push(" AND form_norm = ");
            qb.push_bind(form);
        }
        if let Some(strength) = query.strength_norm {
            qb.push(" AND strength_norm = ");
            qb.push_bind(strength);
        }
        qb.push(" ORDER BY created_at, id");
        qb.build_query_as::<CatalogItem>()
            .persistent(false)
            .fetch_all(&self.db.pool)
            .await
            .map_err(map_sqlx)
    }

    #[instrument(skip(self, item))]
    async fn insert_catalog(&self, item: &NewCatalogItem) -> Result<CatalogItem, StoreError> {
        let sql = format!(
            "INSERT INTO catalog_items (
                 id, category, name_el, name_en, name_el_norm, name_en_norm,
                 desc_el, desc_en, barcode, brand, strength, strength_norm,
                 form, form_norm, active_ingredient_el, active_ingredient_en,
                 created_by, created_at, updated_at
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                       $13, $14, $15, $16, $17, now(), now())
             RETURNING {CATALOG_COLUMNS}"
        );
        sqlx::query_as::<_, CatalogItem>(&sql)
            .persistent(false)
            .bind(Uuid::new_v4())
            .bind(item.category.as_str())
            .bind(item.name_el.as_deref())
            .bind(item.name_en.as_deref())
            .bind(item.name_el_norm.as_deref())
            .bind(item.name_en_norm.as_deref())
            .bind(item.desc_el.as_deref())
            .bind(item.desc_en.as_deref())
            .bind(item.barcode.as_deref())
            .bind(item.brand.as_deref())
            .bind(item.strength.as_deref())
            .bind(item.strength_norm.as_deref())
            .bind(item.form.as_deref())
            .bind(item.form_norm.as_deref())
            .bind(item.active_ingredient_el.as_deref())
            .bind(item.active_ingredient_en.as_deref())
            .bind(item.created_by)
            .fetch_one(&self.db.pool)
            .await
            .map_err(map_sqlx)
    }

    #[instrument(skip(self, patch))]
    async fn backfill_catalog(&self, id: Uuid, patch: &CatalogPatch) -> Result<(), StoreError> {
        // Guard every assignment server-side as well: even if another import
        // populated the field since we read the row, it stays untouched.
        let mut sets: Vec<String> = Vec::new();
        let mut params: Vec<&str> = Vec::new();
        let mut next_param = 2;

        macro_rules! fill_missing {
            ($column:literal, $value:expr) => {
                if let Some(v) = $value.as_deref() {
                    sets.push(format!(
                        concat!(
                            $column,
                            " = CASE WHEN ",
                            $column,
                            " IS NULL OR btrim(",
                            $column,
                            ") = '' THEN ${} ELSE ",
                            $column,
                            " END"
                        ),
                        next_param
                    ));
                    params.push(v);
                    next_param += 1;
                }
            };
        }

        fill_missing!("name_el", patch.name_el);
        fill_missing!("name_en", patch.name_en);
        fill_missing!("name_el_norm", patch.name_el_norm);
        fill_missing!("name_en_norm", patch.name_en_norm);
        fill_missing!("desc_el", patch.desc_el);
        fill_missing!("desc_en", patch.desc_en);
        fill_missing!("barcode", patch.barcode);
        fill_missing!("brand", patch.brand);
        fill_missing!("strength", patch.strength);
        fill_missing!("strength_norm", patch.strength_norm);
        fill_missing!("form", patch.form);
        fill_missing!("form_norm", patch.form_norm);
        fill_missing!("active_ingredient_el", patch.active_ingredient_el);
        fill_missing!("active_ingredient_en", patch.active_ingredient_en);
        let _ = next_param;

        if sets.is_empty() {
            return Ok(());
        }
        sets.push("updated_at = now()".to_string());

        let sql = format!("UPDATE catalog_items SET {} WHERE id = $1", sets.join(", "));
        let mut q = sqlx::query(&sql).persistent(false).bind(id);
        for p in params {
            q = q.bind(p);
        }
        q.execute(&self.db.pool).await.map_err(map_sqlx)?;
        Ok(())
    }

    #[instrument(skip(self, upsert), fields(pharmacy_id = %upsert.pharmacy_id))]
    async fn upsert_association(&self, upsert: &AssociationUpsert) -> Result<(), StoreError> {
        // Columns beyond the key and status are included only when the
        // import row explicitly carried them, so the conflict branch never
        // resets a field the caller omitted.
        let mut columns = vec!["pharmacy_id", "product_id", "association_status"];
        let mut updates = vec!["association_status = EXCLUDED.association_status".to_string()];
        if upsert.in_stock.is_some() {
            columns.push("in_stock");
            updates.push("in_stock = EXCLUDED.in_stock".to_string());
        }
        if upsert.price.is_some() {
            columns.push("price");
            updates.push("price = EXCLUDED.price".to_string());
        }
        if upsert.notes.is_some() {
            columns.push("notes");
            updates.push("notes = EXCLUDED.notes".to_string());
        }
        updates.push("updated_at = now()".to_string());

        let mut placeholders: Vec<String> =
            (1..=columns.len()).map(|i| format!("${i}")).collect();
        columns.push("created_at");
        placeholders.push("now()".to_string());
        columns.push("updated_at");
        placeholders.push("now()".to_string());

        let sql = format!(
            "INSERT INTO pharmacy_inventory ({}) VALUES ({})
             ON CONFLICT (pharmacy_id, product_id) DO UPDATE SET {}",
            columns.join(", "),
            placeholders.join(", "),
            updates.join(", ")
        );

        let mut q = sqlx::query(&sql)
            .persistent(false)
            .bind(upsert.pharmacy_id)
            .bind(upsert.product_id)
            .bind(upsert.status.as_str());
        if let Some(in_stock) = upsert.in_stock {
            q = q.bind(in_stock);
        }
        if let Some(price) = upsert.price {
            q = q.bind(price);
        }
        if let Some(notes) = upsert.notes.as_deref() {
            // Explicitly cleared notes are stored as NULL, not "".
            let stored: Option<&str> = if notes.is_empty() { None } else { Some(notes) };
            q = q.bind(stored);
        }
        q.execute(&self.db.pool).await.map_err(map_sqlx)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn inventory_rows(
        &self,
        pharmacy_id: Uuid,
        created_by: Option<Uuid>,
    ) -> Result<Vec<InventoryRow>, StoreError> {
        let mut qb: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(
            "SELECT i.pharmacy_id, c.id AS product_id, c.category, c.name_el, c.name_en,
                    c.barcode, c.brand, c.form, c.strength,
                    i.association_status, i.in_stock, i.price, i.notes, i.updated_at
             FROM pharmacy_inventory i
             JOIN catalog_items c ON c.id = i.product_id
             WHERE i.pharmacy_id = ",
        );
        qb.push_bind(pharmacy_id);
        if let Some(account) = created_by {
            qb.push(" AND c.created_by = ");
            qb.push_bind(account);
        }
        qb.push(" ORDER BY lower(coalesce(c.name_el, c.name_en, '')), c.id");
        qb.build_query_as::<InventoryRow>()
            .persistent(false)
            .fetch_all(&self.db.pool)
            .await
            .map_err(map_sqlx)
    }
}
