//! Catalog matching: resolve a `ParsedItem` to an existing canonical row,
//! to "no match" (new-row eligible), or to an ambiguous candidate set.
//!
//! Two tiers, first hit wins:
//! 1. exact barcode — a barcode hit is always usable; extra rows with the
//!    same barcode are a data anomaly surfaced to operators, not a reason to
//!    skip the item;
//! 2. normalized name per language, scoped to the category and narrowed by
//!    normalized form/strength when the incoming row carries them. Two or
//!    more distinct candidates here are a hard stop for the item: the
//!    importer never guesses between products that merely share a name.

use std::collections::HashSet;

use uuid::Uuid;

use crate::import::item::ParsedItem;
use crate::store::{CatalogItem, CatalogStore, NameLang, NameQuery, StoreError};

#[derive(Debug)]
pub enum MatchOutcome {
    /// Exactly one usable row. `extra_barcode_ids` lists additional rows
    /// sharing the same barcode (duplicate-barcode data issue); the matched
    /// row is the oldest one.
    Matched {
        item: CatalogItem,
        extra_barcode_ids: Vec<Uuid>,
    },
    /// Nothing matched; the item is eligible to create a new catalog row.
    NoMatch,
    /// Two or more name-tier candidates with no safe way to pick one.
    Ambiguous { candidate_ids: Vec<Uuid> },
}

pub async fn resolve(
    store: &dyn CatalogStore,
    item: &ParsedItem,
) -> Result<MatchOutcome, StoreError> {
    // Tier 1: exact barcode.
    if let Some(barcode) = item.barcode.as_deref() {
        let mut rows = store.catalog_by_barcode(barcode).await?.into_iter();
        if let Some(first) = rows.next() {
            return Ok(MatchOutcome::Matched {
                item: first,
                extra_barcode_ids: rows.map(|r| r.id).collect(),
            });
        }
    }

    // Tier 2: normalized name per language, de-duplicated by id.
    let mut seen: HashSet<Uuid> = HashSet::new();
    let mut candidates: Vec<CatalogItem> = Vec::new();
    let name_lookups = [
        (NameLang::El, item.name_el_norm.as_deref()),
        (NameLang::En, item.name_en_norm.as_deref()),
    ];
    for (lang, name_norm) in name_lookups {
        let Some(name_norm) = name_norm else { continue };
        let query = NameQuery {
            category: item.category,
            lang,
            name_norm,
            form_norm: item.form_norm.as_deref(),
            strength_norm: item.strength_norm.as_deref(),
        };
        for row in store.catalog_by_name(&query).await? {
            if seen.insert(row.id) {
                candidates.push(row);
            }
        }
    }

    match candidates.len() {
        0 => Ok(MatchOutcome::NoMatch),
        1 => Ok(MatchOutcome::Matched {
            item: candidates.remove(0),
            extra_barcode_ids: Vec::new(),
        }),
        _ => Ok(MatchOutcome::Ambiguous {
            candidate_ids: candidates.into_iter().map(|r| r.id).collect(),
        }),
    }
}
