//! Inventory import / catalog reconciliation engine.
//!
//! Pipeline per raw row: parse/validate ([`item`]) -> match against the
//! canonical catalog ([`matcher`]) -> create or backfill the catalog row and
//! upsert the pharmacy association ([`writer`]), driven sequentially with
//! per-item result aggregation by [`batch`].

pub mod batch;
pub mod item;
pub mod matcher;
pub mod writer;
