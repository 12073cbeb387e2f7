//! Read-only export of one pharmacy's inventory (association + catalog
//! join) as CSV. The JSON shape is just the serialized rows; the CSV form
//! has a fixed column order with every value double-quoted and embedded
//! quotes doubled, so spreadsheet tools ingest it without sniffing.

use anyhow::{Context, Result};
use csv::{QuoteStyle, WriterBuilder};

use crate::store::InventoryRow;

/// Fixed export column order; changing this breaks downstream consumers.
pub const CSV_COLUMNS: [&str; 14] = [
    "pharmacy_id",
    "product_id",
    "category",
    "name_el",
    "name_en",
    "barcode",
    "brand",
    "form",
    "strength",
    "association_status",
    "in_stock",
    "price",
    "notes",
    "updated_at",
];

fn price_cell(price: Option<f64>) -> String {
    match price {
        Some(p) => format!("{p:.2}"),
        None => String::new(),
    }
}

pub fn render_csv(rows: &[InventoryRow]) -> Result<String> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());
    writer
        .write_record(CSV_COLUMNS)
        .context("writing CSV header")?;

    for row in rows {
        writer
            .write_record([
                row.pharmacy_id.to_string(),
                row.product_id.to_string(),
                row.category.clone(),
                row.name_el.clone().unwrap_or_default(),
                row.name_en.clone().unwrap_or_default(),
                row.barcode.clone().unwrap_or_default(),
                row.brand.clone().unwrap_or_default(),
                row.form.clone().unwrap_or_default(),
                row.strength.clone().unwrap_or_default(),
                row.association_status.clone(),
                row.in_stock.to_string(),
                price_cell(row.price),
                row.notes.clone().unwrap_or_default(),
                row.updated_at.to_rfc3339(),
            ])
            .context("writing CSV row")?;
    }

    let bytes = writer.into_inner().context("flushing CSV writer")?;
    String::from_utf8(bytes).context("CSV output was not UTF-8")
}
