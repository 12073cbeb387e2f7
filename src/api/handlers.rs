// HTTP request handlers for API endpoints

use actix_web::{web, HttpRequest, HttpResponse, Result};
use std::time::SystemTime;
use tracing::error;

use crate::api::auth;
use crate::api::models::*;
use crate::import::batch::{self, ImportRequestError, MAX_BATCH_ITEMS};
use crate::import::item::Category;
use crate::store::postgres::PgStore;
use crate::store::AccessStore;
use crate::{export, store::CatalogStore};

/// Health check endpoint
pub async fn health_check(store: web::Data<PgStore>) -> Result<HttpResponse> {
    // Quick database connectivity check
    let db_status = match sqlx::query_scalar::<_, bool>("SELECT true")
        .persistent(false)
        .fetch_one(store.pool())
        .await
    {
        Ok(_) => "connected",
        Err(_) => "disconnected",
    };

    let uptime = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    Ok(HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        database: db_status.to_string(),
        uptime_seconds: uptime,
    }))
}

pub async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().json(ErrorBody::new("method not allowed"))
}

fn unauthorized() -> HttpResponse {
    HttpResponse::Unauthorized().json(ErrorBody::new("missing or invalid X-Account-Id"))
}

fn bad_request(message: impl Into<String>) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorBody::new(message))
}

/// Import a batch of inventory rows for one pharmacy. Always 200 with a
/// per-item report when the batch itself was acceptable; callers inspect
/// `counts` to tell full success from partial success from nothing-saved.
pub async fn import_inventory(
    req: HttpRequest,
    payload: web::Json<ImportRequest>,
    store: web::Data<PgStore>,
) -> Result<HttpResponse> {
    let Some(account) = auth::account_id(&req) else {
        return Ok(unauthorized());
    };
    let Some(pharmacy_id) = payload.pharmacy_id else {
        return Ok(bad_request("pharmacy_id is required"));
    };
    let Some(items) = payload.items.as_deref() else {
        return Ok(bad_request("items is required"));
    };
    let default_category = match payload.default_category.as_deref() {
        None => Category::Product,
        Some(raw) => match Category::parse(raw) {
            Some(c) => c,
            None => return Ok(bad_request(format!("unknown default_category {raw:?}"))),
        },
    };

    let engine: &PgStore = store.get_ref();
    let report = batch::run_import(
        engine,
        engine,
        account,
        pharmacy_id,
        default_category,
        items,
    )
    .await;

    match report {
        Ok(report) => Ok(HttpResponse::Ok().json(ImportResponse::new(
            pharmacy_id,
            items.len(),
            report,
        ))),
        Err(ImportRequestError::EmptyBatch) => Ok(bad_request("items must be a non-empty array")),
        Err(ImportRequestError::BatchTooLarge { len, .. }) => Ok(bad_request(format!(
            "batch of {len} items exceeds the limit of {MAX_BATCH_ITEMS}"
        ))),
        Err(ImportRequestError::Forbidden) => Ok(HttpResponse::Forbidden()
            .json(ErrorBody::new("not allowed to manage this pharmacy's inventory"))),
        Err(ImportRequestError::Store(e)) => {
            error!(error = %e, %pharmacy_id, "import aborted by store failure");
            Ok(HttpResponse::InternalServerError().json(ErrorBody::new("store unavailable")))
        }
    }
}

/// Export one pharmacy's inventory as JSON or CSV.
pub async fn export_inventory(
    req: HttpRequest,
    query: web::Query<ExportQuery>,
    store: web::Data<PgStore>,
) -> Result<HttpResponse> {
    let Some(account) = auth::account_id(&req) else {
        return Ok(unauthorized());
    };
    let Some(pharmacy_id) = query.pharmacy_id else {
        return Ok(bad_request("pharmacy_id is required"));
    };
    let format = query.format.as_deref().unwrap_or("json");
    if format != "json" && format != "csv" {
        return Ok(bad_request(format!("unknown format {format:?}")));
    }

    match store.can_manage_pharmacy(account, pharmacy_id).await {
        Ok(true) => {}
        Ok(false) => {
            return Ok(HttpResponse::Forbidden()
                .json(ErrorBody::new("not allowed to view this pharmacy's inventory")))
        }
        Err(e) => {
            error!(error = %e, %pharmacy_id, "authorization check failed");
            return Ok(
                HttpResponse::InternalServerError().json(ErrorBody::new("store unavailable"))
            );
        }
    }

    let created_by = query.my_only.then_some(account);
    let rows = match store.inventory_rows(pharmacy_id, created_by).await {
        Ok(rows) => rows,
        Err(e) => {
            error!(error = %e, %pharmacy_id, "inventory export query failed");
            return Ok(
                HttpResponse::InternalServerError().json(ErrorBody::new("store unavailable"))
            );
        }
    };

    if format == "csv" {
        let body = match export::render_csv(&rows) {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "CSV rendering failed");
                return Ok(HttpResponse::InternalServerError()
                    .json(ErrorBody::new("export rendering failed")));
            }
        };
        return Ok(HttpResponse::Ok()
            .content_type("text/csv; charset=utf-8")
            .body(body));
    }

    Ok(HttpResponse::Ok().json(ExportResponse {
        pharmacy_id,
        my_only: query.my_only,
        count: rows.len(),
        items: rows,
    }))
}
