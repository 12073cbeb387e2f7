use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use apothiki::api::ApiServer;
use apothiki::db::Db;
use apothiki::export;
use apothiki::import::batch;
use apothiki::import::item::Category;
use apothiki::store::postgres::PgStore;
use apothiki::store::CatalogStore;
use apothiki::util::env as env_util;

#[derive(Parser)]
#[command(
    name = "apothiki",
    about = "Pharmacy inventory import and catalog reconciliation service"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API server
    Serve,
    /// Import a batch of inventory rows from a JSON file (array of objects)
    Import {
        #[arg(long)]
        pharmacy_id: Uuid,
        /// Acting account; must be a manager of the pharmacy
        #[arg(long)]
        account_id: Uuid,
        #[arg(long)]
        file: PathBuf,
        /// Category applied to rows that omit one
        #[arg(long, default_value = "product")]
        category: String,
    },
    /// Dump one pharmacy's inventory to stdout
    Export {
        #[arg(long)]
        pharmacy_id: Uuid,
        /// csv (default) or json
        #[arg(long, default_value = "csv")]
        format: String,
        /// Restrict to catalog entries created by this account
        #[arg(long)]
        created_by: Option<Uuid>,
    },
}

async fn connect_db() -> Result<Db> {
    let database_url = env_util::db_url()?;
    let max_conns: u32 = env_util::env_parse("DB_MAX_CONNS", 10);
    Db::connect(&database_url, max_conns)
        .await
        .context("database connect failed")
}

#[actix_web::main]
async fn main() -> Result<()> {
    env_util::init_env();
    apothiki::logging::init_tracing("info,sqlx=warn")?;

    let cli = Cli::parse();
    match cli.command {
        Command::Serve => {
            let server = ApiServer::from_env()?;
            let db = connect_db().await?;
            server.run(db).await
        }
        Command::Import {
            pharmacy_id,
            account_id,
            file,
            category,
        } => {
            let Some(default_category) = Category::parse(&category) else {
                bail!("unknown category {category:?}");
            };
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let items: Vec<Value> = serde_json::from_str(&raw)
                .context("file must contain a JSON array of item objects")?;

            let db = connect_db().await?;
            let store = PgStore::new(db);
            info!(%pharmacy_id, items = items.len(), "importing from file");
            let report = batch::run_import(
                &store,
                &store,
                account_id,
                pharmacy_id,
                default_category,
                &items,
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Export {
            pharmacy_id,
            format,
            created_by,
        } => {
            let db = connect_db().await?;
            let store = PgStore::new(db);
            let rows = store.inventory_rows(pharmacy_id, created_by).await?;
            match format.as_str() {
                "csv" => print!("{}", export::render_csv(&rows)?),
                "json" => println!("{}", serde_json::to_string_pretty(&rows)?),
                other => bail!("unknown format {other:?}"),
            }
            Ok(())
        }
    }
}
