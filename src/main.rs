//! docrepo demo
//!
//! Wires a configured document store to a typed repository and runs the
//! create, update, soft-delete and read-back lifecycle end to end.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, fmt};

use docrepo_core::config::AppConfig;
use docrepo_core::error::AppError;
use docrepo_core::traits::entity::{Entity, EntityMetadata};
use docrepo_repository::{
    CreateOptions, DeleteOptions, DocumentRepository, FindByIdOptions, FindOptions, PaginateOptions,
    UpdateOptions,
};
use docrepo_store::StoreManager;

/// Demo entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Product {
    #[serde(flatten)]
    meta: EntityMetadata,
    name: String,
    #[serde(default)]
    price_cents: i64,
}

impl Entity for Product {
    const COLLECTION: &'static str = "products";
    const REQUIRED_FIELDS: &'static [&'static str] = &["name"];

    fn metadata(&self) -> &EntityMetadata {
        &self.meta
    }
}

#[derive(Debug, Serialize)]
struct NewProduct<'a> {
    name: &'a str,
    price_cents: i64,
}

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!(kind = %e.kind, "Demo failed: {}", e.message);
        std::process::exit(1);
    }
}

/// Load configuration from `config/` and the environment.
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("DOCREPO_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing. `RUST_LOG` overrides the configured level.
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(config.logging.with_target)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(config.logging.with_target)
                .init();
        }
    }
}

async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting docrepo demo v{}", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(StoreManager::new(&config.store)?);
    let products: DocumentRepository<Product> =
        DocumentRepository::new(store, config.repository.clone())?;

    let created = products
        .create(
            &NewProduct {
                name: "X",
                price_cents: 1999,
            },
            CreateOptions::default(),
        )
        .await?;
    tracing::info!(id = %created.id(), version = created.version(), "Created product");

    let updated = products
        .update(created.id(), &serde_json::json!({ "name": "Y" }), UpdateOptions::default())
        .await?;
    tracing::info!(id = %updated.id(), version = updated.version(), name = %updated.name, "Updated product");

    let more: Vec<NewProduct<'_>> = (1..=3)
        .map(|i| NewProduct {
            name: "bulk",
            price_cents: i * 100,
        })
        .collect();
    let bulk = products.create_batch(&more).await?;
    tracing::info!(count = bulk.len(), "Created products in batch");

    products.delete(created.id(), DeleteOptions::default()).await?;

    let live = products.find_by_id(created.id(), FindByIdOptions::default()).await?;
    let archived = products
        .find_by_id(created.id(), FindByIdOptions::include_deleted())
        .await?
        .ok_or_else(|| AppError::internal("soft-deleted product is missing"))?;
    tracing::info!(
        live = live.is_some(),
        name = %archived.name,
        deleted_at = ?archived.metadata().deleted_at,
        "Read back soft-deleted product"
    );

    let page = products
        .paginate(PaginateOptions::new(FindOptions::new(), 1, 2))
        .await?;
    tracing::info!(
        total = page.total,
        total_pages = page.total_pages,
        has_next = page.has_next,
        "First page of live products"
    );

    let stats = serde_json::to_string(&products.stats())?;
    tracing::info!(%stats, "Repository stats");
    Ok(())
}
