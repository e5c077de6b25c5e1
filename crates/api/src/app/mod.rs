//! Router assembly.

use std::sync::Arc;

use axum::extract::Extension;
use axum::routing::get;
use axum::{Json, Router};

use tableshop_infra::inventory_store::InventoryStore;
use tableshop_infra::sales_store::SalesStore;

pub mod dto;
pub mod errors;
pub mod routes;

/// Shared handler dependencies. Generic over the store implementations so
/// the same router serves Postgres in production and the in-memory stores in
/// black-box tests.
pub struct AppServices<S, I> {
    pub sales_store: Arc<S>,
    pub inventory_store: Arc<I>,
    pub currency_code: String,
}

impl<S, I> AppServices<S, I> {
    pub fn new(
        sales_store: Arc<S>,
        inventory_store: Arc<I>,
        currency_code: impl Into<String>,
    ) -> Self {
        Self {
            sales_store,
            inventory_store,
            currency_code: currency_code.into(),
        }
    }
}

/// Build the full application router.
pub fn build_router<S, I>(services: AppServices<S, I>) -> Router
where
    S: SalesStore,
    I: InventoryStore,
{
    Router::new()
        .merge(routes::sales::router::<S, I>())
        .merge(routes::inventory::router::<S, I>())
        .route("/healthz", get(health))
        .layer(Extension(Arc::new(services)))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
