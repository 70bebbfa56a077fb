pub mod admin;
pub mod carts;
pub mod orders;
pub mod proformas;
pub mod suppliers;

use axum::Json;
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
