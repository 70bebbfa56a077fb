use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::AuthUser;
use crate::entities::cart_item;
use crate::errors::ServiceError;
use crate::services::carts::CartEntry;
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CartPayload {
    pub items: Vec<CartEntry>,
}

pub async fn get_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Vec<cart_item::Model>>>, ServiceError> {
    let items = state.services.carts.get(user.id).await?;
    Ok(ApiResponse::ok(items))
}

pub async fn upsert_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(entry): Json<CartEntry>,
) -> Result<Json<ApiResponse<Vec<cart_item::Model>>>, ServiceError> {
    let items = state.services.carts.upsert(user.id, entry).await?;
    Ok(ApiResponse::ok(items))
}

pub async fn set_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CartPayload>,
) -> Result<Json<ApiResponse<Vec<cart_item::Model>>>, ServiceError> {
    let items = state.services.carts.set_all(user.id, payload.items).await?;
    Ok(ApiResponse::ok(items))
}

/// Folds a guest cart into the logged-in principal's cart.
pub async fn merge_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CartPayload>,
) -> Result<Json<ApiResponse<Vec<cart_item::Model>>>, ServiceError> {
    let items = state.services.carts.merge(user.id, payload.items).await?;
    Ok(ApiResponse::ok(items))
}

pub async fn clear_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<StatusCode, ServiceError> {
    state.services.carts.clear(user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
