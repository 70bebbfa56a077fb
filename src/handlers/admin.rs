use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::{activity, order, proforma, supplier};
use crate::errors::ServiceError;
use crate::services::orders::StatusActor;
use crate::services::proformas::ForceActionInput;
use crate::services::suppliers::CreateSupplierInput;
use crate::{ApiResponse, AppState};

use super::orders::UpdateStatusPayload;

const DEFAULT_ACTIVITY_LIMIT: u64 = 50;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignSupplierPayload {
    /// `null` clears the assignment.
    pub supplier_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<u64>,
}

pub async fn list_proformas(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Vec<proforma::Model>>>, ServiceError> {
    user.require_admin()?;
    let rows = state.services.proformas.list_all().await?;
    Ok(ApiResponse::ok(rows))
}

/// Admin override of the customer-side approval decision.
pub async fn force_action(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(input): Json<ForceActionInput>,
) -> Result<Json<ApiResponse<proforma::Model>>, ServiceError> {
    let updated = state.services.proformas.force_action(&user, id, input).await?;
    Ok(ApiResponse::ok(updated))
}

/// Sweeps pending proformas past their validity date into `expired`.
pub async fn expire_overdue(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Value>>, ServiceError> {
    let expired = state.services.proformas.expire_overdue(&user).await?;
    Ok(ApiResponse::ok(json!({ "expired": expired })))
}

pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Vec<order::Model>>>, ServiceError> {
    user.require_admin()?;
    let rows = state.services.orders.list_all().await?;
    Ok(ApiResponse::ok(rows))
}

pub async fn update_order_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusPayload>,
) -> Result<Json<ApiResponse<order::Model>>, ServiceError> {
    user.require_admin()?;
    let updated = state
        .services
        .orders
        .update_status(id, payload.status, StatusActor::Admin(&user))
        .await?;
    Ok(ApiResponse::ok(updated))
}

pub async fn assign_supplier(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignSupplierPayload>,
) -> Result<Json<ApiResponse<order::Model>>, ServiceError> {
    user.require_admin()?;
    let updated = state
        .services
        .orders
        .assign_supplier(id, payload.supplier_id, &user)
        .await?;
    Ok(ApiResponse::ok(updated))
}

pub async fn create_supplier(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<CreateSupplierInput>,
) -> Result<(StatusCode, Json<ApiResponse<supplier::Model>>), ServiceError> {
    user.require_admin()?;
    let created = state.services.suppliers.create(input).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(created)))
}

pub async fn list_suppliers(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Vec<supplier::Model>>>, ServiceError> {
    user.require_admin()?;
    let rows = state.services.suppliers.list().await?;
    Ok(ApiResponse::ok(rows))
}

pub async fn get_supplier(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<supplier::Model>>, ServiceError> {
    user.require_admin()?;
    let row = state.services.suppliers.get(id).await?;
    Ok(ApiResponse::ok(row))
}

pub async fn list_activity(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<ApiResponse<Vec<activity::Model>>>, ServiceError> {
    user.require_admin()?;
    let limit = query.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT).min(500);
    let rows = state.services.activity.list_recent(limit).await?;
    Ok(ApiResponse::ok(rows))
}
