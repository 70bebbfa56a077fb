use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{AuthUser, Role};
use crate::entities::order::{self, OrderStatus};
use crate::errors::ServiceError;
use crate::services::orders::{OrderDetail, StatusActor};
use crate::services::payments::PaymentInitialization;
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusPayload {
    pub status: OrderStatus,
}

pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Vec<order::Model>>>, ServiceError> {
    let rows = state.services.orders.list_for_customer(user.id).await?;
    Ok(ApiResponse::ok(rows))
}

pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderDetail>>, ServiceError> {
    let detail = state.services.orders.get_for(&user, id).await?;
    Ok(ApiResponse::ok(detail))
}

/// Moves an order along the delivery pipeline. Admins may perform any legal
/// transition; a supplier principal resolves to its supplier record and may
/// only dispatch its own assigned orders.
pub async fn update_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusPayload>,
) -> Result<Json<ApiResponse<order::Model>>, ServiceError> {
    let updated = match user.role {
        Role::Admin => {
            state
                .services
                .orders
                .update_status(id, payload.status, StatusActor::Admin(&user))
                .await?
        }
        Role::Supplier => {
            let supplier = state.services.suppliers.find_by_user(user.id).await?;
            state
                .services
                .orders
                .update_status(
                    id,
                    payload.status,
                    StatusActor::Supplier {
                        user: &user,
                        supplier_id: supplier.id,
                    },
                )
                .await?
        }
        Role::Customer => {
            return Err(ServiceError::Unauthorized(
                "customers cannot change order status".to_string(),
            ))
        }
    };

    Ok(ApiResponse::ok(updated))
}

pub async fn initialize_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PaymentInitialization>>, ServiceError> {
    let init = state.services.payments.initialize(&user, id).await?;
    Ok(ApiResponse::ok(init))
}

pub async fn verify_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(reference): Path<String>,
) -> Result<Json<ApiResponse<order::Model>>, ServiceError> {
    let updated = state.services.payments.verify(&user, &reference).await?;
    Ok(ApiResponse::ok(updated))
}
