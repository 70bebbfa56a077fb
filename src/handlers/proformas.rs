use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::approval_action;
use crate::entities::order;
use crate::entities::proforma;
use crate::errors::ServiceError;
use crate::services::proformas::{CreateProformaInput, ProformaDetail, ShareActionInput};
use crate::{ApiResponse, AppState};

pub async fn create_proforma(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<CreateProformaInput>,
) -> Result<(StatusCode, Json<ApiResponse<ProformaDetail>>), ServiceError> {
    let detail = state.services.proformas.create_from_cart(&user, input).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(detail)))
}

pub async fn list_proformas(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Vec<proforma::Model>>>, ServiceError> {
    let rows = state.services.proformas.list_for_customer(user.id).await?;
    Ok(ApiResponse::ok(rows))
}

pub async fn get_proforma(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ProformaDetail>>, ServiceError> {
    let detail = state.services.proformas.get_for(&user, id).await?;
    Ok(ApiResponse::ok(detail))
}

pub async fn approval_history(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<approval_action::Model>>>, ServiceError> {
    let rows = state.services.proformas.approval_history(&user, id).await?;
    Ok(ApiResponse::ok(rows))
}

pub async fn convert_proforma(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<ApiResponse<order::Model>>), ServiceError> {
    let created = state.services.proformas.convert_to_order(&user, id).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(created)))
}

/// Anonymous share-page read; the token in the path is the only credential.
pub async fn view_shared(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<ApiResponse<ProformaDetail>>, ServiceError> {
    let detail = state.services.proformas.get_by_share_token(&token).await?;
    Ok(ApiResponse::ok(detail))
}

/// Anonymous approve/decline from the share page.
pub async fn act_on_shared(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(input): Json<ShareActionInput>,
) -> Result<Json<ApiResponse<proforma::Model>>, ServiceError> {
    let updated = state
        .services
        .proformas
        .act_on_share_token(&token, input)
        .await?;
    Ok(ApiResponse::ok(updated))
}
