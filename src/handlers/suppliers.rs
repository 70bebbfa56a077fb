use axum::extract::State;
use axum::Json;

use crate::auth::{AuthUser, Role};
use crate::entities::order;
use crate::errors::ServiceError;
use crate::{ApiResponse, AppState};

/// The work queue for a logged-in supplier: every order assigned to it.
pub async fn assigned_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Vec<order::Model>>>, ServiceError> {
    if user.role != Role::Supplier {
        return Err(ServiceError::Unauthorized(
            "supplier role required".to_string(),
        ));
    }

    let supplier = state.services.suppliers.find_by_user(user.id).await?;
    let rows = state.services.orders.list_for_supplier(supplier.id).await?;
    Ok(ApiResponse::ok(rows))
}
