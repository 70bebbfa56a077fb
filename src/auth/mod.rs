use axum::{async_trait, extract::FromRequestParts, http::header, http::request::Parts};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{errors::ServiceError, AppState};

/// Principal roles. Session issuance belongs to the auth collaborator; this
/// crate only verifies the claims it is handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Admin,
    Supplier,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Customer => "customer",
            Role::Admin => "admin",
            Role::Supplier => "supplier",
        };
        f.write_str(s)
    }
}

/// JWT claims carried by the auth collaborator's bearer tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub email: Option<String>,
    pub name: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// The resolved principal for a request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Short-circuits non-admin principals before any side effect.
    pub fn require_admin(&self) -> Result<(), ServiceError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Unauthorized(
                "admin role required".to_string(),
            ))
        }
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.email.clone())
            .unwrap_or_else(|| self.id.to_string())
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ServiceError::Unauthenticated)?;

        let token = header_value
            .strip_prefix("Bearer ")
            .ok_or(ServiceError::Unauthenticated)?;

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|_| ServiceError::Unauthenticated)?;

        let id = Uuid::parse_str(&data.claims.sub).map_err(|_| ServiceError::Unauthenticated)?;

        Ok(AuthUser {
            id,
            role: data.claims.role,
            email: data.claims.email,
            name: data.claims.name,
        })
    }
}

/// Issues a short-lived HS256 token for the given principal. Used by tooling
/// and the test harness; production tokens come from the auth collaborator.
pub fn issue_token(
    jwt_secret: &str,
    user_id: Uuid,
    role: Role,
    name: Option<&str>,
    email: Option<&str>,
) -> Result<String, ServiceError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        role,
        email: email.map(str::to_string),
        name: name.map(str::to_string),
        iat: now.timestamp(),
        exp: (now + chrono::Duration::hours(1)).timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .map_err(|e| ServiceError::Other(anyhow::anyhow!("failed to encode token: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_serde() {
        for (role, text) in [
            (Role::Customer, "\"customer\""),
            (Role::Admin, "\"admin\""),
            (Role::Supplier, "\"supplier\""),
        ] {
            assert_eq!(serde_json::to_string(&role).unwrap(), text);
            let parsed: Role = serde_json::from_str(text).unwrap();
            assert_eq!(parsed, role);
        }
    }

    #[test]
    fn require_admin_rejects_other_roles() {
        let user = AuthUser {
            id: Uuid::new_v4(),
            role: Role::Customer,
            email: None,
            name: None,
        };
        assert!(matches!(
            user.require_admin(),
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[test]
    fn issued_token_decodes() {
        let secret = "a_test_secret_key_that_is_long_enough_for_validation";
        let id = Uuid::new_v4();
        let token =
            issue_token(secret, id, Role::Admin, Some("Admin"), Some("a@example.com")).unwrap();

        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap();
        assert_eq!(data.claims.sub, id.to_string());
        assert_eq!(data.claims.role, Role::Admin);
    }
}
