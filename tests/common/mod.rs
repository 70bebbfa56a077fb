use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use procura_api::auth::{issue_token, Role};
use procura_api::config::AppConfig;
use procura_api::db;
use procura_api::entities::{product, supplier};
use procura_api::events::{process_events, EventSender};
use procura_api::notifications::LogNotifier;
use procura_api::{app_router, AppState};

const JWT_SECRET: &str = "integration_test_secret_key_with_enough_length_0000";

/// Full application wired against a throwaway sqlite file. The pool is
/// capped at one connection so concurrent requests serialize at the
/// database, which makes race assertions deterministic.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub db: Arc<DatabaseConnection>,
    pub customer_id: Uuid,
    pub other_customer_id: Uuid,
    pub admin_id: Uuid,
    pub supplier_user_id: Uuid,
    pub supplier_id: Uuid,
    pub cement: product::Model,
    pub sand: product::Model,
    _tmp: TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let tmp = tempfile::tempdir().expect("tempdir");
        let db_path = tmp.path().join("test.db");
        let database_url = format!("sqlite://{}?mode=rwc", db_path.display());

        let mut config =
            AppConfig::new(database_url, JWT_SECRET.into(), "127.0.0.1".into(), 0);
        // Unroutable provider so payment tests fail fast instead of
        // reaching the network.
        config.payment.base_url = "http://127.0.0.1:9".into();
        config.payment.timeout_secs = 2;
        let config = Arc::new(config);

        let db = Arc::new(db::establish_connection(&config).await.expect("connect"));
        db::bootstrap_schema(&db).await.expect("schema");

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(process_events(rx, Arc::new(LogNotifier)));

        let state =
            AppState::new(db.clone(), config, EventSender::new(tx)).expect("app state");
        let router = app_router(state.clone());

        let cement = seed_product(&db, "Cement 50kg", "bag", dec!(8500.00), 500).await;
        let sand = seed_product(&db, "Sharp Sand", "m3", dec!(3000.00), 200).await;

        let supplier_user_id = Uuid::new_v4();
        let supplier_id = seed_supplier(&db, "BuildRight Ltd", supplier_user_id).await;

        Self {
            router,
            state,
            db,
            customer_id: Uuid::new_v4(),
            other_customer_id: Uuid::new_v4(),
            admin_id: Uuid::new_v4(),
            supplier_user_id,
            supplier_id,
            cement,
            sand,
            _tmp: tmp,
        }
    }

    pub fn customer_token(&self) -> String {
        self.token_for(self.customer_id, Role::Customer, "Chinedu Buyer", "buyer@example.com")
    }

    pub fn other_customer_token(&self) -> String {
        self.token_for(
            self.other_customer_id,
            Role::Customer,
            "Amaka Other",
            "other@example.com",
        )
    }

    pub fn admin_token(&self) -> String {
        self.token_for(self.admin_id, Role::Admin, "Ops Admin", "ops@example.com")
    }

    pub fn supplier_token(&self) -> String {
        self.token_for(
            self.supplier_user_id,
            Role::Supplier,
            "BuildRight Dispatch",
            "dispatch@buildright.example",
        )
    }

    fn token_for(&self, id: Uuid, role: Role, name: &str, email: &str) -> String {
        issue_token(JWT_SECRET, id, role, Some(name), Some(email)).expect("token")
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("response");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };

        (status, value)
    }

    pub async fn get(&self, path: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, path, Some(token), None).await
    }

    pub async fn post(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, path, Some(token), Some(body)).await
    }

    pub async fn put(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, path, Some(token), Some(body)).await
    }

    /// Fills the customer's cart and snapshots it into a pending proforma.
    /// Returns the created proforma's JSON (`data` envelope contents).
    pub async fn create_pending_proforma(&self, token: &str) -> Value {
        let (status, _) = self
            .put(
                "/api/v1/cart",
                token,
                serde_json::json!({
                    "items": [
                        { "product_id": self.cement.id, "quantity": 2 },
                        { "product_id": self.sand.id, "quantity": 1 },
                    ]
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = self
            .post("/api/v1/proformas", token, serde_json::json!({ "notes": null }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "create proforma: {}", body);
        body["data"].clone()
    }

    /// Approves a pending proforma through its anonymous share page.
    pub async fn approve_via_share(&self, share_token: &str) {
        let (status, body) = self
            .request(
                Method::POST,
                &format!("/api/v1/share/{}/action", share_token),
                None,
                Some(serde_json::json!({
                    "action": "approved",
                    "actor_name": "Site Engineer",
                    "comment": "Prices look right"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "approve: {}", body);
    }
}

async fn seed_product(
    db: &DatabaseConnection,
    name: &str,
    unit: &str,
    unit_price: Decimal,
    stock: i32,
) -> product::Model {
    let now = Utc::now();
    product::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        unit: Set(unit.to_string()),
        unit_price: Set(unit_price),
        stock_quantity: Set(stock),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("seed product")
}

async fn seed_supplier(db: &DatabaseConnection, name: &str, user_id: Uuid) -> Uuid {
    let now = Utc::now();
    let row = supplier::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        contact_name: Set(None),
        email: Set(None),
        phone: Set(None),
        is_active: Set(true),
        user_id: Set(Some(user_id)),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("seed supplier");
    row.id
}
