pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod notifications;
pub mod services;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::{Json, Router};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::services::{
    ActivityService, CartService, OrderService, PaymentProvider, PaymentService, ProformaService,
    SupplierService,
};

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Uniform success envelope for every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

/// Every domain service, wired once at startup and cloned per request.
#[derive(Clone)]
pub struct AppServices {
    pub carts: CartService,
    pub proformas: ProformaService,
    pub orders: Arc<OrderService>,
    pub payments: PaymentService,
    pub suppliers: SupplierService,
    pub activity: ActivityService,
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub services: AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        events: EventSender,
    ) -> Result<Self, ServiceError> {
        let activity = ActivityService::new(db.clone());
        let orders = Arc::new(OrderService::new(
            db.clone(),
            events.clone(),
            activity.clone(),
        ));
        let provider = PaymentProvider::new(&config.payment)?;

        let services = AppServices {
            carts: CartService::new(db.clone()),
            proformas: ProformaService::new(
                db.clone(),
                config.clone(),
                events,
                activity.clone(),
                orders.clone(),
            ),
            payments: PaymentService::new(provider, orders.clone()),
            orders,
            suppliers: SupplierService::new(db.clone()),
            activity,
        };

        Ok(Self {
            db,
            config,
            services,
        })
    }
}

/// Builds the full application router with middleware applied.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(std::time::Duration::from_secs(
            REQUEST_TIMEOUT_SECS,
        )))
        .with_state(state)
}

fn api_v1_routes() -> Router<AppState> {
    Router::new()
        // cart
        .route(
            "/cart",
            get(handlers::carts::get_cart)
                .put(handlers::carts::set_cart)
                .delete(handlers::carts::clear_cart),
        )
        .route("/cart/items", post(handlers::carts::upsert_item))
        .route("/cart/merge", post(handlers::carts::merge_cart))
        // proformas
        .route(
            "/proformas",
            post(handlers::proformas::create_proforma).get(handlers::proformas::list_proformas),
        )
        .route("/proformas/:id", get(handlers::proformas::get_proforma))
        .route(
            "/proformas/:id/approvals",
            get(handlers::proformas::approval_history),
        )
        .route(
            "/proformas/:id/convert",
            post(handlers::proformas::convert_proforma),
        )
        // anonymous share page
        .route("/share/:token", get(handlers::proformas::view_shared))
        .route(
            "/share/:token/action",
            post(handlers::proformas::act_on_shared),
        )
        // orders
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route("/orders/:id/status", post(handlers::orders::update_status))
        .route(
            "/orders/:id/payment/initialize",
            post(handlers::orders::initialize_payment),
        )
        .route(
            "/payments/verify/:reference",
            post(handlers::orders::verify_payment),
        )
        // supplier work queue
        .route(
            "/supplier/orders",
            get(handlers::suppliers::assigned_orders),
        )
        // admin console
        .route("/admin/proformas", get(handlers::admin::list_proformas))
        .route(
            "/admin/proformas/expire-overdue",
            post(handlers::admin::expire_overdue),
        )
        .route(
            "/admin/proformas/:id/force-action",
            post(handlers::admin::force_action),
        )
        .route("/admin/orders", get(handlers::admin::list_orders))
        .route(
            "/admin/orders/:id/status",
            post(handlers::admin::update_order_status),
        )
        .route(
            "/admin/orders/:id/supplier",
            put(handlers::admin::assign_supplier),
        )
        .route(
            "/admin/suppliers",
            post(handlers::admin::create_supplier).get(handlers::admin::list_suppliers),
        )
        .route("/admin/suppliers/:id", get(handlers::admin::get_supplier))
        .route("/admin/activity", get(handlers::admin::list_activity))
}
