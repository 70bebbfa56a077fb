mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::{json, Value};
use uuid::Uuid;

use common::TestApp;
use procura_api::entities::{approval_action, product, proforma};

fn dec_field(value: &Value, key: &str) -> Decimal {
    value[key]
        .as_str()
        .unwrap_or_else(|| panic!("{} missing: {}", key, value))
        .parse()
        .expect("decimal field")
}

#[tokio::test]
async fn creating_a_proforma_snapshots_the_cart_and_clears_it() {
    let app = TestApp::spawn().await;
    let token = app.customer_token();

    let data = app.create_pending_proforma(&token).await;

    assert_eq!(data["status"], "pending");
    assert_eq!(data["items"].as_array().map(Vec::len), Some(2));
    assert_eq!(dec_field(&data, "subtotal"), dec!(20000.00));
    assert_eq!(dec_field(&data, "tax"), dec!(0));
    assert_eq!(dec_field(&data, "total"), dec!(20000.00));

    let share_token = data["share_token"].as_str().expect("share_token");
    assert_eq!(share_token.len(), 48);

    let expected_valid_until = (Utc::now() + Duration::days(7)).date_naive().to_string();
    assert_eq!(data["valid_until"], expected_valid_until.as_str());

    // the quoted cart is gone
    let (status, body) = app.get("/api/v1/cart", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn line_totals_multiply_snapshot_price_by_quantity() {
    let app = TestApp::spawn().await;
    let token = app.customer_token();

    // a third catalogue item priced 88.00, quoted at quantity 3
    let now = Utc::now();
    let gravel = product::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set("Gravel 20mm".into()),
        unit: Set("m3".into()),
        unit_price: Set(dec!(88.00)),
        stock_quantity: Set(50),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(app.db.as_ref())
    .await
    .expect("seed gravel");

    let (status, _) = app
        .put(
            "/api/v1/cart",
            &token,
            json!({ "items": [{ "product_id": gravel.id, "quantity": 3 }] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post("/api/v1/proformas", &token, json!({ "notes": null }))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let data = &body["data"];
    let items = data["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(dec_field(&items[0], "unit_price"), dec!(88.00));
    assert_eq!(items[0]["quantity"], 3);
    assert_eq!(dec_field(&items[0], "line_total"), dec!(264.00));
    assert_eq!(dec_field(data, "subtotal"), dec!(264.00));
    assert_eq!(dec_field(data, "total"), dec!(264.00));
}

#[tokio::test]
async fn empty_cart_cannot_be_quoted() {
    let app = TestApp::spawn().await;
    let token = app.customer_token();

    let (status, body) = app
        .post("/api/v1/proformas", &token, json!({ "notes": null }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("empty"));
}

#[tokio::test]
async fn line_prices_stay_locked_after_catalogue_changes() {
    let app = TestApp::spawn().await;
    let token = app.customer_token();
    let data = app.create_pending_proforma(&token).await;
    let id = data["id"].as_str().expect("id");

    // reprice the catalogue after the snapshot
    let mut cement: product::ActiveModel = product::Entity::find_by_id(app.cement.id)
        .one(app.db.as_ref())
        .await
        .expect("query")
        .expect("row")
        .into();
    cement.unit_price = Set(dec!(9999.00));
    cement.update(app.db.as_ref()).await.expect("reprice");

    let (status, body) = app.get(&format!("/api/v1/proformas/{}", id), &token).await;
    assert_eq!(status, StatusCode::OK);
    let items = body["data"]["items"].as_array().expect("items");
    let cement_line = items
        .iter()
        .find(|item| item["product_id"] == app.cement.id.to_string())
        .expect("cement line");
    assert_eq!(dec_field(cement_line, "unit_price"), dec!(8500.00));
    assert_eq!(dec_field(&body["data"], "total"), dec!(20000.00));
}

#[tokio::test]
async fn share_page_is_readable_without_authentication() {
    let app = TestApp::spawn().await;
    let data = app.create_pending_proforma(&app.customer_token()).await;
    let share_token = data["share_token"].as_str().expect("share_token");

    let (status, body) = app
        .request(Method::GET, &format!("/api/v1/share/{}", share_token), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(2));

    let (status, _) = app
        .request(Method::GET, "/api/v1/share/not-a-real-token", None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn first_decision_wins_and_repeats_conflict() {
    let app = TestApp::spawn().await;
    let data = app.create_pending_proforma(&app.customer_token()).await;
    let share_token = data["share_token"].as_str().expect("share_token");

    app.approve_via_share(share_token).await;

    // a second approval conflicts and names the current status
    let (status, body) = app
        .request(
            Method::POST,
            &format!("/api/v1/share/{}/action", share_token),
            None,
            Some(json!({ "action": "approved", "actor_name": "Site Engineer" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["message"].as_str().unwrap().contains("approved"));

    // so does a late decline
    let (status, _) = app
        .request(
            Method::POST,
            &format!("/api/v1/share/{}/action", share_token),
            None,
            Some(json!({ "action": "declined", "actor_name": "Procurement Lead" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn concurrent_decisions_resolve_to_exactly_one_winner() {
    let app = TestApp::spawn().await;
    let data = app.create_pending_proforma(&app.customer_token()).await;
    let share_token = data["share_token"].as_str().expect("share_token");
    let path = format!("/api/v1/share/{}/action", share_token);

    let approve = app.request(
        Method::POST,
        &path,
        None,
        Some(json!({ "action": "approved", "actor_name": "Engineer A" })),
    );
    let decline = app.request(
        Method::POST,
        &path,
        None,
        Some(json!({ "action": "declined", "actor_name": "Engineer B" })),
    );

    let ((status_a, _), (status_b, _)) = tokio::join!(approve, decline);

    let outcomes = [status_a, status_b];
    assert!(outcomes.contains(&StatusCode::OK), "{:?}", outcomes);
    assert!(outcomes.contains(&StatusCode::CONFLICT), "{:?}", outcomes);

    // exactly one decision was recorded
    let proforma_id: Uuid = data["id"].as_str().unwrap().parse().expect("uuid");
    let actions = approval_action::Entity::find()
        .filter(approval_action::Column::ProformaId.eq(proforma_id))
        .all(app.db.as_ref())
        .await
        .expect("query");
    assert_eq!(actions.len(), 1);
}

#[tokio::test]
async fn only_approved_proformas_convert() {
    let app = TestApp::spawn().await;
    let token = app.customer_token();
    let data = app.create_pending_proforma(&token).await;
    let id = data["id"].as_str().expect("id");

    // pending: conversion gated on approval
    let (status, body) = app
        .post(&format!("/api/v1/proformas/{}/convert", id), &token, json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["message"].as_str().unwrap().contains("pending"));

    app.approve_via_share(data["share_token"].as_str().unwrap()).await;

    let (status, body) = app
        .post(&format!("/api/v1/proformas/{}/convert", id), &token, json!({}))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["status"], "confirmed");
    assert_eq!(body["data"]["payment_status"], "pending");
    assert_eq!(body["data"]["proforma_id"], id);

    // converted is terminal: a second conversion conflicts
    let (status, body) = app
        .post(&format!("/api/v1/proformas/{}/convert", id), &token, json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["message"].as_str().unwrap().contains("converted"));
}

#[tokio::test]
async fn customers_cannot_touch_each_others_quotes() {
    let app = TestApp::spawn().await;
    let data = app.create_pending_proforma(&app.customer_token()).await;
    let id = data["id"].as_str().expect("id");
    let other = app.other_customer_token();

    let (status, _) = app.get(&format!("/api/v1/proformas/{}", id), &other).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.approve_via_share(data["share_token"].as_str().unwrap()).await;
    let (status, _) = app
        .post(&format!("/api/v1/proformas/{}/convert", id), &other, json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_force_action_overrides_pending_and_leaves_a_trace() {
    let app = TestApp::spawn().await;
    let customer = app.customer_token();
    let admin = app.admin_token();
    let data = app.create_pending_proforma(&customer).await;
    let id = data["id"].as_str().expect("id");

    // non-admin principals are rejected before any side effect
    let (status, _) = app
        .post(
            &format!("/api/v1/admin/proformas/{}/force-action", id),
            &customer,
            json!({ "action": "declined" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .post(
            &format!("/api/v1/admin/proformas/{}/force-action", id),
            &admin,
            json!({ "action": "declined", "comment": "duplicate request" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], "declined");

    // declined is terminal for the override too
    let (status, body) = app
        .post(
            &format!("/api/v1/admin/proformas/{}/force-action", id),
            &admin,
            json!({ "action": "approved" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["message"].as_str().unwrap().contains("declined"));

    // the override is in the approval history with the fixed marker; the
    // admin's own note goes to the audit feed instead
    let (status, body) = app
        .get(&format!("/api/v1/proformas/{}/approvals", id), &admin)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["data"][0]["action"], "declined");
    assert_eq!(body["data"][0]["actor_name"], "Ops Admin");
    assert_eq!(body["data"][0]["comment"], "Force declined by admin");

    let (status, body) = app.get("/api/v1/admin/activity", &admin).await;
    assert_eq!(status, StatusCode::OK);
    let override_row = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|row| row["action"] == "proforma.force_declined")
        .expect("audit row");
    assert_eq!(override_row["detail"], "duplicate request");
}

#[tokio::test]
async fn share_decision_without_a_name_is_recorded_as_anonymous() {
    let app = TestApp::spawn().await;
    let admin = app.admin_token();
    let data = app.create_pending_proforma(&app.customer_token()).await;
    let id = data["id"].as_str().expect("id");
    let share_token = data["share_token"].as_str().expect("share_token");

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/api/v1/share/{}/action", share_token),
            None,
            Some(json!({ "action": "approved" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], "approved");

    let (_, body) = app
        .get(&format!("/api/v1/proformas/{}/approvals", id), &admin)
        .await;
    assert_eq!(body["data"][0]["actor_name"], "Anonymous");
}

#[tokio::test]
async fn expiry_sweep_only_touches_overdue_pending_quotes() {
    let app = TestApp::spawn().await;
    let customer = app.customer_token();
    let admin = app.admin_token();

    let stale = app.create_pending_proforma(&customer).await;
    let stale_id: Uuid = stale["id"].as_str().unwrap().parse().expect("uuid");
    let fresh = app.create_pending_proforma(&customer).await;

    // backdate the first quote past its validity window
    let row = proforma::Entity::find_by_id(stale_id)
        .one(app.db.as_ref())
        .await
        .expect("query")
        .expect("row");
    let mut active: proforma::ActiveModel = row.into();
    active.valid_until = Set((Utc::now() - Duration::days(1)).date_naive());
    active.update(app.db.as_ref()).await.expect("backdate");

    let (status, body) = app
        .post("/api/v1/admin/proformas/expire-overdue", &admin, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["expired"], 1);

    let (_, body) = app
        .get(&format!("/api/v1/proformas/{}", stale_id), &customer)
        .await;
    assert_eq!(body["data"]["status"], "expired");

    let (_, body) = app
        .get(
            &format!("/api/v1/proformas/{}", fresh["id"].as_str().unwrap()),
            &customer,
        )
        .await;
    assert_eq!(body["data"]["status"], "pending");

    // expired quotes no longer accept decisions
    let (status, _) = app
        .request(
            Method::POST,
            &format!(
                "/api/v1/share/{}/action",
                stale["share_token"].as_str().unwrap()
            ),
            None,
            Some(json!({ "action": "approved", "actor_name": "Too Late" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}
