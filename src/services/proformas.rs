use chrono::{Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::config::AppConfig;
use crate::entities::approval_action::{self, ApprovalDecision};
use crate::entities::cart_item::{self, Entity as CartItem};
use crate::entities::product::{self, Entity as Product};
use crate::entities::proforma::{self, Entity as Proforma, ProformaStatus};
use crate::entities::proforma_item::{self, Entity as ProformaItem};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::{tokens, ActivityService, OrderService};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateProformaInput {
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// Decision submitted from the anonymous share page. The actor fields are
/// whatever the stakeholder chose to fill in; a decision with no name is
/// still a decision.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ShareActionInput {
    pub action: ApprovalDecision,
    #[validate(length(min = 1, max = 200))]
    pub actor_name: Option<String>,
    #[validate(email)]
    pub actor_email: Option<String>,
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
}

/// Recorded actor when the share page submits no name.
const ANONYMOUS_ACTOR: &str = "Anonymous";

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ForceActionInput {
    pub action: ApprovalDecision,
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProformaDetail {
    #[serde(flatten)]
    pub proforma: proforma::Model,
    pub items: Vec<proforma_item::Model>,
}

/// The quote engine. A proforma is an immutable price-locked snapshot of the
/// cart; after creation only `status` moves, and every move is a conditional
/// update filtered on the status it departs from.
#[derive(Clone)]
pub struct ProformaService {
    db: Arc<DatabaseConnection>,
    config: Arc<AppConfig>,
    events: EventSender,
    activity: ActivityService,
    orders: Arc<OrderService>,
}

impl ProformaService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        events: EventSender,
        activity: ActivityService,
        orders: Arc<OrderService>,
    ) -> Self {
        Self {
            db,
            config,
            events,
            activity,
            orders,
        }
    }

    /// Snapshots the principal's cart into a pending proforma and clears the
    /// cart, all in one transaction. Cart lines whose product no longer
    /// resolves (deleted or deactivated) are skipped; if nothing resolves the
    /// cart counts as empty.
    #[instrument(skip(self, principal, input), fields(customer_id = %principal.id))]
    pub async fn create_from_cart(
        &self,
        principal: &AuthUser,
        input: CreateProformaInput,
    ) -> Result<ProformaDetail, ServiceError> {
        input.validate()?;

        let cart = CartItem::find()
            .filter(cart_item::Column::PrincipalId.eq(principal.id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;

        if cart.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let product_ids: Vec<Uuid> = cart.iter().map(|row| row.product_id).collect();
        let products: HashMap<Uuid, product::Model> = Product::find()
            .filter(product::Column::Id.is_in(product_ids))
            .filter(product::Column::IsActive.eq(true))
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let proforma_id = Uuid::new_v4();
        let mut item_rows: Vec<proforma_item::ActiveModel> = Vec::new();
        let mut subtotal = Decimal::ZERO;
        let mut position = 0i32;

        for row in &cart {
            let Some(prod) = products.get(&row.product_id) else {
                continue;
            };
            let line_total = (prod.unit_price * Decimal::from(row.quantity))
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
            subtotal += line_total;

            item_rows.push(proforma_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                proforma_id: Set(proforma_id),
                product_id: Set(Some(prod.id)),
                product_name: Set(prod.name.clone()),
                unit: Set(prod.unit.clone()),
                unit_price: Set(prod.unit_price),
                quantity: Set(row.quantity),
                line_total: Set(line_total),
                position: Set(position),
            });
            position += 1;
        }

        if item_rows.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let tax = Decimal::ZERO;
        let total = subtotal + tax;
        let now = Utc::now();
        let share_token = tokens::share_token();

        let txn = self.db.begin().await?;

        let created = proforma::ActiveModel {
            id: Set(proforma_id),
            proforma_number: Set(tokens::proforma_number()),
            share_token: Set(share_token.clone()),
            customer_id: Set(principal.id),
            status: Set(ProformaStatus::Pending),
            valid_until: Set((now + Duration::days(self.config.proforma_validity_days))
                .date_naive()),
            subtotal: Set(subtotal),
            tax: Set(tax),
            total: Set(total),
            notes: Set(input.notes),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        ProformaItem::insert_many(item_rows).exec(&txn).await?;

        CartItem::delete_many()
            .filter(cart_item::Column::PrincipalId.eq(principal.id))
            .exec(&txn)
            .await?;

        self.activity
            .record(
                &txn,
                &principal.display_name(),
                "customer",
                "proforma.created",
                "proforma",
                created.id,
                Some(created.proforma_number.clone()),
            )
            .await?;

        txn.commit().await?;

        self.events
            .send_or_log(Event::ProformaShared {
                proforma_id: created.id,
                proforma_number: created.proforma_number.clone(),
                customer_id: created.customer_id,
                share_url: self.config.share_url(&share_token),
            })
            .await;

        let items = self.items_of(created.id).await?;
        Ok(ProformaDetail {
            proforma: created,
            items,
        })
    }

    #[instrument(skip(self, principal), fields(user_id = %principal.id))]
    pub async fn get_for(
        &self,
        principal: &AuthUser,
        proforma_id: Uuid,
    ) -> Result<ProformaDetail, ServiceError> {
        let pf = self.find(proforma_id).await?;
        if !principal.is_admin() && pf.customer_id != principal.id {
            return Err(ServiceError::Unauthorized(
                "quote belongs to another customer".to_string(),
            ));
        }
        let items = self.items_of(pf.id).await?;
        Ok(ProformaDetail {
            proforma: pf,
            items,
        })
    }

    pub async fn list_for_customer(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<proforma::Model>, ServiceError> {
        let rows = Proforma::find()
            .filter(proforma::Column::CustomerId.eq(customer_id))
            .order_by_desc(proforma::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(rows)
    }

    pub async fn list_all(&self) -> Result<Vec<proforma::Model>, ServiceError> {
        let rows = Proforma::find()
            .order_by_desc(proforma::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(rows)
    }

    /// Anonymous read for the share page. The token is the only credential;
    /// it never appears in logs or error messages.
    #[instrument(skip(self, token))]
    pub async fn get_by_share_token(&self, token: &str) -> Result<ProformaDetail, ServiceError> {
        let pf = self.find_by_token(token).await?;
        let items = self.items_of(pf.id).await?;
        Ok(ProformaDetail {
            proforma: pf,
            items,
        })
    }

    /// Applies an approve/decline decision from the share page. The write is
    /// a pending-only conditional update: whichever of two racing decisions
    /// lands second affects zero rows and surfaces as `AlreadyProcessed`.
    #[instrument(skip(self, token, input))]
    pub async fn act_on_share_token(
        &self,
        token: &str,
        input: ShareActionInput,
    ) -> Result<proforma::Model, ServiceError> {
        input.validate()?;

        let pf = self.find_by_token(token).await?;
        let target = match input.action {
            ApprovalDecision::Approved => ProformaStatus::Approved,
            ApprovalDecision::Declined => ProformaStatus::Declined,
        };

        let txn = self.db.begin().await?;

        let result = Proforma::update_many()
            .col_expr(proforma::Column::Status, Expr::value(target))
            .col_expr(proforma::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(proforma::Column::Id.eq(pf.id))
            .filter(proforma::Column::Status.eq(ProformaStatus::Pending))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            txn.rollback().await?;
            let current = self.find(pf.id).await?.status;
            return Err(ServiceError::AlreadyProcessed(current.to_string()));
        }

        let actor_name = input
            .actor_name
            .clone()
            .unwrap_or_else(|| ANONYMOUS_ACTOR.to_string());

        self.append_approval(
            &txn,
            pf.id,
            input.action,
            &actor_name,
            input.actor_email.clone(),
            input.comment.clone(),
        )
        .await?;

        self.activity
            .record(
                &txn,
                &actor_name,
                "external",
                &format!("proforma.{}", input.action.as_str()),
                "proforma",
                pf.id,
                input.comment.clone(),
            )
            .await?;

        txn.commit().await?;

        self.notify_decision(&pf, input.action, actor_name, input.comment)
            .await;

        self.find(pf.id).await
    }

    /// Admin override of the approval decision. Same pending-only guard as
    /// the share page, but a guard miss reports the transition itself.
    #[instrument(skip(self, admin, input))]
    pub async fn force_action(
        &self,
        admin: &AuthUser,
        proforma_id: Uuid,
        input: ForceActionInput,
    ) -> Result<proforma::Model, ServiceError> {
        admin.require_admin()?;
        input.validate()?;

        let pf = self.find(proforma_id).await?;
        let target = match input.action {
            ApprovalDecision::Approved => ProformaStatus::Approved,
            ApprovalDecision::Declined => ProformaStatus::Declined,
        };

        let txn = self.db.begin().await?;

        let result = Proforma::update_many()
            .col_expr(proforma::Column::Status, Expr::value(target))
            .col_expr(proforma::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(proforma::Column::Id.eq(pf.id))
            .filter(proforma::Column::Status.eq(ProformaStatus::Pending))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            txn.rollback().await?;
            let current = self.find(pf.id).await?.status;
            return Err(ServiceError::InvalidTransition {
                from: current.to_string(),
                to: target.to_string(),
            });
        }

        // The approval row always carries the fixed override marker; any
        // note the admin supplied lands in the activity detail instead.
        let marker = format!("Force {} by admin", input.action);

        self.append_approval(
            &txn,
            pf.id,
            input.action,
            &admin.display_name(),
            admin.email.clone(),
            Some(marker.clone()),
        )
        .await?;

        self.activity
            .record(
                &txn,
                &admin.display_name(),
                "admin",
                &format!("proforma.force_{}", input.action.as_str()),
                "proforma",
                pf.id,
                input.comment.clone().or_else(|| Some(marker.clone())),
            )
            .await?;

        txn.commit().await?;

        self.notify_decision(&pf, input.action, admin.display_name(), Some(marker))
            .await;

        self.find(pf.id).await
    }

    /// Converts an approved proforma into a confirmed order. One transaction
    /// covers the approved-to-converted guard, the order row, the verbatim
    /// item copy and the stock decrements; a second conversion attempt misses
    /// the guard and nothing from it persists.
    #[instrument(skip(self, principal), fields(customer_id = %principal.id))]
    pub async fn convert_to_order(
        &self,
        principal: &AuthUser,
        proforma_id: Uuid,
    ) -> Result<crate::entities::order::Model, ServiceError> {
        let pf = self.find(proforma_id).await?;
        if !principal.is_admin() && pf.customer_id != principal.id {
            return Err(ServiceError::Unauthorized(
                "quote belongs to another customer".to_string(),
            ));
        }

        let items = self.items_of(pf.id).await?;

        let txn = self.db.begin().await?;

        let result = Proforma::update_many()
            .col_expr(proforma::Column::Status, Expr::value(ProformaStatus::Converted))
            .col_expr(proforma::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(proforma::Column::Id.eq(pf.id))
            .filter(proforma::Column::Status.eq(ProformaStatus::Approved))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            txn.rollback().await?;
            let current = self.find(pf.id).await?.status;
            return Err(ServiceError::ApprovalRequired(current.to_string()));
        }

        let order = self.orders.create_from_proforma(&txn, &pf, &items).await?;

        self.activity
            .record(
                &txn,
                &principal.display_name(),
                if principal.is_admin() { "admin" } else { "customer" },
                "proforma.converted",
                "proforma",
                pf.id,
                Some(order.order_number.clone()),
            )
            .await?;

        txn.commit().await?;

        self.events
            .send_or_log(Event::OrderConfirmed {
                order_id: order.id,
                order_number: order.order_number.clone(),
                customer_id: order.customer_id,
            })
            .await;

        Ok(order)
    }

    /// Sweeps pending proformas whose price lock has lapsed into `expired`.
    /// Admin-invoked; there is no background scheduler. Returns the count.
    #[instrument(skip(self, admin))]
    pub async fn expire_overdue(&self, admin: &AuthUser) -> Result<u64, ServiceError> {
        admin.require_admin()?;

        let today = Utc::now().date_naive();
        let result = Proforma::update_many()
            .col_expr(proforma::Column::Status, Expr::value(ProformaStatus::Expired))
            .col_expr(proforma::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(proforma::Column::Status.eq(ProformaStatus::Pending))
            .filter(proforma::Column::ValidUntil.lt(today))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected > 0 {
            info!(count = result.rows_affected, "expired overdue proformas");
        }

        Ok(result.rows_affected)
    }

    pub async fn approval_history(
        &self,
        principal: &AuthUser,
        proforma_id: Uuid,
    ) -> Result<Vec<approval_action::Model>, ServiceError> {
        let pf = self.find(proforma_id).await?;
        if !principal.is_admin() && pf.customer_id != principal.id {
            return Err(ServiceError::Unauthorized(
                "quote belongs to another customer".to_string(),
            ));
        }
        let rows = approval_action::Entity::find()
            .filter(approval_action::Column::ProformaId.eq(pf.id))
            .order_by_asc(approval_action::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(rows)
    }

    async fn append_approval<C: ConnectionTrait>(
        &self,
        conn: &C,
        proforma_id: Uuid,
        action: ApprovalDecision,
        actor_name: &str,
        actor_email: Option<String>,
        comment: Option<String>,
    ) -> Result<(), ServiceError> {
        approval_action::ActiveModel {
            id: Set(Uuid::new_v4()),
            proforma_id: Set(proforma_id),
            action: Set(action),
            actor_name: Set(actor_name.to_string()),
            actor_email: Set(actor_email),
            comment: Set(comment),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await?;
        Ok(())
    }

    async fn notify_decision(
        &self,
        pf: &proforma::Model,
        action: ApprovalDecision,
        actor_name: String,
        comment: Option<String>,
    ) {
        let event = match action {
            ApprovalDecision::Approved => Event::ProformaApproved {
                proforma_id: pf.id,
                proforma_number: pf.proforma_number.clone(),
                customer_id: pf.customer_id,
                actor_name,
                comment,
            },
            ApprovalDecision::Declined => Event::ProformaDeclined {
                proforma_id: pf.id,
                proforma_number: pf.proforma_number.clone(),
                customer_id: pf.customer_id,
                actor_name,
                comment,
            },
        };
        self.events.send_or_log(event).await;
    }

    async fn find(&self, proforma_id: Uuid) -> Result<proforma::Model, ServiceError> {
        Proforma::find_by_id(proforma_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Proforma {} not found", proforma_id)))
    }

    async fn find_by_token(&self, token: &str) -> Result<proforma::Model, ServiceError> {
        Proforma::find()
            .filter(proforma::Column::ShareToken.eq(token))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound("Quote not found".to_string()))
    }

    async fn items_of(&self, proforma_id: Uuid) -> Result<Vec<proforma_item::Model>, ServiceError> {
        let rows = ProformaItem::find()
            .filter(proforma_item::Column::ProformaId.eq(proforma_id))
            .order_by_asc(proforma_item::Column::Position)
            .all(self.db.as_ref())
            .await?;
        Ok(rows)
    }
}
