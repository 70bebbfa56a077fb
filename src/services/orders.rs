use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::order::{self, Entity as Order, OrderStatus, PaymentStatus};
use crate::entities::order_item::{self, Entity as OrderItem};
use crate::entities::product::{self, Entity as Product};
use crate::entities::proforma;
use crate::entities::proforma_item;
use crate::entities::supplier::Entity as Supplier;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::{tokens, ActivityService};

/// Who is driving a status change. Admins may perform any legal transition;
/// a supplier may only move its own assigned orders to `dispatched`.
pub enum StatusActor<'a> {
    Admin(&'a AuthUser),
    Supplier {
        user: &'a AuthUser,
        supplier_id: Uuid,
    },
}

/// How to locate an order for a payment update.
#[derive(Debug)]
pub enum OrderLookup {
    Id(Uuid),
    PaymentReference(String),
}

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

/// Fulfillment and payment state for confirmed orders. Every status write is
/// a conditional update filtered on the status the caller observed, so a
/// concurrent writer makes the second update a no-op instead of a double
/// transition.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    events: EventSender,
    activity: ActivityService,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, events: EventSender, activity: ActivityService) -> Self {
        Self {
            db,
            events,
            activity,
        }
    }

    /// Creates the order for an already-converted proforma, inside the
    /// caller's transaction. Items are copied verbatim from the proforma
    /// snapshot and stock is decremented relative to its stored value, one
    /// update per line. Emits nothing; the caller notifies after commit.
    pub async fn create_from_proforma(
        &self,
        txn: &DatabaseTransaction,
        source: &proforma::Model,
        items: &[proforma_item::Model],
    ) -> Result<order::Model, ServiceError> {
        let now = Utc::now();
        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_number: Set(tokens::order_number()),
            customer_id: Set(source.customer_id),
            proforma_id: Set(Some(source.id)),
            status: Set(OrderStatus::Confirmed),
            payment_status: Set(PaymentStatus::Pending),
            payment_reference: Set(None),
            supplier_id: Set(None),
            subtotal: Set(source.subtotal),
            tax: Set(source.tax),
            total: Set(source.total),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(txn)
        .await?;

        let rows: Vec<order_item::ActiveModel> = items
            .iter()
            .map(|item| order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_id: Set(item.product_id),
                product_name: Set(item.product_name.clone()),
                unit: Set(item.unit.clone()),
                unit_price: Set(item.unit_price),
                quantity: Set(item.quantity),
                line_total: Set(item.line_total),
                position: Set(item.position),
            })
            .collect();

        if !rows.is_empty() {
            OrderItem::insert_many(rows).exec(txn).await?;
        }

        // Relative decrement: never read-modify-write, so two concurrent
        // conversions both land and stock may legitimately go negative.
        for item in items {
            if let Some(product_id) = item.product_id {
                Product::update_many()
                    .col_expr(
                        product::Column::StockQuantity,
                        Expr::col(product::Column::StockQuantity).sub(item.quantity),
                    )
                    .col_expr(product::Column::UpdatedAt, Expr::value(now))
                    .filter(product::Column::Id.eq(product_id))
                    .exec(txn)
                    .await?;
            }
        }

        Ok(order)
    }

    /// Loads one order with ownership enforcement: customers see their own,
    /// suppliers their assigned, admins everything.
    #[instrument(skip(self, principal), fields(user_id = %principal.id))]
    pub async fn get_for(
        &self,
        principal: &AuthUser,
        order_id: Uuid,
    ) -> Result<OrderDetail, ServiceError> {
        let order = self.find(order_id).await?;

        if !principal.is_admin() && order.customer_id != principal.id {
            let assigned = match order.supplier_id {
                Some(supplier_id) => Supplier::find_by_id(supplier_id)
                    .one(self.db.as_ref())
                    .await?
                    .and_then(|s| s.user_id)
                    == Some(principal.id),
                None => false,
            };
            if !assigned {
                return Err(ServiceError::Unauthorized(
                    "order belongs to another customer".to_string(),
                ));
            }
        }

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .order_by_asc(order_item::Column::Position)
            .all(self.db.as_ref())
            .await?;

        Ok(OrderDetail { order, items })
    }

    pub async fn list_for_customer(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<order::Model>, ServiceError> {
        let rows = Order::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(rows)
    }

    pub async fn list_for_supplier(
        &self,
        supplier_id: Uuid,
    ) -> Result<Vec<order::Model>, ServiceError> {
        let rows = Order::find()
            .filter(order::Column::SupplierId.eq(supplier_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(rows)
    }

    pub async fn list_all(&self) -> Result<Vec<order::Model>, ServiceError> {
        let rows = Order::find()
            .order_by_desc(order::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(rows)
    }

    /// Moves an order along the delivery pipeline. The adjacency check runs
    /// up front for a precise error, then again inside the conditional update
    /// that actually writes, so a racing transition cannot slip through.
    #[instrument(skip(self, actor))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        actor: StatusActor<'_>,
    ) -> Result<order::Model, ServiceError> {
        let order = self.find(order_id).await?;
        let from = order.status;

        let (actor_name, actor_role) = match &actor {
            StatusActor::Admin(user) => (user.display_name(), "admin"),
            StatusActor::Supplier { user, supplier_id } => {
                if order.supplier_id != Some(*supplier_id) {
                    return Err(ServiceError::Unauthorized(
                        "order is not assigned to this supplier".to_string(),
                    ));
                }
                if target != OrderStatus::Dispatched {
                    return Err(ServiceError::Unauthorized(
                        "suppliers may only mark assigned orders dispatched".to_string(),
                    ));
                }
                (user.display_name(), "supplier")
            }
        };

        if !from.can_transition_to(target) {
            return Err(ServiceError::InvalidTransition {
                from: from.to_string(),
                to: target.to_string(),
            });
        }

        let txn = self.db.begin().await?;

        let result = Order::update_many()
            .col_expr(order::Column::Status, Expr::value(target))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::Status.eq(from))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            txn.rollback().await?;
            let current = self.find(order.id).await?.status;
            return Err(ServiceError::InvalidTransition {
                from: current.to_string(),
                to: target.to_string(),
            });
        }

        self.activity
            .record(
                &txn,
                &actor_name,
                actor_role,
                &format!("order.{}", target.as_str()),
                "order",
                order.id,
                Some(format!("{} -> {}", from, target)),
            )
            .await?;

        txn.commit().await?;

        self.events
            .send_or_log(Event::OrderStatusChanged {
                order_id: order.id,
                order_number: order.order_number.clone(),
                customer_id: order.customer_id,
                old_status: from,
                new_status: target,
            })
            .await;

        self.find(order.id).await
    }

    /// Assigns (or clears) the fulfilling supplier. Allowed at any point
    /// before delivery; the assignee must be an active supplier.
    #[instrument(skip(self, admin))]
    pub async fn assign_supplier(
        &self,
        order_id: Uuid,
        supplier_id: Option<Uuid>,
        admin: &AuthUser,
    ) -> Result<order::Model, ServiceError> {
        let order = self.find(order_id).await?;

        if order.status == OrderStatus::Delivered {
            return Err(ServiceError::ValidationError(
                "cannot reassign supplier on a delivered order".to_string(),
            ));
        }

        let detail = match supplier_id {
            Some(id) => {
                let supplier = Supplier::find_by_id(id)
                    .one(self.db.as_ref())
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("Supplier {} not found", id)))?;
                if !supplier.is_active {
                    return Err(ServiceError::ValidationError(
                        "supplier is inactive".to_string(),
                    ));
                }
                format!("assigned to {}", supplier.name)
            }
            None => "supplier cleared".to_string(),
        };

        let txn = self.db.begin().await?;

        let mut active: order::ActiveModel = order.clone().into();
        active.supplier_id = Set(supplier_id);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        self.activity
            .record(
                &txn,
                &admin.display_name(),
                "admin",
                "order.supplier_assigned",
                "order",
                order.id,
                Some(detail),
            )
            .await?;

        txn.commit().await?;

        Ok(updated)
    }

    pub async fn find_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<order::Model, ServiceError> {
        Order::find()
            .filter(order::Column::PaymentReference.eq(reference))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound("No order matches this payment reference".to_string())
            })
    }

    /// Stores the provider reference ahead of the initialize call, so a
    /// failed call leaves a retryable pending order that verify can find.
    pub async fn set_payment_reference(
        &self,
        order_id: Uuid,
        reference: &str,
    ) -> Result<order::Model, ServiceError> {
        let order = self.find(order_id).await?;
        let mut active: order::ActiveModel = order.into();
        active.payment_reference = Set(Some(reference.to_string()));
        active.updated_at = Set(Utc::now());
        let updated = active.update(self.db.as_ref()).await?;
        Ok(updated)
    }

    /// Records a payment outcome. Writing the status the order already has
    /// is a no-op success, which makes provider callbacks safely retryable.
    #[instrument(skip(self))]
    pub async fn update_payment(
        &self,
        lookup: OrderLookup,
        new_status: PaymentStatus,
        detail: Option<String>,
    ) -> Result<(order::Model, bool), ServiceError> {
        let order = match lookup {
            OrderLookup::Id(id) => self.find(id).await?,
            OrderLookup::PaymentReference(reference) => {
                self.find_by_payment_reference(&reference).await?
            }
        };

        if order.payment_status == new_status {
            return Ok((order, false));
        }

        let txn = self.db.begin().await?;

        let mut active: order::ActiveModel = order.clone().into();
        active.payment_status = Set(new_status);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        self.activity
            .record(
                &txn,
                "payment-provider",
                "system",
                &format!("order.payment_{}", new_status.as_str()),
                "order",
                order.id,
                detail,
            )
            .await?;

        txn.commit().await?;

        Ok((updated, true))
    }

    async fn find(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        Order::find_by_id(order_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }
}
