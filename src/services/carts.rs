use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::cart_item::{self, Entity as CartItem};
use crate::errors::ServiceError;

/// One desired cart line, as sent by clients.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CartEntry {
    pub product_id: Uuid,
    /// Zero or negative removes the line.
    pub quantity: i32,
}

/// Per-principal cart persistence. Carts are keyed by principal id; a guest
/// cart is identified by the anonymous session id the frontend carries, so
/// merging on login is just re-keying with quantity summing.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn get(&self, principal_id: Uuid) -> Result<Vec<cart_item::Model>, ServiceError> {
        let items = CartItem::find()
            .filter(cart_item::Column::PrincipalId.eq(principal_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(items)
    }

    /// Sets one line to an absolute quantity. Quantity <= 0 removes the line;
    /// a new (principal, product) pair inserts one.
    #[instrument(skip(self))]
    pub async fn upsert(
        &self,
        principal_id: Uuid,
        entry: CartEntry,
    ) -> Result<Vec<cart_item::Model>, ServiceError> {
        let existing = CartItem::find()
            .filter(cart_item::Column::PrincipalId.eq(principal_id))
            .filter(cart_item::Column::ProductId.eq(entry.product_id))
            .one(self.db.as_ref())
            .await?;

        match (existing, entry.quantity) {
            (Some(row), q) if q <= 0 => {
                CartItem::delete_by_id(row.id).exec(self.db.as_ref()).await?;
            }
            (Some(row), q) => {
                let mut active: cart_item::ActiveModel = row.into();
                active.quantity = Set(q);
                active.updated_at = Set(Utc::now());
                active.update(self.db.as_ref()).await?;
            }
            (None, q) if q <= 0 => {}
            (None, q) => {
                let now = Utc::now();
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    principal_id: Set(principal_id),
                    product_id: Set(entry.product_id),
                    quantity: Set(q),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(self.db.as_ref())
                .await?;
            }
        }

        self.get(principal_id).await
    }

    /// Replaces the whole cart in one transaction. Non-positive quantities
    /// are dropped rather than stored.
    #[instrument(skip(self, entries))]
    pub async fn set_all(
        &self,
        principal_id: Uuid,
        entries: Vec<CartEntry>,
    ) -> Result<Vec<cart_item::Model>, ServiceError> {
        let txn = self.db.begin().await?;

        CartItem::delete_many()
            .filter(cart_item::Column::PrincipalId.eq(principal_id))
            .exec(&txn)
            .await?;

        let now = Utc::now();
        let rows: Vec<cart_item::ActiveModel> = entries
            .into_iter()
            .filter(|e| e.quantity > 0)
            .map(|e| cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                principal_id: Set(principal_id),
                product_id: Set(e.product_id),
                quantity: Set(e.quantity),
                created_at: Set(now),
                updated_at: Set(now),
            })
            .collect();

        if !rows.is_empty() {
            CartItem::insert_many(rows).exec(&txn).await?;
        }

        txn.commit().await?;

        self.get(principal_id).await
    }

    /// Folds a guest cart into the principal's cart on login. Quantities for
    /// products present on both sides are summed, never overwritten.
    #[instrument(skip(self, guest_entries))]
    pub async fn merge(
        &self,
        principal_id: Uuid,
        guest_entries: Vec<CartEntry>,
    ) -> Result<Vec<cart_item::Model>, ServiceError> {
        let current = self.get(principal_id).await?;

        let mut merged: BTreeMap<Uuid, i32> = current
            .into_iter()
            .map(|row| (row.product_id, row.quantity))
            .collect();

        for entry in guest_entries.into_iter().filter(|e| e.quantity > 0) {
            *merged.entry(entry.product_id).or_insert(0) += entry.quantity;
        }

        let entries = merged
            .into_iter()
            .map(|(product_id, quantity)| CartEntry {
                product_id,
                quantity,
            })
            .collect();

        self.set_all(principal_id, entries).await
    }

    #[instrument(skip(self))]
    pub async fn clear(&self, principal_id: Uuid) -> Result<(), ServiceError> {
        CartItem::delete_many()
            .filter(cart_item::Column::PrincipalId.eq(principal_id))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }
}
