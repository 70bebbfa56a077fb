use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryOrder, QuerySelect,
    Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::activity::{self, Entity as Activity};
use crate::errors::ServiceError;

/// Append-only audit log. `record` is generic over the connection so callers
/// can write the activity row inside the same transaction as the state change
/// it documents.
#[derive(Clone)]
pub struct ActivityService {
    db: Arc<DatabaseConnection>,
}

impl ActivityService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn record<C: ConnectionTrait>(
        &self,
        conn: &C,
        actor: &str,
        actor_role: &str,
        action: &str,
        entity_type: &str,
        entity_id: Uuid,
        detail: Option<String>,
    ) -> Result<(), ServiceError> {
        activity::ActiveModel {
            id: Set(Uuid::new_v4()),
            actor: Set(actor.to_string()),
            actor_role: Set(actor_role.to_string()),
            action: Set(action.to_string()),
            entity_type: Set(entity_type.to_string()),
            entity_id: Set(entity_id),
            detail: Set(detail),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await?;

        Ok(())
    }

    /// Most recent activity first, for the admin console feed.
    pub async fn list_recent(&self, limit: u64) -> Result<Vec<activity::Model>, ServiceError> {
        let rows = Activity::find()
            .order_by_desc(activity::Column::CreatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;
        Ok(rows)
    }
}
