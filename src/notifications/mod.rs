use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::events::Event;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Boundary to the outward notification collaborator (email/WhatsApp live
/// behind it). Implementations must not block state changes: callers treat
/// every error as best-effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, event: &Event) -> Result<(), NotificationError>;
}

/// Default notifier: records the outward-facing message in the log stream.
/// Share tokens are bearer credentials and are never included here.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, event: &Event) -> Result<(), NotificationError> {
        match event {
            Event::ProformaShared {
                proforma_number,
                customer_id,
                ..
            } => {
                info!(%customer_id, proforma_number, "notify: proforma shared");
            }
            Event::ProformaApproved {
                proforma_number,
                customer_id,
                actor_name,
                ..
            } => {
                info!(%customer_id, proforma_number, actor_name, "notify: proforma approved");
            }
            Event::ProformaDeclined {
                proforma_number,
                customer_id,
                actor_name,
                ..
            } => {
                info!(%customer_id, proforma_number, actor_name, "notify: proforma declined");
            }
            Event::OrderConfirmed {
                order_number,
                customer_id,
                ..
            } => {
                info!(%customer_id, order_number, "notify: order confirmed");
            }
            Event::OrderStatusChanged {
                order_number,
                customer_id,
                old_status,
                new_status,
                ..
            } => {
                info!(
                    %customer_id,
                    order_number,
                    old = %old_status,
                    new = %new_status,
                    "notify: order status changed"
                );
            }
        }
        Ok(())
    }
}
