use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;
use crate::notifications::Notifier;

/// State-transition events emitted by the proforma and order engines. Each
/// carries the identifiers and human-readable numbers the notification
/// collaborator needs; delivery is fire-and-forget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    ProformaShared {
        proforma_id: Uuid,
        proforma_number: String,
        customer_id: Uuid,
        share_url: String,
    },
    ProformaApproved {
        proforma_id: Uuid,
        proforma_number: String,
        customer_id: Uuid,
        actor_name: String,
        comment: Option<String>,
    },
    ProformaDeclined {
        proforma_id: Uuid,
        proforma_number: String,
        customer_id: Uuid,
        actor_name: String,
        comment: Option<String>,
    },
    OrderConfirmed {
        order_id: Uuid,
        order_number: String,
        customer_id: Uuid,
    },
    OrderStatusChanged {
        order_id: Uuid,
        order_number: String,
        customer_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Best-effort send. An undeliverable event must never fail the state
    /// change that produced it.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("dropping event: {}", e);
        }
    }
}

/// Consumes events and forwards them to the notification collaborator.
/// Delivery failures are logged and swallowed.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, notifier: Arc<dyn Notifier>) {
    info!("starting event processing loop");

    while let Some(event) = rx.recv().await {
        if let Err(e) = notifier.deliver(&event).await {
            warn!(error = %e, "notification delivery failed (ignored)");
        }
    }

    info!("event processing loop stopped");
}
