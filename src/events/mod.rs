use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// Events emitted by the order pipeline. Consumed by a logging task today;
/// the channel is the seam for future fan-out (cache invalidation hints,
/// outbound webhooks).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    PaymentSucceeded {
        order_id: Uuid,
        payment_intent_id: String,
    },
    PaymentRefunded {
        order_id: Uuid,
    },
    ReceiptEmailed {
        order_id: Uuid,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Drains the event channel, logging each event. Spawned from `main`.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(order_id = %order_id, "event: order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(order_id = %order_id, %old_status, %new_status, "event: order status changed");
            }
            Event::PaymentSucceeded {
                order_id,
                payment_intent_id,
            } => {
                info!(order_id = %order_id, %payment_intent_id, "event: payment succeeded");
            }
            Event::PaymentRefunded { order_id } => {
                info!(order_id = %order_id, "event: payment refunded");
            }
            Event::ReceiptEmailed { order_id } => {
                info!(order_id = %order_id, "event: receipt emailed");
            }
        }
    }
}
