use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::entities::OrderStatus;

/// Default capacity of the in-process event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with its receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Dropping domain event");
        }
    }
}

/// Domain events emitted by the catalog, order and payment flows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: i32,
        transaction_uuid: String,
    },
    OrderStatusChanged {
        transaction_uuid: String,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    /// A gateway callback that did not verify. Carries the reason, never the payload.
    PaymentRejected {
        reason: String,
    },

    ProductCreated(i32),
    ProductUpdated(i32),
    ProductDeleted(i32),
}

/// Drains the channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::OrderCreated {
                order_id,
                transaction_uuid,
            } => {
                info!(order_id, %transaction_uuid, "Order created");
            }
            Event::OrderStatusChanged {
                transaction_uuid,
                old_status,
                new_status,
            } => {
                info!(%transaction_uuid, %old_status, %new_status, "Order status changed");
            }
            Event::PaymentRejected { reason } => {
                warn!(%reason, "Payment callback rejected");
            }
            Event::ProductCreated(id) => info!(product_id = id, "Product created"),
            Event::ProductUpdated(id) => info!(product_id = id, "Product updated"),
            Event::ProductDeleted(id) => info!(product_id = id, "Product deleted"),
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sent_events_reach_the_receiver() {
        let (sender, mut rx) = EventSender::channel(4);
        sender.send(Event::ProductCreated(7)).await.unwrap();
        assert_eq!(rx.recv().await, Some(Event::ProductCreated(7)));
    }

    #[tokio::test]
    async fn send_fails_once_receiver_is_gone() {
        let (sender, rx) = EventSender::channel(1);
        drop(rx);
        assert!(sender.send(Event::ProductDeleted(1)).await.is_err());
        // Must not panic.
        sender.send_or_log(Event::ProductDeleted(1)).await;
    }

    #[tokio::test]
    async fn process_events_ends_when_senders_drop() {
        let (sender, rx) = EventSender::channel(4);
        sender
            .send(Event::PaymentRejected {
                reason: "signature_mismatch".into(),
            })
            .await
            .unwrap();
        drop(sender);
        process_events(rx).await;
    }
}
