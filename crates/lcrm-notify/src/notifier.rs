use std::sync::Arc;

use async_trait::async_trait;
use lcrm_core::{Order, OrderStatus, Role};
use lcrm_storage::CrmStore;
use lcrm_sync::OrderEventSink;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::telegram::{escape_markdown, MessageSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderEvent {
    Created,
    StatusChanged { previous: OrderStatus },
}

pub fn order_message(order: &Order, role: Role, event: OrderEvent) -> String {
    let client = escape_markdown(&order.client_name());
    let amount = order.contract_amount.unwrap_or(Decimal::ZERO);
    match event {
        OrderEvent::Created => {
            let address = if order.address.trim().is_empty() {
                "not set".to_string()
            } else {
                escape_markdown(order.address.trim())
            };
            format!(
                "*New order #{}*\n\nClient: {}\nAddress: {}\nStatus: {}\nAmount: {} ₽\n\nYou are assigned as *{}*",
                order.id,
                client,
                address,
                order.status.label(),
                amount,
                role.label()
            )
        }
        OrderEvent::StatusChanged { previous } => format!(
            "*Order #{} status changed*\n\nClient: {}\nStatus: {} → *{}*\nAmount: {} ₽\n\nYour role: *{}*",
            order.id,
            client,
            previous.label(),
            order.status.label(),
            amount,
            role.label()
        ),
    }
}

/// Messages every assigned worker whose Telegram chat is verified. Delivery
/// problems are logged and swallowed.
#[derive(Clone)]
pub struct WorkerNotifier {
    store: Arc<dyn CrmStore>,
    sender: Arc<dyn MessageSender>,
}

impl WorkerNotifier {
    pub fn new(store: Arc<dyn CrmStore>, sender: Arc<dyn MessageSender>) -> Self {
        Self { store, sender }
    }

    /// Number of messages actually delivered.
    pub async fn notify(&self, order: &Order, event: OrderEvent) -> usize {
        let assignments = order.assignments();
        if assignments.is_empty() {
            debug!(order_id = order.id, "no assigned workers to notify");
            return 0;
        }

        let mut delivered = 0;
        for (role, worker_id) in assignments {
            let profile = match self.store.get_profile(worker_id).await {
                Ok(profile) => profile,
                Err(err) => {
                    warn!(order_id = order.id, worker_id, error = %err, "profile lookup failed");
                    continue;
                }
            };
            let Some(chat_id) = profile
                .filter(|p| p.telegram_verified)
                .and_then(|p| p.telegram_id)
            else {
                debug!(order_id = order.id, worker_id, "worker has no verified telegram chat");
                continue;
            };

            let text = order_message(order, role, event);
            match self.sender.send_message(&chat_id, &text).await {
                Ok(()) => {
                    delivered += 1;
                    info!(order_id = order.id, worker_id, role = %role, "worker notified");
                }
                Err(err) => {
                    warn!(order_id = order.id, worker_id, error = %err, "notification failed");
                }
            }
        }
        delivered
    }
}

#[async_trait]
impl OrderEventSink for WorkerNotifier {
    async fn order_created(&self, order: &Order) {
        self.notify(order, OrderEvent::Created).await;
    }

    async fn status_changed(&self, order: &Order, previous: OrderStatus) {
        self.notify(order, OrderEvent::StatusChanged { previous }).await;
    }
}
