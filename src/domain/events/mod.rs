//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{Order, PaymentMethod};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: Uuid, user_id: Uuid, total_amount: Decimal, payment_method: PaymentMethod },
    MarkedPaid { order_id: Uuid },
    MarkedDelivered { order_id: Uuid },
}

impl OrderEvent {
    pub fn created(order: &Order) -> Self {
        Self::Created {
            order_id: order.id,
            user_id: order.user_id,
            total_amount: order.total_amount,
            payment_method: order.payment_method,
        }
    }

    /// Subject the event is published under.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Created { .. } => "orders.created",
            Self::MarkedPaid { .. } => "orders.paid",
            Self::MarkedDelivered { .. } => "orders.delivered",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let id = Uuid::nil();
        let json = serde_json::to_value(OrderEvent::MarkedPaid { order_id: id }).unwrap();
        assert_eq!(json["type"], "marked_paid");
        assert_eq!(OrderEvent::MarkedDelivered { order_id: id }.subject(), "orders.delivered");
    }
}
