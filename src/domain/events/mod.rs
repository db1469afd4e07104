//! Domain events handed to the message broker for background processing
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Customer(CustomerEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Paid { order_id: i64, stripe_checkout_id: String, customer_email: String, amount: Decimal, currency: String },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CustomerEvent {
    Registered { user_id: i64, email: String },
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Order(OrderEvent::Paid { .. }) => "orders.paid",
            Self::Customer(CustomerEvent::Registered { .. }) => "customers.registered",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subjects() {
        let paid = DomainEvent::Order(OrderEvent::Paid {
            order_id: 1, stripe_checkout_id: "cs_1".into(), customer_email: "a@b.com".into(), amount: Decimal::new(1000, 2), currency: "usd".into(),
        });
        assert_eq!(paid.subject(), "orders.paid");
        let json = serde_json::to_value(&paid).unwrap();
        assert_eq!(json["type"], "order");
        assert_eq!(json["event"], "paid");
        assert_eq!(json["amount"], "10.00");
    }
}
