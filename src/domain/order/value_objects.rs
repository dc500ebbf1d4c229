use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Order Value Objects
// ============================================================================

/// Order lifecycle status.
///
/// Transitions are restricted to the table encoded in [`valid_transitions`];
/// `Cancelled` and `Returned` are terminal.
///
/// [`valid_transitions`]: OrderStatus::valid_transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Returned,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Returned,
    ];

    /// Statuses reachable from `self`. Used by callers to populate
    /// admin status dropdowns, and by the lifecycle manager to validate
    /// requested transitions.
    pub fn valid_transitions(self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::Processing, OrderStatus::Cancelled],
            OrderStatus::Processing => &[OrderStatus::Shipped, OrderStatus::Cancelled],
            OrderStatus::Shipped => &[OrderStatus::Delivered, OrderStatus::Returned],
            OrderStatus::Delivered => &[OrderStatus::Returned],
            OrderStatus::Cancelled | OrderStatus::Returned => &[],
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.valid_transitions().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Returned => "returned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.as_str() == value)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the customer pays for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    PayPal,
    BankTransfer,
    CashOnDelivery,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 4] = [
        PaymentMethod::CreditCard,
        PaymentMethod::PayPal,
        PaymentMethod::BankTransfer,
        PaymentMethod::CashOnDelivery,
    ];

    /// Maps free text from the checkout form onto a method.
    ///
    /// Matching is case-insensitive and ignores spaces, hyphens and
    /// underscores ("Credit Card", "credit-card" and "CREDITCARD" all map to
    /// `CreditCard`). Unrecognized input yields `None`; callers reject it
    /// rather than silently substituting a default.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized: String = value
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "creditcard" => Some(PaymentMethod::CreditCard),
            "paypal" => Some(PaymentMethod::PayPal),
            "banktransfer" => Some(PaymentMethod::BankTransfer),
            "cashondelivery" => Some(PaymentMethod::CashOnDelivery),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::PayPal => "paypal",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::CashOnDelivery => "cash_on_delivery",
        }
    }

    pub fn from_stored(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.as_str() == value)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of the payment attempt tied to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    None,
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 5] = [
        PaymentStatus::None,
        PaymentStatus::Pending,
        PaymentStatus::Completed,
        PaymentStatus::Failed,
        PaymentStatus::Refunded,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::None => "none",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.as_str() == value)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable order identifier, distinct from the internal primary key.
///
/// Format: `ORD-<YYYYMMDD>-<4 random digits>`. Uniqueness is enforced by the
/// store; on collision the checkout workflow regenerates and retries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderNumber(pub String);

impl OrderNumber {
    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
        Self(format!("ORD-{}-{:04}", now.format("%Y%m%d"), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_transition_table_forward_paths() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Delivered));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Returned));
        assert!(OrderStatus::Delivered.can_transition_to(OrderStatus::Returned));
    }

    #[test]
    fn test_no_back_edges_or_self_transitions() {
        for from in OrderStatus::ALL {
            assert!(!from.can_transition_to(from));
            assert!(!from.can_transition_to(OrderStatus::Pending));
        }
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Processing));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Shipped));
    }

    #[test]
    fn test_terminal_states() {
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Returned.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Delivered.is_terminal());
    }

    #[test]
    fn test_status_round_trips_through_storage_form() {
        for status in OrderStatus::ALL {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("unknown"), None);
    }

    #[test]
    fn test_payment_method_parsing_is_case_and_separator_insensitive() {
        assert_eq!(PaymentMethod::parse("CreditCard"), Some(PaymentMethod::CreditCard));
        assert_eq!(PaymentMethod::parse("credit card"), Some(PaymentMethod::CreditCard));
        assert_eq!(PaymentMethod::parse("CREDIT-CARD"), Some(PaymentMethod::CreditCard));
        assert_eq!(PaymentMethod::parse("paypal"), Some(PaymentMethod::PayPal));
        assert_eq!(PaymentMethod::parse("Bank_Transfer"), Some(PaymentMethod::BankTransfer));
        assert_eq!(
            PaymentMethod::parse("cash on delivery"),
            Some(PaymentMethod::CashOnDelivery)
        );
    }

    #[test]
    fn test_unknown_payment_method_is_rejected() {
        assert_eq!(PaymentMethod::parse("bitcoin"), None);
        assert_eq!(PaymentMethod::parse(""), None);
    }

    #[test]
    fn test_payment_status_round_trips() {
        for status in PaymentStatus::ALL {
            assert_eq!(PaymentStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_order_number_format() {
        let now = Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap();
        let number = OrderNumber::generate(now);

        let parts: Vec<&str> = number.as_str().split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ORD");
        assert_eq!(parts[1], "20250314");
        assert_eq!(parts[2].len(), 4);
        assert!(parts[2].chars().all(|c| c.is_ascii_digit()));
    }
}
