use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value_objects::{OrderNumber, OrderStatus, PaymentMethod, PaymentStatus};

// ============================================================================
// Order Domain Models
// ============================================================================

/// One purchase transaction.
///
/// Created once by the checkout workflow inside a single store transaction.
/// After placement only `status`, `notes` and `updated_at` ever change; the
/// monetary fields are frozen and `total == subtotal + shipping + tax` holds
/// from creation onward. Orders are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: OrderNumber,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub shipping_address: ShippingAddress,
    pub items: Vec<OrderItem>,
    /// 1:1 with the order; `None` only after an administrative hard delete.
    pub payment: Option<Payment>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line item snapshot.
///
/// Name, SKU and unit price are copied from the product at checkout time so
/// later catalog edits never retroactively alter placed orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub sku: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub discount: Option<Decimal>,
}

impl OrderItem {
    /// Line total after the optional per-line discount.
    pub fn line_total(&self) -> Decimal {
        let gross = self.unit_price * Decimal::from(self.quantity);
        gross - self.discount.unwrap_or(Decimal::ZERO)
    }
}

/// One payment attempt, tied 1:1 to its order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub transaction_id: Option<String>,
    pub gateway: Option<String>,
    /// Reason recorded when the payment fails or is refunded.
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// The stock-relevant slice of the product catalog.
///
/// `stock_quantity` is the one piece of shared mutable state in this core:
/// decremented inside the checkout transaction, restored inside the
/// cancellation transaction, and never allowed below zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub sku: String,
    pub price: Decimal,
    pub stock_quantity: i32,
}

/// A fully validated shipping address, persisted per order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub recipient: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
}

/// One validated cart line handed to checkout by the cart collaborator.
///
/// The unit price is the cart's snapshot of the current product price; the
/// name/SKU snapshots on the resulting [`OrderItem`] are read from the
/// product record at placement time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discount: Option<Decimal>,
}

// ============================================================================
// Unit Tests
// ============================================================================
