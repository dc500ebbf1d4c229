use rust_decimal::Decimal;
use uuid::Uuid;

use crate::store::StoreError;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: Uuid, quantity: i32 },

    #[error("invalid discount on product {product_id}")]
    InvalidDiscount { product_id: Uuid },

    #[error("unknown product: {0}")]
    UnknownProduct(Uuid),

    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("unknown payment method: {0:?}")]
    UnknownPaymentMethod(String),

    #[error("refund amount {amount} must be positive and at most the paid amount {paid}")]
    InvalidRefundAmount { amount: Decimal, paid: Decimal },

    #[error("could not allocate a unique order number")]
    OrderNumberExhausted,

    #[error(transparent)]
    Store(#[from] StoreError),
}
