use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::order::{Order, OrderStatistics, OrderStatus, PaymentStatus, Product, StatWindows};
use crate::utils::retry::IsTransient;

mod memory;
mod postgres;

pub use memory::MemoryOrderStore;
pub use postgres::PgOrderStore;

// ============================================================================
// Order Store - transactional persistence seam
// ============================================================================
//
// Every mutating method is one atomic unit: it either applies all of its
// writes or none of them, and concurrent callers never observe a partial
// result. Business policy (which transitions are legal, when a refund is
// owed) lives in the domain services; the store only enforces the guards it
// is handed.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The generated order number is already taken; checkout retries with a
    /// fresh one.
    #[error("order number already taken")]
    OrderNumberTaken,

    /// A payment row already exists for the order.
    #[error("duplicate payment for order {0}")]
    DuplicatePayment(Uuid),

    /// A stock decrement guard failed at commit time.
    #[error("insufficient stock for product {0}")]
    InsufficientStock(Uuid),

    /// A stored value (status, method) could not be interpreted.
    #[error("invalid stored value: {0}")]
    Invalid(String),

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::OrderNumberTaken)
    }
}

/// A refund to record as part of an atomic cancellation.
#[derive(Debug, Clone)]
pub struct RefundRequest {
    pub amount: Decimal,
    pub reason: String,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert or replace a catalog product (stock slice).
    async fn upsert_product(&self, product: &Product) -> Result<(), StoreError>;

    async fn get_product(&self, product_id: Uuid) -> Result<Option<Product>, StoreError>;

    /// Persist a placed order - address, order row, items, pending payment -
    /// and decrement each referenced product's stock, all in one transaction.
    ///
    /// Fails with [`StoreError::OrderNumberTaken`] on an order-number
    /// collision and [`StoreError::InsufficientStock`] when any decrement
    /// guard fails; in both cases nothing is persisted.
    async fn create_order(&self, order: &Order) -> Result<(), StoreError>;

    /// Load a fully populated order (items, address, payment).
    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError>;

    async fn find_by_order_number(&self, number: &str) -> Result<Option<Order>, StoreError>;

    /// Atomically move an order from `from` to `to`, optionally replacing its
    /// notes, restoring the given stock quantities and recording a refund.
    ///
    /// The status update is a compare-and-swap on `from`; a refund request is
    /// a compare-and-swap on the payment being `Completed`. If either guard
    /// fails the whole unit rolls back and `Ok(false)` is returned.
    async fn apply_transition(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        notes: Option<&str>,
        restock: &[(Uuid, i32)],
        refund: Option<RefundRequest>,
    ) -> Result<bool, StoreError>;

    /// Compare-and-swap on the payment status of an order's payment row,
    /// optionally stamping a gateway transaction id, a reason and the
    /// processed timestamp. `Ok(false)` when the payment is missing or not
    /// currently in `expected`.
    async fn set_payment_status(
        &self,
        order_id: Uuid,
        expected: PaymentStatus,
        new_status: PaymentStatus,
        transaction_id: Option<&str>,
        reason: Option<&str>,
        processed_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<bool, StoreError>;

    /// Administrative hard delete of an order's payment row. Payments are the
    /// one entity this is defined for; orders themselves are never deleted.
    async fn delete_payment(&self, order_id: Uuid) -> Result<bool, StoreError>;

    /// Aggregate counts and revenue for the admin dashboard.
    ///
    /// Windowed revenue sums order totals created at or after each cutoff,
    /// excluding cancelled and returned orders.
    async fn order_statistics(&self, windows: &StatWindows) -> Result<OrderStatistics, StoreError>;
}
