use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

use crate::domain::order::{
    Order, OrderStatistics, OrderStatus, PaymentStatus, Product, StatWindows, StatusBucket,
};

use super::{OrderStore, RefundRequest, StoreError};

// ============================================================================
// In-Memory Order Store
// ============================================================================
//
// Backs tests and the standalone demo. A single mutex serializes every
// operation, which gives each trait method the same all-or-nothing behavior
// as a database transaction: all guards are checked before the first
// mutation.
//
// ============================================================================

#[derive(Default)]
struct Tables {
    products: HashMap<Uuid, Product>,
    orders: HashMap<Uuid, Order>,
}

#[derive(Default)]
pub struct MemoryOrderStore {
    inner: Mutex<Tables>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn upsert_product(&self, product: &Product) -> Result<(), StoreError> {
        self.lock().products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&self, product_id: Uuid) -> Result<Option<Product>, StoreError> {
        Ok(self.lock().products.get(&product_id).cloned())
    }

    async fn create_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut tables = self.lock();

        if tables
            .orders
            .values()
            .any(|o| o.order_number == order.order_number)
        {
            return Err(StoreError::OrderNumberTaken);
        }

        // Validate every stock guard before touching anything, so a failure
        // on the third line leaves the first two products untouched. Lines
        // referencing the same product count against the stock cumulatively.
        let mut required: HashMap<Uuid, i32> = HashMap::new();
        for item in &order.items {
            *required.entry(item.product_id).or_insert(0) += item.quantity;
        }
        for (product_id, quantity) in &required {
            let available = tables.products.get(product_id).map(|p| p.stock_quantity);
            match available {
                Some(stock) if stock >= *quantity => {}
                _ => return Err(StoreError::InsufficientStock(*product_id)),
            }
        }

        for (product_id, quantity) in &required {
            if let Some(product) = tables.products.get_mut(product_id) {
                product.stock_quantity -= quantity;
            }
        }
        tables.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.lock().orders.get(&order_id).cloned())
    }

    async fn find_by_order_number(&self, number: &str) -> Result<Option<Order>, StoreError> {
        Ok(self
            .lock()
            .orders
            .values()
            .find(|o| o.order_number.as_str() == number)
            .cloned())
    }

    async fn apply_transition(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        notes: Option<&str>,
        restock: &[(Uuid, i32)],
        refund: Option<RefundRequest>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock();

        // Guards first, mutations after; a failed guard must leave no trace.
        match tables.orders.get(&order_id) {
            Some(order) if order.status == from => {}
            _ => return Ok(false),
        }
        if refund.is_some() {
            let completed = tables
                .orders
                .get(&order_id)
                .and_then(|o| o.payment.as_ref())
                .is_some_and(|p| p.status == PaymentStatus::Completed);
            if !completed {
                return Ok(false);
            }
        }

        for (product_id, quantity) in restock {
            if let Some(product) = tables.products.get_mut(product_id) {
                product.stock_quantity += quantity;
            }
        }

        if let Some(order) = tables.orders.get_mut(&order_id) {
            order.status = to;
            if let Some(notes) = notes {
                order.notes = Some(notes.to_string());
            }
            order.updated_at = Utc::now();
            if let (Some(refund), Some(payment)) = (refund, order.payment.as_mut()) {
                payment.status = PaymentStatus::Refunded;
                payment.failure_reason = Some(refund.reason);
                payment.processed_at = Some(Utc::now());
            }
        }
        Ok(true)
    }

    async fn set_payment_status(
        &self,
        order_id: Uuid,
        expected: PaymentStatus,
        new_status: PaymentStatus,
        transaction_id: Option<&str>,
        reason: Option<&str>,
        processed_at: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock();

        let Some(payment) = tables
            .orders
            .get_mut(&order_id)
            .and_then(|o| o.payment.as_mut())
        else {
            return Ok(false);
        };
        if payment.status != expected {
            return Ok(false);
        }

        payment.status = new_status;
        if let Some(transaction_id) = transaction_id {
            payment.transaction_id = Some(transaction_id.to_string());
        }
        if let Some(reason) = reason {
            payment.failure_reason = Some(reason.to_string());
        }
        if let Some(processed_at) = processed_at {
            payment.processed_at = Some(processed_at);
        }
        Ok(true)
    }

    async fn delete_payment(&self, order_id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        match tables.orders.get_mut(&order_id) {
            Some(order) => Ok(order.payment.take().is_some()),
            None => Ok(false),
        }
    }

    async fn order_statistics(&self, windows: &StatWindows) -> Result<OrderStatistics, StoreError> {
        let tables = self.lock();

        let mut buckets: HashMap<OrderStatus, (u64, Decimal)> = HashMap::new();
        let mut revenue_today = Decimal::ZERO;
        let mut revenue_this_week = Decimal::ZERO;
        let mut revenue_this_month = Decimal::ZERO;
        let mut grand_total = Decimal::ZERO;

        for order in tables.orders.values() {
            let entry = buckets.entry(order.status).or_insert((0, Decimal::ZERO));
            entry.0 += 1;
            entry.1 += order.total;
            grand_total += order.total;

            let counts_toward_windows = !matches!(
                order.status,
                OrderStatus::Cancelled | OrderStatus::Returned
            );
            if counts_toward_windows {
                if order.created_at >= windows.day_start {
                    revenue_today += order.total;
                }
                if order.created_at >= windows.week_start {
                    revenue_this_week += order.total;
                }
                if order.created_at >= windows.month_start {
                    revenue_this_month += order.total;
                }
            }
        }

        let order_count = tables.orders.len() as u64;
        let average_order_value = if order_count == 0 {
            Decimal::ZERO
        } else {
            (grand_total / Decimal::from(order_count)).round_dp(2)
        };

        let by_status = buckets
            .into_iter()
            .map(|(status, (count, revenue))| StatusBucket {
                status,
                count,
                revenue,
            })
            .collect();

        Ok(OrderStatistics::from_parts(
            by_status,
            revenue_today,
            revenue_this_week,
            revenue_this_month,
            average_order_value,
        ))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
