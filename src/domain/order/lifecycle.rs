use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::store::{OrderStore, RefundRequest};

use super::errors::OrderError;
use super::models::Order;
use super::stats::{OrderStatistics, StatWindows};
use super::value_objects::{OrderStatus, PaymentStatus};

// ============================================================================
// Order Lifecycle Manager
// ============================================================================
//
// Enforces the status state machine and runs the compensation tied to each
// transition: entering `Cancelled` restores stock, and `cancel_order`
// additionally refunds a completed payment - status change, restock and
// refund as one store transaction.
//
// Expected business failures (missing order, transition not in the table,
// refund precondition not met) come back as `Ok(false)` with the order left
// untouched; `Err` is reserved for infrastructure problems.
//
// ============================================================================

pub struct OrderLifecycle<S> {
    store: Arc<S>,
    metrics: Arc<Metrics>,
}

impl<S: OrderStore> OrderLifecycle<S> {
    pub fn new(store: Arc<S>, metrics: Arc<Metrics>) -> Self {
        Self { store, metrics }
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, OrderError> {
        Ok(self.store.get_order(order_id).await?)
    }

    pub async fn find_by_order_number(&self, number: &str) -> Result<Option<Order>, OrderError> {
        Ok(self.store.find_by_order_number(number).await?)
    }

    /// Move an order to `new_status` if the transition table allows it.
    ///
    /// Entering `Cancelled` restores stock for every line item in the same
    /// transaction. Shipped/Delivered are where customer notifications would
    /// hook in; none are sent from this core.
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        notes: Option<String>,
        actor_id: Option<Uuid>,
    ) -> Result<bool, OrderError> {
        let Some(order) = self.store.get_order(order_id).await? else {
            tracing::warn!(order_id = %order_id, "status update for unknown order");
            return Ok(false);
        };

        if !order.status.can_transition_to(new_status) {
            tracing::warn!(
                order_id = %order_id,
                from = %order.status,
                to = %new_status,
                "transition not allowed"
            );
            self.metrics
                .record_transition(order.status.as_str(), new_status.as_str(), false);
            return Ok(false);
        }

        let restock = if new_status == OrderStatus::Cancelled {
            restock_lines(&order)
        } else {
            Vec::new()
        };

        let applied = self
            .store
            .apply_transition(
                order_id,
                order.status,
                new_status,
                notes.as_deref(),
                &restock,
                None,
            )
            .await?;

        if applied {
            tracing::info!(
                order_id = %order_id,
                from = %order.status,
                to = %new_status,
                actor = ?actor_id,
                "order status updated"
            );
            self.metrics
                .record_transition(order.status.as_str(), new_status.as_str(), true);
            if new_status == OrderStatus::Cancelled {
                self.metrics.orders_cancelled.inc();
            }
        }
        Ok(applied)
    }

    /// Cancel an order placed but not yet shipped.
    ///
    /// Restores stock for every item and, when the payment has already
    /// completed, records a full refund - all applied atomically with the
    /// status change so a crash can never restore stock without cancelling,
    /// or cancel without refunding.
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        reason: &str,
        actor_id: Option<Uuid>,
    ) -> Result<bool, OrderError> {
        let Some(order) = self.store.get_order(order_id).await? else {
            tracing::warn!(order_id = %order_id, "cancellation for unknown order");
            return Ok(false);
        };

        if !matches!(order.status, OrderStatus::Pending | OrderStatus::Processing) {
            tracing::warn!(
                order_id = %order_id,
                status = %order.status,
                "order can no longer be cancelled"
            );
            self.metrics
                .record_transition(order.status.as_str(), OrderStatus::Cancelled.as_str(), false);
            return Ok(false);
        }

        let refund = order
            .payment
            .as_ref()
            .filter(|p| p.status == PaymentStatus::Completed)
            .map(|p| RefundRequest {
                amount: p.amount,
                reason: reason.to_string(),
            });
        let refunding = refund.is_some();

        let applied = self
            .store
            .apply_transition(
                order_id,
                order.status,
                OrderStatus::Cancelled,
                Some(reason),
                &restock_lines(&order),
                refund,
            )
            .await?;

        if applied {
            tracing::info!(
                order_id = %order_id,
                reason = reason,
                refunded = refunding,
                actor = ?actor_id,
                "order cancelled"
            );
            self.metrics
                .record_transition(order.status.as_str(), OrderStatus::Cancelled.as_str(), true);
            self.metrics.orders_cancelled.inc();
            if refunding {
                self.metrics.refunds_processed.inc();
            }
        }
        Ok(applied)
    }

    /// Refund a completed payment, fully or partially by amount.
    ///
    /// The amount must be positive and at most what was paid; the payment
    /// must currently be `Completed`, so refunding an already refunded
    /// payment returns `Ok(false)` instead of double-refunding. Stock is
    /// never touched here - that is the cancellation path's job.
    pub async fn process_refund(
        &self,
        order_id: Uuid,
        amount: Decimal,
        reason: &str,
    ) -> Result<bool, OrderError> {
        let Some(order) = self.store.get_order(order_id).await? else {
            tracing::warn!(order_id = %order_id, "refund for unknown order");
            return Ok(false);
        };
        let Some(payment) = order.payment.as_ref() else {
            tracing::warn!(order_id = %order_id, "refund for order without payment");
            return Ok(false);
        };

        if payment.status != PaymentStatus::Completed {
            tracing::warn!(
                order_id = %order_id,
                payment_status = %payment.status,
                "refund requires a completed payment"
            );
            return Ok(false);
        }
        if amount <= Decimal::ZERO || amount > payment.amount {
            return Err(OrderError::InvalidRefundAmount {
                amount,
                paid: payment.amount,
            });
        }

        let applied = self
            .store
            .set_payment_status(
                order_id,
                PaymentStatus::Completed,
                PaymentStatus::Refunded,
                None,
                Some(reason),
                Some(Utc::now()),
            )
            .await?;

        if applied {
            tracing::info!(order_id = %order_id, amount = %amount, reason = reason, "refund recorded");
            self.metrics.refunds_processed.inc();
        }
        Ok(applied)
    }

    /// Record the gateway's answer for the order's pending payment.
    pub async fn record_payment_result(
        &self,
        order_id: Uuid,
        success: bool,
        transaction_id: Option<&str>,
        failure_reason: Option<&str>,
    ) -> Result<bool, OrderError> {
        let new_status = if success {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Failed
        };

        let applied = self
            .store
            .set_payment_status(
                order_id,
                PaymentStatus::Pending,
                new_status,
                transaction_id,
                failure_reason,
                Some(Utc::now()),
            )
            .await?;

        if applied {
            tracing::info!(order_id = %order_id, status = %new_status, "payment result recorded");
            self.metrics.record_payment_result(success);
        } else {
            tracing::warn!(order_id = %order_id, "no pending payment to record result for");
        }
        Ok(applied)
    }

    /// Counts, revenue and backlog for the admin dashboard.
    pub async fn order_statistics(&self) -> Result<OrderStatistics, OrderError> {
        let windows = StatWindows::at(Utc::now());
        Ok(self.store.order_statistics(&windows).await?)
    }
}

fn restock_lines(order: &Order) -> Vec<(Uuid, i32)> {
    order
        .items
        .iter()
        .map(|item| (item.product_id, item.quantity))
        .collect()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{
        CartLine, CheckoutService, PlaceOrder, PricingPolicy, Product, ShippingAddress,
    };
    use crate::store::MemoryOrderStore;

    struct Fixture {
        store: Arc<MemoryOrderStore>,
        checkout: CheckoutService<MemoryOrderStore>,
        lifecycle: OrderLifecycle<MemoryOrderStore>,
        product_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryOrderStore::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let product_id = Uuid::new_v4();
        store
            .upsert_product(&Product {
                id: product_id,
                name: "Walnut Desk".to_string(),
                sku: "DESK-9".to_string(),
                price: Decimal::new(2500, 2),
                stock_quantity: 10,
            })
            .await
            .unwrap();

        Fixture {
            checkout: CheckoutService::new(store.clone(), PricingPolicy::default(), metrics.clone()),
            lifecycle: OrderLifecycle::new(store.clone(), metrics),
            store,
            product_id,
        }
    }

    async fn place(fixture: &Fixture, quantity: i32) -> Order {
        fixture
            .checkout
            .place_order(PlaceOrder {
                customer_id: Uuid::new_v4(),
                lines: vec![CartLine {
                    product_id: fixture.product_id,
                    quantity,
                    unit_price: Decimal::new(2500, 2),
                    discount: None,
                }],
                shipping_address: ShippingAddress {
                    recipient: "Grace Hopper".to_string(),
                    line1: "1 Compiler Court".to_string(),
                    line2: None,
                    city: "Arlington".to_string(),
                    state: "VA".to_string(),
                    postal_code: "22202".to_string(),
                    country: "US".to_string(),
                    phone: None,
                },
                payment_method: "paypal".to_string(),
                notes: None,
            })
            .await
            .unwrap()
    }

    async fn status_of(fixture: &Fixture, order_id: Uuid) -> OrderStatus {
        fixture.store.get_order(order_id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn test_allowed_transition_is_applied() {
        let f = fixture().await;
        let order = place(&f, 1).await;

        let applied = f
            .lifecycle
            .update_status(order.id, OrderStatus::Processing, None, None)
            .await
            .unwrap();

        assert!(applied);
        assert_eq!(status_of(&f, order.id).await, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn test_disallowed_transition_returns_false_and_keeps_status() {
        let f = fixture().await;
        let order = place(&f, 1).await;
        f.lifecycle
            .update_status(order.id, OrderStatus::Processing, None, None)
            .await
            .unwrap();
        f.lifecycle
            .update_status(order.id, OrderStatus::Shipped, None, None)
            .await
            .unwrap();

        // Shipped -> Processing is a back-edge and must be refused.
        let applied = f
            .lifecycle
            .update_status(order.id, OrderStatus::Processing, None, None)
            .await
            .unwrap();

        assert!(!applied);
        assert_eq!(status_of(&f, order.id).await, OrderStatus::Shipped);
    }

    #[tokio::test]
    async fn test_every_pair_outside_the_table_is_refused() {
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                if from.can_transition_to(to) {
                    continue;
                }

                let f = fixture().await;
                let order = place(&f, 1).await;
                force_status(&f, order.id, from).await;

                let applied = f.lifecycle.update_status(order.id, to, None, None).await.unwrap();
                assert!(!applied, "{from} -> {to} must be refused");
                assert_eq!(status_of(&f, order.id).await, from);
            }
        }
    }

    /// Walk the order to `target` through valid transitions so tests can
    /// start from any state.
    async fn force_status(f: &Fixture, order_id: Uuid, target: OrderStatus) {
        let path: &[OrderStatus] = match target {
            OrderStatus::Pending => &[],
            OrderStatus::Processing => &[OrderStatus::Processing],
            OrderStatus::Shipped => &[OrderStatus::Processing, OrderStatus::Shipped],
            OrderStatus::Delivered => &[
                OrderStatus::Processing,
                OrderStatus::Shipped,
                OrderStatus::Delivered,
            ],
            OrderStatus::Cancelled => &[OrderStatus::Cancelled],
            OrderStatus::Returned => &[
                OrderStatus::Processing,
                OrderStatus::Shipped,
                OrderStatus::Returned,
            ],
        };
        for step in path {
            let applied = f.lifecycle.update_status(order_id, *step, None, None).await.unwrap();
            assert!(applied, "setup transition to {step} failed");
        }
    }

    #[tokio::test]
    async fn test_missing_order_returns_false() {
        let f = fixture().await;
        let applied = f
            .lifecycle
            .update_status(Uuid::new_v4(), OrderStatus::Processing, None, None)
            .await
            .unwrap();
        assert!(!applied);
    }

    #[tokio::test]
    async fn test_cancel_restores_stock_and_refunds_completed_payment() {
        let f = fixture().await;
        let order = place(&f, 2).await;
        assert_eq!(
            f.store.get_product(f.product_id).await.unwrap().unwrap().stock_quantity,
            8
        );
        f.lifecycle
            .record_payment_result(order.id, true, Some("tx-123"), None)
            .await
            .unwrap();

        let applied = f
            .lifecycle
            .cancel_order(order.id, "customer request", None)
            .await
            .unwrap();
        assert!(applied);

        let reloaded = f.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, OrderStatus::Cancelled);
        assert_eq!(reloaded.notes.as_deref(), Some("customer request"));
        assert_eq!(
            reloaded.payment.as_ref().unwrap().status,
            PaymentStatus::Refunded
        );
        assert_eq!(
            f.store.get_product(f.product_id).await.unwrap().unwrap().stock_quantity,
            10
        );
    }

    #[tokio::test]
    async fn test_cancel_without_completed_payment_skips_refund() {
        let f = fixture().await;
        let order = place(&f, 1).await;

        let applied = f.lifecycle.cancel_order(order.id, "changed mind", None).await.unwrap();
        assert!(applied);

        let reloaded = f.store.get_order(order.id).await.unwrap().unwrap();
        // Payment was still pending; it must not be marked refunded.
        assert_eq!(
            reloaded.payment.as_ref().unwrap().status,
            PaymentStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_cancel_refused_once_shipped() {
        let f = fixture().await;
        let order = place(&f, 1).await;
        force_status(&f, order.id, OrderStatus::Shipped).await;

        let applied = f.lifecycle.cancel_order(order.id, "too late", None).await.unwrap();
        assert!(!applied);
        assert_eq!(status_of(&f, order.id).await, OrderStatus::Shipped);
        // No stock came back either.
        assert_eq!(
            f.store.get_product(f.product_id).await.unwrap().unwrap().stock_quantity,
            9
        );
    }

    #[tokio::test]
    async fn test_refund_requires_completed_payment() {
        let f = fixture().await;
        let order = place(&f, 1).await;

        let applied = f
            .lifecycle
            .process_refund(order.id, Decimal::from(10), "requested")
            .await
            .unwrap();
        assert!(!applied);
    }

    #[tokio::test]
    async fn test_refund_amount_must_not_exceed_paid() {
        let f = fixture().await;
        let order = place(&f, 1).await;
        f.lifecycle
            .record_payment_result(order.id, true, None, None)
            .await
            .unwrap();

        let result = f
            .lifecycle
            .process_refund(order.id, order.total + Decimal::from(100), "too much")
            .await;

        assert!(matches!(result, Err(OrderError::InvalidRefundAmount { .. })));
        let reloaded = f.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(
            reloaded.payment.as_ref().unwrap().status,
            PaymentStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_second_refund_fails_on_status_precondition() {
        let f = fixture().await;
        let order = place(&f, 1).await;
        f.lifecycle
            .record_payment_result(order.id, true, None, None)
            .await
            .unwrap();

        let first = f
            .lifecycle
            .process_refund(order.id, order.total, "damaged item")
            .await
            .unwrap();
        assert!(first);

        let second = f
            .lifecycle
            .process_refund(order.id, order.total, "damaged item")
            .await
            .unwrap();
        assert!(!second);
    }

    #[tokio::test]
    async fn test_failed_payment_records_reason() {
        let f = fixture().await;
        let order = place(&f, 1).await;

        let applied = f
            .lifecycle
            .record_payment_result(order.id, false, None, Some("card declined"))
            .await
            .unwrap();
        assert!(applied);

        let reloaded = f.store.get_order(order.id).await.unwrap().unwrap();
        let payment = reloaded.payment.as_ref().unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(payment.failure_reason.as_deref(), Some("card declined"));

        // The result is already recorded; a second answer must not apply.
        let again = f
            .lifecycle
            .record_payment_result(order.id, true, None, None)
            .await
            .unwrap();
        assert!(!again);
    }
}
