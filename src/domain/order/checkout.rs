use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::store::{OrderStore, StoreError};
use crate::utils::retry::{retry_on_transient, RetryConfig, RetryResult};

use super::errors::OrderError;
use super::models::{CartLine, Order, OrderItem, Payment, ShippingAddress};
use super::pricing::{OrderTotals, PricingPolicy};
use super::value_objects::{OrderNumber, OrderStatus, PaymentMethod, PaymentStatus};

// ============================================================================
// Checkout Workflow
// ============================================================================
//
// Turns a validated cart into a persisted Order + OrderItems + pending
// Payment, or fails with nothing persisted. All validation happens before
// the first write; the store commits address, order, items, payment and the
// stock decrements as one atomic unit.
//
// ============================================================================

/// Everything checkout needs from its collaborators: the owning customer,
/// the cart lines with their price snapshots, a validated address, the
/// payment method as entered, and optional customer notes.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub customer_id: Uuid,
    pub lines: Vec<CartLine>,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    pub notes: Option<String>,
}

pub struct CheckoutService<S> {
    store: Arc<S>,
    policy: PricingPolicy,
    metrics: Arc<Metrics>,
    retry: RetryConfig,
}

impl<S: OrderStore> CheckoutService<S> {
    pub fn new(store: Arc<S>, policy: PricingPolicy, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            policy,
            metrics,
            retry: RetryConfig::for_conflicts(),
        }
    }

    /// Place an order.
    ///
    /// On success the returned order is fully populated (items, address,
    /// pending payment) and every referenced product's stock has been
    /// decremented. On any failure nothing is persisted and the caller's
    /// cart remains intact.
    pub async fn place_order(&self, request: PlaceOrder) -> Result<Order, OrderError> {
        let started = Instant::now();
        let result = self.place_order_inner(request).await;

        let outcome = match &result {
            Ok(_) => Ok(()),
            Err(error) => Err(failure_label(error)),
        };
        self.metrics
            .record_checkout(started.elapsed().as_secs_f64(), outcome);

        result
    }

    async fn place_order_inner(&self, request: PlaceOrder) -> Result<Order, OrderError> {
        if request.lines.is_empty() {
            return Err(OrderError::EmptyCart);
        }
        for line in &request.lines {
            if line.quantity < 1 {
                return Err(OrderError::InvalidQuantity {
                    product_id: line.product_id,
                    quantity: line.quantity,
                });
            }
            if let Some(discount) = line.discount {
                let gross = line.unit_price * Decimal::from(line.quantity);
                if discount < Decimal::ZERO || discount > gross {
                    return Err(OrderError::InvalidDiscount {
                        product_id: line.product_id,
                    });
                }
            }
        }

        let method = PaymentMethod::parse(&request.payment_method)
            .ok_or_else(|| OrderError::UnknownPaymentMethod(request.payment_method.clone()))?;

        // Snapshot name/SKU from the catalog and pre-check stock so obviously
        // doomed checkouts are rejected before any write. The store's guarded
        // decrement re-checks at commit, which is what holds under
        // concurrency.
        let mut items = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let product = self
                .store
                .get_product(line.product_id)
                .await?
                .ok_or(OrderError::UnknownProduct(line.product_id))?;
            if product.stock_quantity < line.quantity {
                return Err(OrderError::InsufficientStock {
                    product_id: line.product_id,
                    requested: line.quantity,
                    available: product.stock_quantity,
                });
            }
            items.push(OrderItem {
                id: Uuid::new_v4(),
                product_id: line.product_id,
                product_name: product.name,
                sku: product.sku,
                unit_price: line.unit_price,
                quantity: line.quantity,
                discount: line.discount,
            });
        }

        let totals = OrderTotals::compute(&self.policy, &request.lines);

        let PlaceOrder {
            customer_id,
            lines,
            shipping_address,
            notes,
            ..
        } = request;

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let template = Order {
            id: order_id,
            order_number: OrderNumber::generate(now),
            customer_id,
            status: OrderStatus::Pending,
            subtotal: totals.subtotal,
            shipping: totals.shipping,
            tax: totals.tax,
            total: totals.total,
            shipping_address,
            items,
            payment: Some(Payment {
                id: Uuid::new_v4(),
                order_id,
                method,
                status: PaymentStatus::Pending,
                amount: totals.total,
                transaction_id: None,
                gateway: None,
                failure_reason: None,
                created_at: now,
                processed_at: None,
            }),
            notes,
            created_at: now,
            updated_at: now,
        };

        // The order number carries a random suffix; regenerate and retry on
        // a collision with the store's unique constraint.
        let placed = retry_on_transient(self.retry.clone(), |_attempt| {
            let store = Arc::clone(&self.store);
            let mut order = template.clone();
            async move {
                order.order_number = OrderNumber::generate(Utc::now());
                store.create_order(&order).await.map(|()| order)
            }
        })
        .await;

        match placed {
            RetryResult::Success(order) => {
                tracing::info!(
                    order_id = %order.id,
                    order_number = %order.order_number,
                    customer_id = %order.customer_id,
                    total = %order.total,
                    "order placed"
                );
                Ok(order)
            }
            RetryResult::Failed(_) => Err(OrderError::OrderNumberExhausted),
            RetryResult::PermanentFailure(StoreError::InsufficientStock(product_id)) => {
                let requested = lines
                    .iter()
                    .filter(|l| l.product_id == product_id)
                    .map(|l| l.quantity)
                    .sum();
                let available = self
                    .store
                    .get_product(product_id)
                    .await?
                    .map_or(0, |p| p.stock_quantity);
                Err(OrderError::InsufficientStock {
                    product_id,
                    requested,
                    available,
                })
            }
            RetryResult::PermanentFailure(error) => Err(error.into()),
        }
    }
}

fn failure_label(error: &OrderError) -> &'static str {
    match error {
        OrderError::EmptyCart => "empty_cart",
        OrderError::InvalidQuantity { .. } => "invalid_quantity",
        OrderError::InvalidDiscount { .. } => "invalid_discount",
        OrderError::UnknownProduct(_) => "unknown_product",
        OrderError::InsufficientStock { .. } => "insufficient_stock",
        OrderError::UnknownPaymentMethod(_) => "unknown_payment_method",
        OrderError::InvalidRefundAmount { .. } => "invalid_amount",
        OrderError::OrderNumberExhausted => "order_number_exhausted",
        OrderError::Store(_) => "store",
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
