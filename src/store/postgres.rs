use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::order::{
    Order, OrderItem, OrderNumber, OrderStatistics, OrderStatus, Payment, PaymentMethod,
    PaymentStatus, Product, ShippingAddress, StatWindows, StatusBucket,
};

use super::{OrderStore, RefundRequest, StoreError};

// ============================================================================
// PostgreSQL Order Store
// ============================================================================
//
// The production store. Every mutating method runs inside one transaction;
// guards are expressed as conditional UPDATEs so concurrent writers are
// serialized by the database:
//
// - stock decrement: `... SET stock_quantity = stock_quantity - $n
//   WHERE ... AND stock_quantity >= $n` (two checkouts can never drive a
//   product negative)
// - status change: compare-and-swap on the expected current status
// - refund: compare-and-swap on the payment being `completed`
//
// Order-number uniqueness is a real unique constraint; the resulting
// violation surfaces as `StoreError::OrderNumberTaken` for the checkout
// retry loop.
//
// ============================================================================

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    id              UUID PRIMARY KEY,
    name            TEXT NOT NULL,
    sku             TEXT NOT NULL,
    price           NUMERIC(12,2) NOT NULL,
    stock_quantity  INTEGER NOT NULL CHECK (stock_quantity >= 0)
);

CREATE TABLE IF NOT EXISTS shipping_addresses (
    id          UUID PRIMARY KEY,
    recipient   TEXT NOT NULL,
    line1       TEXT NOT NULL,
    line2       TEXT,
    city        TEXT NOT NULL,
    state       TEXT NOT NULL,
    postal_code TEXT NOT NULL,
    country     TEXT NOT NULL,
    phone       TEXT
);

CREATE TABLE IF NOT EXISTS orders (
    id                  UUID PRIMARY KEY,
    order_number        TEXT NOT NULL UNIQUE,
    customer_id         UUID NOT NULL,
    status              TEXT NOT NULL,
    subtotal            NUMERIC(12,2) NOT NULL,
    shipping            NUMERIC(12,2) NOT NULL,
    tax                 NUMERIC(12,2) NOT NULL,
    total               NUMERIC(12,2) NOT NULL,
    shipping_address_id UUID NOT NULL REFERENCES shipping_addresses(id),
    notes               TEXT,
    created_at          TIMESTAMPTZ NOT NULL,
    updated_at          TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS order_items (
    id           UUID PRIMARY KEY,
    order_id     UUID NOT NULL REFERENCES orders(id),
    product_id   UUID NOT NULL REFERENCES products(id),
    product_name TEXT NOT NULL,
    sku          TEXT NOT NULL,
    unit_price   NUMERIC(12,2) NOT NULL,
    quantity     INTEGER NOT NULL CHECK (quantity >= 1),
    discount     NUMERIC(12,2)
);

CREATE TABLE IF NOT EXISTS payments (
    id             UUID PRIMARY KEY,
    order_id       UUID NOT NULL UNIQUE REFERENCES orders(id),
    method         TEXT NOT NULL,
    status         TEXT NOT NULL,
    amount         NUMERIC(12,2) NOT NULL CHECK (amount > 0),
    transaction_id TEXT UNIQUE,
    gateway        TEXT,
    failure_reason TEXT,
    created_at     TIMESTAMPTZ NOT NULL,
    processed_at   TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS idx_orders_status ON orders (status);
CREATE INDEX IF NOT EXISTS idx_orders_created_at ON orders (created_at);
"#;

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the tables and indexes if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        tracing::info!("database schema ensured");
        Ok(())
    }

    async fn hydrate_order(&self, row: PgRow) -> Result<Order, StoreError> {
        let mut order = order_from_row(&row)?;

        let item_rows = sqlx::query(
            "SELECT id, product_id, product_name, sku, unit_price, quantity, discount
             FROM order_items WHERE order_id = $1 ORDER BY id",
        )
        .bind(order.id)
        .fetch_all(&self.pool)
        .await?;
        for item_row in &item_rows {
            order.items.push(item_from_row(item_row)?);
        }

        let payment_row = sqlx::query(
            "SELECT id, order_id, method, status, amount, transaction_id, gateway,
                    failure_reason, created_at, processed_at
             FROM payments WHERE order_id = $1",
        )
        .bind(order.id)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(payment_row) = &payment_row {
            order.payment = Some(payment_from_row(payment_row)?);
        }

        Ok(order)
    }
}

const ORDER_SELECT: &str = "SELECT o.id, o.order_number, o.customer_id, o.status, o.subtotal,
        o.shipping, o.tax, o.total, o.notes, o.created_at, o.updated_at,
        a.recipient, a.line1, a.line2, a.city, a.state, a.postal_code, a.country, a.phone
 FROM orders o
 JOIN shipping_addresses a ON a.id = o.shipping_address_id";

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn upsert_product(&self, product: &Product) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO products (id, name, sku, price, stock_quantity)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO UPDATE SET
                 name = EXCLUDED.name,
                 sku = EXCLUDED.sku,
                 price = EXCLUDED.price,
                 stock_quantity = EXCLUDED.stock_quantity",
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.sku)
        .bind(product.price)
        .bind(product.stock_quantity)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_product(&self, product_id: Uuid) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query("SELECT id, name, sku, price, stock_quantity FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn create_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let address_id = Uuid::new_v4();
        let address = &order.shipping_address;
        sqlx::query(
            "INSERT INTO shipping_addresses
                 (id, recipient, line1, line2, city, state, postal_code, country, phone)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(address_id)
        .bind(&address.recipient)
        .bind(&address.line1)
        .bind(&address.line2)
        .bind(&address.city)
        .bind(&address.state)
        .bind(&address.postal_code)
        .bind(&address.country)
        .bind(&address.phone)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO orders
                 (id, order_number, customer_id, status, subtotal, shipping, tax, total,
                  shipping_address_id, notes, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(order.id)
        .bind(order.order_number.as_str())
        .bind(order.customer_id)
        .bind(order.status.as_str())
        .bind(order.subtotal)
        .bind(order.shipping)
        .bind(order.tax)
        .bind(order.total)
        .bind(address_id)
        .bind(&order.notes)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_conflict(e, order.id))?;

        for item in &order.items {
            sqlx::query(
                "INSERT INTO order_items
                     (id, order_id, product_id, product_name, sku, unit_price, quantity, discount)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(item.id)
            .bind(order.id)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(&item.sku)
            .bind(item.unit_price)
            .bind(item.quantity)
            .bind(item.discount)
            .execute(&mut *tx)
            .await?;

            // Guarded decrement: zero rows means the product is missing or
            // short on stock, and the whole checkout rolls back.
            let updated = sqlx::query(
                "UPDATE products SET stock_quantity = stock_quantity - $1
                 WHERE id = $2 AND stock_quantity >= $1",
            )
            .bind(item.quantity)
            .bind(item.product_id)
            .execute(&mut *tx)
            .await?;
            if updated.rows_affected() == 0 {
                return Err(StoreError::InsufficientStock(item.product_id));
            }
        }

        if let Some(payment) = &order.payment {
            sqlx::query(
                "INSERT INTO payments
                     (id, order_id, method, status, amount, transaction_id, gateway,
                      failure_reason, created_at, processed_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(payment.id)
            .bind(order.id)
            .bind(payment.method.as_str())
            .bind(payment.status.as_str())
            .bind(payment.amount)
            .bind(&payment.transaction_id)
            .bind(&payment.gateway)
            .bind(&payment.failure_reason)
            .bind(payment.created_at)
            .bind(payment.processed_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_conflict(e, order.id))?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!("{ORDER_SELECT} WHERE o.id = $1"))
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate_order(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_by_order_number(&self, number: &str) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!("{ORDER_SELECT} WHERE o.order_number = $1"))
            .bind(number)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate_order(row).await?)),
            None => Ok(None),
        }
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
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE orders SET status = $1, notes = COALESCE($2, notes), updated_at = $3
             WHERE id = $4 AND status = $5",
        )
        .bind(to.as_str())
        .bind(notes)
        .bind(Utc::now())
        .bind(order_id)
        .bind(from.as_str())
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Ok(false);
        }

        for (product_id, quantity) in restock {
            sqlx::query("UPDATE products SET stock_quantity = stock_quantity + $1 WHERE id = $2")
                .bind(quantity)
                .bind(product_id)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(refund) = refund {
            let refunded = sqlx::query(
                "UPDATE payments SET status = $1, failure_reason = $2, processed_at = $3
                 WHERE order_id = $4 AND status = $5",
            )
            .bind(PaymentStatus::Refunded.as_str())
            .bind(&refund.reason)
            .bind(Utc::now())
            .bind(order_id)
            .bind(PaymentStatus::Completed.as_str())
            .execute(&mut *tx)
            .await?;
            if refunded.rows_affected() == 0 {
                return Ok(false);
            }
        }

        tx.commit().await?;
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
        let updated = sqlx::query(
            "UPDATE payments SET
                 status = $1,
                 transaction_id = COALESCE($2, transaction_id),
                 failure_reason = COALESCE($3, failure_reason),
                 processed_at = COALESCE($4, processed_at)
             WHERE order_id = $5 AND status = $6",
        )
        .bind(new_status.as_str())
        .bind(transaction_id)
        .bind(reason)
        .bind(processed_at)
        .bind(order_id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(updated.rows_affected() > 0)
    }

    async fn delete_payment(&self, order_id: Uuid) -> Result<bool, StoreError> {
        let deleted = sqlx::query("DELETE FROM payments WHERE order_id = $1")
            .bind(order_id)
            .execute(&self.pool)
            .await?;
        Ok(deleted.rows_affected() > 0)
    }

    async fn order_statistics(&self, windows: &StatWindows) -> Result<OrderStatistics, StoreError> {
        let bucket_rows = sqlx::query(
            "SELECT status, COUNT(*) AS order_count, COALESCE(SUM(total), 0) AS revenue
             FROM orders GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_status = Vec::with_capacity(bucket_rows.len());
        for row in &bucket_rows {
            let status_raw: String = row.try_get("status")?;
            let status = parse_order_status(&status_raw)?;
            let count: i64 = row.try_get("order_count")?;
            by_status.push(StatusBucket {
                status,
                count: count as u64,
                revenue: row.try_get("revenue")?,
            });
        }

        let summary = sqlx::query(
            "SELECT
                 COALESCE(SUM(total) FILTER (WHERE created_at >= $1
                     AND status NOT IN ('cancelled', 'returned')), 0) AS revenue_today,
                 COALESCE(SUM(total) FILTER (WHERE created_at >= $2
                     AND status NOT IN ('cancelled', 'returned')), 0) AS revenue_this_week,
                 COALESCE(SUM(total) FILTER (WHERE created_at >= $3
                     AND status NOT IN ('cancelled', 'returned')), 0) AS revenue_this_month,
                 COALESCE(AVG(total), 0) AS average_order_value
             FROM orders",
        )
        .bind(windows.day_start)
        .bind(windows.week_start)
        .bind(windows.month_start)
        .fetch_one(&self.pool)
        .await?;

        let average: Decimal = summary.try_get("average_order_value")?;
        Ok(OrderStatistics::from_parts(
            by_status,
            summary.try_get("revenue_today")?,
            summary.try_get("revenue_this_week")?,
            summary.try_get("revenue_this_month")?,
            average.round_dp(2),
        ))
    }
}

// ============================================================================
// Row Mapping & Error Mapping
// ============================================================================

fn map_conflict(error: sqlx::Error, order_id: Uuid) -> StoreError {
    if let sqlx::Error::Database(db) = &error {
        if db.is_unique_violation() {
            match db.constraint() {
                Some("orders_order_number_key") => return StoreError::OrderNumberTaken,
                Some("payments_order_id_key") => return StoreError::DuplicatePayment(order_id),
                _ => {}
            }
        }
    }
    StoreError::Database(error)
}

fn parse_order_status(raw: &str) -> Result<OrderStatus, StoreError> {
    OrderStatus::parse(raw).ok_or_else(|| StoreError::Invalid(format!("order status {raw:?}")))
}

fn order_from_row(row: &PgRow) -> Result<Order, StoreError> {
    let status_raw: String = row.try_get("status")?;

    Ok(Order {
        id: row.try_get("id")?,
        order_number: OrderNumber(row.try_get("order_number")?),
        customer_id: row.try_get("customer_id")?,
        status: parse_order_status(&status_raw)?,
        subtotal: row.try_get("subtotal")?,
        shipping: row.try_get("shipping")?,
        tax: row.try_get("tax")?,
        total: row.try_get("total")?,
        shipping_address: ShippingAddress {
            recipient: row.try_get("recipient")?,
            line1: row.try_get("line1")?,
            line2: row.try_get("line2")?,
            city: row.try_get("city")?,
            state: row.try_get("state")?,
            postal_code: row.try_get("postal_code")?,
            country: row.try_get("country")?,
            phone: row.try_get("phone")?,
        },
        items: Vec::new(),
        payment: None,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn item_from_row(row: &PgRow) -> Result<OrderItem, StoreError> {
    Ok(OrderItem {
        id: row.try_get("id")?,
        product_id: row.try_get("product_id")?,
        product_name: row.try_get("product_name")?,
        sku: row.try_get("sku")?,
        unit_price: row.try_get("unit_price")?,
        quantity: row.try_get("quantity")?,
        discount: row.try_get("discount")?,
    })
}

fn payment_from_row(row: &PgRow) -> Result<Payment, StoreError> {
    let method_raw: String = row.try_get("method")?;
    let status_raw: String = row.try_get("status")?;

    Ok(Payment {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        method: PaymentMethod::from_stored(&method_raw)
            .ok_or_else(|| StoreError::Invalid(format!("payment method {method_raw:?}")))?,
        status: PaymentStatus::parse(&status_raw)
            .ok_or_else(|| StoreError::Invalid(format!("payment status {status_raw:?}")))?,
        amount: row.try_get("amount")?,
        transaction_id: row.try_get("transaction_id")?,
        gateway: row.try_get("gateway")?,
        failure_reason: row.try_get("failure_reason")?,
        created_at: row.try_get("created_at")?,
        processed_at: row.try_get("processed_at")?,
    })
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        sku: row.try_get("sku")?,
        price: row.try_get("price")?,
        stock_quantity: row.try_get("stock_quantity")?,
    })
}

// The transactional behavior above (rollback on guard failure, unique
// violation mapping, concurrent decrement serialization) requires a live
// PostgreSQL instance and is exercised by integration environments; the
// domain-level properties are covered against MemoryOrderStore, which shares
// the same guard semantics.
