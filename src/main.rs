use rust_decimal::Decimal;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use orderhub::config::Config;
use orderhub::domain::order::{
    CartLine, CheckoutService, OrderLifecycle, OrderStatus, PlaceOrder, Product, ShippingAddress,
};
use orderhub::metrics::{self, Metrics};
use orderhub::store::{MemoryOrderStore, OrderStore, PgOrderStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,orderhub=debug")),
        )
        .init();

    tracing::info!("starting orderhub");

    let config = Config::load();

    // === 1. Initialize Prometheus metrics ===
    let app_metrics = Arc::new(Metrics::new()?);

    // Start metrics HTTP server in background thread
    let metrics_registry = Arc::new(app_metrics.registry().clone());
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!("failed to start metrics runtime: {}", e);
                return;
            }
        };
        rt.block_on(async {
            if let Err(e) = metrics::start_metrics_server(metrics_registry, metrics_port).await {
                tracing::error!("metrics server error: {}", e);
            }
        });
    });

    // === 2. Pick the store: Postgres when configured, in-memory otherwise ===
    let database_url = config.database_url.clone();
    match database_url {
        Some(url) => {
            tracing::info!("connecting to PostgreSQL");
            let store = PgOrderStore::connect(&url).await?;
            store.ensure_schema().await?;
            run_demo(Arc::new(store), config, app_metrics).await
        }
        None => {
            tracing::info!("DATABASE_URL not set, using the in-memory store");
            run_demo(Arc::new(MemoryOrderStore::new()), config, app_metrics).await
        }
    }
}

/// Walk one order through its whole lifecycle so a fresh checkout of the
/// repository has something observable to run.
async fn run_demo<S: OrderStore>(
    store: Arc<S>,
    config: Config,
    app_metrics: Arc<Metrics>,
) -> anyhow::Result<()> {
    let checkout = CheckoutService::new(store.clone(), config.pricing, app_metrics.clone());
    let lifecycle = OrderLifecycle::new(store.clone(), app_metrics);

    // Seed a product to sell.
    let product = Product {
        id: Uuid::new_v4(),
        name: "Espresso Grinder".to_string(),
        sku: "GRIND-64".to_string(),
        price: Decimal::new(2500, 2),
        stock_quantity: 25,
    };
    store.upsert_product(&product).await?;

    // Place an order.
    let order = checkout
        .place_order(PlaceOrder {
            customer_id: Uuid::new_v4(),
            lines: vec![CartLine {
                product_id: product.id,
                quantity: 2,
                unit_price: product.price,
                discount: None,
            }],
            shipping_address: ShippingAddress {
                recipient: "Sample Customer".to_string(),
                line1: "42 Demo Street".to_string(),
                line2: None,
                city: "Springfield".to_string(),
                state: "IL".to_string(),
                postal_code: "62701".to_string(),
                country: "US".to_string(),
                phone: None,
            },
            payment_method: "Credit Card".to_string(),
            notes: Some("leave at the door".to_string()),
        })
        .await?;
    tracing::info!(order_number = %order.order_number, total = %order.total, "order placed");

    // The gateway confirms the payment.
    lifecycle
        .record_payment_result(order.id, true, Some("demo-tx-0001"), None)
        .await?;

    // Fulfilment picks it up...
    lifecycle
        .update_status(order.id, OrderStatus::Processing, None, None)
        .await?;

    // ...but the customer changes their mind: stock comes back and the
    // completed payment is refunded, atomically.
    let cancelled = lifecycle
        .cancel_order(order.id, "customer request", None)
        .await?;
    tracing::info!(cancelled = cancelled, "cancellation handled");

    let remaining = store.get_product(product.id).await?.map(|p| p.stock_quantity);
    tracing::info!(stock = ?remaining, "stock after cancellation");

    let stats = lifecycle.order_statistics().await?;
    tracing::info!(
        total_orders = stats.total_orders,
        needs_attention = stats.needs_attention,
        average_order_value = %stats.average_order_value,
        "statistics snapshot"
    );

    Ok(())
}
