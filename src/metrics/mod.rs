// Private module declaration
mod server;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Counts the order lifecycle as it happens:
// - checkouts (attempted, succeeded, rejected for stock) and their latency
// - status transitions, including rejected ones
// - cancellations and refunds
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Central metrics registry for the order core.
pub struct Metrics {
    registry: Registry,

    // Checkout Metrics
    pub orders_placed: IntCounter,
    pub checkout_failures: IntCounterVec,
    pub checkout_duration: Histogram,

    // Lifecycle Metrics
    pub status_transitions: IntCounterVec,
    pub rejected_transitions: IntCounterVec,
    pub orders_cancelled: IntCounter,

    // Payment Metrics
    pub refunds_processed: IntCounter,
    pub payment_results: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_placed = IntCounter::new("orders_placed_total", "Orders successfully placed")?;
        registry.register(Box::new(orders_placed.clone()))?;

        let checkout_failures = IntCounterVec::new(
            Opts::new("checkout_failures_total", "Checkouts rejected or failed"),
            &["reason"],
        )?;
        registry.register(Box::new(checkout_failures.clone()))?;

        let checkout_duration = Histogram::with_opts(
            HistogramOpts::new("checkout_duration_seconds", "Time spent placing an order")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(checkout_duration.clone()))?;

        let status_transitions = IntCounterVec::new(
            Opts::new("order_status_transitions_total", "Applied order status transitions"),
            &["from", "to"],
        )?;
        registry.register(Box::new(status_transitions.clone()))?;

        let rejected_transitions = IntCounterVec::new(
            Opts::new(
                "order_rejected_transitions_total",
                "Status transitions refused by the transition table",
            ),
            &["from", "to"],
        )?;
        registry.register(Box::new(rejected_transitions.clone()))?;

        let orders_cancelled = IntCounter::new("orders_cancelled_total", "Orders cancelled")?;
        registry.register(Box::new(orders_cancelled.clone()))?;

        let refunds_processed = IntCounter::new("refunds_processed_total", "Refunds recorded")?;
        registry.register(Box::new(refunds_processed.clone()))?;

        let payment_results = IntCounterVec::new(
            Opts::new("payment_results_total", "Payment attempts recorded"),
            &["outcome"],
        )?;
        registry.register(Box::new(payment_results.clone()))?;

        Ok(Self {
            registry,
            orders_placed,
            checkout_failures,
            checkout_duration,
            status_transitions,
            rejected_transitions,
            orders_cancelled,
            refunds_processed,
            payment_results,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Helper to record a finished checkout attempt
    pub fn record_checkout(&self, duration_secs: f64, outcome: Result<(), &str>) {
        match outcome {
            Ok(()) => self.orders_placed.inc(),
            Err(reason) => self.checkout_failures.with_label_values(&[reason]).inc(),
        }
        self.checkout_duration.observe(duration_secs);
    }

    /// Helper to record a status transition attempt
    pub fn record_transition(&self, from: &str, to: &str, applied: bool) {
        if applied {
            self.status_transitions.with_label_values(&[from, to]).inc();
        } else {
            self.rejected_transitions.with_label_values(&[from, to]).inc();
        }
    }

    /// Helper to record the gateway's answer for a pending payment
    pub fn record_payment_result(&self, success: bool) {
        let outcome = if success { "completed" } else { "failed" };
        self.payment_results.with_label_values(&[outcome]).inc();
    }
}
