use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

use crate::domain::order::PricingPolicy;

// ============================================================================
// Configuration - environment-driven, with logged defaults
// ============================================================================

pub struct Config {
    /// Postgres connection string; without it the in-memory store is used.
    pub database_url: Option<String>,
    pub metrics_port: u16,
    pub pricing: PricingPolicy,
}

impl Config {
    pub fn load() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").ok(),
            metrics_port: try_load("METRICS_PORT", "9090"),
            pricing: PricingPolicy {
                free_shipping_threshold: try_load("FREE_SHIPPING_THRESHOLD", "99"),
                flat_shipping_fee: try_load("FLAT_SHIPPING_FEE", "9.99"),
                tax_rate: try_load("TAX_RATE", "0.08"),
            },
        }
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    env::var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_defaults_match_storefront_policy() {
        let config = Config::load();
        assert_eq!(config.pricing.free_shipping_threshold, Decimal::from(99));
        assert_eq!(config.pricing.flat_shipping_fee, Decimal::new(999, 2));
        assert_eq!(config.pricing.tax_rate, Decimal::new(8, 2));
    }
}
