//! Order and checkout core for a storefront back office.
//!
//! The presentation layer (catalog CRUD, admin screens, rendering) lives
//! elsewhere; this crate owns the parts with real invariants:
//!
//! - [`domain::order::CheckoutService`] turns a validated cart into an
//!   order, its line-item snapshots and a pending payment, atomically, and
//!   decrements stock at placement.
//! - [`domain::order::OrderLifecycle`] enforces the status transition table
//!   and runs the compensation tied to each transition: stock restoration
//!   and refunds on cancellation.
//! - [`store::OrderStore`] is the transactional persistence seam, with a
//!   PostgreSQL implementation and an in-memory one for tests and demos.

pub mod config;
pub mod domain;
pub mod metrics;
pub mod store;
pub mod utils;
