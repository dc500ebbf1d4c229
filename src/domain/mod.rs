// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Domain-specific models and services, separate from the persistence
// infrastructure. The order domain carries everything with real invariants
// in this system: checkout, the status state machine, stock compensation
// and refunds.
//
// ============================================================================

pub mod order;
