//! Stress testing for the ledger core.
//!
//! A mirror model executes the same balance rules as production and checks
//! the conservation and bounds invariants after every operation; generated
//! and seeded operation sequences then hammer both the model and the real
//! service layer.

mod generators;
mod model;
mod tests;

pub use model::{LedgerModel, OpResult, Operation};
