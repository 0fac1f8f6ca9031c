//! Application layer orchestrating the domain through its ports.
//!
//! [`engine::CommissionEngine`] is the single entry point. Its operations are
//! split by concern: the payment trigger in [`calculator`], calculation
//! transitions in [`lifecycle`], batches in [`batches`], payment documents in
//! [`documents`], rule/band/salesperson setup in [`catalog`] and read-only
//! rollups in [`statistics`].

pub mod batches;
pub mod calculator;
pub mod catalog;
pub mod documents;
pub mod engine;
pub mod lifecycle;
pub mod locks;
pub mod matcher;
pub mod statistics;
