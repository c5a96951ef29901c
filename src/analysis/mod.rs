//! Analysis modules.
//!
//! Pure computations over the result store.

pub mod aggregator;

pub use aggregator::*;
