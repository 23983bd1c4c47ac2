//! Implementation of the heuristic optimizer.
//!
//! The heuristic optimizer rewrites a query tree by running an ordered list of stages. A stage is
//! either a single rule applied once, or a batch of rules applied round after round until some
//! condition is met, e.g. max number of iterations or reached fixed point. The implementation is
//! heavily inspired by [apache calcite](https://github.com/apache/calcite)'s HepPlanner.

mod optimizer;
pub use optimizer::*;
