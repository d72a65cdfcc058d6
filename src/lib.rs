//! Load/store vectorization pass for a typed, SSA-form, three-address IR
//! targeting GPU-like architectures.
//!
//! Rewrites groups of scalar memory accesses to consecutive addresses into
//! a single wider vector memory access. [`Vectorizer::run`] is the entry
//! point; it consumes one basic-block-preserving, single-function mutation
//! pass driven by the external analysis oracles in [`oracles`].
//!
//! ```text
//! Collector -> ChainBuilder -> Legalizer -> LegalityChecker -> Rewriter
//! ```
//!
//! See `DESIGN.md` for how each module is grounded against its reference
//! implementation and `SPEC_FULL.md` for the full requirements this crate
//! implements.

pub mod chain;
pub mod collector;
pub mod consecutive;
pub mod driver;
pub mod error;
pub mod ir;
pub mod legality;
pub mod legalize;
pub mod oracles;
pub mod probe;
pub mod rewrite;
pub mod stats;

pub use driver::Vectorizer;
pub use error::{Result, VectorizeError};
pub use oracles::Context;
