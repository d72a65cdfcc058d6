//! Pass-local error type (§7).
//!
//! Every ordinary rejection — ineligibility, unprovable consecutivity,
//! aliasing, infeasible shape/alignment — is expressed by a component
//! returning `false`/`None`/an empty chain, never by `Err`. `VectorizeError`
//! exists only for the one category §7 calls a programming error: a host
//! invariant the pass assumed and found violated (a chain member that
//! isn't actually an `Instruction` in the function, a memory op with no
//! pointer operand reaching a stage that requires one, an out-of-range
//! chunk index). When that happens the pass halts rather than guessing.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VectorizeError {
    #[error("host invariant violated: {0}")]
    HostInvariant(String),
}

pub type Result<T> = std::result::Result<T, VectorizeError>;
