//! Process-wide counters (§6 Outputs): `vectorInstructions`,
//! `scalarsVectorized`. Global atomics rather than a struct threaded
//! through every call, since these are framed as process-wide rather than
//! per-invocation — the same role LLVM's `STATISTIC` macros play for its
//! passes. The two counters here are simple enough to be free functions
//! instead of a struct the caller has to thread through every component.

use std::sync::atomic::{AtomicUsize, Ordering};

static VECTOR_INSTRUCTIONS: AtomicUsize = AtomicUsize::new(0);
static SCALARS_VECTORIZED: AtomicUsize = AtomicUsize::new(0);

pub fn record_chain_vectorized(chain_len: usize) {
    VECTOR_INSTRUCTIONS.fetch_add(1, Ordering::Relaxed);
    SCALARS_VECTORIZED.fetch_add(chain_len, Ordering::Relaxed);
}

pub fn vector_instructions() -> usize {
    VECTOR_INSTRUCTIONS.load(Ordering::Relaxed)
}

pub fn scalars_vectorized() -> usize {
    SCALARS_VECTORIZED.load(Ordering::Relaxed)
}

/// Reset both counters. Exposed for test harnesses that run several
/// scenarios in one process and want counts scoped to just one of them;
/// a long-lived host process has no other reason to call this.
pub fn reset() {
    VECTOR_INSTRUCTIONS.store(0, Ordering::Relaxed);
    SCALARS_VECTORIZED.store(0, Ordering::Relaxed);
}
