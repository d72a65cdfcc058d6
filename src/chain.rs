//! 4.D ChainBuilder — from one bundle's ordered candidate list, find maximal
//! runs of pairwise-consecutive accesses.
//!
//! The consecutivity graph is rebuilt per chunk of at most 64 candidates
//! (§3: "transient per 64-op chunk"); chain membership is then read off by
//! following `succ` from each chain start. The graph itself doesn't depend
//! on which members have already been vectorized — only `follow` does,
//! since the driver rewrites one chain at a time and must stop a later
//! chain at the first member an earlier chain already consumed (§9
//! "already vectorized sentinel").

use crate::ir::ValueId;
use rustc_hash::FxHashSet;

/// The cost ceiling from §4.D: chains are only ever searched for within one
/// chunk at a time.
pub const CHUNK_SIZE: usize = 64;

/// The `succ`/Heads/Tails graph for one chunk (§4.D steps 1–2).
pub struct ChunkGraph {
    succ: Vec<Option<usize>>,
    tails: FxHashSet<usize>,
    heads: FxHashSet<usize>,
}

impl ChunkGraph {
    /// `consecutive(a, b)` should answer the same question as
    /// `ConsecutivityOracle::consecutive` for the two chunk members at
    /// positions `a` and `b`; taking it as a closure keeps this module
    /// decoupled from the oracle machinery for its own unit tests.
    pub fn build(chunk: &[ValueId], mut consecutive: impl FnMut(ValueId, ValueId) -> bool) -> Self {
        let n = chunk.len();
        let mut succ: Vec<Option<usize>> = vec![None; n];
        let mut heads = FxHashSet::default();
        let mut tails = FxHashSet::default();

        for i in 0..n {
            for j in (0..n).rev() {
                if i == j {
                    continue;
                }
                if !consecutive(chunk[i], chunk[j]) {
                    continue;
                }
                let accept = match succ[i] {
                    None => true,
                    Some(prev_j) => {
                        // Literal tie-break from §4.D/§9: reject the
                        // replacement candidate j if it comes from a
                        // backward scan step (j < i) or if it's no closer
                        // to i than the prior winner. This asymmetry is a
                        // preserved open question, not a bug.
                        !(j < i || (prev_j as i64 - i as i64).abs() > (prev_j as i64 - j as i64).abs())
                    }
                };
                if accept {
                    succ[i] = Some(j);
                    heads.insert(i);
                    tails.insert(j);
                }
            }
        }

        Self { succ, heads, tails }
    }

    /// Heads that are not also Tails, ascending by index — candidate chain
    /// starts (§4.D step 3).
    pub fn chain_starts(&self) -> Vec<usize> {
        let mut starts: Vec<usize> = self.heads.difference(&self.tails).copied().collect();
        starts.sort_unstable();
        starts
    }

    /// Follow `succ` from `start`, stopping at `⊥`, or at a member already
    /// present in `already_vectorized` (exclusive of that member).
    pub fn follow(&self, chunk: &[ValueId], start: usize, already_vectorized: &FxHashSet<ValueId>) -> Vec<ValueId> {
        let mut chain = Vec::new();
        let mut visited = FxHashSet::default();
        let mut cur = start;
        loop {
            if !visited.insert(cur) {
                break; // defensive cycle guard; the graph is not expected to cycle.
            }
            if already_vectorized.contains(&chunk[cur]) {
                break;
            }
            chain.push(chunk[cur]);
            match self.succ[cur] {
                Some(next) => cur = next,
                None => break,
            }
        }
        chain
    }
}

/// Build every chain in `bundle`, chunked at [`CHUNK_SIZE`]. Each returned
/// chain is handed to the caller (the driver) in order so it can rewrite
/// and update `already_vectorized` before the next chain in the same chunk
/// is followed.
pub fn chains_for_bundle(
    bundle: &[ValueId],
    mut consecutive: impl FnMut(ValueId, ValueId) -> bool,
    mut on_chain: impl FnMut(Vec<ValueId>, &mut FxHashSet<ValueId>),
) {
    let mut already_vectorized = FxHashSet::default();
    for chunk in bundle.chunks(CHUNK_SIZE) {
        let graph = ChunkGraph::build(chunk, &mut consecutive);
        for start in graph.chain_starts() {
            let chain = graph.follow(chunk, start, &already_vectorized);
            if chain.len() < 2 {
                continue;
            }
            on_chain(chain, &mut already_vectorized);
        }
    }
}
