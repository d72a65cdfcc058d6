//! 4.H Driver — orchestrates Collector → ChainBuilder → (Legalizer +
//! LegalityChecker) → Rewriter over every basic block, loads then stores.

use crate::chain::{self, CHUNK_SIZE};
use crate::collector::Collector;
use crate::consecutive::ConsecutivityOracle;
use crate::error::Result;
use crate::ir::{BlockId, Function, ValueId};
use crate::legality::LegalityChecker;
use crate::legalize::Legalizer;
use crate::oracles::Context;
use crate::rewrite::Rewriter;
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

pub struct Vectorizer {
    pub chunk_size: usize,
    pub legalizer: Legalizer,
}

impl Default for Vectorizer {
    fn default() -> Self {
        Self { chunk_size: CHUNK_SIZE, legalizer: Legalizer::default() }
    }
}

impl Vectorizer {
    pub fn new(chunk_size: usize, legalizer: Legalizer) -> Self {
        Self { chunk_size, legalizer }
    }

    /// Entry point. Returns whether any change was made. A function marked
    /// "no implicit float" is returned unchanged (§4.H, §8 invariant 5).
    pub fn run(&self, f: &mut Function, ctx: &Context) -> Result<bool> {
        if f.no_implicit_float {
            trace!("no_implicit_float set, skipping function");
            return Ok(false);
        }

        let blocks: Vec<BlockId> = post_order(f).into_iter().collect();
        let mut changed = false;
        for block in blocks {
            changed |= self.run_on_block(f, ctx, block)?;
        }
        Ok(changed)
    }

    fn run_on_block(&self, f: &mut Function, ctx: &Context, block: BlockId) -> Result<bool> {
        debug!(?block, "vectorizing block");
        let mut changed = false;

        let collector = Collector::new(ctx.layout, ctx.tti);
        let (loads, stores) = collector.collect(f, block);

        for (_, bundle) in loads.ops {
            changed |= self.run_on_bundle(f, ctx, &bundle, true)?;
        }
        for (_, bundle) in stores.ops {
            changed |= self.run_on_bundle(f, ctx, &bundle, false)?;
        }
        Ok(changed)
    }

    fn run_on_bundle(&self, f: &mut Function, ctx: &Context, bundle: &[ValueId], is_load: bool) -> Result<bool> {
        let oracle = ConsecutivityOracle::new(ctx);
        let checker = LegalityChecker::new(ctx);
        let mut changed = false;

        let mut already_vectorized: FxHashSet<ValueId> = FxHashSet::default();
        for raw_chunk in bundle.chunks(self.chunk_size) {
            let graph = chain::ChunkGraph::build(raw_chunk, |a, b| oracle.consecutive(f, a, b));
            for start in graph.chain_starts() {
                let candidate_chain = graph.follow(raw_chunk, start, &already_vectorized);
                if candidate_chain.len() < 2 {
                    continue;
                }

                for group in self.legalizer.legalize(f, ctx, &candidate_chain) {
                    if !checker.check(f, &group.members)? {
                        trace!(members = group.members.len(), "chain rejected by legality checker");
                        continue;
                    }
                    trace!(members = group.members.len(), is_load, "rewriting chain");
                    if is_load {
                        Rewriter::rewrite_loads(f, &group);
                    } else {
                        Rewriter::rewrite_stores(f, &group);
                    }
                    already_vectorized.extend(group.members.iter().copied());
                    changed = true;
                }
            }
        }
        Ok(changed)
    }
}

/// Post-order walk of the CFG from the entry block (§4.H: "so dominator
/// guarantees used by ConsecutivityOracle's known-bits probe hold
/// consistently"). Unreachable blocks (no path from the entry) are visited
/// last, in declaration order, so every block is still processed exactly
/// once.
fn post_order(f: &Function) -> Vec<BlockId> {
    let Some(entry) = f.blocks().first().map(|b| b.id) else {
        return Vec::new();
    };
    let mut visited = FxHashSet::default();
    let mut order = Vec::new();
    post_order_visit(f, entry, &mut visited, &mut order);
    for block in f.blocks() {
        if !visited.contains(&block.id) {
            post_order_visit(f, block.id, &mut visited, &mut order);
        }
    }
    order
}

fn post_order_visit(f: &Function, block: BlockId, visited: &mut FxHashSet<BlockId>, order: &mut Vec<BlockId>) {
    if !visited.insert(block) {
        return;
    }
    for succ in f.successors(block) {
        post_order_visit(f, succ, visited, order);
    }
    order.push(block);
}
