//! 4.E LegalityChecker — verify nothing between the chain's first and last
//! members forbids sinking every member down to the last member's position.

use crate::consecutive::peel_constant_offset;
use crate::error::{Result, VectorizeError};
use crate::ir::{get_underlying_object, Function, ValueId};
use crate::oracles::{Context, MemLoc};
use crate::probe;
use rustc_hash::FxHashSet;

fn mem_loc(f: &Function, inst: ValueId, ctx: &Context) -> Result<MemLoc> {
    let p = probe::probe(f, inst)
        .ok_or_else(|| VectorizeError::HostInvariant(format!("{:?} is not a memory op", inst)))?;
    let base = get_underlying_object(f, p.ptr);
    let (peeled, offset) = peel_constant_offset(f, p.ptr);
    let offset = if peeled == base { Some(offset) } else { None };
    let size = ctx.layout.type_store_size(&f.get(inst).ty);
    Ok(MemLoc { base, offset, size })
}

pub struct LegalityChecker<'a> {
    ctx: &'a Context<'a>,
}

impl<'a> LegalityChecker<'a> {
    pub fn new(ctx: &'a Context<'a>) -> Self {
        Self { ctx }
    }

    /// `chain` must be non-empty, all members in the same block, in
    /// ascending program order (the shape `ChainBuilder` produces).
    pub fn check(&self, f: &Function, chain: &[ValueId]) -> Result<bool> {
        let first = *chain.first().ok_or_else(|| VectorizeError::HostInvariant("empty chain".into()))?;
        let last = *chain.last().unwrap();
        let block = f
            .block_of(first)
            .ok_or_else(|| VectorizeError::HostInvariant(format!("{:?} has no containing block", first)))?;
        let first_pos = f
            .position_in_block(first)
            .ok_or_else(|| VectorizeError::HostInvariant(format!("{:?} not found in its block", first)))?;
        let last_pos = f
            .position_in_block(last)
            .ok_or_else(|| VectorizeError::HostInvariant(format!("{:?} not found in its block", last)))?;

        let chain_set: FxHashSet<ValueId> = chain.iter().copied().collect();
        let instrs = &f.block(block).instructions;

        let mut others: Vec<(usize, ValueId)> = Vec::new();
        for pos in first_pos..last_pos {
            let v = instrs[pos];
            let instr = f.get(v);
            if instr.has_side_effects() {
                return Ok(false);
            }
            if instr.is_memory_op() && !chain_set.contains(&v) {
                others.push((pos, v));
            }
        }

        for &(m_pos, m) in &others {
            let m_instr = f.get(m);
            for &c in chain {
                let c_pos = f
                    .position_in_block(c)
                    .ok_or_else(|| VectorizeError::HostInvariant(format!("{:?} not found in its block", c)))?;
                let c_instr = f.get(c);

                if c_instr.is_load() && m_instr.is_load() {
                    continue;
                }
                if c_instr.is_store() && m_instr.is_load() && c_pos < m_pos {
                    continue;
                }
                if c_instr.is_load() && m_instr.is_store() && c_pos > m_pos {
                    continue;
                }

                let c_loc = mem_loc(f, c, self.ctx)?;
                let m_loc = mem_loc(f, m, self.ctx)?;
                if !self.ctx.alias.no_alias(c_loc, m_loc) {
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Function, InstKind, ScalarKind, Type};
    use crate::oracles::{AffineScalarEvolution, CfgDominatorTree, ConstantKnownBits, RangeAliasOracle, TargetProfile};

    fn ctx<'a>(
        alias: &'a RangeAliasOracle,
        scev: &'a AffineScalarEvolution,
        dom: &'a CfgDominatorTree,
        tti: &'a TargetProfile,
        kb: &'a ConstantKnownBits,
    ) -> Context<'a> {
        Context { alias, scev, dom, tti, layout: tti, known_bits: kb }
    }

    /// S6: `store a[0]; call @may_write(); store a[1];` is rejected because
    /// the side-effecting call sits inside the chain's range.
    #[test]
    fn side_effecting_call_in_range_rejects_chain() {
        let mut f = Function::new();
        let bb = f.add_block();
        let base = f.push(bb, InstKind::Alloca { address_space: 0, align: 0 }, Type::Scalar(ScalarKind::Ptr(0)));
        let val = f.push(bb, InstKind::Const(1), Type::Scalar(ScalarKind::Int(32)));
        let store0 = f.push(
            bb,
            InstKind::Store { ptr: base, value: val, align: 4, simple: true },
            Type::Scalar(ScalarKind::Int(32)),
        );
        f.push(bb, InstKind::Call { side_effecting: true }, Type::Scalar(ScalarKind::Int(32)));
        let store1 = f.push(
            bb,
            InstKind::Store { ptr: base, value: val, align: 4, simple: true },
            Type::Scalar(ScalarKind::Int(32)),
        );

        let alias = RangeAliasOracle;
        let scev = AffineScalarEvolution;
        let dom = CfgDominatorTree::build(&f);
        let tti = TargetProfile::default();
        let kb = ConstantKnownBits;
        let c = ctx(&alias, &scev, &dom, &tti, &kb);
        let checker = LegalityChecker::new(&c);
        let chain = vec![store0, store1];
        assert_eq!(checker.check(&f, &chain).unwrap(), false);
    }

    #[test]
    fn unrelated_non_aliasing_load_between_stores_is_safe() {
        let mut f = Function::new();
        let bb = f.add_block();
        let base = f.push(bb, InstKind::Alloca { address_space: 0, align: 0 }, Type::Scalar(ScalarKind::Ptr(0)));
        let other = f.push(bb, InstKind::Alloca { address_space: 0, align: 0 }, Type::Scalar(ScalarKind::Ptr(0)));
        let val = f.push(bb, InstKind::Const(1), Type::Scalar(ScalarKind::Int(32)));
        let store0 = f.push(
            bb,
            InstKind::Store { ptr: base, value: val, align: 4, simple: true },
            Type::Scalar(ScalarKind::Int(32)),
        );
        f.push(bb, InstKind::Load { ptr: other, align: 4, simple: true }, Type::Scalar(ScalarKind::Int(32)));
        let store1 = f.push(
            bb,
            InstKind::Store { ptr: base, value: val, align: 4, simple: true },
            Type::Scalar(ScalarKind::Int(32)),
        );

        let alias = RangeAliasOracle;
        let scev = AffineScalarEvolution;
        let dom = CfgDominatorTree::build(&f);
        let tti = TargetProfile::default();
        let kb = ConstantKnownBits;
        let c = ctx(&alias, &scev, &dom, &tti, &kb);
        let checker = LegalityChecker::new(&c);
        let chain = vec![store0, store1];
        assert_eq!(checker.check(&f, &chain).unwrap(), true);
    }

    #[test]
    fn possibly_aliasing_store_between_loads_rejects_chain() {
        let mut f = Function::new();
        let bb = f.add_block();
        let base = f.push(bb, InstKind::Alloca { address_space: 0, align: 0 }, Type::Scalar(ScalarKind::Ptr(0)));
        let val = f.push(bb, InstKind::Const(1), Type::Scalar(ScalarKind::Int(32)));
        let load0 = f.push(bb, InstKind::Load { ptr: base, align: 4, simple: true }, Type::Scalar(ScalarKind::Int(32)));
        // Same base and offset as both loads: RangeAliasOracle answers
        // MustAlias, which is rejected exactly like MayAlias would be.
        f.push(
            bb,
            InstKind::Store { ptr: base, value: val, align: 4, simple: true },
            Type::Scalar(ScalarKind::Int(32)),
        );
        let load1 = f.push(bb, InstKind::Load { ptr: base, align: 4, simple: true }, Type::Scalar(ScalarKind::Int(32)));

        let alias = RangeAliasOracle;
        let scev = AffineScalarEvolution;
        let dom = CfgDominatorTree::build(&f);
        let tti = TargetProfile::default();
        let kb = ConstantKnownBits;
        let c = ctx(&alias, &scev, &dom, &tti, &kb);
        let checker = LegalityChecker::new(&c);
        let chain = vec![load0, load1];
        assert_eq!(checker.check(&f, &chain).unwrap(), false);
    }
}
