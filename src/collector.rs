//! 4.C Collector — per-block, group eligible loads and stores by
//! underlying base object.

use crate::ir::{get_underlying_object, BlockId, Function, ScalarKind, ValueId};
use crate::oracles::{DataLayout, TargetTransformInfo};
use crate::probe;
use rustc_hash::FxHashMap;

/// Ordered-by-program-order memory ops keyed by underlying base object.
#[derive(Debug, Default, Clone)]
pub struct PerObjectBundle {
    pub ops: FxHashMap<ValueId, Vec<ValueId>>,
}

impl PerObjectBundle {
    fn push(&mut self, base: ValueId, op: ValueId) {
        self.ops.entry(base).or_default().push(op);
    }
}

fn eligible_scalar_element(ty: &crate::ir::Type) -> bool {
    match ty.scalar_element() {
        ScalarKind::Int(bits) | ScalarKind::Float(bits) => bits >= 8,
        ScalarKind::Ptr(_) => true,
    }
}

/// §4.C eligibility: simple, a valid vector element type, wide enough,
/// narrow enough to leave headroom for combining, and — if the accessed
/// type is itself a vector — every user is a constant-indexed lane
/// extraction.
fn is_eligible(f: &Function, inst: ValueId, layout: &dyn DataLayout, tti: &dyn TargetTransformInfo) -> bool {
    let instr = f.get(inst);
    if !instr.is_simple() {
        return false;
    }
    if !eligible_scalar_element(&instr.ty) {
        return false;
    }
    let bit_size = layout.type_size_in_bits(&instr.ty);
    if bit_size < 8 {
        return false;
    }
    let Some(p) = probe::probe(f, inst) else {
        return false;
    };
    let vec_reg_bits = tti.vec_reg_bit_width(p.address_space);
    if bit_size > vec_reg_bits / 2 {
        return false;
    }
    if instr.ty.is_vector() {
        for user in f.users_of(inst) {
            match &f.get(user).kind {
                crate::ir::InstKind::ExtractElement { lane: _, .. } => {}
                _ => return false,
            }
        }
    }
    true
}

pub struct Collector<'a> {
    pub layout: &'a dyn DataLayout,
    pub tti: &'a dyn TargetTransformInfo,
}

impl<'a> Collector<'a> {
    pub fn new(layout: &'a dyn DataLayout, tti: &'a dyn TargetTransformInfo) -> Self {
        Self { layout, tti }
    }

    /// Returns `(loads, stores)` bundles for `block`, in program order.
    pub fn collect(&self, f: &Function, block: BlockId) -> (PerObjectBundle, PerObjectBundle) {
        let mut loads = PerObjectBundle::default();
        let mut stores = PerObjectBundle::default();
        for &inst in &f.block(block).instructions {
            let instr = f.get(inst);
            if !instr.is_memory_op() {
                continue;
            }
            if !is_eligible(f, inst, self.layout, self.tti) {
                continue;
            }
            let Some(p) = probe::probe(f, inst) else {
                continue;
            };
            let base = get_underlying_object(f, p.ptr);
            if instr.is_load() {
                loads.push(base, inst);
            } else {
                stores.push(base, inst);
            }
        }
        (loads, stores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Function, GepIndex, InstKind, ScalarKind, Type};
    use crate::oracles::TargetProfile;
    use smallvec::SmallVec;

    #[test]
    fn collects_loads_grouped_by_base_in_program_order() {
        let mut f = Function::new();
        let bb = f.add_block();
        let base = f.push(bb, InstKind::Alloca { address_space: 0, align: 0 }, Type::Scalar(ScalarKind::Ptr(0)));
        let gep0 = f.push(
            bb,
            InstKind::Gep { base, indices: SmallVec::from_slice(&[GepIndex::Const(0)]), elem_size: 4, inbounds: true },
            Type::Scalar(ScalarKind::Ptr(0)),
        );
        let gep1 = f.push(
            bb,
            InstKind::Gep { base, indices: SmallVec::from_slice(&[GepIndex::Const(1)]), elem_size: 4, inbounds: true },
            Type::Scalar(ScalarKind::Ptr(0)),
        );
        let load0 = f.push(bb, InstKind::Load { ptr: gep0, align: 4, simple: true }, Type::Scalar(ScalarKind::Int(32)));
        let load1 = f.push(bb, InstKind::Load { ptr: gep1, align: 4, simple: true }, Type::Scalar(ScalarKind::Int(32)));

        let tti = TargetProfile::default();
        let collector = Collector::new(&tti, &tti);
        let (loads, stores) = collector.collect(&f, bb);
        assert!(stores.ops.is_empty());
        assert_eq!(loads.ops.get(&base).unwrap(), &vec![load0, load1]);
    }

    #[test]
    fn rejects_non_simple_atomic_load() {
        let mut f = Function::new();
        let bb = f.add_block();
        let base = f.push(bb, InstKind::Alloca { address_space: 0, align: 0 }, Type::Scalar(ScalarKind::Ptr(0)));
        f.push(bb, InstKind::Load { ptr: base, align: 4, simple: false }, Type::Scalar(ScalarKind::Int(32)));

        let tti = TargetProfile::default();
        let collector = Collector::new(&tti, &tti);
        let (loads, _) = collector.collect(&f, bb);
        assert!(loads.ops.is_empty());
    }

    #[test]
    fn rejects_type_wider_than_half_vector_register() {
        let mut f = Function::new();
        let bb = f.add_block();
        // default vec reg width is 128 bits; a 128-bit scalar leaves no
        // headroom to combine with even one more and must be rejected.
        let base = f.push(bb, InstKind::Alloca { address_space: 0, align: 0 }, Type::Scalar(ScalarKind::Ptr(0)));
        f.push(
            bb,
            InstKind::Load { ptr: base, align: 16, simple: true },
            Type::Scalar(ScalarKind::Int(128)),
        );

        let tti = TargetProfile::default();
        let collector = Collector::new(&tti, &tti);
        let (loads, _) = collector.collect(&f, bb);
        assert!(loads.ops.is_empty());
    }

    #[test]
    fn vector_load_requires_constant_index_extraction_users() {
        let mut f = Function::new();
        let bb = f.add_block();
        let base = f.push(bb, InstKind::Alloca { address_space: 0, align: 0 }, Type::Scalar(ScalarKind::Ptr(0)));
        let load = f.push(
            bb,
            InstKind::Load { ptr: base, align: 8, simple: true },
            Type::Vector { element: ScalarKind::Int(16), lanes: 2 },
        );
        // A generic (non-extraction) user disqualifies the vector load.
        f.push(
            bb,
            InstKind::Generic { operands: SmallVec::from_slice(&[load]), side_effecting: false },
            Type::Scalar(ScalarKind::Int(32)),
        );

        let tti = TargetProfile::default();
        let collector = Collector::new(&tti, &tti);
        let (loads, _) = collector.collect(&f, bb);
        assert!(loads.ops.is_empty());
    }
}
