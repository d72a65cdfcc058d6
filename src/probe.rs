//! 4.A PointerProbe — extract the pointer operand, address space, and
//! effective alignment from a memory op.

use crate::ir::{AddressSpace, Function, InstKind, ValueId};
use crate::oracles::DataLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerOperand {
    pub ptr: ValueId,
    pub address_space: AddressSpace,
}

/// `None` signals "not a memory op" (§4.A).
pub fn probe(f: &Function, inst: ValueId) -> Option<PointerOperand> {
    let instr = f.try_get(inst)?;
    let ptr = match &instr.kind {
        InstKind::Load { ptr, .. } | InstKind::Store { ptr, .. } => *ptr,
        _ => return None,
    };
    let address_space = match f.get(ptr).ty.scalar_element() {
        crate::ir::ScalarKind::Ptr(space) => space,
        _ => return None,
    };
    Some(PointerOperand { ptr, address_space })
}

/// The instruction's stated alignment if nonzero, else the ABI-natural
/// alignment of the accessed type (§4.A).
pub fn effective_alignment(f: &Function, layout: &dyn DataLayout, inst: ValueId) -> u32 {
    let instr = f.get(inst);
    let (stated, ty) = match &instr.kind {
        InstKind::Load { align, .. } => (*align, &instr.ty),
        InstKind::Store { align, .. } => (*align, &instr.ty),
        _ => return 0,
    };
    if stated != 0 {
        stated
    } else {
        layout.abi_type_alignment(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{InstKind, ScalarKind, Type};
    use crate::oracles::TargetProfile;

    #[test]
    fn probe_rejects_non_memory_op() {
        let mut f = Function::new();
        let bb = f.add_block();
        let c = f.push(bb, InstKind::Const(1), Type::Scalar(ScalarKind::Int(32)));
        assert!(probe(&f, c).is_none());
    }

    #[test]
    fn probe_extracts_pointer_and_address_space() {
        let mut f = Function::new();
        let bb = f.add_block();
        let ptr = f.push(bb, InstKind::Alloca { address_space: 3, align: 0 }, Type::Scalar(ScalarKind::Ptr(3)));
        let load = f.push(
            bb,
            InstKind::Load { ptr, align: 0, simple: true },
            Type::Scalar(ScalarKind::Int(32)),
        );
        let p = probe(&f, load).unwrap();
        assert_eq!(p.ptr, ptr);
        assert_eq!(p.address_space, 3);
    }

    #[test]
    fn effective_alignment_falls_back_to_abi_alignment() {
        let mut f = Function::new();
        let bb = f.add_block();
        let ptr = f.push(bb, InstKind::Alloca { address_space: 0, align: 0 }, Type::Scalar(ScalarKind::Ptr(0)));
        let load = f.push(
            bb,
            InstKind::Load { ptr, align: 0, simple: true },
            Type::Scalar(ScalarKind::Int(32)),
        );
        let layout = TargetProfile::default();
        assert_eq!(effective_alignment(&f, &layout, load), 4);
    }

    #[test]
    fn effective_alignment_prefers_stated_alignment() {
        let mut f = Function::new();
        let bb = f.add_block();
        let ptr = f.push(bb, InstKind::Alloca { address_space: 0, align: 0 }, Type::Scalar(ScalarKind::Ptr(0)));
        let load = f.push(
            bb,
            InstKind::Load { ptr, align: 16, simple: true },
            Type::Scalar(ScalarKind::Int(32)),
        );
        let layout = TargetProfile::default();
        assert_eq!(effective_alignment(&f, &layout, load), 16);
    }
}
