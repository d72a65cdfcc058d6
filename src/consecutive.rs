//! 4.B ConsecutivityOracle — decide whether two memory ops access adjacent
//! memory.
//!
//! `consecutive(A, B)` is true iff B accesses the memory region immediately
//! following A's region, with identical element size and address space.
//! The cascade in §4.B is followed step for step; each step either proves
//! the relation or falls through to the next, ending in `false`.

use crate::ir::{Function, GepIndex, InstKind, ScalarKind, ValueId};
use crate::oracles::{Context, SCEVExpr};
use crate::probe;

/// Peel constant in-bounds offsets from `ptr`, accumulating a signed byte
/// offset at the IR's pointer bit-width (§4.B.2). Returns the peeled base
/// and the accumulated offset.
pub(crate) fn peel_constant_offset(f: &Function, mut ptr: ValueId) -> (ValueId, i64) {
    let mut offset: i64 = 0;
    loop {
        match &f.get(ptr).kind {
            InstKind::Gep { base, indices, elem_size, inbounds: true } => {
                let mut all_const = true;
                let mut step = 0i64;
                for idx in indices {
                    match idx {
                        GepIndex::Const(c) => step += c * (*elem_size as i64),
                        GepIndex::Value(_) => {
                            all_const = false;
                            break;
                        }
                    }
                }
                if !all_const {
                    return (ptr, offset);
                }
                offset += step;
                ptr = *base;
            }
            InstKind::Bitcast { src } => ptr = *src,
            _ => return (ptr, offset),
        }
    }
}

fn store_size(f: &Function, inst: ValueId, ctx: &Context) -> u32 {
    ctx.layout.type_store_size(&f.get(inst).ty)
}

fn scalar_store_size(f: &Function, inst: ValueId, ctx: &Context) -> u32 {
    let ty = &f.get(inst).ty;
    let elem = match ty.scalar_element() {
        ScalarKind::Ptr(as_) => {
            crate::ir::Type::Scalar(ScalarKind::Ptr(as_))
        }
        k => crate::ir::Type::Scalar(k),
    };
    ctx.layout.type_store_size(&elem)
}

/// §4.B.4: a single-operation instruction that is a sign or zero
/// extension, returning its input and whether it is signed.
fn as_extension(f: &Function, v: ValueId) -> Option<(ValueId, bool)> {
    match &f.get(v).kind {
        InstKind::SExt { src } => Some((*src, true)),
        InstKind::ZExt { src } => Some((*src, false)),
        _ => None,
    }
}

/// §4.B.4(a): `rhs` is an add with constant right operand `1`, carrying the
/// wrap flag appropriate to `signed`.
fn proves_increment_by_flag(f: &Function, v: ValueId, signed: bool) -> Option<ValueId> {
    match &f.get(v).kind {
        InstKind::Add { lhs, rhs, nsw, nuw } => {
            if let InstKind::Const(1) = &f.get(*rhs).kind {
                let flag_ok = if signed { *nsw } else { *nuw };
                if flag_ok {
                    return Some(*lhs);
                }
            }
            None
        }
        _ => None,
    }
}

pub struct ConsecutivityOracle<'a> {
    ctx: &'a Context<'a>,
}

impl<'a> ConsecutivityOracle<'a> {
    pub fn new(ctx: &'a Context<'a>) -> Self {
        Self { ctx }
    }

    pub fn consecutive(&self, f: &Function, a: ValueId, b: ValueId) -> bool {
        // Step 1: quick reject.
        let (Some(pa), Some(pb)) = (probe::probe(f, a), probe::probe(f, b)) else {
            return false;
        };
        if pa.address_space != pb.address_space {
            return false;
        }
        if pa.ptr == pb.ptr {
            return false;
        }
        if store_size(f, a, self.ctx) != store_size(f, b, self.ctx) {
            return false;
        }
        if scalar_store_size(f, a, self.ctx) != scalar_store_size(f, b, self.ctx) {
            return false;
        }

        let size = store_size(f, a, self.ctx) as i64;

        // Step 2: base-relative constant offset.
        let (base_a, off_a) = peel_constant_offset(f, pa.ptr);
        let (base_b, off_b) = peel_constant_offset(f, pb.ptr);
        if base_a == base_b {
            return off_b - off_a == size;
        }

        // Step 3: scalar-evolution probe.
        let e_a = self.ctx.scev.scev(f, base_a);
        let e_b = self.ctx.scev.scev(f, base_b);
        let wanted = SCEVExpr::add(e_a.clone(), SCEVExpr::constant(size - (off_b - off_a)));
        if wanted.structurally_equal(&e_b) {
            return true;
        }

        // Step 4: GEP-structural probe.
        self.structural_probe(f, pa.ptr, pb.ptr)
    }

    fn structural_probe(&self, f: &Function, ptr_a: ValueId, ptr_b: ValueId) -> bool {
        let (InstKind::Gep { base: base_a, indices: idx_a, elem_size: es_a, .. },
            InstKind::Gep { base: base_b, indices: idx_b, elem_size: es_b, .. }) =
            (&f.get(ptr_a).kind, &f.get(ptr_b).kind)
        else {
            return false;
        };
        if base_a != base_b || es_a != es_b || idx_a.len() != idx_b.len() || idx_a.is_empty() {
            return false;
        }
        let last = idx_a.len() - 1;
        for i in 0..last {
            if idx_a[i] != idx_b[i] {
                return false;
            }
        }
        let (GepIndex::Value(last_a), GepIndex::Value(last_b)) = (idx_a[last], idx_b[last]) else {
            return false;
        };

        let Some((alpha, signed_a)) = as_extension(f, last_a) else {
            return false;
        };
        let Some((beta, signed_b)) = as_extension(f, last_b) else {
            return false;
        };
        if signed_a != signed_b {
            return false;
        }
        if f.get(alpha).ty != f.get(beta).ty {
            return false;
        }
        let signed = signed_a;

        // (a): beta is `alpha + 1` with the matching no-wrap flag.
        if let Some(add_lhs) = proves_increment_by_flag(f, beta, signed) {
            if add_lhs == alpha {
                return true;
            }
        }

        // (b): known-bits proof of non-overflow, plus SCEV confirmation.
        let kb = self.ctx.known_bits.known_bits(f, alpha);
        let width = f.get(alpha).ty.scalar_bit_size();
        if kb.has_known_zero_high_bit(width) {
            let e_alpha = self.ctx.scev.scev(f, alpha);
            let e_beta = self.ctx.scev.scev(f, beta);
            let wanted = SCEVExpr::add(e_alpha, SCEVExpr::constant(1));
            if wanted.structurally_equal(&e_beta) {
                return true;
            }
        }

        false
    }
}
