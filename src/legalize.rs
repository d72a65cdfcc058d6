//! 4.F Legalizer — choose a vector width for a chain and split it, if
//! needed, to satisfy the byte-count, power-of-two, and width-cap rules.
//!
//! A chain that survives [`Legalizer::legalize`] comes back as zero or more
//! [`VectorGroup`]s, each a contiguous run of at least two original chain
//! members that can share one wide memory op. Members dropped along the way
//! (the odd element stripped off a 3-byte chain, a remainder too small to
//! legalize) simply don't appear in any group and stay scalar — this is
//! framed as "reject" or "recurse on a prefix," never as an error.

use crate::ir::{get_underlying_object, Function, InstKind, ScalarKind, Type, ValueId};
use crate::oracles::Context;
use crate::probe;

/// A legalized, rewrite-ready subset of a chain.
#[derive(Debug, Clone)]
pub struct VectorGroup {
    pub members: Vec<ValueId>,
    pub element: ScalarKind,
    /// Lanes contributed by each member — 1 unless a member's own accessed
    /// type is itself a vector (§4.F: "produce a vector of C·W lanes").
    pub lanes_per_member: u32,
    pub alignment: u32,
    /// Set when the alignment rule (§4.F step 6) only accepted this group by
    /// raising a stack allocation's declared alignment. The raise itself is
    /// *not* applied here — only recorded — so a group `legalize` proposes
    /// but `LegalityChecker` later rejects never leaves the IR mutated
    /// (§7: "the IR remains unchanged for that chain"). `Rewriter` applies it
    /// at commit time, once the group is actually going to be rewritten.
    pub stack_align_target: Option<ValueId>,
}

impl VectorGroup {
    pub fn total_lanes(&self) -> u32 {
        self.members.len() as u32 * self.lanes_per_member
    }
}

pub struct Legalizer {
    /// Alignment (in bytes) Legalizer raises a stack allocation to when the
    /// natural alignment rule fails but the pointer traces to an alloca in
    /// address space 0 (§4.F step 6; §9 Open Questions — kept a
    /// constructor parameter rather than hardwired, since no target-query
    /// oracle for it is in scope).
    pub stack_align_raise: u32,
}

impl Default for Legalizer {
    fn default() -> Self {
        Self { stack_align_raise: 4 }
    }
}

impl Legalizer {
    pub fn new(stack_align_raise: u32) -> Self {
        Self { stack_align_raise }
    }

    pub fn legalize(&self, f: &Function, ctx: &Context, chain: &[ValueId]) -> Vec<VectorGroup> {
        self.legalize_rec(f, ctx, chain)
    }

    fn legalize_rec(&self, f: &Function, ctx: &Context, members: &[ValueId]) -> Vec<VectorGroup> {
        let c = members.len() as u32;
        if c < 2 {
            return Vec::new();
        }

        let lanes_per_member = match f.get(members[0]).ty {
            Type::Vector { lanes, .. } => lanes,
            Type::Scalar(_) => 1,
        };
        let element = select_element_type(f, ctx, members);
        let sz = element.bit_size();
        if sz == 0 || !sz.is_power_of_two() {
            return Vec::new();
        }

        let Some(p) = probe::probe(f, members[0]) else {
            return Vec::new();
        };
        let vf = ctx.tti.vec_reg_bit_width(p.address_space) / sz;
        if vf < 2 {
            return Vec::new();
        }

        // Byte-count rule (§4.F step 4).
        let bytes = (sz / 8) * c;
        if bytes == 3 {
            return self.legalize_rec(f, ctx, &members[..(c - 1) as usize]);
        }
        if bytes > 2 && bytes % 4 != 0 {
            let num_right = (bytes % 4) / (sz / 8).max(1);
            let num_left = c - num_right;
            if num_left == 0 || num_right == 0 {
                return Vec::new();
            }
            let mut out = self.legalize_rec(f, ctx, &members[..num_left as usize]);
            out.extend(self.legalize_rec(f, ctx, &members[num_left as usize..]));
            return out;
        }

        // Width cap (§4.F step 5).
        if c > vf {
            let mut out = self.legalize_rec(f, ctx, &members[..vf as usize]);
            out.extend(self.legalize_rec(f, ctx, &members[vf as usize..]));
            return out;
        }

        // Alignment rule (§4.F step 6).
        let a = probe::effective_alignment(f, ctx.layout, members[0]);
        let (alignment, stack_align_target) = if a % bytes == 0 || a % 4 == 0 {
            (a, None)
        } else if let Some(base) = self.stack_alignment_raise_candidate(f, members[0]) {
            (self.stack_align_raise, Some(base))
        } else {
            return Vec::new();
        };

        vec![VectorGroup { members: members.to_vec(), element, lanes_per_member, alignment, stack_align_target }]
    }

    /// §4.F step 6's escape hatch: if the first member's pointer traces to
    /// a stack allocation in address space 0, the pass is the sole owner of
    /// its layout and may raise its declared alignment. This only *checks*
    /// eligibility — it never mutates the IR. The raise is applied by
    /// `Rewriter` only once `LegalityChecker` has also accepted the group,
    /// so a rejected chain never leaves the allocation re-aligned.
    fn stack_alignment_raise_candidate(&self, f: &Function, first: ValueId) -> Option<ValueId> {
        let p = probe::probe(f, first)?;
        let base = get_underlying_object(f, p.ptr);
        match &f.try_get(base)?.kind {
            InstKind::Alloca { address_space: 0, .. } => Some(base),
            _ => None,
        }
    }
}

/// §4.F step 1: integer (or integer-vector) wins over pointer-as-integer,
/// which wins over the first member's own type. This ordering is
/// load-bearing and deliberate, not a bug to "fix."
fn select_element_type(f: &Function, ctx: &Context, members: &[ValueId]) -> ScalarKind {
    for &m in members {
        if let ScalarKind::Int(bits) = f.get(m).ty.scalar_element() {
            return ScalarKind::Int(bits);
        }
    }
    for &m in members {
        if let ScalarKind::Ptr(space) = f.get(m).ty.scalar_element() {
            return ScalarKind::Int(ctx.layout.pointer_size_in_bits(space));
        }
    }
    f.get(members[0]).ty.scalar_element()
}
