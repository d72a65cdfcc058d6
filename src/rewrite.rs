//! 4.G Rewriter — emit the wide load/store, splice values in/out, erase the
//! originals, and repair dominance.
//!
//! New instructions are built with [`Function::push`] (which always appends
//! at the end of a block) and then walked into place with
//! [`Function::move_after`], growing a contiguous run immediately after the
//! group's last original member — exactly the position invariant 5 (§3)
//! requires. `anchor` tracks the most recently inserted instruction so each
//! subsequent insert lands right after it, preserving the order new values
//! are built in.

use crate::ir::{Function, InstKind, ScalarKind, Type, ValueId};
use crate::legalize::VectorGroup;
use crate::probe;
use crate::stats;

fn insert_after(f: &mut Function, anchor: &mut ValueId, kind: InstKind, ty: Type) -> ValueId {
    let bb = f.block_of(*anchor).expect("anchor instruction must be placed in a block");
    let v = f.push(bb, kind, ty);
    f.move_after(v, *anchor);
    *anchor = v;
    v
}

fn bitcast_if_needed(f: &mut Function, anchor: &mut ValueId, v: ValueId, from: ScalarKind, to: ScalarKind) -> ValueId {
    if from == to {
        v
    } else {
        insert_after(f, anchor, InstKind::Bitcast { src: v }, Type::Scalar(to))
    }
}

/// Dominance repair (§4.G, §9 "cyclic use-graph"): `value`'s own block is
/// the only place this can matter, since the pass never moves a value
/// across a basic-block boundary. Any same-block user positioned earlier
/// than `value` is relocated immediately after it and recursively
/// re-checked; phis are never relocated (their operand slots are
/// block-edge-bound, not position-bound).
fn repair_dominance(f: &mut Function, value: ValueId) {
    let Some(value_block) = f.block_of(value) else { return };
    let Some(value_pos) = f.position_in_block(value) else { return };
    for user in f.users_of(value) {
        if f.get(user).is_phi() {
            continue;
        }
        if f.block_of(user) != Some(value_block) {
            continue;
        }
        let Some(user_pos) = f.position_in_block(user) else { continue };
        if user_pos < value_pos {
            f.move_after(user, value);
            repair_dominance(f, user);
        }
    }
}

/// Erase a chain member once it has no remaining uses, and follow up by
/// erasing its pointer GEP too if that GEP is now also dead (§4.G
/// "Erase").
fn erase_member(f: &mut Function, member: ValueId, ptr: ValueId) {
    f.erase(member);
    if !f.has_any_users(ptr) && matches!(f.get(ptr).kind, InstKind::Gep { .. }) {
        f.erase(ptr);
    }
}

fn wide_pointer_type(address_space: crate::ir::AddressSpace) -> Type {
    Type::Scalar(ScalarKind::Ptr(address_space))
}

/// Apply the alignment raise `Legalizer` proposed (§4.F step 6), now that
/// the group has also cleared `LegalityChecker` and is actually being
/// committed. Deferred this far so an abandoned chain never leaves the
/// allocation re-aligned (§7).
fn apply_stack_alignment_raise(f: &mut Function, group: &VectorGroup) {
    let Some(base) = group.stack_align_target else { return };
    if let InstKind::Alloca { align, .. } = &mut f.get_mut(base).kind {
        *align = (*align).max(group.alignment);
    }
}

pub struct Rewriter;

impl Rewriter {
    /// Rewrite one legalized group of stores into a single wide store.
    /// Returns the new wide store's `ValueId`.
    pub fn rewrite_stores(f: &mut Function, group: &VectorGroup) -> ValueId {
        apply_stack_alignment_raise(f, group);
        let members = group.members.clone();
        let last = *members.last().expect("legalized group is never empty");
        let p = probe::probe(f, members[0]).expect("chain member must be a memory op");
        let w = group.lanes_per_member;
        let wide_ty = Type::vector_of(group.element, group.total_lanes());

        let mut anchor = last;
        let mut vec_val = insert_after(f, &mut anchor, InstKind::Undef, wide_ty.clone());

        for (i, &m) in members.iter().enumerate() {
            let InstKind::Store { value, .. } = &f.get(m).kind else {
                unreachable!("Collector only ever bundles Store instructions into a store chain");
            };
            let value = *value;
            let orig_elem = f.get(m).ty.scalar_element();
            for lane in 0..w {
                let src = if w == 1 {
                    value
                } else {
                    insert_after(
                        f,
                        &mut anchor,
                        InstKind::ExtractElement { vector: value, lane },
                        Type::Scalar(orig_elem),
                    )
                };
                let casted = bitcast_if_needed(f, &mut anchor, src, orig_elem, group.element);
                vec_val = insert_after(
                    f,
                    &mut anchor,
                    InstKind::InsertElement { vector: vec_val, value: casted, lane: lane + i as u32 * w },
                    wide_ty.clone(),
                );
            }
        }

        let InstKind::Store { ptr: first_ptr, .. } = &f.get(members[0]).kind else {
            unreachable!()
        };
        let first_ptr = *first_ptr;
        let casted_ptr = insert_after(f, &mut anchor, InstKind::Bitcast { src: first_ptr }, wide_pointer_type(p.address_space));
        let wide_store = insert_after(
            f,
            &mut anchor,
            InstKind::Store { ptr: casted_ptr, value: vec_val, align: group.alignment, simple: true },
            wide_ty,
        );

        for &m in &members {
            let InstKind::Store { ptr, .. } = &f.get(m).kind else { unreachable!() };
            let ptr = *ptr;
            erase_member(f, m, ptr);
        }

        stats::record_chain_vectorized(members.len());
        wide_store
    }

    /// Rewrite one legalized group of loads into a single wide load,
    /// threading each original's uses through a lane extraction.
    pub fn rewrite_loads(f: &mut Function, group: &VectorGroup) -> ValueId {
        apply_stack_alignment_raise(f, group);
        let members = group.members.clone();
        let last = *members.last().expect("legalized group is never empty");
        let p = probe::probe(f, members[0]).expect("chain member must be a memory op");
        let w = group.lanes_per_member;
        let wide_ty = Type::vector_of(group.element, group.total_lanes());

        let mut anchor = last;
        let InstKind::Load { ptr: first_ptr, .. } = &f.get(members[0]).kind else {
            unreachable!("Collector only ever bundles Load instructions into a load chain");
        };
        let first_ptr = *first_ptr;
        let casted_ptr = insert_after(f, &mut anchor, InstKind::Bitcast { src: first_ptr }, wide_pointer_type(p.address_space));
        let wide_load = insert_after(
            f,
            &mut anchor,
            InstKind::Load { ptr: casted_ptr, align: group.alignment, simple: true },
            wide_ty,
        );

        for (i, &m) in members.iter().enumerate() {
            let orig_elem = f.get(m).ty.scalar_element();
            if w == 1 {
                let lane = i as u32;
                let extracted = insert_after(
                    f,
                    &mut anchor,
                    InstKind::ExtractElement { vector: wide_load, lane },
                    Type::Scalar(group.element),
                );
                let value = bitcast_if_needed(f, &mut anchor, extracted, group.element, orig_elem);
                f.replace_all_uses(m, value);
                repair_dominance(f, value);
            } else {
                for user in f.users_of(m) {
                    let InstKind::ExtractElement { lane: k, .. } = &f.get(user).kind else {
                        unreachable!("Collector requires every vector load's users to be lane extractions");
                    };
                    let k = *k;
                    let new_lane = k + i as u32 * w;
                    let extracted = insert_after(
                        f,
                        &mut anchor,
                        InstKind::ExtractElement { vector: wide_load, lane: new_lane },
                        Type::Scalar(group.element),
                    );
                    let value = bitcast_if_needed(f, &mut anchor, extracted, group.element, orig_elem);
                    f.replace_all_uses(user, value);
                    repair_dominance(f, value);
                    f.erase(user);
                }
            }
        }

        for &m in &members {
            let InstKind::Load { ptr, .. } = &f.get(m).kind else { unreachable!() };
            let ptr = *ptr;
            erase_member(f, m, ptr);
        }

        stats::record_chain_vectorized(members.len());
        wide_load
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BlockId, GepIndex, InstKind, ScalarKind, Type};
    use smallvec::SmallVec;

    fn gep(f: &mut Function, bb: BlockId, base: ValueId, index: i64, elem_size: u32) -> ValueId {
        f.push(
            bb,
            InstKind::Gep { base, indices: SmallVec::from_slice(&[GepIndex::Const(index)]), elem_size, inbounds: true },
            Type::Scalar(ScalarKind::Ptr(0)),
        )
    }

    /// S1: four 32-bit stores become one 128-bit store; all four originals
    /// are erased.
    #[test]
    fn rewrite_stores_emits_one_wide_store_and_erases_originals() {
        let mut f = Function::new();
        let bb = f.add_block();
        let base = f.push(bb, InstKind::Alloca { address_space: 0, align: 16 }, Type::Scalar(ScalarKind::Ptr(0)));
        let val = f.push(bb, InstKind::Const(7), Type::Scalar(ScalarKind::Int(32)));
        let mut stores = Vec::new();
        for i in 0..4 {
            let g = gep(&mut f, bb, base, i, 4);
            stores.push(f.push(
                bb,
                InstKind::Store { ptr: g, value: val, align: 16, simple: true },
                Type::Scalar(ScalarKind::Int(32)),
            ));
        }

        let group = VectorGroup { members: stores.clone(), element: ScalarKind::Int(32), lanes_per_member: 1, alignment: 16, stack_align_target: None };
        stats::reset();
        let wide = Rewriter::rewrite_stores(&mut f, &group);

        assert!(matches!(f.get(wide).ty, Type::Vector { lanes: 4, .. }));
        for s in &stores {
            assert!(f.try_get(*s).is_none() || !f.block(bb).instructions.contains(s));
        }
        assert_eq!(stats::vector_instructions(), 1);
        assert_eq!(stats::scalars_vectorized(), 4);
    }

    /// S3: three 32-bit loads become one <3 x i32> load; each original
    /// load's single user is redirected to the matching lane.
    #[test]
    fn rewrite_loads_redirects_scalar_uses_to_lane_extracts() {
        let mut f = Function::new();
        let bb = f.add_block();
        let base = f.push(bb, InstKind::Alloca { address_space: 0, align: 4 }, Type::Scalar(ScalarKind::Ptr(0)));
        let mut loads = Vec::new();
        let mut uses = Vec::new();
        for i in 0..3 {
            let g = gep(&mut f, bb, base, i, 4);
            let load = f.push(bb, InstKind::Load { ptr: g, align: 4, simple: true }, Type::Scalar(ScalarKind::Int(32)));
            let use_ = f.push(
                bb,
                InstKind::Generic { operands: SmallVec::from_slice(&[load]), side_effecting: false },
                Type::Scalar(ScalarKind::Int(32)),
            );
            loads.push(load);
            uses.push(use_);
        }

        let group = VectorGroup { members: loads.clone(), element: ScalarKind::Int(32), lanes_per_member: 1, alignment: 4, stack_align_target: None };
        stats::reset();
        let wide = Rewriter::rewrite_loads(&mut f, &group);
        assert!(matches!(f.get(wide).ty, Type::Vector { lanes: 3, .. }));

        for (i, &use_) in uses.iter().enumerate() {
            let InstKind::Generic { operands, .. } = &f.get(use_).kind else { panic!() };
            let extract = operands[0];
            match &f.get(extract).kind {
                InstKind::ExtractElement { vector, lane } => {
                    assert_eq!(*vector, wide);
                    assert_eq!(*lane, i as u32);
                }
                other => panic!("expected ExtractElement, got {other:?}"),
            }
        }
        assert_eq!(stats::scalars_vectorized(), 3);
    }

    /// Dominance repair: a use positioned textually before the chain's last
    /// member (hence before the new wide load) must be relocated after it.
    #[test]
    fn dominance_repair_moves_early_user_after_its_new_definition() {
        let mut f = Function::new();
        let bb = f.add_block();
        let base = f.push(bb, InstKind::Alloca { address_space: 0, align: 4 }, Type::Scalar(ScalarKind::Ptr(0)));
        let g0 = gep(&mut f, bb, base, 0, 4);
        let g1 = gep(&mut f, bb, base, 1, 4);
        let load0 = f.push(bb, InstKind::Load { ptr: g0, align: 4, simple: true }, Type::Scalar(ScalarKind::Int(32)));
        // This use sits right after load0, textually before load1 (the
        // chain's last member) — after rewriting it must move past the
        // new wide load.
        let use0 = f.push(
            bb,
            InstKind::Generic { operands: SmallVec::from_slice(&[load0]), side_effecting: false },
            Type::Scalar(ScalarKind::Int(32)),
        );
        let load1 = f.push(bb, InstKind::Load { ptr: g1, align: 4, simple: true }, Type::Scalar(ScalarKind::Int(32)));

        let group = VectorGroup { members: vec![load0, load1], element: ScalarKind::Int(32), lanes_per_member: 1, alignment: 4, stack_align_target: None };
        let wide = Rewriter::rewrite_loads(&mut f, &group);

        let wide_pos = f.position_in_block(wide).unwrap();
        let use0_pos = f.position_in_block(use0).unwrap();
        assert!(use0_pos > wide_pos, "user must be relocated after its new definition");
    }
}
