//! Concrete stand-in for the host compiler's typed, SSA-form IR.
//!
//! The pass operates over an abstract IR (Value, Instruction, BasicBlock,
//! Type). This module picks a small concrete representation of that IR so
//! the pass is compilable and testable without a real host compiler
//! attached. A host integrating this crate for real would adapt its own IR
//! to these shapes (or re-home the component modules against its own
//! types); the arena/instruction design follows the familiar
//! `Register(usize)`-style SSA value newtype, generalized with block
//! placement and a richer instruction set.

use smallvec::SmallVec;
use std::collections::HashMap;

/// An SSA value, identified by its defining instruction's arena slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

/// A basic block identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Address space tag, opaque to the pass beyond identity and the
/// `TargetTransformInfo`/`DataLayout` queries keyed on it.
pub type AddressSpace = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Int(u32),
    Float(u32),
    Ptr(AddressSpace),
}

impl ScalarKind {
    pub fn bit_size(&self) -> u32 {
        match *self {
            ScalarKind::Int(bits) | ScalarKind::Float(bits) => bits,
            // Pointer width is a data-layout property, not fixed per scalar
            // kind; callers needing pointer bit width go through
            // `DataLayout::pointer_size_in_bits`. A nominal 64 here is only
            // used where no layout is at hand (Display, debugging).
            ScalarKind::Ptr(_) => 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Scalar(ScalarKind),
    Vector { element: ScalarKind, lanes: u32 },
}

impl Type {
    pub fn scalar_element(&self) -> ScalarKind {
        match *self {
            Type::Scalar(k) => k,
            Type::Vector { element, .. } => element,
        }
    }

    pub fn lanes(&self) -> u32 {
        match *self {
            Type::Scalar(_) => 1,
            Type::Vector { lanes, .. } => lanes,
        }
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, Type::Vector { .. })
    }

    /// Bit size using only the scalar element's intrinsic width (no
    /// pointer-size lookup); use `DataLayout::type_size_in_bits` when the
    /// element may be a pointer.
    pub fn scalar_bit_size(&self) -> u32 {
        self.scalar_element().bit_size()
    }

    pub fn vector_of(element: ScalarKind, lanes: u32) -> Type {
        if lanes == 1 {
            Type::Scalar(element)
        } else {
            Type::Vector { element, lanes }
        }
    }
}

/// An index operand in a `Gep`: either a compile-time constant or an SSA
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GepIndex {
    Const(i64),
    Value(ValueId),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InstKind {
    /// A compile-time integer constant.
    Const(i64),
    /// A stack allocation; address space is almost always 0. `align` follows
    /// the same 0-means-ABI-natural convention as `Load`/`Store`; Legalizer's
    /// alignment-raise (§4.F) mutates it in place.
    Alloca { address_space: AddressSpace, align: u32 },
    /// A global variable's address.
    GlobalAddr { address_space: AddressSpace },
    /// Pointer arithmetic: `base` plus `indices`, in address space
    /// `base`'s pointer type.
    /// Pointer arithmetic, scaled uniformly by `elem_size` bytes per index
    /// step (a simplification of a real GEP's per-dimension pointee
    /// typing, adequate for the single-trailing-index patterns the
    /// consecutivity probes below are built around).
    Gep {
        base: ValueId,
        indices: SmallVec<[GepIndex; 4]>,
        elem_size: u32,
        inbounds: bool,
    },
    /// A no-op reinterpretation of a pointer (same size, same address
    /// space); peeled by `get_underlying_object`.
    Bitcast { src: ValueId },
    SExt { src: ValueId },
    ZExt { src: ValueId },
    Add {
        lhs: ValueId,
        rhs: ValueId,
        nsw: bool,
        nuw: bool,
    },
    Load {
        ptr: ValueId,
        align: u32,
        simple: bool,
    },
    Store {
        ptr: ValueId,
        value: ValueId,
        align: u32,
        simple: bool,
    },
    ExtractElement { vector: ValueId, lane: u32 },
    InsertElement {
        vector: ValueId,
        value: ValueId,
        lane: u32,
    },
    Undef,
    /// `side_effecting` covers fences/traps-adjacent calls that must block
    /// reordering per §4.E.
    Call { side_effecting: bool },
    Fence,
    Trap,
    Phi { incoming: SmallVec<[(BlockId, ValueId); 4]> },
    Br {
        cond: ValueId,
        then_bb: BlockId,
        else_bb: BlockId,
    },
    Jump { target: BlockId },
    Ret,
    /// An instruction the pass does not interpret (ordinary scalar
    /// arithmetic, unrelated calls, ...); `operands` lets it still
    /// participate correctly in dominance/use-def bookkeeping and
    /// `side_effecting` lets LegalityChecker treat it conservatively.
    Generic {
        operands: SmallVec<[ValueId; 4]>,
        side_effecting: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub id: ValueId,
    pub kind: InstKind,
    pub ty: Type,
}

impl Instruction {
    /// Operands referencing other values, for use-def and dominance
    /// bookkeeping. Block targets in `Br`/`Jump` are not values.
    pub fn operands(&self) -> SmallVec<[ValueId; 4]> {
        use InstKind::*;
        match &self.kind {
            Const(_) | Alloca { .. } | GlobalAddr { .. } | Undef | Fence | Trap | Jump { .. }
            | Ret | Call { .. } => SmallVec::new(),
            Gep { base, indices, .. } => {
                let mut v = SmallVec::new();
                v.push(*base);
                for idx in indices {
                    if let GepIndex::Value(val) = idx {
                        v.push(*val);
                    }
                }
                v
            }

            Bitcast { src } | SExt { src } | ZExt { src } => SmallVec::from_slice(&[*src]),
            Add { lhs, rhs, .. } => SmallVec::from_slice(&[*lhs, *rhs]),
            Load { ptr, .. } => SmallVec::from_slice(&[*ptr]),
            Store { ptr, value, .. } => SmallVec::from_slice(&[*ptr, *value]),
            ExtractElement { vector, .. } => SmallVec::from_slice(&[*vector]),
            InsertElement { vector, value, .. } => SmallVec::from_slice(&[*vector, *value]),
            Phi { incoming } => incoming.iter().map(|(_, v)| *v).collect(),
            Br { cond, .. } => SmallVec::from_slice(&[*cond]),
            Generic { operands, .. } => operands.clone(),
        }
    }

    pub fn is_load(&self) -> bool {
        matches!(self.kind, InstKind::Load { .. })
    }

    pub fn is_store(&self) -> bool {
        matches!(self.kind, InstKind::Store { .. })
    }

    pub fn is_memory_op(&self) -> bool {
        self.is_load() || self.is_store()
    }

    /// `simple` per §3: false iff atomic/volatile. Non-memory ops are
    /// vacuously simple (irrelevant to the pass).
    pub fn is_simple(&self) -> bool {
        match &self.kind {
            InstKind::Load { simple, .. } | InstKind::Store { simple, .. } => *simple,
            _ => true,
        }
    }

    pub fn has_side_effects(&self) -> bool {
        match &self.kind {
            InstKind::Call { side_effecting } => *side_effecting,
            InstKind::Generic { side_effecting, .. } => *side_effecting,
            InstKind::Fence | InstKind::Trap => true,
            _ => false,
        }
    }

    pub fn is_phi(&self) -> bool {
        matches!(self.kind, InstKind::Phi { .. })
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self.kind, InstKind::Br { .. } | InstKind::Jump { .. } | InstKind::Ret)
    }
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub instructions: Vec<ValueId>,
}

/// A function body: a flat instruction arena plus block placement.
#[derive(Debug, Clone)]
pub struct Function {
    pub no_implicit_float: bool,
    arena: Vec<Instruction>,
    blocks: Vec<BasicBlock>,
    block_of: HashMap<ValueId, BlockId>,
}

impl Function {
    pub fn new() -> Self {
        Self {
            no_implicit_float: false,
            arena: Vec::new(),
            blocks: Vec::new(),
            block_of: HashMap::new(),
        }
    }

    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock {
            id,
            instructions: Vec::new(),
        });
        id
    }

    /// Append a new instruction to the end of `block`'s program order.
    pub fn push(&mut self, block: BlockId, kind: InstKind, ty: Type) -> ValueId {
        let id = ValueId(self.arena.len() as u32);
        self.arena.push(Instruction { id, kind, ty });
        self.blocks[block.0 as usize].instructions.push(id);
        self.block_of.insert(id, block);
        id
    }

    pub fn get(&self, v: ValueId) -> &Instruction {
        &self.arena[v.0 as usize]
    }

    pub fn get_mut(&mut self, v: ValueId) -> &mut Instruction {
        &mut self.arena[v.0 as usize]
    }

    pub fn try_get(&self, v: ValueId) -> Option<&Instruction> {
        self.arena.get(v.0 as usize)
    }

    pub fn block_of(&self, v: ValueId) -> Option<BlockId> {
        self.block_of.get(&v).copied()
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    /// Position of `v` within its own block's program order.
    pub fn position_in_block(&self, v: ValueId) -> Option<usize> {
        let bb = self.block_of(v)?;
        self.blocks[bb.0 as usize].instructions.iter().position(|&x| x == v)
    }

    /// All values that use `v` as an operand, across the whole function.
    /// Recomputed on demand (§3: transient bookkeeping, not an
    /// incrementally-maintained side table).
    pub fn users_of(&self, v: ValueId) -> Vec<ValueId> {
        self.arena
            .iter()
            .filter(|inst| inst.operands().contains(&v))
            .map(|inst| inst.id)
            .collect()
    }

    pub fn has_any_users(&self, v: ValueId) -> bool {
        self.arena.iter().any(|inst| inst.operands().contains(&v))
    }

    /// Successor blocks of `from`, read off its terminator.
    pub fn successors(&self, from: BlockId) -> SmallVec<[BlockId; 2]> {
        let block = self.block(from);
        let Some(&last) = block.instructions.last() else {
            return SmallVec::new();
        };
        match &self.get(last).kind {
            InstKind::Br { then_bb, else_bb, .. } => SmallVec::from_slice(&[*then_bb, *else_bb]),
            InstKind::Jump { target } => SmallVec::from_slice(&[*target]),
            _ => SmallVec::new(),
        }
    }

    /// Remove an instruction entirely from its block and the arena slot is
    /// left as a tombstone (never reused); callers must have already
    /// confirmed it has no remaining users (invariant 6, §3).
    pub fn erase(&mut self, v: ValueId) {
        if let Some(bb) = self.block_of.remove(&v) {
            let block = &mut self.blocks[bb.0 as usize];
            block.instructions.retain(|&x| x != v);
        }
    }

    /// Move `v` so it sits immediately after `after` in program order,
    /// within the same block. Used by dominance repair (§4.G) — never call
    /// this on a phi.
    pub fn move_after(&mut self, v: ValueId, after: ValueId) {
        let bb = self.block_of[&v];
        debug_assert_eq!(self.block_of[&after], bb, "move_after crosses blocks");
        let block = &mut self.blocks[bb.0 as usize];
        block.instructions.retain(|&x| x != v);
        let pos = block.instructions.iter().position(|&x| x == after).expect("after must exist");
        block.instructions.insert(pos + 1, v);
    }

    /// Replace every use of `old` with `new`, across the whole function.
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) {
        for inst in self.arena.iter_mut() {
            replace_operand(&mut inst.kind, old, new);
        }
    }
}

impl Default for Function {
    fn default() -> Self {
        Self::new()
    }
}

fn replace_operand(kind: &mut InstKind, old: ValueId, new: ValueId) {
    let swap = |v: &mut ValueId| {
        if *v == old {
            *v = new;
        }
    };
    match kind {
        InstKind::Gep { base, indices, .. } => {
            swap(base);
            for idx in indices.iter_mut() {
                if let GepIndex::Value(v) = idx {
                    swap(v);
                }
            }
        }
        InstKind::Bitcast { src } | InstKind::SExt { src } | InstKind::ZExt { src } => swap(src),
        InstKind::Add { lhs, rhs, .. } => {
            swap(lhs);
            swap(rhs);
        }
        InstKind::Load { ptr, .. } => swap(ptr),
        InstKind::Store { ptr, value, .. } => {
            swap(ptr);
            swap(value);
        }
        InstKind::ExtractElement { vector, .. } => swap(vector),
        InstKind::InsertElement { vector, value, .. } => {
            swap(vector);
            swap(value);
        }
        InstKind::Phi { incoming } => {
            for (_, v) in incoming.iter_mut() {
                swap(v);
            }
        }
        InstKind::Br { cond, .. } => swap(cond),
        InstKind::Generic { operands, .. } => {
            for v in operands.iter_mut() {
                swap(v);
            }
        }
        InstKind::Const(_)
        | InstKind::Alloca { .. }
        | InstKind::GlobalAddr { .. }
        | InstKind::Undef
        | InstKind::Call { .. }
        | InstKind::Fence
        | InstKind::Trap
        | InstKind::Jump { .. }
        | InstKind::Ret => {}
    }
}

/// Strip GEPs and no-op bitcasts to find a pointer's underlying object
/// (§6: "strips GEPs and no-op casts"). Purely syntactic — no oracle
/// needed.
pub fn get_underlying_object(f: &Function, mut ptr: ValueId) -> ValueId {
    loop {
        match &f.get(ptr).kind {
            InstKind::Gep { base, .. } => ptr = *base,
            InstKind::Bitcast { src } => ptr = *src,
            _ => return ptr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn underlying_object_peels_gep_chain() {
        let mut f = Function::new();
        let bb = f.add_block();
        let base = f.push(bb, InstKind::Alloca { address_space: 0, align: 0 }, Type::Scalar(ScalarKind::Ptr(0)));
        let idx = f.push(bb, InstKind::Const(1), Type::Scalar(ScalarKind::Int(32)));
        let gep1 = f.push(
            bb,
            InstKind::Gep {
                base,
                indices: SmallVec::from_slice(&[GepIndex::Value(idx)]),
                elem_size: 4,
                inbounds: true,
            },
            Type::Scalar(ScalarKind::Ptr(0)),
        );
        let cast = f.push(bb, InstKind::Bitcast { src: gep1 }, Type::Scalar(ScalarKind::Ptr(0)));
        assert_eq!(get_underlying_object(&f, cast), base);
    }

    #[test]
    fn users_of_finds_store_and_load() {
        let mut f = Function::new();
        let bb = f.add_block();
        let base = f.push(bb, InstKind::Alloca { address_space: 0, align: 0 }, Type::Scalar(ScalarKind::Ptr(0)));
        let val = f.push(bb, InstKind::Const(7), Type::Scalar(ScalarKind::Int(32)));
        let store = f.push(
            bb,
            InstKind::Store { ptr: base, value: val, align: 4, simple: true },
            Type::Scalar(ScalarKind::Int(32)),
        );
        let users = f.users_of(base);
        assert_eq!(users, vec![store]);
    }

    #[test]
    fn erase_removes_from_block_order() {
        let mut f = Function::new();
        let bb = f.add_block();
        let a = f.push(bb, InstKind::Const(1), Type::Scalar(ScalarKind::Int(32)));
        let b = f.push(bb, InstKind::Const(2), Type::Scalar(ScalarKind::Int(32)));
        f.erase(a);
        assert_eq!(f.block(bb).instructions, vec![b]);
    }
}
