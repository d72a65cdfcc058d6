//! External interfaces the pass consumes (§6), plus reference
//! implementations so the pass can run standalone in tests.
//!
//! A real host compiler would hand in its own alias analysis, scalar
//! evolution engine, dominator tree, and target-transform-info; these
//! traits are the seam. The reference implementations below are honest but
//! conservative — they prove exactly the shapes the worked examples in §8
//! (S1–S6) need and answer "don't know" otherwise, the same posture a
//! stack-discipline-aware `AliasResult`/`PointsToSet` analysis takes.

use crate::ir::{AddressSpace, Function, InstKind, Type, ValueId};
use petgraph::algo::dominators::{self, Dominators};
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::FxHashMap;

/// A memory location: the underlying object plus a byte range relative to
/// it. `None` bounds mean "unknown", forcing a conservative answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemLoc {
    pub base: ValueId,
    pub offset: Option<i64>,
    pub size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasAnswer {
    NoAlias,
    MayAlias,
    MustAlias,
}

pub trait AliasOracle {
    fn no_alias(&self, a: MemLoc, b: MemLoc) -> bool {
        matches!(self.alias(a, b), AliasAnswer::NoAlias)
    }
    fn alias(&self, a: MemLoc, b: MemLoc) -> AliasAnswer;
}

/// Disjoint-constant-range alias oracle: two locations on the same
/// underlying object alias unless their known offset ranges are disjoint;
/// different underlying objects that are both provably-distinct
/// allocations (the common case in the worked examples below) don't
/// alias. Anything involving an unknown offset is conservatively
/// `MayAlias`.
pub struct RangeAliasOracle;

impl AliasOracle for RangeAliasOracle {
    fn alias(&self, a: MemLoc, b: MemLoc) -> AliasAnswer {
        if a.base == b.base {
            match (a.offset, b.offset) {
                (Some(oa), Some(ob)) => {
                    let (lo_a, hi_a) = (oa, oa + a.size as i64);
                    let (lo_b, hi_b) = (ob, ob + b.size as i64);
                    if hi_a <= lo_b || hi_b <= lo_a {
                        AliasAnswer::NoAlias
                    } else if oa == ob && a.size == b.size {
                        AliasAnswer::MustAlias
                    } else {
                        AliasAnswer::MayAlias
                    }
                }
                _ => AliasAnswer::MayAlias,
            }
        } else {
            // Distinct underlying objects: the pass only ever builds
            // `MemLoc`s from `get_underlying_object`, which already
            // resolves to distinct allocations (alloca/global) or
            // opaque values. Distinct allocations never alias.
            AliasAnswer::NoAlias
        }
    }
}

/// A symbolic expression scalar evolution can produce. Only affine forms
/// over a single unknown are modeled — enough for the structural and SCEV
/// probes in §4.B.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SCEVExpr {
    Unknown(ValueId),
    Constant(i64),
    Add(Box<SCEVExpr>, Box<SCEVExpr>),
}

impl SCEVExpr {
    pub fn constant(c: i64) -> Self {
        SCEVExpr::Constant(c)
    }

    pub fn add(a: SCEVExpr, b: SCEVExpr) -> Self {
        SCEVExpr::Add(Box::new(a), Box::new(b))
    }

    /// Fold nested constant adds so structurally-equal expressions compare
    /// equal regardless of how they were built up (`a + 1` and
    /// `Add(a, Constant(1))` vs `Add(Constant(1), a)`).
    pub fn normalize(&self) -> SCEVExpr {
        match self {
            SCEVExpr::Unknown(v) => SCEVExpr::Unknown(*v),
            SCEVExpr::Constant(c) => SCEVExpr::Constant(*c),
            SCEVExpr::Add(a, b) => {
                let (a, b) = (a.normalize(), b.normalize());
                match (a, b) {
                    (SCEVExpr::Constant(x), SCEVExpr::Constant(y)) => SCEVExpr::Constant(x + y),
                    (SCEVExpr::Unknown(v), SCEVExpr::Constant(c))
                    | (SCEVExpr::Constant(c), SCEVExpr::Unknown(v)) => {
                        if c == 0 {
                            SCEVExpr::Unknown(v)
                        } else {
                            SCEVExpr::Add(Box::new(SCEVExpr::Unknown(v)), Box::new(SCEVExpr::Constant(c)))
                        }
                    }
                    (a, b) => SCEVExpr::Add(Box::new(a), Box::new(b)),
                }
            }
        }
    }

    pub fn structurally_equal(&self, other: &SCEVExpr) -> bool {
        self.normalize() == other.normalize()
    }
}

pub trait ScalarEvolutionOracle {
    /// Symbolic expression for `v`, as seen at `v`'s own definition point.
    fn scev(&self, f: &Function, v: ValueId) -> SCEVExpr;
}

/// Walks `Const`/`Add`/`SExt`/`ZExt` chains to build an affine expression;
/// anything else becomes `Unknown(v)`, matching real scalar-evolution
/// oracles' behavior of bottoming out at opaque values.
pub struct AffineScalarEvolution;

impl ScalarEvolutionOracle for AffineScalarEvolution {
    fn scev(&self, f: &Function, v: ValueId) -> SCEVExpr {
        match &f.get(v).kind {
            InstKind::Const(c) => SCEVExpr::Constant(*c),
            InstKind::Add { lhs, rhs, .. } => {
                SCEVExpr::add(self.scev(f, *lhs), self.scev(f, *rhs)).normalize()
            }
            InstKind::SExt { src } | InstKind::ZExt { src } => self.scev(f, *src),
            _ => SCEVExpr::Unknown(v),
        }
    }
}

/// Known-zero/known-one bitmasks for a value's low 64 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownBits {
    pub zero: u64,
    pub one: u64,
}

impl KnownBits {
    pub fn unknown() -> Self {
        Self { zero: 0, one: 0 }
    }

    pub fn exact(value: i64) -> Self {
        let bits = value as u64;
        Self { zero: !bits, one: bits }
    }

    /// True if some bit strictly above the sign bit (bit `width - 1`, for a
    /// value of `width` bits) is known zero — the non-overflow proof
    /// §4.B.4.b needs "at least one high bit **other than the sign bit**".
    /// The sign bit itself must not count, so the mask starts at `width`,
    /// not `width - 1`.
    pub fn has_known_zero_high_bit(&self, width: u32) -> bool {
        if width == 0 || width >= 64 {
            return false;
        }
        let high_mask = !0u64 << width;
        self.zero & high_mask != 0
    }
}

pub trait KnownBitsOracle {
    fn known_bits(&self, f: &Function, v: ValueId) -> KnownBits;
}

/// One-step constant propagation: exact for `Const`, otherwise unknown.
/// A real implementation would walk backward through arithmetic with
/// interval ranges; the worked example in §8 (S5) only needs to recognize
/// a provably-non-negative induction variable, which the structural
/// probe's `nsw`/`nuw`-flag branch already covers without known-bits, so
/// this conservative stand-in is sufficient.
pub struct ConstantKnownBits;

impl KnownBitsOracle for ConstantKnownBits {
    fn known_bits(&self, f: &Function, v: ValueId) -> KnownBits {
        match &f.get(v).kind {
            InstKind::Const(c) => KnownBits::exact(*c),
            _ => KnownBits::unknown(),
        }
    }
}

pub trait DominatorTreeOracle {
    fn dominates(&self, f: &Function, a: ValueId, b: ValueId) -> bool;
}

/// Dominator tree computed over the function's block CFG with
/// `petgraph::algo::dominators`, extended to instruction granularity: a
/// dominates b if a's block strictly dominates b's block, or they share a
/// block and a comes first (or they're the same instruction).
pub struct CfgDominatorTree {
    order: FxHashMap<crate::ir::BlockId, NodeIndex>,
    doms: Dominators<NodeIndex>,
}

impl CfgDominatorTree {
    pub fn build(f: &Function) -> Self {
        let mut graph = DiGraph::new();
        let mut order = FxHashMap::default();
        for block in f.blocks() {
            let idx = graph.add_node(block.id);
            order.insert(block.id, idx);
        }
        for block in f.blocks() {
            for succ in f.successors(block.id) {
                graph.add_edge(order[&block.id], order[&succ], ());
            }
        }
        let entry = f
            .blocks()
            .first()
            .map(|b| order[&b.id])
            .unwrap_or_else(|| graph.add_node(crate::ir::BlockId(0)));
        let doms = dominators::simple_fast(&graph, entry);
        Self { order, doms }
    }

    fn block_dominates(&self, a: crate::ir::BlockId, b: crate::ir::BlockId) -> bool {
        if a == b {
            return true;
        }
        let (Some(&na), Some(&nb)) = (self.order.get(&a), self.order.get(&b)) else {
            return false;
        };
        self.doms.dominators(nb).map(|mut it| it.any(|n| n == na)).unwrap_or(false)
    }
}

impl DominatorTreeOracle for CfgDominatorTree {
    fn dominates(&self, f: &Function, a: ValueId, b: ValueId) -> bool {
        let (Some(ba), Some(bb)) = (f.block_of(a), f.block_of(b)) else {
            return false;
        };
        if ba == bb {
            let (Some(pa), Some(pb)) = (f.position_in_block(a), f.position_in_block(b)) else {
                return false;
            };
            pa <= pb
        } else {
            self.block_dominates(ba, bb)
        }
    }
}

pub trait TargetTransformInfo {
    /// Hardware-maximum bit width a single load/store can move in
    /// `address_space`.
    fn vec_reg_bit_width(&self, address_space: AddressSpace) -> u32;
}

pub trait DataLayout {
    fn pointer_size_in_bits(&self, address_space: AddressSpace) -> u32;
    fn type_store_size(&self, ty: &Type) -> u32;
    fn abi_type_alignment(&self, ty: &Type) -> u32;
    fn type_size_in_bits(&self, ty: &Type) -> u32;
}

/// A minimal target description sufficient for the examples in §8: a
/// uniform vector register width and pointer size per address space,
/// falling back to a default for address spaces it hasn't been told about.
pub struct TargetProfile {
    pub default_vec_reg_bits: u32,
    pub default_pointer_bits: u32,
    pub vec_reg_bits: FxHashMap<AddressSpace, u32>,
}

impl TargetProfile {
    pub fn new(default_vec_reg_bits: u32, default_pointer_bits: u32) -> Self {
        Self {
            default_vec_reg_bits,
            default_pointer_bits,
            vec_reg_bits: FxHashMap::default(),
        }
    }

    pub fn with_vec_reg_bits(mut self, address_space: AddressSpace, bits: u32) -> Self {
        self.vec_reg_bits.insert(address_space, bits);
        self
    }
}

impl Default for TargetProfile {
    fn default() -> Self {
        Self::new(128, 64)
    }
}

impl TargetTransformInfo for TargetProfile {
    fn vec_reg_bit_width(&self, address_space: AddressSpace) -> u32 {
        *self.vec_reg_bits.get(&address_space).unwrap_or(&self.default_vec_reg_bits)
    }
}

impl DataLayout for TargetProfile {
    fn pointer_size_in_bits(&self, _address_space: AddressSpace) -> u32 {
        self.default_pointer_bits
    }

    fn type_store_size(&self, ty: &Type) -> u32 {
        (self.type_size_in_bits(ty) + 7) / 8
    }

    fn abi_type_alignment(&self, ty: &Type) -> u32 {
        (self.type_store_size(ty)).next_power_of_two().max(1)
    }

    fn type_size_in_bits(&self, ty: &Type) -> u32 {
        let elem_bits = match ty.scalar_element() {
            crate::ir::ScalarKind::Ptr(as_) => self.pointer_size_in_bits(as_),
            k => k.bit_size(),
        };
        elem_bits * ty.lanes()
    }
}

/// Bundle of borrowed oracles for one `Vectorizer::run` call (§5: the pass
/// assumes they remain valid for the lifetime of one `run` call).
pub struct Context<'a> {
    pub alias: &'a dyn AliasOracle,
    pub scev: &'a dyn ScalarEvolutionOracle,
    pub dom: &'a dyn DominatorTreeOracle,
    pub tti: &'a dyn TargetTransformInfo,
    pub layout: &'a dyn DataLayout,
    pub known_bits: &'a dyn KnownBitsOracle,
}
