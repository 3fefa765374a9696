use std::collections::BTreeMap;
use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueId(pub u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%v{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Stable instruction identity. Ids survive block splits, so a work list of `InstId`s taken
/// before any CFG surgery stays valid for the whole pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstId(pub u32);

impl fmt::Display for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---- Types and constants ----------------------------------------------------------------------

/// Value types. Integers are signless (the opcode or predicate decides signedness), as in LLVM.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    Int(u32),
    F32,
    F64,
}

impl Type {
    pub const I1: Type = Type::Int(1);
    pub const I8: Type = Type::Int(8);
    pub const I16: Type = Type::Int(16);
    pub const I32: Type = Type::Int(32);
    pub const I64: Type = Type::Int(64);

    pub fn is_int(self) -> bool {
        matches!(self, Type::Int(_))
    }

    pub fn is_int_of(self, bits: u32) -> bool {
        self == Type::Int(bits)
    }

    pub fn is_float(self) -> bool {
        matches!(self, Type::F32 | Type::F64)
    }

    pub fn int_bits(self) -> Option<u32> {
        match self {
            Type::Int(bits) => Some(bits),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int(bits) => write!(f, "i{bits}"),
            Type::F32 => f.write_str("float"),
            Type::F64 => f.write_str("double"),
        }
    }
}

/// All-ones mask for an integer of `bits` width.
pub fn int_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Interpret the low `bits` of `value` as a two's complement integer.
pub fn sign_extend(value: u64, bits: u32) -> i64 {
    if bits == 0 || bits >= 64 {
        return value as i64;
    }
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

/// A typed constant. `bits` holds the raw pattern: the low `N` bits for `iN`, the IEEE-754
/// encoding for floats (`f32` in the low 32 bits).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constant {
    pub ty: Type,
    pub bits: u64,
}

impl Constant {
    /// Integer constant, truncated to the width of `ty`.
    pub fn int(ty: Type, value: i64) -> Self {
        let bits = ty.int_bits().unwrap_or(64);
        Self {
            ty,
            bits: value as u64 & int_mask(bits),
        }
    }

    pub fn bool(value: bool) -> Self {
        Self::int(Type::I1, value as i64)
    }

    pub fn signed_max(ty: Type) -> Self {
        let bits = ty.int_bits().unwrap_or(64);
        Self {
            ty,
            bits: int_mask(bits) >> 1,
        }
    }

    pub fn signed_min(ty: Type) -> Self {
        let bits = ty.int_bits().unwrap_or(64);
        Self {
            ty,
            bits: 1u64 << (bits - 1),
        }
    }

    pub fn unsigned_max(ty: Type) -> Self {
        let bits = ty.int_bits().unwrap_or(64);
        Self {
            ty,
            bits: int_mask(bits),
        }
    }

    /// Float constant of type `ty`, rounded to `f32` when needed.
    pub fn float(ty: Type, value: f64) -> Self {
        let bits = match ty {
            Type::F32 => u64::from((value as f32).to_bits()),
            _ => value.to_bits(),
        };
        Self { ty, bits }
    }

    pub fn infinity(ty: Type, negative: bool) -> Self {
        let inf = if negative {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
        Self::float(ty, inf)
    }

    /// `0` for integers, `+0.0` for floats.
    pub fn zero(ty: Type) -> Self {
        Self { ty, bits: 0 }
    }

    pub fn as_unsigned(&self) -> u64 {
        self.bits & int_mask(self.ty.int_bits().unwrap_or(64))
    }

    pub fn as_signed(&self) -> i64 {
        sign_extend(self.bits, self.ty.int_bits().unwrap_or(64))
    }

    pub fn as_f64(&self) -> f64 {
        match self.ty {
            Type::F32 => f64::from(f32::from_bits(self.bits as u32)),
            Type::F64 => f64::from_bits(self.bits),
            Type::Int(_) => self.as_signed() as f64,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ty {
            Type::Int(1) => f.write_str(if self.bits & 1 == 1 { "true" } else { "false" }),
            Type::Int(_) => write!(f, "{}", self.as_signed()),
            Type::F32 | Type::F64 => {
                let v = self.as_f64();
                if v.is_infinite() {
                    f.write_str(if v > 0.0 { "+inf" } else { "-inf" })
                } else {
                    write!(f, "{v:?}")
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Value(ValueId),
    Const(Constant),
}

impl From<ValueId> for Operand {
    fn from(v: ValueId) -> Self {
        Operand::Value(v)
    }
}

impl From<Constant> for Operand {
    fn from(c: Constant) -> Self {
        Operand::Const(c)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Value(v) => write!(f, "{v}"),
            Operand::Const(c) => write!(f, "{c}"),
        }
    }
}

// ---- Instructions -----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SRem,
    URem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
}

impl BinOp {
    pub fn is_float(self) -> bool {
        matches!(
            self,
            BinOp::FAdd | BinOp::FSub | BinOp::FMul | BinOp::FDiv | BinOp::FRem
        )
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::SDiv => "sdiv",
            BinOp::UDiv => "udiv",
            BinOp::SRem => "srem",
            BinOp::URem => "urem",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
            BinOp::LShr => "lshr",
            BinOp::AShr => "ashr",
            BinOp::FAdd => "fadd",
            BinOp::FSub => "fsub",
            BinOp::FMul => "fmul",
            BinOp::FDiv => "fdiv",
            BinOp::FRem => "frem",
        }
    }
}

bitflags! {
    /// Wrap guarantees already proven for an integer operation.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct WrapFlags: u8 {
        /// No signed wrap.
        const NSW = 1 << 0;
        /// No unsigned wrap.
        const NUW = 1 << 1;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntPredicate {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

impl IntPredicate {
    pub fn mnemonic(self) -> &'static str {
        match self {
            IntPredicate::Eq => "eq",
            IntPredicate::Ne => "ne",
            IntPredicate::Slt => "slt",
            IntPredicate::Sle => "sle",
            IntPredicate::Sgt => "sgt",
            IntPredicate::Sge => "sge",
            IntPredicate::Ult => "ult",
            IntPredicate::Ule => "ule",
            IntPredicate::Ugt => "ugt",
            IntPredicate::Uge => "uge",
        }
    }
}

/// Ordered float comparisons: false whenever either side is NaN.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloatPredicate {
    Oeq,
    One,
    Olt,
    Ole,
    Ogt,
    Oge,
}

impl FloatPredicate {
    pub fn mnemonic(self) -> &'static str {
        match self {
            FloatPredicate::Oeq => "oeq",
            FloatPredicate::One => "one",
            FloatPredicate::Olt => "olt",
            FloatPredicate::Ole => "ole",
            FloatPredicate::Ogt => "ogt",
            FloatPredicate::Oge => "oge",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DebugLoc {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl DebugLoc {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for DebugLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstKind {
    Binary {
        op: BinOp,
        lhs: Operand,
        rhs: Operand,
        #[serde(default, skip_serializing_if = "WrapFlags::is_empty")]
        flags: WrapFlags,
    },
    ICmp {
        pred: IntPredicate,
        lhs: Operand,
        rhs: Operand,
    },
    FCmp {
        pred: FloatPredicate,
        lhs: Operand,
        rhs: Operand,
    },
    Phi {
        incoming: Vec<(BlockId, Operand)>,
    },
}

impl InstKind {
    pub fn visit_operands(&self, mut f: impl FnMut(&Operand)) {
        match self {
            InstKind::Binary { lhs, rhs, .. }
            | InstKind::ICmp { lhs, rhs, .. }
            | InstKind::FCmp { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            InstKind::Phi { incoming } => {
                for (_, v) in incoming {
                    f(v);
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inst {
    pub id: InstId,
    pub result: ValueId,
    pub kind: InstKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_loc: Option<DebugLoc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terminator {
    Br {
        target: BlockId,
    },
    CondBr {
        cond: Operand,
        then_target: BlockId,
        else_target: BlockId,
    },
    Ret {
        value: Option<Operand>,
    },
    Unreachable,
}

impl Terminator {
    /// Successor edges in operand order; a conditional branch whose arms agree yields the same
    /// block twice.
    pub fn successors(&self) -> Vec<BlockId> {
        match *self {
            Terminator::Br { target } => vec![target],
            Terminator::CondBr {
                then_target,
                else_target,
                ..
            } => vec![then_target, else_target],
            Terminator::Ret { .. } | Terminator::Unreachable => Vec::new(),
        }
    }
}

/// A block terminator together with the attachments a branch can carry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermInst {
    pub op: Terminator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_loc: Option<DebugLoc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl TermInst {
    pub fn new(op: Terminator) -> Self {
        Self {
            op,
            debug_loc: None,
            metadata: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub name: String,
    pub insts: Vec<Inst>,
    /// `None` only while the block is under construction.
    pub term: Option<TermInst>,
}

impl Block {
    pub fn successors(&self) -> Vec<BlockId> {
        self.term
            .as_ref()
            .map(|t| t.op.successors())
            .unwrap_or_default()
    }
}

// ---- Functions --------------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<ValueId>,
    #[serde(default)]
    pub ret_ty: Option<Type>,
    /// Type of every SSA value, indexed by [`ValueId`].
    pub value_types: Vec<Type>,
    /// Block arena, indexed by [`BlockId`]. Blocks are never removed.
    pub blocks: Vec<Block>,
    /// Block order used for printing and iteration.
    pub layout: Vec<BlockId>,
    pub entry: BlockId,
    /// Next free [`InstId`].
    pub inst_count: u32,
}

impl Function {
    /// Create a function with an empty, unterminated `entry` block.
    pub fn new(name: impl Into<String>, param_tys: &[Type], ret_ty: Option<Type>) -> Self {
        let mut func = Self {
            name: name.into(),
            params: Vec::new(),
            ret_ty,
            value_types: Vec::new(),
            blocks: Vec::new(),
            layout: Vec::new(),
            entry: BlockId(0),
            inst_count: 0,
        };
        for &ty in param_tys {
            let v = func.new_value(ty);
            func.params.push(v);
        }
        func.entry = func.create_block("entry");
        func
    }

    pub fn param(&self, index: usize) -> ValueId {
        self.params[index]
    }

    pub fn new_value(&mut self, ty: Type) -> ValueId {
        let id = ValueId(self.value_types.len() as u32);
        self.value_types.push(ty);
        id
    }

    pub(crate) fn new_inst_id(&mut self) -> InstId {
        let id = InstId(self.inst_count);
        self.inst_count += 1;
        id
    }

    pub fn value_type(&self, v: ValueId) -> Option<Type> {
        self.value_types.get(v.index()).copied()
    }

    pub fn operand_type(&self, op: &Operand) -> Option<Type> {
        match op {
            Operand::Value(v) => self.value_type(*v),
            Operand::Const(c) => Some(c.ty),
        }
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    pub fn block_count(&self) -> usize {
        self.layout.len()
    }

    /// Total number of CFG edges (a conditional branch always contributes two).
    pub fn edge_count(&self) -> usize {
        self.layout
            .iter()
            .map(|&b| self.block(b).successors().len())
            .sum()
    }

    pub fn blocks_in_layout(&self) -> impl Iterator<Item = &Block> + '_ {
        self.layout.iter().map(move |&b| self.block(b))
    }

    pub fn find_block(&self, name: &str) -> Option<BlockId> {
        self.blocks.iter().find(|b| b.name == name).map(|b| b.id)
    }

    fn unique_block_name(&self, base: &str) -> String {
        if self.find_block(base).is_none() {
            return base.to_string();
        }
        let mut n = 1u32;
        loop {
            let candidate = format!("{base}{n}");
            if self.find_block(&candidate).is_none() {
                return candidate;
            }
            n += 1;
        }
    }

    /// Append a new, unterminated block at the end of the layout. Clashing names get a numeric
    /// suffix.
    pub fn create_block(&mut self, name: &str) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        let name = self.unique_block_name(name);
        self.blocks.push(Block {
            id,
            name,
            insts: Vec::new(),
            term: None,
        });
        self.layout.push(id);
        id
    }

    /// Snapshot of every instruction id in layout order.
    pub fn inst_ids(&self) -> Vec<InstId> {
        self.blocks_in_layout()
            .flat_map(|b| b.insts.iter().map(|i| i.id))
            .collect()
    }

    pub fn locate(&self, inst: InstId) -> Option<(BlockId, usize)> {
        self.blocks_in_layout().find_map(|b| {
            b.insts
                .iter()
                .position(|i| i.id == inst)
                .map(|pos| (b.id, pos))
        })
    }

    pub fn inst(&self, inst: InstId) -> Option<&Inst> {
        let (block, pos) = self.locate(inst)?;
        Some(&self.block(block).insts[pos])
    }

    pub fn debug_loc(&self, inst: InstId) -> Option<&DebugLoc> {
        self.inst(inst)?.debug_loc.as_ref()
    }

    /// Split the block containing `inst` right after it.
    ///
    /// Everything following `inst` (including the terminator) moves into a new block named
    /// `origin_cont`, which is placed right after the original block in the layout. The original
    /// block is closed with an unconditional branch to the continuation and phi nodes in the
    /// moved terminator's successors are re-pointed at the continuation.
    /// Successor ids that name no block of the function are left as they are.
    ///
    /// Returns `None` (leaving the function untouched) when `inst` is not in the function or
    /// has neither a following instruction nor a terminator to split before.
    pub fn split_block_after(&mut self, inst: InstId) -> Option<(BlockId, BlockId)> {
        let (origin, pos) = self.locate(inst)?;
        {
            let block = self.block(origin);
            if pos + 1 == block.insts.len() && block.term.is_none() {
                return None;
            }
        }

        let cont = BlockId(self.blocks.len() as u32);
        let name = self.unique_block_name("origin_cont");
        let block = self.block_mut(origin);
        let moved = block.insts.split_off(pos + 1);
        let term = block.term.replace(TermInst::new(Terminator::Br { target: cont }));
        let successors = term.as_ref().map(|t| t.op.successors()).unwrap_or_default();

        self.blocks.push(Block {
            id: cont,
            name,
            insts: moved,
            term,
        });
        let layout_pos = self
            .layout
            .iter()
            .position(|&b| b == origin)
            .map_or(self.layout.len(), |p| p + 1);
        self.layout.insert(layout_pos, cont);

        let mut seen = Vec::new();
        for succ in successors {
            if seen.contains(&succ) {
                continue;
            }
            seen.push(succ);
            let Some(succ_block) = self.blocks.get_mut(succ.index()) else {
                continue;
            };
            for phi in succ_block.insts.iter_mut() {
                if let InstKind::Phi { incoming } = &mut phi.kind {
                    for (pred, _) in incoming.iter_mut() {
                        if *pred == origin {
                            *pred = cont;
                        }
                    }
                }
            }
        }

        Some((origin, cont))
    }

    /// Remove and return the terminator of `block`.
    pub fn erase_terminator(&mut self, block: BlockId) -> Option<TermInst> {
        self.block_mut(block).term.take()
    }

    /// Attach `key = value` to the terminator of `branch`, replacing any previous value for the
    /// key. Returns `false` if the block has no terminator.
    pub fn attach_metadata(&mut self, branch: BlockId, key: &str, value: &str) -> bool {
        match self.block_mut(branch).term.as_mut() {
            Some(term) => {
                term.metadata.insert(key.to_string(), value.to_string());
                true
            }
            None => false,
        }
    }

    pub fn metadata(&self, branch: BlockId, key: &str) -> Option<&str> {
        self.block(branch)
            .term
            .as_ref()?
            .metadata
            .get(key)
            .map(String::as_str)
    }

    pub fn set_branch_debug_loc(&mut self, branch: BlockId, loc: Option<DebugLoc>) {
        if let Some(term) = self.block_mut(branch).term.as_mut() {
            term.debug_loc = loc;
        }
    }

    /// Deduplicated predecessor lists for every block in the layout.
    pub fn predecessors(&self) -> BTreeMap<BlockId, Vec<BlockId>> {
        let mut preds: BTreeMap<BlockId, Vec<BlockId>> =
            self.layout.iter().map(|&b| (b, Vec::new())).collect();
        for block in self.blocks_in_layout() {
            for succ in block.successors() {
                let list = preds.entry(succ).or_default();
                if !list.contains(&block.id) {
                    list.push(block.id);
                }
            }
        }
        preds
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
        }
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}
