use crate::ir::{
    BinOp, BlockId, DebugLoc, FloatPredicate, Function, Inst, InstId, InstKind, IntPredicate,
    Operand, TermInst, Terminator, Type, ValueId, WrapFlags,
};

/// Appends instructions to one block of a [`Function`].
///
/// Instructions are always added after the block's existing instructions. Terminator helpers
/// (`br`, `cond_br`, `ret`, `unreachable`) install the block's terminator and return the block
/// id, which doubles as the handle of the created branch.
pub struct InstBuilder<'f> {
    func: &'f mut Function,
    block: BlockId,
    debug_loc: Option<DebugLoc>,
}

impl<'f> InstBuilder<'f> {
    pub fn new(func: &'f mut Function, block: BlockId) -> Self {
        Self {
            func,
            block,
            debug_loc: None,
        }
    }

    /// Debug location attached to every instruction built from now on.
    pub fn set_debug_loc(&mut self, loc: Option<DebugLoc>) {
        self.debug_loc = loc;
    }

    pub fn block(&self) -> BlockId {
        self.block
    }

    pub fn func(&self) -> &Function {
        self.func
    }

    fn operand_type(&self, op: &Operand) -> Type {
        self.func.operand_type(op).unwrap_or_else(|| {
            panic!(
                "operand {op} has no type in function @{}",
                self.func.name
            )
        })
    }

    fn push(&mut self, kind: InstKind, ty: Type) -> (InstId, ValueId) {
        let id = self.func.new_inst_id();
        let result = self.func.new_value(ty);
        let debug_loc = self.debug_loc.clone();
        self.func.block_mut(self.block).insts.push(Inst {
            id,
            result,
            kind,
            debug_loc,
        });
        (id, result)
    }

    /// Build `op lhs, rhs` and return both the instruction id and the result value.
    pub fn binary_inst(
        &mut self,
        op: BinOp,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
        flags: WrapFlags,
    ) -> (InstId, ValueId) {
        let lhs = lhs.into();
        let rhs = rhs.into();
        let ty = self.operand_type(&lhs);
        self.push(
            InstKind::Binary {
                op,
                lhs,
                rhs,
                flags,
            },
            ty,
        )
    }

    pub fn binary(
        &mut self,
        op: BinOp,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> ValueId {
        self.binary_inst(op, lhs, rhs, WrapFlags::empty()).1
    }

    pub fn add(&mut self, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> ValueId {
        self.binary(BinOp::Add, lhs, rhs)
    }

    pub fn sub(&mut self, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> ValueId {
        self.binary(BinOp::Sub, lhs, rhs)
    }

    pub fn mul(&mut self, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> ValueId {
        self.binary(BinOp::Mul, lhs, rhs)
    }

    pub fn sdiv(&mut self, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> ValueId {
        self.binary(BinOp::SDiv, lhs, rhs)
    }

    pub fn udiv(&mut self, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> ValueId {
        self.binary(BinOp::UDiv, lhs, rhs)
    }

    pub fn and(&mut self, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> ValueId {
        self.binary(BinOp::And, lhs, rhs)
    }

    pub fn or(&mut self, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> ValueId {
        self.binary(BinOp::Or, lhs, rhs)
    }

    pub fn icmp(
        &mut self,
        pred: IntPredicate,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> ValueId {
        let kind = InstKind::ICmp {
            pred,
            lhs: lhs.into(),
            rhs: rhs.into(),
        };
        self.push(kind, Type::I1).1
    }

    pub fn fcmp(
        &mut self,
        pred: FloatPredicate,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> ValueId {
        let kind = InstKind::FCmp {
            pred,
            lhs: lhs.into(),
            rhs: rhs.into(),
        };
        self.push(kind, Type::I1).1
    }

    /// Phi nodes must precede every other instruction of the block; the builder does not
    /// reorder.
    pub fn phi(&mut self, ty: Type, incoming: Vec<(BlockId, Operand)>) -> ValueId {
        self.push(InstKind::Phi { incoming }, ty).1
    }

    fn terminate(&mut self, op: Terminator) -> BlockId {
        let block = self.func.block_mut(self.block);
        debug_assert!(
            block.term.is_none(),
            "block {} is already terminated",
            block.name
        );
        let mut term = TermInst::new(op);
        term.debug_loc = self.debug_loc.clone();
        block.term = Some(term);
        self.block
    }

    pub fn br(&mut self, target: BlockId) -> BlockId {
        self.terminate(Terminator::Br { target })
    }

    pub fn cond_br(
        &mut self,
        cond: impl Into<Operand>,
        then_target: BlockId,
        else_target: BlockId,
    ) -> BlockId {
        self.terminate(Terminator::CondBr {
            cond: cond.into(),
            then_target,
            else_target,
        })
    }

    pub fn ret(&mut self, value: Option<Operand>) -> BlockId {
        self.terminate(Terminator::Ret { value })
    }

    pub fn unreachable(&mut self) -> BlockId {
        self.terminate(Terminator::Unreachable)
    }
}

impl Function {
    pub fn builder(&mut self, block: BlockId) -> InstBuilder<'_> {
        InstBuilder::new(self, block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Constant;

    #[test]
    fn binary_result_takes_lhs_type() {
        let mut f = Function::new("f", &[Type::F64, Type::F64], Some(Type::F64));
        let (a, b) = (f.param(0), f.param(1));
        let entry = f.entry;
        let mut bld = f.builder(entry);
        let r = bld.binary(BinOp::FDiv, a, b);
        let c = bld.fcmp(FloatPredicate::Oeq, r, Constant::zero(Type::F64));
        bld.ret(Some(r.into()));

        assert_eq!(f.value_type(r), Some(Type::F64));
        assert_eq!(f.value_type(c), Some(Type::I1));
        assert_eq!(f.block(entry).insts.len(), 2);
    }

    #[test]
    fn debug_loc_is_stamped_on_built_instructions() {
        let mut f = Function::new("f", &[Type::I32], None);
        let a = f.param(0);
        let entry = f.entry;
        let mut bld = f.builder(entry);
        bld.set_debug_loc(Some(DebugLoc::new("a.c", 3, 7)));
        let (id, _) = bld.binary_inst(BinOp::Add, a, a, WrapFlags::NSW);
        bld.ret(None);

        assert_eq!(f.debug_loc(id), Some(&DebugLoc::new("a.c", 3, 7)));
    }
}
