//! Reference interpreter for [`Function`]s.
//!
//! The interpreter gives the IR a fully defined semantics so instrumented and original functions
//! can be compared by running them:
//! - integer arithmetic wraps at the operand width;
//! - division by zero yields all-ones for quotients and the dividend for remainders, and
//!   `INT_MIN / -1` wraps (the RISC-V convention);
//! - shift amounts are taken modulo the width;
//! - float arithmetic is IEEE-754 in the operand's precision.

use thiserror::Error;

use crate::ir::{
    int_mask, sign_extend, BinOp, BlockId, Constant, FloatPredicate, Function, Inst, InstId,
    InstKind, IntPredicate, Operand, Terminator, Type, ValueId,
};

pub const DEFAULT_MAX_STEPS: u64 = 1_000_000;

/// A runtime value. Equality is bitwise, so identical NaN payloads compare equal.
#[derive(Clone, Copy, Debug)]
pub enum RtValue {
    Int { bits: u32, value: u64 },
    F32(f32),
    F64(f64),
}

impl RtValue {
    pub fn int(ty: Type, value: i64) -> Self {
        let bits = ty.int_bits().unwrap_or(64);
        RtValue::Int {
            bits,
            value: value as u64 & int_mask(bits),
        }
    }

    pub fn i32(value: i32) -> Self {
        Self::int(Type::I32, i64::from(value))
    }

    pub fn bool(value: bool) -> Self {
        Self::int(Type::I1, value as i64)
    }

    pub fn ty(&self) -> Type {
        match self {
            RtValue::Int { bits, .. } => Type::Int(*bits),
            RtValue::F32(_) => Type::F32,
            RtValue::F64(_) => Type::F64,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            RtValue::Int { bits: 1, value } => Some(value & 1 == 1),
            _ => None,
        }
    }

    pub fn as_signed(&self) -> Option<i64> {
        match *self {
            RtValue::Int { bits, value } => Some(sign_extend(value, bits)),
            _ => None,
        }
    }

    pub fn as_unsigned(&self) -> Option<u64> {
        match *self {
            RtValue::Int { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            RtValue::Int { bits: 32, value } => Some(value as u32 as i32),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            RtValue::F32(v) => Some(f64::from(v)),
            RtValue::F64(v) => Some(v),
            RtValue::Int { .. } => None,
        }
    }

    fn from_const(c: &Constant) -> Self {
        match c.ty {
            Type::Int(bits) => RtValue::Int {
                bits,
                value: c.as_unsigned(),
            },
            Type::F32 => RtValue::F32(f32::from_bits(c.bits as u32)),
            Type::F64 => RtValue::F64(f64::from_bits(c.bits)),
        }
    }
}

impl PartialEq for RtValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RtValue::Int { bits: a, value: x }, RtValue::Int { bits: b, value: y }) => {
                a == b && x == y
            }
            (RtValue::F32(x), RtValue::F32(y)) => x.to_bits() == y.to_bits(),
            (RtValue::F64(x), RtValue::F64(y)) => x.to_bits() == y.to_bits(),
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Limits {
    /// Maximum number of executed instructions and terminators.
    pub max_steps: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BranchEvent {
    /// Block whose conditional branch executed.
    pub block: BlockId,
    /// Value of the branch condition.
    pub cond: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Execution {
    pub ret: Option<RtValue>,
    /// Every block entered, in order.
    pub path: Vec<BlockId>,
    pub branches: Vec<BranchEvent>,
}

impl Execution {
    /// Condition observed the first time `block`'s conditional branch executed.
    pub fn branch_cond(&self, block: BlockId) -> Option<bool> {
        self.branches
            .iter()
            .find(|e| e.block == block)
            .map(|e| e.cond)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterpError {
    #[error("expected {expected} arguments, got {found}")]
    ArgCount { expected: usize, found: usize },

    #[error("argument {index} has type {found}, expected {expected}")]
    ArgType {
        index: usize,
        expected: Type,
        found: Type,
    },

    #[error("value {0} used before it was defined")]
    Undefined(ValueId),

    #[error("operand types do not fit instruction {0}")]
    TypeMismatch(InstId),

    #[error("phi {0} appears after a non-phi instruction")]
    MisplacedPhi(InstId),

    #[error("phi {inst} has no incoming value for predecessor {pred}")]
    MissingPhiIncoming { inst: InstId, pred: BlockId },

    #[error("phi {0} executed without a predecessor block")]
    PhiWithoutPredecessor(InstId),

    #[error("block {0} has no terminator")]
    NoTerminator(BlockId),

    #[error("branch condition in block {0} is not an i1")]
    BadCondition(BlockId),

    #[error("reached unreachable in block {0}")]
    Unreachable(BlockId),

    #[error("step limit of {0} exceeded")]
    StepLimit(u64),
}

pub fn run_function(
    func: &Function,
    args: &[RtValue],
    limits: Limits,
) -> Result<Execution, InterpError> {
    if args.len() != func.params.len() {
        return Err(InterpError::ArgCount {
            expected: func.params.len(),
            found: args.len(),
        });
    }

    let mut values: Vec<Option<RtValue>> = vec![None; func.value_types.len()];
    for (index, (&param, arg)) in func.params.iter().zip(args).enumerate() {
        let expected = func.value_types[param.index()];
        if arg.ty() != expected {
            return Err(InterpError::ArgType {
                index,
                expected,
                found: arg.ty(),
            });
        }
        values[param.index()] = Some(*arg);
    }

    let mut exec = Execution::default();
    let mut steps = 0u64;
    let mut prev: Option<BlockId> = None;
    let mut cur = func.entry;

    loop {
        exec.path.push(cur);
        let block = func.block(cur);

        // Phis read their inputs on block entry, all at once.
        let mut phis = Vec::new();
        for inst in &block.insts {
            let InstKind::Phi { incoming } = &inst.kind else {
                break;
            };
            let pred = prev.ok_or(InterpError::PhiWithoutPredecessor(inst.id))?;
            let (_, op) = incoming.iter().find(|(b, _)| *b == pred).ok_or(
                InterpError::MissingPhiIncoming {
                    inst: inst.id,
                    pred,
                },
            )?;
            phis.push((inst.result, eval_operand(op, &values)?));
        }
        let body_start = phis.len();
        for (dst, val) in phis {
            values[dst.index()] = Some(val);
        }

        for inst in &block.insts[body_start..] {
            steps += 1;
            if steps > limits.max_steps {
                return Err(InterpError::StepLimit(limits.max_steps));
            }
            let val = eval_inst(inst, &values)?;
            values[inst.result.index()] = Some(val);
        }

        steps += 1;
        if steps > limits.max_steps {
            return Err(InterpError::StepLimit(limits.max_steps));
        }

        let term = block.term.as_ref().ok_or(InterpError::NoTerminator(cur))?;
        let next = match &term.op {
            Terminator::Br { target } => *target,
            Terminator::CondBr {
                cond,
                then_target,
                else_target,
            } => {
                let c = eval_operand(cond, &values)?
                    .as_bool()
                    .ok_or(InterpError::BadCondition(cur))?;
                exec.branches.push(BranchEvent {
                    block: cur,
                    cond: c,
                });
                if c {
                    *then_target
                } else {
                    *else_target
                }
            }
            Terminator::Ret { value } => {
                exec.ret = value
                    .as_ref()
                    .map(|v| eval_operand(v, &values))
                    .transpose()?;
                return Ok(exec);
            }
            Terminator::Unreachable => return Err(InterpError::Unreachable(cur)),
        };

        prev = Some(cur);
        cur = next;
    }
}

fn eval_operand(op: &Operand, values: &[Option<RtValue>]) -> Result<RtValue, InterpError> {
    match op {
        Operand::Value(v) => values
            .get(v.index())
            .copied()
            .flatten()
            .ok_or(InterpError::Undefined(*v)),
        Operand::Const(c) => Ok(RtValue::from_const(c)),
    }
}

fn eval_inst(inst: &Inst, values: &[Option<RtValue>]) -> Result<RtValue, InterpError> {
    let mismatch = InterpError::TypeMismatch(inst.id);
    match &inst.kind {
        InstKind::Binary { op, lhs, rhs, .. } => {
            let a = eval_operand(lhs, values)?;
            let b = eval_operand(rhs, values)?;
            eval_binary(*op, a, b).ok_or(mismatch)
        }
        InstKind::ICmp { pred, lhs, rhs } => {
            match (eval_operand(lhs, values)?, eval_operand(rhs, values)?) {
                (RtValue::Int { bits, value: x }, RtValue::Int { bits: wb, value: y })
                    if bits == wb =>
                {
                    Ok(RtValue::bool(eval_icmp(*pred, x, y, bits)))
                }
                _ => Err(mismatch),
            }
        }
        InstKind::FCmp { pred, lhs, rhs } => {
            match (eval_operand(lhs, values)?, eval_operand(rhs, values)?) {
                (RtValue::F32(x), RtValue::F32(y)) => {
                    Ok(RtValue::bool(eval_fcmp(*pred, f64::from(x), f64::from(y))))
                }
                (RtValue::F64(x), RtValue::F64(y)) => Ok(RtValue::bool(eval_fcmp(*pred, x, y))),
                _ => Err(mismatch),
            }
        }
        InstKind::Phi { .. } => Err(InterpError::MisplacedPhi(inst.id)),
    }
}

fn eval_binary(op: BinOp, a: RtValue, b: RtValue) -> Option<RtValue> {
    match (a, b) {
        (RtValue::Int { bits, value: x }, RtValue::Int { bits: wb, value: y }) if bits == wb => {
            let r = int_binary(op, x, y, bits)?;
            Some(RtValue::Int {
                bits,
                value: r & int_mask(bits),
            })
        }
        (RtValue::F32(x), RtValue::F32(y)) => {
            let r = match op {
                BinOp::FAdd => x + y,
                BinOp::FSub => x - y,
                BinOp::FMul => x * y,
                BinOp::FDiv => x / y,
                BinOp::FRem => x % y,
                _ => return None,
            };
            Some(RtValue::F32(r))
        }
        (RtValue::F64(x), RtValue::F64(y)) => {
            let r = match op {
                BinOp::FAdd => x + y,
                BinOp::FSub => x - y,
                BinOp::FMul => x * y,
                BinOp::FDiv => x / y,
                BinOp::FRem => x % y,
                _ => return None,
            };
            Some(RtValue::F64(r))
        }
        _ => None,
    }
}

fn int_binary(op: BinOp, x: u64, y: u64, bits: u32) -> Option<u64> {
    let mask = int_mask(bits);
    let sx = sign_extend(x, bits);
    let sy = sign_extend(y, bits);
    let shift = (y % u64::from(bits.max(1))) as u32;
    let r = match op {
        BinOp::Add => x.wrapping_add(y),
        BinOp::Sub => x.wrapping_sub(y),
        BinOp::Mul => x.wrapping_mul(y),
        BinOp::SDiv if y == 0 => mask,
        BinOp::SDiv => sx.wrapping_div(sy) as u64,
        BinOp::UDiv if y == 0 => mask,
        BinOp::UDiv => x / y,
        BinOp::SRem if y == 0 => x,
        BinOp::SRem => sx.wrapping_rem(sy) as u64,
        BinOp::URem if y == 0 => x,
        BinOp::URem => x % y,
        BinOp::And => x & y,
        BinOp::Or => x | y,
        BinOp::Xor => x ^ y,
        BinOp::Shl => x << shift,
        BinOp::LShr => x >> shift,
        BinOp::AShr => (sx >> shift) as u64,
        BinOp::FAdd | BinOp::FSub | BinOp::FMul | BinOp::FDiv | BinOp::FRem => return None,
    };
    Some(r)
}

fn eval_icmp(pred: IntPredicate, x: u64, y: u64, bits: u32) -> bool {
    let sx = sign_extend(x, bits);
    let sy = sign_extend(y, bits);
    match pred {
        IntPredicate::Eq => x == y,
        IntPredicate::Ne => x != y,
        IntPredicate::Slt => sx < sy,
        IntPredicate::Sle => sx <= sy,
        IntPredicate::Sgt => sx > sy,
        IntPredicate::Sge => sx >= sy,
        IntPredicate::Ult => x < y,
        IntPredicate::Ule => x <= y,
        IntPredicate::Ugt => x > y,
        IntPredicate::Uge => x >= y,
    }
}

fn eval_fcmp(pred: FloatPredicate, x: f64, y: f64) -> bool {
    if x.is_nan() || y.is_nan() {
        return false;
    }
    match pred {
        FloatPredicate::Oeq => x == y,
        FloatPredicate::One => x != y,
        FloatPredicate::Olt => x < y,
        FloatPredicate::Ole => x <= y,
        FloatPredicate::Ogt => x > y,
        FloatPredicate::Oge => x >= y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn division_by_zero_is_defined() {
        assert_eq!(int_binary(BinOp::SDiv, 7, 0, 32), Some(0xffff_ffff));
        assert_eq!(int_binary(BinOp::UDiv, 7, 0, 32), Some(0xffff_ffff));
        assert_eq!(int_binary(BinOp::URem, 7, 0, 32), Some(7));
    }

    #[test]
    fn signed_division_overflow_wraps() {
        let min = i32::MIN as u32 as u64;
        let minus_one = u64::from(u32::MAX);
        let r = int_binary(BinOp::SDiv, min, minus_one, 32).unwrap() & int_mask(32);
        assert_eq!(r, min);
    }

    #[test]
    fn ordered_compares_reject_nan() {
        assert!(!eval_fcmp(FloatPredicate::Oeq, f64::NAN, f64::NAN));
        assert!(!eval_fcmp(FloatPredicate::One, f64::NAN, 1.0));
        assert!(eval_fcmp(FloatPredicate::Oeq, f64::INFINITY, f64::INFINITY));
    }

    #[test]
    fn runs_straight_line_function() {
        let mut f = Function::new("f", &[Type::I32, Type::I32], Some(Type::I32));
        let (a, b) = (f.param(0), f.param(1));
        let entry = f.entry;
        let mut bld = f.builder(entry);
        let s = bld.add(a, b);
        let p = bld.mul(s, Constant::int(Type::I32, 3));
        bld.ret(Some(p.into()));

        let out = run_function(
            &f,
            &[RtValue::i32(i32::MAX), RtValue::i32(1)],
            Limits::default(),
        )
        .unwrap();
        assert_eq!(out.ret, Some(RtValue::i32(i32::MIN.wrapping_mul(3))));
        assert_eq!(out.path, vec![entry]);
    }

    #[test]
    fn step_limit_stops_infinite_loops() {
        let mut f = Function::new("spin", &[], None);
        let entry = f.entry;
        f.builder(entry).br(entry);
        let err = run_function(&f, &[], Limits { max_steps: 10 }).unwrap_err();
        assert_eq!(err, InterpError::StepLimit(10));
    }

    #[test]
    fn argument_types_are_checked() {
        let mut f = Function::new("f", &[Type::F64], None);
        let entry = f.entry;
        f.builder(entry).ret(None);
        let err = run_function(&f, &[RtValue::i32(1)], Limits::default()).unwrap_err();
        assert!(matches!(err, InterpError::ArgType { index: 0, .. }));
    }
}
