//! Condition synthesis: deciding whether an instruction is instrumented and building the
//! boolean predicate of each check.
//!
//! Predicate builders only append instructions to the block they are handed; they never touch
//! control flow. Which checks apply to an operator, and in which order, is fixed by the static
//! tables below.

mod float;
mod int;

use std::fmt;

use serde::{Deserialize, Serialize};
use symros_ir::{BinOp, Function, Inst, InstBuilder, InstKind, Operand, Type, ValueId, WrapFlags};

use crate::config::{InstrumentOptions, ThresholdConfig};
use crate::tag::CheckKind;

/// Integer instructions are only instrumented at this width.
pub const INSTRUMENTED_INT_BITS: u32 = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Int,
    Float,
}

/// The instrumented instruction as seen by predicate builders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Operands {
    pub op: BinOp,
    pub ty: Type,
    pub lhs: Operand,
    pub rhs: Operand,
    pub result: ValueId,
}

pub type PredicateFn = fn(&mut InstBuilder<'_>, &Operands, &ThresholdConfig) -> ValueId;

#[derive(Clone, Copy)]
pub struct CheckSpec {
    pub kind: CheckKind,
    pub build: PredicateFn,
}

impl fmt::Debug for CheckSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CheckSpec").field(&self.kind).finish()
    }
}

// ---- Dispatch tables --------------------------------------------------------------------------

const ADD_CHECKS: &[CheckSpec] = &[
    CheckSpec {
        kind: CheckKind::IntOverflow,
        build: int::add_overflow,
    },
    CheckSpec {
        kind: CheckKind::IntExceptionalSignedValue,
        build: int::signed_bound,
    },
    CheckSpec {
        kind: CheckKind::IntExceptionalUnsignedValue,
        build: int::unsigned_bound,
    },
];

const SUB_CHECKS: &[CheckSpec] = &[
    CheckSpec {
        kind: CheckKind::IntOverflow,
        build: int::sub_overflow,
    },
    CheckSpec {
        kind: CheckKind::IntExceptionalSignedValue,
        build: int::signed_bound,
    },
    CheckSpec {
        kind: CheckKind::IntExceptionalUnsignedValue,
        build: int::unsigned_bound,
    },
];

const MUL_CHECKS: &[CheckSpec] = &[
    CheckSpec {
        kind: CheckKind::IntOverflow,
        build: int::mul_overflow,
    },
    CheckSpec {
        kind: CheckKind::IntExceptionalSignedValue,
        build: int::signed_bound,
    },
    CheckSpec {
        kind: CheckKind::IntExceptionalUnsignedValue,
        build: int::unsigned_bound,
    },
];

const DIV_CHECKS: &[CheckSpec] = &[
    CheckSpec {
        kind: CheckKind::IntDividedByZero,
        build: int::divided_by_zero,
    },
    CheckSpec {
        kind: CheckKind::IntExceptionalSignedValue,
        build: int::signed_bound,
    },
    CheckSpec {
        kind: CheckKind::IntExceptionalUnsignedValue,
        build: int::unsigned_bound,
    },
];

const FDIV_CHECKS: &[CheckSpec] = &[
    CheckSpec {
        kind: CheckKind::FpOverflow,
        build: float::overflow,
    },
    CheckSpec {
        kind: CheckKind::FpDividedByZero,
        build: float::divided_by_zero,
    },
    CheckSpec {
        kind: CheckKind::FpExceptionalValue,
        build: float::bound,
    },
];

const FLOAT_CHECKS: &[CheckSpec] = &[
    CheckSpec {
        kind: CheckKind::FpOverflow,
        build: float::overflow,
    },
    CheckSpec {
        kind: CheckKind::FpExceptionalValue,
        build: float::bound,
    },
];

/// Ordered checks for `op`; empty for operators that are never instrumented.
pub fn checks_for(op: BinOp) -> &'static [CheckSpec] {
    match op {
        BinOp::Add => ADD_CHECKS,
        BinOp::Sub => SUB_CHECKS,
        BinOp::Mul => MUL_CHECKS,
        BinOp::SDiv | BinOp::UDiv => DIV_CHECKS,
        BinOp::FDiv => FDIV_CHECKS,
        BinOp::FAdd | BinOp::FSub | BinOp::FMul | BinOp::FRem => FLOAT_CHECKS,
        BinOp::SRem
        | BinOp::URem
        | BinOp::And
        | BinOp::Or
        | BinOp::Xor
        | BinOp::Shl
        | BinOp::LShr
        | BinOp::AShr => &[],
    }
}

// ---- Qualification ----------------------------------------------------------------------------

/// Why an arithmetic instruction was left alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The instruction's family (integer or float) is switched off.
    FamilyDisabled,
    /// Integer operands are not `i32`.
    UnsupportedType,
    /// The instruction already carries `nsw`/`nuw`.
    NoWrapFlags,
    /// No checks exist for the operator.
    UnsupportedOp,
    /// Operand and result types disagree.
    OperandType,
    /// Nothing follows the instruction in its block, so there is nowhere to split.
    NoSplitPoint,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::FamilyDisabled => "check family disabled",
            SkipReason::UnsupportedType => "operands are not i32",
            SkipReason::NoWrapFlags => "carries nsw/nuw",
            SkipReason::UnsupportedOp => "operator has no checks",
            SkipReason::OperandType => "operand types disagree",
            SkipReason::NoSplitPoint => "no split point",
        };
        f.write_str(s)
    }
}

/// An instruction that passed qualification, with its check chain.
#[derive(Clone, Copy, Debug)]
pub struct Qualified {
    pub family: Family,
    pub operands: Operands,
    pub checks: &'static [CheckSpec],
}

/// Decide whether `inst` is instrumented under `options`.
pub fn qualify(
    func: &Function,
    inst: &Inst,
    options: &InstrumentOptions,
) -> Result<Qualified, SkipReason> {
    let InstKind::Binary {
        op,
        lhs,
        rhs,
        flags,
    } = &inst.kind
    else {
        return Err(SkipReason::UnsupportedOp);
    };
    let (op, lhs, rhs, flags) = (*op, *lhs, *rhs, *flags);
    let result_ty = func.value_type(inst.result);
    let lhs_ty = func.operand_type(&lhs);
    let rhs_ty = func.operand_type(&rhs);

    let float_result = result_ty.is_some_and(Type::is_float);
    if float_result || op.is_float() {
        if !options.fp_checks {
            return Err(SkipReason::FamilyDisabled);
        }
        let ty = match result_ty {
            Some(ty) if ty.is_float() && op.is_float() && lhs_ty == result_ty && rhs_ty == lhs_ty => {
                ty
            }
            _ => return Err(SkipReason::OperandType),
        };
        return Ok(Qualified {
            family: Family::Float,
            operands: Operands {
                op,
                ty,
                lhs,
                rhs,
                result: inst.result,
            },
            checks: checks_for(op),
        });
    }

    if !options.int_checks {
        return Err(SkipReason::FamilyDisabled);
    }
    let instrumented_width =
        |ty: Option<Type>| ty.is_some_and(|t| t.is_int_of(INSTRUMENTED_INT_BITS));
    if !instrumented_width(lhs_ty) || !instrumented_width(rhs_ty) {
        return Err(SkipReason::UnsupportedType);
    }
    if flags.intersects(WrapFlags::NSW | WrapFlags::NUW) {
        return Err(SkipReason::NoWrapFlags);
    }
    let checks = checks_for(op);
    if checks.is_empty() {
        return Err(SkipReason::UnsupportedOp);
    }
    if !instrumented_width(result_ty) {
        return Err(SkipReason::OperandType);
    }
    Ok(Qualified {
        family: Family::Int,
        operands: Operands {
            op,
            ty: Type::Int(INSTRUMENTED_INT_BITS),
            lhs,
            rhs,
            result: inst.result,
        },
        checks,
    })
}

/// Builds check predicates against one fixed threshold.
#[derive(Clone, Copy, Debug)]
pub struct ConditionSynthesizer<'c> {
    config: &'c ThresholdConfig,
}

impl<'c> ConditionSynthesizer<'c> {
    pub fn new(config: &'c ThresholdConfig) -> Self {
        Self { config }
    }

    /// Append the predicate of `spec` to the builder's block and return the `i1` result.
    pub fn build(
        &self,
        b: &mut InstBuilder<'_>,
        spec: &CheckSpec,
        operands: &Operands,
    ) -> ValueId {
        (spec.build)(b, operands, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symros_ir::Constant;

    fn single_binary(op: BinOp, ty: Type, flags: WrapFlags) -> Function {
        let mut f = Function::new("f", &[ty, ty], Some(ty));
        let (a, b) = (f.param(0), f.param(1));
        let entry = f.entry;
        let mut bld = f.builder(entry);
        let (_, r) = bld.binary_inst(op, a, b, flags);
        bld.ret(Some(r.into()));
        f
    }

    fn qualify_first(f: &Function, options: &InstrumentOptions) -> Result<Qualified, SkipReason> {
        qualify(f, &f.block(f.entry).insts[0], options)
    }

    fn kinds(q: &Qualified) -> Vec<CheckKind> {
        q.checks.iter().map(|c| c.kind).collect()
    }

    #[test]
    fn integer_tables_put_overflow_or_zero_first() {
        let opts = InstrumentOptions::default();
        let add = qualify_first(&single_binary(BinOp::Add, Type::I32, WrapFlags::empty()), &opts);
        assert_eq!(
            kinds(&add.unwrap()),
            [
                CheckKind::IntOverflow,
                CheckKind::IntExceptionalSignedValue,
                CheckKind::IntExceptionalUnsignedValue
            ]
        );
        let div = qualify_first(&single_binary(BinOp::UDiv, Type::I32, WrapFlags::empty()), &opts);
        assert_eq!(
            kinds(&div.unwrap()),
            [
                CheckKind::IntDividedByZero,
                CheckKind::IntExceptionalSignedValue,
                CheckKind::IntExceptionalUnsignedValue
            ]
        );
    }

    #[test]
    fn fdiv_checks_division_by_zero_before_bounds() {
        let opts = InstrumentOptions::default();
        let q = qualify_first(&single_binary(BinOp::FDiv, Type::F32, WrapFlags::empty()), &opts)
            .unwrap();
        assert_eq!(q.family, Family::Float);
        assert_eq!(
            kinds(&q),
            [
                CheckKind::FpOverflow,
                CheckKind::FpDividedByZero,
                CheckKind::FpExceptionalValue
            ]
        );
    }

    #[test]
    fn skips_follow_qualification_order() {
        let opts = InstrumentOptions::default();
        let skip = |op, ty, flags| qualify_first(&single_binary(op, ty, flags), &opts).unwrap_err();

        assert_eq!(skip(BinOp::Add, Type::I64, WrapFlags::empty()), SkipReason::UnsupportedType);
        assert_eq!(skip(BinOp::Add, Type::I64, WrapFlags::NSW), SkipReason::UnsupportedType);
        assert_eq!(skip(BinOp::Add, Type::I32, WrapFlags::NUW), SkipReason::NoWrapFlags);
        assert_eq!(skip(BinOp::Shl, Type::I32, WrapFlags::NSW), SkipReason::NoWrapFlags);
        assert_eq!(skip(BinOp::SRem, Type::I32, WrapFlags::empty()), SkipReason::UnsupportedOp);
    }

    #[test]
    fn disabled_families_are_skipped() {
        let no_int = InstrumentOptions {
            int_checks: false,
            ..InstrumentOptions::default()
        };
        let no_fp = InstrumentOptions {
            fp_checks: false,
            ..InstrumentOptions::default()
        };
        let add = single_binary(BinOp::Add, Type::I32, WrapFlags::empty());
        let fadd = single_binary(BinOp::FAdd, Type::F64, WrapFlags::empty());
        assert_eq!(qualify_first(&add, &no_int).unwrap_err(), SkipReason::FamilyDisabled);
        assert!(qualify_first(&fadd, &no_int).is_ok());
        assert_eq!(qualify_first(&fadd, &no_fp).unwrap_err(), SkipReason::FamilyDisabled);
        assert!(qualify_first(&add, &no_fp).is_ok());
    }

    #[test]
    fn mismatched_operand_types_are_rejected() {
        let mut f = Function::new("f", &[Type::F64], Some(Type::F64));
        let a = f.param(0);
        let entry = f.entry;
        let mut bld = f.builder(entry);
        let r = bld.binary(BinOp::FAdd, a, Constant::float(Type::F32, 1.0));
        bld.ret(Some(r.into()));
        assert_eq!(
            qualify_first(&f, &InstrumentOptions::default()).unwrap_err(),
            SkipReason::OperandType
        );
    }
}
