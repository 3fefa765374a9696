//! Floating-point predicates. All comparisons are ordered, so a NaN result or operand makes
//! every predicate false.

use symros_ir::{Constant, FloatPredicate, InstBuilder, ValueId};

use super::Operands;
use crate::config::ThresholdConfig;

/// `(r == +inf) | (r == -inf)`
pub(super) fn overflow(
    bld: &mut InstBuilder<'_>,
    ops: &Operands,
    _cfg: &ThresholdConfig,
) -> ValueId {
    let pos = bld.fcmp(
        FloatPredicate::Oeq,
        ops.result,
        Constant::infinity(ops.ty, false),
    );
    let neg = bld.fcmp(
        FloatPredicate::Oeq,
        ops.result,
        Constant::infinity(ops.ty, true),
    );
    bld.or(pos, neg)
}

/// `b == 0.0`; also true for `-0.0`.
pub(super) fn divided_by_zero(
    bld: &mut InstBuilder<'_>,
    ops: &Operands,
    _cfg: &ThresholdConfig,
) -> ValueId {
    bld.fcmp(FloatPredicate::Oeq, ops.rhs, Constant::zero(ops.ty))
}

/// `(r < -T) | (r > T)`
pub(super) fn bound(bld: &mut InstBuilder<'_>, ops: &Operands, cfg: &ThresholdConfig) -> ValueId {
    let bound = cfg.float_bound(ops.ty);
    let neg_bound = Constant::float(ops.ty, -bound.as_f64());

    let below = bld.fcmp(FloatPredicate::Olt, ops.result, neg_bound);
    let above = bld.fcmp(FloatPredicate::Ogt, ops.result, bound);
    bld.or(below, above)
}
