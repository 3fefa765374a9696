//! Integer predicates. Every intermediate value wraps at the operand width; the checks are not
//! themselves guarded.

use symros_ir::{Constant, InstBuilder, IntPredicate, Operand, ValueId};

use super::Operands;
use crate::config::ThresholdConfig;

/// `((b >s 0) & (a >s MAX - b)) | ((b <s 0) & (a <s MIN - b)) | (a + b <u a)`
pub(super) fn add_overflow(
    bld: &mut InstBuilder<'_>,
    ops: &Operands,
    _cfg: &ThresholdConfig,
) -> ValueId {
    let Operands {
        ty, lhs, rhs, result, ..
    } = *ops;
    let zero = Constant::zero(ty);

    let rhs_pos = bld.icmp(IntPredicate::Sgt, rhs, zero);
    let headroom = bld.sub(Constant::signed_max(ty), rhs);
    let above = bld.icmp(IntPredicate::Sgt, lhs, headroom);
    let pos_overflow = bld.and(rhs_pos, above);

    let rhs_neg = bld.icmp(IntPredicate::Slt, rhs, zero);
    let footroom = bld.sub(Constant::signed_min(ty), rhs);
    let below = bld.icmp(IntPredicate::Slt, lhs, footroom);
    let neg_overflow = bld.and(rhs_neg, below);

    let signed = bld.or(pos_overflow, neg_overflow);
    let carry = bld.icmp(IntPredicate::Ult, result, lhs);
    bld.or(signed, carry)
}

/// `((b <s 0) & (a >s MAX + b)) | ((b >s 0) & (a <s MIN + b)) | (a <u b)`
pub(super) fn sub_overflow(
    bld: &mut InstBuilder<'_>,
    ops: &Operands,
    _cfg: &ThresholdConfig,
) -> ValueId {
    let Operands { ty, lhs, rhs, .. } = *ops;
    let zero = Constant::zero(ty);

    let rhs_neg = bld.icmp(IntPredicate::Slt, rhs, zero);
    let headroom = bld.add(Constant::signed_max(ty), rhs);
    let above = bld.icmp(IntPredicate::Sgt, lhs, headroom);
    let pos_overflow = bld.and(rhs_neg, above);

    let rhs_pos = bld.icmp(IntPredicate::Sgt, rhs, zero);
    let footroom = bld.add(Constant::signed_min(ty), rhs);
    let below = bld.icmp(IntPredicate::Slt, lhs, footroom);
    let neg_overflow = bld.and(rhs_pos, below);

    let signed = bld.or(pos_overflow, neg_overflow);
    let borrow = bld.icmp(IntPredicate::Ult, lhs, rhs);
    bld.or(signed, borrow)
}

/// `((a != 0) & (sdiv(a * b, a) != b)) | ((b != 0) & (a >u udiv(UMAX, b)))`
///
/// The signed half misses `-1 * MIN`; the unsigned half catches that product.
pub(super) fn mul_overflow(
    bld: &mut InstBuilder<'_>,
    ops: &Operands,
    _cfg: &ThresholdConfig,
) -> ValueId {
    let Operands {
        ty, lhs, rhs, result, ..
    } = *ops;
    let zero = Constant::zero(ty);

    let lhs_nonzero = bld.icmp(IntPredicate::Ne, lhs, zero);
    let quotient = bld.sdiv(result, lhs);
    let mismatch = bld.icmp(IntPredicate::Ne, quotient, rhs);
    let signed = bld.and(lhs_nonzero, mismatch);

    let rhs_nonzero = bld.icmp(IntPredicate::Ne, rhs, zero);
    let limit = bld.udiv(Constant::unsigned_max(ty), rhs);
    let above = bld.icmp(IntPredicate::Ugt, lhs, limit);
    let unsigned = bld.and(rhs_nonzero, above);

    bld.or(signed, unsigned)
}

/// `b == 0`
pub(super) fn divided_by_zero(
    bld: &mut InstBuilder<'_>,
    ops: &Operands,
    _cfg: &ThresholdConfig,
) -> ValueId {
    bld.icmp(IntPredicate::Eq, ops.rhs, Constant::zero(ops.ty))
}

/// `(r <s -T) | (r >s T)`
pub(super) fn signed_bound(
    bld: &mut InstBuilder<'_>,
    ops: &Operands,
    cfg: &ThresholdConfig,
) -> ValueId {
    let bound = cfg.int_bound(ops.ty);
    let neg_bound = Constant::int(ops.ty, bound.as_signed().wrapping_neg());
    let result = Operand::from(ops.result);

    let below = bld.icmp(IntPredicate::Slt, result, neg_bound);
    let above = bld.icmp(IntPredicate::Sgt, result, bound);
    bld.or(below, above)
}

/// `r >u T`
pub(super) fn unsigned_bound(
    bld: &mut InstBuilder<'_>,
    ops: &Operands,
    cfg: &ThresholdConfig,
) -> ValueId {
    bld.icmp(IntPredicate::Ugt, ops.result, cfg.int_bound(ops.ty))
}
