//! `symros-ir` is the small SSA IR the instrumentation passes operate on.
//!
//! It models just enough of an LLVM-style IR for arithmetic instrumentation:
//!
//! - Signless integers (`i1`..`i64`) and `f32`/`f64` values.
//! - Binary arithmetic with `nsw`/`nuw` flags, integer/float comparisons and phi nodes.
//! - Blocks closed by `br`/conditional `br`/`ret`/`unreachable` terminators that carry string
//!   metadata and debug locations.
//! - Block splitting with phi re-pointing, so passes can carve new control flow out of a block.
//!
//! [`interp`] executes functions with fully defined arithmetic (used as a differential oracle),
//! and [`verify`] checks the structural invariants passes must preserve.

pub mod builder;
pub mod interp;
pub mod ir;
mod print;
pub mod verify;

pub use builder::InstBuilder;
pub use interp::{run_function, Execution, InterpError, Limits, RtValue};
pub use ir::{
    BinOp, Block, BlockId, Constant, DebugLoc, FloatPredicate, Function, Inst, InstId, InstKind,
    IntPredicate, Module, Operand, TermInst, Terminator, Type, ValueId, WrapFlags,
};
pub use verify::{verify_function, verify_module, VerifyError};
