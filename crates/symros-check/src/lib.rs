//! `symros-check` makes exceptional arithmetic observable to a dynamic or symbolic analysis.
//!
//! After every qualifying arithmetic instruction the instrumenter splits the block and inserts a
//! chain of decision blocks. Each one evaluates a predicate such as "this `i32` add overflowed"
//! or "this `fdiv` divided by zero" and ends in a conditional branch whose two arms lead to the
//! same place, tagged with a [`CheckKind`] under the `symros.check` metadata key. Execution is
//! unchanged; the branches only give an analysis labelled edges to steer towards.
//!
//! Integer checks cover `i32` `add`/`sub`/`mul` (overflow) and `sdiv`/`udiv` (division by zero),
//! plus signed and unsigned magnitude bounds. Float checks cover every float binary operation
//! (±infinity, magnitude bound) and `fdiv` (division by zero). The magnitude bound comes from a
//! [`ThresholdConfig`].

pub mod config;
pub mod error;
pub mod instrument;
pub mod pass;
pub mod site;
pub mod synth;
pub mod tag;

pub use config::{ConfigError, InstrumentOptions, ThresholdConfig, THRESHOLD_ENV};
pub use error::InstrumentError;
pub use instrument::{FunctionReport, Instrumenter, SkippedInst};
pub use pass::{instrument_module, ModuleReport, TaggedBranch};
pub use site::{Check, CheckSite, SiteId};
pub use synth::{checks_for, qualify, CheckSpec, ConditionSynthesizer, Operands, SkipReason};
pub use tag::{read_tags, CheckKind, CheckMap, CheckRecord, UnknownTag, CHECK_METADATA_KEY};
