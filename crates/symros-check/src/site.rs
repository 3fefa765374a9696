use std::fmt;

use serde::{Deserialize, Serialize};
use symros_ir::{BinOp, BlockId, DebugLoc, InstId, ValueId};

use crate::tag::CheckKind;

/// Index of a [`CheckSite`] within its function's report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(pub u32);

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "site{}", self.0)
    }
}

/// One predicate of a site, evaluated by the conditional branch closing `block`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    pub kind: CheckKind,
    pub predicate: ValueId,
    pub block: BlockId,
}

/// The decision-block chain inserted after one instrumented instruction.
///
/// Control enters at the first check's block from `origin_block` and leaves the last check's
/// block for `cont_block`. Sites never share blocks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSite {
    pub id: SiteId,
    pub inst: InstId,
    pub op: BinOp,
    pub origin_block: BlockId,
    pub cont_block: BlockId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_loc: Option<DebugLoc>,
    pub checks: Vec<Check>,
}

impl CheckSite {
    pub fn decision_blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.checks.iter().map(|c| c.block)
    }

    pub fn kinds(&self) -> Vec<CheckKind> {
        self.checks.iter().map(|c| c.kind).collect()
    }
}
