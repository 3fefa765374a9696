//! Check vocabulary and the branch → check sidecar.
//!
//! Inside the pass every inserted branch is described by a typed [`CheckRecord`]; strings only
//! appear at the boundary, when [`CheckMap::emit_metadata`] writes `symros.check` metadata or
//! [`read_tags`] decodes it again.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use symros_ir::{BlockId, DebugLoc, Function, InstId};
use thiserror::Error;

use crate::site::SiteId;

/// Metadata key carried by every inserted branch.
pub const CHECK_METADATA_KEY: &str = "symros.check";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    FpOverflow,
    FpExceptionalValue,
    FpDividedByZero,
    IntOverflow,
    IntDividedByZero,
    IntExceptionalSignedValue,
    IntExceptionalUnsignedValue,
}

impl CheckKind {
    pub const ALL: [CheckKind; 7] = [
        CheckKind::FpOverflow,
        CheckKind::FpExceptionalValue,
        CheckKind::FpDividedByZero,
        CheckKind::IntOverflow,
        CheckKind::IntDividedByZero,
        CheckKind::IntExceptionalSignedValue,
        CheckKind::IntExceptionalUnsignedValue,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            CheckKind::FpOverflow => "fp_overflow",
            CheckKind::FpExceptionalValue => "fp_exceptional_value",
            CheckKind::FpDividedByZero => "fp_divided_by_zero",
            CheckKind::IntOverflow => "int_overflow",
            CheckKind::IntDividedByZero => "int_divided_by_zero",
            CheckKind::IntExceptionalSignedValue => "int_exceptional_signed_value",
            CheckKind::IntExceptionalUnsignedValue => "int_exceptional_unsigned_value",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, UnknownTag> {
        Self::ALL
            .into_iter()
            .find(|k| k.tag() == tag)
            .ok_or_else(|| UnknownTag(tag.to_string()))
    }

    /// Base name of the decision block evaluating this check.
    pub fn block_name(self) -> &'static str {
        match self {
            CheckKind::FpOverflow | CheckKind::IntOverflow => "overflow_check",
            CheckKind::FpDividedByZero | CheckKind::IntDividedByZero => "divided_by_zero_check",
            CheckKind::FpExceptionalValue => "bound_check",
            CheckKind::IntExceptionalSignedValue => "signed_bound_check",
            CheckKind::IntExceptionalUnsignedValue => "unsigned_bound_check",
        }
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            CheckKind::FpOverflow | CheckKind::FpExceptionalValue | CheckKind::FpDividedByZero
        )
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for CheckKind {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown check tag {0:?}")]
pub struct UnknownTag(pub String);

/// What one inserted branch checks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRecord {
    pub kind: CheckKind,
    pub site: SiteId,
    /// The instrumented instruction.
    pub origin: InstId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_loc: Option<DebugLoc>,
}

/// Sidecar from tagged branch (identified by its block) to the check it evaluates.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckMap {
    records: BTreeMap<BlockId, CheckRecord>,
}

impl CheckMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the check evaluated by `branch`.
    ///
    /// # Panics
    ///
    /// If `branch` already has a record; every inserted branch carries exactly one tag.
    pub fn insert(&mut self, branch: BlockId, record: CheckRecord) {
        let prev = self.records.insert(branch, record);
        assert!(prev.is_none(), "branch {branch} tagged twice");
    }

    pub fn get(&self, branch: BlockId) -> Option<&CheckRecord> {
        self.records.get(&branch)
    }

    pub fn kind(&self, branch: BlockId) -> Option<CheckKind> {
        self.get(branch).map(|r| r.kind)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BlockId, &CheckRecord)> + '_ {
        self.records.iter().map(|(b, r)| (*b, r))
    }

    pub fn count(&self, kind: CheckKind) -> usize {
        self.records.values().filter(|r| r.kind == kind).count()
    }

    /// Attach `symros.check = <tag>` to every recorded branch of `func` and return how many
    /// branches were tagged.
    pub fn emit_metadata(&self, func: &mut Function) -> usize {
        self.records
            .iter()
            .filter(|(branch, record)| {
                func.attach_metadata(**branch, CHECK_METADATA_KEY, record.kind.tag())
            })
            .count()
    }
}

/// Decode the `symros.check` tags present on `func`'s branches.
pub fn read_tags(func: &Function) -> Result<BTreeMap<BlockId, CheckKind>, UnknownTag> {
    func.blocks_in_layout()
        .filter_map(|b| {
            func.metadata(b.id, CHECK_METADATA_KEY)
                .map(|tag| CheckKind::from_tag(tag).map(|k| (b.id, k)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_match_the_wire_vocabulary() {
        let tags: Vec<_> = CheckKind::ALL.iter().map(|k| k.tag()).collect();
        assert_eq!(
            tags,
            [
                "fp_overflow",
                "fp_exceptional_value",
                "fp_divided_by_zero",
                "int_overflow",
                "int_divided_by_zero",
                "int_exceptional_signed_value",
                "int_exceptional_unsigned_value",
            ]
        );
        for kind in CheckKind::ALL {
            assert_eq!(kind.tag().parse::<CheckKind>(), Ok(kind));
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.tag()));
        }
    }

    #[test]
    fn unknown_tags_are_rejected() {
        assert_eq!(
            CheckKind::from_tag("int_underflow"),
            Err(UnknownTag("int_underflow".into()))
        );
    }

    #[test]
    #[should_panic(expected = "tagged twice")]
    fn double_tagging_panics() {
        let record = CheckRecord {
            kind: CheckKind::IntOverflow,
            site: SiteId(0),
            origin: InstId(0),
            debug_loc: None,
        };
        let mut map = CheckMap::new();
        map.insert(BlockId(1), record.clone());
        map.insert(BlockId(1), record);
    }
}
