use serde::{Deserialize, Serialize};
use symros_ir::{BinOp, BlockId, DebugLoc, Function, InstId, InstKind};

use crate::config::{InstrumentOptions, ThresholdConfig};
use crate::site::{Check, CheckSite, SiteId};
use crate::synth::{qualify, ConditionSynthesizer, Qualified, SkipReason};
use crate::tag::{CheckKind, CheckMap, CheckRecord};

/// An arithmetic instruction that was left uninstrumented.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedInst {
    pub inst: InstId,
    pub op: BinOp,
    pub reason: SkipReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_loc: Option<DebugLoc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionReport {
    pub function: String,
    pub sites: Vec<CheckSite>,
    pub checks: CheckMap,
    pub skipped: Vec<SkippedInst>,
}

impl FunctionReport {
    pub fn site(&self, id: SiteId) -> Option<&CheckSite> {
        self.sites.get(id.0 as usize)
    }

    /// The site created for `inst`, if it was instrumented.
    pub fn site_for(&self, inst: InstId) -> Option<&CheckSite> {
        self.sites.iter().find(|s| s.inst == inst)
    }

    pub fn skip_reason(&self, inst: InstId) -> Option<SkipReason> {
        self.skipped
            .iter()
            .find(|s| s.inst == inst)
            .map(|s| s.reason)
    }

    pub fn count(&self, kind: CheckKind) -> usize {
        self.checks.count(kind)
    }
}

/// Splits the CFG after every qualifying arithmetic instruction and inserts a chain of tagged
/// decision blocks, one per check.
///
/// Each decision block ends in `br pred, next, next`, so the checks never change which code
/// runs; they only mark the edge an analysis can reason about.
pub struct Instrumenter<'c> {
    synth: ConditionSynthesizer<'c>,
    options: InstrumentOptions,
}

impl<'c> Instrumenter<'c> {
    pub fn new(config: &'c ThresholdConfig, options: InstrumentOptions) -> Self {
        Self {
            synth: ConditionSynthesizer::new(config),
            options,
        }
    }

    pub fn options(&self) -> &InstrumentOptions {
        &self.options
    }

    pub fn instrument_function(&self, func: &mut Function) -> FunctionReport {
        let span = tracing::info_span!("instrument_function", function = %func.name);
        let _enter = span.enter();

        let mut report = FunctionReport {
            function: func.name.clone(),
            ..FunctionReport::default()
        };

        // Blocks appended below are never revisited: the work list is fixed up front.
        let worklist: Vec<InstId> = func
            .blocks_in_layout()
            .flat_map(|b| b.insts.iter())
            .filter(|i| matches!(i.kind, InstKind::Binary { .. }))
            .map(|i| i.id)
            .collect();

        for id in worklist {
            let Some(inst) = func.inst(id) else {
                continue;
            };
            let InstKind::Binary { op, .. } = inst.kind else {
                continue;
            };
            let debug_loc = inst.debug_loc.clone();

            let qualified = match qualify(func, inst, &self.options) {
                Ok(q) => q,
                Err(reason) => {
                    if reason == SkipReason::OperandType {
                        tracing::warn!(
                            inst = %id,
                            op = op.mnemonic(),
                            "operand types disagree; not instrumenting"
                        );
                    } else {
                        tracing::trace!(inst = %id, op = op.mnemonic(), %reason, "skipping");
                    }
                    report.skipped.push(SkippedInst {
                        inst: id,
                        op,
                        reason,
                        debug_loc,
                    });
                    continue;
                }
            };

            let site_id = SiteId(report.sites.len() as u32);
            match self.instrument_inst(func, id, &qualified, site_id, &mut report.checks) {
                Some(site) => {
                    tracing::debug!(
                        inst = %id,
                        op = op.mnemonic(),
                        site = %site_id,
                        checks = site.checks.len(),
                        "inserted check site"
                    );
                    report.sites.push(site);
                }
                None => {
                    tracing::trace!(inst = %id, op = op.mnemonic(), "skipping: no split point");
                    report.skipped.push(SkippedInst {
                        inst: id,
                        op,
                        reason: SkipReason::NoSplitPoint,
                        debug_loc,
                    });
                }
            }
        }

        if self.options.emit_metadata {
            report.checks.emit_metadata(func);
        }
        report
    }

    fn instrument_inst(
        &self,
        func: &mut Function,
        inst: InstId,
        qualified: &Qualified,
        site_id: SiteId,
        checks: &mut CheckMap,
    ) -> Option<CheckSite> {
        let debug_loc = func.debug_loc(inst).cloned();
        let (origin, cont) = func.split_block_after(inst)?;
        func.erase_terminator(origin);

        let blocks: Vec<BlockId> = qualified
            .checks
            .iter()
            .map(|spec| func.create_block(spec.kind.block_name()))
            .collect();
        let first = blocks.first().copied().unwrap_or(cont);
        let mut entry = func.builder(origin);
        entry.set_debug_loc(debug_loc.clone());
        entry.br(first);

        let mut site = CheckSite {
            id: site_id,
            inst,
            op: qualified.operands.op,
            origin_block: origin,
            cont_block: cont,
            debug_loc: debug_loc.clone(),
            checks: Vec::with_capacity(blocks.len()),
        };
        for (i, (spec, &block)) in qualified.checks.iter().zip(&blocks).enumerate() {
            let next = blocks.get(i + 1).copied().unwrap_or(cont);
            let mut bld = func.builder(block);
            bld.set_debug_loc(debug_loc.clone());
            let predicate = self.synth.build(&mut bld, spec, &qualified.operands);
            let branch = bld.cond_br(predicate, next, next);

            checks.insert(
                branch,
                CheckRecord {
                    kind: spec.kind,
                    site: site_id,
                    origin: inst,
                    debug_loc: debug_loc.clone(),
                },
            );
            site.checks.push(Check {
                kind: spec.kind,
                predicate,
                block: branch,
            });
        }
        Some(site)
    }
}
