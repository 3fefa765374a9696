use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use symros_ir::{verify_function, verify_module, DebugLoc, Module};

use crate::config::{InstrumentOptions, ThresholdConfig};
use crate::error::{InstrumentError, Result};
use crate::instrument::{FunctionReport, Instrumenter};
use crate::site::SiteId;
use crate::tag::CheckKind;

/// One inserted branch, flattened for external consumers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedBranch {
    pub function: String,
    /// Name of the decision block whose terminator is the branch.
    pub block: String,
    pub tag: CheckKind,
    pub site: SiteId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_loc: Option<DebugLoc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleReport {
    pub module: String,
    pub functions: Vec<FunctionReport>,
    pub branches: Vec<TaggedBranch>,
}

impl ModuleReport {
    pub fn function(&self, name: &str) -> Option<&FunctionReport> {
        self.functions.iter().find(|f| f.function == name)
    }

    pub fn site_count(&self) -> usize {
        self.functions.iter().map(|f| f.sites.len()).sum()
    }

    pub fn check_count(&self) -> usize {
        self.functions.iter().map(|f| f.checks.len()).sum()
    }

    pub fn skipped_count(&self) -> usize {
        self.functions.iter().map(|f| f.skipped.len()).sum()
    }

    pub fn counts_by_kind(&self) -> BTreeMap<CheckKind, usize> {
        let mut counts = BTreeMap::new();
        for branch in &self.branches {
            *counts.entry(branch.tag).or_insert(0) += 1;
        }
        counts
    }
}

/// Instrument every function of `module`.
///
/// With [`InstrumentOptions::verify`] set, the module is verified before anything is touched and
/// every function again after it was instrumented.
pub fn instrument_module(
    module: &mut Module,
    config: &ThresholdConfig,
    options: InstrumentOptions,
) -> Result<ModuleReport> {
    if options.verify {
        verify_module(module).map_err(InstrumentError::InvalidInput)?;
    }

    let instrumenter = Instrumenter::new(config, options);
    let mut report = ModuleReport {
        module: module.name.clone(),
        ..ModuleReport::default()
    };

    for func in &mut module.functions {
        let func_report = instrumenter.instrument_function(func);
        if options.verify {
            verify_function(func).map_err(InstrumentError::InvalidOutput)?;
        }

        report
            .branches
            .extend(func_report.checks.iter().map(|(block, record)| TaggedBranch {
                function: func.name.clone(),
                block: func.block(block).name.clone(),
                tag: record.kind,
                site: record.site,
                debug_loc: record.debug_loc.clone(),
            }));
        report.functions.push(func_report);
    }

    tracing::info!(
        module = %report.module,
        functions = report.functions.len(),
        sites = report.site_count(),
        checks = report.check_count(),
        skipped = report.skipped_count(),
        "instrumented module"
    );
    Ok(report)
}
