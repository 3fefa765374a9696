//! Structural verifier.
//!
//! Checks the shape every pass in this workspace relies on: a single-entry CFG without orphaned
//! blocks, fully terminated blocks, values defined once, type-consistent operands and phi nodes
//! that agree with the predecessor set. Dominance is not checked.

use std::collections::{BTreeSet, VecDeque};

use thiserror::Error;

use crate::ir::{
    BlockId, Function, Inst, InstId, InstKind, Module, Operand, Terminator, Type, ValueId,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("@{func}: block {block} appears more than once in the layout")]
    DuplicateLayout { func: String, block: BlockId },

    #[error("@{func}: entry block {block} is not a block of the function")]
    UnknownEntry { func: String, block: BlockId },

    #[error("@{func}: layout lists unknown block {block}")]
    UnknownBlock { func: String, block: BlockId },

    #[error("@{func}: block {block} is missing from the layout")]
    OrphanedBlock { func: String, block: BlockId },

    #[error("@{func}: block at arena index {index} carries id {block}")]
    BlockIdMismatch {
        func: String,
        index: usize,
        block: BlockId,
    },

    #[error("@{func}: block {block} has no terminator")]
    MissingTerminator { func: String, block: BlockId },

    #[error("@{func}: branch in {block} targets unknown block {target}")]
    UnknownTarget {
        func: String,
        block: BlockId,
        target: BlockId,
    },

    #[error("@{func}: entry block {block} has predecessors")]
    EntryHasPredecessors { func: String, block: BlockId },

    #[error("@{func}: block {block} is unreachable from the entry block")]
    UnreachableBlock { func: String, block: BlockId },

    #[error("@{func}: value {value} is defined more than once")]
    DuplicateValue { func: String, value: ValueId },

    #[error("@{func}: instruction id {inst} is used more than once")]
    DuplicateInst { func: String, inst: InstId },

    #[error("@{func}: {value} is used in {block} but never defined")]
    UndefinedValue {
        func: String,
        block: BlockId,
        value: ValueId,
    },

    #[error("@{func}: operand types of instruction {inst} do not agree")]
    OperandTypes { func: String, inst: InstId },

    #[error("@{func}: branch condition in {block} is not an i1")]
    ConditionType { func: String, block: BlockId },

    #[error("@{func}: return in {block} does not match the function's return type")]
    ReturnType { func: String, block: BlockId },

    #[error("@{func}: integer width {bits} is outside 1..=64")]
    IntWidth { func: String, bits: u32 },

    #[error("@{func}: phi {inst} follows a non-phi instruction")]
    MisplacedPhi { func: String, inst: InstId },

    #[error("@{func}: incoming blocks of phi {inst} in {block} do not match its predecessors")]
    PhiPredecessors {
        func: String,
        block: BlockId,
        inst: InstId,
    },
}

struct Verifier<'a> {
    func: &'a Function,
}

impl<'a> Verifier<'a> {
    fn name(&self) -> String {
        self.func.name.clone()
    }

    fn check_types(&self) -> Result<(), VerifyError> {
        for ty in &self.func.value_types {
            if let Type::Int(bits) = *ty {
                if !(1..=64).contains(&bits) {
                    return Err(VerifyError::IntWidth {
                        func: self.name(),
                        bits,
                    });
                }
            }
        }
        Ok(())
    }

    fn check_layout(&self) -> Result<(), VerifyError> {
        let func = self.func;
        for (index, block) in func.blocks.iter().enumerate() {
            if block.id.index() != index {
                return Err(VerifyError::BlockIdMismatch {
                    func: self.name(),
                    index,
                    block: block.id,
                });
            }
        }

        let mut seen = BTreeSet::new();
        for &block in &func.layout {
            if block.index() >= func.blocks.len() {
                return Err(VerifyError::UnknownBlock {
                    func: self.name(),
                    block,
                });
            }
            if !seen.insert(block) {
                return Err(VerifyError::DuplicateLayout {
                    func: self.name(),
                    block,
                });
            }
        }
        if func.entry.index() >= func.blocks.len() || !seen.contains(&func.entry) {
            return Err(VerifyError::UnknownEntry {
                func: self.name(),
                block: func.entry,
            });
        }
        for block in &func.blocks {
            if !seen.contains(&block.id) {
                return Err(VerifyError::OrphanedBlock {
                    func: self.name(),
                    block: block.id,
                });
            }
        }
        Ok(())
    }

    fn check_terminators(&self) -> Result<(), VerifyError> {
        let func = self.func;
        for block in func.blocks_in_layout() {
            let term = block
                .term
                .as_ref()
                .ok_or_else(|| VerifyError::MissingTerminator {
                    func: self.name(),
                    block: block.id,
                })?;
            for target in term.op.successors() {
                if target.index() >= func.blocks.len() {
                    return Err(VerifyError::UnknownTarget {
                        func: self.name(),
                        block: block.id,
                        target,
                    });
                }
            }
            match &term.op {
                Terminator::CondBr { cond, .. } => {
                    if func.operand_type(cond) != Some(Type::I1) {
                        return Err(VerifyError::ConditionType {
                            func: self.name(),
                            block: block.id,
                        });
                    }
                }
                Terminator::Ret { value } => {
                    let ty = value.as_ref().and_then(|v| func.operand_type(v));
                    if ty != func.ret_ty {
                        return Err(VerifyError::ReturnType {
                            func: self.name(),
                            block: block.id,
                        });
                    }
                }
                Terminator::Br { .. } | Terminator::Unreachable => {}
            }
        }
        Ok(())
    }

    fn check_reachability(&self) -> Result<(), VerifyError> {
        let func = self.func;
        let preds = func.predecessors();
        if preds.get(&func.entry).is_some_and(|p| !p.is_empty()) {
            return Err(VerifyError::EntryHasPredecessors {
                func: self.name(),
                block: func.entry,
            });
        }

        let mut reached = BTreeSet::from([func.entry]);
        let mut queue = VecDeque::from([func.entry]);
        while let Some(block) = queue.pop_front() {
            for succ in func.block(block).successors() {
                if reached.insert(succ) {
                    queue.push_back(succ);
                }
            }
        }
        match func.layout.iter().find(|b| !reached.contains(b)) {
            Some(&block) => Err(VerifyError::UnreachableBlock {
                func: self.name(),
                block,
            }),
            None => Ok(()),
        }
    }

    fn check_definitions(&self) -> Result<(), VerifyError> {
        let func = self.func;
        let mut defined = vec![false; func.value_types.len()];
        let mut define = |value: ValueId| -> Result<(), VerifyError> {
            match defined.get_mut(value.index()) {
                Some(slot) if !*slot => {
                    *slot = true;
                    Ok(())
                }
                _ => Err(VerifyError::DuplicateValue {
                    func: self.name(),
                    value,
                }),
            }
        };
        for &p in &func.params {
            define(p)?;
        }
        let mut ids = BTreeSet::new();
        for block in func.blocks_in_layout() {
            for inst in &block.insts {
                if !ids.insert(inst.id) {
                    return Err(VerifyError::DuplicateInst {
                        func: self.name(),
                        inst: inst.id,
                    });
                }
                define(inst.result)?;
            }
        }

        let undefined = |block: BlockId, op: &Operand| match op {
            Operand::Value(v) if !defined.get(v.index()).copied().unwrap_or(false) => {
                Some(VerifyError::UndefinedValue {
                    func: self.name(),
                    block,
                    value: *v,
                })
            }
            _ => None,
        };
        for block in func.blocks_in_layout() {
            for inst in &block.insts {
                let mut err = None;
                inst.kind.visit_operands(|op| {
                    if err.is_none() {
                        err = undefined(block.id, op);
                    }
                });
                if let Some(err) = err {
                    return Err(err);
                }
            }
            let used = match block.term.as_ref().map(|t| &t.op) {
                Some(Terminator::CondBr { cond, .. }) => Some(cond),
                Some(Terminator::Ret { value: Some(v) }) => Some(v),
                _ => None,
            };
            if let Some(err) = used.and_then(|op| undefined(block.id, op)) {
                return Err(err);
            }
        }
        Ok(())
    }

    fn inst_types_agree(&self, inst: &Inst) -> bool {
        let func = self.func;
        let result = func.value_type(inst.result);
        match &inst.kind {
            InstKind::Binary { op, lhs, rhs, .. } => {
                let (Some(l), Some(r)) = (func.operand_type(lhs), func.operand_type(rhs)) else {
                    return false;
                };
                l == r && result == Some(l) && op.is_float() == l.is_float()
            }
            InstKind::ICmp { lhs, rhs, .. } => {
                let l = func.operand_type(lhs);
                l.is_some_and(Type::is_int) && l == func.operand_type(rhs) && result == Some(Type::I1)
            }
            InstKind::FCmp { lhs, rhs, .. } => {
                let l = func.operand_type(lhs);
                l.is_some_and(Type::is_float)
                    && l == func.operand_type(rhs)
                    && result == Some(Type::I1)
            }
            InstKind::Phi { incoming } => incoming
                .iter()
                .all(|(_, v)| func.operand_type(v) == result),
        }
    }

    fn check_instructions(&self) -> Result<(), VerifyError> {
        let preds = self.func.predecessors();
        for block in self.func.blocks_in_layout() {
            let mut body_started = false;
            for inst in &block.insts {
                if !self.inst_types_agree(inst) {
                    return Err(VerifyError::OperandTypes {
                        func: self.name(),
                        inst: inst.id,
                    });
                }
                let InstKind::Phi { incoming } = &inst.kind else {
                    body_started = true;
                    continue;
                };
                if body_started {
                    return Err(VerifyError::MisplacedPhi {
                        func: self.name(),
                        inst: inst.id,
                    });
                }
                let from: BTreeSet<BlockId> = incoming.iter().map(|(b, _)| *b).collect();
                let expected: BTreeSet<BlockId> = preds
                    .get(&block.id)
                    .map(|p| p.iter().copied().collect())
                    .unwrap_or_default();
                if from != expected || from.len() != incoming.len() {
                    return Err(VerifyError::PhiPredecessors {
                        func: self.name(),
                        block: block.id,
                        inst: inst.id,
                    });
                }
            }
        }
        Ok(())
    }
}

pub fn verify_function(func: &Function) -> Result<(), VerifyError> {
    let v = Verifier { func };
    v.check_types()?;
    v.check_layout()?;
    v.check_terminators()?;
    v.check_reachability()?;
    v.check_definitions()?;
    v.check_instructions()?;
    Ok(())
}

pub fn verify_module(module: &Module) -> Result<(), VerifyError> {
    module.functions.iter().try_for_each(verify_function)
}
