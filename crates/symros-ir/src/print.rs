//! LLVM-flavoured textual dump of functions and modules.

use std::fmt;

use crate::ir::{
    Block, BlockId, Function, Inst, InstKind, Module, Operand, TermInst, Terminator, WrapFlags,
};

struct Printer<'a> {
    func: &'a Function,
}

impl Printer<'_> {
    fn block_label(&self, id: BlockId) -> &str {
        &self.func.block(id).name
    }

    fn typed(&self, op: &Operand) -> String {
        match self.func.operand_type(op) {
            Some(ty) => format!("{ty} {op}"),
            None => format!("<?> {op}"),
        }
    }

    fn inst(&self, f: &mut fmt::Formatter<'_>, inst: &Inst) -> fmt::Result {
        write!(f, "  {} = ", inst.result)?;
        match &inst.kind {
            InstKind::Binary {
                op,
                lhs,
                rhs,
                flags,
            } => {
                write!(f, "{}", op.mnemonic())?;
                if flags.contains(WrapFlags::NUW) {
                    f.write_str(" nuw")?;
                }
                if flags.contains(WrapFlags::NSW) {
                    f.write_str(" nsw")?;
                }
                write!(f, " {}, {rhs}", self.typed(lhs))?;
            }
            InstKind::ICmp { pred, lhs, rhs } => {
                write!(f, "icmp {} {}, {rhs}", pred.mnemonic(), self.typed(lhs))?;
            }
            InstKind::FCmp { pred, lhs, rhs } => {
                write!(f, "fcmp {} {}, {rhs}", pred.mnemonic(), self.typed(lhs))?;
            }
            InstKind::Phi { incoming } => {
                let ty = self
                    .func
                    .value_type(inst.result)
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "<?>".into());
                write!(f, "phi {ty} ")?;
                for (i, (pred, v)) in incoming.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "[ {v}, %{} ]", self.block_label(*pred))?;
                }
            }
        }
        if let Some(loc) = &inst.debug_loc {
            write!(f, ", !dbg {loc}")?;
        }
        writeln!(f)
    }

    fn term(&self, f: &mut fmt::Formatter<'_>, term: &TermInst) -> fmt::Result {
        f.write_str("  ")?;
        match &term.op {
            Terminator::Br { target } => write!(f, "br label %{}", self.block_label(*target))?,
            Terminator::CondBr {
                cond,
                then_target,
                else_target,
            } => write!(
                f,
                "br {}, label %{}, label %{}",
                self.typed(cond),
                self.block_label(*then_target),
                self.block_label(*else_target)
            )?,
            Terminator::Ret { value: Some(v) } => write!(f, "ret {}", self.typed(v))?,
            Terminator::Ret { value: None } => f.write_str("ret void")?,
            Terminator::Unreachable => f.write_str("unreachable")?,
        }
        for (key, value) in &term.metadata {
            write!(f, ", !{key} !\"{value}\"")?;
        }
        if let Some(loc) = &term.debug_loc {
            write!(f, ", !dbg {loc}")?;
        }
        writeln!(f)
    }

    fn block(&self, f: &mut fmt::Formatter<'_>, block: &Block) -> fmt::Result {
        writeln!(f, "{}:", block.name)?;
        for inst in &block.insts {
            self.inst(f, inst)?;
        }
        match &block.term {
            Some(term) => self.term(f, term),
            None => writeln!(f, "  ; <no terminator>"),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ret = self
            .ret_ty
            .map(|t| t.to_string())
            .unwrap_or_else(|| "void".into());
        let printer = Printer { func: self };
        write!(f, "define {ret} @{}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&printer.typed(&Operand::Value(*p)))?;
        }
        writeln!(f, ") {{")?;
        for (i, block) in self.blocks_in_layout().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            printer.block(f, block)?;
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        for func in &self.functions {
            writeln!(f)?;
            write!(f, "{func}")?;
        }
        Ok(())
    }
}
