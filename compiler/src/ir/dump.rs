//! MIR Dump Utility
//!
//! Pretty-prints MIR in a human-readable format similar to LLVM IR / Cranelift CLIF.
//! Useful for debugging optimization passes; the loop unroller's trace mode
//! prints these dumps between its stages.

use super::{
    BinaryOp, CompareOp, IrBasicBlock, IrControlFlowGraph, IrFunction, IrInstruction, IrModule,
    IrPhiNode, IrTerminator, IrType, IrValue, UnaryOp,
};
use std::fmt::Write;

/// Dump an entire module to a string.
pub fn dump_module(module: &IrModule) -> String {
    let mut out = String::new();
    writeln!(out, "; Module: {}", module.name).unwrap();
    writeln!(out, "; Functions: {}", module.functions.len()).unwrap();
    for ext in module.extern_functions.values() {
        let params: Vec<String> = ext
            .signature
            .parameters
            .iter()
            .map(|p| dump_type(&p.ty))
            .collect();
        writeln!(
            out,
            "declare @{}({}) -> {} ; {}",
            ext.name,
            params.join(", "),
            dump_type(&ext.signature.return_type),
            ext.id
        )
        .unwrap();
    }
    writeln!(out).unwrap();

    // Sort functions by ID for consistent output
    let mut func_ids: Vec<_> = module.functions.keys().collect();
    func_ids.sort_by_key(|id| id.0);

    for &func_id in &func_ids {
        let func = &module.functions[func_id];
        writeln!(out, "{}", dump_function(func)).unwrap();
    }

    out
}

/// Dump a single function to a string.
pub fn dump_function(func: &IrFunction) -> String {
    let mut out = String::new();

    // Function signature
    let params: Vec<String> = func
        .signature
        .parameters
        .iter()
        .map(|p| format!("{}: {}", p.reg, dump_type(&p.ty)))
        .collect();

    let attrs = if func.attributes.optimize_size {
        " optsize"
    } else {
        ""
    };

    writeln!(
        out,
        "fn @{}({}) -> {}{} {{",
        func.name,
        params.join(", "),
        dump_type(&func.signature.return_type),
        attrs
    )
    .unwrap();

    // Dump CFG
    write!(out, "{}", dump_cfg(&func.cfg)).unwrap();

    writeln!(out, "}}").unwrap();
    out
}

/// Dump a CFG to a string.
///
/// Blocks are printed in layout order, so clones appear after the blocks
/// that existed before a transformation.
pub fn dump_cfg(cfg: &IrControlFlowGraph) -> String {
    let mut out = String::new();
    let preds = cfg.predecessor_map();

    for block in cfg.blocks.values() {
        let block_preds = preds.get(&block.id).map(|p| p.as_slice()).unwrap_or(&[]);
        write!(out, "{}", dump_block_with_preds(block, block_preds)).unwrap();
    }

    out
}

fn dump_block_with_preds(block: &IrBasicBlock, preds: &[super::IrBlockId]) -> String {
    let mut out = String::new();

    // Block header
    let label = block
        .label
        .as_ref()
        .map(|l| format!(" ; {}", l))
        .unwrap_or_default();
    writeln!(out, "  {}:{}", block.id, label).unwrap();

    if !preds.is_empty() {
        let preds: Vec<String> = preds.iter().map(|p| format!("{}", p)).collect();
        writeln!(out, "    ; preds: {}", preds.join(", ")).unwrap();
    }
    if let Some(origin) = block.metadata.cloned_from {
        writeln!(out, "    ; cloned from {}", origin).unwrap();
    }

    // Phi nodes
    for phi in &block.phi_nodes {
        writeln!(out, "    {}", dump_phi(phi)).unwrap();
    }

    // Instructions
    for inst in &block.instructions {
        writeln!(out, "    {}", dump_instruction(inst)).unwrap();
    }

    // Terminator
    writeln!(out, "    {}", dump_terminator(&block.terminator)).unwrap();
    writeln!(out).unwrap();

    out
}

/// Dump a phi node to a string.
pub fn dump_phi(phi: &IrPhiNode) -> String {
    let incoming: Vec<String> = phi
        .incoming
        .iter()
        .map(|(block, val)| format!("[{}: {}]", block, val))
        .collect();

    format!(
        "{} = phi {} {}",
        phi.dest,
        dump_type(&phi.ty),
        incoming.join(", ")
    )
}

/// Dump an instruction to a string.
pub fn dump_instruction(inst: &IrInstruction) -> String {
    match inst {
        IrInstruction::Const { dest, value } => {
            format!("{} = const {}", dest, dump_value(value))
        }
        IrInstruction::Copy { dest, src } => {
            format!("{} = copy {}", dest, src)
        }
        IrInstruction::BinOp {
            dest,
            op,
            left,
            right,
        } => {
            format!("{} = {} {}, {}", dest, dump_binop(op), left, right)
        }
        IrInstruction::UnOp { dest, op, operand } => {
            format!("{} = {} {}", dest, dump_unaryop(op), operand)
        }
        IrInstruction::Cmp {
            dest,
            op,
            left,
            right,
        } => {
            format!("{} = cmp {} {}, {}", dest, dump_cmpop(op), left, right)
        }
        IrInstruction::Load { dest, ptr, ty } => {
            format!("{} = load {} {}", dest, dump_type(ty), ptr)
        }
        IrInstruction::Store { ptr, value } => {
            format!("store {}, {}", ptr, value)
        }
        IrInstruction::Alloc { dest, ty, count } => {
            if let Some(cnt) = count {
                format!("{} = alloc {} x {}", dest, dump_type(ty), cnt)
            } else {
                format!("{} = alloc {}", dest, dump_type(ty))
            }
        }
        IrInstruction::Select {
            dest,
            condition,
            true_val,
            false_val,
        } => {
            format!(
                "{} = select {}, {}, {}",
                dest, condition, true_val, false_val
            )
        }
        IrInstruction::Cast {
            dest,
            src,
            from_ty,
            to_ty,
        } => {
            format!(
                "{} = cast {} {} to {}",
                dest,
                dump_type(from_ty),
                src,
                dump_type(to_ty)
            )
        }
        IrInstruction::CallDirect {
            dest,
            func_id,
            args,
            no_duplicate,
        } => {
            let args_str: Vec<String> = args.iter().map(|a| format!("{}", a)).collect();
            let marker = if *no_duplicate { " noduplicate" } else { "" };
            match dest {
                Some(d) => format!("{} = call @{}({}){}", d, func_id, args_str.join(", "), marker),
                None => format!("call @{}({}){}", func_id, args_str.join(", "), marker),
            }
        }
        IrInstruction::BlockAddress { dest, block } => {
            format!("{} = blockaddress {}", dest, block)
        }
        IrInstruction::InlineAsm { dest, asm, inputs } => {
            let in_str: Vec<String> = inputs.iter().map(|i| format!("{}", i)).collect();
            match dest {
                Some(d) => format!("{} = asm \"{}\" ({})", d, asm.escape_default(), in_str.join(", ")),
                None => format!("asm \"{}\" ({})", asm.escape_default(), in_str.join(", ")),
            }
        }
    }
}

/// Dump a terminator to a string.
pub fn dump_terminator(term: &IrTerminator) -> String {
    match term {
        IrTerminator::Branch { target } => format!("br {}", target),
        IrTerminator::CondBranch {
            condition,
            true_target,
            false_target,
        } => {
            format!("condbr {}, {}, {}", condition, true_target, false_target)
        }
        IrTerminator::Switch {
            value,
            cases,
            default,
        } => {
            let case_str: Vec<String> = cases
                .iter()
                .map(|(val, target)| format!("{} => {}", val, target))
                .collect();
            format!(
                "switch {} [{}], default {}",
                value,
                case_str.join(", "),
                default
            )
        }
        IrTerminator::Return { value } => match value {
            Some(v) => format!("ret {}", v),
            None => "ret void".to_string(),
        },
        IrTerminator::Unreachable => "unreachable".to_string(),
    }
}

/// Dump a type to a string.
pub fn dump_type(ty: &IrType) -> String {
    ty.to_string()
}

/// Dump a value to a string.
pub fn dump_value(value: &IrValue) -> String {
    match value {
        IrValue::Void => "void".to_string(),
        IrValue::Undef => "undef".to_string(),
        IrValue::Null => "null".to_string(),
        IrValue::Bool(b) => format!("{}", b),
        IrValue::I8(v) => format!("{}i8", v),
        IrValue::I16(v) => format!("{}i16", v),
        IrValue::I32(v) => format!("{}i32", v),
        IrValue::I64(v) => format!("{}i64", v),
        IrValue::U8(v) => format!("{}u8", v),
        IrValue::U16(v) => format!("{}u16", v),
        IrValue::U32(v) => format!("{}u32", v),
        IrValue::U64(v) => format!("{}u64", v),
        IrValue::F32(v) => format!("{}f32", v),
        IrValue::F64(v) => format!("{}f64", v),
    }
}

/// Dump a binary operator to a string.
pub fn dump_binop(op: &BinaryOp) -> String {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Sub => "sub",
        BinaryOp::Mul => "mul",
        BinaryOp::Div => "div",
        BinaryOp::Rem => "rem",
        BinaryOp::UDiv => "udiv",
        BinaryOp::URem => "urem",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
        BinaryOp::Xor => "xor",
        BinaryOp::Shl => "shl",
        BinaryOp::Shr => "shr",
        BinaryOp::UShr => "ushr",
        BinaryOp::FAdd => "fadd",
        BinaryOp::FSub => "fsub",
        BinaryOp::FMul => "fmul",
        BinaryOp::FDiv => "fdiv",
    }
    .to_string()
}

/// Dump a unary operator to a string.
pub fn dump_unaryop(op: &UnaryOp) -> String {
    match op {
        UnaryOp::Neg => "neg",
        UnaryOp::Not => "not",
        UnaryOp::FNeg => "fneg",
    }
    .to_string()
}

/// Dump a comparison operator to a string.
pub fn dump_cmpop(op: &CompareOp) -> String {
    match op {
        CompareOp::Eq => "eq",
        CompareOp::Ne => "ne",
        CompareOp::Lt => "lt",
        CompareOp::Le => "le",
        CompareOp::Gt => "gt",
        CompareOp::Ge => "ge",
        CompareOp::ULt => "ult",
        CompareOp::ULe => "ule",
        CompareOp::UGt => "ugt",
        CompareOp::UGe => "uge",
        CompareOp::FEq => "feq",
        CompareOp::FNe => "fne",
        CompareOp::FLt => "flt",
        CompareOp::FLe => "fle",
        CompareOp::FGt => "fgt",
        CompareOp::FGe => "fge",
    }
    .to_string()
}

/// Dump a specific function by name from a module.
pub fn dump_function_by_name(module: &IrModule, name: &str) -> Option<String> {
    module
        .functions
        .values()
        .find(|func| func.name == name)
        .map(dump_function)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionSignatureBuilder, IrBuilder};

    #[test]
    fn test_dump_simple_function() {
        let mut builder = IrBuilder::new("dump");
        let sig = FunctionSignatureBuilder::new()
            .param("a", IrType::I64)
            .returns(IrType::I64)
            .build();
        builder.start_function("double", sig);
        let a = builder.param(0).unwrap();
        let twice = builder.build_add(a, a, false).unwrap();
        builder.build_return(Some(twice)).unwrap();
        builder.finish_function();

        let text = dump_function_by_name(&builder.module, "double").unwrap();
        assert!(text.starts_with("fn @double($0: i64) -> i64 {"));
        assert!(text.contains("$1 = add $0, $0"));
        assert!(text.contains("ret $1"));
        assert!(dump_function_by_name(&builder.module, "missing").is_none());
    }

    #[test]
    fn test_dump_terminators() {
        let bb = crate::ir::IrBlockId::new;
        let id = crate::ir::IrId::new;
        let switch = IrTerminator::Switch {
            value: id(4),
            cases: vec![(1, bb(3)), (2, bb(5))],
            default: bb(2),
        };
        assert_eq!(dump_terminator(&switch), "switch $4 [1 => bb3, 2 => bb5], default bb2");
        assert_eq!(
            dump_terminator(&IrTerminator::Return { value: None }),
            "ret void"
        );
        assert_eq!(dump_value(&IrValue::I64(-3)), "-3i64");
    }
}
