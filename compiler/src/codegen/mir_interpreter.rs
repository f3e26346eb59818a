//! MIR Register-Based Interpreter
//!
//! Executes MIR directly so transformations can be checked by running the
//! program before and after. Every register holds an `i64` (booleans are 0
//! or 1, pointers are slot addresses). Narrow integers are kept sign- or
//! zero-extended from their width, so arithmetic wraps at the register's type.
//! Stack slots created by `Alloc` live in a flat memory vector.
//!
//! Calls into functions without a body are not executed; they are recorded as
//! [`TraceEvent`]s and return 0. The trace is the observable behavior of a run.
//!
//! A step budget turns runaway loops into [`InterpError::StepLimitExceeded`].

use crate::ir::{
    BinaryOp, CompareOp, IrBasicBlock, IrBlockId, IrFunction, IrFunctionId, IrId, IrInstruction,
    IrModule, IrTerminator, IrType, IrValue, UnaryOp,
};
use fxhash::FxHashMap;
use log::trace;
use std::fmt;

/// Default instruction budget per `execute` call
pub const DEFAULT_STEP_LIMIT: u64 = 10_000_000;

/// One call to a body-less function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub callee: String,
    pub args: Vec<i64>,
}

/// Interpreter failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpError {
    FunctionNotFound(IrFunctionId),
    BlockNotFound(IrBlockId),
    UndefinedRegister(IrId),
    InvalidAddress(i64),
    DivisionByZero,
    StackOverflow,
    StepLimitExceeded(u64),
    MissingPhiIncoming { block: IrBlockId, pred: Option<IrBlockId> },
    Unsupported(String),
    RuntimeError(String),
}

impl fmt::Display for InterpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpError::FunctionNotFound(id) => write!(f, "Function not found: {}", id),
            InterpError::BlockNotFound(id) => write!(f, "Block not found: {}", id),
            InterpError::UndefinedRegister(reg) => write!(f, "Read of undefined register {}", reg),
            InterpError::InvalidAddress(addr) => write!(f, "Invalid address: {}", addr),
            InterpError::DivisionByZero => write!(f, "Division by zero"),
            InterpError::StackOverflow => write!(f, "Stack overflow"),
            InterpError::StepLimitExceeded(limit) => {
                write!(f, "Step limit of {} instructions exceeded", limit)
            }
            InterpError::MissingPhiIncoming { block, pred } => match pred {
                Some(pred) => write!(f, "Phi in {} has no value for predecessor {}", block, pred),
                None => write!(f, "Phi in entry block {}", block),
            },
            InterpError::Unsupported(what) => write!(f, "Unsupported: {}", what),
            InterpError::RuntimeError(msg) => write!(f, "Runtime error: {}", msg),
        }
    }
}

impl std::error::Error for InterpError {}

/// Activation record of one function call
struct InterpreterFrame {
    function_id: IrFunctionId,
    registers: FxHashMap<IrId, i64>,
    current_block: IrBlockId,
    prev_block: Option<IrBlockId>,
}

impl InterpreterFrame {
    fn get(&self, reg: IrId) -> Result<i64, InterpError> {
        self.registers
            .get(&reg)
            .copied()
            .ok_or(InterpError::UndefinedRegister(reg))
    }

    fn set(&mut self, reg: IrId, value: i64) {
        self.registers.insert(reg, value);
    }
}

enum TerminatorResult {
    Continue(IrBlockId),
    Return(i64),
}

/// MIR interpreter
pub struct MirInterpreter {
    stack: Vec<InterpreterFrame>,
    max_stack_depth: usize,
    /// Slot memory; address `a` is `memory[a - 1]`, address 0 is null
    memory: Vec<i64>,
    trace: Vec<TraceEvent>,
    step_limit: u64,
    steps: u64,
}

impl Default for MirInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl MirInterpreter {
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            max_stack_depth: 256,
            memory: Vec::new(),
            trace: Vec::new(),
            step_limit: DEFAULT_STEP_LIMIT,
            steps: 0,
        }
    }

    /// Create an interpreter with a custom instruction budget
    pub fn with_step_limit(limit: u64) -> Self {
        Self {
            step_limit: limit,
            ..Self::new()
        }
    }

    /// Calls to external functions recorded so far
    pub fn trace(&self) -> &[TraceEvent] {
        &self.trace
    }

    pub fn take_trace(&mut self) -> Vec<TraceEvent> {
        std::mem::take(&mut self.trace)
    }

    /// Instructions and terminators executed so far
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Forget memory, trace and step count
    pub fn reset(&mut self) {
        self.stack.clear();
        self.memory.clear();
        self.trace.clear();
        self.steps = 0;
    }

    /// Execute the function called `name`
    pub fn execute_by_name(
        &mut self,
        module: &IrModule,
        name: &str,
        args: &[i64],
    ) -> Result<i64, InterpError> {
        let func_id = module.get_function_by_name(name).ok_or_else(|| {
            InterpError::RuntimeError(format!("no function named '{}'", name))
        })?;
        self.execute(module, func_id, args)
    }

    /// Execute a function and return the result (0 for void functions)
    pub fn execute(
        &mut self,
        module: &IrModule,
        func_id: IrFunctionId,
        args: &[i64],
    ) -> Result<i64, InterpError> {
        let function = module
            .functions
            .get(&func_id)
            .ok_or(InterpError::FunctionNotFound(func_id))?;

        if self.stack.len() >= self.max_stack_depth {
            return Err(InterpError::StackOverflow);
        }

        let mut frame = InterpreterFrame {
            function_id: func_id,
            registers: FxHashMap::default(),
            current_block: function.cfg.entry_block,
            prev_block: None,
        };
        for (i, param) in function.signature.parameters.iter().enumerate() {
            let arg = args.get(i).copied().unwrap_or(0);
            frame.set(param.reg, Self::wrap_to(arg, Some(&param.ty)));
        }

        self.stack.push(frame);
        let result = self.execute_function(module, function);
        self.stack.pop();
        result
    }

    fn current_frame(&self) -> &InterpreterFrame {
        self.stack.last().expect("interpreter frame pushed by execute")
    }

    fn current_frame_mut(&mut self) -> &mut InterpreterFrame {
        self.stack.last_mut().expect("interpreter frame pushed by execute")
    }

    fn read(&self, reg: IrId) -> Result<i64, InterpError> {
        self.current_frame().get(reg)
    }

    fn write(&mut self, reg: IrId, value: i64) {
        self.current_frame_mut().set(reg, value);
    }

    fn step(&mut self) -> Result<(), InterpError> {
        self.steps += 1;
        if self.steps > self.step_limit {
            return Err(InterpError::StepLimitExceeded(self.step_limit));
        }
        Ok(())
    }

    fn execute_function(
        &mut self,
        module: &IrModule,
        function: &IrFunction,
    ) -> Result<i64, InterpError> {
        loop {
            let block_id = self.current_frame().current_block;
            let block = function
                .cfg
                .get_block(block_id)
                .ok_or(InterpError::BlockNotFound(block_id))?;

            self.execute_phi_nodes(block)?;

            for instr in &block.instructions {
                self.step()?;
                self.execute_instruction(module, function, instr)?;
            }

            self.step()?;
            match self.execute_terminator(&block.terminator)? {
                TerminatorResult::Continue(next_block) => {
                    let frame = self.current_frame_mut();
                    frame.prev_block = Some(frame.current_block);
                    frame.current_block = next_block;
                }
                TerminatorResult::Return(value) => return Ok(value),
            }
        }
    }

    /// Phis read their incoming values in parallel before any is written
    fn execute_phi_nodes(&mut self, block: &IrBasicBlock) -> Result<(), InterpError> {
        if block.phi_nodes.is_empty() {
            return Ok(());
        }
        let prev_block = self.current_frame().prev_block;
        let mut phi_values: Vec<(IrId, i64)> = Vec::with_capacity(block.phi_nodes.len());

        for phi in &block.phi_nodes {
            let source = prev_block
                .and_then(|prev| phi.incoming_from(prev))
                .ok_or(InterpError::MissingPhiIncoming {
                    block: block.id,
                    pred: prev_block,
                })?;
            phi_values.push((phi.dest, self.read(source)?));
        }

        for (dest, value) in phi_values {
            self.write(dest, value);
        }
        Ok(())
    }

    fn execute_instruction(
        &mut self,
        module: &IrModule,
        function: &IrFunction,
        instr: &IrInstruction,
    ) -> Result<(), InterpError> {
        match instr {
            IrInstruction::Const { dest, value } => {
                let val = Self::const_value(value)?;
                self.write(*dest, val);
            }

            IrInstruction::Copy { dest, src } => {
                let val = self.read(*src)?;
                self.write(*dest, val);
            }

            IrInstruction::Load { dest, ptr, .. } => {
                let addr = self.read(*ptr)?;
                let val = *self.memory_cell(addr)?;
                self.write(*dest, val);
            }

            IrInstruction::Store { ptr, value } => {
                let addr = self.read(*ptr)?;
                let val = self.read(*value)?;
                *self.memory_cell(addr)? = val;
            }

            IrInstruction::BinOp {
                dest,
                op,
                left,
                right,
            } => {
                let l = self.read(*left)?;
                let r = self.read(*right)?;
                let result = Self::eval_binary_op(*op, l, r, function.reg_type(*dest))?;
                self.write(*dest, result);
            }

            IrInstruction::UnOp { dest, op, operand } => {
                let val = self.read(*operand)?;
                let result = match op {
                    UnaryOp::Neg => val.wrapping_neg(),
                    UnaryOp::Not if function.reg_type(*dest) == Some(&IrType::Bool) => {
                        (val == 0) as i64
                    }
                    UnaryOp::Not => !val,
                    UnaryOp::FNeg => {
                        return Err(InterpError::Unsupported("floating point negation".into()))
                    }
                };
                self.write(*dest, Self::wrap_to(result, function.reg_type(*dest)));
            }

            IrInstruction::Cmp {
                dest,
                op,
                left,
                right,
            } => {
                let l = self.read(*left)?;
                let r = self.read(*right)?;
                let result = Self::eval_compare_op(*op, l, r, function.reg_type(*left))?;
                self.write(*dest, result as i64);
            }

            IrInstruction::Select {
                dest,
                condition,
                true_val,
                false_val,
            } => {
                let chosen = if self.read(*condition)? != 0 {
                    *true_val
                } else {
                    *false_val
                };
                let val = self.read(chosen)?;
                self.write(*dest, val);
            }

            IrInstruction::Cast {
                dest, src, to_ty, ..
            } => {
                let val = self.read(*src)?;
                let result = Self::cast_value(val, to_ty)?;
                self.write(*dest, result);
            }

            IrInstruction::Alloc { dest, count, .. } => {
                let elements = match count {
                    Some(reg) => self.read(*reg)?,
                    None => 1,
                };
                if elements < 0 {
                    return Err(InterpError::RuntimeError(format!(
                        "negative allocation size {}",
                        elements
                    )));
                }
                let addr = self.memory.len() as i64 + 1;
                self.memory
                    .resize(self.memory.len() + elements.max(1) as usize, 0);
                self.write(*dest, addr);
            }

            IrInstruction::CallDirect {
                dest,
                func_id,
                args,
                ..
            } => {
                let arg_values = args
                    .iter()
                    .map(|arg| self.read(*arg))
                    .collect::<Result<Vec<i64>, InterpError>>()?;

                let result = match module.functions.get(func_id) {
                    Some(callee) if callee.has_body() => {
                        self.execute(module, *func_id, &arg_values)?
                    }
                    _ => {
                        let callee = module
                            .function_name(*func_id)
                            .ok_or(InterpError::FunctionNotFound(*func_id))?;
                        trace!("interp: {}({:?})", callee, arg_values);
                        self.trace.push(TraceEvent {
                            callee: callee.to_string(),
                            args: arg_values,
                        });
                        0
                    }
                };
                if let Some(dest) = dest {
                    self.write(*dest, result);
                }
            }

            IrInstruction::BlockAddress { dest, block } => {
                self.write(*dest, i64::from(block.as_u32()));
            }

            IrInstruction::InlineAsm { .. } => {
                return Err(InterpError::Unsupported("inline assembly".into()));
            }
        }
        Ok(())
    }

    fn execute_terminator(
        &mut self,
        terminator: &IrTerminator,
    ) -> Result<TerminatorResult, InterpError> {
        match terminator {
            IrTerminator::Branch { target } => Ok(TerminatorResult::Continue(*target)),

            IrTerminator::CondBranch {
                condition,
                true_target,
                false_target,
            } => {
                if self.read(*condition)? != 0 {
                    Ok(TerminatorResult::Continue(*true_target))
                } else {
                    Ok(TerminatorResult::Continue(*false_target))
                }
            }

            IrTerminator::Switch {
                value,
                cases,
                default,
            } => {
                let switch_val = self.read(*value)?;
                let target = cases
                    .iter()
                    .find(|(case_val, _)| *case_val == switch_val)
                    .map_or(*default, |(_, target)| *target);
                Ok(TerminatorResult::Continue(target))
            }

            IrTerminator::Return { value } => {
                let result = match value {
                    Some(v) => self.read(*v)?,
                    None => 0,
                };
                Ok(TerminatorResult::Return(result))
            }

            IrTerminator::Unreachable => {
                let frame = self.current_frame();
                Err(InterpError::RuntimeError(format!(
                    "reached unreachable code in {} of {}",
                    frame.current_block, frame.function_id
                )))
            }
        }
    }

    fn memory_cell(&mut self, addr: i64) -> Result<&mut i64, InterpError> {
        if addr <= 0 {
            return Err(InterpError::InvalidAddress(addr));
        }
        self.memory
            .get_mut(addr as usize - 1)
            .ok_or(InterpError::InvalidAddress(addr))
    }

    fn const_value(value: &IrValue) -> Result<i64, InterpError> {
        match value {
            IrValue::Bool(b) => Ok(*b as i64),
            IrValue::Void | IrValue::Undef | IrValue::Null => Ok(0),
            IrValue::F32(_) | IrValue::F64(_) => {
                Err(InterpError::Unsupported("floating point constant".into()))
            }
            int => int
                .as_int()
                .ok_or_else(|| InterpError::Unsupported(format!("constant {:?}", int))),
        }
    }

    /// Evaluate `op` at the width of `ty` (64 bits when unknown).
    fn eval_binary_op(
        op: BinaryOp,
        l: i64,
        r: i64,
        ty: Option<&IrType>,
    ) -> Result<i64, InterpError> {
        let unsigned = |v: i64| Self::unsigned_at(v, ty);
        let nonzero = |r: u64| if r == 0 { Err(InterpError::DivisionByZero) } else { Ok(r) };
        let result = match op {
            BinaryOp::Add => l.wrapping_add(r),
            BinaryOp::Sub => l.wrapping_sub(r),
            BinaryOp::Mul => l.wrapping_mul(r),
            BinaryOp::Div => l.wrapping_div(nonzero(r as u64)? as i64),
            BinaryOp::Rem => l.wrapping_rem(nonzero(r as u64)? as i64),
            BinaryOp::UDiv => (unsigned(l) / nonzero(unsigned(r))?) as i64,
            BinaryOp::URem => (unsigned(l) % nonzero(unsigned(r))?) as i64,
            BinaryOp::And => l & r,
            BinaryOp::Or => l | r,
            BinaryOp::Xor => l ^ r,
            BinaryOp::Shl => l.wrapping_shl(r as u32),
            BinaryOp::Shr => l.wrapping_shr(r as u32),
            BinaryOp::UShr => unsigned(l).wrapping_shr(r as u32) as i64,
            BinaryOp::FAdd | BinaryOp::FSub | BinaryOp::FMul | BinaryOp::FDiv => {
                return Err(InterpError::Unsupported(format!("{:?}", op)))
            }
        };
        Ok(Self::wrap_to(result, ty))
    }

    fn eval_compare_op(
        op: CompareOp,
        l: i64,
        r: i64,
        ty: Option<&IrType>,
    ) -> Result<bool, InterpError> {
        let (ul, ur) = (Self::unsigned_at(l, ty), Self::unsigned_at(r, ty));
        Ok(match op {
            CompareOp::Eq => l == r,
            CompareOp::Ne => l != r,
            CompareOp::Lt => l < r,
            CompareOp::Le => l <= r,
            CompareOp::Gt => l > r,
            CompareOp::Ge => l >= r,
            CompareOp::ULt => ul < ur,
            CompareOp::ULe => ul <= ur,
            CompareOp::UGt => ul > ur,
            CompareOp::UGe => ul >= ur,
            _ => return Err(InterpError::Unsupported(format!("{:?}", op))),
        })
    }

    /// Zero-extend the low bits of `v` that an integer `ty` occupies
    fn unsigned_at(v: i64, ty: Option<&IrType>) -> u64 {
        match ty.and_then(IrType::bit_width) {
            Some(bits) if bits < 64 => (v as u64) & ((1u64 << bits) - 1),
            _ => v as u64,
        }
    }

    /// Normalize an integer result to its register type; other types pass through
    fn wrap_to(v: i64, ty: Option<&IrType>) -> i64 {
        match ty {
            Some(ty) if ty.is_integer() => Self::cast_value(v, ty).unwrap_or(v),
            _ => v,
        }
    }

    /// Truncate to the target width, then sign- or zero-extend back to 64 bits
    fn cast_value(val: i64, to_ty: &IrType) -> Result<i64, InterpError> {
        match to_ty {
            IrType::Bool => Ok((val != 0) as i64),
            IrType::Ptr(_) | IrType::I64 | IrType::U64 => Ok(val),
            ty if ty.is_integer() => {
                let bits = ty.bit_width().unwrap_or(64);
                let shift = 64 - bits;
                Ok(if ty.is_signed_integer() {
                    (val << shift) >> shift
                } else {
                    ((val as u64) << shift >> shift) as i64
                })
            }
            other => Err(InterpError::Unsupported(format!("cast to {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionSignatureBuilder, IrBuilder};

    #[test]
    fn test_loop_and_trace() {
        // sum(n) = observe(0) + ... + observe(n-1), returns 0+1+..+(n-1)
        let mut builder = IrBuilder::new("test");
        let observe = builder.declare_extern(
            "observe",
            FunctionSignatureBuilder::new()
                .param("v", IrType::I64)
                .returns(IrType::Void)
                .build(),
        );
        let sig = FunctionSignatureBuilder::new()
            .param("n", IrType::I64)
            .returns(IrType::I64)
            .build();
        builder.start_function("sum", sig);
        let n = builder.param(0).unwrap();
        let header = builder.create_block().unwrap();
        let exit = builder.create_block().unwrap();
        let zero = builder.build_int(0, IrType::I64).unwrap();
        let one = builder.build_int(1, IrType::I64).unwrap();
        builder.build_branch(header);

        builder.switch_to_block(header);
        let i = builder.build_phi(header, IrType::I64).unwrap();
        let acc = builder.build_phi(header, IrType::I64).unwrap();
        builder.build_call_direct(observe, vec![i]);
        let acc2 = builder.build_add(acc, i, false).unwrap();
        let next = builder.build_add(i, one, false).unwrap();
        let cond = builder.build_cmp(CompareOp::Ne, next, n).unwrap();
        builder.add_phi_incoming(header, i, IrBlockId::entry(), zero);
        builder.add_phi_incoming(header, i, header, next);
        builder.add_phi_incoming(header, acc, IrBlockId::entry(), zero);
        builder.add_phi_incoming(header, acc, header, acc2);
        builder.build_cond_branch(cond, header, exit);
        builder.switch_to_block(exit);
        builder.build_return(Some(acc2));
        builder.finish_function();

        let mut interp = MirInterpreter::new();
        assert_eq!(interp.execute_by_name(&builder.module, "sum", &[4]), Ok(6));
        let args: Vec<i64> = interp.trace().iter().map(|e| e.args[0]).collect();
        assert_eq!(args, vec![0, 1, 2, 3]);
        assert!(interp.trace().iter().all(|e| e.callee == "observe"));

        // n = 0 never satisfies `next != n` on a do-while: the budget stops it
        let mut bounded = MirInterpreter::with_step_limit(1_000);
        assert_eq!(
            bounded.execute_by_name(&builder.module, "sum", &[0]),
            Err(InterpError::StepLimitExceeded(1_000))
        );
    }

    #[test]
    fn test_memory_and_arithmetic() {
        let mut builder = IrBuilder::new("test");
        let sig = FunctionSignatureBuilder::new().returns(IrType::I64).build();
        builder.start_function("f", sig);
        let slot = builder.build_alloc(IrType::I64, None).unwrap();
        let seven = builder.build_int(7, IrType::I64).unwrap();
        let three = builder.build_int(3, IrType::I64).unwrap();
        builder.build_store(slot, seven);
        let loaded = builder.build_load(slot, IrType::I64).unwrap();
        let rem = builder.build_binop(BinaryOp::URem, loaded, three).unwrap();
        let mask = builder.build_binop(BinaryOp::And, loaded, three).unwrap();
        let sum = builder.build_add(rem, mask, false).unwrap();
        builder.build_return(Some(sum));
        builder.finish_function();

        let mut interp = MirInterpreter::new();
        assert_eq!(interp.execute_by_name(&builder.module, "f", &[]), Ok(1 + 3));
        assert_eq!(
            MirInterpreter::eval_binary_op(BinaryOp::URem, 5, 0, None),
            Err(InterpError::DivisionByZero)
        );
        assert_eq!(MirInterpreter::cast_value(-1, &IrType::U8), Ok(255));
        assert_eq!(MirInterpreter::cast_value(255, &IrType::I8), Ok(-1));
    }

    #[test]
    fn test_narrow_arithmetic_wraps() {
        let eval = MirInterpreter::eval_binary_op;
        assert_eq!(eval(BinaryOp::Add, 250, 10, Some(&IrType::U8)), Ok(4));
        assert_eq!(eval(BinaryOp::Add, 127, 1, Some(&IrType::I8)), Ok(-128));
        assert_eq!(eval(BinaryOp::Sub, 3, 5, Some(&IrType::U8)), Ok(254));
        // -1 as an i8 is 255 unsigned
        assert_eq!(eval(BinaryOp::URem, -1, 16, Some(&IrType::I8)), Ok(15));
        assert_eq!(eval(BinaryOp::And, 200, 7, Some(&IrType::U8)), Ok(0));
        assert_eq!(
            eval(BinaryOp::Mul, i64::from(i32::MAX), 2, Some(&IrType::I32)),
            Ok(-2)
        );
        assert_eq!(
            MirInterpreter::eval_compare_op(CompareOp::ULt, -1, 1, Some(&IrType::I8)),
            Ok(false)
        );
        assert_eq!(MirInterpreter::wrap_to(300, Some(&IrType::U8)), 44);
        assert_eq!(MirInterpreter::wrap_to(300, Some(&IrType::Bool)), 300);
    }

    #[test]
    fn test_narrow_counter_loop() {
        // count(n: u8) runs `i = 0; do { observe(i); i += 1 } while i != n`
        let mut builder = IrBuilder::new("test");
        let observe = builder.declare_extern(
            "observe",
            FunctionSignatureBuilder::new()
                .param("v", IrType::U8)
                .returns(IrType::Void)
                .build(),
        );
        let sig = FunctionSignatureBuilder::new()
            .param("n", IrType::U8)
            .returns(IrType::U8)
            .build();
        builder.start_function("count", sig);
        let n = builder.param(0).unwrap();
        let header = builder.create_block().unwrap();
        let exit = builder.create_block().unwrap();
        let zero = builder.build_int(0, IrType::U8).unwrap();
        let one = builder.build_int(1, IrType::U8).unwrap();
        builder.build_branch(header);

        builder.switch_to_block(header);
        let i = builder.build_phi(header, IrType::U8).unwrap();
        builder.build_call_direct(observe, vec![i]);
        let next = builder.build_add(i, one, false).unwrap();
        let cond = builder.build_cmp(CompareOp::Ne, next, n).unwrap();
        builder.add_phi_incoming(header, i, IrBlockId::entry(), zero);
        builder.add_phi_incoming(header, i, header, next);
        builder.build_cond_branch(cond, header, exit);
        builder.switch_to_block(exit);
        builder.build_return(Some(next));
        builder.finish_function();

        // n = 0 wraps around after 256 iterations
        let mut interp = MirInterpreter::new();
        assert_eq!(interp.execute_by_name(&builder.module, "count", &[0]), Ok(0));
        assert_eq!(interp.trace().len(), 256);
        assert_eq!(interp.trace()[255].args, vec![255]);

        // Arguments are truncated to the parameter type
        interp.reset();
        assert_eq!(interp.execute_by_name(&builder.module, "count", &[259]), Ok(3));
        assert_eq!(interp.trace().len(), 3);
    }

    #[test]
    fn test_switch_dispatch() {
        let mut builder = IrBuilder::new("test");
        let sig = FunctionSignatureBuilder::new()
            .param("x", IrType::I64)
            .returns(IrType::I64)
            .build();
        builder.start_function("pick", sig);
        let x = builder.param(0).unwrap();
        let one = builder.create_block().unwrap();
        let other = builder.create_block().unwrap();
        builder.build_switch(x, vec![(1, one)], other);
        builder.switch_to_block(one);
        let ten = builder.build_int(10, IrType::I64).unwrap();
        builder.build_return(Some(ten));
        builder.switch_to_block(other);
        let twenty = builder.build_int(20, IrType::I64).unwrap();
        builder.build_return(Some(twenty));
        builder.finish_function();

        let mut interp = MirInterpreter::new();
        assert_eq!(interp.execute_by_name(&builder.module, "pick", &[1]), Ok(10));
        assert_eq!(interp.execute_by_name(&builder.module, "pick", &[5]), Ok(20));
        assert!(interp.steps() > 0);
    }
}
