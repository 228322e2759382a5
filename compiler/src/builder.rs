//! The bytecode assembler for a single function body.
//!
//! A [`PrototypeBuilder`] owns the growing instruction stream, constant
//! pool, local-variable table, captured-variable table, nested-prototype
//! table, and scope stack for one function, and tracks the live operand
//! stack depth as instructions are emitted. Every emission method returns
//! the index of the instruction it appended, which is what forward-jump
//! patching keys on.
//!
//! One builder exists per function being compiled; nesting is handled by
//! the driver in `codegen`, which keeps builders on a stack and resolves
//! captures across them.

use std::rc::Rc;

use bytecode::opcode::{instruction::*, OpCode};
use bytecode::{FunctionPrototype, OuterValueInfo, OuterValueKind, Value};
use diagnostics::Span;
use syntax::{Ident, Operator};

use crate::error::CompilerError;

/// One live local slot: its name, slot index, and capture state.
#[derive(Debug, Clone)]
pub struct LocalValueInfo {
    pub name: Ident,
    pub location: u32,
    pub captured: bool,
    /// Index of the first instruction at which the slot is dead. `None`
    /// while the local is live.
    pub end_op: Option<usize>,
}

pub struct PrototypeBuilder {
    pub num_params: u32,
    pub variadic: bool,

    locals: u32,
    max_locals: u32,

    stack_size: i64,
    max_stack_size: i64,

    /// Live locals currently marked as captured by some nested function.
    outer_value_count: usize,

    code: Vec<u32>,
    consts: Vec<Value>,
    outer_values: Vec<OuterValueInfo>,
    local_values: Vec<LocalValueInfo>,
    /// Locals whose scope has ended, kept for lifetime bookkeeping.
    retired_locals: Vec<LocalValueInfo>,
    nested: Vec<Rc<FunctionPrototype>>,

    /// Local-count snapshots, one per open scope.
    scopes: Vec<u32>,

    built: bool,
}

impl PrototypeBuilder {
    pub fn new() -> Self {
        PrototypeBuilder {
            num_params: 0,
            variadic: false,
            locals: 0,
            max_locals: 0,
            stack_size: 0,
            max_stack_size: 0,
            outer_value_count: 0,
            code: Vec::new(),
            consts: Vec::new(),
            outer_values: Vec::new(),
            local_values: Vec::new(),
            retired_locals: Vec::new(),
            nested: Vec::new(),
            scopes: Vec::new(),
            built: false,
        }
    }

    /// Snapshot every growable buffer into the immutable prototype. The
    /// builder is consumed; no further emission is possible. Fails if any
    /// jump still carries its placeholder target.
    pub fn build(mut self) -> Result<FunctionPrototype, CompilerError> {
        self.built = true;
        for (index, &insn) in self.code.iter().enumerate() {
            let op = OpCode::from_u8(decode_opcode(insn));
            if let Some(op) = op {
                if op.is_jump() && decode_c(insn) == JUMP_PLACEHOLDER {
                    return Err(CompilerError::UnpatchedJump { index });
                }
            }
        }
        Ok(FunctionPrototype {
            num_params: self.num_params,
            variadic: self.variadic,
            max_locals: self.max_locals,
            max_stack_size: self.max_stack_size as u32,
            code: self.code.into_boxed_slice(),
            consts: self.consts.into_boxed_slice(),
            outer_values: self.outer_values.into_boxed_slice(),
            nested: self.nested.into_boxed_slice(),
        })
    }

    // ===== Scopes/Blocks

    pub fn start_scope(&mut self) {
        self.scopes.push(self.locals);
    }

    /// Close the innermost scope: retire every local declared since entry
    /// and, when any of them had been captured, emit `CLOSE_OUTERS` at the
    /// restored local-count boundary so the VM detaches live closures from
    /// the slots about to be reused. The order matters: retire first to
    /// learn whether capture occurred, emit before the slots get reused.
    pub fn end_scope(&mut self) -> Result<(), CompilerError> {
        let initial = self.scopes.pop().unwrap_or(0);
        let old_outers = self.outer_value_count;
        if self.locals != initial {
            self.set_local_count(initial);
            if old_outers != self.outer_value_count {
                self.op_close_outers(initial)?;
            }
        }
        Ok(())
    }

    // ===== Locals

    pub fn add_parameter(&mut self, name: &Ident, span: Span) -> Result<u32, CompilerError> {
        self.num_params += 1;
        self.add_local(name, span)
    }

    pub fn add_local(&mut self, name: &Ident, span: Span) -> Result<u32, CompilerError> {
        if name.is_empty() {
            return Err(CompilerError::EmptyName { span });
        }
        if self.local_values.iter().any(|var| var.name == *name) {
            return Err(CompilerError::DuplicateLocal {
                name: name.as_str().to_string(),
                span,
            });
        }
        let pos = self.locals;
        self.local_values.push(LocalValueInfo {
            name: name.clone(),
            location: pos,
            captured: false,
            end_op: None,
        });
        self.locals += 1;
        if self.locals > self.max_locals {
            self.max_locals = self.locals;
        }
        Ok(pos)
    }

    pub fn get_local_location(&self, name: &Ident) -> Option<u32> {
        self.local_values
            .iter()
            .find(|var| var.name == *name)
            .map(|var| var.location)
    }

    /// Mark a live local slot as captured by a nested function, so this
    /// function emits `CLOSE_OUTERS` when the slot's scope exits.
    pub fn mark_local_as_outer(&mut self, location: u32) {
        if let Some(var) = self
            .local_values
            .iter_mut()
            .find(|var| var.location == location)
        {
            if !var.captured {
                var.captured = true;
                self.outer_value_count += 1;
            }
        }
    }

    fn set_local_count(&mut self, n: u32) {
        let end = self.code.len();
        while self.locals > n {
            self.locals -= 1;
            if let Some(mut var) = self.local_values.pop() {
                if var.captured {
                    self.outer_value_count -= 1;
                }
                var.end_op = Some(end);
                self.retired_locals.push(var);
            }
        }
    }

    /// Locals whose scope already ended, with their death positions.
    pub fn retired_locals(&self) -> &[LocalValueInfo] {
        &self.retired_locals
    }

    // ===== Outers

    /// An already-recorded capture of `name`, if any. Repeated captures of
    /// one name reuse the same entry.
    pub fn lookup_outer(&self, name: &Ident) -> Option<u32> {
        self.outer_values
            .iter()
            .position(|outer| outer.name == name.as_str())
            .map(|i| i as u32)
    }

    pub fn add_outer(&mut self, name: &Ident, pos: u32, kind: OuterValueKind) -> u32 {
        self.outer_values.push(OuterValueInfo {
            name: name.as_str().to_string(),
            pos,
            kind,
        });
        (self.outer_values.len() - 1) as u32
    }

    pub fn outer_values(&self) -> &[OuterValueInfo] {
        &self.outer_values
    }

    // ===== Stack accounting

    fn change_stack_size(&mut self, amount: i64) -> Result<(), CompilerError> {
        self.stack_size += amount;
        if self.stack_size < 0 {
            return Err(CompilerError::StackUnderflow);
        }
        if self.stack_size > self.max_stack_size {
            self.max_stack_size = self.stack_size;
        }
        Ok(())
    }

    pub fn stack_size(&self) -> i64 {
        self.stack_size
    }

    pub fn max_stack_size(&self) -> i64 {
        self.max_stack_size
    }

    pub fn max_locals(&self) -> u32 {
        self.max_locals
    }

    // ===== Constants

    /// Append-only, deduplicated by equality: adding an equal constant
    /// twice returns the existing index.
    pub fn add_constant(&mut self, constant: Value) -> Result<u32, CompilerError> {
        if let Some(index) = self.consts.iter().position(|c| *c == constant) {
            return Ok(index as u32);
        }
        let index = self.consts.len();
        if index as u32 > MAX_C {
            return Err(CompilerError::OperandOverflow {
                what: "constant index",
                value: index,
            });
        }
        self.consts.push(constant);
        Ok(index as u32)
    }

    pub fn consts(&self) -> &[Value] {
        &self.consts
    }

    // ===== Instruction management

    /// Index the next emitted instruction will occupy. Jump patches in the
    /// compiler consistently target this position ("one past the landing
    /// instruction's predecessor").
    pub fn next_insn_pos(&self) -> u32 {
        self.code.len() as u32
    }

    pub fn code(&self) -> &[u32] {
        &self.code
    }

    fn append(&mut self, insn: u32) -> Result<usize, CompilerError> {
        if self.built {
            return Err(CompilerError::BuilderFinalized);
        }
        self.code.push(insn);
        Ok(self.code.len() - 1)
    }

    fn append_op(&mut self, op: OpCode) -> Result<usize, CompilerError> {
        self.append(encode(op.as_u8()))
    }

    fn append_op_c(&mut self, op: OpCode, c: u32) -> Result<usize, CompilerError> {
        self.append(encode_c(op.as_u8(), c))
    }

    fn append_op_ab(&mut self, op: OpCode, a: u32, b: u32) -> Result<usize, CompilerError> {
        self.append(encode_ab(op.as_u8(), a, b))
    }

    fn check_c(&self, what: &'static str, value: u32) -> Result<u32, CompilerError> {
        if value > MAX_C {
            return Err(CompilerError::OperandOverflow {
                what,
                value: value as usize,
            });
        }
        Ok(value)
    }

    /// Patch the C operand of an already-emitted instruction.
    pub fn set_op_c(&mut self, index: usize, c: u32) {
        self.code[index] = set_c(self.code[index], c);
    }

    // ===== Emission, one method per instruction form

    pub fn op_nop(&mut self) -> Result<usize, CompilerError> {
        self.append_op(OpCode::Nop)
    }

    pub fn op_pop(&mut self) -> Result<usize, CompilerError> {
        self.change_stack_size(-1)?;
        self.append_op(OpCode::Pop)
    }

    pub fn op_dup(&mut self) -> Result<usize, CompilerError> {
        self.change_stack_size(1)?;
        self.append_op(OpCode::Dup)
    }

    pub fn op_load_local(&mut self, pos: u32) -> Result<usize, CompilerError> {
        self.change_stack_size(1)?;
        let pos = self.check_c("local slot", pos)?;
        self.append_op_c(OpCode::LoadLocal, pos)
    }

    pub fn op_store_local(&mut self, pos: u32) -> Result<usize, CompilerError> {
        let pos = self.check_c("local slot", pos)?;
        self.append_op_c(OpCode::StoreLocal, pos)
    }

    pub fn op_load_outer(&mut self, pos: u32) -> Result<usize, CompilerError> {
        self.change_stack_size(1)?;
        let pos = self.check_c("outer index", pos)?;
        self.append_op_c(OpCode::LoadOuter, pos)
    }

    pub fn op_store_outer(&mut self, pos: u32) -> Result<usize, CompilerError> {
        let pos = self.check_c("outer index", pos)?;
        self.append_op_c(OpCode::StoreOuter, pos)
    }

    pub fn op_load_global(&mut self, const_index: u32) -> Result<usize, CompilerError> {
        self.change_stack_size(1)?;
        self.append_op_c(OpCode::LoadGlobal, const_index)
    }

    pub fn op_store_global(&mut self, const_index: u32) -> Result<usize, CompilerError> {
        self.append_op_c(OpCode::StoreGlobal, const_index)
    }

    pub fn op_load_index(&mut self) -> Result<usize, CompilerError> {
        self.change_stack_size(-1)?;
        self.append_op(OpCode::LoadIndex)
    }

    pub fn op_store_index(&mut self) -> Result<usize, CompilerError> {
        self.change_stack_size(-2)?;
        self.append_op(OpCode::StoreIndex)
    }

    pub fn op_nload(&mut self) -> Result<usize, CompilerError> {
        self.change_stack_size(1)?;
        self.append_op(OpCode::NLoad)
    }

    pub fn op_bload(&mut self, value: bool) -> Result<usize, CompilerError> {
        self.change_stack_size(1)?;
        self.append_op(if value { OpCode::BLoadT } else { OpCode::BLoadF })
    }

    /// Small integers get dedicated zero-operand opcodes; everything else
    /// is pooled.
    pub fn op_iload(&mut self, value: i64) -> Result<usize, CompilerError> {
        let op = match value {
            -1 => Some(OpCode::ILoadM1),
            0 => Some(OpCode::ILoad0),
            1 => Some(OpCode::ILoad1),
            2 => Some(OpCode::ILoad2),
            3 => Some(OpCode::ILoad3),
            4 => Some(OpCode::ILoad4),
            5 => Some(OpCode::ILoad5),
            _ => None,
        };
        match op {
            Some(op) => {
                self.change_stack_size(1)?;
                self.append_op(op)
            }
            None => {
                let index = self.add_constant(Value::Int(value))?;
                self.op_cload(index)
            }
        }
    }

    pub fn op_fload(&mut self, value: f64) -> Result<usize, CompilerError> {
        // Bit comparison: -0.0 must go to the pool, not fold to FLOAD_0.
        let op = if value.to_bits() == (-1.0f64).to_bits() {
            Some(OpCode::FLoadM1)
        } else if value.to_bits() == 0.0f64.to_bits() {
            Some(OpCode::FLoad0)
        } else if value.to_bits() == 1.0f64.to_bits() {
            Some(OpCode::FLoad1)
        } else if value.to_bits() == 2.0f64.to_bits() {
            Some(OpCode::FLoad2)
        } else {
            None
        };
        match op {
            Some(op) => {
                self.change_stack_size(1)?;
                self.append_op(op)
            }
            None => {
                let index = self.add_constant(Value::Float(value))?;
                self.op_cload(index)
            }
        }
    }

    pub fn op_cload(&mut self, const_index: u32) -> Result<usize, CompilerError> {
        self.change_stack_size(1)?;
        self.append_op_c(OpCode::CLoad, const_index)
    }

    pub fn op_closure(&mut self, proto: Rc<FunctionPrototype>) -> Result<usize, CompilerError> {
        self.change_stack_size(1)?;
        let index = self.check_c("nested prototype index", self.nested.len() as u32)?;
        self.nested.push(proto);
        self.append_op_c(OpCode::Closure, index)
    }

    pub fn op_close_outers(&mut self, boundary: u32) -> Result<usize, CompilerError> {
        let boundary = self.check_c("local boundary", boundary)?;
        self.append_op_c(OpCode::CloseOuters, boundary)
    }

    pub fn op_invoke(&mut self, nargs: u32) -> Result<usize, CompilerError> {
        self.change_stack_size(-(nargs as i64))?;
        let nargs = self.check_c("argument count", nargs)?;
        self.append_op_c(OpCode::Invoke, nargs)
    }

    pub fn op_invoke_method(&mut self, nargs: u32) -> Result<usize, CompilerError> {
        self.change_stack_size(-(nargs as i64) - 1)?;
        let nargs = self.check_c("argument count", nargs)?;
        self.append_op_c(OpCode::InvokeMethod, nargs)
    }

    pub fn op_jump(&mut self, to: u32) -> Result<usize, CompilerError> {
        self.append_op_c(OpCode::Jump, to)
    }

    pub fn op_jump_eq(&mut self, to: u32) -> Result<usize, CompilerError> {
        self.change_stack_size(-2)?;
        self.append_op_c(OpCode::JumpEq, to)
    }

    pub fn op_jump_neq(&mut self, to: u32) -> Result<usize, CompilerError> {
        self.change_stack_size(-2)?;
        self.append_op_c(OpCode::JumpNeq, to)
    }

    pub fn op_jump_true(&mut self, to: u32) -> Result<usize, CompilerError> {
        self.change_stack_size(-1)?;
        self.append_op_c(OpCode::JumpTrue, to)
    }

    pub fn op_jump_false(&mut self, to: u32) -> Result<usize, CompilerError> {
        self.change_stack_size(-1)?;
        self.append_op_c(OpCode::JumpFalse, to)
    }

    pub fn op_comp_eq(&mut self) -> Result<usize, CompilerError> {
        self.change_stack_size(-1)?;
        self.append_op(OpCode::CompEq)
    }

    pub fn op_comp_neq(&mut self) -> Result<usize, CompilerError> {
        self.change_stack_size(-1)?;
        self.append_op(OpCode::CompNeq)
    }

    pub fn op_prefix(&mut self, op: &Operator) -> Result<usize, CompilerError> {
        let index = self.add_constant(Value::String(op.as_str().to_string()))?;
        self.append_op_c(OpCode::Prefix, index)
    }

    pub fn op_infix(&mut self, op: &Operator) -> Result<usize, CompilerError> {
        self.change_stack_size(-1)?;
        let index = self.add_constant(Value::String(op.as_str().to_string()))?;
        self.append_op_c(OpCode::Infix, index)
    }

    pub fn op_list(&mut self, count: u32) -> Result<usize, CompilerError> {
        self.change_stack_size(1 - count as i64)?;
        let count = self.check_c("element count", count)?;
        self.append_op_c(OpCode::List, count)
    }

    pub fn op_tuple(&mut self, count: u32) -> Result<usize, CompilerError> {
        self.change_stack_size(1 - count as i64)?;
        let count = self.check_c("element count", count)?;
        self.append_op_c(OpCode::Tuple, count)
    }

    pub fn op_not(&mut self) -> Result<usize, CompilerError> {
        self.append_op(OpCode::Not)
    }

    pub fn op_bool_and(&mut self, to: u32) -> Result<usize, CompilerError> {
        self.change_stack_size(-1)?;
        self.append_op_c(OpCode::BoolAnd, to)
    }

    pub fn op_bool_or(&mut self, to: u32) -> Result<usize, CompilerError> {
        self.change_stack_size(-1)?;
        self.append_op_c(OpCode::BoolOr, to)
    }

    /// A mode-tagged reference. Plain-name modes push the cell; the
    /// indexed mode consumes the target and key already on the stack.
    pub fn op_ref(&mut self, mode: u32, index: u32) -> Result<usize, CompilerError> {
        if index > MAX_B {
            return Err(CompilerError::OperandOverflow {
                what: "reference index",
                value: index as usize,
            });
        }
        if mode == bytecode::opcode::REF_INDEX {
            self.change_stack_size(-1)?;
        } else {
            self.change_stack_size(1)?;
        }
        self.append_op_ab(OpCode::Ref, mode, index)
    }

    pub fn op_deref(&mut self) -> Result<usize, CompilerError> {
        self.append_op(OpCode::Deref)
    }
}

impl Default for PrototypeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
