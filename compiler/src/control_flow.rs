//! Control-flow code generation: conditionals, short-circuit booleans, and
//! value-producing loops.
//!
//! Forward jumps are emitted with [`JUMP_PLACEHOLDER`] and patched once
//! the landing position is known. All targets follow one convention: the
//! index of the instruction immediately following the jumped-over range,
//! i.e. `next_insn_pos()` at patch time.

use bytecode::opcode::instruction::JUMP_PLACEHOLDER;
use bytecode::Value;
use syntax::Node;

use crate::codegen::Compiler;
use crate::error::CompilerError;

/// The method invoked on a loop accumulator to collect each iteration's
/// value.
const APPEND_METHOD: &str = "Append";

pub trait ControlFlowCompiler {
    fn compile_if(
        &mut self,
        condition: &Node,
        pass: &Node,
        fail: Option<&Node>,
        required: bool,
    ) -> Result<(), CompilerError>;
    fn compile_and(&mut self, left: &Node, right: &Node, required: bool)
        -> Result<(), CompilerError>;
    fn compile_or(&mut self, left: &Node, right: &Node, required: bool)
        -> Result<(), CompilerError>;
    fn compile_while(
        &mut self,
        condition: &Node,
        pass: &Node,
        initial_fail: Option<&Node>,
        required: bool,
    ) -> Result<(), CompilerError>;
}

impl ControlFlowCompiler for Compiler<'_> {
    fn compile_if(
        &mut self,
        condition: &Node,
        pass: &Node,
        fail: Option<&Node>,
        required: bool,
    ) -> Result<(), CompilerError> {
        self.compile_node(condition)?;
        let jump = self.current().op_jump_false(JUMP_PLACEHOLDER)?;
        self.compile_node(pass)?;

        if fail.is_some() || required {
            // A value-producing if always has both arms; a missing fail
            // arm becomes an implicit null.
            let if_end = self.current().op_jump(JUMP_PLACEHOLDER)?;
            let fail_start = self.current().next_insn_pos();
            match fail {
                Some(fail) => self.compile_node(fail)?,
                None => {
                    self.current().op_nload()?;
                }
            }
            let after_fail = self.current().next_insn_pos();
            self.current().set_op_c(if_end, after_fail);
            self.current().set_op_c(jump, fail_start);
        } else {
            let after_pass = self.current().next_insn_pos();
            self.current().set_op_c(jump, after_pass);
        }
        Ok(())
    }

    fn compile_and(
        &mut self,
        left: &Node,
        right: &Node,
        required: bool,
    ) -> Result<(), CompilerError> {
        self.compile_node(left)?;
        // Short-circuits on a false left value, leaving it on the stack
        // without evaluating the right side.
        let and = self.current().op_bool_and(JUMP_PLACEHOLDER)?;
        self.compile_node(right)?;
        let after_right = self.current().next_insn_pos();
        self.current().set_op_c(and, after_right);
        if !required {
            self.current().op_pop()?;
        }
        Ok(())
    }

    fn compile_or(
        &mut self,
        left: &Node,
        right: &Node,
        required: bool,
    ) -> Result<(), CompilerError> {
        self.compile_node(left)?;
        let or = self.current().op_bool_or(JUMP_PLACEHOLDER)?;
        self.compile_node(right)?;
        let after_right = self.current().next_insn_pos();
        self.current().set_op_c(or, after_right);
        if !required {
            self.current().op_pop()?;
        }
        Ok(())
    }

    /// Value-producing while. When a result is required the loop
    /// accumulates each iteration's body value into a list by method
    /// invocation; with no iterations the accumulator stays empty.
    ///
    /// The optional `initial_fail` (`el`) clause fires only on the
    /// zero-iteration path, which is why the condition is compiled twice:
    /// the first copy decides entered-vs-else once, the second copy is the
    /// loop's real re-test.
    fn compile_while(
        &mut self,
        condition: &Node,
        pass: &Node,
        initial_fail: Option<&Node>,
        required: bool,
    ) -> Result<(), CompilerError> {
        let has_else = initial_fail.is_some();

        if required && !has_else {
            self.current().op_list(0)?;
        }

        let mut if_jump_to_else = 0;
        let mut condition_start = self.current().next_insn_pos();
        self.compile_node(condition)?;

        if has_else {
            if_jump_to_else = self.current().op_jump_false(JUMP_PLACEHOLDER)?;
            if required {
                self.current().op_list(0)?;
            }
            let skip_first_condition = self.current().op_jump(JUMP_PLACEHOLDER)?;
            condition_start = self.current().next_insn_pos();
            self.compile_node(condition)?;
            // The first test already passed; land straight on the body,
            // one past the re-test emitted below.
            let body_start = self.current().next_insn_pos() + 1;
            self.current().set_op_c(skip_first_condition, body_start);
        }

        let while_test_false = self.current().op_jump_false(JUMP_PLACEHOLDER)?;

        if required {
            self.current().op_dup()?;
            let append = self
                .current()
                .add_constant(Value::String(APPEND_METHOD.to_string()))?;
            self.current().op_cload(append)?;
        }
        self.compile_node(pass)?;
        if required {
            // Append the body's value to the accumulator, then drop the
            // method's own null return.
            self.current().op_invoke_method(1)?;
            self.current().op_pop()?;
        }
        self.current().op_jump(condition_start)?;

        if has_else {
            let else_start = self.current().next_insn_pos();
            self.current().set_op_c(if_jump_to_else, else_start);
            if let Some(fail) = initial_fail {
                self.compile_node(fail)?;
            }
        }

        let loop_end = self.current().next_insn_pos();
        self.current().set_op_c(while_test_false, loop_end);
        Ok(())
    }
}
