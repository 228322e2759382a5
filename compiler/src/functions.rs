//! Function literals, named definitions, and invocation.

use std::rc::Rc;

use diagnostics::Span;
use syntax::{FunctionData, Node, NodeKind};

use crate::builder::PrototypeBuilder;
use crate::codegen::Compiler;
use crate::error::CompilerError;

pub trait FunctionDefinitionCompiler {
    /// Compile a function body in a child builder and emit `CLOSURE` for
    /// the finished prototype on the enclosing builder.
    fn compile_function_data(&mut self, data: &FunctionData, span: Span)
        -> Result<(), CompilerError>;
    fn compile_invoke(
        &mut self,
        target: &Node,
        args: &[Node],
        required: bool,
    ) -> Result<(), CompilerError>;
}

impl FunctionDefinitionCompiler for Compiler<'_> {
    fn compile_function_data(
        &mut self,
        data: &FunctionData,
        span: Span,
    ) -> Result<(), CompilerError> {
        self.builders.push(PrototypeBuilder::new());
        for param in &data.params {
            self.current().add_parameter(param, span)?;
        }
        self.current().variadic = data.variadic;

        self.compile_node(&data.body)?;

        let builder = self.builders.pop().expect("builder stack underflow");
        let proto = Rc::new(builder.build()?);
        self.current().op_closure(proto)?;
        Ok(())
    }

    fn compile_invoke(
        &mut self,
        target: &Node,
        args: &[Node],
        required: bool,
    ) -> Result<(), CompilerError> {
        // Method detection is purely syntactic: a callee written as an
        // index expression invokes through the receiver, recovered without
        // a separate load.
        if let NodeKind::LoadIndex {
            target: receiver,
            index,
        } = &target.kind
        {
            self.compile_node(receiver)?;
            self.compile_node(index)?;
            for arg in args {
                self.compile_node(arg)?;
            }
            self.current().op_invoke_method(args.len() as u32)?;
        } else {
            self.compile_node(target)?;
            for arg in args {
                self.compile_node(arg)?;
            }
            self.current().op_invoke(args.len() as u32)?;
        }
        if !required {
            self.current().op_pop()?;
        }
        Ok(())
    }
}
