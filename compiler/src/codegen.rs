//! The code-generation driver.
//!
//! One [`Compiler`] walks a simplified AST once, depth-first, driving a
//! stack of [`PrototypeBuilder`]s — one per function currently being
//! compiled, index = nesting depth. The top of the stack is the function
//! whose body is being emitted; parents below it are only consulted (and
//! their locals marked captured) by outer-value resolution in `scopes`.
//!
//! Recoverable problems (bad assignment targets, unsupported reference
//! operands) are reported through the diagnostic sink and compilation
//! continues best-effort; fatal contract violations abort with
//! `CompilerError` and yield no prototype.

use std::rc::Rc;

use bytecode::opcode::{REF_GLOBAL, REF_INDEX, REF_LOCAL, REF_OUTER};
use bytecode::{FunctionPrototype, Value};
use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
use syntax::{Ast, Node, NodeKind};

use crate::builder::PrototypeBuilder;
use crate::control_flow::ControlFlowCompiler;
use crate::error::CompilerError;
use crate::functions::FunctionDefinitionCompiler;
use crate::scopes::ScopeCompiler;

pub struct Compiler<'a> {
    pub diag: &'a mut dyn DiagnosticSink,
    pub builders: Vec<PrototypeBuilder>,
}

impl<'a> Compiler<'a> {
    pub fn new(diag: &'a mut dyn DiagnosticSink) -> Self {
        Compiler {
            diag,
            builders: Vec::new(),
        }
    }

    /// Compile a simplified compilation unit into its top-level prototype.
    pub fn compile(&mut self, ast: &Ast) -> Result<Rc<FunctionPrototype>, CompilerError> {
        self.builders.push(PrototypeBuilder::new());
        for node in &ast.nodes {
            self.compile_node(node)?;
        }
        let builder = self.builders.pop().expect("builder stack underflow");
        Ok(Rc::new(builder.build()?))
    }

    pub(crate) fn current(&mut self) -> &mut PrototypeBuilder {
        self.builders.last_mut().expect("builder stack underflow")
    }

    pub(crate) fn current_ref(&self) -> &PrototypeBuilder {
        self.builders.last().expect("builder stack underflow")
    }

    /// Dispatch on node kind. Each arm leaves the operand stack deeper by
    /// exactly one when `node.required`, unchanged otherwise.
    pub fn compile_node(&mut self, node: &Node) -> Result<(), CompilerError> {
        let required = node.required;
        match &node.kind {
            NodeKind::NullLit => {
                if required {
                    self.current().op_nload()?;
                }
            }
            NodeKind::BoolLit(value) => {
                if required {
                    self.current().op_bload(*value)?;
                }
            }
            NodeKind::IntLit(value) => {
                if required {
                    self.current().op_iload(*value)?;
                }
            }
            NodeKind::FloatLit(value) => {
                if required {
                    self.current().op_fload(*value)?;
                }
            }
            NodeKind::StringLit(value) => {
                if required {
                    let index = self.current().add_constant(Value::String(value.clone()))?;
                    self.current().op_cload(index)?;
                }
            }
            NodeKind::Ident(name) => {
                if required {
                    self.visit_get_variable(name)?;
                }
            }
            NodeKind::Prefix { op, expr } => {
                self.compile_node(expr)?;
                self.current().op_prefix(op)?;
                if !required {
                    self.current().op_pop()?;
                }
            }
            NodeKind::Infix { op, left, right } => {
                self.compile_node(left)?;
                self.compile_node(right)?;
                self.current().op_infix(op)?;
                if !required {
                    self.current().op_pop()?;
                }
            }
            NodeKind::VarDef { names, values } => {
                for (i, name) in names.iter().enumerate() {
                    self.define_variable(name, node.span)?;
                    self.compile_node(&values[i])?;
                    self.visit_set_variable(name)?;
                    // The last definition may serve as the statement's
                    // own value; everything before it is discarded.
                    if i < names.len() - 1 || !required {
                        self.current().op_pop()?;
                    }
                }
            }
            NodeKind::Assign { left, right } => {
                self.compile_assignment(left, right, required, node)?;
            }
            NodeKind::LoadIndex { target, index } => {
                self.compile_node(target)?;
                self.compile_node(index)?;
                self.current().op_load_index()?;
                if !required {
                    self.current().op_pop()?;
                }
            }
            NodeKind::Function(data) => {
                if required {
                    self.compile_function_data(data, node.span)?;
                }
            }
            NodeKind::FunctionDef { name, data } => {
                // Declare the name first so the body can call itself.
                self.define_variable(name, node.span)?;
                self.compile_function_data(data, node.span)?;
                self.visit_set_variable(name)?;
                // Definitions yield no value. When one is forced into value
                // position anyway (already reported as an invalid block),
                // the stored closure stands in so the stack stays balanced.
                if !required {
                    self.current().op_pop()?;
                }
            }
            NodeKind::Invoke { target, args } => {
                self.compile_invoke(target, args, required)?;
            }
            NodeKind::List(values) => {
                // Built even when unused: the elements may contain calls
                // with side effects. Only the aggregate gets discarded.
                for value in values {
                    self.compile_node(value)?;
                }
                self.current().op_list(values.len() as u32)?;
                if !required {
                    self.current().op_pop()?;
                }
            }
            NodeKind::Tuple(values) => {
                for value in values {
                    self.compile_node(value)?;
                }
                self.current().op_tuple(values.len() as u32)?;
                if !required {
                    self.current().op_pop()?;
                }
            }
            NodeKind::Scope(body) => {
                self.begin_scope();
                for child in body {
                    self.compile_node(child)?;
                }
                // The last child's own required flag produced the scope's
                // value, if any; the scope emits no load itself.
                self.end_scope()?;
            }
            NodeKind::If {
                condition,
                pass,
                fail,
            } => {
                self.compile_if(condition, pass, fail.as_deref(), required)?;
            }
            NodeKind::Not(expr) => {
                self.compile_node(expr)?;
                self.current().op_not()?;
                if !required {
                    self.current().op_pop()?;
                }
            }
            NodeKind::And { left, right } => {
                self.compile_and(left, right, required)?;
            }
            NodeKind::Or { left, right } => {
                self.compile_or(left, right, required)?;
            }
            NodeKind::While {
                condition,
                pass,
                initial_fail,
            } => {
                self.compile_while(condition, pass, initial_fail.as_deref(), required)?;
            }
            NodeKind::Reference(expr) => {
                self.compile_reference(expr, required, node)?;
            }
            NodeKind::Dereference(expr) => {
                self.compile_node(expr)?;
                self.current().op_deref()?;
                if !required {
                    self.current().op_pop()?;
                }
            }
        }
        Ok(())
    }

    fn compile_assignment(
        &mut self,
        left: &Node,
        right: &Node,
        required: bool,
        node: &Node,
    ) -> Result<(), CompilerError> {
        match &left.kind {
            NodeKind::Ident(name) => {
                self.compile_node(right)?;
                self.visit_set_variable(name)?;
            }
            NodeKind::LoadIndex { target, index } => {
                self.compile_node(target)?;
                self.compile_node(index)?;
                self.compile_node(right)?;
                self.current().op_store_index()?;
            }
            other => {
                self.diag.report(Diagnostic {
                    kind: DiagnosticKind::InvalidAssignment,
                    span: node.span,
                    message: format!("invalid assignment left side {}", kind_name(other)),
                });
                // Best effort: nothing was emitted, so keep the stack
                // shape this node promised and move on.
                if required {
                    self.current().op_nload()?;
                }
                return Ok(());
            }
        }
        if !required {
            self.current().op_pop()?;
        }
        Ok(())
    }

    fn compile_reference(
        &mut self,
        expr: &Node,
        required: bool,
        node: &Node,
    ) -> Result<(), CompilerError> {
        match &expr.kind {
            NodeKind::Ident(name) => {
                if let Some(pos) = self.current_ref().get_local_location(name) {
                    self.current().op_ref(REF_LOCAL, pos)?;
                } else {
                    let top = self.builders.len() - 1;
                    if let Some(pos) = self.resolve_outer(top, name) {
                        self.current().op_ref(REF_OUTER, pos)?;
                    } else {
                        let index = self
                            .current()
                            .add_constant(Value::String(name.as_str().to_string()))?;
                        self.current().op_ref(REF_GLOBAL, index)?;
                    }
                }
            }
            NodeKind::LoadIndex { target, index } => {
                self.compile_node(target)?;
                self.compile_node(index)?;
                self.current().op_ref(REF_INDEX, 0)?;
            }
            other => {
                self.diag.report(Diagnostic {
                    kind: DiagnosticKind::UnresolvedReference,
                    span: node.span,
                    message: format!("cannot take a reference to {}", kind_name(other)),
                });
                if required {
                    self.current().op_nload()?;
                }
                return Ok(());
            }
        }
        if !required {
            self.current().op_pop()?;
        }
        Ok(())
    }
}

pub(crate) fn kind_name(kind: &NodeKind) -> &'static str {
    match kind {
        NodeKind::NullLit => "a null literal",
        NodeKind::BoolLit(_) => "a bool literal",
        NodeKind::IntLit(_) => "an int literal",
        NodeKind::FloatLit(_) => "a float literal",
        NodeKind::StringLit(_) => "a string literal",
        NodeKind::Ident(_) => "an identifier",
        NodeKind::Prefix { .. } => "a prefix expression",
        NodeKind::Infix { .. } => "an infix expression",
        NodeKind::VarDef { .. } => "a variable definition",
        NodeKind::Assign { .. } => "an assignment",
        NodeKind::LoadIndex { .. } => "an index expression",
        NodeKind::Function(_) => "a function literal",
        NodeKind::FunctionDef { .. } => "a function definition",
        NodeKind::Invoke { .. } => "an invocation",
        NodeKind::List(_) => "a list constructor",
        NodeKind::Tuple(_) => "a tuple constructor",
        NodeKind::Scope(_) => "a block",
        NodeKind::If { .. } => "an if expression",
        NodeKind::Not(_) => "a logical not",
        NodeKind::And { .. } => "a logical and",
        NodeKind::Or { .. } => "a logical or",
        NodeKind::While { .. } => "a while loop",
        NodeKind::Reference(_) => "a reference expression",
        NodeKind::Dereference(_) => "a dereference expression",
    }
}
