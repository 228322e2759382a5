//! The AST simplification pass.
//!
//! One pure rewriting pass over the tree before code generation: it
//! resolves the result-required flag for every node, prunes literals whose
//! results are statically unused, collapses single-statement blocks, and
//! folds `if` nodes whose condition is a compile-time literal. Returning
//! `None` means the node was pruned entirely.
//!
//! The pass runs exactly once. A fold that produces a new foldable node is
//! not re-examined; this is a documented limitation, not an invitation to
//! iterate to a fixed point.

use bytecode::Value;
use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
use syntax::{Ast, FunctionData, Node, NodeKind};

pub struct AstProcessor<'a> {
    diag: &'a mut dyn DiagnosticSink,
}

impl<'a> AstProcessor<'a> {
    pub fn new(diag: &'a mut dyn DiagnosticSink) -> Self {
        AstProcessor { diag }
    }

    /// Simplify a whole compilation unit. Top-level statement results are
    /// always discarded.
    pub fn process(&mut self, ast: &Ast) -> Ast {
        let nodes = ast
            .nodes
            .iter()
            .filter_map(|child| self.process_node(child, false))
            .collect();
        Ast::new(nodes)
    }

    /// Rewrite one node under the given result-required context. The
    /// resolved flag is stored in the returned node; the input is never
    /// mutated.
    pub fn process_node(&mut self, node: &Node, required: bool) -> Option<Node> {
        let kind = match &node.kind {
            // Unused literals compile to nothing; drop them here.
            NodeKind::NullLit
            | NodeKind::BoolLit(_)
            | NodeKind::IntLit(_)
            | NodeKind::FloatLit(_)
            | NodeKind::StringLit(_) => {
                if !required {
                    return None;
                }
                node.kind.clone()
            }
            NodeKind::Ident(_) => node.kind.clone(),
            NodeKind::Prefix { op, expr } => NodeKind::Prefix {
                op: op.clone(),
                expr: self.required_child(expr),
            },
            NodeKind::Infix { op, left, right } => NodeKind::Infix {
                op: op.clone(),
                left: self.required_child(left),
                right: self.required_child(right),
            },
            NodeKind::VarDef { names, values } => NodeKind::VarDef {
                names: names.clone(),
                values: values
                    .iter()
                    .map(|value| *self.required_child(value))
                    .collect(),
            },
            NodeKind::Assign { left, right } => NodeKind::Assign {
                left: self.required_child(left),
                right: self.required_child(right),
            },
            NodeKind::LoadIndex { target, index } => NodeKind::LoadIndex {
                target: self.required_child(target),
                index: self.required_child(index),
            },
            NodeKind::Function(data) => NodeKind::Function(self.process_function_data(data)),
            NodeKind::FunctionDef { name, data } => NodeKind::FunctionDef {
                name: name.clone(),
                data: self.process_function_data(data),
            },
            NodeKind::Invoke { target, args } => NodeKind::Invoke {
                target: self.required_child(target),
                args: args.iter().map(|arg| *self.required_child(arg)).collect(),
            },
            NodeKind::List(values) => NodeKind::List(
                values
                    .iter()
                    .map(|value| *self.required_child(value))
                    .collect(),
            ),
            NodeKind::Tuple(values) => NodeKind::Tuple(
                values
                    .iter()
                    .map(|value| *self.required_child(value))
                    .collect(),
            ),
            NodeKind::Scope(body) => return self.process_scope(node, body, required),
            NodeKind::If {
                condition,
                pass,
                fail,
            } => return self.process_if(node, condition, pass, fail.as_deref(), required),
            NodeKind::Not(expr) => NodeKind::Not(self.required_child(expr)),
            NodeKind::And { left, right } => NodeKind::And {
                left: self.required_child(left),
                right: self.required_child(right),
            },
            NodeKind::Or { left, right } => NodeKind::Or {
                left: self.required_child(left),
                right: self.required_child(right),
            },
            NodeKind::While {
                condition,
                pass,
                initial_fail,
            } => NodeKind::While {
                condition: self.required_child(condition),
                // The body's value is appended to the loop's accumulator
                // only when the loop itself produces a value.
                pass: Box::new(
                    self.process_node(pass, required)
                        .unwrap_or_else(|| Node::with_required(NodeKind::NullLit, pass.span, required)),
                ),
                initial_fail: initial_fail.as_ref().map(|fail| {
                    Box::new(
                        self.process_node(fail, required)
                            .unwrap_or_else(|| Node::with_required(NodeKind::NullLit, fail.span, required)),
                    )
                }),
            },
            NodeKind::Reference(expr) => NodeKind::Reference(self.required_child(expr)),
            NodeKind::Dereference(expr) => NodeKind::Dereference(self.required_child(expr)),
        };
        Some(Node::with_required(kind, node.span, required))
    }

    /// Process a child whose value feeds its parent and therefore is
    /// always required. Pruning cannot happen under `required = true`.
    fn required_child(&mut self, child: &Node) -> Box<Node> {
        let processed = self
            .process_node(child, true)
            .unwrap_or_else(|| Node::with_required(NodeKind::NullLit, child.span, true));
        Box::new(processed)
    }

    fn process_function_data(&mut self, data: &FunctionData) -> FunctionData {
        FunctionData {
            params: data.params.clone(),
            variadic: data.variadic,
            body: self.required_child(&data.body),
        }
    }

    /// Scope blocks: only the last retained child may carry the scope's
    /// own required flag; everything before it is side-effect-only. A
    /// one-child scope collapses to that child.
    fn process_scope(&mut self, node: &Node, body: &[Node], required: bool) -> Option<Node> {
        let mut retained: Vec<Node> = Vec::with_capacity(body.len());
        let last = body.len().saturating_sub(1);
        for (i, child) in body.iter().enumerate() {
            let child_required = if i == last { required } else { false };
            if let Some(value) = self.process_node(child, child_required) {
                retained.push(value);
            }
        }
        match retained.last() {
            Some(last_node) => {
                if required && !last_node.is_expression() {
                    self.diag.report(Diagnostic {
                        kind: DiagnosticKind::InvalidBlock,
                        span: body[last].span,
                        message: "expression expected to end expression-block, got statement"
                            .to_string(),
                    });
                }
            }
            None => {
                if required {
                    self.diag.report(Diagnostic {
                        kind: DiagnosticKind::InvalidBlock,
                        span: node.span,
                        message: "expression-block is empty".to_string(),
                    });
                }
                return None;
            }
        }
        if retained.len() == 1 {
            return retained.pop();
        }
        Some(Node::with_required(
            NodeKind::Scope(retained),
            node.span,
            required,
        ))
    }

    /// `if` nodes: process both branches first, then fold the whole node
    /// away when the condition is a literal. A missing fail branch in a
    /// result-required context is synthesized as a null literal before
    /// folding. This is the only constant-folding transformation.
    fn process_if(
        &mut self,
        node: &Node,
        condition: &Node,
        pass: &Node,
        fail: Option<&Node>,
        required: bool,
    ) -> Option<Node> {
        let pass = self.process_node(pass, required);
        let fail = match fail {
            Some(fail) => self.process_node(fail, required),
            None if required => Some(Node::with_required(NodeKind::NullLit, node.span, true)),
            None => None,
        };

        let folded = match &condition.kind {
            NodeKind::NullLit => Some(false),
            NodeKind::BoolLit(b) => Some(*b),
            NodeKind::IntLit(i) => Some(Value::Int(*i).is_truthy()),
            NodeKind::FloatLit(f) => Some(Value::Float(*f).is_truthy()),
            // String literals are always truthy.
            NodeKind::StringLit(_) => Some(true),
            _ => None,
        };
        match folded {
            Some(true) => pass,
            Some(false) => fail,
            None => {
                let pass = pass
                    .unwrap_or_else(|| Node::with_required(NodeKind::NullLit, node.span, required));
                Some(Node::with_required(
                    NodeKind::If {
                        condition: self.required_child(condition),
                        pass: Box::new(pass),
                        fail: fail.map(Box::new),
                    },
                    node.span,
                    required,
                ))
            }
        }
    }
}
