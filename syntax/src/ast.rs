//! AST node definitions.
//!
//! Every node carries a [`Span`] for diagnostics and a `required` flag
//! recording whether its evaluation result must be left on the operand
//! stack (`true`) or evaluated for side effects only (`false`). The flag
//! is a traversal annotation, not part of node identity: the parser
//! produces every node with `required = true` and the AST processor
//! rebuilds the tree with the resolved flags before code generation.

use diagnostics::Span;

use crate::symbol::{Ident, Operator};

/// A complete compilation unit: the ordered top-level statements.
#[derive(Clone, Debug, Default)]
pub struct Ast {
    pub nodes: Vec<Node>,
}

impl Ast {
    pub fn new(nodes: Vec<Node>) -> Self {
        Ast { nodes }
    }
}

/// The static description of a function literal.
#[derive(Clone, Debug)]
pub struct FunctionData {
    pub params: Vec<Ident>,
    pub variadic: bool,
    pub body: Box<Node>,
}

/// One AST node: a kind, a source location, and the result-required flag.
#[derive(Clone, Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    pub required: bool,
}

impl Node {
    /// Parser-side constructor; the result is assumed required until the
    /// AST processor decides otherwise.
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Node {
            kind,
            span,
            required: true,
        }
    }

    pub fn with_required(kind: NodeKind, span: Span, required: bool) -> Self {
        Node {
            kind,
            span,
            required,
        }
    }

    /// Whether this node can leave a value on the operand stack. Named
    /// function definitions always store their closure and yield nothing;
    /// everything else in Veld is an expression.
    pub fn is_expression(&self) -> bool {
        !matches!(self.kind, NodeKind::FunctionDef { .. })
    }
}

/// The closed set of node kinds.
#[derive(Clone, Debug)]
pub enum NodeKind {
    NullLit,
    BoolLit(bool),
    IntLit(i64),
    FloatLit(f64),
    StringLit(String),
    /// A name reference, resolved at compile time to a local slot, a
    /// captured outer value, or a global.
    Ident(Ident),
    Prefix {
        op: Operator,
        expr: Box<Node>,
    },
    Infix {
        op: Operator,
        left: Box<Node>,
        right: Box<Node>,
    },
    /// `var a = x, b = y` — parallel name/value lists.
    VarDef {
        names: Vec<Ident>,
        values: Vec<Node>,
    },
    Assign {
        left: Box<Node>,
        right: Box<Node>,
    },
    /// `target[index]` as a load. Also doubles as the shape the compiler
    /// recognizes for store-index assignment and method-style invocation.
    LoadIndex {
        target: Box<Node>,
        index: Box<Node>,
    },
    /// An anonymous function literal.
    Function(FunctionData),
    /// `fn name(...) ...` — declares `name`, then stores the closure in it.
    FunctionDef {
        name: Ident,
        data: FunctionData,
    },
    Invoke {
        target: Box<Node>,
        args: Vec<Node>,
    },
    List(Vec<Node>),
    Tuple(Vec<Node>),
    /// An ordered statement sequence with its own lexical scope.
    Scope(Vec<Node>),
    If {
        condition: Box<Node>,
        pass: Box<Node>,
        fail: Option<Box<Node>>,
    },
    Not(Box<Node>),
    And {
        left: Box<Node>,
        right: Box<Node>,
    },
    Or {
        left: Box<Node>,
        right: Box<Node>,
    },
    /// `while cond: body` with an optional `el` clause that runs only when
    /// the loop body never ran (the zero-iteration case).
    While {
        condition: Box<Node>,
        pass: Box<Node>,
        initial_fail: Option<Box<Node>>,
    },
    /// `ref expr` — hands back a mutable cell rather than a value.
    Reference(Box<Node>),
    /// `deref expr` — unwraps a reference cell to its current value.
    Dereference(Box<Node>),
}
