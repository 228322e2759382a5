//! Compiled function prototypes.

use std::rc::Rc;

use serde::Serialize;

use crate::value::Value;

/// How a nested function reaches a variable owned by an enclosing one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum OuterValueKind {
    /// Directly: `pos` is a local slot of the immediately enclosing
    /// function.
    Local,
    /// Transitively: `pos` is an index into the immediately enclosing
    /// function's own outer-value table.
    Outer,
}

/// One entry in a prototype's capture table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OuterValueInfo {
    pub name: String,
    pub pos: u32,
    pub kind: OuterValueKind,
}

/// The immutable compiled artifact for one function body. Every closure
/// instantiated from a prototype shares it; closures differ only in their
/// captured-value bindings.
#[derive(Clone, Debug)]
pub struct FunctionPrototype {
    pub num_params: u32,
    pub variadic: bool,
    /// Most local slots ever live at once; the VM sizes frames from this.
    pub max_locals: u32,
    /// Deepest operand stack ever reached.
    pub max_stack_size: u32,
    pub code: Box<[u32]>,
    pub consts: Box<[Value]>,
    pub outer_values: Box<[OuterValueInfo]>,
    /// One entry per closure literal defined directly inside this
    /// function, referenced by index from a `CLOSURE` instruction.
    pub nested: Box<[Rc<FunctionPrototype>]>,
}
