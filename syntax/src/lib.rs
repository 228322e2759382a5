//! Owned AST types for the Veld language.
//!
//! These types represent the parsed structure of a Veld program,
//! independent of any particular parser. The compiler consumes them as-is
//! and does not re-validate syntactic well-formedness.

pub mod ast;
pub mod symbol;

pub use ast::{Ast, FunctionData, Node, NodeKind};
pub use symbol::{Ident, Operator};
