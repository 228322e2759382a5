//! The Veld bytecode compiler.
//!
//! Lowers a parsed AST into [`FunctionPrototype`]s for the stack VM, in
//! two stages: a simplification pass ([`process::AstProcessor`]) that
//! resolves result-required flags, prunes dead computation, and folds
//! constant branches; then a single code-generation walk
//! ([`codegen::Compiler`]) over the simplified tree.

use std::rc::Rc;

use bytecode::FunctionPrototype;
use diagnostics::DiagnosticSink;
use syntax::Ast;

pub mod builder;
pub mod codegen;
pub mod control_flow;
pub mod error;
pub mod functions;
pub mod process;
pub mod scopes;

pub use builder::PrototypeBuilder;
pub use codegen::Compiler;
pub use error::CompilerError;
pub use process::AstProcessor;

/// Simplify and compile one compilation unit. Recoverable problems land
/// in `diag` and still produce a runnable prototype; a fatal error means
/// no prototype at all.
pub fn compile(
    ast: &Ast,
    diag: &mut dyn DiagnosticSink,
) -> Result<Rc<FunctionPrototype>, CompilerError> {
    let processed = AstProcessor::new(diag).process(ast);
    Compiler::new(diag).compile(&processed)
}
