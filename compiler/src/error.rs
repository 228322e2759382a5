//! Fatal compiler errors.
//!
//! These are compiler-internal contract violations, not user script
//! errors: when one occurs, no prototype is produced for the affected
//! function. User-level problems go through the diagnostic sink instead
//! and compilation continues best-effort.

use std::fmt;

use diagnostics::Span;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilerError {
    /// A name was declared twice in one function without an intervening
    /// scope exit removing the first.
    DuplicateLocal { name: String, span: Span },
    /// An empty identifier where a name is required.
    EmptyName { span: Span },
    /// The tracked operand stack depth went negative; the emitted code
    /// would underflow the VM stack.
    StackUnderflow,
    /// An operand (slot, constant index, argument count, jump target) does
    /// not fit its instruction field.
    OperandOverflow { what: &'static str, value: usize },
    /// A forward jump still carries its placeholder target at build time.
    UnpatchedJump { index: usize },
    /// Emission was attempted on a builder that has already been built.
    BuilderFinalized,
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompilerError::DuplicateLocal { name, span } => {
                write!(f, "[{span}] local variable `{name}` already defined in function")
            }
            CompilerError::EmptyName { span } => {
                write!(f, "[{span}] empty identifier where a name is required")
            }
            CompilerError::StackUnderflow => {
                write!(f, "operand stack depth went negative during emission")
            }
            CompilerError::OperandOverflow { what, value } => {
                write!(f, "{what} {value} does not fit its instruction field")
            }
            CompilerError::UnpatchedJump { index } => {
                write!(f, "jump at instruction {index} was never patched with a target")
            }
            CompilerError::BuilderFinalized => {
                write!(f, "instruction emitted after the prototype was built")
            }
        }
    }
}

impl std::error::Error for CompilerError {}
