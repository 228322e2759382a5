//! Lexical scope handling and variable resolution across nested builders.

use bytecode::{OuterValueKind, Value};
use diagnostics::Span;
use syntax::Ident;

use crate::codegen::Compiler;
use crate::error::CompilerError;

pub trait ScopeCompiler {
    fn begin_scope(&mut self);
    fn end_scope(&mut self) -> Result<(), CompilerError>;
    /// Declare a name in the current function; at top level names live in
    /// the global table instead, so nothing is declared.
    fn define_variable(&mut self, name: &Ident, span: Span) -> Result<(), CompilerError>;
    /// Resolve `name` as a capture for the builder at `builder_idx`,
    /// lazily threading outer-value entries through every intermediate
    /// level. Returns the outer-value index, or `None` when no enclosing
    /// function owns the name.
    fn resolve_outer(&mut self, builder_idx: usize, name: &Ident) -> Option<u32>;
    /// Emit a load of `name`, resolving local, then capture, then global.
    fn visit_get_variable(&mut self, name: &Ident) -> Result<(), CompilerError>;
    /// Emit a store to `name` with the same resolution order. The stored
    /// value stays on the stack.
    fn visit_set_variable(&mut self, name: &Ident) -> Result<(), CompilerError>;
}

impl ScopeCompiler for Compiler<'_> {
    fn begin_scope(&mut self) {
        self.current().start_scope();
    }

    fn end_scope(&mut self) -> Result<(), CompilerError> {
        self.current().end_scope()
    }

    fn define_variable(&mut self, name: &Ident, span: Span) -> Result<(), CompilerError> {
        if self.builders.len() > 1 {
            self.current().add_local(name, span)?;
        }
        Ok(())
    }

    fn resolve_outer(&mut self, builder_idx: usize, name: &Ident) -> Option<u32> {
        if builder_idx == 0 {
            // The top-level function has no enclosing frame to capture.
            return None;
        }
        if let Some(index) = self.builders[builder_idx].lookup_outer(name) {
            return Some(index);
        }

        let parent_idx = builder_idx - 1;
        if let Some(pos) = self.builders[parent_idx].get_local_location(name) {
            // Found in the parent's locals: the slot now escapes, so the
            // parent must close it on scope exit.
            self.builders[parent_idx].mark_local_as_outer(pos);
            return Some(self.builders[builder_idx].add_outer(name, pos, OuterValueKind::Local));
        }

        // Transitive capture: the parent reaches it as one of its own
        // outer values, adding entries to itself as needed.
        if let Some(pos) = self.resolve_outer(parent_idx, name) {
            return Some(self.builders[builder_idx].add_outer(name, pos, OuterValueKind::Outer));
        }
        None
    }

    fn visit_get_variable(&mut self, name: &Ident) -> Result<(), CompilerError> {
        if let Some(pos) = self.current_ref().get_local_location(name) {
            self.current().op_load_local(pos)?;
        } else {
            let top = self.builders.len() - 1;
            if let Some(pos) = self.resolve_outer(top, name) {
                self.current().op_load_outer(pos)?;
            } else {
                let index = self
                    .current()
                    .add_constant(Value::String(name.as_str().to_string()))?;
                self.current().op_load_global(index)?;
            }
        }
        Ok(())
    }

    fn visit_set_variable(&mut self, name: &Ident) -> Result<(), CompilerError> {
        if let Some(pos) = self.current_ref().get_local_location(name) {
            self.current().op_store_local(pos)?;
        } else {
            let top = self.builders.len() - 1;
            if let Some(pos) = self.resolve_outer(top, name) {
                self.current().op_store_outer(pos)?;
            } else {
                let index = self
                    .current()
                    .add_constant(Value::String(name.as_str().to_string()))?;
                self.current().op_store_global(index)?;
            }
        }
        Ok(())
    }
}
