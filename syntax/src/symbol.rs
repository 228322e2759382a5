//! Identifier and operator names.
//!
//! Both are thin wrappers over their source text. They exist so that the
//! rest of the front end cannot confuse a variable name with an operator
//! symbol, and so either can be used as a map key or a constant-pool entry.

use std::fmt;

/// A variable, parameter, or function name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Ident(pub String);

impl Ident {
    pub fn new(name: impl Into<String>) -> Self {
        Ident(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Ident {
    fn from(s: &str) -> Self {
        Ident::new(s)
    }
}

/// An operator symbol, e.g. `+` or `<=>`. Operators are late-bound in
/// Veld: the compiler interns the symbol text into the constant pool and
/// the runtime dispatches on it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Operator(pub String);

impl Operator {
    pub fn new(symbol: impl Into<String>) -> Self {
        Operator(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Operator {
    fn from(s: &str) -> Self {
        Operator::new(s)
    }
}
