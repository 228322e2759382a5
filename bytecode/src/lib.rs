//! The Veld bytecode format.
//!
//! This crate is the contract between the compiler and the virtual
//! machine: the instruction word layout, the opcode set, the constant
//! values a pool can hold, and the immutable [`FunctionPrototype`] the
//! compiler hands to the VM loader.

pub mod disasm;
pub mod io;
pub mod opcode;
pub mod prototype;
pub mod value;

pub use opcode::OpCode;
pub use prototype::{FunctionPrototype, OuterValueInfo, OuterValueKind};
pub use value::Value;
