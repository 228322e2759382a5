//! Shared test support: AST construction helpers, a linear stack-effect
//! replay for branch-free code, and a minimal interpreter that executes
//! just enough of the instruction set to check compiled control flow
//! against expected terminal states.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use bytecode::opcode::{instruction::*, OpCode, REF_INDEX};
use bytecode::{FunctionPrototype, Value};
use compiler::{AstProcessor, Compiler, PrototypeBuilder};
use diagnostics::{DiagnosticBag, Span};
use syntax::{Ast, FunctionData, Ident, Node, NodeKind, Operator};

// ============================================================================
// AST builders
// ============================================================================

pub fn node(kind: NodeKind) -> Node {
    Node::new(kind, Span::default())
}

pub fn null() -> Node {
    node(NodeKind::NullLit)
}

pub fn boolean(b: bool) -> Node {
    node(NodeKind::BoolLit(b))
}

pub fn int(i: i64) -> Node {
    node(NodeKind::IntLit(i))
}

pub fn float(f: f64) -> Node {
    node(NodeKind::FloatLit(f))
}

pub fn string(s: &str) -> Node {
    node(NodeKind::StringLit(s.to_string()))
}

pub fn ident(name: &str) -> Node {
    node(NodeKind::Ident(Ident::new(name)))
}

pub fn prefix(op: &str, expr: Node) -> Node {
    node(NodeKind::Prefix {
        op: Operator::new(op),
        expr: Box::new(expr),
    })
}

pub fn infix(op: &str, left: Node, right: Node) -> Node {
    node(NodeKind::Infix {
        op: Operator::new(op),
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn var_def(defs: Vec<(&str, Node)>) -> Node {
    let (names, values) = defs
        .into_iter()
        .map(|(name, value)| (Ident::new(name), value))
        .unzip();
    node(NodeKind::VarDef { names, values })
}

pub fn assign(left: Node, right: Node) -> Node {
    node(NodeKind::Assign {
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn load_index(target: Node, index: Node) -> Node {
    node(NodeKind::LoadIndex {
        target: Box::new(target),
        index: Box::new(index),
    })
}

pub fn invoke(target: Node, args: Vec<Node>) -> Node {
    node(NodeKind::Invoke {
        target: Box::new(target),
        args,
    })
}

pub fn list(values: Vec<Node>) -> Node {
    node(NodeKind::List(values))
}

pub fn tuple(values: Vec<Node>) -> Node {
    node(NodeKind::Tuple(values))
}

pub fn scope(body: Vec<Node>) -> Node {
    node(NodeKind::Scope(body))
}

pub fn if_else(condition: Node, pass: Node, fail: Option<Node>) -> Node {
    node(NodeKind::If {
        condition: Box::new(condition),
        pass: Box::new(pass),
        fail: fail.map(Box::new),
    })
}

pub fn not(expr: Node) -> Node {
    node(NodeKind::Not(Box::new(expr)))
}

pub fn and(left: Node, right: Node) -> Node {
    node(NodeKind::And {
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn or(left: Node, right: Node) -> Node {
    node(NodeKind::Or {
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn while_loop(condition: Node, pass: Node, initial_fail: Option<Node>) -> Node {
    node(NodeKind::While {
        condition: Box::new(condition),
        pass: Box::new(pass),
        initial_fail: initial_fail.map(Box::new),
    })
}

pub fn function(params: Vec<&str>, body: Node) -> Node {
    node(NodeKind::Function(FunctionData {
        params: params.into_iter().map(Ident::new).collect(),
        variadic: false,
        body: Box::new(body),
    }))
}

pub fn function_def(name: &str, params: Vec<&str>, body: Node) -> Node {
    node(NodeKind::FunctionDef {
        name: Ident::new(name),
        data: FunctionData {
            params: params.into_iter().map(Ident::new).collect(),
            variadic: false,
            body: Box::new(body),
        },
    })
}

pub fn reference(expr: Node) -> Node {
    node(NodeKind::Reference(Box::new(expr)))
}

pub fn dereference(expr: Node) -> Node {
    node(NodeKind::Dereference(Box::new(expr)))
}

// ============================================================================
// Compilation helpers
// ============================================================================

/// Process and compile a full program; panics on fatal errors.
pub fn compile_program(nodes: Vec<Node>) -> (Rc<FunctionPrototype>, DiagnosticBag) {
    let mut bag = DiagnosticBag::new();
    let proto = compiler::compile(&Ast::new(nodes), &mut bag).expect("compilation failed");
    (proto, bag)
}

/// Process and compile a single node as the body of an otherwise-empty
/// function frame, under an explicit result-required context.
pub fn compile_fragment(fragment: &Node, required: bool) -> (FunctionPrototype, DiagnosticBag) {
    let mut bag = DiagnosticBag::new();
    let proto = {
        let processed = AstProcessor::new(&mut bag).process_node(fragment, required);
        let mut compiler = Compiler::new(&mut bag);
        compiler.builders.push(PrototypeBuilder::new());
        if let Some(simplified) = processed {
            compiler
                .compile_node(&simplified)
                .expect("fragment compilation failed");
        }
        compiler
            .builders
            .pop()
            .unwrap()
            .build()
            .expect("fragment build failed")
    };
    (proto, bag)
}

/// The opcode names of a prototype's instruction stream, for shape
/// assertions that should not depend on operand values.
pub fn opcode_names(proto: &FunctionPrototype) -> Vec<&'static str> {
    proto
        .code
        .iter()
        .map(|&insn| {
            OpCode::from_u8(decode_opcode(insn))
                .map(OpCode::name)
                .unwrap_or("UNKNOWN")
        })
        .collect()
}

// ============================================================================
// Linear stack replay (branch-free code only)
// ============================================================================

/// Net operand-stack effect of a branch-free instruction sequence.
/// Panics on jumps: their effect depends on the path taken.
pub fn net_stack_effect(code: &[u32]) -> i64 {
    let mut depth: i64 = 0;
    for &insn in code {
        depth += insn_stack_delta(insn);
        assert!(depth >= 0, "stack went negative during replay");
    }
    depth
}

/// Stack delta of one non-jump instruction.
pub fn insn_stack_delta(insn: u32) -> i64 {
    let op = OpCode::from_u8(decode_opcode(insn)).expect("unknown opcode");
    let c = decode_c(insn) as i64;
    assert!(!op.is_jump(), "stack replay does not follow jumps: {op}");
    match op {
        OpCode::Nop | OpCode::StoreLocal | OpCode::StoreOuter | OpCode::StoreGlobal
        | OpCode::CloseOuters | OpCode::Prefix | OpCode::Not | OpCode::Deref => 0,
        OpCode::Pop | OpCode::LoadIndex | OpCode::Infix | OpCode::CompEq
        | OpCode::CompNeq => -1,
        OpCode::StoreIndex => -2,
        OpCode::Dup
        | OpCode::LoadLocal
        | OpCode::LoadOuter
        | OpCode::LoadGlobal
        | OpCode::NLoad
        | OpCode::BLoadT
        | OpCode::BLoadF
        | OpCode::ILoadM1
        | OpCode::ILoad0
        | OpCode::ILoad1
        | OpCode::ILoad2
        | OpCode::ILoad3
        | OpCode::ILoad4
        | OpCode::ILoad5
        | OpCode::FLoadM1
        | OpCode::FLoad0
        | OpCode::FLoad1
        | OpCode::FLoad2
        | OpCode::CLoad
        | OpCode::Closure => 1,
        OpCode::Invoke => -c,
        OpCode::InvokeMethod => -c - 1,
        OpCode::List | OpCode::Tuple => 1 - c,
        OpCode::Ref => {
            if decode_a(insn) == REF_INDEX {
                -1
            } else {
                1
            }
        }
        OpCode::Jump
        | OpCode::JumpEq
        | OpCode::JumpNeq
        | OpCode::JumpTrue
        | OpCode::JumpFalse
        | OpCode::BoolAnd
        | OpCode::BoolOr => unreachable!(),
    }
}

// ============================================================================
// Minimal interpreter
// ============================================================================

/// Runtime values for the test machine. Lists alias through `Rc` so that
/// `DUP` produces a second handle to the same accumulator.
#[derive(Clone, Debug)]
pub enum RtValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Rc<RefCell<Vec<RtValue>>>),
}

impl RtValue {
    pub fn list(values: Vec<RtValue>) -> Self {
        RtValue::List(Rc::new(RefCell::new(values)))
    }

    fn is_truthy(&self) -> bool {
        match self {
            RtValue::Null => false,
            RtValue::Bool(b) => *b,
            RtValue::Int(i) => *i != 0,
            RtValue::Float(f) => *f != 0.0,
            RtValue::Str(_) => true,
            RtValue::List(_) => true,
        }
    }
}

impl PartialEq for RtValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RtValue::Null, RtValue::Null) => true,
            (RtValue::Bool(a), RtValue::Bool(b)) => a == b,
            (RtValue::Int(a), RtValue::Int(b)) => a == b,
            (RtValue::Float(a), RtValue::Float(b)) => a == b,
            (RtValue::Str(a), RtValue::Str(b)) => a == b,
            (RtValue::List(a), RtValue::List(b)) => *a.borrow() == *b.borrow(),
            _ => false,
        }
    }
}

fn from_const(value: &Value) -> RtValue {
    match value {
        Value::Null => RtValue::Null,
        Value::Bool(b) => RtValue::Bool(*b),
        Value::Int(i) => RtValue::Int(*i),
        Value::Float(f) => RtValue::Float(*f),
        Value::String(s) => RtValue::Str(s.clone()),
    }
}

/// Executes the subset of the instruction set the codegen tests emit.
/// Closures and references are out of scope here; compiled capture tables
/// are asserted on directly instead of being executed.
#[derive(Default)]
pub struct Machine {
    pub stack: Vec<RtValue>,
    pub globals: HashMap<String, RtValue>,
}

impl Machine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(&mut self, proto: &FunctionPrototype) {
        let mut locals = vec![RtValue::Null; proto.max_locals as usize];
        let mut pc = 0usize;
        while pc < proto.code.len() {
            let insn = proto.code[pc];
            let op = OpCode::from_u8(decode_opcode(insn)).expect("unknown opcode");
            let c = decode_c(insn) as usize;
            pc += 1;
            match op {
                OpCode::Nop => {}
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::Dup => {
                    let top = self.top().clone();
                    self.stack.push(top);
                }
                OpCode::LoadLocal => self.stack.push(locals[c].clone()),
                OpCode::StoreLocal => locals[c] = self.top().clone(),
                OpCode::LoadGlobal => {
                    let name = self.const_name(proto, c);
                    let value = self.globals.get(&name).cloned().unwrap_or(RtValue::Null);
                    self.stack.push(value);
                }
                OpCode::StoreGlobal => {
                    let name = self.const_name(proto, c);
                    let value = self.top().clone();
                    self.globals.insert(name, value);
                }
                OpCode::LoadIndex => {
                    let key = self.pop();
                    let target = self.pop();
                    match (target, key) {
                        (RtValue::List(items), RtValue::Int(i)) => {
                            let value = items.borrow()[i as usize].clone();
                            self.stack.push(value);
                        }
                        (target, key) => panic!("cannot index {target:?} with {key:?}"),
                    }
                }
                OpCode::StoreIndex => {
                    let value = self.pop();
                    let key = self.pop();
                    let target = self.pop();
                    match (target, key) {
                        (RtValue::List(items), RtValue::Int(i)) => {
                            items.borrow_mut()[i as usize] = value.clone();
                        }
                        (target, key) => panic!("cannot index {target:?} with {key:?}"),
                    }
                    self.stack.push(value);
                }
                OpCode::NLoad => self.stack.push(RtValue::Null),
                OpCode::BLoadT => self.stack.push(RtValue::Bool(true)),
                OpCode::BLoadF => self.stack.push(RtValue::Bool(false)),
                OpCode::ILoadM1 => self.stack.push(RtValue::Int(-1)),
                OpCode::ILoad0 => self.stack.push(RtValue::Int(0)),
                OpCode::ILoad1 => self.stack.push(RtValue::Int(1)),
                OpCode::ILoad2 => self.stack.push(RtValue::Int(2)),
                OpCode::ILoad3 => self.stack.push(RtValue::Int(3)),
                OpCode::ILoad4 => self.stack.push(RtValue::Int(4)),
                OpCode::ILoad5 => self.stack.push(RtValue::Int(5)),
                OpCode::FLoadM1 => self.stack.push(RtValue::Float(-1.0)),
                OpCode::FLoad0 => self.stack.push(RtValue::Float(0.0)),
                OpCode::FLoad1 => self.stack.push(RtValue::Float(1.0)),
                OpCode::FLoad2 => self.stack.push(RtValue::Float(2.0)),
                OpCode::CLoad => self.stack.push(from_const(&proto.consts[c])),
                OpCode::List | OpCode::Tuple => {
                    let split = self.stack.len() - c;
                    let items = self.stack.split_off(split);
                    self.stack.push(RtValue::list(items));
                }
                OpCode::InvokeMethod => {
                    assert_eq!(c, 1, "test machine only appends one value");
                    let arg = self.pop();
                    let key = self.pop();
                    let receiver = self.pop();
                    match (receiver, key) {
                        (RtValue::List(items), RtValue::Str(method)) if method == "Append" => {
                            items.borrow_mut().push(arg);
                            self.stack.push(RtValue::Null);
                        }
                        (receiver, key) => {
                            panic!("test machine cannot invoke {key:?} on {receiver:?}")
                        }
                    }
                }
                OpCode::Jump => pc = c,
                OpCode::JumpEq => {
                    let b = self.pop();
                    let a = self.pop();
                    if a == b {
                        pc = c;
                    }
                }
                OpCode::JumpNeq => {
                    let b = self.pop();
                    let a = self.pop();
                    if a != b {
                        pc = c;
                    }
                }
                OpCode::JumpTrue => {
                    if self.pop().is_truthy() {
                        pc = c;
                    }
                }
                OpCode::JumpFalse => {
                    if !self.pop().is_truthy() {
                        pc = c;
                    }
                }
                OpCode::CompEq => {
                    let b = self.pop();
                    let a = self.pop();
                    self.stack.push(RtValue::Bool(a == b));
                }
                OpCode::CompNeq => {
                    let b = self.pop();
                    let a = self.pop();
                    self.stack.push(RtValue::Bool(a != b));
                }
                OpCode::Prefix => {
                    let op_name = self.const_name(proto, c);
                    let value = self.pop();
                    let result = match (op_name.as_str(), value) {
                        ("-", RtValue::Int(i)) => RtValue::Int(-i),
                        ("-", RtValue::Float(f)) => RtValue::Float(-f),
                        (op_name, value) => panic!("test machine: prefix {op_name} on {value:?}"),
                    };
                    self.stack.push(result);
                }
                OpCode::Infix => {
                    let op_name = self.const_name(proto, c);
                    let right = self.pop();
                    let left = self.pop();
                    let result = match (op_name.as_str(), left, right) {
                        ("+", RtValue::Int(a), RtValue::Int(b)) => RtValue::Int(a + b),
                        ("-", RtValue::Int(a), RtValue::Int(b)) => RtValue::Int(a - b),
                        ("*", RtValue::Int(a), RtValue::Int(b)) => RtValue::Int(a * b),
                        ("<", RtValue::Int(a), RtValue::Int(b)) => RtValue::Bool(a < b),
                        (">", RtValue::Int(a), RtValue::Int(b)) => RtValue::Bool(a > b),
                        (op_name, left, right) => {
                            panic!("test machine: {left:?} {op_name} {right:?}")
                        }
                    };
                    self.stack.push(result);
                }
                OpCode::Not => {
                    let value = self.pop();
                    self.stack.push(RtValue::Bool(!value.is_truthy()));
                }
                OpCode::BoolAnd => {
                    let value = self.pop();
                    if !value.is_truthy() {
                        self.stack.push(value);
                        pc = c;
                    }
                }
                OpCode::BoolOr => {
                    let value = self.pop();
                    if value.is_truthy() {
                        self.stack.push(value);
                        pc = c;
                    }
                }
                OpCode::CloseOuters => {}
                OpCode::LoadOuter
                | OpCode::StoreOuter
                | OpCode::Closure
                | OpCode::Invoke
                | OpCode::Ref
                | OpCode::Deref => {
                    panic!("test machine does not execute {op}")
                }
            }
        }
    }

    fn const_name(&self, proto: &FunctionPrototype, index: usize) -> String {
        match &proto.consts[index] {
            Value::String(s) => s.clone(),
            other => panic!("constant {index} is not a name: {other:?}"),
        }
    }

    fn pop(&mut self) -> RtValue {
        self.stack.pop().expect("test machine stack underflow")
    }

    fn top(&self) -> &RtValue {
        self.stack.last().expect("test machine stack underflow")
    }
}

/// Run a whole program and return its terminal global table.
pub fn run_program(nodes: Vec<Node>) -> HashMap<String, RtValue> {
    let (proto, bag) = compile_program(nodes);
    assert!(bag.is_empty(), "unexpected diagnostics: {:?}", bag.into_inner());
    let mut machine = Machine::new();
    machine.run(&proto);
    assert!(
        machine.stack.is_empty(),
        "program left values on the stack: {:?}",
        machine.stack
    );
    machine.globals
}
