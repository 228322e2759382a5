//! Tests for the AST simplification pass: result-required resolution,
//! dead-literal pruning, block collapsing, and literal-condition folding.

mod common;

use common::*;
use compiler::AstProcessor;
use diagnostics::{DiagnosticBag, DiagnosticKind};
use syntax::NodeKind;

fn process_one(node: &syntax::Node, required: bool) -> (Option<syntax::Node>, DiagnosticBag) {
    let mut bag = DiagnosticBag::new();
    let out = AstProcessor::new(&mut bag).process_node(node, required);
    (out, bag)
}

#[test]
fn true_condition_folds_to_pass_branch() {
    let folded = compile_program(vec![var_def(vec![(
        "x",
        if_else(boolean(true), infix("+", int(1), int(2)), Some(int(99))),
    )])]);
    let direct = compile_program(vec![var_def(vec![("x", infix("+", int(1), int(2)))])]);
    assert_eq!(folded.0.code, direct.0.code);
    assert_eq!(folded.0.consts, direct.0.consts);
}

#[test]
fn false_condition_folds_to_fail_branch() {
    let folded = compile_program(vec![var_def(vec![(
        "x",
        if_else(int(0), int(1), Some(int(2))),
    )])]);
    let direct = compile_program(vec![var_def(vec![("x", int(2))])]);
    assert_eq!(folded.0.code, direct.0.code);
}

#[test]
fn false_condition_without_fail_folds_to_null_when_required() {
    let folded = compile_program(vec![var_def(vec![(
        "x",
        if_else(boolean(false), int(1), None),
    )])]);
    let direct = compile_program(vec![var_def(vec![("x", null())])]);
    assert_eq!(folded.0.code, direct.0.code);
}

#[test]
fn false_condition_without_fail_vanishes_when_unused() {
    // An unused statically-false if with no fail branch compiles to nothing.
    let (out, bag) = process_one(&if_else(boolean(false), int(1), None), false);
    assert!(out.is_none());
    assert!(bag.is_empty());
}

#[test]
fn string_condition_is_always_truthy() {
    let folded = compile_program(vec![var_def(vec![(
        "x",
        if_else(string(""), int(1), Some(int(2))),
    )])]);
    let direct = compile_program(vec![var_def(vec![("x", int(1))])]);
    assert_eq!(folded.0.code, direct.0.code);
}

#[test]
fn non_literal_condition_keeps_both_branches() {
    let (proto, bag) = compile_program(vec![var_def(vec![(
        "x",
        if_else(ident("a"), int(1), Some(int(2))),
    )])]);
    assert!(bag.is_empty());
    let names = opcode_names(&proto);
    assert!(names.contains(&"JUMP_FALSE"));
    assert!(names.contains(&"JUMP"));
    assert!(names.contains(&"ILOAD_1"));
    assert!(names.contains(&"ILOAD_2"));
}

#[test]
fn unused_literal_statements_are_pruned() {
    let with_noise = compile_program(vec![
        int(5),
        string("dead"),
        var_def(vec![("x", int(1))]),
        boolean(true),
    ]);
    let clean = compile_program(vec![var_def(vec![("x", int(1))])]);
    assert_eq!(with_noise.0.code, clean.0.code);
    assert_eq!(with_noise.0.consts, clean.0.consts);
}

#[test]
fn single_statement_block_collapses_to_its_statement() {
    let (out, bag) = process_one(&scope(vec![int(1)]), true);
    assert!(bag.is_empty());
    let out = out.unwrap();
    assert!(matches!(out.kind, NodeKind::IntLit(1)));
    assert!(out.required);
}

#[test]
fn only_the_last_block_statement_is_required() {
    let (out, bag) = process_one(&scope(vec![ident("a"), ident("b")]), true);
    assert!(bag.is_empty());
    match out.unwrap().kind {
        NodeKind::Scope(body) => {
            assert_eq!(body.len(), 2);
            assert!(!body[0].required);
            assert!(body[1].required);
        }
        other => panic!("expected a block, got {other:?}"),
    }
}

#[test]
fn empty_required_block_is_a_diagnostic() {
    let (out, bag) = process_one(&scope(vec![]), true);
    assert!(out.is_none());
    assert_eq!(bag.len(), 1);
    assert_eq!(
        bag.iter().next().unwrap().kind,
        DiagnosticKind::InvalidBlock
    );
}

#[test]
fn block_pruned_to_nothing_is_also_a_diagnostic() {
    // Everything inside is an unused literal, so nothing survives.
    let (out, bag) = process_one(&scope(vec![int(1), int(2)]), true);
    // The last literal is required and therefore kept; the block collapses
    // to it. Only a block that retains nothing reports.
    assert!(bag.is_empty());
    assert!(matches!(out.unwrap().kind, NodeKind::IntLit(2)));

    let (out, bag) = process_one(&scope(vec![null()]), false);
    assert!(out.is_none());
    assert!(bag.is_empty());
}

#[test]
fn required_block_ending_in_a_statement_is_a_diagnostic() {
    let (out, bag) = process_one(
        &scope(vec![int(7), function_def("f", vec![], int(1))]),
        true,
    );
    assert!(out.is_some());
    assert_eq!(bag.len(), 1);
    assert_eq!(
        bag.iter().next().unwrap().kind,
        DiagnosticKind::InvalidBlock
    );
}

#[test]
fn loop_body_requirement_follows_the_loop() {
    // An unused loop discards its body values entirely; a pruned body
    // literal is replaced with a null placeholder.
    let (out, _) = process_one(&while_loop(ident("c"), int(1), None), false);
    match out.unwrap().kind {
        NodeKind::While { pass, .. } => {
            assert!(matches!(pass.kind, NodeKind::NullLit));
            assert!(!pass.required);
        }
        other => panic!("expected a while loop, got {other:?}"),
    }

    let (out, _) = process_one(&while_loop(ident("c"), int(1), None), true);
    match out.unwrap().kind {
        NodeKind::While { pass, .. } => {
            assert!(matches!(pass.kind, NodeKind::IntLit(1)));
            assert!(pass.required);
        }
        other => panic!("expected a while loop, got {other:?}"),
    }
}

#[test]
fn operands_are_always_required() {
    let (out, _) = process_one(&infix("+", int(1), ident("a")), false);
    match out.unwrap().kind {
        NodeKind::Infix { left, right, .. } => {
            assert!(left.required);
            assert!(right.required);
        }
        other => panic!("expected an infix expression, got {other:?}"),
    }
}

#[test]
fn folding_is_single_pass() {
    // The fold result is not re-examined: an if produced by folding an
    // enclosing if survives to code generation and emits its jumps.
    let inner = if_else(ident("a"), int(1), Some(int(2)));
    let (proto, _) = compile_program(vec![var_def(vec![(
        "x",
        if_else(boolean(true), inner, Some(int(99))),
    )])]);
    assert!(opcode_names(&proto).contains(&"JUMP_FALSE"));
}
