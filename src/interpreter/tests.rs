use std::io::Cursor;

use super::*;
use crate::lexer::tokenize;
use crate::opcode::Bytecode;
use crate::parser;
use crate::reserved::ReservedWords;

fn compile_and_run(source: &str, input: &str) -> RunOutcome {
    let reserved = ReservedWords::builtin();
    let tokens = tokenize(source, &reserved).expect("lex failed");
    let compiled = parser::compile(tokens, 5000).expect("compile failed");
    run(&compiled.bytecode, Cursor::new(input.as_bytes()))
}

fn run_ok(source: &str, input: &str) -> String {
    let outcome = compile_and_run(source, input);
    outcome
        .result
        .unwrap_or_else(|e| panic!("Runtime error: {e}\noutput so far: {}", outcome.output));
    outcome.output
}

// ---- spec §8 end-to-end scenarios ------------------------------------------

#[test]
fn integer_arithmetic_and_print() {
    let src = "program p; var a,b:integer; begin a:=2; b:=3; write(a+b) end.";
    assert_eq!(run_ok(src, ""), "5");
}

#[test]
fn integer_real_promotion() {
    let src = "program p; var i:integer; r:real; begin i:=2; r:=1.5; write(i+r) end.";
    assert_eq!(run_ok(src, ""), "3.5");
}

#[test]
fn while_loop_with_conditional() {
    let src = "program p; var i:integer; begin i:=0; \
               while i<3 do begin write(i); i:=i+1 end; \
               end.";
    assert_eq!(run_ok(src, ""), "012");
}

#[test]
fn if_else() {
    let src = "program p; var x:integer; begin x:=5; \
               if x>3 then write(1) else write(0) end.";
    assert_eq!(run_ok(src, ""), "1");
}

#[test]
fn read_write_round_trip() {
    let src = "program p; var x:integer; begin read(x); write(x*x) end.";
    assert_eq!(run_ok(src, "7\n"), "49");
}

#[test]
fn undeclared_variable_is_a_compile_error() {
    let reserved = ReservedWords::builtin();
    let tokens = tokenize("program p; begin a:=1 end.", &reserved).expect("lex failed");
    let err = parser::compile(tokens, 5000).expect_err("expected a semantic error");
    assert_eq!(err.to_string(), "SemanticError: Variable a is not declared");
}

// ---- additional coverage ----------------------------------------------------

#[test]
fn real_literal_assignment_rounds_to_two_decimals() {
    let src = "program p; var r:real; begin r:=1.23456; write(r) end.";
    assert_eq!(run_ok(src, ""), "1.23");
}

#[test]
fn array_read_write_round_trip() {
    let src = "program p; var a:array[0..4] of integer; i:integer; \
               begin i:=2; a[i]:=99; write(a[2]) end.";
    assert_eq!(run_ok(src, ""), "99");
}

#[test]
fn for_loop_accumulates() {
    let src = "program p; var i,total:integer; \
               begin total:=0; for i:=1 to 3 do begin total:=total+i end; write(total) end.";
    assert_eq!(run_ok(src, ""), "6");
}

#[test]
fn repeat_until_runs_body_at_least_once() {
    let src = "program p; var i:integer; begin i:=0; \
               repeat write(i); i:=i+1 until i>=3 end.";
    assert_eq!(run_ok(src, ""), "012");
}

#[test]
fn case_statement_dispatches_on_value() {
    let src = "program p; var x:integer; begin x:=2; \
               case (x) of 1: write(10); 2: write(20); 3: write(30) end; end.";
    assert_eq!(run_ok(src, ""), "20");
}

#[test]
fn procedure_call_executes_body() {
    // Procedure calls are argument-free (spec §4.3.5 / DESIGN.md): the
    // declared parameter is flat-scoped into the global symbol table but
    // never bound to a caller-supplied value.
    let src = "program p; var total:integer; \
               procedure bump(n:integer); begin total:=total+1 end; \
               begin total:=0; bump; write(total) end.";
    assert_eq!(run_ok(src, ""), "1");
}

#[test]
fn write_of_compound_expression_uses_ret_and_print() {
    let src = "program p; var a,b:integer; begin a:=4; b:=5; write(a*b+1) end.";
    assert_eq!(run_ok(src, ""), "21");
}

#[test]
fn string_and_char_literal_printing() {
    let src = "program p; var c:char; begin c:='x'; write('hi ', c) end.";
    assert_eq!(run_ok(src, ""), "hi x");
}

#[test]
fn boolean_variable_from_literal_prints_true_false() {
    let src = "program p; var done:boolean; begin done:=true; write(done) end.";
    assert_eq!(run_ok(src, ""), "true");
}

#[test]
fn division_by_zero_is_a_runtime_error() {
    let src = "program p; var a,b,c:integer; begin a:=1; b:=0; c:=a div b; write(c) end.";
    let outcome = compile_and_run(src, "");
    let err = outcome.result.expect_err("expected a runtime error");
    assert!(err.to_string().starts_with("RuntimeError:"));
}

#[test]
fn unparseable_input_is_a_runtime_error() {
    let src = "program p; var x:integer; begin read(x); write(x) end.";
    let outcome = compile_and_run(src, "not a number\n");
    assert!(outcome.result.is_err());
}

// ---- VM-level opcode unit tests --------------------------------------------

fn manual_run(build: impl FnOnce(&mut Bytecode)) -> RunOutcome {
    let mut bc = Bytecode::with_capacity(256);
    build(&mut bc);
    run(bc.as_slice(), Cursor::new(&b""[..]))
}

#[test]
fn stack_underflow_on_pop_is_a_runtime_error() {
    let outcome = manual_run(|bc| {
        bc.emit_op(Opcode::Pop).unwrap();
        bc.emit_u32(0).unwrap();
        bc.emit_op(Opcode::Halt).unwrap();
    });
    assert!(outcome.result.is_err());
}

#[test]
fn xchg_swaps_top_two_values() {
    let outcome = manual_run(|bc| {
        bc.emit_op(Opcode::Pushi).unwrap();
        bc.emit_i32(1).unwrap();
        bc.emit_op(Opcode::Pushi).unwrap();
        bc.emit_i32(2).unwrap();
        bc.emit_op(Opcode::Xchg).unwrap();
        bc.emit_op(Opcode::Sub).unwrap();
        bc.emit_op(Opcode::Pop).unwrap();
        bc.emit_u32(0).unwrap();
        bc.emit_op(Opcode::Push).unwrap();
        bc.emit_u32(0).unwrap();
        bc.emit_op(Opcode::PrintI).unwrap();
        bc.emit_u32(0).unwrap();
        bc.emit_op(Opcode::Halt).unwrap();
    });
    outcome.result.unwrap();
    // pushed [1, 2], xchg -> [2, 1], sub pops right=1 left=2 -> 2-1=1
    assert_eq!(outcome.output, "1");
}

#[test]
fn comparison_opcode_naming_matches_lexical_operator() {
    // `<` lexically emits GTR, and GTR must compute `a < b` (spec §4.3.1's
    // comparison table: opcode names are the semantic inverse of the
    // operator that emits them).
    let outcome = manual_run(|bc| {
        bc.emit_op(Opcode::Pushi).unwrap();
        bc.emit_i32(1).unwrap();
        bc.emit_op(Opcode::Pushi).unwrap();
        bc.emit_i32(2).unwrap();
        bc.emit_op(Opcode::Gtr).unwrap();
        bc.emit_op(Opcode::Pop).unwrap();
        bc.emit_u32(0).unwrap();
        bc.emit_op(Opcode::PrintB).unwrap();
        bc.emit_u32(0).unwrap();
        bc.emit_op(Opcode::Halt).unwrap();
    });
    outcome.result.unwrap();
    assert_eq!(outcome.output, "true");
}

#[test]
fn halt_flushes_whatever_was_printed_before_a_later_error() {
    // write(1) succeeds, then an unknown opcode aborts: the "1" must still
    // show up in the outcome's output per spec §7's flush-before-abort policy.
    let mut bc = Bytecode::with_capacity(64);
    bc.emit_op(Opcode::PrintILit).unwrap();
    bc.emit_i32(1).unwrap();
    bc.emit_op(Opcode::Pop).unwrap(); // stack is empty: underflow
    bc.emit_u32(0).unwrap();
    let outcome = run(bc.as_slice(), Cursor::new(&b""[..]));
    assert!(outcome.result.is_err());
    assert_eq!(outcome.output, "1");
}
