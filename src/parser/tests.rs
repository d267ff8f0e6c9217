use crate::lexer::tokenize;
use crate::reserved::ReservedWords;
use crate::symtab::{DataType, Extras, SymbolKind};

use super::compile;

fn compile_ok(src: &str) -> super::CompiledProgram {
    let reserved = ReservedWords::builtin();
    let tokens = tokenize(src, &reserved).expect("lex failed");
    compile(tokens, 5000).expect("compile failed")
}

fn compile_err(src: &str) -> String {
    let reserved = ReservedWords::builtin();
    let tokens = tokenize(src, &reserved).expect("lex failed");
    compile(tokens, 5000).expect_err("expected a compile error").to_string()
}

#[test]
fn minimal_program_compiles_to_nonempty_bytecode() {
    let compiled = compile_ok("program p; begin end.");
    assert!(!compiled.bytecode.is_empty());
}

#[test]
fn var_section_declares_symbols_with_correct_types() {
    let compiled = compile_ok("program p; var a:integer; b:real; c:char; d:boolean; begin end.");
    let a = compiled.symtab.lookup("a").unwrap();
    assert_eq!(a.kind, SymbolKind::Variable);
    assert_eq!(a.data_type, DataType::Int);
    let b = compiled.symtab.lookup("b").unwrap();
    assert_eq!(b.data_type, DataType::Real);
    let c = compiled.symtab.lookup("c").unwrap();
    assert_eq!(c.data_type, DataType::Char);
    let d = compiled.symtab.lookup("d").unwrap();
    assert_eq!(d.data_type, DataType::Bool);
}

#[test]
fn array_declaration_allocates_the_expected_slot_count() {
    // 4 * (high - low) for non-char element types (no +1), per the
    // address-computation formula carried over from the source.
    let compiled = compile_ok("program p; var a:array[0..4] of integer; b:integer; begin end.");
    let a = compiled.symtab.lookup("a").unwrap();
    assert_eq!(a.kind, SymbolKind::Array);
    match a.extras {
        Extras::Array { low, high, element_type } => {
            assert_eq!((low, high), (0, 4));
            assert_eq!(element_type, DataType::Int);
        }
        _ => panic!("expected Array extras"),
    }
    let b = compiled.symtab.lookup("b").unwrap();
    assert_eq!(b.data_pointer, a.data_pointer + 4 * (4 - 0));
}

#[test]
fn char_array_slot_count_has_no_plus_one() {
    let compiled = compile_ok("program p; var a:array[0..4] of char; b:integer; begin end.");
    let a = compiled.symtab.lookup("a").unwrap();
    let b = compiled.symtab.lookup("b").unwrap();
    assert_eq!(b.data_pointer, a.data_pointer + (4 - 0));
}

#[test]
fn procedure_declaration_is_registered_after_its_body_is_parsed() {
    let compiled = compile_ok(
        "program p; var total:integer; \
         procedure bump(n:integer); begin total:=total+1 end; \
         begin total:=0; bump end.",
    );
    let proc = compiled.symtab.lookup("bump").unwrap();
    assert_eq!(proc.kind, SymbolKind::Procedure);
    // the parameter is flat-scoped into the global table too
    assert!(compiled.symtab.lookup("n").is_some());
}

#[test]
fn undeclared_variable_is_a_semantic_error() {
    let msg = compile_err("program p; begin a:=1 end.");
    assert_eq!(msg, "SemanticError: Variable a is not declared");
}

#[test]
fn redeclaring_a_variable_is_a_semantic_error() {
    let msg = compile_err("program p; var a:integer; a:integer; begin end.");
    assert!(msg.starts_with("SemanticError:"), "got: {msg}");
}

#[test]
fn missing_dot_terminator_is_a_syntax_error() {
    let reserved = ReservedWords::builtin();
    let tokens = tokenize("program p; begin end", &reserved).expect("lex failed");
    let err = compile(tokens, 5000).expect_err("expected a syntax error");
    assert!(err.to_string().starts_with("SyntaxError:"), "got: {err}");
}

#[test]
fn program_header_tolerates_a_stray_comment_token() {
    // original_source/parse.py's program-header parsing skips COMMENT
    // tokens that land between PROGRAM and the identifier.
    let compiled = compile_ok("program {greeting} p; begin end.");
    assert!(!compiled.bytecode.is_empty());
}

#[test]
fn if_without_else_compiles() {
    let compiled = compile_ok("program p; var x:integer; begin x:=1; if x=1 then x:=2 end.");
    assert!(!compiled.bytecode.is_empty());
}

#[test]
fn nested_begin_end_blocks_compile() {
    let compiled = compile_ok(
        "program p; var x:integer; \
         begin begin x:=1 end; begin x:=2 end end.",
    );
    assert!(!compiled.bytecode.is_empty());
}

#[test]
fn case_statement_compiles_with_multiple_arms() {
    let compiled = compile_ok(
        "program p; var x:integer; \
         begin x:=1; case (x) of 1: x:=10; 2: x:=20 end; end.",
    );
    assert!(!compiled.bytecode.is_empty());
}
