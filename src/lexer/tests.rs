use crate::lexer::token::TokenKind;
use crate::lexer::tokenize;
use crate::reserved::ReservedWords;

fn lex_ok(input: &str) -> Vec<TokenKind> {
    let reserved = ReservedWords::builtin();
    tokenize(input, &reserved)
        .unwrap_or_else(|e| panic!("Unexpected error: {e}"))
        .into_iter()
        .map(|t| t.kind)
        .filter(|k| !k.is_comment())
        .collect()
}

#[test]
fn empty_input() {
    assert_eq!(lex_ok(""), vec![TokenKind::Eof]);
}

#[test]
fn program_header() {
    let kinds = lex_ok("program p;");
    assert_eq!(
        kinds,
        vec![
            TokenKind::Program,
            TokenKind::Id("p".into()),
            TokenKind::Semicolon,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn identifiers_preserve_case() {
    let kinds = lex_ok("MyVar");
    assert_eq!(kinds, vec![TokenKind::Id("MyVar".into()), TokenKind::Eof]);
}

#[test]
fn reserved_words_are_case_insensitive() {
    let kinds = lex_ok("BEGIN begin Begin");
    assert_eq!(
        kinds,
        vec![
            TokenKind::Begin,
            TokenKind::Begin,
            TokenKind::Begin,
            TokenKind::Eof
        ]
    );
}

#[test]
fn int_literal() {
    assert_eq!(
        lex_ok("123"),
        vec![TokenKind::IntLit(123), TokenKind::Eof]
    );
}

#[test]
fn real_literal() {
    assert_eq!(
        lex_ok("3.5"),
        vec![TokenKind::RealLit(3.5), TokenKind::Eof]
    );
}

#[test]
fn real_literal_with_exponent() {
    assert_eq!(
        lex_ok("1.5e2"),
        vec![TokenKind::RealLit(150.0), TokenKind::Eof]
    );
}

#[test]
fn range_literal() {
    assert_eq!(
        lex_ok("1..10"),
        vec![TokenKind::RangeLit(1, 10), TokenKind::Eof]
    );
}

#[test]
fn dot_after_int_with_no_digit_is_separate_dot() {
    // `10.` — not a real literal (no digit after the dot); the dot is its
    // own token (e.g. the program terminator).
    assert_eq!(
        lex_ok("10."),
        vec![TokenKind::IntLit(10), TokenKind::Dot, TokenKind::Eof]
    );
}

#[test]
fn char_literal() {
    assert_eq!(
        lex_ok("'a'"),
        vec![TokenKind::CharLit('a'), TokenKind::Eof]
    );
}

#[test]
fn string_literal() {
    assert_eq!(
        lex_ok("'hello'"),
        vec![TokenKind::StringLit("hello".into()), TokenKind::Eof]
    );
}

#[test]
fn unterminated_string_errors() {
    let reserved = ReservedWords::builtin();
    let err = tokenize("'oops", &reserved).unwrap_err();
    assert!(err.to_string().starts_with("LexicalError"));
}

#[test]
fn two_char_operators() {
    let kinds = lex_ok(":= <= >= <>");
    assert_eq!(
        kinds,
        vec![
            TokenKind::Assign,
            TokenKind::Lte,
            TokenKind::Gte,
            TokenKind::Neq,
            TokenKind::Eof
        ]
    );
}

#[test]
fn single_char_operators_and_punct() {
    let kinds = lex_ok("+ - * / = < > ; : , . ( ) [ ]");
    assert_eq!(
        kinds,
        vec![
            TokenKind::Plus,
            TokenKind::Minus,
            TokenKind::Star,
            TokenKind::Slash,
            TokenKind::Eq,
            TokenKind::Lt,
            TokenKind::Gt,
            TokenKind::Semicolon,
            TokenKind::Colon,
            TokenKind::Comma,
            TokenKind::Dot,
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::LBracket,
            TokenKind::RBracket,
            TokenKind::Eof
        ]
    );
}

#[test]
fn brace_comment_is_skipped() {
    assert_eq!(
        lex_ok("{ a comment } begin"),
        vec![TokenKind::Begin, TokenKind::Eof]
    );
}

#[test]
fn paren_star_comment_is_skipped() {
    assert_eq!(
        lex_ok("(* a comment *) begin"),
        vec![TokenKind::Begin, TokenKind::Eof]
    );
}

#[test]
fn line_comment_does_not_consume_newline() {
    let reserved = ReservedWords::builtin();
    let tokens = tokenize("// trailing\nbegin", &reserved).unwrap();
    let kinds: Vec<_> = tokens.into_iter().map(|t| t.kind).collect();
    assert!(matches!(kinds[0], TokenKind::Comment(_)));
    assert_eq!(kinds[1], TokenKind::Begin);
}

#[test]
fn unterminated_block_comment_errors() {
    let reserved = ReservedWords::builtin();
    let err = tokenize("{ never closes", &reserved).unwrap_err();
    assert!(err.to_string().starts_with("LexicalError"));
}

#[test]
fn unexpected_character_errors() {
    let reserved = ReservedWords::builtin();
    let err = tokenize("@", &reserved).unwrap_err();
    assert!(err.to_string().starts_with("LexicalError"));
}

#[test]
fn row_and_column_tracking() {
    let reserved = ReservedWords::builtin();
    let tokens = tokenize("begin\nend", &reserved).unwrap();
    assert_eq!(tokens[0].span.row, 1);
    assert_eq!(tokens[1].span.row, 2);
}

#[test]
fn full_program_tokenizes() {
    let reserved = ReservedWords::builtin();
    let src = "program p; var a,b:integer; begin a:=2; b:=3; write(a+b) end.";
    let tokens = tokenize(src, &reserved).unwrap();
    assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    assert!(tokens.iter().any(|t| t.kind == TokenKind::Program));
}
