//! # LALG Scanner
//!
//! Converts LALG/Pascal source text into a token stream terminated by one
//! `EOF` token.
//!
//! ## Features
//!
//! - **Numbers**: integer, real (`1.5`), and range literals (`1..10`,
//!   produced only in numeric context), with an optional `e`/`E` exponent.
//! - **Strings/characters**: single-quoted; a one-character payload is a
//!   `CHAR_LIT`, anything longer is a `STRING_LIT`.
//! - **Comments**: `{ ... }`, `(* ... *)`, and `// ... <newline>` (the
//!   newline is not consumed, so it is re-lexed as its own token).
//! - **Identifiers**: letters, digits, and underscore after the first
//!   letter/underscore; reserved words are resolved by lowercase lookup
//!   against the caller-supplied `ReservedWords` set.
//!
//! Unlike the teacher's `LexResult` (which accumulates errors for recovery),
//! this scanner fails fast: the first lexical error aborts the whole
//! pipeline, per the fatal-at-the-point-of-occurrence error policy.

pub mod cursor;
pub mod token;

#[cfg(test)]
mod tests;

use crate::error::{LalgError, Span};
use crate::reserved::ReservedWords;
use cursor::Cursor;
use token::{Token, TokenKind};

pub fn tokenize(source: &str, reserved: &ReservedWords) -> Result<Vec<Token>, LalgError> {
    let mut cursor = Cursor::new(source);
    let mut tokens = Vec::new();

    while !cursor.is_at_end() {
        if let Some(token) = lex_token(&mut cursor, reserved)? {
            tokens.push(token);
        }
    }

    let (row, col) = cursor.current_pos();
    tokens.push(Token {
        kind: TokenKind::Eof,
        lexeme: String::new(),
        span: Span::new(row, col),
    });

    Ok(tokens)
}

fn lex_token(
    cursor: &mut Cursor,
    reserved: &ReservedWords,
) -> Result<Option<Token>, LalgError> {
    while matches!(cursor.peek(), Some(' ' | '\t' | '\r')) {
        cursor.advance();
    }

    if cursor.is_at_end() {
        return Ok(None);
    }

    let (sr, sc) = cursor.current_pos();
    let ch = cursor.peek().unwrap();

    match ch {
        '\n' => {
            cursor.advance();
            Ok(None)
        }
        '{' => lex_brace_comment(cursor, sr, sc),
        '\'' => lex_quoted(cursor, sr, sc),
        c if c.is_ascii_digit() => lex_number(cursor, sr, sc),
        c if c.is_ascii_alphabetic() || c == '_' => lex_word(cursor, reserved, sr, sc),
        _ => lex_operator_or_punct(cursor, sr, sc),
    }
}

fn lex_brace_comment(
    cursor: &mut Cursor,
    sr: usize,
    sc: usize,
) -> Result<Option<Token>, LalgError> {
    cursor.advance(); // consume '{'
    let mut text = String::from("{");
    loop {
        if cursor.is_at_end() {
            return Err(LalgError::lexical(
                "Unterminated block comment",
                cursor.make_span(sr, sc),
            ));
        }
        let ch = cursor.advance().unwrap();
        text.push(ch);
        if ch == '}' {
            break;
        }
    }
    Ok(Some(Token {
        kind: TokenKind::Comment(text.clone()),
        lexeme: text,
        span: cursor.make_span(sr, sc),
    }))
}

fn lex_paren_star_comment(
    cursor: &mut Cursor,
    sr: usize,
    sc: usize,
) -> Result<Option<Token>, LalgError> {
    cursor.advance(); // '('
    cursor.advance(); // '*'
    let mut text = String::from("(*");
    loop {
        if cursor.is_at_end() {
            return Err(LalgError::lexical(
                "Unterminated block comment",
                cursor.make_span(sr, sc),
            ));
        }
        let ch = cursor.advance().unwrap();
        text.push(ch);
        if ch == '*' && cursor.peek() == Some(')') {
            cursor.advance();
            text.push(')');
            break;
        }
    }
    Ok(Some(Token {
        kind: TokenKind::Comment(text.clone()),
        lexeme: text,
        span: cursor.make_span(sr, sc),
    }))
}

fn lex_line_comment(cursor: &mut Cursor, sr: usize, sc: usize) -> Result<Option<Token>, LalgError> {
    cursor.advance(); // '/'
    cursor.advance(); // '/'
    let mut text = String::from("//");
    while let Some(ch) = cursor.peek() {
        if ch == '\n' {
            break;
        }
        cursor.advance();
        text.push(ch);
    }
    Ok(Some(Token {
        kind: TokenKind::Comment(text.clone()),
        lexeme: text,
        span: cursor.make_span(sr, sc),
    }))
}

fn lex_quoted(cursor: &mut Cursor, sr: usize, sc: usize) -> Result<Option<Token>, LalgError> {
    cursor.advance(); // opening quote
    let mut text = String::new();
    loop {
        if cursor.is_at_end() {
            return Err(LalgError::lexical(
                "Unterminated string or character literal",
                cursor.make_span(sr, sc),
            ));
        }
        let ch = cursor.peek().unwrap();
        if ch == '\n' {
            return Err(LalgError::lexical(
                "Newline inside string or character literal",
                cursor.make_span(sr, sc),
            ));
        }
        if ch == '\'' {
            cursor.advance();
            break;
        }
        text.push(ch);
        cursor.advance();
    }

    if text.chars().count() == 1 {
        Ok(Some(Token {
            kind: TokenKind::CharLit(text.chars().next().unwrap()),
            lexeme: text,
            span: cursor.make_span(sr, sc),
        }))
    } else {
        Ok(Some(Token {
            kind: TokenKind::StringLit(text.clone()),
            lexeme: text,
            span: cursor.make_span(sr, sc),
        }))
    }
}

fn lex_number(cursor: &mut Cursor, sr: usize, sc: usize) -> Result<Option<Token>, LalgError> {
    let mut raw = String::new();

    while matches!(cursor.peek(), Some(c) if c.is_ascii_digit()) {
        raw.push(cursor.advance().unwrap());
    }

    // Two consecutive dots: RANGE_LIT.
    if cursor.peek() == Some('.') && cursor.peek_at(1) == Some('.') {
        cursor.advance();
        cursor.advance();
        let mut high_raw = String::new();
        while matches!(cursor.peek(), Some(c) if c.is_ascii_digit()) {
            high_raw.push(cursor.advance().unwrap());
        }
        if high_raw.is_empty() {
            return Err(LalgError::lexical(
                "Malformed range literal",
                cursor.make_span(sr, sc),
            ));
        }
        let low = raw.parse::<i32>().map_err(|_| {
            LalgError::lexical("Malformed range literal", cursor.make_span(sr, sc))
        })?;
        let high = high_raw.parse::<i32>().map_err(|_| {
            LalgError::lexical("Malformed range literal", cursor.make_span(sr, sc))
        })?;
        return Ok(Some(Token {
            kind: TokenKind::RangeLit(low, high),
            lexeme: format!("{raw}..{high_raw}"),
            span: cursor.make_span(sr, sc),
        }));
    }

    let mut is_real = false;
    if cursor.peek() == Some('.') {
        // A single '.' is only part of the number when followed by a digit;
        // otherwise it is the program terminator / statement separator.
        if matches!(cursor.peek_at(1), Some(c) if c.is_ascii_digit()) {
            is_real = true;
            raw.push(cursor.advance().unwrap());
            while matches!(cursor.peek(), Some(c) if c.is_ascii_digit()) {
                raw.push(cursor.advance().unwrap());
            }
        }
    }

    if matches!(cursor.peek(), Some('e' | 'E')) {
        let has_sign = matches!(cursor.peek_at(1), Some('+' | '-'));
        let digit_offset = if has_sign { 2 } else { 1 };
        if matches!(cursor.peek_at(digit_offset), Some(c) if c.is_ascii_digit()) {
            is_real = true;
            raw.push(cursor.advance().unwrap()); // e/E
            if has_sign {
                raw.push(cursor.advance().unwrap());
            }
            while matches!(cursor.peek(), Some(c) if c.is_ascii_digit()) {
                raw.push(cursor.advance().unwrap());
            }
        }
    }

    if is_real {
        let value = raw
            .parse::<f32>()
            .map_err(|_| LalgError::lexical(format!("Malformed real literal: {raw}"), cursor.make_span(sr, sc)))?;
        Ok(Some(Token {
            kind: TokenKind::RealLit(value),
            lexeme: raw,
            span: cursor.make_span(sr, sc),
        }))
    } else {
        let value = raw
            .parse::<i32>()
            .map_err(|_| LalgError::lexical(format!("Malformed integer literal: {raw}"), cursor.make_span(sr, sc)))?;
        Ok(Some(Token {
            kind: TokenKind::IntLit(value),
            lexeme: raw,
            span: cursor.make_span(sr, sc),
        }))
    }
}

fn lex_word(
    cursor: &mut Cursor,
    reserved: &ReservedWords,
    sr: usize,
    sc: usize,
) -> Result<Option<Token>, LalgError> {
    let mut word = String::new();
    while matches!(cursor.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
        word.push(cursor.advance().unwrap());
    }

    let lower = word.to_ascii_lowercase();
    let kind = if reserved.contains(&lower) {
        TokenKind::reserved_from_lowercase(&lower).unwrap_or_else(|| TokenKind::Id(word.clone()))
    } else {
        TokenKind::Id(word.clone())
    };

    Ok(Some(Token {
        kind,
        lexeme: word,
        span: cursor.make_span(sr, sc),
    }))
}

fn lex_operator_or_punct(
    cursor: &mut Cursor,
    sr: usize,
    sc: usize,
) -> Result<Option<Token>, LalgError> {
    let ch = cursor.peek().unwrap();

    // Two-character operators and comment openers need one char of lookahead.
    match (ch, cursor.peek_at(1)) {
        ('(', Some('*')) => return lex_paren_star_comment(cursor, sr, sc),
        ('/', Some('/')) => return lex_line_comment(cursor, sr, sc),
        (':', Some('=')) => {
            cursor.advance();
            cursor.advance();
            return Ok(Some(Token {
                kind: TokenKind::Assign,
                lexeme: ":=".into(),
                span: cursor.make_span(sr, sc),
            }));
        }
        ('<', Some('=')) => {
            cursor.advance();
            cursor.advance();
            return Ok(Some(Token {
                kind: TokenKind::Lte,
                lexeme: "<=".into(),
                span: cursor.make_span(sr, sc),
            }));
        }
        ('>', Some('=')) => {
            cursor.advance();
            cursor.advance();
            return Ok(Some(Token {
                kind: TokenKind::Gte,
                lexeme: ">=".into(),
                span: cursor.make_span(sr, sc),
            }));
        }
        ('<', Some('>')) => {
            cursor.advance();
            cursor.advance();
            return Ok(Some(Token {
                kind: TokenKind::Neq,
                lexeme: "<>".into(),
                span: cursor.make_span(sr, sc),
            }));
        }
        _ => {}
    }

    cursor.advance();
    let kind = match ch {
        ';' => TokenKind::Semicolon,
        ':' => TokenKind::Colon,
        ',' => TokenKind::Comma,
        '.' => TokenKind::Dot,
        '(' => TokenKind::LParen,
        ')' => TokenKind::RParen,
        '[' => TokenKind::LBracket,
        ']' => TokenKind::RBracket,
        '+' => TokenKind::Plus,
        '-' => TokenKind::Minus,
        '*' => TokenKind::Star,
        '/' => TokenKind::Slash,
        '=' => TokenKind::Eq,
        '<' => TokenKind::Lt,
        '>' => TokenKind::Gt,
        other => {
            return Err(LalgError::lexical(
                format!("Unexpected character: '{other}'"),
                cursor.make_span(sr, sc),
            ))
        }
    };

    Ok(Some(Token {
        kind,
        lexeme: ch.to_string(),
        span: cursor.make_span(sr, sc),
    }))
}
