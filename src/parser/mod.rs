//! Single-pass recursive-descent parser / code generator.
//!
//! Unlike the teacher's two-stage `parser` + `first_pass` split (parse to an
//! AST, then walk it to resolve symbols and encode), LALG's grammar is
//! compiled in one pass: every production both recognises syntax and emits
//! bytecode as it goes, maintaining `ip` (next write position) and `dp`
//! (next free data pointer) the way `original_source/parse.py`'s `Parser`
//! class does.

#[cfg(test)]
mod tests;

use crate::error::{LalgError, Span};
use crate::lexer::token::{Token, TokenKind};
use crate::opcode::{Bytecode, Opcode};
use crate::symtab::{slots_for_array, DataType, Extras, SymbolEntry, SymbolKind, SymbolTable};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    bytecode: Bytecode,
    symtab: SymbolTable,
}

pub struct CompiledProgram {
    pub bytecode: Vec<u8>,
    pub symtab: SymbolTable,
}

pub fn compile(tokens: Vec<Token>, capacity: usize) -> Result<CompiledProgram, LalgError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        bytecode: Bytecode::with_capacity(capacity),
        symtab: SymbolTable::new(),
    };
    parser.parse_program()?;
    Ok(CompiledProgram {
        bytecode: parser.bytecode.as_slice().to_vec(),
        symtab: parser.symtab,
    })
}

impl Parser {
    // ---- token-stream helpers -------------------------------------------------

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_span(&self) -> Span {
        self.tokens[self.pos].span
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn skip_comments(&mut self) {
        while self.peek().is_comment() {
            self.advance();
        }
    }

    /// The kind of the first non-comment token at or after `from`, without
    /// consuming anything. Used for lookahead past an identifier that may be
    /// followed by stray `COMMENT` tokens.
    fn next_significant_kind(&self, from: usize) -> &TokenKind {
        let mut i = from.min(self.tokens.len() - 1);
        while self.tokens[i].kind.is_comment() && i + 1 < self.tokens.len() {
            i += 1;
        }
        &self.tokens[i].kind
    }

    /// Advance past the current token only if it matches `expected`
    /// (compared structurally, ignoring payload for data-carrying kinds).
    fn expect(&mut self, expected: &TokenKind) -> Result<Token, LalgError> {
        self.skip_comments();
        if std::mem::discriminant(self.peek()) == std::mem::discriminant(expected) {
            Ok(self.advance())
        } else {
            Err(LalgError::syntax(
                format!("Expected {:?}, found {:?}", expected, self.peek()),
                self.peek_span(),
            ))
        }
    }

    fn check(&mut self, expected: &TokenKind) -> bool {
        self.skip_comments();
        std::mem::discriminant(self.peek()) == std::mem::discriminant(expected)
    }

    fn expect_id(&mut self) -> Result<(String, Span), LalgError> {
        self.skip_comments();
        let span = self.peek_span();
        match self.peek().clone() {
            TokenKind::Id(name) => {
                self.advance();
                Ok((name, span))
            }
            other => Err(LalgError::syntax(
                format!("Expected identifier, found {other:?}"),
                span,
            )),
        }
    }

    fn expect_int_lit(&mut self) -> Result<(i32, Span), LalgError> {
        self.skip_comments();
        let span = self.peek_span();
        match self.peek().clone() {
            TokenKind::IntLit(v) => {
                self.advance();
                Ok((v, span))
            }
            other => Err(LalgError::syntax(
                format!("Expected integer literal, found {other:?}"),
                span,
            )),
        }
    }

    fn find_symbol_or_error(&self, name: &str, span: Span) -> Result<&SymbolEntry, LalgError> {
        self.symtab
            .lookup(name)
            .ok_or_else(|| LalgError::undeclared_variable(name, span))
    }

    // ---- grammar ---------------------------------------------------------------

    fn parse_program(&mut self) -> Result<(), LalgError> {
        self.expect(&TokenKind::Program)?;
        self.expect_id()?;
        self.expect(&TokenKind::Semicolon)?;
        self.skip_comments();

        while self.check(&TokenKind::Var) {
            self.parse_var_block()?;
        }
        while self.check(&TokenKind::Procedure) {
            self.parse_proc_block()?;
        }

        self.parse_begin_block_top()?;
        Ok(())
    }

    fn parse_var_block(&mut self) -> Result<(), LalgError> {
        self.expect(&TokenKind::Var)?;
        loop {
            self.skip_comments();
            if !matches!(self.peek(), TokenKind::Id(_)) {
                break;
            }
            self.parse_declaration()?;
        }
        Ok(())
    }

    /// `ID {',' ID} ':' type_spec ';'`
    fn parse_declaration(&mut self) -> Result<(), LalgError> {
        let mut names = Vec::new();
        let (name, span) = self.expect_id()?;
        names.push((name, span));
        while self.check(&TokenKind::Comma) {
            self.advance();
            let (name, span) = self.expect_id()?;
            names.push((name, span));
        }

        // Reject duplicate names within this single declaration group.
        for i in 0..names.len() {
            for j in 0..i {
                if names[i].0 == names[j].0 {
                    return Err(LalgError::semantic(
                        format!("Variable {} is declared twice", names[i].0),
                        names[i].1,
                    ));
                }
            }
        }

        self.expect(&TokenKind::Colon)?;
        let spec = self.parse_type_spec()?;
        self.expect(&TokenKind::Semicolon)?;

        for (name, span) in names {
            if self.symtab.contains(&name) {
                return Err(LalgError::semantic(
                    format!("Variable {name} is already declared"),
                    span,
                ));
            }
            match &spec {
                TypeSpec::Scalar(data_type) => {
                    let dp = self.symtab.allocate_dp(1);
                    self.symtab.insert(SymbolEntry {
                        name,
                        kind: SymbolKind::Variable,
                        data_type: *data_type,
                        data_pointer: dp,
                        extras: Extras::None,
                    });
                }
                TypeSpec::Array {
                    low,
                    high,
                    element_type,
                } => {
                    let slots = slots_for_array(*low, *high, *element_type);
                    let dp = self.symtab.allocate_dp(slots);
                    self.symtab.insert(SymbolEntry {
                        name,
                        kind: SymbolKind::Array,
                        data_type: DataType::Array,
                        data_pointer: dp,
                        extras: Extras::Array {
                            low: *low,
                            high: *high,
                            element_type: *element_type,
                        },
                    });
                }
            }
        }

        Ok(())
    }

    fn parse_type_spec(&mut self) -> Result<TypeSpec, LalgError> {
        self.skip_comments();
        match self.peek().clone() {
            TokenKind::Integer => {
                self.advance();
                Ok(TypeSpec::Scalar(DataType::Int))
            }
            TokenKind::Real => {
                self.advance();
                Ok(TypeSpec::Scalar(DataType::Real))
            }
            TokenKind::Char => {
                self.advance();
                Ok(TypeSpec::Scalar(DataType::Char))
            }
            TokenKind::Boolean => {
                self.advance();
                Ok(TypeSpec::Scalar(DataType::Bool))
            }
            TokenKind::Array => {
                self.advance();
                self.expect(&TokenKind::LBracket)?;
                let span = self.peek_span();
                let (low, high) = match self.peek().clone() {
                    TokenKind::RangeLit(l, h) => {
                        self.advance();
                        (l, h)
                    }
                    other => {
                        return Err(LalgError::syntax(
                            format!("Expected range literal in array bound, found {other:?}"),
                            span,
                        ))
                    }
                };
                self.expect(&TokenKind::RBracket)?;
                self.expect(&TokenKind::Of)?;
                let element_type = match self.peek().clone() {
                    TokenKind::Integer => {
                        self.advance();
                        DataType::Int
                    }
                    TokenKind::Char => {
                        self.advance();
                        DataType::Char
                    }
                    other => {
                        return Err(LalgError::semantic(
                            format!("Array element type must be integer or char, found {other:?}"),
                            span,
                        ))
                    }
                };
                Ok(TypeSpec::Array {
                    low,
                    high,
                    element_type,
                })
            }
            other => Err(LalgError::syntax(
                format!("Expected a type name, found {other:?}"),
                self.peek_span(),
            )),
        }
    }

    /// `PROCEDURE id '(' declaration ')' ';' begin_block_inner`
    fn parse_proc_block(&mut self) -> Result<(), LalgError> {
        self.expect(&TokenKind::Procedure)?;
        let (name, name_span) = self.expect_id()?;
        if self.symtab.contains(&name) {
            return Err(LalgError::semantic(
                format!("Procedure {name} is already declared"),
                name_span,
            ));
        }

        // Skip straight past the body; the call-site `CALL` opcode jumps in.
        self.bytecode.emit_op(Opcode::Jmp)?;
        let skip_hole = self.bytecode.emit_hole()?;

        self.expect(&TokenKind::LParen)?;
        let entry_ip = self.bytecode.ip();
        self.parse_declaration()?;
        self.expect(&TokenKind::RParen)?;
        self.expect(&TokenKind::Semicolon)?;

        self.parse_begin_block_inner()?;

        let after_body = self.bytecode.ip();
        self.bytecode.patch(skip_hole, after_body);

        self.symtab.insert(SymbolEntry {
            name,
            kind: SymbolKind::Procedure,
            data_type: DataType::Int,
            data_pointer: 0,
            extras: Extras::Procedure { entry_ip },
        });

        Ok(())
    }

    fn parse_begin_block_top(&mut self) -> Result<(), LalgError> {
        self.expect(&TokenKind::Begin)?;
        self.parse_statements()?;
        self.expect(&TokenKind::End)?;
        self.bytecode.emit_op(Opcode::Halt)?;
        self.expect(&TokenKind::Dot)?;
        self.expect(&TokenKind::Eof)?;
        Ok(())
    }

    fn parse_begin_block_inner(&mut self) -> Result<(), LalgError> {
        self.expect(&TokenKind::Begin)?;
        self.parse_statements()?;
        self.expect(&TokenKind::End)?;
        self.bytecode.emit_op(Opcode::Return)?;
        self.expect(&TokenKind::Semicolon)?;
        Ok(())
    }

    fn parse_statements(&mut self) -> Result<(), LalgError> {
        loop {
            self.skip_comments();
            match self.peek() {
                TokenKind::End => break,
                TokenKind::Semicolon => {
                    self.advance();
                }
                TokenKind::Until => break,
                _ => self.parse_statement()?,
            }
        }
        Ok(())
    }

    fn parse_statement(&mut self) -> Result<(), LalgError> {
        self.skip_comments();
        match self.peek().clone() {
            TokenKind::Id(_) => self.parse_assignment_or_call(),
            TokenKind::Read => self.parse_read_stmt(),
            TokenKind::Write | TokenKind::Writeln => self.parse_write_stmt(),
            TokenKind::If => self.parse_if_stmt(),
            TokenKind::While => self.parse_while_stmt(),
            TokenKind::Repeat => self.parse_repeat_stmt(),
            TokenKind::For => self.parse_for_stmt(),
            TokenKind::Case => self.parse_case_stmt(),
            TokenKind::Begin => {
                self.advance();
                self.parse_statements()?;
                self.expect(&TokenKind::End)?;
                Ok(())
            }
            other => Err(LalgError::syntax(
                format!("Unexpected token in statement position: {other:?}"),
                self.peek_span(),
            )),
        }
    }

    /// `ID ( '[' expr ']' )? ':=' expr`, or a bare procedure-name call
    /// (an additive extension so `CALL`/`RETURN` are actually exercised).
    fn parse_assignment_or_call(&mut self) -> Result<(), LalgError> {
        let (name, span) = self.expect_id()?;
        let entry = self.find_symbol_or_error(&name, span)?.clone();

        if entry.kind == SymbolKind::Procedure {
            let Extras::Procedure { entry_ip, .. } = entry.extras else {
                unreachable!()
            };
            self.bytecode.emit_op(Opcode::Call)?;
            self.bytecode.emit_u32(entry_ip as u32)?;
            return Ok(());
        }

        if self.check(&TokenKind::LBracket) {
            self.parse_array_assignment(&entry, span)
        } else {
            self.parse_scalar_assignment(&entry, span)
        }
    }

    fn parse_scalar_assignment(&mut self, entry: &SymbolEntry, span: Span) -> Result<(), LalgError> {
        self.expect(&TokenKind::Assign)?;
        let rhs_span = self.peek_span();
        let rhs_type = self.parse_expr()?;

        match (entry.data_type, rhs_type) {
            (DataType::Char, DataType::Char) => {
                self.bytecode.emit_op(Opcode::PopChar)?;
                self.bytecode.emit_u32(entry.data_pointer as u32)?;
            }
            (DataType::Real, DataType::RealLitT) => {
                self.bytecode.emit_op(Opcode::PopRealLit)?;
                self.bytecode.emit_u32(entry.data_pointer as u32)?;
            }
            (lhs, rhs) if lhs == rhs || (is_real_like(lhs) && is_real_like(rhs)) => {
                self.bytecode.emit_op(Opcode::Pop)?;
                self.bytecode.emit_u32(entry.data_pointer as u32)?;
            }
            _ => {
                return Err(LalgError::semantic(
                    format!(
                        "Type mismatch: cannot assign {:?} to {:?} variable {}",
                        rhs_type, entry.data_type, entry.name
                    ),
                    rhs_span,
                ))
            }
        }
        let _ = span;
        Ok(())
    }

    fn parse_array_assignment(&mut self, entry: &SymbolEntry, span: Span) -> Result<(), LalgError> {
        let Extras::Array {
            low, element_type, ..
        } = entry.extras
        else {
            return Err(LalgError::semantic(
                format!("{} is not an array", entry.name),
                span,
            ));
        };
        self.advance(); // '['
        self.parse_expr()?;
        self.expect(&TokenKind::RBracket)?;
        self.emit_array_address(entry.data_pointer, low, element_type)?;

        self.expect(&TokenKind::Assign)?;
        self.parse_expr()?;
        self.bytecode.emit_op(Opcode::Dump)?;
        Ok(())
    }

    /// `READ '(' ID {',' ID} ')'`
    fn parse_read_stmt(&mut self) -> Result<(), LalgError> {
        self.expect(&TokenKind::Read)?;
        self.expect(&TokenKind::LParen)?;
        loop {
            let (name, span) = self.expect_id()?;
            let entry = self.find_symbol_or_error(&name, span)?.clone();
            match entry.data_type {
                DataType::Int => self.bytecode.emit_op(Opcode::ReadInt)?,
                DataType::Real => self.bytecode.emit_op(Opcode::ReadReal)?,
                other => {
                    return Err(LalgError::semantic(
                        format!("Cannot read into a {other:?} variable"),
                        span,
                    ))
                }
            };
            self.bytecode.emit_u32(entry.data_pointer as u32)?;
            if self.check(&TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(())
    }

    /// `(WRITE|WRITELN) '(' expr {',' expr} ')'`
    fn parse_write_stmt(&mut self) -> Result<(), LalgError> {
        let is_writeln = matches!(self.peek(), TokenKind::Writeln);
        self.advance();
        self.expect(&TokenKind::LParen)?;
        loop {
            self.parse_write_arg()?;
            if self.check(&TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        if is_writeln {
            self.bytecode.emit_op(Opcode::NewLine)?;
        }
        Ok(())
    }

    /// Writes one expression. Bare-identifier and literal cases use the
    /// dedicated `PRINT_*`/`PRINT_ILIT` opcodes (matching the original);
    /// anything more complex is evaluated onto the stack first and printed
    /// through `RET_AND_PRINT` from a synthetic data slot.
    fn parse_write_arg(&mut self) -> Result<(), LalgError> {
        self.skip_comments();
        if let TokenKind::Id(name) = self.peek().clone() {
            let next = self.next_significant_kind(self.pos + 1);
            let is_whole_arg = matches!(next, TokenKind::Comma | TokenKind::RParen);
            if is_whole_arg {
                let span = self.peek_span();
                let entry = self.find_symbol_or_error(&name, span)?.clone();
                if entry.kind == SymbolKind::Variable {
                    self.advance();
                    let op = match entry.data_type {
                        DataType::Int => Opcode::PrintI,
                        DataType::Real => Opcode::PrintR,
                        DataType::Char => Opcode::PrintC,
                        DataType::Bool => Opcode::PrintB,
                        other => {
                            return Err(LalgError::semantic(
                                format!("Cannot print a {other:?} value"),
                                span,
                            ))
                        }
                    };
                    self.bytecode.emit_op(op)?;
                    self.bytecode.emit_u32(entry.data_pointer as u32)?;
                    return Ok(());
                }
            }
        }
        if let TokenKind::IntLit(v) = self.peek().clone() {
            self.advance();
            self.bytecode.emit_op(Opcode::PrintILit)?;
            self.bytecode.emit_i32(v)?;
            return Ok(());
        }
        if let TokenKind::StringLit(s) = self.peek().clone() {
            self.advance();
            self.bytecode.emit_op(Opcode::Pushi)?;
            self.bytecode.emit_i32(s.len() as i32)?;
            self.bytecode.emit_op(Opcode::PrintStrLit)?;
            self.bytecode.emit_raw(s.as_bytes())?;
            return Ok(());
        }

        self.parse_expr()?;
        let dp = self.symtab.allocate_synthetic_dp();
        self.bytecode.emit_op(Opcode::Pop)?;
        self.bytecode.emit_u32(dp as u32)?;
        // RET_AND_PRINT pops an *address* off the stack and prints
        // `data[address]` (see interpreter), so push the dp itself as a
        // literal integer rather than the value stored there.
        self.bytecode.emit_op(Opcode::Pushi)?;
        self.bytecode.emit_i32(dp as i32)?;
        self.bytecode.emit_op(Opcode::RetAndPrint)?;
        Ok(())
    }

    /// `IF condition THEN (BEGIN statements END | statement) [ELSE statement]`
    fn parse_if_stmt(&mut self) -> Result<(), LalgError> {
        self.expect(&TokenKind::If)?;
        self.parse_condition()?;
        self.expect(&TokenKind::Then)?;
        self.bytecode.emit_op(Opcode::JFalse)?;
        let else_hole = self.bytecode.emit_hole()?;

        self.parse_then_branch()?;

        if self.check(&TokenKind::Else) {
            self.advance();
            self.bytecode.emit_op(Opcode::Jmp)?;
            let end_hole = self.bytecode.emit_hole()?;
            self.bytecode.patch(else_hole, self.bytecode.ip());
            self.parse_statement()?;
            self.bytecode.patch(end_hole, self.bytecode.ip());
        } else {
            self.bytecode.patch(else_hole, self.bytecode.ip());
        }
        Ok(())
    }

    fn parse_then_branch(&mut self) -> Result<(), LalgError> {
        if self.check(&TokenKind::Begin) {
            self.advance();
            self.parse_statements()?;
            self.expect(&TokenKind::End)?;
            Ok(())
        } else {
            self.parse_statement()
        }
    }

    /// `WHILE condition DO BEGIN statements END ';'`
    fn parse_while_stmt(&mut self) -> Result<(), LalgError> {
        self.expect(&TokenKind::While)?;
        let target = self.bytecode.ip();
        self.parse_condition()?;
        self.expect(&TokenKind::Do)?;
        self.bytecode.emit_op(Opcode::JFalse)?;
        let exit_hole = self.bytecode.emit_hole()?;

        self.expect(&TokenKind::Begin)?;
        self.parse_statements()?;
        self.expect(&TokenKind::End)?;

        self.bytecode.emit_op(Opcode::Jmp)?;
        self.bytecode.emit_u32(target as u32)?;
        self.bytecode.patch(exit_hole, self.bytecode.ip());
        self.expect(&TokenKind::Semicolon)?;
        Ok(())
    }

    /// `REPEAT statements UNTIL condition`
    fn parse_repeat_stmt(&mut self) -> Result<(), LalgError> {
        self.expect(&TokenKind::Repeat)?;
        let target = self.bytecode.ip();
        self.parse_statements()?;
        self.expect(&TokenKind::Until)?;
        self.parse_condition()?;
        self.bytecode.emit_op(Opcode::JFalse)?;
        self.bytecode.emit_u32(target as u32)?;
        Ok(())
    }

    /// `FOR ID ':=' expr TO INT_LIT DO BEGIN statements END ';'`
    fn parse_for_stmt(&mut self) -> Result<(), LalgError> {
        self.expect(&TokenKind::For)?;
        let (name, span) = self.expect_id()?;
        let entry = self.find_symbol_or_error(&name, span)?.clone();
        if entry.data_type != DataType::Int {
            return Err(LalgError::semantic(
                format!("FOR-loop variable {name} must be integer"),
                span,
            ));
        }

        self.expect(&TokenKind::Assign)?;
        let init_type = self.parse_expr()?;
        if init_type != DataType::Int {
            return Err(LalgError::semantic(
                "FOR-loop initial value must be integer",
                span,
            ));
        }
        self.bytecode.emit_op(Opcode::Pop)?;
        self.bytecode.emit_u32(entry.data_pointer as u32)?;

        self.expect(&TokenKind::To)?;
        let (bound, _) = self.expect_int_lit()?;

        let target = self.bytecode.ip();
        self.bytecode.emit_op(Opcode::Push)?;
        self.bytecode.emit_u32(entry.data_pointer as u32)?;
        self.bytecode.emit_op(Opcode::Pushi)?;
        self.bytecode.emit_i32(bound)?;
        // `i <= bound` under this crate's renamed opcode scheme is `Gte`
        // (`Gte => is_le`, matching the relop path's `Lte`-lexical -> `Gte`
        // mapping), not `Lte` (`Lte => is_ge`, the opposite sense).
        self.bytecode.emit_op(Opcode::Gte)?;
        self.bytecode.emit_op(Opcode::JFalse)?;
        let exit_hole = self.bytecode.emit_hole()?;

        self.expect(&TokenKind::Do)?;
        self.expect(&TokenKind::Begin)?;
        self.parse_statements()?;
        self.expect(&TokenKind::End)?;

        self.bytecode.emit_op(Opcode::Push)?;
        self.bytecode.emit_u32(entry.data_pointer as u32)?;
        self.bytecode.emit_op(Opcode::Pushi)?;
        self.bytecode.emit_i32(1)?;
        self.bytecode.emit_op(Opcode::Add)?;
        self.bytecode.emit_op(Opcode::Pop)?;
        self.bytecode.emit_u32(entry.data_pointer as u32)?;
        self.bytecode.emit_op(Opcode::Jmp)?;
        self.bytecode.emit_u32(target as u32)?;
        self.bytecode.patch(exit_hole, self.bytecode.ip());
        self.expect(&TokenKind::Semicolon)?;
        Ok(())
    }

    /// `CASE '(' expr ')' OF { const ':' statement } END ';'`
    ///
    /// The selector is cached into a synthetic data slot once (REDESIGN
    /// FLAG: the original requires a bare identifier so it can re-read the
    /// symbol table; caching generalizes to any expression while keeping
    /// the stack balanced at every arm).
    fn parse_case_stmt(&mut self) -> Result<(), LalgError> {
        self.expect(&TokenKind::Case)?;
        self.expect(&TokenKind::LParen)?;
        let selector_type = self.parse_expr()?;
        if selector_type == DataType::Real || selector_type == DataType::RealLitT {
            return Err(LalgError::semantic(
                "CASE selector may not be real-typed",
                self.peek_span(),
            ));
        }
        self.expect(&TokenKind::RParen)?;
        self.expect(&TokenKind::Of)?;

        let selector_dp = self.symtab.allocate_synthetic_dp();
        self.bytecode.emit_op(Opcode::Pop)?;
        self.bytecode.emit_u32(selector_dp as u32)?;

        let mut end_holes = Vec::new();
        loop {
            self.skip_comments();
            if self.check(&TokenKind::End) {
                break;
            }
            let (const_val, _const_span) = self.expect_int_lit()?;
            self.expect(&TokenKind::Colon)?;

            self.bytecode.emit_op(Opcode::Push)?;
            self.bytecode.emit_u32(selector_dp as u32)?;
            self.bytecode.emit_op(Opcode::Pushi)?;
            self.bytecode.emit_i32(const_val)?;
            self.bytecode.emit_op(Opcode::Eql)?;
            self.bytecode.emit_op(Opcode::JFalse)?;
            let arm_hole = self.bytecode.emit_hole()?;

            self.parse_statement()?;

            self.bytecode.emit_op(Opcode::Jmp)?;
            end_holes.push(self.bytecode.emit_hole()?);
            self.bytecode.patch(arm_hole, self.bytecode.ip());
        }
        self.expect(&TokenKind::End)?;
        self.expect(&TokenKind::Semicolon)?;

        let end_ip = self.bytecode.ip();
        for hole in end_holes {
            self.bytecode.patch(hole, end_ip);
        }
        Ok(())
    }

    fn parse_condition(&mut self) -> Result<(), LalgError> {
        let span = self.peek_span();
        let t1 = self.parse_expr()?;
        let relop = self.expect_relop()?;
        let t2 = self.parse_expr()?;
        self.emit_relop(relop, t1, t2, span)
    }

    fn expect_relop(&mut self) -> Result<RelOp, LalgError> {
        self.skip_comments();
        let span = self.peek_span();
        let op = match self.peek() {
            TokenKind::Lt => RelOp::Lt,
            TokenKind::Lte => RelOp::Lte,
            TokenKind::Gt => RelOp::Gt,
            TokenKind::Gte => RelOp::Gte,
            TokenKind::Eq => RelOp::Eq,
            TokenKind::Neq => RelOp::Neq,
            other => {
                return Err(LalgError::syntax(
                    format!("Expected a relational operator, found {other:?}"),
                    span,
                ))
            }
        };
        self.advance();
        Ok(op)
    }

    fn emit_relop(
        &mut self,
        op: RelOp,
        t1: DataType,
        t2: DataType,
        span: Span,
    ) -> Result<(), LalgError> {
        let real_t1 = is_real_like(t1);
        let real_t2 = is_real_like(t2);

        if t1 == t2 || (real_t1 && real_t2) || (t1 == DataType::Char && t2 == DataType::Char) {
            // direct
        } else if t1 == DataType::Int && real_t2 {
            self.bytecode.emit_op(Opcode::Xchg)?;
            self.bytecode.emit_op(Opcode::Cvr)?;
            self.bytecode.emit_op(Opcode::Xchg)?;
        } else if real_t1 && t2 == DataType::Int {
            self.bytecode.emit_op(Opcode::Cvr)?;
        } else {
            return Err(LalgError::semantic(
                format!("Cannot compare {t1:?} with {t2:?}"),
                span,
            ));
        }

        let opcode = match op {
            RelOp::Lt => Opcode::Gtr,
            RelOp::Lte => Opcode::Gte,
            RelOp::Gt => Opcode::Les,
            RelOp::Gte => Opcode::Lte,
            RelOp::Eq => Opcode::Eql,
            RelOp::Neq => Opcode::Neq,
        };
        self.bytecode.emit_op(opcode)?;
        Ok(())
    }

    /// `E := T {('+'|'-') T}`
    fn parse_expr(&mut self) -> Result<DataType, LalgError> {
        let span = self.peek_span();
        let mut t1 = self.parse_term()?;
        loop {
            self.skip_comments();
            let op = match self.peek() {
                TokenKind::Plus => ArithOp::Add,
                TokenKind::Minus => ArithOp::Sub,
                _ => break,
            };
            self.advance();
            let t2 = self.parse_term()?;
            t1 = self.emit_binary_arith(op, t1, t2, span)?;
        }
        Ok(t1)
    }

    /// `T := F {('*'|'/'|DIV) F}`
    fn parse_term(&mut self) -> Result<DataType, LalgError> {
        let span = self.peek_span();
        let mut t1 = self.parse_factor()?;
        loop {
            self.skip_comments();
            let op = match self.peek() {
                TokenKind::Star => ArithOp::Mul,
                TokenKind::Slash => ArithOp::Div,
                TokenKind::Div => ArithOp::IntDiv,
                _ => break,
            };
            self.advance();
            let t2 = self.parse_factor()?;
            t1 = self.emit_binary_arith(op, t1, t2, span)?;
        }
        Ok(t1)
    }

    /// `F := ID ('[' expr ']')? | '(' E ')' | NOT F | INT_LIT | REAL_LIT |
    ///       CHAR_LIT | TRUE | FALSE`
    fn parse_factor(&mut self) -> Result<DataType, LalgError> {
        self.skip_comments();
        let span = self.peek_span();
        match self.peek().clone() {
            TokenKind::Id(name) => {
                self.advance();
                let entry = self.find_symbol_or_error(&name, span)?.clone();
                if self.check(&TokenKind::LBracket) {
                    let Extras::Array {
                        low, element_type, ..
                    } = entry.extras
                    else {
                        return Err(LalgError::semantic(
                            format!("{name} is not an array"),
                            span,
                        ));
                    };
                    self.advance();
                    self.parse_expr()?;
                    self.expect(&TokenKind::RBracket)?;
                    self.emit_array_address(entry.data_pointer, low, element_type)?;
                    self.bytecode.emit_op(Opcode::Retrieve)?;
                    Ok(element_type)
                } else {
                    match entry.kind {
                        SymbolKind::Variable => {
                            self.bytecode.emit_op(Opcode::Push)?;
                            self.bytecode.emit_u32(entry.data_pointer as u32)?;
                            Ok(entry.data_type)
                        }
                        SymbolKind::Array => Err(LalgError::semantic(
                            format!("Array {name} used without an index"),
                            span,
                        )),
                        SymbolKind::Procedure => Err(LalgError::semantic(
                            format!("Procedure {name} cannot be used as an expression operand"),
                            span,
                        )),
                    }
                }
            }
            TokenKind::LParen => {
                self.advance();
                let t = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(t)
            }
            TokenKind::Not => {
                self.advance();
                let t = self.parse_factor()?;
                if t != DataType::Bool {
                    return Err(LalgError::semantic("NOT requires a boolean operand", span));
                }
                self.bytecode.emit_op(Opcode::Not)?;
                Ok(DataType::Bool)
            }
            TokenKind::IntLit(v) => {
                self.advance();
                self.bytecode.emit_op(Opcode::Pushi)?;
                self.bytecode.emit_i32(v)?;
                Ok(DataType::Int)
            }
            TokenKind::RealLit(v) => {
                self.advance();
                self.bytecode.emit_op(Opcode::PushRealLit)?;
                self.bytecode.emit_f32_bits(v)?;
                Ok(DataType::RealLitT)
            }
            TokenKind::CharLit(c) => {
                self.advance();
                self.bytecode.emit_op(Opcode::PushChar)?;
                self.bytecode.emit_i32(c as i32)?;
                Ok(DataType::Char)
            }
            TokenKind::True => {
                self.advance();
                self.bytecode.emit_op(Opcode::Pushi)?;
                self.bytecode.emit_i32(1)?;
                Ok(DataType::Bool)
            }
            TokenKind::False => {
                self.advance();
                self.bytecode.emit_op(Opcode::Pushi)?;
                self.bytecode.emit_i32(0)?;
                Ok(DataType::Bool)
            }
            other => Err(LalgError::syntax(
                format!("Unexpected token in expression: {other:?}"),
                span,
            )),
        }
    }

    fn emit_binary_arith(
        &mut self,
        op: ArithOp,
        t1: DataType,
        t2: DataType,
        span: Span,
    ) -> Result<DataType, LalgError> {
        match op {
            ArithOp::IntDiv => {
                if t1 == DataType::Int && t2 == DataType::Int {
                    self.bytecode.emit_op(Opcode::Div)?;
                    Ok(DataType::Int)
                } else {
                    Err(LalgError::semantic("DIV requires two integer operands", span))
                }
            }
            ArithOp::Div => {
                if t1 == DataType::Int && t2 == DataType::Int {
                    self.bytecode.emit_op(Opcode::Divide)?;
                    Ok(DataType::Real)
                } else {
                    self.emit_float_family(Opcode::FDivide, t1, t2, span)
                }
            }
            ArithOp::Add | ArithOp::Sub | ArithOp::Mul => {
                if t1 == DataType::Int && t2 == DataType::Int {
                    let op = match op {
                        ArithOp::Add => Opcode::Add,
                        ArithOp::Sub => Opcode::Sub,
                        ArithOp::Mul => Opcode::Multiply,
                        ArithOp::Div | ArithOp::IntDiv => unreachable!(),
                    };
                    self.bytecode.emit_op(op)?;
                    Ok(DataType::Int)
                } else {
                    let fop = match op {
                        ArithOp::Add => Opcode::FAdd,
                        ArithOp::Sub => Opcode::FSub,
                        ArithOp::Mul => Opcode::FMultiply,
                        ArithOp::Div | ArithOp::IntDiv => unreachable!(),
                    };
                    self.emit_float_family(fop, t1, t2, span)
                }
            }
        }
    }

    fn emit_float_family(
        &mut self,
        fop: Opcode,
        t1: DataType,
        t2: DataType,
        span: Span,
    ) -> Result<DataType, LalgError> {
        let real_t1 = is_real_like(t1);
        let real_t2 = is_real_like(t2);

        if real_t1 && real_t2 {
            self.bytecode.emit_op(fop)?;
        } else if t1 == DataType::Int && real_t2 {
            self.bytecode.emit_op(Opcode::Xchg)?;
            self.bytecode.emit_op(Opcode::Cvr)?;
            self.bytecode.emit_op(Opcode::Xchg)?;
            self.bytecode.emit_op(fop)?;
        } else if real_t1 && t2 == DataType::Int {
            self.bytecode.emit_op(Opcode::Cvr)?;
            self.bytecode.emit_op(fop)?;
        } else {
            return Err(LalgError::semantic(
                format!("Unsupported operand types {t1:?} and {t2:?}"),
                span,
            ));
        }
        Ok(DataType::Real)
    }

    /// `PUSH idx; PUSHI low; XCHG; SUB; [PUSHI 4; MULTIPLY;] PUSHI dp; ADD`
    fn emit_array_address(
        &mut self,
        base_dp: usize,
        low: i32,
        element_type: DataType,
    ) -> Result<(), LalgError> {
        // The index expression is already on the stack at this point;
        // callers parse it immediately before calling this helper.
        self.bytecode.emit_op(Opcode::Pushi)?;
        self.bytecode.emit_i32(low)?;
        self.bytecode.emit_op(Opcode::Xchg)?;
        self.bytecode.emit_op(Opcode::Sub)?;
        if element_type == DataType::Int {
            self.bytecode.emit_op(Opcode::Pushi)?;
            self.bytecode.emit_i32(4)?;
            self.bytecode.emit_op(Opcode::Multiply)?;
        }
        self.bytecode.emit_op(Opcode::Pushi)?;
        self.bytecode.emit_i32(base_dp as i32)?;
        self.bytecode.emit_op(Opcode::Add)?;
        Ok(())
    }
}

fn is_real_like(t: DataType) -> bool {
    matches!(t, DataType::Real | DataType::RealLitT)
}

enum TypeSpec {
    Scalar(DataType),
    Array {
        low: i32,
        high: i32,
        element_type: DataType,
    },
}

#[derive(Debug, Clone, Copy)]
enum RelOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Neq,
}

#[derive(Debug, Clone, Copy)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    IntDiv,
}
