//! Recursive-descent parser producing the AST.
//!
//! Precedence climbing for expressions, one token of lookahead, and
//! mandatory semicolons (no automatic semicolon insertion).

use core_types::{CompileError, Value};

use crate::ast::*;
use crate::lexer::{Keyword, Lexer, Punctuator, SpannedToken, TemplatePart, Token};

/// Parser for Mudscript source code
pub struct Parser {
    lexer: Lexer,
    current: SpannedToken,
}

impl Parser {
    /// Creates a parser over `source`.
    pub fn new(source: &str) -> Result<Parser, CompileError> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token()?;
        Ok(Parser { lexer, current })
    }

    /// Parses a complete program.
    pub fn parse_program(&mut self) -> Result<Program, CompileError> {
        let mut body = Vec::new();
        while !self.check_eof() {
            body.push(self.parse_statement()?);
        }
        Ok(Program { body })
    }

    /// Parses a single expression followed by end of input (used for
    /// template interpolations).
    pub fn parse_expression_only(&mut self) -> Result<Expression, CompileError> {
        let expr = self.parse_expression()?;
        if !self.check_eof() {
            return Err(self.error_here("unexpected trailing tokens in expression"));
        }
        Ok(expr)
    }

    // ---- token plumbing ----

    fn advance(&mut self) -> Result<SpannedToken, CompileError> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn check_eof(&self) -> bool {
        matches!(self.current.token, Token::Eof)
    }

    fn check_punct(&self, p: Punctuator) -> bool {
        matches!(&self.current.token, Token::Punctuator(q) if *q == p)
    }

    fn check_keyword(&self, k: Keyword) -> bool {
        matches!(&self.current.token, Token::Keyword(q) if *q == k)
    }

    fn eat_punct(&mut self, p: Punctuator) -> Result<bool, CompileError> {
        if self.check_punct(p) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn eat_keyword(&mut self, k: Keyword) -> Result<bool, CompileError> {
        if self.check_keyword(k) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect_punct(&mut self, p: Punctuator, what: &str) -> Result<(), CompileError> {
        if self.eat_punct(p)? {
            Ok(())
        } else {
            Err(self.error_here(format!("expected {}", what)))
        }
    }

    fn expect_semicolon(&mut self) -> Result<(), CompileError> {
        self.expect_punct(Punctuator::Semicolon, "';'")
    }

    fn expect_identifier(&mut self, what: &str) -> Result<String, CompileError> {
        match &self.current.token {
            Token::Identifier(name) => {
                let name = name.clone();
                self.advance()?;
                Ok(name)
            }
            _ => Err(self.error_here(format!("expected {}", what))),
        }
    }

    fn error_here(&self, message: impl Into<String>) -> CompileError {
        CompileError::new(self.current.line, self.current.column, message)
    }

    fn line(&self) -> u32 {
        self.current.line
    }

    // ---- statements ----

    fn parse_statement(&mut self) -> Result<Statement, CompileError> {
        let line = self.line();
        match &self.current.token {
            Token::Punctuator(Punctuator::Semicolon) => {
                self.advance()?;
                Ok(Statement::Empty)
            }
            Token::Punctuator(Punctuator::LBrace) => {
                let body = self.parse_block()?;
                Ok(Statement::Block { body, line })
            }
            Token::Keyword(Keyword::Var) => self.parse_var_declaration(DeclKind::Var),
            Token::Keyword(Keyword::Let) => self.parse_var_declaration(DeclKind::Let),
            Token::Keyword(Keyword::Const) => self.parse_var_declaration(DeclKind::Const),
            Token::Keyword(Keyword::Function) => {
                self.advance()?;
                let func = self.parse_function_literal(line, true)?;
                Ok(Statement::FunctionDeclaration { func })
            }
            Token::Keyword(Keyword::Class) => {
                self.advance()?;
                let class = self.parse_class_literal(line, true)?;
                Ok(Statement::ClassDeclaration { class })
            }
            Token::Keyword(Keyword::If) => self.parse_if(),
            Token::Keyword(Keyword::While) => self.parse_while(),
            Token::Keyword(Keyword::Do) => self.parse_do_while(),
            Token::Keyword(Keyword::For) => self.parse_for(),
            Token::Keyword(Keyword::Break) => {
                self.advance()?;
                self.expect_semicolon()?;
                Ok(Statement::Break { line })
            }
            Token::Keyword(Keyword::Continue) => {
                self.advance()?;
                self.expect_semicolon()?;
                Ok(Statement::Continue { line })
            }
            Token::Keyword(Keyword::Return) => {
                self.advance()?;
                let argument = if self.check_punct(Punctuator::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.expect_semicolon()?;
                Ok(Statement::Return { argument, line })
            }
            Token::Keyword(Keyword::Switch) => self.parse_switch(),
            Token::Keyword(Keyword::Try) => self.parse_try(),
            Token::Keyword(Keyword::Throw) => {
                self.advance()?;
                let argument = self.parse_expression()?;
                self.expect_semicolon()?;
                Ok(Statement::Throw { argument, line })
            }
            _ => {
                let expression = self.parse_expression()?;
                self.expect_semicolon()?;
                Ok(Statement::Expression { expression, line })
            }
        }
    }

    fn parse_block(&mut self) -> Result<Vec<Statement>, CompileError> {
        self.expect_punct(Punctuator::LBrace, "'{'")?;
        let mut body = Vec::new();
        while !self.check_punct(Punctuator::RBrace) {
            if self.check_eof() {
                return Err(self.error_here("unexpected end of input in block"));
            }
            body.push(self.parse_statement()?);
        }
        self.advance()?;
        Ok(body)
    }

    fn parse_var_declaration(&mut self, kind: DeclKind) -> Result<Statement, CompileError> {
        let line = self.line();
        self.advance()?; // var / let / const
        let declarations = self.parse_declarator_list(kind)?;
        self.expect_semicolon()?;
        Ok(Statement::VarDeclaration {
            kind,
            declarations,
            line,
        })
    }

    fn parse_declarator_list(
        &mut self,
        kind: DeclKind,
    ) -> Result<Vec<(String, Option<Expression>)>, CompileError> {
        let mut declarations = Vec::new();
        loop {
            let name = self.expect_identifier("variable name")?;
            let init = if self.eat_punct(Punctuator::Assign)? {
                Some(self.parse_assignment()?)
            } else {
                if kind == DeclKind::Const {
                    return Err(self.error_here("const declaration requires an initializer"));
                }
                None
            };
            declarations.push((name, init));
            if !self.eat_punct(Punctuator::Comma)? {
                break;
            }
        }
        Ok(declarations)
    }

    fn parse_function_literal(
        &mut self,
        line: u32,
        named: bool,
    ) -> Result<FunctionLiteral, CompileError> {
        let is_generator = self.eat_punct(Punctuator::Star)?;
        let name = if named {
            self.expect_identifier("function name")?
        } else if let Token::Identifier(name) = &self.current.token {
            let name = name.clone();
            self.advance()?;
            name
        } else {
            String::new()
        };
        let params = self.parse_parameter_list()?;
        let body = self.parse_block()?;
        Ok(FunctionLiteral {
            name,
            params,
            body,
            is_generator,
            line,
        })
    }

    fn parse_parameter_list(&mut self) -> Result<Vec<String>, CompileError> {
        self.expect_punct(Punctuator::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.check_punct(Punctuator::RParen) {
            loop {
                params.push(self.expect_identifier("parameter name")?);
                if !self.eat_punct(Punctuator::Comma)? {
                    break;
                }
            }
        }
        self.expect_punct(Punctuator::RParen, "')'")?;
        Ok(params)
    }

    fn parse_class_literal(
        &mut self,
        line: u32,
        named: bool,
    ) -> Result<ClassLiteral, CompileError> {
        let name = if named {
            self.expect_identifier("class name")?
        } else if let Token::Identifier(name) = &self.current.token {
            let name = name.clone();
            self.advance()?;
            name
        } else {
            String::new()
        };
        let super_class = if self.eat_keyword(Keyword::Extends)? {
            Some(Box::new(self.parse_call_member()?))
        } else {
            None
        };
        self.expect_punct(Punctuator::LBrace, "'{'")?;

        let mut constructor = None;
        let mut members = Vec::new();
        while !self.check_punct(Punctuator::RBrace) {
            if self.check_eof() {
                return Err(self.error_here("unexpected end of input in class body"));
            }
            if self.eat_punct(Punctuator::Semicolon)? {
                continue;
            }
            let member_line = self.line();
            let first = self.expect_identifier("member name")?;
            if first == "static" && !self.check_punct(Punctuator::LParen) {
                let name = self.expect_identifier("static method name")?;
                let func = self.parse_member_function(name.clone(), member_line)?;
                members.push(ClassMember::Static { name, func });
            } else if first == "get" && !self.check_punct(Punctuator::LParen) {
                let name = self.expect_identifier("getter name")?;
                let func = self.parse_member_function(name.clone(), member_line)?;
                members.push(ClassMember::Getter { name, func });
            } else if first == "set" && !self.check_punct(Punctuator::LParen) {
                let name = self.expect_identifier("setter name")?;
                let func = self.parse_member_function(name.clone(), member_line)?;
                members.push(ClassMember::Setter { name, func });
            } else if first == "constructor" {
                if constructor.is_some() {
                    return Err(self.error_here("class has more than one constructor"));
                }
                constructor = Some(self.parse_member_function("constructor".to_string(), member_line)?);
            } else {
                let func = self.parse_member_function(first.clone(), member_line)?;
                members.push(ClassMember::Method { name: first, func });
            }
        }
        self.advance()?; // }
        Ok(ClassLiteral {
            name,
            super_class,
            constructor,
            members,
            line,
        })
    }

    fn parse_member_function(
        &mut self,
        name: String,
        line: u32,
    ) -> Result<FunctionLiteral, CompileError> {
        let params = self.parse_parameter_list()?;
        let body = self.parse_block()?;
        Ok(FunctionLiteral {
            name,
            params,
            body,
            is_generator: false,
            line,
        })
    }

    fn parse_if(&mut self) -> Result<Statement, CompileError> {
        let line = self.line();
        self.advance()?; // if
        self.expect_punct(Punctuator::LParen, "'('")?;
        let test = self.parse_expression()?;
        self.expect_punct(Punctuator::RParen, "')'")?;
        let consequent = Box::new(self.parse_statement()?);
        let alternate = if self.eat_keyword(Keyword::Else)? {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Statement::If {
            test,
            consequent,
            alternate,
            line,
        })
    }

    fn parse_while(&mut self) -> Result<Statement, CompileError> {
        let line = self.line();
        self.advance()?; // while
        self.expect_punct(Punctuator::LParen, "'('")?;
        let test = self.parse_expression()?;
        self.expect_punct(Punctuator::RParen, "')'")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Statement::While { test, body, line })
    }

    fn parse_do_while(&mut self) -> Result<Statement, CompileError> {
        let line = self.line();
        self.advance()?; // do
        let body = Box::new(self.parse_statement()?);
        if !self.eat_keyword(Keyword::While)? {
            return Err(self.error_here("expected 'while' after do body"));
        }
        self.expect_punct(Punctuator::LParen, "'('")?;
        let test = self.parse_expression()?;
        self.expect_punct(Punctuator::RParen, "')'")?;
        self.expect_semicolon()?;
        Ok(Statement::DoWhile { body, test, line })
    }

    fn parse_for(&mut self) -> Result<Statement, CompileError> {
        let line = self.line();
        self.advance()?; // for
        self.expect_punct(Punctuator::LParen, "'('")?;

        // Disambiguate classic for, for-in and for-of
        let decl_kind = match &self.current.token {
            Token::Keyword(Keyword::Var) => Some(DeclKind::Var),
            Token::Keyword(Keyword::Let) => Some(DeclKind::Let),
            Token::Keyword(Keyword::Const) => Some(DeclKind::Const),
            _ => None,
        };

        if let Some(kind) = decl_kind {
            self.advance()?;
            let name = self.expect_identifier("variable name")?;
            if self.eat_keyword(Keyword::In)? {
                return self.finish_for_in_of(Some(kind), name, true, line);
            }
            if self.eat_keyword(Keyword::Of)? {
                return self.finish_for_in_of(Some(kind), name, false, line);
            }
            // Classic for with a declaration initializer
            let mut declarations = Vec::new();
            let init = if self.eat_punct(Punctuator::Assign)? {
                Some(self.parse_assignment()?)
            } else if kind == DeclKind::Const {
                return Err(self.error_here("const declaration requires an initializer"));
            } else {
                None
            };
            declarations.push((name, init));
            while self.eat_punct(Punctuator::Comma)? {
                let name = self.expect_identifier("variable name")?;
                let init = if self.eat_punct(Punctuator::Assign)? {
                    Some(self.parse_assignment()?)
                } else {
                    None
                };
                declarations.push((name, init));
            }
            self.expect_semicolon()?;
            let init_stmt = Statement::VarDeclaration {
                kind,
                declarations,
                line,
            };
            return self.finish_classic_for(Some(Box::new(init_stmt)), line);
        }

        if self.eat_punct(Punctuator::Semicolon)? {
            return self.finish_classic_for(None, line);
        }

        let expr = self.parse_expression()?;
        if let Expression::Identifier(name) = &expr {
            let name = name.clone();
            if self.eat_keyword(Keyword::In)? {
                return self.finish_for_in_of(None, name, true, line);
            }
            if self.eat_keyword(Keyword::Of)? {
                return self.finish_for_in_of(None, name, false, line);
            }
        }
        self.expect_semicolon()?;
        let init_stmt = Statement::Expression {
            expression: expr,
            line,
        };
        self.finish_classic_for(Some(Box::new(init_stmt)), line)
    }

    fn finish_classic_for(
        &mut self,
        init: Option<Box<Statement>>,
        line: u32,
    ) -> Result<Statement, CompileError> {
        let test = if self.check_punct(Punctuator::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_semicolon()?;
        let update = if self.check_punct(Punctuator::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_punct(Punctuator::RParen, "')'")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Statement::For {
            init,
            test,
            update,
            body,
            line,
        })
    }

    fn finish_for_in_of(
        &mut self,
        decl: Option<DeclKind>,
        name: String,
        is_in: bool,
        line: u32,
    ) -> Result<Statement, CompileError> {
        let object = self.parse_expression()?;
        self.expect_punct(Punctuator::RParen, "')'")?;
        let body = Box::new(self.parse_statement()?);
        Ok(if is_in {
            Statement::ForIn {
                decl,
                name,
                object,
                body,
                line,
            }
        } else {
            Statement::ForOf {
                decl,
                name,
                iterable: object,
                body,
                line,
            }
        })
    }

    fn parse_switch(&mut self) -> Result<Statement, CompileError> {
        let line = self.line();
        self.advance()?; // switch
        self.expect_punct(Punctuator::LParen, "'('")?;
        let scrutinee = self.parse_expression()?;
        self.expect_punct(Punctuator::RParen, "')'")?;
        self.expect_punct(Punctuator::LBrace, "'{'")?;

        let mut cases = Vec::new();
        let mut seen_default = false;
        while !self.check_punct(Punctuator::RBrace) {
            if self.check_eof() {
                return Err(self.error_here("unexpected end of input in switch"));
            }
            let test = if self.eat_keyword(Keyword::Case)? {
                let test = self.parse_expression()?;
                self.expect_punct(Punctuator::Colon, "':'")?;
                Some(test)
            } else if self.eat_keyword(Keyword::Default)? {
                if seen_default {
                    return Err(self.error_here("switch has more than one default"));
                }
                seen_default = true;
                self.expect_punct(Punctuator::Colon, "':'")?;
                None
            } else {
                return Err(self.error_here("expected 'case' or 'default'"));
            };
            let mut body = Vec::new();
            while !self.check_punct(Punctuator::RBrace)
                && !self.check_keyword(Keyword::Case)
                && !self.check_keyword(Keyword::Default)
            {
                body.push(self.parse_statement()?);
            }
            cases.push(SwitchCase { test, body });
        }
        self.advance()?; // }
        Ok(Statement::Switch {
            scrutinee,
            cases,
            line,
        })
    }

    fn parse_try(&mut self) -> Result<Statement, CompileError> {
        let line = self.line();
        self.advance()?; // try
        let block = self.parse_block()?;
        let catch = if self.eat_keyword(Keyword::Catch)? {
            self.expect_punct(Punctuator::LParen, "'('")?;
            let param = self.expect_identifier("catch parameter")?;
            self.expect_punct(Punctuator::RParen, "')'")?;
            let body = self.parse_block()?;
            Some((param, body))
        } else {
            None
        };
        let finally = if self.eat_keyword(Keyword::Finally)? {
            Some(self.parse_block()?)
        } else {
            None
        };
        if catch.is_none() && finally.is_none() {
            return Err(self.error_here("try requires a catch or finally block"));
        }
        Ok(Statement::Try {
            block,
            catch,
            finally,
            line,
        })
    }

    // ---- expressions ----

    /// Parses a full expression (assignment level).
    pub fn parse_expression(&mut self) -> Result<Expression, CompileError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expression, CompileError> {
        if self.check_keyword(Keyword::Yield) {
            self.advance()?;
            let argument = if self.check_punct(Punctuator::Semicolon)
                || self.check_punct(Punctuator::RParen)
                || self.check_punct(Punctuator::RBracket)
                || self.check_punct(Punctuator::RBrace)
                || self.check_punct(Punctuator::Comma)
                || self.check_eof()
            {
                None
            } else {
                Some(Box::new(self.parse_assignment()?))
            };
            return Ok(Expression::Yield(argument));
        }

        let target = self.parse_ternary()?;
        let op = match &self.current.token {
            Token::Punctuator(p) => assignment_op_for(*p),
            _ => None,
        };
        let Some(op) = op else {
            return Ok(target);
        };
        self.advance()?;
        let value = Box::new(self.parse_assignment()?);

        // Destructuring assignment: literal array/object patterns on the
        // left of a plain `=`
        if matches!(op, AssignOp::Assign) {
            match &target {
                Expression::ArrayLiteral(elements) => {
                    let targets = self.array_pattern_targets(elements)?;
                    return Ok(Expression::ArrayDestructure { targets, value });
                }
                Expression::ObjectLiteral(entries) => {
                    let targets = self.object_pattern_targets(entries)?;
                    return Ok(Expression::ObjectDestructure { targets, value });
                }
                _ => {}
            }
        }

        if !target.is_assignable() {
            return Err(self.error_here("invalid assignment target"));
        }
        Ok(Expression::Assignment {
            op,
            target: Box::new(target),
            value,
        })
    }

    fn array_pattern_targets(
        &self,
        elements: &[Expression],
    ) -> Result<Vec<DestructureTarget>, CompileError> {
        let mut targets = Vec::new();
        for element in elements {
            targets.push(self.pattern_target(element, None)?);
        }
        Ok(targets)
    }

    fn object_pattern_targets(
        &self,
        entries: &[ObjectEntry],
    ) -> Result<Vec<DestructureTarget>, CompileError> {
        let mut targets = Vec::new();
        for entry in entries {
            match entry {
                ObjectEntry::Field { key, value } => {
                    targets.push(self.pattern_target(value, Some(key.clone()))?);
                }
                _ => return Err(self.error_here("accessors are not valid in patterns")),
            }
        }
        Ok(targets)
    }

    fn pattern_target(
        &self,
        expr: &Expression,
        key: Option<String>,
    ) -> Result<DestructureTarget, CompileError> {
        match expr {
            Expression::Identifier(name) => Ok(DestructureTarget {
                name: name.clone(),
                key: key.unwrap_or_else(|| name.clone()),
                default: None,
            }),
            Expression::Assignment {
                op: AssignOp::Assign,
                target,
                value,
            } => match target.as_ref() {
                Expression::Identifier(name) => Ok(DestructureTarget {
                    name: name.clone(),
                    key: key.unwrap_or_else(|| name.clone()),
                    default: Some((**value).clone()),
                }),
                _ => Err(self.error_here("invalid destructuring target")),
            },
            _ => Err(self.error_here("invalid destructuring target")),
        }
    }

    fn parse_ternary(&mut self) -> Result<Expression, CompileError> {
        let test = self.parse_nullish()?;
        if self.eat_punct(Punctuator::Question)? {
            let consequent = Box::new(self.parse_assignment()?);
            self.expect_punct(Punctuator::Colon, "':'")?;
            let alternate = Box::new(self.parse_assignment()?);
            return Ok(Expression::Ternary {
                test: Box::new(test),
                consequent,
                alternate,
            });
        }
        Ok(test)
    }

    fn parse_nullish(&mut self) -> Result<Expression, CompileError> {
        let mut left = self.parse_logical_or()?;
        while self.eat_punct(Punctuator::NullishCoalesce)? {
            let right = self.parse_logical_or()?;
            left = Expression::Logical {
                op: LogicalOp::Nullish,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_logical_or(&mut self) -> Result<Expression, CompileError> {
        let mut left = self.parse_logical_and()?;
        while self.eat_punct(Punctuator::OrOr)? {
            let right = self.parse_logical_and()?;
            left = Expression::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<Expression, CompileError> {
        let mut left = self.parse_bit_or()?;
        while self.eat_punct(Punctuator::AndAnd)? {
            let right = self.parse_bit_or()?;
            left = Expression::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_bit_or(&mut self) -> Result<Expression, CompileError> {
        let mut left = self.parse_bit_xor()?;
        while self.eat_punct(Punctuator::Or)? {
            let right = self.parse_bit_xor()?;
            left = binary(BinaryOp::BitOr, left, right);
        }
        Ok(left)
    }

    fn parse_bit_xor(&mut self) -> Result<Expression, CompileError> {
        let mut left = self.parse_bit_and()?;
        while self.eat_punct(Punctuator::Xor)? {
            let right = self.parse_bit_and()?;
            left = binary(BinaryOp::BitXor, left, right);
        }
        Ok(left)
    }

    fn parse_bit_and(&mut self) -> Result<Expression, CompileError> {
        let mut left = self.parse_equality()?;
        while self.eat_punct(Punctuator::And)? {
            let right = self.parse_equality()?;
            left = binary(BinaryOp::BitAnd, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expression, CompileError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = if self.eat_punct(Punctuator::EqEq)? {
                BinaryOp::Equals
            } else if self.eat_punct(Punctuator::NotEq)? {
                BinaryOp::NotEquals
            } else if self.eat_punct(Punctuator::EqEqEq)? {
                BinaryOp::StrictEquals
            } else if self.eat_punct(Punctuator::NotEqEq)? {
                BinaryOp::StrictNotEquals
            } else {
                break;
            };
            let right = self.parse_relational()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expression, CompileError> {
        let mut left = self.parse_shift()?;
        loop {
            let op = if self.eat_punct(Punctuator::Lt)? {
                BinaryOp::Lt
            } else if self.eat_punct(Punctuator::LtEq)? {
                BinaryOp::Le
            } else if self.eat_punct(Punctuator::Gt)? {
                BinaryOp::Gt
            } else if self.eat_punct(Punctuator::GtEq)? {
                BinaryOp::Ge
            } else if self.eat_keyword(Keyword::Instanceof)? {
                BinaryOp::InstanceOf
            } else {
                break;
            };
            let right = self.parse_shift()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_shift(&mut self) -> Result<Expression, CompileError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = if self.eat_punct(Punctuator::LtLt)? {
                BinaryOp::Shl
            } else if self.eat_punct(Punctuator::GtGt)? {
                BinaryOp::Shr
            } else if self.eat_punct(Punctuator::GtGtGt)? {
                BinaryOp::UShr
            } else {
                break;
            };
            let right = self.parse_additive()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expression, CompileError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.eat_punct(Punctuator::Plus)? {
                BinaryOp::Add
            } else if self.eat_punct(Punctuator::Minus)? {
                BinaryOp::Sub
            } else {
                break;
            };
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expression, CompileError> {
        let mut left = self.parse_exponent()?;
        loop {
            let op = if self.eat_punct(Punctuator::Star)? {
                BinaryOp::Mul
            } else if self.eat_punct(Punctuator::Slash)? {
                BinaryOp::Div
            } else if self.eat_punct(Punctuator::Percent)? {
                BinaryOp::Mod
            } else {
                break;
            };
            let right = self.parse_exponent()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_exponent(&mut self) -> Result<Expression, CompileError> {
        let left = self.parse_unary()?;
        if self.eat_punct(Punctuator::StarStar)? {
            // Right-associative
            let right = self.parse_exponent()?;
            return Ok(binary(BinaryOp::Pow, left, right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, CompileError> {
        let op = match &self.current.token {
            Token::Punctuator(Punctuator::Minus) => Some(UnaryOp::Negate),
            Token::Punctuator(Punctuator::Plus) => Some(UnaryOp::Plus),
            Token::Punctuator(Punctuator::Not) => Some(UnaryOp::Not),
            Token::Punctuator(Punctuator::Tilde) => Some(UnaryOp::BitNot),
            Token::Keyword(Keyword::Typeof) => Some(UnaryOp::TypeOf),
            _ => None,
        };
        if let Some(op) = op {
            self.advance()?;
            let operand = Box::new(self.parse_unary()?);
            return Ok(Expression::Unary { op, operand });
        }
        if self.check_keyword(Keyword::Delete) {
            self.advance()?;
            let target = self.parse_unary()?;
            if !matches!(
                target,
                Expression::Member { .. } | Expression::Index { .. }
            ) {
                return Err(self.error_here("delete requires a member expression"));
            }
            return Ok(Expression::Delete {
                target: Box::new(target),
            });
        }
        if self.check_punct(Punctuator::PlusPlus) || self.check_punct(Punctuator::MinusMinus) {
            let increment = self.check_punct(Punctuator::PlusPlus);
            self.advance()?;
            let target = self.parse_unary()?;
            if !target.is_assignable() {
                return Err(self.error_here("invalid increment target"));
            }
            return Ok(Expression::Update {
                increment,
                prefix: true,
                target: Box::new(target),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expression, CompileError> {
        let expr = self.parse_call_member()?;
        if self.check_punct(Punctuator::PlusPlus) || self.check_punct(Punctuator::MinusMinus) {
            let increment = self.check_punct(Punctuator::PlusPlus);
            self.advance()?;
            if !expr.is_assignable() {
                return Err(self.error_here("invalid increment target"));
            }
            return Ok(Expression::Update {
                increment,
                prefix: false,
                target: Box::new(expr),
            });
        }
        Ok(expr)
    }

    fn parse_call_member(&mut self) -> Result<Expression, CompileError> {
        let mut expr = if self.eat_keyword(Keyword::New)? {
            let callee = self.parse_member_chain_base()?;
            self.expect_punct(Punctuator::LParen, "'(' after new expression")?;
            let args = self.parse_arguments()?;
            Expression::New {
                callee: Box::new(callee),
                args,
            }
        } else {
            self.parse_primary()?
        };

        loop {
            if self.eat_punct(Punctuator::Dot)? {
                let property = self.expect_identifier("property name")?;
                expr = Expression::Member {
                    object: Box::new(expr),
                    property,
                };
            } else if self.eat_punct(Punctuator::LBracket)? {
                let index = self.parse_expression()?;
                self.expect_punct(Punctuator::RBracket, "']'")?;
                expr = Expression::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.check_punct(Punctuator::LParen) {
                self.advance()?;
                let args = self.parse_arguments()?;
                expr = Expression::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    /// Parses the callee of a `new` expression: a primary followed by
    /// member accesses, but no call applications.
    fn parse_member_chain_base(&mut self) -> Result<Expression, CompileError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_punct(Punctuator::Dot)? {
                let property = self.expect_identifier("property name")?;
                expr = Expression::Member {
                    object: Box::new(expr),
                    property,
                };
            } else if self.eat_punct(Punctuator::LBracket)? {
                let index = self.parse_expression()?;
                self.expect_punct(Punctuator::RBracket, "']'")?;
                expr = Expression::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expression>, CompileError> {
        let mut args = Vec::new();
        if !self.check_punct(Punctuator::RParen) {
            loop {
                args.push(self.parse_assignment()?);
                if !self.eat_punct(Punctuator::Comma)? {
                    break;
                }
            }
        }
        self.expect_punct(Punctuator::RParen, "')'")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expression, CompileError> {
        let line = self.line();
        let token = self.advance()?.token;
        match token {
            Token::Integer(n) => Ok(Expression::Literal(Value::Integer(n))),
            Token::Double(n) => Ok(Expression::Literal(Value::Double(n))),
            Token::String(s) => Ok(Expression::Literal(Value::string(s))),
            Token::Keyword(Keyword::True) => Ok(Expression::Literal(Value::Boolean(true))),
            Token::Keyword(Keyword::False) => Ok(Expression::Literal(Value::Boolean(false))),
            Token::Keyword(Keyword::Null) => Ok(Expression::Literal(Value::Null)),
            Token::Keyword(Keyword::Undefined) => Ok(Expression::Literal(Value::Undefined)),
            Token::Keyword(Keyword::This) => Ok(Expression::This),
            Token::Identifier(name) => Ok(Expression::Identifier(name)),
            Token::Regex { pattern, flags } => Ok(Expression::Regex { pattern, flags }),
            Token::Template(parts) => self.parse_template_elements(parts, line),
            Token::Keyword(Keyword::Function) => {
                let func = self.parse_function_literal(line, false)?;
                Ok(Expression::Function(func))
            }
            Token::Keyword(Keyword::Class) => {
                let class = self.parse_class_literal(line, false)?;
                Ok(Expression::Class(class))
            }
            Token::Keyword(Keyword::Super) => {
                if self.eat_punct(Punctuator::LParen)? {
                    let args = self.parse_arguments()?;
                    Ok(Expression::SuperCall(args))
                } else if self.eat_punct(Punctuator::Dot)? {
                    let property = self.expect_identifier("property name")?;
                    Ok(Expression::SuperMember(property))
                } else {
                    Err(self.error_here("expected '(' or '.' after super"))
                }
            }
            Token::Punctuator(Punctuator::LParen) => {
                let expr = self.parse_expression()?;
                self.expect_punct(Punctuator::RParen, "')'")?;
                Ok(expr)
            }
            Token::Punctuator(Punctuator::LBracket) => {
                let mut elements = Vec::new();
                if !self.check_punct(Punctuator::RBracket) {
                    loop {
                        elements.push(self.parse_assignment()?);
                        if !self.eat_punct(Punctuator::Comma)? {
                            break;
                        }
                        if self.check_punct(Punctuator::RBracket) {
                            break; // trailing comma
                        }
                    }
                }
                self.expect_punct(Punctuator::RBracket, "']'")?;
                Ok(Expression::ArrayLiteral(elements))
            }
            Token::Punctuator(Punctuator::LBrace) => self.parse_object_literal(),
            other => Err(CompileError::new(
                line,
                self.current.column,
                format!("unexpected token {:?}", other),
            )),
        }
    }

    fn parse_template_elements(
        &mut self,
        parts: Vec<TemplatePart>,
        line: u32,
    ) -> Result<Expression, CompileError> {
        let mut elements = Vec::new();
        for part in parts {
            match part {
                TemplatePart::Text(text) => elements.push(TemplateElement::Text(text)),
                TemplatePart::Expr(source) => {
                    let mut sub = Parser::new(&source).map_err(|e| {
                        CompileError::new(line, e.column, e.message)
                    })?;
                    let expr = sub.parse_expression_only().map_err(|e| {
                        CompileError::new(line, e.column, e.message)
                    })?;
                    elements.push(TemplateElement::Expr(Box::new(expr)));
                }
            }
        }
        Ok(Expression::Template(elements))
    }

    fn parse_object_literal(&mut self) -> Result<Expression, CompileError> {
        let mut entries = Vec::new();
        while !self.check_punct(Punctuator::RBrace) {
            if self.check_eof() {
                return Err(self.error_here("unexpected end of input in object literal"));
            }
            let line = self.line();
            let key = self.parse_property_key()?;

            if (key == "get" || key == "set")
                && !self.check_punct(Punctuator::Colon)
                && !self.check_punct(Punctuator::Comma)
                && !self.check_punct(Punctuator::RBrace)
                && !self.check_punct(Punctuator::LParen)
            {
                let name = self.parse_property_key()?;
                let func = self.parse_member_function(name.clone(), line)?;
                if key == "get" {
                    entries.push(ObjectEntry::Getter { key: name, func });
                } else {
                    entries.push(ObjectEntry::Setter { key: name, func });
                }
            } else if self.check_punct(Punctuator::LParen) {
                // Method shorthand
                let func = self.parse_member_function(key.clone(), line)?;
                entries.push(ObjectEntry::Field {
                    key,
                    value: Expression::Function(func),
                });
            } else if self.eat_punct(Punctuator::Colon)? {
                let value = self.parse_assignment()?;
                entries.push(ObjectEntry::Field { key, value });
            } else {
                // Shorthand {a} - also the spelling of object patterns
                entries.push(ObjectEntry::Field {
                    key: key.clone(),
                    value: Expression::Identifier(key),
                });
            }

            if !self.eat_punct(Punctuator::Comma)? {
                break;
            }
        }
        self.expect_punct(Punctuator::RBrace, "'}'")?;
        Ok(Expression::ObjectLiteral(entries))
    }

    fn parse_property_key(&mut self) -> Result<String, CompileError> {
        match &self.current.token {
            Token::Identifier(name) => {
                let name = name.clone();
                self.advance()?;
                Ok(name)
            }
            Token::String(s) => {
                let s = s.clone();
                self.advance()?;
                Ok(s)
            }
            Token::Integer(n) => {
                let s = n.to_string();
                self.advance()?;
                Ok(s)
            }
            _ => Err(self.error_here("expected property name")),
        }
    }
}

fn binary(op: BinaryOp, left: Expression, right: Expression) -> Expression {
    Expression::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn assignment_op_for(p: Punctuator) -> Option<AssignOp> {
    let op = match p {
        Punctuator::Assign => AssignOp::Assign,
        Punctuator::PlusEq => AssignOp::Compound(BinaryOp::Add),
        Punctuator::MinusEq => AssignOp::Compound(BinaryOp::Sub),
        Punctuator::StarEq => AssignOp::Compound(BinaryOp::Mul),
        Punctuator::SlashEq => AssignOp::Compound(BinaryOp::Div),
        Punctuator::PercentEq => AssignOp::Compound(BinaryOp::Mod),
        Punctuator::StarStarEq => AssignOp::Compound(BinaryOp::Pow),
        Punctuator::AndEq => AssignOp::Compound(BinaryOp::BitAnd),
        Punctuator::OrEq => AssignOp::Compound(BinaryOp::BitOr),
        Punctuator::XorEq => AssignOp::Compound(BinaryOp::BitXor),
        Punctuator::LtLtEq => AssignOp::Compound(BinaryOp::Shl),
        Punctuator::GtGtEq => AssignOp::Compound(BinaryOp::Shr),
        Punctuator::GtGtGtEq => AssignOp::Compound(BinaryOp::UShr),
        Punctuator::AndAndEq => AssignOp::Logical(LogicalOp::And),
        Punctuator::OrOrEq => AssignOp::Logical(LogicalOp::Or),
        Punctuator::NullishEq => AssignOp::Logical(LogicalOp::Nullish),
        _ => return None,
    };
    Some(op)
}
