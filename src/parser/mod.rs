//! Recursive descent parser for learner code
//!
//! Source is parsed as the body of a function: top-level `return` is legal and
//! the resulting [`Program`] is executed the way a dynamically constructed
//! function would run it.

use std::rc::Rc;

use crate::ast::*;
use crate::error::{messages, Error, Result, SourceLocation};
use crate::lexer::{Keyword, Lexer, Token, TokenKind};

/// Deepest statement/expression nesting accepted before bailing out; low
/// enough that parsing fits a default 2 MiB thread stack in debug builds
pub const MAX_NESTING_DEPTH: usize = 48;

/// Parser state flags
#[derive(Debug, Clone, Copy, Default)]
struct ParserFlags {
    /// Inside a loop (for, while, etc.)
    in_loop: bool,
    /// Inside a switch statement
    in_switch: bool,
    /// Parsing a `for (... in ...)` head where `in` is not an operator
    no_in: bool,
}

/// A recursive descent parser
pub struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token<'src>>,
    pos: usize,
    flags: ParserFlags,
    /// Labels of enclosing statements, for `break label`
    labels: Vec<String>,
    depth: usize,
}

impl<'src> Parser<'src> {
    /// Tokenize `source` and create a parser over it
    pub fn new(source: &'src str) -> Result<Self> {
        let tokens = Lexer::new(source).tokenize()?;
        Ok(Self {
            source,
            tokens,
            pos: 0,
            flags: ParserFlags::default(),
            labels: Vec::new(),
            depth: 0,
        })
    }

    /// Parse the whole source as a function body
    pub fn parse_program(&mut self) -> Result<Program> {
        let start = self.location();
        let mut body = Vec::new();
        while !self.is_eof() {
            body.push(self.parse_statement()?);
        }
        Ok(Program {
            body,
            span: Span::new(start, self.location()),
        })
    }

    // ========== Token Access ==========

    fn current(&self) -> &Token<'src> {
        &self.tokens[self.pos]
    }

    fn peek(&self) -> TokenKind {
        self.tokens[self.pos].kind
    }

    fn peek_at(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn is_eof(&self) -> bool {
        self.peek() == TokenKind::Eof
    }

    /// Whether the current token is the contextual word `text`
    fn at_contextual(&self, text: &str) -> bool {
        self.peek() == TokenKind::Identifier && self.current().text == text
    }

    fn location(&self) -> SourceLocation {
        self.current().location
    }

    fn error(&self, message: impl Into<String>, location: SourceLocation) -> Error {
        Error::parse_error_with_context(message, location, self.source)
    }

    /// Error for the current token in the wording learners see in browsers
    fn unexpected(&self) -> Error {
        let token = self.current();
        let message = match token.kind {
            TokenKind::Eof => messages::UNEXPECTED_END.to_string(),
            TokenKind::Identifier => format!("Unexpected identifier '{}'", token.text),
            TokenKind::NumberLiteral => "Unexpected number".to_string(),
            TokenKind::StringLiteral => "Unexpected string".to_string(),
            TokenKind::Keyword(kw) if kw.is_unsupported() => {
                format!("'{}' is not supported", kw)
            }
            _ => format!("Unexpected token '{}'", token.text),
        };
        self.error(message, token.location)
    }

    fn unsupported(&self, word: &str) -> Error {
        self.error(format!("'{}' is not supported", word), self.location())
    }

    /// Contextual `word` that acts as an operator: followed on the same line
    /// by something that starts an operand
    fn at_contextual_operator(&self, word: &str) -> bool {
        self.at_contextual(word)
            && self.tokens.get(self.pos + 1).is_some_and(|next| {
                !next.newline_before
                    && matches!(
                        next.kind,
                        TokenKind::Identifier
                            | TokenKind::NumberLiteral
                            | TokenKind::StringLiteral
                            | TokenKind::TemplateLiteral
                            | TokenKind::TemplateHead
                            | TokenKind::Keyword(
                                Keyword::This
                                    | Keyword::New
                                    | Keyword::Function
                                    | Keyword::Null
                                    | Keyword::True
                                    | Keyword::False
                            )
                    )
            })
    }

    /// `async function`, `async x =>` or `async (...) =>`
    fn at_async_function(&self) -> bool {
        if !self.at_contextual("async")
            || self.tokens.get(self.pos + 1).map_or(true, |next| next.newline_before)
        {
            return false;
        }
        match self.peek_at(1) {
            TokenKind::Keyword(Keyword::Function) => true,
            TokenKind::Identifier => self.peek_at(2) == TokenKind::Arrow,
            TokenKind::LeftParen => self.arrow_after_parens(1),
            _ => false,
        }
    }

    fn advance(&mut self) -> &Token<'src> {
        let token = &self.tokens[self.pos];
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind) -> Result<&Token<'src>> {
        if self.peek() == kind {
            Ok(self.advance())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<&Token<'src>> {
        self.expect(TokenKind::Keyword(keyword))
    }

    fn consume(&mut self, kind: TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Automatic semicolon insertion: `;`, `}`, end of input or a line break
    fn consume_semicolon(&mut self) -> Result<()> {
        if self.consume(TokenKind::Semicolon) {
            return Ok(());
        }
        if matches!(self.peek(), TokenKind::RightBrace | TokenKind::Eof)
            || self.current().newline_before
        {
            return Ok(());
        }
        Err(self.unexpected())
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            let loc = self.location();
            return Err(self.error("Code is nested too deeply", loc));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Run `f` with `in` treated as an operator again (inside brackets)
    fn allow_in<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let saved = self.flags.no_in;
        self.flags.no_in = false;
        let result = f(self);
        self.flags.no_in = saved;
        result
    }

    // ========== Statements ==========

    fn parse_statement(&mut self) -> Result<Statement> {
        self.enter()?;
        let result = self.parse_statement_inner();
        self.leave();
        result
    }

    fn parse_statement_inner(&mut self) -> Result<Statement> {
        match self.peek() {
            TokenKind::LeftBrace => self.parse_block_statement().map(Statement::Block),
            TokenKind::Semicolon => {
                let loc = self.location();
                self.advance();
                Ok(Statement::Empty(Span::new(loc, self.location())))
            }
            TokenKind::Keyword(Keyword::Var) => self.parse_variable_statement(VariableKind::Var),
            TokenKind::Keyword(Keyword::Let) => self.parse_variable_statement(VariableKind::Let),
            TokenKind::Keyword(Keyword::Const) => {
                self.parse_variable_statement(VariableKind::Const)
            }
            TokenKind::Keyword(Keyword::Function) => {
                let func = self.parse_function(true)?;
                Ok(Statement::FunctionDeclaration(Rc::new(func)))
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if_statement(),
            TokenKind::Keyword(Keyword::While) => self.parse_while_statement(),
            TokenKind::Keyword(Keyword::Do) => self.parse_do_while_statement(),
            TokenKind::Keyword(Keyword::For) => self.parse_for_statement(),
            TokenKind::Keyword(Keyword::Switch) => self.parse_switch_statement(),
            TokenKind::Keyword(Keyword::Break) => self.parse_jump_statement(true),
            TokenKind::Keyword(Keyword::Continue) => self.parse_jump_statement(false),
            TokenKind::Keyword(Keyword::Return) => self.parse_return_statement(),
            TokenKind::Keyword(Keyword::Throw) => self.parse_throw_statement(),
            TokenKind::Keyword(Keyword::Try) => self.parse_try_statement(),
            TokenKind::Keyword(Keyword::Debugger) => {
                let start = self.location();
                self.advance();
                self.consume_semicolon()?;
                Ok(Statement::Empty(Span::new(start, self.location())))
            }
            TokenKind::Keyword(kw) if kw.is_unsupported() => Err(self.unexpected()),
            TokenKind::Identifier if self.peek_at(1) == TokenKind::Colon => {
                self.parse_labeled_statement()
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_block_statement(&mut self) -> Result<BlockStatement> {
        let start = self.location();
        self.expect(TokenKind::LeftBrace)?;

        let mut body = Vec::new();
        while !self.consume(TokenKind::RightBrace) {
            if self.is_eof() {
                return Err(self.unexpected());
            }
            body.push(self.parse_statement()?);
        }

        Ok(BlockStatement {
            body,
            span: Span::new(start, self.location()),
        })
    }

    fn parse_variable_statement(&mut self, kind: VariableKind) -> Result<Statement> {
        let decl = self.parse_variable_declaration(kind)?;
        self.consume_semicolon()?;
        Ok(Statement::VariableDeclaration(decl))
    }

    /// Parse `kind a = 1, b` without the trailing semicolon
    fn parse_variable_declaration(&mut self, kind: VariableKind) -> Result<VariableDeclaration> {
        let start = self.location();
        self.advance();

        let mut declarations = Vec::new();
        loop {
            let decl_start = self.location();
            let id = self.parse_binding_pattern()?;
            declarations.push(self.finish_declarator(kind, id, decl_start)?);
            if !self.consume(TokenKind::Comma) {
                break;
            }
        }

        Ok(VariableDeclaration {
            kind,
            declarations,
            span: Span::new(start, self.location()),
        })
    }

    fn finish_declarator(
        &mut self,
        kind: VariableKind,
        id: Pattern,
        start: SourceLocation,
    ) -> Result<VariableDeclarator> {
        let init = if self.consume(TokenKind::Equals) {
            Some(self.parse_assignment_expression()?)
        } else {
            None
        };

        if init.is_none() {
            let destructuring = !matches!(id, Pattern::Identifier(_));
            if kind == VariableKind::Const || destructuring {
                let message = if destructuring {
                    "Missing initializer in destructuring declaration"
                } else {
                    "Missing initializer in const declaration"
                };
                return Err(self.error(message, start));
            }
        }

        Ok(VariableDeclarator {
            id,
            init,
            span: Span::new(start, self.location()),
        })
    }

    fn parse_binding_pattern(&mut self) -> Result<Pattern> {
        self.enter()?;
        let result = match self.peek() {
            TokenKind::LeftBracket => self.parse_array_pattern(),
            TokenKind::LeftBrace => self.parse_object_pattern(),
            _ => self.parse_identifier().map(Pattern::Identifier),
        };
        self.leave();
        result
    }

    /// Binding pattern with an optional `= default`
    fn parse_binding_element(&mut self) -> Result<Pattern> {
        let start = self.location();
        let pattern = self.parse_binding_pattern()?;
        if self.consume(TokenKind::Equals) {
            let right = self.allow_in(|p| p.parse_assignment_expression())?;
            return Ok(Pattern::Assignment(Box::new(AssignmentPattern {
                left: pattern,
                right,
                span: Span::new(start, self.location()),
            })));
        }
        Ok(pattern)
    }

    fn parse_array_pattern(&mut self) -> Result<Pattern> {
        let start = self.location();
        self.expect(TokenKind::LeftBracket)?;

        let mut elements = Vec::new();
        let mut rest = None;
        while !self.consume(TokenKind::RightBracket) {
            if self.consume(TokenKind::Comma) {
                elements.push(None);
                continue;
            }
            if self.consume(TokenKind::DotDotDot) {
                rest = Some(Box::new(self.parse_binding_pattern()?));
                self.expect(TokenKind::RightBracket)?;
                break;
            }
            elements.push(Some(self.parse_binding_element()?));
            if !self.consume(TokenKind::Comma) {
                self.expect(TokenKind::RightBracket)?;
                break;
            }
        }

        Ok(Pattern::Array(ArrayPattern {
            elements,
            rest,
            span: Span::new(start, self.location()),
        }))
    }

    fn parse_object_pattern(&mut self) -> Result<Pattern> {
        let start = self.location();
        self.expect(TokenKind::LeftBrace)?;

        let mut properties = Vec::new();
        let mut rest = None;
        while !self.consume(TokenKind::RightBrace) {
            if self.consume(TokenKind::DotDotDot) {
                rest = Some(Box::new(Pattern::Identifier(self.parse_identifier()?)));
                self.expect(TokenKind::RightBrace)?;
                break;
            }

            let prop_start = self.location();
            let shorthand = self.peek() == TokenKind::Identifier
                && self.peek_at(1) != TokenKind::Colon;
            let value = if shorthand {
                let id = self.parse_identifier()?;
                let key = PropertyKey::Identifier(id.clone());
                let mut value = Pattern::Identifier(id);
                if self.consume(TokenKind::Equals) {
                    let right = self.allow_in(|p| p.parse_assignment_expression())?;
                    value = Pattern::Assignment(Box::new(AssignmentPattern {
                        left: value,
                        right,
                        span: Span::new(prop_start, self.location()),
                    }));
                }
                (key, value)
            } else {
                let key = self.parse_property_key()?;
                self.expect(TokenKind::Colon)?;
                (key, self.parse_binding_element()?)
            };

            properties.push(ObjectPatternProperty {
                key: value.0,
                value: value.1,
                span: Span::new(prop_start, self.location()),
            });

            if !self.consume(TokenKind::Comma) {
                self.expect(TokenKind::RightBrace)?;
                break;
            }
        }

        Ok(Pattern::Object(ObjectPattern {
            properties,
            rest,
            span: Span::new(start, self.location()),
        }))
    }

    fn parse_property_key(&mut self) -> Result<PropertyKey> {
        match self.peek() {
            TokenKind::StringLiteral => {
                let text = self.advance().text;
                Ok(PropertyKey::String(self.parse_string_value(text)?))
            }
            TokenKind::NumberLiteral => {
                let text = self.advance().text;
                Ok(PropertyKey::Number(self.parse_number_value(text)?))
            }
            TokenKind::LeftBracket => {
                self.advance();
                let expr = self.allow_in(|p| p.parse_assignment_expression())?;
                self.expect(TokenKind::RightBracket)?;
                Ok(PropertyKey::Computed(Box::new(expr)))
            }
            _ => Ok(PropertyKey::Identifier(self.parse_identifier_name()?)),
        }
    }

    /// Parse `function name(params) { body }`
    fn parse_function(&mut self, require_name: bool) -> Result<Function> {
        let start = self.location();
        self.expect_keyword(Keyword::Function)?;
        if self.peek() == TokenKind::Star {
            let loc = self.location();
            return Err(self.error("Generators are not supported", loc));
        }

        let id = if self.peek() == TokenKind::Identifier {
            Some(self.parse_identifier()?)
        } else if require_name {
            return Err(self.unexpected());
        } else {
            None
        };

        self.expect(TokenKind::LeftParen)?;
        let params = self.parse_function_params()?;
        let body = self.parse_function_body()?;

        Ok(Function {
            id,
            params,
            body: FunctionBody::Block(body),
            is_arrow: false,
            span: Span::new(start, self.location()),
        })
    }

    /// Parse parameters after the opening paren, consuming the closing one
    fn parse_function_params(&mut self) -> Result<FunctionParams> {
        let mut params = Vec::new();
        let mut rest = None;

        while !self.consume(TokenKind::RightParen) {
            if self.consume(TokenKind::DotDotDot) {
                rest = Some(Box::new(self.parse_binding_pattern()?));
                self.expect(TokenKind::RightParen)?;
                break;
            }
            params.push(self.parse_binding_element()?);
            if !self.consume(TokenKind::Comma) {
                self.expect(TokenKind::RightParen)?;
                break;
            }
        }

        Ok(FunctionParams { params, rest })
    }

    /// Function bodies reset loop/switch/label context
    fn parse_function_body(&mut self) -> Result<BlockStatement> {
        let saved_flags = self.flags;
        let saved_labels = std::mem::take(&mut self.labels);
        self.flags = ParserFlags::default();

        let body = self.parse_block_statement();

        self.flags = saved_flags;
        self.labels = saved_labels;
        body
    }

    fn parse_if_statement(&mut self) -> Result<Statement> {
        let start = self.location();
        self.expect_keyword(Keyword::If)?;
        self.expect(TokenKind::LeftParen)?;
        let test = self.parse_expression()?;
        self.expect(TokenKind::RightParen)?;

        let consequent = self.parse_statement()?;
        let alternate = if self.consume(TokenKind::Keyword(Keyword::Else)) {
            Some(self.parse_statement()?)
        } else {
            None
        };

        Ok(Statement::If(Box::new(IfStatement {
            test,
            consequent,
            alternate,
            span: Span::new(start, self.location()),
        })))
    }

    fn parse_loop_body(&mut self) -> Result<Statement> {
        let saved = self.flags.in_loop;
        self.flags.in_loop = true;
        let body = self.parse_statement();
        self.flags.in_loop = saved;
        body
    }

    fn parse_while_statement(&mut self) -> Result<Statement> {
        let start = self.location();
        self.expect_keyword(Keyword::While)?;
        self.expect(TokenKind::LeftParen)?;
        let test = self.parse_expression()?;
        self.expect(TokenKind::RightParen)?;
        let body = self.parse_loop_body()?;

        Ok(Statement::While(Box::new(WhileStatement {
            test,
            body,
            span: Span::new(start, self.location()),
        })))
    }

    fn parse_do_while_statement(&mut self) -> Result<Statement> {
        let start = self.location();
        self.expect_keyword(Keyword::Do)?;
        let body = self.parse_loop_body()?;
        self.expect_keyword(Keyword::While)?;
        self.expect(TokenKind::LeftParen)?;
        let test = self.parse_expression()?;
        self.expect(TokenKind::RightParen)?;
        self.consume(TokenKind::Semicolon);

        Ok(Statement::DoWhile(Box::new(WhileStatement {
            test,
            body,
            span: Span::new(start, self.location()),
        })))
    }

    fn parse_for_statement(&mut self) -> Result<Statement> {
        let start = self.location();
        self.expect_keyword(Keyword::For)?;
        if self.at_contextual("await") {
            return Err(self.unsupported("await"));
        }
        self.expect(TokenKind::LeftParen)?;

        let saved_no_in = self.flags.no_in;
        self.flags.no_in = true;
        let head = self.parse_for_head();
        self.flags.no_in = saved_no_in;

        let init = match head? {
            ForHead::Each { left, of } => {
                let right = if of {
                    self.parse_assignment_expression()?
                } else {
                    self.parse_expression()?
                };
                self.expect(TokenKind::RightParen)?;
                let body = self.parse_loop_body()?;
                let stmt = Box::new(ForInStatement {
                    left,
                    right,
                    body,
                    span: Span::new(start, self.location()),
                });
                return Ok(if of {
                    Statement::ForOf(stmt)
                } else {
                    Statement::ForIn(stmt)
                });
            }
            ForHead::Init(init) => init,
        };

        self.expect(TokenKind::Semicolon)?;
        let test = if self.peek() == TokenKind::Semicolon {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::Semicolon)?;
        let update = if self.peek() == TokenKind::RightParen {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::RightParen)?;
        let body = self.parse_loop_body()?;

        Ok(Statement::For(Box::new(ForStatement {
            init,
            test,
            update,
            body,
            span: Span::new(start, self.location()),
        })))
    }

    /// Parse what sits between `for (` and the first `;`, `in` or `of`
    fn parse_for_head(&mut self) -> Result<ForHead> {
        let kind = match self.peek() {
            TokenKind::Semicolon => return Ok(ForHead::Init(None)),
            TokenKind::Keyword(Keyword::Var) => Some(VariableKind::Var),
            TokenKind::Keyword(Keyword::Let) => Some(VariableKind::Let),
            TokenKind::Keyword(Keyword::Const) => Some(VariableKind::Const),
            _ => None,
        };

        if let Some(kind) = kind {
            let start = self.location();
            self.advance();
            let decl_start = self.location();
            let first = self.parse_binding_pattern()?;

            if let Some(of) = self.for_each_keyword() {
                return Ok(ForHead::Each {
                    left: ForInLeft::Declaration(kind, first),
                    of,
                });
            }

            let mut declarations = vec![self.finish_declarator(kind, first, decl_start)?];
            while self.consume(TokenKind::Comma) {
                let decl_start = self.location();
                let id = self.parse_binding_pattern()?;
                declarations.push(self.finish_declarator(kind, id, decl_start)?);
            }
            return Ok(ForHead::Init(Some(ForInit::VariableDeclaration(
                VariableDeclaration {
                    kind,
                    declarations,
                    span: Span::new(start, self.location()),
                },
            ))));
        }

        let start = self.location();
        let expr = self.parse_expression()?;
        if let Some(of) = self.for_each_keyword() {
            let left = self.expression_to_pattern(expr, start)?;
            return Ok(ForHead::Each {
                left: ForInLeft::Pattern(left),
                of,
            });
        }
        Ok(ForHead::Init(Some(ForInit::Expression(expr))))
    }

    /// Consume `of` (Some(true)) or `in` (Some(false))
    fn for_each_keyword(&mut self) -> Option<bool> {
        if self.at_contextual("of") {
            self.advance();
            Some(true)
        } else if self.consume(TokenKind::Keyword(Keyword::In)) {
            Some(false)
        } else {
            None
        }
    }

    fn parse_switch_statement(&mut self) -> Result<Statement> {
        let start = self.location();
        self.expect_keyword(Keyword::Switch)?;
        self.expect(TokenKind::LeftParen)?;
        let discriminant = self.parse_expression()?;
        self.expect(TokenKind::RightParen)?;
        self.expect(TokenKind::LeftBrace)?;

        let saved = self.flags.in_switch;
        self.flags.in_switch = true;

        let mut cases = Vec::new();
        let mut seen_default = false;
        while !self.consume(TokenKind::RightBrace) {
            let case_start = self.location();
            let test = if self.consume(TokenKind::Keyword(Keyword::Case)) {
                Some(self.parse_expression()?)
            } else if self.consume(TokenKind::Keyword(Keyword::Default)) {
                if seen_default {
                    return Err(self.error(
                        "More than one default clause in switch statement",
                        case_start,
                    ));
                }
                seen_default = true;
                None
            } else {
                return Err(self.unexpected());
            };
            self.expect(TokenKind::Colon)?;

            let mut consequent = Vec::new();
            while !matches!(
                self.peek(),
                TokenKind::Keyword(Keyword::Case)
                    | TokenKind::Keyword(Keyword::Default)
                    | TokenKind::RightBrace
                    | TokenKind::Eof
            ) {
                consequent.push(self.parse_statement()?);
            }

            cases.push(SwitchCase {
                test,
                consequent,
                span: Span::new(case_start, self.location()),
            });
        }

        self.flags.in_switch = saved;

        Ok(Statement::Switch(Box::new(SwitchStatement {
            discriminant,
            cases,
            span: Span::new(start, self.location()),
        })))
    }

    fn parse_jump_statement(&mut self, is_break: bool) -> Result<Statement> {
        let start = self.location();
        self.advance();

        let label = if self.peek() == TokenKind::Identifier && !self.current().newline_before {
            let label = self.parse_identifier()?;
            if !self.labels.contains(&label.name) {
                return Err(self.error(format!("Undefined label '{}'", label.name), start));
            }
            Some(label)
        } else {
            None
        };

        if label.is_none() {
            if is_break && !self.flags.in_loop && !self.flags.in_switch {
                return Err(self.error("Illegal break statement", start));
            }
            if !is_break && !self.flags.in_loop {
                return Err(self.error(
                    "Illegal continue statement: no surrounding iteration statement",
                    start,
                ));
            }
        }
        self.consume_semicolon()?;

        let jump = JumpStatement {
            label,
            span: Span::new(start, self.location()),
        };
        Ok(if is_break {
            Statement::Break(jump)
        } else {
            Statement::Continue(jump)
        })
    }

    fn parse_return_statement(&mut self) -> Result<Statement> {
        let start = self.location();
        self.expect_keyword(Keyword::Return)?;

        // A line break ends `return` before any argument
        let argument = if matches!(
            self.peek(),
            TokenKind::Semicolon | TokenKind::RightBrace | TokenKind::Eof
        ) || self.current().newline_before
        {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume_semicolon()?;

        Ok(Statement::Return(ReturnStatement {
            argument,
            span: Span::new(start, self.location()),
        }))
    }

    fn parse_throw_statement(&mut self) -> Result<Statement> {
        let start = self.location();
        self.expect_keyword(Keyword::Throw)?;
        if self.current().newline_before {
            let loc = self.location();
            return Err(self.error("Illegal newline after throw", loc));
        }
        let argument = self.parse_expression()?;
        self.consume_semicolon()?;

        Ok(Statement::Throw(Box::new(ThrowStatement {
            argument,
            span: Span::new(start, self.location()),
        })))
    }

    fn parse_try_statement(&mut self) -> Result<Statement> {
        let start = self.location();
        self.expect_keyword(Keyword::Try)?;
        let block = self.parse_block_statement()?;

        let handler = if self.consume(TokenKind::Keyword(Keyword::Catch)) {
            let catch_start = self.location();
            let param = if self.consume(TokenKind::LeftParen) {
                let p = self.parse_binding_pattern()?;
                self.expect(TokenKind::RightParen)?;
                Some(p)
            } else {
                None
            };
            let body = self.parse_block_statement()?;
            Some(CatchClause {
                param,
                body,
                span: Span::new(catch_start, self.location()),
            })
        } else {
            None
        };

        let finalizer = if self.consume(TokenKind::Keyword(Keyword::Finally)) {
            Some(self.parse_block_statement()?)
        } else {
            None
        };

        if handler.is_none() && finalizer.is_none() {
            return Err(self.error("Missing catch or finally after try", start));
        }

        Ok(Statement::Try(Box::new(TryStatement {
            block,
            handler,
            finalizer,
            span: Span::new(start, self.location()),
        })))
    }

    fn parse_labeled_statement(&mut self) -> Result<Statement> {
        let start = self.location();
        let label = self.parse_identifier()?;
        self.expect(TokenKind::Colon)?;

        self.labels.push(label.name.clone());
        let body = self.parse_statement();
        self.labels.pop();

        Ok(Statement::Labeled(Box::new(LabeledStatement {
            label,
            body: body?,
            span: Span::new(start, self.location()),
        })))
    }

    fn parse_expression_statement(&mut self) -> Result<Statement> {
        let start = self.location();
        let expression = self.parse_expression()?;
        self.consume_semicolon()?;

        Ok(Statement::Expression(ExpressionStatement {
            expression,
            span: Span::new(start, self.location()),
        }))
    }

    // ========== Expressions ==========

    /// Parse a comma-separated expression
    pub fn parse_expression(&mut self) -> Result<Expression> {
        let start = self.location();
        let mut expr = self.parse_assignment_expression()?;

        if self.peek() == TokenKind::Comma {
            let mut expressions = vec![expr];
            while self.consume(TokenKind::Comma) {
                expressions.push(self.parse_assignment_expression()?);
            }
            expr = Expression::Sequence(Box::new(SequenceExpression {
                expressions,
                span: Span::new(start, self.location()),
            }));
        }

        Ok(expr)
    }

    fn parse_assignment_expression(&mut self) -> Result<Expression> {
        self.enter()?;
        let result = self.parse_assignment_expression_inner();
        self.leave();
        result
    }

    fn parse_assignment_expression_inner(&mut self) -> Result<Expression> {
        if self.at_async_function() {
            return Err(self.unsupported("async"));
        }
        if self.is_arrow_ahead() {
            return self.parse_arrow_function();
        }

        let start = self.location();
        let left = self.parse_conditional_expression()?;

        if !self.peek().is_assignment_operator() {
            return Ok(left);
        }

        let operator = self.parse_assignment_operator()?;
        let target = if left.is_simple_assignment_target() {
            AssignmentTarget::Simple(left)
        } else if operator == AssignmentOperator::Assign
            && matches!(left, Expression::Array(_) | Expression::Object(_))
        {
            AssignmentTarget::Pattern(self.expression_to_pattern(left, start)?)
        } else {
            return Err(self.error(messages::INVALID_LEFT_HAND_SIDE, start));
        };
        let right = self.parse_assignment_expression()?;

        Ok(Expression::Assignment(Box::new(AssignmentExpression {
            operator,
            left: target,
            right,
            span: Span::new(start, self.location()),
        })))
    }

    /// Look ahead for `x =>` or `( ... ) =>` without consuming anything
    fn is_arrow_ahead(&self) -> bool {
        match self.peek() {
            TokenKind::Identifier => self.peek_at(1) == TokenKind::Arrow,
            TokenKind::LeftParen => self.arrow_after_parens(0),
            _ => false,
        }
    }

    /// Whether the parenthesized group opening at `offset` is followed by `=>`
    fn arrow_after_parens(&self, mut offset: usize) -> bool {
        let mut depth = 0usize;
        loop {
            match self.peek_at(offset) {
                TokenKind::LeftParen => depth += 1,
                TokenKind::RightParen => {
                    depth -= 1;
                    if depth == 0 {
                        return self.peek_at(offset + 1) == TokenKind::Arrow;
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
            offset += 1;
        }
    }

    fn parse_arrow_function(&mut self) -> Result<Expression> {
        let start = self.location();
        let params = if self.peek() == TokenKind::Identifier {
            FunctionParams {
                params: vec![Pattern::Identifier(self.parse_identifier()?)],
                rest: None,
            }
        } else {
            self.expect(TokenKind::LeftParen)?;
            self.allow_in(|p| p.parse_function_params())?
        };
        self.expect(TokenKind::Arrow)?;

        let body = if self.peek() == TokenKind::LeftBrace {
            FunctionBody::Block(self.parse_function_body()?)
        } else {
            FunctionBody::Expression(Box::new(self.parse_assignment_expression()?))
        };

        Ok(Expression::Function(Rc::new(Function {
            id: None,
            params,
            body,
            is_arrow: true,
            span: Span::new(start, self.location()),
        })))
    }

    fn parse_assignment_operator(&mut self) -> Result<AssignmentOperator> {
        let op = match self.peek() {
            TokenKind::Equals => AssignmentOperator::Assign,
            TokenKind::PlusEquals => AssignmentOperator::AddAssign,
            TokenKind::MinusEquals => AssignmentOperator::SubAssign,
            TokenKind::StarEquals => AssignmentOperator::MulAssign,
            TokenKind::SlashEquals => AssignmentOperator::DivAssign,
            TokenKind::PercentEquals => AssignmentOperator::ModAssign,
            TokenKind::StarStarEquals => AssignmentOperator::PowAssign,
            TokenKind::LessLessEquals => AssignmentOperator::ShlAssign,
            TokenKind::GreaterGreaterEquals => AssignmentOperator::ShrAssign,
            TokenKind::GreaterGreaterGreaterEquals => AssignmentOperator::UShrAssign,
            TokenKind::AmpersandEquals => AssignmentOperator::BitwiseAndAssign,
            TokenKind::PipeEquals => AssignmentOperator::BitwiseOrAssign,
            TokenKind::CaretEquals => AssignmentOperator::BitwiseXorAssign,
            TokenKind::AmpersandAmpersandEquals => AssignmentOperator::AndAssign,
            TokenKind::PipePipeEquals => AssignmentOperator::OrAssign,
            TokenKind::QuestionQuestionEquals => AssignmentOperator::NullishAssign,
            _ => return Err(self.unexpected()),
        };
        self.advance();
        Ok(op)
    }

    /// Reinterpret an array/object literal as a destructuring target
    fn expression_to_pattern(&self, expr: Expression, start: SourceLocation) -> Result<Pattern> {
        match expr {
            Expression::Identifier(id) => Ok(Pattern::Identifier(id)),
            Expression::Member(member) if !member.optional => Ok(Pattern::Member(member)),
            Expression::Assignment(assign)
                if assign.operator == AssignmentOperator::Assign =>
            {
                let left = match assign.left {
                    AssignmentTarget::Simple(e) => self.expression_to_pattern(e, start)?,
                    AssignmentTarget::Pattern(p) => p,
                };
                Ok(Pattern::Assignment(Box::new(AssignmentPattern {
                    left,
                    right: assign.right,
                    span: assign.span,
                })))
            }
            Expression::Array(array) => {
                let mut elements = Vec::new();
                let mut rest = None;
                let count = array.elements.len();
                for (i, element) in array.elements.into_iter().enumerate() {
                    match element {
                        Some(Expression::Spread(spread)) if i + 1 == count => {
                            rest = Some(Box::new(self.expression_to_pattern(spread.argument, start)?));
                        }
                        Some(e) => elements.push(Some(self.expression_to_pattern(e, start)?)),
                        None => elements.push(None),
                    }
                }
                Ok(Pattern::Array(ArrayPattern {
                    elements,
                    rest,
                    span: array.span,
                }))
            }
            Expression::Object(object) => {
                let mut properties = Vec::new();
                let mut rest = None;
                for prop in object.properties {
                    match prop {
                        ObjectProperty::Property { key, value, span } => {
                            properties.push(ObjectPatternProperty {
                                key,
                                value: self.expression_to_pattern(value, start)?,
                                span,
                            });
                        }
                        ObjectProperty::Spread { argument, .. } => {
                            rest = Some(Box::new(self.expression_to_pattern(argument, start)?));
                        }
                    }
                }
                Ok(Pattern::Object(ObjectPattern {
                    properties,
                    rest,
                    span: object.span,
                }))
            }
            _ => Err(self.error(messages::INVALID_LEFT_HAND_SIDE, start)),
        }
    }

    fn parse_conditional_expression(&mut self) -> Result<Expression> {
        let start = self.location();
        let test = self.parse_binary_expression(0)?;

        if self.consume(TokenKind::Question) {
            let consequent = self.allow_in(|p| p.parse_assignment_expression())?;
            self.expect(TokenKind::Colon)?;
            let alternate = self.parse_assignment_expression()?;

            return Ok(Expression::Conditional(Box::new(ConditionalExpression {
                test,
                consequent,
                alternate,
                span: Span::new(start, self.location()),
            })));
        }

        Ok(test)
    }

    /// Precedence climbing over binary and logical operators
    fn parse_binary_expression(&mut self, min_prec: u8) -> Result<Expression> {
        let start = self.location();
        let mut left = self.parse_unary_expression()?;

        loop {
            let prec = self.binary_precedence();
            if prec == 0 || prec < min_prec {
                break;
            }
            let kind = self.peek();
            self.advance();

            // `**` is right-associative
            let next_prec = if kind == TokenKind::StarStar { prec } else { prec + 1 };
            let right = self.parse_binary_expression(next_prec)?;
            let span = Span::new(start, self.location());

            left = match logical_operator(kind) {
                Some(operator) => Expression::Logical(Box::new(LogicalExpression {
                    operator,
                    left,
                    right,
                    span,
                })),
                None => match binary_operator(kind) {
                    Some(operator) => Expression::Binary(Box::new(BinaryExpression {
                        operator,
                        left,
                        right,
                        span,
                    })),
                    None => return Err(self.error("Unknown binary operator", start)),
                },
            };
        }

        Ok(left)
    }

    fn binary_precedence(&self) -> u8 {
        match self.peek() {
            TokenKind::PipePipe | TokenKind::QuestionQuestion => 4,
            TokenKind::AmpersandAmpersand => 5,
            TokenKind::Pipe => 6,
            TokenKind::Caret => 7,
            TokenKind::Ampersand => 8,
            TokenKind::EqualsEquals
            | TokenKind::BangEquals
            | TokenKind::EqualsEqualsEquals
            | TokenKind::BangEqualsEquals => 9,
            TokenKind::Less
            | TokenKind::Greater
            | TokenKind::LessEquals
            | TokenKind::GreaterEquals
            | TokenKind::Keyword(Keyword::Instanceof) => 10,
            TokenKind::Keyword(Keyword::In) if !self.flags.no_in => 10,
            TokenKind::LessLess | TokenKind::GreaterGreater | TokenKind::GreaterGreaterGreater => {
                11
            }
            TokenKind::Plus | TokenKind::Minus => 12,
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => 13,
            TokenKind::StarStar => 14,
            _ => 0,
        }
    }

    fn parse_unary_expression(&mut self) -> Result<Expression> {
        let start = self.location();

        for word in ["await", "yield"] {
            if self.at_contextual_operator(word) {
                return Err(self.unsupported(word));
            }
        }

        if matches!(self.peek(), TokenKind::PlusPlus | TokenKind::MinusMinus) {
            let operator = if self.peek() == TokenKind::PlusPlus {
                UpdateOperator::Increment
            } else {
                UpdateOperator::Decrement
            };
            self.advance();
            self.enter()?;
            let argument = self.parse_unary_expression();
            self.leave();
            let argument = argument?;
            if !argument.is_simple_assignment_target() {
                return Err(self.error(
                    "Invalid left-hand side expression in prefix operation",
                    start,
                ));
            }
            return Ok(Expression::Update(Box::new(UpdateExpression {
                operator,
                argument,
                prefix: true,
                span: Span::new(start, self.location()),
            })));
        }

        let unary_op = match self.peek() {
            TokenKind::Plus => Some(UnaryOperator::Plus),
            TokenKind::Minus => Some(UnaryOperator::Minus),
            TokenKind::Bang => Some(UnaryOperator::Not),
            TokenKind::Tilde => Some(UnaryOperator::BitwiseNot),
            TokenKind::Keyword(Keyword::Typeof) => Some(UnaryOperator::Typeof),
            TokenKind::Keyword(Keyword::Void) => Some(UnaryOperator::Void),
            TokenKind::Keyword(Keyword::Delete) => Some(UnaryOperator::Delete),
            _ => None,
        };

        if let Some(operator) = unary_op {
            self.advance();
            self.enter()?;
            let argument = self.parse_unary_expression();
            self.leave();
            return Ok(Expression::Unary(Box::new(UnaryExpression {
                operator,
                argument: argument?,
                span: Span::new(start, self.location()),
            })));
        }

        self.parse_update_expression()
    }

    fn parse_update_expression(&mut self) -> Result<Expression> {
        let start = self.location();
        let argument = self.parse_left_hand_side_expression()?;

        if matches!(self.peek(), TokenKind::PlusPlus | TokenKind::MinusMinus)
            && !self.current().newline_before
        {
            if !argument.is_simple_assignment_target() {
                return Err(self.error(
                    "Invalid left-hand side expression in postfix operation",
                    start,
                ));
            }
            let operator = if self.peek() == TokenKind::PlusPlus {
                UpdateOperator::Increment
            } else {
                UpdateOperator::Decrement
            };
            self.advance();
            return Ok(Expression::Update(Box::new(UpdateExpression {
                operator,
                argument,
                prefix: false,
                span: Span::new(start, self.location()),
            })));
        }

        Ok(argument)
    }

    fn parse_left_hand_side_expression(&mut self) -> Result<Expression> {
        let start = self.location();

        let mut expr = if self.peek() == TokenKind::Keyword(Keyword::New) {
            self.parse_new_expression()?
        } else {
            self.parse_primary_expression()?
        };

        let mut in_optional_chain = false;
        loop {
            match self.peek() {
                TokenKind::LeftParen => {
                    self.advance();
                    let arguments = self.parse_arguments()?;
                    expr = Expression::Call(Box::new(CallExpression {
                        callee: expr,
                        arguments,
                        optional: false,
                        span: Span::new(start, self.location()),
                    }));
                }
                TokenKind::Dot => {
                    self.advance();
                    let property = self.parse_identifier_name()?;
                    expr = self.member(expr, MemberProperty::Identifier(property), false, start);
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let property = self.allow_in(|p| p.parse_expression())?;
                    self.expect(TokenKind::RightBracket)?;
                    expr = self.member(
                        expr,
                        MemberProperty::Expression(Box::new(property)),
                        false,
                        start,
                    );
                }
                TokenKind::QuestionDot => {
                    self.advance();
                    in_optional_chain = true;
                    match self.peek() {
                        TokenKind::LeftParen => {
                            self.advance();
                            let arguments = self.parse_arguments()?;
                            expr = Expression::Call(Box::new(CallExpression {
                                callee: expr,
                                arguments,
                                optional: true,
                                span: Span::new(start, self.location()),
                            }));
                        }
                        TokenKind::LeftBracket => {
                            self.advance();
                            let property = self.allow_in(|p| p.parse_expression())?;
                            self.expect(TokenKind::RightBracket)?;
                            expr = self.member(
                                expr,
                                MemberProperty::Expression(Box::new(property)),
                                true,
                                start,
                            );
                        }
                        _ => {
                            let property = self.parse_identifier_name()?;
                            expr = self.member(
                                expr,
                                MemberProperty::Identifier(property),
                                true,
                                start,
                            );
                        }
                    }
                }
                TokenKind::TemplateLiteral | TokenKind::TemplateHead => {
                    let loc = self.location();
                    return Err(self.error("Tagged templates are not supported", loc));
                }
                _ => break,
            }
        }

        if in_optional_chain {
            expr = Expression::OptionalChain(Box::new(expr));
        }
        Ok(expr)
    }

    fn member(
        &self,
        object: Expression,
        property: MemberProperty,
        optional: bool,
        start: SourceLocation,
    ) -> Expression {
        Expression::Member(Box::new(MemberExpression {
            object,
            property,
            optional,
            span: Span::new(start, self.location()),
        }))
    }

    /// `new Callee(args)`; the callee is a member expression without calls
    fn parse_new_expression(&mut self) -> Result<Expression> {
        let start = self.location();
        self.expect_keyword(Keyword::New)?;

        let mut callee = if self.peek() == TokenKind::Keyword(Keyword::New) {
            self.parse_new_expression()?
        } else {
            self.parse_primary_expression()?
        };
        loop {
            match self.peek() {
                TokenKind::Dot => {
                    self.advance();
                    let property = self.parse_identifier_name()?;
                    callee = self.member(callee, MemberProperty::Identifier(property), false, start);
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let property = self.allow_in(|p| p.parse_expression())?;
                    self.expect(TokenKind::RightBracket)?;
                    callee = self.member(
                        callee,
                        MemberProperty::Expression(Box::new(property)),
                        false,
                        start,
                    );
                }
                _ => break,
            }
        }

        let arguments = if self.consume(TokenKind::LeftParen) {
            self.parse_arguments()?
        } else {
            Vec::new()
        };

        Ok(Expression::New(Box::new(CallExpression {
            callee,
            arguments,
            optional: false,
            span: Span::new(start, self.location()),
        })))
    }

    fn parse_primary_expression(&mut self) -> Result<Expression> {
        let start = self.location();

        match self.peek() {
            TokenKind::Identifier => Ok(Expression::Identifier(self.parse_identifier()?)),
            TokenKind::NumberLiteral => {
                let text = self.advance().text;
                let value = self.parse_number_value(text)?;
                Ok(self.literal(LiteralValue::Number(value), start))
            }
            TokenKind::StringLiteral => {
                let text = self.advance().text;
                let value = self.parse_string_value(text)?;
                Ok(self.literal(LiteralValue::String(value), start))
            }
            TokenKind::RegexLiteral => {
                let text = self.advance().text;
                let close = text.rfind('/').unwrap_or(0);
                let pattern = text[1..close.max(1)].to_string();
                let flags = text[close + 1..].to_string();
                if let Some(bad) = flags.chars().find(|c| !"gimsuyd".contains(*c)) {
                    return Err(self.error(
                        format!("Invalid regular expression flags '{}'", bad),
                        start,
                    ));
                }
                Ok(self.literal(LiteralValue::Regex { pattern, flags }, start))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(self.literal(LiteralValue::Boolean(true), start))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(self.literal(LiteralValue::Boolean(false), start))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Ok(self.literal(LiteralValue::Null, start))
            }
            TokenKind::Keyword(Keyword::This) => {
                self.advance();
                Ok(Expression::This(Span::new(start, self.location())))
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.allow_in(|p| p.parse_expression())?;
                self.expect(TokenKind::RightParen)?;
                Ok(expr)
            }
            TokenKind::LeftBracket => self.allow_in(|p| p.parse_array_literal()),
            TokenKind::LeftBrace => self.allow_in(|p| p.parse_object_literal()),
            TokenKind::Keyword(Keyword::Function) => {
                let func = self.allow_in(|p| p.parse_function(false))?;
                Ok(Expression::Function(Rc::new(func)))
            }
            TokenKind::TemplateLiteral | TokenKind::TemplateHead => {
                self.allow_in(|p| p.parse_template_literal())
            }
            _ => Err(self.unexpected()),
        }
    }

    fn literal(&self, value: LiteralValue, start: SourceLocation) -> Expression {
        Expression::Literal(Literal {
            value,
            span: Span::new(start, self.location()),
        })
    }

    fn parse_array_literal(&mut self) -> Result<Expression> {
        let start = self.location();
        self.expect(TokenKind::LeftBracket)?;

        let mut elements = Vec::new();
        while !self.consume(TokenKind::RightBracket) {
            if self.consume(TokenKind::Comma) {
                elements.push(None);
                continue;
            }

            elements.push(Some(self.parse_spreadable()?));

            if !self.consume(TokenKind::Comma) {
                self.expect(TokenKind::RightBracket)?;
                break;
            }
        }

        Ok(Expression::Array(ArrayExpression {
            elements,
            span: Span::new(start, self.location()),
        }))
    }

    /// An assignment expression, or `...expr` in array literals and calls
    fn parse_spreadable(&mut self) -> Result<Expression> {
        let start = self.location();
        if self.consume(TokenKind::DotDotDot) {
            let argument = self.parse_assignment_expression()?;
            return Ok(Expression::Spread(Box::new(SpreadElement {
                argument,
                span: Span::new(start, self.location()),
            })));
        }
        self.parse_assignment_expression()
    }

    fn parse_object_literal(&mut self) -> Result<Expression> {
        let start = self.location();
        self.expect(TokenKind::LeftBrace)?;

        let mut properties = Vec::new();
        while !self.consume(TokenKind::RightBrace) {
            properties.push(self.parse_object_property()?);
            if !self.consume(TokenKind::Comma) {
                self.expect(TokenKind::RightBrace)?;
                break;
            }
        }

        Ok(Expression::Object(ObjectExpression {
            properties,
            span: Span::new(start, self.location()),
        }))
    }

    fn parse_object_property(&mut self) -> Result<ObjectProperty> {
        let start = self.location();

        if self.consume(TokenKind::DotDotDot) {
            let argument = self.parse_assignment_expression()?;
            return Ok(ObjectProperty::Spread {
                argument,
                span: Span::new(start, self.location()),
            });
        }

        if (self.at_contextual("get") || self.at_contextual("set"))
            && !matches!(
                self.peek_at(1),
                TokenKind::Colon | TokenKind::LeftParen | TokenKind::Comma | TokenKind::RightBrace
            )
        {
            return Err(self.error("Getters and setters are not supported", start));
        }
        if self.at_contextual("async")
            && !matches!(
                self.peek_at(1),
                TokenKind::Colon
                    | TokenKind::LeftParen
                    | TokenKind::Comma
                    | TokenKind::RightBrace
                    | TokenKind::Equals
            )
        {
            return Err(self.unsupported("async"));
        }
        if self.peek() == TokenKind::Star {
            return Err(self.unexpected());
        }

        // Shorthand `{a}` or `{a = 1}` (the latter only valid as a pattern)
        if self.peek() == TokenKind::Identifier
            && matches!(
                self.peek_at(1),
                TokenKind::Comma | TokenKind::RightBrace | TokenKind::Equals
            )
        {
            let id = self.parse_identifier()?;
            let mut value = Expression::Identifier(id.clone());
            if self.consume(TokenKind::Equals) {
                let right = self.parse_assignment_expression()?;
                value = Expression::Assignment(Box::new(AssignmentExpression {
                    operator: AssignmentOperator::Assign,
                    left: AssignmentTarget::Simple(value),
                    right,
                    span: Span::new(start, self.location()),
                }));
            }
            return Ok(ObjectProperty::Property {
                key: PropertyKey::Identifier(id),
                value,
                span: Span::new(start, self.location()),
            });
        }

        let key = self.parse_property_key()?;

        if self.consume(TokenKind::LeftParen) {
            let params = self.parse_function_params()?;
            let body = self.parse_function_body()?;
            let id = match &key {
                PropertyKey::Identifier(id) => Some(id.clone()),
                _ => None,
            };
            let value = Expression::Function(Rc::new(Function {
                id,
                params,
                body: FunctionBody::Block(body),
                is_arrow: false,
                span: Span::new(start, self.location()),
            }));
            return Ok(ObjectProperty::Property {
                key,
                value,
                span: Span::new(start, self.location()),
            });
        }

        self.expect(TokenKind::Colon)?;
        let value = self.parse_assignment_expression()?;
        Ok(ObjectProperty::Property {
            key,
            value,
            span: Span::new(start, self.location()),
        })
    }

    fn parse_template_literal(&mut self) -> Result<Expression> {
        let start = self.location();
        let mut quasis = Vec::new();
        let mut expressions = Vec::new();

        let head = self.advance().clone();
        quasis.push(self.template_element(&head)?);

        if head.kind == TokenKind::TemplateHead {
            loop {
                expressions.push(self.parse_expression()?);
                self.expect(TokenKind::RightBrace)?;
                let part = self.current().clone();
                match part.kind {
                    TokenKind::TemplateMiddle => {
                        self.advance();
                        quasis.push(self.template_element(&part)?);
                    }
                    TokenKind::TemplateTail => {
                        self.advance();
                        quasis.push(self.template_element(&part)?);
                        break;
                    }
                    _ => return Err(self.unexpected()),
                }
            }
        }

        Ok(Expression::TemplateLiteral(TemplateLiteral {
            quasis,
            expressions,
            span: Span::new(start, self.location()),
        }))
    }

    fn template_element(&self, token: &Token<'src>) -> Result<TemplateElement> {
        let text = token.text;
        let text = text.strip_prefix('`').unwrap_or(text);
        let text = text
            .strip_suffix("${")
            .or_else(|| text.strip_suffix('`'))
            .unwrap_or(text);
        Ok(TemplateElement {
            cooked: self.unescape(text, token.location)?,
            span: Span::new(token.location, token.location),
        })
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expression>> {
        self.allow_in(|p| {
            let mut args = Vec::new();
            while !p.consume(TokenKind::RightParen) {
                args.push(p.parse_spreadable()?);
                if !p.consume(TokenKind::Comma) {
                    p.expect(TokenKind::RightParen)?;
                    break;
                }
            }
            Ok(args)
        })
    }

    // ========== Helpers ==========

    fn parse_identifier(&mut self) -> Result<Identifier> {
        if self.peek() != TokenKind::Identifier {
            return Err(self.unexpected());
        }
        let token = self.advance();
        let (name, location) = (token.text.to_string(), token.location);
        Ok(Identifier {
            name,
            span: Span::new(location, self.location()),
        })
    }

    /// Identifier or keyword, as allowed after `.` and as property keys
    fn parse_identifier_name(&mut self) -> Result<Identifier> {
        match self.peek() {
            TokenKind::Identifier | TokenKind::Keyword(_) => {
                let token = self.advance();
                let (name, location) = (token.text.to_string(), token.location);
                Ok(Identifier {
                    name,
                    span: Span::new(location, self.location()),
                })
            }
            _ => Err(self.unexpected()),
        }
    }

    fn parse_string_value(&self, text: &str) -> Result<String> {
        self.unescape(&text[1..text.len() - 1], self.location())
    }

    /// Process escape sequences in string and template text
    fn unescape(&self, inner: &str, location: SourceLocation) -> Result<String> {
        let mut result = String::with_capacity(inner.len());
        let mut chars = inner.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '\\' {
                result.push(c);
                continue;
            }
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some('b') => result.push('\u{8}'),
                Some('f') => result.push('\u{c}'),
                Some('v') => result.push('\u{b}'),
                Some('0') => result.push('\0'),
                Some('\n') => {}
                Some('\r') => {
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                }
                Some('x') => {
                    let hex: String = chars.by_ref().take(2).collect();
                    let code = u32::from_str_radix(&hex, 16)
                        .map_err(|_| self.error("Invalid hexadecimal escape sequence", location))?;
                    result.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                }
                Some('u') => {
                    let hex: String = if chars.peek() == Some(&'{') {
                        chars.next();
                        chars.by_ref().take_while(|&c| c != '}').collect()
                    } else {
                        chars.by_ref().take(4).collect()
                    };
                    let code = u32::from_str_radix(&hex, 16)
                        .map_err(|_| self.error("Invalid Unicode escape sequence", location))?;
                    // Lone surrogates have no UTF-8 form
                    result.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                }
                Some(other) => result.push(other),
                None => {}
            }
        }

        Ok(result)
    }

    fn parse_number_value(&self, text: &str) -> Result<f64> {
        let clean: String = text.chars().filter(|&c| c != '_').collect();
        let radix = match clean.get(..2) {
            Some("0x") | Some("0X") => 16,
            Some("0b") | Some("0B") => 2,
            Some("0o") | Some("0O") => 8,
            _ => 10,
        };

        if radix != 10 {
            let digits = &clean[2..];
            if digits.is_empty() {
                return Err(self.error("Invalid or unexpected token", self.location()));
            }
            return Ok(digits
                .chars()
                .filter_map(|c| c.to_digit(radix))
                .fold(0.0, |acc, d| acc * radix as f64 + d as f64));
        }

        lexical_core::parse::<f64>(clean.as_bytes())
            .ok()
            .or_else(|| clean.parse::<f64>().ok())
            .ok_or_else(|| self.error(format!("Invalid number: {}", text), self.location()))
    }
}

/// Result of parsing a `for (...)` head
enum ForHead {
    Init(Option<ForInit>),
    Each { left: ForInLeft, of: bool },
}

fn logical_operator(kind: TokenKind) -> Option<LogicalOperator> {
    match kind {
        TokenKind::AmpersandAmpersand => Some(LogicalOperator::And),
        TokenKind::PipePipe => Some(LogicalOperator::Or),
        TokenKind::QuestionQuestion => Some(LogicalOperator::NullishCoalescing),
        _ => None,
    }
}

fn binary_operator(kind: TokenKind) -> Option<BinaryOperator> {
    let op = match kind {
        TokenKind::Plus => BinaryOperator::Add,
        TokenKind::Minus => BinaryOperator::Sub,
        TokenKind::Star => BinaryOperator::Mul,
        TokenKind::Slash => BinaryOperator::Div,
        TokenKind::Percent => BinaryOperator::Mod,
        TokenKind::StarStar => BinaryOperator::Pow,
        TokenKind::EqualsEquals => BinaryOperator::Eq,
        TokenKind::BangEquals => BinaryOperator::Ne,
        TokenKind::EqualsEqualsEquals => BinaryOperator::StrictEq,
        TokenKind::BangEqualsEquals => BinaryOperator::StrictNe,
        TokenKind::Less => BinaryOperator::Lt,
        TokenKind::LessEquals => BinaryOperator::Le,
        TokenKind::Greater => BinaryOperator::Gt,
        TokenKind::GreaterEquals => BinaryOperator::Ge,
        TokenKind::LessLess => BinaryOperator::Shl,
        TokenKind::GreaterGreater => BinaryOperator::Shr,
        TokenKind::GreaterGreaterGreater => BinaryOperator::UShr,
        TokenKind::Ampersand => BinaryOperator::BitwiseAnd,
        TokenKind::Pipe => BinaryOperator::BitwiseOr,
        TokenKind::Caret => BinaryOperator::BitwiseXor,
        TokenKind::Keyword(Keyword::In) => BinaryOperator::In,
        TokenKind::Keyword(Keyword::Instanceof) => BinaryOperator::Instanceof,
        _ => return None,
    };
    Some(op)
}

/// Parse learner code as a function body
pub fn parse(source: &str) -> Result<Program> {
    Parser::new(source)?.parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_expression(source: &str) -> Expression {
        let program = parse(source).unwrap();
        match program.body.into_iter().next() {
            Some(Statement::Expression(stmt)) => stmt.expression,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_function_declaration() {
        let program = parse("function add(a, b) { return a + b; }").unwrap();
        match &program.body[0] {
            Statement::FunctionDeclaration(func) => {
                assert_eq!(func.name(), "add");
                assert_eq!(func.params.params.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_top_level_return_is_allowed() {
        assert!(parse("return 42;").is_ok());
    }

    #[test]
    fn test_missing_brace_is_syntax_error() {
        let err = parse("function add(a,b){return a+b").unwrap_err();
        assert!(err.is_syntax_error());
        assert!(err.message().starts_with("Unexpected end of input"));
    }

    #[test]
    fn test_garbage_is_syntax_error() {
        assert!(parse("this is not valid js{{{").is_err());
    }

    #[test]
    fn test_precedence() {
        match first_expression("1 + 2 * 3") {
            Expression::Binary(bin) => {
                assert_eq!(bin.operator, BinaryOperator::Add);
                assert!(matches!(bin.right, Expression::Binary(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_exponent_is_right_associative() {
        match first_expression("2 ** 3 ** 2") {
            Expression::Binary(bin) => {
                assert!(matches!(bin.left, Expression::Literal(_)));
                assert!(matches!(bin.right, Expression::Binary(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_arrow_functions() {
        for source in ["x => x * 2", "(a, b) => a + b", "() => ({})", "({a}, [b]) => a + b"] {
            match first_expression(source) {
                Expression::Function(func) => assert!(func.is_arrow),
                other => panic!("{}: unexpected {:?}", source, other),
            }
        }
    }

    #[test]
    fn test_parenthesized_expression_is_not_arrow() {
        assert!(matches!(first_expression("(a + b) * c"), Expression::Binary(_)));
    }

    #[test]
    fn test_destructuring_assignment() {
        match first_expression("[a, b] = [b, a]") {
            Expression::Assignment(assign) => {
                assert!(matches!(assign.left, AssignmentTarget::Pattern(Pattern::Array(_))));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_for_of_and_for_in() {
        let program = parse("for (const [k, v] of Object.entries(o)) {} for (k in o) {}").unwrap();
        assert!(matches!(program.body[0], Statement::ForOf(_)));
        assert!(matches!(program.body[1], Statement::ForIn(_)));
    }

    #[test]
    fn test_for_with_in_inside_parens() {
        let program = parse("for (let i = ('a' in o) ? 1 : 0; i < 3; i++) {}").unwrap();
        assert!(matches!(program.body[0], Statement::For(_)));
    }

    #[test]
    fn test_optional_chain_wraps_whole_chain() {
        assert!(matches!(
            first_expression("a?.b.c"),
            Expression::OptionalChain(_)
        ));
    }

    #[test]
    fn test_template_literal_parts() {
        match first_expression("`Hello, ${first} ${last}!`") {
            Expression::TemplateLiteral(t) => {
                assert_eq!(t.quasis.len(), 3);
                assert_eq!(t.expressions.len(), 2);
                assert_eq!(t.quasis[0].cooked, "Hello, ");
                assert_eq!(t.quasis[2].cooked, "!");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_return_followed_by_newline() {
        let program = parse("function f() { return\n42 }").unwrap();
        let Statement::FunctionDeclaration(func) = &program.body[0] else {
            panic!("expected function");
        };
        let FunctionBody::Block(block) = &func.body else {
            panic!("expected block");
        };
        assert!(matches!(
            &block.body[0],
            Statement::Return(ReturnStatement { argument: None, .. })
        ));
    }

    #[test]
    fn test_illegal_break() {
        assert!(parse("break;").is_err());
        assert!(parse("while (true) { break; }").is_ok());
    }

    #[test]
    fn test_unsupported_features_are_reported() {
        let err = parse("class A {}").unwrap_err();
        assert!(err.message().contains("'class' is not supported"));
        assert!(parse("function* gen() {}").is_err());
    }

    #[test]
    fn test_async_words_are_contextual() {
        assert!(parse("const async = 5; const await = 1; return async + await;").is_ok());
        assert!(parse("let yield = 2; yield += 1; return { async, yield };").is_ok());
        assert!(parse("function async(x) { return x; } return async(1);").is_ok());

        for (source, word) in [
            ("async function f() {}", "async"),
            ("const f = async () => 1;", "async"),
            ("const f = async x => x;", "async"),
            ("list.map(async function (x) { return x; });", "async"),
            ("const o = { async load() {} };", "async"),
            ("const x = await fetch();", "await"),
            ("for await (const x of xs) {}", "await"),
            ("yield value;", "yield"),
        ] {
            let err = parse(source).unwrap_err();
            assert!(
                err.message().contains(&format!("'{}' is not supported", word)),
                "{}: {}",
                source,
                err
            );
        }
    }

    #[test]
    fn test_const_requires_initializer() {
        assert!(parse("const x;").is_err());
        assert!(parse("let x;").is_ok());
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let source = format!("{}1{}", "(".repeat(500), ")".repeat(500));
        let err = parse(&source).unwrap_err();
        assert!(err.message().contains("nested too deeply"));

        let unary = format!("{}x", "!".repeat(500));
        assert!(parse(&unary).unwrap_err().message().contains("nested too deeply"));
        let prefix = format!("{}x", "++".repeat(500));
        assert!(parse(&prefix).unwrap_err().message().contains("nested too deeply"));
        let pattern = format!("const {}a{} = x;", "[".repeat(500), "]".repeat(500));
        assert!(parse(&pattern).unwrap_err().message().contains("nested too deeply"));
    }

    #[test]
    fn test_nesting_up_to_the_limit_parses() {
        // statement and expression entries take two levels before the parens
        let parens = MAX_NESTING_DEPTH - 2;
        let source = format!("{}1{}", "(".repeat(parens), ")".repeat(parens));
        assert!(parse(&source).is_ok());
        let source = format!("{}1{}", "(".repeat(parens + 1), ")".repeat(parens + 1));
        assert!(parse(&source).is_err());
    }

    #[test]
    fn test_regex_literal() {
        match first_expression("/^[a-z]+$/i") {
            Expression::Literal(Literal {
                value: LiteralValue::Regex { pattern, flags },
                ..
            }) => {
                assert_eq!(pattern, "^[a-z]+$");
                assert_eq!(flags, "i");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_number_literals() {
        for (source, expected) in [("0xff", 255.0), ("0b101", 5.0), ("1_000", 1000.0), (".5", 0.5)]
        {
            match first_expression(source) {
                Expression::Literal(Literal {
                    value: LiteralValue::Number(n),
                    ..
                }) => assert_eq!(n, expected, "{}", source),
                other => panic!("unexpected {:?}", other),
            }
        }
    }
}
