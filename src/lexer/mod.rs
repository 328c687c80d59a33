//! Tokenizer for learner code
//!
//! Produces a flat token stream for the parser. Template literals are split
//! into head/middle/tail pieces around their substitutions, and regular
//! expression literals are recognized from the preceding token.

mod token;

pub use token::{Keyword, Token, TokenKind};

use crate::error::{Error, Result, SourceLocation};

/// A lexer for JavaScript source code
pub struct Lexer<'src> {
    source: &'src str,
    bytes: &'src [u8],
    /// Current position in bytes
    pos: usize,
    /// Current line number (1-indexed)
    line: u32,
    /// Current column number (1-indexed)
    column: u32,
    /// Kind of the last token produced, used to disambiguate `/`
    last_kind: Option<TokenKind>,
    /// Whether a line terminator was skipped before the current token
    saw_newline: bool,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source code
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            last_kind: None,
            saw_newline: false,
        }
    }

    fn location(&self) -> SourceLocation {
        SourceLocation {
            line: self.line,
            column: self.column,
            offset: self.pos,
        }
    }

    fn error(&self, message: impl Into<String>, location: SourceLocation) -> Error {
        Error::lexer_error_with_context(message, location, self.source)
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        let mut chars = self.source[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
            self.saw_newline = true;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<()> {
        loop {
            while let Some(c) = self.peek() {
                if c.is_whitespace() || c == '\u{feff}' {
                    self.advance();
                } else {
                    break;
                }
            }

            if self.peek() == Some('/') {
                if self.peek_next() == Some('/') {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                    continue;
                } else if self.peek_next() == Some('*') {
                    let start_loc = self.location();
                    self.advance();
                    self.advance();
                    loop {
                        match self.peek() {
                            None => return Err(self.error("Unterminated comment", start_loc)),
                            Some('*') if self.peek_next() == Some('/') => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            _ => {
                                self.advance();
                            }
                        }
                    }
                    continue;
                }
            }

            return Ok(());
        }
    }

    fn is_id_start(c: char) -> bool {
        c == '_' || c == '$' || unicode_xid::UnicodeXID::is_xid_start(c)
    }

    fn is_id_continue(c: char) -> bool {
        c == '_' || c == '$' || unicode_xid::UnicodeXID::is_xid_continue(c)
    }

    fn token(&self, kind: TokenKind, start: usize, location: SourceLocation) -> Token<'src> {
        Token {
            kind,
            text: &self.source[start..self.pos],
            location,
            newline_before: false,
        }
    }

    fn scan_identifier(&mut self) -> Token<'src> {
        let start = self.pos;
        let start_loc = self.location();

        while let Some(c) = self.peek() {
            if Self::is_id_continue(c) {
                self.advance();
            } else {
                break;
            }
        }

        let kind = match Keyword::from_str(&self.source[start..self.pos]) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Identifier,
        };
        self.token(kind, start, start_loc)
    }

    fn eat_digits(&mut self, accept: impl Fn(char) -> bool) {
        while let Some(c) = self.peek() {
            if accept(c) || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn scan_number(&mut self) -> Result<Token<'src>> {
        let start = self.pos;
        let start_loc = self.location();

        if self.peek() == Some('0') {
            match self.peek_next() {
                Some('x') | Some('X') => {
                    self.advance();
                    self.advance();
                    self.eat_digits(|c| c.is_ascii_hexdigit());
                    return self.finish_number(start, start_loc);
                }
                Some('b') | Some('B') => {
                    self.advance();
                    self.advance();
                    self.eat_digits(|c| c == '0' || c == '1');
                    return self.finish_number(start, start_loc);
                }
                Some('o') | Some('O') => {
                    self.advance();
                    self.advance();
                    self.eat_digits(|c| ('0'..='7').contains(&c));
                    return self.finish_number(start, start_loc);
                }
                _ => {}
            }
        }

        self.eat_digits(|c| c.is_ascii_digit());

        if self.peek() == Some('.') {
            self.advance();
            self.eat_digits(|c| c.is_ascii_digit());
        }

        if matches!(self.peek(), Some('e') | Some('E')) {
            self.advance();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.advance();
            }
            if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
                return Err(self.error("Invalid or unexpected token", start_loc));
            }
            self.eat_digits(|c| c.is_ascii_digit());
        }

        self.finish_number(start, start_loc)
    }

    fn finish_number(&mut self, start: usize, start_loc: SourceLocation) -> Result<Token<'src>> {
        if self.peek() == Some('n') {
            return Err(self.error("BigInt literals are not supported", start_loc));
        }
        if self.peek().is_some_and(Self::is_id_start) {
            return Err(self.error("Invalid or unexpected token", start_loc));
        }
        Ok(self.token(TokenKind::NumberLiteral, start, start_loc))
    }

    fn scan_string(&mut self, quote: char) -> Result<Token<'src>> {
        let start = self.pos;
        let start_loc = self.location();
        self.advance();

        loop {
            match self.peek() {
                None | Some('\n') | Some('\r') => {
                    return Err(self.error("Invalid or unexpected token", start_loc));
                }
                Some('\\') => {
                    self.advance();
                    self.advance();
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                _ => {
                    self.advance();
                }
            }
        }

        Ok(self.token(TokenKind::StringLiteral, start, start_loc))
    }

    /// Scan template text up to a substitution or the closing backtick
    fn scan_template_part(&mut self, continuation: bool) -> Result<Token<'src>> {
        let start = self.pos;
        let start_loc = self.location();
        if !continuation {
            self.advance();
        }

        let mut has_substitution = false;
        loop {
            match self.peek() {
                None => return Err(self.error("Unterminated template literal", start_loc)),
                Some('\\') => {
                    self.advance();
                    self.advance();
                }
                Some('$') if self.peek_next() == Some('{') => {
                    self.advance();
                    self.advance();
                    has_substitution = true;
                    break;
                }
                Some('`') => {
                    self.advance();
                    break;
                }
                _ => {
                    self.advance();
                }
            }
        }

        let kind = match (continuation, has_substitution) {
            (false, true) => TokenKind::TemplateHead,
            (false, false) => TokenKind::TemplateLiteral,
            (true, true) => TokenKind::TemplateMiddle,
            (true, false) => TokenKind::TemplateTail,
        };
        Ok(self.token(kind, start, start_loc))
    }

    fn scan_regex(&mut self) -> Result<Token<'src>> {
        let start = self.pos;
        let start_loc = self.location();
        self.advance();

        let mut in_class = false;
        loop {
            match self.peek() {
                None | Some('\n') | Some('\r') => {
                    return Err(self.error(
                        "Invalid regular expression: missing /",
                        start_loc,
                    ));
                }
                Some('\\') => {
                    self.advance();
                    self.advance();
                }
                Some('[') => {
                    in_class = true;
                    self.advance();
                }
                Some(']') => {
                    in_class = false;
                    self.advance();
                }
                Some('/') if !in_class => {
                    self.advance();
                    break;
                }
                _ => {
                    self.advance();
                }
            }
        }

        while let Some(c) = self.peek() {
            if Self::is_id_continue(c) {
                self.advance();
            } else {
                break;
            }
        }

        Ok(self.token(TokenKind::RegexLiteral, start, start_loc))
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Result<Token<'src>> {
        self.saw_newline = false;
        self.skip_whitespace_and_comments()?;
        let newline_before = self.saw_newline;

        let mut token = self.scan_token()?;
        token.newline_before = newline_before;
        self.last_kind = Some(token.kind);
        Ok(token)
    }

    fn scan_token(&mut self) -> Result<Token<'src>> {
        let start_loc = self.location();
        let start = self.pos;
        let c = match self.peek() {
            Some(c) => c,
            None => return Ok(self.token(TokenKind::Eof, start, start_loc)),
        };

        if Self::is_id_start(c) {
            return Ok(self.scan_identifier());
        }

        if c.is_ascii_digit() || (c == '.' && self.peek_next().is_some_and(|n| n.is_ascii_digit()))
        {
            return self.scan_number();
        }

        if c == '"' || c == '\'' {
            return self.scan_string(c);
        }

        if c == '`' {
            return self.scan_template_part(false);
        }

        if c == '/' && !self.last_kind.is_some_and(|k| k.ends_operand()) {
            return self.scan_regex();
        }

        self.advance();

        let kind = match c {
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '~' => TokenKind::Tilde,
            '?' => {
                if self.peek() == Some('.') && self.peek_next().is_none_or(|c| !c.is_ascii_digit())
                {
                    self.advance();
                    TokenKind::QuestionDot
                } else if self.peek() == Some('?') {
                    self.advance();
                    self.with_equals(TokenKind::QuestionQuestion, TokenKind::QuestionQuestionEquals)
                } else {
                    TokenKind::Question
                }
            }
            '.' => {
                if self.peek() == Some('.') && self.peek_next() == Some('.') {
                    self.advance();
                    self.advance();
                    TokenKind::DotDotDot
                } else {
                    TokenKind::Dot
                }
            }
            '+' => {
                if self.peek() == Some('+') {
                    self.advance();
                    TokenKind::PlusPlus
                } else {
                    self.with_equals(TokenKind::Plus, TokenKind::PlusEquals)
                }
            }
            '-' => {
                if self.peek() == Some('-') {
                    self.advance();
                    TokenKind::MinusMinus
                } else {
                    self.with_equals(TokenKind::Minus, TokenKind::MinusEquals)
                }
            }
            '*' => {
                if self.peek() == Some('*') {
                    self.advance();
                    self.with_equals(TokenKind::StarStar, TokenKind::StarStarEquals)
                } else {
                    self.with_equals(TokenKind::Star, TokenKind::StarEquals)
                }
            }
            '/' => self.with_equals(TokenKind::Slash, TokenKind::SlashEquals),
            '%' => self.with_equals(TokenKind::Percent, TokenKind::PercentEquals),
            '<' => {
                if self.peek() == Some('<') {
                    self.advance();
                    self.with_equals(TokenKind::LessLess, TokenKind::LessLessEquals)
                } else {
                    self.with_equals(TokenKind::Less, TokenKind::LessEquals)
                }
            }
            '>' => {
                if self.peek() == Some('>') {
                    self.advance();
                    if self.peek() == Some('>') {
                        self.advance();
                        self.with_equals(
                            TokenKind::GreaterGreaterGreater,
                            TokenKind::GreaterGreaterGreaterEquals,
                        )
                    } else {
                        self.with_equals(TokenKind::GreaterGreater, TokenKind::GreaterGreaterEquals)
                    }
                } else {
                    self.with_equals(TokenKind::Greater, TokenKind::GreaterEquals)
                }
            }
            '=' => {
                if self.peek() == Some('=') {
                    self.advance();
                    self.with_equals(TokenKind::EqualsEquals, TokenKind::EqualsEqualsEquals)
                } else if self.peek() == Some('>') {
                    self.advance();
                    TokenKind::Arrow
                } else {
                    TokenKind::Equals
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.advance();
                    self.with_equals(TokenKind::BangEquals, TokenKind::BangEqualsEquals)
                } else {
                    TokenKind::Bang
                }
            }
            '&' => {
                if self.peek() == Some('&') {
                    self.advance();
                    self.with_equals(
                        TokenKind::AmpersandAmpersand,
                        TokenKind::AmpersandAmpersandEquals,
                    )
                } else {
                    self.with_equals(TokenKind::Ampersand, TokenKind::AmpersandEquals)
                }
            }
            '|' => {
                if self.peek() == Some('|') {
                    self.advance();
                    self.with_equals(TokenKind::PipePipe, TokenKind::PipePipeEquals)
                } else {
                    self.with_equals(TokenKind::Pipe, TokenKind::PipeEquals)
                }
            }
            '^' => self.with_equals(TokenKind::Caret, TokenKind::CaretEquals),
            _ => {
                return Err(self.error(format!("Invalid or unexpected token '{}'", c), start_loc));
            }
        };

        Ok(self.token(kind, start, start_loc))
    }

    /// Pick the compound-assignment form when the next character is `=`
    fn with_equals(&mut self, plain: TokenKind, compound: TokenKind) -> TokenKind {
        if self.peek() == Some('=') {
            self.advance();
            compound
        } else {
            plain
        }
    }

    /// Tokenize the entire source into a vector of tokens
    pub fn tokenize(&mut self) -> Result<Vec<Token<'src>>> {
        let mut tokens = Vec::new();
        // One brace counter per open template substitution
        let mut brace_depth_stack: Vec<u32> = Vec::new();

        loop {
            let token = self.next_token()?;
            let kind = token.kind;
            tokens.push(token);

            match kind {
                TokenKind::TemplateHead => brace_depth_stack.push(0),
                TokenKind::LeftBrace => {
                    if let Some(depth) = brace_depth_stack.last_mut() {
                        *depth += 1;
                    }
                }
                TokenKind::RightBrace => match brace_depth_stack.last_mut() {
                    Some(0) => {
                        let continuation = self.scan_template_part(true)?;
                        if continuation.kind == TokenKind::TemplateTail {
                            brace_depth_stack.pop();
                        }
                        self.last_kind = Some(continuation.kind);
                        tokens.push(continuation);
                    }
                    Some(depth) => *depth -= 1,
                    None => {}
                },
                TokenKind::Eof => break,
                _ => {}
            }
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_empty_source() {
        let mut lexer = Lexer::new("");
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn test_identifiers_and_keywords() {
        let mut lexer = Lexer::new("foo _private $el const of");
        assert_eq!(lexer.next_token().unwrap().text, "foo");
        assert_eq!(lexer.next_token().unwrap().text, "_private");
        assert_eq!(lexer.next_token().unwrap().text, "$el");
        assert_eq!(
            lexer.next_token().unwrap().kind,
            TokenKind::Keyword(Keyword::Const)
        );
        // `of` is contextual and stays an identifier
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Identifier);
    }

    #[test]
    fn test_numbers() {
        let mut lexer = Lexer::new("42 3.14 0xFF 0b1010 1e10 .5 1_000");
        for expected in ["42", "3.14", "0xFF", "0b1010", "1e10", ".5", "1_000"] {
            let token = lexer.next_token().unwrap();
            assert_eq!(token.kind, TokenKind::NumberLiteral);
            assert_eq!(token.text, expected);
        }
    }

    #[test]
    fn test_bigint_rejected() {
        assert!(Lexer::new("10n").tokenize().is_err());
    }

    #[test]
    fn test_strings() {
        let mut lexer = Lexer::new(r#""hello" 'world' "with \"escape""#);
        assert_eq!(lexer.next_token().unwrap().text, r#""hello""#);
        assert_eq!(lexer.next_token().unwrap().text, "'world'");
        assert_eq!(lexer.next_token().unwrap().text, r#""with \"escape""#);
    }

    #[test]
    fn test_unterminated_string() {
        assert!(Lexer::new("'abc").tokenize().is_err());
    }

    #[test]
    fn test_regex_versus_division() {
        assert_eq!(
            kinds("a / b"),
            vec![
                TokenKind::Identifier,
                TokenKind::Slash,
                TokenKind::Identifier,
                TokenKind::Eof
            ]
        );
        let tokens = Lexer::new("s.replace(/[aeiou]/gi, '')").tokenize().unwrap();
        let regex = tokens
            .iter()
            .find(|t| t.kind == TokenKind::RegexLiteral)
            .unwrap();
        assert_eq!(regex.text, "/[aeiou]/gi");
    }

    #[test]
    fn test_template_with_nested_braces() {
        assert_eq!(
            kinds("`a${ {x: 1}.x }b`"),
            vec![
                TokenKind::TemplateHead,
                TokenKind::LeftBrace,
                TokenKind::Identifier,
                TokenKind::Colon,
                TokenKind::NumberLiteral,
                TokenKind::RightBrace,
                TokenKind::Dot,
                TokenKind::Identifier,
                TokenKind::RightBrace,
                TokenKind::TemplateTail,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_newline_tracking() {
        let tokens = Lexer::new("a\nb c").tokenize().unwrap();
        assert!(!tokens[0].newline_before);
        assert!(tokens[1].newline_before);
        assert!(!tokens[2].newline_before);
    }

    #[test]
    fn test_comments() {
        let mut lexer = Lexer::new("foo // comment\nbar /* block */ baz");
        assert_eq!(lexer.next_token().unwrap().text, "foo");
        assert_eq!(lexer.next_token().unwrap().text, "bar");
        assert_eq!(lexer.next_token().unwrap().text, "baz");
    }

    #[test]
    fn test_unterminated_comment() {
        assert!(Lexer::new("/* never closed").tokenize().is_err());
    }
}
