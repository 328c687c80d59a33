//! Token definitions for the lexer

use std::fmt;

use crate::error::SourceLocation;

/// One lexeme, borrowing its text from the source
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'src> {
    pub kind: TokenKind,
    pub text: &'src str,
    /// Where the lexeme starts
    pub location: SourceLocation,
    /// Whether a line terminator precedes this token (drives semicolon insertion)
    pub newline_before: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    NumberLiteral,
    StringLiteral,
    /// Whole template without substitutions
    TemplateLiteral,
    /// Template text up to the first `${`
    TemplateHead,
    /// Template text between `}` and the next `${`
    TemplateMiddle,
    /// Template text after the last `}`
    TemplateTail,
    /// `/pattern/flags`
    RegexLiteral,

    Identifier,
    Keyword(Keyword),

    // Punctuators
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Dot,
    DotDotDot,
    Semicolon,
    Comma,
    Colon,
    Question,
    QuestionDot,
    QuestionQuestion,
    QuestionQuestionEquals,

    // Arithmetic
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,

    // Comparison
    Less,
    Greater,
    LessEquals,
    GreaterEquals,
    EqualsEquals,
    EqualsEqualsEquals,
    BangEquals,
    BangEqualsEquals,

    // Bitwise
    Ampersand,
    Pipe,
    Caret,
    Tilde,
    LessLess,
    GreaterGreater,
    GreaterGreaterGreater,

    // Logical
    Bang,
    AmpersandAmpersand,
    PipePipe,

    // Assignment
    Equals,
    PlusEquals,
    MinusEquals,
    StarEquals,
    StarStarEquals,
    SlashEquals,
    PercentEquals,
    LessLessEquals,
    GreaterGreaterEquals,
    GreaterGreaterGreaterEquals,
    AmpersandEquals,
    PipeEquals,
    CaretEquals,
    AmpersandAmpersandEquals,
    PipePipeEquals,

    /// `=>`
    Arrow,

    /// End of input
    Eof,
}

macro_rules! keywords {
    ($($variant:ident => $text:literal),* $(,)?) => {
        /// Reserved words recognized by the lexer
        ///
        /// Words for features the interpreter does not run (`class`, `import`,
        /// ...) are still reserved so the parser can reject them with a precise
        /// message instead of misreading them as identifiers. `async`, `await`
        /// and `yield` are plain identifiers outside async functions and
        /// generators, so they lex as identifiers and the parser rejects them
        /// only where they act as operators.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum Keyword {
            $($variant,)*
        }

        impl Keyword {
            /// Look up a keyword by its source text
            pub fn from_str(text: &str) -> Option<Keyword> {
                match text {
                    $($text => Some(Keyword::$variant),)*
                    _ => None,
                }
            }

            /// Source spelling
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Keyword::$variant => $text,)*
                }
            }
        }
    };
}

keywords! {
    Break => "break", Case => "case",
    Catch => "catch", Class => "class", Const => "const", Continue => "continue",
    Debugger => "debugger", Default => "default", Delete => "delete", Do => "do",
    Else => "else", Enum => "enum", Export => "export", Extends => "extends",
    False => "false", Finally => "finally", For => "for", Function => "function",
    If => "if", Import => "import", In => "in", Instanceof => "instanceof",
    Let => "let", New => "new", Null => "null", Return => "return",
    Super => "super", Switch => "switch", This => "this", Throw => "throw",
    True => "true", Try => "try", Typeof => "typeof", Var => "var",
    Void => "void", While => "while", With => "with",
}

impl Keyword {
    /// Keywords that name language features the interpreter rejects
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Keyword::Class
                | Keyword::Enum
                | Keyword::Export
                | Keyword::Extends
                | Keyword::Import
                | Keyword::Super
                | Keyword::With
        )
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TokenKind {
    /// `=` and the compound assignments
    pub fn is_assignment_operator(&self) -> bool {
        matches!(
            self,
            TokenKind::Equals
                | TokenKind::PlusEquals
                | TokenKind::MinusEquals
                | TokenKind::StarEquals
                | TokenKind::StarStarEquals
                | TokenKind::SlashEquals
                | TokenKind::PercentEquals
                | TokenKind::LessLessEquals
                | TokenKind::GreaterGreaterEquals
                | TokenKind::GreaterGreaterGreaterEquals
                | TokenKind::AmpersandEquals
                | TokenKind::PipeEquals
                | TokenKind::CaretEquals
                | TokenKind::AmpersandAmpersandEquals
                | TokenKind::PipePipeEquals
                | TokenKind::QuestionQuestionEquals
        )
    }

    /// Whether a `/` following this token starts a division rather than a regex
    pub fn ends_operand(&self) -> bool {
        matches!(
            self,
            TokenKind::Identifier
                | TokenKind::NumberLiteral
                | TokenKind::StringLiteral
                | TokenKind::TemplateLiteral
                | TokenKind::TemplateTail
                | TokenKind::RegexLiteral
                | TokenKind::RightParen
                | TokenKind::RightBracket
                | TokenKind::RightBrace
                | TokenKind::PlusPlus
                | TokenKind::MinusMinus
                | TokenKind::Keyword(Keyword::This)
                | TokenKind::Keyword(Keyword::True)
                | TokenKind::Keyword(Keyword::False)
                | TokenKind::Keyword(Keyword::Null)
        )
    }
}
