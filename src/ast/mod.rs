//! Syntax tree for learner code
//!
//! The node layout follows ESTree closely. Functions are reference-counted so
//! closures can share their definition with the tree instead of copying it.

mod expr;
mod pattern;
mod stmt;

pub use expr::*;
pub use pattern::*;
pub use stmt::*;

use std::rc::Rc;

use crate::error::SourceLocation;

/// A span in the source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: SourceLocation,
    pub end: SourceLocation,
}

impl Span {
    pub fn new(start: SourceLocation, end: SourceLocation) -> Self {
        Self { start, end }
    }

    /// Merge two spans into one covering both
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: if self.start.offset < other.start.offset {
                self.start
            } else {
                other.start
            },
            end: if self.end.offset > other.end.offset {
                self.end
            } else {
                other.end
            },
        }
    }
}

/// A parsed unit of learner code, run as the body of a function
#[derive(Debug, Clone)]
pub struct Program {
    pub body: Vec<Statement>,
    pub span: Span,
}

/// A JavaScript identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    pub name: String,
    pub span: Span,
}

impl Identifier {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

/// Variable declaration kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Var,
    Let,
    Const,
}

/// A single variable declarator (id = init)
#[derive(Debug, Clone)]
pub struct VariableDeclarator {
    pub id: Pattern,
    pub init: Option<Expression>,
    pub span: Span,
}

/// A variable declaration (let x = 1, y = 2)
#[derive(Debug, Clone)]
pub struct VariableDeclaration {
    pub kind: VariableKind,
    pub declarations: Vec<VariableDeclarator>,
    pub span: Span,
}

/// Function parameters
#[derive(Debug, Clone, Default)]
pub struct FunctionParams {
    /// Regular parameters, possibly with defaults or destructuring
    pub params: Vec<Pattern>,
    /// Rest parameter (...args)
    pub rest: Option<Box<Pattern>>,
}

/// A function declaration, expression, arrow or object method
#[derive(Debug, Clone)]
pub struct Function {
    pub id: Option<Identifier>,
    pub params: FunctionParams,
    pub body: FunctionBody,
    /// Arrows take `this` and `arguments` from the enclosing function
    pub is_arrow: bool,
    pub span: Span,
}

impl Function {
    pub fn name(&self) -> &str {
        self.id.as_ref().map(|id| id.name.as_str()).unwrap_or("")
    }
}

/// Function body: a block, or a single expression for concise arrows
#[derive(Debug, Clone)]
pub enum FunctionBody {
    Block(BlockStatement),
    Expression(Box<Expression>),
}

/// Property key in object literals and patterns
#[derive(Debug, Clone)]
pub enum PropertyKey {
    Identifier(Identifier),
    String(String),
    Number(f64),
    Computed(Box<Expression>),
}

/// Cooked text of one template literal segment
#[derive(Debug, Clone)]
pub struct TemplateElement {
    pub cooked: String,
    pub span: Span,
}

/// Switch case
#[derive(Debug, Clone)]
pub struct SwitchCase {
    /// Test expression (None for default)
    pub test: Option<Expression>,
    pub consequent: Vec<Statement>,
    pub span: Span,
}

/// Catch clause
#[derive(Debug, Clone)]
pub struct CatchClause {
    /// Optional binding (`catch {}` has none)
    pub param: Option<Pattern>,
    pub body: BlockStatement,
    pub span: Span,
}

/// Shared handle to a function definition
pub type FunctionRef = Rc<Function>;
