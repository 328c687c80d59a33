//! Statement AST node types

use super::*;

/// A JavaScript statement
#[derive(Debug, Clone)]
pub enum Statement {
    Block(BlockStatement),
    Empty(Span),
    Expression(ExpressionStatement),
    If(Box<IfStatement>),
    While(Box<WhileStatement>),
    DoWhile(Box<WhileStatement>),
    For(Box<ForStatement>),
    ForIn(Box<ForInStatement>),
    ForOf(Box<ForInStatement>),
    Switch(Box<SwitchStatement>),
    Break(JumpStatement),
    Continue(JumpStatement),
    Return(ReturnStatement),
    Throw(Box<ThrowStatement>),
    Try(Box<TryStatement>),
    Labeled(Box<LabeledStatement>),
    VariableDeclaration(VariableDeclaration),
    FunctionDeclaration(FunctionRef),
}

impl Statement {
    /// Get the span of this statement
    pub fn span(&self) -> Span {
        match self {
            Statement::Block(b) => b.span,
            Statement::Empty(span) => *span,
            Statement::Expression(e) => e.span,
            Statement::If(i) => i.span,
            Statement::While(w) | Statement::DoWhile(w) => w.span,
            Statement::For(f) => f.span,
            Statement::ForIn(f) | Statement::ForOf(f) => f.span,
            Statement::Switch(s) => s.span,
            Statement::Break(j) | Statement::Continue(j) => j.span,
            Statement::Return(r) => r.span,
            Statement::Throw(t) => t.span,
            Statement::Try(t) => t.span,
            Statement::Labeled(l) => l.span,
            Statement::VariableDeclaration(v) => v.span,
            Statement::FunctionDeclaration(f) => f.span,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlockStatement {
    pub body: Vec<Statement>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ExpressionStatement {
    pub expression: Expression,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct IfStatement {
    pub test: Expression,
    pub consequent: Statement,
    pub alternate: Option<Statement>,
    pub span: Span,
}

/// `while` and `do ... while`
#[derive(Debug, Clone)]
pub struct WhileStatement {
    pub test: Expression,
    pub body: Statement,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ForStatement {
    pub init: Option<ForInit>,
    pub test: Option<Expression>,
    pub update: Option<Expression>,
    pub body: Statement,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ForInit {
    VariableDeclaration(VariableDeclaration),
    Expression(Expression),
}

/// `for (left in right)` and `for (left of right)`
#[derive(Debug, Clone)]
pub struct ForInStatement {
    pub left: ForInLeft,
    pub right: Expression,
    pub body: Statement,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ForInLeft {
    /// `for (const x of ...)`: a fresh binding per iteration
    Declaration(VariableKind, Pattern),
    /// `for (x of ...)`: assigns an existing target
    Pattern(Pattern),
}

#[derive(Debug, Clone)]
pub struct SwitchStatement {
    pub discriminant: Expression,
    pub cases: Vec<SwitchCase>,
    pub span: Span,
}

/// `break` and `continue`, with an optional label
#[derive(Debug, Clone)]
pub struct JumpStatement {
    pub label: Option<Identifier>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ReturnStatement {
    pub argument: Option<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ThrowStatement {
    pub argument: Expression,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct TryStatement {
    pub block: BlockStatement,
    pub handler: Option<CatchClause>,
    pub finalizer: Option<BlockStatement>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct LabeledStatement {
    pub label: Identifier,
    pub body: Statement,
    pub span: Span,
}
