//! Expression AST node types

use super::*;

/// A JavaScript expression
#[derive(Debug, Clone)]
pub enum Expression {
    Identifier(Identifier),
    Literal(Literal),
    /// Template literal `hello ${name}`
    TemplateLiteral(TemplateLiteral),
    /// Array literal [1, 2, 3]
    Array(ArrayExpression),
    /// Object literal {a: 1, b: 2}
    Object(ObjectExpression),
    /// Function expression, arrow or method
    Function(FunctionRef),
    This(Span),
    /// obj.prop, obj[prop], obj?.prop
    Member(Box<MemberExpression>),
    /// f(args), f?.(args)
    Call(Box<CallExpression>),
    /// new Foo(args)
    New(Box<CallExpression>),
    Unary(Box<UnaryExpression>),
    Update(Box<UpdateExpression>),
    Binary(Box<BinaryExpression>),
    Logical(Box<LogicalExpression>),
    Assignment(Box<AssignmentExpression>),
    Conditional(Box<ConditionalExpression>),
    Sequence(Box<SequenceExpression>),
    /// ...x inside array literals and argument lists
    Spread(Box<SpreadElement>),
    /// A member/call chain containing `?.`; a nullish link ends the whole chain
    OptionalChain(Box<Expression>),
}

impl Expression {
    /// Get the span of this expression
    pub fn span(&self) -> Span {
        match self {
            Expression::Identifier(id) => id.span,
            Expression::Literal(lit) => lit.span,
            Expression::TemplateLiteral(t) => t.span,
            Expression::Array(a) => a.span,
            Expression::Object(o) => o.span,
            Expression::Function(f) => f.span,
            Expression::This(span) => *span,
            Expression::Member(m) => m.span,
            Expression::Call(c) | Expression::New(c) => c.span,
            Expression::Unary(u) => u.span,
            Expression::Update(u) => u.span,
            Expression::Binary(b) => b.span,
            Expression::Logical(l) => l.span,
            Expression::Assignment(a) => a.span,
            Expression::Conditional(c) => c.span,
            Expression::Sequence(s) => s.span,
            Expression::Spread(s) => s.span,
            Expression::OptionalChain(e) => e.span(),
        }
    }

    /// Check if this expression can be the target of `=`, `+=` or `++`
    pub fn is_simple_assignment_target(&self) -> bool {
        match self {
            Expression::Identifier(_) => true,
            Expression::Member(m) => !m.optional,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Literal {
    pub value: LiteralValue,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum LiteralValue {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Regex { pattern: String, flags: String },
}

/// Template literal: `quasis` always has one more element than `expressions`
#[derive(Debug, Clone)]
pub struct TemplateLiteral {
    pub quasis: Vec<TemplateElement>,
    pub expressions: Vec<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ArrayExpression {
    /// Array elements (None for holes like [1,,3])
    pub elements: Vec<Option<Expression>>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ObjectExpression {
    pub properties: Vec<ObjectProperty>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ObjectProperty {
    /// `{a: 1}`, shorthand `{a}` and methods `{f() {}}`
    Property {
        key: PropertyKey,
        value: Expression,
        span: Span,
    },
    /// `{...obj}`
    Spread { argument: Expression, span: Span },
}

#[derive(Debug, Clone)]
pub struct MemberExpression {
    pub object: Expression,
    pub property: MemberProperty,
    /// `obj?.prop`: yields undefined instead of throwing on a nullish object
    pub optional: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum MemberProperty {
    /// obj.prop
    Identifier(Identifier),
    /// obj[expr]
    Expression(Box<Expression>),
}

/// Call or `new` expression
#[derive(Debug, Clone)]
pub struct CallExpression {
    pub callee: Expression,
    pub arguments: Vec<Expression>,
    /// `f?.()`
    pub optional: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct UnaryExpression {
    pub operator: UnaryOperator,
    pub argument: Expression,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Minus,
    Plus,
    Not,
    BitwiseNot,
    Typeof,
    Void,
    Delete,
}

#[derive(Debug, Clone)]
pub struct UpdateExpression {
    pub operator: UpdateOperator,
    pub argument: Expression,
    /// ++x rather than x++
    pub prefix: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOperator {
    Increment,
    Decrement,
}

#[derive(Debug, Clone)]
pub struct BinaryExpression {
    pub operator: BinaryOperator,
    pub left: Expression,
    pub right: Expression,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    Shr,
    UShr,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    In,
    Instanceof,
}

#[derive(Debug, Clone)]
pub struct LogicalExpression {
    pub operator: LogicalOperator,
    pub left: Expression,
    pub right: Expression,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
    NullishCoalescing,
}

#[derive(Debug, Clone)]
pub struct AssignmentExpression {
    pub operator: AssignmentOperator,
    pub left: AssignmentTarget,
    pub right: Expression,
    pub span: Span,
}

/// Left-hand side of an assignment
#[derive(Debug, Clone)]
pub enum AssignmentTarget {
    /// Identifier or member expression
    Simple(Expression),
    /// Destructuring assignment `[a, b] = [b, a]`
    Pattern(Pattern),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOperator {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    PowAssign,
    ShlAssign,
    ShrAssign,
    UShrAssign,
    BitwiseAndAssign,
    BitwiseOrAssign,
    BitwiseXorAssign,
    AndAssign,
    OrAssign,
    NullishAssign,
}

impl AssignmentOperator {
    /// Binary operator applied by a compound assignment
    pub fn binary_operator(&self) -> Option<BinaryOperator> {
        Some(match self {
            AssignmentOperator::AddAssign => BinaryOperator::Add,
            AssignmentOperator::SubAssign => BinaryOperator::Sub,
            AssignmentOperator::MulAssign => BinaryOperator::Mul,
            AssignmentOperator::DivAssign => BinaryOperator::Div,
            AssignmentOperator::ModAssign => BinaryOperator::Mod,
            AssignmentOperator::PowAssign => BinaryOperator::Pow,
            AssignmentOperator::ShlAssign => BinaryOperator::Shl,
            AssignmentOperator::ShrAssign => BinaryOperator::Shr,
            AssignmentOperator::UShrAssign => BinaryOperator::UShr,
            AssignmentOperator::BitwiseAndAssign => BinaryOperator::BitwiseAnd,
            AssignmentOperator::BitwiseOrAssign => BinaryOperator::BitwiseOr,
            AssignmentOperator::BitwiseXorAssign => BinaryOperator::BitwiseXor,
            _ => return None,
        })
    }

    /// Logical operator applied by `&&=`, `||=` and `??=`
    pub fn logical_operator(&self) -> Option<LogicalOperator> {
        match self {
            AssignmentOperator::AndAssign => Some(LogicalOperator::And),
            AssignmentOperator::OrAssign => Some(LogicalOperator::Or),
            AssignmentOperator::NullishAssign => Some(LogicalOperator::NullishCoalescing),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConditionalExpression {
    pub test: Expression,
    pub consequent: Expression,
    pub alternate: Expression,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct SequenceExpression {
    pub expressions: Vec<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct SpreadElement {
    pub argument: Expression,
    pub span: Span,
}
