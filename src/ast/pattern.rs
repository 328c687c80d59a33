//! Binding and assignment patterns for destructuring

use super::*;

/// A binding pattern (declarations, parameters, catch clauses, assignments)
#[derive(Debug, Clone)]
pub enum Pattern {
    Identifier(Identifier),
    /// [a, b, ...rest]
    Array(ArrayPattern),
    /// {a, b: c, ...rest}
    Object(ObjectPattern),
    /// a = 1
    Assignment(Box<AssignmentPattern>),
    /// Member target, only valid in destructuring assignment
    Member(Box<MemberExpression>),
}

impl Pattern {
    pub fn span(&self) -> Span {
        match self {
            Pattern::Identifier(id) => id.span,
            Pattern::Array(a) => a.span,
            Pattern::Object(o) => o.span,
            Pattern::Assignment(a) => a.span,
            Pattern::Member(m) => m.span,
        }
    }

    /// Get all identifiers this pattern binds
    pub fn bound_names(&self) -> Vec<&Identifier> {
        let mut names = Vec::new();
        self.collect_bound_names(&mut names);
        names
    }

    fn collect_bound_names<'a>(&'a self, names: &mut Vec<&'a Identifier>) {
        match self {
            Pattern::Identifier(id) => names.push(id),
            Pattern::Array(arr) => {
                for elem in arr.elements.iter().flatten() {
                    elem.collect_bound_names(names);
                }
                if let Some(rest) = &arr.rest {
                    rest.collect_bound_names(names);
                }
            }
            Pattern::Object(obj) => {
                for prop in &obj.properties {
                    prop.value.collect_bound_names(names);
                }
                if let Some(rest) = &obj.rest {
                    rest.collect_bound_names(names);
                }
            }
            Pattern::Assignment(a) => a.left.collect_bound_names(names),
            Pattern::Member(_) => {}
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArrayPattern {
    /// Pattern elements (None for holes)
    pub elements: Vec<Option<Pattern>>,
    pub rest: Option<Box<Pattern>>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ObjectPattern {
    pub properties: Vec<ObjectPatternProperty>,
    pub rest: Option<Box<Pattern>>,
    pub span: Span,
}

/// `{key: value}` or shorthand `{key}` inside an object pattern
#[derive(Debug, Clone)]
pub struct ObjectPatternProperty {
    pub key: PropertyKey,
    pub value: Pattern,
    pub span: Span,
}

/// Pattern with a default value
#[derive(Debug, Clone)]
pub struct AssignmentPattern {
    pub left: Pattern,
    pub right: Expression,
    pub span: Span,
}
