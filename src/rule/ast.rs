//! Rule AST
//!
//! Pure data: a rule is a tree of `And`/`Or` combinators over leaf
//! conditions. There is no negation. A parsed tree is never empty and every
//! leaf carries exactly one predicate.

use std::fmt;

use crate::model::Value;

/// A named rule, as produced by the extraction collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: Option<String>,
    pub conditions: Expr,
}

impl Rule {
    pub fn new(conditions: Expr) -> Self {
        Self { name: None, conditions }
    }

    pub fn named(name: impl Into<String>, conditions: Expr) -> Self {
        Self { name: Some(name.into()), conditions }
    }
}

/// Boolean expression over conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Leaf(Condition),
}

impl Expr {
    pub fn and(children: impl IntoIterator<Item = Expr>) -> Self {
        Expr::And(children.into_iter().collect())
    }

    pub fn or(children: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Or(children.into_iter().collect())
    }

    /// Visit every leaf, depth first.
    pub fn for_each_condition<'a>(&'a self, f: &mut impl FnMut(&'a Condition)) {
        match self {
            Expr::And(children) | Expr::Or(children) => {
                children.iter().for_each(|c| c.for_each_condition(f));
            }
            Expr::Leaf(condition) => f(condition),
        }
    }

    pub fn conditions(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        self.for_each_condition(&mut |c| out.push(c));
        out
    }

    /// Fields referenced anywhere in the tree, first mention first.
    pub fn fields(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        self.for_each_condition(&mut |c| {
            if !out.contains(&c.field.as_str()) {
                out.push(&c.field);
            }
        });
        out
    }
}

impl From<Condition> for Expr {
    fn from(condition: Condition) -> Self {
        Expr::Leaf(condition)
    }
}

/// `field` tested by one predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub predicate: Predicate,
}

impl Condition {
    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self { field: field.into(), predicate: Predicate::Compare { op, value: value.into() } }
    }

    pub fn one_of<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self {
            field: field.into(),
            predicate: Predicate::In(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { field: field.into(), predicate: Predicate::Equals(value.into()) }
    }

    /// Operand values as a list: the `in` list, the `equals` value, or the
    /// comparison operand.
    pub fn operands(&self) -> &[Value] {
        match &self.predicate {
            Predicate::In(values) => values,
            Predicate::Equals(value) | Predicate::Compare { value, .. } => std::slice::from_ref(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Integer comparison after coercing both sides.
    Compare { op: CompareOp, value: Value },
    /// Membership in a list.
    In(Vec<Value>),
    /// Exact equality.
    Equals(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Gt,
    Lt,
    Ge,
    Le,
    /// Both `=` and `==`.
    Eq,
}

impl CompareOp {
    pub fn parse(op: &str) -> Option<Self> {
        Some(match op.trim() {
            ">" => CompareOp::Gt,
            "<" => CompareOp::Lt,
            ">=" => CompareOp::Ge,
            "<=" => CompareOp::Le,
            "=" | "==" => CompareOp::Eq,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
        }
    }

    pub fn apply(self, lhs: i64, rhs: i64) -> bool {
        match self {
            CompareOp::Gt => lhs > rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Ge => lhs >= rhs,
            CompareOp::Le => lhs <= rhs,
            CompareOp::Eq => lhs == rhs,
        }
    }
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (children, joiner) = match self {
            Expr::Leaf(c) => return write!(f, "{c}"),
            Expr::And(children) => (children, " AND "),
            Expr::Or(children) => (children, " OR "),
        };
        write!(f, "(")?;
        for (i, child) in children.iter().enumerate() {
            if i > 0 { f.write_str(joiner)?; }
            write!(f, "{child}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.predicate {
            Predicate::Compare { op, value } => write!(f, "{} {} {}", self.field, op.symbol(), value),
            Predicate::In(values) => write!(f, "{} IN {}", self.field, Value::List(values.clone())),
            Predicate::Equals(value) => write!(f, "{} = {}", self.field, value),
        }
    }
}
