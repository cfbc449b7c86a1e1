//! Typed boolean predicates over a record, as an expression tree.
//!
//! Trees are built with the comparison methods on [`Field`] and combined with
//! [`Predicate::and`] / [`Predicate::or`]. Values captured from the surrounding scope
//! and results of pure function calls are kept as deferred nodes until
//! [`Expr::resolve`] turns them into constants.

use chrono::{DateTime, Utc};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

use super::{Field, Record, SqlValue, TranslationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    AndAlso,
    OrElse,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

impl BinaryOp {
    /// SQL token for the operator, `None` for operators with no SQL rendering.
    pub fn token(self) -> Option<&'static str> {
        match self {
            BinaryOp::Equal => Some("="),
            BinaryOp::NotEqual => Some("!="),
            BinaryOp::LessThan => Some("<"),
            BinaryOp::LessThanOrEqual => Some("<="),
            BinaryOp::GreaterThan => Some(">"),
            BinaryOp::GreaterThanOrEqual => Some(">="),
            BinaryOp::AndAlso => Some("AND"),
            BinaryOp::OrElse => Some("OR"),
            BinaryOp::Add
            | BinaryOp::Subtract
            | BinaryOp::Multiply
            | BinaryOp::Divide
            | BinaryOp::Modulo => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Nullable-to-underlying conversion; transparent to translation.
    Convert,
    Not,
    Negate,
}

/// A side-effect-free function evaluated during resolution.
pub type PureFn = fn(&[SqlValue]) -> Result<SqlValue, String>;

type Thunk = Arc<dyn Fn() -> Result<SqlValue, String> + Send + Sync>;

#[derive(Clone)]
pub enum Expr {
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// Member access on the predicate's record.
    Field(&'static str),
    Constant(SqlValue),
    /// A value read from the enclosing scope when the predicate is resolved.
    Captured { name: String, thunk: Thunk },
    Call {
        name: &'static str,
        func: PureFn,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn binary(op: BinaryOp, left: impl Operand, right: impl Operand) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left.into_expr()),
            right: Box::new(right.into_expr()),
        }
    }

    pub fn unary(op: UnaryOp, operand: impl Operand) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand.into_expr()),
        }
    }

    pub fn convert(operand: impl Operand) -> Self {
        Self::unary(UnaryOp::Convert, operand)
    }

    pub fn constant(value: impl Into<SqlValue>) -> Self {
        Expr::Constant(value.into())
    }

    /// A value produced by `thunk` at resolution time; `name` appears in errors.
    pub fn captured<F>(name: impl Into<String>, thunk: F) -> Self
    where
        F: Fn() -> SqlValue + Send + Sync + 'static,
    {
        Expr::Captured {
            name: name.into(),
            thunk: Arc::new(move || Ok(thunk())),
        }
    }

    /// Member `field` of a captured record, read when the predicate is resolved.
    pub fn member<R>(record: &R, field: Field<R>) -> Self
    where
        R: Record + Clone + Send + Sync + 'static,
    {
        let record = record.clone();
        let name = field.name();
        Expr::Captured {
            name: format!("{}.{}", std::any::type_name::<R>(), name),
            thunk: Arc::new(move || {
                record
                    .value_of(name)
                    .ok_or_else(|| format!("no member named `{}`", name))
            }),
        }
    }

    pub fn call(name: &'static str, func: PureFn, args: Vec<Expr>) -> Self {
        Expr::Call { name, func, args }
    }

    /// Short node description for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Expr::Binary { .. } => "binary expression",
            Expr::Unary { .. } => "unary expression",
            Expr::Field(_) => "field access",
            Expr::Constant(_) => "constant",
            Expr::Captured { .. } => "captured value",
            Expr::Call { .. } => "method call",
        }
    }

    /// Evaluates every captured value and pure call, leaving a tree of binary,
    /// unary, field and constant nodes.
    pub fn resolve(self) -> Result<Expr, TranslationError> {
        match self {
            Expr::Binary { op, left, right } => Ok(Expr::Binary {
                op,
                left: Box::new(left.resolve()?),
                right: Box::new(right.resolve()?),
            }),
            Expr::Unary { op, operand } => Ok(Expr::Unary {
                op,
                operand: Box::new(operand.resolve()?),
            }),
            Expr::Field(_) | Expr::Constant(_) => Ok(self),
            Expr::Captured { name, thunk } => thunk()
                .map(Expr::Constant)
                .map_err(|reason| TranslationError::Evaluation { name, reason }),
            Expr::Call { name, func, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    match arg.resolve()? {
                        Expr::Constant(value) => values.push(value),
                        other => {
                            return Err(TranslationError::UnsupportedShape(format!(
                                "{} as an argument of `{}`",
                                other.kind(),
                                name
                            )))
                        }
                    }
                }
                func(&values)
                    .map(Expr::Constant)
                    .map_err(|reason| TranslationError::Evaluation {
                        name: name.to_string(),
                        reason,
                    })
            }
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Binary { op, left, right } => f
                .debug_struct("Binary")
                .field("op", op)
                .field("left", left)
                .field("right", right)
                .finish(),
            Expr::Unary { op, operand } => f
                .debug_struct("Unary")
                .field("op", op)
                .field("operand", operand)
                .finish(),
            Expr::Field(name) => f.debug_tuple("Field").field(name).finish(),
            Expr::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Expr::Captured { name, .. } => f.debug_tuple("Captured").field(name).finish(),
            Expr::Call { name, args, .. } => f
                .debug_struct("Call")
                .field("name", name)
                .field("args", args)
                .finish(),
        }
    }
}

/// Anything that can stand on either side of a comparison.
pub trait Operand {
    fn into_expr(self) -> Expr;
}

impl Operand for Expr {
    fn into_expr(self) -> Expr {
        self
    }
}

impl<T> Operand for Field<T> {
    fn into_expr(self) -> Expr {
        Expr::Field(self.name())
    }
}

impl<T: Into<SqlValue>> Operand for Option<T> {
    fn into_expr(self) -> Expr {
        Expr::Constant(self.into())
    }
}

macro_rules! value_operand {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Operand for $ty {
                fn into_expr(self) -> Expr {
                    Expr::Constant(self.into())
                }
            }
        )*
    };
}

value_operand!(SqlValue, bool, i16, i32, i64, u8, u16, u32, f32, f64, String, &str, char, DateTime<Utc>, Uuid);

/// A boolean expression over `T`.
pub struct Predicate<T> {
    expr: Expr,
    _record: PhantomData<fn() -> T>,
}

impl<T> Predicate<T> {
    /// Wraps an arbitrary tree. Translation checks the shape.
    pub fn from_expr(expr: Expr) -> Self {
        Self {
            expr,
            _record: PhantomData,
        }
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn into_expr(self) -> Expr {
        self.expr
    }

    pub fn and(self, other: Predicate<T>) -> Self {
        Self::from_expr(Expr::binary(BinaryOp::AndAlso, self.expr, other.expr))
    }

    pub fn or(self, other: Predicate<T>) -> Self {
        Self::from_expr(Expr::binary(BinaryOp::OrElse, self.expr, other.expr))
    }
}

impl<T> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        Self::from_expr(self.expr.clone())
    }
}

impl<T> fmt::Debug for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Predicate").field(&self.expr).finish()
    }
}

impl<T> Field<T> {
    fn compare(self, op: BinaryOp, rhs: impl Operand) -> Predicate<T> {
        Predicate::from_expr(Expr::binary(op, self, rhs))
    }

    pub fn eq(self, rhs: impl Operand) -> Predicate<T> {
        self.compare(BinaryOp::Equal, rhs)
    }

    pub fn ne(self, rhs: impl Operand) -> Predicate<T> {
        self.compare(BinaryOp::NotEqual, rhs)
    }

    pub fn lt(self, rhs: impl Operand) -> Predicate<T> {
        self.compare(BinaryOp::LessThan, rhs)
    }

    pub fn le(self, rhs: impl Operand) -> Predicate<T> {
        self.compare(BinaryOp::LessThanOrEqual, rhs)
    }

    pub fn gt(self, rhs: impl Operand) -> Predicate<T> {
        self.compare(BinaryOp::GreaterThan, rhs)
    }

    pub fn ge(self, rhs: impl Operand) -> Predicate<T> {
        self.compare(BinaryOp::GreaterThanOrEqual, rhs)
    }
}

/// Pure functions usable in [`Expr::call`].
pub mod functions {
    use super::SqlValue;

    fn two_numbers(args: &[SqlValue]) -> Result<(&SqlValue, &SqlValue), String> {
        match args {
            [a, b] => Ok((a, b)),
            _ => Err(format!("expected 2 arguments, got {}", args.len())),
        }
    }

    fn pick(args: &[SqlValue], larger: bool) -> Result<SqlValue, String> {
        match two_numbers(args)? {
            (SqlValue::Int(a), SqlValue::Int(b)) => {
                Ok(SqlValue::Int(if larger { *a.max(b) } else { *a.min(b) }))
            }
            (SqlValue::Float(a), SqlValue::Float(b)) => {
                Ok(SqlValue::Float(if larger { a.max(*b) } else { a.min(*b) }))
            }
            (a, b) => Err(format!(
                "cannot compare {} with {}",
                a.type_name(),
                b.type_name()
            )),
        }
    }

    pub fn max(args: &[SqlValue]) -> Result<SqlValue, String> {
        pick(args, true)
    }

    pub fn min(args: &[SqlValue]) -> Result<SqlValue, String> {
        pick(args, false)
    }

    pub fn abs(args: &[SqlValue]) -> Result<SqlValue, String> {
        match args {
            [SqlValue::Int(v)] => v
                .checked_abs()
                .map(SqlValue::Int)
                .ok_or_else(|| "integer overflow".to_string()),
            [SqlValue::Float(v)] => Ok(SqlValue::Float(v.abs())),
            _ => Err("expected a single number".to_string()),
        }
    }

    pub fn lower(args: &[SqlValue]) -> Result<SqlValue, String> {
        match args {
            [SqlValue::Text(v)] => Ok(SqlValue::Text(v.to_lowercase())),
            _ => Err("expected a single string".to_string()),
        }
    }

    pub fn upper(args: &[SqlValue]) -> Result<SqlValue, String> {
        match args {
            [SqlValue::Text(v)] => Ok(SqlValue::Text(v.to_uppercase())),
            _ => Err("expected a single string".to_string()),
        }
    }
}
