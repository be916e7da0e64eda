//! Expression and query trees.
//!
//! Trees are plain data. Names inside them are logical; the printer resolves
//! them through [`crate::Bindings`]. Operators point into the static catalog.

use crate::catalog::{self, OperatorSignature};
use crate::schema::{Column, DataType};

// =============================================================================
// Expressions
// =============================================================================

/// A SQL expression.
#[derive(Debug, Clone, PartialEq, strum::EnumDiscriminants)]
#[strum_discriminants(name(ExprKind))]
#[strum_discriminants(derive(Hash, strum::EnumIter, strum::Display))]
pub enum Expr {
    Constant(Literal),
    Column(ColumnRef),
    Table(TableRef),
    UnaryPrefix {
        op: &'static OperatorSignature,
        operand: Box<Expr>,
    },
    UnaryPostfix {
        op: &'static OperatorSignature,
        operand: Box<Expr>,
    },
    Binary {
        op: &'static OperatorSignature,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Function, aggregate or window-function call.
    Call {
        func: &'static OperatorSignature,
        args: Vec<Expr>,
    },
    /// A call with an OVER clause.
    Window(Box<WindowExpr>),
    OrderingTerm(Box<OrderingTerm>),
    Alias {
        inner: Box<Expr>,
        alias: String,
    },
    Case {
        when: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// `*`, as in `COUNT(*)` or `SELECT *`.
    Star,
    /// Scalar subquery.
    Select(Box<Select>),
}

impl Expr {
    pub fn constant(lit: Literal) -> Self {
        Expr::Constant(lit)
    }

    pub fn null() -> Self {
        Expr::Constant(Literal::Null)
    }

    pub fn column(column: &Column) -> Self {
        Expr::Column(ColumnRef::from(column))
    }

    /// Build the node for a catalog operator with its arguments.
    ///
    /// The node shape follows the operator category; callers pass exactly
    /// the number of arguments unary and binary operators take.
    pub fn apply(op: &'static OperatorSignature, mut args: Vec<Expr>) -> Self {
        match (op.category, args.len()) {
            (catalog::OpCategory::UnaryPrefix, 1) => Expr::UnaryPrefix {
                op,
                operand: Box::new(args.remove(0)),
            },
            (catalog::OpCategory::UnaryPostfix, 1) => Expr::UnaryPostfix {
                op,
                operand: Box::new(args.remove(0)),
            },
            (catalog::OpCategory::Binary, 2) => {
                let right = args.remove(1);
                let left = args.remove(0);
                Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }
            _ => Expr::Call { func: op, args },
        }
    }

    pub fn unary_prefix(op: &'static OperatorSignature, operand: Expr) -> Self {
        Expr::UnaryPrefix {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn unary_postfix(op: &'static OperatorSignature, operand: Expr) -> Self {
        Expr::UnaryPostfix {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn binary(op: &'static OperatorSignature, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn call(func: &'static OperatorSignature, args: Vec<Expr>) -> Self {
        Expr::Call { func, args }
    }

    pub fn not(expr: Expr) -> Self {
        Expr::unary_prefix(&catalog::NOT, expr)
    }

    pub fn is_null(expr: Expr) -> Self {
        Expr::unary_postfix(&catalog::IS_NULL, expr)
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Expr::binary(&catalog::AND, left, right)
    }

    /// `COUNT(*)`
    pub fn count_star() -> Self {
        Expr::call(&catalog::COUNT, vec![Expr::Star])
    }

    pub fn alias(inner: Expr, alias: impl Into<String>) -> Self {
        Expr::Alias {
            inner: Box::new(inner),
            alias: alias.into(),
        }
    }

    pub fn case(when: Expr, then: Expr, otherwise: Expr) -> Self {
        Expr::Case {
            when: Box::new(when),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    pub fn subquery(select: Select) -> Self {
        Expr::Select(Box::new(select))
    }

    pub fn kind(&self) -> ExprKind {
        ExprKind::from(self)
    }

    /// Direct children, in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Constant(_) | Expr::Column(_) | Expr::Table(_) | Expr::Star => vec![],
            Expr::UnaryPrefix { operand, .. } | Expr::UnaryPostfix { operand, .. } => {
                vec![&**operand]
            }
            Expr::Binary { left, right, .. } => vec![&**left, &**right],
            Expr::Call { args, .. } => args.iter().collect(),
            Expr::Window(w) => std::iter::once(&w.call)
                .chain(&w.partition_by)
                .chain(&w.order_by)
                .collect(),
            Expr::OrderingTerm(t) => vec![&t.expr],
            Expr::Alias { inner, .. } => vec![&**inner],
            Expr::Case {
                when,
                then,
                otherwise,
            } => vec![&**when, &**then, &**otherwise],
            Expr::Select(s) => s.exprs().collect(),
        }
    }

    /// Whether `pred` holds for this node or any descendant.
    pub fn any(&self, pred: &impl Fn(&Expr) -> bool) -> bool {
        pred(self) || self.children().into_iter().any(|c| c.any(pred))
    }

    /// Height of the tree; a leaf has depth 0.
    pub fn depth(&self) -> usize {
        self.children()
            .into_iter()
            .map(|c| c.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// The operator at the root, if any.
    pub fn operator(&self) -> Option<&'static OperatorSignature> {
        match self {
            Expr::UnaryPrefix { op, .. }
            | Expr::UnaryPostfix { op, .. }
            | Expr::Binary { op, .. } => Some(*op),
            Expr::Call { func, .. } => Some(*func),
            _ => None,
        }
    }

    pub fn contains_aggregate(&self) -> bool {
        self.any(&|e| e.operator().is_some_and(|op| op.is_aggregate()))
    }

    /// Whether a column is referenced outside every aggregate call.
    ///
    /// In a grouped query such a column is evaluated on an arbitrary row of
    /// its group unless it is itself a grouping term.
    pub fn has_bare_column(&self) -> bool {
        match self {
            Expr::Column(_) => true,
            Expr::Call { func, .. } if func.is_aggregate() => false,
            other => other.children().into_iter().any(Expr::has_bare_column),
        }
    }
}

/// A reference to a column of a logical table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
    pub data_type: DataType,
}

impl From<&Column> for ColumnRef {
    fn from(column: &Column) -> Self {
        Self {
            table: column.table.clone(),
            column: column.name.clone(),
            data_type: column.data_type,
        }
    }
}

/// A reference to a logical table in a FROM clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub name: String,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    BigInt(i64),
    Double(f64),
    String(String),
    Boolean(bool),
}

impl Literal {
    pub fn data_type(&self) -> DataType {
        match self {
            Literal::Null => DataType::Null,
            Literal::BigInt(_) => DataType::BigInt,
            Literal::Double(_) => DataType::Double,
            Literal::String(_) => DataType::String,
            Literal::Boolean(_) => DataType::Boolean,
        }
    }
}

/// An ORDER BY term.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderingTerm {
    pub expr: Expr,
    pub direction: OrderDirection,
    pub nulls: Option<NullsOrder>,
}

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

/// NULLS ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

// =============================================================================
// Windows
// =============================================================================

/// `call OVER (PARTITION BY ... ORDER BY ... frame)`.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowExpr {
    pub call: Expr,
    pub partition_by: Vec<Expr>,
    pub order_by: Vec<Expr>,
    pub frame: Option<WindowFrame>,
}

/// A window frame clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowFrame {
    pub unit: FrameUnit,
    pub start: FrameBound,
    /// With an end bound the frame prints in `BETWEEN start AND end` form.
    pub end: Option<FrameBound>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumIter)]
pub enum FrameUnit {
    Range,
    Rows,
    Groups,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameBound {
    UnboundedPreceding,
    Preceding(i64),
    CurrentRow,
    Following(i64),
    UnboundedFollowing,
}

// =============================================================================
// Queries
// =============================================================================

/// Join type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
    Natural,
}

impl JoinKind {
    /// Whether the join takes an ON condition in well-formed SQL.
    pub fn takes_condition(self) -> bool {
        matches!(
            self,
            JoinKind::Inner | JoinKind::Left | JoinKind::Right | JoinKind::Full
        )
    }
}

/// One join step: `<kind> JOIN table [ON condition]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    /// Use the long keyword spelling (`INNER JOIN`, `LEFT OUTER JOIN`).
    pub long_form: bool,
    pub table: TableRef,
    pub on: Option<Expr>,
}

/// FROM clause: a comma-separated table list followed by join steps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FromClause {
    pub tables: Vec<TableRef>,
    pub joins: Vec<Join>,
}

impl FromClause {
    /// Comma-separated `FROM a, b, c`.
    pub fn list<S: Into<String>>(tables: impl IntoIterator<Item = S>) -> Self {
        Self {
            tables: tables.into_iter().map(TableRef::new).collect(),
            joins: Vec::new(),
        }
    }

    /// All table references, in order of appearance.
    pub fn table_refs(&self) -> impl Iterator<Item = &TableRef> {
        self.tables.iter().chain(self.joins.iter().map(|j| &j.table))
    }

    pub fn has_natural_join(&self) -> bool {
        self.joins.iter().any(|j| j.kind == JoinKind::Natural)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.joins.is_empty()
    }
}

/// A SELECT query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Select {
    pub all: bool,
    pub distinct: bool,
    /// Result columns. Empty prints as `*`.
    pub fetch: Vec<Expr>,
    pub from: FromClause,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<Expr>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Select {
    pub fn new(fetch: Vec<Expr>, from: FromClause) -> Self {
        Self {
            fetch,
            from,
            ..Self::default()
        }
    }

    /// Every expression held directly by the query.
    pub fn exprs(&self) -> impl Iterator<Item = &Expr> {
        self.fetch
            .iter()
            .chain(self.from.joins.iter().filter_map(|j| j.on.as_ref()))
            .chain(self.where_clause.as_ref())
            .chain(&self.group_by)
            .chain(self.having.as_ref())
            .chain(&self.order_by)
    }
}
