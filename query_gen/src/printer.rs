//! SQL rendering.
//!
//! Rendering is a pure function of a tree and a [`Bindings`] value: the same
//! tree printed under different bindings names different physical tables
//! and aliases, but has the same shape.
//!
//! ```
//! use query_gen::{Bindings, Column, DataType, Expr, Table, printer};
//!
//! let table = Table::new("t0", vec![Column::new("v0", DataType::BigInt)]);
//! let expr = Expr::is_null(Expr::column(&table.columns[0]));
//!
//! let mut bindings = Bindings::new();
//! assert_eq!(printer::sql(&expr, &bindings).to_string(), "(t0.v0 IS NULL)");
//!
//! bindings.set_member("t0", "t0_view");
//! assert_eq!(printer::sql(&expr, &bindings).to_string(), "(t0_view.v0 IS NULL)");
//! ```

use std::fmt;

use crate::ast::{
    Expr, FrameBound, FrameUnit, FromClause, Join, JoinKind, Literal, NullsOrder, OrderDirection,
    OrderingTerm, Select, TableRef, WindowExpr, WindowFrame,
};
use crate::bindings::Bindings;

/// A node paired with the bindings it is printed under.
pub struct Sql<'a, T: ?Sized> {
    node: &'a T,
    bindings: &'a Bindings,
}

/// Render `node` under `bindings`.
pub fn sql<'a, T: ?Sized>(node: &'a T, bindings: &'a Bindings) -> Sql<'a, T> {
    Sql { node, bindings }
}

impl<'a, T: ?Sized> Sql<'a, T> {
    fn nested<U: ?Sized>(&self, node: &'a U) -> Sql<'a, U> {
        sql(node, self.bindings)
    }

    fn list<U>(&self, f: &mut fmt::Formatter<'_>, items: &'a [U]) -> fmt::Result
    where
        Sql<'a, U>: fmt::Display,
    {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", self.nested(item))?;
        }
        Ok(())
    }
}

impl fmt::Display for Sql<'_, Expr> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node {
            Expr::Constant(lit) => write!(f, "{}", SqlLiteral(lit)),
            Expr::Column(c) => match self.bindings.column_alias(&c.table, &c.column) {
                Some(alias) => write!(f, "{alias}"),
                None => write!(f, "{}.{}", self.bindings.qualifier(&c.table), c.column),
            },
            Expr::Table(t) => write!(f, "{}", self.nested(t)),
            Expr::UnaryPrefix { op, operand } => {
                write!(f, "({} {})", op.name, self.nested(operand.as_ref()))
            }
            Expr::UnaryPostfix { op, operand } => {
                write!(f, "({} {})", self.nested(operand.as_ref()), op.name)
            }
            Expr::Binary { op, left, right } => write!(
                f,
                "({} {} {})",
                self.nested(left.as_ref()),
                op.name,
                self.nested(right.as_ref())
            ),
            Expr::Call { func, args } => {
                write!(f, "{}(", func.name)?;
                self.list(f, args)?;
                write!(f, ")")
            }
            Expr::Window(w) => write!(f, "{}", self.nested(w.as_ref())),
            Expr::OrderingTerm(t) => write!(f, "{}", self.nested(t.as_ref())),
            Expr::Alias { inner, alias } => {
                write!(f, "{} AS {alias}", self.nested(inner.as_ref()))
            }
            Expr::Case {
                when,
                then,
                otherwise,
            } => write!(
                f,
                "(CASE WHEN {} THEN {} ELSE {} END)",
                self.nested(when.as_ref()),
                self.nested(then.as_ref()),
                self.nested(otherwise.as_ref())
            ),
            Expr::Star => write!(f, "*"),
            Expr::Select(s) => write!(f, "({})", self.nested(s.as_ref())),
        }
    }
}

/// Literal rendering; independent of bindings.
struct SqlLiteral<'a>(&'a Literal);

impl fmt::Display for SqlLiteral<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Literal::Null => write!(f, "NULL"),
            Literal::BigInt(v) => write!(f, "{v}"),
            Literal::Double(v) if v.is_nan() => write!(f, "CAST('NaN' AS DOUBLE)"),
            Literal::Double(v) if v.is_infinite() && *v > 0.0 => {
                write!(f, "CAST('Infinity' AS DOUBLE)")
            }
            Literal::Double(v) if v.is_infinite() => write!(f, "CAST('-Infinity' AS DOUBLE)"),
            // Debug keeps the decimal point (`1.0`, `-0.0`) or an exponent.
            Literal::Double(v) => write!(f, "{v:?}"),
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Literal::Boolean(b) => write!(f, "{b}"),
        }
    }
}

impl fmt::Display for Sql<'_, TableRef> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = &self.node.name;
        write!(f, "{}", self.bindings.member(name))?;
        if let Some(alias) = self.bindings.table_alias(name) {
            write!(f, " AS {alias}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Sql<'_, OrderingTerm> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let term = self.node;
        write!(f, "{}", self.nested(&term.expr))?;
        match term.direction {
            OrderDirection::Asc => write!(f, " ASC")?,
            OrderDirection::Desc => write!(f, " DESC")?,
        }
        match term.nulls {
            Some(NullsOrder::First) => write!(f, " NULLS FIRST"),
            Some(NullsOrder::Last) => write!(f, " NULLS LAST"),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Sql<'_, WindowExpr> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let w = self.node;
        write!(f, "{} OVER (", self.nested(&w.call))?;
        let mut sep = "";
        if !w.partition_by.is_empty() {
            write!(f, "PARTITION BY ")?;
            self.list(f, &w.partition_by)?;
            sep = " ";
        }
        if !w.order_by.is_empty() {
            write!(f, "{sep}ORDER BY ")?;
            self.list(f, &w.order_by)?;
            sep = " ";
        }
        if let Some(frame) = &w.frame {
            write!(f, "{sep}{frame}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for WindowFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            FrameUnit::Range => "RANGE",
            FrameUnit::Rows => "ROWS",
            FrameUnit::Groups => "GROUPS",
        };
        match self.end {
            Some(end) => write!(f, "{unit} BETWEEN {} AND {end}", self.start),
            None => write!(f, "{unit} {}", self.start),
        }
    }
}

impl fmt::Display for FrameBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameBound::UnboundedPreceding => write!(f, "UNBOUNDED PRECEDING"),
            FrameBound::Preceding(n) => write!(f, "{n} PRECEDING"),
            FrameBound::CurrentRow => write!(f, "CURRENT ROW"),
            FrameBound::Following(n) => write!(f, "{n} FOLLOWING"),
            FrameBound::UnboundedFollowing => write!(f, "UNBOUNDED FOLLOWING"),
        }
    }
}

impl Join {
    /// Join keyword, in the spelling chosen at assembly time.
    pub fn keyword(&self) -> &'static str {
        match (self.kind, self.long_form) {
            (JoinKind::Inner, false) => "JOIN",
            (JoinKind::Inner, true) => "INNER JOIN",
            (JoinKind::Left, false) => "LEFT JOIN",
            (JoinKind::Left, true) => "LEFT OUTER JOIN",
            (JoinKind::Right, false) => "RIGHT JOIN",
            (JoinKind::Right, true) => "RIGHT OUTER JOIN",
            (JoinKind::Full, false) => "FULL JOIN",
            (JoinKind::Full, true) => "FULL OUTER JOIN",
            (JoinKind::Cross, _) => "CROSS JOIN",
            (JoinKind::Natural, false) => "NATURAL JOIN",
            (JoinKind::Natural, true) => "NATURAL INNER JOIN",
        }
    }
}

impl fmt::Display for Sql<'_, FromClause> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.list(f, &self.node.tables)?;
        for join in &self.node.joins {
            write!(f, " {} {}", join.keyword(), self.nested(&join.table))?;
            if let Some(on) = &join.on {
                write!(f, " ON {}", self.nested(on))?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Sql<'_, Select> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.node;
        write!(f, "SELECT ")?;
        if s.distinct {
            write!(f, "DISTINCT ")?;
        } else if s.all {
            write!(f, "ALL ")?;
        }

        if s.fetch.is_empty() {
            write!(f, "*")?;
        } else {
            self.list(f, &s.fetch)?;
        }

        if !s.from.is_empty() {
            write!(f, " FROM {}", self.nested(&s.from))?;
        }
        if let Some(where_clause) = &s.where_clause {
            write!(f, " WHERE {}", self.nested(where_clause))?;
        }
        if !s.group_by.is_empty() {
            write!(f, " GROUP BY ")?;
            self.list(f, &s.group_by)?;
        }
        if let Some(having) = &s.having {
            write!(f, " HAVING {}", self.nested(having))?;
        }
        if !s.order_by.is_empty() {
            write!(f, " ORDER BY ")?;
            self.list(f, &s.order_by)?;
        }
        if let Some(limit) = s.limit {
            write!(f, " LIMIT {limit}")?;
        }
        if let Some(offset) = s.offset {
            write!(f, " OFFSET {offset}")?;
        }
        Ok(())
    }
}
