//! SQL clause types (WHERE, ORDER BY, LIMIT, OFFSET).

use crate::expr::Expr;
use lazyrel_core::{ConfigError, Dialect, Error, Result, Value};

/// WHERE clause.
#[derive(Debug, Clone)]
pub struct Where {
    expr: Expr,
}

impl Where {
    /// Create a new WHERE clause with the given expression.
    pub fn new(expr: Expr) -> Self {
        Self { expr }
    }

    /// Add an AND condition.
    pub fn and(self, expr: Expr) -> Self {
        Self {
            expr: self.expr.and(expr),
        }
    }

    /// Add an OR condition.
    pub fn or(self, expr: Expr) -> Self {
        Self {
            expr: self.expr.or(expr),
        }
    }

    /// The combined condition.
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Build the WHERE clause SQL, appending to `params`.
    pub fn build_with_dialect(
        &self,
        dialect: Dialect,
        params: &mut Vec<Value>,
        offset: usize,
    ) -> String {
        self.expr.build_with_dialect(dialect, params, offset)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

/// NULLS FIRST/LAST ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

/// ORDER BY term.
#[derive(Debug, Clone)]
pub struct OrderBy {
    pub expr: Expr,
    pub direction: OrderDirection,
    pub nulls: Option<NullsOrder>,
}

impl OrderBy {
    /// Create an ORDER BY term.
    pub fn new(expr: Expr, direction: OrderDirection) -> Self {
        Self {
            expr,
            direction,
            nulls: None,
        }
    }

    /// Parse a textual ordering such as `"created_at DESC, id DESC"`.
    ///
    /// Each comma-separated term is `column [ASC|DESC] [NULLS FIRST|LAST]`,
    /// where `column` may be `table.column`. A blank string is no ordering.
    /// Empty terms and unknown keywords are rejected.
    pub fn parse(ordering: &str) -> Result<Vec<Self>> {
        if ordering.trim().is_empty() {
            return Ok(Vec::new());
        }
        ordering
            .split(',')
            .map(|term| Self::parse_term(term, ordering))
            .collect()
    }

    fn parse_term(term: &str, ordering: &str) -> Result<Self> {
        let invalid = |why: &str| {
            Error::Config(ConfigError {
                message: format!("invalid ordering '{ordering}': {why}"),
                source: None,
            })
        };

        let words: Vec<&str> = term.split_whitespace().collect();
        let Some((column, rest)) = words.split_first() else {
            return Err(invalid("empty term"));
        };
        let expr = match column.split_once('.') {
            Some((table, name)) if !table.is_empty() && !name.is_empty() => {
                Expr::qualified(table, name)
            }
            Some(_) => return Err(invalid(&format!("bad column '{column}'"))),
            None => Expr::col(*column),
        };

        let upper: Vec<String> = rest.iter().map(|w| w.to_ascii_uppercase()).collect();
        let words: Vec<&str> = upper.iter().map(String::as_str).collect();
        let (direction, nulls) = match words.as_slice() {
            [] | ["ASC"] => (OrderDirection::Asc, &[][..]),
            ["DESC"] => (OrderDirection::Desc, &[][..]),
            ["ASC", tail @ ..] => (OrderDirection::Asc, tail),
            ["DESC", tail @ ..] => (OrderDirection::Desc, tail),
            tail => (OrderDirection::Asc, tail),
        };
        let nulls = match nulls {
            [] => None,
            ["NULLS", "FIRST"] => Some(NullsOrder::First),
            ["NULLS", "LAST"] => Some(NullsOrder::Last),
            _ => return Err(invalid(&format!("unexpected '{}'", rest.join(" ")))),
        };

        Ok(Self {
            expr,
            direction,
            nulls,
        })
    }

    /// Set NULLS FIRST.
    pub fn nulls_first(mut self) -> Self {
        self.nulls = Some(NullsOrder::First);
        self
    }

    /// Set NULLS LAST.
    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(NullsOrder::Last);
        self
    }

    /// The same term sorted the opposite way.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            expr: self.expr.clone(),
            direction: match self.direction {
                OrderDirection::Asc => OrderDirection::Desc,
                OrderDirection::Desc => OrderDirection::Asc,
            },
            nulls: self.nulls.map(|n| match n {
                NullsOrder::First => NullsOrder::Last,
                NullsOrder::Last => NullsOrder::First,
            }),
        }
    }

    /// The same term with bare columns qualified by `table`.
    #[must_use]
    pub fn qualify(&self, table: &str) -> Self {
        Self {
            expr: self.expr.qualify(table),
            direction: self.direction,
            nulls: self.nulls,
        }
    }

    /// Generate SQL for this ORDER BY term.
    pub fn build(&self, dialect: Dialect, params: &mut Vec<Value>, offset: usize) -> String {
        let mut sql = self.expr.build_with_dialect(dialect, params, offset);

        sql.push_str(match self.direction {
            OrderDirection::Asc => " ASC",
            OrderDirection::Desc => " DESC",
        });

        if let Some(nulls) = self.nulls {
            sql.push_str(match nulls {
                NullsOrder::First => " NULLS FIRST",
                NullsOrder::Last => " NULLS LAST",
            });
        }

        sql
    }
}

/// Render a list of ORDER BY terms separated by commas.
pub fn build_order_list(
    terms: &[OrderBy],
    dialect: Dialect,
    params: &mut Vec<Value>,
    offset: usize,
) -> String {
    terms
        .iter()
        .map(|o| o.build(dialect, params, offset))
        .collect::<Vec<_>>()
        .join(", ")
}

/// LIMIT clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit(pub u64);

/// OFFSET clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset(pub u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_by_nulls() {
        let mut params = Vec::new();
        let sql = Expr::col("score")
            .desc()
            .nulls_last()
            .build(Dialect::Postgres, &mut params, 0);
        assert_eq!(sql, "\"score\" DESC NULLS LAST");
    }

    #[test]
    fn reversed_flips_direction_and_nulls() {
        let reversed = Expr::col("score").desc().nulls_last().reversed();
        assert_eq!(reversed.direction, OrderDirection::Asc);
        assert_eq!(reversed.nulls, Some(NullsOrder::First));
    }

    #[test]
    fn parse_textual_ordering() {
        let order = OrderBy::parse("created_at DESC").unwrap();
        let mut params = Vec::new();
        assert_eq!(
            build_order_list(&order, Dialect::Sqlite, &mut params, 0),
            "\"created_at\" DESC"
        );
        let order = OrderBy::parse("name").unwrap();
        assert_eq!(order[0].direction, OrderDirection::Asc);
        assert!(OrderBy::parse("  ").unwrap().is_empty());
    }

    #[test]
    fn parse_keeps_every_term() {
        let order = OrderBy::parse("created_at DESC, id desc").unwrap();
        let mut params = Vec::new();
        assert_eq!(
            build_order_list(&order, Dialect::Postgres, &mut params, 0),
            "\"created_at\" DESC, \"id\" DESC"
        );

        let order = OrderBy::parse("comments.score asc nulls last,id").unwrap();
        assert_eq!(
            build_order_list(&order, Dialect::Postgres, &mut params, 0),
            "\"comments\".\"score\" ASC NULLS LAST, \"id\" ASC"
        );
    }

    #[test]
    fn parse_rejects_malformed_terms() {
        for bad in ["created_at DESC,", "a, ,b", "created_at DOWN", "a NULLS", ".id DESC"] {
            let err = OrderBy::parse(bad).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{bad} should be rejected");
        }
    }

    #[test]
    fn where_and_or_chain() {
        let clause = Where::new(Expr::col("a").eq(1)).and(Expr::col("b").eq(2));
        let mut params = Vec::new();
        let sql = clause.build_with_dialect(Dialect::Postgres, &mut params, 0);
        assert_eq!(sql, "\"a\" = $1 AND \"b\" = $2");
    }

    #[test]
    fn order_list_joins_terms() {
        let mut params = Vec::new();
        let sql = build_order_list(
            &[Expr::col("a").asc(), Expr::col("b").desc()],
            Dialect::Postgres,
            &mut params,
            0,
        );
        assert_eq!(sql, "\"a\" ASC, \"b\" DESC");
    }
}
