//! SQL rendering for predicates.
//!
//! Columns are addressed through a table alias: `geographic_level`, `id`,
//! `code` and `old_code`. Values are bound as `?` parameters in order.

use super::Predicate;

/// A SQL boolean expression plus its positional parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFragment {
    /// Expression text with `?` placeholders.
    pub sql: String,
    /// Values for the placeholders, in order.
    pub params: Vec<String>,
}

impl SqlFragment {
    fn literal(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            params: Vec::new(),
        }
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn membership(column: &str, values: Vec<String>) -> SqlFragment {
    if values.is_empty() {
        return SqlFragment::literal("1 = 0");
    }
    SqlFragment {
        sql: format!("{column} IN ({})", placeholders(values.len())),
        params: values,
    }
}

fn level_membership(alias: &str, level: &str, column: &str, codes: &[String]) -> SqlFragment {
    let inner = membership(&format!("{alias}.{column}"), codes.to_vec());
    let mut params = vec![level.to_string()];
    params.extend(inner.params);
    SqlFragment {
        sql: format!("({alias}.geographic_level = ? AND {})", inner.sql),
        params,
    }
}

fn combine(alias: &str, predicates: &[Predicate], operator: &str, empty: &str) -> SqlFragment {
    if predicates.is_empty() {
        return SqlFragment::literal(empty);
    }
    let mut parts = Vec::with_capacity(predicates.len());
    let mut params = Vec::new();
    for predicate in predicates {
        let fragment = render(predicate, alias);
        parts.push(fragment.sql);
        params.extend(fragment.params);
    }
    SqlFragment {
        sql: format!("({})", parts.join(&format!(" {operator} "))),
        params,
    }
}

pub(super) fn render(predicate: &Predicate, alias: &str) -> SqlFragment {
    match predicate {
        Predicate::True => SqlFragment::literal("1 = 1"),
        Predicate::LevelEq { level } => SqlFragment {
            sql: format!("{alias}.geographic_level = ?"),
            params: vec![level.as_str().to_string()],
        },
        Predicate::LocationIdIn { ids } => membership(
            &format!("{alias}.id"),
            ids.iter().map(ToString::to_string).collect(),
        ),
        Predicate::AttributeCodeIn { level, codes } => {
            level_membership(alias, level.as_str(), "code", codes)
        }
        Predicate::OldCodeIn { level, codes } => {
            level_membership(alias, level.as_str(), "old_code", codes)
        }
        Predicate::And { predicates } => combine(alias, predicates, "AND", "1 = 1"),
        Predicate::Or { predicates } => combine(alias, predicates, "OR", "1 = 0"),
    }
}
