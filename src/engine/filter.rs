//! WHERE condition evaluation.
//!
//! Conditions are plain strings: comparisons of the form
//! `column op literal` joined by ` AND ` and ` OR ` (no parentheses, OR
//! binds loosest). Both sides of a comparison are coerced to the column's
//! declared type before comparing; anything that cannot be parsed simply
//! fails the comparison. Evaluation is total: every row and every
//! syntactically valid condition produces a boolean, never an error.

use std::cmp::Ordering;

use log::warn;

use crate::protocol::query::DataType;

use super::table::{Row, Table};

/// Comparison operators, longest first so `!=`/`>=`/`<=` are matched before
/// their one-character prefixes.
const OPERATORS: [&str; 6] = [">=", "<=", "!=", "=", ">", "<"];

/// Evaluates `condition` against one row. An empty condition matches.
pub fn evaluate(table: &Table, row: &Row, condition: &str) -> bool {
    let condition = condition.trim();
    if condition.is_empty() {
        return true;
    }

    // OR binds loosest, then AND; split left-to-right and recurse.
    if let Some(position) = condition.find(" OR ") {
        let (left, right) = condition.split_at(position);
        return evaluate(table, row, left) || evaluate(table, row, &right[4..]);
    }
    if let Some(position) = condition.find(" AND ") {
        let (left, right) = condition.split_at(position);
        return evaluate(table, row, left) && evaluate(table, row, &right[5..]);
    }

    evaluate_comparison(table, row, condition)
}

fn evaluate_comparison(table: &Table, row: &Row, comparison: &str) -> bool {
    let Some((column, operator, literal)) = split_comparison(comparison) else {
        warn!("unparseable comparison '{comparison}', treating as false");
        return false;
    };

    let Some(index) = table.column_index(column) else {
        return false;
    };
    let Some(cell) = row.get(index) else {
        return false;
    };
    let data_type = table.columns[index].data_type;

    compare_typed(cell, literal, operator, data_type)
}

/// Splits `column op literal` at the leftmost operator, preferring the
/// two-character operators at any given position. Single quotes around the
/// literal are stripped.
fn split_comparison(comparison: &str) -> Option<(&str, &str, &str)> {
    for (i, _) in comparison.char_indices() {
        for op in OPERATORS {
            if comparison[i..].starts_with(op) {
                let column = comparison[..i].trim();
                let literal = comparison[i + op.len()..].trim();
                if column.is_empty() {
                    return None;
                }
                return Some((column, op, strip_quotes(literal)));
            }
        }
    }
    None
}

fn strip_quotes(literal: &str) -> &str {
    if literal.len() >= 2 && literal.starts_with('\'') && literal.ends_with('\'') {
        &literal[1..literal.len() - 1]
    } else {
        literal
    }
}

fn compare_typed(cell: &str, literal: &str, operator: &str, data_type: DataType) -> bool {
    match data_type {
        DataType::Int => match (cell.trim().parse::<i64>(), literal.parse::<i64>()) {
            (Ok(lhs), Ok(rhs)) => apply_ordering(lhs.cmp(&rhs), operator),
            _ => false,
        },
        DataType::Double => match (cell.trim().parse::<f64>(), literal.parse::<f64>()) {
            (Ok(lhs), Ok(rhs)) => match lhs.partial_cmp(&rhs) {
                Some(ordering) => apply_ordering(ordering, operator),
                None => false,
            },
            _ => false,
        },
        DataType::Bool => match (parse_bool(cell), parse_bool(literal)) {
            (Some(lhs), Some(rhs)) => match operator {
                "=" => lhs == rhs,
                "!=" => lhs != rhs,
                _ => {
                    warn!("operator '{operator}' is not defined for BOOL columns");
                    false
                }
            },
            _ => false,
        },
        DataType::String => apply_ordering(cell.cmp(literal), operator),
    }
}

fn apply_ordering(ordering: Ordering, operator: &str) -> bool {
    match operator {
        "=" => ordering == Ordering::Equal,
        "!=" => ordering != Ordering::Equal,
        ">" => ordering == Ordering::Greater,
        "<" => ordering == Ordering::Less,
        ">=" => ordering != Ordering::Less,
        "<=" => ordering != Ordering::Greater,
        _ => false,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::query::ColumnDef;

    fn table() -> Table {
        Table::new(
            "users",
            vec![
                ColumnDef::new("id", DataType::Int, true),
                ColumnDef::new("name", DataType::String, false),
                ColumnDef::new("age", DataType::Int, false),
                ColumnDef::new("score", DataType::Double, false),
                ColumnDef::new("active", DataType::Bool, false),
            ],
        )
        .unwrap()
    }

    fn row(id: &str, name: &str, age: &str, score: &str, active: &str) -> Row {
        vec![
            id.into(),
            name.into(),
            age.into(),
            score.into(),
            active.into(),
        ]
    }

    #[test]
    fn empty_condition_matches_everything() {
        let t = table();
        assert!(evaluate(&t, &row("1", "Alice", "25", "1.5", "1"), ""));
        assert!(evaluate(&t, &row("1", "Alice", "25", "1.5", "1"), "   "));
    }

    #[test]
    fn integer_comparisons() {
        let t = table();
        let r = row("1", "Alice", "25", "1.5", "1");
        assert!(evaluate(&t, &r, "age = 25"));
        assert!(evaluate(&t, &r, "age != 30"));
        assert!(evaluate(&t, &r, "age >= 25"));
        assert!(evaluate(&t, &r, "age <= 25"));
        assert!(!evaluate(&t, &r, "age > 25"));
        assert!(!evaluate(&t, &r, "age < 25"));
    }

    #[test]
    fn double_and_string_comparisons() {
        let t = table();
        let r = row("1", "Bob", "30", "2.75", "0");
        assert!(evaluate(&t, &r, "score > 2.5"));
        assert!(!evaluate(&t, &r, "score >= 3.0"));
        assert!(evaluate(&t, &r, "name = 'Bob'"));
        assert!(evaluate(&t, &r, "name > 'Alice'"));
        assert!(evaluate(&t, &r, "name != 'Cara'"));
    }

    #[test]
    fn bool_only_supports_equality() {
        let t = table();
        let r = row("1", "Alice", "25", "1.5", "1");
        assert!(evaluate(&t, &r, "active = 1"));
        assert!(evaluate(&t, &r, "active = true"));
        assert!(evaluate(&t, &r, "active != false"));
        assert!(!evaluate(&t, &r, "active > 0"));
        assert!(!evaluate(&t, &r, "active <= 1"));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let t = table();
        let alice = row("1", "Alice", "25", "1.0", "1");
        let bob = row("2", "Bob", "30", "1.0", "1");
        let cara = row("3", "Cara", "25", "1.0", "1");

        let condition = "age = 25 AND name != 'Alice'";
        assert!(!evaluate(&t, &alice, condition));
        assert!(!evaluate(&t, &bob, condition));
        assert!(evaluate(&t, &cara, condition));

        let condition = "age > 25 OR name = 'Alice'";
        assert!(evaluate(&t, &alice, condition));
        assert!(evaluate(&t, &bob, condition));
        assert!(!evaluate(&t, &cara, condition));
    }

    #[test]
    fn chained_connectives_evaluate_left_to_right() {
        let t = table();
        let r = row("1", "Alice", "25", "1.0", "1");
        assert!(evaluate(&t, &r, "age = 25 AND name = 'Alice' AND id = 1"));
        assert!(evaluate(&t, &r, "age = 99 OR age = 25 OR age = 1"));
        assert!(!evaluate(&t, &r, "age = 99 AND name = 'Alice' OR id = 2"));
    }

    #[test]
    fn evaluation_is_total_on_junk_input() {
        let t = table();
        let r = row("1", "Alice", "25", "1.0", "1");
        // Unknown column, unparseable literal, missing operator: all false,
        // never a panic.
        assert!(!evaluate(&t, &r, "ghost = 1"));
        assert!(!evaluate(&t, &r, "age = banana"));
        assert!(!evaluate(&t, &r, "just some words"));
        assert!(!evaluate(&t, &r, "= 5"));
        assert!(!evaluate(&t, &r, "âge = 25"));
    }

    #[test]
    fn two_character_operators_win_over_prefixes() {
        let t = table();
        let r = row("1", "Alice", "25", "1.0", "1");
        // `!=` must not be read as `!` + `= 25`.
        assert!(!evaluate(&t, &r, "age != 25"));
        assert!(evaluate(&t, &r, "age >= 25"));
    }
}
