//! Positional-parameter rewriting: `$n` (Postgres style) to `?` (SQLite
//! style), with the parameter list rebuilt in occurrence order.
//!
//! The scan is string-literal- and quoted-identifier-aware, so `$1` inside
//! `'...'` or `"..."` is never touched. Pre-existing `?` placeholders pass
//! through in place.

use indexmap::IndexMap;

use protocol::{ErrorCode, SqlValue};

use crate::adapter::AdapterError;

/// Parameters handed to the rewriter: positional values for `$n`, or a
/// name→value map for `$name` placeholders.
pub enum ParamInput<'a> {
    Positional(&'a [SqlValue]),
    Named(&'a IndexMap<String, SqlValue>),
}

/// Rewrite `sql`, returning the `?`-style SQL and its positional params.
///
/// Repeated `$n` repeats the value; `$0` is `INVALID_PLACEHOLDER`; an index
/// beyond the provided params is `MISSING_PARAM`. Named placeholders
/// require the map input and bind in first-occurrence order.
pub fn rewrite(sql: &str, params: ParamInput<'_>) -> Result<(String, Vec<SqlValue>), AdapterError> {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut bound = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;

        match c {
            // String literal: copy verbatim, honoring '' escapes.
            '\'' => {
                out.push('\'');
                i += 1;
                while i < bytes.len() {
                    out.push(bytes[i] as char);
                    if bytes[i] == b'\'' {
                        if bytes.get(i + 1) == Some(&b'\'') {
                            out.push('\'');
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    i += 1;
                }
            }
            // Quoted identifiers.
            '"' | '`' => {
                let quote = bytes[i];
                out.push(c);
                i += 1;
                while i < bytes.len() {
                    out.push(bytes[i] as char);
                    if bytes[i] == quote {
                        i += 1;
                        break;
                    }
                    i += 1;
                }
            }
            // Line comment.
            '-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    out.push(bytes[i] as char);
                    i += 1;
                }
            }
            // Block comment.
            '/' if bytes.get(i + 1) == Some(&b'*') => {
                out.push_str("/*");
                i += 2;
                while i < bytes.len() {
                    if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
                        out.push_str("*/");
                        i += 2;
                        break;
                    }
                    out.push(bytes[i] as char);
                    i += 1;
                }
            }
            '$' => {
                let start = i + 1;
                let mut j = start;
                while j < bytes.len() && (bytes[j] as char).is_ascii_digit() {
                    j += 1;
                }
                if j > start {
                    let n: usize = sql[start..j].parse().map_err(|_| {
                        AdapterError::new(
                            ErrorCode::InvalidPlaceholder,
                            format!("placeholder ${} is out of range", &sql[start..j]),
                        )
                    })?;
                    if n == 0 {
                        return Err(AdapterError::new(
                            ErrorCode::InvalidPlaceholder,
                            "placeholder $0 is invalid; placeholders are 1-based",
                        ));
                    }
                    let value = match &params {
                        ParamInput::Positional(values) => values.get(n - 1).cloned(),
                        ParamInput::Named(_) => {
                            return Err(AdapterError::new(
                                ErrorCode::InvalidPlaceholder,
                                format!("positional placeholder ${n} used with named params"),
                            ));
                        }
                    };
                    let value = value.ok_or_else(|| {
                        AdapterError::new(
                            ErrorCode::MissingParam,
                            format!("no value bound for placeholder ${n}"),
                        )
                    })?;
                    out.push('?');
                    bound.push(value);
                    i = j;
                    continue;
                }

                // $name
                while j < bytes.len()
                    && ((bytes[j] as char).is_ascii_alphanumeric() || bytes[j] == b'_')
                {
                    j += 1;
                }
                if j > start {
                    let name = &sql[start..j];
                    let value = match &params {
                        ParamInput::Named(map) => map.get(name).cloned(),
                        ParamInput::Positional(_) => {
                            return Err(AdapterError::new(
                                ErrorCode::InvalidPlaceholder,
                                format!("named placeholder ${name} requires named params"),
                            ));
                        }
                    };
                    let value = value.ok_or_else(|| {
                        AdapterError::new(
                            ErrorCode::MissingParam,
                            format!("no value bound for placeholder ${name}"),
                        )
                    })?;
                    out.push('?');
                    bound.push(value);
                    i = j;
                    continue;
                }

                out.push('$');
                i += 1;
            }
            _ => {
                out.push(c);
                i += c.len_utf8();
            }
        }
    }

    Ok((out, bound))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positional(sql: &str, params: &[SqlValue]) -> (String, Vec<SqlValue>) {
        rewrite(sql, ParamInput::Positional(params)).unwrap()
    }

    #[test]
    fn rewrites_in_occurrence_order() {
        let (sql, params) = positional(
            "INSERT INTO users (name, active) VALUES ($2, $1)",
            &[SqlValue::Bool(true), SqlValue::Text("Alice".into())],
        );
        assert_eq!(sql, "INSERT INTO users (name, active) VALUES (?, ?)");
        assert_eq!(params, vec![SqlValue::Text("Alice".into()), SqlValue::Bool(true)]);
    }

    #[test]
    fn repeated_placeholder_duplicates_the_value() {
        let (sql, params) = positional(
            "SELECT * FROM t WHERE a = $1 OR b = $1",
            &[SqlValue::Int(5)],
        );
        assert_eq!(sql, "SELECT * FROM t WHERE a = ? OR b = ?");
        assert_eq!(params, vec![SqlValue::Int(5), SqlValue::Int(5)]);
    }

    #[test]
    fn dollar_zero_is_invalid() {
        let err = rewrite("SELECT $0", ParamInput::Positional(&[SqlValue::Int(1)])).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidPlaceholder);
    }

    #[test]
    fn missing_param_is_a_hard_error() {
        let err = rewrite(
            "SELECT * FROM t WHERE a = $3",
            ParamInput::Positional(&[SqlValue::Int(1)]),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingParam);
    }

    #[test]
    fn placeholders_in_literals_and_identifiers_survive() {
        let (sql, params) = positional(
            r#"SELECT "col$1" FROM t WHERE note = 'worth $1' AND id = $1"#,
            &[SqlValue::Int(9)],
        );
        assert_eq!(
            sql,
            r#"SELECT "col$1" FROM t WHERE note = 'worth $1' AND id = ?"#
        );
        assert_eq!(params, vec![SqlValue::Int(9)]);
    }

    #[test]
    fn existing_question_marks_pass_through() {
        let (sql, params) = positional(
            "SELECT * FROM t WHERE a = ? AND b = $1",
            &[SqlValue::Int(2)],
        );
        assert_eq!(sql, "SELECT * FROM t WHERE a = ? AND b = ?");
        assert_eq!(params, vec![SqlValue::Int(2)]);
    }

    #[test]
    fn named_placeholders_resolve_from_a_map() {
        let mut map = IndexMap::new();
        map.insert("name".to_string(), SqlValue::Text("Bob".into()));
        map.insert("age".to_string(), SqlValue::Int(30));

        let (sql, params) = rewrite(
            "INSERT INTO users (age, name) VALUES ($age, $name)",
            ParamInput::Named(&map),
        )
        .unwrap();
        assert_eq!(sql, "INSERT INTO users (age, name) VALUES (?, ?)");
        assert_eq!(params, vec![SqlValue::Int(30), SqlValue::Text("Bob".into())]);
    }

    #[test]
    fn named_placeholder_with_positional_params_is_rejected() {
        let err = rewrite(
            "SELECT * FROM t WHERE name = $name",
            ParamInput::Positional(&[SqlValue::Int(1)]),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidPlaceholder);
    }

    #[test]
    fn escaped_quotes_do_not_end_the_literal() {
        let (sql, params) = positional(
            "SELECT * FROM t WHERE name = 'O''Brien $1' AND id = $1",
            &[SqlValue::Int(4)],
        );
        assert_eq!(
            sql,
            "SELECT * FROM t WHERE name = 'O''Brien $1' AND id = ?"
        );
        assert_eq!(params, vec![SqlValue::Int(4)]);
    }
}
