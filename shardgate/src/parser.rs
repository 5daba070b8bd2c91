//! A pragmatic SQL extractor, sufficient for routing decisions.
//!
//! This is not a general SQL parser. It tokenizes enough to find the
//! statement kind, target table, first WHERE equality, aggregates, ORDER BY
//! and LIMIT/OFFSET while staying correct in the presence of comments,
//! string literals and quoted identifiers. Anything it cannot classify is
//! `Other`, and the router rejects those.

use protocol::SqlValue;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunc {
    fn from_word(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "count" => Some(AggregateFunc::Count),
            "sum" => Some(AggregateFunc::Sum),
            "avg" => Some(AggregateFunc::Avg),
            "min" => Some(AggregateFunc::Min),
            "max" => Some(AggregateFunc::Max),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunc::Count => "count",
            AggregateFunc::Sum => "sum",
            AggregateFunc::Avg => "avg",
            AggregateFunc::Min => "min",
            AggregateFunc::Max => "max",
        }
    }
}

/// One aggregate in the SELECT list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Aggregate {
    pub func: AggregateFunc,
    /// The argument text, e.g. `*` or `age`.
    pub expr: String,
    pub alias: Option<String>,
}

impl Aggregate {
    /// The column name this aggregate appears under in results: the alias
    /// when present, else the lowercase function name (how both engines
    /// label unaliased aggregates once normalized).
    pub fn output_column(&self) -> String {
        self.alias
            .clone()
            .unwrap_or_else(|| self.func.name().to_string())
    }
}

/// A value position in the statement: either a placeholder or an inline
/// literal the tokenizer could resolve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum BoundValue {
    /// 1-based `$n` placeholder.
    Placeholder(usize),
    Literal(SqlValue),
}

impl BoundValue {
    pub fn resolve(&self, params: &[SqlValue]) -> Option<SqlValue> {
        match self {
            BoundValue::Placeholder(n) => params.get(n - 1).cloned(),
            BoundValue::Literal(v) => Some(v.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Statement {
    pub kind: StatementKind,
    /// Explicit `keyspace.` qualifier, unquoted, case-preserving.
    pub keyspace: Option<String>,
    pub table: Option<String>,
    /// First `<column> = <value>` equality in WHERE.
    pub where_equality: Option<(String, BoundValue)>,
    pub aggregates: Vec<Aggregate>,
    pub order_by: Vec<(String, SortDirection)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    insert_columns: Vec<String>,
    insert_values: Vec<Option<BoundValue>>,
}

impl Statement {
    /// The value bound to `column` in an INSERT's first VALUES tuple.
    pub fn insert_value(&self, column: &str) -> Option<&BoundValue> {
        let idx = self
            .insert_columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))?;
        self.insert_values.get(idx)?.as_ref()
    }

    pub fn has_aggregates(&self) -> bool {
        !self.aggregates.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Word(String),
    Quoted(String),
    Str(String),
    Num(String),
    Param(usize),
    NamedParam(String),
    Sym(char),
}

impl Tok {
    fn is_kw(&self, kw: &str) -> bool {
        matches!(self, Tok::Word(w) if w.eq_ignore_ascii_case(kw))
    }

    fn ident(&self) -> Option<&str> {
        match self {
            Tok::Word(w) | Tok::Quoted(w) => Some(w),
            _ => None,
        }
    }
}

fn tokenize(sql: &str) -> Vec<Tok> {
    let bytes = sql.as_bytes();
    let mut toks = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Line comment.
        if c == '-' && bytes.get(i + 1) == Some(&b'-') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }

        // Block comment (non-nesting).
        if c == '/' && bytes.get(i + 1) == Some(&b'*') {
            i += 2;
            while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                i += 1;
            }
            i = (i + 2).min(bytes.len());
            continue;
        }

        // String literal with '' escape.
        if c == '\'' {
            let mut content = String::new();
            i += 1;
            while i < bytes.len() {
                if bytes[i] == b'\'' {
                    if bytes.get(i + 1) == Some(&b'\'') {
                        content.push('\'');
                        i += 2;
                        continue;
                    }
                    i += 1;
                    break;
                }
                content.push(bytes[i] as char);
                i += 1;
            }
            toks.push(Tok::Str(content));
            continue;
        }

        // Quoted identifiers: "..." (with "" escape) and `...`.
        if c == '"' || c == '`' {
            let quote = bytes[i];
            let mut content = String::new();
            i += 1;
            while i < bytes.len() {
                if bytes[i] == quote {
                    if quote == b'"' && bytes.get(i + 1) == Some(&quote) {
                        content.push('"');
                        i += 2;
                        continue;
                    }
                    i += 1;
                    break;
                }
                content.push(bytes[i] as char);
                i += 1;
            }
            toks.push(Tok::Quoted(content));
            continue;
        }

        // $n and $name placeholders.
        if c == '$' {
            let start = i + 1;
            let mut j = start;
            while j < bytes.len() && (bytes[j] as char).is_ascii_digit() {
                j += 1;
            }
            if j > start {
                let n: usize = sql[start..j].parse().unwrap_or(0);
                toks.push(Tok::Param(n));
                i = j;
                continue;
            }
            while j < bytes.len()
                && ((bytes[j] as char).is_ascii_alphanumeric() || bytes[j] == b'_')
            {
                j += 1;
            }
            if j > start {
                toks.push(Tok::NamedParam(sql[start..j].to_string()));
                i = j;
                continue;
            }
            toks.push(Tok::Sym('$'));
            i += 1;
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len()
                && ((bytes[i] as char).is_ascii_digit() || bytes[i] == b'.' || bytes[i] == b'e')
            {
                i += 1;
            }
            toks.push(Tok::Num(sql[start..i].to_string()));
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < bytes.len()
                && ((bytes[i] as char).is_ascii_alphanumeric() || bytes[i] == b'_')
            {
                i += 1;
            }
            toks.push(Tok::Word(sql[start..i].to_string()));
            continue;
        }

        toks.push(Tok::Sym(c));
        // Multi-byte characters only appear inside literals or identifiers;
        // anywhere else, step over the whole char.
        i += c.len_utf8();
    }

    toks
}

/// Parse a statement. Never fails: anything unclassifiable comes back as
/// kind `Other`.
pub fn parse(sql: &str) -> Statement {
    let toks = tokenize(sql);
    let mut stmt = Statement {
        kind: StatementKind::Other,
        keyspace: None,
        table: None,
        where_equality: None,
        aggregates: Vec::new(),
        order_by: Vec::new(),
        limit: None,
        offset: None,
        insert_columns: Vec::new(),
        insert_values: Vec::new(),
    };

    let Some(body_start) = statement_start(&toks) else {
        return stmt;
    };
    let toks = &toks[body_start..];

    stmt.kind = match &toks[0] {
        t if t.is_kw("select") => StatementKind::Select,
        t if t.is_kw("insert") => StatementKind::Insert,
        t if t.is_kw("update") => StatementKind::Update,
        t if t.is_kw("delete") => StatementKind::Delete,
        _ => return stmt,
    };

    match stmt.kind {
        StatementKind::Select => {
            let from = find_top_level_kw(toks, 1, "from");
            if let Some(from) = from {
                if let Some((keyspace, table, _)) = qualified_name(toks, from + 1) {
                    stmt.keyspace = keyspace;
                    stmt.table = Some(table);
                }
            }
            let select_end = from.unwrap_or(toks.len());
            stmt.aggregates = extract_aggregates(&toks[1..select_end]);
        }
        StatementKind::Insert => {
            if let Some(into) = find_top_level_kw(toks, 1, "into") {
                if let Some((keyspace, table, after)) = qualified_name(toks, into + 1) {
                    stmt.keyspace = keyspace;
                    stmt.table = Some(table);
                    extract_insert_bindings(toks, after, &mut stmt);
                }
            }
        }
        StatementKind::Update => {
            if let Some((keyspace, table, _)) = qualified_name(toks, 1) {
                stmt.keyspace = keyspace;
                stmt.table = Some(table);
            }
        }
        StatementKind::Delete => {
            if let Some(from) = find_top_level_kw(toks, 1, "from") {
                if let Some((keyspace, table, _)) = qualified_name(toks, from + 1) {
                    stmt.keyspace = keyspace;
                    stmt.table = Some(table);
                }
            }
        }
        StatementKind::Other => unreachable!(),
    }

    if let Some(where_idx) = find_top_level_kw(toks, 1, "where") {
        stmt.where_equality = extract_equality(toks, where_idx + 1);
    }

    extract_order_by(toks, &mut stmt);
    extract_limit_offset(toks, &mut stmt);

    stmt
}

/// Index of the statement's main verb, skipping a leading WITH clause.
fn statement_start(toks: &[Tok]) -> Option<usize> {
    if toks.is_empty() {
        return None;
    }
    if !toks[0].is_kw("with") {
        return Some(0);
    }

    // CTE bodies are parenthesized, so the first top-level verb after the
    // WITH clause is the statement itself.
    let mut depth = 0i32;
    for (i, tok) in toks.iter().enumerate().skip(1) {
        match tok {
            Tok::Sym('(') => depth += 1,
            Tok::Sym(')') => depth -= 1,
            t if depth == 0
                && (t.is_kw("select")
                    || t.is_kw("insert")
                    || t.is_kw("update")
                    || t.is_kw("delete")) =>
            {
                return Some(i);
            }
            _ => {}
        }
    }
    None
}

fn find_top_level_kw(toks: &[Tok], start: usize, kw: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (i, tok) in toks.iter().enumerate().skip(start) {
        match tok {
            Tok::Sym('(') => depth += 1,
            Tok::Sym(')') => depth -= 1,
            t if depth == 0 && t.is_kw(kw) => return Some(i),
            _ => {}
        }
    }
    None
}

/// Parse `[keyspace.]table` at `start`; returns `(keyspace, table, next)`.
fn qualified_name(toks: &[Tok], start: usize) -> Option<(Option<String>, String, usize)> {
    let first = toks.get(start)?.ident()?.to_string();
    if toks.get(start + 1) == Some(&Tok::Sym('.')) {
        let second = toks.get(start + 2)?.ident()?.to_string();
        Some((Some(first), second, start + 3))
    } else {
        Some((None, first, start + 1))
    }
}

/// First `<column> = <placeholder | string | integer>` from `start` on.
fn extract_equality(toks: &[Tok], start: usize) -> Option<(String, BoundValue)> {
    let mut i = start;
    while i < toks.len() {
        let Some(column) = toks.get(i).and_then(Tok::ident) else {
            i += 1;
            continue;
        };

        // Skip a `table.` qualifier, keeping the column part.
        let (column, eq_at) = if toks.get(i + 1) == Some(&Tok::Sym('.')) {
            match toks.get(i + 2).and_then(Tok::ident) {
                Some(col) => (col, i + 3),
                None => {
                    i += 1;
                    continue;
                }
            }
        } else {
            (column, i + 1)
        };

        if toks.get(eq_at) == Some(&Tok::Sym('=')) {
            match toks.get(eq_at + 1) {
                Some(Tok::Param(n)) if *n >= 1 => {
                    return Some((column.to_string(), BoundValue::Placeholder(*n)));
                }
                Some(Tok::Str(s)) => {
                    return Some((
                        column.to_string(),
                        BoundValue::Literal(SqlValue::Text(s.clone())),
                    ));
                }
                Some(Tok::Num(n)) => {
                    if let Ok(int) = n.parse::<i64>() {
                        return Some((column.to_string(), BoundValue::Literal(SqlValue::Int(int))));
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

fn extract_aggregates(select_list: &[Tok]) -> Vec<Aggregate> {
    let mut aggregates = Vec::new();
    let mut i = 0;

    while i < select_list.len() {
        let func = match &select_list[i] {
            Tok::Word(w) => AggregateFunc::from_word(w),
            _ => None,
        };
        let Some(func) = func else {
            i += 1;
            continue;
        };
        if select_list.get(i + 1) != Some(&Tok::Sym('(')) {
            i += 1;
            continue;
        }

        // Capture the argument up to the matching close paren.
        let mut depth = 1i32;
        let mut j = i + 2;
        let mut expr = String::new();
        while j < select_list.len() && depth > 0 {
            match &select_list[j] {
                Tok::Sym('(') => {
                    depth += 1;
                    expr.push('(');
                }
                Tok::Sym(')') => {
                    depth -= 1;
                    if depth > 0 {
                        expr.push(')');
                    }
                }
                tok => {
                    if !expr.is_empty() {
                        expr.push(' ');
                    }
                    expr.push_str(&token_text(tok));
                }
            }
            j += 1;
        }

        let alias = if select_list.get(j).map_or(false, |t| t.is_kw("as")) {
            let alias = select_list.get(j + 1).and_then(Tok::ident).map(str::to_string);
            j += 2;
            alias
        } else {
            None
        };

        aggregates.push(Aggregate { func, expr, alias });
        i = j;
    }

    aggregates
}

fn token_text(tok: &Tok) -> String {
    match tok {
        Tok::Word(w) | Tok::Quoted(w) => w.clone(),
        Tok::Str(s) => format!("'{s}'"),
        Tok::Num(n) => n.clone(),
        Tok::Param(n) => format!("${n}"),
        Tok::NamedParam(name) => format!("${name}"),
        Tok::Sym(c) => c.to_string(),
    }
}

fn extract_insert_bindings(toks: &[Tok], after_table: usize, stmt: &mut Statement) {
    let mut i = after_table;
    if toks.get(i) != Some(&Tok::Sym('(')) {
        return;
    }
    i += 1;

    while let Some(tok) = toks.get(i) {
        match tok {
            Tok::Sym(')') => {
                i += 1;
                break;
            }
            Tok::Sym(',') => i += 1,
            t => {
                if let Some(name) = t.ident() {
                    stmt.insert_columns.push(name.to_string());
                }
                i += 1;
            }
        }
    }

    if !toks.get(i).map_or(false, |t| t.is_kw("values")) {
        stmt.insert_columns.clear();
        return;
    }
    i += 1;
    if toks.get(i) != Some(&Tok::Sym('(')) {
        stmt.insert_columns.clear();
        return;
    }
    i += 1;

    // First tuple only: multi-row inserts route by their first row.
    let mut depth = 1i32;
    let mut current: Vec<Tok> = Vec::new();
    while let Some(tok) = toks.get(i) {
        match tok {
            Tok::Sym('(') => {
                depth += 1;
                current.push(tok.clone());
            }
            Tok::Sym(')') => {
                depth -= 1;
                if depth == 0 {
                    stmt.insert_values.push(tuple_value(&current));
                    break;
                }
                current.push(tok.clone());
            }
            Tok::Sym(',') if depth == 1 => {
                stmt.insert_values.push(tuple_value(&current));
                current.clear();
            }
            tok => current.push(tok.clone()),
        }
        i += 1;
    }
}

/// A single VALUES slot: resolvable when it is exactly one placeholder or
/// literal, opaque (None) when it is an expression.
fn tuple_value(toks: &[Tok]) -> Option<BoundValue> {
    if toks.len() != 1 {
        return None;
    }
    match &toks[0] {
        Tok::Param(n) if *n >= 1 => Some(BoundValue::Placeholder(*n)),
        Tok::Str(s) => Some(BoundValue::Literal(SqlValue::Text(s.clone()))),
        Tok::Num(n) => n
            .parse::<i64>()
            .map(|int| BoundValue::Literal(SqlValue::Int(int)))
            .ok()
            .or_else(|| n.parse::<f64>().ok().map(|f| BoundValue::Literal(SqlValue::Float(f)))),
        Tok::Word(w) if w.eq_ignore_ascii_case("null") => {
            Some(BoundValue::Literal(SqlValue::Null))
        }
        Tok::Word(w) if w.eq_ignore_ascii_case("true") => {
            Some(BoundValue::Literal(SqlValue::Bool(true)))
        }
        Tok::Word(w) if w.eq_ignore_ascii_case("false") => {
            Some(BoundValue::Literal(SqlValue::Bool(false)))
        }
        _ => None,
    }
}

fn extract_order_by(toks: &[Tok], stmt: &mut Statement) {
    let Some(order) = find_top_level_kw(toks, 1, "order") else {
        return;
    };
    if !toks.get(order + 1).map_or(false, |t| t.is_kw("by")) {
        return;
    }

    let mut i = order + 2;
    while let Some(tok) = toks.get(i) {
        if tok.is_kw("limit") || tok.is_kw("offset") || tok == &Tok::Sym(';') {
            break;
        }

        // Column, possibly table-qualified; keep the last component.
        let Some(mut column) = tok.ident().map(str::to_string) else {
            break;
        };
        i += 1;
        if toks.get(i) == Some(&Tok::Sym('.')) {
            if let Some(part) = toks.get(i + 1).and_then(Tok::ident) {
                column = part.to_string();
                i += 2;
            }
        }

        let mut direction = SortDirection::Asc;
        if let Some(next) = toks.get(i) {
            if next.is_kw("asc") {
                i += 1;
            } else if next.is_kw("desc") {
                direction = SortDirection::Desc;
                i += 1;
            }
        }
        stmt.order_by.push((column, direction));

        if toks.get(i) == Some(&Tok::Sym(',')) {
            i += 1;
        } else {
            break;
        }
    }
}

fn extract_limit_offset(toks: &[Tok], stmt: &mut Statement) {
    if let Some(limit) = find_top_level_kw(toks, 1, "limit") {
        if let Some(Tok::Num(n)) = toks.get(limit + 1) {
            stmt.limit = n.parse().ok();
        }
    }
    if let Some(offset) = find_top_level_kw(toks, 1, "offset") {
        if let Some(Tok::Num(n)) = toks.get(offset + 1) {
            stmt.offset = n.parse().ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_statement_kinds() {
        assert_eq!(parse("SELECT * FROM users").kind, StatementKind::Select);
        assert_eq!(
            parse("insert into users (id) values (1)").kind,
            StatementKind::Insert
        );
        assert_eq!(parse("UPDATE users SET x = 1").kind, StatementKind::Update);
        assert_eq!(parse("DELETE FROM users").kind, StatementKind::Delete);
        assert_eq!(parse("CREATE TABLE t (id INT)").kind, StatementKind::Other);
        assert_eq!(parse("").kind, StatementKind::Other);
    }

    #[test]
    fn extracts_qualified_and_quoted_tables() {
        let stmt = parse("SELECT * FROM commerce.Users");
        assert_eq!(stmt.keyspace.as_deref(), Some("commerce"));
        assert_eq!(stmt.table.as_deref(), Some("Users"));

        let stmt = parse(r#"SELECT * FROM "Order Items""#);
        assert_eq!(stmt.table.as_deref(), Some("Order Items"));

        let stmt = parse("SELECT * FROM `users`");
        assert_eq!(stmt.table.as_deref(), Some("users"));
    }

    #[test]
    fn finds_first_where_equality() {
        let stmt = parse("SELECT * FROM users WHERE id = $1 AND age = 30");
        assert_eq!(
            stmt.where_equality,
            Some(("id".to_string(), BoundValue::Placeholder(1)))
        );

        let stmt = parse("SELECT * FROM users WHERE name = 'Alice'");
        assert_eq!(
            stmt.where_equality,
            Some((
                "name".to_string(),
                BoundValue::Literal(SqlValue::Text("Alice".into()))
            ))
        );

        let stmt = parse("SELECT * FROM users WHERE u.id = 42");
        assert_eq!(
            stmt.where_equality,
            Some(("id".to_string(), BoundValue::Literal(SqlValue::Int(42))))
        );
    }

    #[test]
    fn placeholders_inside_literals_are_ignored() {
        let stmt = parse("SELECT * FROM logs WHERE message = 'cost is $1' AND id = $2");
        assert_eq!(
            stmt.where_equality,
            Some((
                "message".to_string(),
                BoundValue::Literal(SqlValue::Text("cost is $1".into()))
            ))
        );

        let stmt = parse(r#"SELECT "weird$1name" FROM t WHERE id = $1"#);
        assert_eq!(
            stmt.where_equality,
            Some(("id".to_string(), BoundValue::Placeholder(1)))
        );
    }

    #[test]
    fn comments_are_skipped() {
        let stmt = parse(
            "-- leading comment with WHERE id = 9\n\
             SELECT * FROM users /* WHERE id = 8 */ WHERE id = 7",
        );
        assert_eq!(stmt.table.as_deref(), Some("users"));
        assert_eq!(
            stmt.where_equality,
            Some(("id".to_string(), BoundValue::Literal(SqlValue::Int(7))))
        );
    }

    #[test]
    fn escaped_quotes_stay_inside_literals() {
        let stmt = parse("SELECT * FROM users WHERE name = 'O''Brien'");
        assert_eq!(
            stmt.where_equality,
            Some((
                "name".to_string(),
                BoundValue::Literal(SqlValue::Text("O'Brien".into()))
            ))
        );
    }

    #[test]
    fn extracts_aggregates_with_aliases() {
        let stmt = parse("SELECT COUNT(*), SUM(amount) AS total FROM orders");
        assert_eq!(stmt.aggregates.len(), 2);
        assert_eq!(stmt.aggregates[0].func, AggregateFunc::Count);
        assert_eq!(stmt.aggregates[0].expr, "*");
        assert_eq!(stmt.aggregates[0].output_column(), "count");
        assert_eq!(stmt.aggregates[1].func, AggregateFunc::Sum);
        assert_eq!(stmt.aggregates[1].expr, "amount");
        assert_eq!(stmt.aggregates[1].output_column(), "total");
    }

    #[test]
    fn aggregate_keywords_in_literals_do_not_count() {
        let stmt = parse("SELECT 'count(*)' FROM t");
        assert!(stmt.aggregates.is_empty());
    }

    #[test]
    fn extracts_order_by_limit_offset() {
        let stmt = parse("SELECT id, age FROM users ORDER BY age DESC, id LIMIT 3 OFFSET 6");
        assert_eq!(
            stmt.order_by,
            vec![
                ("age".to_string(), SortDirection::Desc),
                ("id".to_string(), SortDirection::Asc),
            ]
        );
        assert_eq!(stmt.limit, Some(3));
        assert_eq!(stmt.offset, Some(6));
    }

    #[test]
    fn insert_values_are_indexed_by_column() {
        let stmt = parse("INSERT INTO users (id, name, active) VALUES ($1, 'Bob', true)");
        assert_eq!(stmt.insert_value("id"), Some(&BoundValue::Placeholder(1)));
        assert_eq!(
            stmt.insert_value("NAME"),
            Some(&BoundValue::Literal(SqlValue::Text("Bob".into())))
        );
        assert_eq!(
            stmt.insert_value("active"),
            Some(&BoundValue::Literal(SqlValue::Bool(true)))
        );
        assert_eq!(stmt.insert_value("missing"), None);
    }

    #[test]
    fn insert_expression_values_are_opaque() {
        let stmt = parse("INSERT INTO users (id, created) VALUES ($1, now())");
        assert_eq!(stmt.insert_value("id"), Some(&BoundValue::Placeholder(1)));
        assert_eq!(stmt.insert_value("created"), None);
    }

    #[test]
    fn cte_statements_classify_by_their_body() {
        let stmt = parse("WITH recent AS (SELECT * FROM orders) SELECT * FROM recent");
        assert_eq!(stmt.kind, StatementKind::Select);
        assert_eq!(stmt.table.as_deref(), Some("recent"));
    }

    #[test]
    fn subquery_from_yields_no_table() {
        let stmt = parse("SELECT * FROM (SELECT 1) sub");
        assert_eq!(stmt.kind, StatementKind::Select);
        assert_eq!(stmt.table, None);
    }

    #[test]
    fn bound_values_resolve_against_params() {
        let params = vec![SqlValue::Int(42)];
        assert_eq!(
            BoundValue::Placeholder(1).resolve(&params),
            Some(SqlValue::Int(42))
        );
        assert_eq!(BoundValue::Placeholder(2).resolve(&params), None);
    }
}
