//! Postgres → SQLite dialect translation.
//!
//! The input is tokenized (string literals, quoted identifiers and comments
//! are opaque), rewritten as a token stream, and re-rendered with
//! normalized whitespace. Running the translator over its own output is a
//! no-op: every rewrite produces SQLite forms no rule matches again.
//!
//! Policy for the `~` regex operator: it becomes `GLOB` (case-sensitive
//! matching, the closest SQLite primitive). The pattern itself is passed
//! through untouched.

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Word(String),
    /// Quoted identifier, with the quote character preserved.
    Quoted(String, char),
    Str(String),
    Num(String),
    /// `$n` / `$name`, passed through for the param rewriter.
    Param(String),
    /// Single- or multi-character operator/punctuation.
    Op(String),
}

fn tokenize(sql: &str) -> Vec<Tok> {
    let bytes = sql.as_bytes();
    let mut toks = Vec::new();
    let mut i = 0;

    const MULTI_OPS: [&str; 8] = ["->>", "::", "!=", "<=", ">=", "<>", "||", "->"];

    while i < bytes.len() {
        let c = bytes[i] as char;

        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '-' && bytes.get(i + 1) == Some(&b'-') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }
        if c == '/' && bytes.get(i + 1) == Some(&b'*') {
            i += 2;
            while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                i += 1;
            }
            i = (i + 2).min(bytes.len());
            continue;
        }
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
        if c == '"' || c == '`' {
            let quote = bytes[i];
            let mut content = String::new();
            i += 1;
            while i < bytes.len() {
                if bytes[i] == quote {
                    i += 1;
                    break;
                }
                content.push(bytes[i] as char);
                i += 1;
            }
            toks.push(Tok::Quoted(content, quote as char));
            continue;
        }
        if c == '$' {
            let start = i;
            i += 1;
            while i < bytes.len()
                && ((bytes[i] as char).is_ascii_alphanumeric() || bytes[i] == b'_')
            {
                i += 1;
            }
            toks.push(Tok::Param(sql[start..i].to_string()));
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len()
                && ((bytes[i] as char).is_ascii_digit() || bytes[i] == b'.')
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

        if let Some(op) = MULTI_OPS
            .iter()
            .find(|op| sql[i..].starts_with(**op))
        {
            toks.push(Tok::Op((*op).to_string()));
            i += op.len();
            continue;
        }

        toks.push(Tok::Op(c.to_string()));
        i += c.len_utf8();
    }

    toks
}

fn render(toks: &[Tok]) -> String {
    let mut out = String::new();
    for (idx, tok) in toks.iter().enumerate() {
        let text = match tok {
            Tok::Word(w) | Tok::Num(w) | Tok::Param(w) | Tok::Op(w) => w.clone(),
            Tok::Quoted(content, quote) => format!("{quote}{content}{quote}"),
            Tok::Str(content) => format!("'{}'", content.replace('\'', "''")),
        };

        if idx > 0 && needs_space(&toks[idx - 1], tok) {
            out.push(' ');
        }
        out.push_str(&text);
    }
    out
}

fn needs_space(prev: &Tok, next: &Tok) -> bool {
    let prev_op = |s: &str| matches!(prev, Tok::Op(op) if op == s);
    let next_op = |s: &str| matches!(next, Tok::Op(op) if op == s);

    if prev_op("(") || prev_op(".") {
        return false;
    }
    if next_op(")") || next_op(",") || next_op(";") || next_op(".") || next_op("(") {
        return false;
    }
    true
}

fn word_eq(tok: Option<&Tok>, word: &str) -> bool {
    matches!(tok, Some(Tok::Word(w)) if w.eq_ignore_ascii_case(word))
}

fn is_keyword(word: &str) -> bool {
    const KEYWORDS: [&str; 22] = [
        "select", "from", "where", "and", "or", "not", "in", "on", "set", "values", "by",
        "when", "then", "else", "returning", "having", "join", "union", "all", "distinct",
        "as", "case",
    ];
    KEYWORDS.iter().any(|k| word.eq_ignore_ascii_case(k))
}

/// Single-word type mapping used in DDL and casts. Returns the SQLite type
/// and whether a following parenthesized size/precision should be dropped.
fn map_type(word: &str) -> Option<(&'static str, bool)> {
    let w = word.to_ascii_uppercase();
    Some(match w.as_str() {
        "VARCHAR" | "CHAR" | "CHARACTER" => ("TEXT", true),
        "BOOLEAN" => ("INTEGER", false),
        "TIMESTAMP" | "TIMESTAMPTZ" | "DATE" | "TIME" | "TIMETZ" => ("TEXT", false),
        "UUID" | "JSON" | "JSONB" => ("TEXT", false),
        "BYTEA" => ("BLOB", false),
        "NUMERIC" | "DECIMAL" => ("REAL", true),
        "BIGINT" | "SMALLINT" => ("INTEGER", false),
        _ => return None,
    })
}

/// Translate Postgres-dialect SQL into SQLite SQL.
pub fn to_sqlite(sql: &str) -> String {
    let mut toks = tokenize(sql);

    let leading = toks
        .first()
        .and_then(|t| match t {
            Tok::Word(w) => Some(w.to_ascii_uppercase()),
            _ => None,
        })
        .unwrap_or_default();

    toks = rewrite_casts(toks);
    if leading == "CREATE" || leading == "ALTER" {
        toks = rewrite_serials(toks);
        toks = rewrite_types(toks);
    }
    if leading == "ALTER" {
        toks = strip_add_column_if_not_exists(toks);
    }
    toks = rewrite_values_and_functions(toks);

    render(&toks)
}

/// `expr::type` → `CAST(expr AS type)`. The expression is the immediately
/// preceding atom: a single token, or a parenthesized group (with an
/// optional function-name word in front).
fn rewrite_casts(toks: Vec<Tok>) -> Vec<Tok> {
    let mut toks = toks;
    loop {
        let Some(pos) = toks.iter().position(|t| matches!(t, Tok::Op(op) if op == "::")) else {
            return toks;
        };
        if pos == 0 || pos + 1 >= toks.len() {
            // Dangling cast; leave the operator as-is by renaming it so we
            // do not loop forever.
            toks[pos] = Tok::Op(":".repeat(2));
            return toks;
        }

        // Find the start of the expression atom.
        let mut start = pos - 1;
        if matches!(&toks[start], Tok::Op(op) if op == ")") {
            let mut depth = 1;
            while start > 0 && depth > 0 {
                start -= 1;
                match &toks[start] {
                    Tok::Op(op) if op == ")" => depth += 1,
                    Tok::Op(op) if op == "(" => depth -= 1,
                    _ => {}
                }
            }
            if start > 0 {
                if let Tok::Word(w) = &toks[start - 1] {
                    // A function call like `count(x)::int`, not a keyword
                    // preceding a parenthesized expression.
                    if !is_keyword(w) {
                        start -= 1;
                    }
                }
            }
        }

        // The target type: word, optionally `DOUBLE PRECISION`, optionally
        // with a parenthesized size that SQLite does not want.
        let mut end = pos + 1;
        let type_text = match &toks[pos + 1] {
            Tok::Word(w) => {
                let mut name = w.clone();
                if w.eq_ignore_ascii_case("double") && word_eq(toks.get(pos + 2), "precision") {
                    end += 1;
                    name = "REAL".to_string();
                } else if let Some((mapped, _)) = map_type(w) {
                    name = mapped.to_string();
                } else if w.eq_ignore_ascii_case("int") || w.eq_ignore_ascii_case("int4")
                    || w.eq_ignore_ascii_case("int8")
                {
                    name = "INTEGER".to_string();
                } else if w.eq_ignore_ascii_case("float8") || w.eq_ignore_ascii_case("float4") {
                    name = "REAL".to_string();
                }
                // Drop a parenthesized size.
                if matches!(toks.get(end + 1), Some(Tok::Op(op)) if op == "(") {
                    let mut j = end + 2;
                    let mut depth = 1;
                    while j < toks.len() && depth > 0 {
                        match &toks[j] {
                            Tok::Op(op) if op == "(" => depth += 1,
                            Tok::Op(op) if op == ")" => depth -= 1,
                            _ => {}
                        }
                        j += 1;
                    }
                    end = j - 1;
                }
                name
            }
            _ => return toks,
        };

        let expr: Vec<Tok> = toks[start..pos].to_vec();
        let mut replacement = vec![Tok::Word("CAST".to_string()), Tok::Op("(".to_string())];
        replacement.extend(expr);
        replacement.push(Tok::Word("AS".to_string()));
        replacement.push(Tok::Word(type_text));
        replacement.push(Tok::Op(")".to_string()));

        toks.splice(start..=end, replacement);
    }
}

/// SERIAL family. `id SERIAL PRIMARY KEY` becomes
/// `id INTEGER PRIMARY KEY AUTOINCREMENT`; a SERIAL without PRIMARY KEY in
/// its column definition becomes plain INTEGER.
fn rewrite_serials(toks: Vec<Tok>) -> Vec<Tok> {
    let mut toks = toks;
    let mut i = 0;
    while i < toks.len() {
        let is_serial = matches!(
            &toks[i],
            Tok::Word(w) if w.eq_ignore_ascii_case("serial")
                || w.eq_ignore_ascii_case("bigserial")
                || w.eq_ignore_ascii_case("smallserial")
        );
        if !is_serial {
            i += 1;
            continue;
        }

        // Scan the rest of this column definition (to `,` or the closing
        // paren at this depth) for PRIMARY KEY.
        let mut depth = 0i32;
        let mut primary_at = None;
        let mut j = i + 1;
        while j < toks.len() {
            match &toks[j] {
                Tok::Op(op) if op == "(" => depth += 1,
                Tok::Op(op) if op == ")" => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                Tok::Op(op) if op == "," && depth == 0 => break,
                Tok::Word(w)
                    if depth == 0
                        && w.eq_ignore_ascii_case("primary")
                        && word_eq(toks.get(j + 1), "key") =>
                {
                    primary_at = Some(j);
                }
                _ => {}
            }
            j += 1;
        }

        if let Some(primary_at) = primary_at {
            toks.drain(primary_at..primary_at + 2);
            toks.splice(
                i..i + 1,
                [
                    Tok::Word("INTEGER".to_string()),
                    Tok::Word("PRIMARY".to_string()),
                    Tok::Word("KEY".to_string()),
                    Tok::Word("AUTOINCREMENT".to_string()),
                ],
            );
            i += 4;
        } else {
            toks[i] = Tok::Word("INTEGER".to_string());
            i += 1;
        }
    }
    toks
}

/// Whole-word type rewrites inside DDL, multi-word forms first.
fn rewrite_types(toks: Vec<Tok>) -> Vec<Tok> {
    let mut out: Vec<Tok> = Vec::with_capacity(toks.len());
    let mut i = 0;

    while i < toks.len() {
        match &toks[i] {
            Tok::Word(w) if w.eq_ignore_ascii_case("double") && word_eq(toks.get(i + 1), "precision") => {
                out.push(Tok::Word("REAL".to_string()));
                i += 2;
            }
            Tok::Word(w)
                if w.eq_ignore_ascii_case("timestamp")
                    && word_eq(toks.get(i + 1), "with")
                    && word_eq(toks.get(i + 2), "time")
                    && word_eq(toks.get(i + 3), "zone") =>
            {
                out.push(Tok::Word("TEXT".to_string()));
                i += 4;
            }
            Tok::Word(w)
                if (w.eq_ignore_ascii_case("time") || w.eq_ignore_ascii_case("timestamp"))
                    && word_eq(toks.get(i + 1), "without") =>
            {
                // TIME/TIMESTAMP WITHOUT TIME ZONE
                out.push(Tok::Word("TEXT".to_string()));
                i += 4;
            }
            Tok::Word(w) => {
                if let Some((mapped, drop_parens)) = map_type(w) {
                    out.push(Tok::Word(mapped.to_string()));
                    i += 1;
                    if drop_parens && matches!(toks.get(i), Some(Tok::Op(op)) if op == "(") {
                        let mut depth = 1;
                        i += 1;
                        while i < toks.len() && depth > 0 {
                            match &toks[i] {
                                Tok::Op(op) if op == "(" => depth += 1,
                                Tok::Op(op) if op == ")" => depth -= 1,
                                _ => {}
                            }
                            i += 1;
                        }
                    }
                } else {
                    out.push(toks[i].clone());
                    i += 1;
                }
            }
            _ => {
                out.push(toks[i].clone());
                i += 1;
            }
        }
    }
    out
}

/// `ALTER TABLE … ADD COLUMN IF NOT EXISTS` → drop `IF NOT EXISTS`; a
/// duplicate column then surfaces as a plain QUERY_ERROR from the engine.
fn strip_add_column_if_not_exists(toks: Vec<Tok>) -> Vec<Tok> {
    let mut toks = toks;
    let mut i = 0;
    while i < toks.len() {
        if word_eq(toks.get(i), "add") {
            let mut j = i + 1;
            if word_eq(toks.get(j), "column") {
                j += 1;
            }
            if word_eq(toks.get(j), "if")
                && word_eq(toks.get(j + 1), "not")
                && word_eq(toks.get(j + 2), "exists")
            {
                toks.drain(j..j + 3);
            }
        }
        i += 1;
    }
    toks
}

fn str_tok(s: &str) -> Tok {
    Tok::Str(s.to_string())
}

fn word(s: &str) -> Tok {
    Tok::Word(s.to_string())
}

fn op(s: &str) -> Tok {
    Tok::Op(s.to_string())
}

/// Value, operator and function rewrites applied to every statement.
fn rewrite_values_and_functions(toks: Vec<Tok>) -> Vec<Tok> {
    let mut out: Vec<Tok> = Vec::with_capacity(toks.len());
    let mut i = 0;

    while i < toks.len() {
        match &toks[i] {
            Tok::Word(w) if w.eq_ignore_ascii_case("true") => {
                out.push(Tok::Num("1".to_string()));
                i += 1;
            }
            Tok::Word(w) if w.eq_ignore_ascii_case("false") => {
                out.push(Tok::Num("0".to_string()));
                i += 1;
            }
            Tok::Word(w) if w.eq_ignore_ascii_case("ilike") => {
                out.push(word("LIKE"));
                i += 1;
            }
            Tok::Op(o) if o == "~" => {
                out.push(word("GLOB"));
                i += 1;
            }
            Tok::Word(w) if w.eq_ignore_ascii_case("current_timestamp") => {
                out.extend([word("datetime"), op("("), str_tok("now"), op(")")]);
                i += 1;
            }
            Tok::Word(w)
                if w.eq_ignore_ascii_case("now")
                    && matches!(toks.get(i + 1), Some(Tok::Op(o)) if o == "(")
                    && matches!(toks.get(i + 2), Some(Tok::Op(o)) if o == ")") =>
            {
                out.extend([word("datetime"), op("("), str_tok("now"), op(")")]);
                i += 3;
            }
            Tok::Word(w)
                if w.eq_ignore_ascii_case("gen_random_uuid")
                    && matches!(toks.get(i + 1), Some(Tok::Op(o)) if o == "(")
                    && matches!(toks.get(i + 2), Some(Tok::Op(o)) if o == ")") =>
            {
                out.extend([
                    word("lower"),
                    op("("),
                    word("hex"),
                    op("("),
                    word("randomblob"),
                    op("("),
                    Tok::Num("16".to_string()),
                    op(")"),
                    op(")"),
                    op(")"),
                ]);
                i += 3;
            }
            Tok::Word(w)
                if w.eq_ignore_ascii_case("extract")
                    && matches!(toks.get(i + 1), Some(Tok::Op(o)) if o == "(")
                    && word_eq(toks.get(i + 2), "epoch")
                    && word_eq(toks.get(i + 3), "from") =>
            {
                // Capture the expression through the matching close paren.
                let mut j = i + 4;
                let mut depth = 1i32;
                let mut expr = Vec::new();
                while j < toks.len() {
                    match &toks[j] {
                        Tok::Op(o) if o == "(" => {
                            depth += 1;
                            expr.push(toks[j].clone());
                        }
                        Tok::Op(o) if o == ")" => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                            expr.push(toks[j].clone());
                        }
                        _ => expr.push(toks[j].clone()),
                    }
                    j += 1;
                }
                out.extend([word("strftime"), op("("), str_tok("%s"), op(",")]);
                out.extend(expr);
                out.push(op(")"));
                i = j + 1;
            }
            Tok::Op(o)
                if o == "="
                    && word_eq(toks.get(i + 1), "any")
                    && matches!(toks.get(i + 2), Some(Tok::Op(o)) if o == "(")
                    && word_eq(toks.get(i + 3), "array")
                    && matches!(toks.get(i + 4), Some(Tok::Op(o)) if o == "[") =>
            {
                // = ANY(ARRAY[a, b, c]) → IN (a, b, c)
                let mut j = i + 5;
                let mut depth = 1i32;
                let mut items = Vec::new();
                while j < toks.len() {
                    match &toks[j] {
                        Tok::Op(o) if o == "[" => {
                            depth += 1;
                            items.push(toks[j].clone());
                        }
                        Tok::Op(o) if o == "]" => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                            items.push(toks[j].clone());
                        }
                        _ => items.push(toks[j].clone()),
                    }
                    j += 1;
                }
                // Skip the ARRAY[...] closer and the ANY(...) closer.
                let mut end = j + 1;
                if matches!(toks.get(end), Some(Tok::Op(o)) if o == ")") {
                    end += 1;
                }
                out.push(word("IN"));
                out.push(op("("));
                out.extend(items);
                out.push(op(")"));
                i = end;
            }
            Tok::Word(w)
                if w.eq_ignore_ascii_case("fetch") && word_eq(toks.get(i + 1), "first") =>
            {
                // FETCH FIRST [n] ROWS ONLY → LIMIT n
                let mut j = i + 2;
                let count = if let Some(Tok::Num(n)) = toks.get(j) {
                    let n = n.clone();
                    j += 1;
                    n
                } else {
                    "1".to_string()
                };
                if word_eq(toks.get(j), "rows") || word_eq(toks.get(j), "row") {
                    j += 1;
                }
                if word_eq(toks.get(j), "only") {
                    j += 1;
                }
                out.push(word("LIMIT"));
                out.push(Tok::Num(count));
                i = j;
            }
            _ => {
                out.push(toks[i].clone());
                i += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized(sql: &str) -> String {
        sql.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn serial_with_primary_key_gets_autoincrement() {
        let out = to_sqlite("CREATE TABLE t (id SERIAL PRIMARY KEY, name VARCHAR(255))");
        assert_eq!(
            out,
            "CREATE TABLE t(id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT)"
        );
    }

    #[test]
    fn serial_without_primary_key_is_plain_integer() {
        let out = to_sqlite("CREATE TABLE t (seq BIGSERIAL, label TEXT)");
        assert_eq!(out, "CREATE TABLE t(seq INTEGER, label TEXT)");
    }

    #[test]
    fn type_table_rewrites() {
        let out = to_sqlite(
            "CREATE TABLE t (a BOOLEAN, b TIMESTAMPTZ, c UUID, d JSONB, e BYTEA, \
             f DOUBLE PRECISION, g NUMERIC(10,2), h BIGINT, i TIMESTAMP WITH TIME ZONE)",
        );
        assert_eq!(
            out,
            "CREATE TABLE t(a INTEGER, b TEXT, c TEXT, d TEXT, e BLOB, \
             f REAL, g REAL, h INTEGER, i TEXT)"
                .replace("  ", " ")
        );
    }

    #[test]
    fn booleans_and_now_rewrite_in_dml() {
        let out = to_sqlite("INSERT INTO t (a, b, c) VALUES (TRUE, FALSE, NOW())");
        assert_eq!(out, "INSERT INTO t(a, b, c) VALUES(1, 0, datetime('now'))");

        let out = to_sqlite("SELECT * FROM t WHERE created < CURRENT_TIMESTAMP");
        assert_eq!(out, "SELECT * FROM t WHERE created < datetime('now')");
    }

    #[test]
    fn true_inside_literal_survives() {
        let out = to_sqlite("SELECT * FROM t WHERE note = 'TRUE story'");
        assert_eq!(out, "SELECT * FROM t WHERE note = 'TRUE story'");
    }

    #[test]
    fn extract_epoch_becomes_strftime() {
        let out = to_sqlite("SELECT EXTRACT(EPOCH FROM created_at) FROM t");
        assert_eq!(out, "SELECT strftime('%s', created_at) FROM t");
    }

    #[test]
    fn gen_random_uuid_becomes_randomblob() {
        let out = to_sqlite("INSERT INTO t (id) VALUES (gen_random_uuid())");
        assert_eq!(out, "INSERT INTO t(id) VALUES(lower(hex(randomblob(16))))");
    }

    #[test]
    fn ilike_and_regex_operators() {
        assert_eq!(
            to_sqlite("SELECT * FROM t WHERE name ILIKE '%al%'"),
            "SELECT * FROM t WHERE name LIKE '%al%'"
        );
        assert_eq!(
            to_sqlite("SELECT * FROM t WHERE name ~ 'A*'"),
            "SELECT * FROM t WHERE name GLOB 'A*'"
        );
    }

    #[test]
    fn cast_operator_rewrites() {
        assert_eq!(
            to_sqlite("SELECT total::float8 FROM t"),
            "SELECT CAST(total AS REAL) FROM t"
        );
        assert_eq!(
            to_sqlite("SELECT '5'::int FROM t"),
            "SELECT CAST('5' AS INTEGER) FROM t"
        );
        assert_eq!(
            to_sqlite("SELECT (a + b)::varchar(10) FROM t"),
            "SELECT CAST((a + b) AS TEXT) FROM t"
        );
    }

    #[test]
    fn any_array_becomes_in() {
        let out = to_sqlite("SELECT * FROM t WHERE id = ANY(ARRAY[1, 2, 3])");
        assert_eq!(out, "SELECT * FROM t WHERE id IN(1, 2, 3)");
    }

    #[test]
    fn fetch_first_becomes_limit() {
        let out = to_sqlite("SELECT * FROM t FETCH FIRST 5 ROWS ONLY");
        assert_eq!(out, "SELECT * FROM t LIMIT 5");
    }

    #[test]
    fn preserved_constructs_pass_through() {
        let sql = "INSERT INTO t(a) VALUES($1) ON CONFLICT(a) DO UPDATE SET a = 1 RETURNING *";
        assert_eq!(normalized(&to_sqlite(sql)), normalized(sql));

        let cte = "WITH x AS(SELECT 1) SELECT * FROM x";
        assert_eq!(normalized(&to_sqlite(cte)), normalized(cte));
    }

    #[test]
    fn alter_add_column_if_not_exists_is_stripped() {
        let out = to_sqlite("ALTER TABLE t ADD COLUMN IF NOT EXISTS age BIGINT");
        assert_eq!(out, "ALTER TABLE t ADD COLUMN age INTEGER");
    }

    #[test]
    fn placeholders_are_untouched() {
        let out = to_sqlite("INSERT INTO users (name, active) VALUES ($2, $1) ON CONFLICT DO NOTHING");
        assert_eq!(
            out,
            "INSERT INTO users(name, active) VALUES($2, $1) ON CONFLICT DO NOTHING"
        );
    }

    #[test]
    fn translation_is_idempotent() {
        let inputs = [
            "CREATE TABLE t (id SERIAL PRIMARY KEY, name VARCHAR(255), active BOOLEAN)",
            "INSERT INTO t (a, b) VALUES (TRUE, NOW())",
            "SELECT EXTRACT(EPOCH FROM created_at) FROM t WHERE id = ANY(ARRAY[1,2])",
            "SELECT total::float8 FROM t WHERE name ILIKE 'x%' FETCH FIRST 3 ROWS ONLY",
            "ALTER TABLE t ADD COLUMN IF NOT EXISTS age BIGINT",
        ];
        for input in inputs {
            let once = to_sqlite(input);
            let twice = to_sqlite(&once);
            assert_eq!(once, twice, "not idempotent for {input}");
        }
    }
}
