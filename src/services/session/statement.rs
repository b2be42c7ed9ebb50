//! Lightweight SQL text handling.
//!
//! None of this parses SQL. It recognizes just enough lexical structure
//! (quotes, comments, trigger bodies) to split a user script into statements
//! and to sort each statement into a coarse kind. The engine stays the only
//! real parser.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

/// Coarse statement kind, decided on the leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// CREATE, DROP or ALTER: the catalog must be rebuilt afterwards
    Structural,
    Other,
}

/// Classify a statement by its leading keyword.
pub fn classify_statement(sql: &str) -> StatementKind {
    static STRUCTURAL_REGEX: OnceLock<Regex> = OnceLock::new();
    let re = STRUCTURAL_REGEX.get_or_init(|| {
        Regex::new(r"(?i)^\s*(CREATE|DROP|ALTER)\s").expect("valid structural statement regex")
    });

    if re.is_match(sql) {
        StatementKind::Structural
    } else {
        StatementKind::Other
    }
}

/// Whether a statement only reads, judged on its leading keyword.
///
/// Conservative: `WITH` and `PRAGMA` are not considered read-only.
pub fn is_read_only(sql: &str) -> bool {
    static READ_REGEX: OnceLock<Regex> = OnceLock::new();
    let re = READ_REGEX
        .get_or_init(|| Regex::new(r"(?i)^\s*(SELECT|VALUES)\b").expect("valid read regex"));
    re.is_match(sql)
}

/// Whether a statement may return different rows on every run, e.g. by
/// calling `random()` or reading the clock. Such reads are never cached.
pub fn is_volatile(sql: &str) -> bool {
    static VOLATILE_REGEX: OnceLock<Regex> = OnceLock::new();
    let re = VOLATILE_REGEX.get_or_init(|| {
        Regex::new(
            r"(?i)\b(random|randomblob|date|time|datetime|julianday|unixepoch|strftime|timediff|changes|total_changes|last_insert_rowid)\s*\(|\bCURRENT_(DATE|TIME|TIMESTAMP)\b",
        )
        .expect("valid volatile function regex")
    });
    re.is_match(sql)
}

/// Rewrite `COLLATE unicase` to the built-in `COLLATE NOCASE`.
///
/// Files written by some desktop tools declare a `unicase` collation that
/// plain SQLite does not register.
pub fn normalize_collations(sql: &str) -> Cow<'_, str> {
    static COLLATE_REGEX: OnceLock<Regex> = OnceLock::new();
    let re = COLLATE_REGEX
        .get_or_init(|| Regex::new(r"(?i)COLLATE\s+unicase\b").expect("valid collate regex"));
    re.replace_all(sql, "COLLATE NOCASE")
}

fn closing_quote(c: char) -> Option<char> {
    match c {
        '\'' | '"' | '`' => Some(c),
        '[' => Some(']'),
        _ => None,
    }
}

/// Remove `--` line comments and `/* */` block comments.
///
/// Comment markers inside string literals and quoted identifiers are kept.
/// A block comment becomes a single space so that adjacent tokens stay apart.
pub fn strip_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '-' if chars.peek() == Some(&'-') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
                out.push(' ');
            }
            _ => {
                quote = closing_quote(c);
                out.push(c);
            }
        }
    }

    out
}

/// Split a script into trimmed, non-empty statements on `;`.
///
/// Semicolons inside quotes are not separators, nor are those inside the
/// `BEGIN ... END` body of a `CREATE TRIGGER`. Comments should be stripped
/// first.
pub fn split_statements(script: &str) -> Vec<String> {
    let mut splitter = Splitter::default();
    let mut quote: Option<char> = None;

    for c in script.chars() {
        if let Some(q) = quote {
            splitter.current.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }

        if let Some(q) = closing_quote(c) {
            splitter.end_word();
            quote = Some(q);
            splitter.current.push(c);
            continue;
        }

        if c == ';' {
            splitter.end_word();
            if splitter.block_depth == 0 {
                splitter.finish_statement();
            } else {
                splitter.current.push(c);
            }
            continue;
        }

        if c.is_alphanumeric() || c == '_' {
            splitter.word.push(c);
        } else {
            splitter.end_word();
        }
        splitter.current.push(c);
    }

    splitter.finish_statement();
    splitter.statements
}

#[derive(Default)]
struct Splitter {
    statements: Vec<String>,
    current: String,
    word: String,
    /// First three keywords of the current statement, uppercased
    leading: Vec<String>,
    block_depth: usize,
}

impl Splitter {
    fn in_trigger(&self) -> bool {
        match self.leading.as_slice() {
            [create, trigger, ..] if create == "CREATE" && trigger == "TRIGGER" => true,
            [create, temp, trigger]
                if create == "CREATE"
                    && (temp == "TEMP" || temp == "TEMPORARY")
                    && trigger == "TRIGGER" =>
            {
                true
            }
            _ => false,
        }
    }

    fn end_word(&mut self) {
        if self.word.is_empty() {
            return;
        }

        let upper = self.word.to_ascii_uppercase();
        self.word.clear();

        if self.leading.len() < 3 {
            self.leading.push(upper.clone());
        }

        if !self.in_trigger() {
            return;
        }

        // CASE shares END with BEGIN
        match upper.as_str() {
            "BEGIN" | "CASE" => self.block_depth += 1,
            "END" => self.block_depth = self.block_depth.saturating_sub(1),
            _ => {}
        }
    }

    fn finish_statement(&mut self) {
        self.end_word();

        let statement = self.current.trim();
        if !statement.is_empty() {
            self.statements.push(statement.to_string());
        }

        self.current.clear();
        self.leading.clear();
        self.block_depth = 0;
    }
}

/// Strip comments, then split into statements.
pub fn prepare_script(script: &str) -> Vec<String> {
    split_statements(&strip_comments(script))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volatile_reads() {
        assert!(is_volatile("SELECT random()"));
        assert!(is_volatile("select DATETIME('now')"));
        assert!(is_volatile("SELECT CURRENT_TIMESTAMP"));
        assert!(!is_volatile("SELECT order_date FROM Orders"));
        assert!(!is_volatile("SELECT COUNT(*) FROM Orders"));
    }

    #[test]
    fn test_classify_statement() {
        assert_eq!(classify_statement("CREATE TABLE t(x)"), StatementKind::Structural);
        assert_eq!(classify_statement("  drop view v"), StatementKind::Structural);
        assert_eq!(classify_statement("\nALTER TABLE t ADD y"), StatementKind::Structural);
        assert_eq!(classify_statement("SELECT 1"), StatementKind::Other);
        assert_eq!(classify_statement("INSERT INTO created VALUES (1)"), StatementKind::Other);
        // Needs whitespace after the keyword
        assert_eq!(classify_statement("CREATED"), StatementKind::Other);
    }

    #[test]
    fn test_is_read_only() {
        assert!(is_read_only("select * from t"));
        assert!(is_read_only("VALUES (1), (2)"));
        assert!(!is_read_only("SELECTED"));
        assert!(!is_read_only("UPDATE t SET x = 1"));
        assert!(!is_read_only("WITH x AS (SELECT 1) DELETE FROM t"));
    }

    #[test]
    fn test_normalize_collations() {
        assert_eq!(
            normalize_collations("CREATE TABLE t (a TEXT COLLATE  UNICASE)"),
            "CREATE TABLE t (a TEXT COLLATE NOCASE)"
        );
        assert!(matches!(normalize_collations("SELECT 1"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_strip_comments() {
        assert_eq!(
            strip_comments("SELECT 1; -- trailing\nSELECT /* inline */ 2"),
            "SELECT 1; \nSELECT   2"
        );
        assert_eq!(
            strip_comments("SELECT '--not a comment', \"/*x*/\""),
            "SELECT '--not a comment', \"/*x*/\""
        );
        assert_eq!(strip_comments("SELECT 1 /* unterminated"), "SELECT 1  ");
    }

    #[test]
    fn test_split_statements() {
        assert_eq!(
            split_statements("SELECT 1; ; SELECT 'a;b' ;\n\n"),
            vec!["SELECT 1", "SELECT 'a;b'"]
        );
        assert_eq!(
            split_statements(r#"INSERT INTO "we;ird" VALUES ('it''s;fine')"#),
            vec![r#"INSERT INTO "we;ird" VALUES ('it''s;fine')"#]
        );
    }

    #[test]
    fn test_split_keeps_trigger_bodies() {
        let script = "CREATE TRIGGER trg AFTER INSERT ON t BEGIN \
                      UPDATE t SET x = CASE WHEN 1 THEN 2 END; \
                      INSERT INTO log VALUES (1); \
                      END; SELECT 1";
        let statements = split_statements(script);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].ends_with("END"));
        assert_eq!(statements[1], "SELECT 1");
    }

    #[test]
    fn test_transaction_keywords_still_split() {
        assert_eq!(
            split_statements("BEGIN; INSERT INTO t VALUES (1); END;"),
            vec!["BEGIN", "INSERT INTO t VALUES (1)", "END"]
        );
    }

    #[test]
    fn test_prepare_script() {
        assert_eq!(
            prepare_script("-- setup\nCREATE TABLE t(x); /* seed */ INSERT INTO t VALUES (1);"),
            vec!["CREATE TABLE t(x)", "INSERT INTO t VALUES (1)"]
        );
    }
}
