//! SQL instrumentation helpers.
//!
//! Statements are logged through `tracing`. Literal values are stripped
//! before a statement reaches a log line, so credentials or personal data
//! embedded in an `INSERT` do not leak into log output.
//!
//! Field names follow the OpenTelemetry database conventions so that a
//! `tracing-opentelemetry` layer installed by the application picks them up
//! unchanged.

/// Database system identifier.
pub const DB_SYSTEM: &str = "mysql";

/// Span names for database operations.
pub mod span_names {
    /// Span name for connection establishment.
    pub const CONNECT: &str = "tabula.connect";
    /// Span name for query execution.
    pub const QUERY: &str = "tabula.query";
    /// Span name for pool acquisition.
    pub const ACQUIRE: &str = "tabula.acquire";
}

/// Configuration for SQL statement sanitization.
#[derive(Debug, Clone)]
pub struct SanitizationConfig {
    /// Whether to sanitize SQL statements.
    pub enabled: bool,
    /// Maximum length of statement to record.
    pub max_length: usize,
    /// Placeholder to use for sanitized values.
    pub placeholder: String,
}

impl Default for SanitizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_length: 2048,
            placeholder: "?".to_string(),
        }
    }
}

impl SanitizationConfig {
    /// Create a configuration that doesn't sanitize statements.
    #[must_use]
    pub fn no_sanitization() -> Self {
        Self {
            enabled: false,
            max_length: usize::MAX,
            placeholder: String::new(),
        }
    }

    /// Set the maximum recorded length.
    #[must_use]
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Sanitize a SQL statement according to the configuration.
    #[must_use]
    pub fn sanitize(&self, sql: &str) -> String {
        if !self.enabled {
            return truncate_string(sql, self.max_length);
        }

        let sanitized = sanitize_sql(sql, &self.placeholder);
        truncate_string(&sanitized, self.max_length)
    }
}

/// Replace literal values with placeholders.
///
/// Handles MySQL quoting: `'...'` and `"..."` strings with either doubled
/// quotes or backslash escapes, `X'..'` hex blobs, and backtick-quoted
/// identifiers (which are kept).
pub fn sanitize_sql(sql: &str, placeholder: &str) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '`' => {
                result.push(c);
                for ch in chars.by_ref() {
                    result.push(ch);
                    if ch == '`' {
                        break;
                    }
                }
            }
            '\'' | '"' => {
                skip_string(&mut chars, c);
                if result.ends_with(['X', 'x'])
                    && !result[..result.len() - 1].ends_with(|ch: char| ch.is_alphanumeric())
                {
                    result.pop();
                }
                result.push_str(placeholder);
            }
            c if c.is_ascii_digit()
                && !result.ends_with(|ch: char| ch.is_alphanumeric() || ch == '_' || ch == '+') =>
            {
                while chars
                    .peek()
                    .is_some_and(|ch| ch.is_ascii_digit() || *ch == '.')
                {
                    chars.next();
                }
                result.push_str(placeholder);
            }
            c => result.push(c),
        }
    }

    result
}

fn skip_string(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, quote: char) {
    while let Some(c) = chars.next() {
        if c == '\\' {
            chars.next();
        } else if c == quote {
            if chars.peek() == Some(&quote) {
                chars.next();
                continue;
            }
            return;
        }
    }
}

/// Truncate a string to at most `max_len` characters.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max_len.saturating_sub(3)).collect();
        out.push_str("...");
        out
    }
}

/// Extract the operation type from a SQL statement.
#[must_use]
pub fn extract_operation(sql: &str) -> &'static str {
    let sql_upper = sql.trim_start().get(..16).unwrap_or(sql.trim_start()).to_uppercase();

    if sql_upper.starts_with("SELECT") {
        "SELECT"
    } else if sql_upper.starts_with("INSERT") {
        "INSERT"
    } else if sql_upper.starts_with("UPDATE") {
        "UPDATE"
    } else if sql_upper.starts_with("DELETE") {
        "DELETE"
    } else if sql_upper.starts_with("CALL") {
        "CALL"
    } else if sql_upper.starts_with("CREATE") {
        "CREATE"
    } else if sql_upper.starts_with("ALTER") {
        "ALTER"
    } else if sql_upper.starts_with("DROP") {
        "DROP"
    } else {
        "OTHER"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_operation() {
        assert_eq!(extract_operation("SELECT * FROM users"), "SELECT");
        assert_eq!(extract_operation("  select id from users"), "SELECT");
        assert_eq!(extract_operation("INSERT INTO users VALUES (1)"), "INSERT");
        assert_eq!(extract_operation("UPDATE users SET name = 'foo'"), "UPDATE");
        assert_eq!(extract_operation("DELETE FROM users"), "DELETE");
        assert_eq!(extract_operation("call refresh_totals()"), "CALL");
        assert_eq!(extract_operation("CREATE TABLE foo"), "CREATE");
        assert_eq!(extract_operation("DROP TABLE foo"), "DROP");
        assert_eq!(extract_operation("SHOW TABLES"), "OTHER");
        assert_eq!(extract_operation(""), "OTHER");
    }

    #[test]
    fn test_sanitize_sql() {
        let placeholder = "?";

        assert_eq!(
            sanitize_sql("SELECT * FROM users WHERE name = 'Alice'", placeholder),
            "SELECT * FROM users WHERE name = ?"
        );

        assert_eq!(
            sanitize_sql("INSERT INTO `t` (`a`,`b`) VALUES ('a',42)", placeholder),
            "INSERT INTO `t` (`a`,`b`) VALUES (?,?)"
        );

        // Backslash escapes
        assert_eq!(
            sanitize_sql(r"SELECT 1 FROM t WHERE name = 'O\'Brien'", placeholder),
            "SELECT ? FROM t WHERE name = ?"
        );

        // Doubled quotes
        assert_eq!(
            sanitize_sql("SELECT * WHERE name = 'O''Brien'", placeholder),
            "SELECT * WHERE name = ?"
        );

        // Hex blobs and aliased columns
        assert_eq!(
            sanitize_sql("SELECT u.`id` AS `u+id` FROM t WHERE b = X'00ff'", placeholder),
            "SELECT u.`id` AS `u+id` FROM t WHERE b = ?"
        );
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello world", 8), "hello...");
        assert_eq!(truncate_string("hi", 2), "hi");
        assert_eq!(truncate_string("日本語のテキスト", 5), "日本...");
    }

    #[test]
    fn test_sanitization_config() {
        let config = SanitizationConfig::default();
        assert!(config.enabled);
        assert_eq!(config.max_length, 2048);

        let config = SanitizationConfig::no_sanitization();
        let sql = "SELECT * FROM users WHERE name = 'Alice'";
        assert_eq!(config.sanitize(sql), sql);

        let config = SanitizationConfig::default().max_length(12);
        assert_eq!(config.sanitize("SELECT * FROM users"), "SELECT * ...");
    }
}
