//! `:name` placeholders for the demo queries.
//!
//! MySQL only understands positional `?`, so named statements are rewritten
//! and their arguments bound in order.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use sqlx::mysql::MySqlArguments;
use sqlx::query::Query;
use sqlx::MySql;

/// A statement rewritten to positional placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedStatement {
    pub sql: String,
    pub names: Vec<String>,
}

/// Rewrite `:name` to `?`, remembering the order of names.
///
/// Quoted text and `::` are left alone.
pub fn compile(sql: &str) -> NamedStatement {
    let mut out = String::with_capacity(sql.len());
    let mut names = Vec::new();
    let mut chars = sql.char_indices().peekable();
    let mut quote: Option<char> = None;

    while let Some((_, c)) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                out.push(c);
            }
            ':' if matches!(chars.peek(), Some((_, ':'))) => {
                out.push_str("::");
                chars.next();
            }
            ':' if matches!(chars.peek(), Some((_, n)) if is_name_start(*n)) => {
                let mut name = String::new();
                while let Some(&(_, n)) = chars.peek() {
                    if !is_name_char(n) {
                        break;
                    }
                    name.push(n);
                    chars.next();
                }
                names.push(name);
                out.push('?');
            }
            _ => out.push(c),
        }
    }

    NamedStatement { sql: out, names }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl NamedStatement {
    /// Build a query with every named argument bound
    pub fn bind<'q>(
        &'q self,
        args: &'q HashMap<&str, String>,
    ) -> Result<Query<'q, MySql, MySqlArguments>> {
        let mut query = sqlx::query(&self.sql);
        for value in self.ordered_args(args)? {
            query = query.bind(value);
        }
        Ok(query)
    }

    /// Argument values in placeholder order
    pub fn ordered_args<'a>(&self, args: &'a HashMap<&str, String>) -> Result<Vec<&'a str>> {
        self.names
            .iter()
            .map(|name| {
                args.get(name.as_str())
                    .map(String::as_str)
                    .ok_or_else(|| anyhow!("missing named argument :{}", name))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_insert() {
        let stmt = compile("INSERT INTO users (name, f1, f2) VALUES (:name, :f1, :f2)");
        assert_eq!(stmt.sql, "INSERT INTO users (name, f1, f2) VALUES (?, ?, ?)");
        assert_eq!(stmt.names, vec!["name", "f1", "f2"]);
    }

    #[test]
    fn test_compile_where_clause() {
        let stmt = compile("SELECT * FROM users WHERE name=:fn");
        assert_eq!(stmt.sql, "SELECT * FROM users WHERE name=?");
        assert_eq!(stmt.names, vec!["fn"]);
    }

    #[test]
    fn test_quotes_and_casts_untouched() {
        let stmt = compile("SELECT ':nope', x::text FROM t WHERE a = :a");
        assert_eq!(stmt.sql, "SELECT ':nope', x::text FROM t WHERE a = ?");
        assert_eq!(stmt.names, vec!["a"]);
    }

    #[test]
    fn test_bind_reports_missing_argument() {
        let stmt = compile("SELECT * FROM users WHERE name=:fn");
        let args = HashMap::new();
        let err = stmt.bind(&args).err().expect("missing argument must fail");
        assert!(err.to_string().contains(":fn"));
    }
}
