//! `:name` placeholder rewriting.
//!
//! sqlx's SQLite driver only understands positional (`?`, `?NNN`) and `$NNN`
//! placeholders, so named placeholders are rewritten to numbered ones before
//! the statement is prepared.

/// SQL with named placeholders replaced by `?1`, `?2`, ...
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewritten {
    pub sql: String,
    /// Placeholder names; the name at index `i` is bound as `?{i + 1}`.
    pub names: Vec<String>,
}

/// Rewrite `:name` placeholders to SQLite numbered placeholders.
///
/// Placeholders inside string literals, quoted identifiers and comments are
/// left alone, as is the `::` sequence. A repeated name reuses its number.
pub fn rewrite(sql: &str) -> Rewritten {
    let mut out = String::with_capacity(sql.len());
    let mut names: Vec<String> = Vec::new();
    let mut chars = sql.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        match c {
            '\'' | '"' | '`' | '[' => {
                let close = if c == '[' { ']' } else { c };
                out.push(c);
                for (_, inner) in chars.by_ref() {
                    out.push(inner);
                    if inner == close {
                        break;
                    }
                }
            }
            '-' if matches!(chars.peek(), Some((_, '-'))) => {
                out.push(c);
                for (_, inner) in chars.by_ref() {
                    out.push(inner);
                    if inner == '\n' {
                        break;
                    }
                }
            }
            '/' if matches!(chars.peek(), Some((_, '*'))) => {
                out.push(c);
                if let Some((_, star)) = chars.next() {
                    out.push(star);
                }
                let mut prev = '\0';
                for (_, inner) in chars.by_ref() {
                    out.push(inner);
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
            }
            ':' if matches!(chars.peek(), Some((_, ':'))) => {
                out.push_str("::");
                chars.next();
            }
            ':' if matches!(chars.peek(), Some((_, next)) if next.is_alphabetic() || *next == '_') => {
                let mut name = String::new();
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_alphanumeric() || next == '_' {
                        name.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }

                let index = match names.iter().position(|known| *known == name) {
                    Some(index) => index,
                    None => {
                        names.push(name);
                        names.len() - 1
                    }
                };
                out.push('?');
                out.push_str(&(index + 1).to_string());
            }
            _ => out.push(c),
        }
    }

    Rewritten { sql: out, names }
}
