//! Shell quoting for the remote side and word splitting for option strings

use crate::error::QuoteError;

/// Quote `s` as one word for a POSIX shell
///
/// Words made only of safe characters pass through unchanged; anything else
/// is wrapped in single quotes with embedded single quotes closed, escaped
/// and reopened.
#[must_use]
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }

    let safe = s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if safe {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// Join words into one shell command line
#[must_use]
pub fn shell_join<I, S>(words: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    words
        .into_iter()
        .map(|w| shell_quote(w.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split an option string into words the way `sh` would
///
/// Handles single quotes, double quotes (with `\"`, `\\`, `\$` and `` \` ``
/// escapes) and backslash escapes. No expansion of any kind.
///
/// # Errors
/// Returns `QuoteError` on an unterminated quote or a trailing backslash
pub fn split_words(input: &str) -> Result<Vec<String>, QuoteError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err(QuoteError::Unterminated('\'')),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\' | '$' | '`')) => current.push(c),
                            Some(c) => {
                                current.push('\\');
                                current.push(c);
                            }
                            None => return Err(QuoteError::Unterminated('"')),
                        },
                        Some(c) => current.push(c),
                        None => return Err(QuoteError::Unterminated('"')),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(c) => current.push(c),
                    None => return Err(QuoteError::TrailingBackslash),
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        words.push(current);
    }

    Ok(words)
}
