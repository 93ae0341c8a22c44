//! Shell-style splitting of a single override string.

use crate::parser::OverrideError;

/// Split `raw` into tokens on unquoted whitespace.
///
/// Single quotes keep their content literally, double quotes allow `\"` and
/// `\\` escapes, and a backslash outside quotes escapes the next character.
/// Quote characters themselves are removed from the tokens.
pub fn split_overrides(raw: &str) -> Result<Vec<String>, OverrideError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err(unterminated(raw, '\'')),
                    }
                }
            }
            '"' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(esc @ ('"' | '\\')) => current.push(esc),
                            Some(other) => {
                                current.push('\\');
                                current.push(other);
                            }
                            None => return Err(unterminated(raw, '"')),
                        },
                        Some(ch) => current.push(ch),
                        None => return Err(unterminated(raw, '"')),
                    }
                }
            }
            '\\' => {
                in_token = true;
                match chars.next() {
                    Some(next) => current.push(next),
                    None => {
                        return Err(OverrideError::Malformed {
                            raw: raw.to_string(),
                            reason: "no escaped character after trailing backslash".to_string(),
                        })
                    }
                }
            }
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                in_token = true;
                current.push(c);
            }
        }
    }

    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

fn unterminated(raw: &str, quote: char) -> OverrideError {
    OverrideError::Malformed {
        raw: raw.to_string(),
        reason: format!("unterminated {} quote", quote),
    }
}
