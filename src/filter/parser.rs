//! Tokenizer and recursive-descent parser for filter strings.
//!
//! ```text
//! expr   := term ("AND" term)*
//! term   := ident "=" string
//! string := '"' chars '"' | "'" chars "'"
//! ```

use thiserror::Error;

use super::{FilterExpression, Predicate};
use crate::models::ResourceSchema;

/// Malformed filter input; positions are byte offsets into the input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterParseError {
    #[error("unexpected character '{found}' at position {position}")]
    UnexpectedChar { position: usize, found: char },

    #[error("unterminated string starting at position {position}")]
    UnterminatedString { position: usize },

    #[error("expected {expected} at position {position}, found {found}")]
    Expected {
        position: usize,
        expected: &'static str,
        found: String,
    },

    #[error("unknown filter field '{field}' at position {position}")]
    UnknownField { position: usize, field: String },
}

impl FilterParseError {
    pub fn position(&self) -> usize {
        match self {
            Self::UnexpectedChar { position, .. }
            | Self::UnterminatedString { position }
            | Self::Expected { position, .. }
            | Self::UnknownField { position, .. } => *position,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    Equals,
    And,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier '{name}'"),
            Token::Str(value) => format!("string \"{value}\""),
            Token::Equals => "'='".to_string(),
            Token::And => "AND".to_string(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, FilterParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(position, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '=' => {
                chars.next();
                tokens.push((position, Token::Equals));
            }
            '"' | '\'' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, next)) = chars.next() {
                    match next {
                        '\\' => {
                            if let Some((_, escaped)) = chars.next() {
                                value.push(escaped);
                            }
                        }
                        n if n == c => {
                            closed = true;
                            break;
                        }
                        n => value.push(n),
                    }
                }
                if !closed {
                    return Err(FilterParseError::UnterminatedString { position });
                }
                tokens.push((position, Token::Str(value)));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' || next == '.' || next == '-' {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let token = if word == "AND" { Token::And } else { Token::Ident(word) };
                tokens.push((position, token));
            }
            found => return Err(FilterParseError::UnexpectedChar { position, found }),
        }
    }

    Ok(tokens)
}

/// Parse `input` against the filterable fields of `schema`
pub fn parse(input: &str, schema: &ResourceSchema) -> Result<FilterExpression, FilterParseError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Ok(FilterExpression::match_all());
    }

    let end = input.len();
    let mut cursor = tokens.into_iter().peekable();
    let mut terms = Vec::new();

    loop {
        let (position, field) = match cursor.next() {
            Some((position, Token::Ident(name))) => (position, name),
            Some((position, other)) => {
                return Err(FilterParseError::Expected {
                    position,
                    expected: "field name",
                    found: other.describe(),
                })
            }
            None => {
                return Err(FilterParseError::Expected {
                    position: end,
                    expected: "field name",
                    found: "end of input".to_string(),
                })
            }
        };

        let kind = schema
            .filter_field(&field)
            .map(|f| f.kind.clone())
            .ok_or_else(|| FilterParseError::UnknownField {
                position,
                field: field.clone(),
            })?;

        expect(&mut cursor, end, "'='", |t| matches!(t, Token::Equals))?;

        let value = match cursor.next() {
            Some((_, Token::Str(value))) => value,
            Some((position, other)) => {
                return Err(FilterParseError::Expected {
                    position,
                    expected: "quoted string",
                    found: other.describe(),
                })
            }
            None => {
                return Err(FilterParseError::Expected {
                    position: end,
                    expected: "quoted string",
                    found: "end of input".to_string(),
                })
            }
        };

        terms.push(Predicate { field, value, kind });

        match cursor.next() {
            None => break,
            Some((_, Token::And)) => continue,
            Some((position, other)) => {
                return Err(FilterParseError::Expected {
                    position,
                    expected: "AND",
                    found: other.describe(),
                })
            }
        }
    }

    Ok(FilterExpression { terms })
}

fn expect(
    cursor: &mut impl Iterator<Item = (usize, Token)>,
    end: usize,
    expected: &'static str,
    accept: impl Fn(&Token) -> bool,
) -> Result<(), FilterParseError> {
    match cursor.next() {
        Some((_, token)) if accept(&token) => Ok(()),
        Some((position, token)) => Err(FilterParseError::Expected {
            position,
            expected,
            found: token.describe(),
        }),
        None => Err(FilterParseError::Expected {
            position: end,
            expected,
            found: "end of input".to_string(),
        }),
    }
}
