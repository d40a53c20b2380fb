//! Quote-aware argument tokenizer.
//!
//! Splits a raw argument string into argv tokens the way a POSIX shell would
//! for the small subset toolgate needs: whitespace splitting, single and double
//! quotes, and backslash escapes. No expansion, globbing or substitution.

use thiserror::Error;

/// Tokenizer failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unbalanced {quote} quote in arguments")]
    UnbalancedQuote { quote: char },

    #[error("arguments end with a dangling escape character")]
    TrailingEscape,
}

/// Split `input` into tokens, failing on unbalanced quotes or a trailing escape.
pub fn split_args(input: &str) -> Result<Vec<String>, ParseError> {
    split(input, false)
}

/// Like [`split_args`], but a trailing escape is kept as a literal backslash.
///
/// Only meant for pre-flight repair and canonicalization, never for building
/// the argv that is actually executed.
pub fn split_args_lenient(input: &str) -> Result<Vec<String>, ParseError> {
    split(input, true)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

fn split(input: &str, lenient: bool) -> Result<Vec<String>, ParseError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    // Distinguishes an empty quoted token ("") from no token at all.
    let mut in_token = false;
    let mut quote = Quote::None;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Quote::Single, '\'') => quote = Quote::None,
            (Quote::Single, _) => current.push(c),
            (_, '\\') => match chars.next() {
                Some(next) => {
                    current.push(next);
                    in_token = true;
                }
                None if lenient => {
                    current.push('\\');
                    in_token = true;
                }
                None => return Err(ParseError::TrailingEscape),
            },
            (Quote::Double, '"') => quote = Quote::None,
            (Quote::Double, _) => current.push(c),
            (Quote::None, '\'') => {
                quote = Quote::Single;
                in_token = true;
            }
            (Quote::None, '"') => {
                quote = Quote::Double;
                in_token = true;
            }
            (Quote::None, ' ' | '\t' | '\r' | '\n') => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (Quote::None, _) => {
                current.push(c);
                in_token = true;
            }
        }
    }

    match quote {
        Quote::Single => return Err(ParseError::UnbalancedQuote { quote: '\'' }),
        Quote::Double => return Err(ParseError::UnbalancedQuote { quote: '"' }),
        Quote::None => {}
    }

    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}
